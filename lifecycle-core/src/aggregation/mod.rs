//! Trade aggregation: executions in, closed round trips out.

pub mod processor;
pub mod router;
pub mod stats;
pub mod trade;

pub use processor::{ProcessorSnapshot, TradeProcessor};
pub use router::{ExecutionRouter, RouteKey};
pub use stats::RiskAggregator;
pub use trade::Trade;
