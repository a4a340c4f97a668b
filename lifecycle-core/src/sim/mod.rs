//! Simulated execution provider for backtesting and demo trading.

pub mod matching;

pub use matching::{SessionEvent, SimulatedMatchingEngine};
