//! Domain model: immutable-shape value types with invariant-checking
//! constructors. No behavior beyond validation.

pub mod errors;
pub mod fill;
pub mod order;
pub mod types;

pub use errors::{EngineError, ErrorKind};
pub use fill::{Execution, ExecutionType, Fill, Rejection};
pub use order::{Order, OrderStatus};
pub use types::{now_millis, Bar, OrderType, Security, Side, Tick, TimeInForce};
