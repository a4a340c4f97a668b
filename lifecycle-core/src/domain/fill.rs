//! Fills, executions and rejections

use super::errors::EngineError;
use super::order::Order;
use super::types::{Security, Side};
use serde::{Deserialize, Serialize};

/// Execution report kind
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionType {
    New,
    Partial,
    Full,
    Rejected,
}

/// One execution report against an order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fill {
    pub execution_id: String,
    pub order_id: String,
    pub security: Security,
    pub provider: String,
    pub side: Side,
    pub price: f64,
    pub size: u64,
    pub leaves_quantity: u64,
    pub cumulative_quantity: u64,
    pub execution_type: ExecutionType,
    pub timestamp: u64,
}

impl Fill {
    /// Size signed by direction: positive adds to long, negative to short.
    pub fn signed_quantity(&self) -> i64 {
        self.side.sign() * self.size as i64
    }

    /// At every point in a fill sequence, cumulative + leaves must equal the
    /// order size.
    pub fn check_against(&self, order: &Order) -> Result<(), EngineError> {
        if self.order_id != order.id {
            return Err(EngineError::InvariantViolated(format!(
                "fill {} targets order {} but was paired with order {}",
                self.execution_id, self.order_id, order.id
            )));
        }
        if self.cumulative_quantity + self.leaves_quantity != order.size {
            return Err(EngineError::InvariantViolated(format!(
                "fill {}: cumulative {} + leaves {} != order size {}",
                self.execution_id, self.cumulative_quantity, self.leaves_quantity, order.size
            )));
        }
        Ok(())
    }
}

/// Exactly one order paired with exactly one fill; the unit of information
/// flowing through the engine. Immutable once constructed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Execution {
    pub order: Order,
    pub fill: Fill,
}

impl Execution {
    pub fn new(order: Order, fill: Fill) -> Result<Self, EngineError> {
        fill.check_against(&order)?;
        if fill.provider != order.provider {
            return Err(EngineError::InvariantViolated(format!(
                "fill {} from provider {} paired with order from provider {}",
                fill.execution_id, fill.provider, order.provider
            )));
        }
        Ok(Self { order, fill })
    }

    pub fn provider(&self) -> &str {
        &self.order.provider
    }

    pub fn security(&self) -> &Security {
        &self.fill.security
    }
}

/// Rejection of an order that failed validation or matching rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rejection {
    pub order_id: String,
    pub security: Security,
    pub provider: String,
    pub reason: String,
}
