//! Round-trip trade record

use crate::domain::{Execution, Security, Side};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One round trip for a (provider, security) pair: from opening a non-zero
/// position to that position returning to flat.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub provider: String,
    pub security: Security,
    /// Side of the opening leg.
    pub side: Side,
    /// Peak absolute position reached during the round trip.
    pub size: u64,
    pub realized_pnl: f64,
    pub open_time: u64,
    /// Set at the instant the signed position returns to exactly zero.
    pub close_time: Option<u64>,
    pub group_id: String,
    /// Execution id -> signed filled quantity, kept for audit and replay.
    pub execution_details: HashMap<String, i64>,
}

impl Trade {
    /// Open a new trade from the first contributing execution.
    pub fn open(execution: &Execution) -> Self {
        let fill = &execution.fill;
        Self {
            id: format!("TRD_{}_{}", fill.timestamp, nanoid::nanoid!(8)),
            provider: fill.provider.clone(),
            security: fill.security.clone(),
            side: fill.side,
            size: 0,
            realized_pnl: 0.0,
            open_time: fill.timestamp,
            close_time: None,
            group_id: execution.order.group_id.clone(),
            execution_details: HashMap::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close_time.is_some()
    }

    /// Sum of signed quantities in the execution-details map; non-zero while
    /// open, exactly zero once closed.
    pub fn signed_sum(&self) -> i64 {
        self.execution_details.values().sum()
    }
}
