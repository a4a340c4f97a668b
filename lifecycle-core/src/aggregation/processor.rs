//! Per (provider, security) trade aggregation

use super::trade::Trade;
use crate::domain::{EngineError, Execution, Security};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Owned, copy-on-read view of one processor for reporting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessorSnapshot {
    pub provider: String,
    pub security: Security,
    pub position: i64,
    pub average_entry: f64,
    pub open_realized_pnl: f64,
    pub closed_trades: u64,
}

/// Folds all executions for one (provider, security) key into a sequence of
/// trade records, tracking the running signed position and realizing P&L
/// against a volume-weighted average entry price.
///
/// Executions for a given key must be applied in arrival order; the router
/// serializes access, so nothing here is synchronized.
pub struct TradeProcessor {
    provider: String,
    security: Security,
    position: i64,
    average_entry: f64,
    current: Option<Trade>,
    closed_trades: u64,
}

impl TradeProcessor {
    pub fn new(provider: impl Into<String>, security: Security) -> Self {
        Self {
            provider: provider.into(),
            security,
            position: 0,
            average_entry: 0.0,
            current: None,
            closed_trades: 0,
        }
    }

    /// Apply one execution; returns the closed trade when the position
    /// returns to exactly zero.
    pub fn on_execution(&mut self, execution: &Execution) -> Result<Option<Trade>, EngineError> {
        let fill = &execution.fill;

        if fill.security != self.security || fill.provider != self.provider {
            return Err(EngineError::InvariantViolated(format!(
                "execution {} for {}/{} routed to processor {}/{}",
                fill.execution_id, fill.provider, fill.security, self.provider, self.security
            )));
        }
        if fill.size == 0 {
            return Err(EngineError::InvariantViolated(format!(
                "execution {} carries zero quantity",
                fill.execution_id
            )));
        }

        let signed = fill.signed_quantity();
        let old = self.position;
        let new = old + signed;

        // Volume-weighted average cost fold: extending blends the entry,
        // reducing realizes against it, crossing restarts it at the fill.
        let mut realized = 0.0;
        if old == 0 {
            self.average_entry = fill.price;
        } else if old.signum() == signed.signum() {
            let total = (old.abs() + signed.abs()) as f64;
            self.average_entry =
                (self.average_entry * old.abs() as f64 + fill.price * signed.abs() as f64) / total;
        } else {
            let closed = signed.abs().min(old.abs());
            realized = (fill.price - self.average_entry) * closed as f64 * old.signum() as f64;
            if new != 0 && new.signum() != old.signum() {
                self.average_entry = fill.price;
            }
        }

        if self.current.is_none() {
            self.current = Some(Trade::open(execution));
        }
        if let Some(trade) = self.current.as_mut() {
            trade
                .execution_details
                .insert(fill.execution_id.clone(), signed);
            trade.realized_pnl += realized;
            trade.size = trade.size.max(new.unsigned_abs());
        }
        self.position = new;

        if new == 0 {
            self.average_entry = 0.0;
            if let Some(mut trade) = self.current.take() {
                trade.close_time = Some(fill.timestamp);
                self.closed_trades += 1;
                debug!(
                    trade_id = %trade.id,
                    pnl = trade.realized_pnl,
                    "round trip closed"
                );
                return Ok(Some(trade));
            }
        }

        Ok(None)
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn open_trade(&self) -> Option<Trade> {
        self.current.clone()
    }

    pub fn snapshot(&self) -> ProcessorSnapshot {
        ProcessorSnapshot {
            provider: self.provider.clone(),
            security: self.security.clone(),
            position: self.position,
            average_entry: self.average_entry,
            open_realized_pnl: self
                .current
                .as_ref()
                .map(|t| t.realized_pnl)
                .unwrap_or(0.0),
            closed_trades: self.closed_trades,
        }
    }
}
