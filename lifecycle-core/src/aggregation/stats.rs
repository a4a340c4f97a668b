//! Running risk statistics from the execution stream

use crate::domain::Execution;
use dashmap::DashMap;
use std::collections::HashMap;

/// Per-security book inside one owner's risk state.
#[derive(Default, Clone, Debug)]
struct PositionBook {
    position: i64,
    average_entry: f64,
}

/// Accumulated risk state for one logical owner (strategy instance / order
/// group): positions by security plus Welford running variance over realized
/// P&L per reducing execution.
#[derive(Default, Clone, Debug)]
struct RiskState {
    books: HashMap<String, PositionBook>,
    samples: u64,
    mean: f64,
    m2: f64,
}

impl RiskState {
    fn fold(&mut self, execution: &Execution) {
        let fill = &execution.fill;
        let book = self.books.entry(fill.security.symbol.clone()).or_default();

        let signed = fill.signed_quantity();
        let old = book.position;
        let new = old + signed;

        let mut realized_sample = None;
        if old == 0 {
            book.average_entry = fill.price;
        } else if old.signum() == signed.signum() {
            let total = (old.abs() + signed.abs()) as f64;
            book.average_entry =
                (book.average_entry * old.abs() as f64 + fill.price * signed.abs() as f64) / total;
        } else {
            let closed = signed.abs().min(old.abs());
            let realized =
                (fill.price - book.average_entry) * closed as f64 * old.signum() as f64;
            realized_sample = Some(realized);
            if new != 0 && new.signum() != old.signum() {
                book.average_entry = fill.price;
            }
        }
        book.position = new;
        if new == 0 {
            book.average_entry = 0.0;
        }
        if let Some(realized) = realized_sample {
            self.push_sample(realized);
        }
    }

    fn push_sample(&mut self, value: f64) {
        self.samples += 1;
        let delta = value - self.mean;
        self.mean += delta / self.samples as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn volatility(&self) -> f64 {
        if self.samples < 2 {
            return 0.0;
        }
        (self.m2 / (self.samples - 1) as f64).sqrt()
    }
}

/// Lightweight risk figure per owner, fed by the same execution stream as the
/// trade processors and consumed by strategies for position sizing.
///
/// Read-mostly; resetting mid-session is safe and later updates simply
/// rebuild state from scratch.
pub struct RiskAggregator {
    owners: DashMap<String, RiskState>,
}

impl RiskAggregator {
    pub fn new() -> Self {
        Self {
            owners: DashMap::new(),
        }
    }

    /// Fold one execution into the owner's running statistic. The owner is
    /// the order's group id; ungrouped orders pool under the provider name.
    pub fn update_on_execution(&self, execution: &Execution) {
        let owner = if execution.order.group_id.is_empty() {
            execution.order.provider.clone()
        } else {
            execution.order.group_id.clone()
        };
        self.owners.entry(owner).or_default().fold(execution);
    }

    /// Current risk figure: volatility of realized P&L per round-trip leg.
    pub fn risk_for(&self, owner: &str) -> f64 {
        self.owners
            .get(owner)
            .map(|s| s.volatility())
            .unwrap_or(0.0)
    }

    pub fn reset(&self) {
        self.owners.clear();
    }
}

impl Default for RiskAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionType, Fill, Order, Security, Side};
    use std::sync::atomic::{AtomicU64, Ordering};

    static EXEC_SEQ: AtomicU64 = AtomicU64::new(0);

    fn execution(group: &str, side: Side, size: u64, price: f64) -> Execution {
        let n = EXEC_SEQ.fetch_add(1, Ordering::Relaxed);
        let order = Order::market(format!("O{}", n), Security::new("AAPL"), side, size, "SIM")
            .unwrap()
            .with_group(group);
        let fill = Fill {
            execution_id: format!("E{}", n),
            order_id: order.id.clone(),
            security: order.security.clone(),
            provider: order.provider.clone(),
            side,
            price,
            size,
            leaves_quantity: 0,
            cumulative_quantity: size,
            execution_type: ExecutionType::Full,
            timestamp: n,
        };
        Execution::new(order, fill).unwrap()
    }

    #[test]
    fn test_volatility_of_realized_pnl() {
        let risk = RiskAggregator::new();

        // Two round trips with different realized P&L: +10 and +30.
        risk.update_on_execution(&execution("s1", Side::Buy, 10, 100.0));
        risk.update_on_execution(&execution("s1", Side::Sell, 10, 101.0));
        risk.update_on_execution(&execution("s1", Side::Buy, 10, 100.0));
        risk.update_on_execution(&execution("s1", Side::Sell, 10, 103.0));

        // Sample stddev of [10, 30] is sqrt(200) ~ 14.142
        let vol = risk.risk_for("s1");
        assert!((vol - 200.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_owners_are_independent() {
        let risk = RiskAggregator::new();
        risk.update_on_execution(&execution("s1", Side::Buy, 10, 100.0));
        risk.update_on_execution(&execution("s2", Side::Buy, 10, 100.0));
        assert_eq!(risk.risk_for("s1"), 0.0);
        assert_eq!(risk.risk_for("missing"), 0.0);
    }

    #[test]
    fn test_reset_mid_session_is_tolerated() {
        let risk = RiskAggregator::new();
        risk.update_on_execution(&execution("s1", Side::Buy, 10, 100.0));
        risk.reset();
        assert_eq!(risk.risk_for("s1"), 0.0);

        // Updates after reset rebuild state without error.
        risk.update_on_execution(&execution("s1", Side::Sell, 10, 101.0));
        risk.update_on_execution(&execution("s1", Side::Buy, 10, 100.0));
        assert_eq!(risk.risk_for("s1"), 0.0);
    }
}
