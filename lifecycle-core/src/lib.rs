//! Order-Lifecycle and Trade-Aggregation Engine
//!
//! Tracks orders through a status state machine, folds execution streams
//! into closed round-trip trades with realized P&L, and synthesizes fills
//! deterministically for simulation. Transport, persistence and UIs live
//! outside; this crate only speaks orders, fills, bars and ticks.

pub mod aggregation;
pub mod domain;
pub mod lifecycle;
pub mod repository;
pub mod runtime;
pub mod sim;

// Re-export main types for easy access
pub use aggregation::{ExecutionRouter, ProcessorSnapshot, RiskAggregator, RouteKey, Trade, TradeProcessor};
pub use domain::{
    Bar, EngineError, ErrorKind, Execution, ExecutionType, Fill, Order, OrderStatus, OrderType,
    Rejection, Security, Side, Tick, TimeInForce,
};
pub use lifecycle::OrderEvent;
pub use repository::{
    InMemoryOrderRepository, InMemoryTradeRepository, OrderRepository, TradeRepository,
};
pub use runtime::{ExecutionSource, SessionConfig, SessionEngine, SessionStatistics};
pub use sim::{SessionEvent, SimulatedMatchingEngine};

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A complete simulated trading session: the matching engine wired into a
/// session engine over in-memory repositories. The entry point for backtests
/// and demo trading.
pub struct SimTradingSession {
    engine: SessionEngine,
    matching: Arc<SimulatedMatchingEngine>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl SimTradingSession {
    pub fn new(config: SessionConfig) -> Self {
        let mut matching = SimulatedMatchingEngine::new(config.provider.clone());
        let events = matching.subscribe();
        let engine = SessionEngine::new(
            config,
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryTradeRepository::new()),
        );
        Self {
            engine,
            matching: Arc::new(matching),
            events,
        }
    }

    /// Start draining matching-engine events; can only be called once.
    pub async fn start(&mut self) -> Result<()> {
        let events = self
            .events
            .take()
            .ok_or_else(|| anyhow::anyhow!("session already started"))?;
        self.engine.start(events).await
    }

    pub async fn stop(&self) {
        self.engine.stop().await;
    }

    /// Register and hand an order to the matching engine.
    pub fn submit_order(&self, order: Order) -> Result<(), EngineError> {
        self.engine.register_order(order.clone())?;
        match order.order_type {
            OrderType::Market => self.matching.on_market_order(order),
            OrderType::Limit { .. } => self.matching.on_limit_order(order),
        }
        Ok(())
    }

    /// Request cancellation. Fails with `InvalidTransition` once the order
    /// has filled; unknown ids pass through to the idempotent acknowledgment.
    pub fn cancel_order(&self, order_id: &str) -> Result<(), EngineError> {
        self.engine.request_cancel(order_id)?;
        self.matching.cancel_order(order_id);
        Ok(())
    }

    pub fn on_bar(&self, bar: &Bar) {
        self.matching.on_bar(bar);
    }

    pub fn on_tick(&self, tick: &Tick) {
        self.matching.on_tick(tick);
    }

    pub fn order_status(&self, order_id: &str) -> Option<OrderStatus> {
        self.engine.order_status(order_id)
    }

    pub fn closed_trades(&self) -> Vec<Trade> {
        self.engine.closed_trades()
    }

    pub fn statistics(&self) -> SessionStatistics {
        self.engine.statistics()
    }

    pub fn risk_for(&self, owner: &str) -> f64 {
        self.engine.risk().risk_for(owner)
    }

    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    pub fn matching(&self) -> &Arc<SimulatedMatchingEngine> {
        &self.matching
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn bar(symbol: &str, low: f64, high: f64, close: f64, ts: u64) -> Bar {
        Bar {
            security: Security::new(symbol),
            provider: "SIM".into(),
            open: close,
            high,
            low,
            close,
            timestamp: ts,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_limit_fill_updates_order_status() {
        let mut session = SimTradingSession::new(SessionConfig::default());
        session.start().await.unwrap();

        let order =
            Order::limit("1", Security::new("AAPL"), Side::Sell, 10, 100.0, "SIM").unwrap();
        session.submit_order(order).unwrap();
        session.on_bar(&bar("AAPL", 120.0, 140.0, 130.0, 5));
        settle().await;

        assert_eq!(session.order_status("1"), Some(OrderStatus::Filled));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_round_trip_produces_closed_trade() {
        let mut session = SimTradingSession::new(SessionConfig::default());
        session.start().await.unwrap();

        session
            .submit_order(
                Order::market("1", Security::new("AAPL"), Side::Buy, 40, "SIM").unwrap(),
            )
            .unwrap();
        session.on_bar(&bar("AAPL", 35.0, 36.0, 35.5, 100));
        settle().await;

        session
            .submit_order(
                Order::market("2", Security::new("AAPL"), Side::Sell, 40, "SIM").unwrap(),
            )
            .unwrap();
        session.on_bar(&bar("AAPL", 35.8, 36.2, 36.0, 200));
        settle().await;

        let trades = session.closed_trades();
        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert!((trade.realized_pnl - 20.0).abs() < 1e-9);
        assert_eq!(trade.close_time, Some(200));
        assert_eq!(trade.signed_sum(), 0);

        let stats = session.statistics();
        assert_eq!(stats.orders_submitted, 2);
        assert_eq!(stats.fills_processed, 2);
        assert_eq!(stats.trades_closed, 1);
        assert!((stats.realized_pnl - 20.0).abs() < 1e-9);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_before_fill() {
        let mut session = SimTradingSession::new(SessionConfig::default());
        session.start().await.unwrap();

        session
            .submit_order(
                Order::limit("1", Security::new("AAPL"), Side::Buy, 10, 10.0, "SIM").unwrap(),
            )
            .unwrap();
        settle().await;

        session.cancel_order("1").unwrap();
        settle().await;
        assert_eq!(session.order_status("1"), Some(OrderStatus::Cancelled));

        // A later admissible bar no longer fills anything.
        session.on_bar(&bar("AAPL", 5.0, 9.0, 8.0, 10));
        settle().await;
        assert_eq!(session.order_status("1"), Some(OrderStatus::Cancelled));
        assert_eq!(session.statistics().fills_processed, 0);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_after_fill_is_invalid_transition() {
        let mut session = SimTradingSession::new(SessionConfig::default());
        session.start().await.unwrap();

        session
            .submit_order(
                Order::market("1", Security::new("AAPL"), Side::Buy, 10, "SIM").unwrap(),
            )
            .unwrap();
        session.on_bar(&bar("AAPL", 35.0, 36.0, 35.5, 100));
        settle().await;
        assert_eq!(session.order_status("1"), Some(OrderStatus::Filled));

        let err = session.cancel_order("1").unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_limit_order_rejected_at_registration() {
        let mut session = SimTradingSession::new(SessionConfig::default());
        session.start().await.unwrap();

        let mut order =
            Order::limit("1", Security::new("AAPL"), Side::Sell, 10, 100.0, "SIM").unwrap();
        order.order_type = OrderType::Limit { price: -1.0 };
        // Registration itself refuses the invalid order.
        let err = session.submit_order(order).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_duplicate_order_id_rejected_at_registration() {
        let mut session = SimTradingSession::new(SessionConfig::default());
        session.start().await.unwrap();

        let order = Order::limit("1", Security::new("AAPL"), Side::Buy, 10, 10.0, "SIM").unwrap();
        session.submit_order(order.clone()).unwrap();
        let err = session.submit_order(order).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_two_keys_do_not_interfere() {
        let mut session = SimTradingSession::new(SessionConfig::default());
        session.start().await.unwrap();

        session
            .submit_order(
                Order::market("g1", Security::new("GOOG"), Side::Buy, 5, "SIM").unwrap(),
            )
            .unwrap();
        session
            .submit_order(
                Order::market("a1", Security::new("AAPL"), Side::Buy, 7, "SIM").unwrap(),
            )
            .unwrap();
        session.on_bar(&bar("GOOG", 100.0, 101.0, 100.5, 1));
        session.on_bar(&bar("AAPL", 50.0, 51.0, 50.5, 1));
        settle().await;

        let snaps = session.engine().router().snapshot();
        assert_eq!(snaps.len(), 2);
        let goog = snaps.iter().find(|s| s.security.symbol == "GOOG").unwrap();
        let aapl = snaps.iter().find(|s| s.security.symbol == "AAPL").unwrap();
        assert_eq!(goog.position, 5);
        assert_eq!(aapl.position, 7);
        session.stop().await;
    }
}
