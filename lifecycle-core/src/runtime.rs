//! Session runtime
//!
//! Wires the event stream from an execution source into the state machine,
//! the router and the risk aggregator, persisting orders and trades at the
//! repository boundaries. One task drains the stream, so each order id has a
//! single status writer.

use crate::aggregation::{ExecutionRouter, RiskAggregator, Trade};
use crate::domain::{EngineError, Execution, Order, OrderStatus, Rejection};
use crate::lifecycle::{self, OrderEvent};
use crate::repository::{OrderRepository, TradeRepository};
use crate::sim::SessionEvent;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Anything that can feed a session with execution events: the simulated
/// matching engine, or a live broker adapter.
#[async_trait]
pub trait ExecutionSource: Send {
    async fn start(&mut self) -> Result<()>;
    fn subscribe(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>>;
    fn name(&self) -> &str;
}

/// Session configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    pub provider: String,
    pub currency: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider: "SIM".to_string(),
            currency: "USD".to_string(),
        }
    }
}

/// Session counters
#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub orders_submitted: u64,
    pub fills_processed: u64,
    pub rejections: u64,
    pub cancels_acknowledged: u64,
    pub trades_closed: u64,
    pub realized_pnl: f64,
    /// Events dropped because they were inapplicable or inconsistent.
    pub invalid_events: u64,
}

/// Owns the order book of record and everything downstream of the event
/// stream.
pub struct SessionEngine {
    config: SessionConfig,
    orders: Arc<DashMap<String, Order>>,
    router: Arc<ExecutionRouter>,
    risk: Arc<RiskAggregator>,
    order_repo: Arc<dyn OrderRepository>,
    trade_repo: Arc<dyn TradeRepository>,
    statistics: Arc<parking_lot::RwLock<SessionStatistics>>,
    running: Arc<tokio::sync::RwLock<bool>>,
}

impl SessionEngine {
    pub fn new(
        config: SessionConfig,
        order_repo: Arc<dyn OrderRepository>,
        trade_repo: Arc<dyn TradeRepository>,
    ) -> Self {
        Self {
            config,
            orders: Arc::new(DashMap::new()),
            router: Arc::new(ExecutionRouter::new()),
            risk: Arc::new(RiskAggregator::new()),
            order_repo,
            trade_repo,
            statistics: Arc::new(parking_lot::RwLock::new(SessionStatistics::default())),
            running: Arc::new(tokio::sync::RwLock::new(false)),
        }
    }

    /// Register a new order in the book of record before it is handed to an
    /// execution source. Duplicate ids are rejected.
    pub fn register_order(&self, mut order: Order) -> Result<(), EngineError> {
        order.validate()?;
        if self.orders.contains_key(&order.id) {
            return Err(EngineError::InvalidArgument(format!(
                "order id {} already registered",
                order.id
            )));
        }
        if order.currency.is_empty() {
            order.currency = self.config.currency.clone();
        }
        self.save_order(&order);
        self.orders.insert(order.id.clone(), order);
        self.statistics.write().orders_submitted += 1;
        Ok(())
    }

    /// Mark an order pending-cancel before forwarding the cancel request to
    /// the execution source. Cancelling after a full fill is an invalid
    /// transition, not a silent no-op; cancelling an unknown id is left to
    /// the source's idempotent acknowledgment.
    pub fn request_cancel(&self, order_id: &str) -> Result<(), EngineError> {
        let Some(mut order) = self.orders.get_mut(order_id) else {
            return Ok(());
        };
        lifecycle::apply(&mut order, OrderEvent::CancelRequested)?;
        let snapshot = order.clone();
        drop(order);
        self.save_order(&snapshot);
        Ok(())
    }

    /// Spawn the event-consuming task over a subscribed source stream.
    pub async fn start(&self, mut events: mpsc::UnboundedReceiver<SessionEvent>) -> Result<()> {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        let orders = self.orders.clone();
        let router = self.router.clone();
        let risk = self.risk.clone();
        let order_repo = self.order_repo.clone();
        let trade_repo = self.trade_repo.clone();
        let statistics = self.statistics.clone();
        let running = self.running.clone();
        let provider = self.config.provider.clone();

        info!(provider = %provider, "session engine started");
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !*running.read().await {
                    break;
                }
                Self::handle_event(
                    event,
                    &orders,
                    &router,
                    &risk,
                    order_repo.as_ref(),
                    trade_repo.as_ref(),
                    &statistics,
                );
            }
            info!(provider = %provider, "session event stream ended");
        });

        Ok(())
    }

    /// Connect any execution source: start it, take its event stream, and
    /// begin consuming.
    pub async fn attach(&self, source: &mut dyn ExecutionSource) -> Result<()> {
        source.start().await?;
        let events = source
            .subscribe()
            .ok_or_else(|| anyhow::anyhow!("source {} already subscribed", source.name()))?;
        self.start(events).await
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    fn handle_event(
        event: SessionEvent,
        orders: &DashMap<String, Order>,
        router: &ExecutionRouter,
        risk: &RiskAggregator,
        order_repo: &dyn OrderRepository,
        trade_repo: &dyn TradeRepository,
        statistics: &parking_lot::RwLock<SessionStatistics>,
    ) {
        match event {
            SessionEvent::OrderAccepted {
                order_id,
                broker_order_id,
                ..
            } => {
                Self::apply_to_order(
                    orders,
                    order_repo,
                    statistics,
                    &order_id,
                    OrderEvent::AcceptedNew {
                        broker_order_id: Some(broker_order_id),
                    },
                );
            }
            SessionEvent::ExecutionArrived(execution) => {
                statistics.write().fills_processed += 1;
                Self::handle_execution(
                    execution, orders, router, risk, order_repo, trade_repo, statistics,
                );
            }
            SessionEvent::RejectionArrived(rejection) => {
                statistics.write().rejections += 1;
                Self::handle_rejection(rejection, orders, order_repo, statistics);
            }
            SessionEvent::CancelAcknowledged { order_id, .. } => {
                statistics.write().cancels_acknowledged += 1;
                // Confirmation only applies to orders we marked pending.
                if orders
                    .get(&order_id)
                    .map(|o| o.status == OrderStatus::PendingCancel)
                    .unwrap_or(false)
                {
                    Self::apply_to_order(
                        orders,
                        order_repo,
                        statistics,
                        &order_id,
                        OrderEvent::CancelConfirmed,
                    );
                }
            }
            SessionEvent::OrderExpired { order_id, .. } => {
                Self::apply_to_order(orders, order_repo, statistics, &order_id, OrderEvent::Expired);
            }
        }
    }

    fn handle_execution(
        execution: Execution,
        orders: &DashMap<String, Order>,
        router: &ExecutionRouter,
        risk: &RiskAggregator,
        order_repo: &dyn OrderRepository,
        trade_repo: &dyn TradeRepository,
        statistics: &parking_lot::RwLock<SessionStatistics>,
    ) {
        // Status first: a fill that is illegal for the order's current state
        // must not reach the aggregators.
        let order_id = execution.fill.order_id.clone();
        let applied = match orders.get_mut(&order_id) {
            Some(mut order) => {
                match lifecycle::apply(&mut order, OrderEvent::Fill(execution.fill.clone())) {
                    Ok(status) => {
                        let snapshot = order.clone();
                        drop(order);
                        if let Err(e) = order_repo.save(&snapshot) {
                            warn!(order_id = %order_id, error = %e, "order save failed");
                        }
                        info!(order_id = %order_id, status = %status, "fill applied");
                        true
                    }
                    Err(e) => {
                        warn!(order_id = %order_id, error = %e, "dropping inapplicable fill");
                        false
                    }
                }
            }
            None => {
                warn!(order_id = %order_id, "fill for unknown order");
                false
            }
        };
        if !applied {
            statistics.write().invalid_events += 1;
            return;
        }

        match router.route(&execution) {
            Ok(Some(trade)) => {
                Self::persist_trade(&trade, trade_repo, statistics);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "execution dropped by router");
                statistics.write().invalid_events += 1;
                return;
            }
        }
        risk.update_on_execution(&execution);
    }

    fn handle_rejection(
        rejection: Rejection,
        orders: &DashMap<String, Order>,
        order_repo: &dyn OrderRepository,
        statistics: &parking_lot::RwLock<SessionStatistics>,
    ) {
        info!(order_id = %rejection.order_id, reason = %rejection.reason, "order rejected");
        if orders.contains_key(&rejection.order_id) {
            Self::apply_to_order(
                orders,
                order_repo,
                statistics,
                &rejection.order_id,
                OrderEvent::Rejected {
                    reason: rejection.reason,
                },
            );
        }
    }

    fn apply_to_order(
        orders: &DashMap<String, Order>,
        order_repo: &dyn OrderRepository,
        statistics: &parking_lot::RwLock<SessionStatistics>,
        order_id: &str,
        event: OrderEvent,
    ) {
        let Some(mut order) = orders.get_mut(order_id) else {
            warn!(order_id, "event for unknown order");
            statistics.write().invalid_events += 1;
            return;
        };
        match lifecycle::apply(&mut order, event) {
            Ok(_) => {
                let snapshot = order.clone();
                drop(order);
                if let Err(e) = order_repo.save(&snapshot) {
                    warn!(order_id, error = %e, "order save failed");
                }
            }
            Err(e) => {
                drop(order);
                warn!(order_id, error = %e, "dropping inapplicable event");
                statistics.write().invalid_events += 1;
            }
        }
    }

    fn persist_trade(
        trade: &Trade,
        trade_repo: &dyn TradeRepository,
        statistics: &parking_lot::RwLock<SessionStatistics>,
    ) {
        info!(
            trade_id = %trade.id,
            security = %trade.security,
            pnl = trade.realized_pnl,
            "trade closed"
        );
        if let Err(e) = trade_repo.save(trade) {
            warn!(trade_id = %trade.id, error = %e, "trade save failed");
        }
        let mut stats = statistics.write();
        stats.trades_closed += 1;
        stats.realized_pnl += trade.realized_pnl;
    }

    fn save_order(&self, order: &Order) {
        if let Err(e) = self.order_repo.save(order) {
            warn!(order_id = %order.id, error = %e, "order save failed");
        }
    }

    pub fn order_status(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.get(order_id).map(|o| o.status.clone())
    }

    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.orders.get(order_id).map(|o| o.clone())
    }

    pub fn closed_trades(&self) -> Vec<Trade> {
        self.trade_repo.list_all()
    }

    pub fn statistics(&self) -> SessionStatistics {
        self.statistics.read().clone()
    }

    pub fn router(&self) -> &Arc<ExecutionRouter> {
        &self.router
    }

    pub fn risk(&self) -> &Arc<RiskAggregator> {
        &self.risk
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
