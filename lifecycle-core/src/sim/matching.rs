//! Simulated matching engine
//!
//! Stands in for a real broker when backtesting or demo-trading: resting
//! orders are matched against incoming bars and ticks under deterministic
//! rules, and the resulting executions, rejections and acknowledgments are
//! pushed through one enumerated event stream.

use crate::domain::{
    Bar, Execution, ExecutionType, Fill, Order, OrderType, Rejection, Side, Tick,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Everything an execution source can tell the session, as one exhaustive
/// enum. A consumer matching on this cannot silently lose an event kind.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    OrderAccepted {
        order_id: String,
        provider: String,
        broker_order_id: String,
    },
    ExecutionArrived(Execution),
    RejectionArrived(Rejection),
    CancelAcknowledged {
        order_id: String,
        provider: String,
        /// False when the order was not resting; the acknowledgment still
        /// fires (cancellation is idempotent).
        known: bool,
    },
    OrderExpired {
        order_id: String,
        provider: String,
    },
}

/// Deterministic fill synthesis for one simulated execution provider.
///
/// Market orders rest until the next print and fill fully at it (bar close or
/// tick last). Limit orders rest until a bar or tick admits them: a sell
/// fills at its own limit when the traded range never fell below it (bar low
/// at or above the limit, or tick at or above); a buy fills symmetrically
/// when the bar high (or tick) is at or below the limit. No partial fills
/// against a single print in this model.
pub struct SimulatedMatchingEngine {
    provider: String,
    resting: DashMap<String, Order>,
    event_sender: mpsc::UnboundedSender<SessionEvent>,
    event_receiver: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    execution_counter: AtomicU64,
    broker_counter: AtomicU64,
}

impl SimulatedMatchingEngine {
    pub fn new(provider: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            provider: provider.into(),
            resting: DashMap::new(),
            event_sender: tx,
            event_receiver: Some(rx),
            execution_counter: AtomicU64::new(0),
            broker_counter: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Take the event stream; can only be consumed once.
    pub fn subscribe(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_receiver.take()
    }

    /// A new market order rests until the next available price, then fills
    /// fully. Invalid orders are rejected up front and never rest.
    pub fn on_market_order(&self, order: Order) {
        self.accept_order(order);
    }

    /// A new limit order with a positive limit price joins the resting set;
    /// anything else is rejected immediately.
    pub fn on_limit_order(&self, order: Order) {
        self.accept_order(order);
    }

    fn accept_order(&self, mut order: Order) {
        if let Err(e) = order.validate() {
            self.reject(&order, e.to_string());
            return;
        }
        if self.resting.contains_key(&order.id) {
            self.reject(
                &order,
                format!("order id {} already resting", order.id),
            );
            return;
        }

        let broker_id = format!(
            "SIM-{}-{}",
            self.provider,
            self.broker_counter.fetch_add(1, Ordering::Relaxed)
        );
        order.broker_order_id = Some(broker_id.clone());

        self.send(SessionEvent::OrderAccepted {
            order_id: order.id.clone(),
            provider: self.provider.clone(),
            broker_order_id: broker_id,
        });
        debug!(order_id = %order.id, side = %order.side, "order resting");
        self.resting.insert(order.id.clone(), order);
    }

    /// Evaluate every resting order on the bar's security.
    pub fn on_bar(&self, bar: &Bar) {
        if !bar.is_valid() {
            warn!(security = %bar.security, "dropping bar with invalid prices");
            return;
        }
        self.match_resting(&bar.security.symbol, bar.timestamp, |order| {
            Self::bar_fill_price(order, bar)
        });
    }

    /// Evaluate every resting order on the tick's security.
    pub fn on_tick(&self, tick: &Tick) {
        if !tick.is_valid() {
            warn!(security = %tick.security, "dropping tick with invalid price");
            return;
        }
        self.match_resting(&tick.security.symbol, tick.timestamp, |order| {
            Self::tick_fill_price(order, tick.last_price)
        });
    }

    /// Remove a resting order. Unknown ids still acknowledge: cancelling an
    /// order that is not resting is an idempotent no-op.
    pub fn cancel_order(&self, order_id: &str) {
        let known = self.resting.remove(order_id).is_some();
        if known {
            debug!(order_id, "resting order cancelled");
        }
        self.send(SessionEvent::CancelAcknowledged {
            order_id: order_id.to_string(),
            provider: self.provider.clone(),
            known,
        });
    }

    /// Owned view of the resting set.
    pub fn resting_orders(&self) -> Vec<Order> {
        self.resting.iter().map(|e| e.value().clone()).collect()
    }

    fn match_resting<F>(&self, symbol: &str, timestamp: u64, fill_price: F)
    where
        F: Fn(&Order) -> Option<f64>,
    {
        let mut filled = Vec::new();
        let mut expired = Vec::new();

        for entry in self.resting.iter() {
            let order = entry.value();
            if order.security.symbol != symbol {
                continue;
            }
            if order.is_expired(timestamp) {
                expired.push(order.id.clone());
                continue;
            }
            if let Some(price) = fill_price(order) {
                filled.push((order.id.clone(), price));
            }
        }

        for id in expired {
            if self.resting.remove(&id).is_some() {
                self.send(SessionEvent::OrderExpired {
                    order_id: id,
                    provider: self.provider.clone(),
                });
            }
        }
        for (id, price) in filled {
            if let Some((_, order)) = self.resting.remove(&id) {
                self.emit_fill(order, price, timestamp);
            }
        }
    }

    fn bar_fill_price(order: &Order, bar: &Bar) -> Option<f64> {
        match order.order_type {
            OrderType::Market => Some(bar.close),
            OrderType::Limit { price } => match order.side {
                Side::Sell if bar.low >= price => Some(price),
                Side::Buy if bar.high <= price => Some(price),
                _ => None,
            },
        }
    }

    fn tick_fill_price(order: &Order, last: f64) -> Option<f64> {
        match order.order_type {
            OrderType::Market => Some(last),
            OrderType::Limit { price } => match order.side {
                Side::Sell if last >= price => Some(price),
                Side::Buy if last <= price => Some(price),
                _ => None,
            },
        }
    }

    /// One full fill: leaves zero, cumulative equals the order size.
    fn emit_fill(&self, order: Order, price: f64, timestamp: u64) {
        let fill = Fill {
            execution_id: format!(
                "EXE-{}-{}",
                self.provider,
                self.execution_counter.fetch_add(1, Ordering::Relaxed)
            ),
            order_id: order.id.clone(),
            security: order.security.clone(),
            provider: order.provider.clone(),
            side: order.side,
            price,
            size: order.size,
            leaves_quantity: 0,
            cumulative_quantity: order.size,
            execution_type: ExecutionType::Full,
            timestamp,
        };
        match Execution::new(order, fill) {
            Ok(execution) => {
                debug!(
                    order_id = %execution.order.id,
                    price,
                    "resting order filled"
                );
                self.send(SessionEvent::ExecutionArrived(execution));
            }
            Err(e) => {
                // Fill construction only fails on an internal inconsistency.
                warn!(error = %e, "dropping inconsistent execution");
            }
        }
    }

    fn reject(&self, order: &Order, reason: String) {
        warn!(order_id = %order.id, %reason, "order rejected");
        self.send(SessionEvent::RejectionArrived(Rejection {
            order_id: order.id.clone(),
            security: order.security.clone(),
            provider: self.provider.clone(),
            reason,
        }));
    }

    fn send(&self, event: SessionEvent) {
        // The receiver can only disappear at session teardown.
        if self.event_sender.send(event).is_err() {
            warn!("session event receiver dropped");
        }
    }
}

#[async_trait::async_trait]
impl crate::runtime::ExecutionSource for SimulatedMatchingEngine {
    async fn start(&mut self) -> anyhow::Result<()> {
        // Nothing to connect; fills are driven by market data pushed in.
        Ok(())
    }

    fn subscribe(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.subscribe()
    }

    fn name(&self) -> &str {
        &self.provider
    }
}
