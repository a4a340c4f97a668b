//! Persistence boundary
//!
//! The engine calls these contracts only at trade-close and
//! order-status-change boundaries, never mid-computation. Real
//! implementations live outside the core; the in-memory versions back the
//! demo application and tests.

use crate::aggregation::Trade;
use crate::domain::{EngineError, Order};
use dashmap::DashMap;

pub trait OrderRepository: Send + Sync {
    fn save(&self, order: &Order) -> Result<(), EngineError>;
    fn find_by_id(&self, id: &str) -> Option<Order>;
    fn list_all(&self) -> Vec<Order>;
}

pub trait TradeRepository: Send + Sync {
    fn save(&self, trade: &Trade) -> Result<(), EngineError>;
    fn find_by_id(&self, id: &str) -> Option<Trade>;
    fn list_all(&self) -> Vec<Trade>;
}

/// Keyed by order id; saving an existing id overwrites (status updates).
pub struct InMemoryOrderRepository {
    orders: DashMap<String, Order>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
        }
    }
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn save(&self, order: &Order) -> Result<(), EngineError> {
        self.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Option<Order> {
        self.orders.get(id).map(|o| o.clone())
    }

    fn list_all(&self) -> Vec<Order> {
        self.orders.iter().map(|e| e.value().clone()).collect()
    }
}

pub struct InMemoryTradeRepository {
    trades: DashMap<String, Trade>,
}

impl InMemoryTradeRepository {
    pub fn new() -> Self {
        Self {
            trades: DashMap::new(),
        }
    }
}

impl Default for InMemoryTradeRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl TradeRepository for InMemoryTradeRepository {
    fn save(&self, trade: &Trade) -> Result<(), EngineError> {
        self.trades.insert(trade.id.clone(), trade.clone());
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Option<Trade> {
        self.trades.get(id).map(|t| t.clone())
    }

    fn list_all(&self) -> Vec<Trade> {
        self.trades.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Security, Side};

    #[test]
    fn test_order_repository_round_trip() {
        let repo = InMemoryOrderRepository::new();
        let order = Order::market("1", Security::new("AAPL"), Side::Buy, 10, "SIM").unwrap();

        repo.save(&order).unwrap();
        assert_eq!(repo.find_by_id("1").unwrap().size, 10);
        assert!(repo.find_by_id("2").is_none());
        assert_eq!(repo.list_all().len(), 1);

        // Saving again overwrites
        let mut updated = order;
        updated.filled_quantity = 10;
        repo.save(&updated).unwrap();
        assert_eq!(repo.find_by_id("1").unwrap().filled_quantity, 10);
        assert_eq!(repo.list_all().len(), 1);
    }
}
