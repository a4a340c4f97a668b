//! Order model and status set

use super::errors::EngineError;
use super::types::{now_millis, OrderType, Security, Side, TimeInForce};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    PendingNew,
    New,
    PartiallyFilled,
    Filled,
    PendingCancel,
    Cancelled,
    PendingReplace,
    Replaced,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Terminal statuses accept no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Replaced
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Order structure
///
/// The id is caller-assigned and unique per execution provider; the broker
/// order id is stamped once the provider accepts the order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub broker_order_id: Option<String>,
    pub security: Security,
    pub side: Side,
    pub size: u64,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub currency: String,
    pub provider: String,
    pub group_id: String,
    pub status: OrderStatus,
    pub remarks: String,
    pub filled_quantity: u64,
    pub leaves_quantity: u64,
    pub created_time: u64,
    pub updated_time: u64,
}

impl Order {
    pub fn market(
        id: impl Into<String>,
        security: Security,
        side: Side,
        size: u64,
        provider: impl Into<String>,
    ) -> Result<Self, EngineError> {
        Self::new(id, security, side, size, OrderType::Market, provider)
    }

    pub fn limit(
        id: impl Into<String>,
        security: Security,
        side: Side,
        size: u64,
        price: f64,
        provider: impl Into<String>,
    ) -> Result<Self, EngineError> {
        Self::new(id, security, side, size, OrderType::Limit { price }, provider)
    }

    fn new(
        id: impl Into<String>,
        security: Security,
        side: Side,
        size: u64,
        order_type: OrderType,
        provider: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let now = now_millis();
        let order = Self {
            id: id.into(),
            broker_order_id: None,
            security,
            side,
            size,
            order_type,
            time_in_force: TimeInForce::GTC,
            currency: "USD".to_string(),
            provider: provider.into(),
            group_id: String::new(),
            status: OrderStatus::PendingNew,
            remarks: String::new(),
            filled_quantity: 0,
            leaves_quantity: size,
            created_time: now,
            updated_time: now,
        };
        order.validate()?;
        Ok(order)
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Re-check the construction invariants; orders can arrive from outside
    /// the constructors (deserialized, built by adapters).
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.is_empty() {
            return Err(EngineError::InvalidArgument("order id is empty".into()));
        }
        if !self.security.validate() {
            return Err(EngineError::InvalidArgument(format!(
                "invalid security '{}'",
                self.security
            )));
        }
        if self.size == 0 {
            return Err(EngineError::InvalidArgument(format!(
                "order {} has non-positive size",
                self.id
            )));
        }
        if let OrderType::Limit { price } = self.order_type {
            if !price.is_finite() || price <= 0.0 {
                return Err(EngineError::InvalidArgument(format!(
                    "order {} has non-positive limit price {}",
                    self.id, price
                )));
            }
        }
        Ok(())
    }

    pub fn limit_price(&self) -> Option<f64> {
        match self.order_type {
            OrderType::Limit { price } => Some(price),
            OrderType::Market => None,
        }
    }

    /// GTD orders expire once the session clock passes their expiry.
    pub fn is_expired(&self, now: u64) -> bool {
        match self.time_in_force {
            TimeInForce::GTD(expiry) => now > expiry,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_order_construction() {
        let order = Order::market("1", Security::new("AAPL"), Side::Buy, 40, "SIM").unwrap();
        assert_eq!(order.status, OrderStatus::PendingNew);
        assert_eq!(order.leaves_quantity, 40);
        assert_eq!(order.filled_quantity, 0);
        assert!(order.broker_order_id.is_none());
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = Order::market("1", Security::new("AAPL"), Side::Buy, 0, "SIM").unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_non_positive_limit_price_rejected() {
        let err =
            Order::limit("1", Security::new("AAPL"), Side::Sell, 10, 0.0, "SIM").unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));

        let err =
            Order::limit("1", Security::new("AAPL"), Side::Sell, 10, f64::NAN, "SIM").unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_empty_security_rejected() {
        let err = Order::market("1", Security::new(""), Side::Buy, 1, "SIM").unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_gtd_expiry() {
        let order = Order::market("1", Security::new("AAPL"), Side::Buy, 1, "SIM")
            .unwrap()
            .with_time_in_force(TimeInForce::GTD(1_000));
        assert!(!order.is_expired(999));
        assert!(order.is_expired(1_001));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::PendingCancel.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }
}
