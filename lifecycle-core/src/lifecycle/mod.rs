//! Order status state machine
//!
//! `PendingNew -> New -> {PartiallyFilled <-> New} -> Filled`, with `New` and
//! `PartiallyFilled` also reaching `PendingCancel -> Cancelled`,
//! `PendingReplace -> Replaced`, or directly `Rejected` / `Expired`.
//!
//! `apply` is pure with respect to everything but the order passed in: it
//! mutates the order's status and quantities and returns the new status, or
//! fails without touching the order. Callers persist and broadcast; they also
//! own the single-writer discipline per order id.

use crate::domain::{now_millis, EngineError, Fill, Order, OrderStatus};

/// Events an execution source can deliver for one order.
#[derive(Clone, Debug)]
pub enum OrderEvent {
    AcceptedNew { broker_order_id: Option<String> },
    Fill(Fill),
    CancelRequested,
    CancelConfirmed,
    ReplaceRequested,
    ReplaceConfirmed,
    Rejected { reason: String },
    Expired,
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::AcceptedNew { .. } => "AcceptedNew",
            OrderEvent::Fill(_) => "Fill",
            OrderEvent::CancelRequested => "CancelRequested",
            OrderEvent::CancelConfirmed => "CancelConfirmed",
            OrderEvent::ReplaceRequested => "ReplaceRequested",
            OrderEvent::ReplaceConfirmed => "ReplaceConfirmed",
            OrderEvent::Rejected { .. } => "Rejected",
            OrderEvent::Expired => "Expired",
        }
    }
}

/// Apply one event to an order, returning the new status.
///
/// Illegal events fail with `InvalidTransition` and leave the order
/// untouched; a fill whose quantities do not reconcile with the order size
/// fails with `InvariantViolated`.
pub fn apply(order: &mut Order, event: OrderEvent) -> Result<OrderStatus, EngineError> {
    use OrderStatus::*;

    let next = match (&order.status, &event) {
        (PendingNew, OrderEvent::AcceptedNew { broker_order_id }) => {
            if broker_order_id.is_some() {
                order.broker_order_id = broker_order_id.clone();
            }
            New
        }
        (PendingNew | New | PartiallyFilled, OrderEvent::Rejected { reason }) => {
            order.remarks = reason.clone();
            Rejected
        }
        (PendingNew | New | PartiallyFilled, OrderEvent::Expired) => Expired,
        (New | PartiallyFilled, OrderEvent::Fill(fill)) => {
            fill.check_against(order)?;
            order.filled_quantity = fill.cumulative_quantity;
            order.leaves_quantity = fill.leaves_quantity;
            if fill.leaves_quantity == 0 {
                Filled
            } else {
                PartiallyFilled
            }
        }
        (New | PartiallyFilled, OrderEvent::CancelRequested) => PendingCancel,
        (PendingCancel, OrderEvent::CancelConfirmed) => Cancelled,
        (New | PartiallyFilled, OrderEvent::ReplaceRequested) => PendingReplace,
        (PendingReplace, OrderEvent::ReplaceConfirmed) => Replaced,
        (from, ev) => {
            return Err(EngineError::InvalidTransition {
                from: from.to_string(),
                event: ev.name().to_string(),
            })
        }
    };

    order.status = next.clone();
    order.updated_time = now_millis();
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionType, Security, Side};

    fn order(size: u64) -> Order {
        Order::market("1", Security::new("AAPL"), Side::Buy, size, "SIM").unwrap()
    }

    fn fill(order: &Order, size: u64, cum: u64, leaves: u64) -> Fill {
        Fill {
            execution_id: format!("E{}", cum),
            order_id: order.id.clone(),
            security: order.security.clone(),
            provider: order.provider.clone(),
            side: order.side,
            price: 50.0,
            size,
            leaves_quantity: leaves,
            cumulative_quantity: cum,
            execution_type: if leaves == 0 {
                ExecutionType::Full
            } else {
                ExecutionType::Partial
            },
            timestamp: 1,
        }
    }

    #[test]
    fn test_accept_then_fill_to_completion() {
        let mut o = order(10);
        assert_eq!(
            apply(&mut o, OrderEvent::AcceptedNew { broker_order_id: Some("B1".into()) }).unwrap(),
            OrderStatus::New
        );
        assert_eq!(o.broker_order_id.as_deref(), Some("B1"));

        let f = fill(&o, 4, 4, 6);
        assert_eq!(apply(&mut o, OrderEvent::Fill(f)).unwrap(), OrderStatus::PartiallyFilled);
        assert_eq!(o.filled_quantity, 4);
        assert_eq!(o.leaves_quantity, 6);

        let f = fill(&o, 6, 10, 0);
        assert_eq!(apply(&mut o, OrderEvent::Fill(f)).unwrap(), OrderStatus::Filled);
        assert_eq!(o.filled_quantity + o.leaves_quantity, o.size);
    }

    #[test]
    fn test_fill_after_cancel_is_invalid() {
        let mut o = order(10);
        apply(&mut o, OrderEvent::AcceptedNew { broker_order_id: None }).unwrap();
        apply(&mut o, OrderEvent::CancelRequested).unwrap();
        apply(&mut o, OrderEvent::CancelConfirmed).unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);

        let f = fill(&o, 10, 10, 0);
        let err = apply(&mut o, OrderEvent::Fill(f)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert_eq!(o.status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_cancel_after_fill_is_invalid() {
        let mut o = order(10);
        apply(&mut o, OrderEvent::AcceptedNew { broker_order_id: None }).unwrap();
        let f = fill(&o, 10, 10, 0);
        apply(&mut o, OrderEvent::Fill(f)).unwrap();

        let err = apply(&mut o, OrderEvent::CancelRequested).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert_eq!(o.status, OrderStatus::Filled);
    }

    #[test]
    fn test_fill_quantity_invariant_enforced() {
        let mut o = order(10);
        apply(&mut o, OrderEvent::AcceptedNew { broker_order_id: None }).unwrap();

        let mut f = fill(&o, 4, 4, 6);
        f.leaves_quantity = 5; // cum + leaves != size
        let err = apply(&mut o, OrderEvent::Fill(f)).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolated(_)));
        // Status and quantities untouched
        assert_eq!(o.status, OrderStatus::New);
        assert_eq!(o.filled_quantity, 0);
    }

    #[test]
    fn test_replace_flow() {
        let mut o = order(10);
        apply(&mut o, OrderEvent::AcceptedNew { broker_order_id: None }).unwrap();
        assert_eq!(apply(&mut o, OrderEvent::ReplaceRequested).unwrap(), OrderStatus::PendingReplace);
        assert_eq!(apply(&mut o, OrderEvent::ReplaceConfirmed).unwrap(), OrderStatus::Replaced);
        assert!(o.status.is_terminal());
    }

    #[test]
    fn test_reject_from_pending_new() {
        let mut o = order(10);
        apply(&mut o, OrderEvent::Rejected { reason: "no price".into() }).unwrap();
        assert_eq!(o.status, OrderStatus::Rejected);
        assert_eq!(o.remarks, "no price");
    }

    #[test]
    fn test_expire_partially_filled() {
        let mut o = order(10);
        apply(&mut o, OrderEvent::AcceptedNew { broker_order_id: None }).unwrap();
        let f = fill(&o, 3, 3, 7);
        apply(&mut o, OrderEvent::Fill(f)).unwrap();
        assert_eq!(apply(&mut o, OrderEvent::Expired).unwrap(), OrderStatus::Expired);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for terminal in [OrderStatus::Filled, OrderStatus::Cancelled, OrderStatus::Rejected] {
            let mut o = order(10);
            o.status = terminal;
            let err = apply(&mut o, OrderEvent::AcceptedNew { broker_order_id: None }).unwrap_err();
            assert!(matches!(err, EngineError::InvalidTransition { .. }));
        }
    }
}
