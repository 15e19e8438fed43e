use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::models::{OrderStatus, PaymentStatus};

/// How the generic patch path treats status assignments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Any assignment is accepted, no adjacency check.
    Permissive,
    /// Only transitions listed in the adjacency tables are accepted.
    #[default]
    Strict,
}

impl OrderStatus {
    /// Adjacency table of the order lifecycle.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Paid)
                | (Created, Accepted)
                | (Created, Rejected)
                | (Paid, Accepted)
                | (Paid, Rejected)
                | (Accepted, Delivery)
                | (Accepted, Rejected)
                | (Delivery, Delivered)
                | (Delivered, Received)
        )
    }

    pub fn is_terminal(&self) -> bool {
        OrderStatus::ALL.iter().all(|next| !self.can_transition_to(*next))
    }

    /// Settlement refuses orders that were already paid or handed over.
    pub fn is_settled(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Received)
    }
}

impl PaymentStatus {
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Created, Approved) | (Created, Rejected) | (Approved, Rejected)
        )
    }
}

/// Re-assigning the current status is always allowed; it changes nothing.
pub fn validate_order_transition(
    from: OrderStatus,
    to: OrderStatus,
    policy: TransitionPolicy,
) -> Result<(), OrderError> {
    if from == to || policy == TransitionPolicy::Permissive || from.can_transition_to(to) {
        return Ok(());
    }
    Err(OrderError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    })
}

pub fn validate_payment_transition(
    from: PaymentStatus,
    to: PaymentStatus,
    policy: TransitionPolicy,
) -> Result<(), OrderError> {
    if from == to || policy == TransitionPolicy::Permissive || from.can_transition_to(to) {
        return Ok(());
    }
    Err(OrderError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    })
}

/// The one guard that holds regardless of policy.
pub fn ensure_settleable(status: OrderStatus) -> Result<(), OrderError> {
    if status.is_settled() {
        return Err(OrderError::unprocessable("Order status conflict"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_lifecycle_is_allowed() {
        use OrderStatus::*;
        let path = [Created, Paid, Accepted, Delivery, Delivered, Received];

        for pair in path.windows(2) {
            assert!(
                validate_order_transition(pair[0], pair[1], TransitionPolicy::Strict).is_ok(),
                "{} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_strict_rejects_skips_and_reversals() {
        use OrderStatus::*;

        assert!(matches!(
            validate_order_transition(Created, Delivered, TransitionPolicy::Strict),
            Err(OrderError::InvalidTransition { .. })
        ));
        assert!(validate_order_transition(Received, Created, TransitionPolicy::Strict).is_err());
        assert!(validate_order_transition(Rejected, Paid, TransitionPolicy::Strict).is_err());
    }

    #[test]
    fn test_permissive_accepts_anything() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert!(validate_order_transition(from, to, TransitionPolicy::Permissive).is_ok());
            }
        }
        assert!(validate_payment_transition(
            PaymentStatus::Rejected,
            PaymentStatus::Created,
            TransitionPolicy::Permissive
        )
        .is_ok());
    }

    #[test]
    fn test_same_status_is_a_no_op() {
        assert!(validate_order_transition(
            OrderStatus::Received,
            OrderStatus::Received,
            TransitionPolicy::Strict
        )
        .is_ok());
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Received.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Created.is_terminal());
    }

    #[test]
    fn test_payment_table() {
        use PaymentStatus::*;
        assert!(validate_payment_transition(Created, Approved, TransitionPolicy::Strict).is_ok());
        assert!(validate_payment_transition(Approved, Rejected, TransitionPolicy::Strict).is_ok());
        assert!(validate_payment_transition(Rejected, Approved, TransitionPolicy::Strict).is_err());
        assert!(validate_payment_transition(Approved, Created, TransitionPolicy::Strict).is_err());
    }

    #[test]
    fn test_settlement_guard() {
        assert!(ensure_settleable(OrderStatus::Created).is_ok());
        assert!(ensure_settleable(OrderStatus::Delivery).is_ok());
        let err = ensure_settleable(OrderStatus::Paid).unwrap_err();
        assert_eq!(err.to_string(), "Order status conflict");
        assert!(ensure_settleable(OrderStatus::Received).is_err());
    }
}
