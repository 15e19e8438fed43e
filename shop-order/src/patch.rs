use serde::{Deserialize, Serialize};
use shop_core::Caller;
use shop_shared::models::events::{OrderPatchedEvent, StatusChange};
use shop_shared::Notification;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregator::{OrderAggregator, OrderView};
use crate::error::{OrderError, OrderResult};
use crate::models::{OrderStatus, PaymentStatus};
use crate::notifications::NotificationSink;
use crate::repository::OrderRepository;
use crate::status::{validate_order_transition, validate_payment_transition, TransitionPolicy};

/// Partial update of an order. Only the two status fields are patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderPatch {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.payment_status.is_none()
    }
}

pub struct OrderPatcher {
    repo: Arc<dyn OrderRepository>,
    aggregator: OrderAggregator,
    sink: NotificationSink,
    policy: TransitionPolicy,
}

impl OrderPatcher {
    pub fn new(
        repo: Arc<dyn OrderRepository>,
        aggregator: OrderAggregator,
        sink: NotificationSink,
        policy: TransitionPolicy,
    ) -> Self {
        Self { repo, aggregator, sink, policy }
    }

    pub async fn patch_order(&self, caller: &Caller, order_id: Uuid, patch: OrderPatch) -> OrderResult<OrderView> {
        if !caller.is_privileged() {
            return Err(OrderError::Forbidden(format!(
                "role {} may not patch orders",
                caller.role
            )));
        }
        if patch.is_empty() {
            return Err(OrderError::Validation("patch changes nothing".to_string()));
        }

        let mut order = self
            .repo
            .find_order(order_id)
            .await?
            .ok_or_else(|| OrderError::not_found("Order not found"))?;

        // validate both before touching either
        if let Some(next) = patch.status {
            validate_order_transition(order.status, next, self.policy)?;
        }
        if let Some(next) = patch.payment_status {
            validate_payment_transition(order.payment.status, next, self.policy)?;
        }

        let order_change = patch.status.filter(|next| *next != order.status).map(|next| {
            let change = StatusChange {
                from: order.status.to_string(),
                to: next.to_string(),
            };
            order.update_status(next);
            change
        });
        let payment_change = patch
            .payment_status
            .filter(|next| *next != order.payment.status)
            .map(|next| {
                let change = StatusChange {
                    from: order.payment.status.to_string(),
                    to: next.to_string(),
                };
                order.payment.update_status(next);
                change
            });

        if order_change.is_none() && payment_change.is_none() {
            tracing::debug!("Patch of order {} is a no-op", order.id);
            return Ok(self.aggregator.order_view(order).await);
        }

        self.repo.save_order(&order).await?;

        tracing::info!(
            "Order {} patched by {} ({}): status {:?}, payment {:?}",
            order.id,
            caller.user_id,
            caller.role,
            order_change.as_ref().map(|c| &c.to),
            payment_change.as_ref().map(|c| &c.to)
        );
        self.sink.publish(Notification::OrderPatched(OrderPatchedEvent {
            order_id: order.id,
            user_id: order.user_id,
            actor_id: caller.user_id,
            order_status: order_change,
            payment_status: payment_change,
            timestamp: order.updated_at.timestamp(),
        }));

        Ok(self.aggregator.order_view(order).await)
    }
}
