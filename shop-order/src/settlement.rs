use shop_core::Caller;
use shop_shared::models::events::OrderPaidEvent;
use shop_shared::Notification;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregator::{OrderAggregator, OrderView};
use crate::error::{OrderError, OrderResult};
use crate::models::{OrderStatus, PaymentStatus};
use crate::notifications::NotificationSink;
use crate::repository::OrderRepository;
use crate::status::ensure_settleable;

/// Approves payments. Settlement only ever moves an order forward to `PAID`
/// and refuses orders that are already settled, whatever the patch policy.
pub struct PaymentSettlement {
    repo: Arc<dyn OrderRepository>,
    aggregator: OrderAggregator,
    sink: NotificationSink,
}

impl PaymentSettlement {
    pub fn new(repo: Arc<dyn OrderRepository>, aggregator: OrderAggregator, sink: NotificationSink) -> Self {
        Self { repo, aggregator, sink }
    }

    pub async fn set_as_paid(&self, caller: &Caller, payment_id: Uuid) -> OrderResult<OrderView> {
        let mut payment = self
            .repo
            .find_payment(payment_id, caller.user_id)
            .await?
            .ok_or_else(|| OrderError::not_found("Payment not found"))?;

        let mut order = self
            .repo
            .find_order_by_payment(payment_id, caller.user_id)
            .await?
            .ok_or_else(|| OrderError::not_found("Order not found"))?;

        if let Err(e) = ensure_settleable(order.status) {
            tracing::warn!("Refusing to settle payment {}: order {} is {}", payment_id, order.id, order.status);
            return Err(e);
        }

        payment.update_status(PaymentStatus::Approved);
        order.update_status(OrderStatus::Paid);
        order.payment = payment.clone();

        self.repo.save_settlement(&order, &payment).await?;

        tracing::info!("Payment {} approved, order {} is now PAID", payment.id, order.id);
        self.sink.publish(Notification::OrderPaid(OrderPaidEvent {
            order_id: order.id,
            payment_id: payment.id,
            user_id: order.user_id,
            sum: payment.sum,
            timestamp: payment.updated_at.timestamp(),
        }));

        Ok(self.aggregator.order_view(order).await)
    }
}
