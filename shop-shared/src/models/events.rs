use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub sum: i64,
    pub line_count: usize,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct OrderPaidEvent {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub sum: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct OrderPatchedEvent {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub actor_id: Uuid,
    pub order_status: Option<StatusChange>,
    pub payment_status: Option<StatusChange>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct StatusChange {
    pub from: String,
    pub to: String,
}

/// Emitted when a creation run aborted after inventory had already been decremented.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct CreationCompensatedEvent {
    pub compensation_id: Uuid,
    pub user_id: Uuid,
    pub restored: bool,
    pub lost_basket_ids: Vec<Uuid>,
    pub reason: String,
    pub timestamp: i64,
}

/// Everything that travels over the notification side channel.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    OrderCreated(OrderCreatedEvent),
    OrderPaid(OrderPaidEvent),
    OrderPatched(OrderPatchedEvent),
    CreationCompensated(CreationCompensatedEvent),
}

impl Notification {
    /// Partition key used when the notification is relayed to Kafka.
    pub fn key(&self) -> String {
        match self {
            Notification::OrderCreated(e) => e.order_id.to_string(),
            Notification::OrderPaid(e) => e.order_id.to_string(),
            Notification::OrderPatched(e) => e.order_id.to_string(),
            Notification::CreationCompensated(e) => e.compensation_id.to_string(),
        }
    }

    /// Owner of the order (or of the aborted run) the notification is about.
    pub fn user_id(&self) -> Uuid {
        match self {
            Notification::OrderCreated(e) => e.user_id,
            Notification::OrderPaid(e) => e.user_id,
            Notification::OrderPatched(e) => e.user_id,
            Notification::CreationCompensated(e) => e.user_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::OrderCreated(_) => "order_created",
            Notification::OrderPaid(_) => "order_paid",
            Notification::OrderPatched(_) => "order_patched",
            Notification::CreationCompensated(_) => "creation_compensated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_is_tagged() {
        let event = Notification::OrderPaid(OrderPaidEvent {
            order_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            sum: 21,
            timestamp: 0,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ORDER_PAID");
        assert_eq!(json["sum"], 21);
        assert_eq!(event.kind(), "order_paid");
        assert_eq!(event.key(), json["order_id"].as_str().unwrap());
    }
}
