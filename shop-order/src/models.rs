use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Paid,
    Accepted,
    Rejected,
    Delivery,
    Delivered,
    Received,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Created,
        OrderStatus::Paid,
        OrderStatus::Accepted,
        OrderStatus::Rejected,
        OrderStatus::Delivery,
        OrderStatus::Delivered,
        OrderStatus::Received,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Delivery => "DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Received => "RECEIVED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Created,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 3] = [
        PaymentStatus::Created,
        PaymentStatus::Approved,
        PaymentStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "CREATED",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown payment status: {}", s))
    }
}

/// A customer's purchase. Always owns exactly one payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub payment: Payment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a fresh order together with its payment. `sum` is the frozen
    /// total of the price snapshot taken during creation.
    pub fn new(user_id: Uuid, address_id: Uuid, lines: &[(Uuid, i32)], sum: i64) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            user_id,
            address_id,
            status: OrderStatus::Created,
            lines: lines
                .iter()
                .map(|(product_id, amount)| OrderLine::new(id, *product_id, *amount))
                .collect(),
            payment: Payment::new(user_id, sum, now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

/// Persisted product/quantity pair of an order. Prices are not stored per
/// line; they only survive aggregated in `Payment::sum`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub amount: i32,
}

impl OrderLine {
    pub fn new(order_id: Uuid, product_id: Uuid, amount: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sum: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    fn new(user_id: Uuid, sum: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            sum,
            status: PaymentStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, new_status: PaymentStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_order_owns_one_created_payment() {
        let user = Uuid::new_v4();
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        let order = Order::new(user, Uuid::new_v4(), &[(x, 2), (y, 1)], 21);

        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.payment.status, PaymentStatus::Created);
        assert_eq!(order.payment.user_id, user);
        assert_eq!(order.payment.sum, 21);
        assert_eq!(order.lines.len(), 2);
        assert!(order.lines.iter().all(|l| l.order_id == order.id));
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert_eq!("approved".parse::<PaymentStatus>(), Ok(PaymentStatus::Approved));
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&OrderStatus::Delivered).unwrap();
        assert_eq!(json, "\"DELIVERED\"");
    }
}
