use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compensation::CompensationRecord;
use crate::error::OrderResult;
use crate::models::{Order, OrderStatus, Payment, PaymentStatus};

/// Local persistence of orders, their payments and lines. Every method is
/// transactional within this service's own store only.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts order, payment and lines in one transaction.
    async fn create_order(&self, order: &Order) -> OrderResult<()>;

    async fn find_order(&self, id: Uuid) -> OrderResult<Option<Order>>;

    /// Ownership-checked payment lookup.
    async fn find_payment(&self, payment_id: Uuid, user_id: Uuid) -> OrderResult<Option<Payment>>;

    async fn find_order_by_payment(
        &self,
        payment_id: Uuid,
        user_id: Uuid,
    ) -> OrderResult<Option<Order>>;

    /// Writes the order's status (cascading its payment).
    async fn save_order(&self, order: &Order) -> OrderResult<()>;

    /// Writes the order (cascading its payment) and then the payment again,
    /// in that order, inside one transaction.
    async fn save_settlement(&self, order: &Order, payment: &Payment) -> OrderResult<()>;

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> OrderResult<Page<Order>>;

    async fn count_orders(&self, filter: &OrderFilter) -> OrderResult<u64>;

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> OrderResult<Page<Payment>>;

    async fn count_payments(&self, filter: &PaymentFilter) -> OrderResult<u64>;

    async fn payment_user_stats(&self, user_id: Uuid) -> OrderResult<Vec<PaymentStatusStats>>;

    async fn record_compensation(&self, record: &CompensationRecord) -> OrderResult<()>;
}

/// `active` = anything not yet received, `completed` = received.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    Active,
    Completed,
}

/// Which orders a read should see. Backends translate it
/// into their own query language; `matches` is the reference predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub counter: Option<CounterKind>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_status(mut self, status: Option<OrderStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn counting(mut self, kind: CounterKind) -> Self {
        self.counter = Some(kind);
        self
    }

    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        if self.user_id.is_some_and(|u| u != order.user_id) {
            return false;
        }
        if self.status.is_some_and(|s| s != order.status) {
            return false;
        }
        match self.counter {
            Some(CounterKind::Active) if order.status == OrderStatus::Received => return false,
            Some(CounterKind::Completed) if order.status != OrderStatus::Received => return false,
            _ => {}
        }
        in_range(order.created_at, self.created_from, self.created_to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl PaymentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_status(mut self, status: Option<PaymentStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    pub fn matches(&self, payment: &Payment) -> bool {
        if self.user_id.is_some_and(|u| u != payment.user_id) {
            return false;
        }
        if self.status.is_some_and(|s| s != payment.status) {
            return false;
        }
        in_range(payment.created_at, self.created_from, self.created_to)
    }
}

fn in_range(at: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |f| at >= f) && to.map_or(true, |t| at < t)
}

/// Zero-based page request; results are ordered newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size: size.max(1) }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentStatusStats {
    pub status: PaymentStatus,
    pub count: u64,
    pub sum: i64,
}
