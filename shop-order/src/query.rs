use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use shop_core::Caller;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregator::{OrderAggregator, OrderView, PaymentView};
use crate::error::{OrderError, OrderResult};
use crate::models::{OrderStatus, PaymentStatus};
use crate::repository::{
    CounterKind, OrderFilter, OrderRepository, Page, PageRequest, PaymentFilter, PaymentStatusStats,
};

/// Paging bounds applied to every listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageLimits {
    pub default_size: u32,
    pub max_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self { default_size: 20, max_size: 100 }
    }
}

impl PageLimits {
    pub fn request(&self, page: Option<u32>, size: Option<u32>) -> PageRequest {
        let size = size.unwrap_or(self.default_size).min(self.max_size.max(1));
        PageRequest::new(page.unwrap_or(0), size)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListOrdersQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub counter: Option<CounterKind>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListPaymentsQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderCounters {
    pub active: u64,
    pub completed: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedSince {
    pub since: DateTime<Utc>,
    pub count: u64,
}

/// Read side of orders and payments. Every read is scoped through
/// `Caller::scope_user`.
pub struct OrderQueries {
    repo: Arc<dyn OrderRepository>,
    aggregator: OrderAggregator,
    limits: PageLimits,
}

impl OrderQueries {
    pub fn new(repo: Arc<dyn OrderRepository>, aggregator: OrderAggregator, limits: PageLimits) -> Self {
        Self { repo, aggregator, limits }
    }

    pub async fn get_order(&self, caller: &Caller, order_id: Uuid) -> OrderResult<OrderView> {
        let order = self
            .repo
            .find_order(order_id)
            .await?
            .filter(|o| caller.scope_user(Some(o.user_id)) == Some(o.user_id))
            .ok_or_else(|| OrderError::not_found("Order not found"))?;

        Ok(self.aggregator.order_view(order).await)
    }

    pub async fn list_orders(&self, caller: &Caller, query: ListOrdersQuery) -> OrderResult<Page<OrderView>> {
        let mut filter = OrderFilter::new()
            .for_user(caller.scope_user(query.user_id))
            .with_status(query.status)
            .created_between(query.created_from, query.created_to);
        if let Some(kind) = query.counter {
            filter = filter.counting(kind);
        }

        let page = self
            .repo
            .list_orders(&filter, self.limits.request(query.page, query.size))
            .await?;

        let Page { items, page, size, total } = page;
        Ok(Page {
            items: self.aggregator.order_views(items).await,
            page,
            size,
            total,
        })
    }

    /// Two separate counts with the same predicate. Not a snapshot: writes
    /// landing between them are seen by one count only.
    pub async fn counters(&self, caller: &Caller, query: ListOrdersQuery) -> OrderResult<OrderCounters> {
        let filter = OrderFilter::new()
            .for_user(caller.scope_user(query.user_id))
            .with_status(query.status)
            .created_between(query.created_from, query.created_to);

        let active = self
            .repo
            .count_orders(&filter.clone().counting(CounterKind::Active))
            .await?;
        let completed = self
            .repo
            .count_orders(&filter.counting(CounterKind::Completed))
            .await?;

        Ok(OrderCounters { active, completed })
    }

    pub async fn list_payments(
        &self,
        caller: &Caller,
        query: ListPaymentsQuery,
    ) -> OrderResult<Page<PaymentView>> {
        let filter = PaymentFilter::new()
            .for_user(caller.scope_user(query.user_id))
            .with_status(query.status)
            .created_between(query.created_from, query.created_to);

        let Page { items, page, size, total } = self
            .repo
            .list_payments(&filter, self.limits.request(query.page, query.size))
            .await?;

        Ok(Page {
            items: self.aggregator.payment_views(items).await,
            page,
            size,
            total,
        })
    }

    /// Per-status payment count and sum. Without an explicit user the
    /// caller's own stats are returned.
    pub async fn payment_user_stats(
        &self,
        caller: &Caller,
        user_id: Option<Uuid>,
    ) -> OrderResult<Vec<PaymentStatusStats>> {
        let user_id = caller
            .scope_user(user_id)
            .unwrap_or(caller.user_id);
        self.repo.payment_user_stats(user_id).await
    }

    /// Service-wide counts, so only privileged callers get them.
    pub async fn collect_order_stats(&self, caller: &Caller) -> OrderResult<CreatedSince> {
        ensure_privileged(caller)?;
        let since = local_midnight();
        let count = self
            .repo
            .count_orders(&OrderFilter::new().created_between(Some(since), None))
            .await?;
        Ok(CreatedSince { since, count })
    }

    pub async fn collect_payment_stats(&self, caller: &Caller) -> OrderResult<CreatedSince> {
        ensure_privileged(caller)?;
        let since = local_midnight();
        let count = self
            .repo
            .count_payments(&PaymentFilter::new().created_between(Some(since), None))
            .await?;
        Ok(CreatedSince { since, count })
    }
}

fn ensure_privileged(caller: &Caller) -> OrderResult<()> {
    if !caller.is_privileged() {
        return Err(OrderError::Forbidden(format!(
            "role {} may not read service-wide stats",
            caller.role
        )));
    }
    Ok(())
}

/// Start of the current day in the server's local time zone.
fn local_midnight() -> DateTime<Utc> {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .unwrap_or(now)
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCollaborators, InMemoryOrderRepository};
    use crate::models::Order;
    use chrono::Duration;

    struct Fixture {
        repo: Arc<InMemoryOrderRepository>,
        queries: OrderQueries,
        alice: Uuid,
        bob: Uuid,
    }

    async fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        for (user, status) in [
            (alice, OrderStatus::Created),
            (alice, OrderStatus::Received),
            (alice, OrderStatus::Paid),
            (bob, OrderStatus::Received),
        ] {
            let mut order = Order::new(user, Uuid::new_v4(), &[(Uuid::new_v4(), 1)], 10);
            order.status = status;
            if status != OrderStatus::Created {
                order.payment.status = PaymentStatus::Approved;
            }
            repo.insert(order).await;
        }

        let queries = OrderQueries::new(
            repo.clone(),
            OrderAggregator::new(InMemoryCollaborators::new().collaborators()),
            PageLimits { default_size: 2, max_size: 3 },
        );
        Fixture { repo, queries, alice, bob }
    }

    #[tokio::test]
    async fn test_user_only_sees_own_orders() {
        let f = fixture().await;

        let page = f
            .queries
            .list_orders(
                &Caller::user(f.alice),
                ListOrdersQuery { user_id: Some(f.bob), size: Some(10), ..Default::default() },
            )
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.size, 3);
        assert!(page.items.iter().all(|o| o.user_id == f.alice));
    }

    #[tokio::test]
    async fn test_admin_filters_by_any_user() {
        let f = fixture().await;
        let admin = Caller::admin(Uuid::new_v4());

        let all = f.queries.list_orders(&admin, ListOrdersQuery::default()).await.unwrap();
        assert_eq!(all.total, 4);
        assert_eq!(all.items.len(), 2);

        let bobs = f
            .queries
            .list_orders(&admin, ListOrdersQuery { user_id: Some(f.bob), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(bobs.total, 1);
    }

    #[tokio::test]
    async fn test_get_order_of_someone_else_is_not_found() {
        let f = fixture().await;
        let bobs = f
            .repo
            .list_orders(&OrderFilter::new().for_user(Some(f.bob)), PageRequest::default())
            .await
            .unwrap()
            .items
            .remove(0);

        let err = f.queries.get_order(&Caller::user(f.alice), bobs.id).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound(_)));

        let view = f.queries.get_order(&Caller::service(Uuid::new_v4()), bobs.id).await.unwrap();
        assert_eq!(view.id, bobs.id);
        // product lookup found nothing, so the line renders with the fallback quantity
        assert_eq!(view.lines[0].amount, 1);
        assert!(view.lines[0].product.is_none());
    }

    #[tokio::test]
    async fn test_counters_partition_the_total() {
        let f = fixture().await;
        let admin = Caller::admin(Uuid::new_v4());

        let counters = f.queries.counters(&admin, ListOrdersQuery::default()).await.unwrap();
        let total = f.repo.count_orders(&OrderFilter::new()).await.unwrap();

        assert_eq!(counters.active, 2);
        assert_eq!(counters.completed, 2);
        assert_eq!(counters.active + counters.completed, total);

        let own = f.queries.counters(&Caller::user(f.bob), ListOrdersQuery::default()).await.unwrap();
        assert_eq!(own, OrderCounters { active: 0, completed: 1 });
    }

    #[tokio::test]
    async fn test_payment_listing_and_stats() {
        let f = fixture().await;
        let alice = Caller::user(f.alice);

        let approved = f
            .queries
            .list_payments(
                &alice,
                ListPaymentsQuery { status: Some(PaymentStatus::Approved), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(approved.total, 2);

        // a plain user asking for someone else still gets their own stats
        let stats = f.queries.payment_user_stats(&alice, Some(f.bob)).await.unwrap();
        let approved = stats.iter().find(|s| s.status == PaymentStatus::Approved).unwrap();
        assert_eq!(approved.count, 2);
        assert_eq!(approved.sum, 20);
        let created = stats.iter().find(|s| s.status == PaymentStatus::Created).unwrap();
        assert_eq!(created.count, 1);
    }

    #[tokio::test]
    async fn test_daily_stats_count_todays_rows() {
        let f = fixture().await;
        let mut old = Order::new(f.alice, Uuid::new_v4(), &[], 5);
        old.created_at = Utc::now() - Duration::days(3);
        old.payment.created_at = old.created_at;
        f.repo.insert(old).await;

        let admin = Caller::admin(Uuid::new_v4());
        let orders = f.queries.collect_order_stats(&admin).await.unwrap();
        let payments = f.queries.collect_payment_stats(&admin).await.unwrap();

        assert!(orders.since <= Utc::now());
        assert_eq!(orders.count, 4);
        assert_eq!(payments.count, 4);
    }

    #[tokio::test]
    async fn test_daily_stats_are_privileged() {
        let f = fixture().await;
        let user = Caller::user(f.alice);

        assert!(matches!(
            f.queries.collect_order_stats(&user).await,
            Err(OrderError::Forbidden(_))
        ));
        assert!(matches!(
            f.queries.collect_payment_stats(&user).await,
            Err(OrderError::Forbidden(_))
        ));
        assert!(f.queries.collect_order_stats(&Caller::service(Uuid::new_v4())).await.is_ok());
    }

    #[test]
    fn test_page_limits_clamp_size() {
        let limits = PageLimits { default_size: 20, max_size: 50 };

        assert_eq!(limits.request(None, None), PageRequest::new(0, 20));
        assert_eq!(limits.request(Some(3), Some(500)), PageRequest::new(3, 50));
        assert_eq!(limits.request(None, Some(0)).size, 1);
    }
}
