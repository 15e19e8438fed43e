use serde::{Deserialize, Serialize};
use shop_catalog::{check_stock, BalancePatch, PriceSnapshot, Product, StockError, StockRequest};
use shop_core::{Address, Basket, Caller, Collaborators, DeleteBasketsRequest};
use shop_shared::models::events::{CreationCompensatedEvent, OrderCreatedEvent};
use shop_shared::Notification;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregator::{OrderAggregator, OrderView};
use crate::compensation::{AppliedStep, CompensationLog, CompensationOutcome};
use crate::error::{OrderError, OrderResult};
use crate::models::Order;
use crate::notifications::NotificationSink;
use crate::repository::OrderRepository;
use crate::rules::OrderRules;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateOrderCommand {
    pub basket_ids: Vec<Uuid>,
    pub address_id: Uuid,
}

/// Turns basket lines into an order.
///
/// The steps run strictly one after another because each one feeds the
/// next: resolve address, resolve owned basket lines, validate stock, price,
/// decrement inventory, delete basket lines, persist. Only the final
/// enrichment fans out.
pub struct OrderOrchestrator {
    collaborators: Collaborators,
    repo: Arc<dyn OrderRepository>,
    aggregator: OrderAggregator,
    sink: NotificationSink,
    rules: OrderRules,
}

impl OrderOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        repo: Arc<dyn OrderRepository>,
        sink: NotificationSink,
        rules: OrderRules,
    ) -> Self {
        Self {
            aggregator: OrderAggregator::new(collaborators.clone()),
            collaborators,
            repo,
            sink,
            rules,
        }
    }

    pub async fn create_order(
        &self,
        caller: &Caller,
        command: CreateOrderCommand,
    ) -> OrderResult<OrderView> {
        if command.basket_ids.is_empty() {
            return Err(OrderError::Validation("basket_ids must not be empty".to_string()));
        }

        let address = self.resolve_address(caller, command.address_id).await?;
        let baskets = self.resolve_baskets(caller, &command.basket_ids).await?;
        let products = self.product_snapshot(&baskets).await?;

        let requests: Vec<StockRequest> = baskets
            .iter()
            .map(|b| StockRequest {
                product_id: b.product_id,
                quantity: b.amount,
            })
            .collect();
        let demand = check_stock(&requests, &products).map_err(stock_error)?;

        let mut prices = PriceSnapshot::new();
        for basket in &baskets {
            if let Some(product) = products.get(&basket.product_id) {
                prices.add(product, basket.amount);
            }
        }
        let sum = prices.total();

        let decrement = BalancePatch::decrement(&demand, &products).map_err(stock_error)?;
        self.collaborators
            .inventory
            .batch_patch_products(&decrement)
            .await
            .map_err(|e| {
                tracing::error!("Inventory decrement rejected for user {}: {}", caller.user_id, e);
                OrderError::Unprocessable(e.to_string())
            })?;

        let mut applied = CompensationLog::new();
        applied.record(AppliedStep::InventoryDecremented { demand });

        let basket_ids: Vec<Uuid> = baskets.iter().map(|b| b.id).collect();
        let delete = DeleteBasketsRequest {
            basket_ids: basket_ids.clone(),
            user_id: caller.user_id,
        };
        if let Err(e) = self.collaborators.baskets.delete_baskets(&delete).await {
            let err = OrderError::Unprocessable(e.to_string());
            return Err(self.abort(caller, applied, err).await);
        }
        applied.record(AppliedStep::BasketsDeleted { basket_ids });

        let lines: Vec<(Uuid, i32)> = baskets.iter().map(|b| (b.product_id, b.amount)).collect();
        let order = Order::new(caller.user_id, address.id, &lines, sum);
        if let Err(e) = self.repo.create_order(&order).await {
            return Err(self.abort(caller, applied, e).await);
        }

        tracing::info!(
            "Order {} created for user {}: {} lines, sum {}",
            order.id,
            order.user_id,
            order.lines.len(),
            sum
        );
        self.sink.publish(Notification::OrderCreated(OrderCreatedEvent {
            order_id: order.id,
            payment_id: order.payment.id,
            user_id: order.user_id,
            address_id: order.address_id,
            sum,
            line_count: order.lines.len(),
            timestamp: order.created_at.timestamp(),
        }));

        Ok(self.aggregator.order_view(order).await)
    }

    async fn resolve_address(&self, caller: &Caller, address_id: Uuid) -> OrderResult<Address> {
        let addresses = self.collaborators.addresses.get_addresses(caller.user_id).await?;
        if addresses.is_empty() {
            return Err(OrderError::unprocessable("User not have any address"));
        }
        addresses
            .into_iter()
            .find(|a| a.id == address_id)
            .ok_or_else(|| OrderError::not_found("Address not found"))
    }

    async fn resolve_baskets(&self, caller: &Caller, basket_ids: &[Uuid]) -> OrderResult<Vec<Basket>> {
        let baskets: Vec<Basket> = self
            .collaborators
            .baskets
            .get_baskets_by_ids(basket_ids, caller.user_id)
            .await?
            .into_iter()
            .filter(|b| b.user_id == caller.user_id)
            .collect();

        if baskets.is_empty() {
            return Err(OrderError::not_found("Basket not found"));
        }
        Ok(baskets)
    }

    /// Products keyed by id, taken from the snapshots carried on the basket
    /// lines; lines without one are resolved in a single inventory call.
    async fn product_snapshot(&self, baskets: &[Basket]) -> OrderResult<HashMap<Uuid, Product>> {
        let mut products = HashMap::new();
        let mut missing = Vec::new();
        for basket in baskets {
            match &basket.product {
                Some(product) => {
                    products.insert(basket.product_id, product.clone());
                }
                None => missing.push(basket.product_id),
            }
        }

        missing.sort();
        missing.dedup();
        missing.retain(|id| !products.contains_key(id));
        if !missing.is_empty() {
            for product in self.collaborators.inventory.get_products_by_ids(&missing).await? {
                products.insert(product.id, product);
            }
        }
        Ok(products)
    }

    /// Unwinds remote side effects of a failed run and returns the original error.
    async fn abort(&self, caller: &Caller, applied: CompensationLog, err: OrderError) -> OrderError {
        tracing::error!("Order creation for user {} aborted: {}", caller.user_id, err);

        let reason = err.to_string();
        let record = applied
            .unwind(
                caller.user_id,
                self.collaborators.inventory.as_ref(),
                self.rules.compensate_inventory,
                &reason,
            )
            .await;

        if let Some(record) = record {
            if let Err(e) = self.repo.record_compensation(&record).await {
                tracing::error!("Failed to record compensation {}: {}", record.id, e);
            }
            self.sink.publish(Notification::CreationCompensated(CreationCompensatedEvent {
                compensation_id: record.id,
                user_id: record.user_id,
                restored: record.outcome == CompensationOutcome::Restored,
                lost_basket_ids: record.lost_basket_ids.clone(),
                reason,
                timestamp: record.created_at.timestamp(),
            }));
        }
        err
    }
}

fn stock_error(err: StockError) -> OrderError {
    tracing::debug!("Stock validation failed: {}", err);
    match err {
        StockError::NotAvailable(_) => OrderError::unprocessable("Product not available"),
        StockError::NonPositiveQuantity { .. } => {
            OrderError::unprocessable("Product quantity must be positive")
        }
        StockError::InsufficientBalance { .. } => {
            OrderError::unprocessable("Not enough products balance")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCollaborators, InMemoryOrderRepository};
    use crate::models::{OrderStatus, PaymentStatus};
    use crate::status::TransitionPolicy;
    use async_trait::async_trait;
    use shop_catalog::BalanceUpdate;
    use shop_core::{Address, InventoryClient, RemoteResult, User};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        remote: Arc<InMemoryCollaborators>,
        repo: Arc<InMemoryOrderRepository>,
        orchestrator: OrderOrchestrator,
        rx: crate::notifications::NotificationReceiver,
        user: Uuid,
        address: Uuid,
    }

    async fn fixture(rules: OrderRules) -> Fixture {
        let remote = InMemoryCollaborators::new();
        let repo = Arc::new(InMemoryOrderRepository::new());
        let (sink, rx) = NotificationSink::bounded(16);
        let user = Uuid::new_v4();
        let address = Uuid::new_v4();

        remote
            .add_address(Address {
                id: address,
                user_id: user,
                country: None,
                city: "Lisbon".into(),
                street: "Rua Augusta".into(),
                house: Some("12".into()),
                apartment: None,
                postal_code: None,
            })
            .await;
        remote
            .add_user(User {
                id: user,
                username: "jane".into(),
                email: "jane@example.com".to_string().into(),
                first_name: None,
                last_name: None,
            })
            .await;

        let orchestrator =
            OrderOrchestrator::new(remote.collaborators(), repo.clone(), sink, rules);
        Fixture { remote, repo, orchestrator, rx, user, address }
    }

    fn product(price: i64, discount_price: Option<i64>, balance: i32) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "item".into(),
            price,
            discount_price,
            balance,
            enabled: true,
        }
    }

    async fn basket(f: &Fixture, owner: Uuid, product: &Product, amount: i32) -> Uuid {
        let id = Uuid::new_v4();
        f.remote.add_product(product.clone()).await;
        f.remote
            .add_basket(Basket {
                id,
                product_id: product.id,
                amount,
                user_id: owner,
                product: Some(product.clone()),
            })
            .await;
        id
    }

    fn rules() -> OrderRules {
        OrderRules {
            transition_policy: TransitionPolicy::Strict,
            compensate_inventory: true,
        }
    }

    #[tokio::test]
    async fn test_creates_order_with_discounted_sum() {
        let mut f = fixture(rules()).await;
        let x = product(10, Some(8), 5);
        let y = product(5, None, 1);
        let bx = basket(&f, f.user, &x, 2).await;
        let by = basket(&f, f.user, &y, 1).await;

        let view = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![bx, by], address_id: f.address },
            )
            .await
            .unwrap();

        assert_eq!(view.payment.sum, 21);
        assert_eq!(view.status, OrderStatus::Created);
        assert_eq!(view.payment.status, PaymentStatus::Created);
        assert_eq!(view.lines.len(), 2);
        assert!(view.address.is_some());
        assert_eq!(view.user.as_ref().map(|u| u.username.as_str()), Some("jane"));

        // one batched decrement, one batched delete
        let patches = f.remote.patches().await;
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].0[&x.id].balance, 3);
        assert_eq!(patches[0].0[&y.id].balance, 0);
        assert_eq!(f.remote.deleted_baskets().await.len(), 1);
        assert_eq!(f.remote.basket_count().await, 0);

        assert_eq!(f.repo.len().await, 1);
        assert!(matches!(f.rx.recv().await, Some(Notification::OrderCreated(e)) if e.sum == 21));
    }

    #[tokio::test]
    async fn test_no_addresses_is_unprocessable() {
        let f = fixture(rules()).await;
        let stranger = Uuid::new_v4();

        let err = f
            .orchestrator
            .create_order(
                &Caller::user(stranger),
                CreateOrderCommand { basket_ids: vec![Uuid::new_v4()], address_id: f.address },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Unprocessable(ref m) if m == "User not have any address"));
    }

    #[tokio::test]
    async fn test_unknown_address_is_not_found() {
        let f = fixture(rules()).await;

        let err = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![Uuid::new_v4()], address_id: Uuid::new_v4() },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::NotFound(ref m) if m == "Address not found"));
    }

    #[tokio::test]
    async fn test_foreign_baskets_resolve_to_nothing() {
        let f = fixture(rules()).await;
        let someone_else = Uuid::new_v4();
        let theirs = basket(&f, someone_else, &product(10, None, 5), 1).await;

        let err = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![theirs], address_id: f.address },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::NotFound(ref m) if m == "Basket not found"));
        assert!(f.remote.patches().await.is_empty());
    }

    #[tokio::test]
    async fn test_one_unavailable_line_aborts_everything() {
        let f = fixture(rules()).await;
        let fine = basket(&f, f.user, &product(10, None, 5), 1).await;
        let mut disabled = product(10, None, 5);
        disabled.enabled = false;
        let broken = basket(&f, f.user, &disabled, 1).await;

        let err = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![fine, broken], address_id: f.address },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Unprocessable(ref m) if m == "Product not available"));
        assert!(f.repo.is_empty().await);
        assert!(f.remote.patches().await.is_empty());
    }

    #[tokio::test]
    async fn test_over_quantity_aborts() {
        let f = fixture(rules()).await;
        let greedy = basket(&f, f.user, &product(10, None, 2), 3).await;

        let err = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![greedy], address_id: f.address },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Unprocessable(ref m) if m == "Not enough products balance"));
        assert!(f.repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_non_positive_quantity_aborts_before_remote_writes() {
        let f = fixture(rules()).await;
        let p = product(10, None, 5);
        let negative = basket(&f, f.user, &p, -3).await;

        let err = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![negative], address_id: f.address },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Unprocessable(ref m) if m == "Product quantity must be positive"));
        assert!(f.repo.is_empty().await);
        assert!(f.remote.patches().await.is_empty());
        assert_eq!(f.remote.basket_count().await, 1);
        assert_eq!(f.remote.product(p.id).await.unwrap().balance, 5);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_fetched_from_inventory() {
        let f = fixture(rules()).await;
        let p = product(7, None, 4);
        f.remote.add_product(p.clone()).await;
        let id = Uuid::new_v4();
        f.remote
            .add_basket(Basket { id, product_id: p.id, amount: 2, user_id: f.user, product: None })
            .await;

        let view = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![id], address_id: f.address },
            )
            .await
            .unwrap();

        assert_eq!(view.payment.sum, 14);
        assert_eq!(f.remote.product(p.id).await.unwrap().balance, 2);
    }

    #[tokio::test]
    async fn test_inventory_failure_is_unprocessable_and_leaves_no_trace() {
        let f = fixture(rules()).await;
        let b = basket(&f, f.user, &product(10, None, 5), 1).await;
        f.remote.fail_inventory_patch(true);

        let err = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![b], address_id: f.address },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Unprocessable(ref m) if m.contains("balance changed concurrently")));
        assert_eq!(f.remote.basket_count().await, 1);
        assert!(f.repo.compensations().await.is_empty());
    }

    #[tokio::test]
    async fn test_basket_delete_failure_restores_inventory() {
        let f = fixture(rules()).await;
        let p = product(10, None, 5);
        let b = basket(&f, f.user, &p, 2).await;
        f.remote.fail_basket_delete(true);

        let err = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![b], address_id: f.address },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Unprocessable(_)));
        assert!(f.repo.is_empty().await);
        assert_eq!(f.remote.product(p.id).await.unwrap().balance, 5);

        let records = f.repo.compensations().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, CompensationOutcome::Restored);
        assert!(records[0].lost_basket_ids.is_empty());
    }

    /// Inventory where another order takes one unit of `contended` right
    /// after the first balance patch lands.
    struct ContendedInventory {
        inner: Arc<InMemoryCollaborators>,
        contended: Uuid,
        sold: AtomicBool,
    }

    #[async_trait]
    impl InventoryClient for ContendedInventory {
        async fn get_products_by_ids(&self, ids: &[Uuid]) -> RemoteResult<Vec<Product>> {
            self.inner.get_products_by_ids(ids).await
        }

        async fn get_live_products(&self, ids: &[Uuid]) -> RemoteResult<Vec<Product>> {
            self.inner.get_live_products(ids).await
        }

        async fn batch_patch_products(&self, patch: &BalancePatch) -> RemoteResult<()> {
            self.inner.batch_patch_products(patch).await?;
            if !self.sold.swap(true, Ordering::SeqCst) {
                if let Some(p) = self.inner.product(self.contended).await {
                    let mut sale = BTreeMap::new();
                    sale.insert(p.id, BalanceUpdate { balance: p.balance - 1 });
                    self.inner.batch_patch_products(&BalancePatch(sale)).await?;
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_restore_keeps_sales_made_in_between() {
        let f = fixture(rules()).await;
        let p = product(10, None, 5);
        let b = basket(&f, f.user, &p, 2).await;
        f.remote.fail_basket_delete(true);

        let mut collaborators = f.remote.collaborators();
        collaborators.inventory = Arc::new(ContendedInventory {
            inner: f.remote.clone(),
            contended: p.id,
            sold: AtomicBool::new(false),
        });
        let (sink, _rx) = NotificationSink::bounded(16);
        let orchestrator = OrderOrchestrator::new(collaborators, f.repo.clone(), sink, rules());

        let err = orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![b], address_id: f.address },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Unprocessable(_)));
        // 5 - 2 (ours) - 1 (theirs) = 2, then our 2 come back
        assert_eq!(f.remote.product(p.id).await.unwrap().balance, 4);

        let records = f.repo.compensations().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, CompensationOutcome::Restored);
        assert_eq!(records[0].quantities.0[&p.id], 2);
        assert_eq!(records[0].restore.as_ref().unwrap().0[&p.id].balance, 4);
    }

    #[tokio::test]
    async fn test_storage_failure_after_remote_writes_is_compensated() {
        let mut f = fixture(rules()).await;
        let p = product(10, None, 5);
        let b = basket(&f, f.user, &p, 2).await;
        f.repo.fail_writes(true);

        let err = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![b], address_id: f.address },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Storage(_)));
        assert_eq!(f.remote.product(p.id).await.unwrap().balance, 5);

        let records = f.repo.compensations().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].lost_basket_ids, vec![b]);
        assert!(matches!(
            f.rx.recv().await,
            Some(Notification::CreationCompensated(e)) if e.restored
        ));
    }

    #[tokio::test]
    async fn test_gap_is_reproduced_when_compensation_disabled() {
        let f = fixture(OrderRules {
            transition_policy: TransitionPolicy::Permissive,
            compensate_inventory: false,
        })
        .await;
        let p = product(10, None, 5);
        let b = basket(&f, f.user, &p, 2).await;
        f.repo.fail_writes(true);

        let result = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![b], address_id: f.address },
            )
            .await;

        assert!(result.is_err());
        // inventory stays decremented, but the stranded run is on record
        assert_eq!(f.remote.product(p.id).await.unwrap().balance, 3);
        let records = f.repo.compensations().await;
        assert_eq!(records[0].outcome, CompensationOutcome::NotAttempted);
        assert_eq!(records[0].quantities.0[&p.id], 2);
        assert!(records[0].restore.is_none());
    }

    #[tokio::test]
    async fn test_empty_basket_id_set_is_a_validation_error() {
        let f = fixture(rules()).await;

        let err = f
            .orchestrator
            .create_order(
                &Caller::user(f.user),
                CreateOrderCommand { basket_ids: vec![], address_id: f.address },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Validation(_)));
    }
}
