//! In-process implementations of the repository and collaborator seams.
//! Used by tests across the workspace and for running the service without
//! its neighbours.

use async_trait::async_trait;
use shop_catalog::{BalancePatch, Product};
use shop_core::{
    Address, AddressClient, Basket, BasketClient, Collaborators, DeleteBasketsRequest,
    InventoryClient, RemoteError, RemoteResult, User, UserClient,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::compensation::CompensationRecord;
use crate::error::{OrderError, OrderResult};
use crate::models::{Order, Payment, PaymentStatus};
use crate::repository::{
    OrderFilter, OrderRepository, Page, PageRequest, PaymentFilter, PaymentStatusStats,
};

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
    compensations: RwLock<Vec<CompensationRecord>>,
    fail_writes: AtomicBool,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with a storage error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn insert(&self, order: Order) {
        self.orders.write().await.insert(order.id, order);
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    pub async fn compensations(&self) -> Vec<CompensationRecord> {
        self.compensations.read().await.clone()
    }

    fn check_writable(&self) -> OrderResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OrderError::storage("in-memory store is read-only"));
        }
        Ok(())
    }
}

fn paginate<T>(mut items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let start = (page.offset() as usize).min(items.len());
    let end = (start + page.size as usize).min(items.len());
    Page {
        items: items.drain(start..end).collect(),
        page: page.page,
        size: page.size,
        total,
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> OrderResult<()> {
        self.check_writable()?;
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(&self, id: Uuid) -> OrderResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_payment(&self, payment_id: Uuid, user_id: Uuid) -> OrderResult<Option<Payment>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .map(|o| &o.payment)
            .find(|p| p.id == payment_id && p.user_id == user_id)
            .cloned())
    }

    async fn find_order_by_payment(
        &self,
        payment_id: Uuid,
        user_id: Uuid,
    ) -> OrderResult<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.payment.id == payment_id && o.user_id == user_id)
            .cloned())
    }

    async fn save_order(&self, order: &Order) -> OrderResult<()> {
        self.check_writable()?;
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id)
            .ok_or_else(|| OrderError::storage(format!("order {} vanished", order.id)))?;
        stored.status = order.status;
        stored.updated_at = order.updated_at;
        stored.payment.status = order.payment.status;
        stored.payment.updated_at = order.payment.updated_at;
        Ok(())
    }

    async fn save_settlement(&self, order: &Order, payment: &Payment) -> OrderResult<()> {
        self.check_writable()?;
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id)
            .ok_or_else(|| OrderError::storage(format!("order {} vanished", order.id)))?;
        stored.status = order.status;
        stored.updated_at = order.updated_at;
        stored.payment = payment.clone();
        Ok(())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> OrderResult<Page<Order>> {
        let mut matching: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, page))
    }

    async fn count_orders(&self, filter: &OrderFilter) -> OrderResult<u64> {
        Ok(self.orders.read().await.values().filter(|o| filter.matches(o)).count() as u64)
    }

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> OrderResult<Page<Payment>> {
        let mut matching: Vec<Payment> = self
            .orders
            .read()
            .await
            .values()
            .map(|o| &o.payment)
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, page))
    }

    async fn count_payments(&self, filter: &PaymentFilter) -> OrderResult<u64> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| filter.matches(&o.payment))
            .count() as u64)
    }

    async fn payment_user_stats(&self, user_id: Uuid) -> OrderResult<Vec<PaymentStatusStats>> {
        let orders = self.orders.read().await;
        Ok(PaymentStatus::ALL
            .into_iter()
            .filter_map(|status| {
                let payments: Vec<&Payment> = orders
                    .values()
                    .map(|o| &o.payment)
                    .filter(|p| p.user_id == user_id && p.status == status)
                    .collect();
                if payments.is_empty() {
                    return None;
                }
                Some(PaymentStatusStats {
                    status,
                    count: payments.len() as u64,
                    sum: payments.iter().map(|p| p.sum).sum(),
                })
            })
            .collect())
    }

    async fn record_compensation(&self, record: &CompensationRecord) -> OrderResult<()> {
        self.compensations.write().await.push(record.clone());
        Ok(())
    }
}

/// One object standing in for the address, basket, inventory and user
/// services. Each remote operation can be switched to fail.
#[derive(Default)]
pub struct InMemoryCollaborators {
    addresses: RwLock<Vec<Address>>,
    baskets: RwLock<HashMap<Uuid, Basket>>,
    products: RwLock<HashMap<Uuid, Product>>,
    users: RwLock<Vec<User>>,
    patches: RwLock<Vec<BalancePatch>>,
    deleted_baskets: RwLock<Vec<DeleteBasketsRequest>>,
    fail_inventory_patch: AtomicBool,
    fail_basket_delete: AtomicBool,
    fail_lookups: AtomicBool,
}

impl InMemoryCollaborators {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            addresses: self.clone(),
            baskets: self.clone(),
            inventory: self.clone(),
            users: self.clone(),
        }
    }

    pub async fn add_address(&self, address: Address) {
        self.addresses.write().await.push(address);
    }

    pub async fn add_basket(&self, basket: Basket) {
        self.baskets.write().await.insert(basket.id, basket);
    }

    pub async fn add_product(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn add_user(&self, user: User) {
        self.users.write().await.push(user);
    }

    pub async fn product(&self, id: Uuid) -> Option<Product> {
        self.products.read().await.get(&id).cloned()
    }

    pub async fn basket_count(&self) -> usize {
        self.baskets.read().await.len()
    }

    /// Every balance patch received, in order.
    pub async fn patches(&self) -> Vec<BalancePatch> {
        self.patches.read().await.clone()
    }

    pub async fn deleted_baskets(&self) -> Vec<DeleteBasketsRequest> {
        self.deleted_baskets.read().await.clone()
    }

    /// Fails the next balance patches, but only the decrementing ones:
    /// restoring patches issued by compensation still go through.
    pub fn fail_inventory_patch(&self, fail: bool) {
        self.fail_inventory_patch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_basket_delete(&self, fail: bool) {
        self.fail_basket_delete.store(fail, Ordering::SeqCst);
    }

    /// Fails every by-ids lookup used for enrichment.
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    fn lookup_guard(&self, service: &str) -> RemoteResult<()> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(RemoteError::CircuitOpen(service.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AddressClient for InMemoryCollaborators {
    async fn get_addresses(&self, user_id: Uuid) -> RemoteResult<Vec<Address>> {
        Ok(self
            .addresses
            .read()
            .await
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_addresses_by_ids(&self, ids: &[Uuid]) -> RemoteResult<Vec<Address>> {
        self.lookup_guard("address")?;
        Ok(self
            .addresses
            .read()
            .await
            .iter()
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BasketClient for InMemoryCollaborators {
    /// Not scoped by user, so the ownership filter on the calling side is
    /// what keeps foreign lines out.
    async fn get_baskets_by_ids(&self, ids: &[Uuid], _user_id: Uuid) -> RemoteResult<Vec<Basket>> {
        let baskets = self.baskets.read().await;
        Ok(ids.iter().filter_map(|id| baskets.get(id).cloned()).collect())
    }

    async fn delete_baskets(&self, request: &DeleteBasketsRequest) -> RemoteResult<()> {
        if self.fail_basket_delete.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                service: "basket".to_string(),
                status: 500,
                message: "basket store unavailable".to_string(),
            });
        }
        let mut baskets = self.baskets.write().await;
        baskets.retain(|id, b| !(request.basket_ids.contains(id) && b.user_id == request.user_id));
        self.deleted_baskets.write().await.push(request.clone());
        Ok(())
    }
}

#[async_trait]
impl InventoryClient for InMemoryCollaborators {
    async fn get_products_by_ids(&self, ids: &[Uuid]) -> RemoteResult<Vec<Product>> {
        self.lookup_guard("product")?;
        let products = self.products.read().await;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }

    async fn get_live_products(&self, ids: &[Uuid]) -> RemoteResult<Vec<Product>> {
        let products = self.products.read().await;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }

    async fn batch_patch_products(&self, patch: &BalancePatch) -> RemoteResult<()> {
        let mut products = self.products.write().await;
        let decrementing = patch
            .0
            .iter()
            .any(|(id, update)| products.get(id).is_some_and(|p| update.balance < p.balance));
        if decrementing && self.fail_inventory_patch.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                service: "product".to_string(),
                status: 409,
                message: "balance changed concurrently".to_string(),
            });
        }
        for (id, update) in &patch.0 {
            if let Some(product) = products.get_mut(id) {
                product.balance = update.balance;
            }
        }
        self.patches.write().await.push(patch.clone());
        Ok(())
    }
}

#[async_trait]
impl UserClient for InMemoryCollaborators {
    async fn get_users_by_ids(&self, ids: &[Uuid]) -> RemoteResult<Vec<User>> {
        self.lookup_guard("user")?;
        Ok(self
            .users
            .read()
            .await
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }
}
