use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shop_catalog::Product;
use shop_core::{Address, Collaborators, RemoteResult, User};
use std::collections::HashMap;
use std::future::Future;
use uuid::Uuid;

use crate::models::{Order, OrderStatus, Payment};

/// Order as returned to callers: the stored row plus whatever remote detail
/// could be resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub address_id: Uuid,
    pub address: Option<Address>,
    pub user: Option<User>,
    pub lines: Vec<LineView>,
    pub payment: Payment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineView {
    pub product_id: Uuid,
    pub amount: i32,
    pub product: Option<Product>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    pub user: Option<User>,
}

/// Enriches stored rows with product, address and user detail through
/// batched lookups. Remote failures degrade the view, they never fail it.
#[derive(Clone)]
pub struct OrderAggregator {
    collaborators: Collaborators,
}

impl OrderAggregator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    pub async fn order_view(&self, order: Order) -> OrderView {
        let mut views = self.order_views(vec![order]).await;
        // one order in, one view out
        views.remove(0)
    }

    pub async fn order_views(&self, orders: Vec<Order>) -> Vec<OrderView> {
        let product_ids = unique(orders.iter().flat_map(|o| o.lines.iter().map(|l| l.product_id)));
        let address_ids = unique(orders.iter().map(|o| o.address_id));
        let user_ids = unique(orders.iter().map(|o| o.user_id));

        let (products, addresses, users) = tokio::join!(
            lookup("product", &product_ids, |p: &Product| p.id, || {
                self.collaborators.inventory.get_products_by_ids(&product_ids)
            }),
            lookup("address", &address_ids, |a: &Address| a.id, || {
                self.collaborators.addresses.get_addresses_by_ids(&address_ids)
            }),
            lookup("user", &user_ids, |u: &User| u.id, || {
                self.collaborators.users.get_users_by_ids(&user_ids)
            }),
        );

        orders
            .into_iter()
            .map(|order| OrderView {
                id: order.id,
                user_id: order.user_id,
                status: order.status,
                address_id: order.address_id,
                address: addresses.get(&order.address_id).cloned(),
                user: users.get(&order.user_id).cloned(),
                lines: order
                    .lines
                    .iter()
                    .map(|line| match products.get(&line.product_id) {
                        Some(product) => LineView {
                            product_id: line.product_id,
                            amount: line.amount,
                            product: Some(product.clone()),
                        },
                        None => LineView {
                            product_id: line.product_id,
                            amount: 1,
                            product: None,
                        },
                    })
                    .collect(),
                payment: order.payment,
                created_at: order.created_at,
                updated_at: order.updated_at,
            })
            .collect()
    }

    pub async fn payment_views(&self, payments: Vec<Payment>) -> Vec<PaymentView> {
        let user_ids = unique(payments.iter().map(|p| p.user_id));
        let users = lookup("user", &user_ids, |u: &User| u.id, || {
            self.collaborators.users.get_users_by_ids(&user_ids)
        })
        .await;

        payments
            .into_iter()
            .map(|payment| PaymentView {
                user: users.get(&payment.user_id).cloned(),
                payment,
            })
            .collect()
    }
}

fn unique(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = ids.collect();
    ids.sort();
    ids.dedup();
    ids
}

async fn lookup<T, K, F, Fut>(service: &str, ids: &[Uuid], key: K, fetch: F) -> HashMap<Uuid, T>
where
    K: Fn(&T) -> Uuid,
    F: FnOnce() -> Fut,
    Fut: Future<Output = RemoteResult<Vec<T>>>,
{
    if ids.is_empty() {
        return HashMap::new();
    }
    match fetch().await {
        Ok(items) => items.into_iter().map(|item| (key(&item), item)).collect(),
        Err(e) => {
            tracing::warn!("Rendering without {} detail for {} ids: {}", service, ids.len(), e);
            HashMap::new()
        }
    }
}
