use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shop_catalog::{BalancePatch, Product};
use shop_shared::Masked;
use std::sync::Arc;
use uuid::Uuid;

/// Error returned by every collaborator call. Fallbacks never substitute
/// data: a failed or short-circuited call surfaces one of these.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("{0} service unavailable: circuit open")]
    CircuitOpen(String),

    #[error("{service} request failed: {message}")]
    Transport { service: String, message: String },

    #[error("{service} responded with {status}: {message}")]
    Status {
        service: String,
        status: u16,
        message: String,
    },

    #[error("{service} returned an unreadable body: {message}")]
    Decode { service: String, message: String },
}

impl RemoteError {
    /// Whether the failure says something about the health of the remote
    /// (and should count against its circuit breaker).
    pub fn is_remote_fault(&self) -> bool {
        match self {
            RemoteError::CircuitOpen(_) => false,
            RemoteError::Transport { .. } | RemoteError::Decode { .. } => true,
            RemoteError::Status { status, .. } => *status >= 500,
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub country: Option<String>,
    pub city: String,
    pub street: String,
    #[serde(default)]
    pub house: Option<String>,
    #[serde(default)]
    pub apartment: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// A pending basket line as served by the basket service, including the
/// product snapshot it resolved when it was read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Basket {
    pub id: Uuid,
    pub product_id: Uuid,
    pub amount: i32,
    pub user_id: Uuid,
    #[serde(default)]
    pub product: Option<Product>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Masked<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBasketsRequest {
    pub basket_ids: Vec<Uuid>,
    pub user_id: Uuid,
}

#[async_trait]
pub trait AddressClient: Send + Sync {
    /// Every address registered for a user
    async fn get_addresses(&self, user_id: Uuid) -> RemoteResult<Vec<Address>>;

    async fn get_addresses_by_ids(&self, ids: &[Uuid]) -> RemoteResult<Vec<Address>>;
}

#[async_trait]
pub trait BasketClient: Send + Sync {
    /// Basket lines by id, read on behalf of `user_id`
    async fn get_baskets_by_ids(&self, ids: &[Uuid], user_id: Uuid) -> RemoteResult<Vec<Basket>>;

    async fn delete_baskets(&self, request: &DeleteBasketsRequest) -> RemoteResult<()>;
}

#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn get_products_by_ids(&self, ids: &[Uuid]) -> RemoteResult<Vec<Product>>;

    /// Same lookup, never answered from a cache. Use it when the balance
    /// read is about to be written back.
    async fn get_live_products(&self, ids: &[Uuid]) -> RemoteResult<Vec<Product>>;

    /// Apply absolute balances to many products in one call
    async fn batch_patch_products(&self, patch: &BalancePatch) -> RemoteResult<()>;
}

#[async_trait]
pub trait UserClient: Send + Sync {
    async fn get_users_by_ids(&self, ids: &[Uuid]) -> RemoteResult<Vec<User>>;
}

/// The set of remote services the orders service talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub addresses: Arc<dyn AddressClient>,
    pub baskets: Arc<dyn BasketClient>,
    pub inventory: Arc<dyn InventoryClient>,
    pub users: Arc<dyn UserClient>,
}
