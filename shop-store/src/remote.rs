//! HTTP clients for the address, basket, product and user services.
//!
//! Every call goes through the collaborator's circuit breaker; by-id lookups
//! are served from Redis first when a cache is configured.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shop_catalog::{BalancePatch, Product};
use shop_core::{
    Address, AddressClient, Basket, BasketClient, CircuitBreaker, Collaborators,
    DeleteBasketsRequest, InventoryClient, RemoteError, RemoteResult, User, UserClient,
};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::app_config::Config;
use crate::redis_repo::RedisClient;

struct Transport {
    http: reqwest::Client,
    base_url: String,
    service: &'static str,
    breaker: CircuitBreaker,
}

impl Transport {
    fn new(http: reqwest::Client, base_url: &str, service: &'static str, breaker: CircuitBreaker) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
            breaker,
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> RemoteError {
        RemoteError::Transport {
            service: self.service.to_string(),
            message: e.to_string(),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> RemoteResult<reqwest::Response> {
        let resp = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::warn!("{} responded with {}: {}", self.service, status, message);
            return Err(RemoteError::Status {
                service: self.service.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(&self, resp: reqwest::Response) -> RemoteResult<T> {
        resp.json().await.map_err(|e| RemoteError::Decode {
            service: self.service.to_string(),
            message: e.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> RemoteResult<T> {
        let url = format!("{}{}", self.base_url, path);
        self.breaker
            .call(|| async move {
                let resp = self.send(self.http.get(&url).query(query)).await?;
                self.decode(resp).await
            })
            .await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> RemoteResult<T> {
        let url = format!("{}{}", self.base_url, path);
        self.breaker
            .call(|| async move {
                let resp = self.send(self.http.post(&url).json(body)).await?;
                self.decode(resp).await
            })
            .await
    }

    async fn command<B: Serialize + Sync>(&self, method: Method, path: &str, body: &B) -> RemoteResult<()> {
        let url = format!("{}{}", self.base_url, path);
        self.breaker
            .call(|| async move {
                let resp = self.send(self.http.request(method, &url).json(body)).await?;
                // some services answer writes with 204
                if resp.status() != StatusCode::NO_CONTENT {
                    let _ = resp.bytes().await;
                }
                Ok(())
            })
            .await
    }
}

/// Cache-first by-id lookup. Hits come from Redis, misses from `fetch`, and
/// fetched items are written back.
async fn cached_by_ids<T, K, F, Fut>(
    cache: Option<&RedisClient>,
    prefix: &str,
    ttl_seconds: u64,
    ids: &[Uuid],
    key: K,
    fetch: F,
) -> RemoteResult<Vec<T>>
where
    T: Serialize + DeserializeOwned,
    K: Fn(&T) -> Uuid,
    F: FnOnce(Vec<Uuid>) -> Fut,
    Fut: Future<Output = RemoteResult<Vec<T>>>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let Some(cache) = cache else {
        return fetch(ids.to_vec()).await;
    };

    let (mut hits, misses) = cache.get_json::<T>(prefix, ids).await;
    if misses.is_empty() {
        tracing::debug!("{} lookup served from cache ({} ids)", prefix, ids.len());
        return Ok(hits);
    }

    let fetched = fetch(misses).await?;
    let entries: Vec<(Uuid, &T)> = fetched.iter().map(|item| (key(item), item)).collect();
    cache.put_json(prefix, &entries, ttl_seconds).await;
    hits.extend(fetched);
    Ok(hits)
}

// ============================================================================
// Collaborators
// ============================================================================

pub struct HttpAddressClient {
    transport: Transport,
    cache: Option<RedisClient>,
    ttl_seconds: u64,
}

#[async_trait]
impl AddressClient for HttpAddressClient {
    async fn get_addresses(&self, user_id: Uuid) -> RemoteResult<Vec<Address>> {
        self.transport
            .get("/v1/addresses", &[("userId", user_id.to_string())])
            .await
    }

    async fn get_addresses_by_ids(&self, ids: &[Uuid]) -> RemoteResult<Vec<Address>> {
        cached_by_ids(self.cache.as_ref(), "address", self.ttl_seconds, ids, |a: &Address| a.id, |missing| async move {
            self.transport.post("/v1/addresses/by-ids", &missing).await
        })
        .await
    }
}

pub struct HttpBasketClient {
    transport: Transport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BasketLookup<'a> {
    basket_ids: &'a [Uuid],
    user_id: Uuid,
}

#[async_trait]
impl BasketClient for HttpBasketClient {
    async fn get_baskets_by_ids(&self, ids: &[Uuid], user_id: Uuid) -> RemoteResult<Vec<Basket>> {
        self.transport
            .post("/v1/baskets/by-ids", &BasketLookup { basket_ids: ids, user_id })
            .await
    }

    async fn delete_baskets(&self, request: &DeleteBasketsRequest) -> RemoteResult<()> {
        self.transport
            .command(Method::POST, "/v1/baskets/batch-delete", request)
            .await
    }
}

pub struct HttpInventoryClient {
    transport: Transport,
    cache: Option<RedisClient>,
    ttl_seconds: u64,
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn get_products_by_ids(&self, ids: &[Uuid]) -> RemoteResult<Vec<Product>> {
        cached_by_ids(self.cache.as_ref(), "product", self.ttl_seconds, ids, |p: &Product| p.id, |missing| async move {
            self.transport.post("/v1/products/by-ids", &missing).await
        })
        .await
    }

    async fn get_live_products(&self, ids: &[Uuid]) -> RemoteResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.transport.post("/v1/products/by-ids", &ids).await
    }

    async fn batch_patch_products(&self, patch: &BalancePatch) -> RemoteResult<()> {
        let result = self
            .transport
            .command(Method::PATCH, "/v1/products/balances", patch)
            .await;
        // stale balances must not be served either way
        if let Some(cache) = &self.cache {
            cache.invalidate("product", &patch.product_ids()).await;
        }
        result
    }
}

pub struct HttpUserClient {
    transport: Transport,
    cache: Option<RedisClient>,
    ttl_seconds: u64,
}

#[async_trait]
impl UserClient for HttpUserClient {
    async fn get_users_by_ids(&self, ids: &[Uuid]) -> RemoteResult<Vec<User>> {
        cached_by_ids(self.cache.as_ref(), "user", self.ttl_seconds, ids, |u: &User| u.id, |missing| async move {
            self.transport.post("/v1/users/by-ids", &missing).await
        })
        .await
    }
}

/// Wires HTTP clients for all four collaborators, each with its own breaker.
pub fn http_collaborators(config: &Config, cache: Option<RedisClient>) -> Result<Collaborators, reqwest::Error> {
    let http = reqwest::Client::builder()
        .timeout(config.resiliency.request_timeout())
        .build()?;
    let threshold = config.resiliency.failure_threshold as usize;
    let reset = config.resiliency.reset_timeout();
    let ttl_seconds = config.cache.ttl_seconds;
    let transport = |url: &str, service: &'static str| {
        Transport::new(http.clone(), url, service, CircuitBreaker::new(service, threshold, reset))
    };

    Ok(Collaborators {
        addresses: Arc::new(HttpAddressClient {
            transport: transport(&config.services.address_url, "address"),
            cache: cache.clone(),
            ttl_seconds,
        }),
        baskets: Arc::new(HttpBasketClient {
            transport: transport(&config.services.basket_url, "basket"),
        }),
        inventory: Arc::new(HttpInventoryClient {
            transport: transport(&config.services.product_url, "product"),
            cache: cache.clone(),
            ttl_seconds,
        }),
        users: Arc::new(HttpUserClient {
            transport: transport(&config.services.user_url, "user"),
            cache,
            ttl_seconds,
        }),
    })
}
