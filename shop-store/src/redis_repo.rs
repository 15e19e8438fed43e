use redis::{AsyncCommands, RedisResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

/// Read-through cache for collaborator lookups. Values are stored as JSON
/// under `{prefix}:{id}`.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub fn key(prefix: &str, id: Uuid) -> String {
        format!("{}:{}", prefix, id)
    }

    pub async fn get_many_raw(&self, keys: &[String]) -> RedisResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("MGET").arg(keys).query_async(&mut conn).await
    }

    pub async fn set_many_raw(&self, entries: &[(String, String)], ttl_seconds: u64) -> RedisResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.set_ex(key, value, ttl_seconds).ignore();
        }
        pipe.query_async(&mut conn).await
    }

    pub async fn del_many(&self, keys: &[String]) -> RedisResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del(keys).await
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async(&mut conn).await
    }

    /// Cached values for `ids`, plus the ids that missed. Cache failures and
    /// unreadable entries count as misses.
    pub async fn get_json<T: DeserializeOwned>(&self, prefix: &str, ids: &[Uuid]) -> (Vec<T>, Vec<Uuid>) {
        let keys: Vec<String> = ids.iter().map(|id| Self::key(prefix, *id)).collect();
        let raw = match self.get_many_raw(&keys).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache read for {} failed: {}", prefix, e);
                return (Vec::new(), ids.to_vec());
            }
        };
        split_hits(ids, raw)
    }

    pub async fn put_json<T: Serialize>(&self, prefix: &str, items: &[(Uuid, T)], ttl_seconds: u64) {
        let entries: Vec<(String, String)> = items
            .iter()
            .filter_map(|(id, item)| {
                serde_json::to_string(item)
                    .ok()
                    .map(|json| (Self::key(prefix, *id), json))
            })
            .collect();
        if let Err(e) = self.set_many_raw(&entries, ttl_seconds).await {
            warn!("Cache write for {} failed: {}", prefix, e);
        }
    }

    pub async fn invalidate(&self, prefix: &str, ids: &[Uuid]) {
        let keys: Vec<String> = ids.iter().map(|id| Self::key(prefix, *id)).collect();
        if let Err(e) = self.del_many(&keys).await {
            warn!("Cache invalidation for {} failed: {}", prefix, e);
        }
    }
}

fn split_hits<T: DeserializeOwned>(ids: &[Uuid], raw: Vec<Option<String>>) -> (Vec<T>, Vec<Uuid>) {
    let mut hits = Vec::new();
    let mut misses = Vec::new();
    for (id, value) in ids.iter().zip(raw.into_iter().chain(std::iter::repeat(None))) {
        match value.and_then(|json| serde_json::from_str(&json).ok()) {
            Some(item) => hits.push(item),
            None => misses.push(*id),
        }
    }
    (hits, misses)
}
