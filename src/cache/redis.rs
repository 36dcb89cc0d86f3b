//! Redis cache implementation
//!
//! Shared cache for deployments running several instances. Values are JSON
//! strings written with `SETEX`; pattern deletes walk the keyspace with
//! `SCAN` so a large database is never blocked by `KEYS`.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Keys fetched per `SCAN` round
const SCAN_COUNT: usize = 100;

/// Every key is stored under this prefix so `clear` never touches foreign data
const NAMESPACE: &str = "heritage:";

pub struct RedisCache {
    connection: MultiplexedConnection,
    default_ttl: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is invalid or the server is unreachable.
    pub async fn with_ttl(redis_url: &str, default_ttl: Duration) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            connection,
            default_ttl,
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn namespaced(key: &str) -> String {
        format!("{}{}", NAMESPACE, key)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .context("Failed to scan keys in Redis")?;

            if !keys.is_empty() {
                let _: () = conn
                    .del(&keys)
                    .await
                    .context("Failed to delete keys from Redis")?;
            }

            cursor = next;
            if cursor == 0 {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection.clone();
        let json: Option<String> = conn
            .get(Self::namespaced(key))
            .await
            .context("Failed to get value from Redis")?;

        json.map(|json| {
            serde_json::from_str(&json).context("Failed to deserialize cached value")
        })
        .transpose()
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;

        let _: () = conn
            .set_ex(Self::namespaced(key), json, ttl.as_secs().max(1))
            .await
            .context("Failed to set value in Redis")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(Self::namespaced(key))
            .await
            .context("Failed to delete key from Redis")?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        self.delete_matching(&Self::namespaced(pattern)).await
    }

    async fn clear(&self) -> Result<()> {
        self.delete_matching(&format!("{}*", NAMESPACE)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(RedisCache::namespaced(keys::PROVINCES), "heritage:sites:provinces");
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_roundtrip_and_pattern_delete() {
        let cache = RedisCache::with_ttl(&redis_url(), Duration::from_secs(60))
            .await
            .unwrap();
        let ttl = Duration::from_secs(60);

        cache.set(&keys::flag("reviews_enabled"), &true, ttl).await.unwrap();
        cache.set(keys::PUBLIC_TAGS, &vec!["colonial"], ttl).await.unwrap();
        assert_eq!(cache.get::<bool>(&keys::flag("reviews_enabled")).await.unwrap(), Some(true));

        cache.delete_pattern(keys::FLAGS_PATTERN).await.unwrap();
        assert_eq!(cache.get::<bool>(&keys::flag("reviews_enabled")).await.unwrap(), None);
        assert!(cache.get::<Vec<String>>(keys::PUBLIC_TAGS).await.unwrap().is_some());

        cache.clear().await.unwrap();
        assert!(cache.get::<Vec<String>>(keys::PUBLIC_TAGS).await.unwrap().is_none());
    }
}
