//! Cache layer
//!
//! Short-lived copies of hot, rarely-changing reads: feature flags, the
//! public tag list and the province list. Backends:
//! - In-memory cache (moka), the default
//! - Redis, behind the `redis-cache` feature, for multi-instance deployments
//!
//! # Usage
//!
//! ```rust,ignore
//! use heritage::cache::{create_cache, keys, CacheLayer};
//! use heritage::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default()).await?;
//! cache.set(keys::PROVINCES, &provinces, cache.default_ttl()).await?;
//! ```

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;

/// Cache keys used across the services
pub mod keys {
    /// Prefix of the per-flag entries
    pub const FLAG_PREFIX: &str = "flags:";
    /// Every flag entry
    pub const FLAGS_PATTERN: &str = "flags:*";
    /// Public `[{id, name}]` tag list
    pub const PUBLIC_TAGS: &str = "tags:public";
    /// Distinct provinces of non-deleted sites
    pub const PROVINCES: &str = "sites:provinces";

    pub fn flag(name: &str) -> String {
        format!("{}{}", FLAG_PREFIX, name)
    }
}

/// Cache backend interface.
///
/// The generic methods make this trait unusable as `dyn CacheLayer`; the
/// [`Cache`] enum provides the runtime dispatch.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching a glob (`*`, `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Configured cache backend
#[derive(Debug)]
pub enum Cache {
    Memory(MemoryCache),
    #[cfg(feature = "redis-cache")]
    Redis(RedisCache),
}

impl Cache {
    /// TTL applied when callers have no better value
    pub fn default_ttl(&self) -> Duration {
        match self {
            Cache::Memory(cache) => cache.default_ttl(),
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.default_ttl(),
        }
    }

    /// Return the cached value for `key`, or load, store and return it.
    ///
    /// Cache failures are logged and fall through to the loader, so a
    /// broken Redis never takes a read path down with it.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get::<T>(key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => tracing::warn!("Cache read failed for {}: {:#}", key, e),
        }

        let value = load().await?;
        if let Err(e) = self.set(key, &value, self.default_ttl()).await {
            tracing::warn!("Cache write failed for {}: {:#}", key, e);
        }
        Ok(value)
    }

    /// Delete a key, logging instead of failing
    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.delete(key).await {
            tracing::warn!("Cache invalidation failed for {}: {:#}", key, e);
        }
    }

    /// Delete a key pattern, logging instead of failing
    pub async fn invalidate_pattern(&self, pattern: &str) {
        if let Err(e) = self.delete_pattern(pattern).await {
            tracing::warn!("Cache invalidation failed for {}: {:#}", pattern, e);
        }
    }
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.get(key).await,
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete(key).await,
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete_pattern(pattern).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete_pattern(pattern).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.clear().await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.clear().await,
        }
    }
}

/// Create the cache backend selected by configuration.
///
/// # Errors
///
/// - Redis is configured without a URL
/// - Redis is configured but the `redis-cache` feature is off
/// - The Redis connection fails
pub async fn create_cache(config: &CacheConfig) -> Result<Arc<Cache>> {
    let ttl = Duration::from_secs(config.ttl_seconds);

    match config.driver {
        CacheDriver::Memory => Ok(Arc::new(Cache::Memory(MemoryCache::with_capacity_and_ttl(
            10_000, ttl,
        )))),
        CacheDriver::Redis => {
            #[cfg(feature = "redis-cache")]
            {
                let redis_url = config.redis_url.as_ref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Redis URL is required when using the Redis cache driver. \
                         Set 'cache.redis_url' or HERITAGE_CACHE_REDIS_URL."
                    )
                })?;
                let cache = RedisCache::with_ttl(redis_url, ttl).await?;
                tracing::info!("Using Redis cache");
                Ok(Arc::new(Cache::Redis(cache)))
            }

            #[cfg(not(feature = "redis-cache"))]
            {
                anyhow::bail!(
                    "Redis cache driver is configured but the 'redis-cache' feature is not enabled. \
                     Build with `--features redis-cache` or use the 'memory' driver."
                )
            }
        }
    }
}

/// Glob match supporting `*` (any run) and `?` (one character)
pub(crate) fn glob_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    let (mut p, mut k) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, k));
                p += 1;
            }
            Some(&c) if c == '?' || c == key[k] => {
                p += 1;
                k += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    k = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_create_memory_cache() {
        let cache = create_cache(&CacheConfig::default()).await.unwrap();

        cache
            .set(keys::PROVINCES, &vec!["Buenos Aires".to_string()], Duration::from_secs(60))
            .await
            .unwrap();
        let provinces: Option<Vec<String>> = cache.get(keys::PROVINCES).await.unwrap();
        assert_eq!(provinces, Some(vec!["Buenos Aires".to_string()]));
    }

    #[tokio::test]
    async fn test_get_or_load_only_loads_on_miss() {
        let cache = create_cache(&CacheConfig::default()).await.unwrap();
        let mut loads = 0;

        for _ in 0..3 {
            let value: Result<i64, anyhow::Error> = cache
                .get_or_load(keys::PUBLIC_TAGS, || {
                    loads += 1;
                    async { Ok(42) }
                })
                .await;
            assert_eq!(value.unwrap(), 42);
        }
        assert_eq!(loads, 1);

        cache.invalidate(keys::PUBLIC_TAGS).await;
        let _: Result<i64, anyhow::Error> = cache
            .get_or_load(keys::PUBLIC_TAGS, || {
                loads += 1;
                async { Ok(7) }
            })
            .await;
        assert_eq!(loads, 2);
    }

    #[tokio::test]
    async fn test_loader_errors_are_not_cached() {
        let cache = create_cache(&CacheConfig::default()).await.unwrap();

        let failed: Result<i64, &str> = cache.get_or_load("k", || async { Err("boom") }).await;
        assert_eq!(failed, Err("boom"));
        assert_eq!(cache.get::<i64>("k").await.unwrap(), None);
    }

    #[cfg(not(feature = "redis-cache"))]
    #[tokio::test]
    async fn test_create_redis_cache_without_feature() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: Some("redis://localhost:6379".to_string()),
            ttl_seconds: 300,
        };

        let err = create_cache(&config).await.unwrap_err().to_string();
        assert!(err.contains("redis-cache"));
    }

    #[test]
    fn test_glob_matches() {
        assert!(glob_matches("flags:*", "flags:reviews_enabled"));
        assert!(glob_matches("flags:*", "flags:"));
        assert!(glob_matches("sites:?rovinces", "sites:provinces"));
        assert!(glob_matches("*:public", "tags:public"));
        assert!(!glob_matches("flags:*", "tags:public"));
        assert!(!glob_matches("flags:?", "flags:"));
    }

    proptest! {
        #[test]
        fn prop_literal_and_star_patterns(key in "[a-z:_]{0,20}") {
            prop_assert!(glob_matches(&key, &key));
            prop_assert!(glob_matches("*", &key));
            let prefix: String = key.chars().take(3).collect();
            let pattern = format!("{}*", prefix);
            prop_assert!(glob_matches(&pattern, &key));
        }
    }
}
