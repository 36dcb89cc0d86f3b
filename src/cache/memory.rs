//! In-memory cache implementation using moka
//!
//! Values are stored as JSON so any serializable type fits. Each entry
//! carries its own TTL through a moka [`Expiry`] policy, capped by the
//! cache-wide default.

use super::{glob_matches, CacheLayer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct CacheEntry {
    json: Arc<String>,
    ttl: Duration,
}

/// Expire each entry after its own TTL
struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// moka-backed cache for single-instance deployments
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Approximate number of live entries
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => {
                let value = serde_json::from_str(&entry.json)
                    .with_context(|| format!("Failed to deserialize cached value for {}", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Store a value; the TTL is capped by the cache default
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        let entry = CacheEntry {
            json: Arc::new(json),
            ttl: ttl.min(self.default_ttl),
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let matching: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| glob_matches(pattern, key))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for key in matching {
            self.cache.invalidate(&key).await;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys;
    use crate::models::FeatureFlag;

    fn flag(name: &str, enabled: bool) -> FeatureFlag {
        FeatureFlag {
            id: 1,
            name: name.to_string(),
            description: String::new(),
            enabled,
            maintenance_message: enabled.then(|| "Volvemos pronto".to_string()),
            modified_by: None,
            modified_at: None,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_struct() {
        let cache = MemoryCache::new();
        let key = keys::flag("portal_maintenance_mode");

        cache
            .set(&key, &flag("portal_maintenance_mode", true), Duration::from_secs(60))
            .await
            .unwrap();

        let cached: FeatureFlag = cache.get(&key).await.unwrap().unwrap();
        assert!(cached.enabled);
        assert_eq!(cached.maintenance_message.as_deref(), Some("Volvemos pronto"));
        assert!(cache.get::<FeatureFlag>("flags:missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_expire_after_their_ttl() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(60));

        cache.set("short", &1, Duration::from_millis(50)).await.unwrap();
        cache.set("long", &2, Duration::from_secs(30)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get::<i32>("short").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("long").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_ttl_is_capped_by_default() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_millis(50));

        cache.set("k", &"v", Duration::from_secs(3600)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get::<String>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_pattern_only_touches_matches() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        for name in ["admin_maintenance_mode", "portal_maintenance_mode", "reviews_enabled"] {
            cache.set(&keys::flag(name), &flag(name, false), ttl).await.unwrap();
        }
        cache.set(keys::PUBLIC_TAGS, &vec!["colonial"], ttl).await.unwrap();

        cache.delete_pattern(keys::FLAGS_PATTERN).await.unwrap();

        assert!(cache.get::<FeatureFlag>(&keys::flag("reviews_enabled")).await.unwrap().is_none());
        assert!(cache.get::<Vec<String>>(keys::PUBLIC_TAGS).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overwrite_and_clear() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        cache.set(keys::PROVINCES, &vec!["Córdoba"], ttl).await.unwrap();
        cache.set(keys::PROVINCES, &vec!["Córdoba", "Salta"], ttl).await.unwrap();
        let provinces: Vec<String> = cache.get(keys::PROVINCES).await.unwrap().unwrap();
        assert_eq!(provinces.len(), 2);
        assert_eq!(cache.entry_count().await, 1);

        cache.clear().await.unwrap();
        assert_eq!(cache.entry_count().await, 0);
    }
}
