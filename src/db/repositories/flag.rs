//! Feature flag repository

use crate::db::DynDatabasePool;
use crate::models::FeatureFlag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::filter::{execute, fetch_all, fetch_optional, insert, SqlValue};

/// Feature flag repository trait
#[async_trait]
pub trait FlagRepository: Send + Sync {
    /// All flags ordered by name
    async fn list(&self) -> Result<Vec<FeatureFlag>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<FeatureFlag>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<FeatureFlag>>;

    /// Insert a disabled flag
    async fn create(&self, name: &str, description: &str) -> Result<FeatureFlag>;

    /// Store a new state, stamping the author and time
    async fn update(
        &self,
        id: i64,
        enabled: bool,
        maintenance_message: Option<&str>,
        modified_by: &str,
    ) -> Result<()>;
}

/// SQLx-based feature flag repository implementation
pub struct SqlxFlagRepository {
    pool: DynDatabasePool,
}

impl SqlxFlagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FlagRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_FLAG: &str = r#"
    SELECT id, name, description, enabled, maintenance_message, modified_by, modified_at
    FROM feature_flags
"#;

#[async_trait]
impl FlagRepository for SqlxFlagRepository {
    async fn list(&self) -> Result<Vec<FeatureFlag>> {
        let sql = format!("{} ORDER BY name", SELECT_FLAG);
        fetch_all(&self.pool, &sql, &[])
            .await
            .context("Failed to list feature flags")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<FeatureFlag>> {
        let sql = format!("{} WHERE id = ?", SELECT_FLAG);
        fetch_optional(&self.pool, &sql, &[id.into()])
            .await
            .context("Failed to get feature flag")
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<FeatureFlag>> {
        let sql = format!("{} WHERE name = ?", SELECT_FLAG);
        fetch_optional(&self.pool, &sql, &[name.into()])
            .await
            .context("Failed to get feature flag by name")
    }

    async fn create(&self, name: &str, description: &str) -> Result<FeatureFlag> {
        let id = insert(
            &self.pool,
            "INSERT INTO feature_flags (name, description, enabled) VALUES (?, ?, 0)",
            &[name.into(), description.into()],
        )
        .await
        .context("Failed to create feature flag")?;

        Ok(FeatureFlag {
            id,
            name: name.to_string(),
            description: description.to_string(),
            enabled: false,
            maintenance_message: None,
            modified_by: None,
            modified_at: None,
        })
    }

    async fn update(
        &self,
        id: i64,
        enabled: bool,
        maintenance_message: Option<&str>,
        modified_by: &str,
    ) -> Result<()> {
        execute(
            &self.pool,
            r#"UPDATE feature_flags
               SET enabled = ?, maintenance_message = ?, modified_by = ?, modified_at = ?
               WHERE id = ?"#,
            &[
                enabled.into(),
                SqlValue::from(maintenance_message),
                modified_by.into(),
                Utc::now().into(),
                id.into(),
            ],
        )
        .await
        .context("Failed to update feature flag")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;

    #[tokio::test]
    async fn test_create_get_update() {
        let pool = setup_pool().await;
        let repo = SqlxFlagRepository::new(pool);

        let flag = repo
            .create("portal_maintenance_mode", "Blocks the portal")
            .await
            .unwrap();
        assert!(!flag.enabled);
        assert!(flag.is_maintenance());

        repo.update(flag.id, true, Some("Back soon"), "admin@example.com")
            .await
            .unwrap();
        let stored = repo
            .get_by_name("portal_maintenance_mode")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.enabled);
        assert_eq!(stored.maintenance_message.as_deref(), Some("Back soon"));
        assert_eq!(stored.modified_by.as_deref(), Some("admin@example.com"));
        assert!(stored.modified_at.is_some());

        assert_eq!(repo.get_by_id(flag.id).await.unwrap(), Some(stored));
        assert!(repo.create("portal_maintenance_mode", "dup").await.is_err());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
