//! Favourite sites repository
//!
//! A favourite is a `(user_id, site_id)` row; removing one only marks it
//! deleted so re-adding it flips the mark back.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{HistoricSite, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

use super::filter::{execute, fetch_all, fetch_count};

/// Favourite repository trait
#[async_trait]
pub trait FavoriteRepository: Send + Sync {
    /// Mark a site as favourite; adding twice is a no-op
    async fn add(&self, user_id: i64, site_id: i64) -> Result<()>;

    /// Unmark a site; removing a missing favourite is a no-op
    async fn remove(&self, user_id: i64, site_id: i64) -> Result<()>;

    async fn is_favorite(&self, user_id: i64, site_id: i64) -> Result<bool>;

    /// Page of the user's favourite sites, most recently added first
    async fn list(&self, user_id: i64, params: &ListParams) -> Result<(Vec<HistoricSite>, i64)>;
}

/// SQLx-based favourite repository implementation
pub struct SqlxFavoriteRepository {
    pool: DynDatabasePool,
}

impl SqlxFavoriteRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FavoriteRepository> {
        Arc::new(Self::new(pool))
    }
}

const FAVORITES_FROM: &str = r#"
    FROM user_favorite_sites f
    JOIN historic_sites s ON s.id = f.site_id
    WHERE f.user_id = ? AND f.deleted = 0 AND s.deleted = 0
"#;

#[async_trait]
impl FavoriteRepository for SqlxFavoriteRepository {
    async fn add(&self, user_id: i64, site_id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => add_sqlite(self.pool.sqlite()?, user_id, site_id).await,
            DatabaseDriver::Mysql => add_mysql(self.pool.mysql()?, user_id, site_id).await,
        }
    }

    async fn remove(&self, user_id: i64, site_id: i64) -> Result<()> {
        execute(
            &self.pool,
            "UPDATE user_favorite_sites SET deleted = 1 WHERE user_id = ? AND site_id = ?",
            &[user_id.into(), site_id.into()],
        )
        .await
        .context("Failed to remove favourite")?;
        Ok(())
    }

    async fn is_favorite(&self, user_id: i64, site_id: i64) -> Result<bool> {
        let count = fetch_count(
            &self.pool,
            "SELECT COUNT(*) FROM user_favorite_sites WHERE user_id = ? AND site_id = ? AND deleted = 0",
            &[user_id.into(), site_id.into()],
        )
        .await
        .context("Failed to check favourite")?;
        Ok(count > 0)
    }

    async fn list(&self, user_id: i64, params: &ListParams) -> Result<(Vec<HistoricSite>, i64)> {
        let count_sql = format!("SELECT COUNT(*) {}", FAVORITES_FROM);
        let total = fetch_count(&self.pool, &count_sql, &[user_id.into()])
            .await
            .context("Failed to count favourites")?;

        let sql = format!(
            r#"SELECT s.id, s.name, s.short_description, s.description, s.city, s.province,
                s.latitude, s.longitude, s.state_of_conservation, s.inauguration_year,
                s.visible, s.deleted, s.visit_count, s.inserted_at, s.updated_at
            {} ORDER BY f.created_at DESC, s.id DESC LIMIT {} OFFSET {}"#,
            FAVORITES_FROM,
            params.limit(),
            params.offset()
        );
        let sites = fetch_all(&self.pool, &sql, &[user_id.into()])
            .await
            .context("Failed to list favourites")?;
        Ok((sites, total))
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn add_sqlite(pool: &SqlitePool, user_id: i64, site_id: i64) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO user_favorite_sites (user_id, site_id, deleted, created_at)
           VALUES (?, ?, 0, ?)
           ON CONFLICT(user_id, site_id) DO UPDATE SET deleted = 0"#,
    )
    .bind(user_id)
    .bind(site_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to add favourite")?;
    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn add_mysql(pool: &MySqlPool, user_id: i64, site_id: i64) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO user_favorite_sites (user_id, site_id, deleted, created_at)
           VALUES (?, ?, FALSE, ?)
           ON DUPLICATE KEY UPDATE deleted = FALSE"#,
    )
    .bind(user_id)
    .bind(site_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to add favourite")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_site, insert_user, setup_pool};

    #[tokio::test]
    async fn test_add_and_remove_are_idempotent() {
        let pool = setup_pool().await;
        let user_id = insert_user(&pool, "fan@example.com").await;
        let site_id = insert_site(&pool, "Catedral").await;
        let repo = SqlxFavoriteRepository::new(pool);

        repo.add(user_id, site_id).await.unwrap();
        repo.add(user_id, site_id).await.unwrap();
        assert!(repo.is_favorite(user_id, site_id).await.unwrap());

        repo.remove(user_id, site_id).await.unwrap();
        repo.remove(user_id, site_id).await.unwrap();
        assert!(!repo.is_favorite(user_id, site_id).await.unwrap());

        repo.add(user_id, site_id).await.unwrap();
        assert!(repo.is_favorite(user_id, site_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_skips_deleted_sites() {
        let pool = setup_pool().await;
        let user_id = insert_user(&pool, "fan@example.com").await;
        let a = insert_site(&pool, "Catedral").await;
        let b = insert_site(&pool, "Cabildo").await;
        let repo = SqlxFavoriteRepository::new(pool.clone());

        repo.add(user_id, a).await.unwrap();
        repo.add(user_id, b).await.unwrap();
        assert_eq!(repo.list(user_id, &ListParams::default()).await.unwrap().1, 2);

        sqlx::query("UPDATE historic_sites SET deleted = 1 WHERE id = ?")
            .bind(b)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();
        let (sites, total) = repo.list(user_id, &ListParams::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(sites[0].name, "Catedral");
    }
}
