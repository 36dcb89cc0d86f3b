//! Tag repository
//!
//! Database operations for tags. Tag names are slugs and unique across all
//! rows, deleted ones included, so a deleted tag can be restored by name.

use crate::db::DynDatabasePool;
use crate::models::{ListParams, Tag, TagOrder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::filter::{
    execute, fetch_all, fetch_count, fetch_optional, insert, placeholders, SqlValue, WhereClause,
};

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Insert a new tag
    async fn create(&self, name: &str) -> Result<Tag>;

    /// Get a non-deleted tag by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    /// Get a tag by name, deleted or not
    async fn find_by_name_any(&self, name: &str) -> Result<Option<Tag>>;

    /// Filtered page of non-deleted tags and the total match count
    async fn list_page(
        &self,
        search: Option<&str>,
        order: TagOrder,
        params: &ListParams,
    ) -> Result<(Vec<Tag>, i64)>;

    /// All non-deleted tags ordered by name
    async fn list_all(&self) -> Result<Vec<Tag>>;

    /// Non-deleted tags among `ids`
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>>;

    /// Non-deleted tags among `names`
    async fn get_by_names(&self, names: &[String]) -> Result<Vec<Tag>>;

    /// Non-deleted tags of a site ordered by name
    async fn list_for_site(&self, site_id: i64) -> Result<Vec<Tag>>;

    async fn rename(&self, id: i64, name: &str) -> Result<()>;

    /// Clear the deleted mark of a tag
    async fn restore(&self, id: i64) -> Result<()>;

    async fn soft_delete(&self, id: i64) -> Result<()>;

    /// Remove a tag row and its site links
    async fn hard_delete(&self, id: i64) -> Result<()>;

    /// Number of non-deleted sites carrying the tag
    async fn count_active_sites(&self, tag_id: i64) -> Result<i64>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_TAG: &str = "SELECT id, name, created_at, deleted FROM tags";

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, name: &str) -> Result<Tag> {
        let now = Utc::now();
        let id = insert(
            &self.pool,
            "INSERT INTO tags (name, created_at, deleted) VALUES (?, ?, 0)",
            &[name.into(), now.into()],
        )
        .await
        .context("Failed to create tag")?;

        Ok(Tag {
            id,
            name: name.to_string(),
            created_at: now,
            deleted: false,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let sql = format!("{} WHERE id = ? AND deleted = 0", SELECT_TAG);
        fetch_optional(&self.pool, &sql, &[id.into()])
            .await
            .context("Failed to get tag by ID")
    }

    async fn find_by_name_any(&self, name: &str) -> Result<Option<Tag>> {
        let sql = format!("{} WHERE name = ?", SELECT_TAG);
        fetch_optional(&self.pool, &sql, &[name.into()])
            .await
            .context("Failed to get tag by name")
    }

    async fn list_page(
        &self,
        search: Option<&str>,
        order: TagOrder,
        params: &ListParams,
    ) -> Result<(Vec<Tag>, i64)> {
        let mut clause = WhereClause::new();
        clause.push("deleted = 0");
        if let Some(search) = search.filter(|s| !s.trim().is_empty()) {
            clause.push_contains(&["name"], search);
        }

        let count_sql = format!("SELECT COUNT(*) FROM tags{}", clause.sql());
        let total = fetch_count(&self.pool, &count_sql, clause.values())
            .await
            .context("Failed to count tags")?;

        let sql = format!(
            "{}{} ORDER BY {} LIMIT {} OFFSET {}",
            SELECT_TAG,
            clause.sql(),
            order.as_sql(),
            params.limit(),
            params.offset()
        );
        let tags = fetch_all(&self.pool, &sql, clause.values())
            .await
            .context("Failed to list tags")?;
        Ok((tags, total))
    }

    async fn list_all(&self) -> Result<Vec<Tag>> {
        let sql = format!("{} WHERE deleted = 0 ORDER BY name", SELECT_TAG);
        fetch_all(&self.pool, &sql, &[])
            .await
            .context("Failed to list tags")
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE deleted = 0 AND id IN ({}) ORDER BY name",
            SELECT_TAG,
            placeholders(ids.len())
        );
        let values: Vec<SqlValue> = ids.iter().map(|id| SqlValue::Int(*id)).collect();
        fetch_all(&self.pool, &sql, &values)
            .await
            .context("Failed to get tags by ID")
    }

    async fn get_by_names(&self, names: &[String]) -> Result<Vec<Tag>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE deleted = 0 AND name IN ({}) ORDER BY name",
            SELECT_TAG,
            placeholders(names.len())
        );
        let values: Vec<SqlValue> = names.iter().map(|n| SqlValue::Text(n.clone())).collect();
        fetch_all(&self.pool, &sql, &values)
            .await
            .context("Failed to get tags by name")
    }

    async fn list_for_site(&self, site_id: i64) -> Result<Vec<Tag>> {
        let sql = r#"
            SELECT t.id, t.name, t.created_at, t.deleted
            FROM tags t
            JOIN site_tags st ON st.tag_id = t.id
            WHERE st.site_id = ? AND t.deleted = 0
            ORDER BY t.name
        "#;
        fetch_all(&self.pool, sql, &[site_id.into()])
            .await
            .context("Failed to list site tags")
    }

    async fn rename(&self, id: i64, name: &str) -> Result<()> {
        execute(&self.pool, "UPDATE tags SET name = ? WHERE id = ?", &[name.into(), id.into()])
            .await
            .context("Failed to rename tag")?;
        Ok(())
    }

    async fn restore(&self, id: i64) -> Result<()> {
        execute(&self.pool, "UPDATE tags SET deleted = 0 WHERE id = ?", &[id.into()])
            .await
            .context("Failed to restore tag")?;
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        execute(&self.pool, "UPDATE tags SET deleted = 1 WHERE id = ?", &[id.into()])
            .await
            .context("Failed to delete tag")?;
        Ok(())
    }

    async fn hard_delete(&self, id: i64) -> Result<()> {
        execute(&self.pool, "DELETE FROM site_tags WHERE tag_id = ?", &[id.into()])
            .await
            .context("Failed to unlink tag")?;
        execute(&self.pool, "DELETE FROM tags WHERE id = ?", &[id.into()])
            .await
            .context("Failed to remove tag")?;
        Ok(())
    }

    async fn count_active_sites(&self, tag_id: i64) -> Result<i64> {
        let sql = r#"
            SELECT COUNT(*) FROM site_tags st
            JOIN historic_sites s ON s.id = st.site_id
            WHERE st.tag_id = ? AND s.deleted = 0
        "#;
        fetch_count(&self.pool, sql, &[tag_id.into()])
            .await
            .context("Failed to count tag usage")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_site, setup_pool};

    #[tokio::test]
    async fn test_create_and_lookup_tags() {
        let pool = setup_pool().await;
        let repo = SqlxTagRepository::new(pool);

        let colonial = repo.create("colonial").await.unwrap();
        let museo = repo.create("museo").await.unwrap();

        assert_eq!(repo.get_by_id(colonial.id).await.unwrap().unwrap().name, "colonial");
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
        assert_eq!(
            repo.get_by_ids(&[museo.id, 999]).await.unwrap(),
            vec![museo.clone()]
        );
        assert_eq!(
            repo.get_by_names(&["museo".to_string(), "ghost".to_string()])
                .await
                .unwrap(),
            vec![museo]
        );
        assert!(repo.create("colonial").await.is_err());
    }

    #[tokio::test]
    async fn test_soft_delete_restore_and_hard_delete() {
        let pool = setup_pool().await;
        let repo = SqlxTagRepository::new(pool);

        let tag = repo.create("ruinas").await.unwrap();
        repo.soft_delete(tag.id).await.unwrap();
        assert!(repo.get_by_id(tag.id).await.unwrap().is_none());
        assert!(repo.find_by_name_any("ruinas").await.unwrap().unwrap().deleted);

        repo.restore(tag.id).await.unwrap();
        assert!(repo.get_by_id(tag.id).await.unwrap().is_some());

        repo.hard_delete(tag.id).await.unwrap();
        assert!(repo.find_by_name_any("ruinas").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_page_search_and_order() {
        let pool = setup_pool().await;
        let repo = SqlxTagRepository::new(pool);

        for name in ["iglesia", "museo", "museo-naval", "puente"] {
            repo.create(name).await.unwrap();
        }

        let (tags, total) = repo
            .list_page(Some("MUSEO"), TagOrder::Alphabetical, &ListParams::admin(1))
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(tags[0].name, "museo");

        let (tags, total) = repo
            .list_page(None, TagOrder::ReverseAlphabetical, &ListParams::new(2, 3))
            .await
            .unwrap();
        assert_eq!(total, 4);
        assert_eq!(tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["iglesia"]);
    }

    #[tokio::test]
    async fn test_count_active_sites() {
        let pool = setup_pool().await;
        let repo = SqlxTagRepository::new(pool.clone());
        let tag = repo.create("faro").await.unwrap();
        let site_id = insert_site(&pool, "Faro Querandí").await;

        sqlx::query("INSERT INTO site_tags (site_id, tag_id) VALUES (?, ?)")
            .bind(site_id)
            .bind(tag.id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(repo.count_active_sites(tag.id).await.unwrap(), 1);
        assert_eq!(repo.list_for_site(site_id).await.unwrap(), vec![tag.clone()]);

        sqlx::query("UPDATE historic_sites SET deleted = 1 WHERE id = ?")
            .bind(site_id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(repo.count_active_sites(tag.id).await.unwrap(), 0);
    }
}
