//! Image repository
//!
//! Gallery rows of a site. The stored object itself lives in the object
//! storage; this table only keeps its key, public URL and display metadata.

use crate::db::DynDatabasePool;
use crate::models::{Image, NewImage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::filter::{execute, fetch_all, fetch_count, fetch_optional, insert, SqlValue};

/// Image repository trait
#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn create(&self, image: &NewImage) -> Result<Image>;

    /// Get an image by ID, deleted or not
    async fn get_by_id(&self, id: i64) -> Result<Option<Image>>;

    /// Non-deleted images of a site by `order_index`
    async fn list_active(&self, site_id: i64) -> Result<Vec<Image>>;

    async fn count_active(&self, site_id: i64) -> Result<i64>;

    /// Make `image_id` the only cover of `site_id`
    async fn set_cover(&self, site_id: i64, image_id: i64) -> Result<()>;

    async fn set_order(&self, site_id: i64, image_id: i64, order_index: i64) -> Result<()>;

    async fn soft_delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based image repository implementation
pub struct SqlxImageRepository {
    pool: DynDatabasePool,
}

impl SqlxImageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ImageRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_IMAGE: &str = r#"
    SELECT id, site_id, url, object_key, title, description, order_index, is_cover,
           content_type, size, deleted, created_at, updated_at
    FROM images
"#;

#[async_trait]
impl ImageRepository for SqlxImageRepository {
    async fn create(&self, image: &NewImage) -> Result<Image> {
        let now = Utc::now();
        let sql = r#"
            INSERT INTO images (site_id, url, object_key, title, description, order_index,
                is_cover, content_type, size, deleted, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#;
        let values = [
            SqlValue::from(image.site_id),
            image.url.as_str().into(),
            image.object_key.as_str().into(),
            image.title.as_str().into(),
            image.description.clone().into(),
            image.order_index.into(),
            image.is_cover.into(),
            image.content_type.as_str().into(),
            image.size.into(),
            now.into(),
            now.into(),
        ];
        let id = insert(&self.pool, sql, &values)
            .await
            .context("Failed to create image")?;

        Ok(Image {
            id,
            site_id: image.site_id,
            url: image.url.clone(),
            object_key: image.object_key.clone(),
            title: image.title.clone(),
            description: image.description.clone(),
            order_index: image.order_index,
            is_cover: image.is_cover,
            content_type: image.content_type.clone(),
            size: image.size,
            deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Image>> {
        let sql = format!("{} WHERE id = ?", SELECT_IMAGE);
        fetch_optional(&self.pool, &sql, &[id.into()])
            .await
            .context("Failed to get image by ID")
    }

    async fn list_active(&self, site_id: i64) -> Result<Vec<Image>> {
        let sql = format!(
            "{} WHERE site_id = ? AND deleted = 0 ORDER BY order_index, id",
            SELECT_IMAGE
        );
        fetch_all(&self.pool, &sql, &[site_id.into()])
            .await
            .context("Failed to list images")
    }

    async fn count_active(&self, site_id: i64) -> Result<i64> {
        fetch_count(
            &self.pool,
            "SELECT COUNT(*) FROM images WHERE site_id = ? AND deleted = 0",
            &[site_id.into()],
        )
        .await
        .context("Failed to count images")
    }

    async fn set_cover(&self, site_id: i64, image_id: i64) -> Result<()> {
        let now = Utc::now();
        execute(
            &self.pool,
            "UPDATE images SET is_cover = 0, updated_at = ? WHERE site_id = ? AND is_cover = 1",
            &[now.into(), site_id.into()],
        )
        .await
        .context("Failed to clear cover images")?;
        execute(
            &self.pool,
            "UPDATE images SET is_cover = 1, updated_at = ? WHERE id = ? AND site_id = ?",
            &[now.into(), image_id.into(), site_id.into()],
        )
        .await
        .context("Failed to set cover image")?;
        Ok(())
    }

    async fn set_order(&self, site_id: i64, image_id: i64, order_index: i64) -> Result<()> {
        execute(
            &self.pool,
            "UPDATE images SET order_index = ?, updated_at = ? WHERE id = ? AND site_id = ?",
            &[order_index.into(), Utc::now().into(), image_id.into(), site_id.into()],
        )
        .await
        .context("Failed to reorder image")?;
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        execute(
            &self.pool,
            "UPDATE images SET deleted = 1, is_cover = 0, updated_at = ? WHERE id = ?",
            &[Utc::now().into(), id.into()],
        )
        .await
        .context("Failed to delete image")?;
        Ok(())
    }
}
