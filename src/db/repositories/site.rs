//! Historic site repository
//!
//! Database operations for historic sites, their tag and category links, and
//! the category catalogue. Soft-deleted sites never show up in lookups or
//! listings.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    AdminSiteFilter, Category, HistoricSite, ListParams, PublicSiteOrder, PublicSiteQuery,
    SiteInput,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

use super::filter::{
    execute, fetch_all, fetch_count, fetch_optional, insert, placeholders, SqlValue, WhereClause,
};

/// Site repository trait
#[async_trait]
pub trait SiteRepository: Send + Sync {
    /// Insert a site with its tag and category links, returning its id
    async fn create(&self, input: &SiteInput) -> Result<i64>;

    /// Get a non-deleted site by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<HistoricSite>>;

    /// Get a non-deleted site by exact name
    async fn get_by_name(&self, name: &str) -> Result<Option<HistoricSite>>;

    /// All non-deleted sites ordered by name
    async fn list_all(&self) -> Result<Vec<HistoricSite>>;

    /// Admin listing; `None` returns every match (CSV export)
    async fn list_admin(
        &self,
        filter: &AdminSiteFilter,
        params: Option<&ListParams>,
    ) -> Result<(Vec<HistoricSite>, i64)>;

    /// Public listing of visible sites
    async fn search_public(&self, query: &PublicSiteQuery) -> Result<(Vec<HistoricSite>, i64)>;

    /// Replace the fields and the tag and category links of a site
    async fn update(&self, id: i64, input: &SiteInput) -> Result<()>;

    async fn soft_delete(&self, id: i64) -> Result<()>;

    async fn increment_visit_count(&self, id: i64) -> Result<()>;

    /// Distinct cities of non-deleted sites, sorted
    async fn list_cities(&self) -> Result<Vec<String>>;

    /// Distinct provinces of non-deleted sites, sorted
    async fn list_provinces(&self) -> Result<Vec<String>>;

    /// Tag ids linked to a site (deleted tags included)
    async fn tag_ids(&self, site_id: i64) -> Result<Vec<i64>>;

    /// Category ids linked to a site
    async fn category_ids(&self, site_id: i64) -> Result<Vec<i64>>;

    async fn create_category(&self, name: &str) -> Result<Category>;

    async fn get_categories_by_ids(&self, ids: &[i64]) -> Result<Vec<Category>>;

    /// Non-deleted categories ordered by name
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Non-deleted categories of a site
    async fn categories_for_site(&self, site_id: i64) -> Result<Vec<Category>>;
}

/// SQLx-based site repository implementation
pub struct SqlxSiteRepository {
    pool: DynDatabasePool,
}

impl SqlxSiteRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SiteRepository> {
        Arc::new(Self::new(pool))
    }

    async fn replace_links(&self, site_id: i64, input: &SiteInput) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                replace_links_sqlite(self.pool.sqlite()?, site_id, &input.tag_ids, &input.category_ids).await
            }
            DatabaseDriver::Mysql => {
                replace_links_mysql(self.pool.mysql()?, site_id, &input.tag_ids, &input.category_ids).await
            }
        }
    }

    async fn distinct_column(&self, column: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {col} FROM historic_sites WHERE deleted = 0 ORDER BY {col}",
            col = column
        );
        let rows: Vec<(String,)> = fetch_all(&self.pool, &sql, &[]).await?;
        Ok(rows.into_iter().map(|(value,)| value).collect())
    }

    async fn linked_ids(&self, sql: &str, site_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = fetch_all(&self.pool, sql, &[site_id.into()]).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

const SITE_COLUMNS: &str = r#"
    s.id, s.name, s.short_description, s.description, s.city, s.province,
    s.latitude, s.longitude, s.state_of_conservation, s.inauguration_year,
    s.visible, s.deleted, s.visit_count, s.inserted_at, s.updated_at
"#;

/// Average approved rating of `s`, NULL when unrated
const RATING_EXPR: &str = r#"(SELECT AVG(r.rating) FROM reviews r
    WHERE r.site_id = s.id AND r.state = 'approved' AND r.deleted = 0)"#;

fn admin_clause(filter: &AdminSiteFilter) -> WhereClause {
    let mut clause = WhereClause::new();
    clause.push("s.deleted = 0");
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        clause.push_contains(&["s.name", "s.short_description"], search);
    }
    if let Some(city) = &filter.city {
        clause.push_with("s.city = ?", [city.as_str()]);
    }
    if let Some(province) = &filter.province {
        clause.push_with("s.province = ?", [province.as_str()]);
    }
    if !filter.tag_ids.is_empty() {
        clause.push_with(
            format!(
                "s.id IN (SELECT site_id FROM site_tags WHERE tag_id IN ({}))",
                placeholders(filter.tag_ids.len())
            ),
            filter.tag_ids.iter().copied(),
        );
    }
    if let Some(state) = filter.state {
        clause.push_with("s.state_of_conservation = ?", [state.as_str()]);
    }
    if filter.visible_only {
        clause.push("s.visible = 1");
    }
    if let Some(range) = filter.date_range {
        clause.push_with(
            "s.inserted_at >= ? AND s.inserted_at < ?",
            [range.start_time(), range.end_time_exclusive()],
        );
    }
    clause
}

fn public_clause(query: &PublicSiteQuery) -> WhereClause {
    let mut clause = WhereClause::new();
    clause.push("s.deleted = 0").push("s.visible = 1");

    let text_filters = [
        ("s.name", &query.name),
        ("s.description", &query.description),
        ("s.city", &query.city),
        ("s.province", &query.province),
    ];
    for (column, value) in text_filters {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            clause.push_contains(&[column], value);
        }
    }
    if let Some(state) = query.state {
        clause.push_with("s.state_of_conservation = ?", [state.as_str()]);
    }
    if !query.tags.is_empty() {
        clause.push_with(
            format!(
                "s.id IN (SELECT st.site_id FROM site_tags st JOIN tags t ON t.id = st.tag_id \
                 WHERE t.deleted = 0 AND t.name IN ({}))",
                placeholders(query.tags.len())
            ),
            query.tags.iter().map(|t| SqlValue::Text(t.clone())),
        );
    }
    if let Some(near) = query.near {
        let (min_lat, max_lat) = near.latitude_bounds();
        clause.push_with("s.latitude BETWEEN ? AND ?", [min_lat, max_lat]);
    }
    if let Some(user_id) = query.favorites_of {
        clause.push_with(
            "s.id IN (SELECT site_id FROM user_favorite_sites WHERE user_id = ? AND deleted = 0)",
            [user_id],
        );
    }
    clause
}

fn public_order_sql(order: PublicSiteOrder) -> String {
    match order {
        PublicSiteOrder::Latest => "s.inserted_at DESC, s.id DESC".to_string(),
        PublicSiteOrder::Oldest => "s.inserted_at ASC, s.id ASC".to_string(),
        PublicSiteOrder::RatingDesc => {
            format!("{r} IS NULL, {r} DESC, s.id ASC", r = RATING_EXPR)
        }
        PublicSiteOrder::RatingAsc => {
            format!("{r} IS NULL, {r} ASC, s.id ASC", r = RATING_EXPR)
        }
        PublicSiteOrder::MostVisited => "s.visit_count DESC, s.id ASC".to_string(),
        PublicSiteOrder::LeastVisited => "s.visit_count ASC, s.id ASC".to_string(),
    }
}

#[async_trait]
impl SiteRepository for SqlxSiteRepository {
    async fn create(&self, input: &SiteInput) -> Result<i64> {
        let now = Utc::now();
        let sql = r#"
            INSERT INTO historic_sites (name, short_description, description, city, province,
                latitude, longitude, state_of_conservation, inauguration_year, visible,
                deleted, visit_count, inserted_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
        "#;
        let values = [
            SqlValue::from(input.name.as_str()),
            input.short_description.as_str().into(),
            input.description.as_str().into(),
            input.city.as_str().into(),
            input.province.as_str().into(),
            input.latitude.into(),
            input.longitude.into(),
            input.state_of_conservation.as_str().into(),
            (input.inauguration_year as i64).into(),
            input.visible.into(),
            now.into(),
            now.into(),
        ];
        let id = insert(&self.pool, sql, &values)
            .await
            .context("Failed to create historic site")?;

        self.replace_links(id, input).await?;
        Ok(id)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<HistoricSite>> {
        let sql = format!(
            "SELECT {} FROM historic_sites s WHERE s.id = ? AND s.deleted = 0",
            SITE_COLUMNS
        );
        fetch_optional(&self.pool, &sql, &[id.into()])
            .await
            .context("Failed to get historic site by ID")
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<HistoricSite>> {
        let sql = format!(
            "SELECT {} FROM historic_sites s WHERE s.name = ? AND s.deleted = 0",
            SITE_COLUMNS
        );
        fetch_optional(&self.pool, &sql, &[name.into()])
            .await
            .context("Failed to get historic site by name")
    }

    async fn list_all(&self) -> Result<Vec<HistoricSite>> {
        let sql = format!(
            "SELECT {} FROM historic_sites s WHERE s.deleted = 0 ORDER BY s.name",
            SITE_COLUMNS
        );
        fetch_all(&self.pool, &sql, &[])
            .await
            .context("Failed to list historic sites")
    }

    async fn list_admin(
        &self,
        filter: &AdminSiteFilter,
        params: Option<&ListParams>,
    ) -> Result<(Vec<HistoricSite>, i64)> {
        let clause = admin_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM historic_sites s{}", clause.sql());
        let total = fetch_count(&self.pool, &count_sql, clause.values())
            .await
            .context("Failed to count historic sites")?;

        let mut sql = format!(
            "SELECT {} FROM historic_sites s{} ORDER BY {}",
            SITE_COLUMNS,
            clause.sql(),
            filter.order.as_sql()
        );
        if let Some(params) = params {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", params.limit(), params.offset()));
        }

        let sites = fetch_all(&self.pool, &sql, clause.values())
            .await
            .context("Failed to list historic sites")?;
        Ok((sites, total))
    }

    async fn search_public(&self, query: &PublicSiteQuery) -> Result<(Vec<HistoricSite>, i64)> {
        let clause = public_clause(query);
        let order = public_order_sql(query.order);
        let params = &query.params;

        // Distance is checked in Rust, so radius searches paginate after filtering
        if let Some(near) = query.near {
            let sql = format!(
                "SELECT {} FROM historic_sites s{} ORDER BY {}",
                SITE_COLUMNS,
                clause.sql(),
                order
            );
            let sites: Vec<HistoricSite> = fetch_all(&self.pool, &sql, clause.values())
                .await
                .context("Failed to search historic sites")?;
            let within: Vec<HistoricSite> = sites
                .into_iter()
                .filter(|s| near.contains(s.latitude, s.longitude))
                .collect();
            let total = within.len() as i64;
            let page = within
                .into_iter()
                .skip(params.offset() as usize)
                .take(params.limit() as usize)
                .collect();
            return Ok((page, total));
        }

        let count_sql = format!("SELECT COUNT(*) FROM historic_sites s{}", clause.sql());
        let total = fetch_count(&self.pool, &count_sql, clause.values())
            .await
            .context("Failed to count historic sites")?;

        let sql = format!(
            "SELECT {} FROM historic_sites s{} ORDER BY {} LIMIT {} OFFSET {}",
            SITE_COLUMNS,
            clause.sql(),
            order,
            params.limit(),
            params.offset()
        );
        let sites = fetch_all(&self.pool, &sql, clause.values())
            .await
            .context("Failed to search historic sites")?;
        Ok((sites, total))
    }

    async fn update(&self, id: i64, input: &SiteInput) -> Result<()> {
        let sql = r#"
            UPDATE historic_sites
            SET name = ?, short_description = ?, description = ?, city = ?, province = ?,
                latitude = ?, longitude = ?, state_of_conservation = ?, inauguration_year = ?,
                visible = ?, updated_at = ?
            WHERE id = ?
        "#;
        let values = [
            SqlValue::from(input.name.as_str()),
            input.short_description.as_str().into(),
            input.description.as_str().into(),
            input.city.as_str().into(),
            input.province.as_str().into(),
            input.latitude.into(),
            input.longitude.into(),
            input.state_of_conservation.as_str().into(),
            (input.inauguration_year as i64).into(),
            input.visible.into(),
            Utc::now().into(),
            id.into(),
        ];
        execute(&self.pool, sql, &values)
            .await
            .context("Failed to update historic site")?;

        self.replace_links(id, input).await
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        execute(
            &self.pool,
            "UPDATE historic_sites SET deleted = 1, updated_at = ? WHERE id = ?",
            &[Utc::now().into(), id.into()],
        )
        .await
        .context("Failed to delete historic site")?;
        Ok(())
    }

    async fn increment_visit_count(&self, id: i64) -> Result<()> {
        execute(
            &self.pool,
            "UPDATE historic_sites SET visit_count = visit_count + 1 WHERE id = ? AND deleted = 0",
            &[id.into()],
        )
        .await
        .context("Failed to increment visit count")?;
        Ok(())
    }

    async fn list_cities(&self) -> Result<Vec<String>> {
        self.distinct_column("city")
            .await
            .context("Failed to list cities")
    }

    async fn list_provinces(&self) -> Result<Vec<String>> {
        self.distinct_column("province")
            .await
            .context("Failed to list provinces")
    }

    async fn tag_ids(&self, site_id: i64) -> Result<Vec<i64>> {
        self.linked_ids("SELECT tag_id FROM site_tags WHERE site_id = ? ORDER BY tag_id", site_id)
            .await
            .context("Failed to list site tag ids")
    }

    async fn category_ids(&self, site_id: i64) -> Result<Vec<i64>> {
        self.linked_ids(
            "SELECT category_id FROM site_categories WHERE site_id = ? ORDER BY category_id",
            site_id,
        )
        .await
        .context("Failed to list site category ids")
    }

    async fn create_category(&self, name: &str) -> Result<Category> {
        let id = insert(
            &self.pool,
            "INSERT INTO categories (name, deleted) VALUES (?, 0)",
            &[name.into()],
        )
        .await
        .context("Failed to create category")?;
        Ok(Category {
            id,
            name: name.to_string(),
            deleted: false,
        })
    }

    async fn get_categories_by_ids(&self, ids: &[i64]) -> Result<Vec<Category>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, name, deleted FROM categories WHERE deleted = 0 AND id IN ({}) ORDER BY name",
            placeholders(ids.len())
        );
        let values: Vec<SqlValue> = ids.iter().map(|id| SqlValue::Int(*id)).collect();
        fetch_all(&self.pool, &sql, &values)
            .await
            .context("Failed to get categories")
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        fetch_all(
            &self.pool,
            "SELECT id, name, deleted FROM categories WHERE deleted = 0 ORDER BY name",
            &[],
        )
        .await
        .context("Failed to list categories")
    }

    async fn categories_for_site(&self, site_id: i64) -> Result<Vec<Category>> {
        let sql = r#"
            SELECT c.id, c.name, c.deleted FROM categories c
            JOIN site_categories sc ON sc.category_id = c.id
            WHERE sc.site_id = ? AND c.deleted = 0
            ORDER BY c.name
        "#;
        fetch_all(&self.pool, sql, &[site_id.into()])
            .await
            .context("Failed to list site categories")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn replace_links_sqlite(
    pool: &SqlitePool,
    site_id: i64,
    tag_ids: &[i64],
    category_ids: &[i64],
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM site_tags WHERE site_id = ?")
        .bind(site_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear site tags")?;
    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO site_tags (site_id, tag_id) VALUES (?, ?)")
            .bind(site_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link tag")?;
    }

    sqlx::query("DELETE FROM site_categories WHERE site_id = ?")
        .bind(site_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear site categories")?;
    for category_id in category_ids {
        sqlx::query("INSERT OR IGNORE INTO site_categories (site_id, category_id) VALUES (?, ?)")
            .bind(site_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link category")?;
    }

    tx.commit().await.context("Failed to commit site links")?;
    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn replace_links_mysql(
    pool: &MySqlPool,
    site_id: i64,
    tag_ids: &[i64],
    category_ids: &[i64],
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM site_tags WHERE site_id = ?")
        .bind(site_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear site tags")?;
    for tag_id in tag_ids {
        sqlx::query("INSERT IGNORE INTO site_tags (site_id, tag_id) VALUES (?, ?)")
            .bind(site_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link tag")?;
    }

    sqlx::query("DELETE FROM site_categories WHERE site_id = ?")
        .bind(site_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear site categories")?;
    for category_id in category_ids {
        sqlx::query("INSERT IGNORE INTO site_categories (site_id, category_id) VALUES (?, ?)")
            .bind(site_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link category")?;
    }

    tx.commit().await.context("Failed to commit site links")?;
    Ok(())
}
