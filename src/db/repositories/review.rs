//! Review repository
//!
//! Reviews are read through [`ReviewView`], which joins in the author and
//! the site. The author's full name is concatenated in SQL, which is the
//! only dialect difference besides the rating average.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    ListParams, Review, ReviewFilter, ReviewState, ReviewView, SortDirection,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

use super::filter::{
    execute, fetch_all, fetch_count, fetch_optional, insert, SqlValue, WhereClause,
};

/// Review repository trait
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Insert a pending review
    async fn create(&self, site_id: i64, user_id: i64, rating: i64, comment: &str) -> Result<Review>;

    /// Get a non-deleted review by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Review>>;

    /// Get a non-deleted review with its author and site
    async fn get_view(&self, id: i64) -> Result<Option<ReviewView>>;

    /// Admin listing of non-deleted reviews
    async fn list_admin(
        &self,
        filter: &ReviewFilter,
        params: &ListParams,
    ) -> Result<(Vec<ReviewView>, i64)>;

    /// Whether the user has a non-deleted review of the site
    async fn exists_for(&self, user_id: i64, site_id: i64) -> Result<bool>;

    /// Page of approved reviews of a site, newest first
    async fn approved_for_site(
        &self,
        site_id: i64,
        params: &ListParams,
    ) -> Result<(Vec<ReviewView>, i64)>;

    /// Every approved review of a site, newest first
    async fn all_approved_for_site(&self, site_id: i64) -> Result<Vec<ReviewView>>;

    /// Page of a user's approved reviews by `inserted_at`
    async fn approved_for_user(
        &self,
        user_id: i64,
        direction: SortDirection,
        params: &ListParams,
    ) -> Result<(Vec<ReviewView>, i64)>;

    /// Average rating of the approved reviews of a site
    async fn average_rating(&self, site_id: i64) -> Result<Option<f64>>;

    /// Set the moderation state; `reason` is stored as given
    async fn set_state(&self, id: i64, state: ReviewState, reason: Option<&str>) -> Result<()>;

    async fn soft_delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based review repository implementation
pub struct SqlxReviewRepository {
    pool: DynDatabasePool,
}

impl SqlxReviewRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReviewRepository> {
        Arc::new(Self::new(pool))
    }

    fn full_name_expr(&self) -> &'static str {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => "TRIM(u.name || ' ' || u.last_name)",
            DatabaseDriver::Mysql => "TRIM(CONCAT(u.name, ' ', u.last_name))",
        }
    }

    fn select_view(&self) -> String {
        format!(
            r#"SELECT r.id, r.site_id, r.rating, r.comment, r.inserted_at, r.updated_at, r.state,
                r.user_id, {} AS user_name, u.email AS user_email, r.rejected_reason,
                s.name AS site_name
            FROM reviews r
            JOIN users u ON u.id = r.user_id
            JOIN historic_sites s ON s.id = r.site_id"#,
            self.full_name_expr()
        )
    }

    async fn page(
        &self,
        clause: &WhereClause,
        order: &str,
        params: &ListParams,
    ) -> Result<(Vec<ReviewView>, i64)> {
        let count_sql = format!(
            "SELECT COUNT(*) FROM reviews r JOIN users u ON u.id = r.user_id{}",
            clause.sql()
        );
        let total = fetch_count(&self.pool, &count_sql, clause.values()).await?;

        let sql = format!(
            "{}{} ORDER BY {} LIMIT {} OFFSET {}",
            self.select_view(),
            clause.sql(),
            order,
            params.limit(),
            params.offset()
        );
        let reviews = fetch_all(&self.pool, &sql, clause.values()).await?;
        Ok((reviews, total))
    }
}

const SELECT_REVIEW: &str = r#"
    SELECT id, site_id, user_id, rating, comment, state, rejected_reason, deleted,
           inserted_at, updated_at
    FROM reviews
"#;

fn approved_clause() -> WhereClause {
    let mut clause = WhereClause::new();
    clause
        .push("r.deleted = 0")
        .push_with("r.state = ?", [ReviewState::Approved.as_str()]);
    clause
}

#[async_trait]
impl ReviewRepository for SqlxReviewRepository {
    async fn create(&self, site_id: i64, user_id: i64, rating: i64, comment: &str) -> Result<Review> {
        let now = Utc::now();
        let id = insert(
            &self.pool,
            r#"INSERT INTO reviews (site_id, user_id, rating, comment, state, deleted, inserted_at, updated_at)
               VALUES (?, ?, ?, ?, ?, 0, ?, ?)"#,
            &[
                site_id.into(),
                user_id.into(),
                rating.into(),
                comment.into(),
                ReviewState::Pending.as_str().into(),
                now.into(),
                now.into(),
            ],
        )
        .await
        .context("Failed to create review")?;

        Ok(Review {
            id,
            site_id,
            user_id,
            rating,
            comment: comment.to_string(),
            state: ReviewState::Pending,
            rejected_reason: None,
            deleted: false,
            inserted_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Review>> {
        let sql = format!("{} WHERE id = ? AND deleted = 0", SELECT_REVIEW);
        fetch_optional(&self.pool, &sql, &[id.into()])
            .await
            .context("Failed to get review by ID")
    }

    async fn get_view(&self, id: i64) -> Result<Option<ReviewView>> {
        let sql = format!("{} WHERE r.id = ? AND r.deleted = 0", self.select_view());
        fetch_optional(&self.pool, &sql, &[id.into()])
            .await
            .context("Failed to get review")
    }

    async fn list_admin(
        &self,
        filter: &ReviewFilter,
        params: &ListParams,
    ) -> Result<(Vec<ReviewView>, i64)> {
        let mut clause = WhereClause::new();
        clause.push("r.deleted = 0");
        if let Some(site_id) = filter.site_id {
            clause.push_with("r.site_id = ?", [site_id]);
        }
        if let Some(state) = filter.state {
            clause.push_with("r.state = ?", [state.as_str()]);
        }
        if let Some(rating) = filter.rating {
            clause.push_with("r.rating = ?", [rating]);
        }
        if let Some(range) = filter.date_range {
            clause.push_with(
                "r.inserted_at >= ? AND r.inserted_at < ?",
                [range.start_time(), range.end_time_exclusive()],
            );
        }
        if let Some(user) = filter.user.as_deref().filter(|u| !u.trim().is_empty()) {
            clause.push_contains(&["u.email", self.full_name_expr()], user);
        }

        self.page(&clause, filter.order.as_sql(), params)
            .await
            .context("Failed to list reviews")
    }

    async fn exists_for(&self, user_id: i64, site_id: i64) -> Result<bool> {
        let count = fetch_count(
            &self.pool,
            "SELECT COUNT(*) FROM reviews WHERE user_id = ? AND site_id = ? AND deleted = 0",
            &[user_id.into(), site_id.into()],
        )
        .await
        .context("Failed to check existing review")?;
        Ok(count > 0)
    }

    async fn approved_for_site(
        &self,
        site_id: i64,
        params: &ListParams,
    ) -> Result<(Vec<ReviewView>, i64)> {
        let mut clause = approved_clause();
        clause.push_with("r.site_id = ?", [site_id]);
        self.page(&clause, "r.inserted_at DESC, r.id DESC", params)
            .await
            .context("Failed to list site reviews")
    }

    async fn all_approved_for_site(&self, site_id: i64) -> Result<Vec<ReviewView>> {
        let mut clause = approved_clause();
        clause.push_with("r.site_id = ?", [site_id]);
        let sql = format!(
            "{}{} ORDER BY r.inserted_at DESC, r.id DESC",
            self.select_view(),
            clause.sql()
        );
        fetch_all(&self.pool, &sql, clause.values())
            .await
            .context("Failed to list site reviews")
    }

    async fn approved_for_user(
        &self,
        user_id: i64,
        direction: SortDirection,
        params: &ListParams,
    ) -> Result<(Vec<ReviewView>, i64)> {
        let mut clause = approved_clause();
        clause.push_with("r.user_id = ?", [user_id]);
        let order = format!(
            "r.inserted_at {dir}, r.id {dir}",
            dir = direction.as_sql()
        );
        self.page(&clause, &order, params)
            .await
            .context("Failed to list user reviews")
    }

    async fn average_rating(&self, site_id: i64) -> Result<Option<f64>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => average_rating_sqlite(self.pool.sqlite()?, site_id).await,
            DatabaseDriver::Mysql => average_rating_mysql(self.pool.mysql()?, site_id).await,
        }
    }

    async fn set_state(&self, id: i64, state: ReviewState, reason: Option<&str>) -> Result<()> {
        execute(
            &self.pool,
            "UPDATE reviews SET state = ?, rejected_reason = ?, updated_at = ? WHERE id = ?",
            &[
                state.as_str().into(),
                SqlValue::from(reason),
                Utc::now().into(),
                id.into(),
            ],
        )
        .await
        .context("Failed to update review state")?;
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        execute(
            &self.pool,
            "UPDATE reviews SET deleted = 1, updated_at = ? WHERE id = ?",
            &[Utc::now().into(), id.into()],
        )
        .await
        .context("Failed to delete review")?;
        Ok(())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn average_rating_sqlite(pool: &SqlitePool, site_id: i64) -> Result<Option<f64>> {
    let avg: Option<f64> = sqlx::query_scalar(
        "SELECT AVG(CAST(rating AS REAL)) FROM reviews WHERE site_id = ? AND state = 'approved' AND deleted = 0",
    )
    .bind(site_id)
    .fetch_one(pool)
    .await
    .context("Failed to compute rating")?;
    Ok(avg)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn average_rating_mysql(pool: &MySqlPool, site_id: i64) -> Result<Option<f64>> {
    let avg: Option<f64> = sqlx::query_scalar(
        "SELECT CAST(AVG(rating) AS DOUBLE) FROM reviews WHERE site_id = ? AND state = 'approved' AND deleted = 0",
    )
    .bind(site_id)
    .fetch_one(pool)
    .await
    .context("Failed to compute rating")?;
    Ok(avg)
}
