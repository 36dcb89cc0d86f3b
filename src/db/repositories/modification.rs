//! Modification repository
//!
//! Append-only audit trail of site changes. Each modification row owns a set
//! of kinds stored in `modification_kinds`.

use crate::db::DynDatabasePool;
use crate::models::{ListParams, Modification, ModificationFilter, ModificationKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::filter::{
    execute, fetch_all, fetch_count, fetch_optional, insert, placeholders, SqlValue, WhereClause,
};

/// Modification repository trait
#[async_trait]
pub trait ModificationRepository: Send + Sync {
    /// Record a modification; `kinds` may be empty
    async fn create(&self, site_id: i64, user_id: i64, kinds: &[ModificationKind]) -> Result<i64>;

    /// Filtered page of a site's modifications, newest first
    async fn list(
        &self,
        site_id: i64,
        filter: &ModificationFilter,
        params: &ListParams,
    ) -> Result<(Vec<Modification>, i64)>;

    /// User of the site's oldest modification
    async fn first_author(&self, site_id: i64) -> Result<Option<i64>>;
}

/// SQLx-based modification repository implementation
pub struct SqlxModificationRepository {
    pool: DynDatabasePool,
}

impl SqlxModificationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ModificationRepository> {
        Arc::new(Self::new(pool))
    }

    async fn kinds_for(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<ModificationKind>>> {
        let mut kinds: HashMap<i64, Vec<ModificationKind>> = HashMap::new();
        if ids.is_empty() {
            return Ok(kinds);
        }

        let sql = format!(
            "SELECT modification_id, kind FROM modification_kinds WHERE modification_id IN ({})",
            placeholders(ids.len())
        );
        let values: Vec<SqlValue> = ids.iter().map(|id| SqlValue::Int(*id)).collect();
        let rows: Vec<(i64, String)> = fetch_all(&self.pool, &sql, &values).await?;

        for (modification_id, kind) in rows {
            match kind.parse::<ModificationKind>() {
                Ok(kind) => kinds.entry(modification_id).or_default().push(kind),
                Err(e) => tracing::warn!("Skipping modification kind: {}", e),
            }
        }
        for list in kinds.values_mut() {
            list.sort();
        }
        Ok(kinds)
    }
}

#[derive(sqlx::FromRow)]
struct ModificationRow {
    id: i64,
    site_id: i64,
    user_id: i64,
    user_email: Option<String>,
    date_time: DateTime<Utc>,
}

#[async_trait]
impl ModificationRepository for SqlxModificationRepository {
    async fn create(&self, site_id: i64, user_id: i64, kinds: &[ModificationKind]) -> Result<i64> {
        let id = insert(
            &self.pool,
            "INSERT INTO modifications (site_id, user_id, date_time, deleted) VALUES (?, ?, ?, 0)",
            &[site_id.into(), user_id.into(), Utc::now().into()],
        )
        .await
        .context("Failed to create modification")?;

        for kind in kinds {
            execute(
                &self.pool,
                "INSERT INTO modification_kinds (modification_id, kind) VALUES (?, ?)",
                &[id.into(), kind.as_str().into()],
            )
            .await
            .context("Failed to record modification kind")?;
        }
        Ok(id)
    }

    async fn list(
        &self,
        site_id: i64,
        filter: &ModificationFilter,
        params: &ListParams,
    ) -> Result<(Vec<Modification>, i64)> {
        let mut clause = WhereClause::new();
        clause
            .push_with("m.site_id = ?", [site_id])
            .push("m.deleted = 0");
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            clause.push_contains(&["u.email"], search);
        }
        if let Some(range) = filter.date_range {
            clause.push_with(
                "m.date_time >= ? AND m.date_time < ?",
                [range.start_time(), range.end_time_exclusive()],
            );
        }
        if let Some(kind) = filter.kind {
            clause.push_with(
                "m.id IN (SELECT modification_id FROM modification_kinds WHERE kind = ?)",
                [kind.as_str()],
            );
        }

        let from = "FROM modifications m LEFT JOIN users u ON u.id = m.user_id";
        let count_sql = format!("SELECT COUNT(*) {}{}", from, clause.sql());
        let total = fetch_count(&self.pool, &count_sql, clause.values())
            .await
            .context("Failed to count modifications")?;

        let sql = format!(
            "SELECT m.id, m.site_id, m.user_id, u.email AS user_email, m.date_time {}{} \
             ORDER BY m.date_time DESC, m.id DESC LIMIT {} OFFSET {}",
            from,
            clause.sql(),
            params.limit(),
            params.offset()
        );
        let rows: Vec<ModificationRow> = fetch_all(&self.pool, &sql, clause.values())
            .await
            .context("Failed to list modifications")?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut kinds = self
            .kinds_for(&ids)
            .await
            .context("Failed to load modification kinds")?;

        let modifications = rows
            .into_iter()
            .map(|row| Modification {
                id: row.id,
                site_id: row.site_id,
                user_id: row.user_id,
                user_email: row.user_email,
                date_time: row.date_time,
                kinds: kinds.remove(&row.id).unwrap_or_default(),
            })
            .collect();
        Ok((modifications, total))
    }

    async fn first_author(&self, site_id: i64) -> Result<Option<i64>> {
        let row: Option<(i64,)> = fetch_optional(
            &self.pool,
            "SELECT user_id FROM modifications WHERE site_id = ? ORDER BY date_time ASC, id ASC LIMIT 1",
            &[site_id.into()],
        )
        .await
        .context("Failed to get site author")?;
        Ok(row.map(|(user_id,)| user_id))
    }
}
