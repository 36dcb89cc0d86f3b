//! Dynamic WHERE clauses and driver dispatch
//!
//! Listings with optional filters collect their conditions and bind values in
//! a [`WhereClause`], then run through [`fetch_all`], [`fetch_count`] and
//! friends, which pick the SQLite or MySQL pool at runtime.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::{Query, QueryAs};
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::FromRow;

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;

/// A value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Time(DateTime<Utc>),
    Null,
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Time(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Conditions joined with `AND`, plus their bind values in order
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition with no bind values
    pub fn push(&mut self, condition: impl Into<String>) -> &mut Self {
        self.conditions.push(condition.into());
        self
    }

    /// Add a condition whose `?` placeholders take `values`
    pub fn push_with<I, V>(&mut self, condition: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.conditions.push(condition.into());
        self.values.extend(values.into_iter().map(Into::into));
        self
    }

    /// `LOWER(column) LIKE %needle%` for every column, joined with `OR`
    pub fn push_contains(&mut self, columns: &[&str], needle: &str) -> &mut Self {
        let pattern = like_pattern(needle);
        let condition = columns
            .iter()
            .map(|column| format!("LOWER({}) LIKE ?", column))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.push_with(
            format!("({})", condition),
            std::iter::repeat(pattern).take(columns.len()),
        )
    }

    /// `column IN (?, ...)`; an empty list matches nothing
    pub fn push_in<V: Into<SqlValue>>(&mut self, column: &str, values: Vec<V>) -> &mut Self {
        if values.is_empty() {
            return self.push("1 = 0");
        }
        let condition = format!("{} IN ({})", column, placeholders(values.len()));
        self.push_with(condition, values)
    }

    /// ` WHERE a AND b`, or an empty string without conditions
    pub fn sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// `?, ?, ?` for `count` placeholders
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Lowercased `%needle%` pattern for case-insensitive substring matches
pub fn like_pattern(needle: &str) -> String {
    format!("%{}%", needle.trim().to_lowercase())
}

/// Bind every value, in order, to a SQLite query
pub fn bind_sqlite<'q, O>(
    mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    values: &[SqlValue],
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Time(v) => query.bind(*v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

/// Bind every value, in order, to a MySQL query
pub fn bind_mysql<'q, O>(
    mut query: QueryAs<'q, MySql, O, MySqlArguments>,
    values: &[SqlValue],
) -> QueryAs<'q, MySql, O, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Time(v) => query.bind(*v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

fn query_sqlite<'q>(
    sql: &'q str,
    values: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = sqlx::query(sql);
    for value in values {
        query = match value {
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Time(v) => query.bind(*v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

fn query_mysql<'q>(sql: &'q str, values: &[SqlValue]) -> Query<'q, MySql, MySqlArguments> {
    let mut query = sqlx::query(sql);
    for value in values {
        query = match value {
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Time(v) => query.bind(*v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

// ============================================================================
// Driver dispatch
// ============================================================================
//
// Statements whose SQL is identical on both drivers go through these helpers;
// anything dialect-specific keeps its own `_sqlite`/`_mysql` function.

/// Fetch every row of `sql` decoded as `O`
pub async fn fetch_all<O>(pool: &DynDatabasePool, sql: &str, values: &[SqlValue]) -> Result<Vec<O>>
where
    O: Send + Unpin + for<'r> FromRow<'r, SqliteRow> + for<'r> FromRow<'r, MySqlRow>,
{
    let rows = match pool.driver() {
        DatabaseDriver::Sqlite => {
            bind_sqlite(sqlx::query_as::<_, O>(sql), values)
                .fetch_all(pool.sqlite()?)
                .await?
        }
        DatabaseDriver::Mysql => {
            bind_mysql(sqlx::query_as::<_, O>(sql), values)
                .fetch_all(pool.mysql()?)
                .await?
        }
    };
    Ok(rows)
}

/// Fetch the first row of `sql` decoded as `O`, if any
pub async fn fetch_optional<O>(
    pool: &DynDatabasePool,
    sql: &str,
    values: &[SqlValue],
) -> Result<Option<O>>
where
    O: Send + Unpin + for<'r> FromRow<'r, SqliteRow> + for<'r> FromRow<'r, MySqlRow>,
{
    let row = match pool.driver() {
        DatabaseDriver::Sqlite => {
            bind_sqlite(sqlx::query_as::<_, O>(sql), values)
                .fetch_optional(pool.sqlite()?)
                .await?
        }
        DatabaseDriver::Mysql => {
            bind_mysql(sqlx::query_as::<_, O>(sql), values)
                .fetch_optional(pool.mysql()?)
                .await?
        }
    };
    Ok(row)
}

/// Run a `SELECT COUNT(*) ...` statement
pub async fn fetch_count(pool: &DynDatabasePool, sql: &str, values: &[SqlValue]) -> Result<i64> {
    let (count,): (i64,) = match pool.driver() {
        DatabaseDriver::Sqlite => {
            bind_sqlite(sqlx::query_as(sql), values)
                .fetch_one(pool.sqlite()?)
                .await?
        }
        DatabaseDriver::Mysql => {
            bind_mysql(sqlx::query_as(sql), values)
                .fetch_one(pool.mysql()?)
                .await?
        }
    };
    Ok(count)
}

/// Run a statement, returning the number of affected rows
pub async fn execute(pool: &DynDatabasePool, sql: &str, values: &[SqlValue]) -> Result<u64> {
    let affected = match pool.driver() {
        DatabaseDriver::Sqlite => query_sqlite(sql, values)
            .execute(pool.sqlite()?)
            .await?
            .rows_affected(),
        DatabaseDriver::Mysql => query_mysql(sql, values)
            .execute(pool.mysql()?)
            .await?
            .rows_affected(),
    };
    Ok(affected)
}

/// Run an `INSERT`, returning the generated id
pub async fn insert(pool: &DynDatabasePool, sql: &str, values: &[SqlValue]) -> Result<i64> {
    let id = match pool.driver() {
        DatabaseDriver::Sqlite => query_sqlite(sql, values)
            .execute(pool.sqlite()?)
            .await?
            .last_insert_rowid(),
        DatabaseDriver::Mysql => query_mysql(sql, values)
            .execute(pool.mysql()?)
            .await?
            .last_insert_id() as i64,
    };
    Ok(id)
}
