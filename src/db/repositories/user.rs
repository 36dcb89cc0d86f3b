//! User repository
//!
//! Database operations for user accounts. Every lookup and listing skips
//! soft-deleted rows; deleted accounts stay in the table for the audit trail.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, NewUser, User, UserFilter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

use super::filter::{bind_mysql, bind_sqlite, WhereClause};

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user
    async fn create(&self, user: &NewUser) -> Result<User>;

    /// Get a non-deleted user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get a non-deleted user by email (case-insensitive)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// All non-deleted users, oldest first
    async fn list(&self) -> Result<Vec<User>>;

    /// Filtered page of users and the total match count
    async fn search(&self, filter: &UserFilter, params: &ListParams) -> Result<(Vec<User>, i64)>;

    /// Persist the mutable fields of `user`
    async fn update(&self, user: &User) -> Result<User>;

    /// Change (or clear) the role of a user
    async fn set_role(&self, user_id: i64, role_id: Option<i64>) -> Result<()>;

    /// Enable or disable a user
    async fn set_enabled(&self, user_id: i64, enabled: bool) -> Result<()>;

    /// Soft delete a user
    async fn soft_delete(&self, user_id: i64) -> Result<()>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &NewUser) -> Result<User> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await?,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await?,
        };
        self.get_by_id(id)
            .await?
            .context("Created user could not be read back")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("{} WHERE u.id = ? AND u.deleted = 0", SELECT_USER);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get user by ID"),
            DatabaseDriver::Mysql => sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get user by ID"),
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!(
            "{} WHERE LOWER(u.email) = LOWER(?) AND u.deleted = 0",
            SELECT_USER
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_as::<_, User>(&sql)
                .bind(email.trim())
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get user by email"),
            DatabaseDriver::Mysql => sqlx::query_as::<_, User>(&sql)
                .bind(email.trim())
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get user by email"),
        }
    }

    async fn list(&self) -> Result<Vec<User>> {
        let sql = format!("{} WHERE u.deleted = 0 ORDER BY u.inserted_at ASC, u.id ASC", SELECT_USER);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_as::<_, User>(&sql)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list users"),
            DatabaseDriver::Mysql => sqlx::query_as::<_, User>(&sql)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list users"),
        }
    }

    async fn search(&self, filter: &UserFilter, params: &ListParams) -> Result<(Vec<User>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => search_users_sqlite(self.pool.sqlite()?, filter, params).await,
            DatabaseDriver::Mysql => search_users_mysql(self.pool.mysql()?, filter, params).await,
        }
    }

    async fn update(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_user_sqlite(self.pool.sqlite()?, user).await?,
            DatabaseDriver::Mysql => update_user_mysql(self.pool.mysql()?, user).await?,
        }
        self.get_by_id(user.id)
            .await?
            .context("Updated user could not be read back")
    }

    async fn set_role(&self, user_id: i64, role_id: Option<i64>) -> Result<()> {
        let sql = "UPDATE users SET role_id = ?, updated_at = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(role_id)
                    .bind(Utc::now())
                    .bind(user_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to set user role")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(role_id)
                    .bind(Utc::now())
                    .bind(user_id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to set user role")?;
            }
        }
        Ok(())
    }

    async fn set_enabled(&self, user_id: i64, enabled: bool) -> Result<()> {
        let sql = "UPDATE users SET enabled = ?, updated_at = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(enabled)
                    .bind(Utc::now())
                    .bind(user_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update user status")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(enabled)
                    .bind(Utc::now())
                    .bind(user_id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update user status")?;
            }
        }
        Ok(())
    }

    async fn soft_delete(&self, user_id: i64) -> Result<()> {
        let sql = "UPDATE users SET deleted = 1, updated_at = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(Utc::now())
                    .bind(user_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete user")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(Utc::now())
                    .bind(user_id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete user")?;
            }
        }
        Ok(())
    }
}

const SELECT_USER: &str = r#"
    SELECT u.id, u.email, u.name, u.last_name, u.password_hash, u.enabled,
           u.system_admin, u.role_id, r.name AS role_name, u.avatar, u.deleted,
           u.inserted_at, u.updated_at
    FROM users u
    LEFT JOIN roles r ON r.id = u.role_id
"#;

const INSERT_USER: &str = r#"
    INSERT INTO users (email, name, last_name, password_hash, enabled, system_admin,
                       role_id, avatar, deleted, inserted_at, updated_at)
    VALUES (?, ?, ?, ?, 1, ?, ?, ?, 0, ?, ?)
"#;

const UPDATE_USER: &str = r#"
    UPDATE users
    SET email = ?, name = ?, last_name = ?, password_hash = ?, enabled = ?,
        role_id = ?, avatar = ?, updated_at = ?
    WHERE id = ?
"#;

fn search_clause(filter: &UserFilter) -> WhereClause {
    let mut clause = WhereClause::new();
    clause.push("u.deleted = 0");
    if let Some(email) = filter.email.as_deref().filter(|e| !e.trim().is_empty()) {
        clause.push_contains(&["u.email"], email);
    }
    if let Some(enabled) = filter.enabled {
        clause.push_with("u.enabled = ?", [enabled]);
    }
    if let Some(role) = filter.role.as_deref().filter(|r| !r.trim().is_empty()) {
        clause.push_with("r.name = ?", [role.trim()]);
    }
    clause
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &NewUser) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_USER)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.system_admin)
        .bind(user.role_id)
        .bind(&user.avatar)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(result.last_insert_rowid())
}

async fn search_users_sqlite(
    pool: &SqlitePool,
    filter: &UserFilter,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let clause = search_clause(filter);

    let count_sql = format!(
        "SELECT COUNT(*) FROM users u LEFT JOIN roles r ON r.id = u.role_id{}",
        clause.sql()
    );
    let (total,): (i64,) = bind_sqlite(sqlx::query_as(&count_sql), clause.values())
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    let sql = format!(
        "{}{} ORDER BY u.inserted_at {}, u.id {} LIMIT ? OFFSET ?",
        SELECT_USER,
        clause.sql(),
        filter.order.as_sql(),
        filter.order.as_sql()
    );
    let users = bind_sqlite(sqlx::query_as::<_, User>(&sql), clause.values())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to search users")?;

    Ok((users, total))
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<()> {
    sqlx::query(UPDATE_USER)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.enabled)
        .bind(user.role_id)
        .bind(&user.avatar)
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool)
        .await
        .context("Failed to update user")?;
    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &NewUser) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_USER)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.system_admin)
        .bind(user.role_id)
        .bind(&user.avatar)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(result.last_insert_id() as i64)
}

async fn search_users_mysql(
    pool: &MySqlPool,
    filter: &UserFilter,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let clause = search_clause(filter);

    let count_sql = format!(
        "SELECT COUNT(*) FROM users u LEFT JOIN roles r ON r.id = u.role_id{}",
        clause.sql()
    );
    let (total,): (i64,) = bind_mysql(sqlx::query_as(&count_sql), clause.values())
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    let sql = format!(
        "{}{} ORDER BY u.inserted_at {}, u.id {} LIMIT ? OFFSET ?",
        SELECT_USER,
        clause.sql(),
        filter.order.as_sql(),
        filter.order.as_sql()
    );
    let users = bind_mysql(sqlx::query_as::<_, User>(&sql), clause.values())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to search users")?;

    Ok((users, total))
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<()> {
    sqlx::query(UPDATE_USER)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.enabled)
        .bind(user.role_id)
        .bind(&user.avatar)
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool)
        .await
        .context("Failed to update user")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{RoleRepository, SqlxRoleRepository};
    use crate::models::SortDirection;

    fn new_user(email: &str, role_id: Option<i64>) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password_hash: "hash".to_string(),
            role_id,
            avatar: None,
            system_admin: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_user() {
        let pool = setup_pool().await;
        let roles = SqlxRoleRepository::new(pool.clone());
        let editor = roles.create_role("editor").await.unwrap();
        let repo = SqlxUserRepository::new(pool);

        let user = repo.create(&new_user("ada@example.com", Some(editor.id))).await.unwrap();
        assert!(user.id > 0);
        assert!(user.enabled);
        assert_eq!(user.role_name.as_deref(), Some("editor"));

        let by_email = repo.get_by_email("ADA@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.full_name(), "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_soft_deleted_users_are_hidden() {
        let pool = setup_pool().await;
        let repo = SqlxUserRepository::new(pool);

        let user = repo.create(&new_user("gone@example.com", None)).await.unwrap();
        repo.soft_delete(user.id).await.unwrap();

        assert!(repo.get_by_id(user.id).await.unwrap().is_none());
        assert!(repo.get_by_email("gone@example.com").await.unwrap().is_none());
        assert!(repo.list().await.unwrap().is_empty());

        // The email is free again once the old account is deleted
        repo.create(&new_user("gone@example.com", None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_search_users() {
        let pool = setup_pool().await;
        let roles = SqlxRoleRepository::new(pool.clone());
        let admin = roles.create_role("admin").await.unwrap();
        let repo = SqlxUserRepository::new(pool);

        let first = repo.create(&new_user("first@heritage.org", Some(admin.id))).await.unwrap();
        repo.create(&new_user("second@heritage.org", None)).await.unwrap();
        let third = repo.create(&new_user("third@other.org", None)).await.unwrap();
        repo.set_enabled(third.id, false).await.unwrap();

        let filter = UserFilter {
            email: Some("HERITAGE".into()),
            ..Default::default()
        };
        let (users, total) = repo.search(&filter, &ListParams::admin(1)).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(users.len(), 2);

        let filter = UserFilter {
            enabled: Some(false),
            ..Default::default()
        };
        let (users, _) = repo.search(&filter, &ListParams::admin(1)).await.unwrap();
        assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![third.id]);

        let filter = UserFilter {
            role: Some("admin".into()),
            order: SortDirection::Asc,
            ..Default::default()
        };
        let (users, total) = repo.search(&filter, &ListParams::admin(1)).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(users[0].id, first.id);
    }

    #[tokio::test]
    async fn test_update_and_set_role() {
        let pool = setup_pool().await;
        let roles = SqlxRoleRepository::new(pool.clone());
        let public = roles.create_role("public").await.unwrap();
        let repo = SqlxUserRepository::new(pool);

        let mut user = repo.create(&new_user("ada@example.com", None)).await.unwrap();
        user.name = "Augusta".to_string();
        user.avatar = Some("https://example.com/a.png".to_string());
        let updated = repo.update(&user).await.unwrap();
        assert_eq!(updated.name, "Augusta");
        assert_eq!(updated.avatar.as_deref(), Some("https://example.com/a.png"));

        repo.set_role(user.id, Some(public.id)).await.unwrap();
        let reloaded = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.role_name.as_deref(), Some("public"));
    }
}
