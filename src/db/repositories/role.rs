//! Role and permission repository
//!
//! Roles hold a set of named permissions; a user's permissions are the ones
//! of their role.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Permission, Role};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

/// Role repository trait
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn create_role(&self, name: &str) -> Result<Role>;

    async fn get_role(&self, id: i64) -> Result<Option<Role>>;

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>>;

    /// All roles ordered by name
    async fn list_roles(&self) -> Result<Vec<Role>>;

    async fn create_permission(&self, name: &str) -> Result<Permission>;

    async fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>>;

    /// Grant a permission to a role; granting twice is a no-op
    async fn assign_permission(&self, role_id: i64, permission_id: i64) -> Result<()>;

    /// Permission names of a role
    async fn permissions_for_role(&self, role_id: i64) -> Result<Vec<String>>;

    /// Permission names of a user, through their role
    async fn permissions_for_user(&self, user_id: i64) -> Result<Vec<String>>;
}

/// SQLx-based role repository implementation
pub struct SqlxRoleRepository {
    pool: DynDatabasePool,
}

impl SqlxRoleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RoleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl RoleRepository for SqlxRoleRepository {
    async fn create_role(&self, name: &str) -> Result<Role> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("INSERT INTO roles (name) VALUES (?)")
                .bind(name)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create role")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query("INSERT INTO roles (name) VALUES (?)")
                .bind(name)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create role")?
                .last_insert_id() as i64,
        };
        Ok(Role {
            id,
            name: name.to_string(),
        })
    }

    async fn get_role(&self, id: i64) -> Result<Option<Role>> {
        let sql = "SELECT id, name FROM roles WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_as::<_, Role>(sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get role"),
            DatabaseDriver::Mysql => sqlx::query_as::<_, Role>(sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get role"),
        }
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let sql = "SELECT id, name FROM roles WHERE name = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_as::<_, Role>(sql)
                .bind(name)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get role by name"),
            DatabaseDriver::Mysql => sqlx::query_as::<_, Role>(sql)
                .bind(name)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get role by name"),
        }
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let sql = "SELECT id, name FROM roles ORDER BY name";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_as::<_, Role>(sql)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list roles"),
            DatabaseDriver::Mysql => sqlx::query_as::<_, Role>(sql)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list roles"),
        }
    }

    async fn create_permission(&self, name: &str) -> Result<Permission> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("INSERT INTO permissions (name) VALUES (?)")
                .bind(name)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create permission")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query("INSERT INTO permissions (name) VALUES (?)")
                .bind(name)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create permission")?
                .last_insert_id() as i64,
        };
        Ok(Permission {
            id,
            name: name.to_string(),
        })
    }

    async fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>> {
        let sql = "SELECT id, name FROM permissions WHERE name = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_as::<_, Permission>(sql)
                .bind(name)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get permission"),
            DatabaseDriver::Mysql => sqlx::query_as::<_, Permission>(sql)
                .bind(name)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get permission"),
        }
    }

    async fn assign_permission(&self, role_id: i64, permission_id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                assign_permission_sqlite(self.pool.sqlite()?, role_id, permission_id).await
            }
            DatabaseDriver::Mysql => {
                assign_permission_mysql(self.pool.mysql()?, role_id, permission_id).await
            }
        }
    }

    async fn permissions_for_role(&self, role_id: i64) -> Result<Vec<String>> {
        let sql = r#"
            SELECT p.name FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = ?
            ORDER BY p.name
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar::<_, String>(sql)
                .bind(role_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list role permissions"),
            DatabaseDriver::Mysql => sqlx::query_scalar::<_, String>(sql)
                .bind(role_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list role permissions"),
        }
    }

    async fn permissions_for_user(&self, user_id: i64) -> Result<Vec<String>> {
        let sql = r#"
            SELECT p.name FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            JOIN users u ON u.role_id = rp.role_id
            WHERE u.id = ? AND u.deleted = 0
            ORDER BY p.name
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar::<_, String>(sql)
                .bind(user_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list user permissions"),
            DatabaseDriver::Mysql => sqlx::query_scalar::<_, String>(sql)
                .bind(user_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list user permissions"),
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn assign_permission_sqlite(pool: &SqlitePool, role_id: i64, permission_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
        .bind(role_id)
        .bind(permission_id)
        .execute(pool)
        .await
        .context("Failed to assign permission")?;
    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn assign_permission_mysql(pool: &MySqlPool, role_id: i64, permission_id: i64) -> Result<()> {
    sqlx::query("INSERT IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
        .bind(role_id)
        .bind(permission_id)
        .execute(pool)
        .await
        .context("Failed to assign permission")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};

    #[tokio::test]
    async fn test_roles_and_permissions() {
        let pool = setup_pool().await;
        let repo = SqlxRoleRepository::new(pool);

        let editor = repo.create_role("editor").await.unwrap();
        let create_site = repo.create_permission("create_site").await.unwrap();
        let list_sites = repo.create_permission("list_sites").await.unwrap();

        repo.assign_permission(editor.id, create_site.id).await.unwrap();
        repo.assign_permission(editor.id, list_sites.id).await.unwrap();
        // Granting twice is harmless
        repo.assign_permission(editor.id, list_sites.id).await.unwrap();

        assert_eq!(
            repo.permissions_for_role(editor.id).await.unwrap(),
            vec!["create_site".to_string(), "list_sites".to_string()]
        );
        assert_eq!(repo.get_role_by_name("editor").await.unwrap(), Some(editor.clone()));
        assert_eq!(repo.get_role(editor.id).await.unwrap(), Some(editor));
        assert!(repo.get_role_by_name("ghost").await.unwrap().is_none());
        assert_eq!(
            repo.get_permission_by_name("create_site").await.unwrap(),
            Some(create_site)
        );
    }

    #[tokio::test]
    async fn test_duplicate_role_is_rejected() {
        let pool = setup_pool().await;
        let repo = SqlxRoleRepository::new(pool);

        repo.create_role("admin").await.unwrap();
        assert!(repo.create_role("admin").await.is_err());
    }

    #[tokio::test]
    async fn test_permissions_for_user_follow_role() {
        let pool = setup_pool().await;
        let repo = SqlxRoleRepository::new(pool.clone());
        let user_id = insert_user(&pool, "editor@example.com").await;

        // No role, no permissions
        assert!(repo.permissions_for_user(user_id).await.unwrap().is_empty());

        let editor = repo.create_role("editor").await.unwrap();
        let perm = repo.create_permission("tags_management").await.unwrap();
        repo.assign_permission(editor.id, perm.id).await.unwrap();

        sqlx::query("UPDATE users SET role_id = ? WHERE id = ?")
            .bind(editor.id)
            .bind(user_id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();

        assert_eq!(
            repo.permissions_for_user(user_id).await.unwrap(),
            vec!["tags_management".to_string()]
        );
    }
}
