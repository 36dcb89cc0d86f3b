//! Startup seed data
//!
//! Roles, permissions, feature flags and an optional bootstrap system
//! administrator. Every step checks for existing rows first, so seeding runs
//! on each start.

use anyhow::{Context, Result};

use crate::config::SeedConfig;
use crate::db::repositories::{
    FlagRepository, RoleRepository, SqlxFlagRepository, SqlxRoleRepository, SqlxUserRepository,
    UserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{FlagName, NewUser, ROLE_ADMIN, ROLE_EDITOR, ROLE_PUBLIC};
use crate::services::password::hash_password;

/// Every permission known to the application
pub const PERMISSIONS: [&str; 14] = [
    "user_index",
    "user_new",
    "user_update",
    "user_destroy",
    "user_show",
    "export_csv",
    "create_site",
    "edit_site",
    "delete_site",
    "list_sites",
    "block_user",
    "unblock_user",
    "tags_management",
    "reviews_management",
];

/// Permissions granted to editors
pub const EDITOR_PERMISSIONS: [&str; 6] = [
    "user_index",
    "user_show",
    "create_site",
    "edit_site",
    "list_sites",
    "tags_management",
];

/// Counts of rows created by a seed run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub roles: usize,
    pub permissions: usize,
    pub flags: usize,
    pub admin_created: bool,
}

/// Seed roles, permissions, flags and the bootstrap admin
pub async fn run_seeds(pool: &DynDatabasePool, config: &SeedConfig) -> Result<SeedReport> {
    let roles = SqlxRoleRepository::new(pool.clone());
    let flags = SqlxFlagRepository::new(pool.clone());
    let users = SqlxUserRepository::new(pool.clone());
    let mut report = SeedReport::default();

    for name in PERMISSIONS {
        if roles.get_permission_by_name(name).await?.is_none() {
            roles.create_permission(name).await?;
            report.permissions += 1;
        }
    }

    for (role_name, granted) in [
        (ROLE_ADMIN, &PERMISSIONS[..]),
        (ROLE_EDITOR, &EDITOR_PERMISSIONS[..]),
        (ROLE_PUBLIC, &[][..]),
    ] {
        let role = match roles.get_role_by_name(role_name).await? {
            Some(role) => role,
            None => {
                report.roles += 1;
                roles.create_role(role_name).await?
            }
        };
        for permission in granted {
            let permission = roles
                .get_permission_by_name(permission)
                .await?
                .with_context(|| format!("Permission {} was not seeded", permission))?;
            roles.assign_permission(role.id, permission.id).await?;
        }
    }

    for flag in FlagName::ALL {
        if flags.get_by_name(flag.as_str()).await?.is_none() {
            flags.create(flag.as_str(), flag.description()).await?;
            report.flags += 1;
        }
    }

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        let email = email.trim().to_lowercase();
        if !email.is_empty() && users.get_by_email(&email).await?.is_none() {
            let admin_role = roles
                .get_role_by_name(ROLE_ADMIN)
                .await?
                .context("Admin role was not seeded")?;
            let password_hash = hash_password(password)?;
            users
                .create(&NewUser {
                    email: email.clone(),
                    name: "Admin".to_string(),
                    last_name: String::new(),
                    password_hash,
                    role_id: Some(admin_role.id),
                    avatar: None,
                    system_admin: true,
                })
                .await?;
            tracing::info!("Created bootstrap administrator {}", email);
            report.admin_created = true;
        }
    }

    if report != SeedReport::default() {
        tracing::info!(
            "Seeded {} role(s), {} permission(s), {} flag(s)",
            report.roles,
            report.permissions,
            report.flags
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;

    #[tokio::test]
    async fn test_seeds_are_idempotent() {
        let pool = setup_pool().await;
        let config = SeedConfig {
            admin_email: Some("Root@Example.com".to_string()),
            admin_password: Some("secret123".to_string()),
        };

        let first = run_seeds(&pool, &config).await.unwrap();
        assert_eq!(first.roles, 3);
        assert_eq!(first.permissions, PERMISSIONS.len());
        assert_eq!(first.flags, 3);
        assert!(first.admin_created);

        let second = run_seeds(&pool, &config).await.unwrap();
        assert_eq!(second, SeedReport::default());
    }

    #[tokio::test]
    async fn test_role_permissions() {
        let pool = setup_pool().await;
        run_seeds(&pool, &SeedConfig::default()).await.unwrap();
        let roles = SqlxRoleRepository::new(pool.clone());

        let admin = roles.get_role_by_name(ROLE_ADMIN).await.unwrap().unwrap();
        let editor = roles.get_role_by_name(ROLE_EDITOR).await.unwrap().unwrap();
        let public = roles.get_role_by_name(ROLE_PUBLIC).await.unwrap().unwrap();

        assert_eq!(roles.permissions_for_role(admin.id).await.unwrap().len(), 14);
        let editor_perms = roles.permissions_for_role(editor.id).await.unwrap();
        assert!(editor_perms.contains(&"tags_management".to_string()));
        assert!(!editor_perms.contains(&"delete_site".to_string()));
        assert!(roles.permissions_for_role(public.id).await.unwrap().is_empty());

        let users = SqlxUserRepository::new(pool);
        assert!(users.list().await.unwrap().is_empty());
    }
}
