//! Database migrations module
//!
//! Code-based migrations for the heritage backend. Every migration is embedded
//! in the binary as SQL strings, one flavour for SQLite and one for MySQL.
//!
//! # Usage
//!
//! ```ignore
//! use heritage::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! Each migration is a [`Migration`] with a unique `version`, a `name` and the
//! `up_sqlite`/`up_mysql` SQL. Applied versions are tracked in `_migrations`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_roles_and_permissions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS permissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS role_permissions (
                role_id INTEGER NOT NULL,
                permission_id INTEGER NOT NULL,
                PRIMARY KEY (role_id, permission_id),
                FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE,
                FOREIGN KEY (permission_id) REFERENCES permissions(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS roles (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS permissions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS role_permissions (
                role_id BIGINT NOT NULL,
                permission_id BIGINT NOT NULL,
                PRIMARY KEY (role_id, permission_id),
                FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE,
                FOREIGN KEY (permission_id) REFERENCES permissions(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email VARCHAR(255) NOT NULL,
                name VARCHAR(100) NOT NULL,
                last_name VARCHAR(100) NOT NULL DEFAULT '',
                password_hash VARCHAR(255) NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT 1,
                system_admin BOOLEAN NOT NULL DEFAULT 0,
                role_id INTEGER,
                avatar VARCHAR(512),
                deleted BOOLEAN NOT NULL DEFAULT 0,
                inserted_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE SET NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_users_active_email ON users(email) WHERE deleted = 0;
            CREATE INDEX IF NOT EXISTS idx_users_role_id ON users(role_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                email VARCHAR(255) NOT NULL,
                name VARCHAR(100) NOT NULL,
                last_name VARCHAR(100) NOT NULL DEFAULT '',
                password_hash VARCHAR(255) NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                system_admin BOOLEAN NOT NULL DEFAULT FALSE,
                role_id BIGINT NULL,
                avatar VARCHAR(512) NULL,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                inserted_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL,
                FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_users_email ON users(email);
            CREATE INDEX idx_users_role_id ON users(role_id);
        "#,
    },
    Migration {
        version: 3,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at DATETIME(6) NOT NULL,
                created_at DATETIME(6) NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 4,
        name: "create_categories_and_tags",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                deleted BOOLEAN NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT 0
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                deleted BOOLEAN NOT NULL DEFAULT FALSE
            );
            CREATE TABLE IF NOT EXISTS tags (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                created_at DATETIME(6) NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT FALSE
            );
        "#,
    },
    Migration {
        version: 5,
        name: "create_historic_sites",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS historic_sites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                short_description VARCHAR(255) NOT NULL,
                description VARCHAR(1000) NOT NULL,
                city VARCHAR(50) NOT NULL,
                province VARCHAR(50) NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                state_of_conservation VARCHAR(20) NOT NULL,
                inauguration_year INTEGER NOT NULL,
                visible BOOLEAN NOT NULL DEFAULT 0,
                deleted BOOLEAN NOT NULL DEFAULT 0,
                visit_count INTEGER NOT NULL DEFAULT 0,
                inserted_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sites_active_name ON historic_sites(name) WHERE deleted = 0;
            CREATE INDEX IF NOT EXISTS idx_sites_city ON historic_sites(city);
            CREATE INDEX IF NOT EXISTS idx_sites_province ON historic_sites(province);
            CREATE TABLE IF NOT EXISTS site_tags (
                site_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (site_id, tag_id),
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_site_tags_tag_id ON site_tags(tag_id);
            CREATE TABLE IF NOT EXISTS site_categories (
                site_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                PRIMARY KEY (site_id, category_id),
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS historic_sites (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(100) NOT NULL,
                short_description VARCHAR(255) NOT NULL,
                description VARCHAR(1000) NOT NULL,
                city VARCHAR(50) NOT NULL,
                province VARCHAR(50) NOT NULL,
                latitude DOUBLE NOT NULL,
                longitude DOUBLE NOT NULL,
                state_of_conservation VARCHAR(20) NOT NULL,
                inauguration_year INT NOT NULL,
                visible BOOLEAN NOT NULL DEFAULT FALSE,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                visit_count BIGINT NOT NULL DEFAULT 0,
                inserted_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL
            );
            CREATE INDEX idx_sites_name ON historic_sites(name);
            CREATE INDEX idx_sites_city ON historic_sites(city);
            CREATE INDEX idx_sites_province ON historic_sites(province);
            CREATE TABLE IF NOT EXISTS site_tags (
                site_id BIGINT NOT NULL,
                tag_id BIGINT NOT NULL,
                PRIMARY KEY (site_id, tag_id),
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_site_tags_tag_id ON site_tags(tag_id);
            CREATE TABLE IF NOT EXISTS site_categories (
                site_id BIGINT NOT NULL,
                category_id BIGINT NOT NULL,
                PRIMARY KEY (site_id, category_id),
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 6,
        name: "create_images",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id INTEGER NOT NULL,
                url VARCHAR(512) NOT NULL,
                object_key VARCHAR(255) NOT NULL,
                title VARCHAR(200) NOT NULL,
                description VARCHAR(200),
                order_index INTEGER NOT NULL DEFAULT 0,
                is_cover BOOLEAN NOT NULL DEFAULT 0,
                content_type VARCHAR(50) NOT NULL,
                size INTEGER NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_images_site_id ON images(site_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS images (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                site_id BIGINT NOT NULL,
                url VARCHAR(512) NOT NULL,
                object_key VARCHAR(255) NOT NULL,
                title VARCHAR(200) NOT NULL,
                description VARCHAR(200) NULL,
                order_index INT NOT NULL DEFAULT 0,
                is_cover BOOLEAN NOT NULL DEFAULT FALSE,
                content_type VARCHAR(50) NOT NULL,
                size BIGINT NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL,
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_images_site_id ON images(site_id);
        "#,
    },
    Migration {
        version: 7,
        name: "create_modifications",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS modifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                date_time TIMESTAMP NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT 0,
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );
            CREATE INDEX IF NOT EXISTS idx_modifications_site_id ON modifications(site_id);
            CREATE TABLE IF NOT EXISTS modification_kinds (
                modification_id INTEGER NOT NULL,
                kind VARCHAR(20) NOT NULL,
                PRIMARY KEY (modification_id, kind),
                FOREIGN KEY (modification_id) REFERENCES modifications(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS modifications (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                site_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                date_time DATETIME(6) NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );
            CREATE INDEX idx_modifications_site_id ON modifications(site_id);
            CREATE TABLE IF NOT EXISTS modification_kinds (
                modification_id BIGINT NOT NULL,
                kind VARCHAR(20) NOT NULL,
                PRIMARY KEY (modification_id, kind),
                FOREIGN KEY (modification_id) REFERENCES modifications(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 8,
        name: "create_reviews",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment VARCHAR(1000) NOT NULL,
                state VARCHAR(20) NOT NULL DEFAULT 'pending',
                rejected_reason VARCHAR(200),
                deleted BOOLEAN NOT NULL DEFAULT 0,
                inserted_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_reviews_site_id ON reviews(site_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_user_id ON reviews(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                site_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                rating INT NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment VARCHAR(1000) NOT NULL,
                state VARCHAR(20) NOT NULL DEFAULT 'pending',
                rejected_reason VARCHAR(200) NULL,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                inserted_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL,
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_reviews_site_id ON reviews(site_id);
            CREATE INDEX idx_reviews_user_id ON reviews(user_id);
        "#,
    },
    Migration {
        version: 9,
        name: "create_user_favorite_sites",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS user_favorite_sites (
                user_id INTEGER NOT NULL,
                site_id INTEGER NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                PRIMARY KEY (user_id, site_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS user_favorite_sites (
                user_id BIGINT NOT NULL,
                site_id BIGINT NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME(6) NOT NULL,
                PRIMARY KEY (user_id, site_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (site_id) REFERENCES historic_sites(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 10,
        name: "create_feature_flags",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS feature_flags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(64) NOT NULL UNIQUE,
                description VARCHAR(255) NOT NULL DEFAULT '',
                enabled BOOLEAN NOT NULL DEFAULT 0,
                maintenance_message VARCHAR(256),
                modified_by VARCHAR(255),
                modified_at TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS feature_flags (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(64) NOT NULL UNIQUE,
                description VARCHAR(255) NOT NULL DEFAULT '',
                enabled BOOLEAN NOT NULL DEFAULT FALSE,
                maintenance_message VARCHAR(256) NULL,
                modified_by VARCHAR(255) NULL,
                modified_at DATETIME(6) NULL
            );
        "#,
    },
];

/// Run all pending migrations
///
/// Creates the `_migrations` tracking table when needed, then applies every
/// migration whose version has not been recorded yet, in order.
///
/// # Returns
///
/// Number of migrations applied
///
/// # Errors
///
/// Returns an error if any migration fails to apply
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at DATETIME(6) NOT NULL
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.mysql()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get::<i32, _>("version") as i64,
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.mysql()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        // Running again should apply 0 migrations
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_pending_count_and_up_to_date() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());
        assert!(!is_up_to_date(&pool).await.unwrap());

        run_migrations(&pool).await.expect("Failed to run migrations");

        assert_eq!(pending_count(&pool).await.unwrap(), 0);
        assert!(is_up_to_date(&pool).await.unwrap());
    }

    #[test]
    fn test_migration_versions_are_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version, i as i32 + 1, "{}", migration.name);
        }
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n  -- only a comment\n;\nCREATE INDEX i ON a(id)";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]);
    }

    async fn insert_user(pool: &SqlitePool, email: &str, deleted: bool) -> sqlx::Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (email, name, password_hash, deleted, inserted_at, updated_at) VALUES (?, 'Test', 'hash', ?, ?, ?)",
        )
        .bind(email)
        .bind(deleted)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map(|_| ())
    }

    #[tokio::test]
    async fn test_active_email_is_unique_but_deleted_rows_are_kept() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let sqlite = pool.sqlite().unwrap();

        insert_user(sqlite, "a@example.com", true).await.unwrap();
        insert_user(sqlite, "a@example.com", false).await.unwrap();
        assert!(insert_user(sqlite, "a@example.com", false).await.is_err());
    }

    #[tokio::test]
    async fn test_review_rating_is_checked() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let sqlite = pool.sqlite().unwrap();
        let now = Utc::now();

        insert_user(sqlite, "r@example.com", false).await.unwrap();
        sqlx::query(
            "INSERT INTO historic_sites (name, short_description, description, city, province, latitude, longitude, state_of_conservation, inauguration_year, inserted_at, updated_at) VALUES ('Cabildo', 's', 'd', 'c', 'p', 0, 0, 'bueno', 1900, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(sqlite)
        .await
        .unwrap();

        let insert = |rating: i64| {
            sqlx::query(
                "INSERT INTO reviews (site_id, user_id, rating, comment, inserted_at, updated_at) VALUES (1, 1, ?, 'comment', ?, ?)",
            )
            .bind(rating)
            .bind(now)
            .bind(now)
            .execute(sqlite)
        };

        assert!(insert(5).await.is_ok());
        assert!(insert(6).await.is_err());
        assert!(insert(0).await.is_err());
    }
}
