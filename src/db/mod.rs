//! Database layer
//!
//! This module provides database abstraction for the heritage backend.
//! It supports:
//! - SQLite (default, for single-binary deployment)
//! - MySQL (for larger deployments)
//!
//! The database driver is selected based on configuration.
//!
//! # Architecture
//!
//! The database layer uses a trait-based abstraction (`DatabasePool`) that
//! allows the application to work with either SQLite or MySQL without
//! knowing the specific backend. Repositories dispatch on
//! [`DatabasePool::driver`] and keep dialect-specific SQL in per-driver
//! functions.
//!
//! # Usage
//!
//! ```ignore
//! use heritage::config::DatabaseConfig;
//! use heritage::db::{create_pool, migrations, seeds};
//!
//! let config = DatabaseConfig::default();
//! let pool = create_pool(&config).await?;
//!
//! migrations::run_migrations(&pool).await?;
//! seeds::run_seeds(&pool, &seed_config).await?;
//!
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;
pub mod seeds;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
