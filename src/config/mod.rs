//! Configuration management
//!
//! This module handles loading and parsing configuration for the Heritage backend.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Google OAuth configuration
    #[serde(default)]
    pub google: GoogleConfig,
    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Initial data configuration
    #[serde(default)]
    pub seed: SeedConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public portal origin (CORS with credentials, OAuth redirects)
    #[serde(default = "default_frontend_origin")]
    pub frontend_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frontend_origin: default_frontend_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_frontend_origin() -> String {
    "http://127.0.0.1:5173".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/heritage.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache driver (memory or redis)
    #[serde(default)]
    pub driver: CacheDriver,
    /// Redis connection URL (optional)
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: None,
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

/// Cache driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    /// In-memory cache (default)
    #[default]
    Memory,
    /// Redis cache
    Redis,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign API tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// API token lifetime
    #[serde(default = "default_jwt_expiration_minutes")]
    pub jwt_expiration_minutes: i64,
    /// Tokens closer than this to expiry are reissued on the next request
    #[serde(default = "default_jwt_refresh_window_minutes")]
    pub jwt_refresh_window_minutes: i64,
    /// Admin session lifetime
    #[serde(default = "default_session_expiration_minutes")]
    pub session_expiration_minutes: i64,
    /// Mark cookies as `Secure`
    #[serde(default)]
    pub cookie_secure: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            jwt_expiration_minutes: default_jwt_expiration_minutes(),
            jwt_refresh_window_minutes: default_jwt_refresh_window_minutes(),
            session_expiration_minutes: default_session_expiration_minutes(),
            cookie_secure: false,
        }
    }
}

fn default_jwt_secret() -> String {
    "change-me".to_string()
}

fn default_jwt_expiration_minutes() -> i64 {
    60
}

fn default_jwt_refresh_window_minutes() -> i64 {
    30
}

fn default_session_expiration_minutes() -> i64 {
    60
}

/// Google OAuth configuration
///
/// Federation is disabled unless both `client_id` and `client_secret` are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_google_redirect_uri")]
    pub redirect_uri: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_google_redirect_uri(),
        }
    }
}

fn default_google_redirect_uri() -> String {
    "http://127.0.0.1:8080/api/auth/google/callback".to_string()
}

impl GoogleConfig {
    /// Whether both client credentials are configured
    pub fn is_enabled(&self) -> bool {
        self.client_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for stored objects
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Base URL under which stored objects are served
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Maximum image size in bytes (default: 5MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            public_base_url: default_public_base_url(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_public_base_url() -> String {
    "/uploads".to_string()
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/webp".to_string(),
    ]
}

impl StorageConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// Get file extension for a MIME type
    pub fn get_extension(&self, mime_type: &str) -> Option<&'static str> {
        match mime_type {
            "image/jpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/webp" => Some("webp"),
            _ => None,
        }
    }
}

/// Initial data configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Email of a system administrator created on first start
    #[serde(default)]
    pub admin_email: Option<String>,
    /// Password for the bootstrap administrator
    #[serde(default)]
    pub admin_password: Option<String>,
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - HERITAGE_SERVER_HOST
    /// - HERITAGE_SERVER_PORT
    /// - HERITAGE_SERVER_FRONTEND_ORIGIN
    /// - HERITAGE_DATABASE_DRIVER
    /// - HERITAGE_DATABASE_URL
    /// - HERITAGE_CACHE_DRIVER
    /// - HERITAGE_CACHE_REDIS_URL
    /// - HERITAGE_CACHE_TTL_SECONDS
    /// - HERITAGE_AUTH_JWT_SECRET
    /// - HERITAGE_AUTH_COOKIE_SECURE
    /// - HERITAGE_GOOGLE_CLIENT_ID
    /// - HERITAGE_GOOGLE_CLIENT_SECRET
    /// - HERITAGE_GOOGLE_REDIRECT_URI
    /// - HERITAGE_STORAGE_PATH
    /// - HERITAGE_STORAGE_PUBLIC_BASE_URL
    /// - HERITAGE_SEED_ADMIN_EMAIL
    /// - HERITAGE_SEED_ADMIN_PASSWORD
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_expiration_minutes <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.jwt_expiration_minutes must be positive".to_string(),
            ));
        }
        if self.auth.session_expiration_minutes <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_expiration_minutes must be positive".to_string(),
            ));
        }
        if self.auth.jwt_refresh_window_minutes < 0
            || self.auth.jwt_refresh_window_minutes >= self.auth.jwt_expiration_minutes
        {
            return Err(ConfigError::ValidationError(
                "auth.jwt_refresh_window_minutes must be between 0 and the token lifetime"
                    .to_string(),
            ));
        }
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("HERITAGE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("HERITAGE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(origin) = std::env::var("HERITAGE_SERVER_FRONTEND_ORIGIN") {
            self.server.frontend_origin = origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("HERITAGE_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("HERITAGE_DATABASE_URL") {
            self.database.url = url;
        }

        // Cache configuration
        if let Ok(driver) = std::env::var("HERITAGE_CACHE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.cache.driver = CacheDriver::Memory,
                "redis" => self.cache.driver = CacheDriver::Redis,
                _ => {}
            }
        }
        if let Ok(redis_url) = std::env::var("HERITAGE_CACHE_REDIS_URL") {
            self.cache.redis_url = Some(redis_url);
        }
        if let Ok(ttl) = std::env::var("HERITAGE_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        // Auth configuration
        if let Ok(secret) = std::env::var("HERITAGE_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(secure) = std::env::var("HERITAGE_AUTH_COOKIE_SECURE") {
            if let Ok(secure) = secure.parse::<bool>() {
                self.auth.cookie_secure = secure;
            }
        }

        // Google configuration
        if let Ok(id) = std::env::var("HERITAGE_GOOGLE_CLIENT_ID") {
            self.google.client_id = Some(id);
        }
        if let Ok(secret) = std::env::var("HERITAGE_GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = Some(secret);
        }
        if let Ok(uri) = std::env::var("HERITAGE_GOOGLE_REDIRECT_URI") {
            self.google.redirect_uri = uri;
        }

        // Storage configuration
        if let Ok(path) = std::env::var("HERITAGE_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("HERITAGE_STORAGE_PUBLIC_BASE_URL") {
            self.storage.public_base_url = url;
        }

        // Seed configuration
        if let Ok(email) = std::env::var("HERITAGE_SEED_ADMIN_EMAIL") {
            self.seed.admin_email = Some(email);
        }
        if let Ok(password) = std::env::var("HERITAGE_SEED_ADMIN_PASSWORD") {
            self.seed.admin_password = Some(password);
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches HERITAGE_* variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_VARS: &[&str] = &[
    "HERITAGE_SERVER_HOST",
    "HERITAGE_SERVER_PORT",
    "HERITAGE_SERVER_FRONTEND_ORIGIN",
    "HERITAGE_DATABASE_DRIVER",
    "HERITAGE_DATABASE_URL",
    "HERITAGE_CACHE_DRIVER",
    "HERITAGE_CACHE_REDIS_URL",
    "HERITAGE_CACHE_TTL_SECONDS",
    "HERITAGE_AUTH_JWT_SECRET",
    "HERITAGE_AUTH_COOKIE_SECURE",
    "HERITAGE_GOOGLE_CLIENT_ID",
    "HERITAGE_GOOGLE_CLIENT_SECRET",
    "HERITAGE_GOOGLE_REDIRECT_URI",
    "HERITAGE_STORAGE_PATH",
    "HERITAGE_STORAGE_PUBLIC_BASE_URL",
    "HERITAGE_SEED_ADMIN_EMAIL",
    "HERITAGE_SEED_ADMIN_PASSWORD",
];

#[cfg(test)]
fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn port_in_file_is_respected(port in 1u16..=65535) {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "server:\n  port: {}\n", port).unwrap();

            let config = Config::load(file.path()).unwrap();
            prop_assert_eq!(config.server.port, port);
            prop_assert_eq!(config.server.host, "0.0.0.0");
        }

        #[test]
        fn env_port_overrides_file(file_port in 1u16..=65535, env_port in 1u16..=65535) {
            let _guard = super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            super::clear_env();

            let mut file = NamedTempFile::new().unwrap();
            write!(file, "server:\n  port: {}\n", file_port).unwrap();
            std::env::set_var("HERITAGE_SERVER_PORT", env_port.to_string());

            let config = Config::load_with_env(file.path()).unwrap();
            std::env::remove_var("HERITAGE_SERVER_PORT");

            prop_assert_eq!(config.server.port, env_port);
        }
    }
}
