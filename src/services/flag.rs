//! Feature flag service
//!
//! Flags are read on nearly every request by the maintenance gates, so
//! reads go through the cache and every update drops the cached copies.

use crate::cache::{keys, Cache};
use crate::db::repositories::FlagRepository;
use crate::models::{FeatureFlag, FlagName, User};
use crate::services::validation::FieldErrors;
use std::sync::Arc;

/// Longest accepted maintenance message
pub const MAX_MAINTENANCE_MESSAGE_LENGTH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum FlagServiceError {
    #[error("Feature flag not found")]
    NotFound,

    /// Only system administrators may change flags
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct FlagService {
    repo: Arc<dyn FlagRepository>,
    cache: Arc<Cache>,
}

impl FlagService {
    pub fn new(repo: Arc<dyn FlagRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    pub async fn list_flags(&self) -> Result<Vec<FeatureFlag>, FlagServiceError> {
        Ok(self.repo.list().await?)
    }

    pub async fn get_flag(&self, id: i64) -> Result<Option<FeatureFlag>, FlagServiceError> {
        Ok(self.repo.get_by_id(id).await?)
    }

    /// Cached lookup by name
    pub async fn get_flag_by_name(&self, name: &str) -> Result<Option<FeatureFlag>, FlagServiceError> {
        self.cache
            .get_or_load(&keys::flag(name), || async {
                Ok::<_, FlagServiceError>(self.repo.get_by_name(name).await?)
            })
            .await
    }

    pub async fn create_flag(&self, name: &str, description: &str) -> Result<FeatureFlag, FlagServiceError> {
        let flag = self.repo.create(name, description).await?;
        self.cache.invalidate(&keys::flag(name)).await;
        tracing::info!("Created feature flag {}", name);
        Ok(flag)
    }

    /// Whether a flag is on; missing flags count as off
    pub async fn is_enabled(&self, flag: FlagName) -> Result<bool, FlagServiceError> {
        Ok(self
            .get_flag_by_name(flag.as_str())
            .await?
            .is_some_and(|f| f.enabled))
    }

    /// Message of an enabled flag
    pub async fn maintenance_message(&self, flag: FlagName) -> Result<Option<String>, FlagServiceError> {
        Ok(self
            .get_flag_by_name(flag.as_str())
            .await?
            .filter(|f| f.enabled)
            .and_then(|f| f.maintenance_message))
    }

    /// Switch a flag on or off.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless `acting_user` is a system administrator
    /// - `NotFound` when the flag does not exist
    /// - `ValidationError` when enabling a maintenance flag without a
    ///   message, or when the message is too long
    pub async fn update_flag(
        &self,
        id: i64,
        enabled: bool,
        message: Option<&str>,
        acting_user: &User,
    ) -> Result<FeatureFlag, FlagServiceError> {
        if !acting_user.system_admin {
            tracing::warn!("User {} tried to change feature flag {}", acting_user.id, id);
            return Err(FlagServiceError::Forbidden(
                "Only system administrators can change feature flags".to_string(),
            ));
        }

        let flag = self.repo.get_by_id(id).await?.ok_or(FlagServiceError::NotFound)?;
        let message = message.map(str::trim).filter(|m| !m.is_empty());

        let mut errors = FieldErrors::new();
        if enabled && flag.is_maintenance() && message.is_none() {
            errors.add("maintenance_message", "A message is required to enable maintenance mode");
        }
        if let Some(message) = message {
            errors.max_len("maintenance_message", message, MAX_MAINTENANCE_MESSAGE_LENGTH);
        }
        errors.into_result().map_err(FlagServiceError::ValidationError)?;

        self.repo.update(id, enabled, message, &acting_user.email).await?;
        self.cache.invalidate_pattern(keys::FLAGS_PATTERN).await;
        tracing::info!(
            "Feature flag {} set to {} by {}",
            flag.name,
            enabled,
            acting_user.email
        );

        self.repo.get_by_id(id).await?.ok_or(FlagServiceError::NotFound)
    }
}
