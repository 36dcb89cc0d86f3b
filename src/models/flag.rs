//! Feature flag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Flags known to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagName {
    AdminMaintenanceMode,
    PortalMaintenanceMode,
    ReviewsEnabled,
}

impl FlagName {
    pub const ALL: [FlagName; 3] = [
        FlagName::AdminMaintenanceMode,
        FlagName::PortalMaintenanceMode,
        FlagName::ReviewsEnabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlagName::AdminMaintenanceMode => "admin_maintenance_mode",
            FlagName::PortalMaintenanceMode => "portal_maintenance_mode",
            FlagName::ReviewsEnabled => "reviews_enabled",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FlagName::AdminMaintenanceMode => "Blocks the administration panel for maintenance",
            FlagName::PortalMaintenanceMode => "Blocks the public portal for maintenance",
            FlagName::ReviewsEnabled => "Allows creating and deleting reviews from the portal",
        }
    }
}

/// Persisted feature flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeatureFlag {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub maintenance_message: Option<String>,
    pub modified_by: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl FeatureFlag {
    /// Maintenance flags need a message when enabled
    pub fn is_maintenance(&self) -> bool {
        self.name.ends_with("_maintenance_mode")
    }
}
