//! User, role and permission models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SortDirection;

/// Role with every permission
pub const ROLE_ADMIN: &str = "admin";
/// Role that manages sites and tags
pub const ROLE_EDITOR: &str = "editor";
/// Default role of portal users
pub const ROLE_PUBLIC: &str = "public";

/// Account of an operator or a portal user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub last_name: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub enabled: bool,
    pub system_admin: bool,
    pub role_id: Option<i64>,
    /// Name of the role, joined in by the repository
    #[sqlx(default)]
    pub role_name: Option<String>,
    pub avatar: Option<String>,
    #[serde(skip_serializing)]
    pub deleted: bool,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// `name last_name`, trimmed when the last name is empty
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.last_name).trim().to_string()
    }

    pub fn is_admin_role(&self) -> bool {
        self.role_name.as_deref() == Some(ROLE_ADMIN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Permission {
    pub id: i64,
    pub name: String,
}

/// Raw user form, shared by create and update.
///
/// Every field is optional so that missing values can be reported per field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInput {
    pub email: Option<String>,
    pub name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub role_id: Option<i64>,
}

/// Validated values ready to be persisted
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role_id: Option<i64>,
    pub avatar: Option<String>,
    pub system_admin: bool,
}

/// Admin user search
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive email substring
    pub email: Option<String>,
    pub enabled: Option<bool>,
    pub role: Option<String>,
    pub order: SortDirection,
    pub page: u32,
}
