//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Slugified label attached to historic sites.
///
/// `name` is always the slug form, so it doubles as the unique key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted: bool,
}

/// Ordering of the admin tag listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagOrder {
    /// Name A-Z
    Alphabetical,
    /// Name Z-A
    ReverseAlphabetical,
    Oldest,
    #[default]
    Newest,
}

impl TagOrder {
    /// Parse the admin query value, falling back to newest first
    pub fn from_query(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("alfabetico") => TagOrder::Alphabetical,
            Some("inverso") => TagOrder::ReverseAlphabetical,
            Some("antiguos") => TagOrder::Oldest,
            _ => TagOrder::Newest,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            TagOrder::Alphabetical => "name ASC",
            TagOrder::ReverseAlphabetical => "name DESC",
            TagOrder::Oldest => "created_at ASC, id ASC",
            TagOrder::Newest => "created_at DESC, id DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_order_from_query() {
        assert_eq!(TagOrder::from_query(Some("alfabetico")), TagOrder::Alphabetical);
        assert_eq!(TagOrder::from_query(Some("inverso")), TagOrder::ReverseAlphabetical);
        assert_eq!(TagOrder::from_query(Some("antiguos")), TagOrder::Oldest);
        assert_eq!(TagOrder::from_query(Some("recientes")), TagOrder::Newest);
        assert_eq!(TagOrder::from_query(None), TagOrder::Newest);
    }
}
