//! Modification audit trail model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{DateRange, ParseEnumError};

/// What a modification changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationKind {
    Creation,
    Edit,
    Deletion,
    StateChange,
    TagsChange,
}

impl ModificationKind {
    pub const ALL: [ModificationKind; 5] = [
        ModificationKind::Creation,
        ModificationKind::Edit,
        ModificationKind::Deletion,
        ModificationKind::StateChange,
        ModificationKind::TagsChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModificationKind::Creation => "creation",
            ModificationKind::Edit => "edit",
            ModificationKind::Deletion => "deletion",
            ModificationKind::StateChange => "state_change",
            ModificationKind::TagsChange => "tags_change",
        }
    }
}

impl fmt::Display for ModificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModificationKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModificationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| ParseEnumError {
                kind: "modification kind",
                value: s.to_string(),
            })
    }
}

/// One entry of a site's audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modification {
    pub id: i64,
    pub site_id: i64,
    pub user_id: i64,
    pub user_email: Option<String>,
    pub date_time: DateTime<Utc>,
    pub kinds: Vec<ModificationKind>,
}

/// Filters of a site's modification listing
#[derive(Debug, Clone, Default)]
pub struct ModificationFilter {
    /// Substring of the author's email
    pub search: Option<String>,
    pub date_range: Option<DateRange>,
    pub kind: Option<ModificationKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in ModificationKind::ALL {
            assert_eq!(kind.as_str().parse::<ModificationKind>().unwrap(), kind);
        }
        assert!("todos".parse::<ModificationKind>().is_err());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ModificationKind::TagsChange).unwrap();
        assert_eq!(json, "\"tags_change\"");
    }
}
