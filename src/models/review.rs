//! Review model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{DateRange, ParseEnumError};

/// Moderation state of a review
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Pending => "pending",
            ReviewState::Approved => "approved",
            ReviewState::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewState {
    type Err = ParseEnumError;

    /// Accepts the stored names and the Spanish labels of the admin filters
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" | "pendiente" => Ok(ReviewState::Pending),
            "approved" | "aprobada" => Ok(ReviewState::Approved),
            "rejected" | "rechazada" => Ok(ReviewState::Rejected),
            _ => Err(ParseEnumError {
                kind: "review state",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ReviewState {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A review row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: i64,
    pub site_id: i64,
    pub user_id: i64,
    pub rating: i64,
    pub comment: String,
    #[sqlx(try_from = "String")]
    pub state: ReviewState,
    pub rejected_reason: Option<String>,
    pub deleted: bool,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A review joined with its author, as rendered by both surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewView {
    pub id: i64,
    #[serde(rename = "historic_site_id")]
    pub site_id: i64,
    pub rating: i64,
    pub comment: String,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub state: ReviewState,
    pub user_id: i64,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[sqlx(default)]
    pub site_name: Option<String>,
}

/// Ordering of the admin review listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReviewOrder {
    #[default]
    Newest,
    Oldest,
    BestRated,
    WorstRated,
}

impl ReviewOrder {
    pub fn from_query(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("antiguas") => ReviewOrder::Oldest,
            Some("mejor calificadas") => ReviewOrder::BestRated,
            Some("peor calificadas") => ReviewOrder::WorstRated,
            _ => ReviewOrder::Newest,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ReviewOrder::Newest => "r.inserted_at DESC, r.id DESC",
            ReviewOrder::Oldest => "r.inserted_at ASC, r.id ASC",
            ReviewOrder::BestRated => "r.rating DESC, r.inserted_at DESC",
            ReviewOrder::WorstRated => "r.rating ASC, r.inserted_at DESC",
        }
    }
}

/// Filters of the admin review listing
#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub site_id: Option<i64>,
    pub state: Option<ReviewState>,
    pub rating: Option<i64>,
    pub date_range: Option<DateRange>,
    /// Substring of the author's email or full name
    pub user: Option<String>,
    pub order: ReviewOrder,
}
