//! Site image model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of active images per site
pub const MAX_IMAGES_PER_SITE: usize = 10;

/// Image of a site's gallery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub id: i64,
    pub site_id: i64,
    /// Public URL of the stored object
    pub url: String,
    pub object_key: String,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub is_cover: bool,
    pub content_type: String,
    pub size: i64,
    #[serde(skip_serializing)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values of an image row about to be inserted
#[derive(Debug, Clone)]
pub struct NewImage {
    pub site_id: i64,
    pub url: String,
    pub object_key: String,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub is_cover: bool,
    pub content_type: String,
    pub size: i64,
}
