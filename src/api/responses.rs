//! Shared API response types
//!
//! JSON shapes returned by the public API and the admin routes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{
    ConservationState, FeatureFlag, Image, Modification, PagedResult, ReviewView, SiteDetails, Tag,
    User,
};

// ============================================================================
// Collections
// ============================================================================

/// Paginated collection with metadata and navigation links
#[derive(Debug, Serialize)]
pub struct Collection<T> {
    pub data: Vec<T>,
    #[serde(rename = "_meta")]
    pub meta: CollectionMeta,
    #[serde(rename = "_links")]
    pub links: CollectionLinks,
}

#[derive(Debug, Serialize)]
pub struct CollectionMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub total_items: i64,
}

/// Request paths of the current, next and previous pages
#[derive(Debug, Serialize)]
pub struct CollectionLinks {
    #[serde(rename = "self")]
    pub self_link: String,
    pub next: Option<String>,
    pub prev: Option<String>,
}

impl<T> Collection<T> {
    /// Build a collection for the listing served at `path`
    pub fn new(page: PagedResult<T>, path: &str) -> Self {
        let link = |page_number: u32| format!("{}?page={}&per_page={}", path, page_number, page.per_page);
        let links = CollectionLinks {
            self_link: link(page.page),
            next: page.has_next().then(|| link(page.page + 1)),
            prev: page.has_prev().then(|| link(page.page - 1)),
        };
        let meta = CollectionMeta {
            page: page.page,
            per_page: page.per_page,
            total_pages: page.total_pages(),
            total_items: page.total,
        };
        Self {
            data: page.items,
            meta,
            links,
        }
    }
}

/// Admin listing page
#[derive(Debug, Serialize)]
pub struct AdminPage<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> From<PagedResult<T>> for AdminPage<T> {
    fn from(page: PagedResult<T>) -> Self {
        let total_pages = page.total_pages();
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            total_pages,
        }
    }
}

// ============================================================================
// Sites
// ============================================================================

/// Site as exposed by the APIs
#[derive(Debug, Serialize)]
pub struct SiteResponse {
    pub id: i64,
    pub name: String,
    pub short_description: String,
    pub description: String,
    pub city: String,
    pub province: String,
    pub lat: f64,
    pub long: f64,
    pub state_of_conservation: ConservationState,
    pub inauguration_year: i32,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Option<i64>,
    pub rating: Option<f64>,
    pub reviews: Vec<ReviewView>,
    pub visit_count: i64,
    pub visible: bool,
    pub cover_image: Option<CoverImage>,
    pub images_list: Vec<ImageResponse>,
}

#[derive(Debug, Serialize)]
pub struct CoverImage {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: i64,
    /// Public URL
    pub image: String,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub is_cover: bool,
    pub content_type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Image> for ImageResponse {
    fn from(image: Image) -> Self {
        Self {
            id: image.id,
            image: image.url,
            title: image.title,
            description: image.description,
            order_index: image.order_index,
            is_cover: image.is_cover,
            content_type: image.content_type,
            size: image.size,
            created_at: image.created_at,
            updated_at: image.updated_at,
        }
    }
}

impl From<SiteDetails> for SiteResponse {
    fn from(details: SiteDetails) -> Self {
        let cover_image = details.cover_image().map(|image| CoverImage {
            url: image.url.clone(),
            title: image.title.clone(),
        });
        let site = details.site;
        Self {
            id: site.id,
            name: site.name,
            short_description: site.short_description,
            description: site.description,
            city: site.city,
            province: site.province,
            lat: site.latitude,
            long: site.longitude,
            state_of_conservation: site.state_of_conservation,
            inauguration_year: site.inauguration_year,
            categories: details.categories.into_iter().map(|c| c.name).collect(),
            tags: details.tags.into_iter().map(|t| t.name).collect(),
            inserted_at: site.inserted_at,
            updated_at: site.updated_at,
            user_id: details.user_id,
            rating: details.rating,
            reviews: details.reviews,
            visit_count: site.visit_count,
            visible: site.visible,
            cover_image,
            images_list: details.images.into_iter().map(ImageResponse::from).collect(),
        }
    }
}

/// Entry of a site's audit trail
#[derive(Debug, Serialize)]
pub struct ModificationResponse {
    pub id: i64,
    pub date_time: DateTime<Utc>,
    pub user_email: Option<String>,
    pub kinds: Vec<&'static str>,
}

impl From<Modification> for ModificationResponse {
    fn from(m: Modification) -> Self {
        Self {
            id: m.id,
            date_time: m.date_time,
            user_email: m.user_email,
            kinds: m.kinds.iter().map(|k| k.as_str()).collect(),
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// User as shown to operators
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub last_name: String,
    pub enabled: bool,
    pub system_admin: bool,
    pub role_id: Option<i64>,
    pub role: Option<String>,
    pub avatar: Option<String>,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            last_name: user.last_name,
            enabled: user.enabled,
            system_admin: user.system_admin,
            role_id: user.role_id,
            role: user.role_name,
            avatar: user.avatar,
            inserted_at: user.inserted_at,
            updated_at: user.updated_at,
        }
    }
}

/// `GET /api/me`
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            avatar: user.avatar,
        }
    }
}

// ============================================================================
// Tags and flags
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TagResponse {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Tag> for TagResponse {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            created_at: tag.created_at,
        }
    }
}

/// `GET /api/flags`
#[derive(Debug, Serialize)]
pub struct PortalFlags {
    pub portal_maintenance: bool,
    pub portal_maintenance_message: Option<String>,
    pub reviews_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct FlagResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub maintenance_message: Option<String>,
    pub modified_by: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl From<FeatureFlag> for FlagResponse {
    fn from(flag: FeatureFlag) -> Self {
        Self {
            id: flag.id,
            name: flag.name,
            description: flag.description,
            enabled: flag.enabled,
            maintenance_message: flag.maintenance_message,
            modified_by: flag.modified_by,
            modified_at: flag.modified_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListParams;

    #[test]
    fn test_collection_links() {
        let page = PagedResult::new(vec![1, 2], 25, &ListParams::new(2, 10));
        let json = serde_json::to_value(Collection::new(page, "/api/sites")).unwrap();

        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert_eq!(json["_meta"]["total_pages"], 3);
        assert_eq!(json["_meta"]["total_items"], 25);
        assert_eq!(json["_links"]["self"], "/api/sites?page=2&per_page=10");
        assert_eq!(json["_links"]["next"], "/api/sites?page=3&per_page=10");
        assert_eq!(json["_links"]["prev"], "/api/sites?page=1&per_page=10");
    }

    #[test]
    fn test_empty_collection() {
        let page: PagedResult<i64> = PagedResult::new(vec![], 0, &ListParams::new(1, 100));
        let json = serde_json::to_value(Collection::new(page, "/api/sites")).unwrap();

        assert_eq!(json["_meta"]["total_pages"], 0);
        assert_eq!(json["_links"]["self"], "/api/sites?page=1&per_page=100");
        assert!(json["_links"]["next"].is_null());
        assert!(json["_links"]["prev"].is_null());
    }
}
