//! Site administration endpoints
//!
//! - GET /admin/sites (list_sites)
//! - POST /admin/sites (create_site)
//! - GET /admin/sites/options (list_sites)
//! - GET /admin/sites/export.csv (export_csv)
//! - GET /admin/sites/{id} (list_sites)
//! - PUT /admin/sites/{id} (edit_site)
//! - DELETE /admin/sites/{id} (delete_site)
//! - GET /admin/sites/{id}/modifications (edit_site)
//! - GET|POST /admin/categories

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{non_blank, AdminPageQuery, ValidJson};
use crate::api::middleware::{require_permission, ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{AdminPage, ModificationResponse, SiteResponse};
use crate::models::{
    unless_all, AdminSiteFilter, AdminSiteOrder, Category, ConservationState, DateRange,
    HistoricSite, ModificationFilter, SiteDetails,
};
use crate::services::tag::TagSummary;
use crate::services::SiteForm;

/// Query string of the admin site listing and the CSV export
#[derive(Debug, Default, Deserialize)]
pub struct AdminSitesQuery {
    pub search: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    /// Comma-separated tag ids, or `todas`
    pub tags: Option<String>,
    pub state: Option<String>,
    pub visible: Option<String>,
    /// `YYYY-MM-DD a YYYY-MM-DD`
    pub date_range: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
}

impl AdminSitesQuery {
    pub fn filter(&self) -> AdminSiteFilter {
        let tag_ids = match unless_all(self.tags.as_deref()) {
            Some(tags) if !tags.split(',').any(|t| t.trim().eq_ignore_ascii_case("todas")) => tags
                .split(',')
                .filter_map(|t| t.trim().parse().ok())
                .collect(),
            _ => Vec::new(),
        };
        AdminSiteFilter {
            search: non_blank(self.search.as_deref()),
            city: unless_all(self.city.as_deref()),
            province: unless_all(self.province.as_deref()),
            tag_ids,
            state: unless_all(self.state.as_deref()).and_then(|s| s.parse::<ConservationState>().ok()),
            visible_only: self
                .visible
                .as_deref()
                .is_some_and(|v| matches!(v.trim(), "true" | "1" | "on")),
            date_range: self.date_range.as_deref().and_then(DateRange::parse),
            order: AdminSiteOrder::from_query(self.order.as_deref()),
        }
    }

    fn page(&self) -> u32 {
        AdminPageQuery {
            page: self.page.clone(),
        }
        .page()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ModificationsQuery {
    pub search: Option<String>,
    pub date_range: Option<String>,
    pub kind: Option<String>,
    pub page: Option<String>,
}

impl ModificationsQuery {
    fn filter(&self) -> ModificationFilter {
        ModificationFilter {
            search: non_blank(self.search.as_deref()),
            date_range: self.date_range.as_deref().and_then(DateRange::parse_lenient),
            kind: unless_all(self.kind.as_deref()).and_then(|k| k.parse().ok()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: Option<String>,
}

/// Site detail with the ids the edit form needs
#[derive(Debug, Serialize)]
pub struct AdminSiteResponse {
    #[serde(flatten)]
    pub site: SiteResponse,
    pub tag_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
}

impl From<SiteDetails> for AdminSiteResponse {
    fn from(details: SiteDetails) -> Self {
        let tag_ids = details.tags.iter().map(|t| t.id).collect();
        let category_ids = details.categories.iter().map(|c| c.id).collect();
        Self {
            site: details.into(),
            tag_ids,
            category_ids,
        }
    }
}

/// Values offered by the listing filters and the site form
#[derive(Debug, Serialize)]
pub struct SiteOptions {
    pub cities: Vec<String>,
    pub provinces: Vec<String>,
    pub tags: Vec<TagSummary>,
    pub categories: Vec<Category>,
    pub states: Vec<ConservationState>,
}

pub fn sites_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sites).post(create_site))
        .route("/options", get(site_options))
        .route("/export.csv", get(export_csv))
        .route("/{id}", get(get_site).put(update_site).delete(delete_site))
        .route("/{id}/modifications", get(list_modifications))
}

pub fn categories_router() -> Router<AppState> {
    Router::new().route("/", get(list_categories).post(create_category))
}

// ============================================================================
// Sites
// ============================================================================

/// GET /admin/sites
async fn list_sites(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<AdminSitesQuery>,
) -> Result<Json<AdminPage<HistoricSite>>, ApiError> {
    require_permission(&state, &user, "list_sites").await?;

    let page = state
        .site_service
        .list_sites_admin(&query.filter(), query.page())
        .await?;
    Ok(Json(page.into()))
}

/// POST /admin/sites
async fn create_site(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidJson(form): ValidJson<SiteForm>,
) -> Result<impl IntoResponse, ApiError> {
    require_permission(&state, &user, "create_site").await?;

    let input = state.site_service.validate_form(&form).await?;
    let site = state.site_service.create_site(user.id, &input).await?;
    let details = state.site_service.details(site).await?;
    Ok((StatusCode::CREATED, Json(AdminSiteResponse::from(details))))
}

/// GET /admin/sites/{id}
async fn get_site(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<AdminSiteResponse>, ApiError> {
    require_permission(&state, &user, "list_sites").await?;

    let site = state
        .site_service
        .get_site(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Site not found"))?;
    Ok(Json(state.site_service.details(site).await?.into()))
}

/// PUT /admin/sites/{id}
async fn update_site(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ValidJson(form): ValidJson<SiteForm>,
) -> Result<Json<AdminSiteResponse>, ApiError> {
    require_permission(&state, &user, "edit_site").await?;

    let input = state.site_service.validate_form(&form).await?;
    let site = state
        .site_service
        .update_site(id, user.id, &input)
        .await?
        .ok_or_else(|| ApiError::not_found("Site not found"))?;
    Ok(Json(state.site_service.details(site).await?.into()))
}

/// DELETE /admin/sites/{id}
async fn delete_site(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    require_permission(&state, &user, "delete_site").await?;

    state.site_service.delete_site(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/sites/{id}/modifications
async fn list_modifications(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Query(query): Query<ModificationsQuery>,
) -> Result<Json<AdminPage<ModificationResponse>>, ApiError> {
    require_permission(&state, &user, "edit_site").await?;

    if state.site_service.get_site(id).await?.is_none() {
        return Err(ApiError::not_found("Site not found"));
    }
    let page = AdminPageQuery {
        page: query.page.clone(),
    }
    .page();
    let page = state
        .site_service
        .list_modifications(id, &query.filter(), page)
        .await?;
    Ok(Json(page.map(ModificationResponse::from).into()))
}

/// GET /admin/sites/export.csv
async fn export_csv(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<AdminSitesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_permission(&state, &user, "export_csv").await?;

    let export = state.site_service.export_csv(&query.filter()).await?;
    let disposition = format!("attachment; filename=\"{}\"", export.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.content,
    ))
}

/// GET /admin/sites/options
async fn site_options(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<SiteOptions>, ApiError> {
    require_permission(&state, &user, "list_sites").await?;

    Ok(Json(SiteOptions {
        cities: state.site_service.list_cities().await?,
        provinces: state.site_service.list_provinces().await?,
        tags: state.tag_service.public_tags().await?,
        categories: state.site_service.list_categories().await?,
        states: ConservationState::ALL.to_vec(),
    }))
}

// ============================================================================
// Categories
// ============================================================================

/// GET /admin/categories
async fn list_categories(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.site_service.list_categories().await?))
}

/// POST /admin/categories
async fn create_category(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidJson(body): ValidJson<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_permission(&state, &user, "edit_site").await?;

    let category = state
        .site_service
        .create_category(body.name.as_deref().unwrap_or_default())
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}
