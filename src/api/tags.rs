//! Tag API endpoints
//!
//! - GET /api/tags - every active tag
//! - GET /admin/tags - paginated listing with search and ordering
//! - POST /admin/tags
//! - PUT /admin/tags/{id}
//! - DELETE /admin/tags/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{non_blank, AdminPageQuery, ValidJson};
use crate::api::middleware::{require_permission, ApiError, AppState, AuthenticatedUser};
use crate::api::responses::TagResponse;
use crate::models::TagOrder;
use crate::services::tag::TagSummary;

const PERMISSION: &str = "tags_management";

#[derive(Debug, Deserialize)]
pub struct AdminTagsQuery {
    pub search: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<TagResponse>,
    pub total: i64,
    pub page: u32,
    pub total_pages: u32,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(list_public_tags))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags).post(create_tag))
        .route("/{id}", put(update_tag).delete(delete_tag))
}

/// GET /api/tags
async fn list_public_tags(State(state): State<AppState>) -> Result<Json<Vec<TagSummary>>, ApiError> {
    Ok(Json(state.tag_service.public_tags().await?))
}

/// GET /admin/tags
async fn list_tags(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<AdminTagsQuery>,
) -> Result<Json<TagListResponse>, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    let page = AdminPageQuery { page: query.page }.page();
    let search = non_blank(query.search.as_deref());
    let result = state
        .tag_service
        .list_tags(page, search.as_deref(), TagOrder::from_query(query.order.as_deref()))
        .await?;

    Ok(Json(TagListResponse {
        tags: result.tags.into_iter().map(TagResponse::from).collect(),
        total: result.total,
        page,
        total_pages: result.total_pages,
    }))
}

/// POST /admin/tags
async fn create_tag(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidJson(body): ValidJson<TagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    let tag = state
        .tag_service
        .create_tag(body.name.as_deref().unwrap_or_default())
        .await?;
    Ok((StatusCode::CREATED, Json(TagResponse::from(tag))))
}

/// PUT /admin/tags/{id}
async fn update_tag(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<TagRequest>,
) -> Result<Json<TagResponse>, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    let tag = state
        .tag_service
        .update_tag(id, body.name.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(tag.into()))
}

/// DELETE /admin/tags/{id}
async fn delete_tag(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    state.tag_service.delete_tag(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
