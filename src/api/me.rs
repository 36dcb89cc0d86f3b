//! Current portal user
//!
//! - GET /api/me
//! - PUT /api/me
//! - GET /api/me/favorites
//! - GET /api/me/reviews

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{PageQuery, ValidJson};
use crate::api::middleware::{ApiError, ApiUser, AppState};
use crate::api::responses::{Collection, ProfileResponse, SiteResponse, UserResponse};
use crate::models::ReviewView;

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_profile).put(update_profile))
        .route("/favorites", get(list_favorites))
        .route("/reviews", get(list_reviews))
}

/// GET /api/me
async fn get_profile(ApiUser(user): ApiUser) -> Json<ProfileResponse> {
    Json(user.into())
}

/// PUT /api/me
async fn update_profile(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    ValidJson(body): ValidJson<ProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .user_service
        .update_profile(
            user.id,
            body.name.as_deref(),
            body.last_name.as_deref(),
            body.avatar.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// GET /api/me/favorites
async fn list_favorites(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Collection<SiteResponse>>, ApiError> {
    let page = state
        .site_service
        .list_favorites(user.id, &query.params())
        .await?;
    let page = state.site_service.details_page(page).await?;
    Ok(Json(Collection::new(page.map(SiteResponse::from), "/api/me/favorites")))
}

/// GET /api/me/reviews?order_by=asc|desc
async fn list_reviews(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Collection<ReviewView>>, ApiError> {
    let page = state
        .review_service
        .approved_for_user(user.id, query.direction(), &query.params())
        .await?;
    Ok(Json(Collection::new(page, "/api/me/reviews")))
}
