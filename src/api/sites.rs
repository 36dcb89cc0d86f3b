//! Public site endpoints
//!
//! - GET /api/sites - search visible sites
//! - POST /api/sites - create a site
//! - GET /api/sites/provinces
//! - GET /api/sites/{id} - site detail (counts a visit)
//! - GET|POST /api/sites/{id}/reviews
//! - GET|DELETE /api/sites/{id}/reviews/{review_id}
//! - PUT|DELETE /api/sites/{id}/favorite

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{PageQuery, SiteSearchQuery, ValidJson};
use crate::api::middleware::{ApiError, ApiUser, AppState, OptionalApiUser};
use crate::api::responses::{Collection, SiteResponse};
use crate::models::{FlagName, ReviewState, ReviewView};
use crate::services::SiteForm;

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sites).post(create_site))
        .route("/provinces", get(list_provinces))
        .route("/{id}", get(get_site))
        .route("/{id}/reviews", get(list_site_reviews).post(create_review))
        .route("/{id}/reviews/{review_id}", get(get_review).delete(delete_review))
        .route("/{id}/favorite", put(add_favorite).delete(remove_favorite))
}

// ============================================================================
// Sites
// ============================================================================

/// GET /api/sites
async fn list_sites(
    State(state): State<AppState>,
    OptionalApiUser(user): OptionalApiUser,
    Query(query): Query<SiteSearchQuery>,
) -> Result<Json<Collection<SiteResponse>>, ApiError> {
    let mut search = query.parse().map_err(|errors| ApiError::invalid_query(&errors))?;

    if query.only_favorites() {
        let user = user.ok_or_else(|| {
            ApiError::unauthorized("You must be logged in to filter by favorites")
        })?;
        search.favorites_of = Some(user.id);
    }

    let page = state.site_service.search_sites(&search).await?;
    let page = state.site_service.details_page(page).await?;
    Ok(Json(Collection::new(page.map(SiteResponse::from), "/api/sites")))
}

/// POST /api/sites
async fn create_site(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    ValidJson(form): ValidJson<SiteForm>,
) -> Result<impl IntoResponse, ApiError> {
    let input = state.site_service.validate_form(&form).await?;
    let site = state.site_service.create_site(user.id, &input).await?;
    let details = state.site_service.details(site).await?;
    Ok((StatusCode::CREATED, Json(SiteResponse::from(details))))
}

/// GET /api/sites/provinces
async fn list_provinces(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.site_service.list_provinces().await?))
}

/// GET /api/sites/{id}
async fn get_site(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SiteResponse>, ApiError> {
    let details = state.site_service.visit_site(id).await?;
    Ok(Json(details.into()))
}

// ============================================================================
// Reviews
// ============================================================================

async fn ensure_reviews_enabled(state: &AppState) -> Result<(), ApiError> {
    if state.flag_service.is_enabled(FlagName::ReviewsEnabled).await? {
        Ok(())
    } else {
        Err(ApiError::service_unavailable("The reviews are temporarily disabled"))
    }
}

fn forbidden_review() -> ApiError {
    ApiError::forbidden("You do not have permission to view this review")
}

/// GET /api/sites/{id}/reviews
async fn list_site_reviews(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Collection<ReviewView>>, ApiError> {
    let page = state
        .review_service
        .approved_for_site(id, &query.params())
        .await?;
    Ok(Json(Collection::new(page, &format!("/api/sites/{}/reviews", id))))
}

/// POST /api/sites/{id}/reviews
async fn create_review(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_reviews_enabled(&state).await?;

    let review = state
        .review_service
        .create_review(user.id, id, body.rating, body.comment.as_deref())
        .await?;
    let view = state
        .review_service
        .get_review(review.id)
        .await?
        .ok_or_else(|| ApiError::internal_error(format!("Review {} vanished after insert", review.id)))?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/sites/{id}/reviews/{review_id}
///
/// Only approved reviews are visible.
async fn get_review(
    State(state): State<AppState>,
    ApiUser(_user): ApiUser,
    Path((id, review_id)): Path<(i64, i64)>,
) -> Result<Json<ReviewView>, ApiError> {
    let review = state.review_service.review_of_site(id, review_id).await?;
    if review.state != ReviewState::Approved {
        return Err(forbidden_review());
    }
    Ok(Json(review))
}

/// DELETE /api/sites/{id}/reviews/{review_id}
///
/// Users may delete their own approved reviews.
async fn delete_review(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    Path((id, review_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    ensure_reviews_enabled(&state).await?;

    let review = state.review_service.review_of_site(id, review_id).await?;
    if review.state != ReviewState::Approved || review.user_id != user.id {
        return Err(forbidden_review());
    }
    state.review_service.delete_review(review.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Favourites
// ============================================================================

/// PUT /api/sites/{id}/favorite
async fn add_favorite(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.site_service.add_favorite(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/sites/{id}/favorite
async fn remove_favorite(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.site_service.remove_favorite(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
