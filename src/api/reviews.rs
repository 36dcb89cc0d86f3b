//! Review moderation endpoints (reviews_management)
//!
//! - GET /admin/reviews
//! - GET /admin/reviews/{id}
//! - POST /admin/reviews/{id}/approve
//! - POST /admin/reviews/{id}/reject
//! - DELETE /admin/reviews/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{non_blank, AdminPageQuery, ValidJson};
use crate::api::middleware::{require_permission, ApiError, AppState, AuthenticatedUser};
use crate::api::responses::AdminPage;
use crate::models::{unless_all, DateRange, ReviewFilter, ReviewOrder, ReviewView};

const PERMISSION: &str = "reviews_management";

#[derive(Debug, Default, Deserialize)]
pub struct ReviewsQuery {
    pub site_id: Option<String>,
    pub state: Option<String>,
    pub rating: Option<String>,
    pub date_range: Option<String>,
    pub user: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
}

impl ReviewsQuery {
    fn filter(&self) -> ReviewFilter {
        ReviewFilter {
            site_id: unless_all(self.site_id.as_deref()).and_then(|v| v.parse().ok()),
            state: unless_all(self.state.as_deref()).and_then(|v| v.parse().ok()),
            rating: unless_all(self.rating.as_deref()).and_then(|v| v.parse().ok()),
            date_range: self.date_range.as_deref().and_then(DateRange::parse),
            user: non_blank(self.user.as_deref()),
            order: ReviewOrder::from_query(self.order.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews))
        .route("/{id}", get(get_review).delete(delete_review))
        .route("/{id}/approve", post(approve_review))
        .route("/{id}/reject", post(reject_review))
}

/// GET /admin/reviews
async fn list_reviews(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<ReviewsQuery>,
) -> Result<Json<AdminPage<ReviewView>>, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    let page = AdminPageQuery {
        page: query.page.clone(),
    }
    .page();
    let reviews = state
        .review_service
        .list_reviews_admin(&query.filter(), page)
        .await?;
    Ok(Json(reviews.into()))
}

/// GET /admin/reviews/{id}
async fn get_review(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ReviewView>, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    let review = state
        .review_service
        .get_review(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    Ok(Json(review))
}

/// POST /admin/reviews/{id}/approve
async fn approve_review(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    state.review_service.approve_review(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/reviews/{id}/reject
async fn reject_review(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<RejectRequest>,
) -> Result<StatusCode, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    state
        .review_service
        .reject_review(id, body.reason.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /admin/reviews/{id}
async fn delete_review(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    state.review_service.delete_review(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReviewState;

    #[test]
    fn test_reviews_filter() {
        let filter = ReviewsQuery {
            site_id: Some("4".to_string()),
            state: Some("Pendiente".to_string()),
            rating: Some("todas".to_string()),
            user: Some(" ana ".to_string()),
            order: Some("mejor calificadas".to_string()),
            ..Default::default()
        }
        .filter();

        assert_eq!(filter.site_id, Some(4));
        assert_eq!(filter.state, Some(ReviewState::Pending));
        assert_eq!(filter.rating, None);
        assert_eq!(filter.user.as_deref(), Some("ana"));
        assert_eq!(filter.order, ReviewOrder::BestRated);
    }
}
