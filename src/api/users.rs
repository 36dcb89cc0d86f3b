//! User administration endpoints
//!
//! - GET /admin/users (user_index)
//! - POST /admin/users (user_new)
//! - GET /admin/users/{id} (user_show)
//! - PUT /admin/users/{id} (user_update)
//! - DELETE /admin/users/{id} (user_destroy)
//! - POST /admin/users/{id}/block (block_user)
//! - POST /admin/users/{id}/unblock (unblock_user)
//! - GET /admin/roles (user_index)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{non_blank, AdminPageQuery, ValidJson};
use crate::api::middleware::{require_permission, ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{AdminPage, UserResponse};
use crate::models::{unless_all, Role, UserFilter, UserInput};

/// Query string of the user listing
#[derive(Debug, Default, Deserialize)]
pub struct UsersQuery {
    pub email: Option<String>,
    /// `true`, `false` or `todos`
    pub enabled: Option<String>,
    pub role: Option<String>,
    /// `asc` or `desc` on the registration date
    pub order: Option<String>,
    pub page: Option<String>,
}

impl UsersQuery {
    fn filter(self) -> UserFilter {
        let enabled = match unless_all(self.enabled.as_deref()).as_deref() {
            Some("true") | Some("1") => Some(true),
            Some("false") | Some("0") => Some(false),
            _ => None,
        };
        UserFilter {
            email: non_blank(self.email.as_deref()),
            enabled,
            role: unless_all(self.role.as_deref()),
            order: self
                .order
                .as_deref()
                .and_then(|o| o.parse().ok())
                .unwrap_or_default(),
            page: AdminPageQuery { page: self.page }.page(),
        }
    }
}

pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/{id}/block", post(block_user))
        .route("/{id}/unblock", post(unblock_user))
}

pub fn roles_router() -> Router<AppState> {
    Router::new().route("/", get(list_roles))
}

/// GET /admin/users
async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<UsersQuery>,
) -> Result<Json<AdminPage<UserResponse>>, ApiError> {
    require_permission(&state, &user, "user_index").await?;

    let page = state.user_service.search_users(&query.filter()).await?;
    Ok(Json(page.map(UserResponse::from).into()))
}

/// POST /admin/users
async fn create_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidJson(input): ValidJson<UserInput>,
) -> Result<impl IntoResponse, ApiError> {
    require_permission(&state, &user, "user_new").await?;

    let created = state.user_service.create_user(&input).await?;
    tracing::info!("User {} created by {}", created.id, user.id);
    Ok((StatusCode::CREATED, Json(UserResponse::from(created))))
}

/// GET /admin/users/{id}
async fn get_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    require_permission(&state, &user, "user_show").await?;

    let found = state
        .user_service
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(found.into()))
}

/// PUT /admin/users/{id}
async fn update_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ValidJson(input): ValidJson<UserInput>,
) -> Result<Json<UserResponse>, ApiError> {
    require_permission(&state, &user, "user_update").await?;

    let updated = state.user_service.update_user(id, &input).await?;
    Ok(Json(updated.into()))
}

/// DELETE /admin/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    require_permission(&state, &user, "user_destroy").await?;

    state.user_service.delete_user(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/users/{id}/block
async fn block_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    require_permission(&state, &user, "block_user").await?;

    let blocked = state
        .user_service
        .block_user(id, &user)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(blocked.into()))
}

/// POST /admin/users/{id}/unblock
async fn unblock_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    require_permission(&state, &user, "unblock_user").await?;

    let unblocked = state
        .user_service
        .unblock_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(unblocked.into()))
}

/// GET /admin/roles
async fn list_roles(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Role>>, ApiError> {
    require_permission(&state, &user, "user_index").await?;
    Ok(Json(state.user_service.list_roles().await?))
}
