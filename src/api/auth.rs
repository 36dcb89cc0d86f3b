//! Authentication API endpoints
//!
//! Admin panel (opaque session in the `session` cookie):
//! - POST /admin/auth/login
//! - POST /admin/auth/logout
//! - GET /admin/auth/me
//!
//! Public API (JWT in the `access_token_cookie` cookie):
//! - POST /api/auth
//! - POST /api/logout

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    access_token_cookie, cookie_value, set_cookie, ApiError, AppState, AuthenticatedUser,
    ACCESS_TOKEN_COOKIE, SESSION_COOKIE,
};
use crate::api::responses::UserResponse;
use crate::services::{LoginInput, UserServiceError};

/// Request body of both login endpoints
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl From<LoginRequest> for LoginInput {
    fn from(body: LoginRequest) -> Self {
        LoginInput {
            email: body.email,
            password: body.password,
        }
    }
}

/// Response of a successful admin login
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserResponse,
    pub permissions: Vec<String>,
}

/// Admin routes reachable without a session
pub fn admin_public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(admin_login))
        .route("/auth/logout", post(admin_logout))
}

/// Admin routes that need a session
pub fn admin_protected_router() -> Router<AppState> {
    Router::new().route("/auth/me", get(admin_me))
}

/// Public API routes
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/auth", post(api_login))
        .route("/logout", post(api_logout))
}

// ============================================================================
// Admin panel
// ============================================================================

/// POST /admin/auth/login
async fn admin_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = state.user_service.login(&body.into()).await?;

    let max_age = (session.expires_at - session.created_at).num_seconds();
    let cookie = set_cookie(SESSION_COOKIE, &session.id, max_age, state.config.auth.cookie_secure)?;
    let permissions = state.user_service.permissions_of(&user).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse {
            user: user.into(),
            permissions,
        }),
    ))
}

/// POST /admin/auth/logout
async fn admin_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        state.user_service.logout(&token).await?;
    }
    let cookie = set_cookie(SESSION_COOKIE, "", 0, state.config.auth.cookie_secure)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "status": "logged_out" })),
    ))
}

/// GET /admin/auth/me
async fn admin_me(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<SessionResponse>, ApiError> {
    let permissions = state.user_service.permissions_of(&user).await?;
    Ok(Json(SessionResponse {
        user: user.into(),
        permissions,
    }))
}

// ============================================================================
// Public API
// ============================================================================

/// POST /api/auth
async fn api_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .user_service
        .authenticate(&body.into())
        .await
        .map_err(|e| match e {
            UserServiceError::AuthenticationError(_) => ApiError::invalid_credentials("Invalid credentials"),
            other => other.into(),
        })?;

    let cookie = access_token_cookie(&state, user.id)?;
    tracing::info!("User {} logged in to the portal", user.id);
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({})),
    ))
}

/// POST /api/logout
async fn api_logout(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let cookie = set_cookie(ACCESS_TOKEN_COOKIE, "", 0, state.config.auth.cookie_secure)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "status": "logged_out" })),
    ))
}
