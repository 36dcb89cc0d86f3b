//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type and the conversions from service errors
//! - Admin session authentication and permission checks
//! - Access token authentication of the public API, with token refresh
//! - Maintenance gates driven by feature flags

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::models::{FlagName, User};
use crate::services::{
    FieldErrors, FlagService, FlagServiceError, GoogleAuthError, GoogleAuthService, ImageService,
    ImageServiceError, ReviewService, ReviewServiceError, SiteService, SiteServiceError,
    TagService, TagServiceError, TokenService, UserService, UserServiceError,
};
use crate::storage::StorageError;
use crate::views::Views;

/// Cookie carrying the admin session token
pub const SESSION_COOKIE: &str = "session";

/// Cookie carrying the public API access token
pub const ACCESS_TOKEN_COOKIE: &str = "access_token_cookie";

/// Cookie carrying the signed OAuth state
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub user_service: Arc<UserService>,
    pub site_service: Arc<SiteService>,
    pub tag_service: Arc<TagService>,
    pub flag_service: Arc<FlagService>,
    pub image_service: Arc<ImageService>,
    pub review_service: Arc<ReviewService>,
    pub tokens: Arc<TokenService>,
    pub google: Arc<GoogleAuthService>,
    pub views: Arc<Views>,
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn invalid_query(errors: &FieldErrors) -> Self {
        Self::with_details("invalid_query", "Parameter validation failed", errors.to_json())
    }

    pub fn invalid_data(errors: &FieldErrors) -> Self {
        Self::with_details("invalid_data", "Invalid data input", errors.to_json())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("invalid_data", message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new("already_exists", message)
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::new("invalid_credentials", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }

    pub fn teapot() -> Self {
        Self::new("im_a_teapot", "I'm a teapot")
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("service_unavailable", message)
    }

    pub fn maintenance(message: impl Into<String>) -> Self {
        Self::new("maintenance", message)
    }

    /// Log `detail` and answer with a generic message
    pub fn internal_error(detail: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {:#}", detail);
        Self::new("server_error", "An unexpected server error occurred")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "invalid_query" | "invalid_data" | "invalid_state" | "already_exists" => StatusCode::BAD_REQUEST,
            "invalid_credentials" | "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "im_a_teapot" => StatusCode::IM_A_TEAPOT,
            "service_unavailable" | "maintenance" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(message) => ApiError::invalid_credentials(message),
            UserServiceError::ValidationError(errors) => ApiError::invalid_data(&errors),
            UserServiceError::NotFound => ApiError::not_found("User not found"),
            UserServiceError::Forbidden(message) => ApiError::forbidden(message),
            UserServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<SiteServiceError> for ApiError {
    fn from(e: SiteServiceError) -> Self {
        match e {
            SiteServiceError::NotFound => ApiError::not_found("Site not found"),
            SiteServiceError::ValidationError(errors) => ApiError::invalid_data(&errors),
            SiteServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::NotFound => ApiError::not_found("Tag not found"),
            TagServiceError::ValidationError(errors) => ApiError::invalid_data(&errors),
            TagServiceError::AlreadyExists(name) => {
                ApiError::already_exists(format!("A tag named '{}' already exists", name))
            }
            TagServiceError::InUse(count) => ApiError::conflict(format!(
                "The tag is used by {} site(s) and cannot be deleted",
                count
            )),
            TagServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<FlagServiceError> for ApiError {
    fn from(e: FlagServiceError) -> Self {
        match e {
            FlagServiceError::NotFound => ApiError::not_found("Feature flag not found"),
            FlagServiceError::Forbidden(message) => ApiError::forbidden(message),
            FlagServiceError::ValidationError(errors) => ApiError::invalid_data(&errors),
            FlagServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<ImageServiceError> for ApiError {
    fn from(e: ImageServiceError) -> Self {
        match e {
            ImageServiceError::SiteNotFound => ApiError::not_found("Site not found"),
            ImageServiceError::Invalid(message) => ApiError::bad_request(message),
            ImageServiceError::PermissionDenied => ApiError::forbidden("Permission denied"),
            ImageServiceError::Upload(StorageError::Io(e)) => ApiError::internal_error(e),
            ImageServiceError::Upload(e) => ApiError::bad_request(e.to_string()),
            ImageServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<ReviewServiceError> for ApiError {
    fn from(e: ReviewServiceError) -> Self {
        match e {
            ReviewServiceError::NotFound => ApiError::not_found("Review not found"),
            ReviewServiceError::SiteNotFound => ApiError::not_found("Site not found"),
            ReviewServiceError::AlreadyExists => {
                ApiError::already_exists("You have already reviewed this site")
            }
            ReviewServiceError::Conflict(message) => ApiError::conflict(message),
            ReviewServiceError::ValidationError(errors) => ApiError::invalid_data(&errors),
            ReviewServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

impl From<GoogleAuthError> for ApiError {
    fn from(e: GoogleAuthError) -> Self {
        match e {
            GoogleAuthError::NotConfigured => ApiError::internal_error("Google sign-in is not configured"),
            GoogleAuthError::TokenExchange(message) => {
                ApiError::bad_request(format!("Token exchange failed: {}", message))
            }
            GoogleAuthError::InvalidToken(message) => {
                ApiError::unauthorized(format!("Invalid Google token: {}", message))
            }
            GoogleAuthError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

// ============================================================================
// Cookies
// ============================================================================

/// Value of a request cookie
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| {
            cookie
                .trim()
                .strip_prefix(name)?
                .strip_prefix('=')
                .map(str::to_string)
        })
}

/// `Set-Cookie` value of an HttpOnly, SameSite=Lax cookie; a zero
/// `max_age` clears it
pub fn set_cookie(name: &str, value: &str, max_age: i64, secure: bool) -> Result<HeaderValue, ApiError> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(ApiError::internal_error)
}

/// `Set-Cookie` value carrying a fresh access token
pub fn access_token_cookie(state: &AppState, user_id: i64) -> Result<HeaderValue, ApiError> {
    let token = state
        .tokens
        .create_token(user_id)
        .map_err(ApiError::internal_error)?;
    set_cookie(
        ACCESS_TOKEN_COOKIE,
        &token,
        state.tokens.max_age_seconds(),
        state.config.auth.cookie_secure,
    )
}

/// Session token from the `session` cookie or a Bearer header
fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| cookie_value(headers, SESSION_COOKIE))
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

// ============================================================================
// Extractors
// ============================================================================

/// User of the admin session
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// User of a valid access token
#[derive(Debug, Clone)]
pub struct ApiUser(pub User);

impl<S> FromRequestParts<S> for ApiUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ApiUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Missing or invalid access token"))
    }
}

/// Access token user when one is present
#[derive(Debug, Clone)]
pub struct OptionalApiUser(pub Option<User>);

impl<S> FromRequestParts<S> for OptionalApiUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalApiUser(
            parts.extensions.get::<ApiUser>().map(|user| user.0.clone()),
        ))
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Admin session middleware
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing session"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Fail with 403 unless the user's role grants `permission`
pub async fn require_permission(state: &AppState, user: &User, permission: &str) -> Result<(), ApiError> {
    if state.user_service.has_permission(user, permission).await? {
        Ok(())
    } else {
        tracing::warn!("User {} lacks permission {}", user.id, permission);
        Err(ApiError::forbidden(format!(
            "You do not have the '{}' permission",
            permission
        )))
    }
}

/// Access token middleware of the public API.
///
/// A valid token attaches [`ApiUser`]; invalid tokens are ignored so public
/// routes keep working. Tokens close to expiry are reissued on the
/// response unless the handler already set the cookie.
pub async fn api_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let mut refresh_for = None;

    if let Some(token) = cookie_value(request.headers(), ACCESS_TOKEN_COOKIE) {
        match state.tokens.verify_token(&token) {
            Ok(claims) => {
                if let Some(user) = token_user(&state, claims.user_id()).await {
                    if state.tokens.needs_refresh(&claims) {
                        refresh_for = Some(user.id);
                    }
                    request.extensions_mut().insert(ApiUser(user));
                }
            }
            Err(e) => tracing::debug!("Ignoring invalid access token: {}", e),
        }
    }

    let mut response = next.run(request).await;

    if let Some(user_id) = refresh_for {
        let handler_set_cookie = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.starts_with(ACCESS_TOKEN_COOKIE));
        if !handler_set_cookie {
            match access_token_cookie(&state, user_id) {
                Ok(cookie) => {
                    response.headers_mut().append(header::SET_COOKIE, cookie);
                    tracing::debug!("Refreshed access token of user {}", user_id);
                }
                Err(e) => tracing::warn!("Failed to refresh access token: {}", e.error.message),
            }
        }
    }
    response
}

async fn token_user(state: &AppState, user_id: Option<i64>) -> Option<User> {
    let user_id = user_id?;
    match state.user_service.get_user(user_id).await {
        Ok(user) => user.filter(|u| u.enabled),
        Err(e) => {
            tracing::warn!("Failed to load token user {}: {}", user_id, e);
            None
        }
    }
}

// ============================================================================
// Maintenance gates
// ============================================================================

/// Public API paths that stay reachable during portal maintenance
fn portal_exempt(path: &str) -> bool {
    matches!(path, "/flags" | "/auth" | "/logout") || path.starts_with("/auth/google/")
}

/// Admin paths that stay reachable during admin maintenance
fn admin_exempt(path: &str) -> bool {
    matches!(path, "/auth/login" | "/auth/logout")
}

async fn enabled_message(state: &AppState, flag: FlagName) -> Option<Option<String>> {
    match state.flag_service.get_flag_by_name(flag.as_str()).await {
        Ok(Some(f)) if f.enabled => Some(f.maintenance_message),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Failed to read flag {}: {}", flag.as_str(), e);
            None
        }
    }
}

/// Answer 503 on the public API while the portal is under maintenance
pub async fn portal_maintenance(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let path = path.strip_prefix("/api").unwrap_or(path);

    if !portal_exempt(path) {
        if let Some(message) = enabled_message(&state, FlagName::PortalMaintenanceMode).await {
            return ApiError::service_unavailable(
                message.unwrap_or_else(|| "The portal is under maintenance".to_string()),
            )
            .into_response();
        }
    }
    next.run(request).await
}

/// Answer 503 on admin routes while the panel is under maintenance.
///
/// System administrators keep access to the feature flags so they can
/// switch maintenance off again.
pub async fn admin_maintenance(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let path = path.strip_prefix("/admin").unwrap_or(path).to_string();

    if admin_exempt(&path) {
        return next.run(request).await;
    }
    let Some(message) = enabled_message(&state, FlagName::AdminMaintenanceMode).await else {
        return next.run(request).await;
    };

    if path.starts_with("/feature-flags") {
        if let Some(token) = session_token(request.headers()) {
            if let Ok(Some(user)) = state.user_service.validate_session(&token).await {
                if user.system_admin {
                    return next.run(request).await;
                }
            }
        }
    }

    let message = message.unwrap_or_else(|| "The administration panel is under maintenance".to_string());
    if wants_html(request.headers()) {
        match state.views.render_maintenance(Some(&message)) {
            Ok(page) => return (StatusCode::SERVICE_UNAVAILABLE, Html(page)).into_response(),
            Err(e) => tracing::error!("{:#}", e),
        }
    }
    ApiError::maintenance(message).into_response()
}

/// Render JSON errors of admin routes as HTML pages for browsers
pub async fn admin_html_errors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let html = wants_html(request.headers());
    let response = next.run(request).await;

    let status = response.status();
    if !html || !(status.is_client_error() || status.is_server_error()) {
        return response;
    }
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if !is_json {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, 64 * 1024).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read error body: {}", e);
            return parts.status.into_response();
        }
    };
    let error = serde_json::from_slice::<ApiError>(&bytes).ok();
    let message = error
        .as_ref()
        .map(|e| e.error.message.clone())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Error").to_string());

    let page = match error.as_ref().map(|e| e.error.code.as_str()) {
        Some("maintenance") => state.views.render_maintenance(Some(&message)),
        _ => state.views.render_error(status, &message),
    };
    match page {
        Ok(page) => (status, Html(page)).into_response(),
        Err(e) => {
            tracing::error!("{:#}", e);
            (status, message).into_response()
        }
    }
}
