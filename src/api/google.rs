//! Google sign-in for the portal
//!
//! - GET /api/auth/google/login?next=/path - redirect to Google's consent page
//! - GET /api/auth/google/callback - finish the flow and set the JWT cookie

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect},
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::api::middleware::{
    access_token_cookie, cookie_value, set_cookie, ApiError, AppState, OAUTH_STATE_COOKIE,
};

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(google_login))
        .route("/callback", get(google_callback))
}

/// Keep only local paths so the callback cannot redirect off-site
fn safe_next(next: Option<&str>) -> String {
    let next = next
        .map(|n| urlencoding::decode(n).map(|d| d.into_owned()).unwrap_or_else(|_| n.to_string()))
        .unwrap_or_default();
    if next.starts_with('/') && !next.starts_with("//") && !next.contains('\\') {
        next
    } else {
        "/".to_string()
    }
}

/// GET /api/auth/google/login
async fn google_login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let next = safe_next(query.next.as_deref());
    let (oauth_state, cookie) = state
        .tokens
        .create_oauth_state(&next)
        .map_err(ApiError::internal_error)?;
    let url = state.google.authorization_url(&oauth_state)?;

    let cookie = set_cookie(
        OAUTH_STATE_COOKIE,
        &cookie,
        crate::services::jwt::OAUTH_STATE_MINUTES * 60,
        state.config.auth.cookie_secure,
    )?;
    tracing::debug!("Redirecting to Google sign-in (next: {})", next);
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&url)))
}

/// GET /api/auth/google/callback
async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing authorization code"))?;

    let expected = cookie_value(&headers, OAUTH_STATE_COOKIE)
        .and_then(|cookie| state.tokens.verify_oauth_state(&cookie).ok())
        .filter(|expected| query.state.as_deref() == Some(expected.state.as_str()))
        .ok_or_else(|| ApiError::new("invalid_state", "Invalid OAuth state"))?;

    let profile = state.google.exchange_code(&code).await?;
    let user = state
        .user_service
        .upsert_user_from_google(&profile.email, &profile.name, profile.picture.as_deref())
        .await?;
    if !user.enabled {
        return Err(ApiError::forbidden("This account is disabled"));
    }

    let token_cookie = access_token_cookie(&state, user.id)?;
    let clear_state = set_cookie(OAUTH_STATE_COOKIE, "", 0, state.config.auth.cookie_secure)?;
    let target = format!(
        "{}/auth/callback?next={}",
        state.config.server.frontend_origin.trim_end_matches('/'),
        urlencoding::encode(&expected.next)
    );
    tracing::info!("User {} signed in with Google", user.id);

    Ok((
        [(header::SET_COOKIE, token_cookie), (header::SET_COOKIE, clear_state)],
        Redirect::to(&target),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/sitios/3")), "/sitios/3");
        assert_eq!(safe_next(Some("%2Ffavoritos")), "/favoritos");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(None), "/");
    }
}
