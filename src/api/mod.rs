//! API layer - HTTP handlers and routing
//!
//! Two surfaces share one server:
//! - `/api`: the public JSON API of the portal (JWT cookie auth)
//! - `/admin`: the administration JSON API (session cookie auth and
//!   role permissions)
//!
//! Uploaded images are served from `/uploads`.

pub mod admin_sites;
pub mod auth;
pub mod common;
pub mod flags;
pub mod google;
pub mod images;
pub mod me;
pub mod middleware;
pub mod responses;
pub mod reviews;
pub mod sites;
pub mod tags;
pub mod users;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

pub use middleware::{ApiError, AppState};

/// GET /api/make_coffee
async fn make_coffee() -> ApiError {
    ApiError::teapot()
}

async fn not_found() -> ApiError {
    ApiError::not_found("Resource not found")
}

/// Build the public API router (mounted at `/api`)
pub fn build_api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/sites", sites::router())
        .nest("/me", me::router())
        .nest("/auth/google", google::router())
        .nest("/flags", flags::public_router())
        .nest("/tags", tags::public_router())
        .merge(auth::api_router())
        .route("/make_coffee", get(make_coffee))
        .fallback(not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::api_auth,
        ))
        // outermost: maintenance answers before any token work
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::portal_maintenance,
        ))
}

/// Build the admin router (mounted at `/admin`)
pub fn build_admin_router(state: AppState) -> Router<AppState> {
    let max_file_size = state.config.storage.max_file_size;

    let protected_routes = Router::new()
        .merge(auth::admin_protected_router())
        .nest("/users", users::users_router())
        .nest("/roles", users::roles_router())
        .nest(
            "/sites",
            admin_sites::sites_router().merge(images::router(max_file_size)),
        )
        .nest("/categories", admin_sites::categories_router())
        .nest("/reviews", reviews::router())
        .nest("/tags", tags::admin_router())
        .nest("/feature-flags", flags::admin_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    Router::new()
        .merge(auth::admin_public_router())
        .merge(protected_routes)
        .fallback(not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_html_errors,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::admin_maintenance,
        ))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let origin = state
        .config
        .server
        .frontend_origin
        .parse::<HeaderValue>()
        .context("Invalid server.frontend_origin")?;

    // credentials are needed for the cookie based auth of both surfaces
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    let uploads = ServeDir::new(&state.config.storage.path);

    Ok(Router::new()
        .nest("/api", build_api_router(state.clone()))
        .nest("/admin", build_admin_router(state.clone()))
        .nest_service("/uploads", uploads)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
