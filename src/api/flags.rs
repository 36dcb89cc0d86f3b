//! Feature flag endpoints
//!
//! - GET /api/flags - portal-facing flag values
//! - GET /admin/feature-flags
//! - PUT /admin/feature-flags/{id} (system administrators only)

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::ValidJson;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{FlagResponse, PortalFlags};
use crate::models::FlagName;

#[derive(Debug, Deserialize)]
pub struct UpdateFlagRequest {
    pub enabled: bool,
    pub maintenance_message: Option<String>,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(portal_flags))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_flags))
        .route("/{id}", put(update_flag))
}

/// GET /api/flags
async fn portal_flags(State(state): State<AppState>) -> Result<Json<PortalFlags>, ApiError> {
    let flags = &state.flag_service;
    Ok(Json(PortalFlags {
        portal_maintenance: flags.is_enabled(FlagName::PortalMaintenanceMode).await?,
        portal_maintenance_message: flags
            .maintenance_message(FlagName::PortalMaintenanceMode)
            .await?,
        reviews_enabled: flags.is_enabled(FlagName::ReviewsEnabled).await?,
    }))
}

fn require_system_admin(user: &crate::models::User) -> Result<(), ApiError> {
    if user.system_admin {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Only system administrators can manage feature flags",
        ))
    }
}

/// GET /admin/feature-flags
async fn list_flags(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<FlagResponse>>, ApiError> {
    require_system_admin(&user)?;
    let flags = state.flag_service.list_flags().await?;
    Ok(Json(flags.into_iter().map(FlagResponse::from).collect()))
}

/// PUT /admin/feature-flags/{id}
async fn update_flag(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<UpdateFlagRequest>,
) -> Result<Json<FlagResponse>, ApiError> {
    let flag = state
        .flag_service
        .update_flag(id, body.enabled, body.maintenance_message.as_deref(), &user)
        .await?;
    Ok(Json(flag.into()))
}
