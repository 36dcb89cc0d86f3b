//! Site image endpoints (all require edit_site)
//!
//! - GET /admin/sites/{id}/images
//! - POST /admin/sites/{id}/images - multipart upload
//! - POST /admin/sites/{id}/images/{image_id}/cover
//! - DELETE /admin/sites/{id}/images/{image_id}
//! - POST /admin/sites/{id}/images/reorder

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::ValidJson;
use crate::api::middleware::{require_permission, ApiError, AppState, AuthenticatedUser};
use crate::api::responses::ImageResponse;
use crate::models::MAX_IMAGES_PER_SITE;
use crate::services::ImageUpload;
use crate::storage::UploadedFile;

const PERMISSION: &str = "edit_site";

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub image_ids: Vec<i64>,
}

/// Routes nested under `/admin/sites`; `max_file_size` bounds the
/// multipart body to a full batch of images
pub fn router(max_file_size: u64) -> Router<AppState> {
    let body_limit = (max_file_size as usize)
        .saturating_mul(MAX_IMAGES_PER_SITE)
        .saturating_add(1024 * 1024);

    Router::new()
        .route(
            "/{id}/images",
            get(list_images)
                .post(upload_images)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/{id}/images/reorder", post(reorder_images))
        .route("/{id}/images/{image_id}/cover", post(set_cover))
        .route("/{id}/images/{image_id}", delete(delete_image))
}

/// GET /admin/sites/{id}/images
async fn list_images(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ImageResponse>>, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    let images = state.image_service.active_images(id).await?;
    Ok(Json(images.into_iter().map(ImageResponse::from).collect()))
}

/// POST /admin/sites/{id}/images
///
/// Accepts file fields named `images` with optional `titles` and
/// `descriptions` text fields matched by position.
async fn upload_images(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    let mut files = Vec::new();
    let mut titles = Vec::new();
    let mut descriptions = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "images" | "images[]" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {}", e)))?;
                // browsers send an empty part when no file was picked
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }
                files.push(UploadedFile {
                    file_name,
                    content_type,
                    data: data.to_vec(),
                });
            }
            "titles" | "titles[]" => titles.push(read_text(field).await?),
            "descriptions" | "descriptions[]" => descriptions.push(read_text(field).await?),
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("No images were uploaded"));
    }

    let uploads = files
        .into_iter()
        .enumerate()
        .map(|(i, file)| ImageUpload {
            file,
            title: titles.get(i).cloned(),
            description: descriptions.get(i).cloned(),
        })
        .collect();
    let images = state.image_service.upload_images(id, uploads).await?;
    tracing::info!("User {} uploaded {} image(s) to site {}", user.id, images.len(), id);

    Ok((
        StatusCode::CREATED,
        Json(images.into_iter().map(ImageResponse::from).collect::<Vec<_>>()),
    ))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read form field: {}", e)))
}

/// POST /admin/sites/{id}/images/{image_id}/cover
async fn set_cover(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, image_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    state.image_service.set_cover(id, image_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /admin/sites/{id}/images/{image_id}
async fn delete_image(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, image_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    state.image_service.delete_image(id, image_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/sites/{id}/images/reorder
async fn reorder_images(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<ReorderRequest>,
) -> Result<StatusCode, ApiError> {
    require_permission(&state, &user, PERMISSION).await?;

    state.image_service.reorder_images(id, &body.image_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}
