//! Media upload handler

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use baanboard_common::{
    auth::AuthContext,
    errors::{AppError, Result},
};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Serialize)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteImageRequest {
    pub url: String,
}

/// One uploaded file
struct FilePart {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::validation("file", e.body_text())
}

/// The `file` part of a multipart form
async fn file_part(multipart: &mut Multipart) -> Result<FilePart> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        return Ok(FilePart {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Err(AppError::validation("file", "Multipart form has no file part"))
}

/// Upload one listing photo from the `file` part of a multipart form
pub async fn upload_listing_image(
    State(state): State<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let part = file_part(&mut multipart).await?;
    let size = part.bytes.len();

    let url = state
        .media
        .upload_listing_image(&part.file_name, &part.content_type, part.bytes)
        .await?;

    tracing::info!(agent_id = %auth.agent_id, size, "Listing image stored");
    Ok((StatusCode::CREATED, Json(UploadResponse { url })))
}

/// Remove a listing photo by its public URL
pub async fn delete_listing_image(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<DeleteImageRequest>,
) -> Result<StatusCode> {
    state.media.delete_listing_image(&request.url).await?;

    tracing::info!(agent_id = %auth.agent_id, "Listing image removed");
    Ok(StatusCode::NO_CONTENT)
}

/// Upload the signed-in agent's avatar
pub async fn upload_avatar(
    State(state): State<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let part = file_part(&mut multipart).await?;

    let url = state
        .media
        .upload_avatar(auth.agent_id, &part.file_name, &part.content_type, part.bytes)
        .await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { url })))
}
