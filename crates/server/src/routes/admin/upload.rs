//! Product image upload.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use serde_json::json;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::services::uploads::{MAX_UPLOAD_BYTES, UploadError};
use crate::state::AppState;

/// Store the multipart field `file` and return its public URL.
#[instrument(skip(state, _admin, multipart))]
pub async fn upload(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| multipart_error(&e))?;

        let url = state
            .uploads()
            .save_product_image(file_name.as_deref(), content_type.as_deref(), &data)
            .await?;
        return Ok((StatusCode::OK, Json(json!({ "url": url }))));
    }

    Err(UploadError::MissingFile.into())
}

fn multipart_error(err: &axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge(format!(
            "File exceeds the {} MiB limit",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        ));
    }
    AppError::BadRequest(err.body_text())
}
