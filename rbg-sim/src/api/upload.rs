//! Image upload endpoint

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use rbg_common::api::types::{ImageInfo, UploadResponse};
use rbg_common::api::{UPLOAD_FIELD, UPLOAD_PATH};
use std::io::Cursor;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /api/upload-image
///
/// Multipart body with the image in field `file`. Issues a fresh session id
/// for every upload.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
        upload = Some((filename, content_type, bytes));
        break;
    }

    let Some((filename, content_type, bytes)) = upload else {
        return Err(ApiError::BadRequest(format!("Missing multipart field '{UPLOAD_FIELD}'")));
    };
    if !content_type.starts_with("image/") {
        return Err(ApiError::BadRequest("File must be an image".to_string()));
    }
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Empty upload".to_string()));
    }

    let image_info = inspect_image(&filename, &bytes);
    let session_id = Uuid::new_v4().to_string();
    info!(
        session_id = %session_id,
        filename = %filename,
        dimensions = %image_info.dimensions,
        "Image uploaded"
    );
    state
        .sessions
        .write()
        .await
        .insert(session_id.clone(), image_info.clone());

    Ok(Json(UploadResponse {
        session_id,
        filename: Some(filename),
        image_info,
        status: Some("uploaded".to_string()),
    }))
}

/// Dimensions and format of an encoded image; `"unknown"` when undecodable
pub fn inspect_image(filename: &str, bytes: &[u8]) -> ImageInfo {
    let format = image::guess_format(bytes).ok();
    let dimensions = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok())
        .map(|(width, height)| format!("{width}x{height}"))
        .unwrap_or_else(|| "unknown".to_string());

    ImageInfo {
        filename: filename.to_string(),
        dimensions,
        size: Some(bytes.len() as u64),
        format: Some(
            format
                .map(|f| format!("{f:?}").to_uppercase())
                .unwrap_or_else(|| "unknown".to_string()),
        ),
    }
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route(UPLOAD_PATH, post(upload_image))
}
