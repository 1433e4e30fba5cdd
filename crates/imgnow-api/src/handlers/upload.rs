use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use imgnow_core::AppError;
use imgnow_services::UploadRequest;
use serde::{Deserialize, Serialize};

use crate::constants::{UPLOAD_FIELD, UPLOAD_SEGMENT};
use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Custom identifier requested by the client.
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub status: &'static str,
    pub identifier: String,
    pub status_url: String,
}

/// Upload a file
///
/// Responds 202 as soon as the `Pending` record exists; compression or transcoding
/// continues in the background and its outcome is visible through the status route.
#[tracing::instrument(skip(state, multipart), fields(requested_id = ?query.id, operation = "upload"))]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    // The upload route itself shadows this identifier.
    if query.id.as_deref() == Some(UPLOAD_SEGMENT) {
        return Err(AppError::InvalidInput(format!(
            "Identifier '{}' is reserved",
            UPLOAD_SEGMENT
        ))
        .into());
    }

    let (data, original_name, content_type) = extract_multipart_file(multipart).await?;

    if data.len() > state.config.max_upload_size_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "File size exceeds maximum allowed size of {} MB",
            state.config.max_upload_size_bytes / 1024 / 1024
        ))
        .into());
    }

    let accepted = state
        .ingestion
        .accept(UploadRequest {
            original_name,
            content_type,
            data,
            requested_identifier: query.id,
        })
        .await?;

    let response = UploadResponse {
        status: "pending",
        status_url: state.status_url(&accepted.identifier),
        identifier: accepted.identifier,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Extract file data, filename and content type from the multipart form.
/// Exactly one field named `file` is accepted.
async fn extract_multipart_file(
    mut multipart: Multipart,
) -> Result<(Vec<u8>, String, String), AppError> {
    let mut file: Option<(Vec<u8>, Option<String>, Option<String>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        if file.is_some() {
            return Err(AppError::InvalidInput(
                "Multiple file fields are not allowed; send exactly one field named 'file'"
                    .to_string(),
            ));
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(normalize_mime_type);
        let data = field.bytes().await.map_err(multipart_error)?;
        file = Some((data.to_vec(), filename, content_type));
    }

    let (data, filename, content_type) =
        file.ok_or_else(|| AppError::InvalidInput("No file provided".to_string()))?;

    Ok((
        data,
        filename.unwrap_or_else(|| "unknown".to_string()),
        content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
    ))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::InvalidInput(format!("Failed to read multipart: {}", e.body_text()))
    }
}

/// Strip parameters ("image/jpeg; charset=utf-8" -> "image/jpeg").
fn normalize_mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mime_type() {
        assert_eq!(normalize_mime_type("image/JPEG; q=1"), "image/jpeg");
        assert_eq!(normalize_mime_type("video/mp4"), "video/mp4");
    }
}
