use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use imgnow_core::{AppError, FileRecord, FileStatus, MediaKind};
use serde::{Deserialize, Serialize};

use crate::error::HttpAppError;
use crate::state::AppState;

/// Optional body of the read and addDownload routes.
#[derive(Debug, Default, Deserialize)]
pub struct PasswordBody {
    pub password: Option<String>,
}

impl PasswordBody {
    /// An empty body means no password; anything else must be valid JSON.
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidInput(format!("Invalid request body: {}", e)))
    }
}

#[derive(Debug, Serialize)]
pub struct PathResponse {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: FileStatus,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub downloads: i64,
    /// Whether this download reached the deletion threshold.
    pub deleted: bool,
}

/// Public metadata of a file. Never carries the content address or the password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoResponse {
    pub identifier: String,
    pub original_name: String,
    pub size: i64,
    pub mime_type: String,
    pub media_kind: MediaKind,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub views: i64,
    pub downloads: i64,
    pub delete_on_view: bool,
    pub view_threshold: Option<i32>,
    pub delete_on_download: bool,
    pub download_threshold: Option<i32>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub password_protected: bool,
}

impl From<FileRecord> for FileInfoResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            password_protected: record.is_password_protected(),
            identifier: record.identifier,
            original_name: record.original_name,
            size: record.size,
            mime_type: record.mime_type,
            media_kind: record.media_kind,
            status: record.status,
            created_at: record.created_at,
            expires_at: record.expires_at,
            views: record.view_count,
            downloads: record.download_count,
            delete_on_view: record.delete_on_view,
            view_threshold: record.view_threshold,
            delete_on_download: record.delete_on_download,
            download_threshold: record.download_threshold,
            last_viewed_at: record.last_viewed_at,
        }
    }
}

/// Resolve a file to the address its content can be fetched from. Counts as a view.
#[tracing::instrument(skip(state, body), fields(operation = "open_file"))]
pub async fn open_file(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let PasswordBody { password } = PasswordBody::parse(&body)?;
    let path = state.files.open(&identifier, password.as_deref()).await?;
    Ok(Json(PathResponse { path }))
}

#[tracing::instrument(skip(state), fields(operation = "file_status"))]
pub async fn file_status(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let status = state.files.status(&identifier).await?;
    Ok(Json(StatusResponse { status }))
}

#[tracing::instrument(skip(state), fields(operation = "file_info"))]
pub async fn file_info(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let record = state.files.info(&identifier).await?;
    Ok(Json(FileInfoResponse::from(record)))
}

#[tracing::instrument(skip(state, body), fields(operation = "add_download"))]
pub async fn add_download(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let PasswordBody { password } = PasswordBody::parse(&body)?;
    let record = state
        .files
        .add_download(&identifier, password.as_deref())
        .await?;

    Ok(Json(DownloadResponse {
        downloads: record.download_count,
        deleted: record.download_threshold_reached(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_body_parsing() {
        assert!(PasswordBody::parse(b"").unwrap().password.is_none());
        assert!(PasswordBody::parse(b"  \n").unwrap().password.is_none());
        assert!(PasswordBody::parse(b"{}").unwrap().password.is_none());
        assert_eq!(
            PasswordBody::parse(br#"{"password":"hunter2"}"#)
                .unwrap()
                .password
                .as_deref(),
            Some("hunter2")
        );
        assert!(matches!(
            PasswordBody::parse(b"password=hunter2"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_info_hides_hash_and_path() {
        let mut record = FileRecord::pending(
            imgnow_core::NewFileRecord {
                identifier: "abc".to_string(),
                original_name: "cat.png".to_string(),
                size: 10,
                mime_type: "image/png".to_string(),
                media_kind: MediaKind::Image,
            },
            Utc::now(),
        );
        record.path = Some("https://cdn.example/media/abc".to_string());
        record.password_hash = Some("$argon2id$secret".to_string());

        let json = serde_json::to_value(FileInfoResponse::from(record)).unwrap();
        assert_eq!(json["passwordProtected"], true);
        assert_eq!(json["originalName"], "cat.png");
        assert_eq!(json["mediaKind"], "image");
        let text = json.to_string();
        assert!(!text.contains("argon2"));
        assert!(!text.contains("cdn.example"));
    }
}
