use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use imgnow_core::AppError;
use imgnow_services::SettingsRequest;
use serde::Deserialize;

use crate::error::{HttpAppError, ValidatedJson};
use crate::handlers::files::FileInfoResponse;
use crate::state::AppState;

/// Expiry as an absolute RFC 3339 timestamp or as seconds from now.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExpiresIn {
    Seconds(i64),
    Text(String),
}

impl ExpiresIn {
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
        let seconds = match self {
            ExpiresIn::Seconds(seconds) => *seconds,
            ExpiresIn::Text(text) => {
                let text = text.trim();
                if let Ok(at) = DateTime::parse_from_rfc3339(text) {
                    return Ok(at.with_timezone(&Utc));
                }
                text.parse::<i64>().map_err(|_| {
                    AppError::InvalidInput(
                        "expiresIn must be an RFC 3339 timestamp or a number of seconds"
                            .to_string(),
                    )
                })?
            }
        };

        Duration::try_seconds(seconds)
            .and_then(|offset| now.checked_add_signed(offset))
            .ok_or_else(|| AppError::InvalidInput("expiresIn is out of range".to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsBody {
    pub expires_in: Option<ExpiresIn>,
    pub deletes_after_download: Option<bool>,
    pub downloads_for_deletion: Option<i32>,
    pub deletes_after_vizualizations: Option<bool>,
    pub vizualizations_for_deletion: Option<i32>,
    /// New password; an empty string removes protection.
    pub password: Option<String>,
    /// Required when the file is already protected.
    pub current_password: Option<String>,
}

impl SettingsBody {
    fn into_request(self, now: DateTime<Utc>) -> Result<(SettingsRequest, Option<String>), AppError> {
        let expires_at = self
            .expires_in
            .as_ref()
            .map(|expires_in| expires_in.resolve(now))
            .transpose()?;

        Ok((
            SettingsRequest {
                expires_at,
                delete_on_download: self.deletes_after_download,
                download_threshold: self.downloads_for_deletion,
                delete_on_view: self.deletes_after_vizualizations,
                view_threshold: self.vizualizations_for_deletion,
                password: self.password,
            },
            self.current_password,
        ))
    }
}

/// Change expiry, deletion thresholds or password of a file.
#[tracing::instrument(skip(state, body), fields(operation = "update_settings"))]
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
    ValidatedJson(body): ValidatedJson<SettingsBody>,
) -> Result<impl IntoResponse, HttpAppError> {
    let (request, current_password) = body.into_request(Utc::now())?;

    let record = state
        .files
        .update_settings(&identifier, request, current_password.as_deref())
        .await?;

    Ok(Json(FileInfoResponse::from(record)))
}
