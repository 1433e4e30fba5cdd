use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Upload lifecycle state.
///
/// `Pending` lasts from record creation until the background ingestion task
/// finishes; `Active` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "file_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Active,
    Error,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Active => "active",
            FileStatus::Error => "error",
        }
    }
}

/// Media kind decided once at ingestion and carried on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "media_kind", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

/// Metadata captured at upload time, before any processing.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub identifier: String,
    pub original_name: String,
    pub size: i64,
    pub mime_type: String,
    pub media_kind: MediaKind,
}

/// Persisted metadata row for one uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct FileRecord {
    pub identifier: String,
    pub path: Option<String>,
    pub original_name: String,
    pub size: i64,
    pub mime_type: String,
    pub media_kind: MediaKind,
    pub created_at: DateTime<Utc>,
    pub status: FileStatus,
    pub view_count: i64,
    pub download_count: i64,
    pub delete_on_download: bool,
    pub download_threshold: Option<i32>,
    pub delete_on_view: bool,
    pub view_threshold: Option<i32>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub password_hash: Option<String>,
}

impl FileRecord {
    /// Build the initial `Pending` row for a freshly accepted upload.
    pub fn pending(new: NewFileRecord, now: DateTime<Utc>) -> Self {
        Self {
            identifier: new.identifier,
            path: None,
            original_name: new.original_name,
            size: new.size,
            mime_type: new.mime_type,
            media_kind: new.media_kind,
            created_at: now,
            status: FileStatus::Pending,
            view_count: 0,
            download_count: 0,
            delete_on_download: false,
            download_threshold: None,
            delete_on_view: false,
            view_threshold: None,
            last_viewed_at: None,
            expires_at: None,
            deleted_at: None,
            password_hash: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_password_protected(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Whether the view counter has reached an enabled view threshold.
    pub fn view_threshold_reached(&self) -> bool {
        self.delete_on_view
            && self
                .view_threshold
                .is_some_and(|threshold| self.view_count >= i64::from(threshold))
    }

    /// Whether the download counter has reached an enabled download threshold.
    pub fn download_threshold_reached(&self) -> bool {
        self.delete_on_download
            && self
                .download_threshold
                .is_some_and(|threshold| self.download_count >= i64::from(threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> FileRecord {
        FileRecord::pending(
            NewFileRecord {
                identifier: "abcde".to_string(),
                original_name: "cat.png".to_string(),
                size: 42,
                mime_type: "image/png".to_string(),
                media_kind: MediaKind::Image,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_pending_record_defaults() {
        let r = record();
        assert_eq!(r.status, FileStatus::Pending);
        assert!(r.path.is_none());
        assert!(!r.is_deleted());
        assert!(!r.is_password_protected());
        assert_eq!(r.view_count, 0);
        assert_eq!(r.download_count, 0);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut r = record();
        assert!(!r.is_expired(now));
        r.expires_at = Some(now - Duration::seconds(1));
        assert!(r.is_expired(now));
        r.expires_at = Some(now + Duration::hours(1));
        assert!(!r.is_expired(now));
    }

    #[test]
    fn test_download_threshold() {
        let mut r = record();
        r.download_count = 3;
        assert!(!r.download_threshold_reached());

        r.delete_on_download = true;
        r.download_threshold = Some(3);
        assert!(r.download_threshold_reached());

        r.download_count = 2;
        assert!(!r.download_threshold_reached());
    }

    #[test]
    fn test_view_threshold_requires_threshold_value() {
        let mut r = record();
        r.delete_on_view = true;
        r.view_count = 100;
        assert!(!r.view_threshold_reached());
        r.view_threshold = Some(1);
        assert!(r.view_threshold_reached());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&FileStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
        assert_eq!(FileStatus::Active.as_str(), "active");
    }
}
