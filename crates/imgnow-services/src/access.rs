//! Read access, password gate and per-file settings.

use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use imgnow_core::{AppError, FileRecord, FileStatus, RetentionRule, SettingsUpdate};
use imgnow_db::FileRepository;
use imgnow_storage::{storage_key, Storage};
use rand_core::OsRng;

use crate::retention::RetentionEngine;

/// Optional per-file password, stored as an argon2 PHC string.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGate;

impl AccessGate {
    pub fn hash_password(password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    }

    /// Constant-time comparison happens inside the argon2 verifier.
    pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Allow access to `record` when it is public or `supplied` matches its password.
    pub fn check(record: &FileRecord, supplied: Option<&str>) -> Result<(), AppError> {
        let Some(hash) = record.password_hash.as_deref() else {
            return Ok(());
        };

        match supplied.filter(|p| !p.is_empty()) {
            None => Err(AppError::PasswordRequired(
                "This file is password protected".to_string(),
            )),
            Some(password) if Self::verify_password(password, hash)? => Ok(()),
            Some(_) => {
                tracing::info!(identifier = %record.identifier, "Wrong password supplied");
                Err(AppError::Unauthorized("Incorrect password".to_string()))
            }
        }
    }
}

/// Settings change requested by a client. Absent fields are left as they are.
#[derive(Debug, Clone, Default)]
pub struct SettingsRequest {
    pub expires_at: Option<DateTime<Utc>>,
    pub delete_on_download: Option<bool>,
    pub download_threshold: Option<i32>,
    pub delete_on_view: Option<bool>,
    pub view_threshold: Option<i32>,
    /// New password. An empty string removes protection.
    pub password: Option<String>,
}

impl SettingsRequest {
    /// Resolve against the current record into a validated repository update.
    fn resolve(self, current: &FileRecord, now: DateTime<Utc>) -> Result<SettingsUpdate, AppError> {
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(AppError::InvalidInput(
                    "expiresIn must be in the future".to_string(),
                ));
            }
        }

        let download_rule = merge_rule(
            self.delete_on_download,
            self.download_threshold,
            current.delete_on_download,
            current.download_threshold,
        );
        if let Some(rule) = download_rule {
            rule.validate("downloadsForDeletion")?;
        }

        let view_rule = merge_rule(
            self.delete_on_view,
            self.view_threshold,
            current.delete_on_view,
            current.view_threshold,
        );
        if let Some(rule) = view_rule {
            rule.validate("vizualizationsForDeletion")?;
        }

        let password_hash = match self.password {
            None => None,
            Some(p) if p.is_empty() => Some(None),
            Some(p) => Some(Some(AccessGate::hash_password(&p)?)),
        };

        Ok(SettingsUpdate {
            expires_at: self.expires_at,
            download_rule,
            view_rule,
            password_hash,
        })
    }
}

fn merge_rule(
    enabled: Option<bool>,
    threshold: Option<i32>,
    current_enabled: bool,
    current_threshold: Option<i32>,
) -> Option<RetentionRule> {
    if enabled.is_none() && threshold.is_none() {
        return None;
    }
    Some(RetentionRule {
        enabled: enabled.unwrap_or(current_enabled),
        threshold: threshold.or(current_threshold),
    })
}

/// Everything a client can do with an existing identifier.
#[derive(Clone)]
pub struct FileAccessService {
    repository: Arc<dyn FileRepository>,
    storage: Arc<dyn Storage>,
    retention: RetentionEngine,
    presign_ttl: Duration,
}

impl FileAccessService {
    pub fn new(
        repository: Arc<dyn FileRepository>,
        storage: Arc<dyn Storage>,
        retention: RetentionEngine,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            storage,
            retention,
            presign_ttl,
        }
    }

    /// The record, unless it is missing, deleted or just expired.
    async fn live_record(&self, identifier: &str) -> Result<FileRecord, AppError> {
        let not_found = || AppError::NotFound(format!("File '{}' not found", identifier));

        let record = self
            .repository
            .get(identifier)
            .await?
            .ok_or_else(not_found)?;
        if record.is_deleted() || self.retention.expire_if_due(&record).await? {
            return Err(not_found());
        }
        Ok(record)
    }

    /// Pending and failed uploads have nothing to serve yet.
    fn ensure_active(record: &FileRecord) -> Result<(), AppError> {
        match record.status {
            FileStatus::Active => Ok(()),
            FileStatus::Pending => Err(AppError::TooEarly(format!(
                "File '{}' is still processing",
                record.identifier
            ))),
            FileStatus::Error => Err(AppError::Unprocessable(format!(
                "File '{}' failed to process",
                record.identifier
            ))),
        }
    }

    /// Open a file for viewing: checks the gate, counts the view and returns the
    /// address the blob can be fetched from.
    #[tracing::instrument(skip(self, password))]
    pub async fn open(&self, identifier: &str, password: Option<&str>) -> Result<String, AppError> {
        let record = self.live_record(identifier).await?;
        Self::ensure_active(&record)?;
        AccessGate::check(&record, password)?;

        let viewed = self
            .retention
            .record_view(identifier)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File '{}' not found", identifier)))?;

        match viewed.path.filter(|p| !p.is_empty()) {
            Some(path) => Ok(path),
            None => {
                tracing::warn!("Active file has no stored path, falling back to a presigned URL");
                Ok(self
                    .storage
                    .presigned_url(&storage_key(identifier), self.presign_ttl)
                    .await?)
            }
        }
    }

    pub async fn status(&self, identifier: &str) -> Result<FileStatus, AppError> {
        Ok(self.live_record(identifier).await?.status)
    }

    /// Metadata projection source. Never gated: it exposes no content address.
    pub async fn info(&self, identifier: &str) -> Result<FileRecord, AppError> {
        self.live_record(identifier).await
    }

    /// Count a download and apply the download rule.
    #[tracing::instrument(skip(self, password))]
    pub async fn add_download(
        &self,
        identifier: &str,
        password: Option<&str>,
    ) -> Result<FileRecord, AppError> {
        let record = self.live_record(identifier).await?;
        Self::ensure_active(&record)?;
        AccessGate::check(&record, password)?;

        self.retention
            .record_download(identifier)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File '{}' not found", identifier)))
    }

    /// Change expiry, deletion rules or password. A protected file requires its
    /// current password.
    #[tracing::instrument(skip(self, request, current_password))]
    pub async fn update_settings(
        &self,
        identifier: &str,
        request: SettingsRequest,
        current_password: Option<&str>,
    ) -> Result<FileRecord, AppError> {
        let record = self.live_record(identifier).await?;
        AccessGate::check(&record, current_password)?;

        let update = request.resolve(&record, Utc::now())?;
        if update.is_empty() {
            return Ok(record);
        }

        let updated = self
            .repository
            .update_settings(identifier, &update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File '{}' not found", identifier)))?;

        tracing::info!(
            expires_at = ?updated.expires_at,
            delete_on_view = updated.delete_on_view,
            view_threshold = ?updated.view_threshold,
            delete_on_download = updated.delete_on_download,
            download_threshold = ?updated.download_threshold,
            password_protected = updated.is_password_protected(),
            "File settings updated"
        );
        Ok(updated)
    }
}
