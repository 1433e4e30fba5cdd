use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imgnow_core::{AppError, FileRecord, FileStatus, NewFileRecord, SettingsUpdate};
use tokio::sync::RwLock;

use crate::FileRepository;

/// In-process record store. Every operation holds the write lock for its whole
/// read-modify-write, which gives the same atomicity as the single-statement SQL.
#[derive(Default)]
pub struct MemoryFileRepository {
    records: RwLock<HashMap<String, FileRecord>>,
}

impl MemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl FileRepository for MemoryFileRepository {
    async fn identifier_exists(&self, identifier: &str) -> Result<bool, AppError> {
        Ok(self.records.read().await.contains_key(identifier))
    }

    async fn insert(&self, new: NewFileRecord) -> Result<FileRecord, AppError> {
        let mut records = self.records.write().await;
        if records.contains_key(&new.identifier) {
            return Err(AppError::Conflict(format!(
                "Identifier '{}' is already taken",
                new.identifier
            )));
        }

        let record = FileRecord::pending(new, Utc::now());
        records.insert(record.identifier.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, identifier: &str) -> Result<Option<FileRecord>, AppError> {
        Ok(self.records.read().await.get(identifier).cloned())
    }

    async fn mark_active(&self, identifier: &str, path: &str) -> Result<bool, AppError> {
        let mut records = self.records.write().await;
        match records.get_mut(identifier) {
            Some(r) if r.status == FileStatus::Pending && !r.is_deleted() => {
                r.status = FileStatus::Active;
                r.path = Some(path.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_error(&self, identifier: &str) -> Result<bool, AppError> {
        let mut records = self.records.write().await;
        match records.get_mut(identifier) {
            Some(r) if r.status == FileStatus::Pending => {
                r.status = FileStatus::Error;
                r.path = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_views(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, AppError> {
        let mut records = self.records.write().await;
        Ok(records
            .get_mut(identifier)
            .filter(|r| !r.is_deleted())
            .map(|r| {
                r.view_count += 1;
                r.last_viewed_at = Some(now);
                r.clone()
            }))
    }

    async fn increment_downloads(&self, identifier: &str) -> Result<Option<FileRecord>, AppError> {
        let mut records = self.records.write().await;
        Ok(records
            .get_mut(identifier)
            .filter(|r| !r.is_deleted())
            .map(|r| {
                r.download_count += 1;
                r.clone()
            }))
    }

    async fn update_settings(
        &self,
        identifier: &str,
        update: &SettingsUpdate,
    ) -> Result<Option<FileRecord>, AppError> {
        let mut records = self.records.write().await;
        let Some(r) = records.get_mut(identifier).filter(|r| !r.is_deleted()) else {
            return Ok(None);
        };

        if let Some(expires_at) = update.expires_at {
            r.expires_at = Some(expires_at);
        }
        if let Some(rule) = update.download_rule {
            r.delete_on_download = rule.enabled;
            r.download_threshold = rule.threshold;
        }
        if let Some(rule) = update.view_rule {
            r.delete_on_view = rule.enabled;
            r.view_threshold = rule.threshold;
        }
        if let Some(ref password_hash) = update.password_hash {
            r.password_hash = password_hash.clone();
        }

        Ok(Some(r.clone()))
    }

    async fn mark_deleted(&self, identifier: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut records = self.records.write().await;
        match records.get_mut(identifier) {
            Some(r) if !r.is_deleted() => {
                r.deleted_at = Some(now);
                r.status = FileStatus::Error;
                r.path = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expired(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FileRecord>, AppError> {
        let records = self.records.read().await;
        let mut expired: Vec<FileRecord> = records
            .values()
            .filter(|r| !r.is_deleted() && r.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.expires_at);
        expired.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(expired)
    }
}
