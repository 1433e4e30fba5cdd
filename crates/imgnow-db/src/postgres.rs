use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imgnow_core::{AppError, FileRecord, NewFileRecord, SettingsUpdate};
use sqlx::{PgPool, Postgres};

use crate::FileRepository;

/// PostgreSQL-backed record store over the `files` table.
#[derive(Clone)]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn identifier_exists(&self, identifier: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<Postgres, bool>(
            "SELECT EXISTS(SELECT 1 FROM files WHERE identifier = $1)",
        )
        .bind(identifier)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[tracing::instrument(skip(self, new), fields(db.table = "files", db.operation = "insert", identifier = %new.identifier))]
    async fn insert(&self, new: NewFileRecord) -> Result<FileRecord, AppError> {
        let result = sqlx::query_as::<Postgres, FileRecord>(
            r#"
            INSERT INTO files (identifier, original_name, size, mime_type, media_kind, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING *
            "#,
        )
        .bind(&new.identifier)
        .bind(&new.original_name)
        .bind(new.size)
        .bind(&new.mime_type)
        .bind(new.media_kind)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(record),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict(format!("Identifier '{}' is already taken", new.identifier)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn get(&self, identifier: &str) -> Result<Option<FileRecord>, AppError> {
        let record =
            sqlx::query_as::<Postgres, FileRecord>("SELECT * FROM files WHERE identifier = $1")
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update"))]
    async fn mark_active(&self, identifier: &str, path: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET status = 'active', path = $2
            WHERE identifier = $1 AND status = 'pending' AND deleted_at IS NULL
            "#,
        )
        .bind(identifier)
        .bind(path)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update"))]
    async fn mark_error(&self, identifier: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE files SET status = 'error', path = NULL WHERE identifier = $1 AND status = 'pending'",
        )
        .bind(identifier)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update"))]
    async fn increment_views(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, FileRecord>(
            r#"
            UPDATE files
            SET view_count = view_count + 1, last_viewed_at = $2
            WHERE identifier = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(identifier)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update"))]
    async fn increment_downloads(&self, identifier: &str) -> Result<Option<FileRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, FileRecord>(
            r#"
            UPDATE files
            SET download_count = download_count + 1
            WHERE identifier = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self, update), fields(db.table = "files", db.operation = "update"))]
    async fn update_settings(
        &self,
        identifier: &str,
        update: &SettingsUpdate,
    ) -> Result<Option<FileRecord>, AppError> {
        let download = update.download_rule;
        let view = update.view_rule;
        let password = update.password_hash.as_ref();

        let record = sqlx::query_as::<Postgres, FileRecord>(
            r#"
            UPDATE files SET
                expires_at = COALESCE($2, expires_at),
                delete_on_download = CASE WHEN $3 THEN $4 ELSE delete_on_download END,
                download_threshold = CASE WHEN $3 THEN $5 ELSE download_threshold END,
                delete_on_view = CASE WHEN $6 THEN $7 ELSE delete_on_view END,
                view_threshold = CASE WHEN $6 THEN $8 ELSE view_threshold END,
                password_hash = CASE WHEN $9 THEN $10 ELSE password_hash END
            WHERE identifier = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(identifier)
        .bind(update.expires_at)
        .bind(download.is_some())
        .bind(download.is_some_and(|r| r.enabled))
        .bind(download.and_then(|r| r.threshold))
        .bind(view.is_some())
        .bind(view.is_some_and(|r| r.enabled))
        .bind(view.and_then(|r| r.threshold))
        .bind(password.is_some())
        .bind(password.and_then(|p| p.clone()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update"))]
    async fn mark_deleted(&self, identifier: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET deleted_at = $2, status = 'error', path = NULL
            WHERE identifier = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(identifier)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn expired(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FileRecord>, AppError> {
        let records = sqlx::query_as::<Postgres, FileRecord>(
            r#"
            SELECT * FROM files
            WHERE deleted_at IS NULL AND expires_at IS NOT NULL AND expires_at <= $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
