//! Record store setup and initialization

use anyhow::{Context, Result};
use imgnow_core::{Config, RepositoryBackend};
use imgnow_db::{FileRepository, MemoryFileRepository, PgFileRepository};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Build the record store selected by `REPOSITORY_BACKEND`.
pub async fn setup_repository(config: &Config) -> Result<Arc<dyn FileRepository>> {
    match config.repository_backend {
        RepositoryBackend::Postgres => {
            let pool = setup_database(config).await?;
            Ok(Arc::new(PgFileRepository::new(pool)))
        }
        RepositoryBackend::Memory => {
            tracing::warn!("Using in-memory repository, records are lost on restart");
            Ok(Arc::new(MemoryFileRepository::new()))
        }
    }
}

/// Setup database connection pool and run migrations
pub async fn setup_database(config: &Config) -> Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set for the postgres repository")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connected successfully"
    );

    // Workspace migrations/ relative to this crate's root
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
