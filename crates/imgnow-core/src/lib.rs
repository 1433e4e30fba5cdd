//! imgnow core library
//!
//! Domain models, error types, configuration and identifier generation shared
//! by every imgnow crate.

pub mod config;
pub mod error;
pub mod identifier;
pub mod models;
pub mod storage_types;
#[cfg(feature = "telemetry")]
pub mod telemetry;

// Re-export commonly used types
pub use config::{BrokerBackend, Config, RepositoryBackend, TranscodeSettings, WorkerConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use identifier::generate_identifier;
pub use models::{FileRecord, FileStatus, MediaKind, NewFileRecord, RetentionRule, SettingsUpdate};
pub use storage_types::StorageBackend;
