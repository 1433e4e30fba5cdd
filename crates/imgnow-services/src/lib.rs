//! imgnow service layer
//!
//! Orchestration between the record store, blob storage, media processing and the
//! transcode broker. HTTP handlers stay thin and call into these services.

pub mod access;
pub mod allocator;
pub mod ingestion;
pub mod retention;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod test_support;

pub use access::{AccessGate, FileAccessService, SettingsRequest};
pub use allocator::{IdentifierAllocator, ATTEMPTS_PER_LENGTH};
pub use ingestion::{Accepted, IngestionCoordinator, UploadRequest};
pub use retention::{RetentionEngine, SweepReport};
pub use sweeper::ExpirySweeper;
