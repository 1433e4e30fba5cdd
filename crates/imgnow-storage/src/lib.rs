//! imgnow storage library
//!
//! Blob storage abstraction with S3-compatible (S3, R2, MinIO) and local filesystem
//! backends. One client is built at startup and shared by every component.
//!
//! # Storage key format
//!
//! Every blob lives under `media/{identifier}`. Keys must not contain `..` or a leading
//! `/`. Key generation is centralized in the `keys` module.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use imgnow_core::StorageBackend;
pub use keys::storage_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
