//! Shared key generation for storage backends.

/// Storage key for a file identifier: `media/{identifier}`.
pub fn storage_key(identifier: &str) -> String {
    format!("media/{}", identifier)
}
