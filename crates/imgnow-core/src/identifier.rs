//! Short public identifiers.
//!
//! Generated identifiers draw from `[a-zA-Z0-9]`. Caller-supplied identifiers may also
//! use `-` and `_` so they stay URL-safe without escaping.

use crate::AppError;
use rand::Rng;

pub const IDENTIFIER_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of generated identifiers.
pub const DEFAULT_IDENTIFIER_LEN: usize = 5;

/// Length used once collisions at the default length keep repeating.
pub const WIDENED_IDENTIFIER_LEN: usize = 8;

/// Length of broker correlation ids.
pub const REQUEST_ID_LEN: usize = 16;

pub const MAX_REQUESTED_IDENTIFIER_LEN: usize = 64;

/// Generate a random identifier of `len` characters from [`IDENTIFIER_ALPHABET`].
pub fn generate_identifier(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| IDENTIFIER_ALPHABET[rng.random_range(0..IDENTIFIER_ALPHABET.len())] as char)
        .collect()
}

/// Check a caller-supplied identifier before it is used verbatim as a record key and
/// a storage key.
pub fn validate_requested_identifier(identifier: &str) -> Result<(), AppError> {
    if identifier.is_empty() || identifier.len() > MAX_REQUESTED_IDENTIFIER_LEN {
        return Err(AppError::InvalidInput(format!(
            "Identifier must be between 1 and {} characters",
            MAX_REQUESTED_IDENTIFIER_LEN
        )));
    }

    if !identifier
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(AppError::InvalidInput(
            "Identifier may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }

    Ok(())
}
