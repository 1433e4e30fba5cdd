//! Error types module
//!
//! All service-level failures are unified under [`AppError`]. Each variant describes
//! its own HTTP presentation through [`ErrorMetadata`], so the HTTP layer never has to
//! match on variants itself.
//!
//! The `Database` variant carries a `sqlx::Error` when the `sqlx` feature is enabled and
//! a plain message otherwise.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected errors such as validation failures or polling a pending upload
    Debug,
    /// Recoverable issues
    Warn,
    /// Unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "NOT_FOUND")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from clients
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too early: {0}")]
    TooEarly(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Password required: {0}")]
    PasswordRequired(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Identifier allocation exhausted after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    #[error("Transcode timed out after {seconds}s")]
    TranscodeTimeout { seconds: u64 },

    #[error("Transcode failed: {0}")]
    TranscodeFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Storage(_) => (
            502,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the identifier exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Conflict(_) => (
            409,
            "CONFLICT",
            false,
            Some("Choose a different identifier"),
            false,
            LogLevel::Debug,
        ),
        AppError::TooEarly(_) => (
            425,
            "PROCESSING",
            true,
            Some("Poll the status endpoint and retry once the file is active"),
            false,
            LogLevel::Debug,
        ),
        AppError::Unprocessable(_) => (
            422,
            "PROCESSING_FAILED",
            false,
            Some("Upload the file again"),
            false,
            LogLevel::Debug,
        ),
        AppError::PasswordRequired(_) => (
            403,
            "PASSWORD_REQUIRED",
            false,
            Some("Resubmit the request with a password"),
            false,
            LogLevel::Debug,
        ),
        AppError::Unauthorized(_) => (
            401,
            "INVALID_PASSWORD",
            false,
            Some("Check the password and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size"),
            false,
            LogLevel::Debug,
        ),
        AppError::UnsupportedMediaType(_) => (
            415,
            "UNSUPPORTED_MEDIA_TYPE",
            false,
            Some("Upload an image or a video"),
            false,
            LogLevel::Debug,
        ),
        AppError::AllocationExhausted { .. } => (
            500,
            "ALLOCATION_EXHAUSTED",
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Error,
        ),
        AppError::TranscodeTimeout { .. } => (
            504,
            "TRANSCODE_TIMEOUT",
            true,
            Some("Upload the file again later"),
            false,
            LogLevel::Warn,
        ),
        AppError::TranscodeFailure(_) => (
            502,
            "TRANSCODE_FAILED",
            false,
            Some("Check the video file and upload it again"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for logging and debugging
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Storage(_) => "Storage",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::Conflict(_) => "Conflict",
            AppError::TooEarly(_) => "TooEarly",
            AppError::Unprocessable(_) => "Unprocessable",
            AppError::PasswordRequired(_) => "PasswordRequired",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            AppError::AllocationExhausted { .. } => "AllocationExhausted",
            AppError::TranscodeTimeout { .. } => "TranscodeTimeout",
            AppError::TranscodeFailure(_) => "TranscodeFailure",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "InternalWithSource",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::TranscodeFailure(_) => "Failed to process video".to_string(),
            AppError::TranscodeTimeout { .. } => "Video processing timed out".to_string(),
            AppError::AllocationExhausted { .. } => {
                "Could not allocate a free identifier".to_string()
            }
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
            AppError::InvalidInput(ref msg)
            | AppError::NotFound(ref msg)
            | AppError::Conflict(ref msg)
            | AppError::TooEarly(ref msg)
            | AppError::Unprocessable(ref msg)
            | AppError::PasswordRequired(ref msg)
            | AppError::Unauthorized(ref msg)
            | AppError::PayloadTooLarge(ref msg)
            | AppError::UnsupportedMediaType(ref msg) => msg.clone(),
        }
    }
}
