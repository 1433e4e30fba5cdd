/// Prefix for every file route.
pub const API_PREFIX: &str = "/api/file";

/// Multipart field carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "file";

/// Path segment of the upload route under [`API_PREFIX`].
pub const UPLOAD_SEGMENT: &str = "upload";
