use imgnow_core::MediaKind;

/// Image types accepted for upload. Only JPEG and PNG are recompressed.
const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/gif", "image/webp"];

/// Decides the [`MediaKind`] of an upload once, from its declared content type.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaClassifier {
    allow_other: bool,
}

impl MediaClassifier {
    pub fn new(allow_other: bool) -> Self {
        Self { allow_other }
    }

    pub fn classify(content_type: &str) -> MediaKind {
        let essence = essence(content_type);
        if IMAGE_TYPES.contains(&essence.as_str()) {
            MediaKind::Image
        } else if essence
            .strip_prefix("video/")
            .is_some_and(|subtype| !subtype.is_empty())
        {
            MediaKind::Video
        } else {
            MediaKind::Other
        }
    }

    /// Whether an upload of this kind may create a record at all.
    pub fn accepts(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Image | MediaKind::Video => true,
            MediaKind::Other => self.allow_other,
        }
    }
}

/// `type/subtype` lowercased, without parameters such as `; charset=...`.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
