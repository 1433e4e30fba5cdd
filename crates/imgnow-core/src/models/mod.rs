pub mod file;
pub mod settings;

pub use file::{FileRecord, FileStatus, MediaKind, NewFileRecord};
pub use settings::{RetentionRule, SettingsUpdate};
