use chrono::{DateTime, Utc};

use crate::AppError;

/// A count-based deletion rule: delete once the counter reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionRule {
    pub enabled: bool,
    pub threshold: Option<i32>,
}

impl RetentionRule {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold: None,
        }
    }

    /// An enabled rule needs a positive threshold.
    pub fn validate(&self, name: &str) -> Result<(), AppError> {
        if !self.enabled {
            return Ok(());
        }
        match self.threshold {
            Some(t) if t >= 1 => Ok(()),
            Some(_) => Err(AppError::InvalidInput(format!(
                "{} must be at least 1",
                name
            ))),
            None => Err(AppError::InvalidInput(format!(
                "{} is required when deletion is enabled",
                name
            ))),
        }
    }
}

/// Partial update of a record's retention policy and access gate.
///
/// `None` leaves a field untouched. `password_hash: Some(None)` removes protection.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub expires_at: Option<DateTime<Utc>>,
    pub download_rule: Option<RetentionRule>,
    pub view_rule: Option<RetentionRule>,
    pub password_hash: Option<Option<String>>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.expires_at.is_none()
            && self.download_rule.is_none()
            && self.view_rule.is_none()
            && self.password_hash.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_validation() {
        assert!(RetentionRule::disabled().validate("x").is_ok());
        assert!(RetentionRule {
            enabled: true,
            threshold: Some(3)
        }
        .validate("downloadsForDeletion")
        .is_ok());
        assert!(RetentionRule {
            enabled: true,
            threshold: Some(0)
        }
        .validate("downloadsForDeletion")
        .is_err());
        assert!(RetentionRule {
            enabled: true,
            threshold: None
        }
        .validate("downloadsForDeletion")
        .is_err());
    }

    #[test]
    fn test_empty_update() {
        assert!(SettingsUpdate::default().is_empty());
        let update = SettingsUpdate {
            password_hash: Some(None),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
