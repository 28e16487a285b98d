//! Error types shared across the notifier crates.

use thiserror::Error;

/// Error raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = NotifierError::Config("schedule.interval_secs must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: schedule.interval_secs must be at least 1"
        );
    }
}
