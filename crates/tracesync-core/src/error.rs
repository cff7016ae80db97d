//! Error taxonomy for the alignment engine.
//!
//! Only conditions that abort an episode (or a whole configuration) are
//! errors. Malformed image metadata, samples without timestamps, empty image
//! pools and empty traces are recovered locally and surface as
//! [`crate::index::IndexWarning`]s and [`crate::batch::EpisodeOutcome`]s.

use tracesync_store::StorageError;

/// Alignment engine errors.
#[derive(Debug, thiserror::Error)]
pub enum AlignError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("batch cancelled before episode {0} started")]
    Cancelled(String),
}

/// Result type for alignment operations.
pub type Result<T> = std::result::Result<T, AlignError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_wraps_source() {
        let err: AlignError = StorageError::NotFound {
            episode_id: "12".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("storage error"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn test_invalid_config_display() {
        let err = AlignError::InvalidConfig("concurrency must be at least 1".to_string());
        assert!(err.to_string().contains("invalid configuration"));
    }

    #[test]
    fn test_cancelled_names_episode() {
        let err = AlignError::Cancelled("20250722155656".to_string());
        assert!(err.to_string().contains("20250722155656"));
    }
}
