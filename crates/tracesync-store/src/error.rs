//! Error types for tracesync-store

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing episodes.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Episode does not exist in the backend
    #[error("episode not found: {episode_id}")]
    NotFound { episode_id: String },

    /// Filesystem failure
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored episode is not valid episode JSON
    #[error("failed to parse episode {episode_id}: {reason}")]
    Parse { episode_id: String, reason: String },

    /// Episode could not be serialized for writing
    #[error("failed to serialize episode {episode_id}: {reason}")]
    Serialize { episode_id: String, reason: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
