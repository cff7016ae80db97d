//! Storage trait definitions for TraceSync
//!
//! These traits define the storage boundary of the alignment engine:
//! - `EpisodeStore`: list, read and write recorded episodes
//! - `ImagePoolSource`: fetch the raw image metadata captured for an episode
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module; `fs::FsStore` implements both on disk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::schema::{Episode, EpisodeId, ImageSidecar};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Where an aligned episode is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace the episode that was read.
    Overwrite,
    /// Keep the source untouched and write next to it (backend-defined).
    Separate,
}

impl WriteMode {
    pub fn from_overwrite_flag(overwrite_original: bool) -> Self {
        if overwrite_original {
            WriteMode::Overwrite
        } else {
            WriteMode::Separate
        }
    }
}

/// Episode persistence.
///
/// Guarantees:
/// - `list_episodes` returns ids in a stable, backend-defined order.
/// - `read_episode` returns `StorageError::NotFound` for unknown ids.
/// - `write_episode` with `Separate` never modifies what `read_episode`
///   returns for the same id.
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    /// List all episodes available for alignment.
    async fn list_episodes(&self) -> StorageResult<Vec<EpisodeId>>;

    /// Read one episode.
    async fn read_episode(&self, id: &EpisodeId) -> StorageResult<Episode>;

    /// Persist an aligned episode.
    async fn write_episode(
        &self,
        id: &EpisodeId,
        episode: &Episode,
        mode: WriteMode,
    ) -> StorageResult<()>;
}

/// Source of per-episode image metadata.
///
/// An episode with no captured images yields an empty list, never an error.
#[async_trait]
pub trait ImagePoolSource: Send + Sync {
    /// Raw metadata sidecars for every image captured during `id`.
    async fn image_sidecars(&self, id: &EpisodeId) -> StorageResult<Vec<ImageSidecar>>;
}
