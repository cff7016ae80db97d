//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryEpisodeStore` and `MemoryImagePool` that satisfy the trait
//! contracts without touching the filesystem.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::{Episode, EpisodeId, ImageSidecar};
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryEpisodeStore
// ---------------------------------------------------------------------------

/// In-memory episode store.
///
/// Originals and separately-written episodes live in two maps, so tests can
/// check which one a write landed in. Ids registered with `fail_reads_for` /
/// `fail_writes_for` return an I/O error to exercise failure paths.
#[derive(Debug, Default)]
pub struct MemoryEpisodeStore {
    originals: Mutex<BTreeMap<EpisodeId, Episode>>,
    separate: Mutex<BTreeMap<EpisodeId, Episode>>,
    broken_reads: Mutex<HashSet<EpisodeId>>,
    broken_writes: Mutex<HashSet<EpisodeId>>,
}

impl MemoryEpisodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an episode as if it had been recorded.
    pub fn insert(&self, id: impl Into<EpisodeId>, episode: Episode) {
        let mut originals = self.originals.lock().unwrap();
        originals.insert(id.into(), episode);
    }

    /// Make every read of `id` fail.
    pub fn fail_reads_for(&self, id: impl Into<EpisodeId>) {
        self.broken_reads.lock().unwrap().insert(id.into());
    }

    /// Make every write of `id` fail.
    pub fn fail_writes_for(&self, id: impl Into<EpisodeId>) {
        self.broken_writes.lock().unwrap().insert(id.into());
    }

    /// Episode as currently stored at its original location.
    pub fn original(&self, id: &EpisodeId) -> Option<Episode> {
        self.originals.lock().unwrap().get(id).cloned()
    }

    /// Episode written with `WriteMode::Separate`, if any.
    pub fn written_separately(&self, id: &EpisodeId) -> Option<Episode> {
        self.separate.lock().unwrap().get(id).cloned()
    }
}

fn simulated_io_error(id: &EpisodeId) -> StorageError {
    StorageError::Io {
        path: format!("memory://{id}").into(),
        source: std::io::Error::new(std::io::ErrorKind::Other, "simulated failure"),
    }
}

#[async_trait]
impl EpisodeStore for MemoryEpisodeStore {
    async fn list_episodes(&self) -> StorageResult<Vec<EpisodeId>> {
        let originals = self.originals.lock().unwrap();
        let broken = self.broken_reads.lock().unwrap();
        // Broken ids are listed too; the failure surfaces on read.
        let mut ids: Vec<EpisodeId> = originals.keys().cloned().collect();
        for id in broken.iter() {
            if !originals.contains_key(id) {
                ids.push(id.clone());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn read_episode(&self, id: &EpisodeId) -> StorageResult<Episode> {
        if self.broken_reads.lock().unwrap().contains(id) {
            return Err(simulated_io_error(id));
        }
        let originals = self.originals.lock().unwrap();
        originals
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                episode_id: id.to_string(),
            })
    }

    async fn write_episode(
        &self,
        id: &EpisodeId,
        episode: &Episode,
        mode: WriteMode,
    ) -> StorageResult<()> {
        if self.broken_writes.lock().unwrap().contains(id) {
            return Err(simulated_io_error(id));
        }
        let target = match mode {
            WriteMode::Overwrite => &self.originals,
            WriteMode::Separate => &self.separate,
        };
        target.lock().unwrap().insert(id.clone(), episode.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryImagePool
// ---------------------------------------------------------------------------

/// In-memory image pool backed by a `BTreeMap<EpisodeId, Vec<ImageSidecar>>`.
///
/// Unknown episodes have an empty pool.
#[derive(Debug, Default)]
pub struct MemoryImagePool {
    pools: Mutex<BTreeMap<EpisodeId, Vec<ImageSidecar>>>,
}

impl MemoryImagePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sidecar to an episode's pool.
    pub fn push(&self, id: impl Into<EpisodeId>, sidecar: ImageSidecar) {
        let mut pools = self.pools.lock().unwrap();
        pools.entry(id.into()).or_default().push(sidecar);
    }

    /// Add a well-formed image captured at `timestamp_ms` under `filename`.
    ///
    /// The timestamp is stored the way the capture relay writes it: decimal
    /// seconds as a string. A trailing half millisecond keeps the `f64`
    /// truncation in the indexer on `timestamp_ms`.
    pub fn push_image(&self, id: impl Into<EpisodeId>, timestamp_ms: i64, filename: &str) {
        let sign = if timestamp_ms < 0 { "-" } else { "" };
        let abs = timestamp_ms.unsigned_abs();
        let sidecar = ImageSidecar::from_json(
            format!("{filename}.json"),
            &serde_json::json!({
                "timestamp": format!("{sign}{}.{:03}5", abs / 1000, abs % 1000),
                "filename": filename,
            }),
        );
        self.push(id, sidecar);
    }
}

#[async_trait]
impl ImagePoolSource for MemoryImagePool {
    async fn image_sidecars(&self, id: &EpisodeId) -> StorageResult<Vec<ImageSidecar>> {
        let pools = self.pools.lock().unwrap();
        Ok(pools.get(id).cloned().unwrap_or_default())
    }
}
