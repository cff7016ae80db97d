//! Filesystem backend for episodes and image pools.
//!
//! Two directory layouts are supported, matching what the recording tools
//! produce:
//!
//! ```text
//! Flat                                 Nested
//! <traces>/<id>.json                   <root>/<n>/trace-<n>.json
//! <images>/<id>/*.jpg.json             <root>/<n>/images-<n>/*.jpg.json
//! ```

use std::cmp::Ordering;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::schema::{Episode, EpisodeId, ImageSidecar};
use crate::storage_traits::*;

/// Suffix of the per-image metadata files written by the capture relay.
pub const DEFAULT_SIDECAR_SUFFIX: &str = ".jpg.json";

/// Stem suffix of episodes written with `WriteMode::Separate` and no output dir.
const MATCHED_SUFFIX: &str = "_matched";

/// Recorded episodes are named by digits only, in either layout.
fn is_episode_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// On-disk arrangement of traces and images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsLayout {
    /// `<traces_dir>/<id>.json` with images under `<images_dir>/<id>/`.
    Flat {
        traces_dir: PathBuf,
        images_dir: PathBuf,
    },
    /// One numbered directory per episode under `root`.
    Nested { root: PathBuf },
}

/// Filesystem-backed `EpisodeStore` + `ImagePoolSource`.
#[derive(Debug, Clone)]
pub struct FsStore {
    layout: FsLayout,
    output_dir: Option<PathBuf>,
    sidecar_suffix: String,
}

impl FsStore {
    pub fn new(layout: FsLayout) -> Self {
        Self {
            layout,
            output_dir: None,
            sidecar_suffix: DEFAULT_SIDECAR_SUFFIX.to_string(),
        }
    }

    /// Send `WriteMode::Separate` writes to `<dir>/<id>.json`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Override which files in an image directory count as metadata sidecars.
    pub fn with_sidecar_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.sidecar_suffix = suffix.into();
        self
    }

    pub fn layout(&self) -> &FsLayout {
        &self.layout
    }

    /// Path the episode is read from (and overwritten at).
    pub fn episode_path(&self, id: &EpisodeId) -> PathBuf {
        match &self.layout {
            FsLayout::Flat { traces_dir, .. } => traces_dir.join(format!("{id}.json")),
            FsLayout::Nested { root } => root.join(id.as_str()).join(format!("trace-{id}.json")),
        }
    }

    /// Path a `WriteMode::Separate` write lands at.
    pub fn separate_path(&self, id: &EpisodeId) -> PathBuf {
        if let Some(dir) = &self.output_dir {
            return dir.join(format!("{id}.json"));
        }
        match &self.layout {
            FsLayout::Flat { traces_dir, .. } => {
                traces_dir.join(format!("{id}{MATCHED_SUFFIX}.json"))
            }
            FsLayout::Nested { root } => root
                .join(id.as_str())
                .join(format!("trace-{id}{MATCHED_SUFFIX}.json")),
        }
    }

    /// Directory holding the image sidecars of one episode.
    pub fn images_dir(&self, id: &EpisodeId) -> PathBuf {
        match &self.layout {
            FsLayout::Flat { images_dir, .. } => images_dir.join(id.as_str()),
            FsLayout::Nested { root } => root.join(id.as_str()).join(format!("images-{id}")),
        }
    }

    async fn list_flat(&self, traces_dir: &Path) -> StorageResult<Vec<EpisodeId>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(traces_dir)
            .await
            .map_err(|e| StorageError::io(traces_dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(traces_dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if is_episode_name(stem) {
                ids.push(EpisodeId::new(stem));
            }
        }
        Ok(ids)
    }

    async fn list_nested(&self, root: &Path) -> StorageResult<Vec<EpisodeId>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(root)
            .await
            .map_err(|e| StorageError::io(root, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(root, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_dir && is_episode_name(name) {
                ids.push(EpisodeId::new(name));
            }
        }
        Ok(ids)
    }
}

/// Numeric ids ascending, then everything else lexically.
fn episode_order(a: &EpisodeId, b: &EpisodeId) -> Ordering {
    match (a.as_str().parse::<u64>(), b.as_str().parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Write `data` to `path` atomically: temp file in the same directory, then rename.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl EpisodeStore for FsStore {
    async fn list_episodes(&self) -> StorageResult<Vec<EpisodeId>> {
        let mut ids = match &self.layout {
            FsLayout::Flat { traces_dir, .. } => self.list_flat(traces_dir).await?,
            FsLayout::Nested { root } => self.list_nested(root).await?,
        };
        ids.sort_by(episode_order);
        debug!(count = ids.len(), "listed episodes");
        Ok(ids)
    }

    async fn read_episode(&self, id: &EpisodeId) -> StorageResult<Episode> {
        let path = self.episode_path(id);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound {
                    episode_id: id.to_string(),
                }
            } else {
                StorageError::io(&path, e)
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Parse {
            episode_id: id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn write_episode(
        &self,
        id: &EpisodeId,
        episode: &Episode,
        mode: WriteMode,
    ) -> StorageResult<()> {
        let path = match mode {
            WriteMode::Overwrite => self.episode_path(id),
            WriteMode::Separate => self.separate_path(id),
        };
        let data = serde_json::to_vec_pretty(episode).map_err(|e| StorageError::Serialize {
            episode_id: id.to_string(),
            reason: e.to_string(),
        })?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &data))
            .await
            .map_err(|e| StorageError::io(&path, std::io::Error::new(ErrorKind::Other, e)))?
            .map_err(|e| StorageError::io(&path, e))?;

        debug!(episode_id = %id, path = ?path, "episode written");
        Ok(())
    }
}

#[async_trait]
impl ImagePoolSource for FsStore {
    async fn image_sidecars(&self, id: &EpisodeId) -> StorageResult<Vec<ImageSidecar>> {
        let dir = self.images_dir(id);
        let sidecars = read_sidecar_dir(&dir, &self.sidecar_suffix).await?;
        debug!(episode_id = %id, count = sidecars.len(), "read image sidecars");
        Ok(sidecars)
    }
}

/// Read every file in `dir` whose name ends with `suffix`, sorted by name.
///
/// A missing directory is an empty pool. Files that cannot be read are
/// skipped with a warning.
pub async fn read_sidecar_dir(dir: &Path, suffix: &str) -> StorageResult<Vec<ImageSidecar>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(dir = ?dir, "no image directory");
            return Ok(Vec::new());
        }
        Err(e) => return Err(StorageError::io(dir, e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(dir, e))?
    {
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(suffix) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    let mut sidecars = Vec::with_capacity(names.len());
    for name in names {
        let path = dir.join(&name);
        match tokio::fs::read(&path).await {
            Ok(contents) => sidecars.push(ImageSidecar::new(name, contents)),
            Err(e) => warn!(path = ?path, error = %e, "skipping unreadable image sidecar"),
        }
    }
    Ok(sidecars)
}
