//! Timestamp index over an episode's image pool.
//!
//! Each image sidecar declares a capture time in decimal seconds and the
//! image's file name. [`build_index`] turns a pool of sidecars into a sorted
//! `timestamp_ms -> identifier` map, skipping (and reporting) every sidecar
//! it cannot use.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use tracesync_store::ImageSidecar;

/// One usable image: capture time plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub timestamp_ms: i64,
    pub identifier: String,
}

/// Why a sidecar was left out of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    InvalidJson,
    MissingTimestamp,
    InvalidTimestamp,
    MissingIdentifier,
}

/// A malformed sidecar, skipped by the index builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexWarning {
    pub source: String,
    pub kind: WarningKind,
    pub detail: String,
}

impl std::fmt::Display for IndexWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?} ({})", self.source, self.kind, self.detail)
    }
}

/// Sorted mapping from capture time (ms) to image identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageIndex {
    entries: BTreeMap<i64, String>,
}

impl ImageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an image, returning the identifier it replaced at the same instant.
    pub fn insert(&mut self, timestamp_ms: i64, identifier: impl Into<String>) -> Option<String> {
        self.entries.insert(timestamp_ms, identifier.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, timestamp_ms: i64) -> Option<&str> {
        self.entries.get(&timestamp_ms).map(String::as_str)
    }

    /// Entries in ascending timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> + '_ {
        self.entries.iter().map(|(ts, id)| (*ts, id.as_str()))
    }

    /// `(earliest, latest)` capture time, if any image is indexed.
    pub fn span(&self) -> Option<(i64, i64)> {
        let first = self.entries.keys().next()?;
        let last = self.entries.keys().next_back()?;
        Some((*first, *last))
    }

    /// Image closest in time to `timestamp_ms`.
    ///
    /// When two images are equally close the earlier one wins, so the answer
    /// never depends on how the pool was enumerated.
    pub fn nearest(&self, timestamp_ms: i64) -> Option<(i64, &str)> {
        let below = self.entries.range(..=timestamp_ms).next_back();
        let above = self.entries.range(timestamp_ms..).next();
        let pick = match (below, above) {
            (Some(b), Some(a)) => {
                if timestamp_ms.abs_diff(*b.0) <= a.0.abs_diff(timestamp_ms) {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };
        Some((*pick.0, pick.1.as_str()))
    }
}

impl FromIterator<(i64, String)> for ImageIndex {
    fn from_iter<T: IntoIterator<Item = (i64, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Output of [`build_index`].
#[derive(Debug, Clone, Default)]
pub struct IndexBuild {
    pub index: ImageIndex,
    pub warnings: Vec<IndexWarning>,
    /// Images displaced by a later sidecar with the same millisecond timestamp
    pub overwritten: usize,
}

/// Build the timestamp index of one image pool.
///
/// Sidecars are processed in lexical order of their source name; when two
/// share a millisecond timestamp, the one processed last wins.
pub fn build_index(sidecars: &[ImageSidecar]) -> IndexBuild {
    let mut ordered: Vec<&ImageSidecar> = sidecars.iter().collect();
    ordered.sort_by(|a, b| a.source.cmp(&b.source));

    let mut build = IndexBuild::default();
    for sidecar in ordered {
        match parse_sidecar(sidecar) {
            Ok(record) => {
                if let Some(previous) = build.index.insert(record.timestamp_ms, record.identifier) {
                    debug!(
                        source = %sidecar.source,
                        timestamp_ms = record.timestamp_ms,
                        replaced = %previous,
                        "image timestamp collision, last one wins"
                    );
                    build.overwritten += 1;
                }
            }
            Err(warning) => {
                warn!(source = %warning.source, kind = ?warning.kind, detail = %warning.detail, "skipping image metadata");
                build.warnings.push(warning);
            }
        }
    }
    build
}

/// Parse one sidecar into an [`ImageRecord`].
pub fn parse_sidecar(sidecar: &ImageSidecar) -> Result<ImageRecord, IndexWarning> {
    let warning = |kind, detail: String| IndexWarning {
        source: sidecar.source.clone(),
        kind,
        detail,
    };

    let value: Value = serde_json::from_slice(&sidecar.contents)
        .map_err(|e| warning(WarningKind::InvalidJson, e.to_string()))?;

    let timestamp_ms = match value.get("timestamp") {
        None | Some(Value::Null) => {
            return Err(warning(
                WarningKind::MissingTimestamp,
                "no 'timestamp' field".to_string(),
            ))
        }
        Some(Value::String(s)) => seconds_to_ms(s),
        Some(Value::Number(n)) => seconds_to_ms(&n.to_string()),
        Some(other) => {
            return Err(warning(
                WarningKind::InvalidTimestamp,
                format!("unsupported timestamp value {other}"),
            ))
        }
    }
    .ok_or_else(|| {
        warning(
            WarningKind::InvalidTimestamp,
            format!("not a decimal seconds value: {}", value["timestamp"]),
        )
    })?;

    let identifier = match value.get("filename") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
        _ => {
            return Err(warning(
                WarningKind::MissingIdentifier,
                "no usable 'filename' field".to_string(),
            ))
        }
    };

    Ok(ImageRecord {
        timestamp_ms,
        identifier,
    })
}

/// Convert decimal seconds to whole milliseconds: `seconds * 1000`,
/// truncated toward zero in `f64`, so `"1.005"` lands on `1004`.
pub fn seconds_to_ms(text: &str) -> Option<i64> {
    let seconds: f64 = text.trim().parse().ok()?;
    let ms = (seconds * 1000.0).trunc();
    if !ms.is_finite() || ms.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(ms as i64)
}
