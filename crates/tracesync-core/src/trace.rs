//! Trace loading: which samples of an episode can take part in alignment.

use serde::{Deserialize, Serialize};
use tracesync_store::Episode;

/// A sample that declares a timestamp, with its position in the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedSample {
    pub position: usize,
    pub timestamp_ms: i64,
}

/// Alignment-relevant view of an episode's trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceView {
    /// Timestamped samples, in episode order
    pub timed: Vec<TimedSample>,
    /// Length of the full trace, timestamped or not
    pub total: usize,
}

impl TraceView {
    pub fn load(episode: &Episode) -> Self {
        let timed = episode
            .trace
            .iter()
            .enumerate()
            .filter_map(|(position, sample)| {
                sample.timestamp_ms().map(|timestamp_ms| TimedSample {
                    position,
                    timestamp_ms,
                })
            })
            .collect();
        Self {
            timed,
            total: episode.trace.len(),
        }
    }

    /// Samples that carry no timestamp and are excluded from alignment.
    pub fn missing_timestamps(&self) -> usize {
        self.total - self.timed.len()
    }

    /// True when no sample can be aligned.
    pub fn is_empty(&self) -> bool {
        self.timed.is_empty()
    }

    /// `(earliest, latest)` sample timestamp.
    pub fn span(&self) -> Option<(i64, i64)> {
        let min = self.timed.iter().map(|s| s.timestamp_ms).min()?;
        let max = self.timed.iter().map(|s| s.timestamp_ms).max()?;
        Some((min, max))
    }
}
