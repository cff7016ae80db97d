//! Structured observability hooks for alignment batches.
//!
//! This module provides:
//! - Episode-scoped tracing spans via the `EpisodeSpan` RAII guard
//! - Emission functions for batch and episode lifecycle events
//!
//! Events are emitted at `info!` level (failures at `warn!`); filter with
//! `RUST_LOG`, switch to JSON lines with `--json`.

use tracing::{info, warn};

/// RAII guard that enters an episode-scoped span for the duration of one
/// alignment.
///
/// Only hold this across synchronous code; async tasks should use
/// [`episode_span`] with `Instrument` instead.
pub struct EpisodeSpan {
    _span: tracing::span::EnteredSpan,
}

impl EpisodeSpan {
    /// Create and enter a span tagged with the episode id.
    pub fn enter(episode_id: &str) -> Self {
        Self {
            _span: episode_span(episode_id).entered(),
        }
    }
}

/// Span tagged with `episode_id`, for instrumenting futures.
pub fn episode_span(episode_id: &str) -> tracing::Span {
    tracing::info_span!("tracesync.episode", episode_id = %episode_id)
}

/// Emit event: batch started.
pub fn emit_batch_started(run_id: &str, episodes: usize, strategy: &str) {
    info!(event = "batch.started", run_id = %run_id, episodes = episodes, strategy = %strategy);
}

/// Emit event: one episode aligned and written back.
pub fn emit_episode_aligned(
    episode_id: &str,
    matched: usize,
    total: usize,
    mean_offset_ms: Option<f64>,
    stddev_offset_ms: Option<f64>,
) {
    info!(
        event = "episode.aligned",
        episode_id = %episode_id,
        matched = matched,
        total = total,
        mean_offset_ms = ?mean_offset_ms,
        stddev_offset_ms = ?stddev_offset_ms,
    );
}

/// Emit event: one episode failed (warning level).
pub fn emit_episode_failed(episode_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "episode.failed", episode_id = %episode_id, error = %error);
}

/// Emit event: batch finished.
pub fn emit_batch_finished(
    run_id: &str,
    aligned: usize,
    failed: usize,
    skipped: usize,
    match_rate: Option<f64>,
) {
    info!(
        event = "batch.finished",
        run_id = %run_id,
        aligned = aligned,
        failed = failed,
        skipped = skipped,
        match_rate = ?match_rate,
    );
}
