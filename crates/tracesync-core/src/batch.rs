//! Episode batch runner.
//!
//! For each episode: read it, build the index of its image pool, run the
//! configured strategy, fill gaps, write it back and report. Episodes are
//! independent, so up to `concurrency` of them are in flight at once; their
//! results are collected in input order and reduced into a
//! [`BatchSummary`] afterwards.
//!
//! A failure in one episode is recorded and the batch moves on. Cancellation
//! is coarse: a raised [`CancelFlag`] stops episodes from starting, while
//! episodes already in flight run to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use tracesync_store::{Episode, EpisodeId, EpisodeStore, ImagePoolSource, ImageSidecar};
use uuid::Uuid;

use crate::align::strategy_for;
use crate::config::{AlignConfig, StrategyKind};
use crate::error::{AlignError, Result};
use crate::gap_fill::{apply_images, direct_only, fill_gaps};
use crate::index::{build_index, IndexWarning};
use crate::metrics::METRICS;
use crate::obs::{self, EpisodeSpan};
use crate::summary::{BatchSummary, EpisodeClass};
use crate::trace::TraceView;

/// Shared flag requesting that no further episodes be started.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Match counts and clock-offset statistics of one aligned episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    /// Timestamped samples labelled with an image in the written episode
    pub matched: usize,
    /// Timestamped samples
    pub total: usize,
    pub mean_offset_ms: Option<f64>,
    pub stddev_offset_ms: Option<f64>,
}

impl AlignmentReport {
    pub fn match_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.matched as f64 / self.total as f64)
    }
}

/// How an episode that was written back went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOutcome {
    Aligned,
    /// No usable image for the episode; every sample was written unlabelled.
    EmptyImagePool,
    /// No sample declares a timestamp; nothing could be aligned.
    EmptyTrace,
}

/// Everything known about one aligned episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub episode_id: EpisodeId,
    pub class: EpisodeClass,
    pub strategy: StrategyKind,
    /// Samples in the trace, timestamped or not
    pub samples: usize,
    pub missing_timestamps: usize,
    /// Images in the index
    pub images: usize,
    pub index_warnings: Vec<IndexWarning>,
    /// Images displaced by another image with the same millisecond timestamp
    pub overwritten_images: usize,
    /// Samples labelled by the strategy itself, before gap filling
    pub direct_matches: usize,
    #[serde(flatten)]
    pub alignment: AlignmentReport,
    /// SHA-256 over the JSON of the written image column
    pub assignment_digest: String,
    pub outcome: EpisodeOutcome,
}

/// Align a single episode and persist it.
pub async fn align(
    episodes: &dyn EpisodeStore,
    images: &dyn ImagePoolSource,
    id: &EpisodeId,
    config: &AlignConfig,
) -> Result<AlignmentReport> {
    Ok(align_episode(episodes, images, id, config).await?.alignment)
}

/// Align a single episode, persist it, and return the full report.
pub async fn align_episode(
    episodes: &dyn EpisodeStore,
    images: &dyn ImagePoolSource,
    id: &EpisodeId,
    config: &AlignConfig,
) -> Result<EpisodeReport> {
    let mut episode = episodes.read_episode(id).await?;
    let sidecars = images.image_sidecars(id).await?;

    let report = align_in_memory(id, &mut episode, &sidecars, config)?;

    episodes
        .write_episode(id, &episode, config.write_mode())
        .await?;
    Ok(report)
}

/// Run index building, the strategy and gap filling on a loaded episode,
/// rewriting its image column in place.
pub fn align_in_memory(
    id: &EpisodeId,
    episode: &mut Episode,
    sidecars: &[ImageSidecar],
    config: &AlignConfig,
) -> Result<EpisodeReport> {
    let _span = EpisodeSpan::enter(id.as_str());

    let build = build_index(sidecars);
    let view = TraceView::load(episode);
    let strategy = strategy_for(config);
    let result = strategy.align(&view.timed, &build.index);

    let column = if config.fill_gaps {
        fill_gaps(&result.assignments, view.total)
    } else {
        direct_only(&result.assignments, view.total)
    };
    let matched = view
        .timed
        .iter()
        .filter(|s| column.get(s.position).is_some_and(Option::is_some))
        .count();
    let assignment_digest = hex::encode(Sha256::digest(serde_json::to_vec(&column)?));
    apply_images(episode, column);

    let outcome = if view.is_empty() {
        EpisodeOutcome::EmptyTrace
    } else if build.index.is_empty() {
        EpisodeOutcome::EmptyImagePool
    } else {
        EpisodeOutcome::Aligned
    };
    debug!(
        strategy = strategy.name(),
        images = build.index.len(),
        trace_span = ?view.span(),
        image_span = ?build.index.span(),
        direct = result.direct_matches(),
        matched,
        outcome = ?outcome,
        "episode aligned in memory"
    );

    Ok(EpisodeReport {
        episode_id: id.clone(),
        class: EpisodeClass::classify(id),
        strategy: config.strategy,
        samples: view.total,
        missing_timestamps: view.missing_timestamps(),
        images: build.index.len(),
        index_warnings: build.warnings,
        overwritten_images: build.overwritten,
        direct_matches: result.direct_matches(),
        alignment: AlignmentReport {
            matched,
            total: view.timed.len(),
            mean_offset_ms: result.mean_offset_ms,
            stddev_offset_ms: result.stddev_offset_ms,
        },
        assignment_digest,
        outcome,
    })
}

/// Aligns many episodes against one store and image source.
pub struct BatchRunner {
    episodes: Arc<dyn EpisodeStore>,
    images: Arc<dyn ImagePoolSource>,
    config: AlignConfig,
    cancel: CancelFlag,
}

impl BatchRunner {
    pub fn new(
        episodes: Arc<dyn EpisodeStore>,
        images: Arc<dyn ImagePoolSource>,
        config: AlignConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            episodes,
            images,
            config,
            cancel: CancelFlag::new(),
        })
    }

    /// Share an externally owned cancellation flag (e.g. a Ctrl-C handler's).
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Align every episode the store lists.
    pub async fn run_all(&self) -> Result<BatchSummary> {
        let ids = self.episodes.list_episodes().await?;
        Ok(self.run(ids).await)
    }

    /// Align `ids` and summarise. Never fails as a whole: per-episode errors
    /// end up in [`BatchSummary::failures`].
    pub async fn run(&self, ids: Vec<EpisodeId>) -> BatchSummary {
        let run_id = Uuid::new_v4().to_string();
        obs::emit_batch_started(&run_id, ids.len(), self.config.strategy.as_str());

        let results: Vec<(EpisodeId, Result<EpisodeReport>)> = stream::iter(ids)
            .map(|id| async move {
                let result = self.run_one(&id).await;
                (id, result)
            })
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let summary = BatchSummary::collect(run_id, self.config.strategy, results);
        obs::emit_batch_finished(
            &summary.run_id,
            summary.aligned,
            summary.failed,
            summary.skipped,
            summary.match_rate,
        );
        METRICS.flush();
        summary
    }

    async fn run_one(&self, id: &EpisodeId) -> Result<EpisodeReport> {
        if self.cancel.is_cancelled() {
            debug!(episode_id = %id, "batch cancelled, not starting episode");
            return Err(AlignError::Cancelled(id.to_string()));
        }

        let result = align_episode(
            self.episodes.as_ref(),
            self.images.as_ref(),
            id,
            &self.config,
        )
        .await;

        match &result {
            Ok(report) => {
                METRICS.inc_episodes_aligned();
                METRICS.add_images_indexed(report.images as u64);
                METRICS.add_image_warnings(report.index_warnings.len() as u64);
                obs::emit_episode_aligned(
                    id.as_str(),
                    report.alignment.matched,
                    report.alignment.total,
                    report.alignment.mean_offset_ms,
                    report.alignment.stddev_offset_ms,
                );
            }
            Err(e) => {
                METRICS.inc_episodes_failed();
                obs::emit_episode_failed(id.as_str(), e);
            }
        }
        result
    }
}
