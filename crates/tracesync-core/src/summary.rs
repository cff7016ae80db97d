//! Batch summary: the reduce step over per-episode results.
//!
//! A summary is always produced, even when every episode failed, so callers
//! can report what happened before deciding on an exit status.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracesync_store::EpisodeId;

use crate::batch::{EpisodeOutcome, EpisodeReport};
use crate::config::StrategyKind;
use crate::error::AlignError;

/// Coarse grouping of episodes by how they were recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeClass {
    /// Manually numbered session (`1`..`999`)
    Numbered,
    /// Recorder-stamped session (`YYYYMMDDhhmmss`)
    Autorecorded,
    Other,
}

impl EpisodeClass {
    pub fn classify(id: &EpisodeId) -> Self {
        static NUMBERED: OnceLock<Option<Regex>> = OnceLock::new();
        static AUTORECORDED: OnceLock<Option<Regex>> = OnceLock::new();

        let matches = |cell: &'static OnceLock<Option<Regex>>, pattern: &str| {
            cell.get_or_init(|| Regex::new(pattern).ok())
                .as_ref()
                .is_some_and(|re| re.is_match(id.as_str()))
        };

        if matches(&NUMBERED, r"^\d{1,3}$") {
            EpisodeClass::Numbered
        } else if matches(&AUTORECORDED, r"^20\d{12}$") {
            EpisodeClass::Autorecorded
        } else {
            EpisodeClass::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeClass::Numbered => "numbered",
            EpisodeClass::Autorecorded => "autorecorded",
            EpisodeClass::Other => "other",
        }
    }
}

impl std::fmt::Display for EpisodeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Spread of one per-episode statistic across a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetDistribution {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation around `mean`
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl OffsetDistribution {
    /// `None` when `values` is empty.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            count: values.len(),
            mean,
            std: variance.sqrt(),
            min,
            max,
        })
    }
}

/// Totals for one [`EpisodeClass`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub episodes: usize,
    pub failed: usize,
    pub timestamped_samples: usize,
    pub matched: usize,
    pub match_rate: Option<f64>,
    pub mean_offsets: Option<OffsetDistribution>,
    pub stddev_offsets: Option<OffsetDistribution>,
}

/// An episode that could not be read, aligned or written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeFailure {
    pub episode_id: EpisodeId,
    pub error: String,
}

/// Aggregate result of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub strategy: StrategyKind,

    pub total_episodes: usize,
    /// Episodes aligned and written back, whatever their outcome
    pub aligned: usize,
    pub failed: usize,
    /// Episodes never started because the batch was cancelled
    pub skipped: usize,
    pub empty_image_pool: usize,
    pub empty_trace: usize,

    pub total_samples: usize,
    pub timestamped_samples: usize,
    pub missing_timestamps: usize,
    pub direct_matches: usize,
    pub matched: usize,
    /// `matched / timestamped_samples`, `None` when nothing was timestamped
    pub match_rate: Option<f64>,

    pub per_class: BTreeMap<EpisodeClass, ClassStats>,
    /// Distribution of per-episode `mean_offset_ms`
    pub mean_offsets: Option<OffsetDistribution>,
    /// Distribution of per-episode `stddev_offset_ms`
    pub stddev_offsets: Option<OffsetDistribution>,

    pub episodes: Vec<EpisodeReport>,
    pub failures: Vec<EpisodeFailure>,
    pub skipped_episodes: Vec<EpisodeId>,
}

impl BatchSummary {
    /// Reduce per-episode results, kept in input order, into a summary.
    pub fn collect(
        run_id: impl Into<String>,
        strategy: StrategyKind,
        results: Vec<(EpisodeId, Result<EpisodeReport, AlignError>)>,
    ) -> Self {
        let total_episodes = results.len();
        let mut episodes = Vec::new();
        let mut failures = Vec::new();
        let mut skipped_episodes = Vec::new();

        for (id, result) in results {
            match result {
                Ok(report) => episodes.push(report),
                Err(AlignError::Cancelled(_)) => skipped_episodes.push(id),
                Err(e) => failures.push(EpisodeFailure {
                    episode_id: id,
                    error: e.to_string(),
                }),
            }
        }

        let count_outcome =
            |outcome: EpisodeOutcome| episodes.iter().filter(|r| r.outcome == outcome).count();
        let timestamped_samples: usize = episodes.iter().map(|r| r.alignment.total).sum();
        let matched: usize = episodes.iter().map(|r| r.alignment.matched).sum();

        let mean_offsets: Vec<f64> = episodes
            .iter()
            .filter_map(|r| r.alignment.mean_offset_ms)
            .collect();
        let stddev_offsets: Vec<f64> = episodes
            .iter()
            .filter_map(|r| r.alignment.stddev_offset_ms)
            .collect();

        Self {
            run_id: run_id.into(),
            strategy,
            total_episodes,
            aligned: episodes.len(),
            failed: failures.len(),
            skipped: skipped_episodes.len(),
            empty_image_pool: count_outcome(EpisodeOutcome::EmptyImagePool),
            empty_trace: count_outcome(EpisodeOutcome::EmptyTrace),
            total_samples: episodes.iter().map(|r| r.samples).sum(),
            timestamped_samples,
            missing_timestamps: episodes.iter().map(|r| r.missing_timestamps).sum(),
            direct_matches: episodes.iter().map(|r| r.direct_matches).sum(),
            matched,
            match_rate: rate(matched, timestamped_samples),
            per_class: per_class(&episodes, &failures),
            mean_offsets: OffsetDistribution::from_values(&mean_offsets),
            stddev_offsets: OffsetDistribution::from_values(&stddev_offsets),
            episodes,
            failures,
            skipped_episodes,
        }
    }

    /// True when at least one episode was processed and none failed.
    pub fn is_clean(&self) -> bool {
        self.aligned > 0 && self.failed == 0
    }
}

fn rate(matched: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| matched as f64 / total as f64)
}

fn per_class(
    episodes: &[EpisodeReport],
    failures: &[EpisodeFailure],
) -> BTreeMap<EpisodeClass, ClassStats> {
    let mut classes: BTreeMap<EpisodeClass, (ClassStats, Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for report in episodes {
        let (stats, means, stddevs) = classes.entry(report.class).or_default();
        stats.episodes += 1;
        stats.timestamped_samples += report.alignment.total;
        stats.matched += report.alignment.matched;
        means.extend(report.alignment.mean_offset_ms);
        stddevs.extend(report.alignment.stddev_offset_ms);
    }
    for failure in failures {
        let class = EpisodeClass::classify(&failure.episode_id);
        classes.entry(class).or_default().0.failed += 1;
    }

    classes
        .into_iter()
        .map(|(class, (mut stats, means, stddevs))| {
            stats.match_rate = rate(stats.matched, stats.timestamped_samples);
            stats.mean_offsets = OffsetDistribution::from_values(&means);
            stats.stddev_offsets = OffsetDistribution::from_values(&stddevs);
            (class, stats)
        })
        .collect()
}
