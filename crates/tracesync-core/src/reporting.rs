use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::summary::{BatchSummary, OffsetDistribution};

/// Version of the persisted summary layout.
pub const SUMMARY_SCHEMA_VERSION: &str = "1.0";

/// Batch summary as persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
    #[serde(flatten)]
    pub summary: BatchSummary,
}

impl SummaryArtifact {
    pub fn new(summary: BatchSummary) -> Self {
        Self {
            schema_version: SUMMARY_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            tool_version: crate::VERSION.to_string(),
            summary,
        }
    }
}

/// Write the batch summary in pretty JSON format.
pub fn write_summary_json(path: &Path, summary: &BatchSummary) -> Result<()> {
    let artifact = SummaryArtifact::new(summary.clone());
    let content = serde_json::to_string_pretty(&artifact).context("serialize batch summary")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

fn percent(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.1}%", r * 100.0),
        None => "n/a".to_string(),
    }
}

fn distribution(dist: &Option<OffsetDistribution>) -> String {
    match dist {
        Some(d) => format!(
            "{:.1} ms (std {:.1}, min {:.1}, max {:.1}, n={})",
            d.mean, d.std, d.min, d.max, d.count
        ),
        None => "n/a".to_string(),
    }
}

/// Render the human-readable summary printed at the end of a batch.
pub fn render_summary_text(summary: &BatchSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Alignment summary ({} strategy, run {})\n",
        summary.strategy, summary.run_id
    ));
    out.push_str(&format!(
        "  episodes: {} total, {} aligned, {} failed, {} skipped\n",
        summary.total_episodes, summary.aligned, summary.failed, summary.skipped
    ));
    if summary.empty_image_pool > 0 || summary.empty_trace > 0 {
        out.push_str(&format!(
            "  without images: {}, without timestamps: {}\n",
            summary.empty_image_pool, summary.empty_trace
        ));
    }
    out.push_str(&format!(
        "  samples: {} timestamped of {} ({} missing timestamp)\n",
        summary.timestamped_samples, summary.total_samples, summary.missing_timestamps
    ));
    out.push_str(&format!(
        "  matched: {}/{} ({}), {} direct\n",
        summary.matched,
        summary.timestamped_samples,
        percent(summary.match_rate),
        summary.direct_matches
    ));
    if summary.mean_offsets.is_some() {
        out.push_str(&format!(
            "  mean offset: {}\n",
            distribution(&summary.mean_offsets)
        ));
        out.push_str(&format!(
            "  offset spread: {}\n",
            distribution(&summary.stddev_offsets)
        ));
    }

    if !summary.per_class.is_empty() {
        out.push_str("\nBy episode class:\n");
        for (class, stats) in &summary.per_class {
            out.push_str(&format!(
                "  {:<13} {} episodes, {} failed, matched {}/{} ({})",
                class,
                stats.episodes,
                stats.failed,
                stats.matched,
                stats.timestamped_samples,
                percent(stats.match_rate)
            ));
            out.push('\n');
            if stats.mean_offsets.is_some() {
                out.push_str(&format!(
                    "    mean offset: {}\n",
                    distribution(&stats.mean_offsets)
                ));
                out.push_str(&format!(
                    "    offset spread: {}\n",
                    distribution(&stats.stddev_offsets)
                ));
            }
        }
    }

    if !summary.failures.is_empty() {
        out.push_str("\nFailed episodes:\n");
        for failure in &summary.failures {
            out.push_str(&format!("  {}: {}\n", failure.episode_id, failure.error));
        }
    }
    if !summary.skipped_episodes.is_empty() {
        let ids: Vec<&str> = summary
            .skipped_episodes
            .iter()
            .map(|id| id.as_str())
            .collect();
        out.push_str(&format!("\nSkipped (cancelled): {}\n", ids.join(", ")));
    }
    out
}
