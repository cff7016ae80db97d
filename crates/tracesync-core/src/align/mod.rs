//! Alignment strategies.
//!
//! A strategy turns the timestamped samples of one episode and that
//! episode's image index into a sparse assignment `position -> image`.
//! Strategies are pure: no I/O, no state carried between episodes, and the
//! same inputs always give the same result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{AlignConfig, StrategyKind};
use crate::index::ImageIndex;
use crate::trace::TimedSample;

pub mod nearest;
pub mod proportional;

pub use nearest::NearestWithTolerance;
pub use proportional::ProportionalDistribution;

/// Sparse output of a strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    /// Sample position -> image identifier
    pub assignments: BTreeMap<usize, String>,
    /// Mean of `image_ts - sample_ts` over all produced pairs
    pub mean_offset_ms: Option<f64>,
    /// Population standard deviation of the same residuals around their mean
    pub stddev_offset_ms: Option<f64>,
}

impl AlignmentResult {
    /// Number of samples that received an image directly (before gap filling).
    pub fn direct_matches(&self) -> usize {
        self.assignments.len()
    }
}

/// An interchangeable alignment policy.
pub trait AlignmentStrategy: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Assign images to samples. `trace` is in episode order.
    fn align(&self, trace: &[TimedSample], images: &ImageIndex) -> AlignmentResult;
}

/// Build the strategy selected by `config`.
pub fn strategy_for(config: &AlignConfig) -> Box<dyn AlignmentStrategy> {
    match config.strategy {
        StrategyKind::Nearest => Box::new(NearestWithTolerance::new(config.tolerance_ms)),
        StrategyKind::Proportional => Box::new(ProportionalDistribution),
    }
}

/// Mean and population standard deviation of integer residuals.
///
/// Returns `None` for an empty slice. The spread is measured around the mean,
/// so a constant offset has a standard deviation of exactly zero.
pub fn offset_stats(residuals: &[i64]) -> Option<(f64, f64)> {
    if residuals.is_empty() {
        return None;
    }
    let n = residuals.len() as f64;
    let sum: i128 = residuals.iter().map(|&r| i128::from(r)).sum();
    let mean = sum as f64 / n;
    let variance = residuals
        .iter()
        .map(|&r| {
            let d = r as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    Some((mean, variance.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_stats_constant_residuals() {
        assert_eq!(offset_stats(&[10, 10, 10]), Some((10.0, 0.0)));
    }

    #[test]
    fn test_offset_stats_population_variance() {
        let (mean, std) = offset_stats(&[2, 4, 4, 4, 5, 5, 7, 9]).unwrap();
        assert_eq!(mean, 5.0);
        assert_eq!(std, 2.0);
    }

    #[test]
    fn test_offset_stats_empty() {
        assert_eq!(offset_stats(&[]), None);
    }

    #[test]
    fn test_strategy_for_config() {
        let mut config = AlignConfig::default();
        assert_eq!(strategy_for(&config).name(), "nearest");
        config.strategy = StrategyKind::Proportional;
        assert_eq!(strategy_for(&config).name(), "proportional");
    }
}
