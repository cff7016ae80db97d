//! Proportional-distribution alignment.
//!
//! The image clock and the trace clock are not assumed to agree. Instead,
//! each image is placed at the same relative position within the trace's
//! time span as it holds within the image span, then snapped to the closest
//! sample. The realised `image_ts - sample_ts` residuals measure the clock
//! offset and jitter between the two streams.

use super::{offset_stats, AlignmentResult, AlignmentStrategy};
use crate::index::ImageIndex;
use crate::trace::TimedSample;

/// Relative position given to every image when all images share one timestamp.
const SINGLE_INSTANT_POSITION: f64 = 0.5;

/// Every image is assigned to some sample; no tolerance is applied. When
/// several images land on the same sample, the latest image wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProportionalDistribution;

impl AlignmentStrategy for ProportionalDistribution {
    fn name(&self) -> &'static str {
        "proportional"
    }

    fn align(&self, trace: &[TimedSample], images: &ImageIndex) -> AlignmentResult {
        let lookup = SortedTrace::new(trace);
        let (Some((trace_min, trace_max)), Some((image_min, image_max))) =
            (lookup.span(), images.span())
        else {
            return AlignmentResult::default();
        };

        let trace_duration = trace_max.abs_diff(trace_min) as f64;
        let image_duration = image_max.abs_diff(image_min);

        let mut result = AlignmentResult::default();
        let mut residuals = Vec::with_capacity(images.len());
        for (image_ts, identifier) in images.iter() {
            let relative = if image_duration > 0 {
                image_ts.abs_diff(image_min) as f64 / image_duration as f64
            } else {
                SINGLE_INSTANT_POSITION
            };
            let target = trace_min as f64 + relative * trace_duration;
            let sample = lookup.closest(target);

            result
                .assignments
                .insert(sample.position, identifier.to_string());
            residuals.push(image_ts.saturating_sub(sample.timestamp_ms));
        }

        if let Some((mean, stddev)) = offset_stats(&residuals) {
            result.mean_offset_ms = Some(mean);
            result.stddev_offset_ms = Some(stddev);
        }
        result
    }
}

/// Timestamped samples ordered by `(timestamp, position)` for closest lookups.
struct SortedTrace {
    samples: Vec<TimedSample>,
}

impl SortedTrace {
    fn new(trace: &[TimedSample]) -> Self {
        let mut samples = trace.to_vec();
        samples.sort_by_key(|s| (s.timestamp_ms, s.position));
        Self { samples }
    }

    fn span(&self) -> Option<(i64, i64)> {
        Some((
            self.samples.first()?.timestamp_ms,
            self.samples.last()?.timestamp_ms,
        ))
    }

    /// Sample whose timestamp is closest to `target`.
    ///
    /// Ties go to the earlier timestamp, and among samples sharing a
    /// timestamp to the lowest position. Must not be called on an empty trace.
    fn closest(&self, target: f64) -> TimedSample {
        let after = self
            .samples
            .partition_point(|s| (s.timestamp_ms as f64) < target);
        let before = after.checked_sub(1).map(|i| {
            let ts = self.samples[i].timestamp_ms;
            self.samples.partition_point(|s| s.timestamp_ms < ts)
        });

        match (before, self.samples.get(after)) {
            (Some(b), Some(a)) => {
                let below = self.samples[b];
                if target - below.timestamp_ms as f64 <= a.timestamp_ms as f64 - target {
                    below
                } else {
                    *a
                }
            }
            (Some(b), None) => self.samples[b],
            (None, Some(a)) => *a,
            (None, None) => unreachable!("closest() on an empty trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(stamps: &[i64]) -> Vec<TimedSample> {
        stamps
            .iter()
            .enumerate()
            .map(|(position, &timestamp_ms)| TimedSample {
                position,
                timestamp_ms,
            })
            .collect()
    }

    fn index(entries: &[(i64, &str)]) -> ImageIndex {
        entries
            .iter()
            .map(|(ts, id)| (*ts, id.to_string()))
            .collect()
    }

    #[test]
    fn test_even_spread_with_constant_offset() {
        let result = ProportionalDistribution.align(
            &timed(&[0, 250, 500, 750, 1000]),
            &index(&[(10, "a.jpg"), (510, "b.jpg"), (1010, "c.jpg")]),
        );
        let assigned: Vec<(usize, &str)> = result
            .assignments
            .iter()
            .map(|(p, id)| (*p, id.as_str()))
            .collect();
        assert_eq!(assigned, vec![(0, "a.jpg"), (2, "b.jpg"), (4, "c.jpg")]);
        assert_eq!(result.mean_offset_ms, Some(10.0));
        assert_eq!(result.stddev_offset_ms, Some(0.0));
    }

    #[test]
    fn test_different_clock_bases() {
        // Image clock runs ~1.7e12 ms ahead of a trace clock starting at zero.
        let base = 1_721_639_400_000;
        let result = ProportionalDistribution.align(
            &timed(&[0, 100, 200]),
            &index(&[(base, "a.jpg"), (base + 200, "b.jpg")]),
        );
        assert_eq!(result.assignments.get(&0).map(String::as_str), Some("a.jpg"));
        assert_eq!(result.assignments.get(&2).map(String::as_str), Some("b.jpg"));
        assert_eq!(result.mean_offset_ms, Some(base as f64));
        assert_eq!(result.stddev_offset_ms, Some(0.0));
    }

    #[test]
    fn test_single_image_goes_to_trace_midpoint() {
        let result = ProportionalDistribution.align(
            &timed(&[0, 400, 600, 1000]),
            &index(&[(5_000, "only.jpg")]),
        );
        // Target 500 is equidistant from 400 and 600; the earlier sample wins.
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments.get(&1).map(String::as_str), Some("only.jpg"));
        assert_eq!(result.mean_offset_ms, Some(4_600.0));
        assert_eq!(result.stddev_offset_ms, Some(0.0));
    }

    #[test]
    fn test_collisions_keep_latest_image() {
        // Three images crowd into a two-sample trace.
        let result = ProportionalDistribution.align(
            &timed(&[0, 1000]),
            &index(&[(0, "a.jpg"), (100, "b.jpg"), (1000, "c.jpg")]),
        );
        assert_eq!(result.assignments.get(&0).map(String::as_str), Some("b.jpg"));
        assert_eq!(result.assignments.get(&1).map(String::as_str), Some("c.jpg"));
        // Residuals 0, 100, 0 are all counted, including the overwritten pair.
        let mean = result.mean_offset_ms.unwrap();
        assert!((mean - 100.0 / 3.0).abs() < 1e-9);
        assert!(result.stddev_offset_ms.unwrap() > 0.0);
    }

    #[test]
    fn test_duplicate_trace_timestamps_pick_lowest_position() {
        let result = ProportionalDistribution.align(
            &timed(&[0, 0, 10, 10]),
            &index(&[(0, "a.jpg"), (10, "b.jpg")]),
        );
        assert_eq!(result.assignments.get(&0).map(String::as_str), Some("a.jpg"));
        assert_eq!(result.assignments.get(&2).map(String::as_str), Some("b.jpg"));
    }

    #[test]
    fn test_unsorted_trace_positions_are_respected() {
        let trace = vec![
            TimedSample { position: 0, timestamp_ms: 900 },
            TimedSample { position: 3, timestamp_ms: 100 },
        ];
        let result = ProportionalDistribution.align(&trace, &index(&[(0, "a.jpg"), (8, "b.jpg")]));
        assert_eq!(result.assignments.get(&3).map(String::as_str), Some("a.jpg"));
        assert_eq!(result.assignments.get(&0).map(String::as_str), Some("b.jpg"));
    }

    #[test]
    fn test_empty_inputs_give_empty_result() {
        let empty = ProportionalDistribution.align(&[], &index(&[(0, "a.jpg")]));
        assert_eq!(empty, AlignmentResult::default());

        let no_images = ProportionalDistribution.align(&timed(&[0, 1]), &ImageIndex::new());
        assert!(no_images.assignments.is_empty());
        assert_eq!(no_images.mean_offset_ms, None);
        assert_eq!(no_images.stddev_offset_ms, None);
    }
}
