//! Nearest-with-tolerance alignment.

use super::{AlignmentResult, AlignmentStrategy};
use crate::index::ImageIndex;
use crate::trace::TimedSample;

/// Each sample independently takes the closest image, if it is within
/// `tolerance_ms`. One image may label many samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearestWithTolerance {
    pub tolerance_ms: u64,
}

impl NearestWithTolerance {
    pub fn new(tolerance_ms: u64) -> Self {
        Self { tolerance_ms }
    }
}

impl AlignmentStrategy for NearestWithTolerance {
    fn name(&self) -> &'static str {
        "nearest"
    }

    fn align(&self, trace: &[TimedSample], images: &ImageIndex) -> AlignmentResult {
        let mut result = AlignmentResult::default();
        for sample in trace {
            let Some((image_ts, identifier)) = images.nearest(sample.timestamp_ms) else {
                break;
            };
            let diff = sample.timestamp_ms.abs_diff(image_ts);
            if diff <= self.tolerance_ms {
                result
                    .assignments
                    .insert(sample.position, identifier.to_string());
            } else {
                tracing::trace!(
                    position = sample.position,
                    timestamp_ms = sample.timestamp_ms,
                    diff_ms = diff,
                    "no image within tolerance"
                );
            }
        }
        result
    }
}
