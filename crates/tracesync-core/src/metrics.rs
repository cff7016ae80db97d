//! Global atomic counters for alignment observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a batch).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters; no allocations, no locking.
pub struct Metrics {
    episodes_aligned: AtomicU64,
    episodes_failed: AtomicU64,
    images_indexed: AtomicU64,
    image_warnings: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            episodes_aligned: AtomicU64::new(0),
            episodes_failed: AtomicU64::new(0),
            images_indexed: AtomicU64::new(0),
            image_warnings: AtomicU64::new(0),
        }
    }

    /// Count one episode that was aligned and written back.
    pub fn inc_episodes_aligned(&self) {
        self.episodes_aligned.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "episodes_aligned", "counter incremented");
    }

    /// Count one episode that could not be read, aligned or written.
    pub fn inc_episodes_failed(&self) {
        self.episodes_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "episodes_failed", "counter incremented");
    }

    /// Add the size of one episode's image index.
    pub fn add_images_indexed(&self, n: u64) {
        self.images_indexed.fetch_add(n, Ordering::Relaxed);
    }

    /// Add the number of malformed sidecars skipped for one episode.
    pub fn add_image_warnings(&self, n: u64) {
        self.image_warnings.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            episodes_aligned = self.episodes_aligned(),
            episodes_failed = self.episodes_failed(),
            images_indexed = self.images_indexed(),
            image_warnings = self.image_warnings(),
        );
    }

    pub fn episodes_aligned(&self) -> u64 {
        self.episodes_aligned.load(Ordering::Relaxed)
    }

    pub fn episodes_failed(&self) -> u64 {
        self.episodes_failed.load(Ordering::Relaxed)
    }

    pub fn images_indexed(&self) -> u64 {
        self.images_indexed.load(Ordering::Relaxed)
    }

    pub fn image_warnings(&self) -> u64 {
        self.image_warnings.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.episodes_aligned.store(0, Ordering::Relaxed);
        self.episodes_failed.store(0, Ordering::Relaxed);
        self.images_indexed.store(0, Ordering::Relaxed);
        self.image_warnings.store(0, Ordering::Relaxed);
    }
}
