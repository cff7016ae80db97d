//! TraceSync Core Library
//!
//! Temporal alignment of robot demonstration traces with the camera images
//! captured alongside them. Each episode's image pool is indexed by capture
//! time, an alignment strategy labels trace samples with images, gaps are
//! carried forward, and the labelled episode is written back through the
//! storage traits of `tracesync-store`.
//!
//! ## Layers
//!
//! - Layer 1: `index` and `trace` (inputs to alignment)
//! - Layer 2: `align` strategies and `gap_fill` (pure, per episode)
//! - Layer 3: `batch` runner and `summary` (I/O boundary, aggregation)
//! - Layer 4: `reporting`, `obs`, `metrics`, `telemetry`

pub mod align;
pub mod batch;
pub mod config;
pub mod error;
pub mod gap_fill;
pub mod index;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod summary;
pub mod telemetry;
pub mod trace;

/// Crate version, recorded in persisted summaries.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use align::{
    offset_stats, strategy_for, AlignmentResult, AlignmentStrategy, NearestWithTolerance,
    ProportionalDistribution,
};
pub use batch::{
    align, align_episode, align_in_memory, AlignmentReport, BatchRunner, CancelFlag,
    EpisodeOutcome, EpisodeReport,
};
pub use config::{AlignConfig, StrategyKind, DEFAULT_TOLERANCE_MS};
pub use error::{AlignError, Result};
pub use gap_fill::{apply_images, direct_only, fill_gaps};
pub use index::{build_index, parse_sidecar, ImageIndex, ImageRecord, IndexBuild, IndexWarning, WarningKind};
pub use reporting::{render_summary_text, write_summary_json, SummaryArtifact};
pub use summary::{BatchSummary, ClassStats, EpisodeClass, EpisodeFailure, OffsetDistribution};
pub use trace::{TimedSample, TraceView};

pub use tracesync_store::{
    Episode, EpisodeId, EpisodeStore, FsLayout, FsStore, ImagePoolSource, ImageSidecar,
    StorageError, TraceSample, WriteMode,
};
