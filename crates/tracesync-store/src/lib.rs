//! TraceSync Store: episode and image-pool persistence
//!
//! This crate owns everything TraceSync reads from or writes to durable
//! storage. The alignment engine only ever talks to the traits defined here,
//! so it never hardcodes a storage location.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: lossless episode round-trips and atomic writes.
//!
//! ## Key Components
//!
//! - `Episode` / `TraceSample`: schema of a recorded demonstration
//! - `ImageSidecar`: raw per-image metadata, parsed later by the index builder
//! - `EpisodeStore` / `ImagePoolSource`: backend-agnostic storage traits
//! - `FsStore`: filesystem backend for the recording tools' directory layouts

mod error;
pub mod fakes;
pub mod fs;
mod schema;
pub mod storage_traits;

pub use error::StorageError;
pub use fs::{read_sidecar_dir, FsLayout, FsStore, DEFAULT_SIDECAR_SUFFIX};
pub use schema::{Episode, EpisodeId, ImageSidecar, TraceSample};
pub use storage_traits::{EpisodeStore, ImagePoolSource, StorageResult, WriteMode};
