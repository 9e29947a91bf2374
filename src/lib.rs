//! Strata Downsampler - Batch downsampler for a columnar time-series store
//!
//! Periodically reads a window of raw chunks for a set of partitions,
//! computes aggregate samples at coarser resolutions (e.g. 5-minute,
//! 1-hour) and writes the resulting chunk sets back to the store under
//! resolution-specific datasets with per-resolution TTLs:
//! - Per-resolution time-window aggregation over columnar chunks
//! - Per-worker off-heap arena with guaranteed release on every exit path
//! - Downsample ingestion, chunk flush and bulk store writes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod downsample;
pub mod error;
pub mod histogram;
pub mod memory;
pub mod partition;
pub mod schema;
pub mod store;
pub mod types;
pub mod vectors;

// Re-export main types
pub use config::DownsamplerConfig;
pub use downsample::{BatchDriver, BatchSummary, DownsamplerSettings};
pub use error::{Error, Result};
pub use types::{DatasetRef, DsResolution, TimeRange};
