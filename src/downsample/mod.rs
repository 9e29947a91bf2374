//! The downsampling pipeline
//!
//! Three layers, innermost first:
//!
//! - [`aggregator`]: reduce one `[start_row, end_row]` window of one chunk
//!   to one output value
//! - [`window`]: iterate chunks × resolutions × aligned periods for one raw
//!   partition, emitting aggregate rows
//! - [`driver`]: orchestrate a batch: page partitions, run the window
//!   iteration, collect chunk sets per resolution, persist, tear down

/// Typed reducers over a row range
pub mod aggregator;
/// Batch orchestration
pub mod driver;
/// Window iteration over one raw partition
pub mod window;

pub use driver::{BatchDriver, BatchSummary, DownsamplerSettings};
