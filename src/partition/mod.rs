//! Partition adapters: paged raw input and downsample output
//!
//! The raw side pages store blobs into native memory for zero-copy column
//! reads; the output side buffers aggregate rows and turns them into
//! flushable chunk sets in the same columnar layout.

/// Downsample partitions and flushable chunk sets
pub mod downsample;
/// Paged raw partitions
pub mod paged;

pub use downsample::{ChunkSet, DownsamplePartition};
pub use paged::{ChunkInfo, PagedRawPartition, RawChunkData, RawPartData};
