//! Window iteration over one raw partition
//!
//! Walks every chunk of a paged partition once per resolution, locates the
//! row range of each aligned period by binary search on the timestamp
//! vector, runs the schema's aggregators over the range and ingests the
//! resulting row into the resolution's downsample partition.
//!
//! Periods are left-open, right-closed: period `k` at resolution `R` covers
//! `(k*R, (k+1)*R]` and is emitted under its closing boundary `(k+1)*R`. A
//! period is emitted only when that boundary falls inside the batch window,
//! so a period straddling two batch windows is owned by exactly one of them,
//! and only when it holds at least one raw row.

use tracing::trace;

use crate::downsample::aggregator::{new_row, reduce_into};
use crate::error::Error;
use crate::memory::BlockFactory;
use crate::partition::{DownsamplePartition, PagedRawPartition};
use crate::schema::AggregatorSpec;
use crate::types::{DsResolution, TimeRange};

/// Downsample one raw partition into the per-resolution partitions
///
/// `window` is the batch's user time window; every ingested row carries the
/// period end as its timestamp. Returns the number of aggregate rows
/// emitted across all resolutions.
pub fn downsample_partition(
    part: &PagedRawPartition,
    aggs: &[AggregatorSpec],
    outs: &mut [(DsResolution, DownsamplePartition)],
    window: TimeRange,
    factory: &mut BlockFactory,
) -> Result<u64, Error> {
    // one reusable row across every window of this partition
    let mut row = new_row(aggs);
    let mut rows_emitted = 0u64;

    for chunk in part.chunk_infos() {
        let timestamps = chunk.timestamps()?;

        for (resolution, ds_part) in outs.iter_mut() {
            let r_ms = resolution.as_millis();
            // first period whose half-open interval contains the chunk start
            let mut p_start = ((chunk.start_time - 1) / r_ms) * r_ms + 1;
            let mut p_end = p_start + r_ms - 1;

            while p_start <= chunk.end_time {
                if window.contains(p_end) {
                    let start_row = timestamps.first_at_or_after(p_start);
                    if let Some(end_row) = timestamps.last_at_or_before(p_end) {
                        let end_row = end_row.min(chunk.num_rows - 1);
                        if start_row <= end_row {
                            for (slot, agg) in row.iter_mut().zip(aggs) {
                                reduce_into(agg, &chunk, start_row, end_row, p_end, slot)?;
                            }
                            ds_part.ingest(p_end, &row, factory)?;
                            rows_emitted += 1;
                        }
                    }
                }
                p_start += r_ms;
                p_end += r_ms;
            }
        }
    }

    trace!(
        chunks = part.num_chunks(),
        rows = rows_emitted,
        "partition downsampled"
    );
    Ok(rows_emitted)
}
