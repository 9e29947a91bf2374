//! Batch orchestration
//!
//! One [`BatchDriver`] per worker. A batch pages each raw partition into the
//! arena, downsamples it into per-resolution partitions, collects the
//! flushable chunk sets and writes them to the store, one dataset per
//! resolution. Per-partition errors are logged and skipped; store errors
//! abort the batch. Arena resources are reclaimed on every exit path, in
//! this order: mark blocks reclaimable, free paged partitions, shut down
//! downsample partitions.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tracing::{debug, error, warn};

use crate::downsample::window;
use crate::error::{Error, Result, SchemaError, StoreError};
use crate::memory::{ArenaConfig, ArenaMemory};
use crate::partition::{ChunkSet, DownsamplePartition, PagedRawPartition};
use crate::schema::SchemaRegistry;
use crate::store::{ChunkSink, WriteResponse};
use crate::types::{DatasetRef, DsResolution, TimeRange};

/// Driver settings derived from configuration
#[derive(Debug, Clone)]
pub struct DownsamplerSettings {
    /// Raw dataset the downsample datasets are named after
    pub raw_dataset: String,

    /// Resolutions to produce, each with its TTL in seconds
    pub resolutions: Vec<(DsResolution, u64)>,

    /// How long to wait for each resolution's store acknowledgement
    pub store_write_timeout: Duration,
}

impl DownsamplerSettings {
    /// Validate the settings at construction time
    pub fn validate(&self) -> Result<()> {
        if self.raw_dataset.is_empty() {
            return Err(Error::Configuration("raw dataset name is empty".into()));
        }
        if self.resolutions.is_empty() {
            return Err(Error::Configuration("no downsample resolutions".into()));
        }
        for (i, (res, ttl)) in self.resolutions.iter().enumerate() {
            if *ttl == 0 {
                return Err(Error::Configuration(format!(
                    "resolution {} has no TTL",
                    res
                )));
            }
            if self.resolutions[..i].iter().any(|(r, _)| r == res) {
                return Err(Error::Configuration(format!(
                    "resolution {} listed twice",
                    res
                )));
            }
        }
        if self.store_write_timeout.is_zero() {
            return Err(Error::Configuration("store write timeout is zero".into()));
        }
        Ok(())
    }
}

/// Outcome of one batch
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// Partitions downsampled successfully
    pub partitions_processed: usize,

    /// Partitions skipped on a partition-scoped error
    pub partitions_skipped: usize,

    /// Aggregate rows emitted across all partitions and resolutions
    pub rows_emitted: u64,

    /// Chunk sets acknowledged by the store, per resolution
    pub chunk_sets_written: Vec<(DsResolution, usize)>,
}

/// Batch driver: owns the worker's arena and runs batches against it
pub struct BatchDriver {
    registry: Arc<SchemaRegistry>,
    sink: Arc<dyn ChunkSink>,
    settings: DownsamplerSettings,
    arena: ArenaMemory,
}

impl BatchDriver {
    /// Create a driver, building the worker arena from the registry
    pub fn new(
        registry: Arc<SchemaRegistry>,
        sink: Arc<dyn ChunkSink>,
        settings: DownsamplerSettings,
        arena_config: &ArenaConfig,
    ) -> Result<Self> {
        settings.validate()?;
        let arena = ArenaMemory::for_registry(&registry, arena_config);
        Ok(Self {
            registry,
            sink,
            settings,
            arena,
        })
    }

    /// The worker arena, for monitoring and teardown assertions
    pub fn arena(&self) -> &ArenaMemory {
        &self.arena
    }

    /// Downsample one batch of raw partition blobs over `window`
    ///
    /// Returns the batch summary once every resolution's write has been
    /// acknowledged. The same inputs produce byte-identical chunk sets, so
    /// a failed batch can simply be re-run.
    pub async fn downsample_batch(
        &mut self,
        batch: &[Bytes],
        window: TimeRange,
    ) -> Result<BatchSummary> {
        debug!(
            partitions = batch.len(),
            window_start = window.start,
            window_end = window.end,
            "downsample batch starting"
        );

        let mut per_res: Vec<(DsResolution, Vec<ChunkSet>)> = self
            .settings
            .resolutions
            .iter()
            .map(|(r, _)| (*r, Vec::new()))
            .collect();
        let mut raw_frees: Vec<PagedRawPartition> = Vec::new();
        let mut ds_frees: Vec<DownsamplePartition> = Vec::new();

        let outcome =
            self.run_partitions(batch, window, &mut per_res, &mut raw_frees, &mut ds_frees);
        let outcome = match outcome {
            Ok(mut summary) => match self.persist(per_res).await {
                Ok(written) => {
                    summary.chunk_sets_written = written;
                    Ok(summary)
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        // teardown order matters: blocks first, then paged partitions, then
        // downsample partitions
        self.arena.block_factory.mark_used_blocks_reclaimable();
        for part in raw_frees.iter_mut() {
            part.free(&mut self.arena.allocator);
        }
        for part in ds_frees.iter_mut() {
            if let Some(pool) = self.arena.pool_mut(part.schema_id()) {
                part.shutdown(pool);
            }
        }

        match &outcome {
            Ok(summary) => debug!(
                processed = summary.partitions_processed,
                skipped = summary.partitions_skipped,
                rows = summary.rows_emitted,
                "downsample batch complete"
            ),
            Err(e) => error!(error = %e, "downsample batch failed"),
        }
        outcome
    }

    fn run_partitions(
        &mut self,
        batch: &[Bytes],
        window: TimeRange,
        per_res: &mut [(DsResolution, Vec<ChunkSet>)],
        raw_frees: &mut Vec<PagedRawPartition>,
        ds_frees: &mut Vec<DownsamplePartition>,
    ) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        for blob in batch {
            match self.process_partition(blob, window, per_res, raw_frees, ds_frees) {
                Ok(rows) => {
                    summary.partitions_processed += 1;
                    summary.rows_emitted += rows;
                }
                Err(e) if is_partition_scoped(&e) => {
                    warn!(error = %e, "skipping raw partition");
                    summary.partitions_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }

    fn process_partition(
        &mut self,
        blob: &[u8],
        window: TimeRange,
        per_res: &mut [(DsResolution, Vec<ChunkSet>)],
        raw_frees: &mut Vec<PagedRawPartition>,
        ds_frees: &mut Vec<DownsamplePartition>,
    ) -> Result<u64> {
        let paged = PagedRawPartition::page(blob, &mut self.arena.allocator)?;
        // paged memory is owned by the teardown list from here on
        raw_frees.push(paged);
        let paged = &raw_frees[raw_frees.len() - 1];

        let schema_id = paged.schema_id();
        let schema = self
            .registry
            .get(schema_id)
            .cloned()
            .ok_or(SchemaError::UnknownId(schema_id))?;
        let ds = schema
            .downsample
            .as_ref()
            .ok_or_else(|| SchemaError::NoDownsampleSchema {
                id: schema_id,
                name: schema.schema.name.clone(),
            })?;

        let key = Bytes::copy_from_slice(paged.partition_key());
        let mut outs: Vec<(DsResolution, DownsamplePartition)> =
            Vec::with_capacity(self.settings.resolutions.len());
        for (res, _ttl) in &self.settings.resolutions {
            let pool = self
                .arena
                .pool_mut(schema_id)
                .ok_or(SchemaError::UnknownId(schema_id))?;
            match DownsamplePartition::new(schema_id, key.clone(), window.start, pool) {
                Ok(part) => outs.push((*res, part)),
                Err(e) => {
                    ds_frees.extend(outs.into_iter().map(|(_, p)| p));
                    return Err(e);
                }
            }
        }

        let run = window::downsample_partition(
            paged,
            &ds.aggregators,
            &mut outs,
            window,
            &mut self.arena.block_factory,
        );
        match run {
            Ok(rows) => {
                for (res, mut part) in outs {
                    part.switch_buffers();
                    let chunks = part.make_flush_chunks(&mut self.arena.block_factory);
                    if let Some((_, list)) = per_res.iter_mut().find(|(r, _)| *r == res) {
                        list.extend(chunks);
                    }
                    ds_frees.push(part);
                }
                Ok(rows)
            }
            Err(e) => {
                ds_frees.extend(outs.into_iter().map(|(_, p)| p));
                Err(e)
            }
        }
    }

    /// Write each resolution's chunk sets to its dataset and await all acks
    async fn persist(
        &self,
        per_res: Vec<(DsResolution, Vec<ChunkSet>)>,
    ) -> Result<Vec<(DsResolution, usize)>> {
        let timeout = self.settings.store_write_timeout;
        let mut writes = Vec::with_capacity(per_res.len());
        for (res, chunks) in per_res {
            let dataset = DatasetRef::downsample_of(&self.settings.raw_dataset, res);
            let ttl_secs = self.ttl_for(res);
            let sink = Arc::clone(&self.sink);
            let count = chunks.len();
            writes.push(async move {
                match tokio::time::timeout(timeout, sink.write_chunks(&dataset, chunks, ttl_secs))
                    .await
                {
                    Ok(WriteResponse::Success) => {
                        debug!(
                            dataset = %dataset,
                            chunk_sets = count,
                            ttl_secs,
                            "resolution write acknowledged"
                        );
                        Ok((res, count))
                    }
                    Ok(WriteResponse::Failure(message)) => {
                        Err(Error::Store(StoreError::WriteFailed {
                            dataset: dataset.to_string(),
                            message,
                        }))
                    }
                    Err(_) => Err(Error::Store(StoreError::Timeout {
                        dataset: dataset.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })),
                }
            });
        }

        let mut written = Vec::with_capacity(writes.len());
        for result in join_all(writes).await {
            written.push(result?);
        }
        Ok(written)
    }

    fn ttl_for(&self, res: DsResolution) -> u64 {
        self.settings
            .resolutions
            .iter()
            .find(|(r, _)| *r == res)
            .map(|(_, ttl)| *ttl)
            .unwrap_or_default()
    }
}

/// Whether an error is isolated to one partition or fatal for the batch
fn is_partition_scoped(e: &Error) -> bool {
    matches!(
        e,
        Error::Schema(_) | Error::RawFormat(_) | Error::Aggregate(_) | Error::OutOfOrderIngest { .. }
    )
}
