//! Downsample partitions and flushable chunk sets
//!
//! A [`DownsamplePartition`] receives the aggregate rows produced for one
//! raw partition at one resolution. Rows append into a write buffer set from
//! the schema's pool; a full set is encoded into block-backed column vectors
//! and kept as a sealed chunk. At batch end the driver freezes the remaining
//! buffers, collects the flushable [`ChunkSet`]s and shuts the partition
//! down, returning its buffers to the pool.

use bytes::Bytes;

use crate::error::Error;
use crate::memory::{BlockFactory, WriteBufferPool, WriteBufferSet};
use crate::types::SchemaId;
use crate::vectors::ColumnValue;

/// A flushable, immutable chunk in the store's canonical columnar layout
#[derive(Debug, Clone)]
pub struct ChunkSet {
    /// Key of the partition the chunk belongs to
    pub partition_key: Bytes,
    /// First row timestamp
    pub start_time: i64,
    /// Last row timestamp
    pub end_time: i64,
    /// Number of rows
    pub num_rows: u32,
    /// Ingestion time stamped on every row of the batch
    pub ingestion_time: i64,
    /// Column vectors in downsample schema order
    pub columns: Vec<Bytes>,
}

/// In-memory partition accepting aggregate rows for one resolution
#[derive(Debug)]
pub struct DownsamplePartition {
    partition_key: Bytes,
    schema_id: SchemaId,
    ingestion_time: i64,
    current: Option<WriteBufferSet>,
    frozen: Vec<WriteBufferSet>,
    spent: Vec<WriteBufferSet>,
    sealed: Vec<ChunkSet>,
    last_ts: Option<i64>,
    scratch: Vec<u8>,
}

impl DownsamplePartition {
    /// Create a partition, taking its first write buffer set from `pool`
    ///
    /// `schema_id` is the raw schema id the pool is keyed under;
    /// `ingestion_time` is stamped on every chunk set the partition emits.
    pub fn new(
        schema_id: SchemaId,
        partition_key: Bytes,
        ingestion_time: i64,
        pool: &mut WriteBufferPool,
    ) -> Result<Self, Error> {
        let current = pool.obtain()?;
        Ok(Self {
            partition_key,
            schema_id,
            ingestion_time,
            current: Some(current),
            frozen: Vec::new(),
            spent: Vec::new(),
            sealed: Vec::new(),
            last_ts: None,
            scratch: Vec::new(),
        })
    }

    /// Raw schema id the partition's buffers are pooled under
    pub fn schema_id(&self) -> SchemaId {
        self.schema_id
    }

    /// Ingestion time stamped on emitted chunk sets
    pub fn ingestion_time(&self) -> i64 {
        self.ingestion_time
    }

    /// Append one aggregate row at timestamp `ts`
    ///
    /// Timestamps must be strictly increasing. A full buffer set is encoded
    /// into a sealed chunk backed by `factory` blocks and cleared for the
    /// next rows.
    ///
    /// # Panics
    ///
    /// Panics when called after [`switch_buffers`](Self::switch_buffers).
    pub fn ingest(
        &mut self,
        ts: i64,
        row: &[ColumnValue],
        factory: &mut BlockFactory,
    ) -> Result<(), Error> {
        if let Some(last) = self.last_ts {
            if ts <= last {
                return Err(Error::OutOfOrderIngest { ts, last });
            }
        }

        let set = self
            .current
            .as_mut()
            .expect("ingest after switch_buffers");
        set.push_row(row);
        self.last_ts = Some(ts);

        if set.is_full() {
            let chunk = encode_chunk(
                &self.partition_key,
                self.ingestion_time,
                set,
                factory,
                &mut self.scratch,
            );
            self.sealed.push(chunk);
            set.clear();
        }
        Ok(())
    }

    /// Freeze the current write buffers for flushing
    ///
    /// After the switch the partition accepts no further rows.
    pub fn switch_buffers(&mut self) {
        if let Some(set) = self.current.take() {
            if set.is_empty() {
                self.spent.push(set);
            } else {
                self.frozen.push(set);
            }
        }
    }

    /// Collect the flushable chunk sets, encoding frozen buffers
    ///
    /// Sealed chunks come first, then one chunk per non-empty frozen buffer
    /// set, preserving ingestion order.
    pub fn make_flush_chunks(&mut self, factory: &mut BlockFactory) -> Vec<ChunkSet> {
        let mut chunks = std::mem::take(&mut self.sealed);
        for set in self.frozen.drain(..) {
            chunks.push(encode_chunk(
                &self.partition_key,
                self.ingestion_time,
                &set,
                factory,
                &mut self.scratch,
            ));
            self.spent.push(set);
        }
        chunks
    }

    /// Release all write buffers back to the pool and drop block references
    pub fn shutdown(&mut self, pool: &mut WriteBufferPool) {
        for set in self
            .current
            .take()
            .into_iter()
            .chain(self.frozen.drain(..))
            .chain(self.spent.drain(..))
        {
            pool.release(set);
        }
        self.sealed.clear();
    }
}

fn encode_chunk(
    partition_key: &Bytes,
    ingestion_time: i64,
    set: &WriteBufferSet,
    factory: &mut BlockFactory,
    scratch: &mut Vec<u8>,
) -> ChunkSet {
    let (start_time, end_time) = set
        .time_bounds()
        .expect("encode_chunk called on an empty buffer set");

    let mut columns = Vec::with_capacity(set.columns().len());
    for col in set.columns() {
        scratch.clear();
        col.encode_into(scratch);
        columns.push(factory.carve(scratch));
    }

    ChunkSet {
        partition_key: partition_key.clone(),
        start_time,
        end_time,
        num_rows: set.num_rows() as u32,
        ingestion_time,
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, ColumnType, Schema};
    use crate::vectors::{DoubleVector, LongVector};

    fn pool() -> WriteBufferPool {
        let schema = Schema::new(
            "gauge-ds",
            vec![
                ColumnSpec::new("timestamp", ColumnType::Timestamp),
                ColumnSpec::new("sum", ColumnType::Double),
            ],
        )
        .unwrap();
        WriteBufferPool::new(1, schema, 2, 8)
    }

    fn row(ts: i64, v: f64) -> [ColumnValue; 2] {
        [ColumnValue::Timestamp(ts), ColumnValue::Double(v)]
    }

    #[test]
    fn test_ingest_and_flush() {
        let mut pool = pool();
        let mut factory = BlockFactory::new(1024);
        let mut part =
            DownsamplePartition::new(1, Bytes::from_static(b"key"), 500, &mut pool).unwrap();

        part.ingest(1_000, &row(1_000, 1.0), &mut factory).unwrap();
        part.ingest(2_000, &row(2_000, 2.0), &mut factory).unwrap();
        // buffer capacity is 2 rows, so a sealed chunk exists already
        part.ingest(3_000, &row(3_000, 3.0), &mut factory).unwrap();

        part.switch_buffers();
        let chunks = part.make_flush_chunks(&mut factory);
        assert_eq!(chunks.len(), 2);

        assert_eq!(chunks[0].start_time, 1_000);
        assert_eq!(chunks[0].end_time, 2_000);
        assert_eq!(chunks[0].num_rows, 2);
        assert_eq!(chunks[0].ingestion_time, 500);

        assert_eq!(chunks[1].start_time, 3_000);
        assert_eq!(chunks[1].num_rows, 1);

        let ts = LongVector::wrap(&chunks[0].columns[0]).unwrap();
        assert_eq!(ts.get(0), 1_000);
        let vals = DoubleVector::wrap(&chunks[1].columns[1]).unwrap();
        assert_eq!(vals.get(0), 3.0);

        part.shutdown(&mut pool);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_monotonicity_enforced() {
        let mut pool = pool();
        let mut factory = BlockFactory::new(1024);
        let mut part =
            DownsamplePartition::new(1, Bytes::from_static(b"key"), 0, &mut pool).unwrap();

        part.ingest(2_000, &row(2_000, 1.0), &mut factory).unwrap();
        assert!(matches!(
            part.ingest(2_000, &row(2_000, 1.0), &mut factory),
            Err(Error::OutOfOrderIngest {
                ts: 2_000,
                last: 2_000
            })
        ));
        part.shutdown(&mut pool);
    }

    #[test]
    fn test_empty_partition_flushes_nothing() {
        let mut pool = pool();
        let mut factory = BlockFactory::new(1024);
        let mut part =
            DownsamplePartition::new(1, Bytes::from_static(b"key"), 0, &mut pool).unwrap();

        part.switch_buffers();
        assert!(part.make_flush_chunks(&mut factory).is_empty());
        part.shutdown(&mut pool);
        assert_eq!(pool.outstanding(), 0);
    }
}
