//! Per-worker arena memory
//!
//! A worker owns exactly one [`ArenaMemory`] for its whole lifetime and
//! reuses it across batches. The arena bundles the three memory resources a
//! batch touches:
//!
//! - a [`NativeAllocator`] supplying the buffers paged raw partitions live in
//! - a [`BlockFactory`] backing the encoded chunk columns produced at flush
//! - one [`WriteBufferPool`] per downsampled schema
//!
//! The arena is thread-affine and does no internal locking; the batch driver
//! is responsible for marking blocks reclaimable at the end of every batch,
//! on success and failure alike.

/// Native allocator for paged raw partitions
pub mod alloc;
/// Block store for encoded chunk columns
pub mod blocks;
/// Per-schema write buffer pools
pub mod pool;

pub use alloc::{NativeAllocator, NativeBuf};
pub use blocks::BlockFactory;
pub use pool::{ColumnWriteBuffer, WriteBufferPool, WriteBufferSet};

use std::collections::HashMap;

use crate::schema::SchemaRegistry;
use crate::types::SchemaId;

/// Arena sizing knobs
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Rows per write buffer before it is encoded into a chunk
    pub write_buffer_rows: usize,

    /// Buffer sets each schema pool may have outstanding at once
    pub pool_capacity: usize,

    /// Lower bound on the block size
    pub min_block_size: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            write_buffer_rows: 1_000,
            pool_capacity: 256,
            min_block_size: 64 * 1024,
        }
    }
}

/// Arena statistics for monitoring and teardown assertions
#[derive(Debug, Clone, Default)]
pub struct ArenaStats {
    /// Native buffers currently handed out
    pub outstanding_allocations: usize,

    /// Native bytes currently handed out
    pub outstanding_bytes: usize,

    /// Blocks taken since the last reclaim mark
    pub blocks_since_mark: usize,

    /// Write buffer sets currently outstanding across all pools
    pub outstanding_buffer_sets: usize,
}

/// Per-worker bundle of native allocator, block factory and buffer pools
#[derive(Debug)]
pub struct ArenaMemory {
    /// Native allocator for paged raw partitions
    pub allocator: NativeAllocator,

    /// Block store for encoded chunk columns
    pub block_factory: BlockFactory,

    pools: HashMap<SchemaId, WriteBufferPool>,
}

impl ArenaMemory {
    /// Build an arena for the schemas in `registry`
    ///
    /// The block size is twice the largest per-chunk metadata record across
    /// downsample schemas, floored at `config.min_block_size`; one buffer
    /// pool is created per schema that declares a downsample schema.
    pub fn for_registry(registry: &SchemaRegistry, config: &ArenaConfig) -> Self {
        let block_size = config
            .min_block_size
            .max(2 * registry.max_downsample_chunk_meta_size());

        let mut pools = HashMap::new();
        for schema in registry.iter() {
            if let Some(ds) = &schema.downsample {
                pools.insert(
                    schema.id,
                    WriteBufferPool::new(
                        schema.id,
                        ds.schema.clone(),
                        config.write_buffer_rows,
                        config.pool_capacity,
                    ),
                );
            }
        }

        Self {
            allocator: NativeAllocator::new(),
            block_factory: BlockFactory::new(block_size),
            pools,
        }
    }

    /// Write buffer pool for a schema id, when the schema is downsampled
    pub fn pool_mut(&mut self, schema_id: SchemaId) -> Option<&mut WriteBufferPool> {
        self.pools.get_mut(&schema_id)
    }

    /// Snapshot of the arena's resource accounting
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            outstanding_allocations: self.allocator.outstanding_allocations(),
            outstanding_bytes: self.allocator.outstanding_bytes(),
            blocks_since_mark: self.block_factory.blocks_since_mark(),
            outstanding_buffer_sets: self.pools.values().map(WriteBufferPool::outstanding).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        AggregatorSpec, ColumnSpec, ColumnType, DownsampleSpec, DoubleOp, Schema,
    };

    fn registry() -> SchemaRegistry {
        let raw = Schema::new(
            "gauge",
            vec![
                ColumnSpec::new("timestamp", ColumnType::Timestamp),
                ColumnSpec::new("value", ColumnType::Double),
            ],
        )
        .unwrap();
        let ds = DownsampleSpec {
            schema: Schema::new(
                "gauge-ds",
                vec![
                    ColumnSpec::new("timestamp", ColumnType::Timestamp),
                    ColumnSpec::new("sum", ColumnType::Double),
                ],
            )
            .unwrap(),
            aggregators: vec![
                AggregatorSpec::Time { column: 0 },
                AggregatorSpec::Double {
                    op: DoubleOp::Sum,
                    column: 1,
                },
            ],
        };
        let mut reg = SchemaRegistry::new();
        reg.register(1, raw, Some(ds)).unwrap();
        reg
    }

    #[test]
    fn test_arena_setup() {
        let reg = registry();
        let arena = ArenaMemory::for_registry(&reg, &ArenaConfig::default());
        assert_eq!(arena.block_factory.block_size(), 64 * 1024);
        let stats = arena.stats();
        assert_eq!(stats.outstanding_allocations, 0);
        assert_eq!(stats.outstanding_buffer_sets, 0);
    }

    #[test]
    fn test_pool_per_downsampled_schema() {
        let reg = registry();
        let mut arena = ArenaMemory::for_registry(&reg, &ArenaConfig::default());
        assert!(arena.pool_mut(1).is_some());
        assert!(arena.pool_mut(2).is_none());

        let set = arena.pool_mut(1).unwrap().obtain().unwrap();
        assert_eq!(arena.stats().outstanding_buffer_sets, 1);
        arena.pool_mut(1).unwrap().release(set);
        assert_eq!(arena.stats().outstanding_buffer_sets, 0);
    }
}
