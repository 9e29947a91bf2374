//! Fixed-size block store backing encoded chunk columns
//!
//! Vectors produced during flush are carved out of pooled blocks instead of
//! individually allocated. A block is a `BytesMut` of the factory's block
//! size; carving freezes the written prefix into a refcounted [`Bytes`] and
//! keeps the remaining capacity for the next vector. Vectors larger than a
//! block get a dedicated overflow block.
//!
//! The batch driver calls [`BlockFactory::mark_used_blocks_reclaimable`] at
//! batch end on every exit path; block memory itself returns to the system
//! once the last chunk set referencing it is dropped.

use bytes::{Bytes, BytesMut};

/// Block store for encoded chunk columns
///
/// Thread-affine: one factory per worker arena, no internal locking.
#[derive(Debug)]
pub struct BlockFactory {
    block_size: usize,
    current: Option<BytesMut>,
    blocks_since_mark: usize,
    total_blocks: u64,
}

impl BlockFactory {
    /// Create a factory handing out blocks of `block_size` bytes
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            current: None,
            blocks_since_mark: 0,
            total_blocks: 0,
        }
    }

    /// Configured block size
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Copy `data` into block memory and return it as an immutable slice
    ///
    /// Takes a fresh block when the current one has insufficient remaining
    /// capacity; data larger than the block size gets an overflow block of
    /// exactly its length.
    pub fn carve(&mut self, data: &[u8]) -> Bytes {
        let need = data.len();
        let need_new_block = self
            .current
            .as_ref()
            .map_or(true, |block| block.capacity() < need);
        if need_new_block {
            self.current = Some(BytesMut::with_capacity(self.block_size.max(need)));
            self.blocks_since_mark += 1;
            self.total_blocks += 1;
        }

        let block = self.current.as_mut().expect("block ensured above");
        block.extend_from_slice(data);
        block.split().freeze()
    }

    /// Return all blocks handed out since the last mark
    ///
    /// The factory relinquishes its partially-filled block; carved slices
    /// stay valid until their owners drop them.
    pub fn mark_used_blocks_reclaimable(&mut self) {
        self.current = None;
        self.blocks_since_mark = 0;
    }

    /// Blocks taken since the last reclaim mark
    pub fn blocks_since_mark(&self) -> usize {
        self.blocks_since_mark
    }

    /// Total blocks taken over the factory's lifetime
    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }
}
