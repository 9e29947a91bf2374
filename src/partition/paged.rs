//! Paged raw partitions
//!
//! A raw partition arrives as an opaque blob read back from the long-term
//! store. [`PagedRawPartition`] copies the blob into a native buffer from the
//! arena's allocator and parses a chunk directory over it, so column readers
//! borrow straight from the paged memory with no further copies.
//!
//! # Blob layout (little-endian)
//!
//! ```text
//! [key_len: u16][key bytes]                   key_len >= 4, key[0..4] = schema id (BE)
//! [num_chunks: u16]
//! per chunk:
//!   [start_time: i64][end_time: i64][num_rows: u32][num_cols: u16]
//!   per column: [vec_len: u32][vector bytes]
//! ```
//!
//! Chunks must be ordered by start time and non-overlapping; every length
//! field is validated against the remaining blob before it is trusted.

use std::ops::Range;

use crate::error::RawFormatError;
use crate::memory::{NativeAllocator, NativeBuf};
use crate::types::{schema_id_of_key, SchemaId, SCHEMA_ID_PREFIX_LEN};
use crate::vectors::LongVector;

/// Parsed directory entry for one chunk
#[derive(Debug)]
struct ChunkDir {
    start_time: i64,
    end_time: i64,
    num_rows: u32,
    cols: Vec<Range<usize>>,
}

/// Read view over one chunk of a paged partition
#[derive(Debug, Clone, Copy)]
pub struct ChunkInfo<'a> {
    /// First timestamp in the chunk
    pub start_time: i64,
    /// Last timestamp in the chunk
    pub end_time: i64,
    /// Number of rows
    pub num_rows: u32,
    data: &'a [u8],
    cols: &'a [Range<usize>],
}

impl<'a> ChunkInfo<'a> {
    /// Number of column vectors
    pub fn num_columns(&self) -> usize {
        self.cols.len()
    }

    /// Raw bytes of column vector `i`
    pub fn column(&self, i: usize) -> Option<&'a [u8]> {
        self.cols.get(i).map(|r| &self.data[r.clone()])
    }

    /// Timestamp reader over column 0
    pub fn timestamps(&self) -> Result<LongVector<'a>, RawFormatError> {
        let col = self
            .column(0)
            .ok_or(RawFormatError::Truncated("timestamp column"))?;
        LongVector::wrap(col)
    }
}

/// A raw partition paged into arena-owned native memory
#[derive(Debug)]
pub struct PagedRawPartition {
    buf: Option<NativeBuf>,
    key: Range<usize>,
    schema_id: SchemaId,
    chunks: Vec<ChunkDir>,
}

/// Cursor over the blob with truncation checks on every read
struct BlobReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BlobReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<Range<usize>, RawFormatError> {
        if self.data.len() - self.pos < n {
            return Err(RawFormatError::Truncated(what));
        }
        let range = self.pos..self.pos + n;
        self.pos += n;
        Ok(range)
    }

    fn read_u16(&mut self, what: &'static str) -> Result<u16, RawFormatError> {
        let r = self.take(2, what)?;
        Ok(u16::from_le_bytes([self.data[r.start], self.data[r.start + 1]]))
    }

    fn read_u32(&mut self, what: &'static str) -> Result<u32, RawFormatError> {
        let r = self.take(4, what)?;
        Ok(u32::from_le_bytes(
            self.data[r].try_into().expect("slice is 4 bytes"),
        ))
    }

    fn read_i64(&mut self, what: &'static str) -> Result<i64, RawFormatError> {
        let r = self.take(8, what)?;
        Ok(i64::from_le_bytes(
            self.data[r].try_into().expect("slice is 8 bytes"),
        ))
    }
}

impl PagedRawPartition {
    /// Page a raw partition blob into native memory and parse its directory
    pub fn page(
        blob: &[u8],
        allocator: &mut NativeAllocator,
    ) -> Result<Self, crate::error::Error> {
        let (key, schema_id, chunks) = Self::parse(blob)?;

        let mut buf = allocator.alloc(blob.len())?;
        buf.as_mut_slice().copy_from_slice(blob);

        Ok(Self {
            buf: Some(buf),
            key,
            schema_id,
            chunks,
        })
    }

    fn parse(blob: &[u8]) -> Result<(Range<usize>, SchemaId, Vec<ChunkDir>), RawFormatError> {
        let mut r = BlobReader::new(blob);

        let key_len = r.read_u16("partition key length")? as usize;
        if key_len < SCHEMA_ID_PREFIX_LEN {
            return Err(RawFormatError::KeyTooShort(key_len));
        }
        let key = r.take(key_len, "partition key")?;
        let schema_id = schema_id_of_key(&blob[key.clone()])?;

        let num_chunks = r.read_u16("chunk count")?;
        let mut chunks = Vec::with_capacity(num_chunks as usize);
        let mut prev_end = i64::MIN;
        for _ in 0..num_chunks {
            let start_time = r.read_i64("chunk start time")?;
            let end_time = r.read_i64("chunk end time")?;
            if start_time > end_time {
                return Err(RawFormatError::InvertedTimeRange {
                    start: start_time,
                    end: end_time,
                });
            }
            if start_time <= prev_end {
                return Err(RawFormatError::ChunkOutOfOrder {
                    start: start_time,
                    prev_end,
                });
            }
            prev_end = end_time;

            let num_rows = r.read_u32("chunk row count")?;
            if num_rows == 0 {
                return Err(RawFormatError::EmptyChunk);
            }

            let num_cols = r.read_u16("chunk column count")?;
            let mut cols = Vec::with_capacity(num_cols as usize);
            for _ in 0..num_cols {
                let vec_len = r.read_u32("column vector length")? as usize;
                cols.push(r.take(vec_len, "column vector")?);
            }

            chunks.push(ChunkDir {
                start_time,
                end_time,
                num_rows,
                cols,
            });
        }

        Ok((key, schema_id, chunks))
    }

    /// The partition key, schema id prefix included
    pub fn partition_key(&self) -> &[u8] {
        let buf = self.buf.as_ref().expect("partition key read after free");
        &buf.as_slice()[self.key.clone()]
    }

    /// Schema id from the key prefix
    pub fn schema_id(&self) -> SchemaId {
        self.schema_id
    }

    /// Number of chunks
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Iterate the chunks in start-time order
    ///
    /// # Panics
    ///
    /// Panics if called after [`free`](Self::free).
    pub fn chunk_infos(&self) -> impl Iterator<Item = ChunkInfo<'_>> {
        let data = self
            .buf
            .as_ref()
            .expect("chunk infos read after free")
            .as_slice();
        self.chunks.iter().map(move |c| ChunkInfo {
            start_time: c.start_time,
            end_time: c.end_time,
            num_rows: c.num_rows,
            data,
            cols: &c.cols,
        })
    }

    /// Return the native buffer to the allocator; idempotent
    pub fn free(&mut self, allocator: &mut NativeAllocator) {
        if let Some(buf) = self.buf.take() {
            allocator.free(buf);
        }
    }
}

/// Builder for raw partition blobs, used by blob producers and tests
#[derive(Debug, Clone, Default)]
pub struct RawPartData {
    /// Partition key, schema id prefix included
    pub partition_key: Vec<u8>,
    /// Chunks in start-time order
    pub chunks: Vec<RawChunkData>,
}

/// One chunk of a [`RawPartData`]
#[derive(Debug, Clone)]
pub struct RawChunkData {
    /// First timestamp
    pub start_time: i64,
    /// Last timestamp
    pub end_time: i64,
    /// Number of rows
    pub num_rows: u32,
    /// Encoded column vectors in schema order
    pub columns: Vec<Vec<u8>>,
}

impl RawPartData {
    /// Create a blob builder for a partition of `schema_id`
    pub fn new(schema_id: SchemaId, key_suffix: &[u8]) -> Self {
        let mut partition_key = schema_id.to_be_bytes().to_vec();
        partition_key.extend_from_slice(key_suffix);
        Self {
            partition_key,
            chunks: Vec::new(),
        }
    }

    /// Serialize into the wire blob
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.partition_key.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.partition_key);
        out.extend_from_slice(&(self.chunks.len() as u16).to_le_bytes());
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.start_time.to_le_bytes());
            out.extend_from_slice(&chunk.end_time.to_le_bytes());
            out.extend_from_slice(&chunk.num_rows.to_le_bytes());
            out.extend_from_slice(&(chunk.columns.len() as u16).to_le_bytes());
            for col in &chunk.columns {
                out.extend_from_slice(&(col.len() as u32).to_le_bytes());
                out.extend_from_slice(col);
            }
        }
        out
    }
}
