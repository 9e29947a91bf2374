//! Per-schema write buffer pools
//!
//! A downsample partition appends aggregate rows into a set of appendable
//! column buffers obtained from its schema's pool. Buffer sets are recycled
//! between partitions: `release` clears and returns them to the free list.
//! The pool caps how many sets may be outstanding at once, sized for the
//! expected concurrent partitions of the schema.

use crate::error::MemoryError;
use crate::schema::{ColumnType, Schema};
use crate::types::SchemaId;
use crate::vectors::{self, ColumnValue};

/// Appendable buffer for one downsample column
#[derive(Debug)]
pub enum ColumnWriteBuffer {
    /// Timestamp column
    Timestamp(Vec<i64>),
    /// Double column
    Double(Vec<f64>),
    /// Histogram column: row offsets plus concatenated wire-form records
    Histogram {
        /// `rows + 1` offsets into `records`, starting at 0
        offsets: Vec<u32>,
        /// Concatenated wire-form histogram records
        records: Vec<u8>,
    },
}

impl ColumnWriteBuffer {
    fn for_column(column_type: ColumnType, row_capacity: usize) -> Self {
        match column_type {
            ColumnType::Timestamp => Self::Timestamp(Vec::with_capacity(row_capacity)),
            ColumnType::Double => Self::Double(Vec::with_capacity(row_capacity)),
            ColumnType::Histogram => {
                let mut offsets = Vec::with_capacity(row_capacity + 1);
                offsets.push(0);
                Self::Histogram {
                    offsets,
                    records: Vec::new(),
                }
            }
        }
    }

    fn push(&mut self, value: &ColumnValue) {
        match (self, value) {
            (Self::Timestamp(buf), ColumnValue::Timestamp(ts)) => buf.push(*ts),
            (Self::Double(buf), ColumnValue::Double(v)) => buf.push(*v),
            (Self::Histogram { offsets, records }, ColumnValue::Histogram(rec)) => {
                records.extend_from_slice(rec);
                offsets.push(records.len() as u32);
            }
            // row shape is validated against the schema at registration time
            _ => panic!("aggregate value type does not match column buffer"),
        }
    }

    fn num_rows(&self) -> usize {
        match self {
            Self::Timestamp(buf) => buf.len(),
            Self::Double(buf) => buf.len(),
            Self::Histogram { offsets, .. } => offsets.len() - 1,
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Timestamp(buf) => buf.clear(),
            Self::Double(buf) => buf.clear(),
            Self::Histogram { offsets, records } => {
                offsets.clear();
                offsets.push(0);
                records.clear();
            }
        }
    }

    /// Encode this buffer's rows as a column vector
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Timestamp(buf) => vectors::encode_timestamps(buf, out),
            Self::Double(buf) => vectors::encode_doubles(buf, out),
            Self::Histogram { offsets, records } => {
                vectors::encode_histograms(offsets, records, out)
            }
        }
    }
}

/// One write buffer per downsample column
#[derive(Debug)]
pub struct WriteBufferSet {
    cols: Vec<ColumnWriteBuffer>,
    row_capacity: usize,
}

impl WriteBufferSet {
    fn new(schema: &Schema, row_capacity: usize) -> Self {
        Self {
            cols: schema
                .columns
                .iter()
                .map(|c| ColumnWriteBuffer::for_column(c.column_type, row_capacity))
                .collect(),
            row_capacity,
        }
    }

    /// Rows currently buffered
    pub fn num_rows(&self) -> usize {
        self.cols.first().map_or(0, ColumnWriteBuffer::num_rows)
    }

    /// Whether the set holds no rows
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Whether the set reached its row capacity
    pub fn is_full(&self) -> bool {
        self.num_rows() >= self.row_capacity
    }

    /// Append one aggregate row
    ///
    /// # Panics
    ///
    /// Panics when the row shape differs from the schema the set was built
    /// for; the registry rules that out for rows produced by aggregators.
    pub fn push_row(&mut self, row: &[ColumnValue]) {
        assert_eq!(row.len(), self.cols.len(), "row width mismatch");
        for (col, value) in self.cols.iter_mut().zip(row) {
            col.push(value);
        }
    }

    /// Column buffers in schema order
    pub fn columns(&self) -> &[ColumnWriteBuffer] {
        &self.cols
    }

    /// First and last buffered timestamp, when any rows are present
    ///
    /// Column 0 is the timestamp column for every schema the registry
    /// accepts.
    pub fn time_bounds(&self) -> Option<(i64, i64)> {
        match self.cols.first() {
            Some(ColumnWriteBuffer::Timestamp(ts)) if !ts.is_empty() => {
                Some((ts[0], ts[ts.len() - 1]))
            }
            _ => None,
        }
    }

    /// Drop all buffered rows, keeping the allocations
    pub fn clear(&mut self) {
        for col in &mut self.cols {
            col.clear();
        }
    }
}

/// Pool of write buffer sets for one schema
///
/// Thread-affine: one pool per (worker arena, schema id), no internal
/// locking.
#[derive(Debug)]
pub struct WriteBufferPool {
    schema_id: SchemaId,
    schema: Schema,
    row_capacity: usize,
    capacity: usize,
    free: Vec<WriteBufferSet>,
    outstanding: usize,
}

impl WriteBufferPool {
    /// Create a pool for `schema` (the downsample schema of `schema_id`)
    pub fn new(schema_id: SchemaId, schema: Schema, row_capacity: usize, capacity: usize) -> Self {
        Self {
            schema_id,
            schema,
            row_capacity,
            capacity,
            free: Vec::new(),
            outstanding: 0,
        }
    }

    /// Take a buffer set, recycling a released one when available
    pub fn obtain(&mut self) -> Result<WriteBufferSet, MemoryError> {
        if self.outstanding >= self.capacity {
            return Err(MemoryError::BufferPoolExhausted {
                schema_id: self.schema_id,
                capacity: self.capacity,
            });
        }
        self.outstanding += 1;
        Ok(self
            .free
            .pop()
            .unwrap_or_else(|| WriteBufferSet::new(&self.schema, self.row_capacity)))
    }

    /// Return a buffer set to the free list
    pub fn release(&mut self, mut set: WriteBufferSet) {
        set.clear();
        self.outstanding -= 1;
        self.free.push(set);
    }

    /// Buffer sets currently handed out
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSpec;

    fn ds_schema() -> Schema {
        Schema::new(
            "gauge-ds",
            vec![
                ColumnSpec::new("timestamp", ColumnType::Timestamp),
                ColumnSpec::new("sum", ColumnType::Double),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_obtain_release_recycles() {
        let mut pool = WriteBufferPool::new(1, ds_schema(), 4, 2);
        let mut set = pool.obtain().unwrap();
        set.push_row(&[ColumnValue::Timestamp(100), ColumnValue::Double(1.0)]);
        assert_eq!(set.num_rows(), 1);

        pool.release(set);
        assert_eq!(pool.outstanding(), 0);

        // recycled set comes back cleared
        let set = pool.obtain().unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_pool_capacity() {
        let mut pool = WriteBufferPool::new(1, ds_schema(), 4, 1);
        let set = pool.obtain().unwrap();
        assert!(matches!(
            pool.obtain(),
            Err(MemoryError::BufferPoolExhausted {
                schema_id: 1,
                capacity: 1
            })
        ));
        pool.release(set);
        assert!(pool.obtain().is_ok());
    }

    #[test]
    fn test_full_and_encode() {
        let mut pool = WriteBufferPool::new(1, ds_schema(), 2, 1);
        let mut set = pool.obtain().unwrap();
        set.push_row(&[ColumnValue::Timestamp(100), ColumnValue::Double(1.0)]);
        assert!(!set.is_full());
        set.push_row(&[ColumnValue::Timestamp(200), ColumnValue::Double(2.0)]);
        assert!(set.is_full());

        let mut out = Vec::new();
        set.columns()[0].encode_into(&mut out);
        let ts = crate::vectors::LongVector::wrap(&out).unwrap();
        assert_eq!(ts.num_rows(), 2);
        assert_eq!(ts.get(1), 200);
    }
}
