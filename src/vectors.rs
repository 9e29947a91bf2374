//! Columnar vector format shared by the raw store and the downsample output
//!
//! Every column of a chunk is one immutable vector in the store's canonical
//! layout. A vector is a type tag, a row count and a type-specific payload:
//!
//! ```text
//! Offset | Size | Field
//! -------|------|---------------------------
//!   0    |  1   | kind tag
//!   1    |  3   | reserved (zero)
//!   4    |  4   | num_rows (u32 LE)
//!   8    |  ..  | payload
//! ```
//!
//! - **Timestamp** (`kind 1`): `num_rows` little-endian `i64` values,
//!   strictly increasing.
//! - **Double** (`kind 2`): `num_rows` little-endian `f64` values.
//! - **Histogram** (`kind 3`): an offset table of `num_rows + 1` little-endian
//!   `u32` entries (relative to the start of the record section), then the
//!   concatenated wire-form histogram records.
//!
//! Readers wrap a byte slice after validating the header; row access is then
//! bounds-checked against the declared row count only. Timestamp vectors
//! additionally support the two binary searches the window iteration needs.

use crate::error::RawFormatError;

/// Size of the vector header in bytes
pub const VECTOR_HEADER_LEN: usize = 8;

/// Type tag of a column vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VectorKind {
    /// Strictly increasing i64 epoch-ms timestamps
    Timestamp = 1,
    /// IEEE 754 double values
    Double = 2,
    /// Variable-length serialized histograms
    Histogram = 3,
}

impl VectorKind {
    /// Parse a kind tag
    pub fn from_tag(tag: u8) -> Result<Self, RawFormatError> {
        match tag {
            1 => Ok(Self::Timestamp),
            2 => Ok(Self::Double),
            3 => Ok(Self::Histogram),
            other => Err(RawFormatError::UnknownVectorKind(other)),
        }
    }

    /// Wire tag of this kind
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// One value of an aggregate output row
///
/// The window iteration reuses a single row of these per partition; the
/// histogram variant owns a scratch vector that is rewritten in place each
/// window instead of reallocating.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Timestamp column value (epoch-ms)
    Timestamp(i64),
    /// Double column value
    Double(f64),
    /// Wire-form histogram record
    Histogram(Vec<u8>),
}

fn check_header(data: &[u8], expected: VectorKind) -> Result<u32, RawFormatError> {
    if data.len() < VECTOR_HEADER_LEN {
        return Err(RawFormatError::Truncated("vector header"));
    }
    let kind = VectorKind::from_tag(data[0])?;
    if kind != expected {
        return Err(RawFormatError::VectorKindMismatch {
            expected: expected.tag(),
            actual: kind.tag(),
        });
    }
    Ok(u32::from_le_bytes([data[4], data[5], data[6], data[7]]))
}

/// Read the kind tag of a vector without fully wrapping it
pub fn kind_of(data: &[u8]) -> Result<VectorKind, RawFormatError> {
    if data.len() < VECTOR_HEADER_LEN {
        return Err(RawFormatError::Truncated("vector header"));
    }
    VectorKind::from_tag(data[0])
}

// ============================================================================
// Readers
// ============================================================================

/// Reader over a timestamp vector
#[derive(Debug, Clone, Copy)]
pub struct LongVector<'a> {
    rows: u32,
    payload: &'a [u8],
}

impl<'a> LongVector<'a> {
    /// Wrap a timestamp vector, validating header and payload length
    pub fn wrap(data: &'a [u8]) -> Result<Self, RawFormatError> {
        let rows = check_header(data, VectorKind::Timestamp)?;
        let payload = &data[VECTOR_HEADER_LEN..];
        if payload.len() < rows as usize * 8 {
            return Err(RawFormatError::VectorTooShort { rows });
        }
        Ok(Self { rows, payload })
    }

    /// Number of rows
    pub fn num_rows(&self) -> u32 {
        self.rows
    }

    /// Value at row `i`
    ///
    /// # Panics
    ///
    /// Panics if `i >= num_rows()`.
    pub fn get(&self, i: u32) -> i64 {
        assert!(i < self.rows, "row {} out of {}", i, self.rows);
        let off = i as usize * 8;
        i64::from_le_bytes(
            self.payload[off..off + 8]
                .try_into()
                .expect("slice is 8 bytes"),
        )
    }

    /// Index of the first row with value `>= ts`
    ///
    /// Returns `num_rows()` when every row is below `ts`; the result is
    /// always a valid insertion index.
    pub fn first_at_or_after(&self, ts: i64) -> u32 {
        let mut lo = 0u32;
        let mut hi = self.rows;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.get(mid) < ts {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Index of the last row with value `<= ts`, or `None` when every row is
    /// above `ts`
    ///
    /// An exact hit returns the hit row itself.
    pub fn last_at_or_before(&self, ts: i64) -> Option<u32> {
        // first row strictly greater than ts, guarding the i64::MAX edge
        let n = if ts == i64::MAX {
            self.rows
        } else {
            self.first_at_or_after(ts + 1)
        };
        if n == 0 {
            None
        } else {
            Some(n - 1)
        }
    }
}

/// Reader over a double vector
#[derive(Debug, Clone, Copy)]
pub struct DoubleVector<'a> {
    rows: u32,
    payload: &'a [u8],
}

impl<'a> DoubleVector<'a> {
    /// Wrap a double vector, validating header and payload length
    pub fn wrap(data: &'a [u8]) -> Result<Self, RawFormatError> {
        let rows = check_header(data, VectorKind::Double)?;
        let payload = &data[VECTOR_HEADER_LEN..];
        if payload.len() < rows as usize * 8 {
            return Err(RawFormatError::VectorTooShort { rows });
        }
        Ok(Self { rows, payload })
    }

    /// Number of rows
    pub fn num_rows(&self) -> u32 {
        self.rows
    }

    /// Value at row `i`
    ///
    /// # Panics
    ///
    /// Panics if `i >= num_rows()`.
    pub fn get(&self, i: u32) -> f64 {
        assert!(i < self.rows, "row {} out of {}", i, self.rows);
        let off = i as usize * 8;
        f64::from_le_bytes(
            self.payload[off..off + 8]
                .try_into()
                .expect("slice is 8 bytes"),
        )
    }
}

/// Reader over a histogram vector
#[derive(Debug, Clone, Copy)]
pub struct HistogramVector<'a> {
    rows: u32,
    offsets: &'a [u8],
    records: &'a [u8],
}

impl<'a> HistogramVector<'a> {
    /// Wrap a histogram vector, validating header and offset table
    pub fn wrap(data: &'a [u8]) -> Result<Self, RawFormatError> {
        let rows = check_header(data, VectorKind::Histogram)?;
        let table_len = (rows as usize + 1) * 4;
        let payload = &data[VECTOR_HEADER_LEN..];
        if payload.len() < table_len {
            return Err(RawFormatError::VectorTooShort { rows });
        }
        Ok(Self {
            rows,
            offsets: &payload[..table_len],
            records: &payload[table_len..],
        })
    }

    /// Number of rows
    pub fn num_rows(&self) -> u32 {
        self.rows
    }

    fn offset(&self, i: u32) -> usize {
        let off = i as usize * 4;
        u32::from_le_bytes(
            self.offsets[off..off + 4]
                .try_into()
                .expect("slice is 4 bytes"),
        ) as usize
    }

    /// Wire-form record at row `i`
    ///
    /// Returns an error when the offset table points outside the record
    /// section.
    pub fn get(&self, i: u32) -> Result<&'a [u8], RawFormatError> {
        assert!(i < self.rows, "row {} out of {}", i, self.rows);
        let start = self.offset(i);
        let end = self.offset(i + 1);
        if start > end || end > self.records.len() {
            return Err(RawFormatError::Truncated("histogram record"));
        }
        Ok(&self.records[start..end])
    }
}

// ============================================================================
// Encoders
// ============================================================================

fn push_header(out: &mut Vec<u8>, kind: VectorKind, rows: u32) {
    out.push(kind.tag());
    out.extend_from_slice(&[0u8; 3]);
    out.extend_from_slice(&rows.to_le_bytes());
}

/// Encode a timestamp vector
pub fn encode_timestamps(values: &[i64], out: &mut Vec<u8>) {
    push_header(out, VectorKind::Timestamp, values.len() as u32);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Encode a double vector
pub fn encode_doubles(values: &[f64], out: &mut Vec<u8>) {
    push_header(out, VectorKind::Double, values.len() as u32);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Encode a histogram vector from row offsets and concatenated records
///
/// `offsets` must hold `rows + 1` entries with `offsets[0] == 0` and
/// `offsets[rows] == records.len()`.
pub fn encode_histograms(offsets: &[u32], records: &[u8], out: &mut Vec<u8>) {
    debug_assert!(!offsets.is_empty());
    debug_assert_eq!(*offsets.last().expect("offsets non-empty") as usize, records.len());
    push_header(out, VectorKind::Histogram, (offsets.len() - 1) as u32);
    for off in offsets {
        out.extend_from_slice(&off.to_le_bytes());
    }
    out.extend_from_slice(records);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_vector_access() {
        let mut buf = Vec::new();
        encode_timestamps(&[10, 20, 30, 40], &mut buf);
        let v = LongVector::wrap(&buf).unwrap();
        assert_eq!(v.num_rows(), 4);
        assert_eq!(v.get(0), 10);
        assert_eq!(v.get(3), 40);
    }

    #[test]
    fn test_first_at_or_after() {
        let mut buf = Vec::new();
        encode_timestamps(&[10, 20, 30], &mut buf);
        let v = LongVector::wrap(&buf).unwrap();

        assert_eq!(v.first_at_or_after(5), 0);
        assert_eq!(v.first_at_or_after(10), 0);
        assert_eq!(v.first_at_or_after(11), 1);
        assert_eq!(v.first_at_or_after(30), 2);
        assert_eq!(v.first_at_or_after(31), 3); // insertion index past the end
    }

    #[test]
    fn test_last_at_or_before() {
        let mut buf = Vec::new();
        encode_timestamps(&[10, 20, 30], &mut buf);
        let v = LongVector::wrap(&buf).unwrap();

        assert_eq!(v.last_at_or_before(9), None);
        // exact hit returns the hit row, not the one before it
        assert_eq!(v.last_at_or_before(10), Some(0));
        assert_eq!(v.last_at_or_before(25), Some(1));
        assert_eq!(v.last_at_or_before(30), Some(2));
        assert_eq!(v.last_at_or_before(i64::MAX), Some(2));
    }

    #[test]
    fn test_double_vector() {
        let mut buf = Vec::new();
        encode_doubles(&[1.5, f64::NAN, -3.0], &mut buf);
        let v = DoubleVector::wrap(&buf).unwrap();
        assert_eq!(v.get(0), 1.5);
        assert!(v.get(1).is_nan());
        assert_eq!(v.get(2), -3.0);
    }

    #[test]
    fn test_histogram_vector() {
        let rec_a = vec![1u8, 2, 3];
        let rec_b = vec![4u8, 5];
        let mut records = rec_a.clone();
        records.extend_from_slice(&rec_b);

        let mut buf = Vec::new();
        encode_histograms(&[0, 3, 5], &records, &mut buf);
        let v = HistogramVector::wrap(&buf).unwrap();
        assert_eq!(v.num_rows(), 2);
        assert_eq!(v.get(0).unwrap(), rec_a.as_slice());
        assert_eq!(v.get(1).unwrap(), rec_b.as_slice());
    }

    #[test]
    fn test_kind_mismatch() {
        let mut buf = Vec::new();
        encode_doubles(&[1.0], &mut buf);
        assert!(matches!(
            LongVector::wrap(&buf),
            Err(RawFormatError::VectorKindMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_truncated_vector() {
        let mut buf = Vec::new();
        encode_timestamps(&[10, 20], &mut buf);
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            LongVector::wrap(&buf),
            Err(RawFormatError::VectorTooShort { rows: 2 })
        ));
        assert!(LongVector::wrap(&buf[..4]).is_err());
    }
}
