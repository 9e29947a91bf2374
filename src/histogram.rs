//! Explicit-bounds histogram values and their wire encoding
//!
//! Histogram columns store one serialized histogram per row. The wire form
//! is a compact little-endian record:
//!
//! ```text
//! Offset | Size          | Field
//! -------|---------------|----------------------------
//!   0    | 2             | bucket_count (u16)
//!   2    | 8 * count     | bucket upper bounds (f64)
//!   ...  | 8 * count     | cumulative-free counts (u64)
//! ```
//!
//! Two histograms can only be added when they share the same bucket scheme
//! (same count and same bounds); mismatches surface as
//! [`AggregateError::BucketSchemeMismatch`].

use crate::error::AggregateError;

/// An explicit-bounds histogram
///
/// Bounds are the inclusive upper edges of each bucket in ascending order;
/// `counts[i]` is the number of observations in bucket `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bounds: Vec<f64>,
    counts: Vec<u64>,
}

impl Histogram {
    /// Create a histogram from bucket bounds and counts
    ///
    /// Returns an error when the two slices disagree in length or the bounds
    /// are not strictly ascending.
    pub fn new(bounds: Vec<f64>, counts: Vec<u64>) -> Result<Self, AggregateError> {
        if bounds.len() != counts.len() {
            return Err(AggregateError::HistogramDecode(format!(
                "{} bounds but {} counts",
                bounds.len(),
                counts.len()
            )));
        }
        if bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AggregateError::HistogramDecode(
                "bucket bounds not strictly ascending".to_string(),
            ));
        }
        Ok(Self { bounds, counts })
    }

    /// Bucket upper bounds
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Per-bucket observation counts
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Number of buckets
    pub fn num_buckets(&self) -> usize {
        self.bounds.len()
    }

    /// Serialized size in bytes
    pub fn encoded_len(&self) -> usize {
        2 + 16 * self.bounds.len()
    }

    /// Append the wire form of this histogram to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.bounds.len() as u16).to_le_bytes());
        for b in &self.bounds {
            out.extend_from_slice(&b.to_le_bytes());
        }
        for c in &self.counts {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }

    /// Serialize to a fresh byte vector
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Decode a histogram from its wire form
    pub fn decode(data: &[u8]) -> Result<Self, AggregateError> {
        if data.len() < 2 {
            return Err(AggregateError::HistogramDecode(
                "record shorter than bucket count header".to_string(),
            ));
        }
        let count = u16::from_le_bytes([data[0], data[1]]) as usize;
        let expected = 2 + 16 * count;
        if data.len() < expected {
            return Err(AggregateError::HistogramDecode(format!(
                "record of {} bytes too short for {} buckets",
                data.len(),
                count
            )));
        }

        let mut bounds = Vec::with_capacity(count);
        let mut counts = Vec::with_capacity(count);
        let mut off = 2;
        for _ in 0..count {
            bounds.push(f64::from_le_bytes(
                data[off..off + 8].try_into().expect("slice is 8 bytes"),
            ));
            off += 8;
        }
        for _ in 0..count {
            counts.push(u64::from_le_bytes(
                data[off..off + 8].try_into().expect("slice is 8 bytes"),
            ));
            off += 8;
        }
        Self::new(bounds, counts)
    }

    /// Add another histogram's counts into this one, element-wise
    ///
    /// Both histograms must share the same bucket scheme.
    pub fn add(&mut self, other: &Histogram) -> Result<(), AggregateError> {
        self.check_scheme(other.num_buckets(), &other.bounds)?;
        for (acc, c) in self.counts.iter_mut().zip(&other.counts) {
            *acc = acc.saturating_add(*c);
        }
        Ok(())
    }

    /// Add a wire-form histogram into this one without building a `Histogram`
    ///
    /// Used by the sum aggregator on its inner loop to avoid per-row
    /// allocation.
    pub fn add_encoded(&mut self, data: &[u8]) -> Result<(), AggregateError> {
        if data.len() < 2 {
            return Err(AggregateError::HistogramDecode(
                "record shorter than bucket count header".to_string(),
            ));
        }
        let count = u16::from_le_bytes([data[0], data[1]]) as usize;
        if data.len() < 2 + 16 * count {
            return Err(AggregateError::HistogramDecode(format!(
                "record of {} bytes too short for {} buckets",
                data.len(),
                count
            )));
        }
        if count != self.num_buckets() {
            return Err(AggregateError::BucketSchemeMismatch {
                left: self.num_buckets(),
                right: count,
            });
        }

        let mut off = 2;
        for bound in &self.bounds {
            let b = f64::from_le_bytes(data[off..off + 8].try_into().expect("slice is 8 bytes"));
            if b != *bound {
                return Err(AggregateError::HistogramDecode(format!(
                    "bucket bound {} does not match accumulator bound {}",
                    b, bound
                )));
            }
            off += 8;
        }
        for acc in self.counts.iter_mut() {
            let c = u64::from_le_bytes(data[off..off + 8].try_into().expect("slice is 8 bytes"));
            *acc = acc.saturating_add(c);
            off += 8;
        }
        Ok(())
    }

    fn check_scheme(&self, count: usize, bounds: &[f64]) -> Result<(), AggregateError> {
        if count != self.num_buckets() {
            return Err(AggregateError::BucketSchemeMismatch {
                left: self.num_buckets(),
                right: count,
            });
        }
        if bounds != self.bounds.as_slice() {
            return Err(AggregateError::HistogramDecode(
                "bucket bounds differ between histograms".to_string(),
            ));
        }
        Ok(())
    }
}
