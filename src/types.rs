//! Core data types used throughout the downsampler
//!
//! # Key Types
//!
//! - **`SchemaId`**: Integer identifier embedded as the first 4 bytes of every
//!   partition key
//! - **`TimeRange`**: Inclusive time window `[start, end]` in epoch-ms
//! - **`DsResolution`**: The period length of one downsample output
//! - **`DatasetRef`**: Name of a store dataset a chunk set is written to

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Integer identifier of a raw schema
///
/// Every partition key starts with the big-endian encoding of the owning
/// schema's id, so a raw partition can be routed without consulting anything
/// but its key prefix.
pub type SchemaId = u32;

/// Number of key bytes occupied by the schema id prefix
pub const SCHEMA_ID_PREFIX_LEN: usize = 4;

/// Time window for a batch (inclusive on both ends)
///
/// Both bounds are epoch-milliseconds. A period is attributed to the batch
/// whose window contains the period's closing boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp in milliseconds (inclusive)
    pub start: i64,

    /// End timestamp in milliseconds (inclusive)
    pub end: i64,
}

impl TimeRange {
    /// Create a new time range, validating that `start <= end`
    pub fn new(start: i64, end: i64) -> Result<Self, crate::error::Error> {
        if start > end {
            return Err(crate::error::Error::Configuration(format!(
                "Invalid time range: start {} > end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Check whether a timestamp falls within this range (inclusive)
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Duration of this range in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }
}

/// Resolution of one downsample output, stored as a period length in ms
///
/// # Example
///
/// ```rust
/// use strata_downsampler::types::DsResolution;
///
/// let five_min = DsResolution::from_minutes(5);
/// assert_eq!(five_min.as_millis(), 300_000);
/// assert_eq!(five_min.to_minutes(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DsResolution(i64);

impl DsResolution {
    /// Create a resolution from a period length in milliseconds
    ///
    /// Returns `None` for non-positive periods.
    pub fn from_millis(ms: i64) -> Option<Self> {
        if ms > 0 {
            Some(Self(ms))
        } else {
            None
        }
    }

    /// Create a resolution from a period length in whole minutes
    pub fn from_minutes(minutes: i64) -> Self {
        Self(minutes * 60_000)
    }

    /// Period length in milliseconds
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Period length in whole minutes (rounded down)
    ///
    /// Used for dataset routing, where the resolution appears as a minute
    /// suffix in the dataset name.
    pub fn to_minutes(&self) -> i64 {
        self.0 / 60_000
    }

    /// Period length as a [`Duration`]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0 as u64)
    }
}

impl fmt::Display for DsResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}min", self.to_minutes())
    }
}

/// Reference to a store dataset
///
/// Downsample output for resolution `R` is routed to
/// `{raw_dataset}_ds_{R.to_minutes()}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef(String);

impl DatasetRef {
    /// Build the downsample dataset reference for a raw dataset and resolution
    pub fn downsample_of(raw_dataset: &str, resolution: DsResolution) -> Self {
        Self(format!("{}_ds_{}", raw_dataset, resolution.to_minutes()))
    }

    /// Dataset name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read the schema id prefix out of a partition key
///
/// The first [`SCHEMA_ID_PREFIX_LEN`] bytes of every key are the big-endian
/// schema id.
pub fn schema_id_of_key(key: &[u8]) -> Result<SchemaId, crate::error::RawFormatError> {
    if key.len() < SCHEMA_ID_PREFIX_LEN {
        return Err(crate::error::RawFormatError::KeyTooShort(key.len()));
    }
    Ok(u32::from_be_bytes([key[0], key[1], key[2], key[3]]))
}
