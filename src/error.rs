//! Error types for the downsampler

use thiserror::Error;

/// Main error type for the downsampler
#[derive(Error, Debug)]
pub enum Error {
    /// Schema registry error
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Arena memory error
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Malformed raw partition data
    #[error("Raw partition format error: {0}")]
    RawFormat(#[from] RawFormatError),

    /// Aggregator evaluation error
    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    /// Store write error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A downsample partition was handed a timestamp below its last one
    #[error("Ingest timestamp {ts} regresses below {last}")]
    OutOfOrderIngest {
        /// Offending timestamp
        ts: i64,
        /// Last ingested timestamp
        last: i64,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Schema registry errors
#[derive(Error, Debug)]
pub enum SchemaError {
    /// No schema registered under the given id
    #[error("Unknown schema id {0}")]
    UnknownId(u32),

    /// No schema registered under the given name
    #[error("Unknown schema name '{0}'")]
    UnknownName(String),

    /// A schema with this id is already registered
    #[error("Schema id {0} already registered")]
    DuplicateId(u32),

    /// The raw schema declares no downsample schema
    #[error("Schema '{name}' (id {id}) has no downsample schema")]
    NoDownsampleSchema {
        /// Raw schema id
        id: u32,
        /// Raw schema name
        name: String,
    },

    /// Schema declaration is internally inconsistent
    #[error("Invalid schema declaration: {0}")]
    InvalidDeclaration(String),
}

/// Arena memory errors
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The per-schema write buffer pool has handed out its full capacity
    #[error("Write buffer pool for schema {schema_id} exhausted (capacity {capacity})")]
    BufferPoolExhausted {
        /// Schema the pool belongs to
        schema_id: u32,
        /// Configured pool capacity in buffer sets
        capacity: usize,
    },

    /// Native allocation failed
    #[error("Native allocation of {bytes} bytes failed")]
    AllocationFailed {
        /// Requested allocation size
        bytes: usize,
    },

    /// Requested a zero-length native allocation
    #[error("Zero-length native allocation requested")]
    ZeroLengthAllocation,
}

/// Errors decoding a raw partition blob or a column vector
#[derive(Error, Debug)]
pub enum RawFormatError {
    /// The blob ended before a declared field
    #[error("Truncated raw partition data while reading {0}")]
    Truncated(&'static str),

    /// Partition key shorter than the schema id prefix
    #[error("Partition key of {0} bytes is too short to carry a schema id")]
    KeyTooShort(usize),

    /// Column vector carries an unexpected type tag
    #[error("Column vector kind mismatch: expected {expected}, got {actual}")]
    VectorKindMismatch {
        /// Expected vector kind tag
        expected: u8,
        /// Actual vector kind tag
        actual: u8,
    },

    /// Unknown column vector type tag
    #[error("Unknown column vector kind {0}")]
    UnknownVectorKind(u8),

    /// A chunk declares zero rows
    #[error("Chunk declares zero rows")]
    EmptyChunk,

    /// A chunk's time range is inverted
    #[error("Chunk time range inverted: start {start} > end {end}")]
    InvertedTimeRange {
        /// Chunk start time
        start: i64,
        /// Chunk end time
        end: i64,
    },

    /// Chunks within a partition overlap or are out of order
    #[error("Chunk starting at {start} begins before the previous chunk ended at {prev_end}")]
    ChunkOutOfOrder {
        /// Start time of the offending chunk
        start: i64,
        /// End time of the chunk before it
        prev_end: i64,
    },

    /// Vector payload shorter than its row count requires
    #[error("Column vector payload too short for {rows} rows")]
    VectorTooShort {
        /// Declared row count
        rows: u32,
    },
}

/// Aggregator evaluation errors
#[derive(Error, Debug)]
pub enum AggregateError {
    /// Serialized histogram could not be decoded
    #[error("Histogram decode failed: {0}")]
    HistogramDecode(String),

    /// Two histograms with different bucket schemes cannot be added
    #[error("Histogram bucket scheme mismatch: {left} vs {right} buckets")]
    BucketSchemeMismatch {
        /// Bucket count of the accumulator
        left: usize,
        /// Bucket count of the incoming histogram
        right: usize,
    },

    /// Aggregator references a column the chunk does not have
    #[error("Aggregator column {column} out of range ({columns} columns)")]
    ColumnOutOfRange {
        /// Referenced column index
        column: usize,
        /// Number of columns in the chunk
        columns: usize,
    },
}

/// Store write errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// The sink acknowledged the write with an error response
    #[error("Store write to '{dataset}' failed: {message}")]
    WriteFailed {
        /// Target dataset
        dataset: String,
        /// Error message from the sink
        message: String,
    },

    /// The sink did not acknowledge within the configured timeout
    #[error("Store write to '{dataset}' timed out after {timeout_ms} ms")]
    Timeout {
        /// Target dataset
        dataset: String,
        /// Configured timeout in milliseconds
        timeout_ms: u64,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
