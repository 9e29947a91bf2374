//! Schema registry: raw schemas, downsample schemas, aggregator descriptors
//!
//! A raw schema declares the typed data columns of a partition and optionally
//! a downsample schema plus one aggregator descriptor per downsample column.
//! Schemas are identified by an integer id embedded as the first 4 bytes of
//! every partition key; the registry is read-only after load and shared by
//! all workers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SchemaError;
use crate::types::SchemaId;
use crate::vectors::VectorKind;

/// Type of one data column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// i64 epoch-ms timestamps, strictly increasing within a chunk
    Timestamp,
    /// f64 values
    Double,
    /// Serialized explicit-bounds histograms
    Histogram,
}

impl ColumnType {
    /// Vector kind this column is encoded as
    pub fn vector_kind(self) -> VectorKind {
        match self {
            ColumnType::Timestamp => VectorKind::Timestamp,
            ColumnType::Double => VectorKind::Double,
            ColumnType::Histogram => VectorKind::Histogram,
        }
    }
}

/// One declared data column
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Column type
    pub column_type: ColumnType,
}

impl ColumnSpec {
    /// Create a column spec
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Numeric reduction over a double column window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleOp {
    /// Minimum of the non-NaN values
    Min,
    /// Maximum of the non-NaN values
    Max,
    /// Sum skipping NaN
    Sum,
    /// Number of non-NaN values
    Count,
    /// Sum / count, NaN when the window holds no non-NaN value
    Avg,
    /// Value at the last row of the window
    Last,
}

/// Reduction over a histogram column window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramOp {
    /// Element-wise bucket sum
    Sum,
    /// Histogram at the last row of the window
    Last,
}

/// Descriptor of one downsample output column
///
/// Descriptors are fixed per (raw schema, downsample schema) pair and shared
/// across all partitions of that schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorSpec {
    /// Emits the period end timestamp, supplied by the window iteration
    Time {
        /// Raw timestamp column the descriptor is declared over
        column: usize,
    },
    /// Numeric reduction over a double column
    Double {
        /// Reduction kind
        op: DoubleOp,
        /// Raw column index
        column: usize,
    },
    /// Reduction over a histogram column
    Histogram {
        /// Reduction kind
        op: HistogramOp,
        /// Raw column index
        column: usize,
    },
}

impl AggregatorSpec {
    /// Column type this descriptor produces
    pub fn output_type(&self) -> ColumnType {
        match self {
            AggregatorSpec::Time { .. } => ColumnType::Timestamp,
            AggregatorSpec::Double { .. } => ColumnType::Double,
            AggregatorSpec::Histogram { .. } => ColumnType::Histogram,
        }
    }

    /// Raw column the descriptor reads
    pub fn column(&self) -> usize {
        match self {
            AggregatorSpec::Time { column }
            | AggregatorSpec::Double { column, .. }
            | AggregatorSpec::Histogram { column, .. } => *column,
        }
    }

    /// Raw column type this descriptor expects
    fn input_type(&self) -> ColumnType {
        match self {
            AggregatorSpec::Time { .. } => ColumnType::Timestamp,
            AggregatorSpec::Double { .. } => ColumnType::Double,
            AggregatorSpec::Histogram { .. } => ColumnType::Histogram,
        }
    }
}

/// An ordered list of typed data columns
///
/// Column 0 is always the timestamp column.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Schema name
    pub name: String,
    /// Data columns in declaration order
    pub columns: Vec<ColumnSpec>,
}

impl Schema {
    /// Create a schema, validating the timestamp-first convention
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Result<Self, SchemaError> {
        let name = name.into();
        if columns.is_empty() {
            return Err(SchemaError::InvalidDeclaration(format!(
                "schema '{}' declares no columns",
                name
            )));
        }
        if columns[0].column_type != ColumnType::Timestamp {
            return Err(SchemaError::InvalidDeclaration(format!(
                "schema '{}': column 0 must be the timestamp column",
                name
            )));
        }
        Ok(Self { name, columns })
    }

    /// Number of data columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Size of the per-chunk metadata record for this schema
    ///
    /// Start/end timestamps, ingestion time, row count and one vector
    /// reference per column. The arena derives its block size from the
    /// largest of these across downsample schemas.
    pub fn chunk_meta_size(&self) -> usize {
        8 + 8 + 8 + 4 + self.columns.len() * 16
    }
}

/// Downsample declaration of a raw schema
#[derive(Debug, Clone)]
pub struct DownsampleSpec {
    /// Schema aggregate rows are ingested under
    pub schema: Schema,
    /// One descriptor per downsample column, in column order
    pub aggregators: Vec<AggregatorSpec>,
}

/// A registered raw schema
#[derive(Debug)]
pub struct RawSchema {
    /// Schema id (partition key prefix)
    pub id: SchemaId,
    /// The raw data columns
    pub schema: Schema,
    /// Optional downsample declaration
    pub downsample: Option<DownsampleSpec>,
}

/// Registry of raw schemas, keyed by id and by name
///
/// Loaded once from configuration and read-only afterwards.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    by_id: HashMap<SchemaId, Arc<RawSchema>>,
    by_name: HashMap<String, SchemaId>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw schema, validating its downsample declaration
    pub fn register(
        &mut self,
        id: SchemaId,
        schema: Schema,
        downsample: Option<DownsampleSpec>,
    ) -> Result<(), SchemaError> {
        if self.by_id.contains_key(&id) {
            return Err(SchemaError::DuplicateId(id));
        }
        if let Some(ds) = &downsample {
            validate_downsample(&schema, ds)?;
        }
        self.by_name.insert(schema.name.clone(), id);
        self.by_id.insert(
            id,
            Arc::new(RawSchema {
                id,
                schema,
                downsample,
            }),
        );
        Ok(())
    }

    /// Look up a schema by id
    pub fn get(&self, id: SchemaId) -> Option<&Arc<RawSchema>> {
        self.by_id.get(&id)
    }

    /// Look up a schema by name
    pub fn get_by_name(&self, name: &str) -> Result<&Arc<RawSchema>, SchemaError> {
        let id = self
            .by_name
            .get(name)
            .ok_or_else(|| SchemaError::UnknownName(name.to_string()))?;
        Ok(&self.by_id[id])
    }

    /// Iterate over all registered schemas
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RawSchema>> {
        self.by_id.values()
    }

    /// Ids of all schemas that declare a downsample schema
    pub fn downsampled_ids(&self) -> Vec<SchemaId> {
        let mut ids: Vec<SchemaId> = self
            .by_id
            .values()
            .filter(|s| s.downsample.is_some())
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Largest per-chunk metadata record across downsample schemas
    ///
    /// Zero when no schema declares a downsample schema.
    pub fn max_downsample_chunk_meta_size(&self) -> usize {
        self.by_id
            .values()
            .filter_map(|s| s.downsample.as_ref())
            .map(|ds| ds.schema.chunk_meta_size())
            .max()
            .unwrap_or(0)
    }
}

fn validate_downsample(raw: &Schema, ds: &DownsampleSpec) -> Result<(), SchemaError> {
    if ds.aggregators.len() != ds.schema.num_columns() {
        return Err(SchemaError::InvalidDeclaration(format!(
            "downsample schema '{}' has {} columns but {} aggregators",
            ds.schema.name,
            ds.schema.num_columns(),
            ds.aggregators.len()
        )));
    }
    for (i, agg) in ds.aggregators.iter().enumerate() {
        let col = agg.column();
        let raw_col = raw.columns.get(col).ok_or_else(|| {
            SchemaError::InvalidDeclaration(format!(
                "aggregator {} of '{}' references raw column {} out of {}",
                i,
                ds.schema.name,
                col,
                raw.num_columns()
            ))
        })?;
        if raw_col.column_type != agg.input_type() {
            return Err(SchemaError::InvalidDeclaration(format!(
                "aggregator {} of '{}' reads column '{}' of the wrong type",
                i, ds.schema.name, raw_col.name
            )));
        }
        if ds.schema.columns[i].column_type != agg.output_type() {
            return Err(SchemaError::InvalidDeclaration(format!(
                "aggregator {} of '{}' emits into column '{}' of the wrong type",
                i, ds.schema.name, ds.schema.columns[i].name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_schema() -> Schema {
        Schema::new(
            "gauge",
            vec![
                ColumnSpec::new("timestamp", ColumnType::Timestamp),
                ColumnSpec::new("value", ColumnType::Double),
            ],
        )
        .unwrap()
    }

    fn ds_spec() -> DownsampleSpec {
        DownsampleSpec {
            schema: Schema::new(
                "gauge-ds",
                vec![
                    ColumnSpec::new("timestamp", ColumnType::Timestamp),
                    ColumnSpec::new("sum", ColumnType::Double),
                    ColumnSpec::new("max", ColumnType::Double),
                ],
            )
            .unwrap(),
            aggregators: vec![
                AggregatorSpec::Time { column: 0 },
                AggregatorSpec::Double {
                    op: DoubleOp::Sum,
                    column: 1,
                },
                AggregatorSpec::Double {
                    op: DoubleOp::Max,
                    column: 1,
                },
            ],
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = SchemaRegistry::new();
        reg.register(1, raw_schema(), Some(ds_spec())).unwrap();

        assert!(reg.get(1).is_some());
        assert!(reg.get(2).is_none());
        assert_eq!(reg.get_by_name("gauge").unwrap().id, 1);
        assert!(reg.get_by_name("counter").is_err());
        assert_eq!(reg.downsampled_ids(), vec![1]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut reg = SchemaRegistry::new();
        reg.register(1, raw_schema(), None).unwrap();
        assert!(matches!(
            reg.register(1, raw_schema(), None),
            Err(SchemaError::DuplicateId(1))
        ));
    }

    #[test]
    fn test_timestamp_first_enforced() {
        assert!(Schema::new(
            "bad",
            vec![ColumnSpec::new("value", ColumnType::Double)]
        )
        .is_err());
        assert!(Schema::new("empty", vec![]).is_err());
    }

    #[test]
    fn test_downsample_validation() {
        let mut reg = SchemaRegistry::new();

        // aggregator count must match column count
        let mut bad = ds_spec();
        bad.aggregators.pop();
        assert!(reg.register(1, raw_schema(), Some(bad)).is_err());

        // aggregator input type must match the raw column
        let mut bad = ds_spec();
        bad.aggregators[1] = AggregatorSpec::Double {
            op: DoubleOp::Sum,
            column: 0,
        };
        assert!(reg.register(1, raw_schema(), Some(bad)).is_err());

        // aggregator output type must match the downsample column
        let mut bad = ds_spec();
        bad.aggregators[1] = AggregatorSpec::Time { column: 0 };
        assert!(reg.register(1, raw_schema(), Some(bad)).is_err());
    }

    #[test]
    fn test_chunk_meta_size() {
        let mut reg = SchemaRegistry::new();
        reg.register(1, raw_schema(), Some(ds_spec())).unwrap();
        // 3 downsample columns
        assert_eq!(reg.max_downsample_chunk_meta_size(), 28 + 3 * 16);
    }
}
