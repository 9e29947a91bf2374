//! Typed reducers over a row range of one chunk
//!
//! Each aggregator descriptor reduces an inclusive `[start_row, end_row]`
//! window of one column to a single output value. Reducers read the raw
//! column vectors through the typed readers and write into a caller-owned
//! row slot, so the inner loop allocates nothing per row.
//!
//! NaN handling for double reductions: NaN values are skipped; min/max
//! come out NaN only when every value in the window is NaN, and avg comes
//! out NaN when the window holds no non-NaN value.

use crate::error::{AggregateError, Error};
use crate::histogram::Histogram;
use crate::partition::ChunkInfo;
use crate::schema::{AggregatorSpec, ColumnType, DoubleOp, HistogramOp};
use crate::vectors::{ColumnValue, DoubleVector, HistogramVector};

/// Build the reusable output row for an aggregator list
///
/// One slot per descriptor, pre-shaped so reducers assign in place. The
/// histogram slots own scratch vectors that are rewritten each window.
pub fn new_row(aggs: &[AggregatorSpec]) -> Vec<ColumnValue> {
    aggs.iter()
        .map(|agg| match agg.output_type() {
            ColumnType::Timestamp => ColumnValue::Timestamp(0),
            ColumnType::Double => ColumnValue::Double(0.0),
            ColumnType::Histogram => ColumnValue::Histogram(Vec::new()),
        })
        .collect()
}

/// Reduce one window of `chunk` into `out`
///
/// `period_end` is the closing boundary of the period; the time aggregator
/// emits it directly rather than reading the data.
pub fn reduce_into(
    spec: &AggregatorSpec,
    chunk: &ChunkInfo<'_>,
    start_row: u32,
    end_row: u32,
    period_end: i64,
    out: &mut ColumnValue,
) -> Result<(), Error> {
    debug_assert!(start_row <= end_row);
    match spec {
        AggregatorSpec::Time { .. } => {
            set_timestamp(out, period_end);
        }
        AggregatorSpec::Double { op, column } => {
            let vector = DoubleVector::wrap(column_bytes(chunk, *column)?)?;
            set_double(out, reduce_double(*op, &vector, start_row, end_row));
        }
        AggregatorSpec::Histogram { op, column } => {
            let vector = HistogramVector::wrap(column_bytes(chunk, *column)?)?;
            reduce_histogram(*op, &vector, start_row, end_row, out)?;
        }
    }
    Ok(())
}

fn column_bytes<'a>(chunk: &ChunkInfo<'a>, column: usize) -> Result<&'a [u8], AggregateError> {
    chunk.column(column).ok_or(AggregateError::ColumnOutOfRange {
        column,
        columns: chunk.num_columns(),
    })
}

fn reduce_double(op: DoubleOp, vector: &DoubleVector<'_>, start: u32, end: u32) -> f64 {
    match op {
        DoubleOp::Min => {
            let mut min = f64::NAN;
            for i in start..=end {
                let x = vector.get(i);
                if !x.is_nan() && (min.is_nan() || x < min) {
                    min = x;
                }
            }
            min
        }
        DoubleOp::Max => {
            let mut max = f64::NAN;
            for i in start..=end {
                let x = vector.get(i);
                if !x.is_nan() && (max.is_nan() || x > max) {
                    max = x;
                }
            }
            max
        }
        DoubleOp::Sum => {
            let mut sum = 0.0;
            for i in start..=end {
                let x = vector.get(i);
                if !x.is_nan() {
                    sum += x;
                }
            }
            sum
        }
        DoubleOp::Count => (start..=end).filter(|&i| !vector.get(i).is_nan()).count() as f64,
        DoubleOp::Avg => {
            let mut sum = 0.0;
            let mut count = 0u32;
            for i in start..=end {
                let x = vector.get(i);
                if !x.is_nan() {
                    sum += x;
                    count += 1;
                }
            }
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        }
        DoubleOp::Last => vector.get(end),
    }
}

fn reduce_histogram(
    op: HistogramOp,
    vector: &HistogramVector<'_>,
    start: u32,
    end: u32,
    out: &mut ColumnValue,
) -> Result<(), Error> {
    let scratch = match out {
        ColumnValue::Histogram(scratch) => scratch,
        _ => unreachable!("histogram aggregator writes into a histogram slot"),
    };
    scratch.clear();
    match op {
        HistogramOp::Last => {
            scratch.extend_from_slice(vector.get(end)?);
        }
        HistogramOp::Sum => {
            let mut acc = Histogram::decode(vector.get(start)?)?;
            for i in start + 1..=end {
                acc.add_encoded(vector.get(i)?)?;
            }
            acc.encode_into(scratch);
        }
    }
    Ok(())
}

fn set_timestamp(out: &mut ColumnValue, ts: i64) {
    match out {
        ColumnValue::Timestamp(slot) => *slot = ts,
        _ => unreachable!("time aggregator writes into a timestamp slot"),
    }
}

fn set_double(out: &mut ColumnValue, v: f64) {
    match out {
        ColumnValue::Double(slot) => *slot = v,
        _ => unreachable!("double aggregator writes into a double slot"),
    }
}
