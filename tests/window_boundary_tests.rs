//! Period boundary behavior through the full batch driver
//!
//! Buckets are left-open, right-closed: a sample sitting exactly on a
//! resolution boundary closes the bucket ending there, and a sample one
//! millisecond later opens the next one. These tests pin that convention,
//! the window gate on the period end, and the no-fabrication rule.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use strata_downsampler::downsample::{BatchDriver, DownsamplerSettings};
use strata_downsampler::memory::ArenaConfig;
use strata_downsampler::partition::{RawChunkData, RawPartData};
use strata_downsampler::schema::{
    AggregatorSpec, ColumnSpec, ColumnType, DownsampleSpec, DoubleOp, Schema, SchemaRegistry,
};
use strata_downsampler::store::MemorySink;
use strata_downsampler::types::{DsResolution, TimeRange};
use strata_downsampler::vectors::{encode_doubles, encode_timestamps, DoubleVector, LongVector};

const FIVE_MIN: i64 = 300_000;
const HOUR: i64 = 3_600_000;
/// 17:00:00.000 on some day, i.e. an exact hour boundary
const T17: i64 = 472_222 * HOUR;

// ============================================================================
// Helpers
// ============================================================================

fn registry() -> Arc<SchemaRegistry> {
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
    };
    let mut reg = SchemaRegistry::new();
    reg.register(1, raw, Some(ds)).unwrap();
    Arc::new(reg)
}

fn five_min_settings() -> DownsamplerSettings {
    DownsamplerSettings {
        raw_dataset: "prometheus".to_string(),
        resolutions: vec![(DsResolution::from_minutes(5), 86_400)],
        store_write_timeout: Duration::from_secs(5),
    }
}

fn blob(samples: &[(i64, f64)]) -> Bytes {
    let ts: Vec<i64> = samples.iter().map(|(t, _)| *t).collect();
    let vals: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
    let mut ts_vec = Vec::new();
    encode_timestamps(&ts, &mut ts_vec);
    let mut val_vec = Vec::new();
    encode_doubles(&vals, &mut val_vec);

    let mut part = RawPartData::new(1, b"series-a");
    part.chunks.push(RawChunkData {
        start_time: ts[0],
        end_time: ts[ts.len() - 1],
        num_rows: ts.len() as u32,
        columns: vec![ts_vec, val_vec],
    });
    Bytes::from(part.encode())
}

/// Run one partition through a driver and return (ts, sum, max) per row
async fn run(samples: &[(i64, f64)], window: TimeRange) -> Vec<(i64, f64, f64)> {
    let sink = Arc::new(MemorySink::new());
    let mut driver = BatchDriver::new(
        registry(),
        sink.clone(),
        five_min_settings(),
        &ArenaConfig::default(),
    )
    .unwrap();

    driver
        .downsample_batch(&[blob(samples)], window)
        .await
        .unwrap();

    let mut rows = Vec::new();
    for chunk in sink.chunks("prometheus_ds_5") {
        let ts = LongVector::wrap(&chunk.columns[0]).unwrap();
        let sums = DoubleVector::wrap(&chunk.columns[1]).unwrap();
        let maxes = DoubleVector::wrap(&chunk.columns[2]).unwrap();
        for i in 0..chunk.num_rows {
            rows.push((ts.get(i), sums.get(i), maxes.get(i)));
        }
    }
    rows
}

// ============================================================================
// Boundary scenarios
// ============================================================================

#[tokio::test]
async fn test_single_chunk_single_bucket() {
    // four samples between 16:55:01 and 17:00:00 land in the bucket
    // ending at 17:00:00
    let samples = [
        (T17 - 299_000, 1.0),
        (T17 - 210_000, 2.0),
        (T17 - 1_000, 3.0),
        (T17, 4.0),
    ];
    let window = TimeRange::new(T17 - HOUR, T17 + HOUR).unwrap();
    assert_eq!(run(&samples, window).await, vec![(T17, 10.0, 4.0)]);
}

#[tokio::test]
async fn test_sample_exactly_on_boundary() {
    let window = TimeRange::new(T17 - HOUR, T17 + HOUR).unwrap();
    let rows = run(&[(T17, 7.0)], window).await;
    // the 17:00:00.000 sample closes the 17:00 bucket; no 17:05 row
    assert_eq!(rows, vec![(T17, 7.0, 7.0)]);
}

#[tokio::test]
async fn test_sample_one_ms_after_boundary() {
    let window = TimeRange::new(T17 - HOUR, T17 + HOUR).unwrap();
    let rows = run(&[(T17 + 1, 7.0)], window).await;
    assert_eq!(rows, vec![(T17 + FIVE_MIN, 7.0, 7.0)]);
}

#[tokio::test]
async fn test_window_excludes_period_by_its_end() {
    let samples = [
        (T17 - 299_000, 1.0),
        (T17 - 210_000, 2.0),
        (T17 - 1_000, 3.0),
        (T17, 4.0),
    ];
    // period end T17 is one ms before the window opens
    let window = TimeRange::new(T17 + 1, T17 + HOUR).unwrap();
    assert!(run(&samples, window).await.is_empty());
}

#[tokio::test]
async fn test_no_rows_fabricated_for_empty_periods() {
    let samples = [(T17, 1.0), (T17 + 4 * FIVE_MIN, 2.0)];
    let window = TimeRange::new(T17 - HOUR, T17 + HOUR).unwrap();
    let rows = run(&samples, window).await;
    assert_eq!(
        rows,
        vec![(T17, 1.0, 1.0), (T17 + 4 * FIVE_MIN, 2.0, 2.0)]
    );
}

#[tokio::test]
async fn test_bucket_ends_are_resolution_multiples() {
    let samples: Vec<(i64, f64)> = (0..50)
        .map(|i| (T17 + 1 + i * 37_000, i as f64))
        .collect();
    let window = TimeRange::new(T17 - HOUR, T17 + HOUR).unwrap();
    let rows = run(&samples, window).await;
    assert!(!rows.is_empty());
    for (ts, _, _) in rows {
        assert_eq!(ts % FIVE_MIN, 0, "bucket end {} not aligned", ts);
        assert!(window.contains(ts));
    }
}

#[tokio::test]
async fn test_emitted_timestamps_strictly_increase() {
    let samples: Vec<(i64, f64)> = (0..200)
        .map(|i| (T17 + 1 + i * 13_000, 1.0))
        .collect();
    let window = TimeRange::new(T17 - HOUR, T17 + HOUR).unwrap();
    let rows = run(&samples, window).await;
    for pair in rows.windows(2) {
        assert!(pair[0].0 < pair[1].0);
    }
}

#[tokio::test]
async fn test_periods_straddling_batch_windows_emitted_once() {
    // Two consecutive batch windows split at an arbitrary ms inside a
    // bucket. Only the window containing the bucket end emits it.
    let samples: Vec<(i64, f64)> = (0..20)
        .map(|i| (T17 + 1 + i * 60_000, 1.0))
        .collect();
    let split = T17 + 7 * 60_000 + 123;
    let first = TimeRange::new(T17 - HOUR, split).unwrap();
    let second = TimeRange::new(split + 1, T17 + HOUR).unwrap();

    let mut all: Vec<i64> = Vec::new();
    all.extend(run(&samples, first).await.iter().map(|r| r.0));
    let first_count = all.len();
    all.extend(run(&samples, second).await.iter().map(|r| r.0));

    assert!(first_count > 0 && first_count < all.len());
    let mut deduped = all.clone();
    deduped.dedup();
    assert_eq!(all, deduped, "a bucket was emitted by both batches");
}
