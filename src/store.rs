//! Store sink boundary
//!
//! The downsampler never talks to the wide-column store directly; it hands
//! per-resolution chunk sets to a [`ChunkSink`] and treats the response as
//! authoritative. Transient retries are the sink's concern. [`MemorySink`]
//! is the recording implementation used by tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::partition::ChunkSet;
use crate::types::DatasetRef;

/// Final outcome of one dataset write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResponse {
    /// All chunk sets were durably written
    Success,
    /// The write failed; the message is sink-specific
    Failure(String),
}

/// Write sink for downsampled chunk sets
///
/// Implementations must be atomic at chunk-set granularity and honor the
/// TTL per row. The shared store client behind an implementation is
/// expected to be thread-safe.
#[async_trait]
pub trait ChunkSink: Send + Sync + 'static {
    /// Write a batch of chunk sets to `dataset` with a per-row TTL
    async fn write_chunks(
        &self,
        dataset: &DatasetRef,
        chunks: Vec<ChunkSet>,
        ttl_secs: u64,
    ) -> WriteResponse;
}

/// One recorded write against a [`MemorySink`]
#[derive(Debug, Clone)]
pub struct SinkWrite {
    /// Chunk sets of the write, in arrival order
    pub chunks: Vec<ChunkSet>,
    /// TTL the write carried
    pub ttl_secs: u64,
}

/// In-memory recording sink
///
/// Records every write keyed by dataset name. A failure switch makes all
/// subsequent writes report [`WriteResponse::Failure`], and an optional
/// artificial delay lets tests exercise the write timeout path.
#[derive(Debug, Default)]
pub struct MemorySink {
    written: Mutex<HashMap<String, Vec<SinkWrite>>>,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that delays every write by `delay` before acknowledging
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Toggle the failure switch
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Names of all datasets written so far
    pub fn datasets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.written.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Writes recorded against `dataset`
    pub fn writes(&self, dataset: &str) -> Vec<SinkWrite> {
        self.written
            .lock()
            .get(dataset)
            .cloned()
            .unwrap_or_default()
    }

    /// All chunk sets written to `dataset`, flattened across writes
    pub fn chunks(&self, dataset: &str) -> Vec<ChunkSet> {
        self.writes(dataset)
            .into_iter()
            .flat_map(|w| w.chunks)
            .collect()
    }
}

#[async_trait]
impl ChunkSink for MemorySink {
    async fn write_chunks(
        &self,
        dataset: &DatasetRef,
        chunks: Vec<ChunkSet>,
        ttl_secs: u64,
    ) -> WriteResponse {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return WriteResponse::Failure("sink failure injected".to_string());
        }
        self.written
            .lock()
            .entry(dataset.as_str().to_string())
            .or_default()
            .push(SinkWrite { chunks, ttl_secs });
        WriteResponse::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn chunk() -> ChunkSet {
        ChunkSet {
            partition_key: Bytes::from_static(b"key"),
            start_time: 1_000,
            end_time: 2_000,
            num_rows: 2,
            ingestion_time: 1_000,
            columns: vec![Bytes::from_static(b"vec")],
        }
    }

    #[tokio::test]
    async fn test_memory_sink_records_writes() {
        let sink = MemorySink::new();
        let dataset = DatasetRef::downsample_of("prometheus", crate::types::DsResolution::from_minutes(5));

        let resp = sink.write_chunks(&dataset, vec![chunk()], 86_400).await;
        assert_eq!(resp, WriteResponse::Success);

        assert_eq!(sink.datasets(), vec!["prometheus_ds_5".to_string()]);
        let writes = sink.writes("prometheus_ds_5");
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].ttl_secs, 86_400);
        assert_eq!(writes[0].chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        let dataset = DatasetRef::downsample_of("prometheus", crate::types::DsResolution::from_minutes(5));

        let resp = sink.write_chunks(&dataset, vec![chunk()], 60).await;
        assert!(matches!(resp, WriteResponse::Failure(_)));
        assert!(sink.datasets().is_empty());
    }
}
