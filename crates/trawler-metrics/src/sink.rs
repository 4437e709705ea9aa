//! The metrics sink abstraction and the in-memory backend.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use trawler_core::MetricRecord;

pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("append failed: {0}")]
    Append(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Append-only store of worker metric records.
///
/// Backends that need ordered-append bookkeeping (sequence tokens and
/// the like) keep it to themselves behind `append`; callers never see
/// it.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn append(&self, record: &MetricRecord) -> SinkResult<()>;

    /// Records with `timestamp_ms >= since_ms`, oldest first.
    async fn query_since(&self, since_ms: u64) -> SinkResult<Vec<MetricRecord>>;
}

/// In-process sink for tests and single-node runs.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<MetricRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn append(&self, record: &MetricRecord) -> SinkResult<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn query_since(&self, since_ms: u64) -> SinkResult<Vec<MetricRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|record| record.timestamp_ms >= since_ms)
            .cloned()
            .collect())
    }
}
