//! Worker-side metrics reporting.
//!
//! Statistics are computed over a batch's successful jobs only. A
//! failed job's timings describe the failure path, not the work, and
//! the job will be back after its visibility timeout anyway. A batch
//! with zero successes contributes no sample at all.

use std::sync::Arc;
use tracing::{debug, warn};
use trawler_core::{epoch_ms, BatchResult, MetricKind, MetricRecord};

use crate::sink::MetricsSink;

/// Timing statistics for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStats {
    /// Successful jobs the stats are computed over.
    pub sample_count: usize,
    pub avg_processing_ms: f64,
    pub avg_service_ms: f64,
    /// Population variance of processing time (ms²).
    pub processing_variance: f64,
}

/// Computes batch statistics and publishes per-batch plus
/// lifetime-cumulative records for one worker.
pub struct MetricsReporter {
    worker_id: String,
    sink: Arc<dyn MetricsSink>,
    batches_recorded: u64,
    processing_avg_acc: f64,
    service_avg_acc: f64,
    variance_acc: f64,
}

impl MetricsReporter {
    pub fn new(worker_id: impl Into<String>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            worker_id: worker_id.into(),
            sink,
            batches_recorded: 0,
            processing_avg_acc: 0.0,
            service_avg_acc: 0.0,
            variance_acc: 0.0,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn batches_recorded(&self) -> u64 {
        self.batches_recorded
    }

    /// Stats over the batch's successful results; `None` when nothing
    /// succeeded.
    pub fn batch_stats(results: &[BatchResult]) -> Option<BatchStats> {
        let samples: Vec<&BatchResult> = results.iter().filter(|r| r.success).collect();
        if samples.is_empty() {
            return None;
        }
        let k = samples.len() as f64;
        let avg_processing_ms = samples
            .iter()
            .map(|r| r.processing_time_ms as f64)
            .sum::<f64>()
            / k;
        let avg_service_ms = samples
            .iter()
            .map(|r| r.service_time_ms as f64)
            .sum::<f64>()
            / k;
        let processing_variance = samples
            .iter()
            .map(|r| {
                let d = r.processing_time_ms as f64 - avg_processing_ms;
                d * d
            })
            .sum::<f64>()
            / k;
        Some(BatchStats {
            sample_count: samples.len(),
            avg_processing_ms,
            avg_service_ms,
            processing_variance,
        })
    }

    /// Record one batch: fold its stats into the lifetime accumulators
    /// and publish one `Batch` and one `Cumulative` record. A batch
    /// with no successes returns `None` and touches nothing.
    pub async fn record_batch(&mut self, results: &[BatchResult]) -> Option<BatchStats> {
        let stats = Self::batch_stats(results)?;

        self.batches_recorded += 1;
        self.processing_avg_acc += stats.avg_processing_ms;
        self.service_avg_acc += stats.avg_service_ms;
        self.variance_acc += stats.processing_variance;

        let now = epoch_ms();
        let batches = self.batches_recorded as f64;

        self.publish(&MetricRecord {
            worker_id: self.worker_id.clone(),
            kind: MetricKind::Batch,
            avg_processing_ms: stats.avg_processing_ms,
            avg_service_ms: stats.avg_service_ms,
            processing_variance: stats.processing_variance,
            batches_processed: 1,
            timestamp_ms: now,
        })
        .await;

        self.publish(&MetricRecord {
            worker_id: self.worker_id.clone(),
            kind: MetricKind::Cumulative,
            avg_processing_ms: self.processing_avg_acc / batches,
            avg_service_ms: self.service_avg_acc / batches,
            processing_variance: self.variance_acc / batches,
            batches_processed: self.batches_recorded,
            timestamp_ms: now,
        })
        .await;

        debug!(
            worker_id = %self.worker_id,
            samples = stats.sample_count,
            avg_processing_ms = stats.avg_processing_ms,
            avg_service_ms = stats.avg_service_ms,
            "batch metrics recorded"
        );
        Some(stats)
    }

    /// Losing a record must never take the consumption loop down.
    async fn publish(&self, record: &MetricRecord) {
        if let Err(e) = self.sink.append(record).await {
            warn!(
                worker_id = %self.worker_id,
                error = %e,
                "metrics sink write failed, record dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, SinkError, SinkResult};
    use async_trait::async_trait;

    fn success(processing_time_ms: u64, service_time_ms: u64) -> BatchResult {
        BatchResult {
            receipt: "r".to_string(),
            success: true,
            processing_time_ms,
            service_time_ms,
        }
    }

    fn failure() -> BatchResult {
        BatchResult {
            receipt: "r".to_string(),
            success: false,
            processing_time_ms: 999_999,
            service_time_ms: 999_999,
        }
    }

    struct FailingSink;

    #[async_trait]
    impl MetricsSink for FailingSink {
        async fn append(&self, _record: &MetricRecord) -> SinkResult<()> {
            Err(SinkError::Append("sink offline".to_string()))
        }

        async fn query_since(&self, _since_ms: u64) -> SinkResult<Vec<MetricRecord>> {
            Err(SinkError::Query("sink offline".to_string()))
        }
    }

    #[test]
    fn stats_ignore_failures() {
        let results = vec![success(1_000, 800), failure(), success(3_000, 1_200)];
        let stats = MetricsReporter::batch_stats(&results).unwrap();
        assert_eq!(stats.sample_count, 2);
        assert_eq!(stats.avg_processing_ms, 2_000.0);
        assert_eq!(stats.avg_service_ms, 1_000.0);
    }

    #[test]
    fn all_failed_batch_has_no_stats() {
        let results = vec![failure(), failure()];
        assert!(MetricsReporter::batch_stats(&results).is_none());
        assert!(MetricsReporter::batch_stats(&[]).is_none());
    }

    #[test]
    fn single_sample_has_zero_variance() {
        let stats = MetricsReporter::batch_stats(&[success(5_000, 4_000)]).unwrap();
        assert_eq!(stats.processing_variance, 0.0);
        assert!(stats.processing_variance.is_finite());
    }

    #[test]
    fn population_variance() {
        let results = vec![success(1_000, 1), success(2_000, 1), success(3_000, 1)];
        let stats = MetricsReporter::batch_stats(&results).unwrap();
        // mean 2000, squared deviations (1e6, 0, 1e6) over k=3
        let expected = 2_000_000.0 / 3.0;
        assert!((stats.processing_variance - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn record_batch_publishes_batch_and_cumulative() {
        let sink = Arc::new(MemorySink::new());
        let mut reporter = MetricsReporter::new("sim-0001", sink.clone());

        reporter.record_batch(&[success(1_000, 500)]).await.unwrap();
        reporter.record_batch(&[success(3_000, 1_500)]).await.unwrap();

        let records = sink.query_since(0).await.unwrap();
        assert_eq!(records.len(), 4);

        let cumulative: Vec<&MetricRecord> = records
            .iter()
            .filter(|r| r.kind == MetricKind::Cumulative)
            .collect();
        assert_eq!(cumulative.len(), 2);
        // average of per-batch averages, not of raw samples
        assert_eq!(cumulative[1].avg_processing_ms, 2_000.0);
        assert_eq!(cumulative[1].avg_service_ms, 1_000.0);
        assert_eq!(cumulative[1].batches_processed, 2);

        let batch: Vec<&MetricRecord> =
            records.iter().filter(|r| r.kind == MetricKind::Batch).collect();
        assert_eq!(batch[1].avg_processing_ms, 3_000.0);
        assert_eq!(batch[1].batches_processed, 1);
    }

    #[tokio::test]
    async fn all_failed_batch_records_nothing() {
        let sink = Arc::new(MemorySink::new());
        let mut reporter = MetricsReporter::new("sim-0001", sink.clone());

        assert!(reporter.record_batch(&[failure(), failure()]).await.is_none());
        assert_eq!(reporter.batches_recorded(), 0);
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn sink_failure_is_swallowed() {
        let mut reporter = MetricsReporter::new("sim-0001", Arc::new(FailingSink));
        let stats = reporter.record_batch(&[success(1_000, 500)]).await;
        assert!(stats.is_some());
        assert_eq!(reporter.batches_recorded(), 1);
    }
}
