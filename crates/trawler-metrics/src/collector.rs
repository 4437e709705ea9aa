//! Orchestrator-side aggregation of worker metrics.

use std::sync::Arc;
use tracing::{debug, warn};
use trawler_core::{FleetInstance, MetricKind};
use trawler_fleet::ComputeBackend;
use trawler_queue::WorkQueue;

use crate::sink::MetricsSink;

/// Assumed service time until real worker numbers arrive (ms).
/// Deliberately pessimistic so a cold start over-provisions rather
/// than blowing the SLA while the first measurements trickle in.
pub const DEFAULT_SERVICE_TIME_MS: f64 = 20_000.0;

/// Worker identities whose records never count toward cluster
/// averages. Ad-hoc runs from a laptop would poison the sizing input.
const EXCLUDED_WORKERS: &[&str] = &["local", "debug"];

/// Cluster-wide view assembled once per decision tick. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSnapshot {
    pub queue_depth: u64,
    pub oldest_message_age_ms: u64,
    pub avg_service_time_ms: f64,
    pub avg_processing_time_ms: f64,
    pub fleet_size: u32,
    /// CPU credit balance of the first burstable instance, when the
    /// fleet has one and the backend can answer.
    pub credit_balance: Option<f64>,
}

pub struct ClusterMetrics {
    sink: Arc<dyn MetricsSink>,
    queue: Arc<dyn WorkQueue>,
    compute: Arc<dyn ComputeBackend>,
}

impl ClusterMetrics {
    pub fn new(
        sink: Arc<dyn MetricsSink>,
        queue: Arc<dyn WorkQueue>,
        compute: Arc<dyn ComputeBackend>,
    ) -> Self {
        Self {
            sink,
            queue,
            compute,
        }
    }

    /// Fold the worker records emitted since `window_start_ms` together
    /// with live queue signals into one snapshot. `fleet` is the
    /// current set of active instances, already fetched by the caller.
    ///
    /// Only `Cumulative` records count: each worker's latest lifetime
    /// average carries its whole history, so averaging those across
    /// workers weighs each worker equally regardless of chattiness.
    pub async fn snapshot(
        &self,
        window_start_ms: u64,
        fleet: &[FleetInstance],
    ) -> anyhow::Result<ClusterSnapshot> {
        let records = self.sink.query_since(window_start_ms).await?;
        let samples: Vec<_> = records
            .iter()
            .filter(|record| {
                record.kind == MetricKind::Cumulative
                    && !EXCLUDED_WORKERS.contains(&record.worker_id.as_str())
            })
            .collect();

        let (avg_service_time_ms, avg_processing_time_ms) = if samples.is_empty() {
            debug!("no worker metrics in window, assuming cold-start service time");
            (DEFAULT_SERVICE_TIME_MS, 0.0)
        } else {
            let n = samples.len() as f64;
            (
                samples.iter().map(|r| r.avg_service_ms).sum::<f64>() / n,
                samples.iter().map(|r| r.avg_processing_ms).sum::<f64>() / n,
            )
        };

        let queue_depth = self.queue.approximate_depth().await?;
        let oldest_message_age_ms = self.queue.oldest_message_age_ms().await?;
        let credit_balance = self.credit_balance(fleet).await;

        Ok(ClusterSnapshot {
            queue_depth,
            oldest_message_age_ms,
            avg_service_time_ms,
            avg_processing_time_ms,
            fleet_size: fleet.len() as u32,
            credit_balance,
        })
    }

    /// Credit balance of the first burstable instance in the fleet.
    /// Purely observational, so a failed query degrades to `None`.
    async fn credit_balance(&self, fleet: &[FleetInstance]) -> Option<f64> {
        let instance = fleet.iter().find(|i| i.is_burstable())?;
        match self.compute.credit_balance(&instance.instance_id).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(
                    instance_id = %instance.instance_id,
                    error = %e,
                    "credit balance query failed"
                );
                None
            }
        }
    }
}
