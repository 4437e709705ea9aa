//! Domain types shared across the trawler workspace.
//!
//! Everything here is plain data: jobs as they travel through the work
//! queue, per-batch timing records, and the orchestrator's view of a
//! worker instance. Behavior lives in the crates that own it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Backend-assigned identifier of a worker compute instance.
pub type InstanceId = String;

/// Identity a worker tags its metric records with. Usually its
/// instance id; `local` and `debug` are reserved for ad-hoc runs.
pub type WorkerId = String;

/// Current wall-clock time as milliseconds since the Unix epoch.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A scraping job as enqueued by a producer.
///
/// This is the queue message body. `enqueued_at_ms` is stamped by the
/// producer and carried in the payload so a consumer can compute the
/// job's end-to-end processing time without asking the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job category, e.g. `coren`.
    pub job_type: String,
    /// Target within the category, e.g. `sp`.
    pub job_name: String,
    /// Site-specific inputs, passed through to the scraper untouched.
    pub informations: HashMap<String, String>,
    /// Unix timestamp (ms) at which the producer created the job.
    pub enqueued_at_ms: u64,
}

impl Job {
    pub fn new(job_type: &str, job_name: &str, informations: HashMap<String, String>) -> Self {
        Self {
            job_type: job_type.to_string(),
            job_name: job_name.to_string(),
            informations,
            enqueued_at_ms: epoch_ms(),
        }
    }
}

/// A job plus the delivery metadata the queue backend attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedJob {
    pub job: Job,
    /// Opaque acknowledgment handle for this delivery. Changes on every
    /// redelivery; never a job identity.
    pub receipt: String,
    /// Unix timestamp (ms) at which the backend first handed this job
    /// to any consumer. Stable across redeliveries.
    pub first_received_at_ms: u64,
}

/// Outcome of one job attempt within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub receipt: String,
    pub success: bool,
    /// Completion time minus `Job::enqueued_at_ms`.
    pub processing_time_ms: u64,
    /// Completion time minus `ReceivedJob::first_received_at_ms`.
    pub service_time_ms: u64,
}

/// Window a metric record covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// One processed batch.
    Batch,
    /// Running average over every batch the worker has processed.
    Cumulative,
}

/// Worker-tagged timing record published to the metrics sink.
///
/// Records are append-only history: once emitted they are never
/// mutated, and sizing decisions read them back by time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub worker_id: WorkerId,
    pub kind: MetricKind,
    /// Mean processing time over the successful jobs in scope (ms).
    pub avg_processing_ms: f64,
    /// Mean service time over the successful jobs in scope (ms).
    pub avg_service_ms: f64,
    /// Population variance of processing time (ms²).
    pub processing_variance: f64,
    /// Batches folded into this record: 1 for `Batch`, the worker's
    /// lifetime count for `Cumulative`.
    pub batches_processed: u64,
    pub timestamp_ms: u64,
}

/// Lifecycle state of a worker instance as reported by the compute
/// backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceLifecycle {
    Pending,
    Running,
    ShuttingDown,
    Stopped,
    Terminated,
    /// The backend could not answer; treated as "keep watching".
    Unavailable,
}

impl InstanceLifecycle {
    /// Final for the provisioning poll loop: the instance will not move
    /// further on its own. `Pending` and `Unavailable` keep polling.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            Self::Running | Self::ShuttingDown | Self::Stopped | Self::Terminated
        )
    }

    /// Counted into the fleet size: the instance holds, or is about to
    /// hold, scraping capacity.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for InstanceLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
            Self::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// A worker compute instance as the orchestrator sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetInstance {
    pub instance_id: InstanceId,
    pub instance_type: String,
    pub lifecycle: InstanceLifecycle,
    /// Set when this orchestrator created the instance. Only owned
    /// instances are candidates for automatic termination.
    pub orchestrator_owned: bool,
}

impl FleetInstance {
    /// Burstable families accumulate and spend CPU credits; their
    /// balance is worth watching during a run.
    pub fn is_burstable(&self) -> bool {
        let family = self.instance_type.split('.').next().unwrap_or("");
        matches!(family, "t2" | "t3" | "t3a" | "t4g")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_instance(instance_type: &str) -> FleetInstance {
        FleetInstance {
            instance_id: "i-0001".to_string(),
            instance_type: instance_type.to_string(),
            lifecycle: InstanceLifecycle::Running,
            orchestrator_owned: true,
        }
    }

    #[test]
    fn job_roundtrips_through_json() {
        let mut informations = HashMap::new();
        informations.insert("registrationNumber".to_string(), "1109410".to_string());
        let job = Job::new("coren", "sp", informations);

        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, job);
        assert!(encoded.contains("\"job_type\":\"coren\""));
        assert!(encoded.contains("\"registrationNumber\":\"1109410\""));
    }

    #[test]
    fn lifecycle_finality() {
        assert!(InstanceLifecycle::Running.is_final());
        assert!(InstanceLifecycle::Terminated.is_final());
        assert!(InstanceLifecycle::Stopped.is_final());
        assert!(InstanceLifecycle::ShuttingDown.is_final());
        assert!(!InstanceLifecycle::Pending.is_final());
        assert!(!InstanceLifecycle::Unavailable.is_final());
    }

    #[test]
    fn lifecycle_activity() {
        assert!(InstanceLifecycle::Pending.is_active());
        assert!(InstanceLifecycle::Running.is_active());
        assert!(!InstanceLifecycle::ShuttingDown.is_active());
        assert!(!InstanceLifecycle::Terminated.is_active());
    }

    #[test]
    fn lifecycle_serializes_kebab_case() {
        let encoded = serde_json::to_string(&InstanceLifecycle::ShuttingDown).unwrap();
        assert_eq!(encoded, "\"shutting-down\"");
    }

    #[test]
    fn burstable_families() {
        assert!(make_instance("t2.small").is_burstable());
        assert!(make_instance("t3.micro").is_burstable());
        assert!(make_instance("t4g.nano").is_burstable());
        assert!(!make_instance("m5.large").is_burstable());
        assert!(!make_instance("c5.xlarge").is_burstable());
    }

    #[test]
    fn epoch_ms_is_monotonic_enough() {
        let a = epoch_ms();
        let b = epoch_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }
}
