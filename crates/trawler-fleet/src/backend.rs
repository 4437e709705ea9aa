//! Compute and remote-execution seams.

use async_trait::async_trait;
use serde::Serialize;
use trawler_core::{FleetInstance, InstanceLifecycle};

use crate::error::FleetResult;

/// Server-side filter for [`ComputeBackend::describe_instances`].
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    /// Keep instances in any of these states; empty keeps all.
    pub states: Vec<InstanceLifecycle>,
    /// When set, keep only orchestrator-owned (or only foreign)
    /// instances.
    pub orchestrator_owned: Option<bool>,
}

impl InstanceFilter {
    /// Instances that count toward the fleet size.
    pub fn active() -> Self {
        Self {
            states: vec![InstanceLifecycle::Pending, InstanceLifecycle::Running],
            orchestrator_owned: None,
        }
    }

    /// Candidates for automatic termination.
    pub fn owned_running() -> Self {
        Self {
            states: vec![InstanceLifecycle::Running],
            orchestrator_owned: Some(true),
        }
    }

    pub fn matches(&self, instance: &FleetInstance) -> bool {
        if !self.states.is_empty() && !self.states.contains(&instance.lifecycle) {
            return false;
        }
        if let Some(owned) = self.orchestrator_owned
            && instance.orchestrator_owned != owned
        {
            return false;
        }
        true
    }
}

/// One instance's state change from a terminate call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    pub instance_id: String,
    pub previous: InstanceLifecycle,
    pub current: InstanceLifecycle,
}

/// Cloud compute operations the fleet manager needs.
///
/// Vendor adapters implement this against their instance APIs;
/// [`SimCompute`](crate::sim::SimCompute) is the in-tree stand-in.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Launch `count` instances in one batched request. Returns them
    /// still `Pending`, without waiting for readiness.
    async fn create_instances(
        &self,
        count: u32,
        instance_type: &str,
        image_id: &str,
        orchestrator_owned: bool,
    ) -> FleetResult<Vec<FleetInstance>>;

    async fn describe_instances(&self, filter: &InstanceFilter) -> FleetResult<Vec<FleetInstance>>;

    /// Ask the backend to terminate the given instances. Every id must
    /// be known to the backend.
    async fn terminate_instances(&self, ids: &[String]) -> FleetResult<Vec<StateTransition>>;

    /// Point-in-time lifecycle state of one instance.
    async fn instance_status(&self, id: &str) -> FleetResult<InstanceLifecycle>;

    /// Address the orchestrator can reach the instance on.
    async fn public_address(&self, id: &str) -> FleetResult<String>;

    /// CPU credit balance for burstable types; `None` when the type
    /// has no credit mechanism.
    async fn credit_balance(&self, id: &str) -> FleetResult<Option<f64>>;
}

/// Output of one remote command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Channel for launching commands on a worker instance.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    async fn execute(&self, host: &str, command: &str) -> FleetResult<ExecOutput>;
}
