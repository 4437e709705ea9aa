//! Scripted in-process backends for tests and local runs.

use async_trait::async_trait;
use tokio::sync::Mutex;
use trawler_core::{FleetInstance, InstanceLifecycle};

use crate::backend::{ComputeBackend, ExecOutput, InstanceFilter, RemoteExec, StateTransition};
use crate::error::{FleetError, FleetResult};

struct SimInstance {
    info: FleetInstance,
    /// Status queries answered so far.
    status_polls: u32,
    /// Remaining status queries to fail before answering again.
    failing_polls: u32,
    credit_balance: Option<f64>,
}

#[derive(Default)]
struct SimInner {
    // insertion order keeps describe_instances deterministic
    instances: Vec<SimInstance>,
    next_id: u32,
}

impl SimInner {
    fn find_mut(&mut self, id: &str) -> FleetResult<&mut SimInstance> {
        self.instances
            .iter_mut()
            .find(|instance| instance.info.instance_id == id)
            .ok_or_else(|| FleetError::InstanceNotFound(id.to_string()))
    }
}

/// In-memory compute backend whose instances "boot" after a scripted
/// number of status polls.
pub struct SimCompute {
    inner: Mutex<SimInner>,
    boot_polls: u32,
}

impl SimCompute {
    /// Instances answer `Pending` once, then `Running`.
    pub fn new() -> Self {
        Self::with_boot_polls(1)
    }

    /// Instances answer `Pending` for the first `boot_polls` status
    /// queries. 0 boots instances on the first query.
    pub fn with_boot_polls(boot_polls: u32) -> Self {
        Self {
            inner: Mutex::new(SimInner::default()),
            boot_polls,
        }
    }

    /// Drop an instance into the backend directly, as if somebody
    /// provisioned it outside the orchestrator.
    pub async fn seed(
        &self,
        instance_type: &str,
        lifecycle: InstanceLifecycle,
        orchestrator_owned: bool,
    ) -> String {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = format!("sim-{:04}", inner.next_id);
        inner.instances.push(SimInstance {
            info: FleetInstance {
                instance_id: id.clone(),
                instance_type: instance_type.to_string(),
                lifecycle,
                orchestrator_owned,
            },
            status_polls: 0,
            failing_polls: 0,
            credit_balance: default_credits(instance_type),
        });
        id
    }

    pub async fn set_lifecycle(&self, id: &str, lifecycle: InstanceLifecycle) -> FleetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.find_mut(id)?.info.lifecycle = lifecycle;
        Ok(())
    }

    /// Make the next `polls` status queries for `id` fail.
    pub async fn fail_status_queries(&self, id: &str, polls: u32) -> FleetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.find_mut(id)?.failing_polls = polls;
        Ok(())
    }

    pub async fn set_credit_balance(&self, id: &str, balance: f64) -> FleetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.find_mut(id)?.credit_balance = Some(balance);
        Ok(())
    }
}

impl Default for SimCompute {
    fn default() -> Self {
        Self::new()
    }
}

fn default_credits(instance_type: &str) -> Option<f64> {
    let family = instance_type.split('.').next().unwrap_or("");
    matches!(family, "t2" | "t3" | "t3a" | "t4g").then_some(100.0)
}

#[async_trait]
impl ComputeBackend for SimCompute {
    async fn create_instances(
        &self,
        count: u32,
        instance_type: &str,
        _image_id: &str,
        orchestrator_owned: bool,
    ) -> FleetResult<Vec<FleetInstance>> {
        let mut inner = self.inner.lock().await;
        let mut created = Vec::with_capacity(count as usize);
        for _ in 0..count {
            inner.next_id += 1;
            let info = FleetInstance {
                instance_id: format!("sim-{:04}", inner.next_id),
                instance_type: instance_type.to_string(),
                lifecycle: InstanceLifecycle::Pending,
                orchestrator_owned,
            };
            inner.instances.push(SimInstance {
                info: info.clone(),
                status_polls: 0,
                failing_polls: 0,
                credit_balance: default_credits(instance_type),
            });
            created.push(info);
        }
        Ok(created)
    }

    async fn describe_instances(&self, filter: &InstanceFilter) -> FleetResult<Vec<FleetInstance>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .instances
            .iter()
            .map(|instance| instance.info.clone())
            .filter(|info| filter.matches(info))
            .collect())
    }

    async fn terminate_instances(&self, ids: &[String]) -> FleetResult<Vec<StateTransition>> {
        let mut inner = self.inner.lock().await;
        let mut transitions = Vec::with_capacity(ids.len());
        for id in ids {
            let instance = inner.find_mut(id)?;
            let previous = instance.info.lifecycle;
            instance.info.lifecycle = InstanceLifecycle::ShuttingDown;
            transitions.push(StateTransition {
                instance_id: id.clone(),
                previous,
                current: InstanceLifecycle::ShuttingDown,
            });
        }
        Ok(transitions)
    }

    async fn instance_status(&self, id: &str) -> FleetResult<InstanceLifecycle> {
        let mut inner = self.inner.lock().await;
        let boot_polls = self.boot_polls;
        let instance = inner.find_mut(id)?;
        if instance.failing_polls > 0 {
            instance.failing_polls -= 1;
            return Err(FleetError::Backend(format!("status query refused for {id}")));
        }
        instance.status_polls += 1;
        if instance.info.lifecycle == InstanceLifecycle::Pending
            && instance.status_polls > boot_polls
        {
            instance.info.lifecycle = InstanceLifecycle::Running;
        }
        Ok(instance.info.lifecycle)
    }

    async fn public_address(&self, id: &str) -> FleetResult<String> {
        let mut inner = self.inner.lock().await;
        inner.find_mut(id)?;
        Ok(format!("{id}.sim.local"))
    }

    async fn credit_balance(&self, id: &str) -> FleetResult<Option<f64>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.find_mut(id)?.credit_balance)
    }
}

/// Remote-exec stub that records every call.
#[derive(Default)]
pub struct SimExec {
    calls: Mutex<Vec<(String, String)>>,
    fail_next: Mutex<Option<String>>,
}

impl SimExec {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(host, command)` pairs in execution order.
    pub async fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().await.clone()
    }

    /// Make the next execute call fail with `message`.
    pub async fn fail_next(&self, message: &str) {
        *self.fail_next.lock().await = Some(message.to_string());
    }
}

#[async_trait]
impl RemoteExec for SimExec {
    async fn execute(&self, host: &str, command: &str) -> FleetResult<ExecOutput> {
        if let Some(message) = self.fail_next.lock().await.take() {
            return Err(FleetError::RemoteExec(message));
        }
        self.calls
            .lock()
            .await
            .push((host.to_string(), command.to_string()));
        Ok(ExecOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}
