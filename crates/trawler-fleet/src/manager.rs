//! Fleet lifecycle operations over the backend seams.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use trawler_core::config::FleetConfig;
use trawler_core::{FleetInstance, InstanceLifecycle};

use crate::backend::{ComputeBackend, InstanceFilter, RemoteExec, StateTransition};
use crate::error::{FleetError, FleetResult};

/// What to terminate: specific instances, or however many the caller
/// wants gone.
#[derive(Debug, Clone)]
pub enum TerminateTarget {
    Ids(Vec<String>),
    /// Select up to this many orchestrator-owned running instances.
    Count(u32),
}

pub struct FleetManager {
    backend: Arc<dyn ComputeBackend>,
    exec: Arc<dyn RemoteExec>,
    config: FleetConfig,
}

impl FleetManager {
    pub fn new(
        backend: Arc<dyn ComputeBackend>,
        exec: Arc<dyn RemoteExec>,
        config: FleetConfig,
    ) -> Self {
        Self {
            backend,
            exec,
            config,
        }
    }

    /// Launch `count` orchestrator-owned instances. Returns them still
    /// `Pending`; readiness is the caller's problem via
    /// [`poll_until_final`](Self::poll_until_final).
    pub async fn create(&self, count: u32) -> FleetResult<Vec<FleetInstance>> {
        info!(
            count,
            instance_type = %self.config.instance_type,
            image_id = %self.config.image_id,
            "creating instances"
        );
        self.backend
            .create_instances(count, &self.config.instance_type, &self.config.image_id, true)
            .await
    }

    /// Every instance currently holding fleet capacity, pending or
    /// running, owned or not.
    pub async fn active_instances(&self) -> FleetResult<Vec<FleetInstance>> {
        self.backend
            .describe_instances(&InstanceFilter::active())
            .await
    }

    /// Poll one instance until it reaches a final lifecycle state.
    ///
    /// A failed status query counts as `Unavailable` and polling
    /// continues; transient API refusals right after create are
    /// routine. With `max_status_polls` > 0 the loop gives up after
    /// that many polls and reports the instance `Unavailable`.
    pub async fn poll_until_final(&self, instance_id: &str) -> InstanceLifecycle {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut polls: u32 = 0;
        loop {
            let status = match self.backend.instance_status(instance_id).await {
                Ok(status) => status,
                Err(e) => {
                    debug!(%instance_id, error = %e, "status query failed");
                    InstanceLifecycle::Unavailable
                }
            };
            if status.is_final() {
                debug!(%instance_id, %status, "instance reached a final status");
                return status;
            }
            polls += 1;
            if self.config.max_status_polls > 0 && polls >= self.config.max_status_polls {
                warn!(%instance_id, polls, "giving up waiting for a final instance status");
                return InstanceLifecycle::Unavailable;
            }
            debug!(%instance_id, %status, "instance not final yet");
            tokio::time::sleep(interval).await;
        }
    }

    /// Resolve the instance's address and launch the queue consumer on
    /// it as a detached background process. Returns once the launch
    /// command is accepted; the consumer keeps running after the
    /// session closes.
    pub async fn bootstrap(&self, instance_id: &str, capacity: u32) -> FleetResult<()> {
        let host = self.backend.public_address(instance_id).await?;
        let command = self.consume_command(instance_id, capacity);
        info!(%instance_id, %host, "bootstrapping queue consumer");
        let output = self.exec.execute(&host, &command).await?;
        if output.exit_code != 0 {
            return Err(FleetError::RemoteExec(format!(
                "consumer launch on {instance_id} exited {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    fn consume_command(&self, instance_id: &str, capacity: u32) -> String {
        format!(
            "cd {} && nohup ./trawlerd consume --batch-size {} --worker-id {} >> consume.log 2>&1 &",
            self.config.remote_workdir, capacity, instance_id,
        )
    }

    /// Terminate instances by explicit id, or select up to a count of
    /// orchestrator-owned running ones. Finding nothing to terminate
    /// is not an error.
    pub async fn terminate(&self, target: TerminateTarget) -> FleetResult<Vec<StateTransition>> {
        let ids = match target {
            TerminateTarget::Ids(ids) => ids,
            TerminateTarget::Count(count) => {
                let mut candidates = self
                    .backend
                    .describe_instances(&InstanceFilter::owned_running())
                    .await?;
                // deterministic pick order
                candidates.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
                candidates.truncate(count as usize);
                candidates
                    .into_iter()
                    .map(|instance| instance.instance_id)
                    .collect()
            }
        };
        if ids.is_empty() {
            warn!("no instances eligible for termination");
            return Ok(Vec::new());
        }
        info!(count = ids.len(), "terminating instances");
        self.backend.terminate_instances(&ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimCompute, SimExec};

    fn fast_config() -> FleetConfig {
        FleetConfig {
            poll_interval_ms: 1,
            ..FleetConfig::default()
        }
    }

    fn make_manager(compute: Arc<SimCompute>, exec: Arc<SimExec>) -> FleetManager {
        FleetManager::new(compute, exec, fast_config())
    }

    #[tokio::test]
    async fn created_instances_are_owned_and_pending() {
        let compute = Arc::new(SimCompute::new());
        let manager = make_manager(compute.clone(), Arc::new(SimExec::new()));

        let created = manager.create(2).await.unwrap();
        assert_eq!(created.len(), 2);
        for instance in &created {
            assert!(instance.orchestrator_owned);
            assert_eq!(instance.lifecycle, InstanceLifecycle::Pending);
            assert_eq!(instance.instance_type, "t2.small");
        }
    }

    #[tokio::test]
    async fn poll_rides_out_pending() {
        let compute = Arc::new(SimCompute::with_boot_polls(3));
        let manager = make_manager(compute.clone(), Arc::new(SimExec::new()));
        let created = manager.create(1).await.unwrap();

        let status = manager.poll_until_final(&created[0].instance_id).await;
        assert_eq!(status, InstanceLifecycle::Running);
    }

    #[tokio::test]
    async fn poll_survives_status_query_failures() {
        let compute = Arc::new(SimCompute::with_boot_polls(0));
        let manager = make_manager(compute.clone(), Arc::new(SimExec::new()));
        let created = manager.create(1).await.unwrap();
        let id = &created[0].instance_id;
        compute.fail_status_queries(id, 2).await.unwrap();

        let status = manager.poll_until_final(id).await;
        assert_eq!(status, InstanceLifecycle::Running);
    }

    #[tokio::test]
    async fn poll_gives_up_at_the_cap() {
        let compute = Arc::new(SimCompute::with_boot_polls(100));
        let config = FleetConfig {
            poll_interval_ms: 1,
            max_status_polls: 3,
            ..FleetConfig::default()
        };
        let manager = FleetManager::new(compute.clone(), Arc::new(SimExec::new()), config);
        let created = manager.create(1).await.unwrap();

        let status = manager.poll_until_final(&created[0].instance_id).await;
        assert_eq!(status, InstanceLifecycle::Unavailable);
    }

    #[tokio::test]
    async fn bootstrap_launches_a_detached_consumer() {
        let compute = Arc::new(SimCompute::new());
        let exec = Arc::new(SimExec::new());
        let manager = make_manager(compute.clone(), exec.clone());
        let created = manager.create(1).await.unwrap();
        let id = &created[0].instance_id;

        manager.bootstrap(id, 5).await.unwrap();

        let calls = exec.calls().await;
        assert_eq!(calls.len(), 1);
        let (host, command) = &calls[0];
        assert_eq!(host, &format!("{id}.sim.local"));
        assert!(command.contains("nohup ./trawlerd consume"));
        assert!(command.contains("--batch-size 5"));
        assert!(command.contains(&format!("--worker-id {id}")));
        assert!(command.trim_end().ends_with('&'));
    }

    #[tokio::test]
    async fn bootstrap_propagates_launch_failure() {
        let compute = Arc::new(SimCompute::new());
        let exec = Arc::new(SimExec::new());
        let manager = make_manager(compute.clone(), exec.clone());
        let created = manager.create(1).await.unwrap();
        exec.fail_next("connection refused").await;

        let result = manager.bootstrap(&created[0].instance_id, 5).await;
        assert!(matches!(result, Err(FleetError::RemoteExec(_))));
    }

    #[tokio::test]
    async fn terminate_by_count_only_touches_owned_running() {
        let compute = Arc::new(SimCompute::new());
        let owned_a = compute
            .seed("t2.small", InstanceLifecycle::Running, true)
            .await;
        let owned_b = compute
            .seed("t2.small", InstanceLifecycle::Running, true)
            .await;
        let _foreign = compute
            .seed("t2.small", InstanceLifecycle::Running, false)
            .await;
        let _booting = compute
            .seed("t2.small", InstanceLifecycle::Pending, true)
            .await;
        let manager = make_manager(compute.clone(), Arc::new(SimExec::new()));

        let transitions = manager.terminate(TerminateTarget::Count(10)).await.unwrap();
        let mut terminated: Vec<String> = transitions
            .iter()
            .map(|t| t.instance_id.clone())
            .collect();
        terminated.sort();
        assert_eq!(terminated, vec![owned_a, owned_b]);
        for transition in &transitions {
            assert_eq!(transition.previous, InstanceLifecycle::Running);
            assert_eq!(transition.current, InstanceLifecycle::ShuttingDown);
        }
    }

    #[tokio::test]
    async fn terminate_with_no_candidates_returns_empty() {
        let compute = Arc::new(SimCompute::new());
        let manager = make_manager(compute.clone(), Arc::new(SimExec::new()));

        let transitions = manager.terminate(TerminateTarget::Count(3)).await.unwrap();
        assert!(transitions.is_empty());
    }

    #[tokio::test]
    async fn terminate_by_ids_passes_through() {
        let compute = Arc::new(SimCompute::new());
        let id = compute
            .seed("t2.small", InstanceLifecycle::Running, false)
            .await;
        let manager = make_manager(compute.clone(), Arc::new(SimExec::new()));

        let transitions = manager
            .terminate(TerminateTarget::Ids(vec![id.clone()]))
            .await
            .unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].instance_id, id);
    }
}
