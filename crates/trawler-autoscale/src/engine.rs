//! The sizing loop: measure the cluster, pick a target, converge.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use trawler_core::config::TrawlerConfig;
use trawler_core::{epoch_ms, FleetInstance, InstanceLifecycle};
use trawler_fleet::{FleetManager, TerminateTarget};
use trawler_metrics::{ClusterMetrics, ClusterSnapshot};

use crate::pricing::PricingTable;
use crate::report::RunHistory;

/// Metrics window for the very first tick, before a previous tick
/// exists to anchor it (ms).
pub const FIRST_WINDOW_LOOKBACK_MS: u64 = 30 * 60 * 1000;

/// Smallest fleet that can clear `queue_depth` jobs inside the SLA,
/// given the measured per-job service time and per-instance capacity.
///
/// Total work is `queue_depth * avg_service_time_ms`; each instance
/// contributes `sla_ms * capacity` of it before the deadline. The
/// ratio rounds up because a fractional instance cannot be launched.
pub fn ideal_fleet_size(
    queue_depth: u64,
    avg_service_time_ms: f64,
    sla_ms: u64,
    capacity: u32,
) -> u32 {
    if queue_depth == 0 {
        return 0;
    }
    let budget_per_instance = sla_ms as f64 * capacity as f64;
    if budget_per_instance <= 0.0 {
        return u32::MAX;
    }
    let work = queue_depth as f64 * avg_service_time_ms;
    (work / budget_per_instance).ceil() as u32
}

/// Knobs the sizing loop runs with, lifted out of [`TrawlerConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub sla_ms: u64,
    /// Jobs one instance works concurrently.
    pub capacity: u32,
    pub max_fleet_size: u32,
    /// Pause between an instance reporting `Running` and the consumer
    /// launch; image services need a moment past the status flip.
    pub settle_delay: Duration,
    /// Stop and write the run report once the queue is empty.
    pub drain: bool,
    pub results_dir: PathBuf,
}

impl EngineSettings {
    pub fn from_config(config: &TrawlerConfig) -> Self {
        Self {
            sla_ms: config.scaling.sla_ms,
            capacity: config.scaling.capacity,
            max_fleet_size: config.scaling.max_fleet_size,
            settle_delay: Duration::from_millis(config.fleet.settle_delay_ms),
            drain: config.scaling.drain,
            results_dir: PathBuf::from(&config.report.results_dir),
        }
    }

    /// Quarter-SLA cadence: frequent enough to correct course before
    /// the deadline, sparse enough for worker metrics to move between
    /// looks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.sla_ms.div_ceil(4).max(1))
    }
}

/// What one sizing tick decided.
#[derive(Debug, Clone, PartialEq)]
pub enum TickDecision {
    /// Nothing queued; no sizing happened.
    QueueEmpty,
    /// Fleet already matches the target.
    Hold { target: u32 },
    Grew { target: u32, created: u32 },
    Shrank { target: u32, terminated: u32 },
    /// Sizing wanted fewer instances but the backlog is already at the
    /// deadline; terminating capacity now would make it worse.
    ShrinkSuppressed { target: u32, oldest_age_ms: u64 },
}

/// Closed-loop fleet controller.
///
/// Each tick folds worker metrics and queue signals into a snapshot,
/// sizes the fleet against the SLA, and acts on the difference.
/// Provisioning of new instances runs detached so a slow boot never
/// stalls the next measurement.
pub struct Orchestrator {
    manager: Arc<FleetManager>,
    metrics: ClusterMetrics,
    pricing: PricingTable,
    settings: EngineSettings,
    history: RunHistory,
    iteration: u64,
    initial_recorded: bool,
    accrued_cost: f64,
    started_at_ms: u64,
    last_window_ms: Option<u64>,
    last_cost_ms: u64,
    last_snapshot: Option<ClusterSnapshot>,
    provisioning: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(
        manager: Arc<FleetManager>,
        metrics: ClusterMetrics,
        pricing: PricingTable,
        settings: EngineSettings,
    ) -> Self {
        let now = epoch_ms();
        Self {
            manager,
            metrics,
            pricing,
            settings,
            history: RunHistory::new(),
            iteration: 0,
            initial_recorded: false,
            accrued_cost: 0.0,
            started_at_ms: now,
            last_window_ms: None,
            last_cost_ms: now,
            last_snapshot: None,
            provisioning: Vec::new(),
        }
    }

    /// Sizing ticks completed against a non-empty queue. Empty-queue
    /// ticks observe but do not count.
    pub fn iterations(&self) -> u64 {
        self.iteration
    }

    /// Instance-hours spent so far, priced per type. Only
    /// orchestrator-owned instances bill to the run.
    pub fn accrued_cost(&self) -> f64 {
        self.accrued_cost
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    /// One measure-decide-act pass.
    pub async fn tick(&mut self) -> anyhow::Result<TickDecision> {
        self.prune_provisioning();

        let now = epoch_ms();
        let fleet = self.manager.active_instances().await?;
        let window_start = self
            .last_window_ms
            .unwrap_or_else(|| now.saturating_sub(FIRST_WINDOW_LOOKBACK_MS));
        let snapshot = self.metrics.snapshot(window_start, &fleet).await?;
        self.last_window_ms = Some(now);

        if self.iteration == 0 {
            if !self.initial_recorded {
                self.history
                    .push_initial(snapshot.fleet_size, snapshot.credit_balance);
                self.initial_recorded = true;
            }
            // cost clock starts with the first sizing iteration
            self.last_cost_ms = now;
        } else {
            self.accrue_cost(&fleet, now);
        }
        self.last_snapshot = Some(snapshot.clone());

        if snapshot.queue_depth == 0 {
            debug!("queue empty, nothing to size for");
            return Ok(TickDecision::QueueEmpty);
        }

        let ideal = ideal_fleet_size(
            snapshot.queue_depth,
            snapshot.avg_service_time_ms,
            self.settings.sla_ms,
            self.settings.capacity,
        );
        let target = ideal.min(self.settings.max_fleet_size);
        let current = snapshot.fleet_size;
        info!(
            queue_depth = snapshot.queue_depth,
            avg_service_ms = snapshot.avg_service_time_ms,
            current,
            ideal,
            target,
            "sizing tick"
        );

        let decision = if target > current {
            let created = self.grow(target - current).await?;
            TickDecision::Grew { target, created }
        } else if target < current {
            if snapshot.oldest_message_age_ms >= self.settings.sla_ms {
                warn!(
                    oldest_age_ms = snapshot.oldest_message_age_ms,
                    sla_ms = self.settings.sla_ms,
                    "backlog already at the deadline, keeping the fleet"
                );
                TickDecision::ShrinkSuppressed {
                    target,
                    oldest_age_ms: snapshot.oldest_message_age_ms,
                }
            } else {
                let transitions = self
                    .manager
                    .terminate(TerminateTarget::Count(current - target))
                    .await?;
                TickDecision::Shrank {
                    target,
                    terminated: transitions.len() as u32,
                }
            }
        } else {
            TickDecision::Hold { target }
        };

        let elapsed_s = now.saturating_sub(self.started_at_ms) / 1000;
        self.history.push_tick(
            target,
            snapshot.avg_processing_time_ms,
            snapshot.queue_depth,
            snapshot.credit_balance,
            elapsed_s,
        );
        self.iteration += 1;
        Ok(decision)
    }

    /// Launch `count` instances and provision each in its own task.
    /// The tick moves on; booting takes longer than a tick interval.
    async fn grow(&mut self, count: u32) -> anyhow::Result<u32> {
        let created = self.manager.create(count).await?;
        for instance in &created {
            self.spawn_provisioning(instance.instance_id.clone());
        }
        Ok(created.len() as u32)
    }

    fn spawn_provisioning(&mut self, instance_id: String) {
        let manager = self.manager.clone();
        let settle = self.settings.settle_delay;
        let capacity = self.settings.capacity;
        let handle = tokio::spawn(async move {
            let status = manager.poll_until_final(&instance_id).await;
            if status != InstanceLifecycle::Running {
                warn!(%instance_id, %status, "instance never came up, skipping bootstrap");
                return;
            }
            tokio::time::sleep(settle).await;
            if let Err(e) = manager.bootstrap(&instance_id, capacity).await {
                warn!(%instance_id, error = %e, "bootstrap failed");
            }
        });
        self.provisioning.push(handle);
    }

    fn prune_provisioning(&mut self) {
        self.provisioning.retain(|handle| !handle.is_finished());
    }

    /// Wait out every in-flight provisioning task. Shutdown paths call
    /// this so a consumer launch is never cancelled halfway.
    pub async fn join_provisioning(&mut self) {
        for handle in self.provisioning.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "provisioning task panicked");
            }
        }
    }

    fn accrue_cost(&mut self, fleet: &[FleetInstance], now: u64) {
        let elapsed_hours = now.saturating_sub(self.last_cost_ms) as f64 / 3_600_000.0;
        self.last_cost_ms = now;
        for instance in fleet.iter().filter(|i| i.orchestrator_owned) {
            match self.pricing.hourly_rate(&instance.instance_type) {
                Some(rate) => self.accrued_cost += rate * elapsed_hours,
                None => debug!(
                    instance_type = %instance.instance_type,
                    "no hourly rate on record"
                ),
            }
        }
    }

    /// Write the series and execution summary collected so far.
    pub fn flush_report(&self) -> anyhow::Result<PathBuf> {
        let (avg_service_ms, avg_processing_ms) = match &self.last_snapshot {
            Some(snapshot) => (
                snapshot.avg_service_time_ms,
                snapshot.avg_processing_time_ms,
            ),
            None => (0.0, 0.0),
        };
        self.history.flush(
            &self.settings.results_dir,
            avg_service_ms,
            avg_processing_ms,
            self.accrued_cost,
            self.iteration,
        )
    }

    /// Tick at quarter-SLA cadence until shutdown, or until the queue
    /// drains when drain mode is on. A failed tick is logged and the
    /// loop keeps going; the next tick gets a fresh look at the
    /// cluster.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut ticks = tokio::time::interval(self.settings.tick_interval());
        info!(
            interval_ms = self.settings.tick_interval().as_millis() as u64,
            drain = self.settings.drain,
            max_fleet_size = self.settings.max_fleet_size,
            "orchestrator started"
        );
        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    match self.tick().await {
                        Ok(TickDecision::QueueEmpty) if self.settings.drain => {
                            info!("queue drained, finishing the run");
                            break;
                        }
                        Ok(decision) => debug!(?decision, "tick complete"),
                        Err(e) => error!(error = %e, "tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("orchestrator stopping");
                    break;
                }
            }
        }
        self.join_provisioning().await;
        if self.settings.drain {
            self.flush_report()?;
        }
        Ok(())
    }
}
