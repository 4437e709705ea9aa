//! The orchestrator role: the autoscaling loop wired over the local
//! stack.
//!
//! Everything external sits behind a seam, and this mode binds each
//! seam to its in-process implementation: `MemoryQueue` for work,
//! `MemorySink` for worker metrics, `SimCompute` for the fleet, and an
//! exec that "bootstraps" instances by spawning real consumers in this
//! process. A drain run over seeded jobs produces the same report
//! files a production run would.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use trawler_autoscale::{EngineSettings, Orchestrator, PricingTable};
use trawler_core::config::TrawlerConfig;
use trawler_fleet::{FleetManager, SimCompute};
use trawler_metrics::{ClusterMetrics, MemorySink};
use trawler_queue::MemoryQueue;
use trawler_scrape::{FsStore, ScraperRegistry};

use crate::local::InProcessExec;
use crate::ops;

pub async fn run_orchestrate(config: TrawlerConfig, seed_jobs: u32) -> anyhow::Result<()> {
    info!("trawler orchestrator starting");

    // ── Shared local stack ─────────────────────────────────────
    let queue = Arc::new(MemoryQueue::with_visibility_timeout(Duration::from_millis(
        config.worker.visibility_timeout_ms,
    )));
    let sink = Arc::new(MemorySink::new());
    let compute = Arc::new(SimCompute::new());
    let registry = Arc::new(ScraperRegistry::builtin());
    let store = Arc::new(FsStore::new(&config.store.root));

    if seed_jobs > 0 {
        ops::populate(&*queue, seed_jobs, 1, Duration::ZERO).await?;
        info!(seed_jobs, "queue seeded");
    }

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // ── Fleet wiring ───────────────────────────────────────────
    let exec = Arc::new(InProcessExec::new(
        queue.clone(),
        registry,
        store,
        sink.clone(),
        config.worker.clone(),
        shutdown_rx.clone(),
    ));
    let manager = Arc::new(FleetManager::new(
        compute.clone(),
        exec.clone(),
        config.fleet.clone(),
    ));
    let metrics = ClusterMetrics::new(sink, queue, compute);
    let pricing = PricingTable::with_overrides(&config.pricing);
    let settings = EngineSettings::from_config(&config);
    let mut orchestrator = Orchestrator::new(manager, metrics, pricing, settings);

    // Ctrl-C flips the shared shutdown channel.
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = signal_tx.send(true);
    });

    orchestrator.run(shutdown_rx).await?;

    // drained or interrupted, the in-process workers stop too
    let _ = shutdown_tx.send(true);
    exec.join_workers().await;

    info!("trawler orchestrator stopped");
    Ok(())
}
