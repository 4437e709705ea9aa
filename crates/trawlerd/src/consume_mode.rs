//! The worker role: one queue consumer against the local stack.
//!
//! The orchestrator bootstraps instances with exactly this entry
//! point; run by hand it drains whatever the local queue holds.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use trawler_core::config::TrawlerConfig;
use trawler_metrics::{MemorySink, MetricsReporter};
use trawler_queue::MemoryQueue;
use trawler_scrape::{FsStore, ScraperRegistry};
use trawler_worker::{BatchConsumer, ConsumerSettings};

use crate::ops;

pub async fn run_consume(
    config: TrawlerConfig,
    batch_size: usize,
    worker_id: String,
    seed_jobs: u32,
) -> anyhow::Result<()> {
    let queue = Arc::new(MemoryQueue::with_visibility_timeout(Duration::from_millis(
        config.worker.visibility_timeout_ms,
    )));
    if seed_jobs > 0 {
        ops::populate(&*queue, seed_jobs, 1, Duration::ZERO).await?;
        info!(seed_jobs, "queue seeded");
    }

    let reporter = MetricsReporter::new(worker_id, Arc::new(MemorySink::new()));
    let settings = ConsumerSettings {
        batch_size,
        per_pull_max: config.worker.per_pull_max,
        idle_backoff: Duration::from_millis(config.worker.idle_backoff_ms),
    };
    let mut consumer = BatchConsumer::new(
        queue,
        Arc::new(ScraperRegistry::builtin()),
        Arc::new(FsStore::new(&config.store.root)),
        reporter,
        settings,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    consumer.run(shutdown_rx).await;
    Ok(())
}
