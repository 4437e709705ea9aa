//! In-process stand-in for remote execution.
//!
//! A local orchestrate run has no hosts to ssh into. Executing the
//! consumer launch command here spawns the consumer as a task against
//! the shared queue, parsing the same flags a real remote launch
//! carries, so the orchestrator cannot tell the difference.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use trawler_core::config::WorkerConfig;
use trawler_fleet::{ExecOutput, FleetResult, RemoteExec};
use trawler_metrics::{MetricsReporter, MetricsSink};
use trawler_queue::WorkQueue;
use trawler_scrape::{ResultStore, ScraperRegistry};
use trawler_worker::{BatchConsumer, ConsumerSettings};

pub struct InProcessExec {
    queue: Arc<dyn WorkQueue>,
    registry: Arc<ScraperRegistry>,
    store: Arc<dyn ResultStore>,
    sink: Arc<dyn MetricsSink>,
    worker: WorkerConfig,
    shutdown: watch::Receiver<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl InProcessExec {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        registry: Arc<ScraperRegistry>,
        store: Arc<dyn ResultStore>,
        sink: Arc<dyn MetricsSink>,
        worker: WorkerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            registry,
            store,
            sink,
            worker,
            shutdown,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Wait for every spawned consumer to stop. Callers flip the
    /// shutdown channel first.
    pub async fn join_workers(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().await;
            workers.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "consumer task panicked");
            }
        }
    }
}

fn flag_value(command: &str, flag: &str) -> Option<String> {
    let mut parts = command.split_whitespace();
    while let Some(part) = parts.next() {
        if part == flag {
            return parts.next().map(|value| value.to_string());
        }
    }
    None
}

#[async_trait]
impl RemoteExec for InProcessExec {
    async fn execute(&self, host: &str, command: &str) -> FleetResult<ExecOutput> {
        let Some(batch_size) = flag_value(command, "--batch-size").and_then(|v| v.parse().ok())
        else {
            return Ok(ExecOutput {
                exit_code: 2,
                stdout: String::new(),
                stderr: "missing or invalid --batch-size".to_string(),
            });
        };
        let worker_id =
            flag_value(command, "--worker-id").unwrap_or_else(|| "unknown".to_string());

        info!(%host, %worker_id, batch_size, "spawning in-process consumer");
        let mut consumer = BatchConsumer::new(
            self.queue.clone(),
            self.registry.clone(),
            self.store.clone(),
            MetricsReporter::new(worker_id, self.sink.clone()),
            ConsumerSettings {
                batch_size,
                per_pull_max: self.worker.per_pull_max,
                idle_backoff: Duration::from_millis(self.worker.idle_backoff_ms),
            },
        );
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move { consumer.run(shutdown).await });
        self.workers.lock().await.push(handle);
        Ok(ExecOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use trawler_core::Job;
    use trawler_metrics::MemorySink;
    use trawler_queue::MemoryQueue;
    use trawler_scrape::{MemoryStore, PageScraper, ScrapeResult};

    struct EchoScraper;

    #[async_trait]
    impl PageScraper for EchoScraper {
        async fn scrape(&self, _informations: &HashMap<String, String>) -> ScrapeResult<String> {
            Ok("<html>ok</html>".to_string())
        }
    }

    fn make_exec(
        queue: Arc<MemoryQueue>,
        shutdown: watch::Receiver<bool>,
    ) -> (InProcessExec, Arc<MemoryStore>) {
        let mut registry = ScraperRegistry::new();
        registry.register_scraper("echo", "fast", Arc::new(EchoScraper));
        let store = Arc::new(MemoryStore::new());
        let exec = InProcessExec::new(
            queue,
            Arc::new(registry),
            store.clone(),
            Arc::new(MemorySink::new()),
            WorkerConfig {
                idle_backoff_ms: 10,
                ..WorkerConfig::default()
            },
            shutdown,
        );
        (exec, store)
    }

    #[tokio::test]
    async fn execute_spawns_a_working_consumer() {
        let queue = Arc::new(MemoryQueue::new());
        queue
            .send(&Job::new("echo", "fast", HashMap::new()))
            .await
            .unwrap();
        let (stop, shutdown) = watch::channel(false);
        let (exec, store) = make_exec(queue.clone(), shutdown);

        let output = exec
            .execute(
                "sim-0001.sim.local",
                "cd /opt/trawler && nohup ./trawlerd consume --batch-size 2 --worker-id sim-0001 >> consume.log 2>&1 &",
            )
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while store.entries().await.is_empty() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "consumer never scraped the seeded job"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        stop.send(true).unwrap();
        exec.join_workers().await;
        assert_eq!(queue.approximate_depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn a_command_without_batch_size_is_rejected() {
        let queue = Arc::new(MemoryQueue::new());
        let (_stop, shutdown) = watch::channel(false);
        let (exec, _store) = make_exec(queue, shutdown);

        let output = exec.execute("host", "echo hello").await.unwrap();
        assert_ne!(output.exit_code, 0);
        assert!(exec.workers.lock().await.is_empty());
    }
}
