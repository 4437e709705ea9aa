//! Batch consumption: fill, dispatch, acknowledge, report.

use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use trawler_core::{epoch_ms, BatchResult, ReceivedJob};
use trawler_metrics::{BatchStats, MetricsReporter};
use trawler_queue::WorkQueue;
use trawler_scrape::{ResultStore, ScraperRegistry};

/// Pull attempts per batch fill. Queue backends routinely answer a
/// pull with fewer jobs than asked, so one pull is not a verdict on
/// queue depth; three is plenty before proceeding with what arrived.
const MAX_FILL_ATTEMPTS: u32 = 3;

/// Tunables for one consumer.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Jobs to aim for per batch.
    pub batch_size: usize,
    /// Backend cap on a single pull request.
    pub per_pull_max: usize,
    /// Sleep between batches while the queue stays empty.
    pub idle_backoff: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            per_pull_max: 10,
            idle_backoff: Duration::from_secs(60),
        }
    }
}

/// What one loop iteration did.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    /// `None` when the batch was empty or nothing succeeded.
    pub stats: Option<BatchStats>,
}

pub struct BatchConsumer {
    queue: Arc<dyn WorkQueue>,
    registry: Arc<ScraperRegistry>,
    store: Arc<dyn ResultStore>,
    reporter: MetricsReporter,
    settings: ConsumerSettings,
}

impl BatchConsumer {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        registry: Arc<ScraperRegistry>,
        store: Arc<dyn ResultStore>,
        reporter: MetricsReporter,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            queue,
            registry,
            store,
            reporter,
            settings,
        }
    }

    /// Pull until the batch is full or the attempts run out. A failed
    /// pull is logged and spends an attempt like an empty one.
    async fn fill_batch(&self) -> Vec<ReceivedJob> {
        let mut batch = Vec::new();
        let mut attempts = 0;
        while batch.len() < self.settings.batch_size && attempts < MAX_FILL_ATTEMPTS {
            attempts += 1;
            let request = self.settings.batch_size.min(self.settings.per_pull_max);
            match self.queue.receive(request).await {
                Ok(jobs) => {
                    debug!(pulled = jobs.len(), attempts, "pull finished");
                    batch.extend(jobs);
                }
                Err(e) => warn!(error = %e, attempts, "queue pull failed"),
            }
        }
        batch
    }

    /// One job end to end: resolve the scraper, scrape, persist.
    async fn attempt(&self, received: &ReceivedJob) -> BatchResult {
        let job = &received.job;
        let outcome = async {
            let scraper = self.registry.scraper(&job.job_type, &job.job_name)?;
            let content = scraper.scrape(&job.informations).await?;
            let category = format!("{}/{}", job.job_type, job.job_name);
            self.store.store(&content, &category).await
        }
        .await;

        let finished = epoch_ms();
        let processing_time_ms = finished.saturating_sub(job.enqueued_at_ms);
        let service_time_ms = finished.saturating_sub(received.first_received_at_ms);

        match outcome {
            Ok(location) => {
                debug!(
                    job_type = %job.job_type,
                    job_name = %job.job_name,
                    %location,
                    processing_time_ms,
                    "job scraped"
                );
                BatchResult {
                    receipt: received.receipt.clone(),
                    success: true,
                    processing_time_ms,
                    service_time_ms,
                }
            }
            Err(e) => {
                warn!(
                    job_type = %job.job_type,
                    job_name = %job.job_name,
                    error = %e,
                    "job failed, leaving it for redelivery"
                );
                BatchResult {
                    receipt: received.receipt.clone(),
                    success: false,
                    processing_time_ms,
                    service_time_ms,
                }
            }
        }
    }

    /// One loop iteration: fill a batch, dispatch it concurrently,
    /// acknowledge the successes, record metrics. An empty fill comes
    /// back as `attempted == 0` with nothing touched.
    pub async fn process_next_batch(&mut self) -> BatchOutcome {
        let batch = self.fill_batch().await;
        if batch.is_empty() {
            return BatchOutcome {
                attempted: 0,
                succeeded: 0,
                stats: None,
            };
        }

        info!(jobs = batch.len(), "processing batch");
        let this = &*self;
        let results = join_all(batch.iter().map(|received| this.attempt(received))).await;

        let succeeded = results.iter().filter(|r| r.success).count();
        for result in results.iter().filter(|r| r.success) {
            if let Err(e) = self.queue.acknowledge(&result.receipt).await {
                warn!(receipt = %result.receipt, error = %e, "acknowledge failed");
            }
        }

        let stats = self.reporter.record_batch(&results).await;
        info!(
            attempted = results.len(),
            succeeded,
            "batch finished"
        );
        BatchOutcome {
            attempted: results.len(),
            succeeded,
            stats,
        }
    }

    /// Consume until shutdown. Empty fills back off for
    /// `idle_backoff` instead of spinning on the backend.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.settings.batch_size,
            worker_id = %self.reporter.worker_id(),
            "queue consumer started"
        );
        loop {
            tokio::select! {
                outcome = self.process_next_batch() => {
                    if outcome.attempted == 0 {
                        debug!(
                            backoff_ms = self.settings.idle_backoff.as_millis() as u64,
                            "queue empty, backing off"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(self.settings.idle_backoff) => {}
                            _ = shutdown.changed() => break,
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("queue consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;
    use trawler_core::{Job, MetricKind};
    use trawler_queue::{MemoryQueue, QueueError, QueueResult};
    use trawler_scrape::{MemoryStore, PageScraper, ScrapeError, ScrapeResult};
    use trawler_metrics::{MemorySink, MetricsSink};

    fn make_job(job_type: &str, job_name: &str) -> Job {
        let mut informations = HashMap::new();
        informations.insert("registrationNumber".to_string(), "1109410".to_string());
        Job::new(job_type, job_name, informations)
    }

    /// Succeeds for every name except the ones given.
    struct SelectiveScraper {
        failing_names: Vec<String>,
    }

    #[async_trait]
    impl PageScraper for SelectiveScraper {
        async fn scrape(&self, informations: &HashMap<String, String>) -> ScrapeResult<String> {
            let name = informations.get("name").cloned().unwrap_or_default();
            if self.failing_names.contains(&name) {
                Err(ScrapeError::Fetch(format!("{name} is down")))
            } else {
                Ok(format!("<html>{name}</html>"))
            }
        }
    }

    struct OkScraper;

    #[async_trait]
    impl PageScraper for OkScraper {
        async fn scrape(&self, _informations: &HashMap<String, String>) -> ScrapeResult<String> {
            Ok("<html>ok</html>".to_string())
        }
    }

    /// Counts receive calls on the way through.
    struct CountingQueue {
        inner: MemoryQueue,
        receives: AtomicUsize,
    }

    impl CountingQueue {
        fn new() -> Self {
            Self {
                inner: MemoryQueue::new(),
                receives: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WorkQueue for CountingQueue {
        async fn send(&self, job: &Job) -> QueueResult<()> {
            self.inner.send(job).await
        }

        async fn receive(&self, max: usize) -> QueueResult<Vec<ReceivedJob>> {
            self.receives.fetch_add(1, Ordering::SeqCst);
            self.inner.receive(max).await
        }

        async fn acknowledge(&self, receipt: &str) -> QueueResult<()> {
            self.inner.acknowledge(receipt).await
        }

        async fn approximate_depth(&self) -> QueueResult<u64> {
            self.inner.approximate_depth().await
        }

        async fn oldest_message_age_ms(&self) -> QueueResult<u64> {
            self.inner.oldest_message_age_ms().await
        }
    }

    /// Every pull fails.
    struct BrokenQueue;

    #[async_trait]
    impl WorkQueue for BrokenQueue {
        async fn send(&self, _job: &Job) -> QueueResult<()> {
            Err(QueueError::Backend("offline".to_string()))
        }

        async fn receive(&self, _max: usize) -> QueueResult<Vec<ReceivedJob>> {
            Err(QueueError::Backend("offline".to_string()))
        }

        async fn acknowledge(&self, _receipt: &str) -> QueueResult<()> {
            Err(QueueError::Backend("offline".to_string()))
        }

        async fn approximate_depth(&self) -> QueueResult<u64> {
            Err(QueueError::Backend("offline".to_string()))
        }

        async fn oldest_message_age_ms(&self) -> QueueResult<u64> {
            Err(QueueError::Backend("offline".to_string()))
        }
    }

    fn make_consumer(
        queue: Arc<dyn WorkQueue>,
        scraper: Arc<dyn PageScraper>,
        sink: Arc<MemorySink>,
        batch_size: usize,
    ) -> BatchConsumer {
        let mut registry = ScraperRegistry::new();
        registry.register_scraper("coren", "sp", scraper);
        BatchConsumer::new(
            queue,
            Arc::new(registry),
            Arc::new(MemoryStore::new()),
            MetricsReporter::new("sim-0001", sink),
            ConsumerSettings {
                batch_size,
                per_pull_max: 10,
                idle_backoff: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn empty_queue_spends_three_pulls_and_scrapes_nothing() {
        let queue = Arc::new(CountingQueue::new());
        let sink = Arc::new(MemorySink::new());
        let mut consumer = make_consumer(queue.clone(), Arc::new(OkScraper), sink.clone(), 5);

        let outcome = consumer.process_next_batch().await;
        assert_eq!(outcome.attempted, 0);
        assert_eq!(outcome.succeeded, 0);
        assert_eq!(queue.receives.load(Ordering::SeqCst), 3);
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn full_first_pull_needs_no_second() {
        let queue = Arc::new(CountingQueue::new());
        for _ in 0..5 {
            queue.send(&make_job("coren", "sp")).await.unwrap();
        }
        let sink = Arc::new(MemorySink::new());
        let mut consumer = make_consumer(queue.clone(), Arc::new(OkScraper), sink, 5);

        let outcome = consumer.process_next_batch().await;
        assert_eq!(outcome.attempted, 5);
        assert_eq!(queue.receives.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn acknowledges_exactly_the_successes() {
        let queue = Arc::new(MemoryQueue::with_visibility_timeout(Duration::from_millis(
            30,
        )));
        let mut ok_job = make_job("coren", "sp");
        ok_job.informations.insert("name".to_string(), "good".to_string());
        let mut bad_job = make_job("coren", "sp");
        bad_job.informations.insert("name".to_string(), "bad".to_string());
        queue.send(&ok_job).await.unwrap();
        queue.send(&bad_job).await.unwrap();

        let scraper = Arc::new(SelectiveScraper {
            failing_names: vec!["bad".to_string()],
        });
        let sink = Arc::new(MemorySink::new());
        let mut consumer = make_consumer(queue.clone(), scraper, sink, 5);

        let outcome = consumer.process_next_batch().await;
        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.succeeded, 1);

        // the failure comes back after its visibility timeout
        tokio::time::sleep(Duration::from_millis(60)).await;
        let redelivered = queue.receive(10).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(
            redelivered[0].job.informations.get("name"),
            Some(&"bad".to_string())
        );
    }

    #[tokio::test]
    async fn jobs_with_no_scraper_fail_without_acking() {
        let queue = Arc::new(MemoryQueue::new());
        queue.send(&make_job("detran", "sp")).await.unwrap();
        let sink = Arc::new(MemorySink::new());
        let mut consumer = make_consumer(queue.clone(), Arc::new(OkScraper), sink, 5);

        let outcome = consumer.process_next_batch().await;
        assert_eq!(outcome.attempted, 1);
        assert_eq!(outcome.succeeded, 0);
        assert!(outcome.stats.is_none());
        assert_eq!(queue.in_flight_count().await, 1);
    }

    #[tokio::test]
    async fn dispatch_is_concurrent() {
        struct BarrierScraper {
            barrier: Barrier,
        }

        #[async_trait]
        impl PageScraper for BarrierScraper {
            async fn scrape(
                &self,
                _informations: &HashMap<String, String>,
            ) -> ScrapeResult<String> {
                // only passes if every job in the batch gets here at once
                self.barrier.wait().await;
                Ok("<html></html>".to_string())
            }
        }

        let queue = Arc::new(MemoryQueue::new());
        for _ in 0..3 {
            queue.send(&make_job("coren", "sp")).await.unwrap();
        }
        let scraper = Arc::new(BarrierScraper {
            barrier: Barrier::new(3),
        });
        let sink = Arc::new(MemorySink::new());
        let mut consumer = make_consumer(queue, scraper, sink, 3);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            consumer.process_next_batch(),
        )
        .await
        .expect("sequential dispatch would deadlock on the barrier");
        assert_eq!(outcome.succeeded, 3);
    }

    #[tokio::test]
    async fn metrics_reach_the_sink() {
        let queue = Arc::new(MemoryQueue::new());
        queue.send(&make_job("coren", "sp")).await.unwrap();
        let sink = Arc::new(MemorySink::new());
        let mut consumer = make_consumer(queue, Arc::new(OkScraper), sink.clone(), 5);

        let outcome = consumer.process_next_batch().await;
        assert!(outcome.stats.is_some());

        let records = sink.query_since(0).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.kind == MetricKind::Batch));
        assert!(records.iter().any(|r| r.kind == MetricKind::Cumulative));
        assert!(records.iter().all(|r| r.worker_id == "sim-0001"));
    }

    #[tokio::test]
    async fn broken_queue_spends_its_attempts_quietly() {
        let sink = Arc::new(MemorySink::new());
        let mut consumer = make_consumer(Arc::new(BrokenQueue), Arc::new(OkScraper), sink, 5);

        let outcome = consumer.process_next_batch().await;
        assert_eq!(outcome.attempted, 0);
        assert_eq!(outcome.succeeded, 0);
    }

    #[tokio::test]
    async fn run_loop_drains_and_stops_on_shutdown() {
        let queue = Arc::new(MemoryQueue::new());
        for _ in 0..4 {
            queue.send(&make_job("coren", "sp")).await.unwrap();
        }
        let sink = Arc::new(MemorySink::new());
        let mut consumer = make_consumer(queue.clone(), Arc::new(OkScraper), sink, 2);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { consumer.run(shutdown_rx).await });

        // wait for the queue to drain
        for _ in 0..100 {
            if queue.approximate_depth().await.unwrap() == 0
                && queue.in_flight_count().await == 0
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.approximate_depth().await.unwrap(), 0);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("consumer should stop on shutdown")
            .unwrap();
    }
}
