//! In-process queue backend with visibility-timeout redelivery.
//!
//! Semantics mirror what the hosted queue services give you: pulled
//! jobs move to an in-flight set keyed by a fresh receipt, and any
//! delivery not acknowledged within the visibility timeout is swept
//! back to the ready list on the next queue operation.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use trawler_core::{epoch_ms, Job, ReceivedJob};
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::queue::WorkQueue;

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

struct StoredMessage {
    job: Job,
    /// First time any consumer saw this job. Survives redelivery.
    first_received_at_ms: Option<u64>,
}

struct InFlight {
    message: StoredMessage,
    redeliver_at_ms: u64,
}

#[derive(Default)]
struct Inner {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<String, InFlight>,
}

impl Inner {
    /// Move every expired in-flight delivery back onto the ready list.
    fn requeue_expired(&mut self, now_ms: u64) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| flight.redeliver_at_ms <= now_ms)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some(flight) = self.in_flight.remove(&receipt) {
                self.ready.push_back(flight.message);
            }
        }
    }
}

pub struct MemoryQueue {
    visibility_timeout: Duration,
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Deliveries currently awaiting acknowledgment.
    pub async fn in_flight_count(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.requeue_expired(epoch_ms());
        inner.in_flight.len()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WorkQueue for MemoryQueue {
    async fn send(&self, job: &Job) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ready.push_back(StoredMessage {
            job: job.clone(),
            first_received_at_ms: None,
        });
        Ok(())
    }

    async fn receive(&self, max: usize) -> QueueResult<Vec<ReceivedJob>> {
        let now = epoch_ms();
        let mut inner = self.inner.lock().await;
        inner.requeue_expired(now);

        let mut delivered = Vec::new();
        while delivered.len() < max {
            let Some(mut message) = inner.ready.pop_front() else {
                break;
            };
            let first_received_at_ms = *message.first_received_at_ms.get_or_insert(now);
            let receipt = Uuid::new_v4().to_string();
            delivered.push(ReceivedJob {
                job: message.job.clone(),
                receipt: receipt.clone(),
                first_received_at_ms,
            });
            inner.in_flight.insert(
                receipt,
                InFlight {
                    message,
                    redeliver_at_ms: now + self.visibility_timeout.as_millis() as u64,
                },
            );
        }
        Ok(delivered)
    }

    async fn acknowledge(&self, receipt: &str) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .in_flight
            .remove(receipt)
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))
    }

    async fn approximate_depth(&self) -> QueueResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.requeue_expired(epoch_ms());
        Ok(inner.ready.len() as u64)
    }

    async fn oldest_message_age_ms(&self) -> QueueResult<u64> {
        let now = epoch_ms();
        let mut inner = self.inner.lock().await;
        inner.requeue_expired(now);
        Ok(inner
            .ready
            .iter()
            .map(|message| now.saturating_sub(message.job.enqueued_at_ms))
            .max()
            .unwrap_or(0))
    }
}
