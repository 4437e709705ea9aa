//! The work queue abstraction.

use async_trait::async_trait;
use trawler_core::{Job, ReceivedJob};

use crate::error::QueueResult;

/// Pull-based work queue with at-least-once delivery.
///
/// A pulled job stays invisible to other consumers until it is
/// acknowledged or its visibility timeout lapses, whichever comes
/// first. Acknowledging deletes the delivery for good.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue one job.
    async fn send(&self, job: &Job) -> QueueResult<()>;

    /// Pull up to `max` jobs. May legitimately return fewer, or none.
    async fn receive(&self, max: usize) -> QueueResult<Vec<ReceivedJob>>;

    /// Delete a delivered job so it is never redelivered.
    async fn acknowledge(&self, receipt: &str) -> QueueResult<()>;

    /// Approximate count of visible (not in-flight) jobs.
    async fn approximate_depth(&self) -> QueueResult<u64>;

    /// Age in ms of the oldest visible job, measured from its enqueue
    /// time. 0 when the queue is empty.
    async fn oldest_message_age_ms(&self) -> QueueResult<u64>;
}
