//! trawler-queue — the work queue the scraping fleet drains.
//!
//! Producers enqueue [`Job`](trawler_core::Job)s; workers pull them in
//! batches, and anything not acknowledged comes back after the
//! backend's visibility timeout. That redelivery loop is the only
//! retry mechanism in the system, so delivery is at-least-once and
//! consumers must tolerate seeing a job twice.
//!
//! The [`WorkQueue`] trait is the seam vendor adapters implement;
//! [`MemoryQueue`] is the in-process backend used by tests and local
//! runs.

pub mod error;
pub mod memory;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryQueue;
pub use queue::WorkQueue;
