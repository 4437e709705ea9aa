//! trawler-worker — the batch queue consumption loop.
//!
//! One [`BatchConsumer`] per worker process: fill a batch from the
//! queue, fan the jobs out through the scraper registry concurrently,
//! acknowledge exactly the ones that succeeded, report timing metrics,
//! repeat. Failed jobs are simply left unacknowledged; the queue's
//! visibility timeout brings them back. The worker carries no retry
//! state of its own.

pub mod consumer;

pub use consumer::{BatchConsumer, BatchOutcome, ConsumerSettings};
