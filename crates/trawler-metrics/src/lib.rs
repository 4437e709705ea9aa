//! trawler-metrics — timing telemetry for the scraping fleet.
//!
//! Worker side, [`MetricsReporter`] turns each batch's results into a
//! per-batch record and a lifetime-cumulative record and appends both
//! to a [`MetricsSink`]. Orchestrator side, [`ClusterMetrics`] reads
//! the cumulative records back by time window and folds them, together
//! with live queue signals, into the [`ClusterSnapshot`] the sizing
//! decision runs on.
//!
//! ```text
//! worker                                   orchestrator
//! BatchConsumer                            Orchestrator
//!   └─ MetricsReporter                       └─ ClusterMetrics
//!        └─ append ──▶  MetricsSink  ◀── query_since
//! ```
//!
//! Everything here is observational. A sink outage degrades the sizing
//! input, never the scraping itself.

pub mod collector;
pub mod reporter;
pub mod sink;

pub use collector::{ClusterMetrics, ClusterSnapshot, DEFAULT_SERVICE_TIME_MS};
pub use reporter::{BatchStats, MetricsReporter};
pub use sink::{MemorySink, MetricsSink, SinkError, SinkResult};
