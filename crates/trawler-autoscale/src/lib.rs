//! trawler-autoscale — the fleet sizing control loop.
//!
//! One decision rule, re-evaluated on a quarter-SLA cadence so the
//! controller gets at least four correction opportunities per SLA
//! window:
//!
//! ```text
//! ideal  = ceil(queue_depth × avg_service_ms / (sla_ms × capacity))
//! target = min(max_fleet_size, ideal)
//!
//! target > actual → create, then per instance: poll → settle → bootstrap
//! target < actual → terminate owned instances, but only while the
//!                   oldest queued job is still younger than the SLA
//! ```
//!
//! The shrink guard is the anti-oscillation safety: an old queue head
//! means the backlog is already at SLA risk, and removing capacity
//! right then would turn a near-miss into a breach.

pub mod engine;
pub mod pricing;
pub mod report;

pub use engine::{ideal_fleet_size, EngineSettings, Orchestrator, TickDecision};
pub use pricing::PricingTable;
pub use report::{RunHistory, SeriesPoint};
