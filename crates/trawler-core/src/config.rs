//! trawler.toml configuration parser.
//!
//! Every knob has a default so a bare `trawlerd` invocation works with
//! no file on disk; a partial file overrides only what it names.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrawlerConfig {
    pub scaling: ScalingConfig,
    pub fleet: FleetConfig,
    pub worker: WorkerConfig,
    pub store: StoreConfig,
    pub report: ReportConfig,
    /// Hourly USD price overrides per instance type, merged over the
    /// built-in pricing table.
    pub pricing: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Maximum acceptable enqueue-to-completion time (ms).
    pub sla_ms: u64,
    /// Jobs one instance works in parallel.
    pub capacity: u32,
    /// Hard cap on the fleet, whatever the backlog says.
    pub max_fleet_size: u32,
    /// Stop once the queue is observed empty and flush the run report.
    pub drain: bool,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            sla_ms: 60_000,
            capacity: 5,
            max_fleet_size: 10,
            drain: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub instance_type: String,
    /// Machine image new instances boot from. Interpreted by the
    /// compute backend.
    pub image_id: String,
    pub ssh_user: String,
    pub ssh_key_path: String,
    /// Directory on the instance holding the trawlerd binary.
    pub remote_workdir: String,
    /// Wait after an instance reaches `running` before bootstrapping
    /// it (ms). Covers the gap between the backend's view and sshd
    /// actually accepting connections.
    pub settle_delay_ms: u64,
    /// Interval between instance status polls (ms).
    pub poll_interval_ms: u64,
    /// Status polls before giving an instance up as unavailable.
    /// 0 polls forever.
    pub max_status_polls: u32,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            instance_type: "t2.small".to_string(),
            image_id: "img-trawler-worker".to_string(),
            ssh_user: "worker".to_string(),
            ssh_key_path: "local/worker-key.pem".to_string(),
            remote_workdir: "/opt/trawler".to_string(),
            settle_delay_ms: 40_000,
            poll_interval_ms: 10_000,
            max_status_polls: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Sleep between batches while the queue stays empty (ms).
    pub idle_backoff_ms: u64,
    /// Backend cap on a single pull request.
    pub per_pull_max: usize,
    /// Visibility timeout of the in-memory queue backend (ms).
    pub visibility_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_backoff_ms: 60_000,
            per_pull_max: 10,
            visibility_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory scraped page content is filed under.
    pub root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: "scraped".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory the run series and execution summary are written to.
    pub results_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            results_dir: "results".to_string(),
        }
    }
}

impl TrawlerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TrawlerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
