//! trawlerd — the Trawler daemon.
//!
//! Single binary for every Trawler role:
//! - Orchestrator: the autoscaling loop sizing a worker fleet against
//!   the queue SLA
//! - Worker: a batch consumer draining scrape jobs
//! - Operator one-shots: queue population, direct scrapes, fleet
//!   administration
//!
//! # Usage
//!
//! ```text
//! trawlerd orchestrate --drain --seed-jobs 40
//! trawlerd consume --batch-size 5 --worker-id local
//! trawlerd scrape coren sp --info registrationNumber=1109410
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use trawler_core::TrawlerConfig;

mod consume_mode;
mod local;
mod ops;
mod orchestrate_mode;

#[derive(Parser)]
#[command(name = "trawlerd", about = "Trawler daemon")]
struct Cli {
    /// Path to trawler.toml; a missing file falls back to defaults.
    #[arg(long, default_value = "trawler.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the autoscaling orchestrator over the local stack.
    Orchestrate {
        /// Latency target from enqueue to completion, in milliseconds.
        #[arg(long)]
        sla_ms: Option<u64>,

        /// Jobs one worker instance processes per batch.
        #[arg(long)]
        capacity: Option<u32>,

        /// Hard ceiling on fleet size.
        #[arg(long)]
        max_fleet_size: Option<u32>,

        /// Instance type for created workers.
        #[arg(long)]
        instance_type: Option<String>,

        /// Stop and write the run report once the queue drains.
        #[arg(long)]
        drain: bool,

        /// Seed this many default jobs before starting.
        #[arg(long, default_value = "0")]
        seed_jobs: u32,

        /// Directory for the run report.
        #[arg(long)]
        results_dir: Option<String>,
    },

    /// Consume the queue as one worker.
    Consume {
        /// Jobs to aim for per batch.
        #[arg(long, default_value = "5")]
        batch_size: usize,

        /// Identity stamped on this worker's metric records.
        #[arg(long, default_value = "local")]
        worker_id: String,

        /// Seed this many default jobs before starting.
        #[arg(long, default_value = "0")]
        seed_jobs: u32,
    },

    /// Seed the queue with default test jobs.
    Populate {
        /// Jobs per batch.
        #[arg(long, default_value = "1")]
        batch_size: u32,

        /// Batches to send.
        #[arg(long, default_value = "1")]
        batches: u32,

        /// Pause between batches, in milliseconds.
        #[arg(long, default_value = "0")]
        delay_ms: u64,
    },

    /// Run one scraper (or crawler) directly and print the outcome.
    Scrape {
        /// Job type, e.g. coren.
        job_type: String,

        /// Job name within the type, e.g. sp.
        job_name: String,

        /// Scraper input as key=value; repeatable.
        #[arg(long = "info", value_parser = parse_key_val)]
        informations: Vec<(String, String)>,

        /// Resolve the crawler table instead of the scraper table.
        #[arg(long)]
        crawl: bool,
    },

    /// Fleet administration against the configured backend.
    Instances {
        #[command(subcommand)]
        action: InstanceAction,
    },
}

#[derive(Subcommand)]
enum InstanceAction {
    /// Launch worker instances.
    Create {
        #[arg(long, default_value = "1")]
        count: u32,

        #[arg(long)]
        instance_type: Option<String>,
    },

    /// Terminate by explicit id, or by a count of orchestrator-owned
    /// running instances.
    Terminate {
        /// Instance ids to terminate.
        ids: Vec<String>,

        #[arg(long)]
        count: Option<u32>,
    },

    /// Launch the queue consumer on a running instance.
    Bootstrap {
        id: String,

        /// Batch size for the remote consumer.
        #[arg(long, default_value = "5")]
        capacity: u32,
    },

    /// Query one instance's lifecycle state.
    Status { id: String },
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,trawler=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = TrawlerConfig::load_or_default(&cli.config)?;

    match cli.command {
        Command::Orchestrate {
            sla_ms,
            capacity,
            max_fleet_size,
            instance_type,
            drain,
            seed_jobs,
            results_dir,
        } => {
            if let Some(sla_ms) = sla_ms {
                config.scaling.sla_ms = sla_ms;
            }
            if let Some(capacity) = capacity {
                config.scaling.capacity = capacity;
            }
            if let Some(max_fleet_size) = max_fleet_size {
                config.scaling.max_fleet_size = max_fleet_size;
            }
            if let Some(instance_type) = instance_type {
                config.fleet.instance_type = instance_type;
            }
            if let Some(results_dir) = results_dir {
                config.report.results_dir = results_dir;
            }
            config.scaling.drain = config.scaling.drain || drain;
            orchestrate_mode::run_orchestrate(config, seed_jobs).await
        }
        Command::Consume {
            batch_size,
            worker_id,
            seed_jobs,
        } => consume_mode::run_consume(config, batch_size, worker_id, seed_jobs).await,
        Command::Populate {
            batch_size,
            batches,
            delay_ms,
        } => ops::run_populate(batch_size, batches, delay_ms).await,
        Command::Scrape {
            job_type,
            job_name,
            informations,
            crawl,
        } => ops::run_scrape(&config, &job_type, &job_name, informations, crawl).await,
        Command::Instances { action } => ops::run_instances(config, action).await,
    }
}
