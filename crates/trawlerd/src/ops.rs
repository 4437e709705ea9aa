//! One-shot operator commands: queue population, direct scrapes, and
//! fleet administration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info};

use trawler_core::config::TrawlerConfig;
use trawler_core::Job;
use trawler_fleet::{ComputeBackend, FleetManager, SimCompute, SshExec, TerminateTarget};
use trawler_queue::{MemoryQueue, WorkQueue};
use trawler_scrape::{FsStore, ResultStore, ScraperRegistry};

use crate::InstanceAction;

/// Seed job used by populate and `--seed-jobs`: one coren-sp
/// registration lookup.
pub fn default_job() -> Job {
    let mut informations = HashMap::new();
    informations.insert("registrationNumber".to_string(), "1109410".to_string());
    Job::new("coren", "sp", informations)
}

/// Send `batches` batches of `batch_size` seed jobs, each batch
/// dispatched concurrently, pausing `delay` between batches.
pub async fn populate(
    queue: &dyn WorkQueue,
    batch_size: u32,
    batches: u32,
    delay: Duration,
) -> anyhow::Result<()> {
    for index in 1..=batches {
        info!(batch = index, batches, batch_size, "sending batch");
        let jobs: Vec<Job> = (0..batch_size).map(|_| default_job()).collect();
        try_join_all(jobs.iter().map(|job| queue.send(job))).await?;
        if index != batches {
            debug!(delay_ms = delay.as_millis() as u64, "batch sent, waiting");
            tokio::time::sleep(delay).await;
        }
    }
    Ok(())
}

pub async fn run_populate(batch_size: u32, batches: u32, delay_ms: u64) -> anyhow::Result<()> {
    let queue = MemoryQueue::new();
    populate(&queue, batch_size, batches, Duration::from_millis(delay_ms)).await?;
    info!(depth = queue.approximate_depth().await?, "queue populated");
    Ok(())
}

/// Resolve one capability and run it. Scrapes are filed in the result
/// store; crawl output is the answer itself and goes to stdout.
pub async fn run_scrape(
    config: &TrawlerConfig,
    job_type: &str,
    job_name: &str,
    informations: Vec<(String, String)>,
    crawl: bool,
) -> anyhow::Result<()> {
    let registry = ScraperRegistry::builtin();
    let informations: HashMap<String, String> = informations.into_iter().collect();
    let capability = if crawl {
        registry.crawler(job_type, job_name)?
    } else {
        registry.scraper(job_type, job_name)?
    };
    let content = capability.scrape(&informations).await?;

    if crawl {
        println!("{content}");
        return Ok(());
    }
    let store = FsStore::new(&config.store.root);
    let location = store
        .store(&content, &format!("{job_type}/{job_name}"))
        .await?;
    info!(%location, "scrape finished");
    println!("{location}");
    Ok(())
}

pub async fn run_instances(mut config: TrawlerConfig, action: InstanceAction) -> anyhow::Result<()> {
    if let InstanceAction::Create {
        instance_type: Some(instance_type),
        ..
    } = &action
    {
        config.fleet.instance_type = instance_type.clone();
    }
    let compute = Arc::new(SimCompute::new());
    let exec = Arc::new(SshExec::new(
        config.fleet.ssh_user.clone(),
        config.fleet.ssh_key_path.clone(),
    ));
    let manager = FleetManager::new(compute.clone(), exec, config.fleet.clone());

    match action {
        InstanceAction::Create { count, .. } => {
            let created = manager.create(count).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        InstanceAction::Terminate { ids, count } => {
            let target = if !ids.is_empty() {
                TerminateTarget::Ids(ids)
            } else if let Some(count) = count {
                TerminateTarget::Count(count)
            } else {
                anyhow::bail!("pass instance ids or --count");
            };
            let transitions = manager.terminate(target).await?;
            println!("{}", serde_json::to_string_pretty(&transitions)?);
        }
        InstanceAction::Bootstrap { id, capacity } => {
            manager.bootstrap(&id, capacity).await?;
            info!(%id, "consumer launched");
        }
        InstanceAction::Status { id } => {
            let status = compute.instance_status(&id).await?;
            println!("{status}");
        }
    }
    Ok(())
}
