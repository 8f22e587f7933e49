mod cli;
mod logging;
mod sim;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, ensure};
use serde::Serialize;
use spool_core::app::{MetricFamily, QueueInfo, TaskView};
use spool_core::config::SchedulerConfig;
use spool_core::domain::{DocumentId, TaskState};
use spool_core::impls::InMemoryUserDirectory;
use spool_core::ports::TaskFilter;
use spool_core::{Scheduler, SchedulerBuilder};
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::sim::SimulationSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Serialize)]
struct RunReport {
    elapsed_secs: f64,
    settled: bool,
    tasks_by_state: BTreeMap<&'static str, usize>,
    documents: Vec<DocumentReport>,
    queue_info: QueueInfo,
    total_remaining_cost: f64,
    metrics: Vec<MetricFamily>,
}

#[derive(Debug, Serialize)]
struct DocumentReport {
    id: DocumentId,
    duration: Option<f64>,
    tasks: Vec<TaskView>,
}

fn load_config(args: &CliArgs) -> anyhow::Result<SchedulerConfig> {
    let mut config = match &args.config {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SchedulerConfig::from_env().context("failed to load config from environment")?,
    };
    if let Some(secs) = args.worker_timeout_secs {
        config.worker_timeout_secs = secs;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Nothing is running and nothing can be claimed. Tasks behind a failed
/// dependency stay NEW forever, so an empty queue is not required.
async fn settled(scheduler: &Scheduler) -> anyhow::Result<bool> {
    let info = scheduler.queue_info().await?;
    if info.open_tasks.iter().any(|e| e.state == TaskState::Assigned) {
        return Ok(false);
    }
    Ok(scheduler.resolver.ready_set(None).await?.is_empty())
}

async fn report(
    scheduler: &Scheduler,
    documents: &[DocumentId],
    started: Instant,
    settled: bool,
) -> anyhow::Result<RunReport> {
    scheduler.metrics.refresh().await?;

    let mut tasks_by_state: BTreeMap<&'static str, usize> =
        TaskState::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for task in scheduler.store.list_tasks(&TaskFilter::new()).await? {
        *tasks_by_state.entry(task.state.as_str()).or_default() += 1;
    }

    let mut docs = Vec::with_capacity(documents.len());
    for &id in documents {
        let document = scheduler.store.get_document(id).await?;
        docs.push(DocumentReport {
            id,
            duration: document.duration,
            tasks: scheduler.graph.document_tasks(id).await?,
        });
    }

    let queue_info = scheduler.queue_info().await?;
    Ok(RunReport {
        elapsed_secs: started.elapsed().as_secs_f64(),
        settled,
        tasks_by_state,
        documents: docs,
        total_remaining_cost: queue_info.total_cost(),
        queue_info,
        metrics: scheduler.metrics.gather().await,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    ensure!(
        (0.0..=1.0).contains(&args.failure_rate),
        "--failure-rate must be within [0, 1]"
    );
    ensure!(
        (0.0..=1.0).contains(&args.stall_rate),
        "--stall-rate must be within [0, 1]"
    );

    let config = load_config(&args)?;
    info!(
        worker_timeout_secs = config.worker_timeout_secs,
        task_attempt_limit = config.task_attempt_limit,
        metrics_auth = config.metrics_username.is_some(),
        "configuration loaded"
    );

    let users = Arc::new(InMemoryUserDirectory::new());
    users.register("operator").await;

    let scheduler = Arc::new(
        SchedulerBuilder::new(config)
            .users(users)
            .build()
            .context("failed to build scheduler")?,
    );

    let mut documents = Vec::with_capacity(args.documents);
    for _ in 0..args.documents {
        let document = scheduler.graph.create_document(None).await?;
        sim::seed_pipeline(&scheduler, document.id).await?;
        documents.push(document.id);
    }

    let mut workers = Vec::with_capacity(args.workers);
    for i in 0..args.workers {
        workers.push(scheduler.graph.register_worker(format!("sim-{i}")).await?.id);
    }
    info!(
        documents = documents.len(),
        workers = workers.len(),
        "simulation seeded"
    );

    let started = Instant::now();
    let background = scheduler.spawn_background();
    let pool = sim::spawn_workers(
        Arc::clone(&scheduler),
        &workers,
        &SimulationSettings {
            failure_rate: args.failure_rate,
            stall_rate: args.stall_rate,
            step: Duration::from_millis(args.step_ms),
            seed: args.seed,
        },
    );

    let deadline = Duration::from_secs(args.deadline_secs);
    let mut done = false;
    while started.elapsed() < deadline {
        tokio::time::sleep(POLL_INTERVAL).await;
        if settled(&scheduler).await? {
            done = true;
            break;
        }
    }
    if !done {
        warn!(deadline_secs = args.deadline_secs, "deadline reached before the queue settled");
    }

    pool.shutdown_and_join().await;
    background.shutdown_and_join().await;

    let report = report(&scheduler, &documents, started, done).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
