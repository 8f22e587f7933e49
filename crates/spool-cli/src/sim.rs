//! Simulated media workers.
//!
//! Each worker heartbeats, claims the next ready task and works through it in
//! a fixed number of steps, reporting progress after each. A step can fail
//! the attempt or hang it; a hung attempt is simply abandoned and left for
//! the liveness sweep to reclaim.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use spool_core::Scheduler;
use spool_core::app::{Assignment, LoopGroup};
use spool_core::domain::{
    CreateTask, DocumentId, ExportFormat, ExportParameters, ParameterMap, Result, TaskId,
    TaskSpec, TaskType, TranscribeParameters, WorkerId,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const STEPS: u32 = 5;

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub failure_rate: f64,
    pub stall_rate: f64,
    pub step: Duration,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkEnd {
    Completed,
    Failed,
    Stalled,
    Interrupted,
}

/// Create the five pipeline stages for `document`, wired in dependency order.
pub async fn seed_pipeline(scheduler: &Scheduler, document: DocumentId) -> Result<Vec<TaskId>> {
    let graph = &scheduler.graph;

    let reencode = graph
        .create_task(CreateTask::new(document, TaskSpec::Reencode(ParameterMap::new())))
        .await?;
    let transcribe = graph
        .create_task(
            CreateTask::new(
                document,
                TaskSpec::Transcribe(TranscribeParameters {
                    lang: "auto".into(),
                    model: "medium".into(),
                }),
            )
            .depends_on(reencode.id),
        )
        .await?;
    let align = graph
        .create_task(
            CreateTask::new(document, TaskSpec::Align(ParameterMap::new()))
                .depends_on(reencode.id)
                .depends_on(transcribe.id),
        )
        .await?;
    let speakers = graph
        .create_task(
            CreateTask::new(document, TaskSpec::IdentifySpeakers(ParameterMap::new()))
                .depends_on(align.id),
        )
        .await?;
    let export = graph
        .create_task(
            CreateTask::new(
                document,
                TaskSpec::Export(ExportParameters {
                    format: ExportFormat::Vtt,
                    include_speaker_names: true,
                    include_word_timing: false,
                    max_line_length: None,
                }),
            )
            .depends_on(speakers.id),
        )
        .await?;

    Ok(vec![
        reencode.id,
        transcribe.id,
        align.id,
        speakers.id,
        export.id,
    ])
}

/// Spawn one loop per worker. Stopping the group stops the workers.
pub fn spawn_workers(
    scheduler: Arc<Scheduler>,
    workers: &[WorkerId],
    settings: &SimulationSettings,
) -> LoopGroup {
    let mut group = LoopGroup::new();
    for (i, &worker) in workers.iter().enumerate() {
        let scheduler = Arc::clone(&scheduler);
        let settings = settings.clone();
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
            None => StdRng::from_entropy(),
        };
        group.spawn("sim-worker", move |shutdown| {
            worker_loop(scheduler, worker, settings, rng, shutdown)
        });
    }
    group
}

async fn worker_loop(
    scheduler: Arc<Scheduler>,
    worker: WorkerId,
    settings: SimulationSettings,
    mut rng: StdRng,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(worker_id = %worker, "worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        if let Err(err) = scheduler.graph.heartbeat(worker).await {
            warn!(worker_id = %worker, error = %err, "heartbeat failed");
        }

        let assignment = match scheduler.lifecycle.claim_next(worker, None).await {
            Ok(Some(assignment)) => assignment,
            Ok(None) => {
                // nothing ready: wait a step or until shutdown
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(settings.step) => {}
                }
                continue;
            }
            Err(err) => {
                warn!(worker_id = %worker, error = %err, "claim failed");
                tokio::time::sleep(settings.step).await;
                continue;
            }
        };

        let task_id = assignment.task.id;
        match work(&scheduler, worker, &assignment, &settings, &mut rng, &mut shutdown).await {
            Ok(end) => debug!(worker_id = %worker, task_id = %task_id, ?end, "work ended"),
            Err(err) => {
                warn!(worker_id = %worker, task_id = %task_id, error = %err, "work aborted");
            }
        }
    }

    info!(worker_id = %worker, "worker stopped");
}

async fn work(
    scheduler: &Scheduler,
    worker: WorkerId,
    assignment: &Assignment,
    settings: &SimulationSettings,
    rng: &mut StdRng,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<WorkEnd> {
    let attempt_id = assignment.attempt.id;

    for step in 1..=STEPS {
        tokio::select! {
            _ = shutdown.changed() => {
                scheduler.lifecycle.fail(attempt_id, "worker shutting down").await?;
                return Ok(WorkEnd::Interrupted);
            }
            _ = tokio::time::sleep(settings.step) => {}
        }

        if rng.gen_bool(settings.stall_rate) {
            warn!(
                worker_id = %worker,
                attempt_id = %attempt_id,
                "simulated hang, abandoning attempt"
            );
            return Ok(WorkEnd::Stalled);
        }
        if rng.gen_bool(settings.failure_rate) {
            scheduler.lifecycle.fail(attempt_id, "simulated failure").await?;
            return Ok(WorkEnd::Failed);
        }

        scheduler
            .lifecycle
            .report_progress(
                attempt_id,
                Some(f64::from(step) / f64::from(STEPS)),
                Some(json!({ "step": step })),
            )
            .await?;
        scheduler.graph.heartbeat(worker).await?;
    }

    // The reencode stage is where the media length becomes known.
    if assignment.task.task_type() == TaskType::Reencode && assignment.document.duration.is_none()
    {
        let secs: f64 = rng.gen_range(60.0..1800.0);
        scheduler
            .graph
            .set_duration(assignment.document.id, secs.round())
            .await?;
    }

    scheduler
        .lifecycle
        .complete(attempt_id, Some(json!({ "worker_id": worker })))
        .await?;
    Ok(WorkEnd::Completed)
}
