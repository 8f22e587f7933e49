//! AttemptLifecycle - claim, progress, complete and fail.
//!
//! State machine per task:
//! NEW -> ASSIGNED -> { COMPLETED | NEW (retry) | FAILED }
//!
//! The store applies each transition under its write lock; this layer stamps
//! times, allocates attempt ids and logs what happened.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::resolver::DependencyResolver;
use crate::domain::{
    AttemptId, CompletionOutcome, Decider, Document, FailureOutcome, Result, SchedulerError, Task,
    TaskAttempt, TaskId, TaskType, WorkerId, validate_progress,
};
use crate::ports::{Clock, IdGenerator, TaskStore};

/// What a worker receives when it claims work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub task: Task,
    pub attempt: TaskAttempt,
    pub document: Document,
}

pub struct AttemptLifecycle {
    store: Arc<dyn TaskStore>,
    resolver: DependencyResolver,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    decider: Arc<dyn Decider>,
}

impl AttemptLifecycle {
    pub fn new(
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        decider: Arc<dyn Decider>,
    ) -> Self {
        Self {
            resolver: DependencyResolver::new(Arc::clone(&store)),
            store,
            clock,
            ids,
            decider,
        }
    }

    /// Claim a specific task. `NotReady` if it cannot be claimed right now.
    pub async fn claim(&self, task_id: TaskId, worker_id: WorkerId) -> Result<TaskAttempt> {
        let attempt = self
            .store
            .claim(task_id, worker_id, self.ids.attempt_id(), self.clock.now())
            .await?;
        info!(
            task_id = %task_id,
            worker_id = %worker_id,
            attempt = attempt.attempt_number,
            "task claimed"
        );
        Ok(attempt)
    }

    /// Claim the first ready task, oldest first. `None` when nothing is ready.
    ///
    /// Tasks taken or deleted by a concurrent caller between the read and the
    /// claim are skipped.
    pub async fn claim_next(
        &self,
        worker_id: WorkerId,
        task_type: Option<TaskType>,
    ) -> Result<Option<Assignment>> {
        for task in self.resolver.ready_set(task_type).await? {
            match self.claim(task.id, worker_id).await {
                Ok(attempt) => {
                    let task = self.store.get_task(task.id).await?;
                    let document = self.store.get_document(task.document_id).await?;
                    return Ok(Some(Assignment {
                        task,
                        attempt,
                        document,
                    }));
                }
                Err(err)
                    if err.is_retryable() || matches!(err, SchedulerError::TaskNotFound(_)) =>
                {
                    debug!(task_id = %task.id, error = %err, "lost claim race, trying next task");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Keepalive with optional progress in `[0, 1]` and optional worker data.
    pub async fn report_progress(
        &self,
        attempt_id: AttemptId,
        progress: Option<f64>,
        extra_data: Option<serde_json::Value>,
    ) -> Result<TaskAttempt> {
        let progress = progress.map(validate_progress).transpose()?;
        let attempt = self
            .store
            .record_keepalive(attempt_id, progress, extra_data, self.clock.now())
            .await?;
        debug!(attempt_id = %attempt_id, progress = ?attempt.progress, "keepalive");
        Ok(attempt)
    }

    /// Mark the attempt's task COMPLETED. Repeating it is a no-op.
    pub async fn complete(
        &self,
        attempt_id: AttemptId,
        extra_data: Option<serde_json::Value>,
    ) -> Result<CompletionOutcome> {
        let outcome = self
            .store
            .complete_attempt(attempt_id, extra_data, self.clock.now())
            .await?;
        match outcome {
            CompletionOutcome::Completed { task_id } => {
                info!(task_id = %task_id, attempt_id = %attempt_id, "task completed");
            }
            CompletionOutcome::AlreadyEnded { task_id } => {
                debug!(task_id = %task_id, attempt_id = %attempt_id, "attempt already ended");
            }
        }
        Ok(outcome)
    }

    /// End the attempt as failed; the task is retried or fails permanently.
    ///
    /// Permanent failure is reported as `FailureOutcome::Exhausted`; use
    /// `FailureOutcome::into_result` to turn it into `ExhaustedRetries`.
    pub async fn fail(&self, attempt_id: AttemptId, reason: &str) -> Result<FailureOutcome> {
        let outcome = self
            .store
            .fail_attempt(attempt_id, reason, self.decider.as_ref(), self.clock.now())
            .await?;
        log_failure(attempt_id, reason, &outcome);
        Ok(outcome)
    }

    /// `fail` for an attempt found silent since before `cutoff`. The silence
    /// is checked again atomically with the failure; `None` means the worker
    /// reported in meanwhile and the attempt keeps running.
    pub async fn fail_if_stalled(
        &self,
        attempt_id: AttemptId,
        cutoff: DateTime<Utc>,
        reason: &str,
    ) -> Result<Option<FailureOutcome>> {
        let outcome = self
            .store
            .fail_stalled_attempt(
                attempt_id,
                cutoff,
                reason,
                self.decider.as_ref(),
                self.clock.now(),
            )
            .await?;
        if let Some(outcome) = &outcome {
            log_failure(attempt_id, reason, outcome);
        }
        Ok(outcome)
    }
}

fn log_failure(attempt_id: AttemptId, reason: &str, outcome: &FailureOutcome) {
    match *outcome {
        FailureOutcome::Retried {
            task_id,
            remaining_attempts,
        } => {
            info!(task_id = %task_id, remaining_attempts, reason, "task scheduled for retry");
        }
        FailureOutcome::Exhausted { task_id } => {
            warn!(task_id = %task_id, reason, "task failed permanently, attempts exhausted");
        }
        FailureOutcome::AlreadyEnded { task_id } => {
            debug!(task_id = %task_id, attempt_id = %attempt_id, "attempt already ended");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::app::graph::TaskGraph;
    use crate::domain::{
        CreateTask, DefaultDecider, ParameterMap, SchedulerError, TaskSpec, TaskState,
    };
    use crate::impls::InMemoryTaskStore;
    use crate::impls::interleaved::{Interleave, InterleavedStore};
    use crate::ports::{FixedClock, UlidGenerator};

    struct Harness {
        graph: TaskGraph,
        lifecycle: AttemptLifecycle,
        clock: Arc<FixedClock>,
        worker: WorkerId,
    }

    async fn harness(attempt_limit: u32) -> Harness {
        harness_on(Arc::new(InMemoryTaskStore::new()), attempt_limit).await
    }

    async fn harness_on(store: Arc<dyn TaskStore>, attempt_limit: u32) -> Harness {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));
        let graph = TaskGraph::new(store.clone(), clock.clone(), ids.clone(), attempt_limit);
        let lifecycle =
            AttemptLifecycle::new(store, clock.clone(), ids, Arc::new(DefaultDecider));
        let worker = graph.register_worker("w1").await.unwrap().id;
        Harness {
            graph,
            lifecycle,
            clock,
            worker,
        }
    }

    impl Harness {
        async fn task(&self) -> Task {
            let doc = self.graph.create_document(Some(120.0)).await.unwrap();
            self.graph
                .create_task(CreateTask::new(doc.id, TaskSpec::Align(ParameterMap::new())))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn claim_next_returns_none_when_idle() {
        let h = harness(3).await;
        assert!(h.lifecycle.claim_next(h.worker, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_next_hands_out_each_task_once() {
        let h = harness(3).await;
        let task = h.task().await;

        let assignment = h.lifecycle.claim_next(h.worker, None).await.unwrap().unwrap();
        assert_eq!(assignment.task.id, task.id);
        assert_eq!(assignment.task.state, TaskState::Assigned);
        assert_eq!(assignment.document.duration, Some(120.0));

        assert!(h.lifecycle.claim_next(h.worker, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_next_skips_a_task_deleted_after_the_read() {
        let store = InterleavedStore::new();
        let h = harness_on(store.clone(), 3).await;
        let a = h.task().await;
        let b = h.task().await;
        // Same creation time, so selection order falls back to the id.
        let (first, second) = if a.id < b.id { (a, b) } else { (b, a) };

        store.after_dependency_states(Interleave::DeleteTask(first.id));

        let assignment = h.lifecycle.claim_next(h.worker, None).await.unwrap().unwrap();
        assert_eq!(assignment.task.id, second.id);
    }

    #[tokio::test]
    async fn progress_is_validated_and_refreshes_keepalive() {
        let h = harness(3).await;
        let task = h.task().await;
        let attempt = h.lifecycle.claim(task.id, h.worker).await.unwrap();

        assert!(matches!(
            h.lifecycle.report_progress(attempt.id, Some(1.5), None).await,
            Err(SchedulerError::Validation(_))
        ));

        h.clock.advance(chrono::Duration::seconds(5));
        let updated = h
            .lifecycle
            .report_progress(attempt.id, Some(0.25), None)
            .await
            .unwrap();
        assert_eq!(updated.progress, Some(0.25));
        assert_eq!(updated.last_keepalive, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn retries_follow_the_attempt_budget() {
        let h = harness(3).await;
        let task = h.task().await;

        for n in 1..=3u32 {
            let attempt = h.lifecycle.claim(task.id, h.worker).await.unwrap();
            assert_eq!(attempt.attempt_number, n);
            h.lifecycle.fail(attempt.id, "crashed").await.unwrap();

            let task = h.lifecycle.store.get_task(task.id).await.unwrap();
            assert_eq!(task.attempt_counter, n);
            assert_eq!(task.remaining_attempts, 3 - n);
            assert_eq!(task.state == TaskState::Failed, n >= 3);
        }

        assert_eq!(
            h.lifecycle.claim(task.id, h.worker).await.unwrap_err(),
            SchedulerError::NotReady(task.id)
        );
    }

    #[tokio::test]
    async fn exhausted_outcome_escalates() {
        let h = harness(1).await;
        let task = h.task().await;
        let attempt = h.lifecycle.claim(task.id, h.worker).await.unwrap();

        let outcome = h.lifecycle.fail(attempt.id, "crashed").await.unwrap();
        assert_eq!(
            outcome.into_result(),
            Err(SchedulerError::ExhaustedRetries(task.id))
        );
    }

    #[tokio::test]
    async fn complete_then_fail_keeps_the_task_completed() {
        let h = harness(3).await;
        let task = h.task().await;
        let attempt = h.lifecycle.claim(task.id, h.worker).await.unwrap();

        h.lifecycle.complete(attempt.id, None).await.unwrap();
        let outcome = h.lifecycle.fail(attempt.id, "late").await.unwrap();

        assert_eq!(outcome, FailureOutcome::AlreadyEnded { task_id: task.id });
        let task = h.lifecycle.store.get_task(task.id).await.unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.remaining_attempts, 3);
    }
}
