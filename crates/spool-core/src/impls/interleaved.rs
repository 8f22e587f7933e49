//! Test store that applies one queued write right after a chosen read
//! returns, standing in for a concurrent caller that wins the gap between
//! a read and the write that depends on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AttemptId, CompletionOutcome, Decider, Document, DocumentId, FailureOutcome, Result,
    StoreSnapshot, Task, TaskAttempt, TaskDependency, TaskId, TaskState, Worker, WorkerId,
};
use crate::impls::InMemoryTaskStore;
use crate::ports::{CascadeSummary, TaskFilter, TaskStore};

/// The write slipped in.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Interleave {
    Keepalive {
        attempt_id: AttemptId,
        now: DateTime<Utc>,
    },
    DeleteTask(TaskId),
}

#[derive(Default)]
pub(crate) struct InterleavedStore {
    inner: InMemoryTaskStore,
    after_stalled_attempts: Mutex<Option<Interleave>>,
    after_dependency_states: Mutex<Option<Interleave>>,
}

impl InterleavedStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn after_stalled_attempts(&self, write: Interleave) {
        *self.after_stalled_attempts.lock().unwrap() = Some(write);
    }

    /// `dependency_states` is the last read of `DependencyResolver::ready_set`.
    pub(crate) fn after_dependency_states(&self, write: Interleave) {
        *self.after_dependency_states.lock().unwrap() = Some(write);
    }

    async fn apply(&self, slot: &Mutex<Option<Interleave>>) {
        let write = slot.lock().unwrap().take();
        match write {
            Some(Interleave::Keepalive { attempt_id, now }) => {
                self.inner
                    .record_keepalive(attempt_id, None, None, now)
                    .await
                    .unwrap();
            }
            Some(Interleave::DeleteTask(id)) => {
                self.inner.delete_task(id).await.unwrap();
            }
            None => {}
        }
    }
}

#[async_trait]
impl TaskStore for InterleavedStore {
    async fn insert_document(&self, document: Document) -> Result<()> {
        self.inner.insert_document(document).await
    }

    async fn get_document(&self, id: DocumentId) -> Result<Document> {
        self.inner.get_document(id).await
    }

    async fn set_document_duration(&self, id: DocumentId, duration: f64) -> Result<Document> {
        self.inner.set_document_duration(id, duration).await
    }

    async fn delete_document(&self, id: DocumentId) -> Result<CascadeSummary> {
        self.inner.delete_document(id).await
    }

    async fn upsert_worker(&self, worker: Worker) -> Result<()> {
        self.inner.upsert_worker(worker).await
    }

    async fn get_worker(&self, id: WorkerId) -> Result<Worker> {
        self.inner.get_worker(id).await
    }

    async fn heartbeat(&self, id: WorkerId, now: DateTime<Utc>) -> Result<()> {
        self.inner.heartbeat(id, now).await
    }

    async fn deactivate_worker(&self, id: WorkerId, now: DateTime<Utc>) -> Result<Worker> {
        self.inner.deactivate_worker(id, now).await
    }

    async fn create_task(&self, task: Task, edges: Vec<TaskDependency>) -> Result<Task> {
        self.inner.create_task(task, edges).await
    }

    async fn add_dependency(&self, edge: TaskDependency) -> Result<TaskDependency> {
        self.inner.add_dependency(edge).await
    }

    async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.inner.get_task(id).await
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.inner.list_tasks(filter).await
    }

    async fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskDependency>> {
        self.inner.dependencies_of(id).await
    }

    async fn dependants_of(&self, id: TaskId) -> Result<Vec<TaskDependency>> {
        self.inner.dependants_of(id).await
    }

    async fn dependency_states(&self, ids: &[TaskId]) -> Result<HashMap<TaskId, Vec<TaskState>>> {
        let states = self.inner.dependency_states(ids).await?;
        self.apply(&self.after_dependency_states).await;
        Ok(states)
    }

    async fn delete_task(&self, id: TaskId) -> Result<CascadeSummary> {
        self.inner.delete_task(id).await
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<TaskAttempt> {
        self.inner.get_attempt(id).await
    }

    async fn attempts_of(&self, task_id: TaskId) -> Result<Vec<TaskAttempt>> {
        self.inner.attempts_of(task_id).await
    }

    async fn claim(
        &self,
        task_id: TaskId,
        worker_id: WorkerId,
        attempt_id: AttemptId,
        now: DateTime<Utc>,
    ) -> Result<TaskAttempt> {
        self.inner.claim(task_id, worker_id, attempt_id, now).await
    }

    async fn record_keepalive(
        &self,
        attempt_id: AttemptId,
        progress: Option<f64>,
        extra_data: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<TaskAttempt> {
        self.inner
            .record_keepalive(attempt_id, progress, extra_data, now)
            .await
    }

    async fn complete_attempt(
        &self,
        attempt_id: AttemptId,
        extra_data: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome> {
        self.inner.complete_attempt(attempt_id, extra_data, now).await
    }

    async fn fail_attempt(
        &self,
        attempt_id: AttemptId,
        reason: &str,
        decider: &dyn Decider,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        self.inner.fail_attempt(attempt_id, reason, decider, now).await
    }

    async fn fail_stalled_attempt(
        &self,
        attempt_id: AttemptId,
        cutoff: DateTime<Utc>,
        reason: &str,
        decider: &dyn Decider,
        now: DateTime<Utc>,
    ) -> Result<Option<FailureOutcome>> {
        self.inner
            .fail_stalled_attempt(attempt_id, cutoff, reason, decider, now)
            .await
    }

    async fn stalled_attempts(&self, cutoff: DateTime<Utc>) -> Result<Vec<TaskAttempt>> {
        let stalled = self.inner.stalled_attempts(cutoff).await?;
        self.apply(&self.after_stalled_attempts).await;
        Ok(stalled)
    }

    async fn snapshot(&self) -> Result<StoreSnapshot> {
        self.inner.snapshot().await
    }
}
