//! TaskStore port - the persistence collaborator.
//!
//! The store is the source of truth for tasks, attempts, dependency edges,
//! documents and workers. Implementations must guarantee:
//! - `create_task` is all-or-nothing and rejects cycles.
//! - `claim`, `complete_attempt`, `fail_attempt` and `fail_stalled_attempt`
//!   are mutually exclusive read-modify-write operations; a ready task is
//!   granted to at most one caller.
//! - Deletes cascade: attempts and edges before the task, tasks before the
//!   document.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    AttemptId, CompletionOutcome, Decider, Document, DocumentId, FailureOutcome, Result,
    StoreSnapshot, Task, TaskAttempt, TaskDependency, TaskId, TaskState, TaskType, Worker,
    WorkerId,
};

/// Selection criteria for `list_tasks`. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub states: Option<Vec<TaskState>>,
    pub task_type: Option<TaskType>,
    pub document_id: Option<DocumentId>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(mut self, states: &[TaskState]) -> Self {
        self.states = Some(states.to_vec());
        self
    }

    pub fn task_type(mut self, task_type: Option<TaskType>) -> Self {
        self.task_type = task_type;
        self
    }

    pub fn document(mut self, document_id: DocumentId) -> Self {
        self.document_id = Some(document_id);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.states
            .as_ref()
            .is_none_or(|states| states.contains(&task.state))
            && self.task_type.is_none_or(|t| t == task.task_type())
            && self.document_id.is_none_or(|d| d == task.document_id)
    }
}

/// What a cascading delete removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeSummary {
    pub tasks: usize,
    pub attempts: usize,
    pub dependencies: usize,
}

impl std::ops::AddAssign for CascadeSummary {
    fn add_assign(&mut self, other: Self) {
        self.tasks += other.tasks;
        self.attempts += other.attempts;
        self.dependencies += other.dependencies;
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    // ---- documents ----

    async fn insert_document(&self, document: Document) -> Result<()>;

    async fn get_document(&self, id: DocumentId) -> Result<Document>;

    async fn set_document_duration(&self, id: DocumentId, duration: f64) -> Result<Document>;

    /// Delete a document and, transitively, its tasks.
    async fn delete_document(&self, id: DocumentId) -> Result<CascadeSummary>;

    // ---- workers ----

    async fn upsert_worker(&self, worker: Worker) -> Result<()>;

    async fn get_worker(&self, id: WorkerId) -> Result<Worker>;

    /// Refresh `last_seen`.
    async fn heartbeat(&self, id: WorkerId, now: DateTime<Utc>) -> Result<()>;

    async fn deactivate_worker(&self, id: WorkerId, now: DateTime<Utc>) -> Result<Worker>;

    // ---- task graph ----

    /// Insert a task with its outgoing edges, atomically.
    ///
    /// Fails with `Validation` when the document or a referenced task is
    /// missing, or an edge does not start at `task`, and with `Cycle` when an
    /// edge would close a cycle.
    async fn create_task(&self, task: Task, edges: Vec<TaskDependency>) -> Result<Task>;

    /// Add an edge between two existing tasks. A duplicate returns the edge
    /// already stored.
    async fn add_dependency(&self, edge: TaskDependency) -> Result<TaskDependency>;

    async fn get_task(&self, id: TaskId) -> Result<Task>;

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Edges leaving `id` (what it waits for).
    async fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskDependency>>;

    /// Edges entering `id` (who waits for it).
    async fn dependants_of(&self, id: TaskId) -> Result<Vec<TaskDependency>>;

    /// States of the dependencies of each given task, read together.
    async fn dependency_states(&self, ids: &[TaskId]) -> Result<HashMap<TaskId, Vec<TaskState>>>;

    /// Delete a task with its attempts and every edge touching it.
    async fn delete_task(&self, id: TaskId) -> Result<CascadeSummary>;

    // ---- attempts ----

    async fn get_attempt(&self, id: AttemptId) -> Result<TaskAttempt>;

    /// Attempts of a task, oldest first.
    async fn attempts_of(&self, task_id: TaskId) -> Result<Vec<TaskAttempt>>;

    /// Exclusive claim: create attempt `attempt_id` for `worker_id` if the
    /// task is ready right now, else `NotReady`.
    async fn claim(
        &self,
        task_id: TaskId,
        worker_id: WorkerId,
        attempt_id: AttemptId,
        now: DateTime<Utc>,
    ) -> Result<TaskAttempt>;

    /// Keepalive with optional progress. The caller validates `progress`.
    async fn record_keepalive(
        &self,
        attempt_id: AttemptId,
        progress: Option<f64>,
        extra_data: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<TaskAttempt>;

    /// Exclusive, idempotent completion.
    async fn complete_attempt(
        &self,
        attempt_id: AttemptId,
        extra_data: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome>;

    /// Exclusive, idempotent failure; `decider` picks retry or permanent failure.
    async fn fail_attempt(
        &self,
        attempt_id: AttemptId,
        reason: &str,
        decider: &dyn Decider,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome>;

    /// `fail_attempt` for reclaims: re-checks under the same exclusive access
    /// that the attempt is still silent since before `cutoff`. `None` when a
    /// keepalive arrived in between; an ended attempt gives `AlreadyEnded`.
    async fn fail_stalled_attempt(
        &self,
        attempt_id: AttemptId,
        cutoff: DateTime<Utc>,
        reason: &str,
        decider: &dyn Decider,
        now: DateTime<Utc>,
    ) -> Result<Option<FailureOutcome>>;

    /// Unended current attempts of ASSIGNED tasks silent since before `cutoff`.
    async fn stalled_attempts(&self, cutoff: DateTime<Utc>) -> Result<Vec<TaskAttempt>>;

    // ---- reads ----

    async fn snapshot(&self) -> Result<StoreSnapshot>;
}
