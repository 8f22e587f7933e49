//! In-memory task store.
//!
//! One `RwLock` guards the whole state. Reads (resolver, metrics, views) share
//! it; every mutation takes the write lock, which is what makes claim,
//! complete and fail mutually exclusive.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{
    AttemptId, CompletionOutcome, Decider, DependencyId, Document, DocumentId, FailureOutcome,
    Result, SchedulerError, StoreSnapshot, Task, TaskAttempt, TaskDependency, TaskId, TaskState,
    Worker, WorkerId, is_ready,
};
use crate::impls::DependencyGraph;
use crate::ports::{CascadeSummary, TaskFilter, TaskStore};

/// In-memory store state.
#[derive(Default)]
struct StoreState {
    documents: HashMap<DocumentId, Document>,

    workers: HashMap<WorkerId, Worker>,

    /// All task records (single source of truth for tasks).
    tasks: HashMap<TaskId, Task>,

    attempts: HashMap<AttemptId, TaskAttempt>,

    /// Attempt ids per task, in creation order.
    attempts_by_task: HashMap<TaskId, Vec<AttemptId>>,

    tasks_by_document: HashMap<DocumentId, BTreeSet<TaskId>>,

    /// Edge records, addressable by id and by `(dependent, dependant_on)`.
    edges: HashMap<DependencyId, TaskDependency>,
    edge_index: HashMap<(TaskId, TaskId), DependencyId>,

    /// Adjacency view of `edges`.
    graph: DependencyGraph,
}

impl StoreState {
    fn task(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).ok_or(SchedulerError::TaskNotFound(id))
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks.get_mut(&id).ok_or(SchedulerError::TaskNotFound(id))
    }

    fn attempt(&self, id: AttemptId) -> Result<&TaskAttempt> {
        self.attempts
            .get(&id)
            .ok_or(SchedulerError::AttemptNotFound(id))
    }

    fn dependency_states_of(&self, id: TaskId) -> Vec<TaskState> {
        self.graph
            .dependencies(id)
            .into_iter()
            .filter_map(|dep| self.tasks.get(&dep).map(|t| t.state))
            .collect()
    }

    fn edge_records(
        &self,
        pairs: impl IntoIterator<Item = (TaskId, TaskId)>,
    ) -> Vec<TaskDependency> {
        let mut edges: Vec<_> = pairs
            .into_iter()
            .filter_map(|pair| self.edge_index.get(&pair))
            .filter_map(|id| self.edges.get(id).copied())
            .collect();
        edges.sort_by_key(|e| e.id);
        edges
    }

    fn insert_edge(&mut self, edge: TaskDependency) {
        self.graph
            .add_dependency(edge.dependent_task, edge.dependant_on);
        self.edge_index
            .insert((edge.dependent_task, edge.dependant_on), edge.id);
        self.edges.insert(edge.id, edge);
    }

    /// Remove a task with its attempts and every edge touching it.
    fn remove_task(&mut self, id: TaskId) -> Result<CascadeSummary> {
        let task = self.tasks.remove(&id).ok_or(SchedulerError::TaskNotFound(id))?;

        let mut summary = CascadeSummary {
            tasks: 1,
            ..CascadeSummary::default()
        };

        for attempt_id in self.attempts_by_task.remove(&id).unwrap_or_default() {
            if self.attempts.remove(&attempt_id).is_some() {
                summary.attempts += 1;
            }
        }

        for pair in self.graph.remove_task(id) {
            if let Some(edge_id) = self.edge_index.remove(&pair) {
                self.edges.remove(&edge_id);
                summary.dependencies += 1;
            }
        }

        if let Some(tasks) = self.tasks_by_document.get_mut(&task.document_id) {
            tasks.remove(&id);
        }

        Ok(summary)
    }

    /// End an unended attempt as failed and apply the decider's decision.
    fn fail_attempt(
        &mut self,
        attempt_id: AttemptId,
        reason: &str,
        decider: &dyn Decider,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let attempt = self.attempt(attempt_id)?;
        let task_id = attempt.task_id;
        if attempt.is_ended() {
            return Ok(FailureOutcome::AlreadyEnded { task_id });
        }

        let task = self.task_mut(task_id)?;
        let decision = decider.decide(task, reason);
        task.apply_failure(&decision, now);
        let outcome = match task.state {
            TaskState::New => FailureOutcome::Retried {
                task_id,
                remaining_attempts: task.remaining_attempts,
            },
            _ => FailureOutcome::Exhausted { task_id },
        };

        if let Some(attempt) = self.attempts.get_mut(&attempt_id) {
            attempt.finish_failed(reason, now);
        }
        Ok(outcome)
    }
}

/// In-memory `TaskStore`.
#[derive(Default)]
pub struct InMemoryTaskStore {
    state: RwLock<StoreState>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert_document(&self, document: Document) -> Result<()> {
        let mut state = self.state.write().await;
        if state.documents.contains_key(&document.id) {
            return Err(SchedulerError::validation(format!(
                "document {} already exists",
                document.id
            )));
        }
        state.tasks_by_document.entry(document.id).or_default();
        state.documents.insert(document.id, document);
        Ok(())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Document> {
        let state = self.state.read().await;
        state
            .documents
            .get(&id)
            .cloned()
            .ok_or(SchedulerError::DocumentNotFound(id))
    }

    async fn set_document_duration(&self, id: DocumentId, duration: f64) -> Result<Document> {
        let mut state = self.state.write().await;
        let document = state
            .documents
            .get_mut(&id)
            .ok_or(SchedulerError::DocumentNotFound(id))?;
        document.duration = Some(duration);
        Ok(document.clone())
    }

    async fn delete_document(&self, id: DocumentId) -> Result<CascadeSummary> {
        let mut state = self.state.write().await;
        if !state.documents.contains_key(&id) {
            return Err(SchedulerError::DocumentNotFound(id));
        }

        let mut summary = CascadeSummary::default();
        let task_ids = state.tasks_by_document.remove(&id).unwrap_or_default();
        for task_id in task_ids {
            summary += state.remove_task(task_id)?;
        }
        state.documents.remove(&id);

        debug!(
            document_id = %id,
            tasks = summary.tasks,
            attempts = summary.attempts,
            dependencies = summary.dependencies,
            "document deleted"
        );
        Ok(summary)
    }

    async fn upsert_worker(&self, worker: Worker) -> Result<()> {
        let mut state = self.state.write().await;
        state.workers.insert(worker.id, worker);
        Ok(())
    }

    async fn get_worker(&self, id: WorkerId) -> Result<Worker> {
        let state = self.state.read().await;
        state
            .workers
            .get(&id)
            .cloned()
            .ok_or(SchedulerError::WorkerNotFound(id))
    }

    async fn heartbeat(&self, id: WorkerId, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(&id)
            .ok_or(SchedulerError::WorkerNotFound(id))?;
        worker.last_seen = now;
        Ok(())
    }

    async fn deactivate_worker(&self, id: WorkerId, now: DateTime<Utc>) -> Result<Worker> {
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(&id)
            .ok_or(SchedulerError::WorkerNotFound(id))?;
        worker.deactivated_at.get_or_insert(now);
        Ok(worker.clone())
    }

    async fn create_task(&self, task: Task, edges: Vec<TaskDependency>) -> Result<Task> {
        let mut state = self.state.write().await;

        if state.tasks.contains_key(&task.id) {
            return Err(SchedulerError::validation(format!(
                "task {} already exists",
                task.id
            )));
        }
        if !state.documents.contains_key(&task.document_id) {
            return Err(SchedulerError::validation(format!(
                "document {} does not exist",
                task.document_id
            )));
        }

        // Validate every edge before touching anything.
        let mut accepted: Vec<TaskDependency> = Vec::with_capacity(edges.len());
        for edge in edges {
            if edge.dependent_task != task.id {
                return Err(SchedulerError::validation(format!(
                    "dependency {} does not start at task {}",
                    edge.id, task.id
                )));
            }
            if edge.dependant_on == task.id {
                return Err(SchedulerError::Cycle(vec![task.id, task.id]));
            }
            if !state.tasks.contains_key(&edge.dependant_on) {
                return Err(SchedulerError::validation(format!(
                    "dependency target {} does not exist",
                    edge.dependant_on
                )));
            }
            if accepted.iter().any(|e| e.dependant_on == edge.dependant_on) {
                continue;
            }
            // The new task has no incoming edges yet, so only the path back
            // through an existing task can close a loop.
            if let Some(cycle) = state.graph.would_create_cycle(task.id, edge.dependant_on) {
                return Err(SchedulerError::Cycle(cycle));
            }
            accepted.push(edge);
        }

        state
            .tasks_by_document
            .entry(task.document_id)
            .or_default()
            .insert(task.id);
        state.attempts_by_task.insert(task.id, Vec::new());
        for edge in accepted {
            state.insert_edge(edge);
        }
        state.tasks.insert(task.id, task.clone());

        debug!(task_id = %task.id, task_type = %task.task_type(), "task created");
        Ok(task)
    }

    async fn add_dependency(&self, edge: TaskDependency) -> Result<TaskDependency> {
        let mut state = self.state.write().await;

        for id in [edge.dependent_task, edge.dependant_on] {
            if !state.tasks.contains_key(&id) {
                return Err(SchedulerError::validation(format!("task {id} does not exist")));
            }
        }

        if let Some(existing) = state
            .edge_index
            .get(&(edge.dependent_task, edge.dependant_on))
            .and_then(|id| state.edges.get(id))
        {
            return Ok(*existing);
        }

        if let Some(cycle) = state
            .graph
            .would_create_cycle(edge.dependent_task, edge.dependant_on)
        {
            return Err(SchedulerError::Cycle(cycle));
        }

        state.insert_edge(edge);
        Ok(edge)
    }

    async fn get_task(&self, id: TaskId) -> Result<Task> {
        let state = self.state.read().await;
        state.task(id).cloned()
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        Ok(tasks)
    }

    async fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskDependency>> {
        let state = self.state.read().await;
        state.task(id)?;
        let pairs = state.graph.dependencies(id).into_iter().map(|dep| (id, dep));
        Ok(state.edge_records(pairs))
    }

    async fn dependants_of(&self, id: TaskId) -> Result<Vec<TaskDependency>> {
        let state = self.state.read().await;
        state.task(id)?;
        let pairs = state.graph.dependants(id).into_iter().map(|w| (w, id));
        Ok(state.edge_records(pairs))
    }

    async fn dependency_states(&self, ids: &[TaskId]) -> Result<HashMap<TaskId, Vec<TaskState>>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .map(|id| (*id, state.dependency_states_of(*id)))
            .collect())
    }

    async fn delete_task(&self, id: TaskId) -> Result<CascadeSummary> {
        let mut state = self.state.write().await;
        let summary = state.remove_task(id)?;
        debug!(
            task_id = %id,
            attempts = summary.attempts,
            dependencies = summary.dependencies,
            "task deleted"
        );
        Ok(summary)
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<TaskAttempt> {
        let state = self.state.read().await;
        state.attempt(id).cloned()
    }

    async fn attempts_of(&self, task_id: TaskId) -> Result<Vec<TaskAttempt>> {
        let state = self.state.read().await;
        state.task(task_id)?;
        Ok(state
            .attempts_by_task
            .get(&task_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.attempts.get(id).cloned())
            .collect())
    }

    async fn claim(
        &self,
        task_id: TaskId,
        worker_id: WorkerId,
        attempt_id: AttemptId,
        now: DateTime<Utc>,
    ) -> Result<TaskAttempt> {
        let mut state = self.state.write().await;

        let worker = state
            .workers
            .get(&worker_id)
            .ok_or(SchedulerError::WorkerNotFound(worker_id))?;
        if !worker.is_active() {
            return Err(SchedulerError::validation(format!(
                "worker {worker_id} is deactivated"
            )));
        }

        // Readiness is re-evaluated under the write lock; a stale ready set
        // on the caller's side turns into NotReady here.
        let task_state = state.task(task_id)?.state;
        if !is_ready(task_state, state.dependency_states_of(task_id)) {
            return Err(SchedulerError::NotReady(task_id));
        }

        let attempt = state
            .task_mut(task_id)?
            .begin_attempt(attempt_id, worker_id, now)
            .ok_or(SchedulerError::NotReady(task_id))?;

        state
            .attempts_by_task
            .entry(task_id)
            .or_default()
            .push(attempt_id);
        state.attempts.insert(attempt_id, attempt.clone());
        Ok(attempt)
    }

    async fn record_keepalive(
        &self,
        attempt_id: AttemptId,
        progress: Option<f64>,
        extra_data: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<TaskAttempt> {
        let mut state = self.state.write().await;
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or(SchedulerError::AttemptNotFound(attempt_id))?;
        if attempt.is_ended() {
            return Err(SchedulerError::validation(format!(
                "attempt {attempt_id} has already ended"
            )));
        }
        attempt.record_keepalive(progress, extra_data, now);
        Ok(attempt.clone())
    }

    async fn complete_attempt(
        &self,
        attempt_id: AttemptId,
        extra_data: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome> {
        let mut state = self.state.write().await;

        let attempt = state.attempt(attempt_id)?;
        let task_id = attempt.task_id;
        if attempt.is_ended() {
            return Ok(CompletionOutcome::AlreadyEnded { task_id });
        }

        state.task_mut(task_id)?.mark_completed(now);
        if let Some(attempt) = state.attempts.get_mut(&attempt_id) {
            attempt.finish_completed(extra_data, now);
        }
        Ok(CompletionOutcome::Completed { task_id })
    }

    async fn fail_attempt(
        &self,
        attempt_id: AttemptId,
        reason: &str,
        decider: &dyn Decider,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        self.state
            .write()
            .await
            .fail_attempt(attempt_id, reason, decider, now)
    }

    async fn fail_stalled_attempt(
        &self,
        attempt_id: AttemptId,
        cutoff: DateTime<Utc>,
        reason: &str,
        decider: &dyn Decider,
        now: DateTime<Utc>,
    ) -> Result<Option<FailureOutcome>> {
        let mut state = self.state.write().await;

        let attempt = state.attempt(attempt_id)?;
        if !attempt.is_ended() && !attempt.is_stalled(cutoff) {
            debug!(attempt_id = %attempt_id, "attempt active again, not reclaimed");
            return Ok(None);
        }
        state
            .fail_attempt(attempt_id, reason, decider, now)
            .map(Some)
    }

    async fn stalled_attempts(&self, cutoff: DateTime<Utc>) -> Result<Vec<TaskAttempt>> {
        let state = self.state.read().await;
        let mut stalled: Vec<TaskAttempt> = state
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Assigned)
            .filter_map(|t| t.current_attempt)
            .filter_map(|id| state.attempts.get(&id))
            .filter(|a| a.is_stalled(cutoff))
            .cloned()
            .collect();
        stalled.sort_by_key(|a| a.id);
        Ok(stalled)
    }

    async fn snapshot(&self) -> Result<StoreSnapshot> {
        let state = self.state.read().await;
        let current_attempts = state
            .tasks
            .values()
            .filter_map(|t| t.current_attempt)
            .filter_map(|id| state.attempts.get(&id).map(|a| (id, a.clone())))
            .collect();

        Ok(StoreSnapshot {
            tasks: state.tasks.values().cloned().collect(),
            current_attempts,
            documents: state.documents.clone(),
            workers: state.workers.values().cloned().collect(),
        })
    }
}
