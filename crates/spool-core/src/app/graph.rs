//! TaskGraph - creation, wiring and deletion of tasks, documents and workers.
//!
//! Turns payloads into store records: assigns ids, stamps times from the
//! clock and applies the configured attempt limit.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{
    CreateTask, Document, DocumentId, Result, SchedulerError, Task, TaskDependency, TaskId,
    TaskSpec, TaskState, Worker, WorkerId,
};
use crate::ports::{CascadeSummary, Clock, IdGenerator, TaskFilter, TaskStore};

/// Progress of the attempt currently working on a task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttemptProgress {
    pub progress: Option<f64>,
}

/// A task as handed to API consumers: the record plus its dependency ids and
/// the progress of its current attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub spec: TaskSpec,
    pub state: TaskState,
    pub dependencies: Vec<TaskId>,
    pub current_attempt: Option<AttemptProgress>,
}

pub struct TaskGraph {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    attempt_limit: u32,
}

impl TaskGraph {
    pub fn new(
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        attempt_limit: u32,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            attempt_limit,
        }
    }

    pub async fn create_document(&self, duration: Option<f64>) -> Result<Document> {
        if let Some(duration) = duration {
            validate_duration(duration)?;
        }
        let document = Document::new(self.ids.document_id(), duration, self.clock.now());
        self.store.insert_document(document.clone()).await?;
        debug!(document_id = %document.id, "document created");
        Ok(document)
    }

    /// Record the media length once it is known.
    pub async fn set_duration(&self, id: DocumentId, duration: f64) -> Result<Document> {
        validate_duration(duration)?;
        self.store.set_document_duration(id, duration).await
    }

    pub async fn delete_document(&self, id: DocumentId) -> Result<CascadeSummary> {
        let summary = self.store.delete_document(id).await?;
        info!(document_id = %id, tasks = summary.tasks, "document deleted");
        Ok(summary)
    }

    /// Create a task and its outgoing edges in one step.
    pub async fn create_task(&self, request: CreateTask) -> Result<Task> {
        let CreateTask {
            document_id,
            dependencies,
            spec,
        } = request;

        let task = Task::new(
            self.ids.task_id(),
            document_id,
            spec,
            self.attempt_limit,
            self.clock.now(),
        );
        let edges = dependencies
            .into_iter()
            .map(|dep| TaskDependency::new(self.ids.dependency_id(), task.id, dep))
            .collect();

        let task = self.store.create_task(task, edges).await?;
        info!(
            task_id = %task.id,
            task_type = %task.task_type(),
            document_id = %task.document_id,
            "task created"
        );
        Ok(task)
    }

    /// `task` will wait for `depends_on`.
    pub async fn add_dependency(&self, task: TaskId, depends_on: TaskId) -> Result<TaskDependency> {
        let edge = TaskDependency::new(self.ids.dependency_id(), task, depends_on);
        self.store.add_dependency(edge).await
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<CascadeSummary> {
        let summary = self.store.delete_task(id).await?;
        info!(task_id = %id, attempts = summary.attempts, "task deleted");
        Ok(summary)
    }

    pub async fn task_view(&self, id: TaskId) -> Result<TaskView> {
        let task = self.store.get_task(id).await?;
        self.view_of(task).await
    }

    /// Views of every task of a document, oldest first.
    pub async fn document_tasks(&self, id: DocumentId) -> Result<Vec<TaskView>> {
        self.store.get_document(id).await?;
        let tasks = self.store.list_tasks(&TaskFilter::new().document(id)).await?;
        let mut views = Vec::with_capacity(tasks.len());
        for task in tasks {
            views.push(self.view_of(task).await?);
        }
        Ok(views)
    }

    async fn view_of(&self, task: Task) -> Result<TaskView> {
        let dependencies = self
            .store
            .dependencies_of(task.id)
            .await?
            .into_iter()
            .map(|edge| edge.dependant_on)
            .collect();
        let current_attempt = match task.current_attempt {
            Some(attempt_id) => Some(AttemptProgress {
                progress: self.store.get_attempt(attempt_id).await?.progress,
            }),
            None => None,
        };

        Ok(TaskView {
            id: task.id,
            document_id: task.document_id,
            spec: task.spec,
            state: task.state,
            dependencies,
            current_attempt,
        })
    }

    pub async fn register_worker(&self, name: impl Into<String>) -> Result<Worker> {
        let worker = Worker::new(self.ids.worker_id(), name, self.clock.now());
        self.store.upsert_worker(worker.clone()).await?;
        info!(worker_id = %worker.id, name = %worker.name, "worker registered");
        Ok(worker)
    }

    pub async fn heartbeat(&self, id: WorkerId) -> Result<()> {
        self.store.heartbeat(id, self.clock.now()).await
    }

    pub async fn deactivate_worker(&self, id: WorkerId) -> Result<Worker> {
        let worker = self.store.deactivate_worker(id, self.clock.now()).await?;
        info!(worker_id = %id, "worker deactivated");
        Ok(worker)
    }
}

fn validate_duration(duration: f64) -> Result<()> {
    if duration.is_finite() && duration >= 0.0 {
        Ok(())
    } else {
        Err(SchedulerError::validation(format!(
            "duration must be a non-negative number of seconds, got {duration}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParameterMap, TaskType};
    use crate::impls::InMemoryTaskStore;
    use crate::ports::{SystemClock, UlidGenerator};

    fn graph() -> TaskGraph {
        TaskGraph::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
            3,
        )
    }

    #[tokio::test]
    async fn create_task_from_wire_payload() {
        let graph = graph();
        let doc = graph.create_document(None).await.unwrap();
        let reencode = graph
            .create_task(CreateTask::new(doc.id, TaskSpec::Reencode(ParameterMap::new())))
            .await
            .unwrap();

        let payload = serde_json::json!({
            "document_id": doc.id,
            "dependencies": [reencode.id],
            "task_type": "TRANSCRIBE",
            "task_parameters": {"lang": "auto", "model": "small"},
        });
        let request: CreateTask = serde_json::from_value(payload).unwrap();
        let task = graph.create_task(request).await.unwrap();

        assert_eq!(task.task_type(), TaskType::Transcribe);
        assert_eq!(task.remaining_attempts, 3);

        let view = graph.task_view(task.id).await.unwrap();
        assert_eq!(view.dependencies, vec![reencode.id]);
        assert!(view.current_attempt.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["task_type"], "TRANSCRIBE");
        assert_eq!(json["task_parameters"]["model"], "small");
        assert_eq!(json["state"], "NEW");
    }

    #[tokio::test]
    async fn unknown_dependency_leaves_no_trace() {
        let graph = graph();
        let doc = graph.create_document(Some(60.0)).await.unwrap();

        let err = graph
            .create_task(
                CreateTask::new(doc.id, TaskSpec::Align(ParameterMap::new()))
                    .depends_on(TaskId::from_u128(42)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::Validation(_)));
        assert!(graph.document_tasks(doc.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn durations_must_be_non_negative() {
        let graph = graph();
        assert!(graph.create_document(Some(-1.0)).await.is_err());

        let doc = graph.create_document(None).await.unwrap();
        assert!(graph.set_duration(doc.id, f64::NAN).await.is_err());
        let doc = graph.set_duration(doc.id, 42.5).await.unwrap();
        assert_eq!(doc.duration, Some(42.5));
    }

    #[tokio::test]
    async fn add_dependency_detects_cycles_across_calls() {
        let graph = graph();
        let doc = graph.create_document(None).await.unwrap();
        let a = graph
            .create_task(CreateTask::new(doc.id, TaskSpec::Align(ParameterMap::new())))
            .await
            .unwrap();
        let b = graph
            .create_task(
                CreateTask::new(doc.id, TaskSpec::Align(ParameterMap::new())).depends_on(a.id),
            )
            .await
            .unwrap();

        assert!(matches!(
            graph.add_dependency(a.id, b.id).await,
            Err(SchedulerError::Cycle(_))
        ));
    }

    #[tokio::test]
    async fn worker_registration_and_deactivation() {
        let graph = graph();
        let worker = graph.register_worker("gpu-1").await.unwrap();
        graph.heartbeat(worker.id).await.unwrap();

        let worker = graph.deactivate_worker(worker.id).await.unwrap();
        assert!(!worker.is_active());
        assert!(matches!(
            graph.heartbeat(WorkerId::from_u128(7)).await,
            Err(SchedulerError::WorkerNotFound(_))
        ));
    }
}
