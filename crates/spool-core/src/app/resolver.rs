//! DependencyResolver - which tasks can be claimed, which count as backlog.

use std::sync::Arc;

use crate::domain::{Result, Task, TaskState, TaskType, is_ready};
use crate::ports::{TaskFilter, TaskStore};

pub struct DependencyResolver {
    store: Arc<dyn TaskStore>,
}

impl DependencyResolver {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// NEW tasks whose dependencies are all COMPLETED, in selection order.
    ///
    /// The result is advisory: a claim re-checks readiness under the store's
    /// write lock.
    pub async fn ready_set(&self, task_type: Option<TaskType>) -> Result<Vec<Task>> {
        let candidates = self
            .store
            .list_tasks(&TaskFilter::new().states(&[TaskState::New]).task_type(task_type))
            .await?;
        let ids: Vec<_> = candidates.iter().map(|t| t.id).collect();
        let dependency_states = self.store.dependency_states(&ids).await?;

        let mut ready: Vec<Task> = candidates
            .into_iter()
            .filter(|t| {
                let deps = dependency_states.get(&t.id).into_iter().flatten().copied();
                is_ready(t.state, deps)
            })
            .collect();
        sort_for_selection(&mut ready);
        Ok(ready)
    }

    /// NEW or ASSIGNED tasks, in selection order.
    pub async fn open_set(&self, task_type: Option<TaskType>) -> Result<Vec<Task>> {
        let mut open = self
            .store
            .list_tasks(
                &TaskFilter::new()
                    .states(&[TaskState::New, TaskState::Assigned])
                    .task_type(task_type),
            )
            .await?;
        sort_for_selection(&mut open);
        Ok(open)
    }
}

/// Oldest `state_changed_at` first, ties by task id.
pub fn sort_for_selection(tasks: &mut [Task]) {
    tasks.sort_by_key(|t| (t.state_changed_at, t.id));
}
