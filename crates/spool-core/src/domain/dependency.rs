//! Dependency edges and the readiness rule.

use serde::{Deserialize, Serialize};

use super::ids::{DependencyId, TaskId};
use super::state::TaskState;

/// A directed edge: `dependent_task` waits for `dependant_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDependency {
    pub id: DependencyId,
    pub dependent_task: TaskId,
    pub dependant_on: TaskId,
}

impl TaskDependency {
    pub fn new(id: DependencyId, dependent_task: TaskId, dependant_on: TaskId) -> Self {
        Self {
            id,
            dependent_task,
            dependant_on,
        }
    }
}

/// A task is ready iff it is NEW and every task it depends on is COMPLETED.
///
/// Both the resolver and the claim path use this, so a task the resolver
/// reports is exactly a task claim would accept at that moment.
pub fn is_ready(state: TaskState, dependency_states: impl IntoIterator<Item = TaskState>) -> bool {
    state == TaskState::New
        && dependency_states
            .into_iter()
            .all(|s| s == TaskState::Completed)
}
