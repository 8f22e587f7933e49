//! Queue info feed: open tasks with their remaining cost, for autoscalers.

use serde::Serialize;

use crate::app::cost::task_remaining_cost;
use crate::app::resolver::sort_for_selection;
use crate::domain::{StoreSnapshot, TaskId, TaskState, TaskType};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueInfoEntry {
    pub id: TaskId,
    pub task_type: TaskType,
    pub state: TaskState,
    pub remaining_cost: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueInfo {
    /// Tasks that are running or can be claimed once their dependencies finish.
    pub open_tasks: Vec<QueueInfoEntry>,
}

impl QueueInfo {
    pub fn from_snapshot(snapshot: &StoreSnapshot, default_duration_secs: f64) -> Self {
        let mut open: Vec<_> = snapshot.open_tasks().cloned().collect();
        sort_for_selection(&mut open);

        let open_tasks = open
            .iter()
            .map(|task| QueueInfoEntry {
                id: task.id,
                task_type: task.task_type(),
                state: task.state,
                remaining_cost: task_remaining_cost(snapshot, task, default_duration_secs),
            })
            .collect();
        Self { open_tasks }
    }

    /// Sum of known remaining costs.
    pub fn total_cost(&self) -> f64 {
        self.open_tasks
            .iter()
            .filter_map(|e| e.remaining_cost)
            .sum()
    }
}
