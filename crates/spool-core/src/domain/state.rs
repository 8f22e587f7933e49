//! Task state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task state.
///
/// State transitions:
/// - New -> Assigned -> Completed
/// - New -> Assigned -> New (failed attempt, attempts remain)
/// - New -> Assigned -> Failed (failed attempt, no attempts remain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Waiting to be claimed (possibly blocked on dependencies).
    New,

    /// Claimed by a worker; `current_attempt` is in flight.
    Assigned,

    /// Finished successfully.
    Completed,

    /// Failed permanently (attempts exhausted).
    Failed,
}

impl TaskState {
    pub const ALL: [TaskState; 4] = [
        TaskState::New,
        TaskState::Assigned,
        TaskState::Completed,
        TaskState::Failed,
    ];

    /// Does a task in this state count toward the backlog?
    pub fn is_open(self) -> bool {
        matches!(self, TaskState::New | TaskState::Assigned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::New => "NEW",
            TaskState::Assigned => "ASSIGNED",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
