//! Results of ending an attempt.
//!
//! Complete and fail are idempotent: ending an attempt that already ended is
//! reported as `AlreadyEnded`, never as an error.

use serde::{Deserialize, Serialize};

use super::errors::SchedulerError;
use super::ids::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Completed { task_id: TaskId },
    AlreadyEnded { task_id: TaskId },
}

impl CompletionOutcome {
    pub fn task_id(&self) -> TaskId {
        match self {
            CompletionOutcome::Completed { task_id }
            | CompletionOutcome::AlreadyEnded { task_id } => *task_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FailureOutcome {
    /// The task went back to NEW.
    Retried {
        task_id: TaskId,
        remaining_attempts: u32,
    },

    /// The task is now permanently FAILED.
    Exhausted { task_id: TaskId },

    AlreadyEnded { task_id: TaskId },
}

impl FailureOutcome {
    pub fn task_id(&self) -> TaskId {
        match self {
            FailureOutcome::Retried { task_id, .. }
            | FailureOutcome::Exhausted { task_id }
            | FailureOutcome::AlreadyEnded { task_id } => *task_id,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, FailureOutcome::Exhausted { .. })
    }

    /// Escalate an exhausted task as `ExhaustedRetries`; everything else is Ok.
    pub fn into_result(self) -> Result<Self, SchedulerError> {
        match self {
            FailureOutcome::Exhausted { task_id } => Err(SchedulerError::ExhaustedRetries(task_id)),
            other => Ok(other),
        }
    }
}
