//! Scheduler errors.

use thiserror::Error;

use super::ids::{AttemptId, DocumentId, TaskId, WorkerId};

/// Errors surfaced by the scheduling core.
///
/// `NotReady` is expected under contention: the caller should retry against a
/// fresh ready set. `ExhaustedRetries` is never raised by a mutation; it is
/// produced from a `FailureOutcome` when a caller wants to escalate it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("task {0} is not ready to be claimed")]
    NotReady(TaskId),

    #[error("dependency cycle: {}", format_cycle(.0))]
    Cycle(Vec<TaskId>),

    #[error("task {0} failed permanently after exhausting its attempts")]
    ExhaustedRetries(TaskId),

    #[error("unauthorized")]
    Auth,

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("attempt {0} not found")]
    AttemptNotFound(AttemptId),

    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error("worker {0} not found")]
    WorkerNotFound(WorkerId),
}

impl SchedulerError {
    pub fn validation(message: impl Into<String>) -> Self {
        SchedulerError::Validation(message.into())
    }

    /// True for errors a caller is expected to retry rather than report.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulerError::NotReady(_))
    }
}

fn format_cycle(path: &[TaskId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_the_path() {
        let a = TaskId::from_u128(1);
        let b = TaskId::from_u128(2);
        let msg = SchedulerError::Cycle(vec![a, b, a]).to_string();

        assert!(msg.starts_with("dependency cycle: task-"));
        assert_eq!(msg.matches(" -> ").count(), 2);
    }

    #[test]
    fn only_not_ready_is_retryable() {
        assert!(SchedulerError::NotReady(TaskId::from_u128(1)).is_retryable());
        assert!(!SchedulerError::Auth.is_retryable());
        assert!(!SchedulerError::validation("x").is_retryable());
    }
}
