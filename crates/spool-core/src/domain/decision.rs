//! Decision model: what happens to a task after a failed attempt.

use super::task::Task;

/// The next action for a task whose attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Put the task back to NEW with this many attempts left.
    Retry { remaining_attempts: u32 },

    /// Fail the task permanently.
    MarkFailed,
}

/// Decides the next action for a failed attempt.
///
/// Deciders are pure: given the task as it was when the attempt failed, they
/// return the next action. Applying it is the store's job.
pub trait Decider: Send + Sync {
    fn decide(&self, task: &Task, reason: &str) -> Decision;
}

/// Attempt-budget decider.
///
/// Every failed attempt consumes one unit of `remaining_attempts`; the task
/// fails permanently when the budget reaches zero. With a limit of `L`, the
/// `L`-th failure is terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecider;

impl Decider for DefaultDecider {
    fn decide(&self, task: &Task, _reason: &str) -> Decision {
        let remaining_attempts = task.remaining_attempts.saturating_sub(1);
        if remaining_attempts > 0 {
            Decision::Retry { remaining_attempts }
        } else {
            Decision::MarkFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{DocumentId, TaskId};
    use crate::domain::spec::{ParameterMap, TaskSpec};
    use chrono::Utc;
    use rstest::rstest;

    fn task_with_budget(remaining: u32) -> Task {
        let mut task = Task::new(
            TaskId::from_u128(1),
            DocumentId::from_u128(1),
            TaskSpec::Reencode(ParameterMap::new()),
            5,
            Utc::now(),
        );
        task.remaining_attempts = remaining;
        task
    }

    #[rstest]
    #[case(5, Some(4))]
    #[case(2, Some(1))]
    #[case(1, None)]
    #[case(0, None)]
    fn decides_from_remaining_budget(#[case] remaining: u32, #[case] retry_with: Option<u32>) {
        let decision = DefaultDecider.decide(&task_with_budget(remaining), "boom");

        match retry_with {
            Some(left) => assert_eq!(
                decision,
                Decision::Retry {
                    remaining_attempts: left
                }
            ),
            None => assert_eq!(decision, Decision::MarkFailed),
        }
    }
}
