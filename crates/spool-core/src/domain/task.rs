//! Task record and its state transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attempt::TaskAttempt;
use super::decision::Decision;
use super::ids::{AttemptId, DocumentId, TaskId, WorkerId};
use super::spec::TaskSpec;
use super::state::TaskState;
use super::task_type::TaskType;

/// A unit of pipeline work.
///
/// This is the single source of truth for task state. All transitions go
/// through the methods below so `state_changed_at` moves exactly when `state`
/// does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub document_id: DocumentId,
    pub spec: TaskSpec,

    pub state: TaskState,
    pub state_changed_at: DateTime<Utc>,

    /// Attempts ever created. Never decremented.
    pub attempt_counter: u32,

    /// Attempts left before the task fails permanently.
    pub remaining_attempts: u32,

    /// The attempt representing in-flight work, if any.
    pub current_attempt: Option<AttemptId>,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: TaskId,
        document_id: DocumentId,
        spec: TaskSpec,
        attempt_limit: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            document_id,
            spec,
            state: TaskState::New,
            state_changed_at: now,
            attempt_counter: 0,
            remaining_attempts: attempt_limit,
            current_attempt: None,
            created_at: now,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.spec.task_type()
    }

    fn transition(&mut self, state: TaskState, now: DateTime<Utc>) {
        self.state = state;
        self.state_changed_at = now;
    }

    /// Start a new attempt: New -> Assigned.
    ///
    /// Readiness (dependencies completed) is the caller's check; this only
    /// guards the task's own state.
    pub fn begin_attempt(
        &mut self,
        attempt_id: AttemptId,
        worker_id: WorkerId,
        now: DateTime<Utc>,
    ) -> Option<TaskAttempt> {
        if self.state != TaskState::New {
            return None;
        }
        self.attempt_counter += 1;
        self.current_attempt = Some(attempt_id);
        self.transition(TaskState::Assigned, now);
        Some(TaskAttempt::started(
            attempt_id,
            self.id,
            self.attempt_counter,
            worker_id,
            now,
        ))
    }

    /// Assigned -> Completed.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.transition(TaskState::Completed, now);
    }

    /// Apply the decision taken for a failed attempt.
    ///
    /// Assigned -> New when attempts remain, Assigned -> Failed otherwise.
    /// A retry decision with nothing left is treated as a permanent failure so
    /// `remaining_attempts == 0` always coincides with `Failed`.
    pub fn apply_failure(&mut self, decision: &Decision, now: DateTime<Utc>) {
        match decision {
            Decision::Retry { remaining_attempts } if *remaining_attempts > 0 => {
                self.remaining_attempts = *remaining_attempts;
                self.current_attempt = None;
                self.transition(TaskState::New, now);
            }
            Decision::Retry { .. } | Decision::MarkFailed => {
                self.remaining_attempts = 0;
                self.transition(TaskState::Failed, now);
            }
        }
    }
}
