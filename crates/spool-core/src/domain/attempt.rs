//! Task attempts: one worker's execution of a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::SchedulerError;
use super::ids::{AttemptId, TaskId, WorkerId};

/// A single execution attempt of a task.
///
/// Created on claim, ended by complete or fail, and only ever removed together
/// with its task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAttempt {
    pub id: AttemptId,
    pub task_id: TaskId,

    /// 1-based, strictly increasing per task.
    pub attempt_number: u32,

    pub assigned_worker: Option<WorkerId>,

    pub started_at: Option<DateTime<Utc>>,
    pub last_keepalive: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Fraction done in `[0, 1]`, if the worker reported one.
    pub progress: Option<f64>,

    /// Opaque worker-supplied data.
    pub extra_data: Option<serde_json::Value>,

    /// Why the attempt failed (worker report or "timeout").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl TaskAttempt {
    pub(crate) fn started(
        id: AttemptId,
        task_id: TaskId,
        attempt_number: u32,
        worker: WorkerId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_id,
            attempt_number,
            assigned_worker: Some(worker),
            started_at: Some(now),
            last_keepalive: None,
            ended_at: None,
            progress: None,
            extra_data: None,
            failure_reason: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Last sign of life: the latest keepalive, else the start.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_keepalive.or(self.started_at)
    }

    /// Has this attempt been silent since before `cutoff`?
    pub fn is_stalled(&self, cutoff: DateTime<Utc>) -> bool {
        !self.is_ended() && self.last_activity().is_some_and(|t| t < cutoff)
    }

    pub fn record_keepalive(
        &mut self,
        progress: Option<f64>,
        extra_data: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) {
        self.last_keepalive = Some(now);
        if progress.is_some() {
            self.progress = progress;
        }
        if extra_data.is_some() {
            self.extra_data = extra_data;
        }
    }

    pub fn finish_completed(&mut self, extra_data: Option<serde_json::Value>, now: DateTime<Utc>) {
        self.ended_at = Some(now);
        self.progress = Some(1.0);
        if extra_data.is_some() {
            self.extra_data = extra_data;
        }
    }

    pub fn finish_failed(&mut self, reason: &str, now: DateTime<Utc>) {
        self.ended_at = Some(now);
        self.failure_reason = Some(reason.to_string());
    }
}

/// Reject progress values outside `[0, 1]` (NaN included).
pub fn validate_progress(progress: f64) -> Result<f64, SchedulerError> {
    if (0.0..=1.0).contains(&progress) {
        Ok(progress)
    } else {
        Err(SchedulerError::validation(format!(
            "progress must be within [0, 1], got {progress}"
        )))
    }
}
