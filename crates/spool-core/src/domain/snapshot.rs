//! Point-in-time view of the store for read-only consumers.

use std::collections::HashMap;

use super::attempt::TaskAttempt;
use super::document::Document;
use super::ids::{AttemptId, DocumentId};
use super::task::Task;
use super::worker::Worker;

/// A consistent copy of the store, taken under a single read.
///
/// Only current attempts are included; ended attempts that no task points to
/// do not influence cost or backlog.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub tasks: Vec<Task>,
    pub current_attempts: HashMap<AttemptId, TaskAttempt>,
    pub documents: HashMap<DocumentId, Document>,
    pub workers: Vec<Worker>,
}

impl StoreSnapshot {
    pub fn current_attempt(&self, task: &Task) -> Option<&TaskAttempt> {
        task.current_attempt
            .and_then(|id| self.current_attempts.get(&id))
    }

    /// Progress of the task's current attempt, if known.
    pub fn progress_of(&self, task: &Task) -> Option<f64> {
        self.current_attempt(task).and_then(|a| a.progress)
    }

    pub fn duration_of(&self, task: &Task) -> Option<f64> {
        self.documents
            .get(&task.document_id)
            .and_then(|d| d.duration)
    }

    pub fn open_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.state.is_open())
    }
}
