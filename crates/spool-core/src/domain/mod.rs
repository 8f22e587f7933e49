//! Domain model (ids, tasks, attempts, dependencies, workers, documents).

pub mod attempt;
pub mod decision;
pub mod dependency;
pub mod document;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod snapshot;
pub mod spec;
pub mod state;
pub mod task;
pub mod task_type;
pub mod worker;

pub use attempt::{TaskAttempt, validate_progress};
pub use decision::{Decider, Decision, DefaultDecider};
pub use dependency::{TaskDependency, is_ready};
pub use document::Document;
pub use errors::{Result, SchedulerError};
pub use ids::{AttemptId, DependencyId, DocumentId, TaskId, WorkerId};
pub use outcome::{CompletionOutcome, FailureOutcome};
pub use snapshot::StoreSnapshot;
pub use spec::{
    CreateTask, ExportFormat, ExportParameters, ParameterMap, TaskSpec, TranscribeParameters,
};
pub use state::TaskState;
pub use task::Task;
pub use task_type::TaskType;
pub use worker::Worker;
