//! Cost estimation.
//!
//! One cost point is roughly a minute of processing on reference hardware.
//! Used for autoscaling and the queue info feed.

use crate::domain::{StoreSnapshot, Task, TaskType};

/// Estimated cost of running a task from scratch.
///
/// A missing or zero duration falls back to `default_duration_secs`. EXPORT
/// and UNKNOWN tasks have no cost model.
pub fn initial_cost(
    task_type: TaskType,
    duration_secs: Option<f64>,
    default_duration_secs: f64,
) -> Option<f64> {
    let duration = duration_secs
        .filter(|d| *d > 0.0)
        .unwrap_or(default_duration_secs);
    let minutes = duration / 60.0;

    match task_type {
        TaskType::Reencode => Some(0.05 + minutes / 50.0),
        TaskType::Transcribe | TaskType::Align => Some(1.0 + minutes),
        TaskType::IdentifySpeakers => Some(0.1 + minutes / 10.0),
        TaskType::Export | TaskType::Unknown => None,
    }
}

/// Scale a cost by the work left, when progress is known.
pub fn remaining_cost(initial_cost: Option<f64>, progress: Option<f64>) -> Option<f64> {
    initial_cost.map(|cost| match progress {
        Some(progress) => cost * (1.0 - progress),
        None => cost,
    })
}

/// Remaining cost of a task as seen in `snapshot`.
pub fn task_remaining_cost(
    snapshot: &StoreSnapshot,
    task: &Task,
    default_duration_secs: f64,
) -> Option<f64> {
    remaining_cost(
        initial_cost(
            task.task_type(),
            snapshot.duration_of(task),
            default_duration_secs,
        ),
        snapshot.progress_of(task),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DEFAULT: f64 = 600.0;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[rstest]
    #[case(TaskType::Transcribe, Some(120.0), 3.0)]
    #[case(TaskType::Align, Some(120.0), 3.0)]
    #[case(TaskType::Reencode, Some(3000.0), 1.05)]
    #[case(TaskType::IdentifySpeakers, Some(600.0), 1.1)]
    #[case::unknown_duration(TaskType::Transcribe, None, 11.0)]
    #[case::zero_duration(TaskType::Reencode, Some(0.0), 0.25)]
    fn initial_cost_per_type(
        #[case] task_type: TaskType,
        #[case] duration: Option<f64>,
        #[case] expected: f64,
    ) {
        let cost = initial_cost(task_type, duration, DEFAULT).unwrap();
        assert!(approx(cost, expected), "{task_type}: {cost} != {expected}");
    }

    #[rstest]
    #[case(TaskType::Export)]
    #[case(TaskType::Unknown)]
    fn no_cost_model(#[case] task_type: TaskType) {
        assert_eq!(initial_cost(task_type, Some(120.0), DEFAULT), None);
    }

    #[test]
    fn remaining_cost_scales_with_progress() {
        assert_eq!(remaining_cost(Some(4.0), Some(0.25)), Some(3.0));
        assert_eq!(remaining_cost(Some(4.0), None), Some(4.0));
        assert_eq!(remaining_cost(None, Some(0.5)), None);
    }
}
