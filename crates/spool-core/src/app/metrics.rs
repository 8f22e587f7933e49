//! Metrics - point-in-time gauges over the store.
//!
//! Each metric owns one labeled gauge family and knows how to recompute it
//! from a `MetricInput`. The registry refreshes them in order; the aggregator
//! takes the snapshot and drives the registry on an interval.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::app::auth::{BasicCredentials, MetricsAuth};
use crate::domain::{Result, StoreSnapshot, TaskState, TaskType};
use crate::ports::{Clock, TaskStore, UserDirectory};

/// Everything a metric may read during one refresh.
pub struct MetricInput<'a> {
    pub snapshot: &'a StoreSnapshot,
    pub users: u64,
    pub now: DateTime<Utc>,
    pub worker_timeout: chrono::Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricFamily {
    pub name: &'static str,
    pub help: &'static str,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    /// Value of the sample whose labels match `labels` exactly.
    pub fn value(&self, labels: &[(&str, &str)]) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| {
                s.labels.len() == labels.len()
                    && labels
                        .iter()
                        .all(|(k, v)| s.labels.get(*k).is_some_and(|x| x == *v))
            })
            .map(|s| s.value)
    }
}

/// A gauge with a fixed label set.
#[derive(Debug, Clone)]
pub struct GaugeVec {
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
    values: BTreeMap<Vec<String>, f64>,
}

impl GaugeVec {
    pub fn new(
        name: &'static str,
        help: &'static str,
        label_names: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            label_names,
            values: BTreeMap::new(),
        }
    }

    /// Set the value for one label combination, given in `label_names` order.
    pub fn set(&mut self, label_values: &[&str], value: f64) {
        debug_assert_eq!(label_values.len(), self.label_names.len());
        self.values.insert(
            label_values.iter().map(|v| v.to_string()).collect(),
            value,
        );
    }

    pub fn family(&self) -> MetricFamily {
        MetricFamily {
            name: self.name,
            help: self.help,
            samples: self
                .values
                .iter()
                .map(|(label_values, value)| Sample {
                    labels: self
                        .label_names
                        .iter()
                        .map(|n| n.to_string())
                        .zip(label_values.iter().cloned())
                        .collect(),
                    value: *value,
                })
                .collect(),
        }
    }
}

pub trait Metric: Send + Sync {
    fn refresh(&mut self, input: &MetricInput<'_>);
    fn gauge(&self) -> &GaugeVec;
}

/// Task count for every `(state, task_type)` pair, zero-filled.
pub struct TasksInState {
    gauge: GaugeVec,
}

impl TasksInState {
    pub fn new() -> Self {
        Self {
            gauge: GaugeVec::new("tasks", "Number of tasks", &["state", "task_type"]),
        }
    }
}

impl Metric for TasksInState {
    fn refresh(&mut self, input: &MetricInput<'_>) {
        let mut counts: BTreeMap<(TaskState, TaskType), u64> = TaskState::ALL
            .iter()
            .flat_map(|s| TaskType::ALL.iter().map(move |t| ((*s, *t), 0)))
            .collect();
        for task in &input.snapshot.tasks {
            *counts.entry((task.state, task.task_type())).or_default() += 1;
        }
        for ((state, task_type), count) in counts {
            self.gauge
                .set(&[state.as_str(), task_type.as_str()], count as f64);
        }
    }

    fn gauge(&self) -> &GaugeVec {
        &self.gauge
    }
}

/// Non-deactivated workers (`group="all"`) and those among them seen within
/// the worker timeout (`group="alive"`).
pub struct Workers {
    gauge: GaugeVec,
}

impl Workers {
    pub fn new() -> Self {
        Self {
            gauge: GaugeVec::new("workers", "Workers", &["group"]),
        }
    }
}

impl Metric for Workers {
    fn refresh(&mut self, input: &MetricInput<'_>) {
        let workers = &input.snapshot.workers;
        let all = workers.iter().filter(|w| w.is_active()).count();
        let alive = workers
            .iter()
            .filter(|w| w.is_alive(input.now, input.worker_timeout))
            .count();
        self.gauge.set(&["all"], all as f64);
        self.gauge.set(&["alive"], alive as f64);
    }

    fn gauge(&self) -> &GaugeVec {
        &self.gauge
    }
}

pub struct Users {
    gauge: GaugeVec,
}

impl Users {
    pub fn new() -> Self {
        Self {
            gauge: GaugeVec::new("users", "Registered users", &[]),
        }
    }
}

impl Metric for Users {
    fn refresh(&mut self, input: &MetricInput<'_>) {
        self.gauge.set(&[], input.users as f64);
    }

    fn gauge(&self) -> &GaugeVec {
        &self.gauge
    }
}

pub struct Documents {
    gauge: GaugeVec,
}

impl Documents {
    pub fn new() -> Self {
        Self {
            gauge: GaugeVec::new("documents", "Documents", &[]),
        }
    }
}

impl Metric for Documents {
    fn refresh(&mut self, input: &MetricInput<'_>) {
        self.gauge
            .set(&[], input.snapshot.documents.len() as f64);
    }

    fn gauge(&self) -> &GaugeVec {
        &self.gauge
    }
}

/// Media seconds still to process per task type, over open tasks.
///
/// Unknown progress counts as none done; unknown duration counts as zero.
pub struct QueueSeconds {
    gauge: GaugeVec,
}

impl QueueSeconds {
    pub fn new() -> Self {
        Self {
            gauge: GaugeVec::new("queue_seconds", "Queue length in seconds", &["task_type"]),
        }
    }
}

impl Metric for QueueSeconds {
    fn refresh(&mut self, input: &MetricInput<'_>) {
        let snapshot = input.snapshot;
        let mut backlog: BTreeMap<TaskType, f64> =
            TaskType::ALL.iter().map(|t| (*t, 0.0)).collect();
        for task in snapshot.open_tasks() {
            let duration = snapshot.duration_of(task).unwrap_or(0.0);
            let progress = snapshot.progress_of(task).unwrap_or(0.0);
            *backlog.entry(task.task_type()).or_default() += duration * (1.0 - progress);
        }
        for (task_type, seconds) in backlog {
            self.gauge.set(&[task_type.as_str()], seconds);
        }
    }

    fn gauge(&self) -> &GaugeVec {
        &self.gauge
    }
}

/// Ordered list of metrics refreshed together.
pub struct MetricsRegistry {
    metrics: Vec<Box<dyn Metric>>,
}

impl MetricsRegistry {
    pub fn empty() -> Self {
        Self {
            metrics: Vec::new(),
        }
    }

    /// tasks, workers, users, documents, queue_seconds.
    pub fn standard() -> Self {
        Self::empty()
            .with(TasksInState::new())
            .with(Workers::new())
            .with(Users::new())
            .with(Documents::new())
            .with(QueueSeconds::new())
    }

    pub fn with(mut self, metric: impl Metric + 'static) -> Self {
        self.metrics.push(Box::new(metric));
        self
    }

    pub fn refresh(&mut self, input: &MetricInput<'_>) {
        for metric in &mut self.metrics {
            metric.refresh(input);
        }
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.metrics.iter().map(|m| m.gauge().family()).collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Periodically snapshots the store into the registry.
pub struct MetricsAggregator {
    store: Arc<dyn TaskStore>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    auth: MetricsAuth,
    worker_timeout: chrono::Duration,
    interval: Duration,
    registry: RwLock<MetricsRegistry>,
}

impl MetricsAggregator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        auth: MetricsAuth,
        worker_timeout: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            users,
            clock,
            auth,
            worker_timeout,
            interval,
            registry: RwLock::new(MetricsRegistry::standard()),
        }
    }

    pub async fn refresh(&self) -> Result<()> {
        let snapshot = self.store.snapshot().await?;
        let users = self.users.count_users().await?;
        let now = self.clock.now();

        let input = MetricInput {
            snapshot: &snapshot,
            users,
            now,
            worker_timeout: self.worker_timeout,
        };
        self.registry.write().await.refresh(&input);
        debug!(tasks = snapshot.tasks.len(), "metrics refreshed");
        Ok(())
    }

    /// Values as of the last refresh.
    pub async fn gather(&self) -> Vec<MetricFamily> {
        self.registry.read().await.gather()
    }

    /// `gather` behind the metrics credentials.
    pub async fn gather_authorized(
        &self,
        credentials: &BasicCredentials,
    ) -> Result<Vec<MetricFamily>> {
        self.auth.verify(credentials)?;
        Ok(self.gather().await)
    }

    /// Refresh every `interval` until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if let Err(err) = self.refresh().await {
                warn!(error = %err, "metrics refresh failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::domain::{
        AttemptId, Document, DocumentId, ParameterMap, Task, TaskAttempt, TaskId, TaskSpec,
        Worker, WorkerId,
    };

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families.iter().find(|f| f.name == name).unwrap()
    }

    struct Scene {
        snapshot: StoreSnapshot,
        now: DateTime<Utc>,
    }

    impl Scene {
        fn new() -> Self {
            let now = Utc::now();
            let mut documents = HashMap::new();
            documents.insert(
                DocumentId::from_u128(1),
                Document::new(DocumentId::from_u128(1), Some(120.0), now),
            );
            Self {
                snapshot: StoreSnapshot {
                    documents,
                    ..StoreSnapshot::default()
                },
                now,
            }
        }

        fn task(&mut self, id: u128, state: TaskState, progress: Option<f64>) {
            let mut task = Task::new(
                TaskId::from_u128(id),
                DocumentId::from_u128(1),
                TaskSpec::Align(ParameterMap::new()),
                3,
                self.now,
            );
            if state != TaskState::New {
                let attempt_id = AttemptId::from_u128(id);
                let mut attempt = task
                    .begin_attempt(attempt_id, WorkerId::from_u128(1), self.now)
                    .unwrap();
                attempt.progress = progress;
                task.state = state;
                self.snapshot.current_attempts.insert(attempt_id, attempt);
            }
            self.snapshot.tasks.push(task);
        }

        fn refresh(&self) -> Vec<MetricFamily> {
            let mut registry = MetricsRegistry::standard();
            registry.refresh(&MetricInput {
                snapshot: &self.snapshot,
                users: 4,
                now: self.now,
                worker_timeout: ChronoDuration::seconds(60),
            });
            registry.gather()
        }
    }

    fn align_backlog(families: &[MetricFamily]) -> f64 {
        family(families, "queue_seconds")
            .value(&[("task_type", "ALIGN")])
            .unwrap()
    }

    #[test]
    fn backlog_of_a_new_task_is_its_duration() {
        let mut scene = Scene::new();
        scene.task(1, TaskState::New, None);
        assert_eq!(align_backlog(&scene.refresh()), 120.0);
    }

    #[test]
    fn backlog_shrinks_with_progress() {
        let mut scene = Scene::new();
        scene.task(1, TaskState::Assigned, Some(0.5));
        assert_eq!(align_backlog(&scene.refresh()), 60.0);
    }

    #[test]
    fn completed_tasks_leave_the_backlog() {
        let mut scene = Scene::new();
        scene.task(1, TaskState::Completed, Some(1.0));
        let families = scene.refresh();
        assert_eq!(align_backlog(&families), 0.0);
        assert_eq!(
            family(&families, "queue_seconds")
                .value(&[("task_type", "EXPORT")]),
            Some(0.0)
        );
    }

    #[test]
    fn task_counts_are_zero_filled() {
        let mut scene = Scene::new();
        scene.task(1, TaskState::New, None);
        scene.task(2, TaskState::New, None);
        let families = scene.refresh();
        let tasks = family(&families, "tasks");

        assert_eq!(
            tasks.samples.len(),
            TaskState::ALL.len() * TaskType::ALL.len()
        );
        assert_eq!(
            tasks.value(&[("state", "NEW"), ("task_type", "ALIGN")]),
            Some(2.0)
        );
        assert_eq!(
            tasks.value(&[("state", "FAILED"), ("task_type", "UNKNOWN")]),
            Some(0.0)
        );
    }

    #[test]
    fn worker_groups_and_scalar_counts() {
        let mut scene = Scene::new();
        let now = scene.now;
        let fresh = Worker::new(WorkerId::from_u128(1), "fresh", now);
        let stale = Worker::new(WorkerId::from_u128(2), "stale", now - ChronoDuration::minutes(5));
        let mut retired = Worker::new(WorkerId::from_u128(3), "retired", now);
        retired.deactivated_at = Some(now);
        scene.snapshot.workers = vec![fresh, stale, retired];

        let families = scene.refresh();
        let workers = family(&families, "workers");
        assert_eq!(workers.value(&[("group", "all")]), Some(2.0));
        assert_eq!(workers.value(&[("group", "alive")]), Some(1.0));
        assert_eq!(family(&families, "users").value(&[]), Some(4.0));
        assert_eq!(family(&families, "documents").value(&[]), Some(1.0));
    }

    #[test]
    fn registry_keeps_its_order() {
        let names: Vec<_> = MetricsRegistry::standard()
            .gather()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(
            names,
            vec!["tasks", "workers", "users", "documents", "queue_seconds"]
        );
    }
}
