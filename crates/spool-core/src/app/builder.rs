//! SchedulerBuilder - wiring of the scheduling core.
//!
//! Every collaborator has an in-process default; tests and embedders swap in
//! their own store, clock or decider. `build()` validates the configuration
//! first so a bad config fails at startup, not on the first sweep.

use std::sync::Arc;

use tokio::sync::watch;

use crate::app::auth::MetricsAuth;
use crate::app::graph::TaskGraph;
use crate::app::lifecycle::AttemptLifecycle;
use crate::app::liveness::LivenessMonitor;
use crate::app::loops::LoopGroup;
use crate::app::metrics::MetricsAggregator;
use crate::app::queue_info::QueueInfo;
use crate::app::resolver::DependencyResolver;
use crate::config::{ConfigError, SchedulerConfig};
use crate::domain::{Decider, DefaultDecider, Result};
use crate::impls::{InMemoryTaskStore, InMemoryUserDirectory};
use crate::ports::{Clock, IdGenerator, SystemClock, TaskStore, UlidGenerator, UserDirectory};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct SchedulerBuilder {
    config: SchedulerConfig,
    store: Option<Arc<dyn TaskStore>>,
    users: Option<Arc<dyn UserDirectory>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    decider: Option<Arc<dyn Decider>>,
}

impl SchedulerBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            store: None,
            users: None,
            clock: None,
            ids: None,
            decider: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    /// Also drives id timestamps unless `ids` is set.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn build(self) -> Result<Scheduler, BuildError> {
        let config = self.config;
        config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()));
        let users = self
            .users
            .unwrap_or_else(|| Arc::new(InMemoryUserDirectory::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let decider = self.decider.unwrap_or_else(|| Arc::new(DefaultDecider));

        let graph = TaskGraph::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&ids),
            config.task_attempt_limit,
        );
        let lifecycle = Arc::new(AttemptLifecycle::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            ids,
            decider,
        ));
        let liveness = Arc::new(LivenessMonitor::new(
            Arc::clone(&store),
            Arc::clone(&lifecycle),
            Arc::clone(&clock),
            config.worker_timeout(),
            config.liveness_interval(),
        ));
        let metrics = Arc::new(MetricsAggregator::new(
            Arc::clone(&store),
            users,
            clock,
            MetricsAuth::new(
                config.metrics_username.clone(),
                config.metrics_password.clone(),
            ),
            config.worker_timeout(),
            config.metrics_interval(),
        ));

        Ok(Scheduler {
            resolver: DependencyResolver::new(Arc::clone(&store)),
            config,
            store,
            graph,
            lifecycle,
            liveness,
            metrics,
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// The wired scheduling core.
pub struct Scheduler {
    pub config: SchedulerConfig,
    pub store: Arc<dyn TaskStore>,
    pub graph: TaskGraph,
    pub resolver: DependencyResolver,
    pub lifecycle: Arc<AttemptLifecycle>,
    pub liveness: Arc<LivenessMonitor>,
    pub metrics: Arc<MetricsAggregator>,
}

impl Scheduler {
    pub fn builder(config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    pub async fn queue_info(&self) -> Result<QueueInfo> {
        let snapshot = self.store.snapshot().await?;
        Ok(QueueInfo::from_snapshot(
            &snapshot,
            self.config.default_media_duration_secs,
        ))
    }

    /// Start the liveness and metrics loops.
    pub fn spawn_background(&self) -> LoopGroup {
        let mut group = LoopGroup::new();

        let liveness = Arc::clone(&self.liveness);
        group.spawn("liveness", move |shutdown: watch::Receiver<bool>| async move {
            liveness.run(shutdown).await
        });

        let metrics = Arc::clone(&self.metrics);
        group.spawn("metrics", move |shutdown: watch::Receiver<bool>| async move {
            metrics.run(shutdown).await
        });

        group
    }
}
