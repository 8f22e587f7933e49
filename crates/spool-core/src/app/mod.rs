//! App - application layer.
//!
//! Combines the ports into the scheduling services.
//!
//! # Main components
//! - **TaskGraph**: task, document and worker creation and deletion
//! - **DependencyResolver**: ready set and open set
//! - **AttemptLifecycle**: claim / progress / complete / fail
//! - **LivenessMonitor**: reclaims silent attempts
//! - **MetricsAggregator**: gauges over a store snapshot
//! - **SchedulerBuilder**: wiring and fail-fast config validation

pub mod auth;
pub mod builder;
pub mod cost;
pub mod graph;
pub mod lifecycle;
pub mod liveness;
pub mod loops;
pub mod metrics;
pub mod queue_info;
pub mod resolver;

pub use self::auth::{BasicCredentials, MetricsAuth};
pub use self::builder::{BuildError, Scheduler, SchedulerBuilder};
pub use self::cost::{initial_cost, remaining_cost};
pub use self::graph::{TaskGraph, TaskView};
pub use self::lifecycle::{Assignment, AttemptLifecycle};
pub use self::liveness::{LivenessMonitor, SweepReport};
pub use self::loops::LoopGroup;
pub use self::metrics::{MetricFamily, MetricsAggregator, MetricsRegistry};
pub use self::queue_info::{QueueInfo, QueueInfoEntry};
pub use self::resolver::DependencyResolver;
