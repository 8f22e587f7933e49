//! spool-core
//!
//! Scheduling core for a media-processing pipeline: a dependency graph of
//! tasks handed to remote workers, with attempt tracking, bounded retries,
//! liveness reclaim and backlog metrics.
//!
//! # Modules
//! - **domain**: data model (ids, tasks, attempts, dependencies, errors)
//! - **ports**: abstractions (TaskStore, Clock, IdGenerator, UserDirectory)
//! - **app**: services (graph, resolver, lifecycle, liveness, metrics, builder)
//! - **impls**: in-memory implementations of the ports
//! - **config**: `SchedulerConfig` from TOML and `SPOOL_*` variables

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{Scheduler, SchedulerBuilder};
pub use config::SchedulerConfig;
pub use domain::{Result, SchedulerError};
