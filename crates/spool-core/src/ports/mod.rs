//! Ports - abstraction layer.
//!
//! Each trait here is a seam to an external system: persistence, user
//! accounts, time and id generation. `impls` holds in-memory versions.

pub mod clock;
pub mod id_generator;
pub mod task_store;
pub mod user_directory;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::{CascadeSummary, TaskFilter, TaskStore};
pub use self::user_directory::UserDirectory;
