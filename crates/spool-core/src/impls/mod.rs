//! Impls - in-process implementations of the ports.
//!
//! - **InMemoryTaskStore**: the task store used by the CLI and tests
//! - **InMemoryUserDirectory**: user count for the `users` gauge
//! - **DependencyGraph**: adjacency index backing the store's cycle checks

pub mod dependency_graph;
#[cfg(test)]
pub(crate) mod interleaved;
pub mod memory_store;
pub mod users;

pub use self::dependency_graph::DependencyGraph;
pub use self::memory_store::InMemoryTaskStore;
pub use self::users::InMemoryUserDirectory;
