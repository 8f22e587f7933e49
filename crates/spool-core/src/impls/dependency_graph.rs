//! Dependency graph index over `petgraph::graphmap::DiGraphMap`.
//!
//! An edge `task -> depends_on` means `task` waits for `depends_on`, so
//! outgoing neighbors are dependencies and incoming neighbors are dependants.
//! The graph stays acyclic: `would_create_cycle` is checked before every
//! insertion.

use petgraph::Direction::{Incoming, Outgoing};
use petgraph::algo::astar;
use petgraph::graphmap::DiGraphMap;

use crate::domain::TaskId;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<TaskId, ()>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency: `task` depends on `depends_on`.
    ///
    /// Returns false if the edge already existed.
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) -> bool {
        self.graph.add_edge(task, depends_on, ()).is_none()
    }

    /// Drop every edge touching `task`. Returns the removed `(dependent, dependant_on)` pairs.
    pub fn remove_task(&mut self, task: TaskId) -> Vec<(TaskId, TaskId)> {
        let mut removed: Vec<_> = self
            .graph
            .neighbors_directed(task, Outgoing)
            .map(|dep| (task, dep))
            .collect();
        removed.extend(
            self.graph
                .neighbors_directed(task, Incoming)
                .map(|waiting| (waiting, task)),
        );
        self.graph.remove_node(task);
        removed
    }

    pub fn dependencies(&self, task: TaskId) -> Vec<TaskId> {
        self.graph.neighbors_directed(task, Outgoing).collect()
    }

    /// Tasks waiting for `task`.
    pub fn dependants(&self, task: TaskId) -> Vec<TaskId> {
        self.graph.neighbors_directed(task, Incoming).collect()
    }

    /// Would adding "`task` depends on `depends_on`" close a cycle?
    ///
    /// Returns the cycle as a path starting and ending at `task`.
    pub fn would_create_cycle(&self, task: TaskId, depends_on: TaskId) -> Option<Vec<TaskId>> {
        if task == depends_on {
            return Some(vec![task, task]);
        }
        if !self.graph.contains_node(task) || !self.graph.contains_node(depends_on) {
            return None;
        }
        // Shortest existing path depends_on -> ... -> task.
        let (_, path) = astar(&self.graph, depends_on, |n| n == task, |_| 1u32, |_| 0)?;
        let mut cycle = Vec::with_capacity(path.len() + 1);
        cycle.push(task);
        cycle.extend(path);
        Some(cycle)
    }
}
