//! Domain identifiers (strongly-typed IDs).
//!
//! Every id is a ULID wrapped in `Id<T>`, where `T` is a zero-sized marker.
//! ULIDs sort by creation time, which the resolver relies on for a stable
//! tie-break between tasks that became ready in the same instant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for id kinds.
///
/// Provides the prefix used by `Display` ("task-", "attempt-", ...).
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic id type.
///
/// `T` only exists at compile time, so a `TaskId` can never be passed where
/// an `AttemptId` is expected.
#[repr(transparent)]
#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Build an id from a raw integer. Handy for fixtures.
    pub fn from_u128(value: u128) -> Self {
        Self::from_ulid(Ulid::from(value))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

// Manual impls: derives would require `T: Clone`, `T: Eq`, ... on the marker.
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// Markers
// ========================================

macro_rules! id_marker {
    ($marker:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $marker {}

        impl IdMarker for $marker {
            fn prefix() -> &'static str {
                $prefix
            }
        }
    };
}

id_marker!(Task, "task-");
id_marker!(Attempt, "attempt-");
id_marker!(Dependency, "dep-");
id_marker!(Worker, "worker-");
id_marker!(Document, "doc-");

/// Identifier of a Task (one unit of pipeline work).
pub type TaskId = Id<Task>;

/// Identifier of an Attempt (one worker's execution of a Task).
pub type AttemptId = Id<Attempt>;

/// Identifier of a dependency edge.
pub type DependencyId = Id<Dependency>;

/// Identifier of a Worker.
pub type WorkerId = Id<Worker>;

/// Identifier of a Document (the media a task operates on).
pub type DocumentId = Id<Document>;
