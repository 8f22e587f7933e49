//! IdGenerator port - id generation.
//!
//! Ids are ULIDs whose timestamp part comes from the injected `Clock`, so a
//! `FixedClock` yields ids that share a timestamp and differ in randomness.

use ulid::Ulid;

use crate::domain::ids::{AttemptId, DependencyId, DocumentId, Id, IdMarker, TaskId, WorkerId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn task_id(&self) -> TaskId;
    fn attempt_id(&self) -> AttemptId;
    fn dependency_id(&self) -> DependencyId;
    fn worker_id(&self) -> WorkerId;
    fn document_id(&self) -> DocumentId;
}

/// ULID-based generator.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next<T: IdMarker>(&self) -> Id<T> {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Id::from_ulid(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn task_id(&self) -> TaskId {
        self.next()
    }

    fn attempt_id(&self) -> AttemptId {
        self.next()
    }

    fn dependency_id(&self) -> DependencyId {
        self.next()
    }

    fn worker_id(&self) -> WorkerId {
        self.next()
    }

    fn document_id(&self) -> DocumentId {
        self.next()
    }
}
