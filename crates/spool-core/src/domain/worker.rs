use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::WorkerId;

/// A remote worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,

    /// Refreshed by the worker's heartbeat.
    pub last_seen: DateTime<Utc>,

    /// Manual deactivation. Independent of liveness.
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Worker {
    pub fn new(id: WorkerId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            last_seen: now,
            deactivated_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deactivated_at.is_none()
    }

    /// Active and seen within the liveness window.
    pub fn is_alive(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.is_active() && self.last_seen >= now - timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_needs_recent_heartbeat_and_no_deactivation() {
        let now = Utc::now();
        let timeout = Duration::seconds(60);
        let mut w = Worker::new(WorkerId::from_u128(1), "w1", now - Duration::seconds(30));

        assert!(w.is_alive(now, timeout));
        assert!(!w.is_alive(now + Duration::seconds(31), timeout));

        w.deactivated_at = Some(now);
        assert!(!w.is_alive(now, timeout));
    }
}
