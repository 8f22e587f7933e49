use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::DocumentId;

/// The media a group of tasks works on. Only its duration matters here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,

    /// Media length in seconds. Unknown until the reencode stage reports it.
    pub duration: Option<f64>,

    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: DocumentId, duration: Option<f64>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            duration,
            created_at: now,
        }
    }
}
