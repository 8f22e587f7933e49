//! Task types known to the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The pipeline stage a task belongs to.
///
/// `Unknown` keeps tasks of types this scheduler does not understand
/// schedulable; they simply carry no cost model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Reencode,
    Transcribe,
    Align,
    IdentifySpeakers,
    Export,
    Unknown,
}

impl TaskType {
    /// Every variant, in reporting order.
    pub const ALL: [TaskType; 6] = [
        TaskType::Reencode,
        TaskType::Transcribe,
        TaskType::Align,
        TaskType::IdentifySpeakers,
        TaskType::Export,
        TaskType::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Reencode => "REENCODE",
            TaskType::Transcribe => "TRANSCRIBE",
            TaskType::Align => "ALIGN",
            TaskType::IdentifySpeakers => "IDENTIFY_SPEAKERS",
            TaskType::Export => "EXPORT",
            TaskType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ();

    /// Parses the wire name. `UNKNOWN` itself is not accepted here: it is the
    /// fallback for names that fail to parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .filter(|t| *t != TaskType::Unknown)
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}
