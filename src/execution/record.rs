//! Completed-Bout Records
//!
//! What actually happened during a session. Entries are immutable once
//! appended and are the authoritative input for persistence and
//! personal-record detection.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::modifiers::ActiveModifier;
use crate::sequence::{Bout, BoutId};

/// One performed (or skipped) bout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CompletedBout {
    pub bout_id: BoutId,

    /// The bout as it was configured when performed
    pub bout: Bout,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Seconds for timed bouts, repetitions for rep bouts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,

    #[serde(default)]
    pub skipped: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_modifiers: Option<Vec<ActiveModifier>>,
}

impl CompletedBout {
    pub fn exercise_id(&self) -> Option<&str> {
        self.bout.exercise_id()
    }

    /// Wall-clock time between start and completion, pauses included.
    pub fn wall_duration(&self) -> Duration {
        self.completed_at - self.started_at
    }
}

/// Payload handed to the execution store when a session is flushed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExecutionUpdate {
    pub completed_log: Vec<CompletedBout>,

    /// Pause time across the whole session, in milliseconds
    pub total_pause_ms: i64,

    /// Set only when the session ran to completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionUpdate {
    pub fn total_pause(&self) -> Duration {
        Duration::milliseconds(self.total_pause_ms)
    }
}
