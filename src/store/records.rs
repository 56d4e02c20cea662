//! Execution Records and Personal Records
//!
//! Stored shape of a session execution, and the personal-record rule the
//! bundled stores apply when a rating is submitted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::record::{CompletedBout, ExecutionUpdate};
use crate::sequence::{ExerciseId, Measure};

/// A persisted session execution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub sequence_id: String,

    #[serde(default)]
    pub completed_log: Vec<CompletedBout>,

    #[serde(default)]
    pub total_pause_ms: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl ExecutionRecord {
    pub fn new(execution_id: impl Into<String>, sequence_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            sequence_id: sequence_id.into(),
            completed_log: Vec::new(),
            total_pause_ms: 0,
            completed_at: None,
            rating: None,
            feedback: None,
        }
    }

    /// Overwrites progress fields with a flush payload.
    pub fn apply(&mut self, update: &ExecutionUpdate) {
        self.completed_log = update.completed_log.clone();
        self.total_pause_ms = update.total_pause_ms;
        if update.completed_at.is_some() {
            self.completed_at = update.completed_at;
        }
    }
}

/// A new best value for an exercise.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PersonalRecord {
    pub exercise_id: ExerciseId,
    pub measure: Measure,
    pub value: u32,

    /// Best value before this execution; `None` on first attempt
    pub previous_best: Option<u32>,
}

type RecordKey = (ExerciseId, Measure);

fn best_values<'a>(log: impl Iterator<Item = &'a CompletedBout>) -> HashMap<RecordKey, u32> {
    let mut best: HashMap<RecordKey, u32> = HashMap::new();
    for entry in log.filter(|e| !e.skipped) {
        let (Some(exercise_id), Some(value)) = (entry.exercise_id(), entry.value) else {
            continue;
        };
        let slot = best
            .entry((exercise_id.to_string(), entry.bout.config.measure))
            .or_insert(value);
        *slot = (*slot).max(value);
    }
    best
}

/// Compares an execution's log against history.
///
/// A record is set when the best non-skipped value for an
/// (exercise, measure) pair beats every historical value, or when the
/// pair has never been performed before. Breaks never set records.
pub fn detect_personal_records(current: &[CompletedBout], history: &[ExecutionRecord]) -> Vec<PersonalRecord> {
    let previous = best_values(history.iter().flat_map(|r| r.completed_log.iter()));

    let mut records: Vec<PersonalRecord> = best_values(current.iter())
        .into_iter()
        .filter_map(|((exercise_id, measure), value)| {
            let previous_best = previous.get(&(exercise_id.clone(), measure)).copied();
            match previous_best {
                Some(best) if value <= best => None,
                _ => Some(PersonalRecord {
                    exercise_id,
                    measure,
                    value,
                    previous_best,
                }),
            }
        })
        .collect();

    records.sort_by(|a, b| a.exercise_id.cmp(&b.exercise_id));
    records
}
