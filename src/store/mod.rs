//! External Collaborators
//!
//! The engine does not own storage or transport. It calls out through the
//! traits defined here, whatever the host supplies behind them.
//!
//! # Implementations
//!
//! - [`memory`]: In-memory store implementing every trait (tests, embedding)
//! - [`file`]: YAML sequence file and JSON execution records on disk
//! - [`records`]: Execution records and personal-record detection

pub mod file;
pub mod memory;
pub mod records;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::execution::record::ExecutionUpdate;
use crate::sequence::{Bout, Exercise, Group, Modifier, ModifierId, Sequence};

pub use file::{FileExecutionStore, YamlSequenceStore};
pub use memory::InMemoryStore;
pub use records::{detect_personal_records, ExecutionRecord, PersonalRecord};

/// Partial overwrite of an authored sequence. `None` fields are untouched.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SequenceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bouts: Option<Vec<Bout>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<Group>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_modifiers: Option<Vec<ModifierId>>,
}

impl SequenceUpdate {
    /// Applies the update to a sequence in place.
    pub fn apply_to(&self, sequence: &mut Sequence) {
        if let Some(bouts) = &self.bouts {
            sequence.bouts = bouts.clone();
        }
        if let Some(groups) = &self.groups {
            sequence.groups = groups.clone();
        }
        if let Some(modifiers) = &self.available_modifiers {
            sequence.available_modifiers = modifiers.clone();
        }
    }
}

/// Authored sequences.
pub trait SequenceStore: Send + Sync {
    /// Fails with `NotFound` or `Unauthorized`.
    fn get_sequence(&self, id: &str) -> Result<Sequence>;

    fn update_sequence(&self, id: &str, update: SequenceUpdate) -> Result<()>;
}

/// Exercise catalog, used for display only.
pub trait ExerciseCatalog: Send + Sync {
    fn list_exercises(&self) -> Result<Vec<Exercise>>;
}

/// Read-only modifier catalog.
pub trait ModifierCatalog: Send + Sync {
    fn list_modifiers(&self) -> Result<Vec<Modifier>>;
}

/// Execution records.
pub trait ExecutionStore: Send + Sync {
    /// Creates an execution record and returns its id.
    fn start_execution(&self, sequence_id: &str) -> Result<String>;

    fn update_execution(&self, execution_id: &str, update: &ExecutionUpdate) -> Result<()>;
}

/// Rating submission. Personal-record detection happens behind this trait.
pub trait RatingService: Send + Sync {
    fn submit_rating(
        &self,
        execution_id: &str,
        rating: u8,
        feedback: Option<&str>,
    ) -> Result<Vec<PersonalRecord>>;
}

/// The collaborators a session runtime calls out to.
#[derive(Clone)]
pub struct Services {
    pub sequences: Arc<dyn SequenceStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub ratings: Arc<dyn RatingService>,
    pub modifiers: Arc<dyn ModifierCatalog>,
}

impl Services {
    /// Wires every collaborator to one in-memory store.
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            sequences: store.clone(),
            executions: store.clone(),
            ratings: store.clone(),
            modifiers: store,
        }
    }
}
