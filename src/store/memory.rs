//! In-Memory Store
//!
//! Implements every collaborator trait over process memory. Supports
//! access denial and write-failure injection so hosts and tests can
//! exercise the engine's error paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::debug;
use uuid::Uuid;

use super::records::{detect_personal_records, ExecutionRecord, PersonalRecord};
use super::{ExecutionStore, ExerciseCatalog, ModifierCatalog, RatingService, SequenceStore, SequenceUpdate};
use crate::error::{EngineError, Result};
use crate::execution::record::ExecutionUpdate;
use crate::sequence::{Exercise, Modifier, Sequence};

#[derive(Default)]
struct Inner {
    sequences: HashMap<String, Sequence>,
    exercises: Vec<Exercise>,
    modifiers: Vec<Modifier>,
    executions: HashMap<String, ExecutionRecord>,
    denied: HashSet<String>,
}

/// Process-local store for sequences, catalogs and executions.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
    sequence_writes: AtomicUsize,
    execution_writes: AtomicUsize,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::PersistenceFailure("store is rejecting writes".to_string()));
        }
        Ok(())
    }

    pub fn with_sequence(self, sequence: Sequence) -> Self {
        self.insert_sequence(sequence);
        self
    }

    pub fn with_exercises(self, exercises: Vec<Exercise>) -> Self {
        self.lock().exercises = exercises;
        self
    }

    pub fn with_modifiers(self, modifiers: Vec<Modifier>) -> Self {
        self.lock().modifiers = modifiers;
        self
    }

    pub fn insert_sequence(&self, sequence: Sequence) {
        self.lock().sequences.insert(sequence.id.clone(), sequence);
    }

    /// Makes a sequence unreadable, as if owned by another user.
    pub fn deny(&self, sequence_id: impl Into<String>) {
        self.lock().denied.insert(sequence_id.into());
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current stored copy of a sequence.
    pub fn sequence(&self, id: &str) -> Option<Sequence> {
        self.lock().sequences.get(id).cloned()
    }

    /// Current stored copy of an execution.
    pub fn execution(&self, id: &str) -> Option<ExecutionRecord> {
        self.lock().executions.get(id).cloned()
    }

    /// Number of successful sequence overwrites.
    pub fn sequence_write_count(&self) -> usize {
        self.sequence_writes.load(Ordering::SeqCst)
    }

    /// Number of successful execution updates.
    pub fn execution_write_count(&self) -> usize {
        self.execution_writes.load(Ordering::SeqCst)
    }
}

impl SequenceStore for InMemoryStore {
    fn get_sequence(&self, id: &str) -> Result<Sequence> {
        let inner = self.lock();
        if inner.denied.contains(id) {
            return Err(EngineError::Unauthorized(id.to_string()));
        }
        inner
            .sequences
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::sequence_not_found(id))
    }

    fn update_sequence(&self, id: &str, update: SequenceUpdate) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.lock();
        let sequence = inner
            .sequences
            .get_mut(id)
            .ok_or_else(|| EngineError::sequence_not_found(id))?;

        update.apply_to(sequence);
        self.sequence_writes.fetch_add(1, Ordering::SeqCst);
        debug!("Updated sequence '{}'", id);
        Ok(())
    }
}

impl ExerciseCatalog for InMemoryStore {
    fn list_exercises(&self) -> Result<Vec<Exercise>> {
        Ok(self.lock().exercises.clone())
    }
}

impl ModifierCatalog for InMemoryStore {
    fn list_modifiers(&self) -> Result<Vec<Modifier>> {
        Ok(self.lock().modifiers.clone())
    }
}

impl ExecutionStore for InMemoryStore {
    fn start_execution(&self, sequence_id: &str) -> Result<String> {
        self.check_writable()?;
        let execution_id = Uuid::new_v4().to_string();
        self.lock()
            .executions
            .insert(execution_id.clone(), ExecutionRecord::new(&execution_id, sequence_id));
        Ok(execution_id)
    }

    fn update_execution(&self, execution_id: &str, update: &ExecutionUpdate) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.lock();
        let record = inner.executions.get_mut(execution_id).ok_or_else(|| EngineError::NotFound {
            kind: "execution",
            id: execution_id.to_string(),
        })?;

        record.apply(update);
        self.execution_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl RatingService for InMemoryStore {
    fn submit_rating(&self, execution_id: &str, rating: u8, feedback: Option<&str>) -> Result<Vec<PersonalRecord>> {
        self.check_writable()?;
        let mut inner = self.lock();

        let history: Vec<ExecutionRecord> = inner
            .executions
            .values()
            .filter(|r| r.execution_id != execution_id && r.completed_at.is_some())
            .cloned()
            .collect();

        let record = inner.executions.get_mut(execution_id).ok_or_else(|| EngineError::NotFound {
            kind: "execution",
            id: execution_id.to_string(),
        })?;
        record.rating = Some(rating);
        record.feedback = feedback.map(str::to_string);

        Ok(detect_personal_records(&record.completed_log, &history))
    }
}
