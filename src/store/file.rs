//! File-Backed Stores
//!
//! - [`YamlSequenceStore`]: serves one sequence file (and its bundled
//!   catalogs), writing sequence updates back to the same file.
//! - [`FileExecutionStore`]: one pretty-printed JSON record per execution,
//!   stored as `{dir}/{execution_id}.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, info, warn};
use uuid::Uuid;

use super::records::{detect_personal_records, ExecutionRecord, PersonalRecord};
use super::{ExecutionStore, ExerciseCatalog, ModifierCatalog, RatingService, SequenceStore, SequenceUpdate};
use crate::error::{EngineError, Result};
use crate::execution::record::ExecutionUpdate;
use crate::sequence::{load_sequence_file, save_sequence_file, Exercise, Modifier, Sequence, SequenceFile};

/// Sequence store over a single YAML sequence file.
pub struct YamlSequenceStore {
    path: PathBuf,
    file: Mutex<SequenceFile>,
}

impl YamlSequenceStore {
    /// Loads and validates the sequence file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = load_sequence_file(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SequenceFile> {
        match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Id of the sequence served by this store.
    pub fn sequence_id(&self) -> String {
        self.lock().sequence.id.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SequenceStore for YamlSequenceStore {
    fn get_sequence(&self, id: &str) -> Result<Sequence> {
        let file = self.lock();
        if file.sequence.id != id {
            return Err(EngineError::sequence_not_found(id));
        }
        Ok(file.sequence.clone())
    }

    fn update_sequence(&self, id: &str, update: SequenceUpdate) -> Result<()> {
        let mut file = self.lock();
        if file.sequence.id != id {
            return Err(EngineError::sequence_not_found(id));
        }

        let mut updated = file.clone();
        update.apply_to(&mut updated.sequence);
        save_sequence_file(&self.path, &updated)
            .map_err(|e| EngineError::PersistenceFailure(format!("{}: {}", self.path.display(), e)))?;

        *file = updated;
        info!("Saved sequence '{}' to {}", id, self.path.display());
        Ok(())
    }
}

impl ExerciseCatalog for YamlSequenceStore {
    fn list_exercises(&self) -> Result<Vec<Exercise>> {
        Ok(self.lock().exercises.clone())
    }
}

impl ModifierCatalog for YamlSequenceStore {
    fn list_modifiers(&self) -> Result<Vec<Modifier>> {
        Ok(self.lock().modifiers.clone())
    }
}

/// Execution records stored as JSON files in a directory.
pub struct FileExecutionStore {
    dir: PathBuf,
}

impl FileExecutionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, execution_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", execution_id))
    }

    fn save(&self, record: &ExecutionRecord) -> Result<()> {
        let write = || -> Result<()> {
            fs::create_dir_all(&self.dir)?;
            let json = serde_json::to_string_pretty(record)?;
            fs::write(self.record_path(&record.execution_id), json)?;
            Ok(())
        };
        write().map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;

        debug!("Saved execution record {}", record.execution_id);
        Ok(())
    }

    /// Loads one execution record.
    pub fn load(&self, execution_id: &str) -> Result<ExecutionRecord> {
        let path = self.record_path(execution_id);
        if !path.exists() {
            return Err(EngineError::NotFound {
                kind: "execution",
                id: execution_id.to_string(),
            });
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Loads every readable record in the directory. Unreadable files are skipped.
    pub fn list_records(&self) -> Vec<ExecutionRecord> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
            .filter_map(|path| {
                let content = fs::read_to_string(&path).ok()?;
                match serde_json::from_str(&content) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("Skipping unreadable execution record {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect()
    }
}

impl ExecutionStore for FileExecutionStore {
    fn start_execution(&self, sequence_id: &str) -> Result<String> {
        let execution_id = Uuid::new_v4().to_string();
        self.save(&ExecutionRecord::new(&execution_id, sequence_id))?;
        info!("Started execution {} for sequence '{}'", execution_id, sequence_id);
        Ok(execution_id)
    }

    fn update_execution(&self, execution_id: &str, update: &ExecutionUpdate) -> Result<()> {
        let mut record = self.load(execution_id)?;
        record.apply(update);
        self.save(&record)
    }
}

impl RatingService for FileExecutionStore {
    fn submit_rating(&self, execution_id: &str, rating: u8, feedback: Option<&str>) -> Result<Vec<PersonalRecord>> {
        let mut record = self.load(execution_id)?;

        let history: Vec<ExecutionRecord> = self
            .list_records()
            .into_iter()
            .filter(|r| r.execution_id != execution_id && r.completed_at.is_some())
            .collect();

        record.rating = Some(rating);
        record.feedback = feedback.map(str::to_string);
        self.save(&record)?;

        Ok(detect_personal_records(&record.completed_log, &history))
    }
}
