//! Sequence Parser
//!
//! Handles loading sequence definitions from YAML files. A sequence file
//! may also carry the exercise and modifier catalog entries it refers to,
//! so that a single file is enough to run a session from the command line.

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::model::{Exercise, Modifier, Sequence};
use super::validator::validate_sequence;
use crate::error::EngineError;

/// Contents of a sequence YAML file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SequenceFile {
    #[serde(flatten)]
    pub sequence: Sequence,

    /// Exercise catalog entries bundled with the sequence
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exercises: Vec<Exercise>,

    /// Modifier catalog entries bundled with the sequence
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<Modifier>,
}

/// Parses and validates a sequence file from YAML text.
pub fn parse_sequence_file(yaml: &str) -> Result<SequenceFile, EngineError> {
    let mut file: SequenceFile = serde_yaml::from_str(yaml).map_err(|e| {
        EngineError::Parse(format!("Failed to parse sequence YAML: {}. Check the file format.", e))
    })?;

    info!(
        "Parsed sequence '{}': {} bouts, {} exercises, {} modifiers",
        file.sequence.id,
        file.sequence.bouts.len(),
        file.exercises.len(),
        file.modifiers.len()
    );

    validate_sequence(&mut file.sequence)?;
    Ok(file)
}

/// Loads a sequence file (sequence plus bundled catalogs).
///
/// # Example
///
/// ```rust,no_run
/// use boutrunner::sequence::load_sequence_file;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let file = load_sequence_file("morning.yaml")?;
///     println!("Loaded {} bouts", file.sequence.bouts.len());
///     Ok(())
/// }
/// ```
pub fn load_sequence_file(path: impl AsRef<Path>) -> Result<SequenceFile, EngineError> {
    let path = path.as_ref();
    info!("Loading sequence from: {}", path.display());

    let yaml_content = fs::read_to_string(path).map_err(|e| {
        EngineError::Parse(format!(
            "Failed to read sequence file '{}': {}. Check that the file exists and is readable.",
            path.display(),
            e
        ))
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    let mut file = parse_sequence_file(&yaml_content)?;

    // Fall back to the file stem when the sequence carries no id
    if file.sequence.id.trim().is_empty() {
        file.sequence.id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sequence")
            .to_string();
    }

    Ok(file)
}

/// Loads only the sequence from a YAML file.
pub fn load_sequence(path: impl AsRef<Path>) -> Result<Sequence, EngineError> {
    load_sequence_file(path).map(|file| file.sequence)
}

/// Writes a sequence file back to disk as YAML.
pub fn save_sequence_file(path: impl AsRef<Path>, file: &SequenceFile) -> Result<(), EngineError> {
    let yaml = serde_yaml::to_string(file)?;
    fs::write(path.as_ref(), yaml)?;
    debug!("Saved sequence '{}' to {}", file.sequence.id, path.as_ref().display());
    Ok(())
}
