//! Sequence Validation
//!
//! Structural checks on an authored sequence before it is executed:
//! - Bout field validation
//! - Bout id uniqueness
//! - Group membership integrity (each bout in at most one group)
//! - Modifier assignments against the declared available modifiers

use std::collections::HashSet;

use log::{debug, info, warn};

use super::model::{Bout, BoutId, Sequence};
use crate::error::EngineError;

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptySequence,
    DuplicateBoutId(String),
    EmptyExerciseId(usize),
    UnknownGroupMember { group: String, bout: String },
    MultipleGroups { bout: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySequence => write!(f, "Sequence has no bouts"),
            Self::DuplicateBoutId(id) => write!(f, "Duplicate bout ID: '{}'", id),
            Self::EmptyExerciseId(index) => {
                write!(f, "Bout {} is an exercise with no exercise ID", index)
            }
            Self::UnknownGroupMember { group, bout } => {
                write!(f, "Group '{}' references unknown bout '{}'", group, bout)
            }
            Self::MultipleGroups { bout } => {
                write!(f, "Bout '{}' belongs to more than one group", bout)
            }
        }
    }
}

/// Validates a single bout's fields.
fn validate_bout(index: usize, bout: &Bout, sequence: &Sequence) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(exercise_id) = bout.exercise_id() {
        if exercise_id.trim().is_empty() {
            errors.push(ValidationError::EmptyExerciseId(index));
        }
    }

    for assignment in bout.modifier_assignments() {
        if !sequence.is_modifier_available(&assignment.modifier_id) {
            warn!(
                "Bout {} assigns modifier '{}' which the sequence does not declare available",
                index, assignment.modifier_id
            );
        }
    }

    if bout.config.target_value == Some(0) {
        debug!("Bout {} has a zero target and will never auto-advance", index);
    }

    errors
}

/// Collects every validation problem in a sequence.
pub fn check_sequence(sequence: &Sequence) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if sequence.bouts.is_empty() {
        errors.push(ValidationError::EmptySequence);
        return errors;
    }

    let mut seen_ids: HashSet<&BoutId> = HashSet::new();
    for (index, bout) in sequence.bouts.iter().enumerate() {
        if !bout.id.is_empty() && !seen_ids.insert(&bout.id) {
            errors.push(ValidationError::DuplicateBoutId(bout.id.to_string()));
        }
        errors.extend(validate_bout(index, bout, sequence));
    }

    let mut grouped: HashSet<&BoutId> = HashSet::new();
    for group in &sequence.groups {
        for member in &group.bouts {
            if !seen_ids.contains(member) {
                errors.push(ValidationError::UnknownGroupMember {
                    group: group.name.clone(),
                    bout: member.to_string(),
                });
            } else if !grouped.insert(member) {
                errors.push(ValidationError::MultipleGroups {
                    bout: member.to_string(),
                });
            }
        }
    }

    errors
}

/// Validates the entire sequence structure.
///
/// On success, bouts without an id are tagged and empty groups are dropped.
pub fn validate_sequence(sequence: &mut Sequence) -> Result<(), EngineError> {
    info!("Validating sequence '{}' with {} bouts", sequence.id, sequence.bouts.len());

    let errors = check_sequence(sequence);
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(EngineError::InvalidSequence(messages.join("\n")));
    }

    let tagged = sequence.ensure_bout_ids();
    if tagged > 0 {
        debug!("Tagged {} bouts with generated ids", tagged);
    }

    let before = sequence.groups.len();
    sequence.groups.retain(|g| !g.bouts.is_empty());
    if sequence.groups.len() != before {
        debug!("Dropped {} empty groups", before - sequence.groups.len());
    }

    info!(
        "Sequence validated: {} bouts, {} groups, goal {}",
        sequence.bouts.len(),
        sequence.groups.len(),
        sequence.goal
    );
    Ok(())
}
