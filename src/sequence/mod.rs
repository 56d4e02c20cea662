//! Sequence Definition Module
//!
//! Provides data structures and utilities for defining, parsing, and
//! validating workout sequences.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Bout, Group, Sequence)
//! - [`parser`]: YAML parsing and loading
//! - [`validator`]: Structural validation

pub mod model;
pub mod parser;
pub mod validator;

pub use model::{
    Bout, BoutConfig, BoutId, BoutKind, Exercise, ExerciseId, Goal, Group, Measure, Modifier,
    ModifierAssignment, ModifierEffect, ModifierId, Sequence,
};
pub use parser::{load_sequence, load_sequence_file, parse_sequence_file, save_sequence_file, SequenceFile};
pub use validator::{check_sequence, validate_sequence, ValidationError};
