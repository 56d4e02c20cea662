//! Engine Error Types
//!
//! Errors surfaced by the session engine and its collaborators.
//!
//! Illegal state transitions are not errors: the runtime absorbs them as
//! no-ops. Only session start and persistence can fail.

use thiserror::Error;

/// Errors produced by the engine and the stores it calls out to.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A sequence, exercise or execution does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// The caller may not access the requested sequence.
    #[error("not authorized to access sequence '{0}'")]
    Unauthorized(String),

    /// The sequence cannot be executed as authored.
    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    /// A store rejected a write. In-memory session state is still valid.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

impl EngineError {
    /// Shorthand for a missing sequence.
    pub fn sequence_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "sequence",
            id: id.into(),
        }
    }

    /// Returns true if the caller can retry or continue locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PersistenceFailure(_) | Self::Io(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
