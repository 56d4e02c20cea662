//! BoutRunner - Workout Sequence Execution Engine
//!
//! Runs an authored sequence of exercise and break bouts as a live
//! session: tracks the current bout, pause-aware elapsed time, equipment
//! modifiers and on-the-fly edits, and persists the completed-bout log
//! for personal-record detection.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`sequence`]: Data structures, parsing and validation of sequences
//! - [`execution`]: Session runtime, clock, policy and event loop
//! - [`store`]: Collaborator traits with in-memory and file implementations
//! - [`monitoring`]: Session timeline for reports
//! - [`config`]: Engine tunables
//! - [`error`]: Engine error type
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use boutrunner::execution::{LogNotifier, SessionDriver, SessionRuntime, SystemTimeSource, TimeSource};
//! use boutrunner::store::{FileExecutionStore, Services, YamlSequenceStore};
//! use boutrunner::EngineConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let sequences = Arc::new(YamlSequenceStore::open("legs.yaml")?);
//!     let executions = Arc::new(FileExecutionStore::new(config.executions_dir()));
//!     let services = Services {
//!         sequences: sequences.clone(),
//!         executions: executions.clone(),
//!         ratings: executions,
//!         modifiers: sequences.clone(),
//!     };
//!
//!     let time = Arc::new(SystemTimeSource);
//!     let mut runtime = SessionRuntime::new(services);
//!     runtime.start(&sequences.sequence_id(), time.now())?;
//!
//!     let driver = SessionDriver::new(runtime, time, LogNotifier, config.tick_interval());
//!     let runtime = driver.run();
//!     println!("Completed {} bouts", runtime.completed_log().len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod sequence;
pub mod store;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use execution::session::{Outcome, SessionCommand, SessionRuntime, SessionState};
pub use sequence::model::{Bout, BoutConfig, Goal, Measure, Sequence};
pub use sequence::parser::load_sequence;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "BoutRunner";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "BoutRunner");
    }

    #[test]
    fn test_module_exports_bout() {
        let bout = Bout::exercise("pushup", BoutConfig::reps(12));
        assert_eq!(bout.exercise_id(), Some("pushup"));
        assert!(!bout.is_break());
    }

    #[test]
    fn test_module_exports_sequence() {
        let sequence = Sequence::new("empty");
        assert!(sequence.is_empty());
        assert_eq!(sequence.goal, Goal::Elastic);
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
