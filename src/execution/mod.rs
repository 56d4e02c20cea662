//! Session Execution Module
//!
//! Runs a workout sequence: the session state machine, its clock and
//! auto-advance policy, and the event loop that feeds it ticks and
//! user commands.
//!
//! # Architecture
//!
//! - [`clock`]: Pause-aware elapsed time and time sources
//! - [`policy`]: Auto-advance decisions and near-end cues
//! - [`modifiers`]: Per-bout equipment activation
//! - [`scope`]: Which bouts a configuration edit applies to
//! - [`record`]: Completed-bout log entries and flush payloads
//! - [`session`]: The session runtime state machine
//! - [`ticker`]: Periodic tick thread
//! - [`notifier`]: Turning session facts into device effects
//! - [`driver`]: Single event loop around a runtime

pub mod clock;
pub mod driver;
pub mod modifiers;
pub mod notifier;
pub mod policy;
pub mod record;
pub mod scope;
pub mod session;
pub mod ticker;

pub use clock::{ExecutionClock, ManualTimeSource, SystemTimeSource, TimeSource};
pub use driver::{DriverEvent, SessionDriver};
pub use modifiers::{ActiveModifier, ActiveSet};
pub use notifier::{LogNotifier, Notification, Notifier, RecordingNotifier};
pub use record::{CompletedBout, ExecutionUpdate};
pub use scope::Scope;
pub use session::{
    Outcome, RatingOutcome, SessionCommand, SessionRuntime, SessionSnapshot, SessionState, TickReport,
};
pub use ticker::Ticker;
