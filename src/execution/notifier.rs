//! Session Notifications
//!
//! The runtime produces facts (a cue is due, a target was reached, the
//! bout changed). A [`Notifier`] turns them into device effects such as
//! beeps, vibration or terminal output. The driver calls it after every
//! event it processes.

use std::sync::{Arc, Mutex};

use log::{info, warn};

use super::session::{SessionSnapshot, SessionState, TickReport};
use crate::error::EngineError;

/// Receives session facts from the driver.
pub trait Notifier: Send {
    /// Called for every tick processed while running.
    fn on_tick(&mut self, _report: &TickReport) {}

    /// Called after any applied change to the session.
    fn on_transition(&mut self, _snapshot: &SessionSnapshot) {}

    /// Called when a command or tick returned an error.
    fn on_error(&mut self, _error: &EngineError) {}
}

/// Notifier that writes cues and transitions to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn on_tick(&mut self, report: &TickReport) {
        if let Some(remaining) = report.cue {
            info!("Beep: {} s left", remaining);
        }
        if report.target_reached {
            info!("Target reached for bout {}", report.index + 1);
        }
    }

    fn on_transition(&mut self, snapshot: &SessionSnapshot) {
        match snapshot.current_bout() {
            Some(bout) => info!(
                "Bout {}/{}: {} ({})",
                snapshot.cursor + 1,
                snapshot.bouts.len(),
                bout.label(),
                bout.config
            ),
            None => info!("Session {:?}", snapshot.state),
        }
    }

    fn on_error(&mut self, error: &EngineError) {
        warn!("{}", error);
    }
}

/// A notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Cue(u32),
    TargetReached(usize),
    AutoAdvanced(usize),
    Transition { cursor: usize, state: SessionState },
    Error(String),
}

/// Notifier that records what it was told, for hosts that poll and for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, notification: Notification) {
        if let Ok(mut events) = self.events.lock() {
            events.push(notification);
        }
    }

    /// Everything recorded so far, shared across clones.
    pub fn events(&self) -> Vec<Notification> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn on_tick(&mut self, report: &TickReport) {
        if let Some(remaining) = report.cue {
            self.push(Notification::Cue(remaining));
        }
        if report.target_reached {
            self.push(Notification::TargetReached(report.index));
        }
        if report.auto_advanced {
            self.push(Notification::AutoAdvanced(report.index));
        }
    }

    fn on_transition(&mut self, snapshot: &SessionSnapshot) {
        self.push(Notification::Transition {
            cursor: snapshot.cursor,
            state: snapshot.state,
        });
    }

    fn on_error(&mut self, error: &EngineError) {
        self.push(Notification::Error(error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_shares_events() {
        let notifier = RecordingNotifier::new();
        let mut handle = notifier.clone();

        handle.on_tick(&TickReport {
            index: 2,
            cue: Some(3),
            target_reached: true,
            ..TickReport::default()
        });
        handle.on_error(&EngineError::PersistenceFailure("disk full".to_string()));

        assert_eq!(
            notifier.events(),
            vec![
                Notification::Cue(3),
                Notification::TargetReached(2),
                Notification::Error("persistence failure: disk full".to_string()),
            ]
        );
    }

    #[test]
    fn test_quiet_tick_records_nothing() {
        let mut notifier = RecordingNotifier::new();
        notifier.on_tick(&TickReport::default());
        assert!(notifier.events().is_empty());
    }
}
