//! Session Driver
//!
//! The single event loop around a [`SessionRuntime`]. Ticks from the
//! [`Ticker`] thread and UI commands arrive on the same mpsc channel, so
//! every transition runs to completion before the next one starts.
//!
//! The driver reads the [`TimeSource`] once per event and hands that
//! instant to the runtime. The ticker is suspended whenever the session
//! is not running and is stopped and joined when the loop ends.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use super::clock::TimeSource;
use super::notifier::Notifier;
use super::session::{SessionCommand, SessionRuntime, SessionState};
use super::ticker::Ticker;
use crate::error::Result;

/// An event for the driver loop.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// Periodic clock tick
    Tick,
    /// A user action
    Command(SessionCommand),
    /// Stop the loop without changing the session
    Shutdown,
}

/// Owns a started runtime and feeds it events until the session ends.
pub struct SessionDriver<N: Notifier> {
    runtime: SessionRuntime,
    time: Arc<dyn TimeSource>,
    notifier: N,
    tick_interval: Duration,
    tx: Sender<DriverEvent>,
    rx: Receiver<DriverEvent>,
}

impl<N: Notifier> SessionDriver<N> {
    pub fn new(runtime: SessionRuntime, time: Arc<dyn TimeSource>, notifier: N, tick_interval: Duration) -> Self {
        let (tx, rx) = channel();
        Self {
            runtime,
            time,
            notifier,
            tick_interval,
            tx,
            rx,
        }
    }

    /// A sender for UI threads to post commands on.
    pub fn sender(&self) -> Sender<DriverEvent> {
        self.tx.clone()
    }

    pub fn runtime(&self) -> &SessionRuntime {
        &self.runtime
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Processes one event. Returns false when the loop should stop.
    pub fn handle_event(&mut self, event: DriverEvent) -> bool {
        let now = self.time.now();
        let version = self.runtime.version();

        let result: Result<()> = match event {
            DriverEvent::Shutdown => {
                debug!("Driver shutdown requested");
                return false;
            }
            DriverEvent::Tick => match self.runtime.tick(now) {
                Ok(Some(report)) => {
                    self.notifier.on_tick(&report);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            },
            DriverEvent::Command(command) => {
                debug!("Command: {:?}", command);
                self.runtime.dispatch(command, now).map(|_| ())
            }
        };

        if self.runtime.version() != version {
            self.notifier.on_transition(&self.runtime.snapshot(now));
        }
        if let Err(e) = result {
            self.notifier.on_error(&e);
        }

        !self.runtime.state().is_ended()
    }

    /// Runs the loop until the session ends or a shutdown arrives, then
    /// returns the runtime so the host can submit a rating.
    pub fn run(mut self) -> SessionRuntime {
        if !self.runtime.state().is_active() {
            debug!("Driver not started: session is {:?}", self.runtime.state());
            return self.runtime;
        }

        let mut ticker = Ticker::spawn(self.tick_interval, self.tx.clone());
        self.notifier.on_transition(&self.runtime.snapshot(self.time.now()));

        loop {
            if self.runtime.state() == SessionState::Running {
                ticker.resume();
            } else {
                ticker.suspend();
            }

            let Ok(event) = self.rx.recv() else {
                break;
            };
            if !self.handle_event(event) {
                break;
            }
        }

        ticker.stop();
        info!("Driver stopped with session {:?}", self.runtime.state());
        self.runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::clock::ManualTimeSource;
    use crate::execution::notifier::{Notification, RecordingNotifier};
    use crate::sequence::{Bout, BoutConfig, Goal, Sequence};
    use crate::store::{InMemoryStore, Services};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn driver(interval: Duration) -> (Arc<ManualTimeSource>, RecordingNotifier, SessionDriver<RecordingNotifier>) {
        let store = Arc::new(
            InMemoryStore::new().with_sequence(
                Sequence::new("hiit")
                    .with_goal(Goal::Strict)
                    .with_bout(Bout::exercise("burpee", BoutConfig::time(5)).with_id("x"))
                    .with_bout(Bout::rest(BoutConfig::time(5)).with_id("r")),
            ),
        );
        let time = Arc::new(ManualTimeSource::new(t(0)));
        let mut runtime = SessionRuntime::new(Services::in_memory(store));
        runtime.start("hiit", t(0)).unwrap();

        let notifier = RecordingNotifier::new();
        let driver = SessionDriver::new(runtime, time.clone(), notifier.clone(), interval);
        (time, notifier, driver)
    }

    #[test]
    fn test_ticks_drive_auto_advance() {
        let (time, notifier, mut driver) = driver(Duration::from_secs(3600));

        time.set(t(3));
        assert!(driver.handle_event(DriverEvent::Tick));
        time.set(t(5));
        assert!(driver.handle_event(DriverEvent::Tick));
        assert_eq!(driver.runtime().cursor(), 1);

        time.set(t(10));
        assert!(!driver.handle_event(DriverEvent::Tick));
        assert_eq!(driver.runtime().state(), SessionState::Completed);

        let events = notifier.events();
        assert!(events.contains(&Notification::Cue(2)));
        assert!(events.contains(&Notification::AutoAdvanced(0)));
        assert!(events.contains(&Notification::Transition {
            cursor: 2,
            state: SessionState::Completed
        }));
    }

    #[test]
    fn test_paused_ticks_are_ignored() {
        let (time, notifier, mut driver) = driver(Duration::from_secs(3600));

        driver.handle_event(DriverEvent::Command(SessionCommand::Pause));
        time.set(t(60));
        driver.handle_event(DriverEvent::Tick);

        assert_eq!(driver.runtime().cursor(), 0);
        assert_eq!(notifier.events().len(), 1);
    }

    #[test]
    fn test_run_until_quit() {
        let (_, _, driver) = driver(Duration::from_secs(3600));
        let tx = driver.sender();
        tx.send(DriverEvent::Command(SessionCommand::Skip { expected_cursor: Some(0) }))
            .unwrap();
        tx.send(DriverEvent::Command(SessionCommand::Quit)).unwrap();

        let runtime = driver.run();
        assert_eq!(runtime.state(), SessionState::Quit);
        assert_eq!(runtime.completed_log().len(), 1);
    }

    #[test]
    fn test_run_until_shutdown_keeps_session() {
        let (_, _, driver) = driver(Duration::from_secs(3600));
        driver.sender().send(DriverEvent::Shutdown).unwrap();

        let runtime = driver.run();
        assert_eq!(runtime.state(), SessionState::Running);
    }

    #[test]
    fn test_run_with_real_ticker() {
        let (time, _, driver) = driver(Duration::from_millis(5));

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let advancer = thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                time.advance(chrono::Duration::seconds(1));
                thread::sleep(Duration::from_millis(1));
            }
        });

        let runtime = driver.run();
        stop.store(true, Ordering::Relaxed);
        advancer.join().unwrap();

        assert_eq!(runtime.state(), SessionState::Completed);
        assert_eq!(runtime.completed_log().len(), 2);
    }
}
