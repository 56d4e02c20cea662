//! Execution Clock
//!
//! Elapsed active time for the bout in progress, exclusive of pauses.
//!
//! The clock never reads wall-clock time itself: every operation takes
//! `now`. Wall-clock time enters the system only through a [`TimeSource`],
//! which the driver consults once per event.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Supplies the current instant.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A time source that only moves when told to. Used by tests and replays.
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTimeSource {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = instant;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// `now - started_at - total_pause`, clamped at zero.
pub fn elapsed(started_at: DateTime<Utc>, now: DateTime<Utc>, total_pause: Duration) -> Duration {
    let active = now - started_at - total_pause;
    if active < Duration::zero() {
        Duration::zero()
    } else {
        active
    }
}

/// Pause-aware stopwatch for a single bout.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionClock {
    started_at: DateTime<Utc>,
    pause_started_at: Option<DateTime<Utc>>,
    total_pause: Duration,
}

impl ExecutionClock {
    /// Starts a running clock at `now`.
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            pause_started_at: None,
            total_pause: Duration::zero(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_paused(&self) -> bool {
        self.pause_started_at.is_some()
    }

    /// Pause time closed so far (an open pause is not included).
    pub fn total_pause(&self) -> Duration {
        self.total_pause
    }

    /// Records the start of a pause. Returns false if already paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_paused() {
            return false;
        }
        self.pause_started_at = Some(now);
        true
    }

    /// Closes the open pause. Returns false if not paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        match self.pause_started_at.take() {
            Some(paused_at) => {
                let paused_for = now - paused_at;
                if paused_for > Duration::zero() {
                    self.total_pause += paused_for;
                }
                true
            }
            None => false,
        }
    }

    /// Active time. Frozen at the pause instant while paused.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let effective_now = self.pause_started_at.unwrap_or(now);
        elapsed(self.started_at, effective_now, self.total_pause)
    }

    /// Whole seconds of active time.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u32 {
        u32::try_from(self.elapsed(now).num_seconds()).unwrap_or(u32::MAX)
    }

    /// Starts timing a new bout at `now`.
    ///
    /// Any open pause is closed first. Returns the pause time accrued
    /// by the bout that just ended.
    pub fn restart(&mut self, now: DateTime<Utc>) -> Duration {
        self.resume(now);
        let accrued = self.total_pause;
        *self = Self::start(now);
        accrued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn test_elapsed_formula() {
        assert_eq!(elapsed(t(0), t(30), Duration::seconds(5)), Duration::seconds(25));
        assert_eq!(elapsed(t(10), t(5), Duration::zero()), Duration::zero());
    }

    #[test]
    fn test_running_clock() {
        let clock = ExecutionClock::start(t(0));
        assert_eq!(clock.elapsed_seconds(t(12)), 12);
        assert!(!clock.is_paused());
    }

    #[test]
    fn test_pause_freezes_elapsed() {
        let mut clock = ExecutionClock::start(t(0));
        assert!(clock.pause(t(10)));

        assert_eq!(clock.elapsed_seconds(t(10)), 10);
        assert_eq!(clock.elapsed_seconds(t(100)), 10);
    }

    #[test]
    fn test_pause_accounting_is_exact() {
        let mut clock = ExecutionClock::start(t(0));
        clock.pause(t(10));
        clock.resume(t(25));
        clock.pause(t(40));
        clock.resume(t(41));

        // 60s wall clock minus 15s and 1s paused
        assert_eq!(clock.total_pause(), Duration::seconds(16));
        assert_eq!(clock.elapsed(t(60)), Duration::seconds(44));
    }

    #[test]
    fn test_double_pause_is_noop() {
        let mut clock = ExecutionClock::start(t(0));
        assert!(clock.pause(t(5)));
        assert!(!clock.pause(t(8)));
        clock.resume(t(10));
        assert_eq!(clock.total_pause(), Duration::seconds(5));
    }

    #[test]
    fn test_resume_without_pause_is_noop() {
        let mut clock = ExecutionClock::start(t(0));
        assert!(!clock.resume(t(5)));
        assert_eq!(clock.total_pause(), Duration::zero());
    }

    #[test]
    fn test_restart_closes_open_pause() {
        let mut clock = ExecutionClock::start(t(0));
        clock.pause(t(10));

        let accrued = clock.restart(t(30));
        assert_eq!(accrued, Duration::seconds(20));
        assert!(!clock.is_paused());
        assert_eq!(clock.started_at(), t(30));
        assert_eq!(clock.elapsed_seconds(t(35)), 5);
    }

    #[test]
    fn test_sub_second_precision() {
        let clock = ExecutionClock::start(t(0));
        let now = t(2) + Duration::milliseconds(999);
        assert_eq!(clock.elapsed_seconds(now), 2);
        assert_eq!(clock.elapsed(now), Duration::milliseconds(2999));
    }

    #[test]
    fn test_manual_time_source() {
        let source = ManualTimeSource::new(t(0));
        source.advance(Duration::seconds(3));
        assert_eq!(source.now(), t(3));
        source.set(t(100));
        assert_eq!(source.now(), t(100));
    }
}
