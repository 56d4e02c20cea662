//! Auto-Advance Policy
//!
//! Decides, from the goal mode and a bout's measure and target, whether
//! elapsed time forces a transition, and when near-end cues fire.
//!
//! The policy returns facts only. Device effects (beeps, vibration) are
//! performed by a [`Notifier`](super::notifier::Notifier) driven by those
//! facts.

use crate::sequence::{BoutConfig, Goal, Measure};

/// Returns true if a bout must advance on its own.
///
/// Only strict-goal timed bouts with a positive target auto-advance.
/// Elastic goals and repetition bouts always advance manually.
pub fn should_advance(goal: Goal, measure: Measure, target_value: Option<u32>, elapsed_seconds: u32) -> bool {
    match (goal, measure, target_value) {
        (Goal::Strict, Measure::Time, Some(target)) if target > 0 => elapsed_seconds >= target,
        _ => false,
    }
}

/// Returns true when the remaining time is inside the cue window.
///
/// `0 < target - elapsed <= beep_start`. A zero target never cues.
pub fn cue_window(beep_start_seconds: u32, target_value: u32, elapsed_seconds: u32) -> bool {
    let remaining = target_value.saturating_sub(elapsed_seconds);
    remaining > 0 && remaining <= beep_start_seconds
}

/// Seconds left until a timed target, if the bout has one.
pub fn remaining_seconds(config: &BoutConfig, elapsed_seconds: u32) -> Option<u32> {
    match (config.measure, config.target_value) {
        (Measure::Time, Some(target)) if target > 0 => Some(target.saturating_sub(elapsed_seconds)),
        _ => None,
    }
}

/// Remembers which second was last cued so each second fires once.
///
/// Reset on every bout transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CueTracker {
    last_cued: Option<u32>,
    target_reached: bool,
}

impl CueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the remaining second to cue, if a new one is due.
    pub fn check(&mut self, beep_start_seconds: u32, config: &BoutConfig, elapsed_seconds: u32) -> Option<u32> {
        if config.measure != Measure::Time {
            return None;
        }
        let target = config.target_value.filter(|t| *t > 0)?;
        if !cue_window(beep_start_seconds, target, elapsed_seconds) {
            return None;
        }

        let remaining = target - elapsed_seconds;
        if self.last_cued == Some(remaining) {
            return None;
        }
        self.last_cued = Some(remaining);
        Some(remaining)
    }

    /// Returns true exactly once, the first time a timed target is reached.
    pub fn check_target_reached(&mut self, config: &BoutConfig, elapsed_seconds: u32) -> bool {
        if self.target_reached {
            return false;
        }
        if remaining_seconds(config, elapsed_seconds) == Some(0) {
            self.target_reached = true;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_time_advances_at_target() {
        for elapsed in 0..30 {
            assert!(!should_advance(Goal::Strict, Measure::Time, Some(30), elapsed));
        }
        assert!(should_advance(Goal::Strict, Measure::Time, Some(30), 30));
        assert!(should_advance(Goal::Strict, Measure::Time, Some(30), 31));
    }

    #[test]
    fn test_elastic_never_advances() {
        for elapsed in [0, 29, 30, 31, 10_000] {
            assert!(!should_advance(Goal::Elastic, Measure::Time, Some(30), elapsed));
        }
    }

    #[test]
    fn test_repetitions_never_advance() {
        assert!(!should_advance(Goal::Strict, Measure::Repetitions, Some(10), 500));
    }

    #[test]
    fn test_missing_or_zero_target_never_advances() {
        assert!(!should_advance(Goal::Strict, Measure::Time, None, 500));
        assert!(!should_advance(Goal::Strict, Measure::Time, Some(0), 500));
    }

    #[test]
    fn test_cue_window_bounds() {
        assert!(!cue_window(3, 30, 26));
        assert!(cue_window(3, 30, 27));
        assert!(cue_window(3, 30, 29));
        assert!(!cue_window(3, 30, 30));
        assert!(!cue_window(3, 30, 45));
        assert!(!cue_window(3, 0, 0));
    }

    #[test]
    fn test_cue_tracker_fires_once_per_second() {
        let config = BoutConfig::time(10);
        let mut tracker = CueTracker::new();

        assert_eq!(tracker.check(3, &config, 6), None);
        assert_eq!(tracker.check(3, &config, 7), Some(3));
        // Several ticks within the same second
        assert_eq!(tracker.check(3, &config, 7), None);
        assert_eq!(tracker.check(3, &config, 8), Some(2));
        assert_eq!(tracker.check(3, &config, 9), Some(1));
        assert_eq!(tracker.check(3, &config, 10), None);
    }

    #[test]
    fn test_cue_tracker_ignores_reps_and_open_bouts() {
        let mut tracker = CueTracker::new();
        assert_eq!(tracker.check(3, &BoutConfig::reps(10), 9), None);
        assert_eq!(tracker.check(3, &BoutConfig::open(Measure::Time), 9), None);
    }

    #[test]
    fn test_target_reached_once() {
        let config = BoutConfig::time(5);
        let mut tracker = CueTracker::new();

        assert!(!tracker.check_target_reached(&config, 4));
        assert!(tracker.check_target_reached(&config, 5));
        assert!(!tracker.check_target_reached(&config, 6));

        tracker.reset();
        assert!(tracker.check_target_reached(&config, 7));
    }

    #[test]
    fn test_remaining_seconds() {
        assert_eq!(remaining_seconds(&BoutConfig::time(30), 12), Some(18));
        assert_eq!(remaining_seconds(&BoutConfig::time(30), 40), Some(0));
        assert_eq!(remaining_seconds(&BoutConfig::reps(30), 12), None);
    }
}
