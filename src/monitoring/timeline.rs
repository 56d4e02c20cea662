//! Session Timeline
//!
//! Records bout start/end and pause events for post-session reports and
//! a compact Gantt-style chart. Timestamps are supplied by the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Bout became current
    Started,
    /// Bout was completed
    Completed,
    /// Bout was skipped
    Skipped,
    /// User went back to this bout
    Reverted,
    Paused,
    Resumed,
    /// Session was quit before the last bout
    Quit,
}

/// A single event in the session timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEvent {
    /// Position of the bout in the session list
    pub index: usize,
    /// Exercise id or "break"
    pub label: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
}

/// Tracks the execution timeline of a session.
#[derive(Debug, Clone)]
pub struct SessionTimeline {
    events: Vec<TimelineEvent>,
    start_time: DateTime<Utc>,
}

impl SessionTimeline {
    /// Creates a new timeline starting at `start_time`.
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            events: Vec::new(),
            start_time,
        }
    }

    /// Records an event for a bout.
    pub fn add_event(&mut self, index: usize, label: impl Into<String>, event_type: EventType, at: DateTime<Utc>) {
        self.events.push(TimelineEvent {
            index,
            label: label.into(),
            event_type,
            timestamp: at,
        });
    }

    /// Returns all recorded events.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Number of pauses taken.
    pub fn pause_count(&self) -> usize {
        self.events.iter().filter(|e| e.event_type == EventType::Paused).count()
    }

    /// Wall-clock span of the latest attempt at each bout, in milliseconds.
    ///
    /// A bout that was reverted and redone reports its final attempt only.
    pub fn get_durations(&self) -> BTreeMap<usize, (String, i64)> {
        let mut starts: BTreeMap<usize, DateTime<Utc>> = BTreeMap::new();
        let mut durations: BTreeMap<usize, (String, i64)> = BTreeMap::new();

        for event in &self.events {
            match event.event_type {
                EventType::Started | EventType::Reverted => {
                    starts.insert(event.index, event.timestamp);
                    durations.remove(&event.index);
                }
                EventType::Completed | EventType::Skipped => {
                    if let Some(start) = starts.get(&event.index) {
                        let ms = (event.timestamp - *start).num_milliseconds();
                        durations.insert(event.index, (event.label.clone(), ms));
                    }
                }
                EventType::Paused | EventType::Resumed | EventType::Quit => {}
            }
        }

        durations
    }

    /// Generates an ASCII Gantt chart of bout spans up to `now`.
    pub fn gantt_chart(&self, now: DateTime<Utc>) -> String {
        let mut output = String::from("\nSession Timeline:\n\n");

        let total_time = (now - self.start_time).num_milliseconds();
        if total_time <= 0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time as f64;

        let mut starts: BTreeMap<usize, i64> = BTreeMap::new();
        for event in &self.events {
            if matches!(event.event_type, EventType::Started | EventType::Reverted) {
                starts.insert(event.index, (event.timestamp - self.start_time).num_milliseconds());
            }
        }

        for (index, (label, duration_ms)) in self.get_durations() {
            let start = starts.get(&index).copied().unwrap_or(0).max(0);
            let start_pos = (start as f64 * scale) as usize;
            let width = (duration_ms as f64 * scale).max(1.0) as usize;

            let mut bar = " ".repeat(start_pos);
            bar.push_str(&"#".repeat(width));

            output.push_str(&format!(
                "{:>3} {:12} |{}| ({} s)\n",
                index + 1,
                truncate(&label, 12),
                bar,
                duration_ms / 1000
            ));
        }

        output.push_str(&format!("\nTotal: {} s, {} pauses\n", total_time / 1000, self.pause_count()));
        output
    }
}

/// Truncates a string to a maximum length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
