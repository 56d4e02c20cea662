//! Session Runtime
//!
//! The state machine that drives one workout session:
//!
//! ```text
//! NotStarted -> Running <-> Paused -> Completed
//!                  \          /
//!                   +-> Quit <+
//! ```
//!
//! The runtime owns the session-local bout list, the cursor and the
//! completed-bout log, and orchestrates the clock, the auto-advance
//! policy, the modifier tracker and the scope resolver.
//!
//! Illegal calls (pausing twice, going back from the first bout, a stale
//! double tap) return [`Outcome::Ignored`] rather than an error, since UI
//! actions can race. `start` is the only hard-failure path; persistence
//! failures are reported as recoverable and leave the in-memory state
//! valid.
//!
//! Bout lists and the log are copy-on-write: a [`SessionSnapshot`] taken
//! by a presenter is never affected by later transitions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::clock::ExecutionClock;
use super::modifiers::{self, ActiveSet};
use super::policy::{remaining_seconds, should_advance, CueTracker};
use super::record::{CompletedBout, ExecutionUpdate};
use super::scope::{resolve, Scope};
use crate::error::{EngineError, Result};
use crate::monitoring::{EventType, SessionTimeline};
use crate::sequence::{validate_sequence, Bout, BoutConfig, BoutId, Goal, Group, Measure, Modifier, ModifierId};
use crate::store::{PersonalRecord, SequenceUpdate, Services};

/// Default lead time for near-end cues.
pub const DEFAULT_BEEP_START_SECONDS: u32 = 3;

/// Lifecycle state of a session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Running,
    Paused,
    Completed,
    Quit,
}

impl SessionState {
    /// Running or paused.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Completed or quit.
    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Completed | Self::Quit)
    }
}

/// Result of a session operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation changed the session
    Applied,
    /// The operation was not legal in the current state
    Ignored,
    /// The operation ended the session and its log was flushed
    Finished,
}

/// Result of submitting a rating.
#[derive(Debug, Clone, PartialEq)]
pub enum RatingOutcome {
    Submitted { personal_records: Vec<PersonalRecord> },
    Ignored,
}

/// A UI action, optionally guarded against stale cursors.
///
/// Navigation commands carry the cursor the UI saw when the action was
/// issued. If the cursor has moved since (double tap, auto-advance race)
/// the command is ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Pause,
    Resume,
    Complete {
        expected_cursor: Option<usize>,
        value: Option<u32>,
    },
    Skip {
        expected_cursor: Option<usize>,
    },
    GoBack {
        expected_cursor: Option<usize>,
    },
    ToggleModifier(ModifierId),
    InsertBout {
        bout: Bout,
        persist: bool,
    },
    UpdateConfig {
        target_index: usize,
        scope: Scope,
        config: BoutConfig,
        persist: bool,
    },
    Quit,
}

/// Facts produced by one clock tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Index of the bout that was ticked
    pub index: usize,
    pub elapsed_seconds: u32,
    pub remaining_seconds: Option<u32>,
    /// Remaining second to cue, set once per second inside the cue window
    pub cue: Option<u32>,
    /// Elastic goal only: the timed target was reached this tick
    pub target_reached: bool,
    /// Strict goal only: the bout advanced on its own this tick
    pub auto_advanced: bool,
    /// The auto-advance ended the session
    pub finished: bool,
}

/// Immutable view of a session for presenters.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub execution_id: Option<String>,
    pub state: SessionState,
    pub goal: Goal,
    pub cursor: usize,
    pub version: u64,
    pub bouts: Arc<Vec<Bout>>,
    pub completed_log: Arc<Vec<CompletedBout>>,
    pub active_modifiers: ActiveSet,
    pub elapsed_seconds: u32,
}

impl SessionSnapshot {
    pub fn current_bout(&self) -> Option<&Bout> {
        if self.state.is_active() {
            self.bouts.get(self.cursor)
        } else {
            None
        }
    }
}

/// Runtime state of a single workout session.
pub struct SessionRuntime {
    services: Services,
    beep_start_seconds: u32,
    goal_override: Option<Goal>,

    state: SessionState,
    execution_id: Option<String>,
    sequence_id: String,
    goal: Goal,
    available_modifiers: Vec<ModifierId>,
    modifier_catalog: Vec<Modifier>,

    bouts: Arc<Vec<Bout>>,
    groups: Arc<Vec<Group>>,
    cursor: usize,
    completed_log: Arc<Vec<CompletedBout>>,
    active_modifiers: ActiveSet,

    clock: Option<ExecutionClock>,
    /// Pause time accrued by bouts that have already ended
    closed_pause: Duration,
    cues: CueTracker,
    timeline: Option<SessionTimeline>,

    version: u64,
    /// Bouts changed locally and not yet written to the sequence store
    unpersisted: HashSet<BoutId>,
    /// Flush payload kept until the execution store accepts it
    pending_flush: Option<ExecutionUpdate>,
    rating_submitted: bool,
}

impl SessionRuntime {
    /// Creates a runtime in the `NotStarted` state.
    pub fn new(services: Services) -> Self {
        Self {
            services,
            beep_start_seconds: DEFAULT_BEEP_START_SECONDS,
            goal_override: None,
            state: SessionState::NotStarted,
            execution_id: None,
            sequence_id: String::new(),
            goal: Goal::default(),
            available_modifiers: Vec::new(),
            modifier_catalog: Vec::new(),
            bouts: Arc::new(Vec::new()),
            groups: Arc::new(Vec::new()),
            cursor: 0,
            completed_log: Arc::new(Vec::new()),
            active_modifiers: ActiveSet::new(),
            clock: None,
            closed_pause: Duration::zero(),
            cues: CueTracker::new(),
            timeline: None,
            version: 0,
            unpersisted: HashSet::new(),
            pending_flush: None,
            rating_submitted: false,
        }
    }

    pub fn with_beep_start_seconds(mut self, seconds: u32) -> Self {
        self.beep_start_seconds = seconds;
        self
    }

    /// Overrides the sequence's authored goal for this session.
    pub fn with_goal_override(mut self, goal: Option<Goal>) -> Self {
        self.goal_override = goal;
        self
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts a session for `sequence_id`.
    ///
    /// Fails with `NotFound` or `Unauthorized` if the sequence cannot be
    /// read, `InvalidSequence` if it has nothing to run, and with the
    /// store's error if no execution record can be created. Calling it
    /// on a started session is a no-op.
    pub fn start(&mut self, sequence_id: &str, now: DateTime<Utc>) -> Result<Outcome> {
        if self.state != SessionState::NotStarted {
            debug!("start ignored: session already {:?}", self.state);
            return Ok(Outcome::Ignored);
        }

        let mut sequence = self.services.sequences.get_sequence(sequence_id)?;
        validate_sequence(&mut sequence)?;

        let modifier_catalog = self.services.modifiers.list_modifiers().unwrap_or_else(|e| {
            warn!("Modifier catalog unavailable, recording modifiers without values: {}", e);
            Vec::new()
        });

        let execution_id = self.services.executions.start_execution(sequence_id)?;

        self.goal = self.goal_override.unwrap_or(sequence.goal);
        self.sequence_id = sequence.id.clone();
        self.available_modifiers = sequence.available_modifiers;
        self.modifier_catalog = modifier_catalog;
        self.bouts = Arc::new(sequence.bouts);
        self.groups = Arc::new(sequence.groups);
        self.cursor = 0;
        self.completed_log = Arc::new(Vec::new());
        self.closed_pause = Duration::zero();
        self.unpersisted.clear();
        self.pending_flush = None;
        self.timeline = Some(SessionTimeline::new(now));
        self.execution_id = Some(execution_id.clone());

        info!(
            "Started execution {} of '{}': {} bouts, goal {}",
            execution_id,
            self.sequence_id,
            self.bouts.len(),
            self.goal
        );

        self.begin_bout(now, EventType::Started);
        Ok(Outcome::Applied)
    }

    /// Pauses the running session. No-op unless running.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Outcome {
        if self.state != SessionState::Running {
            debug!("pause ignored in state {:?}", self.state);
            return Outcome::Ignored;
        }
        if let Some(clock) = self.clock.as_mut() {
            clock.pause(now);
        }
        self.state = SessionState::Paused;
        self.record(EventType::Paused, now);
        self.bump();
        Outcome::Applied
    }

    /// Resumes a paused session. No-op unless paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Outcome {
        if self.state != SessionState::Paused {
            debug!("resume ignored in state {:?}", self.state);
            return Outcome::Ignored;
        }
        if let Some(clock) = self.clock.as_mut() {
            clock.resume(now);
        }
        self.state = SessionState::Running;
        self.record(EventType::Resumed, now);
        self.bump();
        Outcome::Applied
    }

    /// Completes the current bout and advances.
    ///
    /// `value` defaults to the elapsed seconds for timed bouts; repetition
    /// bouts record only an explicit count. Completing the last bout ends
    /// the session and flushes the log; a flush failure is returned as
    /// `PersistenceFailure` with the session already `Completed`.
    pub fn complete(&mut self, now: DateTime<Utc>, value: Option<u32>) -> Result<Outcome> {
        self.advance(now, value, false)
    }

    /// Skips the current bout. Like `complete`, without value or modifiers.
    pub fn skip(&mut self, now: DateTime<Utc>) -> Result<Outcome> {
        self.advance(now, None, true)
    }

    /// Returns to the previous bout, discarding its log entry.
    ///
    /// One level per call; calling repeatedly walks further back.
    pub fn go_back(&mut self, now: DateTime<Utc>) -> Outcome {
        if !self.state.is_active() || self.cursor == 0 {
            debug!("go_back ignored at cursor {} in state {:?}", self.cursor, self.state);
            return Outcome::Ignored;
        }

        Arc::make_mut(&mut self.completed_log).pop();
        self.cursor -= 1;
        self.close_bout_clock(now);
        self.begin_bout(now, EventType::Reverted);

        debug!("Went back to bout {}", self.cursor + 1);
        Outcome::Applied
    }

    /// Toggles an available modifier for the bout in progress.
    pub fn toggle_modifier(&mut self, modifier_id: &str) -> Outcome {
        let Some(bout) = self.current_bout() else {
            debug!("toggle_modifier ignored: no bout in progress");
            return Outcome::Ignored;
        };
        if bout.is_break() || !self.available_modifiers.iter().any(|m| m == modifier_id) {
            debug!("toggle_modifier ignored for '{}' on '{}'", modifier_id, bout.label());
            return Outcome::Ignored;
        }

        self.active_modifiers = modifiers::toggle(&self.active_modifiers, modifier_id);
        self.bump();
        Outcome::Applied
    }

    /// Inserts a bout right after the cursor.
    ///
    /// Never moves the cursor or touches the log. With `persist`, the
    /// entire session-local list overwrites the authored list. A
    /// persistence failure is returned but the local insertion stays.
    pub fn insert_bout(&mut self, mut bout: Bout, persist: bool) -> Result<Outcome> {
        if !self.state.is_active() {
            debug!("insert_bout ignored in state {:?}", self.state);
            return Ok(Outcome::Ignored);
        }

        if bout.id.is_empty() || self.bouts.iter().any(|b| b.id == bout.id) {
            bout.id = BoutId::generate();
        }

        let position = self.cursor + 1;
        info!("Inserting '{}' ({}) at position {}", bout.label(), bout.config, position + 1);
        self.unpersisted.insert(bout.id.clone());
        Arc::make_mut(&mut self.bouts).insert(position, bout);
        self.bump();

        if persist {
            self.persist_bouts()?;
        }
        Ok(Outcome::Applied)
    }

    /// Indices a configuration edit on `target_index` would touch.
    pub fn preview_scope(&self, target_index: usize, scope: Scope) -> Vec<usize> {
        resolve(&self.bouts, &self.groups, target_index, scope, self.completed_log.len())
    }

    /// Applies `config` to every bout the scope resolves to.
    ///
    /// Completed bouts are never edited. Returns the edited indices.
    pub fn update_config(
        &mut self,
        target_index: usize,
        scope: Scope,
        config: BoutConfig,
        persist: bool,
    ) -> Result<Vec<usize>> {
        if !self.state.is_active() {
            debug!("update_config ignored in state {:?}", self.state);
            return Ok(Vec::new());
        }

        let indices = self.preview_scope(target_index, scope);
        if indices.is_empty() {
            return Ok(indices);
        }

        let bouts = Arc::make_mut(&mut self.bouts);
        for &index in &indices {
            bouts[index].config = config;
            self.unpersisted.insert(bouts[index].id.clone());
        }
        if indices.contains(&self.cursor) {
            self.cues.reset();
        }
        self.bump();
        info!("Applied {} to {} bouts ({})", config, indices.len(), scope);

        if persist {
            self.persist_bouts()?;
        }
        Ok(indices)
    }

    /// Ends the session early, flushing completed work.
    pub fn quit(&mut self, now: DateTime<Utc>) -> Result<Outcome> {
        if !self.state.is_active() {
            debug!("quit ignored in state {:?}", self.state);
            return Ok(Outcome::Ignored);
        }

        self.close_bout_clock(now);
        self.state = SessionState::Quit;
        self.record(EventType::Quit, now);
        self.bump();

        info!("Session quit after {} of {} bouts", self.cursor, self.bouts.len());
        self.flush_update(None)?;
        Ok(Outcome::Finished)
    }

    /// Submits a rating, ending the session first if it is still active.
    ///
    /// Personal-record detection is performed by the rating service.
    pub fn finish(&mut self, now: DateTime<Utc>, rating: u8, feedback: Option<&str>) -> Result<RatingOutcome> {
        if self.rating_submitted || matches!(self.state, SessionState::NotStarted | SessionState::Quit) {
            debug!("finish ignored in state {:?}", self.state);
            return Ok(RatingOutcome::Ignored);
        }

        if self.state.is_active() {
            self.close_bout_clock(now);
            self.state = SessionState::Completed;
            self.bump();
            self.flush_update(Some(now))?;
        } else {
            self.flush()?;
        }

        let Some(execution_id) = self.execution_id.clone() else {
            return Ok(RatingOutcome::Ignored);
        };

        let rating = rating.clamp(1, 5);
        let personal_records = self.services.ratings.submit_rating(&execution_id, rating, feedback)?;
        self.rating_submitted = true;

        info!(
            "Rated execution {} at {} ({} personal records)",
            execution_id,
            rating,
            personal_records.len()
        );
        Ok(RatingOutcome::Submitted { personal_records })
    }

    /// Retries a flush that previously failed. No-op if nothing is pending.
    pub fn flush(&mut self) -> Result<()> {
        match self.pending_flush.take() {
            Some(update) => self.send_flush(update),
            None => Ok(()),
        }
    }

    /// Applies a guarded UI command.
    pub fn dispatch(&mut self, command: SessionCommand, now: DateTime<Utc>) -> Result<Outcome> {
        match command {
            SessionCommand::Pause => Ok(self.pause(now)),
            SessionCommand::Resume => Ok(self.resume(now)),
            SessionCommand::Complete { expected_cursor, value } => {
                if !self.cursor_matches(expected_cursor) {
                    return Ok(Outcome::Ignored);
                }
                self.complete(now, value)
            }
            SessionCommand::Skip { expected_cursor } => {
                if !self.cursor_matches(expected_cursor) {
                    return Ok(Outcome::Ignored);
                }
                self.skip(now)
            }
            SessionCommand::GoBack { expected_cursor } => {
                if !self.cursor_matches(expected_cursor) {
                    return Ok(Outcome::Ignored);
                }
                Ok(self.go_back(now))
            }
            SessionCommand::ToggleModifier(modifier_id) => Ok(self.toggle_modifier(&modifier_id)),
            SessionCommand::InsertBout { bout, persist } => self.insert_bout(bout, persist),
            SessionCommand::UpdateConfig {
                target_index,
                scope,
                config,
                persist,
            } => {
                let indices = self.update_config(target_index, scope, config, persist)?;
                Ok(if indices.is_empty() { Outcome::Ignored } else { Outcome::Applied })
            }
            SessionCommand::Quit => self.quit(now),
        }
    }

    /// Evaluates the clock against the auto-advance policy.
    ///
    /// Returns `None` unless the session is running. A strict timed bout
    /// that reaches its target is completed with its target as value.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Option<TickReport>> {
        if self.state != SessionState::Running {
            return Ok(None);
        }
        let Some(bout) = self.bouts.get(self.cursor) else {
            return Ok(None);
        };
        let config = bout.config;

        let elapsed_seconds = self.elapsed_seconds(now);
        let mut report = TickReport {
            index: self.cursor,
            elapsed_seconds,
            remaining_seconds: remaining_seconds(&config, elapsed_seconds),
            cue: self.cues.check(self.beep_start_seconds, &config, elapsed_seconds),
            ..TickReport::default()
        };

        if self.goal == Goal::Elastic {
            report.target_reached = self.cues.check_target_reached(&config, elapsed_seconds);
        }

        if should_advance(self.goal, config.measure, config.target_value, elapsed_seconds) {
            debug!("Auto-advancing bout {} at {}s", self.cursor + 1, elapsed_seconds);
            report.auto_advanced = true;
            report.finished = self.complete(now, config.target_value)? == Outcome::Finished;
        }

        Ok(Some(report))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Increments on every applied change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn goal(&self) -> Goal {
        self.goal
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.execution_id.as_deref()
    }

    pub fn sequence_id(&self) -> &str {
        &self.sequence_id
    }

    pub fn bouts(&self) -> &[Bout] {
        &self.bouts
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn completed_log(&self) -> &[CompletedBout] {
        &self.completed_log
    }

    pub fn active_modifiers(&self) -> &ActiveSet {
        &self.active_modifiers
    }

    pub fn timeline(&self) -> Option<&SessionTimeline> {
        self.timeline.as_ref()
    }

    /// The bout in progress, if the session is active.
    pub fn current_bout(&self) -> Option<&Bout> {
        if self.state.is_active() {
            self.bouts.get(self.cursor)
        } else {
            None
        }
    }

    /// Active seconds of the bout in progress.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u32 {
        self.clock.as_ref().map_or(0, |c| c.elapsed_seconds(now))
    }

    /// Pause time across the session so far, including an open pause.
    pub fn total_pause(&self, now: DateTime<Utc>) -> Duration {
        let current = self.clock.as_ref().map_or(Duration::zero(), |clock| {
            let mut probe = clock.clone();
            probe.resume(now);
            probe.total_pause()
        });
        self.closed_pause + current
    }

    /// True if local edits have not been written to the sequence store.
    pub fn has_unsaved_changes(&self) -> bool {
        !self.unpersisted.is_empty()
    }

    /// True if an end-of-session flush failed and awaits `flush()`.
    pub fn has_pending_flush(&self) -> bool {
        self.pending_flush.is_some()
    }

    /// Immutable view for presenters.
    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        SessionSnapshot {
            execution_id: self.execution_id.clone(),
            state: self.state,
            goal: self.goal,
            cursor: self.cursor,
            version: self.version,
            bouts: Arc::clone(&self.bouts),
            completed_log: Arc::clone(&self.completed_log),
            active_modifiers: self.active_modifiers.clone(),
            elapsed_seconds: self.elapsed_seconds(now),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn bump(&mut self) {
        self.version += 1;
    }

    fn cursor_matches(&self, expected: Option<usize>) -> bool {
        match expected {
            Some(expected) if expected != self.cursor => {
                debug!("Stale command for cursor {} ignored (now {})", expected, self.cursor);
                false
            }
            _ => true,
        }
    }

    fn record(&mut self, event_type: EventType, at: DateTime<Utc>) {
        let label = self.bouts.get(self.cursor).map_or("-", |b| b.label()).to_string();
        if let Some(timeline) = self.timeline.as_mut() {
            timeline.add_event(self.cursor, label, event_type, at);
        }
    }

    /// Folds the current bout's pause time into the session total.
    fn close_bout_clock(&mut self, now: DateTime<Utc>) {
        if let Some(clock) = self.clock.as_mut() {
            self.closed_pause = self.closed_pause + clock.restart(now);
        }
    }

    /// Makes the bout at the cursor current and running.
    fn begin_bout(&mut self, now: DateTime<Utc>, event_type: EventType) {
        self.clock = Some(ExecutionClock::start(now));
        self.cues.reset();
        self.active_modifiers = self
            .bouts
            .get(self.cursor)
            .map(|bout| modifiers::initialize(bout, &self.available_modifiers))
            .unwrap_or_default();
        self.state = SessionState::Running;
        self.record(event_type, now);
        self.bump();
    }

    fn advance(&mut self, now: DateTime<Utc>, value: Option<u32>, skipped: bool) -> Result<Outcome> {
        if !self.state.is_active() {
            debug!("advance ignored in state {:?}", self.state);
            return Ok(Outcome::Ignored);
        }
        let Some(bout) = self.bouts.get(self.cursor).cloned() else {
            return Ok(Outcome::Ignored);
        };

        let (started_at, elapsed_seconds) = match self.clock.as_ref() {
            Some(clock) => (clock.started_at(), clock.elapsed_seconds(now)),
            None => (now, 0),
        };

        let (value, active_modifiers) = if skipped {
            (None, None)
        } else {
            let value = match bout.config.measure {
                Measure::Time => value.or(Some(elapsed_seconds)),
                Measure::Repetitions => value,
            };
            let records = modifiers::to_records(&self.active_modifiers, &self.modifier_catalog);
            let active = if bout.is_break() || records.is_empty() { None } else { Some(records) };
            (value, active)
        };

        let entry = CompletedBout {
            bout_id: bout.id.clone(),
            bout,
            started_at,
            completed_at: now,
            value,
            skipped,
            active_modifiers,
        };
        Arc::make_mut(&mut self.completed_log).push(entry);

        self.record(if skipped { EventType::Skipped } else { EventType::Completed }, now);
        self.close_bout_clock(now);
        self.cursor += 1;
        debug_assert_eq!(self.completed_log.len(), self.cursor);

        if self.cursor < self.bouts.len() {
            self.begin_bout(now, EventType::Started);
            return Ok(Outcome::Applied);
        }

        self.state = SessionState::Completed;
        self.bump();
        info!("Session completed: {} bouts", self.completed_log.len());

        self.flush_update(Some(now))?;
        Ok(Outcome::Finished)
    }

    fn flush_update(&mut self, completed_at: Option<DateTime<Utc>>) -> Result<()> {
        let update = ExecutionUpdate {
            completed_log: self.completed_log.to_vec(),
            total_pause_ms: self.closed_pause.num_milliseconds(),
            completed_at,
        };
        self.send_flush(update)
    }

    fn send_flush(&mut self, update: ExecutionUpdate) -> Result<()> {
        let Some(execution_id) = self.execution_id.clone() else {
            return Ok(());
        };

        match self.services.executions.update_execution(&execution_id, &update) {
            Ok(()) => {
                info!("Flushed {} completed bouts for {}", update.completed_log.len(), execution_id);
                self.pending_flush = None;
                Ok(())
            }
            Err(e) => {
                warn!("Flush of execution {} failed, keeping log for retry: {}", execution_id, e);
                self.pending_flush = Some(update);
                Err(into_persistence_failure(e))
            }
        }
    }

    fn persist_bouts(&mut self) -> Result<()> {
        let others = self.unpersisted.len().saturating_sub(1);
        if others > 0 {
            info!("Saving sequence also promotes {} other local changes", others);
        }

        let update = SequenceUpdate {
            bouts: Some(self.bouts.to_vec()),
            ..SequenceUpdate::default()
        };

        match self.services.sequences.update_sequence(&self.sequence_id, update) {
            Ok(()) => {
                self.unpersisted.clear();
                Ok(())
            }
            Err(e) => {
                warn!("Saving sequence '{}' failed, continuing locally: {}", self.sequence_id, e);
                Err(into_persistence_failure(e))
            }
        }
    }
}

fn into_persistence_failure(e: EngineError) -> EngineError {
    match e {
        EngineError::PersistenceFailure(_) => e,
        other => EngineError::PersistenceFailure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{ModifierEffect, Sequence};
    use crate::store::InMemoryStore;
    use chrono::TimeZone;

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn sequence(goal: Goal) -> Sequence {
        Sequence::new("circuit")
            .with_goal(goal)
            .with_available_modifier("vest")
            .with_bout(
                Bout::exercise("ex1", BoutConfig::time(30))
                    .with_id("a")
                    .with_modifier("vest", ModifierEffect::Harder),
            )
            .with_bout(Bout::rest(BoutConfig::time(10)).with_id("b"))
            .with_bout(Bout::exercise("ex1", BoutConfig::time(30)).with_id("c"))
    }

    fn runtime(goal: Goal) -> (Arc<InMemoryStore>, SessionRuntime) {
        let store = Arc::new(
            InMemoryStore::new()
                .with_sequence(sequence(goal))
                .with_modifiers(vec![Modifier {
                    id: "vest".to_string(),
                    name: "Weight vest".to_string(),
                    value: Some(10.0),
                    unit: Some("kg".to_string()),
                }]),
        );
        let mut runtime = SessionRuntime::new(Services::in_memory(store.clone()));
        runtime.start("circuit", t(0)).unwrap();
        (store, runtime)
    }

    #[test]
    fn test_start_initializes_state() {
        let (store, runtime) = runtime(Goal::Strict);

        assert_eq!(runtime.state(), SessionState::Running);
        assert_eq!(runtime.cursor(), 0);
        assert!(runtime.completed_log().is_empty());
        assert!(runtime.active_modifiers().contains("vest"));
        let id = runtime.execution_id().unwrap();
        assert!(store.execution(id).is_some());
    }

    #[test]
    fn test_start_missing_sequence() {
        let store = Arc::new(InMemoryStore::new());
        let mut runtime = SessionRuntime::new(Services::in_memory(store));

        let result = runtime.start("nope", t(0));
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
        assert_eq!(runtime.state(), SessionState::NotStarted);
    }

    #[test]
    fn test_start_unauthorized() {
        let store = Arc::new(InMemoryStore::new().with_sequence(sequence(Goal::Strict)));
        store.deny("circuit");
        let mut runtime = SessionRuntime::new(Services::in_memory(store));

        assert!(matches!(runtime.start("circuit", t(0)), Err(EngineError::Unauthorized(_))));
    }

    #[test]
    fn test_start_twice_is_noop() {
        let (_, mut runtime) = runtime(Goal::Strict);
        assert_eq!(runtime.start("circuit", t(5)).unwrap(), Outcome::Ignored);
    }

    #[test]
    fn test_goal_override() {
        let store = Arc::new(InMemoryStore::new().with_sequence(sequence(Goal::Strict)));
        let mut runtime =
            SessionRuntime::new(Services::in_memory(store)).with_goal_override(Some(Goal::Elastic));
        runtime.start("circuit", t(0)).unwrap();
        assert_eq!(runtime.goal(), Goal::Elastic);
    }

    #[test]
    fn test_complete_records_elapsed_and_modifiers() {
        let (_, mut runtime) = runtime(Goal::Elastic);

        assert_eq!(runtime.complete(t(28), None).unwrap(), Outcome::Applied);

        let entry = &runtime.completed_log()[0];
        assert_eq!(entry.value, Some(28));
        assert!(!entry.skipped);
        let modifiers = entry.active_modifiers.as_ref().unwrap();
        assert_eq!(modifiers[0].value, Some(10.0));
        assert_eq!(runtime.cursor(), 1);
        // Modifiers reset for the break
        assert!(runtime.active_modifiers().is_empty());
    }

    #[test]
    fn test_skip_omits_value_and_modifiers() {
        let (_, mut runtime) = runtime(Goal::Elastic);
        runtime.skip(t(5)).unwrap();

        let entry = &runtime.completed_log()[0];
        assert!(entry.skipped);
        assert_eq!(entry.value, None);
        assert_eq!(entry.active_modifiers, None);
    }

    #[test]
    fn test_toggled_off_modifier_not_recorded() {
        let (_, mut runtime) = runtime(Goal::Elastic);
        assert_eq!(runtime.toggle_modifier("vest"), Outcome::Applied);
        runtime.complete(t(10), None).unwrap();
        assert_eq!(runtime.completed_log()[0].active_modifiers, None);
    }

    #[test]
    fn test_toggle_rules() {
        let (_, mut runtime) = runtime(Goal::Elastic);
        assert_eq!(runtime.toggle_modifier("belt"), Outcome::Ignored);

        runtime.complete(t(10), None).unwrap();
        // Breaks carry no modifiers
        assert_eq!(runtime.toggle_modifier("vest"), Outcome::Ignored);
    }

    #[test]
    fn test_completing_last_bout_flushes() {
        let (store, mut runtime) = runtime(Goal::Elastic);
        runtime.complete(t(30), None).unwrap();
        runtime.complete(t(40), None).unwrap();
        assert_eq!(runtime.complete(t(70), None).unwrap(), Outcome::Finished);

        assert_eq!(runtime.state(), SessionState::Completed);
        assert!(runtime.current_bout().is_none());
        let record = store.execution(runtime.execution_id().unwrap()).unwrap();
        assert_eq!(record.completed_log.len(), 3);
        assert_eq!(record.completed_at, Some(t(70)));
    }

    #[test]
    fn test_go_back() {
        let (_, mut runtime) = runtime(Goal::Elastic);
        assert_eq!(runtime.go_back(t(1)), Outcome::Ignored);

        runtime.complete(t(30), None).unwrap();
        runtime.complete(t(40), None).unwrap();
        assert_eq!(runtime.go_back(t(45)), Outcome::Applied);
        assert_eq!(runtime.cursor(), 1);
        assert_eq!(runtime.completed_log().len(), 1);
        assert_eq!(runtime.elapsed_seconds(t(50)), 5);

        assert_eq!(runtime.go_back(t(50)), Outcome::Applied);
        assert_eq!(runtime.cursor(), 0);
        // Modifiers re-initialized for the first bout
        assert!(runtime.active_modifiers().contains("vest"));
    }

    #[test]
    fn test_pause_and_resume() {
        let (_, mut runtime) = runtime(Goal::Elastic);

        assert_eq!(runtime.pause(t(10)), Outcome::Applied);
        let version = runtime.version();
        assert_eq!(runtime.pause(t(12)), Outcome::Ignored);
        assert_eq!(runtime.version(), version);
        assert_eq!(runtime.elapsed_seconds(t(60)), 10);

        assert_eq!(runtime.resume(t(20)), Outcome::Applied);
        assert_eq!(runtime.resume(t(21)), Outcome::Ignored);
        assert_eq!(runtime.elapsed_seconds(t(25)), 15);
        assert_eq!(runtime.total_pause(t(25)), Duration::seconds(10));
    }

    #[test]
    fn test_complete_while_paused_resumes_next_bout() {
        let (store, mut runtime) = runtime(Goal::Elastic);
        runtime.pause(t(10));
        runtime.complete(t(20), None).unwrap();

        assert_eq!(runtime.state(), SessionState::Running);
        assert_eq!(runtime.completed_log()[0].value, Some(10));

        runtime.quit(t(25)).unwrap();
        let record = store.execution(runtime.execution_id().unwrap()).unwrap();
        assert_eq!(record.total_pause_ms, 10_000);
    }

    #[test]
    fn test_strict_tick_auto_advances() {
        let (_, mut runtime) = runtime(Goal::Strict);

        let report = runtime.tick(t(29)).unwrap().unwrap();
        assert!(!report.auto_advanced);
        assert_eq!(report.remaining_seconds, Some(1));

        let report = runtime.tick(t(30)).unwrap().unwrap();
        assert!(report.auto_advanced);
        assert_eq!(runtime.cursor(), 1);
        assert_eq!(runtime.completed_log()[0].value, Some(30));
    }

    #[test]
    fn test_elastic_tick_never_advances() {
        let (_, mut runtime) = runtime(Goal::Elastic);

        let report = runtime.tick(t(30)).unwrap().unwrap();
        assert!(!report.auto_advanced);
        assert!(report.target_reached);

        let report = runtime.tick(t(90)).unwrap().unwrap();
        assert!(!report.target_reached);
        assert_eq!(runtime.cursor(), 0);
    }

    #[test]
    fn test_tick_cues_once_per_second() {
        let (_, mut runtime) = runtime(Goal::Strict);

        assert_eq!(runtime.tick(t(26)).unwrap().unwrap().cue, None);
        assert_eq!(runtime.tick(t(27)).unwrap().unwrap().cue, Some(3));
        let half = t(27) + Duration::milliseconds(500);
        assert_eq!(runtime.tick(half).unwrap().unwrap().cue, None);
        assert_eq!(runtime.tick(t(28)).unwrap().unwrap().cue, Some(2));
    }

    #[test]
    fn test_tick_suspended_while_paused() {
        let (_, mut runtime) = runtime(Goal::Strict);
        runtime.pause(t(5));
        assert!(runtime.tick(t(100)).unwrap().is_none());
        assert_eq!(runtime.cursor(), 0);
    }

    #[test]
    fn test_strict_tick_finishes_session() {
        let store = Arc::new(InMemoryStore::new().with_sequence(
            Sequence::new("one")
                .with_goal(Goal::Strict)
                .with_bout(Bout::rest(BoutConfig::time(5)).with_id("r")),
        ));
        let mut runtime = SessionRuntime::new(Services::in_memory(store));
        runtime.start("one", t(0)).unwrap();

        let report = runtime.tick(t(5)).unwrap().unwrap();
        assert!(report.finished);
        assert_eq!(runtime.state(), SessionState::Completed);
        assert!(runtime.tick(t(6)).unwrap().is_none());
    }

    #[test]
    fn test_stale_guard_rejects_double_tap() {
        let (_, mut runtime) = runtime(Goal::Elastic);
        let tap = SessionCommand::Complete {
            expected_cursor: Some(0),
            value: None,
        };

        assert_eq!(runtime.dispatch(tap.clone(), t(10)).unwrap(), Outcome::Applied);
        assert_eq!(runtime.dispatch(tap, t(10)).unwrap(), Outcome::Ignored);
        assert_eq!(runtime.cursor(), 1);

        let back = SessionCommand::GoBack { expected_cursor: Some(0) };
        assert_eq!(runtime.dispatch(back, t(11)).unwrap(), Outcome::Ignored);
    }

    #[test]
    fn test_insert_bout_after_cursor() {
        let (store, mut runtime) = runtime(Goal::Elastic);
        runtime.complete(t(10), None).unwrap();

        let outcome = runtime
            .insert_bout(Bout::exercise("ex9", BoutConfig::reps(5)), false)
            .unwrap();
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(runtime.bouts()[2].exercise_id(), Some("ex9"));
        assert!(!runtime.bouts()[2].id.is_empty());
        assert_eq!(runtime.cursor(), 1);
        assert!(runtime.has_unsaved_changes());
        assert_eq!(store.sequence_write_count(), 0);
    }

    #[test]
    fn test_insert_bout_persist() {
        let (store, mut runtime) = runtime(Goal::Elastic);
        runtime
            .insert_bout(Bout::exercise("ex9", BoutConfig::reps(5)), false)
            .unwrap();
        runtime
            .insert_bout(Bout::rest(BoutConfig::time(15)), true)
            .unwrap();

        // The whole local list, including the earlier local insert, is saved
        let stored = store.sequence("circuit").unwrap();
        assert_eq!(stored.len(), 5);
        assert!(!runtime.has_unsaved_changes());
    }

    #[test]
    fn test_insert_bout_persist_failure_keeps_local_copy() {
        let (store, mut runtime) = runtime(Goal::Elastic);
        store.set_fail_writes(true);

        let result = runtime.insert_bout(Bout::rest(BoutConfig::time(15)), true);
        assert!(matches!(result, Err(EngineError::PersistenceFailure(_))));
        assert_eq!(runtime.bouts().len(), 4);
        assert_eq!(store.sequence("circuit").unwrap().len(), 3);
        assert!(runtime.has_unsaved_changes());
    }

    #[test]
    fn test_insert_duplicate_id_retagged() {
        let (_, mut runtime) = runtime(Goal::Elastic);
        runtime
            .insert_bout(Bout::rest(BoutConfig::time(15)).with_id("a"), false)
            .unwrap();
        assert_ne!(runtime.bouts()[1].id.as_str(), "a");
    }

    #[test]
    fn test_update_config_skips_history() {
        let (_, mut runtime) = runtime(Goal::Elastic);
        runtime.complete(t(30), None).unwrap();

        let edited = runtime
            .update_config(0, Scope::AllInSequence, BoutConfig::time(45), false)
            .unwrap();
        assert_eq!(edited, vec![2]);
        assert_eq!(runtime.bouts()[0].config, BoutConfig::time(30));
        assert_eq!(runtime.bouts()[2].config, BoutConfig::time(45));
        // The log keeps what was actually performed
        assert_eq!(runtime.completed_log()[0].bout.config, BoutConfig::time(30));
    }

    #[test]
    fn test_update_config_persist() {
        let (store, mut runtime) = runtime(Goal::Elastic);
        runtime
            .update_config(1, Scope::ThisOnly, BoutConfig::time(20), true)
            .unwrap();
        assert_eq!(store.sequence("circuit").unwrap().bouts[1].config, BoutConfig::time(20));
    }

    #[test]
    fn test_quit_flushes_without_completion_time() {
        let (store, mut runtime) = runtime(Goal::Elastic);
        runtime.complete(t(10), None).unwrap();
        runtime.skip(t(12)).unwrap();

        assert_eq!(runtime.quit(t(15)).unwrap(), Outcome::Finished);
        assert_eq!(runtime.quit(t(16)).unwrap(), Outcome::Ignored);

        let record = store.execution(runtime.execution_id().unwrap()).unwrap();
        assert_eq!(record.completed_log.len(), 2);
        assert_eq!(record.completed_at, None);
    }

    #[test]
    fn test_flush_failure_retained_for_retry() {
        let (store, mut runtime) = runtime(Goal::Elastic);
        runtime.complete(t(10), None).unwrap();
        store.set_fail_writes(true);

        assert!(runtime.quit(t(12)).is_err());
        assert_eq!(runtime.state(), SessionState::Quit);
        assert!(runtime.has_pending_flush());
        assert_eq!(runtime.completed_log().len(), 1);

        store.set_fail_writes(false);
        runtime.flush().unwrap();
        assert!(!runtime.has_pending_flush());
        let record = store.execution(runtime.execution_id().unwrap()).unwrap();
        assert_eq!(record.completed_log.len(), 1);
    }

    #[test]
    fn test_finish_submits_rating() {
        let (store, mut runtime) = runtime(Goal::Elastic);
        runtime.complete(t(30), None).unwrap();
        runtime.complete(t(40), None).unwrap();
        runtime.complete(t(70), None).unwrap();

        let outcome = runtime.finish(t(80), 9, Some("great")).unwrap();
        let RatingOutcome::Submitted { personal_records } = outcome else {
            panic!("rating should be submitted");
        };
        assert_eq!(personal_records.len(), 1);
        assert_eq!(personal_records[0].value, 30);

        let record = store.execution(runtime.execution_id().unwrap()).unwrap();
        assert_eq!(record.rating, Some(5));
        assert_eq!(runtime.finish(t(81), 3, None).unwrap(), RatingOutcome::Ignored);
    }

    #[test]
    fn test_finish_early_completes_session() {
        let (store, mut runtime) = runtime(Goal::Elastic);
        runtime.complete(t(30), None).unwrap();

        runtime.finish(t(35), 4, None).unwrap();
        assert_eq!(runtime.state(), SessionState::Completed);
        let record = store.execution(runtime.execution_id().unwrap()).unwrap();
        assert_eq!(record.completed_log.len(), 1);
        assert_eq!(record.completed_at, Some(t(35)));
    }

    #[test]
    fn test_finish_after_quit_ignored() {
        let (_, mut runtime) = runtime(Goal::Elastic);
        runtime.quit(t(5)).unwrap();
        assert_eq!(runtime.finish(t(6), 4, None).unwrap(), RatingOutcome::Ignored);
    }

    #[test]
    fn test_snapshot_is_copy_on_write() {
        let (_, mut runtime) = runtime(Goal::Elastic);
        let before = runtime.snapshot(t(1));

        runtime.insert_bout(Bout::rest(BoutConfig::time(5)), false).unwrap();
        runtime.complete(t(10), None).unwrap();

        assert_eq!(before.bouts.len(), 3);
        assert!(before.completed_log.is_empty());
        assert_eq!(before.current_bout().unwrap().id.as_str(), "a");

        let after = runtime.snapshot(t(10));
        assert_eq!(after.bouts.len(), 4);
        assert_eq!(after.completed_log.len(), 1);
        assert!(after.version > before.version);
    }

    #[test]
    fn test_illegal_calls_before_start() {
        let store = Arc::new(InMemoryStore::new());
        let mut runtime = SessionRuntime::new(Services::in_memory(store));

        assert_eq!(runtime.pause(t(0)), Outcome::Ignored);
        assert_eq!(runtime.complete(t(0), None).unwrap(), Outcome::Ignored);
        assert_eq!(runtime.go_back(t(0)), Outcome::Ignored);
        assert_eq!(runtime.quit(t(0)).unwrap(), Outcome::Ignored);
        assert!(runtime.tick(t(0)).unwrap().is_none());
        assert!(runtime.current_bout().is_none());
    }
}
