//! Sequence Data Model
//!
//! Core data structures representing an authored workout sequence and its
//! bouts, groups and modifier assignments.
//!
//! # Example YAML Format
//!
//! ```yaml
//! id: morning
//! name: Morning circuit
//! goal: strict
//! available_modifiers: [vest]
//! bouts:
//!   - id: pushups
//!     type: exercise
//!     exercise_id: pushup
//!     config: { measure: repetitions, target_value: 15 }
//!     modifiers:
//!       - { modifier_id: vest, effect: harder }
//!   - type: break
//!     config: { measure: time, target_value: 30 }
//! groups:
//!   - name: Warmup
//!     bouts: [pushups]
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque exercise identity, owned by the exercise catalog.
pub type ExerciseId = String;

/// Opaque modifier identity, owned by the modifier catalog.
pub type ModifierId = String;

/// Stable identifier of a bout within a sequence or session.
///
/// Distinct from the exercise identity: the same exercise may appear in
/// several bouts of a sequence.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct BoutId(String);

impl BoutId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BoutId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// What a bout's target value counts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    /// Target is a duration in seconds
    Time,
    /// Target is a repetition count
    #[serde(alias = "reps")]
    Repetitions,
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Time => write!(f, "time"),
            Self::Repetitions => write!(f, "reps"),
        }
    }
}

impl FromStr for Measure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "time" | "t" => Ok(Self::Time),
            "reps" | "repetitions" | "r" => Ok(Self::Repetitions),
            other => Err(format!("Unknown measure: {}", other)),
        }
    }
}

/// Measure and optional target of a bout.
///
/// The target is unsigned, so a negative target cannot be expressed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoutConfig {
    pub measure: Measure,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_value: Option<u32>,
}

impl BoutConfig {
    /// A timed bout lasting `seconds`.
    pub fn time(seconds: u32) -> Self {
        Self {
            measure: Measure::Time,
            target_value: Some(seconds),
        }
    }

    /// A repetition bout with a target count.
    pub fn reps(count: u32) -> Self {
        Self {
            measure: Measure::Repetitions,
            target_value: Some(count),
        }
    }

    /// A bout with no target (open-ended).
    pub fn open(measure: Measure) -> Self {
        Self {
            measure,
            target_value: None,
        }
    }
}

impl fmt::Display for BoutConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.measure, self.target_value) {
            (Measure::Time, Some(v)) => write!(f, "{}s", v),
            (Measure::Repetitions, Some(v)) => write!(f, "{} reps", v),
            (measure, None) => write!(f, "open {}", measure),
        }
    }
}

/// Authored intent of an equipment modifier on a bout.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModifierEffect {
    Easier,
    Harder,
    #[default]
    Neutral,
}

/// A modifier assigned to an exercise bout by its author.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ModifierAssignment {
    pub modifier_id: ModifierId,

    #[serde(default)]
    pub effect: ModifierEffect,
}

/// Exercise or rest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BoutKind {
    Exercise {
        exercise_id: ExerciseId,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        modifiers: Vec<ModifierAssignment>,
    },
    Break,
}

/// One scheduled unit of a sequence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Bout {
    /// Stable identifier; tagged with a fresh id when left empty
    #[serde(default, skip_serializing_if = "BoutId::is_empty")]
    pub id: BoutId,

    #[serde(flatten)]
    pub kind: BoutKind,

    pub config: BoutConfig,
}

impl Bout {
    /// Creates an exercise bout.
    ///
    /// # Example
    ///
    /// ```
    /// use boutrunner::sequence::{Bout, BoutConfig, ModifierEffect};
    ///
    /// let bout = Bout::exercise("squat", BoutConfig::reps(12))
    ///     .with_id("squats-1")
    ///     .with_modifier("vest", ModifierEffect::Harder);
    /// assert_eq!(bout.exercise_id(), Some("squat"));
    /// ```
    pub fn exercise(exercise_id: impl Into<ExerciseId>, config: BoutConfig) -> Self {
        Self {
            id: BoutId::default(),
            kind: BoutKind::Exercise {
                exercise_id: exercise_id.into().trim().to_string(),
                modifiers: Vec::new(),
            },
            config,
        }
    }

    /// Creates a rest bout.
    pub fn rest(config: BoutConfig) -> Self {
        Self {
            id: BoutId::default(),
            kind: BoutKind::Break,
            config,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = BoutId::new(id);
        self
    }

    /// Assigns a modifier. Ignored for breaks.
    pub fn with_modifier(mut self, modifier_id: impl Into<ModifierId>, effect: ModifierEffect) -> Self {
        if let BoutKind::Exercise { modifiers, .. } = &mut self.kind {
            modifiers.push(ModifierAssignment {
                modifier_id: modifier_id.into(),
                effect,
            });
        }
        self
    }

    pub fn is_break(&self) -> bool {
        matches!(self.kind, BoutKind::Break)
    }

    pub fn exercise_id(&self) -> Option<&str> {
        match &self.kind {
            BoutKind::Exercise { exercise_id, .. } => Some(exercise_id),
            BoutKind::Break => None,
        }
    }

    /// Authored modifier assignments (empty for breaks).
    pub fn modifier_assignments(&self) -> &[ModifierAssignment] {
        match &self.kind {
            BoutKind::Exercise { modifiers, .. } => modifiers,
            BoutKind::Break => &[],
        }
    }

    /// Returns true if both bouts perform the same exercise, or are both breaks.
    pub fn same_identity(&self, other: &Bout) -> bool {
        self.exercise_id() == other.exercise_id()
    }

    /// Display label: the exercise id, or "break".
    pub fn label(&self) -> &str {
        self.exercise_id().unwrap_or("break")
    }
}

/// Named ordered subset of bouts that move and batch-edit together.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,

    #[serde(default)]
    pub bouts: Vec<BoutId>,
}

impl Group {
    pub fn new(name: impl Into<String>, bouts: Vec<BoutId>) -> Self {
        Self {
            name: name.into(),
            bouts,
        }
    }

    pub fn contains(&self, id: &BoutId) -> bool {
        self.bouts.contains(id)
    }
}

/// Transition policy for timed bouts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Goal {
    /// Timed bouts advance automatically when their target is reached
    Strict,
    /// Every bout advances manually
    #[default]
    Elastic,
}

impl FromStr for Goal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "elastic" | "flexible" | "" => Ok(Self::Elastic),
            other => Err(format!("Unknown goal mode: {}", other)),
        }
    }
}

impl TryFrom<String> for Goal {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Elastic => write!(f, "elastic"),
        }
    }
}

/// Catalog entry for an exercise.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Exercise {
    pub id: ExerciseId,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Catalog entry for an equipment modifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Modifier {
    pub id: ModifierId,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// An authored workout sequence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Sequence {
    /// Falls back to the file stem when loaded from a file without one
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub goal: Goal,

    /// Modifiers the author declared usable in this sequence
    #[serde(default)]
    pub available_modifiers: Vec<ModifierId>,

    #[serde(default)]
    pub bouts: Vec<Bout>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
}

impl Sequence {
    /// Creates an empty sequence.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            goal: Goal::default(),
            available_modifiers: Vec::new(),
            bouts: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_goal(mut self, goal: Goal) -> Self {
        self.goal = goal;
        self
    }

    pub fn with_bout(mut self, bout: Bout) -> Self {
        self.bouts.push(bout);
        self
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    pub fn with_available_modifier(mut self, modifier_id: impl Into<ModifierId>) -> Self {
        self.available_modifiers.push(modifier_id.into());
        self
    }

    /// Tags every bout lacking an id with a fresh one.
    ///
    /// Returns the number of bouts tagged.
    pub fn ensure_bout_ids(&mut self) -> usize {
        let mut tagged = 0;
        for bout in self.bouts.iter_mut().filter(|b| b.id.is_empty()) {
            bout.id = BoutId::generate();
            tagged += 1;
        }
        tagged
    }

    /// Returns the position of a bout by id.
    pub fn index_of(&self, id: &BoutId) -> Option<usize> {
        self.bouts.iter().position(|b| &b.id == id)
    }

    /// Returns the group containing a bout, if any.
    pub fn group_of(&self, id: &BoutId) -> Option<&Group> {
        self.groups.iter().find(|g| g.contains(id))
    }

    /// Removes a bout, dropping it from its group.
    ///
    /// A group left empty by the removal is deleted.
    pub fn remove_bout(&mut self, id: &BoutId) -> Option<Bout> {
        let index = self.index_of(id)?;
        let removed = self.bouts.remove(index);

        for group in &mut self.groups {
            group.bouts.retain(|b| b != id);
        }
        self.groups.retain(|g| !g.bouts.is_empty());

        Some(removed)
    }

    pub fn is_modifier_available(&self, modifier_id: &str) -> bool {
        self.available_modifiers.iter().any(|m| m == modifier_id)
    }

    /// Returns the number of bouts in the sequence.
    pub fn len(&self) -> usize {
        self.bouts.len()
    }

    /// Returns true if the sequence has no bouts.
    pub fn is_empty(&self) -> bool {
        self.bouts.is_empty()
    }
}
