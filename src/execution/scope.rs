//! Scope Resolver
//!
//! Maps a target bout and a requested scope to the bout indices a
//! configuration edit applies to. Indices below `completed_count` are
//! history and are never returned.
//!
//! Results are always ascending by sequence index so that previews and
//! application agree.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::sequence::{Bout, Group};

/// Which bouts a configuration edit propagates to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Just the target bout
    ThisOnly,
    /// Every bout in the target's group
    SameGroup,
    /// Every bout of the same exercise (breaks match breaks)
    AllInSequence,
    /// Same exercise and identical measure and target
    SameConfig,
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "this" | "this_only" => Ok(Self::ThisOnly),
            "group" | "same_group" => Ok(Self::SameGroup),
            "all" | "all_in_sequence" => Ok(Self::AllInSequence),
            "config" | "same_config" => Ok(Self::SameConfig),
            other => Err(format!("Unknown scope: {}", other)),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ThisOnly => "this_only",
            Self::SameGroup => "same_group",
            Self::AllInSequence => "all_in_sequence",
            Self::SameConfig => "same_config",
        };
        f.write_str(name)
    }
}

/// Resolves the indices an edit on `target_index` applies to.
///
/// An out-of-range target resolves to nothing.
pub fn resolve(
    bouts: &[Bout],
    groups: &[Group],
    target_index: usize,
    scope: Scope,
    completed_count: usize,
) -> Vec<usize> {
    let Some(target) = bouts.get(target_index) else {
        return Vec::new();
    };

    let editable = |index: &usize| *index >= completed_count;

    let indices: BTreeSet<usize> = match scope {
        Scope::ThisOnly => std::iter::once(target_index).filter(editable).collect(),
        Scope::SameGroup => match groups.iter().find(|g| g.contains(&target.id)) {
            Some(group) => bouts
                .iter()
                .enumerate()
                .filter(|(_, bout)| group.contains(&bout.id))
                .map(|(index, _)| index)
                .filter(editable)
                .collect(),
            None => std::iter::once(target_index).filter(editable).collect(),
        },
        Scope::AllInSequence => bouts
            .iter()
            .enumerate()
            .filter(|(_, bout)| bout.same_identity(target))
            .map(|(index, _)| index)
            .filter(editable)
            .collect(),
        Scope::SameConfig => bouts
            .iter()
            .enumerate()
            .filter(|(_, bout)| bout.same_identity(target) && bout.config == target.config)
            .map(|(index, _)| index)
            .filter(editable)
            .collect(),
    };

    indices.into_iter().collect()
}
