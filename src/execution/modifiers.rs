//! Modifier Activation Tracker
//!
//! Tracks which equipment modifiers are "in use" for the bout being
//! performed. Assigned equipment defaults to in use at bout start; the
//! user may toggle any available modifier during the bout. The set never
//! carries over between bouts.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::sequence::{Bout, Modifier, ModifierId};

/// A modifier that was toggled on for a performed bout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActiveModifier {
    pub modifier_id: ModifierId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Modifiers active for the current bout, ordered by id.
pub type ActiveSet = BTreeSet<ModifierId>;

/// Initial active set for a bout: its assignments filtered to `available`.
pub fn initialize(bout: &Bout, available: &[ModifierId]) -> ActiveSet {
    bout.modifier_assignments()
        .iter()
        .filter(|a| available.contains(&a.modifier_id))
        .map(|a| a.modifier_id.clone())
        .collect()
}

/// Flips membership of `modifier_id`, returning the new set.
pub fn toggle(set: &ActiveSet, modifier_id: &str) -> ActiveSet {
    let mut next = set.clone();
    if !next.remove(modifier_id) {
        next.insert(modifier_id.to_string());
    }
    next
}

/// Resolves an active set into records, attaching catalog values.
pub fn to_records(set: &ActiveSet, catalog: &[Modifier]) -> Vec<ActiveModifier> {
    set.iter()
        .map(|id| ActiveModifier {
            modifier_id: id.clone(),
            value: catalog.iter().find(|m| &m.id == id).and_then(|m| m.value),
        })
        .collect()
}
