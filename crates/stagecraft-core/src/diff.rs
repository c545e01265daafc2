//! The stage-diff engine: pure functions computing, applying, and composing
//! minimal property-level deltas between two entity values.
//!
//! A diff entry is either a replacement value or an explicit removal
//! marker. The marker is what distinguishes "this stage sets the property
//! to absent" from "this stage does not mention the property" -- both are
//! needed to reconstruct values by folding diffs in stage order.

use crate::value::{EntityValue, PropValue, RESERVED_PROP_KEYS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One property's delta within a stage diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffEntry {
    /// The property takes this value from the diff's stage onward.
    Set(PropValue),
    /// The property becomes absent from the diff's stage onward.
    Remove,
}

impl DiffEntry {
    /// The value this entry leaves the property with (`None` = absent).
    pub fn effective(&self) -> Option<&PropValue> {
        match self {
            DiffEntry::Set(v) => Some(v),
            DiffEntry::Remove => None,
        }
    }

    /// The entry that leaves the property with `value` (`None` = absent).
    pub fn from_effective(value: Option<&PropValue>) -> DiffEntry {
        match value {
            Some(v) => DiffEntry::Set(v.clone()),
            None => DiffEntry::Remove,
        }
    }
}

/// A minimal partial value: the properties that change at one stage.
///
/// `name` is kept apart from the open bag because it is a concrete field of
/// [`EntityValue`]; a name change (an upgrade) can only replace, never
/// remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDiff {
    pub name: Option<String>,
    pub entries: BTreeMap<String, DiffEntry>,
}

impl StageDiff {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.entries.is_empty()
    }

    /// Wrap in `Option`, mapping an empty diff to `None`.
    pub fn into_option(self) -> Option<StageDiff> {
        if self.is_empty() { None } else { Some(self) }
    }

    /// A diff changing a single property.
    pub fn single(key: &str, entry: DiffEntry) -> StageDiff {
        let mut entries = BTreeMap::new();
        entries.insert(key.to_string(), entry);
        StageDiff { name: None, entries }
    }
}

/// Compute the minimal diff turning `below` into `above`.
///
/// Properties present in `below` but absent in `above` yield removal
/// markers; reserved geometric keys never appear. Returns `None` when the
/// values are equivalent.
pub fn diff_values(below: &EntityValue, above: &EntityValue) -> Option<StageDiff> {
    let mut diff = StageDiff::default();

    if below.name != above.name {
        diff.name = Some(above.name.clone());
    }

    for (key, value) in &above.props {
        if RESERVED_PROP_KEYS.contains(&key.as_str()) {
            continue;
        }
        if below.props.get(key) != Some(value) {
            diff.entries.insert(key.clone(), DiffEntry::Set(value.clone()));
        }
    }
    for key in below.props.keys() {
        if RESERVED_PROP_KEYS.contains(&key.as_str()) {
            continue;
        }
        if !above.props.contains_key(key) {
            diff.entries.insert(key.clone(), DiffEntry::Remove);
        }
    }

    diff.into_option()
}

/// Apply `diff` to `value` in place.
pub fn apply_diff(value: &mut EntityValue, diff: &StageDiff) {
    if let Some(name) = &diff.name {
        value.name = name.clone();
    }
    for (key, entry) in &diff.entries {
        match entry {
            DiffEntry::Set(v) => {
                value.props.insert(key.clone(), v.clone());
            }
            DiffEntry::Remove => {
                value.props.remove(key);
            }
        }
    }
}

/// Compute the net effective change at a stage whose diff is being replaced.
///
/// `prev` is the value at the stage *before* the diff applies; `old` and
/// `new` are the diff's previous and replacement contents (either may be
/// absent). The result maps every key whose post-diff effective value
/// actually changed to its new effective value -- the set of keys that
/// forward trimming has to reconcile, and nothing more.
pub fn diff_of_diffs(
    prev: &EntityValue,
    old: Option<&StageDiff>,
    new: Option<&StageDiff>,
) -> Option<StageDiff> {
    let mut net = StageDiff::default();

    let old_name = old
        .and_then(|d| d.name.as_ref())
        .unwrap_or(&prev.name);
    let new_name = new
        .and_then(|d| d.name.as_ref())
        .unwrap_or(&prev.name);
    if old_name != new_name {
        net.name = Some(new_name.clone());
    }

    let mut keys: Vec<&String> = Vec::new();
    if let Some(d) = old {
        keys.extend(d.entries.keys());
    }
    if let Some(d) = new {
        keys.extend(d.entries.keys().filter(|k| {
            old.is_none_or(|o| !o.entries.contains_key(*k))
        }));
    }

    for key in keys {
        let old_eff = match old.and_then(|d| d.entries.get(key)) {
            Some(entry) => entry.effective(),
            None => prev.props.get(key),
        };
        let new_eff = match new.and_then(|d| d.entries.get(key)) {
            Some(entry) => entry.effective(),
            None => prev.props.get(key),
        };
        if old_eff != new_eff {
            net.entries
                .insert(key.clone(), DiffEntry::from_effective(new_eff));
        }
    }

    net.into_option()
}
