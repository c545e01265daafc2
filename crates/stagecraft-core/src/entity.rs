//! One entity's full staged history.
//!
//! A [`StagedEntity`] holds the complete configuration at its first stage
//! plus a sparse map of per-stage diffs. The value at any stage is derived
//! by folding diffs in order. Every mutation keeps the diff map minimal:
//! no entry survives that would re-state the value already in effect at
//! the previous stage.
//!
//! Geometric state (`position`, `direction`, underground io) is invariant
//! across stages and lives outside the diffable value. Structural changes
//! (stage boundaries, wire links) are driven by the content store; calling
//! the wire-link mutators directly bypasses index and notification
//! consistency.

use crate::diff::{DiffEntry, StageDiff, apply_diff, diff_of_diffs, diff_values};
use crate::external::BeltIo;
use crate::id::{EntityId, Stage, UnitNumber};
use crate::pos::{Direction, Position};
use crate::prototype::PrototypeRegistry;
use crate::value::{EntityValue, ORIENTATION_KEY, PropValue};
use crate::wires::WireLink;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Stage-keyed map helpers
// ---------------------------------------------------------------------------

/// Shift every key >= `from` up by one (stage insertion).
pub(crate) fn shift_keys_up<V>(map: &mut BTreeMap<Stage, V>, from: Stage) {
    let keys: Vec<Stage> = map.range(from..).map(|(k, _)| *k).collect();
    for k in keys.into_iter().rev() {
        if let Some(v) = map.remove(&k) {
            map.insert(k + 1, v);
        }
    }
}

/// Shift every key > `above` down by one (stage removal).
pub(crate) fn shift_keys_down<V>(map: &mut BTreeMap<Stage, V>, above: Stage) {
    let keys: Vec<Stage> = map.range(above + 1..).map(|(k, _)| *k).collect();
    for k in keys {
        if let Some(v) = map.remove(&k) {
            map.insert(k - 1, v);
        }
    }
}

// ---------------------------------------------------------------------------
// StagedEntity
// ---------------------------------------------------------------------------

/// One entity across the whole stage sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEntity {
    position: Position,
    direction: Direction,
    /// Set iff the entity is an underground belt. Stage-invariant, like
    /// `direction`; changed only via its dedicated setter.
    underground_io: Option<BeltIo>,
    first_stage: Stage,
    /// `None` = persists indefinitely. Movable entities always have
    /// `last_stage == first_stage`.
    last_stage: Option<Stage>,
    first_value: EntityValue,
    /// Sparse per-stage deltas, keys strictly above `first_stage`.
    stage_diffs: BTreeMap<Stage, StageDiff>,
    /// Per-stage side-channel data (flags, transient values), unrelated to
    /// the diffed value but bounded by the entity's lifetime.
    stage_properties: BTreeMap<String, BTreeMap<Stage, PropValue>>,
    movable: bool,
    is_settings_remnant: bool,
    unit_number: Option<UnitNumber>,
    /// Symmetric wire adjacency: partner -> set of links touching it.
    /// Maintained by the content store.
    wire_links: BTreeMap<EntityId, BTreeSet<WireLink>>,
}

impl StagedEntity {
    /// Create an entity starting at `first_stage` with the given value.
    ///
    /// Reserved geometric keys are stripped from the value. Movable types
    /// (per the registry) are pinned to a single stage.
    pub fn new(
        value: EntityValue,
        position: Position,
        direction: Direction,
        first_stage: Stage,
        registry: &PrototypeRegistry,
    ) -> Self {
        assert!(first_stage >= 1, "stages are 1-indexed");
        let mut first_value = value;
        first_value.strip_reserved();
        let movable = registry.get(&first_value.name).is_movable();
        if movable {
            first_value.props.remove(ORIENTATION_KEY);
        }
        Self {
            position,
            direction,
            underground_io: None,
            first_stage,
            last_stage: movable.then_some(first_stage),
            first_value,
            stage_diffs: BTreeMap::new(),
            stage_properties: BTreeMap::new(),
            movable,
            is_settings_remnant: false,
            unit_number: None,
            wire_links: BTreeMap::new(),
        }
    }

    // -- Accessors --

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Dedicated direction setter; direction is never part of a diff.
    pub fn set_direction(&mut self, direction: Direction) -> bool {
        if self.direction == direction {
            return false;
        }
        self.direction = direction;
        true
    }

    pub fn underground_io(&self) -> Option<BeltIo> {
        self.underground_io
    }

    /// Dedicated underground-io setter; like direction, never diffed.
    pub fn set_underground_io(&mut self, io: Option<BeltIo>) -> bool {
        if self.underground_io == io {
            return false;
        }
        self.underground_io = io;
        true
    }

    pub fn first_stage(&self) -> Stage {
        self.first_stage
    }

    pub fn last_stage(&self) -> Option<Stage> {
        self.last_stage
    }

    pub fn first_value(&self) -> &EntityValue {
        &self.first_value
    }

    pub fn is_movable(&self) -> bool {
        self.movable
    }

    pub fn is_settings_remnant(&self) -> bool {
        self.is_settings_remnant
    }

    /// Maintained by the content store.
    pub fn set_settings_remnant(&mut self, remnant: bool) {
        self.is_settings_remnant = remnant;
    }

    pub fn unit_number(&self) -> Option<UnitNumber> {
        self.unit_number
    }

    /// Maintained by the content store alongside its movable index.
    pub fn set_unit_number(&mut self, unit: Option<UnitNumber>) {
        self.unit_number = unit;
    }

    /// Whether the entity is built at `stage`.
    pub fn exists_at_stage(&self, stage: Stage) -> bool {
        stage >= self.first_stage && self.last_stage.is_none_or(|last| stage <= last)
    }

    pub fn has_stage_diff(&self, stage: Stage) -> bool {
        self.stage_diffs.contains_key(&stage)
    }

    pub fn has_stage_diffs(&self) -> bool {
        !self.stage_diffs.is_empty()
    }

    pub fn stage_diff(&self, stage: Stage) -> Option<&StageDiff> {
        self.stage_diffs.get(&stage)
    }

    pub fn iter_stage_diffs(&self) -> impl Iterator<Item = (Stage, &StageDiff)> {
        self.stage_diffs.iter().map(|(s, d)| (*s, d))
    }

    /// The lowest diffed stage strictly above `stage`, if any.
    pub fn next_stage_with_diff(&self, stage: Stage) -> Option<Stage> {
        self.stage_diffs.range(stage + 1..).next().map(|(s, _)| *s)
    }

    // -- Value derivation --

    /// The full value at `stage`: `first_value` with every diff up to and
    /// including `stage` folded in. `None` below the first stage.
    pub fn value_at_stage(&self, stage: Stage) -> Option<EntityValue> {
        if stage < self.first_stage {
            return None;
        }
        let mut value = self.first_value.clone();
        for (_, diff) in self.stage_diffs.range(..=stage) {
            apply_diff(&mut value, diff);
        }
        Some(value)
    }

    /// A single property's value at `stage`, along with the stage where
    /// that value was last set (provenance for the UI).
    pub fn prop_at_stage(&self, stage: Stage, key: &str) -> Option<(Option<PropValue>, Stage)> {
        if stage < self.first_stage {
            return None;
        }
        for (s, diff) in self.stage_diffs.range(..=stage).rev() {
            if let Some(entry) = diff.entries.get(key) {
                return Some((entry.effective().cloned(), *s));
            }
        }
        Some((self.first_value.props.get(key).cloned(), self.first_stage))
    }

    /// The entity name at `stage`, with the stage where it was last set.
    pub fn name_at_stage(&self, stage: Stage) -> Option<(&str, Stage)> {
        if stage < self.first_stage {
            return None;
        }
        for (s, diff) in self.stage_diffs.range(..=stage).rev() {
            if let Some(name) = &diff.name {
                return Some((name, *s));
            }
        }
        Some((&self.first_value.name, self.first_stage))
    }

    fn effective_prop(&self, stage: Stage, key: &str) -> Option<PropValue> {
        self.prop_at_stage(stage, key).and_then(|(v, _)| v)
    }

    // -- Diff mutation --

    /// Set the effective value at `stage`. Stores the minimal diff against
    /// the previous stage (or rewrites `first_value`) and trims now-redundant
    /// entries from every later stage. Returns whether anything changed.
    pub fn adjust_value_at_stage(&mut self, stage: Stage, value: &EntityValue) -> bool {
        self.assert_stage_in_range(stage);
        let mut value = value.clone();
        value.strip_reserved();
        if stage == self.first_stage {
            if self.movable {
                value.props.remove(ORIENTATION_KEY);
            }
            let Some(net) = diff_values(&self.first_value, &value) else {
                return false;
            };
            apply_diff(&mut self.first_value, &net);
            self.trim_after(stage, net);
            true
        } else {
            let prev = self
                .value_at_stage(stage - 1)
                .expect("stage checked above first");
            let new_diff = diff_values(&prev, &value);
            let old_diff = self.stage_diffs.remove(&stage);
            if old_diff.is_none() && new_diff.is_none() {
                return false;
            }
            let net = diff_of_diffs(&prev, old_diff.as_ref(), new_diff.as_ref());
            if let Some(diff) = new_diff {
                self.stage_diffs.insert(stage, diff);
            }
            match net {
                Some(net) => {
                    self.trim_after(stage, net);
                    true
                }
                None => false,
            }
        }
    }

    /// Set one property's effective value at `stage` (`None` = absent).
    pub fn set_prop_at_stage(&mut self, stage: Stage, key: &str, value: Option<PropValue>) -> bool {
        self.assert_stage_in_range(stage);
        if stage == self.first_stage {
            if self.first_value.props.get(key) == value.as_ref() {
                return false;
            }
            match &value {
                Some(v) => {
                    self.first_value.props.insert(key.to_string(), v.clone());
                }
                None => {
                    self.first_value.props.remove(key);
                }
            }
            let net = StageDiff::single(key, DiffEntry::from_effective(value.as_ref()));
            self.trim_after(stage, net);
            true
        } else {
            let prev = self.effective_prop(stage - 1, key);
            let old_eff = match self.stage_diffs.get(&stage).and_then(|d| d.entries.get(key)) {
                Some(entry) => entry.effective().cloned(),
                None => prev.clone(),
            };
            if old_eff == value {
                return false;
            }
            if value == prev {
                // Reverts to the previous stage's value: no entry needed.
                if let Some(diff) = self.stage_diffs.get_mut(&stage) {
                    diff.entries.remove(key);
                    if diff.is_empty() {
                        self.stage_diffs.remove(&stage);
                    }
                }
            } else {
                self.stage_diffs
                    .entry(stage)
                    .or_default()
                    .entries
                    .insert(key.to_string(), DiffEntry::from_effective(value.as_ref()));
            }
            let net = StageDiff::single(key, DiffEntry::from_effective(value.as_ref()));
            self.trim_after(stage, net);
            true
        }
    }

    /// Set the entity name (upgrade) at `stage`.
    pub fn set_name_at_stage(&mut self, stage: Stage, name: &str) -> bool {
        self.assert_stage_in_range(stage);
        if stage == self.first_stage {
            if self.first_value.name == name {
                return false;
            }
            self.first_value.name = name.to_string();
            let net = StageDiff {
                name: Some(name.to_string()),
                entries: BTreeMap::new(),
            };
            self.trim_after(stage, net);
            true
        } else {
            let prev = self
                .name_at_stage(stage - 1)
                .expect("stage checked above first")
                .0
                .to_string();
            let old_eff = self
                .stage_diffs
                .get(&stage)
                .and_then(|d| d.name.clone())
                .unwrap_or_else(|| prev.clone());
            if old_eff == name {
                return false;
            }
            if prev == name {
                if let Some(diff) = self.stage_diffs.get_mut(&stage) {
                    diff.name = None;
                    if diff.is_empty() {
                        self.stage_diffs.remove(&stage);
                    }
                }
            } else {
                self.stage_diffs.entry(stage).or_default().name = Some(name.to_string());
            }
            let net = StageDiff {
                name: Some(name.to_string()),
                entries: BTreeMap::new(),
            };
            self.trim_after(stage, net);
            true
        }
    }

    /// Remove the diff entry for `key` at `stage`, reverting the property
    /// to its value at the previous stage. `false` if there was none.
    pub fn reset_prop_at_stage(&mut self, stage: Stage, key: &str) -> bool {
        self.assert_stage_in_range(stage);
        let Some(diff) = self.stage_diffs.get_mut(&stage) else {
            return false;
        };
        if diff.entries.remove(key).is_none() {
            return false;
        }
        if diff.is_empty() {
            self.stage_diffs.remove(&stage);
        }
        let reverted = self.effective_prop(stage, key);
        let net = StageDiff::single(key, DiffEntry::from_effective(reverted.as_ref()));
        self.trim_after(stage, net);
        true
    }

    /// Remove the whole diff at `stage`, reverting the value to the
    /// previous stage's. `false` if there was none.
    pub fn reset_value_at_stage(&mut self, stage: Stage) -> bool {
        self.assert_stage_in_range(stage);
        let Some(old) = self.stage_diffs.remove(&stage) else {
            return false;
        };
        let prev = self
            .value_at_stage(stage - 1)
            .expect("diffs only exist above the first stage");
        if let Some(net) = diff_of_diffs(&prev, Some(&old), None) {
            self.trim_after(stage, net);
        }
        true
    }

    /// Relocate the diff at `stage` down to the nearest lower diffed stage
    /// (or into `first_value` if there is none), merging it there. Returns
    /// the target stage, or `None` if there was nothing to move.
    pub fn move_value_down(&mut self, stage: Stage) -> Option<Stage> {
        let moved = self.stage_diffs.remove(&stage)?;
        let target = self
            .stage_diffs
            .range(..stage)
            .next_back()
            .map(|(s, _)| *s)
            .unwrap_or(self.first_stage);
        if target == self.first_stage {
            apply_diff(&mut self.first_value, &moved);
        } else {
            self.merge_diff_into(target, &moved);
        }
        Some(target)
    }

    /// Single-property form of [`move_value_down`](Self::move_value_down).
    pub fn move_prop_down(&mut self, stage: Stage, key: &str) -> Option<Stage> {
        let entry = {
            let diff = self.stage_diffs.get_mut(&stage)?;
            let entry = diff.entries.remove(key)?;
            if diff.is_empty() {
                self.stage_diffs.remove(&stage);
            }
            entry
        };
        let target = self
            .stage_diffs
            .range(..stage)
            .next_back()
            .map(|(s, _)| *s)
            .unwrap_or(self.first_stage);
        if target == self.first_stage {
            match &entry {
                DiffEntry::Set(v) => {
                    self.first_value.props.insert(key.to_string(), v.clone());
                }
                DiffEntry::Remove => {
                    self.first_value.props.remove(key);
                }
            }
        } else {
            let prev = self.effective_prop(target - 1, key);
            let diff = self.stage_diffs.entry(target).or_default();
            if prev.as_ref() == entry.effective() {
                diff.entries.remove(key);
            } else {
                diff.entries.insert(key.to_string(), entry);
            }
            if diff.is_empty() {
                self.stage_diffs.remove(&target);
            }
        }
        Some(target)
    }

    /// Fold `moved` into the diff at `target`, re-minimizing against the
    /// value below `target`.
    fn merge_diff_into(&mut self, target: Stage, moved: &StageDiff) {
        let prev = self
            .value_at_stage(target - 1)
            .expect("diffs only exist above the first stage");
        let mut folded = prev.clone();
        if let Some(existing) = self.stage_diffs.get(&target) {
            apply_diff(&mut folded, existing);
        }
        apply_diff(&mut folded, moved);
        match diff_values(&prev, &folded) {
            Some(min) => {
                self.stage_diffs.insert(target, min);
            }
            None => {
                self.stage_diffs.remove(&target);
            }
        }
    }

    // -- Stage properties (side channel) --

    pub fn stage_property(&self, stage: Stage, key: &str) -> Option<&PropValue> {
        self.stage_properties.get(key)?.get(&stage)
    }

    pub fn stage_property_entries(&self, key: &str) -> Option<&BTreeMap<Stage, PropValue>> {
        self.stage_properties.get(key)
    }

    /// Set (or clear, with `None`) a per-stage side property.
    pub fn set_stage_property(&mut self, stage: Stage, key: &str, value: Option<PropValue>) -> bool {
        self.assert_stage_in_range(stage);
        match value {
            Some(v) => {
                let per_stage = self.stage_properties.entry(key.to_string()).or_default();
                per_stage.insert(stage, v.clone()) != Some(v)
            }
            None => {
                let Some(per_stage) = self.stage_properties.get_mut(key) else {
                    return false;
                };
                let removed = per_stage.remove(&stage).is_some();
                if per_stage.is_empty() {
                    self.stage_properties.remove(key);
                }
                removed
            }
        }
    }

    // -- Stage renumbering --

    /// A stage is inserted at `stage`; every later stage moves up by one.
    ///
    /// Entities at or above the insertion point are pushed up, with one
    /// exception: a persistent entity already at stage 1 is not pushed by a
    /// front insertion (it exists from the very beginning either way).
    /// Movable entities are always pushed with their stage.
    pub fn insert_stage(&mut self, stage: Stage) {
        assert!(stage >= 1, "stages are 1-indexed");
        shift_keys_up(&mut self.stage_diffs, stage);
        for per_stage in self.stage_properties.values_mut() {
            shift_keys_up(per_stage, stage);
        }
        let pushed =
            self.first_stage >= stage && (stage > 1 || self.first_stage > 1 || self.movable);
        if pushed {
            self.first_stage += 1;
        }
        if let Some(last) = self.last_stage {
            if last >= stage {
                self.last_stage = Some(last + 1);
            }
        }
    }

    /// Stage `stage` is merged into its lower neighbor (or into stage 2
    /// when `stage == 1`); every later stage moves down by one. The
    /// surviving combined stage keeps the absorbed stage's changes.
    pub fn merge_stage(&mut self, stage: Stage) {
        assert!(stage >= 1, "stages are 1-indexed");
        if stage == 1 {
            // Stages 1 and 2 collapse; the survivor keeps stage 2's value.
            if self.first_stage == 1 {
                if let Some(diff) = self.stage_diffs.remove(&2) {
                    apply_diff(&mut self.first_value, &diff);
                }
            } else {
                self.first_stage -= 1;
            }
            for per_stage in self.stage_properties.values_mut() {
                if let Some(v) = per_stage.remove(&2) {
                    per_stage.insert(1, v);
                }
                shift_keys_down(per_stage, 2);
            }
            shift_keys_down(&mut self.stage_diffs, 2);
            if let Some(last) = self.last_stage {
                if last > 1 {
                    self.last_stage = Some(last - 1);
                }
            }
        } else {
            if let Some(moved) = self.stage_diffs.remove(&stage) {
                if stage - 1 == self.first_stage {
                    apply_diff(&mut self.first_value, &moved);
                } else {
                    self.merge_diff_into(stage - 1, &moved);
                }
            }
            if self.first_stage >= stage {
                self.first_stage -= 1;
            }
            for per_stage in self.stage_properties.values_mut() {
                if let Some(v) = per_stage.remove(&stage) {
                    per_stage.insert(stage - 1, v);
                }
                shift_keys_down(per_stage, stage);
            }
            shift_keys_down(&mut self.stage_diffs, stage);
            if let Some(last) = self.last_stage {
                if last >= stage {
                    self.last_stage = Some(last - 1);
                }
            }
        }
    }

    /// Stage `stage` is discarded outright: its diff and side properties
    /// are deleted (no merge) and every later stage moves down by one.
    /// Returns whether the entity's content was touched. The caller must
    /// remove entities whose `first_stage` is the discarded stage instead
    /// of calling this.
    pub fn discard_stage(&mut self, stage: Stage) -> bool {
        assert!(stage >= 1, "stages are 1-indexed");
        debug_assert!(
            self.first_stage != stage,
            "entities created at the discarded stage are removed by the store"
        );
        let mut changed = false;
        if let Some(old) = self.stage_diffs.remove(&stage) {
            let prev = self
                .value_at_stage(stage - 1)
                .expect("diffs only exist above the first stage");
            if let Some(net) = diff_of_diffs(&prev, Some(&old), None) {
                self.trim_after(stage, net);
            }
            changed = true;
        }
        for per_stage in self.stage_properties.values_mut() {
            if per_stage.remove(&stage).is_some() {
                changed = true;
            }
            shift_keys_down(per_stage, stage);
        }
        self.stage_properties.retain(|_, m| !m.is_empty());
        shift_keys_down(&mut self.stage_diffs, stage);
        if self.first_stage > stage {
            self.first_stage -= 1;
        }
        if let Some(last) = self.last_stage {
            if last >= stage {
                self.last_stage = Some(last - 1);
                changed = true;
            }
        }
        changed
    }

    // -- Boundary moves --

    /// Move the first stage without movable-invariant maintenance.
    ///
    /// Moving up materializes the value at the new boundary into
    /// `first_value` and discards all diffs and side properties below it.
    /// Asserts rather than producing `first_stage > last_stage`.
    pub fn set_first_stage_unchecked(&mut self, stage: Stage) {
        assert!(stage >= 1, "stages are 1-indexed");
        if let Some(last) = self.last_stage {
            assert!(stage <= last, "first stage {stage} above last stage {last}");
        }
        if stage > self.first_stage {
            self.first_value = self
                .value_at_stage(stage)
                .expect("new first stage above current");
            let obsolete: Vec<Stage> = self.stage_diffs.range(..=stage).map(|(s, _)| *s).collect();
            for s in obsolete {
                self.stage_diffs.remove(&s);
            }
            for per_stage in self.stage_properties.values_mut() {
                let below: Vec<Stage> = per_stage.range(..stage).map(|(s, _)| *s).collect();
                for s in below {
                    per_stage.remove(&s);
                }
            }
            self.stage_properties.retain(|_, m| !m.is_empty());
        }
        self.first_stage = stage;
    }

    /// Move the last stage without movable-invariant maintenance.
    /// Lowering it discards diffs and side properties above the new bound.
    pub fn set_last_stage_unchecked(&mut self, stage: Option<Stage>) {
        if let Some(last) = stage {
            assert!(
                last >= self.first_stage,
                "last stage {last} below first stage {}",
                self.first_stage
            );
            let above: Vec<Stage> = self.stage_diffs.range(last + 1..).map(|(s, _)| *s).collect();
            for s in above {
                self.stage_diffs.remove(&s);
            }
            for per_stage in self.stage_properties.values_mut() {
                let above: Vec<Stage> = per_stage.range(last + 1..).map(|(s, _)| *s).collect();
                for s in above {
                    per_stage.remove(&s);
                }
            }
            self.stage_properties.retain(|_, m| !m.is_empty());
        }
        self.last_stage = stage;
    }

    /// Move the first stage, keeping movable entities single-stage.
    pub fn set_first_stage(&mut self, stage: Stage) -> bool {
        if stage == self.first_stage {
            return false;
        }
        if self.movable {
            if stage > self.first_stage {
                self.set_last_stage_unchecked(Some(stage));
                self.set_first_stage_unchecked(stage);
            } else {
                self.set_first_stage_unchecked(stage);
                self.set_last_stage_unchecked(Some(stage));
            }
        } else {
            self.set_first_stage_unchecked(stage);
        }
        true
    }

    // -- Wire adjacency (maintained by the content store) --

    pub fn wire_links(&self) -> &BTreeMap<EntityId, BTreeSet<WireLink>> {
        &self.wire_links
    }

    pub fn wire_links_to(&self, partner: EntityId) -> Option<&BTreeSet<WireLink>> {
        self.wire_links.get(&partner)
    }

    pub fn has_wire_links(&self) -> bool {
        !self.wire_links.is_empty()
    }

    /// Record an edge to `partner`. Returns `false` if it already existed.
    pub fn add_wire_link(&mut self, partner: EntityId, link: WireLink) -> bool {
        self.wire_links.entry(partner).or_default().insert(link)
    }

    /// Drop one edge to `partner`. Returns whether it existed.
    pub fn remove_wire_link(&mut self, partner: EntityId, link: WireLink) -> bool {
        let Some(links) = self.wire_links.get_mut(&partner) else {
            return false;
        };
        let removed = links.remove(&link);
        if links.is_empty() {
            self.wire_links.remove(&partner);
        }
        removed
    }

    /// Drop every edge to `partner`. Returns whether any existed.
    pub fn remove_wire_partner(&mut self, partner: EntityId) -> bool {
        self.wire_links.remove(&partner).is_some()
    }

    // -- Internals --

    fn assert_stage_in_range(&self, stage: Stage) {
        assert!(
            stage >= self.first_stage,
            "stage {stage} is below first stage {}",
            self.first_stage
        );
        if let Some(last) = self.last_stage {
            assert!(stage <= last, "stage {stage} is above last stage {last}");
        }
    }

    /// Forward trim: `net` maps each changed key to the value now in effect
    /// at `stage`. Walk later diffed stages; entries restating a tracked
    /// value are no-ops and are deleted, entries diverging from it end the
    /// walk for that key.
    fn trim_after(&mut self, stage: Stage, net: StageDiff) {
        let mut tracked_name = net.name;
        let mut tracked: BTreeMap<String, Option<PropValue>> = net
            .entries
            .into_iter()
            .map(|(key, entry)| {
                let effective = entry.effective().cloned();
                (key, effective)
            })
            .collect();

        let stages: Vec<Stage> = self.stage_diffs.range(stage + 1..).map(|(s, _)| *s).collect();
        for s in stages {
            if tracked_name.is_none() && tracked.is_empty() {
                break;
            }
            let Some(diff) = self.stage_diffs.get_mut(&s) else {
                continue;
            };
            if let Some(current) = &tracked_name {
                if let Some(next) = &diff.name {
                    if next == current {
                        diff.name = None;
                    } else {
                        tracked_name = None;
                    }
                }
            }
            tracked.retain(|key, current| {
                let redundant = diff
                    .entries
                    .get(key)
                    .map(|entry| entry.effective() == current.as_ref());
                match redundant {
                    None => true,
                    Some(true) => {
                        diff.entries.remove(key);
                        true
                    }
                    Some(false) => false,
                }
            });
            if diff.is_empty() {
                self.stage_diffs.remove(&s);
            }
        }
    }
}
