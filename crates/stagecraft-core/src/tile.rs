//! Staged ground tiles: the single-property reduction of the entity model.
//!
//! A tile records which ground-tile name is active per stage. The same
//! minimality rule applies: a stage entry that restates the name already in
//! effect never survives a mutation.

use crate::entity::{shift_keys_down, shift_keys_up};
use crate::id::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One tile position's staged history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedTile {
    first_stage: Stage,
    first_name: String,
    /// Sparse name changes, keys strictly above `first_stage`.
    stage_names: BTreeMap<Stage, String>,
}

impl StagedTile {
    pub fn new(name: &str, first_stage: Stage) -> Self {
        assert!(first_stage >= 1, "stages are 1-indexed");
        Self {
            first_stage,
            first_name: name.to_string(),
            stage_names: BTreeMap::new(),
        }
    }

    pub fn first_stage(&self) -> Stage {
        self.first_stage
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn has_stage_names(&self) -> bool {
        !self.stage_names.is_empty()
    }

    /// The active tile name at `stage`; `None` below the first stage.
    pub fn name_at_stage(&self, stage: Stage) -> Option<&str> {
        if stage < self.first_stage {
            return None;
        }
        match self.stage_names.range(..=stage).next_back() {
            Some((_, name)) => Some(name),
            None => Some(&self.first_name),
        }
    }

    /// Set the effective name at `stage`, extending the tile downward if
    /// `stage` is below its first stage. Trims entries that become
    /// redundant. Returns whether anything changed.
    pub fn set_name_at_stage(&mut self, stage: Stage, name: &str) -> bool {
        assert!(stage >= 1, "stages are 1-indexed");
        if stage < self.first_stage {
            let old_first = self.first_stage;
            let old_name = std::mem::replace(&mut self.first_name, name.to_string());
            self.first_stage = stage;
            if old_name != name {
                self.stage_names.insert(old_first, old_name);
            }
            return true;
        }
        if stage == self.first_stage {
            if self.first_name == name {
                return false;
            }
            self.first_name = name.to_string();
            self.trim_after(stage, name);
            return true;
        }
        let prev = self
            .name_at_stage(stage - 1)
            .expect("stage above first")
            .to_string();
        let old_eff = self
            .stage_names
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| prev.clone());
        if old_eff == name {
            return false;
        }
        if prev == name {
            self.stage_names.remove(&stage);
        } else {
            self.stage_names.insert(stage, name.to_string());
        }
        self.trim_after(stage, name);
        true
    }

    /// Remove the entry at `stage` so the name reverts to the previous
    /// stage's. `false` if there was none.
    pub fn reset_name_at_stage(&mut self, stage: Stage) -> bool {
        if self.stage_names.remove(&stage).is_none() {
            return false;
        }
        let reverted = self
            .name_at_stage(stage)
            .expect("entries only exist above the first stage")
            .to_string();
        self.trim_after(stage, &reverted);
        true
    }

    /// Raise or lower the first stage. Raising materializes the name at the
    /// new boundary and drops entries at or below it.
    pub fn set_first_stage(&mut self, stage: Stage) {
        assert!(stage >= 1, "stages are 1-indexed");
        if stage > self.first_stage {
            self.first_name = self
                .name_at_stage(stage)
                .expect("new first stage above current")
                .to_string();
            let obsolete: Vec<Stage> = self.stage_names.range(..=stage).map(|(s, _)| *s).collect();
            for s in obsolete {
                self.stage_names.remove(&s);
            }
        }
        self.first_stage = stage;
    }

    /// Stage insertion; mirrors the entity rule, including keeping tiles
    /// already at stage 1 in place on a front insertion.
    pub fn insert_stage(&mut self, stage: Stage) {
        assert!(stage >= 1, "stages are 1-indexed");
        shift_keys_up(&mut self.stage_names, stage);
        if self.first_stage >= stage && (stage > 1 || self.first_stage > 1) {
            self.first_stage += 1;
        }
    }

    /// Stage merge; the surviving combined stage keeps the absorbed
    /// stage's name.
    pub fn merge_stage(&mut self, stage: Stage) {
        assert!(stage >= 1, "stages are 1-indexed");
        if stage == 1 {
            if self.first_stage == 1 {
                if let Some(name) = self.stage_names.remove(&2) {
                    self.first_name = name;
                }
            } else {
                self.first_stage -= 1;
            }
            shift_keys_down(&mut self.stage_names, 2);
        } else {
            if let Some(name) = self.stage_names.remove(&stage) {
                if stage - 1 == self.first_stage {
                    self.first_name = name;
                } else {
                    let prev = self
                        .name_at_stage(stage - 2)
                        .expect("entries only exist above the first stage")
                        .to_string();
                    if prev == name {
                        self.stage_names.remove(&(stage - 1));
                    } else {
                        self.stage_names.insert(stage - 1, name);
                    }
                }
            }
            if self.first_stage >= stage {
                self.first_stage -= 1;
            }
            shift_keys_down(&mut self.stage_names, stage);
        }
    }

    /// Stage discard; returns whether the tile's content was touched. The
    /// caller removes tiles whose `first_stage` is the discarded stage.
    pub fn discard_stage(&mut self, stage: Stage) -> bool {
        assert!(stage >= 1, "stages are 1-indexed");
        debug_assert!(
            self.first_stage != stage,
            "tiles created at the discarded stage are removed by the store"
        );
        let mut changed = false;
        if self.stage_names.remove(&stage).is_some() {
            let reverted = self
                .name_at_stage(stage)
                .expect("entries only exist above the first stage")
                .to_string();
            self.trim_after(stage, &reverted);
            changed = true;
        }
        shift_keys_down(&mut self.stage_names, stage);
        if self.first_stage > stage {
            self.first_stage -= 1;
        }
        changed
    }

    /// Delete entries above `stage` that restate `current`, stopping at the
    /// first diverging entry.
    fn trim_after(&mut self, stage: Stage, current: &str) {
        let stages: Vec<Stage> = self.stage_names.range(stage + 1..).map(|(s, _)| *s).collect();
        for s in stages {
            if self.stage_names.get(&s).is_some_and(|n| n == current) {
                self.stage_names.remove(&s);
            } else {
                break;
            }
        }
    }
}
