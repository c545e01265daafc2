//! The observer callback set consumed by the world-sync layer.
//!
//! A store has at most one observer. Inside a batch, per-entity
//! notifications are coalesced into a single record per entity: the
//! minimum changed stage, the first observed old last-stage, and a
//! wires-changed flag. The record is flushed when the outermost batch
//! ends. Entity lifecycle events (added, deleted, remnant, revived) and
//! stage discards are delivered immediately.

use stagecraft_core::entity::StagedEntity;
use stagecraft_core::id::{EntityId, Stage};
use stagecraft_core::pos::Position;

/// Everything a discarded stage touched, delivered in one record.
#[derive(Debug)]
pub struct StageDiscard {
    pub stage: Stage,
    /// Entities whose first stage was the discarded stage; they are
    /// removed from the store entirely, so their records travel with the
    /// notification.
    pub deleted_entities: Vec<(EntityId, StagedEntity)>,
    /// Entities whose diffs, side properties, or last stage were touched.
    pub updated_entities: Vec<EntityId>,
    /// Positions of tiles that were removed or touched.
    pub updated_tile_positions: Vec<Position>,
}

/// Callbacks describing what changed and from which stage. All methods
/// default to no-ops so observers implement only what they consume.
pub trait ContentObserver {
    fn entity_added(&mut self, entity: EntityId) {
        let _ = entity;
    }

    fn entity_deleted(&mut self, entity: EntityId) {
        let _ = entity;
    }

    /// The entity's derived value changed at `from_stage` and above.
    fn entity_changed(&mut self, entity: EntityId, from_stage: Stage) {
        let _ = (entity, from_stage);
    }

    fn entity_last_stage_changed(&mut self, entity: EntityId, old_last_stage: Option<Stage>) {
        let _ = (entity, old_last_stage);
    }

    fn entity_became_settings_remnant(&mut self, entity: EntityId) {
        let _ = entity;
    }

    fn entity_revived(&mut self, entity: EntityId) {
        let _ = entity;
    }

    fn wires_changed(&mut self, entity: EntityId) {
        let _ = entity;
    }

    fn stage_discarded(&mut self, discard: &StageDiscard) {
        let _ = discard;
    }
}

/// Coalesced per-entity notification state accumulated inside a batch.
#[derive(Debug, Default, Clone)]
pub(crate) struct PendingRecord {
    /// Minimum changed stage seen in this batch.
    pub min_stage: Option<Stage>,
    /// First old last-stage value observed in this batch.
    pub old_last_stage: Option<Option<Stage>>,
    pub wires_changed: bool,
}

impl PendingRecord {
    pub fn record_change(&mut self, from_stage: Stage) {
        self.min_stage = Some(match self.min_stage {
            Some(stage) => stage.min(from_stage),
            None => from_stage,
        });
    }

    pub fn record_last_stage(&mut self, old_last_stage: Option<Stage>) {
        self.old_last_stage.get_or_insert(old_last_stage);
    }
}
