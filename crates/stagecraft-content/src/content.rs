//! The project content store.
//!
//! Owns the entity arena, the position index, the tile store, and wire
//! adjacency maintenance, and emits coalesced change notifications to a
//! single observer. Every structural mutation of an entity goes through
//! this API so that index state and notifications stay consistent.

use crate::observer::{ContentObserver, PendingRecord, StageDiscard};
use slotmap::SlotMap;
use stagecraft_core::entity::StagedEntity;
use stagecraft_core::external::{BeltIo, ExternalEntity, underground_direction};
use stagecraft_core::id::{EntityId, Stage, UnitNumber};
use stagecraft_core::pos::{BoundingBox, Direction, Position};
use stagecraft_core::prototype::{PrototypeKind, PrototypeRegistry, RotationClass};
use stagecraft_core::tile::StagedTile;
use stagecraft_core::value::{EntityValue, PropValue};
use stagecraft_core::wires::{WireConnection, WireLink};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Margin applied around the content extent by
/// [`compute_bounding_box`](ProjectContent::compute_bounding_box).
pub const BOUNDING_BOX_MARGIN: i32 = 20;

/// All entities and tiles of one staged project.
///
/// Single-owner and synchronous: every operation runs to completion, and
/// batching is a reentrancy mechanism, not a concurrency one.
pub struct ProjectContent {
    registry: Arc<PrototypeRegistry>,
    entities: SlotMap<EntityId, StagedEntity>,
    /// Multiple entities may share an exact position with disjoint stage
    /// ranges; each cell is an unordered multiset.
    by_position: BTreeMap<Position, Vec<EntityId>>,
    tiles: BTreeMap<Position, StagedTile>,
    /// Registered identity of movable entities, for external matching.
    movable_index: BTreeMap<UnitNumber, EntityId>,
    observer: Option<Box<dyn ContentObserver>>,
    batch_depth: u32,
    pending: BTreeMap<EntityId, PendingRecord>,
}

impl ProjectContent {
    pub fn new(registry: Arc<PrototypeRegistry>) -> Self {
        Self {
            registry,
            entities: SlotMap::with_key(),
            by_position: BTreeMap::new(),
            tiles: BTreeMap::new(),
            movable_index: BTreeMap::new(),
            observer: None,
            batch_depth: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &PrototypeRegistry {
        &self.registry
    }

    pub fn registry_handle(&self) -> Arc<PrototypeRegistry> {
        Arc::clone(&self.registry)
    }

    // -- Observer --

    /// Install the observer, replacing any previous one.
    pub fn set_observer(&mut self, observer: Box<dyn ContentObserver>) {
        self.observer = Some(observer);
    }

    pub fn take_observer(&mut self) -> Option<Box<dyn ContentObserver>> {
        self.observer.take()
    }

    // -- Entity membership --

    /// Insert an entity, index its position, and restore any stored wire
    /// connections whose partner is still present (the delete-then-re-add
    /// case). Connections to missing partners are dropped.
    pub fn add_entity(&mut self, entity: StagedEntity) -> EntityId {
        let position = entity.position();
        let unit = entity.unit_number();
        let id = self.entities.insert(entity);
        self.by_position.entry(position).or_default().push(id);
        if let Some(unit) = unit {
            self.movable_index.insert(unit, id);
        }
        self.sync_ingoing_connections(id);
        if let Some(observer) = self.observer.as_mut() {
            observer.entity_added(id);
        }
        id
    }

    /// Remove an entity. Severs the partner-side halves of its wire
    /// connections; the returned record keeps its own outgoing wire data
    /// so re-adding it restores the edges.
    pub fn delete_entity(&mut self, id: EntityId) -> Option<StagedEntity> {
        let entity = self.remove_entity_record(id)?;
        if let Some(observer) = self.observer.as_mut() {
            observer.entity_deleted(id);
        }
        Some(entity)
    }

    fn remove_entity_record(&mut self, id: EntityId) -> Option<StagedEntity> {
        let entity = self.entities.remove(id)?;
        let partners: Vec<EntityId> = entity.wire_links().keys().copied().collect();
        for partner in partners {
            if let Some(other) = self.entities.get_mut(partner) {
                if other.remove_wire_partner(id) {
                    self.notify_wires_changed(partner);
                }
            }
        }
        if let Some(cell) = self.by_position.get_mut(&entity.position()) {
            cell.retain(|&e| e != id);
            if cell.is_empty() {
                self.by_position.remove(&entity.position());
            }
        }
        if let Some(unit) = entity.unit_number() {
            self.movable_index.remove(&unit);
        }
        self.pending.remove(&id);
        Some(entity)
    }

    pub fn entity(&self, id: EntityId) -> Option<&StagedEntity> {
        self.entities.get(id)
    }

    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn count_entities(&self) -> usize {
        self.entities.len()
    }

    pub fn iter_entities(&self) -> impl Iterator<Item = (EntityId, &StagedEntity)> {
        self.entities.iter()
    }

    /// Entities indexed at an exact position, in insertion order.
    pub fn entities_at(&self, position: Position) -> &[EntityId] {
        self.by_position
            .get(&position)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter_position_cells(&self) -> impl Iterator<Item = (Position, &[EntityId])> {
        self.by_position.iter().map(|(p, c)| (*p, c.as_slice()))
    }

    // -- Settings remnants --

    /// Keep the entity's record (diffs, wires) but mark it as having no
    /// world presence. Remnants are skipped by compatibility matching.
    pub fn make_settings_remnant(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        if entity.is_settings_remnant() {
            return false;
        }
        entity.set_settings_remnant(true);
        if let Some(observer) = self.observer.as_mut() {
            observer.entity_became_settings_remnant(id);
        }
        true
    }

    pub fn revive_entity(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        if !entity.is_settings_remnant() {
            return false;
        }
        entity.set_settings_remnant(false);
        if let Some(observer) = self.observer.as_mut() {
            observer.entity_revived(id);
        }
        true
    }

    // -- Movable identity --

    /// Bind (or clear) the world unit number of an entity, keeping the
    /// movable index in sync.
    pub fn bind_unit_number(&mut self, id: EntityId, unit: Option<UnitNumber>) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let old = entity.unit_number();
        if old == unit {
            return false;
        }
        entity.set_unit_number(unit);
        if let Some(old) = old {
            self.movable_index.remove(&old);
        }
        if let Some(unit) = unit {
            self.movable_index.insert(unit, id);
        }
        true
    }

    pub fn entity_by_unit_number(&self, unit: UnitNumber) -> Option<EntityId> {
        self.movable_index.get(&unit).copied()
    }

    pub fn iter_movable_bindings(&self) -> impl Iterator<Item = (UnitNumber, EntityId)> {
        self.movable_index.iter().map(|(u, e)| (*u, *e))
    }

    // -- Compatibility matching --

    fn find_compatible_matching(
        &self,
        position: Position,
        stage: Stage,
        matches: impl Fn(&StagedEntity) -> bool,
    ) -> Option<EntityId> {
        let cell = self.by_position.get(&position)?;
        let mut best: Option<(Stage, EntityId)> = None;
        for &id in cell {
            let entity = &self.entities[id];
            if entity.is_settings_remnant() {
                continue;
            }
            if entity.last_stage().is_some_and(|last| last < stage) {
                continue;
            }
            if !matches(entity) {
                continue;
            }
            let first = entity.first_stage();
            if best.is_none_or(|(best_first, _)| first < best_first) {
                best = Some((first, id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// The entity at `position` compatible with `name` and `direction`
    /// (`None` = match any direction), visible through `stage`, preferring
    /// the smallest first stage among ties. Category equivalence lets
    /// different tiers of the same machine match.
    pub fn find_compatible_entity(
        &self,
        name: &str,
        position: Position,
        direction: Option<Direction>,
        stage: Stage,
    ) -> Option<EntityId> {
        self.find_compatible_matching(position, stage, |entity| {
            direction.is_none_or(|d| entity.direction() == d)
                && self.registry.same_category(&entity.first_value().name, name)
        })
    }

    /// Type-specific matching against a live world object. Underground
    /// belts match by underground-facing direction, movable types by
    /// registered identity only, and everything else per its rotation
    /// class.
    pub fn find_compatible_with_external(
        &self,
        external: &ExternalEntity,
        previous_direction: Option<Direction>,
        stage: Stage,
    ) -> Option<EntityId> {
        let prototype = self.registry.get(&external.name);
        let direction = previous_direction.unwrap_or(external.direction);
        match prototype.kind {
            PrototypeKind::Movable => {
                let unit = external.unit_number?;
                self.movable_index.get(&unit).copied()
            }
            PrototypeKind::UndergroundBelt { .. } => {
                let io = external.belt_io.unwrap_or(BeltIo::Input);
                let facing = underground_direction(direction, io);
                self.find_compatible_matching(external.position, stage, |entity| {
                    let Some(entity_io) = entity.underground_io() else {
                        return false;
                    };
                    self.registry
                        .same_category(&entity.first_value().name, &external.name)
                        && underground_direction(entity.direction(), entity_io) == facing
                })
            }
            PrototypeKind::Normal => match prototype.rotation_class {
                RotationClass::AnyDirection => {
                    self.find_compatible_entity(&external.name, external.position, None, stage)
                }
                RotationClass::Exact => self.find_compatible_entity(
                    &external.name,
                    external.position,
                    Some(direction),
                    stage,
                ),
                RotationClass::Flippable => {
                    if direction.is_diagonal() {
                        self.find_compatible_entity(
                            &external.name,
                            external.position,
                            Some(direction),
                            stage,
                        )
                    } else {
                        self.find_compatible_matching(external.position, stage, |entity| {
                            (entity.direction() == direction
                                || entity.direction() == direction.opposite())
                                && self
                                    .registry
                                    .same_category(&entity.first_value().name, &external.name)
                        })
                    }
                }
            },
        }
    }

    // -- Wire connections --

    /// Add a connection between two present entities, updating both
    /// adjacency maps symmetrically. Adding an existing connection (in
    /// either orientation) is a no-op returning `false`.
    pub fn add_wire_connection(&mut self, connection: WireConnection) -> bool {
        let WireConnection {
            from,
            to,
            from_connector,
            to_connector,
        } = connection;
        if from == to || !self.entities.contains_key(from) || !self.entities.contains_key(to) {
            return false;
        }
        let inserted =
            self.entities[from].add_wire_link(to, WireLink::new(from_connector, to_connector));
        self.entities[to].add_wire_link(from, WireLink::new(to_connector, from_connector));
        if inserted {
            self.notify_wires_changed(from);
            self.notify_wires_changed(to);
        }
        inserted
    }

    /// Remove a connection from both endpoints. Order-insensitive.
    pub fn remove_wire_connection(&mut self, connection: WireConnection) -> bool {
        let WireConnection {
            from,
            to,
            from_connector,
            to_connector,
        } = connection;
        let mut removed = false;
        if let Some(entity) = self.entities.get_mut(from) {
            removed |= entity.remove_wire_link(to, WireLink::new(from_connector, to_connector));
        }
        if let Some(entity) = self.entities.get_mut(to) {
            removed |= entity.remove_wire_link(from, WireLink::new(to_connector, from_connector));
        }
        if removed {
            self.notify_wires_changed(from);
            self.notify_wires_changed(to);
        }
        removed
    }

    /// All connections touching `id`, in pair form.
    pub fn wire_connections_of(&self, id: EntityId) -> Vec<WireConnection> {
        let Some(entity) = self.entities.get(id) else {
            return Vec::new();
        };
        entity
            .wire_links()
            .iter()
            .flat_map(|(&partner, links)| {
                links
                    .iter()
                    .map(move |link| WireConnection::new(id, link.local, partner, link.remote))
            })
            .collect()
    }

    /// Reconcile a (re-)added entity's stored connections: drop those whose
    /// partner is gone, re-establish the partner-side half of the rest.
    fn sync_ingoing_connections(&mut self, id: EntityId) {
        let partners: Vec<(EntityId, Vec<WireLink>)> = self.entities[id]
            .wire_links()
            .iter()
            .map(|(&partner, links)| (partner, links.iter().copied().collect()))
            .collect();
        let mut restored = false;
        for (partner, links) in partners {
            if partner != id && self.entities.contains_key(partner) {
                for link in links {
                    if self.entities[partner].add_wire_link(id, link.reversed()) {
                        restored = true;
                        self.notify_wires_changed(partner);
                    }
                }
            } else {
                self.entities[id].remove_wire_partner(partner);
            }
        }
        if restored {
            self.notify_wires_changed(id);
        }
    }

    // -- Entity mutation (value/diff layer) --

    /// See [`StagedEntity::adjust_value_at_stage`].
    pub fn adjust_value_at_stage(
        &mut self,
        id: EntityId,
        stage: Stage,
        value: &EntityValue,
    ) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let changed = entity.adjust_value_at_stage(stage, value);
        if changed {
            self.notify_changed(id, stage);
        }
        changed
    }

    /// See [`StagedEntity::set_prop_at_stage`].
    pub fn set_prop_at_stage(
        &mut self,
        id: EntityId,
        stage: Stage,
        key: &str,
        value: Option<PropValue>,
    ) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let changed = entity.set_prop_at_stage(stage, key, value);
        if changed {
            self.notify_changed(id, stage);
        }
        changed
    }

    /// Apply an upgrade (name change) at `stage`.
    pub fn set_name_at_stage(&mut self, id: EntityId, stage: Stage, name: &str) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let changed = entity.set_name_at_stage(stage, name);
        if changed {
            self.notify_changed(id, stage);
        }
        changed
    }

    /// See [`StagedEntity::reset_prop_at_stage`].
    pub fn reset_prop_at_stage(&mut self, id: EntityId, stage: Stage, key: &str) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let changed = entity.reset_prop_at_stage(stage, key);
        if changed {
            self.notify_changed(id, stage);
        }
        changed
    }

    /// See [`StagedEntity::reset_value_at_stage`].
    pub fn reset_value_at_stage(&mut self, id: EntityId, stage: Stage) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let changed = entity.reset_value_at_stage(stage);
        if changed {
            self.notify_changed(id, stage);
        }
        changed
    }

    /// See [`StagedEntity::move_value_down`]. The change is reported from
    /// the target stage, where the value now differs.
    pub fn move_value_down(&mut self, id: EntityId, stage: Stage) -> Option<Stage> {
        let entity = self.entities.get_mut(id)?;
        let target = entity.move_value_down(stage)?;
        self.notify_changed(id, target);
        Some(target)
    }

    /// See [`StagedEntity::move_prop_down`].
    pub fn move_prop_down(&mut self, id: EntityId, stage: Stage, key: &str) -> Option<Stage> {
        let entity = self.entities.get_mut(id)?;
        let target = entity.move_prop_down(stage, key)?;
        self.notify_changed(id, target);
        Some(target)
    }

    /// See [`StagedEntity::set_stage_property`].
    pub fn set_stage_property(
        &mut self,
        id: EntityId,
        stage: Stage,
        key: &str,
        value: Option<PropValue>,
    ) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let changed = entity.set_stage_property(stage, key, value);
        if changed {
            self.notify_changed(id, stage);
        }
        changed
    }

    /// Dedicated direction setter (direction is never diffed).
    pub fn set_direction(&mut self, id: EntityId, direction: Direction) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let first_stage = entity.first_stage();
        let changed = entity.set_direction(direction);
        if changed {
            self.notify_changed(id, first_stage);
        }
        changed
    }

    /// Dedicated underground-io setter.
    pub fn set_underground_io(&mut self, id: EntityId, io: Option<BeltIo>) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let first_stage = entity.first_stage();
        let changed = entity.set_underground_io(io);
        if changed {
            self.notify_changed(id, first_stage);
        }
        changed
    }

    // -- Entity stage boundaries --

    /// Move an entity's first stage. Movable entities keep their
    /// single-stage window. Reports the change from the lower of the old
    /// and new first stages.
    pub fn set_first_stage(&mut self, id: EntityId, stage: Stage) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let old_first = entity.first_stage();
        let old_last = entity.last_stage();
        if !entity.set_first_stage(stage) {
            return false;
        }
        let new_last = entity.last_stage();
        self.notify_changed(id, old_first.min(stage));
        if new_last != old_last {
            self.notify_last_stage_changed(id, old_last);
        }
        true
    }

    /// Move (or clear) an entity's last stage. Asserts on movable
    /// entities; their window moves with the first stage.
    pub fn set_last_stage(&mut self, id: EntityId, last: Option<Stage>) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let old = entity.last_stage();
        if old == last {
            return false;
        }
        assert!(
            !entity.is_movable(),
            "movable entities are single-stage; move the first stage instead"
        );
        entity.set_last_stage_unchecked(last);
        self.notify_last_stage_changed(id, old);
        true
    }

    // -- Tiles --

    pub fn tile_at(&self, position: Position) -> Option<&StagedTile> {
        self.tiles.get(&position)
    }

    pub fn count_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn iter_tiles(&self) -> impl Iterator<Item = (Position, &StagedTile)> {
        self.tiles.iter().map(|(p, t)| (*p, t))
    }

    /// Set the tile name effective at `stage`, creating the tile if the
    /// position has none.
    pub fn set_tile_at_stage(&mut self, position: Position, stage: Stage, name: &str) -> bool {
        match self.tiles.get_mut(&position) {
            Some(tile) => tile.set_name_at_stage(stage, name),
            None => {
                self.tiles.insert(position, StagedTile::new(name, stage));
                true
            }
        }
    }

    pub fn delete_tile(&mut self, position: Position) -> Option<StagedTile> {
        self.tiles.remove(&position)
    }

    // -- Project-wide stage operations --

    /// Insert a stage before `stage`, renumbering everything at or above it.
    /// Emits no per-entity notifications; the world layer re-syncs after
    /// stage-structure changes.
    pub fn insert_stage(&mut self, stage: Stage) {
        assert!(stage >= 1, "stages are 1-indexed");
        for (_, entity) in self.entities.iter_mut() {
            entity.insert_stage(stage);
        }
        for tile in self.tiles.values_mut() {
            tile.insert_stage(stage);
        }
    }

    /// Merge `stage` into its lower neighbor (stage 2 when `stage == 1`).
    /// Like [`insert_stage`](Self::insert_stage), emits no notifications.
    pub fn merge_stage(&mut self, stage: Stage) {
        assert!(stage >= 1, "stages are 1-indexed");
        for (_, entity) in self.entities.iter_mut() {
            entity.merge_stage(stage);
        }
        for tile in self.tiles.values_mut() {
            tile.merge_stage(stage);
        }
    }

    /// Discard `stage` outright. Entities and tiles created at that stage
    /// are removed from the store; everything else drops its diff for the
    /// stage and renumbers. The observer receives one [`StageDiscard`]
    /// record.
    pub fn discard_stage(&mut self, stage: Stage) {
        assert!(stage >= 1, "stages are 1-indexed");
        let ids: Vec<EntityId> = self.entities.keys().collect();
        let mut deleted_entities = Vec::new();
        let mut updated_entities = Vec::new();
        for id in ids {
            if self.entities[id].first_stage() == stage {
                if let Some(entity) = self.remove_entity_record(id) {
                    deleted_entities.push((id, entity));
                }
            } else if self.entities[id].discard_stage(stage) {
                updated_entities.push(id);
            }
        }

        let mut updated_tile_positions = Vec::new();
        let positions: Vec<Position> = self.tiles.keys().copied().collect();
        for position in positions {
            let Some(tile) = self.tiles.get_mut(&position) else {
                continue;
            };
            if tile.first_stage() == stage {
                self.tiles.remove(&position);
                updated_tile_positions.push(position);
            } else if tile.discard_stage(stage) {
                updated_tile_positions.push(position);
            }
        }

        let record = StageDiscard {
            stage,
            deleted_entities,
            updated_entities,
            updated_tile_positions,
        };
        if let Some(observer) = self.observer.as_mut() {
            observer.stage_discarded(&record);
        }
    }

    // -- Bounding box --

    /// Axis-aligned bounds over all entity and tile positions, expanded by
    /// [`BOUNDING_BOX_MARGIN`]. `None` when the store is empty.
    pub fn compute_bounding_box(&self) -> Option<BoundingBox> {
        let mut bbox: Option<BoundingBox> = None;
        let mut include = |position: Position| match &mut bbox {
            Some(b) => b.include(position),
            None => bbox = Some(BoundingBox::around(position)),
        };
        for (_, entity) in self.entities.iter() {
            include(entity.position());
        }
        for position in self.tiles.keys() {
            include(*position);
        }
        bbox.map(|b| b.expand(BOUNDING_BOX_MARGIN))
    }

    // -- Batching --

    /// Enter a batch. Reentrant; notifications coalesce until the
    /// outermost [`end_batch`](Self::end_batch).
    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Leave a batch, flushing coalesced records at the outermost level.
    /// Calling without a matching `begin_batch` is a programmer error.
    pub fn end_batch(&mut self) {
        assert!(self.batch_depth > 0, "end_batch without matching begin_batch");
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.flush_pending();
        }
    }

    /// Run `f` inside a batch.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.begin_batch();
        let result = f(self);
        self.end_batch();
        result
    }

    fn flush_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let Some(observer) = self.observer.as_mut() else {
            return;
        };
        for (id, record) in pending {
            if let Some(stage) = record.min_stage {
                observer.entity_changed(id, stage);
            }
            if let Some(old_last) = record.old_last_stage {
                observer.entity_last_stage_changed(id, old_last);
            }
            if record.wires_changed {
                observer.wires_changed(id);
            }
        }
    }

    fn notify_changed(&mut self, id: EntityId, from_stage: Stage) {
        if self.batch_depth > 0 {
            self.pending.entry(id).or_default().record_change(from_stage);
        } else if let Some(observer) = self.observer.as_mut() {
            observer.entity_changed(id, from_stage);
        }
    }

    fn notify_last_stage_changed(&mut self, id: EntityId, old_last_stage: Option<Stage>) {
        if self.batch_depth > 0 {
            self.pending
                .entry(id)
                .or_default()
                .record_last_stage(old_last_stage);
        } else if let Some(observer) = self.observer.as_mut() {
            observer.entity_last_stage_changed(id, old_last_stage);
        }
    }

    fn notify_wires_changed(&mut self, id: EntityId) {
        if self.batch_depth > 0 {
            self.pending.entry(id).or_default().wires_changed = true;
        } else if let Some(observer) = self.observer.as_mut() {
            observer.wires_changed(id);
        }
    }

    // -- Snapshot internals --

    pub(crate) fn entities_slotmap(&self) -> &SlotMap<EntityId, StagedEntity> {
        &self.entities
    }

    pub(crate) fn tiles_map(&self) -> &BTreeMap<Position, StagedTile> {
        &self.tiles
    }

    pub(crate) fn movable_map(&self) -> &BTreeMap<UnitNumber, EntityId> {
        &self.movable_index
    }

    /// Rebuild a store from persisted parts, re-deriving the position
    /// index from the entities.
    pub(crate) fn from_parts(
        registry: Arc<PrototypeRegistry>,
        entities: SlotMap<EntityId, StagedEntity>,
        tiles: BTreeMap<Position, StagedTile>,
        movable_index: BTreeMap<UnitNumber, EntityId>,
    ) -> Self {
        let mut by_position: BTreeMap<Position, Vec<EntityId>> = BTreeMap::new();
        for (id, entity) in entities.iter() {
            by_position.entry(entity.position()).or_default().push(id);
        }
        Self {
            registry,
            entities,
            by_position,
            tiles,
            movable_index,
            observer: None,
            batch_depth: 0,
            pending: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for ProjectContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectContent")
            .field("entities", &self.entities.len())
            .field("tiles", &self.tiles.len())
            .field("batch_depth", &self.batch_depth)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use stagecraft_core::wires::WireConnectorId;

    // -----------------------------------------------------------------------
    // Membership and position index
    // -----------------------------------------------------------------------

    #[test]
    fn add_and_delete_maintain_index() {
        let mut content = test_content();
        let id = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));

        assert_eq!(content.count_entities(), 1);
        assert_eq!(content.entities_at(Position::new(0, 0)), &[id]);

        let removed = content.delete_entity(id).unwrap();
        assert_eq!(removed.first_value().name, "assembling-machine-1");
        assert_eq!(content.count_entities(), 0);
        assert!(content.entities_at(Position::new(0, 0)).is_empty());
        assert!(content.delete_entity(id).is_none());
    }

    #[test]
    fn co_located_entities_share_a_cell() {
        let mut content = test_content();
        let a = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let mut later = machine_entity("assembling-machine-1", 0, 0, 4);
        later.set_last_stage_unchecked(Some(6));
        let b = content.add_entity(later);

        let cell = content.entities_at(Position::new(0, 0));
        assert_eq!(cell.len(), 2);
        assert!(cell.contains(&a) && cell.contains(&b));
    }

    // -----------------------------------------------------------------------
    // Compatibility matching
    // -----------------------------------------------------------------------

    #[test]
    fn find_compatible_matches_category_tiers() {
        let mut content = test_content();
        let id = content.add_entity(machine_entity("assembling-machine-1", 2, 3, 2));

        // A different tier of the same category matches at the position.
        let found = content.find_compatible_entity(
            "assembling-machine-2",
            Position::new(2, 3),
            Some(Direction::North),
            5,
        );
        assert_eq!(found, Some(id));
    }

    #[test]
    fn find_compatible_respects_direction_and_last_stage() {
        let mut content = test_content();
        let mut entity = machine_entity("assembling-machine-1", 0, 0, 1);
        entity.set_last_stage_unchecked(Some(3));
        let id = content.add_entity(entity);

        assert_eq!(
            content.find_compatible_entity(
                "assembling-machine-1",
                Position::new(0, 0),
                Some(Direction::East),
                1
            ),
            None
        );
        // Match-any direction.
        assert_eq!(
            content.find_compatible_entity("assembling-machine-1", Position::new(0, 0), None, 1),
            Some(id)
        );
        // Ended before the queried stage.
        assert_eq!(
            content.find_compatible_entity("assembling-machine-1", Position::new(0, 0), None, 4),
            None
        );
    }

    #[test]
    fn find_compatible_prefers_smallest_first_stage() {
        let mut content = test_content();
        let mut early_but_ended = machine_entity("assembling-machine-1", 0, 0, 1);
        early_but_ended.set_last_stage_unchecked(Some(2));
        let _ended = content.add_entity(early_but_ended);
        let late = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 5));
        let mid = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 3));

        let found =
            content.find_compatible_entity("assembling-machine-1", Position::new(0, 0), None, 4);
        // The stage-1 entity ended at 2; of the rest, stage 3 wins over 5.
        assert_eq!(found, Some(mid));
        let _ = late;
    }

    #[test]
    fn settings_remnants_are_skipped() {
        let mut content = test_content();
        let id = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        assert!(content.make_settings_remnant(id));
        assert_eq!(
            content.find_compatible_entity("assembling-machine-1", Position::new(0, 0), None, 1),
            None
        );
        assert!(content.revive_entity(id));
        assert_eq!(
            content.find_compatible_entity("assembling-machine-1", Position::new(0, 0), None, 1),
            Some(id)
        );
    }

    #[test]
    fn external_matching_ignores_direction_for_any_direction_types() {
        let mut content = test_content();
        let id = content.add_entity(machine_entity("storage-chest", 1, 1, 1));

        let external = external_entity("storage-chest", 1, 1, Direction::South);
        assert_eq!(content.find_compatible_with_external(&external, None, 1), Some(id));
    }

    #[test]
    fn external_matching_flippable_accepts_opposite() {
        let mut content = test_content();
        let mut entity = machine_entity("boiler", 0, 0, 1);
        entity.set_direction(Direction::East);
        let id = content.add_entity(entity);

        let flipped = external_entity("boiler", 0, 0, Direction::West);
        assert_eq!(content.find_compatible_with_external(&flipped, None, 1), Some(id));

        let perpendicular = external_entity("boiler", 0, 0, Direction::North);
        assert_eq!(content.find_compatible_with_external(&perpendicular, None, 1), None);
    }

    #[test]
    fn external_matching_flippable_diagonal_is_exact() {
        let mut content = test_content();
        let mut entity = machine_entity("boiler", 0, 0, 1);
        entity.set_direction(Direction::NorthEast);
        let id = content.add_entity(entity);

        let same = external_entity("boiler", 0, 0, Direction::NorthEast);
        assert_eq!(content.find_compatible_with_external(&same, None, 1), Some(id));

        let opposite = external_entity("boiler", 0, 0, Direction::SouthWest);
        assert_eq!(content.find_compatible_with_external(&opposite, None, 1), None);
    }

    #[test]
    fn external_matching_underground_uses_buried_direction() {
        let mut content = test_content();
        // An east-facing input and a west-facing output extend the same way.
        let id = content.add_entity(underground_entity(0, 0, Direction::East, BeltIo::Input, 1));

        let mut external = external_entity("underground-belt", 0, 0, Direction::West);
        external.belt_io = Some(BeltIo::Output);
        assert_eq!(content.find_compatible_with_external(&external, None, 1), Some(id));

        let mut mismatched = external_entity("underground-belt", 0, 0, Direction::East);
        mismatched.belt_io = Some(BeltIo::Output);
        assert_eq!(content.find_compatible_with_external(&mismatched, None, 1), None);
    }

    #[test]
    fn external_matching_movable_uses_identity_only() {
        let mut content = test_content();
        let id = content.add_entity(movable_entity("locomotive", 4, 4, 2));
        assert!(content.bind_unit_number(id, Some(UnitNumber(99))));

        let mut external = external_entity("locomotive", 4, 4, Direction::North);
        // Right position but no identity: no match.
        assert_eq!(content.find_compatible_with_external(&external, None, 2), None);

        external.unit_number = Some(UnitNumber(99));
        // Identity matches even from a different position.
        external.position = Position::new(100, 100);
        assert_eq!(content.find_compatible_with_external(&external, None, 2), Some(id));
    }

    #[test]
    fn previous_direction_overrides_external_direction() {
        let mut content = test_content();
        let id = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));

        let mut external = external_entity("assembling-machine-1", 0, 0, Direction::East);
        assert_eq!(content.find_compatible_with_external(&external, None, 1), None);
        // The world object was just rotated; matching uses its previous
        // direction.
        assert_eq!(
            content.find_compatible_with_external(&external, Some(Direction::North), 1),
            Some(id)
        );
        external.direction = Direction::North;
        assert_eq!(content.find_compatible_with_external(&external, None, 1), Some(id));
    }

    // -----------------------------------------------------------------------
    // Wire connections
    // -----------------------------------------------------------------------

    #[test]
    fn wire_connections_are_symmetric() {
        let mut content = test_content();
        let a = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let b = content.add_entity(machine_entity("assembling-machine-1", 1, 0, 1));

        let connection =
            WireConnection::new(a, WireConnectorId::CircuitRed, b, WireConnectorId::CircuitRed);
        assert!(content.add_wire_connection(connection));
        // Re-adding in the opposite orientation is a no-op.
        assert!(!content.add_wire_connection(connection.flipped()));

        let a_links = content.entity(a).unwrap().wire_links_to(b).unwrap();
        let b_links = content.entity(b).unwrap().wire_links_to(a).unwrap();
        assert_eq!(a_links.len(), 1);
        assert_eq!(b_links.len(), 1);

        let from_a = content.wire_connections_of(a);
        let from_b = content.wire_connections_of(b);
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0], from_b[0]);
    }

    #[test]
    fn parallel_wires_coexist() {
        let mut content = test_content();
        let a = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let b = content.add_entity(machine_entity("assembling-machine-1", 1, 0, 1));

        assert!(content.add_wire_connection(WireConnection::new(
            a,
            WireConnectorId::CircuitRed,
            b,
            WireConnectorId::CircuitRed
        )));
        assert!(content.add_wire_connection(WireConnection::new(
            a,
            WireConnectorId::CircuitGreen,
            b,
            WireConnectorId::CircuitGreen
        )));
        assert_eq!(content.wire_connections_of(a).len(), 2);
    }

    #[test]
    fn delete_preserves_own_wires_for_restoration() {
        let mut content = test_content();
        let a = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let b = content.add_entity(machine_entity("assembling-machine-1", 1, 0, 1));
        content.add_wire_connection(WireConnection::new(
            a,
            WireConnectorId::CircuitRed,
            b,
            WireConnectorId::CircuitRed,
        ));

        let removed = content.delete_entity(a).unwrap();
        // The partner's side is severed; the removed record keeps its own.
        assert!(content.entity(b).unwrap().wire_links().is_empty());
        assert!(removed.has_wire_links());

        // Re-adding restores the symmetric edge.
        let a2 = content.add_entity(removed);
        assert_eq!(content.wire_connections_of(a2).len(), 1);
        assert_eq!(
            content.entity(b).unwrap().wire_links_to(a2).unwrap().len(),
            1
        );
    }

    #[test]
    fn re_add_drops_connections_to_missing_partners() {
        let mut content = test_content();
        let a = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let b = content.add_entity(machine_entity("assembling-machine-1", 1, 0, 1));
        content.add_wire_connection(WireConnection::new(
            a,
            WireConnectorId::CircuitRed,
            b,
            WireConnectorId::CircuitRed,
        ));

        let removed = content.delete_entity(a).unwrap();
        content.delete_entity(b);
        let a2 = content.add_entity(removed);
        assert!(!content.entity(a2).unwrap().has_wire_links());
    }

    #[test]
    fn remove_wire_connection_is_order_insensitive() {
        let mut content = test_content();
        let a = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let b = content.add_entity(machine_entity("assembling-machine-1", 1, 0, 1));
        let connection =
            WireConnection::new(a, WireConnectorId::CircuitRed, b, WireConnectorId::CircuitRed);
        content.add_wire_connection(connection);

        assert!(content.remove_wire_connection(connection.flipped()));
        assert!(!content.entity(a).unwrap().has_wire_links());
        assert!(!content.entity(b).unwrap().has_wire_links());
        assert!(!content.remove_wire_connection(connection));
    }

    // -----------------------------------------------------------------------
    // Stage operations across the store
    // -----------------------------------------------------------------------

    #[test]
    fn discard_stage_removes_entities_created_there() {
        let mut content = test_content();
        let keep = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let drop1 = content.add_entity(machine_entity("assembling-machine-1", 1, 0, 3));
        let drop2 = content.add_entity(machine_entity("assembling-machine-1", 2, 0, 3));

        content.discard_stage(3);

        assert_eq!(content.count_entities(), 1);
        assert!(content.contains_entity(keep));
        assert!(!content.contains_entity(drop1));
        assert!(!content.contains_entity(drop2));
    }

    #[test]
    fn discard_stage_drops_tiles_created_there() {
        let mut content = test_content();
        content.set_tile_at_stage(Position::new(0, 0), 2, "concrete");
        content.set_tile_at_stage(Position::new(1, 0), 1, "stone-path");
        content.set_tile_at_stage(Position::new(1, 0), 2, "concrete");

        content.discard_stage(2);

        assert!(content.tile_at(Position::new(0, 0)).is_none());
        let survivor = content.tile_at(Position::new(1, 0)).unwrap();
        assert_eq!(survivor.name_at_stage(2), Some("stone-path"));
    }

    #[test]
    fn insert_stage_renumbers_whole_store() {
        let mut content = test_content();
        let id = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 2));
        content.set_tile_at_stage(Position::new(5, 5), 2, "concrete");

        content.insert_stage(1);

        assert_eq!(content.entity(id).unwrap().first_stage(), 3);
        assert_eq!(content.tile_at(Position::new(5, 5)).unwrap().first_stage(), 3);
    }

    // -----------------------------------------------------------------------
    // Bounding box
    // -----------------------------------------------------------------------

    #[test]
    fn bounding_box_covers_entities_and_tiles() {
        let mut content = test_content();
        assert_eq!(content.compute_bounding_box(), None);

        content.add_entity(machine_entity("assembling-machine-1", -3, 2, 1));
        content.set_tile_at_stage(Position::new(7, -1), 1, "concrete");

        let bbox = content.compute_bounding_box().unwrap();
        assert_eq!(bbox.min, Position::new(-3 - BOUNDING_BOX_MARGIN, -1 - BOUNDING_BOX_MARGIN));
        assert_eq!(bbox.max, Position::new(7 + BOUNDING_BOX_MARGIN, 2 + BOUNDING_BOX_MARGIN));
    }

    // -----------------------------------------------------------------------
    // Batching and notifications
    // -----------------------------------------------------------------------

    #[test]
    fn batch_coalesces_to_minimum_stage() {
        let mut content = test_content();
        let id = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let log = install_recorder(&mut content);

        content.batch(|content| {
            content.set_prop_at_stage(id, 3, "recipe", Some("gears".into()));
            content.set_prop_at_stage(id, 2, "recipe", Some("pipes".into()));
        });

        let changes: Vec<(EntityId, Stage)> = log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Recorded::Changed(id, stage) => Some((*id, *stage)),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![(id, 2)]);
    }

    #[test]
    fn nested_batches_flush_once_at_outermost_end() {
        let mut content = test_content();
        let id = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let log = install_recorder(&mut content);

        content.begin_batch();
        content.begin_batch();
        content.set_prop_at_stage(id, 4, "recipe", Some("gears".into()));
        content.end_batch();
        assert!(log.borrow().is_empty());
        content.end_batch();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    #[should_panic(expected = "end_batch without matching begin_batch")]
    fn unbalanced_end_batch_asserts() {
        let mut content = test_content();
        content.end_batch();
    }

    #[test]
    fn batch_remembers_first_old_last_stage() {
        let mut content = test_content();
        let id = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let log = install_recorder(&mut content);

        content.batch(|content| {
            content.set_last_stage(id, Some(5));
            content.set_last_stage(id, Some(7));
        });

        let last_changes: Vec<Option<Stage>> = log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Recorded::LastStageChanged(_, old) => Some(*old),
                _ => None,
            })
            .collect();
        assert_eq!(last_changes, vec![None]);
        assert_eq!(content.entity(id).unwrap().last_stage(), Some(7));
    }

    #[test]
    fn no_notification_for_true_no_ops() {
        let mut content = test_content();
        let id = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let log = install_recorder(&mut content);

        let value = content.entity(id).unwrap().value_at_stage(1).unwrap();
        assert!(!content.adjust_value_at_stage(id, 1, &value));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn lifecycle_events_are_immediate() {
        let mut content = test_content();
        let log = install_recorder(&mut content);

        let id = content.batch(|content| {
            let id = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
            assert!(matches!(content_log_last(&log), Some(Recorded::Added(_))));
            id
        });
        content.delete_entity(id);
        assert!(matches!(content_log_last(&log), Some(Recorded::Deleted(_))));
    }

    fn content_log_last(
        log: &std::rc::Rc<std::cell::RefCell<Vec<Recorded>>>,
    ) -> Option<Recorded> {
        log.borrow().last().cloned()
    }
}
