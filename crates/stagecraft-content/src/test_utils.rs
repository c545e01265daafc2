//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these are
//! available to in-crate tests and, via the `test-utils` feature, to
//! integration tests and benchmarks.

use crate::content::ProjectContent;
use crate::observer::{ContentObserver, StageDiscard};
use stagecraft_core::entity::StagedEntity;
use stagecraft_core::external::{BeltIo, ExternalEntity};
use stagecraft_core::id::{EntityId, Stage};
use stagecraft_core::pos::{Direction, Position};
use stagecraft_core::prototype::{PrototypeRegistry, RegistryBuilder, RotationClass};
use stagecraft_core::value::EntityValue;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

// ===========================================================================
// Registry fixture
// ===========================================================================

/// The standard test registry: two assembler tiers sharing a category, an
/// underground belt with reach 5, a flippable boiler, an any-direction
/// chest, and a movable locomotive.
pub fn test_registry() -> Arc<PrototypeRegistry> {
    let mut builder = RegistryBuilder::new();
    builder
        .register_normal(
            "assembling-machine-1",
            Some("assembling-machine"),
            RotationClass::Exact,
        )
        .register_normal(
            "assembling-machine-2",
            Some("assembling-machine"),
            RotationClass::Exact,
        )
        .register_normal("storage-chest", None, RotationClass::AnyDirection)
        .register_normal("boiler", None, RotationClass::Flippable)
        .register_normal("transport-belt", Some("transport-belt"), RotationClass::Exact)
        .register_underground("underground-belt", "underground-belt", 5)
        .register_movable("locomotive");
    Arc::new(builder.build())
}

/// An empty store over the standard test registry.
pub fn test_content() -> ProjectContent {
    ProjectContent::new(test_registry())
}

// ===========================================================================
// Entity constructors
// ===========================================================================

/// A north-facing entity of `name` at (x, y), created at `first_stage`.
pub fn machine_entity(name: &str, x: i32, y: i32, first_stage: Stage) -> StagedEntity {
    StagedEntity::new(
        EntityValue::new(name),
        Position::new(x, y),
        Direction::North,
        first_stage,
        &test_registry(),
    )
}

/// An underground belt end at (x, y).
pub fn underground_entity(
    x: i32,
    y: i32,
    direction: Direction,
    io: BeltIo,
    first_stage: Stage,
) -> StagedEntity {
    let mut entity = StagedEntity::new(
        EntityValue::new("underground-belt"),
        Position::new(x, y),
        direction,
        first_stage,
        &test_registry(),
    );
    entity.set_underground_io(Some(io));
    entity
}

/// A movable (single-stage) entity at (x, y).
pub fn movable_entity(name: &str, x: i32, y: i32, first_stage: Stage) -> StagedEntity {
    StagedEntity::new(
        EntityValue::new(name),
        Position::new(x, y),
        Direction::North,
        first_stage,
        &test_registry(),
    )
}

/// A world-object snapshot for external matching tests.
pub fn external_entity(name: &str, x: i32, y: i32, direction: Direction) -> ExternalEntity {
    ExternalEntity {
        name: name.to_string(),
        position: Position::new(x, y),
        direction,
        belt_io: None,
        unit_number: None,
    }
}

// ===========================================================================
// Recording observer
// ===========================================================================

/// One observed callback, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Added(EntityId),
    Deleted(EntityId),
    Changed(EntityId, Stage),
    LastStageChanged(EntityId, Option<Stage>),
    BecameSettingsRemnant(EntityId),
    Revived(EntityId),
    WiresChanged(EntityId),
    /// (stage, deleted count, updated count, tile count).
    StageDiscarded(Stage, usize, usize, usize),
}

/// Observer that appends every callback to a shared log.
pub struct RecordingObserver {
    log: Rc<RefCell<Vec<Recorded>>>,
}

impl ContentObserver for RecordingObserver {
    fn entity_added(&mut self, entity: EntityId) {
        self.log.borrow_mut().push(Recorded::Added(entity));
    }

    fn entity_deleted(&mut self, entity: EntityId) {
        self.log.borrow_mut().push(Recorded::Deleted(entity));
    }

    fn entity_changed(&mut self, entity: EntityId, from_stage: Stage) {
        self.log.borrow_mut().push(Recorded::Changed(entity, from_stage));
    }

    fn entity_last_stage_changed(&mut self, entity: EntityId, old_last_stage: Option<Stage>) {
        self.log
            .borrow_mut()
            .push(Recorded::LastStageChanged(entity, old_last_stage));
    }

    fn entity_became_settings_remnant(&mut self, entity: EntityId) {
        self.log
            .borrow_mut()
            .push(Recorded::BecameSettingsRemnant(entity));
    }

    fn entity_revived(&mut self, entity: EntityId) {
        self.log.borrow_mut().push(Recorded::Revived(entity));
    }

    fn wires_changed(&mut self, entity: EntityId) {
        self.log.borrow_mut().push(Recorded::WiresChanged(entity));
    }

    fn stage_discarded(&mut self, discard: &StageDiscard) {
        self.log.borrow_mut().push(Recorded::StageDiscarded(
            discard.stage,
            discard.deleted_entities.len(),
            discard.updated_entities.len(),
            discard.updated_tile_positions.len(),
        ));
    }
}

/// Install a [`RecordingObserver`] and return the shared log handle.
pub fn install_recorder(content: &mut ProjectContent) -> Rc<RefCell<Vec<Recorded>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    content.set_observer(Box::new(RecordingObserver { log: Rc::clone(&log) }));
    log
}
