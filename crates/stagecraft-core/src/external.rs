//! The narrow interface between the core model and the world-sync layer.
//!
//! The core never holds world objects. Matching logic consumes a plain
//! snapshot ([`ExternalEntity`]) of whatever the host found in the world,
//! and wire reconciliation consumes the [`WorldEntityLookup`] capability to
//! ask which logical entities currently have a live counterpart.

use crate::id::{EntityId, Stage, UnitNumber};
use crate::pos::{Direction, Position};
use serde::{Deserialize, Serialize};

/// Which end of an underground run a belt is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BeltIo {
    /// Items enter the ground here; the belt faces along its travel.
    Input,
    /// Items surface here; the sprite faces opposite the travel direction.
    Output,
}

/// The direction an underground belt's buried run extends in. Input ends
/// extend along their nominal direction, output ends opposite it.
pub fn underground_direction(direction: Direction, io: BeltIo) -> Direction {
    match io {
        BeltIo::Input => direction,
        BeltIo::Output => direction.opposite(),
    }
}

/// A snapshot of a live world object, as handed over by the adapter layer
/// for compatibility matching. Carries only what matching consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEntity {
    pub name: String,
    pub position: Position,
    pub direction: Direction,
    /// Present iff the object is an underground belt.
    pub belt_io: Option<BeltIo>,
    /// Host identity, present for registered movable objects.
    pub unit_number: Option<UnitNumber>,
}

/// Capability the adapter layer provides: which live world object, if any,
/// realizes a logical entity at a stage. Consumed by wire reconciliation;
/// the core itself never depends on world identity otherwise.
pub trait WorldEntityLookup {
    fn world_unit(&self, entity: EntityId, stage: Stage) -> Option<UnitNumber>;
}
