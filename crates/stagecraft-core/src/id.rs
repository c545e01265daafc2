use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies an entity within a project's content store.
    pub struct EntityId;
}

/// A build stage number. 1-indexed and dense within a project: stages may
/// be inserted, merged, or discarded, renumbering everything above them.
pub type Stage = u32;

/// Identity of a live world object, assigned by the host. Used to match
/// movable entities (rolling stock), which never match by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitNumber(pub u64);
