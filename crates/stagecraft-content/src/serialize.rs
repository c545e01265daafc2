//! Versioned binary snapshots of a project's content.
//!
//! Snapshots capture the full persisted shape -- entities with their
//! diffs, side properties, and wire adjacency, tiles, and the movable
//! identity index -- via `bitcode`, prefixed with a magic/version header
//! for format detection. The observer and batch state are not persisted.
//! The position index is derived state and is rebuilt on load.

use crate::content::ProjectContent;
use slotmap::SlotMap;
use stagecraft_core::entity::StagedEntity;
use stagecraft_core::id::{EntityId, UnitNumber};
use stagecraft_core::pos::Position;
use stagecraft_core::prototype::PrototypeRegistry;
use stagecraft_core::tile::StagedTile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a stagecraft content snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x57A6_C001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Header prepended to every snapshot, enabling format detection and
/// version checking before the payload is trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Entity count at save time, for diagnostics.
    pub entity_count: u64,
}

impl SnapshotHeader {
    pub fn new(entity_count: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            entity_count,
        }
    }

    /// Validate the header. Returns `Ok(())` if valid.
    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version != FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// The serializable portion of a store. Excludes the observer (contains
/// callbacks) and the position index (derived from entity positions).
#[derive(Debug, Serialize, Deserialize)]
struct ContentSnapshot {
    header: SnapshotHeader,
    entities: SlotMap<EntityId, StagedEntity>,
    tiles: BTreeMap<Position, StagedTile>,
    movable_index: BTreeMap<UnitNumber, EntityId>,
}

// ---------------------------------------------------------------------------
// Save / load
// ---------------------------------------------------------------------------

/// Serialize the store's persisted state to bytes.
pub fn save_snapshot(content: &ProjectContent) -> Result<Vec<u8>, SerializeError> {
    let snapshot = ContentSnapshot {
        header: SnapshotHeader::new(content.count_entities() as u64),
        entities: content.entities_slotmap().clone(),
        tiles: content.tiles_map().clone(),
        movable_index: content.movable_map().clone(),
    };
    bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
}

/// Deserialize a snapshot into a fresh store over `registry`, rebuilding
/// the position index.
pub fn load_snapshot(
    registry: Arc<PrototypeRegistry>,
    data: &[u8],
) -> Result<ProjectContent, DeserializeError> {
    let snapshot: ContentSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    snapshot.header.validate()?;
    Ok(ProjectContent::from_parts(
        registry,
        snapshot.entities,
        snapshot.tiles,
        snapshot.movable_index,
    ))
}

/// Decode just the header, for version detection before a full load.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    let snapshot: ContentSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use stagecraft_core::id::UnitNumber;
    use stagecraft_core::pos::Position;
    use stagecraft_core::wires::{WireConnection, WireConnectorId};

    fn populated_content() -> ProjectContent {
        let mut content = test_content();
        let a = content.add_entity(machine_entity("assembling-machine-1", 0, 0, 1));
        let b = content.add_entity(machine_entity("assembling-machine-2", 3, 1, 2));
        content.set_prop_at_stage(a, 3, "recipe", Some("gears".into()));
        content.set_name_at_stage(a, 4, "assembling-machine-2");
        content.set_stage_property(a, 2, "excluded", Some(true.into()));
        content.set_last_stage(b, Some(6));
        content.add_wire_connection(WireConnection::new(
            a,
            WireConnectorId::CircuitRed,
            b,
            WireConnectorId::CircuitGreen,
        ));
        let train = content.add_entity(movable_entity("locomotive", 9, 9, 3));
        content.bind_unit_number(train, Some(UnitNumber(42)));
        content.set_tile_at_stage(Position::new(1, 1), 1, "stone-path");
        content.set_tile_at_stage(Position::new(1, 1), 3, "concrete");
        content
    }

    #[test]
    fn snapshot_round_trips_losslessly() {
        let content = populated_content();
        let bytes = save_snapshot(&content).unwrap();
        let restored = load_snapshot(content.registry_handle(), &bytes).unwrap();

        assert_eq!(restored.count_entities(), content.count_entities());
        for (id, entity) in content.iter_entities() {
            assert_eq!(restored.entity(id), Some(entity));
        }
        for (position, tile) in content.iter_tiles() {
            assert_eq!(restored.tile_at(position), Some(tile));
        }
        assert_eq!(
            restored.iter_movable_bindings().collect::<Vec<_>>(),
            content.iter_movable_bindings().collect::<Vec<_>>()
        );
        // Derived index is rebuilt.
        for (position, cell) in content.iter_position_cells() {
            let mut restored_cell = restored.entities_at(position).to_vec();
            let mut cell = cell.to_vec();
            restored_cell.sort();
            cell.sort();
            assert_eq!(restored_cell, cell);
        }
    }

    #[test]
    fn header_reports_entity_count() {
        let content = populated_content();
        let bytes = save_snapshot(&content).unwrap();
        let header = read_snapshot_header(&bytes).unwrap();
        assert_eq!(header.entity_count, content.count_entities() as u64);
        assert!(header.validate().is_ok());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let header = SnapshotHeader {
            magic: 0xDEAD_BEEF,
            version: FORMAT_VERSION,
            entity_count: 0,
        };
        assert!(matches!(
            header.validate(),
            Err(DeserializeError::InvalidMagic(0xDEAD_BEEF))
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let content = test_content();
        let mut snapshot = ContentSnapshot {
            header: SnapshotHeader::new(0),
            entities: content.entities_slotmap().clone(),
            tiles: content.tiles_map().clone(),
            movable_index: content.movable_map().clone(),
        };
        snapshot.header.version = FORMAT_VERSION + 1;
        let bytes = bitcode::serialize(&snapshot).unwrap();
        assert!(matches!(
            load_snapshot(content.registry_handle(), &bytes),
            Err(DeserializeError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let registry = test_registry();
        assert!(matches!(
            load_snapshot(registry, &[0x01, 0x02, 0x03]),
            Err(DeserializeError::Decode(_))
        ));
    }
}
