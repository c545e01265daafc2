//! Data-driven prototype loading from JSON.
//!
//! Feature-gated behind `data-loader`. Provides JSON deserialization into
//! [`RegistryBuilder`] for prototype classification defined in data files.

use crate::prototype::{EntityPrototype, PrototypeKind, RegistryBuilder, RotationClass};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("unknown rotation class: {0}")]
    UnknownRotationClass(String),
    #[error("unknown prototype kind: {0}")]
    UnknownKind(String),
    #[error("underground prototype {0} is missing a reach")]
    MissingReach(String),
}

// ---------------------------------------------------------------------------
// JSON data structures
// ---------------------------------------------------------------------------

/// Top-level prototype data structure for JSON deserialization.
#[derive(Debug, serde::Deserialize)]
pub struct PrototypeData {
    #[serde(default)]
    pub prototypes: Vec<PrototypeEntryData>,
}

/// JSON representation of one prototype entry.
#[derive(Debug, serde::Deserialize)]
pub struct PrototypeEntryData {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    /// "exact", "any-direction", or "flippable".
    #[serde(default)]
    pub rotation: Option<String>,
    /// "normal", "underground-belt", or "movable".
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub reach: Option<u32>,
}

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

/// Load a registry builder from a JSON string.
pub fn load_prototypes_json(json: &str) -> Result<RegistryBuilder, DataLoadError> {
    let data: PrototypeData = serde_json::from_str(json)?;
    build_registry(data)
}

/// Load a registry builder from JSON bytes.
pub fn load_prototypes_json_bytes(bytes: &[u8]) -> Result<RegistryBuilder, DataLoadError> {
    let data: PrototypeData = serde_json::from_slice(bytes)?;
    build_registry(data)
}

fn parse_rotation(value: Option<&str>) -> Result<RotationClass, DataLoadError> {
    match value {
        None | Some("exact") => Ok(RotationClass::Exact),
        Some("any-direction") => Ok(RotationClass::AnyDirection),
        Some("flippable") => Ok(RotationClass::Flippable),
        Some(other) => Err(DataLoadError::UnknownRotationClass(other.to_string())),
    }
}

fn parse_kind(entry: &PrototypeEntryData) -> Result<PrototypeKind, DataLoadError> {
    match entry.kind.as_deref() {
        None | Some("normal") => Ok(PrototypeKind::Normal),
        Some("underground-belt") => {
            let reach = entry
                .reach
                .ok_or_else(|| DataLoadError::MissingReach(entry.name.clone()))?;
            Ok(PrototypeKind::UndergroundBelt { reach })
        }
        Some("movable") => Ok(PrototypeKind::Movable),
        Some(other) => Err(DataLoadError::UnknownKind(other.to_string())),
    }
}

fn build_registry(data: PrototypeData) -> Result<RegistryBuilder, DataLoadError> {
    let mut builder = RegistryBuilder::new();
    for entry in &data.prototypes {
        let rotation_class = parse_rotation(entry.rotation.as_deref())?;
        let kind = parse_kind(entry)?;
        builder.register(EntityPrototype {
            name: entry.name.clone(),
            category: entry.category.clone(),
            rotation_class,
            kind,
        });
    }
    Ok(builder)
}
