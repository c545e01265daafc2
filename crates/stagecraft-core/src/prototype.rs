//! Static entity classification tables: upgrade categories, rotation
//! compatibility, underground reach, and movable types.
//!
//! The registry is immutable once built and is passed explicitly into the
//! content store at construction. Lookups are total: names that were never
//! registered resolve to a default prototype (exact-rotation, no category),
//! so unknown entities degrade to name-and-direction matching.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How direction participates in compatibility matching for a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotationClass {
    /// Direction must match exactly.
    #[default]
    Exact,
    /// Direction is ignored entirely (square footprints, storage, poles).
    AnyDirection,
    /// Rectangular types that occupy the same cells when flipped: the
    /// opposite direction also matches, unless the entity is diagonally
    /// oriented, in which case the match must be exact.
    Flippable,
}

/// Behavioral classification of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrototypeKind {
    /// Ordinary placeable entity.
    #[default]
    Normal,
    /// Underground belt with the given maximum pairing reach in cells.
    UndergroundBelt { reach: u32 },
    /// Movable entity (rolling stock): occupies exactly one stage and is
    /// matched by registered identity only, never by position.
    Movable,
}

/// One entity type's classification entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPrototype {
    pub name: String,
    /// Upgrade category. Two names in the same non-empty category are
    /// interchangeable for position matching (e.g. machine tiers).
    pub category: Option<String>,
    pub rotation_class: RotationClass,
    pub kind: PrototypeKind,
}

impl EntityPrototype {
    /// Default prototype for a name that was never registered.
    fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            category: None,
            rotation_class: RotationClass::Exact,
            kind: PrototypeKind::Normal,
        }
    }

    /// Underground pairing reach, if this is an underground belt.
    pub fn underground_reach(&self) -> Option<u32> {
        match self.kind {
            PrototypeKind::UndergroundBelt { reach } => Some(reach),
            _ => None,
        }
    }

    pub fn is_underground(&self) -> bool {
        matches!(self.kind, PrototypeKind::UndergroundBelt { .. })
    }

    pub fn is_movable(&self) -> bool {
        self.kind == PrototypeKind::Movable
    }
}

/// Builder for constructing an immutable [`PrototypeRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    prototypes: Vec<EntityPrototype>,
    name_to_index: HashMap<String, usize>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prototype. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&mut self, prototype: EntityPrototype) -> &mut Self {
        if let Some(&idx) = self.name_to_index.get(&prototype.name) {
            self.prototypes[idx] = prototype;
        } else {
            self.name_to_index
                .insert(prototype.name.clone(), self.prototypes.len());
            self.prototypes.push(prototype);
        }
        self
    }

    /// Shorthand for registering an ordinary entity type.
    pub fn register_normal(
        &mut self,
        name: &str,
        category: Option<&str>,
        rotation_class: RotationClass,
    ) -> &mut Self {
        self.register(EntityPrototype {
            name: name.to_string(),
            category: category.map(str::to_string),
            rotation_class,
            kind: PrototypeKind::Normal,
        })
    }

    /// Shorthand for registering an underground belt type.
    pub fn register_underground(&mut self, name: &str, category: &str, reach: u32) -> &mut Self {
        self.register(EntityPrototype {
            name: name.to_string(),
            category: Some(category.to_string()),
            rotation_class: RotationClass::Exact,
            kind: PrototypeKind::UndergroundBelt { reach },
        })
    }

    /// Shorthand for registering a movable (rolling stock) type.
    pub fn register_movable(&mut self, name: &str) -> &mut Self {
        self.register(EntityPrototype {
            name: name.to_string(),
            category: None,
            rotation_class: RotationClass::Exact,
            kind: PrototypeKind::Movable,
        })
    }

    /// Finalize into the immutable registry.
    pub fn build(self) -> PrototypeRegistry {
        PrototypeRegistry {
            prototypes: self.prototypes,
            name_to_index: self.name_to_index,
        }
    }
}

/// Immutable classification tables, frozen at startup.
#[derive(Debug, Clone, Default)]
pub struct PrototypeRegistry {
    prototypes: Vec<EntityPrototype>,
    name_to_index: HashMap<String, usize>,
}

impl PrototypeRegistry {
    /// Empty registry: every name resolves to the default prototype.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a prototype by name. Total: unknown names yield a default
    /// exact-rotation prototype.
    pub fn get(&self, name: &str) -> EntityPrototype {
        match self.name_to_index.get(name) {
            Some(&idx) => self.prototypes[idx].clone(),
            None => EntityPrototype::unknown(name),
        }
    }

    /// Whether `name` was explicitly registered.
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Whether two names are interchangeable for position matching:
    /// identical, or both members of the same non-empty category.
    pub fn same_category(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        match (self.category_of(a), self.category_of(b)) {
            (Some(ca), Some(cb)) => ca == cb,
            _ => false,
        }
    }

    fn category_of(&self, name: &str) -> Option<&str> {
        let idx = *self.name_to_index.get(name)?;
        self.prototypes[idx].category.as_deref()
    }

    /// Number of registered prototypes.
    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    /// Iterate over all registered prototypes.
    pub fn iter(&self) -> impl Iterator<Item = &EntityPrototype> {
        self.prototypes.iter()
    }
}
