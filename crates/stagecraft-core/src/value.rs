//! Entity configuration values: a concrete `name` plus an open property bag.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keys that never participate in diffing. Geometric and orientation state
/// lives on the entity itself and is invariant across stages.
pub const RESERVED_PROP_KEYS: [&str; 3] = ["position", "direction", "type"];

/// Orientation-like key dropped from movable entities' values (their
/// fractional placement is world state, not configuration).
pub const ORIENTATION_KEY: &str = "orientation";

/// A deeply comparable property value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<PropValue>),
    Dict(BTreeMap<String, PropValue>),
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}

/// One entity's configuration at a single stage: the entity name (which
/// changes across stages when the entity is upgraded) plus arbitrary typed
/// properties. Reserved geometric keys are never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityValue {
    pub name: String,
    pub props: BTreeMap<String, PropValue>,
}

impl EntityValue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            props: BTreeMap::new(),
        }
    }

    /// Builder-style property insertion, for fixtures and tests.
    pub fn with_prop(mut self, key: &str, value: impl Into<PropValue>) -> Self {
        self.props.insert(key.to_string(), value.into());
        self
    }

    pub fn prop(&self, key: &str) -> Option<&PropValue> {
        self.props.get(key)
    }

    /// Drop reserved geometric keys that callers may have copied in from a
    /// world object.
    pub fn strip_reserved(&mut self) {
        for key in RESERVED_PROP_KEYS {
            self.props.remove(key);
        }
    }
}
