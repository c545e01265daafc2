//! Stagecraft Core -- the staged-construction data model.
//!
//! A staged project is a sequence of numbered build stages (1-indexed,
//! dense). Every entity in the project exists from a first stage, optionally
//! up to a last stage, and carries a full configuration value at its first
//! stage plus a sparse map of per-stage deltas. This crate provides the
//! leaf types and algorithms for that model:
//!
//! - [`diff`] -- pure functions computing, applying, and composing minimal
//!   property-level deltas, with an explicit removal marker that
//!   distinguishes "set to absent" from "never mentioned".
//! - [`entity::StagedEntity`] -- one entity's full history: first value,
//!   stage diffs with automatic redundancy trimming, per-stage side
//!   properties, and stage renumbering (insert/merge/discard).
//! - [`tile::StagedTile`] -- the single-property reduction of the same
//!   model for ground tiles.
//! - [`wires`] -- symmetric wire-connection types with orientation-free
//!   equality and parallel-edge identity.
//! - [`prototype::PrototypeRegistry`] -- the static classification tables
//!   (upgrade categories, rotation compatibility, underground reach,
//!   movable types) consumed by compatibility matching. Built once and
//!   passed into the content store explicitly; there are no globals.
//! - [`external`] -- the narrow interface to the world-sync layer: a
//!   snapshot of a live world object and the lookup capability the core
//!   consumes but never implements.
//!
//! The aggregate container over these types lives in `stagecraft-content`.

pub mod diff;
pub mod entity;
pub mod external;
pub mod id;
pub mod pos;
pub mod prototype;
pub mod tile;
pub mod value;
pub mod wires;

#[cfg(feature = "data-loader")]
pub mod data_loader;
