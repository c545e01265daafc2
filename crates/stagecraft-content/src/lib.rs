//! Stagecraft Content -- the aggregate container for a staged project.
//!
//! [`ProjectContent`] owns every entity and tile in one project: a slotmap
//! arena of staged entities, a position index supporting multiple
//! co-located entities with disjoint stage ranges, a tile store, symmetric
//! wire-connection maintenance, and a single coalescing observer for the
//! world-sync layer.
//!
//! # Key Types
//!
//! - [`content::ProjectContent`] -- the store and its mutation API. All
//!   structural changes to entities go through it; mutating a
//!   [`stagecraft_core::entity::StagedEntity`] behind its back breaks
//!   index and notification consistency.
//! - [`observer::ContentObserver`] -- the callback set consumed by the
//!   world-sync layer, with batched, per-entity coalesced delivery.
//! - [`underground::find_underground_pair`] -- the directional pairing
//!   search with stage-aware shadowing.
//! - [`serialize`] -- versioned binary snapshots via bitcode; a snapshot
//!   round-trips the full persisted model losslessly.
//! - [`validation::check_consistency`] -- structural self-checks (wire
//!   symmetry, index consistency, diff minimality) for tests and
//!   debugging.

pub mod content;
pub mod observer;
pub mod serialize;
pub mod underground;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use content::ProjectContent;
pub use observer::{ContentObserver, StageDiscard};
pub use underground::{PairSearch, find_underground_pair};
