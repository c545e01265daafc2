//! Structural self-checks over a store.
//!
//! Returns findings instead of panicking so tests and debugging tools can
//! report every violation at once. A healthy store yields an empty list
//! after any sequence of API-level operations.

use crate::content::ProjectContent;
use stagecraft_core::id::{EntityId, Stage, UnitNumber};
use stagecraft_core::pos::Position;

/// One structural violation found in a store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    #[error("{entity:?} records a wire to {partner:?} but the reverse link is missing")]
    AsymmetricWire { entity: EntityId, partner: EntityId },
    #[error("{entity:?} records a wire to {partner:?}, which is not in the store")]
    WirePartnerMissing { entity: EntityId, partner: EntityId },
    #[error("{entity:?} is missing from the index cell at {position:?}")]
    MissingIndexEntry { entity: EntityId, position: Position },
    #[error("index cell at {position:?} references {entity:?}, which is absent or elsewhere")]
    StaleIndexEntry { position: Position, entity: EntityId },
    #[error("{entity:?} has a diff at stage {stage}, at or below its first stage")]
    DiffAtOrBelowFirstStage { entity: EntityId, stage: Stage },
    #[error("{entity:?} has a diff at stage {stage}, above its last stage")]
    DiffAboveLastStage { entity: EntityId, stage: Stage },
    #[error("{entity:?} has a redundant diff at stage {stage}")]
    RedundantDiff { entity: EntityId, stage: Stage },
    #[error("movable {entity:?} spans more than one stage")]
    MovableSpansStages { entity: EntityId },
    #[error("movable index entry for {unit:?} does not match a live entity")]
    StaleMovableBinding { unit: UnitNumber },
}

/// Check wire symmetry, index consistency, diff invariants, and movable
/// bindings. Returns every violation found.
pub fn check_consistency(content: &ProjectContent) -> Vec<ConsistencyError> {
    let mut errors = Vec::new();

    for (id, entity) in content.iter_entities() {
        // Wire adjacency must be symmetric and reference present entities.
        for (&partner, links) in entity.wire_links() {
            match content.entity(partner) {
                None => errors.push(ConsistencyError::WirePartnerMissing {
                    entity: id,
                    partner,
                }),
                Some(other) => {
                    for link in links {
                        let mirrored = other
                            .wire_links_to(id)
                            .is_some_and(|back| back.contains(&link.reversed()));
                        if !mirrored {
                            errors.push(ConsistencyError::AsymmetricWire {
                                entity: id,
                                partner,
                            });
                        }
                    }
                }
            }
        }

        // The entity must be indexed exactly at its position.
        if !content.entities_at(entity.position()).contains(&id) {
            errors.push(ConsistencyError::MissingIndexEntry {
                entity: id,
                position: entity.position(),
            });
        }

        // Diff bounds and minimality.
        for (stage, _) in entity.iter_stage_diffs() {
            if stage <= entity.first_stage() {
                errors.push(ConsistencyError::DiffAtOrBelowFirstStage { entity: id, stage });
                continue;
            }
            if entity.last_stage().is_some_and(|last| stage > last) {
                errors.push(ConsistencyError::DiffAboveLastStage { entity: id, stage });
                continue;
            }
            let below = entity.value_at_stage(stage - 1);
            let at = entity.value_at_stage(stage);
            if below == at {
                errors.push(ConsistencyError::RedundantDiff { entity: id, stage });
            }
        }

        if entity.is_movable() && entity.last_stage() != Some(entity.first_stage()) {
            errors.push(ConsistencyError::MovableSpansStages { entity: id });
        }
    }

    for (position, cell) in content.iter_position_cells() {
        for &id in cell {
            let placed = content
                .entity(id)
                .is_some_and(|entity| entity.position() == position);
            if !placed {
                errors.push(ConsistencyError::StaleIndexEntry { position, entity: id });
            }
        }
    }

    for (unit, id) in content.iter_movable_bindings() {
        let bound = content
            .entity(id)
            .is_some_and(|entity| entity.unit_number() == Some(unit));
        if !bound {
            errors.push(ConsistencyError::StaleMovableBinding { unit });
        }
    }

    errors
}
