//! Underground-belt pairing: a directional nearest-neighbor search with
//! stage-aware shadowing.
//!
//! The scan walks cells along the belt's buried direction, nearest first,
//! up to the prototype's reach. A candidate facing the same way is a
//! *shadow*: once a shadow exists at or before the query stage, nothing
//! beyond it can pair. A candidate facing the opposite way pairs
//! immediately if it exists at the query stage; otherwise the nearest such
//! future candidate is kept as a fallback. Scan order is the tie-break
//! throughout -- changing it silently changes simulated connectivity.

use crate::content::ProjectContent;
use stagecraft_core::external::{BeltIo, underground_direction};
use stagecraft_core::id::{EntityId, Stage};

/// Result of a pairing scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PairSearch {
    /// The paired underground, if any.
    pub pair: Option<EntityId>,
    /// Lowest first stage among same-direction shadows seen during the
    /// scan; from this stage on, the found pair (or any pairing at all
    /// beyond the shadow) is occluded.
    pub shadow_first_stage: Option<Stage>,
}

/// Find the underground belt that `entity` pairs with at `stage`.
///
/// `name` overrides the entity's own name for category matching (used when
/// previewing an upgrade); `ignore` excludes one candidate (used when the
/// candidate is about to move). Never fails: an unresolvable search yields
/// an empty result.
pub fn find_underground_pair(
    content: &ProjectContent,
    entity: EntityId,
    stage: Stage,
    name: Option<&str>,
    ignore: Option<EntityId>,
) -> PairSearch {
    let mut result = PairSearch::default();
    let Some(origin) = content.entity(entity) else {
        return result;
    };
    let search_name = name.unwrap_or(&origin.first_value().name);
    let Some(reach) = content.registry().get(search_name).underground_reach() else {
        return result;
    };
    let origin_io = origin.underground_io().unwrap_or(BeltIo::Input);
    let facing = underground_direction(origin.direction(), origin_io);

    for step in 1..=reach as i32 {
        let position = origin.position().stepped(facing, step);
        for &candidate_id in content.entities_at(position) {
            if candidate_id == entity || Some(candidate_id) == ignore {
                continue;
            }
            let Some(candidate) = content.entity(candidate_id) else {
                continue;
            };
            if candidate.is_settings_remnant() {
                continue;
            }
            let Some(candidate_io) = candidate.underground_io() else {
                continue;
            };
            if !content
                .registry()
                .same_category(&candidate.first_value().name, search_name)
            {
                continue;
            }
            if candidate.last_stage().is_some_and(|last| last < stage) {
                continue;
            }
            let candidate_facing = underground_direction(candidate.direction(), candidate_io);
            if candidate_facing == facing {
                // Same-direction shadow.
                result.shadow_first_stage = Some(match result.shadow_first_stage {
                    Some(lowest) => lowest.min(candidate.first_stage()),
                    None => candidate.first_stage(),
                });
                if candidate.first_stage() <= stage {
                    // Occludes everything beyond; the nearest fallback
                    // found so far (if any) is still closer and stands.
                    return result;
                }
            } else if candidate_facing == facing.opposite() {
                if candidate.first_stage() <= stage {
                    result.pair = Some(candidate_id);
                    return result;
                }
                if result.pair.is_none() {
                    // Future-stage pair: nearest one wins as fallback.
                    result.pair = Some(candidate_id);
                }
            }
        }
    }
    result
}
