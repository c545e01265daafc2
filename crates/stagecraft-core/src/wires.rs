//! Wire connection types.
//!
//! A connection is an unordered pair of (entity, connector) endpoints.
//! Adjacency is stored symmetrically on both entities as [`WireLink`]s --
//! each endpoint's own view of the edge -- which keeps a deleted entity's
//! outgoing record self-contained so re-adding it can restore the edges.
//! The public [`WireConnection`] pair form compares equal under either
//! orientation. All mutation goes through the content store.

use crate::id::EntityId;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A connection point on an entity. Parallel edges between the same pair
/// of entities are distinct as long as their connector pairs differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WireConnectorId {
    CircuitRed,
    CircuitGreen,
    PowerCopper,
}

/// One endpoint's view of a connection: its own connector and the
/// partner's connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WireLink {
    pub local: WireConnectorId,
    pub remote: WireConnectorId,
}

impl WireLink {
    pub fn new(local: WireConnectorId, remote: WireConnectorId) -> Self {
        Self { local, remote }
    }

    /// The same edge as seen from the partner entity.
    pub fn reversed(self) -> WireLink {
        WireLink {
            local: self.remote,
            remote: self.local,
        }
    }
}

/// A wire connection in pair form. Equality and hashing treat the two
/// orientations as the same connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WireConnection {
    pub from: EntityId,
    pub to: EntityId,
    pub from_connector: WireConnectorId,
    pub to_connector: WireConnectorId,
}

impl WireConnection {
    pub fn new(
        from: EntityId,
        from_connector: WireConnectorId,
        to: EntityId,
        to_connector: WireConnectorId,
    ) -> Self {
        Self {
            from,
            to,
            from_connector,
            to_connector,
        }
    }

    /// Canonical orientation: endpoints ordered by (entity, connector).
    pub fn normalized(self) -> WireConnection {
        if (self.to, self.to_connector) < (self.from, self.from_connector) {
            self.flipped()
        } else {
            self
        }
    }

    /// The same connection with the endpoints swapped.
    pub fn flipped(self) -> WireConnection {
        WireConnection {
            from: self.to,
            to: self.from,
            from_connector: self.to_connector,
            to_connector: self.from_connector,
        }
    }

    /// This connection as seen from `entity`: (partner, link). `None` if
    /// `entity` is not an endpoint.
    pub fn link_from(self, entity: EntityId) -> Option<(EntityId, WireLink)> {
        if entity == self.from {
            Some((self.to, WireLink::new(self.from_connector, self.to_connector)))
        } else if entity == self.to {
            Some((self.from, WireLink::new(self.to_connector, self.from_connector)))
        } else {
            None
        }
    }
}

impl PartialEq for WireConnection {
    fn eq(&self, other: &Self) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        (a.from, a.from_connector, a.to, a.to_connector)
            == (b.from, b.from_connector, b.to, b.to_connector)
    }
}

impl Eq for WireConnection {}

impl Hash for WireConnection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let n = self.normalized();
        (n.from, n.from_connector, n.to, n.to_connector).hash(state);
    }
}
