//! # Ghost Identity Map
//!
//! Bidirectional mapping between the server's stable network id for a ghost
//! and the client's local entity handle.
//!
//! ```text
//!  server                       client
//!  NetId(42) ──── snapshot ────▶ resolve(42) ──▶ entity(7v3)
//!                                     ▲
//!  "target: NetId(9)" ── field ───────┘  unbound ──▶ EntityId::NULL
//! ```
//!
//! ## Ownership
//!
//! The map is owned by the replication session. The receive path is its only
//! writer; passes borrow it immutably after the receive path has finished,
//! so lookups on the hot path take no lock.
//!
//! Holding a [`NetId`] never keeps an entity alive: the binding is dropped on
//! despawn and later lookups simply miss.

use std::collections::HashMap;
use std::fmt;

use specter_core::EntityId;

use crate::error::{NetcodeError, NetcodeResult};

/// Stable, network-wide ghost identifier assigned by the server.
///
/// `NetId(0)` is reserved: on the wire it encodes "no ghost".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NetId(pub u32);

impl NetId {
    /// The reserved "no ghost" id.
    pub const NONE: Self = Self(0);

    /// Returns true for the reserved id.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Decodes a wire value, mapping the reserved id to `None`.
    #[inline]
    #[must_use]
    pub const fn from_wire(raw: u32) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Encodes an optional id for the wire.
    #[inline]
    #[must_use]
    pub const fn to_wire(id: Option<Self>) -> u32 {
        match id {
            Some(Self(raw)) => raw,
            None => 0,
        }
    }
}

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ghost#{}", self.0)
    }
}

/// Network id ↔ local handle map.
#[derive(Debug, Default)]
pub struct GhostMap {
    by_net: HashMap<NetId, EntityId>,
    by_local: HashMap<EntityId, NetId>,
}

impl GhostMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map with room for `capacity` ghosts.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            by_net: HashMap::with_capacity(capacity),
            by_local: HashMap::with_capacity(capacity),
        }
    }

    /// Binds a network id to a local handle.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::ReservedNetId`] for `NetId(0)` and
    /// [`NetcodeError::DuplicateGhost`] if the id is already bound.
    pub fn bind(&mut self, net_id: NetId, entity: EntityId) -> NetcodeResult<()> {
        if net_id.is_none() {
            return Err(NetcodeError::ReservedNetId);
        }
        if self.by_net.contains_key(&net_id) {
            return Err(NetcodeError::DuplicateGhost(net_id));
        }
        self.by_net.insert(net_id, entity);
        self.by_local.insert(entity, net_id);
        Ok(())
    }

    /// Removes a binding, returning the local handle it pointed at.
    pub fn unbind(&mut self, net_id: NetId) -> Option<EntityId> {
        let entity = self.by_net.remove(&net_id)?;
        self.by_local.remove(&entity);
        Some(entity)
    }

    /// Looks up the local handle for a network id.
    #[inline]
    #[must_use]
    pub fn resolve(&self, net_id: NetId) -> Option<EntityId> {
        self.by_net.get(&net_id).copied()
    }

    /// Resolves an optional reference carried in a snapshot field.
    ///
    /// Both "no target" and "target not spawned here yet" come back as
    /// `None`; callers decide whether the latter is worth reporting.
    #[inline]
    #[must_use]
    pub fn resolve_ref(&self, reference: Option<NetId>) -> Option<EntityId> {
        reference.and_then(|net_id| self.resolve(net_id))
    }

    /// Looks up the network id for a local handle.
    #[inline]
    #[must_use]
    pub fn net_id_of(&self, entity: EntityId) -> Option<NetId> {
        self.by_local.get(&entity).copied()
    }

    /// Number of bound ghosts.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_net.len()
    }

    /// Returns true if no ghost is bound.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_net.is_empty()
    }

    /// Drops every binding.
    pub fn clear(&mut self) {
        self.by_net.clear();
        self.by_local.clear();
    }
}
