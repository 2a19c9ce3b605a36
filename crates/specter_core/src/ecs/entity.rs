//! # Entity Handles
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into dense storage
//! - A generation counter for safe reuse

use bytemuck::{Pod, Zeroable};

/// Local handle for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into storage
/// - Upper 32 bits: Generation counter for detecting stale references
///
/// Generation 0 is never handed out, so a zeroed handle is never alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Null/invalid entity ID. Used as the "no target" value for references.
    pub const NULL: Self = Self(u64::MAX);

    /// Creates an entity ID from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "entity(null)")
        } else {
            write!(f, "entity({}v{})", self.index(), self.generation())
        }
    }
}
