//! # Entity Seam
//!
//! The replication engine does not own the game's entity storage. It needs
//! exactly three capabilities from it:
//!
//! - Stable local handles for ghosts it spawns
//! - Get/set of a component value for an entity
//! - Enumeration of the entities a pass should visit
//!
//! Handles carry a generation counter so a recycled slot never aliases a
//! despawned ghost.

mod access;
mod allocator;
mod component;
mod entity;

pub use access::{ComponentAccess, EntityQuery};
pub use allocator::EntityAllocator;
pub use component::Component;
pub use entity::EntityId;
