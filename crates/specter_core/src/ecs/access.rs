//! # Access Traits
//!
//! The two capabilities the replication engine needs from entity storage.

use super::component::Component;
use super::entity::EntityId;

/// Get/set of one component type by entity handle.
pub trait ComponentAccess<C: Component> {
    /// Returns the component value for an entity, if it has one.
    fn component(&self, entity: EntityId) -> Option<&C>;

    /// Returns a mutable reference to the component value for an entity.
    fn component_mut(&mut self, entity: EntityId) -> Option<&mut C>;

    /// Overwrites the component value for an entity.
    ///
    /// Returns `false` if the entity is unknown to this storage.
    fn set_component(&mut self, entity: EntityId, value: C) -> bool {
        match self.component_mut(entity) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Enumeration of the entities a pass should visit.
pub trait EntityQuery {
    /// Returns every matching entity.
    fn matching_entities(&self) -> Vec<EntityId>;

    /// Returns true when nothing matches, so a pass can be skipped wholesale.
    fn is_empty_query(&self) -> bool {
        self.matching_entities().is_empty()
    }
}
