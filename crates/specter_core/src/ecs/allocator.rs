//! # Entity Allocator
//!
//! Hands out local handles for ghosts. All slots are pre-allocated at
//! creation; spawning and despawning only move indices on a free list.

use super::entity::EntityId;

/// One slot in the allocator.
#[derive(Clone, Copy, Debug)]
struct Slot {
    /// Generation of the current (or last) occupant.
    generation: u32,
    /// Whether the slot is currently occupied.
    alive: bool,
}

/// Fixed-capacity handle allocator with generation counters.
///
/// # Example
///
/// ```rust,ignore
/// let mut entities = EntityAllocator::new(4096);
/// let ghost = entities.spawn();
/// assert!(entities.is_alive(ghost));
/// entities.despawn(ghost);
/// assert!(!entities.is_alive(ghost));
/// ```
#[derive(Debug)]
pub struct EntityAllocator {
    slots: Box<[Slot]>,
    /// Free list of slot indices for reuse.
    free_indices: Vec<u32>,
    alive_count: usize,
}

impl EntityAllocator {
    /// Creates an allocator with the specified capacity.
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero or exceeds `u32::MAX`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");
        assert!(
            u32::try_from(capacity).is_ok(),
            "Capacity cannot exceed u32::MAX"
        );

        let slots = vec![
            Slot {
                generation: 0,
                alive: false,
            };
            capacity
        ]
        .into_boxed_slice();

        // Reversed so the lowest index is handed out first
        let free_indices: Vec<u32> = (0..capacity as u32).rev().collect();

        Self {
            slots,
            free_indices,
            alive_count: 0,
        }
    }

    /// Returns the maximum capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of currently alive entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Allocates a new handle.
    ///
    /// Returns `None` when every slot is in use.
    pub fn spawn(&mut self) -> Option<EntityId> {
        let index = self.free_indices.pop()?;
        let slot = &mut self.slots[index as usize];

        // Skip generation 0 so a zeroed handle can never be alive
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            generation => generation,
        };
        slot.alive = true;
        self.alive_count += 1;

        Some(EntityId::new(index, slot.generation))
    }

    /// Frees a handle's slot for reuse.
    ///
    /// Returns `false` if the handle was null, stale, or already dead.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        self.slots[id.index() as usize].alive = false;
        self.alive_count -= 1;
        self.free_indices.push(id.index());
        true
    }

    /// Checks if a handle refers to a live entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_null() {
            return false;
        }
        self.slots
            .get(id.index() as usize)
            .is_some_and(|slot| slot.alive && slot.generation == id.generation())
    }

    /// Iterates over all alive handles.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.alive
                .then(|| EntityId::new(index as u32, slot.generation))
        })
    }

    /// Frees every slot. Generations are kept so old handles stay stale.
    pub fn clear(&mut self) {
        self.free_indices.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            slot.alive = false;
            self.free_indices.push(index as u32);
        }
        self.alive_count = 0;
    }
}
