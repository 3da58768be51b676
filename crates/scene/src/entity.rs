//! Entity identifiers and their allocator.
//!
//! An [`Entity`] is a dense slot index plus the generation the slot had when
//! the entity was created. Freeing an entity bumps the slot's generation, so
//! ids held past the free no longer resolve even after the slot is reused.

use std::fmt;

use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// Slot index. Component columns are indexed by this.
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Hands out entity ids, reusing freed slots.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Entity {
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            let entity = Entity {
                index,
                generation: slot.generation,
            };
            trace!("Reused entity slot {}", entity);
            return entity;
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            alive: true,
        });
        Entity {
            index,
            generation: 0,
        }
    }

    /// Frees `entity`. Returns `false` if it was already freed or stale.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = &mut self.slots[entity.index()];
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(entity.index);
        self.live -= 1;
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index())
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation)
    }

    /// The live entity occupying slot `index`, if any.
    pub fn entity_at(&self, index: usize) -> Option<Entity> {
        let slot = self.slots.get(index)?;
        slot.alive.then_some(Entity {
            index: index as u32,
            generation: slot.generation,
        })
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots ever allocated; an upper bound on [`Entity::index`].
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        (0..self.slots.len()).filter_map(|index| self.entity_at(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_dense() {
        let mut entities = EntityAllocator::new();
        let a = entities.allocate();
        let b = entities.allocate();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities.slot_count(), 2);
    }

    #[test]
    fn test_freed_slot_is_reused_with_new_generation() {
        let mut entities = EntityAllocator::new();
        let a = entities.allocate();
        assert!(entities.free(a));

        let b = entities.allocate();
        assert_eq!(b.index(), a.index());
        assert_ne!(b.generation(), a.generation());
        assert!(!entities.is_alive(a));
        assert!(entities.is_alive(b));
        assert_eq!(entities.slot_count(), 1);
    }

    #[test]
    fn test_stale_id_cannot_free_new_owner() {
        let mut entities = EntityAllocator::new();
        let a = entities.allocate();
        entities.free(a);
        let b = entities.allocate();

        assert!(!entities.free(a));
        assert!(entities.is_alive(b));
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn test_double_free() {
        let mut entities = EntityAllocator::new();
        let a = entities.allocate();
        assert!(entities.free(a));
        assert!(!entities.free(a));
        assert!(entities.is_empty());
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut entities = EntityAllocator::new();
        let a = entities.allocate();
        let b = entities.allocate();
        let c = entities.allocate();
        entities.free(b);

        let live: Vec<_> = entities.iter().collect();
        assert_eq!(live, vec![a, c]);
        assert_eq!(entities.entity_at(b.index()), None);
    }

    #[test]
    fn test_display() {
        let mut entities = EntityAllocator::new();
        let a = entities.allocate();
        entities.free(a);
        let b = entities.allocate();
        assert_eq!(b.to_string(), "0v1");
    }
}
