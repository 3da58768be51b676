//! Shared assets behind generational handles.
//!
//! Entities that share a model or texture hold an [`AssetHandle`] rather than
//! owning the asset. The [`AssetTable`] owns every asset; it is destroyed
//! when the table evicts it, never because the last user went away. Handles
//! to an evicted asset resolve to `None`, even after the slot is reused.
//!
//! The `ember` binary draws no meshes and loads no shared assets, so it never
//! builds a table. The type is exported for code embedding the scene crate
//! next to its own asset loading.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use tracing::debug;

pub struct AssetHandle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AssetHandle<T> {
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

// Manual impls: deriving would require `T: Clone` and friends.
impl<T> Clone for AssetHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AssetHandle<T> {}

impl<T> PartialEq for AssetHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for AssetHandle<T> {}

impl<T> Hash for AssetHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for AssetHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetHandle")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Debug)]
struct AssetSlot<T> {
    generation: u32,
    value: Option<T>,
}

/// Owner of every asset of type `T`.
#[derive(Debug)]
pub struct AssetTable<T> {
    slots: Vec<AssetSlot<T>>,
    free: Vec<u32>,
}

impl<T> Default for AssetTable<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> AssetTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> AssetHandle<T> {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].value = Some(value);
                index
            }
            None => {
                self.slots.push(AssetSlot {
                    generation: 0,
                    value: Some(value),
                });
                (self.slots.len() - 1) as u32
            }
        };
        AssetHandle {
            index,
            generation: self.slots[index as usize].generation,
            _marker: PhantomData,
        }
    }

    fn slot(&self, handle: AssetHandle<T>) -> Option<&AssetSlot<T>> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation)
    }

    pub fn get(&self, handle: AssetHandle<T>) -> Option<&T> {
        self.slot(handle)?.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: AssetHandle<T>) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation)?
            .value
            .as_mut()
    }

    pub fn contains(&self, handle: AssetHandle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Removes the asset and invalidates every handle to it. Returns the
    /// asset so the caller can release GPU memory it owns.
    pub fn evict(&mut self, handle: AssetHandle<T>) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        debug!("Evicted asset {:?}", handle);
        Some(value)
    }

    /// Number of resident assets.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetHandle<T>, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let value = slot.value.as_ref()?;
            let handle = AssetHandle {
                index: index as u32,
                generation: slot.generation,
                _marker: PhantomData,
            };
            Some((handle, value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut table = AssetTable::new();
        let a = table.insert("quad");
        let b = table.insert("cube");
        assert_eq!(table.get(a), Some(&"quad"));
        assert_eq!(table.get(b), Some(&"cube"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_shared_handle_is_copy() {
        let mut table = AssetTable::new();
        let model = table.insert(vec![1u8, 2, 3]);
        let users = [model, model, model];
        assert!(users.iter().all(|h| table.get(*h).is_some()));
    }

    #[test]
    fn test_evict_invalidates_all_copies() {
        let mut table = AssetTable::new();
        let a = table.insert(String::from("texture"));
        let copy = a;

        assert_eq!(table.evict(a).as_deref(), Some("texture"));
        assert!(table.get(copy).is_none());
        assert!(table.evict(copy).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_reused_slot_rejects_stale_handle() {
        let mut table = AssetTable::new();
        let old = table.insert(1);
        table.evict(old);
        let new = table.insert(2);

        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        assert_eq!(table.get(old), None);
        assert_eq!(table.get(new), Some(&2));
        assert!(table.get_mut(old).is_none());
    }

    #[test]
    fn test_iter_skips_evicted() {
        let mut table = AssetTable::new();
        let a = table.insert('a');
        let b = table.insert('b');
        table.evict(a);
        let resident: Vec<_> = table.iter().map(|(h, v)| (h, *v)).collect();
        assert_eq!(resident, vec![(b, 'b')]);
    }
}
