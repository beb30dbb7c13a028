// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generational slot storage for graph nodes.
//!
//! Nodes refer to each other through [`NodeId`] handles rather than pointers.
//! Each handle carries the generation of its slot, so a handle kept past the
//! destruction of its node never resolves to whatever reuses the slot.

use std::fmt;

/// Handle to a node slot
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Raw slot index (diagnostics only)
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Generation of the slot when this handle was issued
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}@gen{})", self.idx, self.generation)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.idx, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena with a free list and per-slot generations
#[derive(Debug)]
pub struct NodeStore<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T> NodeStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Insert a value, reusing a freed slot when one is available
    pub fn insert(&mut self, value: T) -> NodeId {
        self.live += 1;
        if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.value = Some(value);
            return NodeId {
                idx,
                generation: slot.generation,
            };
        }

        let idx = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        NodeId { idx, generation: 0 }
    }

    /// Remove a value. The slot generation is bumped so `id` goes stale.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let slot = self.slots.get_mut(id.idx as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.idx);
        self.live -= 1;
        Some(value)
    }

    /// Check that `id` still refers to a live value
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Borrow a live value
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots
            .get(id.idx as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Mutably borrow a live value
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots
            .get_mut(id.idx as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Iterate live values with their handles
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    NodeId {
                        idx: idx as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.live
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl<T> Default for NodeStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut store = NodeStore::new();
        let a = store.insert("a");
        let b = store.insert("b");

        assert_eq!(store.get(a), Some(&"a"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.remove(a), Some("a"));
        assert!(!store.contains(a));
        assert!(store.contains(b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut store = NodeStore::new();
        let first = store.insert(1);
        store.remove(first);
        let second = store.insert(2);

        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert_eq!(store.get(first), None);
        assert_eq!(store.get(second), Some(&2));
        assert_eq!(store.remove(first), None);
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut store = NodeStore::new();
        let a = store.insert('a');
        store.insert('b');
        store.remove(a);

        let values: Vec<char> = store.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!['b']);
    }

    #[test]
    fn test_debug_format() {
        let mut store = NodeStore::new();
        let id = store.insert(());
        assert_eq!(format!("{id:?}"), "NodeId(0@gen0)");
    }
}
