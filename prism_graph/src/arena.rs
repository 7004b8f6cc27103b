//! Slot arena backing the node graph.
//!
//! The arena provides:
//! - **O(1) allocation**: Slots are appended, never moved individually
//! - **Stable identity**: A `NodeId` is the slot index and survives deletion
//!   (the slot becomes a tombstone) until the graph is compressed
//! - **Fast iteration**: Linear traversal of all slots
//! - **Side tables**: `SecondaryMap` attaches per-node counters without
//!   widening the node itself

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

// =============================================================================
// Typed ID
// =============================================================================

/// A typed index into an [`Arena`].
///
/// The phantom parameter keeps ids of different arenas apart. The trait impls
/// are written out by hand so that `Id<T>` is `Copy + Eq + Hash` even when `T`
/// itself is none of those.
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> std::hash::Hash for Id<T> {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u32(self.index);
    }
}

impl<T> Id<T> {
    /// Wrap a raw slot index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Id {
            index,
            _marker: PhantomData,
        }
    }

    /// The raw slot index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// The slot index as `usize`, for indexing vectors.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

// =============================================================================
// Arena
// =============================================================================

/// Contiguous slot storage addressed by [`Id`].
///
/// Items are never freed one at a time. The owner rebuilds the arena through
/// [`Arena::into_vec`] / [`Arena::from_vec`] when it wants dead slots back.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<T>,
}

impl<T> Arena<T> {
    /// Create an empty arena with room for `capacity` slots.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Rebuild an arena from items already laid out in id order.
    pub fn from_vec(slots: Vec<T>) -> Self {
        Arena { slots }
    }

    /// Consume the arena, yielding its items in id order.
    pub fn into_vec(self) -> Vec<T> {
        self.slots
    }

    /// Append an item and return the id of its slot.
    #[inline]
    pub fn alloc(&mut self, item: T) -> Id<T> {
        let id = self.next_id();
        self.slots.push(item);
        id
    }

    /// The id the next [`Arena::alloc`] will hand out.
    #[inline]
    pub fn next_id(&self) -> Id<T> {
        Id::new(self.slots.len() as u32)
    }

    #[inline]
    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.slots.get(id.as_usize())
    }

    #[inline]
    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        self.slots.get_mut(id.as_usize())
    }

    /// Number of slots, dead ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate over every slot together with its id.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, item)| (Id::new(i as u32), item))
    }

    /// Iterate over every slot mutably.
    #[inline]
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena { slots: Vec::new() }
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Id<T>) -> &T {
        &self.slots[id.as_usize()]
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    #[inline]
    fn index_mut(&mut self, id: Id<T>) -> &mut T {
        &mut self.slots[id.as_usize()]
    }
}

// =============================================================================
// Secondary Map
// =============================================================================

/// Dense side table keyed by arena ids.
///
/// Slots that were never written read as `V::default()`.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K, V> {
    values: Vec<V>,
    _marker: PhantomData<fn() -> K>,
}

impl<K, V: Default + Clone> SecondaryMap<K, V> {
    pub fn new() -> Self {
        SecondaryMap {
            values: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Read a slot, falling back to the default for unbacked ids.
    pub fn get_or_default(&self, id: Id<K>) -> V {
        self.values.get(id.as_usize()).cloned().unwrap_or_default()
    }

    /// Mutable access to a slot, growing the table on demand.
    pub fn entry(&mut self, id: Id<K>) -> &mut V {
        let idx = id.as_usize();
        if idx >= self.values.len() {
            self.values.resize(idx + 1, V::default());
        }
        &mut self.values[idx]
    }

    /// Drop every value.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl<K, V: Default + Clone> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Slot {
        weight: i32,
    }

    #[test]
    fn test_arena_ids_are_dense() {
        let mut arena: Arena<Slot> = Arena::with_capacity(4);
        let a = arena.alloc(Slot { weight: 1 });
        let b = arena.alloc(Slot { weight: 2 });

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(arena.next_id().index(), 2);

        arena[b].weight = 20;
        assert_eq!(arena[b].weight, 20);
        assert!(arena.get(Id::new(9)).is_none());
    }

    #[test]
    fn test_arena_rebuild_keeps_order() {
        let mut arena: Arena<Slot> = Arena::default();
        for weight in 0..4 {
            arena.alloc(Slot { weight });
        }

        let kept: Vec<Slot> = arena.into_vec().into_iter().filter(|s| s.weight % 2 == 0).collect();
        let rebuilt = Arena::from_vec(kept);

        let weights: Vec<_> = rebuilt.iter().map(|(id, s)| (id.index(), s.weight)).collect();
        assert_eq!(weights, vec![(0, 0), (1, 2)]);
    }

    #[test]
    fn test_secondary_map_defaults() {
        let mut map: SecondaryMap<Slot, u32> = SecondaryMap::new();
        let id = Id::new(5);

        assert_eq!(map.get_or_default(id), 0);
        *map.entry(id) += 3;
        assert_eq!(map.get_or_default(id), 3);
        assert_eq!(map.get_or_default(Id::new(2)), 0);

        map.clear();
        assert_eq!(map.get_or_default(id), 0);
    }

    #[test]
    fn test_id_display() {
        let id: Id<Slot> = Id::new(42);
        assert_eq!(format!("{}", id), "#42");
        assert_eq!(format!("{:?}", id), "#42");
    }
}
