//! Reverse-edge (usage) list.
//!
//! Almost every node has zero, one or two usages, so the first two entries
//! live inline and only the rest spill into a heap vector. Entries are kept
//! dense: there is never an empty inline slot before a filled one.
//!
//! Order carries no meaning. Removal moves the last entry into the vacated
//! slot, which keeps removal O(1) once the entry is found.

use crate::node::NodeId;

/// Number of usages stored without allocation.
pub const INLINE_USAGE_COUNT: usize = 2;

/// Usage list with two inline slots and an overflow vector.
#[derive(Clone, Default)]
pub struct UsageList {
    inline: [Option<NodeId>; INLINE_USAGE_COUNT],
    extra: Vec<NodeId>,
}

impl UsageList {
    /// An empty list.
    pub const fn new() -> Self {
        UsageList {
            inline: [None, None],
            extra: Vec::new(),
        }
    }

    /// Number of entries, duplicates included.
    #[inline]
    pub fn len(&self) -> usize {
        match self.inline {
            [None, _] => 0,
            [Some(_), None] => 1,
            [Some(_), Some(_)] => INLINE_USAGE_COUNT + self.extra.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inline[0].is_none()
    }

    /// Entry at a position in iteration order.
    #[inline]
    pub fn get(&self, index: usize) -> Option<NodeId> {
        if index < INLINE_USAGE_COUNT {
            self.inline[index]
        } else {
            self.extra.get(index - INLINE_USAGE_COUNT).copied()
        }
    }

    /// The first entry, if any.
    #[inline]
    pub fn first(&self) -> Option<NodeId> {
        self.inline[0]
    }

    /// Append an entry.
    pub fn push(&mut self, usage: NodeId) {
        if self.inline[0].is_none() {
            self.inline[0] = Some(usage);
        } else if self.inline[1].is_none() {
            self.inline[1] = Some(usage);
        } else {
            if self.extra.capacity() == 0 {
                self.extra.reserve_exact(4);
            }
            self.extra.push(usage);
        }
    }

    /// Remove the entry at `index` by moving the last entry into its place.
    ///
    /// Returns the removed entry.
    pub fn swap_remove(&mut self, index: usize) -> Option<NodeId> {
        let len = self.len();
        if index >= len {
            return None;
        }
        let removed = self.get(index);
        let last = self.pop();
        if index < len - 1 {
            self.set(index, last);
        }
        removed
    }

    /// Remove one occurrence of `usage`.
    pub fn remove(&mut self, usage: NodeId) -> bool {
        match self.position(usage) {
            Some(index) => {
                self.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove up to `limit` occurrences of `usage` in a single pass.
    ///
    /// Scans back to front so every entry is examined before a later one is
    /// moved over it. Returns how many entries were removed.
    pub fn remove_n(&mut self, usage: NodeId, limit: usize) -> usize {
        let mut removed = 0;
        let mut index = self.len();
        while index > 0 && removed < limit {
            index -= 1;
            if self.get(index) == Some(usage) {
                self.swap_remove(index);
                removed += 1;
            }
        }
        removed
    }

    /// Remove every entry for which `dead` returns true. Returns the count removed.
    pub fn remove_where(&mut self, mut dead: impl FnMut(NodeId) -> bool) -> usize {
        let mut removed = 0;
        let mut index = self.len();
        while index > 0 {
            index -= 1;
            if self.get(index).is_some_and(&mut dead) {
                self.swap_remove(index);
                removed += 1;
            }
        }
        removed
    }

    /// Number of entries equal to `usage`.
    pub fn count_of(&self, usage: NodeId) -> usize {
        self.iter().filter(|&u| u == usage).count()
    }

    /// Whether `usage` appears at least once.
    pub fn contains(&self, usage: NodeId) -> bool {
        self.position(usage).is_some()
    }

    /// Drop every entry and release the overflow allocation.
    pub fn clear(&mut self) {
        self.inline = [None, None];
        self.extra = Vec::new();
    }

    /// Take every entry, leaving the list empty.
    pub fn take(&mut self) -> UsageList {
        std::mem::take(self)
    }

    /// Rewrite every entry through `map`.
    pub fn remap(&mut self, mut map: impl FnMut(NodeId) -> NodeId) {
        for slot in self.inline.iter_mut().flatten() {
            *slot = map(*slot);
        }
        for slot in &mut self.extra {
            *slot = map(*slot);
        }
    }

    #[inline]
    pub fn iter(&self) -> UsageIter<'_> {
        UsageIter {
            list: self,
            index: 0,
        }
    }

    /// Copy the entries into a vector.
    pub fn to_vec(&self) -> Vec<NodeId> {
        self.iter().collect()
    }

    fn position(&self, usage: NodeId) -> Option<usize> {
        if self.inline[0] == Some(usage) {
            return Some(0);
        }
        if self.inline[1] == Some(usage) {
            return Some(1);
        }
        self.extra
            .iter()
            .rposition(|&u| u == usage)
            .map(|i| i + INLINE_USAGE_COUNT)
    }

    fn pop(&mut self) -> Option<NodeId> {
        if let Some(last) = self.extra.pop() {
            if self.extra.is_empty() {
                self.extra = Vec::new();
            }
            return Some(last);
        }
        if let Some(last) = self.inline[1].take() {
            return Some(last);
        }
        self.inline[0].take()
    }

    fn set(&mut self, index: usize, usage: Option<NodeId>) {
        if index < INLINE_USAGE_COUNT {
            self.inline[index] = usage;
        } else if let (Some(slot), Some(usage)) =
            (self.extra.get_mut(index - INLINE_USAGE_COUNT), usage)
        {
            *slot = usage;
        }
    }
}

impl std::fmt::Debug for UsageList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a UsageList {
    type Item = NodeId;
    type IntoIter = UsageIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`UsageList`].
pub struct UsageIter<'a> {
    list: &'a UsageList,
    index: usize,
}

impl Iterator for UsageIter<'_> {
    type Item = NodeId;

    #[inline]
    fn next(&mut self) -> Option<NodeId> {
        let usage = self.list.get(self.index)?;
        self.index += 1;
        Some(usage)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.list.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for UsageIter<'_> {}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &UsageList) -> Vec<u32> {
        list.iter().map(|id| id.index()).collect()
    }

    fn list_of(raw: &[u32]) -> UsageList {
        let mut list = UsageList::new();
        for &r in raw {
            list.push(NodeId::new(r));
        }
        list
    }

    #[test]
    fn test_push_fills_inline_then_extra() {
        let list = list_of(&[1, 2, 3, 4]);
        assert_eq!(list.len(), 4);
        assert_eq!(list.first(), Some(NodeId::new(1)));
        assert_eq!(list.get(3), Some(NodeId::new(4)));
        assert_eq!(list.get(4), None);
        assert_eq!(ids(&list), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_swap_remove_moves_last() {
        let mut list = list_of(&[1, 2, 3, 4]);
        assert_eq!(list.swap_remove(0), Some(NodeId::new(1)));
        assert_eq!(ids(&list), vec![4, 2, 3]);

        assert_eq!(list.swap_remove(1), Some(NodeId::new(2)));
        assert_eq!(ids(&list), vec![4, 3]);

        assert_eq!(list.swap_remove(1), Some(NodeId::new(3)));
        assert_eq!(list.swap_remove(0), Some(NodeId::new(4)));
        assert!(list.is_empty());
        assert_eq!(list.swap_remove(0), None);
    }

    #[test]
    fn test_remove_keeps_list_dense() {
        let mut list = list_of(&[1, 2]);
        assert!(list.remove(NodeId::new(1)));
        assert_eq!(list.len(), 1);
        assert_eq!(list.first(), Some(NodeId::new(2)));
        assert!(!list.remove(NodeId::new(9)));
    }

    #[test]
    fn test_duplicates_count_separately() {
        let mut list = list_of(&[5, 5, 6, 5]);
        assert_eq!(list.count_of(NodeId::new(5)), 3);

        assert_eq!(list.remove_n(NodeId::new(5), 2), 2);
        assert_eq!(list.count_of(NodeId::new(5)), 1);
        assert_eq!(list.len(), 2);

        assert_eq!(list.remove_n(NodeId::new(5), 10), 1);
        assert_eq!(ids(&list), vec![6]);
    }

    #[test]
    fn test_remove_where() {
        let mut list = list_of(&[1, 2, 3, 4, 5, 6]);
        let removed = list.remove_where(|id| id.index() % 2 == 0);
        assert_eq!(removed, 3);
        let mut left = ids(&list);
        left.sort_unstable();
        assert_eq!(left, vec![1, 3, 5]);
    }

    #[test]
    fn test_remap_and_take() {
        let mut list = list_of(&[1, 2, 3]);
        list.remap(|id| NodeId::new(id.index() * 10));
        assert_eq!(ids(&list), vec![10, 20, 30]);

        let taken = list.take();
        assert!(list.is_empty());
        assert_eq!(taken.len(), 3);
    }
}
