//! In-memory slot index: the live (allocated) map plus the reclaimable
//! (free) list. Mutated only under the engine's stream lock.

use std::collections::BTreeMap;

/// A framed byte region in the collection file. `total_len` covers the
/// 5-byte frame and the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub offset: u32,
    pub total_len: u32,
}

pub struct SlotIndex<K> {
    /// Live key → slot.
    allocated: BTreeMap<K, SlotRef>,

    /// Free slots keyed `(total_len, offset)` for fit lookup. The composite
    /// key keeps entries unique and makes ties resolve to the lowest offset.
    free_by_len: BTreeMap<(u32, u32), ()>,

    /// Free slots keyed by offset. Invariant: entries never overlap each
    /// other or an allocated slot.
    free_by_offset: BTreeMap<u32, u32>,
}

impl<K: Ord> SlotIndex<K> {
    pub fn new() -> Self {
        Self {
            allocated: BTreeMap::new(),
            free_by_len: BTreeMap::new(),
            free_by_offset: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<SlotRef> {
        self.allocated.get(key).copied()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.allocated.contains_key(key)
    }

    pub fn insert_allocated(&mut self, key: K, slot: SlotRef) -> Option<SlotRef> {
        self.allocated.insert(key, slot)
    }

    pub fn remove_allocated(&mut self, key: &K) -> Option<SlotRef> {
        self.allocated.remove(key)
    }

    pub fn insert_free(&mut self, slot: SlotRef) {
        self.free_by_len.insert((slot.total_len, slot.offset), ());
        self.free_by_offset.insert(slot.offset, slot.total_len);
    }

    /// Take the smallest free slot whose total length meets `min_total_len`,
    /// lowest offset on ties. Never returns a shorter slot; O(log n).
    pub fn take_free_fit(&mut self, min_total_len: u32) -> Option<SlotRef> {
        let &(total_len, offset) = self
            .free_by_len
            .range((min_total_len, 0)..)
            .next()
            .map(|(k, _)| k)?;
        self.free_by_len.remove(&(total_len, offset));
        self.free_by_offset.remove(&offset);
        Some(SlotRef { offset, total_len })
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn free_count(&self) -> usize {
        self.free_by_offset.len()
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_by_offset.values().map(|&len| len as u64).sum()
    }

    pub fn clear(&mut self) {
        self.allocated.clear();
        self.free_by_len.clear();
        self.free_by_offset.clear();
    }
}

impl<K: Ord> Default for SlotIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}
