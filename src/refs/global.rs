//! Global and weak-global reference storage: a growable array that doubles as a free list.
//!
//! Grounded on `original_source/runtime/mem/refstorage/global_object_storage.h`'s
//! `ArrayStorage`: each array slot either holds a live `ObjectReference` (an even machine
//! word, since every object is word-aligned) or, when free, the index of the next free slot
//! shifted left one bit with the low bit set to 1. `first_available_block_` and
//! `blocks_available_` track the head and length of that intrusive free list, so add/remove
//! run in O(1) without a side free-list structure. Capacity doubles on exhaustion up to
//! `max_size_`, matching the original's `EnsureCapacity`.

use crate::util::Address;
use crate::util::ObjectReference;
use std::sync::RwLock;

#[cfg(debug_assertions)]
const INITIAL_SIZE: usize = 2;
#[cfg(not(debug_assertions))]
const INITIAL_SIZE: usize = 128;

const ENSURE_CAPACITY_MULTIPLIER: usize = 2;

/// Once fewer than this many free slots remain, log a warning: global references are meant
/// to be short-lived (JNI locals aside) and a storage near its cap usually means a leak.
const GLOBAL_REF_SIZE_WARNING_LINE: usize = 20;

fn encode_free(next: usize) -> usize {
    (next << 1) | 1
}

fn decode_free(word: usize) -> usize {
    word >> 1
}

fn is_free(word: usize) -> bool {
    word & 1 == 1
}

struct Inner {
    storage: Vec<usize>,
    first_available: usize,
    blocks_available: usize,
}

impl Inner {
    fn ensure_capacity(&mut self, max_size: usize) -> bool {
        if self.blocks_available > 0 {
            return true;
        }
        let old_len = self.storage.len();
        if old_len >= max_size {
            return false;
        }
        let new_len = (old_len * ENSURE_CAPACITY_MULTIPLIER).clamp(INITIAL_SIZE, max_size);
        for i in old_len..new_len {
            let next = if i + 1 == new_len { old_len } else { i + 1 };
            self.storage.push(encode_free(next));
        }
        self.first_available = old_len;
        self.blocks_available = new_len - old_len;
        true
    }
}

/// A single growable, free-list-backed array of object references.
pub struct ArrayStorage {
    inner: RwLock<Inner>,
    max_size: usize,
}

impl ArrayStorage {
    pub fn new(max_size: usize) -> Self {
        ArrayStorage { inner: RwLock::new(Inner { storage: Vec::new(), first_available: 0, blocks_available: 0 }), max_size }
    }

    /// Insert `object`, returning the slot index it now occupies, or `None` if storage is
    /// full and cannot grow past `max_size`.
    pub fn add(&self, object: ObjectReference) -> Option<usize> {
        let mut inner = self.inner.write().unwrap();
        if !inner.ensure_capacity(self.max_size) {
            log::error!("global reference storage exhausted at max size {}", self.max_size);
            return None;
        }
        let idx = inner.first_available;
        let next = decode_free(inner.storage[idx]);
        let addr = object.to_raw_address().as_usize();
        debug_assert!(addr & 1 == 0, "object addresses must be word-aligned to share a bit with the free-list tag");
        inner.storage[idx] = addr;
        inner.first_available = next;
        inner.blocks_available -= 1;
        if inner.blocks_available < GLOBAL_REF_SIZE_WARNING_LINE {
            log::warn!("global reference storage nearly exhausted: {} slots left", inner.blocks_available);
        }
        Some(idx)
    }

    /// Fetch the object at `idx`. Returns `None` both for an out-of-range index and for a
    /// slot that is free or has been cleared (a weak reference the collector zeroed).
    pub fn get(&self, idx: usize) -> Option<ObjectReference> {
        let inner = self.inner.read().unwrap();
        let word = *inner.storage.get(idx)?;
        if is_free(word) || word == 0 {
            return None;
        }
        Some(unsafe { ObjectReference::from_raw_address_unchecked(Address::from_usize(word)) })
    }

    pub fn remove(&self, idx: usize) {
        let mut inner = self.inner.write().unwrap();
        if idx >= inner.storage.len() || is_free(inner.storage[idx]) {
            return;
        }
        let next = inner.first_available;
        inner.storage[idx] = encode_free(next);
        inner.first_available = idx;
        inner.blocks_available += 1;
    }

    pub fn is_valid(&self, idx: usize) -> bool {
        let inner = self.inner.read().unwrap();
        idx < inner.storage.len() && !is_free(inner.storage[idx]) && inner.storage[idx] != 0
    }

    /// Re-point every live entry through `forward`, used after a compacting GC moved objects.
    /// Entries `forward` maps to `None` (the object died) are left untouched here; callers
    /// that want dead globals cleared should use [`ArrayStorage::clear_unmarked`].
    pub fn update_moved_refs(&self, forward: impl Fn(ObjectReference) -> Option<ObjectReference>) {
        let mut inner = self.inner.write().unwrap();
        for word in inner.storage.iter_mut() {
            if is_free(*word) || *word == 0 {
                continue;
            }
            let obj = unsafe { ObjectReference::from_raw_address_unchecked(Address::from_usize(*word)) };
            if let Some(moved) = forward(obj) {
                *word = moved.to_raw_address().as_usize();
            }
        }
    }

    /// Null out every live slot whose object `is_marked` reports dead. Intended for the weak
    /// table: weak references do not keep an object alive, so once the GC has finished
    /// marking, any weak slot pointing at an unmarked object is cleared rather than updated.
    pub fn clear_unmarked(&self, is_marked: impl Fn(ObjectReference) -> bool) {
        let mut inner = self.inner.write().unwrap();
        for word in inner.storage.iter_mut() {
            if is_free(*word) || *word == 0 {
                continue;
            }
            let obj = unsafe { ObjectReference::from_raw_address_unchecked(Address::from_usize(*word)) };
            if !is_marked(obj) {
                *word = 0;
            }
        }
    }

    pub fn visit_objects(&self, mut visitor: impl FnMut(ObjectReference)) {
        let inner = self.inner.read().unwrap();
        for &word in inner.storage.iter() {
            if !is_free(word) && word != 0 {
                visitor(unsafe { ObjectReference::from_raw_address_unchecked(Address::from_usize(word)) });
            }
        }
    }

    pub fn size(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner.storage.len() - inner.blocks_available
    }
}

/// Which of the two backing tables a global reference belongs to.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum GlobalRefKind {
    Strong,
    Weak,
}

/// Owns the strong-global and weak-global tables. A `Ref` built from the index this returns
/// is tagged `RefKind::Global` or `RefKind::Weak` by the caller (see [`crate::refs::reference`]).
pub struct GlobalObjectStorage {
    strong: ArrayStorage,
    weak: ArrayStorage,
}

impl GlobalObjectStorage {
    pub fn new(max_size: usize) -> Self {
        GlobalObjectStorage { strong: ArrayStorage::new(max_size), weak: ArrayStorage::new(max_size) }
    }

    pub fn add(&self, kind: GlobalRefKind, object: ObjectReference) -> Option<usize> {
        self.table(kind).add(object)
    }

    pub fn get(&self, kind: GlobalRefKind, idx: usize) -> Option<ObjectReference> {
        self.table(kind).get(idx)
    }

    pub fn remove(&self, kind: GlobalRefKind, idx: usize) {
        self.table(kind).remove(idx)
    }

    pub fn is_valid(&self, kind: GlobalRefKind, idx: usize) -> bool {
        self.table(kind).is_valid(idx)
    }

    /// Strong globals keep their referents alive and are only ever re-pointed, never cleared.
    /// Weak globals are re-pointed too, but any left pointing at an unmarked object afterward
    /// should subsequently be cleared via [`GlobalObjectStorage::clear_unmarked_weak_refs`].
    pub fn update_moved_refs(&self, forward: impl Fn(ObjectReference) -> Option<ObjectReference> + Copy) {
        self.strong.update_moved_refs(forward);
        self.weak.update_moved_refs(forward);
    }

    pub fn clear_unmarked_weak_refs(&self, is_marked: impl Fn(ObjectReference) -> bool) {
        self.weak.clear_unmarked(is_marked);
    }

    pub fn visit_objects(&self, mut visitor: impl FnMut(ObjectReference)) {
        self.strong.visit_objects(&mut visitor);
        self.weak.visit_objects(&mut visitor);
    }

    pub fn size(&self) -> usize {
        self.strong.size() + self.weak.size()
    }

    fn table(&self, kind: GlobalRefKind) -> &ArrayStorage {
        match kind {
            GlobalRefKind::Strong => &self.strong,
            GlobalRefKind::Weak => &self.weak,
        }
    }
}
