//! RegionAllocator: bump-pointer allocation into the current region, TLAB creation and
//! revocation, and humongous-object spillover.
//!
//! TLAB sizing (`MIN_TLAB_SIZE`/`MAX_TLAB_SIZE`, grow-on-refill) follows a retire-threshold
//! policy; `alloc()` scans already-owned regions for room before requesting a fresh one
//! from the backing space. Revoking a TLAB truncates its region's `top` back to the TLAB's
//! cursor and, if the unused tail is big enough, stashes it in `retained_tlabs` so the next
//! `create_tlab` call can reuse it instead of bump-allocating fresh.

use crate::heap::region::{Region, RegionFlags, RegionId};
use crate::heap::region_space::RegionSpace;
use crate::thread::ThreadId;
use crate::util::constants::{
    MAX_REGULAR_OBJECT_SIZE, MAX_TLAB_SIZE, MIN_ALIGNMENT, MIN_TLAB_SIZE, TLAB_RETAIN_THRESHOLD,
};
use crate::util::Address;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// A thread-local allocation buffer: a private cursor/limit pair carved out of one region.
pub struct Tlab {
    pub region: RegionId,
    cursor: Address,
    limit: Address,
}

impl Tlab {
    pub fn alloc(&mut self, size: usize, align: usize) -> Option<Address> {
        let start = self.cursor.align_up(align);
        let new_cursor = start + size;
        if new_cursor > self.limit {
            return None;
        }
        self.cursor = new_cursor;
        Some(start)
    }

    pub fn bytes_remaining(&self) -> usize {
        self.limit - self.cursor
    }
}

struct TlabBookkeeping {
    tlab: Tlab,
    refills: u32,
    next_size: usize,
}

/// Bump-pointer allocator for a [`RegionSpace`]. One instance typically serves one
/// `RegionFlags` purpose (e.g. Eden, or NonMovable); callers pick which allocator to use.
pub struct RegionAllocator {
    space: Arc<RegionSpace>,
    default_flags: RegionFlags,
    current_region: Mutex<Option<Arc<Region>>>,
    tlabs: Mutex<HashMap<ThreadId, TlabBookkeeping>>,
    /// Revoked TLABs whose unused tail was at least [`TLAB_RETAIN_THRESHOLD`] bytes, kept
    /// around for [`Self::create_tlab`] to hand to the next thread instead of bump-allocating
    /// a fresh one. Keyed by remaining bytes so a request can find a tail at least as big as
    /// it needs.
    retained_tlabs: Mutex<BTreeMap<usize, Vec<Tlab>>>,
}

impl RegionAllocator {
    pub fn new(space: Arc<RegionSpace>, default_flags: RegionFlags) -> Self {
        RegionAllocator {
            space,
            default_flags,
            current_region: Mutex::new(None),
            tlabs: Mutex::new(HashMap::new()),
            retained_tlabs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn space(&self) -> &Arc<RegionSpace> {
        &self.space
    }

    /// Allocate `size` bytes directly from the shared (non-TLAB) region, scanning the
    /// current region first and only requesting a fresh one from the pool on exhaustion.
    /// Spills to [`Self::alloc_large`] above [`MAX_REGULAR_OBJECT_SIZE`].
    pub fn alloc(&self, size: usize) -> Option<Address> {
        if size > MAX_REGULAR_OBJECT_SIZE {
            return Some(self.alloc_large(size));
        }
        let mut current = self.current_region.lock().unwrap();
        loop {
            if let Some(region) = current.as_ref() {
                if let Some(addr) = region.alloc(size, MIN_ALIGNMENT) {
                    return Some(addr);
                }
            }
            *current = Some(self.space.new_region(self.default_flags, 1));
        }
    }

    /// Humongous objects get a dedicated region sized to fit exactly one object, per the
    /// invariant that a `Large` region hosts exactly one object.
    fn alloc_large(&self, size: usize) -> Address {
        let region_size = self.space.pool().region_size();
        let multiplier = size.div_ceil(region_size).max(1);
        let region = self.space.new_region(RegionFlags::LARGE, multiplier);
        region.alloc(size, MIN_ALIGNMENT).expect("fresh humongous region must fit its own object")
    }

    /// Create (or grow) a TLAB for `thread`. Revokes the thread's current TLAB first
    /// (truncating its region's `top` back to the TLAB cursor and stashing the unused tail
    /// in `retained_tlabs` if it's big enough to be worth keeping), then either reuses a
    /// retained TLAB or bump-allocates a fresh one. On exhaustion the next TLAB is grown by
    /// one step up to `MAX_TLAB_SIZE`.
    pub fn create_tlab(&self, thread: ThreadId) -> bool {
        let (next_size, refills) = match self.tlabs.lock().unwrap().get(&thread) {
            Some(b) => (b.next_size, b.refills),
            None => (MIN_TLAB_SIZE, 0),
        };
        self.revoke_tlab(thread);

        if let Some(tlab) = self.take_retained_tlab() {
            if let Some(region) = self.space.get(tlab.region) {
                region.bind_tlab(thread);
            }
            self.tlabs.lock().unwrap().insert(
                thread,
                TlabBookkeeping { tlab, refills: refills + 1, next_size: (next_size * 2).min(MAX_TLAB_SIZE) },
            );
            return true;
        }

        let mut current = self.current_region.lock().unwrap();
        loop {
            if let Some(region) = current.as_ref() {
                if let Some(start) = region.alloc(next_size, MIN_ALIGNMENT) {
                    region.bind_tlab(thread);
                    self.tlabs.lock().unwrap().insert(
                        thread,
                        TlabBookkeeping {
                            tlab: Tlab { region: region.id, cursor: start, limit: start + next_size },
                            refills: refills + 1,
                            next_size: (next_size * 2).min(MAX_TLAB_SIZE),
                        },
                    );
                    return true;
                }
            }
            *current = Some(self.space.new_region(self.default_flags, 1));
        }
    }

    /// Pop a retained TLAB, preferring the one with the largest remaining tail.
    fn take_retained_tlab(&self) -> Option<Tlab> {
        let mut retained = self.retained_tlabs.lock().unwrap();
        let key = *retained.keys().next_back()?;
        let bucket = retained.get_mut(&key).expect("key just read from the map");
        let tlab = bucket.pop().expect("buckets are never left empty");
        if bucket.is_empty() {
            retained.remove(&key);
        }
        Some(tlab)
    }

    /// Allocate `size` bytes from `thread`'s TLAB, creating or growing it on exhaustion.
    /// Per the boundary property: TLAB exhaustion never fails the allocation outright, it
    /// triggers a fresh TLAB and retries once.
    pub fn alloc_from_tlab(&self, thread: ThreadId, size: usize, align: usize) -> Option<Address> {
        if size > MAX_TLAB_SIZE {
            return self.alloc(size);
        }
        {
            let mut tlabs = self.tlabs.lock().unwrap();
            if let Some(bookkeeping) = tlabs.get_mut(&thread) {
                if let Some(addr) = bookkeeping.tlab.alloc(size, align) {
                    return Some(addr);
                }
            }
        }
        if !self.create_tlab(thread) {
            return None;
        }
        let mut tlabs = self.tlabs.lock().unwrap();
        tlabs.get_mut(&thread)?.tlab.alloc(size, align)
    }

    /// Revoke `thread`'s TLAB, if it has one: truncate its region's `top` back to the
    /// TLAB's cursor, reclaiming the unused tail for ordinary bump allocation, and stash
    /// that tail in `retained_tlabs` for reuse by a future `create_tlab` call if it's at
    /// least `TLAB_RETAIN_THRESHOLD` bytes.
    pub fn revoke_tlab(&self, thread: ThreadId) {
        let Some(bookkeeping) = self.tlabs.lock().unwrap().remove(&thread) else {
            return;
        };
        let tlab = bookkeeping.tlab;
        if let Some(region) = self.space.get(tlab.region) {
            region.set_top(tlab.cursor);
            region.revoke_tlab();
        }
        let remaining = tlab.bytes_remaining();
        if remaining >= TLAB_RETAIN_THRESHOLD {
            self.retained_tlabs.lock().unwrap().entry(remaining).or_default().push(tlab);
        }
    }

    pub fn top_garbage_regions(&self, count: usize) -> Vec<Arc<Region>> {
        let mut regions = Vec::new();
        self.space.for_each_region(|r| regions.push(r.clone()));
        regions.sort_by_key(|r| std::cmp::Reverse(r.garbage_bytes()));
        regions.truncate(count);
        regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::region_pool::RegionPool;
    use crate::util::constants::BYTES_IN_REGION;

    fn allocator() -> RegionAllocator {
        let pool = Arc::new(RegionPool::new(BYTES_IN_REGION, 4, true));
        let space = Arc::new(RegionSpace::new(crate::heap::region_space::SpaceKind::Object, pool));
        RegionAllocator::new(space, RegionFlags::EDEN)
    }

    #[test]
    fn direct_alloc_returns_nonoverlapping_addresses() {
        let alloc = allocator();
        let a = alloc.alloc(64).unwrap();
        let b = alloc.alloc(64).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn large_object_gets_its_own_region() {
        let alloc = allocator();
        let addr = alloc.alloc(MAX_REGULAR_OBJECT_SIZE + 1).unwrap();
        let region = alloc.space().contains_address(addr).unwrap();
        assert!(region.has_flag(RegionFlags::LARGE));
    }

    #[test]
    fn tlab_exhaustion_triggers_fresh_tlab_not_failure() {
        let alloc = allocator();
        let thread = ThreadId::new(1);
        assert!(alloc.create_tlab(thread));
        // Drain the (small, MIN_TLAB_SIZE) TLAB.
        let mut allocated = 0;
        while alloc.alloc_from_tlab(thread, 64, MIN_ALIGNMENT).is_some() {
            allocated += 64;
            if allocated > MIN_TLAB_SIZE * 4 {
                break;
            }
        }
        // The loop above only stops when `alloc_from_tlab` returns `None`, which only
        // happens if `create_tlab` itself fails (pool exhausted); with `extend: true`
        // that cannot happen, so we should have kept going past one TLAB's worth.
        assert!(allocated > MIN_TLAB_SIZE);
    }

    #[test]
    fn revoke_tlab_truncates_region_top_back_to_the_tlab_cursor() {
        let alloc = allocator();
        let thread = ThreadId::new(1);
        assert!(alloc.create_tlab(thread));
        let addr = alloc.alloc_from_tlab(thread, 64, MIN_ALIGNMENT).unwrap();
        let region = alloc.space().contains_address(addr).unwrap();
        // The whole TLAB was carved out of the region up front, so `top` already sits at
        // its far end; only `cursor` (private to the TLAB) tracks the 64 bytes used so far.
        assert_eq!(region.top(), addr + MIN_TLAB_SIZE);

        alloc.revoke_tlab(thread);
        assert_eq!(region.top(), addr + 64);
    }

    #[test]
    fn revoke_tlab_stashes_a_large_remainder_for_reuse_by_another_thread() {
        let alloc = allocator();
        let t1 = ThreadId::new(1);
        assert!(alloc.create_tlab(t1));
        let t1_addr = alloc.alloc_from_tlab(t1, 8, MIN_ALIGNMENT).unwrap();
        let t1_region = alloc.space().contains_address(t1_addr).unwrap();
        alloc.revoke_tlab(t1);

        let t2 = ThreadId::new(2);
        assert!(alloc.create_tlab(t2));
        let t2_addr = alloc.alloc_from_tlab(t2, 8, MIN_ALIGNMENT).unwrap();
        let t2_region = alloc.space().contains_address(t2_addr).unwrap();

        assert_eq!(t1_region.id, t2_region.id, "t2 should reuse t1's retained TLAB tail, not a fresh region");
        assert_eq!(t2_addr, t1_addr + 8);
    }

    #[test]
    fn revoke_tlab_does_not_retain_a_tail_below_the_threshold() {
        let alloc = allocator();
        let t1 = ThreadId::new(1);
        assert!(alloc.create_tlab(t1));
        // Drain the TLAB down to a sliver under TLAB_RETAIN_THRESHOLD, without tripping a
        // refill (each chunk must still fit in what's left of the one TLAB).
        let to_consume = MIN_TLAB_SIZE - (TLAB_RETAIN_THRESHOLD - 64);
        let mut consumed = 0;
        while consumed < to_consume {
            alloc.alloc_from_tlab(t1, 64, MIN_ALIGNMENT).unwrap();
            consumed += 64;
        }
        alloc.revoke_tlab(t1);
        assert!(alloc.take_retained_tlab().is_none());
    }
}
