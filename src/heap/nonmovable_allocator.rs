//! NonmovableAllocator: a freelist allocator layered on top of regions flagged
//! [`RegionFlags::NON_MOVABLE`].
//!
//! On exhaustion, adds a fresh pool carved out of a newly allocated region. Objects here
//! never move, so the GC never needs to compact them; they are freed explicitly (e.g. when
//! a class loader unloads) rather than by copying survivors out of a region.

use crate::heap::region::{Region, RegionFlags};
use crate::heap::region_space::RegionSpace;
use crate::util::constants::MIN_ALIGNMENT;
use crate::util::Address;
use std::sync::{Arc, Mutex};

struct FreeChunk {
    addr: Address,
    size: usize,
}

pub struct NonmovableAllocator {
    space: Arc<RegionSpace>,
    current_region: Mutex<Option<Arc<Region>>>,
    free_list: Mutex<Vec<FreeChunk>>,
}

impl NonmovableAllocator {
    pub fn new(space: Arc<RegionSpace>) -> Self {
        NonmovableAllocator { space, current_region: Mutex::new(None), free_list: Mutex::new(Vec::new()) }
    }

    pub fn alloc(&self, size: usize) -> Option<Address> {
        let size = crate::util::constants::align_up(size, MIN_ALIGNMENT);
        if let Some(addr) = self.alloc_from_free_list(size) {
            return Some(addr);
        }
        let mut current = self.current_region.lock().unwrap();
        loop {
            if let Some(region) = current.as_ref() {
                if let Some(addr) = region.alloc(size, MIN_ALIGNMENT) {
                    return Some(addr);
                }
            }
            *current = Some(self.space.new_region(RegionFlags::NON_MOVABLE, 1));
        }
    }

    fn alloc_from_free_list(&self, size: usize) -> Option<Address> {
        let mut free_list = self.free_list.lock().unwrap();
        let idx = free_list.iter().position(|c| c.size >= size)?;
        let chunk = free_list.swap_remove(idx);
        if chunk.size > size {
            free_list.push(FreeChunk { addr: chunk.addr + size, size: chunk.size - size });
        }
        Some(chunk.addr)
    }

    /// Return a previously-allocated chunk to the free list. No coalescing with adjacent
    /// chunks is attempted, matching a simple freelist (not a buddy allocator).
    pub fn free(&self, addr: Address, size: usize) {
        let size = crate::util::constants::align_up(size, MIN_ALIGNMENT);
        self.free_list.lock().unwrap().push(FreeChunk { addr, size });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::region_pool::RegionPool;
    use crate::util::constants::BYTES_IN_REGION;

    fn allocator() -> NonmovableAllocator {
        let pool = Arc::new(RegionPool::new(BYTES_IN_REGION, 2, true));
        let space = Arc::new(RegionSpace::new(crate::heap::region_space::SpaceKind::NonMovableObject, pool));
        NonmovableAllocator::new(space)
    }

    #[test]
    fn alloc_reuses_freed_chunk() {
        let alloc = allocator();
        let a = alloc.alloc(64).unwrap();
        alloc.free(a, 64);
        let b = alloc.alloc(64).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn allocated_objects_land_in_nonmovable_regions() {
        let alloc = allocator();
        let addr = alloc.alloc(64).unwrap();
        let region = alloc.space.contains_address(addr).unwrap();
        assert!(region.has_flag(RegionFlags::NON_MOVABLE));
    }
}
