//! RegionSpace: an arena of [`Region`]s sharing a [`RegionPool`].
//!
//! Grounded on the original's `runtime/mem/region_space.h` `RegionSpace` class (owns
//! destroy of its regions, delegates memory supply to a shared pool) and on the
//! cyclic-ownership redesign in the design notes: rather than a doubly-linked intrusive
//! list of `Region*`, the space owns an arena (`Vec<Option<Arc<Region>>>`) indexed by
//! [`RegionId`], so regions, the pool, and the space can all refer to each other by index
//! instead of by raw pointer.

use crate::heap::region::{Region, RegionFlags, RegionId};
use crate::heap::region_pool::RegionPool;
use std::sync::{Arc, RwLock};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SpaceKind {
    Object,
    NonMovableObject,
}

pub struct RegionSpace {
    kind: SpaceKind,
    pool: Arc<RegionPool>,
    region_size: usize,
    regions: RwLock<Vec<Option<Arc<Region>>>>,
    free_ids: std::sync::Mutex<Vec<u32>>,
}

impl RegionSpace {
    pub fn new(kind: SpaceKind, pool: Arc<RegionPool>) -> Self {
        let region_size = pool.region_size();
        RegionSpace { kind, pool, region_size, regions: RwLock::new(Vec::new()), free_ids: std::sync::Mutex::new(Vec::new()) }
    }

    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    pub fn pool(&self) -> &Arc<RegionPool> {
        &self.pool
    }

    /// Allocate a new region with the given flags. `size_multiplier` is 1 for a regular
    /// region and >1 for a humongous region spanning several region-sized slabs.
    pub fn new_region(&self, flags: RegionFlags, size_multiplier: usize) -> Arc<Region> {
        let bytes = self.region_size * size_multiplier.max(1);
        let begin = self.pool.alloc_region_memory(bytes);
        let end = begin + bytes;

        let mut free_ids = self.free_ids.lock().unwrap();
        let mut regions = self.regions.write().unwrap();
        let id = match free_ids.pop() {
            Some(id) => id,
            None => regions.len() as u32,
        };
        let region = Arc::new(Region::new(RegionId(id), begin, end, flags));
        if id as usize == regions.len() {
            regions.push(Some(region.clone()));
        } else {
            regions[id as usize] = Some(region.clone());
        }
        region
    }

    pub fn free_region(&self, id: RegionId) {
        let region = {
            let mut regions = self.regions.write().unwrap();
            regions[id.0 as usize].take()
        };
        if let Some(region) = region {
            let size = region.size();
            self.pool.free_region_memory(region.begin, size, true);
            self.free_ids.lock().unwrap().push(id.0);
        }
    }

    pub fn get(&self, id: RegionId) -> Option<Arc<Region>> {
        self.regions.read().unwrap().get(id.0 as usize).and_then(|r| r.clone())
    }

    pub fn for_each_region(&self, mut visitor: impl FnMut(&Arc<Region>)) {
        for region in self.regions.read().unwrap().iter().flatten() {
            visitor(region);
        }
    }

    pub fn regions_with_flag(&self, flag: RegionFlags) -> Vec<Arc<Region>> {
        self.regions.read().unwrap().iter().flatten().filter(|r| r.has_flag(flag)).cloned().collect()
    }

    pub fn free_all_regions(&self) {
        let ids: Vec<RegionId> = self.regions.read().unwrap().iter().flatten().map(|r| r.id).collect();
        for id in ids {
            self.free_region(id);
        }
    }

    pub fn contains_address(&self, addr: crate::util::Address) -> Option<Arc<Region>> {
        self.regions.read().unwrap().iter().flatten().find(|r| r.is_in_range(addr)).cloned()
    }
}

impl Drop for RegionSpace {
    fn drop(&mut self) {
        self.free_all_regions();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::BYTES_IN_PAGE;

    fn space() -> RegionSpace {
        let pool = Arc::new(RegionPool::new(BYTES_IN_PAGE, 4, true));
        RegionSpace::new(SpaceKind::Object, pool)
    }

    #[test]
    fn new_region_then_get_round_trips() {
        let space = space();
        let r = space.new_region(RegionFlags::EDEN, 1);
        let fetched = space.get(r.id).unwrap();
        assert_eq!(fetched.begin, r.begin);
    }

    #[test]
    fn freed_region_id_is_reused() {
        let space = space();
        let r1 = space.new_region(RegionFlags::EDEN, 1);
        let id1 = r1.id;
        space.free_region(id1);
        assert!(space.get(id1).is_none());
        let r2 = space.new_region(RegionFlags::EDEN, 1);
        assert_eq!(r2.id, id1);
    }

    #[test]
    fn regions_with_flag_filters_correctly() {
        let space = space();
        space.new_region(RegionFlags::EDEN, 1);
        space.new_region(RegionFlags::OLD, 1);
        assert_eq!(space.regions_with_flag(RegionFlags::OLD).len(), 1);
    }
}
