//! Region memory supply: a pre-reserved block of slots (fast path) plus an optional
//! unbounded `mmap` fallback.
//!
//! Grounded on the original's `runtime/mem/region_space.h` `RegionBlock`/`RegionPool`
//! classes: a `RegionBlock` carves fixed-size slots out of one contiguous mapping and
//! tracks free slots under a lock; `RegionPool` falls back to mmap'ing individual chunks
//! directly once the block is exhausted, if `extend` was requested at construction.

use crate::util::Address;
use std::sync::Mutex;

struct RegionBlock {
    region_size: usize,
    base: Address,
    capacity: usize,
    free_slots: Mutex<Vec<u32>>,
}

impl RegionBlock {
    fn new(region_size: usize, capacity: usize) -> Self {
        let bytes = region_size * capacity;
        let base = if bytes == 0 { Address::ZERO } else { mmap_anon(bytes) };
        RegionBlock {
            region_size,
            base,
            capacity,
            free_slots: Mutex::new((0..capacity as u32).rev().collect()),
        }
    }

    fn alloc(&self) -> Option<Address> {
        let mut free = self.free_slots.lock().unwrap();
        let slot = free.pop()?;
        Some(self.base + slot as usize * self.region_size)
    }

    fn is_in_range(&self, addr: Address) -> bool {
        self.capacity > 0 && addr >= self.base && addr < self.base + self.capacity * self.region_size
    }

    fn free(&self, addr: Address) {
        debug_assert!(self.is_in_range(addr));
        let slot = ((addr - self.base) / self.region_size) as u32;
        self.free_slots.lock().unwrap().push(slot);
    }

    fn free_slot_count(&self) -> usize {
        self.free_slots.lock().unwrap().len()
    }
}

/// Two-tier region supply: `block` services allocations up to its pre-reserved capacity;
/// once full, `extend` (if set) allows falling back to one direct `mmap` per region.
pub struct RegionPool {
    region_size: usize,
    block: RegionBlock,
    extend: bool,
    overflow: Mutex<Vec<Address>>,
}

impl RegionPool {
    pub fn new(region_size: usize, preallocated_regions: usize, extend: bool) -> Self {
        RegionPool {
            region_size,
            block: RegionBlock::new(region_size, preallocated_regions),
            extend,
            overflow: Mutex::new(Vec::new()),
        }
    }

    pub fn region_size(&self) -> usize {
        self.region_size
    }

    pub fn free_regions_in_block(&self) -> usize {
        self.block.free_slot_count()
    }

    /// Allocate `size` bytes of region-aligned memory (`size` is normally `region_size`,
    /// but humongous regions request a multiple of it). Fatal if the pool is exhausted and
    /// `extend` is false, or if `mmap` itself fails — both match the error taxonomy's
    /// "invalid runtime state" case.
    pub fn alloc_region_memory(&self, size: usize) -> Address {
        if size == self.region_size {
            if let Some(addr) = self.block.alloc() {
                return addr;
            }
        }
        assert!(self.extend, "region pool exhausted and extension is disabled");
        let addr = mmap_anon(size);
        if size == self.region_size {
            self.overflow.lock().unwrap().push(addr);
        }
        addr
    }

    pub fn free_region_memory(&self, addr: Address, size: usize, release_pages: bool) {
        if self.block.is_in_range(addr) {
            self.block.free(addr);
            if release_pages {
                madvise_dontneed(addr, size);
            }
            return;
        }
        self.overflow.lock().unwrap().retain(|&a| a != addr);
        munmap_anon(addr, size);
    }
}

fn mmap_anon(bytes: usize) -> Address {
    let bytes = crate::util::constants::align_up(bytes.max(1), crate::util::constants::BYTES_IN_PAGE);
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            bytes,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    assert!(ptr != libc::MAP_FAILED, "mmap failed for {bytes} bytes: {}", std::io::Error::last_os_error());
    Address::from_ptr(ptr as *const u8)
}

fn munmap_anon(addr: Address, bytes: usize) {
    let bytes = crate::util::constants::align_up(bytes.max(1), crate::util::constants::BYTES_IN_PAGE);
    let rc = unsafe { libc::munmap(addr.to_mut_ptr::<libc::c_void>(), bytes) };
    debug_assert_eq!(rc, 0, "munmap failed: {}", std::io::Error::last_os_error());
}

fn madvise_dontneed(addr: Address, bytes: usize) {
    let bytes = crate::util::constants::align_up(bytes.max(1), crate::util::constants::BYTES_IN_PAGE);
    unsafe {
        libc::madvise(addr.to_mut_ptr::<libc::c_void>(), bytes, libc::MADV_DONTNEED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::BYTES_IN_PAGE;

    #[test]
    fn block_allocations_stay_within_capacity() {
        let pool = RegionPool::new(BYTES_IN_PAGE, 2, false);
        let a = pool.alloc_region_memory(BYTES_IN_PAGE);
        let b = pool.alloc_region_memory(BYTES_IN_PAGE);
        assert_ne!(a, b);
        assert_eq!(pool.free_regions_in_block(), 0);
        pool.free_region_memory(a, BYTES_IN_PAGE, false);
        assert_eq!(pool.free_regions_in_block(), 1);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn exhausted_block_without_extend_panics() {
        let pool = RegionPool::new(BYTES_IN_PAGE, 1, false);
        let _a = pool.alloc_region_memory(BYTES_IN_PAGE);
        let _b = pool.alloc_region_memory(BYTES_IN_PAGE);
    }

    #[test]
    fn extend_falls_back_to_overflow_mmap() {
        let pool = RegionPool::new(BYTES_IN_PAGE, 1, true);
        let _a = pool.alloc_region_memory(BYTES_IN_PAGE);
        let b = pool.alloc_region_memory(BYTES_IN_PAGE);
        assert!(!pool.block.is_in_range(b));
    }
}
