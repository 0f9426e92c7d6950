//! Region: a power-of-two-aligned contiguous address range hosting objects.
//!
//! Grounded on the original runtime's `runtime/mem/region_space.h` `Region` class
//! (`RegionFlag`, `top_`/bump cursor, `live_bitmap_`/`mark_bitmap_`, owned `RemSet`) and on
//! the cyclic-ownership redesign: regions live in an arena ([`crate::heap::region_space::RegionSpace`])
//! and are referred to by [`RegionId`], never by pointer, since a `Region` needs to know
//! its owning space and pool while the space and pool also need to enumerate regions.

use crate::heap::remset::RemSet;
use crate::util::constants::{is_aligned, BYTES_IN_REGION};
use crate::util::Address;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Index of a [`Region`] within its owning arena. Regions never move once allocated, so
/// this index is stable for the region's lifetime.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct RegionId(pub u32);

bitflags_like! {
    /// Disjoint-union of purposes a region can serve. A region has exactly one of these
    /// set at a time (see [`Region::set_single_flag`]), mirroring the original's
    /// `RegionFlag` enum even though it is implemented as a bitmask there too.
    pub struct RegionFlags: u8 {
        const EDEN = 1 << 0;
        const SURVIVOR = 1 << 1;
        const OLD = 1 << 2;
        const LARGE = 1 << 3;
        const NON_MOVABLE = 1 << 4;
    }
}

/// Declares a small bitflags-like type without pulling in the `bitflags` crate.
pub(crate) macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Default)]
        pub struct $name($repr);

        impl $name {
            $(pub const $variant: $name = $name($value);)*
            pub const EMPTY: $name = $name(0);

            pub const fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn with(self, other: $name) -> $name {
                $name(self.0 | other.0)
            }

            pub const fn without(self, other: $name) -> $name {
                $name(self.0 & !other.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }
    };
}
pub(crate) use bitflags_like;

/// A lazily-allocated bit-per-8-bytes bitmap over a region's body, used for both
/// `live_bitmap` and `mark_bitmap` (which are swapped wholesale at the end of a GC cycle).
#[derive(Debug)]
pub struct Bitmap {
    bits: Vec<AtomicU32>,
    base: Address,
}

impl Bitmap {
    pub fn new(base: Address, covered_bytes: usize) -> Self {
        let words = (covered_bytes / crate::util::constants::MIN_ALIGNMENT).div_ceil(32);
        Bitmap { bits: (0..words).map(|_| AtomicU32::new(0)).collect(), base }
    }

    fn index_of(&self, addr: Address) -> (usize, u32) {
        let offset = (addr - self.base) / crate::util::constants::MIN_ALIGNMENT;
        (offset / 32, 1u32 << (offset % 32))
    }

    pub fn set(&self, addr: Address) {
        let (word, bit) = self.index_of(addr);
        self.bits[word].fetch_or(bit, Ordering::Relaxed);
    }

    pub fn clear(&self, addr: Address) {
        let (word, bit) = self.index_of(addr);
        self.bits[word].fetch_and(!bit, Ordering::Relaxed);
    }

    pub fn is_set(&self, addr: Address) -> bool {
        let (word, bit) = self.index_of(addr);
        self.bits[word].load(Ordering::Relaxed) & bit != 0
    }

    pub fn clear_all(&self) {
        for w in &self.bits {
            w.store(0, Ordering::Relaxed);
        }
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|w| w.load(Ordering::Relaxed).count_ones() as usize).sum()
    }
}

/// A region's allocation/iteration mode, asserted mutually exclusive in debug builds
/// (`IsAllocating`/`IsIterating` in the original).
#[derive(Debug, Default)]
struct AccessMode {
    allocating: std::sync::atomic::AtomicBool,
    iterating: std::sync::atomic::AtomicBool,
}

pub struct Region {
    pub id: RegionId,
    pub begin: Address,
    pub end: Address,
    top: AtomicUsize,
    flags: std::sync::Mutex<RegionFlags>,
    live_bytes: AtomicUsize,
    live_bitmap: std::sync::OnceLock<Bitmap>,
    mark_bitmap: std::sync::OnceLock<Bitmap>,
    pub rem_set: Arc<RemSet>,
    tlab_owner: std::sync::Mutex<Option<crate::thread::ThreadId>>,
    access: AccessMode,
}

impl Region {
    pub fn new(id: RegionId, begin: Address, end: Address, flags: RegionFlags) -> Self {
        debug_assert!(is_aligned(begin.as_usize(), BYTES_IN_REGION) || flags.contains(RegionFlags::LARGE));
        Region {
            id,
            begin,
            end,
            top: AtomicUsize::new(begin.as_usize()),
            flags: std::sync::Mutex::new(flags),
            live_bytes: AtomicUsize::new(0),
            live_bitmap: std::sync::OnceLock::new(),
            mark_bitmap: std::sync::OnceLock::new(),
            rem_set: Arc::new(RemSet::new(id)),
            tlab_owner: std::sync::Mutex::new(None),
            access: AccessMode::default(),
        }
    }

    /// Lazily allocates the live bitmap on first use, as the original's
    /// `Region::CreateMarkBitmap`-style accessors do.
    pub fn live_bitmap(&self) -> &Bitmap {
        self.live_bitmap.get_or_init(|| Bitmap::new(self.begin, self.size()))
    }

    pub fn mark_bitmap(&self) -> &Bitmap {
        self.mark_bitmap.get_or_init(|| Bitmap::new(self.begin, self.size()))
    }

    /// Swap live and mark bitmaps at the end of a GC cycle.
    pub fn swap_mark_bitmap(&self) {
        self.live_bitmap();
        self.mark_bitmap();
        // Both are now initialized; exchange their contents rather than the cells
        // themselves, since `OnceLock` does not support in-place swap.
        let live = self.live_bitmap.get().unwrap();
        let mark = self.mark_bitmap.get().unwrap();
        for (l, m) in live.bits.iter().zip(mark.bits.iter()) {
            let lv = l.swap(m.load(Ordering::Relaxed), Ordering::Relaxed);
            m.store(lv, Ordering::Relaxed);
        }
    }

    pub fn top(&self) -> Address {
        Address::from_usize(self.top.load(Ordering::Acquire))
    }

    pub fn set_top(&self, new_top: Address) {
        self.top.store(new_top.as_usize(), Ordering::Release);
    }

    pub fn size(&self) -> usize {
        self.end - self.begin
    }

    pub fn bytes_used(&self) -> usize {
        self.top() - self.begin
    }

    pub fn flags(&self) -> RegionFlags {
        *self.flags.lock().unwrap()
    }

    pub fn add_flag(&self, flag: RegionFlags) {
        let mut f = self.flags.lock().unwrap();
        *f = f.with(flag);
    }

    pub fn remove_flag(&self, flag: RegionFlags) {
        let mut f = self.flags.lock().unwrap();
        *f = f.without(flag);
    }

    pub fn has_flag(&self, flag: RegionFlags) -> bool {
        self.flags().contains(flag)
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    pub fn set_live_bytes(&self, n: usize) {
        self.live_bytes.store(n, Ordering::Relaxed);
    }

    pub fn garbage_bytes(&self) -> usize {
        self.bytes_used().saturating_sub(self.live_bytes())
    }

    pub fn is_in_range(&self, addr: Address) -> bool {
        addr >= self.begin && addr < self.end
    }

    pub fn is_in_alloc_range(&self, addr: Address) -> bool {
        addr >= self.begin && addr < self.top()
    }

    /// Bump-allocate `size` bytes, aligned to `align`. Returns `None` if the region is
    /// exhausted; the caller (the allocator) is responsible for retrying in a fresh region.
    /// Mutually exclusive with iteration in debug builds, matching the original's
    /// `IsAllocating`/`IsIterating` guard pair.
    pub fn alloc(&self, size: usize, align: usize) -> Option<Address> {
        debug_assert!(!self.access.iterating.load(Ordering::Relaxed), "alloc during iteration");
        loop {
            let cur = self.top.load(Ordering::Acquire);
            let start = crate::util::constants::align_up(cur, align);
            let new_top = start.checked_add(size)?;
            if new_top > self.end.as_usize() {
                return None;
            }
            if self
                .top
                .compare_exchange_weak(cur, new_top, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(Address::from_usize(start));
            }
        }
    }

    pub fn bind_tlab(&self, owner: crate::thread::ThreadId) {
        *self.tlab_owner.lock().unwrap() = Some(owner);
    }

    pub fn revoke_tlab(&self) -> Option<crate::thread::ThreadId> {
        self.tlab_owner.lock().unwrap().take()
    }

    pub fn tlab_owner(&self) -> Option<crate::thread::ThreadId> {
        *self.tlab_owner.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(size: usize) -> Region {
        Region::new(RegionId(0), Address::from_usize(0x1_0000_0000), Address::from_usize(0x1_0000_0000 + size), RegionFlags::EDEN)
    }

    #[test]
    fn alloc_bumps_top_and_respects_bounds() {
        let r = region(256);
        let a = r.alloc(64, 8).unwrap();
        assert_eq!(a, Address::from_usize(0x1_0000_0000));
        let b = r.alloc(64, 8).unwrap();
        assert_eq!(b, a + 64);
        assert!(r.alloc(1024, 8).is_none());
    }

    #[test]
    fn flags_are_disjoint_updates() {
        let r = region(256);
        assert!(r.has_flag(RegionFlags::EDEN));
        r.remove_flag(RegionFlags::EDEN);
        r.add_flag(RegionFlags::OLD);
        assert!(!r.has_flag(RegionFlags::EDEN));
        assert!(r.has_flag(RegionFlags::OLD));
    }

    #[test]
    fn bitmap_set_and_clear() {
        let bm = Bitmap::new(Address::from_usize(0x1000), 4096);
        let a = Address::from_usize(0x1008);
        assert!(!bm.is_set(a));
        bm.set(a);
        assert!(bm.is_set(a));
        bm.clear(a);
        assert!(!bm.is_set(a));
    }
}
