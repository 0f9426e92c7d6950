//! Local reference frames: a per-thread stack of fixed-capacity blocks, a JNI-style
//! local-reference-frame protocol (`push_local_frame(capacity)` / `pop_local_frame(result)`,
//! one block cached for ping-pong reuse between pushes). Sizing comes from
//! `REF_BLOCK_SIZE_BYTES`/`REFS_PER_BLOCK`/`LOCAL_FRAME_BUDGET_BYTES` in
//! [`crate::util::constants`]. Not thread-safe by design: each thread owns exactly one
//! `LocalFrameStack`; the GC only touches it while that thread is suspended.

use crate::util::constants::{LOCAL_FRAME_BUDGET_BYTES, REFS_PER_BLOCK, REF_BLOCK_SIZE_BYTES};
use crate::util::Address;

/// A fixed-size slab of local reference slots, 512-byte aligned for a cache-friendly
/// block layout.
#[repr(align(512))]
struct RefBlock {
    slots: [Option<Address>; REFS_PER_BLOCK],
    /// Bit `i` set means slot `i` is free.
    free_bitmap: u64,
}

const _: () = assert!(REFS_PER_BLOCK <= 64, "free_bitmap is a u64");

impl RefBlock {
    fn new() -> Self {
        RefBlock { slots: [None; REFS_PER_BLOCK], free_bitmap: (1u64 << REFS_PER_BLOCK) - 1 }
    }

    fn is_full(&self) -> bool {
        self.free_bitmap == 0
    }

    fn alloc_slot(&mut self, addr: Address) -> Option<usize> {
        if self.free_bitmap == 0 {
            return None;
        }
        let idx = self.free_bitmap.trailing_zeros() as usize;
        self.free_bitmap &= !(1u64 << idx);
        self.slots[idx] = Some(addr);
        Some(idx)
    }

    fn free_slot(&mut self, idx: usize) {
        self.slots[idx] = None;
        self.free_bitmap |= 1u64 << idx;
    }

    fn get(&self, idx: usize) -> Option<Address> {
        self.slots[idx]
    }
}

/// A thread's local-reference frame stack: a growable sequence of [`RefBlock`]s divided into
/// frames by `PushLocalFrame`/`PopLocalFrame`. One freed block is cached so the common
/// push/pop/push cycle doesn't thrash the allocator.
pub struct LocalFrameStack {
    blocks: Vec<Box<RefBlock>>,
    /// Index into `blocks` at which each currently-open frame began.
    frame_marks: Vec<usize>,
    cached_block: Option<Box<RefBlock>>,
    budget_blocks: usize,
}

impl LocalFrameStack {
    pub fn new() -> Self {
        LocalFrameStack {
            blocks: Vec::new(),
            frame_marks: Vec::new(),
            cached_block: None,
            budget_blocks: LOCAL_FRAME_BUDGET_BYTES / REF_BLOCK_SIZE_BYTES,
        }
    }

    fn take_block(&mut self) -> Box<RefBlock> {
        self.cached_block.take().unwrap_or_else(|| Box::new(RefBlock::new()))
    }

    /// Open a new frame sized for at least `capacity` references. Returns `false` if doing
    /// so would exceed the local-frame block budget, leaving the stack unchanged.
    pub fn push_local_frame(&mut self, capacity: usize) -> bool {
        let needed_blocks = capacity.div_ceil(REFS_PER_BLOCK).max(1);
        if self.blocks.len() + needed_blocks > self.budget_blocks {
            return false;
        }
        self.frame_marks.push(self.blocks.len());
        for _ in 0..needed_blocks {
            let block = self.take_block();
            self.blocks.push(block);
        }
        true
    }

    /// Close the most recently opened frame, discarding every local reference created inside
    /// it. `result`, if given, is an address to re-root in the enclosing frame (or at the
    /// base of the stack, if this was the outermost frame) before it would otherwise be
    /// invalidated by the pop. Returns the new local-reference slot for `result`, if any.
    ///
    /// # Panics
    /// Panics if called without a matching `push_local_frame`.
    pub fn pop_local_frame(&mut self, result: Option<Address>) -> Option<usize> {
        let sentinel = self.frame_marks.pop().expect("pop_local_frame without a matching push_local_frame");
        while self.blocks.len() > sentinel {
            let freed = self.blocks.pop().unwrap();
            self.cached_block = Some(freed);
        }
        result.map(|addr| self.new_local(addr))
    }

    /// Allocate a new local reference slot for `addr`, returning a stack-wide slot index
    /// (encoded as `block_index * REFS_PER_BLOCK + slot_in_block`).
    pub fn new_local(&mut self, addr: Address) -> usize {
        if self.blocks.is_empty() || self.blocks.last().unwrap().is_full() {
            let block = self.take_block();
            self.blocks.push(block);
        }
        let block_idx = self.blocks.len() - 1;
        let slot = self.blocks[block_idx].alloc_slot(addr).expect("a fresh or partially-full block always has room");
        block_idx * REFS_PER_BLOCK + slot
    }

    pub fn remove_local(&mut self, global_index: usize) {
        let (block_idx, slot) = (global_index / REFS_PER_BLOCK, global_index % REFS_PER_BLOCK);
        if let Some(block) = self.blocks.get_mut(block_idx) {
            block.free_slot(slot);
        }
    }

    pub fn get_local(&self, global_index: usize) -> Option<Address> {
        let (block_idx, slot) = (global_index / REFS_PER_BLOCK, global_index % REFS_PER_BLOCK);
        self.blocks.get(block_idx).and_then(|b| b.get(slot))
    }

    pub fn depth(&self) -> usize {
        self.frame_marks.len()
    }
}

impl Default for LocalFrameStack {
    fn default() -> Self {
        Self::new()
    }
}
