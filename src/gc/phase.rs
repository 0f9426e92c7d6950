//! The GC phase machine: one atomic field, one writer (the GC thread), many readers.
//!
//! One atomic field ranging over `{Idle, Running, Mark, Sweep, Compact}`, written by the GC
//! thread and read freely by anyone else.

use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Phase {
    Idle = 0,
    Running = 1,
    Mark = 2,
    Sweep = 3,
    Compact = 4,
}

impl Phase {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Phase::Idle,
            1 => Phase::Running,
            2 => Phase::Mark,
            3 => Phase::Sweep,
            4 => Phase::Compact,
            _ => unreachable!("invalid phase byte"),
        }
    }
}

/// Wraps the packed phase byte plus the CAS-into-RUNNING used to claim a GC cycle.
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub fn new() -> Self {
        PhaseCell(AtomicU8::new(Phase::Idle as u8))
    }

    pub fn load(&self) -> Phase {
        Phase::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, phase: Phase) {
        self.0.store(phase as u8, Ordering::Release);
    }

    /// Claim the GC cycle by transitioning IDLE -> RUNNING. Returns `false` on failure, in
    /// which case the caller spins (spec: "on failure spin via safepoint-aware sleep").
    pub fn try_claim(&self) -> bool {
        self.0.compare_exchange(Phase::Idle as u8, Phase::Running as u8, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}
