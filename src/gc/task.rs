//! `GcCause` and `GcTask`: why a collection was requested and when it should run.
//!
//! Causes are ordered by priority: a bigger discriminant means a bigger priority. The
//! discriminant order below is load-bearing: [`GcCause`]'s `Ord` impl is what the priority
//! queue in [`crate::gc::queue`] would use if it broke cause ties (it currently only dedups
//! against the top of the queue, but a correctly-ordered enum keeps that option open).

use crate::thread::ThreadId;

#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Debug)]
pub enum GcCause {
    Invalid = 0,
    YoungGc,
    PygoteFork,
    StartupComplete,
    NativeAlloc,
    HeapUsageThreshold,
    Explicit,
    Oom,
}

impl std::fmt::Display for GcCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GcCause::Invalid => "Invalid",
            GcCause::YoungGc => "Young",
            GcCause::PygoteFork => "PygoteFork",
            GcCause::StartupComplete => "StartupComplete",
            GcCause::NativeAlloc => "NativeAlloc",
            GcCause::HeapUsageThreshold => "Threshold",
            GcCause::Explicit => "Explicit",
            GcCause::Oom => "OOM",
        };
        f.write_str(name)
    }
}

/// A single pending collection request: why, and the earliest nanosecond timestamp it
/// should run at (0 means "as soon as possible").
#[derive(Clone, Debug)]
pub struct GcTask {
    pub cause: GcCause,
    pub target_time_nanos: u64,
    pub caller: Option<ThreadId>,
    /// Set when the enqueuer wants `can_add_gc_task` CAS-cleared to suppress bursts of
    /// threshold-triggered tasks.
    pub triggered_by_threshold: bool,
}

impl GcTask {
    pub fn new(cause: GcCause) -> Self {
        GcTask { cause, target_time_nanos: 0, caller: None, triggered_by_threshold: false }
    }

    pub fn with_target_time(mut self, target_time_nanos: u64) -> Self {
        self.target_time_nanos = target_time_nanos;
        self
    }

    pub fn with_caller(mut self, caller: ThreadId) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn threshold_triggered(mut self) -> Self {
        self.triggered_by_threshold = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn causes_are_ordered_by_priority() {
        assert!(GcCause::Invalid < GcCause::YoungGc);
        assert!(GcCause::YoungGc < GcCause::PygoteFork);
        assert!(GcCause::PygoteFork < GcCause::StartupComplete);
        assert!(GcCause::StartupComplete < GcCause::NativeAlloc);
        assert!(GcCause::NativeAlloc < GcCause::HeapUsageThreshold);
        assert!(GcCause::HeapUsageThreshold < GcCause::Explicit);
        assert!(GcCause::Explicit < GcCause::Oom);
    }
}
