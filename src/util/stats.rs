//! Per-phase GC timing statistics, gated behind the `stats` feature.
//!
//! A handful of named counters updated by the collector and printed at shutdown: per-phase
//! wall-clock timers and a running GC-cycle count. No per-work-packet statistics are
//! tracked since this crate has no work-packet scheduler.

use crate::gc::phase::Phase;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct PhaseAccum {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl Default for PhaseAccum {
    fn default() -> Self {
        PhaseAccum { count: 0, total: Duration::ZERO, min: Duration::MAX, max: Duration::ZERO }
    }
}

impl PhaseAccum {
    fn observe(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }
}

/// Accumulates wall-clock time spent in each [`Phase`] across all GC cycles.
///
/// A no-op when the `stats` feature is disabled: [`Stats::record`] still compiles (so
/// callers don't need `#[cfg]` gates at every call site) but the bookkeeping is skipped.
#[derive(Default)]
pub struct Stats {
    #[cfg(feature = "stats")]
    phases: std::sync::Mutex<HashMap<Phase, PhaseAccum>>,
    gc_count: std::sync::atomic::AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg_attr(not(feature = "stats"), allow(unused_variables))]
    pub fn record(&self, phase: Phase, elapsed: Duration) {
        self.gc_count.fetch_add(0, std::sync::atomic::Ordering::Relaxed);
        #[cfg(feature = "stats")]
        {
            let mut phases = self.phases.lock().unwrap();
            phases.entry(phase).or_default().observe(elapsed);
        }
    }

    pub fn note_gc_cycle(&self) {
        self.gc_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn gc_cycle_count(&self) -> u64 {
        self.gc_count.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Print a human-readable summary to stderr.
    pub fn print_summary(&self) {
        eprintln!("rtgc: {} GC cycles", self.gc_cycle_count());
        #[cfg(feature = "stats")]
        {
            let phases = self.phases.lock().unwrap();
            let mut entries: Vec<_> = phases.iter().collect();
            entries.sort_by_key(|(phase, _)| format!("{phase:?}"));
            for (phase, accum) in entries {
                eprintln!(
                    "  {phase:?}: {} runs, {:?} total, {:?} avg, {:?} min, {:?} max",
                    accum.count,
                    accum.total,
                    accum.total / accum.count.max(1) as u32,
                    if accum.count == 0 { Duration::ZERO } else { accum.min },
                    accum.max,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gc_cycle_count_increments() {
        let stats = Stats::new();
        stats.note_gc_cycle();
        stats.note_gc_cycle();
        assert_eq!(stats.gc_cycle_count(), 2);
    }

    #[cfg(feature = "stats")]
    #[test]
    fn phase_accum_tracks_min_and_max_across_observations() {
        let mut accum = PhaseAccum::default();
        accum.observe(Duration::from_nanos(30));
        accum.observe(Duration::from_nanos(10));
        accum.observe(Duration::from_nanos(20));
        assert_eq!(accum.count, 3);
        assert_eq!(accum.total, Duration::from_nanos(60));
        assert_eq!(accum.min, Duration::from_nanos(10));
        assert_eq!(accum.max, Duration::from_nanos(30));
    }
}
