//! The GC core: the phase-machine-driven task runner sitting above a [`AnyCollector`]
//! variant.
//!
//! A task run claims the phase machine, bumps the cycle counter, notifies listeners, runs
//! the collector's plan, drives reference processing, then releases the phase machine. The
//! worker-thread loop that repeatedly calls [`GcCore::run_next_task`]
//! lives in [`crate::runtime`], since only the runtime knows how to resolve roots from a live
//! [`crate::thread::ThreadManager`]/[`crate::lang::LanguageContext`] pair.

use crate::gc::collector::{AnyCollector, Collector, CollectorKind, TraceContext};
use crate::gc::phase::{Phase, PhaseCell};
use crate::gc::queue::GcQueue;
use crate::gc::task::GcTask;
use crate::heap::region::RegionFlags;
use crate::heap::region_space::RegionSpace;
use crate::refs::RefTable;
use crate::util::constants::{CARD_SIZE, MIN_ALIGNMENT};
use crate::util::stats::Stats;
use crate::util::ObjectReference;
use std::sync::{Arc, Mutex};

pub struct GcCore {
    phase: PhaseCell,
    queue: GcQueue,
    collector: AnyCollector,
    ref_table: Mutex<RefTable>,
    stats: Stats,
}

impl GcCore {
    pub fn new(kind: CollectorKind, space: Arc<RegionSpace>, max_global_refs: usize) -> Self {
        GcCore {
            phase: PhaseCell::new(),
            queue: GcQueue::new(),
            collector: AnyCollector::new(kind, space),
            ref_table: Mutex::new(RefTable::new(max_global_refs)),
            stats: Stats::new(),
        }
    }

    pub fn collector(&self) -> &AnyCollector {
        &self.collector
    }

    pub fn ref_table(&self) -> &Mutex<RefTable> {
        &self.ref_table
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn phase(&self) -> Phase {
        self.phase.load()
    }

    /// Request a collection asynchronously. A no-op trigger for Epsilon; every other
    /// variant just enqueues, the worker loop does the rest.
    pub fn enqueue(&self, task: GcTask) {
        self.queue.add_task(task);
        self.collector.trigger();
        self.queue.signal();
    }

    pub fn finalize_queue(&self) {
        self.queue.finalize();
    }

    /// Pop and run the next due task. Blocks per [`GcQueue::get_task`]'s semantics; returns
    /// `false` once the queue is finalized and drained, signalling the worker loop to exit.
    pub fn run_next_task(&self, now_nanos: impl Fn() -> u64, ctx: &TraceContext<'_>) -> bool {
        let is_running = || self.phase.load() != Phase::Idle;
        let Some(task) = self.queue.get_task(is_running, now_nanos) else {
            return false;
        };
        self.run_task(&task, ctx);
        true
    }

    /// Claim -> bump cycle counter -> log start -> run the variant's plan -> drive
    /// reference processing -> log finish -> release. No separate heap-verification or
    /// worker-creation steps: this core has no object model of its own to verify against,
    /// and task execution happens inline rather than on a dedicated worker thread.
    pub fn run_task(&self, task: &GcTask, ctx: &TraceContext<'_>) {
        if !self.phase.try_claim() {
            log::warn!("gc core: dropping {} task, a collection is already running", task.cause);
            return;
        }
        self.stats.note_gc_cycle();
        log::info!("gc started: cause={}", task.cause);

        self.phase.store(Phase::Mark);
        let mut roots = ctx.roots.to_vec();
        roots.extend(self.remset_roots());
        let augmented_ctx = TraceContext { roots: &roots, trace_object: ctx.trace_object };
        let start = std::time::Instant::now();
        self.collector.run_phases(task, &augmented_ctx);
        self.stats.record(self.phase.load(), start.elapsed());

        self.phase.store(Phase::Sweep);
        self.drive_reference_processing();

        self.phase.store(Phase::Idle);
        log::info!("gc finished: cause={}", task.cause);
    }

    /// Cross-region roots owed to the write barrier: for every young (Eden/Survivor) region,
    /// resolve its remembered set's `(from_region, card)` entries back to that old region's
    /// dirty byte range, and treat every already-marked object overlapping it as a root,
    /// since any of them may hold a field pointing into the young region.
    fn remset_roots(&self) -> Vec<ObjectReference> {
        let space = self.collector.space();
        let mut roots = Vec::new();
        let young_regions = space.regions_with_flag(RegionFlags::EDEN).into_iter().chain(space.regions_with_flag(RegionFlags::SURVIVOR));
        for young in young_regions {
            young.rem_set.visit_marked_cards(|from_region, card| {
                let Some(from) = space.get(from_region) else { return };
                let card_start = from.begin + card * CARD_SIZE;
                let end = (card_start + CARD_SIZE).min(from.top());
                let mut addr = card_start;
                while addr < end {
                    if let Some(obj) = ObjectReference::from_raw_address(addr) {
                        if self.collector.is_marked(obj) {
                            roots.push(obj);
                        }
                    }
                    addr = addr + MIN_ALIGNMENT;
                }
            });
        }
        roots
    }

    /// After a cycle, re-point every live global/weak slot through whatever forwarding the
    /// collector variant produced (a no-op for non-moving collectors), then null out weak
    /// slots pointing at objects the collector didn't mark.
    fn drive_reference_processing(&self) {
        let ref_table = self.ref_table.lock().unwrap();
        match &self.collector {
            AnyCollector::Generational(gc) => {
                let forwarding = gc.forwarding_map();
                ref_table.update_moved_refs(|obj: ObjectReference| forwarding.get(&obj).copied());
            }
            AnyCollector::G1(gc) => {
                let forwarding = gc.forwarding_map();
                ref_table.update_moved_refs(|obj: ObjectReference| forwarding.get(&obj).copied());
            }
            AnyCollector::Epsilon(_) | AnyCollector::Stw(_) => {}
        }
        ref_table.clear_unmarked_weak_refs(|obj| self.collector.is_marked(obj));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::task::GcCause;
    use crate::heap::region::RegionFlags;
    use crate::heap::region_pool::RegionPool;
    use crate::heap::region_space::SpaceKind;
    use crate::refs::{LocalFrameStack, NewRefKind};
    use crate::util::constants::BYTES_IN_REGION;

    fn core(kind: CollectorKind) -> (GcCore, ObjectReference) {
        let pool = Arc::new(RegionPool::new(BYTES_IN_REGION, 4, true));
        let space = Arc::new(RegionSpace::new(SpaceKind::Object, pool));
        let region = space.new_region(RegionFlags::EDEN, 1);
        let root = ObjectReference::from_raw_address(region.alloc(64, 8).unwrap()).unwrap();
        (GcCore::new(kind, space, 1024), root)
    }

    #[test]
    fn run_task_releases_phase_back_to_idle() {
        let (core, root) = core(CollectorKind::Stw);
        let trace = |_: ObjectReference, _: &mut dyn FnMut(ObjectReference)| {};
        let ctx = TraceContext { roots: &[root], trace_object: &trace };
        core.run_task(&GcTask::new(GcCause::Explicit), &ctx);
        assert_eq!(core.phase(), Phase::Idle);
        assert_eq!(core.stats().gc_cycle_count(), 1);
    }

    #[test]
    fn a_second_overlapping_task_is_dropped_not_queued_forever() {
        let (core, root) = core(CollectorKind::Stw);
        assert_eq!(core.phase(), Phase::Idle);
        assert!(core.phase.try_claim());
        let trace = |_: ObjectReference, _: &mut dyn FnMut(ObjectReference)| {};
        let ctx = TraceContext { roots: &[root], trace_object: &trace };
        core.run_task(&GcTask::new(GcCause::Explicit), &ctx);
        assert_eq!(core.phase(), Phase::Running);
        core.phase.store(Phase::Idle);
    }

    #[test]
    fn run_task_forwards_a_young_object_reachable_only_through_a_remset_root() {
        let pool = Arc::new(RegionPool::new(BYTES_IN_REGION, 4, true));
        let space = Arc::new(RegionSpace::new(SpaceKind::Object, pool));
        let old = space.new_region(RegionFlags::OLD, 1);
        let young = space.new_region(RegionFlags::EDEN, 1);

        let old_obj_addr = old.alloc(64, 8).unwrap();
        let old_obj = ObjectReference::from_raw_address(old_obj_addr).unwrap();
        old.mark_bitmap().set(old_obj_addr);

        let young_obj = ObjectReference::from_raw_address(young.alloc(64, 8).unwrap()).unwrap();

        let card = (old_obj_addr.as_usize() - old.begin.as_usize()) / crate::util::constants::CARD_SIZE;
        young.rem_set.add_ref(old.id, card);

        let core = GcCore::new(CollectorKind::Generational, space, 1024);
        let trace = move |obj: ObjectReference, visit: &mut dyn FnMut(ObjectReference)| {
            if obj == old_obj {
                visit(young_obj);
            }
        };
        let ctx = TraceContext { roots: &[], trace_object: &trace };
        core.run_task(&GcTask::new(GcCause::Explicit), &ctx);

        let forwarding = match core.collector() {
            AnyCollector::Generational(gc) => gc.forwarding_map(),
            _ => unreachable!(),
        };
        assert!(forwarding.contains_key(&young_obj), "young object reachable only via the tenured remset root should have survived");
    }

    #[test]
    fn weak_refs_pointing_at_unmarked_objects_are_cleared_after_a_cycle() {
        let (core, root) = core(CollectorKind::Stw);
        let mut locals = LocalFrameStack::new();
        let dangling = ObjectReference::from_raw_address(crate::util::Address::from_usize(0x7_0000)).unwrap();
        let weak = core.ref_table.lock().unwrap().new_ref(&mut locals, dangling, NewRefKind::Weak).unwrap();

        let trace = |_: ObjectReference, _: &mut dyn FnMut(ObjectReference)| {};
        let ctx = TraceContext { roots: &[root], trace_object: &trace };
        core.run_task(&GcTask::new(GcCause::Explicit), &ctx);

        assert_eq!(core.ref_table.lock().unwrap().get_object(&locals, weak), None);
    }
}
