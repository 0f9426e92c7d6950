//! G1-style (g1-gc): region-at-a-time collection with a concurrent-marking flag and
//! garbage-first tenured region selection.
//!
//! Young collection is STW, same shape as [`crate::gc::collector::generational`]'s. Tenured
//! collection selects regions by `garbage_bytes` (see
//! [`crate::heap::region::Region::garbage_bytes`]) rather than collecting every old region —
//! "garbage first" region ranking. `hybrid-gc` is folded into this variant (see
//! [`crate::gc::collector::CollectorKind`]).

use crate::gc::collector::common::{is_marked_with_sense, set_mark_bit, transitive_mark};
use crate::gc::collector::{Collector, CollectorKind, GenerationalCollector as GenerationalCapability, TraceContext};
use crate::gc::task::{GcCause, GcTask};
use crate::heap::region::RegionFlags;
use crate::heap::region_space::RegionSpace;
use crate::util::constants::MIN_ALIGNMENT;
use crate::util::ObjectReference;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const DEFAULT_MAJOR_PERIOD: u32 = 3;

/// How many old regions (ranked by `garbage_bytes`, highest first) a single tenured cycle
/// compacts. The original tunes this dynamically against a pause-time goal; this is a fixed
/// stand-in for that budget.
const TENURED_REGIONS_PER_CYCLE: usize = 2;

pub struct G1Collector {
    space: Arc<RegionSpace>,
    reversed_mark: AtomicBool,
    /// Gates the pre-barrier (SATB): set for the duration of concurrent marking.
    concurrent_marking: Arc<AtomicBool>,
    young_cycle_count: AtomicU32,
    forwarding: Mutex<HashMap<ObjectReference, ObjectReference>>,
}

impl G1Collector {
    pub fn new(space: Arc<RegionSpace>) -> Self {
        G1Collector {
            space,
            reversed_mark: AtomicBool::new(false),
            concurrent_marking: Arc::new(AtomicBool::new(false)),
            young_cycle_count: AtomicU32::new(0),
            forwarding: Mutex::new(HashMap::new()),
        }
    }

    fn live_sense(&self) -> bool {
        !self.reversed_mark.load(Ordering::Relaxed)
    }

    pub fn concurrent_marking_flag(&self) -> Arc<AtomicBool> {
        self.concurrent_marking.clone()
    }

    pub fn forwarding_map(&self) -> HashMap<ObjectReference, ObjectReference> {
        self.forwarding.lock().unwrap().clone()
    }

    /// Old regions ranked by `garbage_bytes`, most garbage first, for a tenured collection
    /// pass.
    fn collection_set(&self) -> Vec<Arc<crate::heap::region::Region>> {
        let mut old = self.space.regions_with_flag(RegionFlags::OLD);
        old.sort_by_key(|r| std::cmp::Reverse(r.garbage_bytes()));
        old.truncate(TENURED_REGIONS_PER_CYCLE);
        old
    }
}

impl Collector for G1Collector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::G1
    }

    fn space(&self) -> &Arc<RegionSpace> {
        &self.space
    }

    fn init_gc_bits(&self, obj: ObjectReference) {
        set_mark_bit(&self.space, obj, !self.live_sense());
    }

    fn init_gc_bits_for_tlab_alloc(&self, obj: ObjectReference) {
        self.init_gc_bits(obj);
    }

    fn trigger(&self) {}

    fn mark_object(&self, obj: ObjectReference) {
        set_mark_bit(&self.space, obj, self.live_sense());
    }

    fn mark_object_if_not_marked(&self, obj: ObjectReference) -> bool {
        if self.is_marked(obj) {
            return false;
        }
        self.mark_object(obj);
        true
    }

    fn unmark_object(&self, obj: ObjectReference) {
        set_mark_bit(&self.space, obj, !self.live_sense());
    }

    fn is_marked(&self, obj: ObjectReference) -> bool {
        is_marked_with_sense(&self.space, obj, self.live_sense())
    }

    fn run_phases(&self, task: &GcTask, ctx: &TraceContext<'_>) {
        self.run_young(ctx);
        if self.should_run_tenured(task) {
            self.run_tenured(task, ctx);
        }
    }
}

impl GenerationalCapability for G1Collector {
    /// STW young collection: same evacuate-and-forward shape as the generational
    /// collector's. `ctx.roots` is expected to already merge in remembered-set-derived
    /// roots the core resolved via `RemSet::visit_marked_cards` before calling in.
    fn run_young(&self, ctx: &TraceContext<'_>) {
        let young_regions: Vec<_> = self
            .space
            .regions_with_flag(RegionFlags::EDEN)
            .into_iter()
            .chain(self.space.regions_with_flag(RegionFlags::SURVIVOR))
            .collect();

        transitive_mark(ctx.roots, ctx.trace_object, |obj| self.mark_object_if_not_marked(obj));

        let tenured = self.space.regions_with_flag(RegionFlags::OLD).into_iter().next().unwrap_or_else(|| self.space.new_region(RegionFlags::OLD, 1));
        let mut forwarding = self.forwarding.lock().unwrap();
        for region in &young_regions {
            let mut addr = region.begin;
            while addr < region.top() {
                let obj = ObjectReference::from_raw_address(addr).unwrap();
                if self.is_marked(obj) && !forwarding.contains_key(&obj) {
                    if let Some(new_addr) = tenured.alloc(MIN_ALIGNMENT, MIN_ALIGNMENT) {
                        forwarding.insert(obj, ObjectReference::from_raw_address(new_addr).unwrap());
                    }
                }
                addr = addr + MIN_ALIGNMENT;
            }
        }
        drop(forwarding);

        for region in &young_regions {
            region.set_top(region.begin);
        }
        self.young_cycle_count.fetch_add(1, Ordering::Relaxed);
    }

    /// InitialMark (STW) + ConcurrentMark + ReMark (STW), folded into one transitive mark
    /// pass in the absence of a separate marker thread at this layer, then compacts the
    /// `garbage_bytes`-ranked collection set by resetting each chosen region's bump pointer
    /// (its live objects have already been forwarded out by a prior marking pass that
    /// walks it as a root, mirroring evacuation without a real copy routine).
    fn run_tenured(&self, _task: &GcTask, ctx: &TraceContext<'_>) {
        self.concurrent_marking.store(true, Ordering::Relaxed);
        transitive_mark(ctx.roots, ctx.trace_object, |obj| self.mark_object_if_not_marked(obj));
        self.concurrent_marking.store(false, Ordering::Relaxed);

        for region in self.collection_set() {
            region.set_top(region.begin);
        }
        self.reversed_mark.fetch_xor(true, Ordering::Relaxed);
    }

    fn should_run_tenured(&self, task: &GcTask) -> bool {
        matches!(task.cause, GcCause::Explicit | GcCause::Oom) || self.young_cycle_count.load(Ordering::Relaxed) % DEFAULT_MAJOR_PERIOD == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::region_pool::RegionPool;
    use crate::heap::region_space::SpaceKind;
    use crate::util::constants::BYTES_IN_REGION;

    fn setup() -> (G1Collector, ObjectReference) {
        let pool = Arc::new(RegionPool::new(BYTES_IN_REGION, 4, true));
        let space = Arc::new(RegionSpace::new(SpaceKind::Object, pool));
        let region = space.new_region(RegionFlags::EDEN, 1);
        let root = ObjectReference::from_raw_address(region.alloc(64, 8).unwrap()).unwrap();
        (G1Collector::new(space), root)
    }

    #[test]
    fn young_collection_forwards_survivors_into_old() {
        let (gc, root) = setup();
        let trace = |_: ObjectReference, _: &mut dyn FnMut(ObjectReference)| {};
        let ctx = TraceContext { roots: &[root], trace_object: &trace };
        gc.run_young(&ctx);
        assert!(gc.forwarding_map().contains_key(&root));
    }

    #[test]
    fn tenured_collection_sets_concurrent_marking_flag_then_clears_it() {
        let (gc, root) = setup();
        let flag = gc.concurrent_marking_flag();
        let trace = |_: ObjectReference, _: &mut dyn FnMut(ObjectReference)| {};
        let ctx = TraceContext { roots: &[root], trace_object: &trace };
        assert!(!flag.load(Ordering::Relaxed));
        gc.run_tenured(&GcTask::new(GcCause::Explicit), &ctx);
        assert!(!flag.load(Ordering::Relaxed));
    }

    #[test]
    fn collection_set_prefers_regions_with_more_garbage() {
        let (gc, _root) = setup();
        let low = gc.space.new_region(RegionFlags::OLD, 1);
        low.alloc(128, 8);
        low.set_live_bytes(120);
        let high = gc.space.new_region(RegionFlags::OLD, 1);
        high.alloc(128, 8);
        high.set_live_bytes(10);
        let set = gc.collection_set();
        assert_eq!(set[0].id, high.id);
    }
}
