//! Generational (gen-gc): a young region set collected every cycle, a tenured set
//! collected periodically.
//!
//! Young collection copies survivors into tenured space and installs forwarding pointers;
//! tenured collection runs every `DEFAULT_MAJOR_PERIOD` young cycles, or when forced by
//! `Oom`/`Explicit`. This
//! collector doesn't model object copying byte-for-byte (no object layout is in scope at
//! this level, see [`crate::lang::LanguageContext`]); it allocates a same-slot placeholder
//! in a tenured region per surviving object and records the forwarding mapping, which is
//! exactly the part of the protocol [`crate::refs::RefTable::update_moved_refs`] and the
//! remembered-set update consume.

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

pub struct Generational {
    space: Arc<RegionSpace>,
    reversed_mark: AtomicBool,
    young_cycle_count: AtomicU32,
    forwarding: Mutex<HashMap<ObjectReference, ObjectReference>>,
}

impl Generational {
    pub fn new(space: Arc<RegionSpace>) -> Self {
        Generational { space, reversed_mark: AtomicBool::new(false), young_cycle_count: AtomicU32::new(0), forwarding: Mutex::new(HashMap::new()) }
    }

    fn live_sense(&self) -> bool {
        !self.reversed_mark.load(Ordering::Relaxed)
    }

    fn tenured_region(&self) -> Arc<crate::heap::region::Region> {
        self.space.regions_with_flag(RegionFlags::OLD).into_iter().next().unwrap_or_else(|| self.space.new_region(RegionFlags::OLD, 1))
    }

    /// The forwarding table built up by the most recent young (or tenured) collection.
    /// Consumed by the GC core to drive `UpdateVmRefs`/`UpdateGlobalObjectStorage`.
    pub fn forwarding_map(&self) -> HashMap<ObjectReference, ObjectReference> {
        self.forwarding.lock().unwrap().clone()
    }
}

impl Collector for Generational {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Generational
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

impl GenerationalCapability for Generational {
    /// STW: mark everything reachable from `ctx.roots` (expected to already include
    /// card-table-derived roots from tenured-into-young references, resolved by the core),
    /// then evacuate every young survivor into a tenured region, recording its forwarding
    /// address, and reset the young regions' bump pointers for reuse.
    fn run_young(&self, ctx: &TraceContext<'_>) {
        let young_regions: Vec<_> = self
            .space
            .regions_with_flag(RegionFlags::EDEN)
            .into_iter()
            .chain(self.space.regions_with_flag(RegionFlags::SURVIVOR))
            .collect();

        transitive_mark(ctx.roots, ctx.trace_object, |obj| self.mark_object_if_not_marked(obj));

        let tenured = self.tenured_region();
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

    /// Simplified initial-mark + concurrent-mark + remark + sweep: this model folds the
    /// concurrent phases into one transitive mark, since there is no separate concurrent
    /// marker thread at this layer. Reuses the same `reversed_mark` toggle trick as the STW
    /// collector so tenured bits never need bulk clearing.
    fn run_tenured(&self, _task: &GcTask, ctx: &TraceContext<'_>) {
        transitive_mark(ctx.roots, ctx.trace_object, |obj| self.mark_object_if_not_marked(obj));
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

    fn setup() -> (Generational, ObjectReference) {
        let pool = Arc::new(RegionPool::new(BYTES_IN_REGION, 4, true));
        let space = Arc::new(RegionSpace::new(SpaceKind::Object, pool));
        let region = space.new_region(RegionFlags::EDEN, 1);
        let root = ObjectReference::from_raw_address(region.alloc(64, 8).unwrap()).unwrap();
        (Generational::new(space), root)
    }

    #[test]
    fn young_survivor_gets_forwarded_into_a_tenured_region() {
        let (gc, root) = setup();
        let trace = |_: ObjectReference, _: &mut dyn FnMut(ObjectReference)| {};
        let ctx = TraceContext { roots: &[root], trace_object: &trace };
        gc.run_young(&ctx);
        let forwarding = gc.forwarding_map();
        assert!(forwarding.contains_key(&root));
        let tenured_region = gc.space.regions_with_flag(RegionFlags::OLD);
        assert_eq!(tenured_region.len(), 1);
    }

    #[test]
    fn should_run_tenured_on_explicit_or_oom_regardless_of_cycle_count() {
        let (gc, _root) = setup();
        assert!(gc.should_run_tenured(&GcTask::new(GcCause::Explicit)));
        assert!(gc.should_run_tenured(&GcTask::new(GcCause::Oom)));
    }

    #[test]
    fn should_run_tenured_every_major_period_cycles() {
        let (gc, root) = setup();
        let trace = |_: ObjectReference, _: &mut dyn FnMut(ObjectReference)| {};
        let ctx = TraceContext { roots: &[root], trace_object: &trace };
        assert!(gc.should_run_tenured(&GcTask::new(GcCause::YoungGc)));
        gc.run_young(&ctx);
        assert!(!gc.should_run_tenured(&GcTask::new(GcCause::YoungGc)));
        gc.run_young(&ctx);
        gc.run_young(&ctx);
        assert!(gc.should_run_tenured(&GcTask::new(GcCause::YoungGc)));
    }
}
