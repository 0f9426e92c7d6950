//! Stop-the-world: a single mark phase driven entirely while mutators are parked.
//!
//! Uses a `reversed_mark` flag: odd cycles mark live objects as 1, even cycles mark live
//! objects as 0, so the per-object bit need not be cleared between cycles. Marking uses
//! each object's region [`crate::heap::region::Bitmap`] (`mark_bitmap()`) rather than a
//! side hash set, so `is_marked` stays O(1) and region-local.

use crate::gc::collector::common::{is_marked_with_sense, set_mark_bit, transitive_mark};
use crate::gc::collector::{Collector, CollectorKind, TraceContext};
use crate::gc::task::GcTask;
use crate::heap::region_space::RegionSpace;
use crate::util::ObjectReference;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct StwCollector {
    space: Arc<RegionSpace>,
    /// If true, a set bit represents a dead object this cycle; if false, a set bit means
    /// live. Toggled at the end of every cycle so bits never need to be cleared in bulk.
    reversed_mark: AtomicBool,
}

impl StwCollector {
    pub fn new(space: Arc<RegionSpace>) -> Self {
        StwCollector { space, reversed_mark: AtomicBool::new(false) }
    }

    fn live_sense(&self) -> bool {
        !self.reversed_mark.load(Ordering::Relaxed)
    }
}

impl Collector for StwCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Stw
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

    /// Roots-out transitive mark; then toggle `reversed_mark` so the next cycle's "live"
    /// sense is the opposite bit value, without clearing any bitmap.
    fn run_phases(&self, _task: &GcTask, ctx: &TraceContext<'_>) {
        transitive_mark(ctx.roots, ctx.trace_object, |obj| self.mark_object_if_not_marked(obj));
        self.reversed_mark.fetch_xor(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::task::GcCause;
    use crate::heap::region::RegionFlags;
    use crate::heap::region_pool::RegionPool;
    use crate::heap::region_space::SpaceKind;
    use crate::util::constants::BYTES_IN_REGION;
    use crate::util::Address;

    fn setup() -> (StwCollector, ObjectReference, ObjectReference) {
        let pool = Arc::new(RegionPool::new(BYTES_IN_REGION, 2, true));
        let space = Arc::new(RegionSpace::new(SpaceKind::Object, pool));
        let region = space.new_region(RegionFlags::EDEN, 1);
        let root = ObjectReference::from_raw_address(region.alloc(64, 8).unwrap()).unwrap();
        let child = ObjectReference::from_raw_address(region.alloc(64, 8).unwrap()).unwrap();
        (StwCollector::new(space), root, child)
    }

    #[test]
    fn transitive_mark_reaches_children_through_trace_object() {
        let (gc, root, child) = setup();
        let trace = |obj: ObjectReference, visit: &mut dyn FnMut(ObjectReference)| {
            if obj == root {
                visit(child);
            }
        };
        let ctx = TraceContext { roots: &[root], trace_object: &trace };
        assert!(!gc.is_marked(child));
        gc.run_phases(&GcTask::new(GcCause::Explicit), &ctx);
        assert!(gc.is_marked(root));
        assert!(gc.is_marked(child));
    }

    #[test]
    fn reversed_mark_toggles_each_cycle_without_clearing_bits() {
        let (gc, root, _child) = setup();
        let trace = |_: ObjectReference, _: &mut dyn FnMut(ObjectReference)| {};
        let ctx = TraceContext { roots: &[root], trace_object: &trace };
        gc.run_phases(&GcTask::new(GcCause::Explicit), &ctx);
        assert!(gc.is_marked(root));
        // Next cycle flips sense; nothing marks `root` again, so it now reads unmarked
        // even though its physical bit never changed.
        gc.run_phases(&GcTask::new(GcCause::Explicit), &TraceContext { roots: &[], trace_object: &trace });
        assert!(!gc.is_marked(root));
    }

    #[test]
    fn unmarked_object_outside_any_region_reads_as_unmarked() {
        let (gc, _root, _child) = setup();
        let stray = ObjectReference::from_raw_address(Address::from_usize(0xdead_0000)).unwrap();
        assert!(!gc.is_marked(stray));
    }
}
