//! Epsilon: the null collector. Allocates forever, never reclaims.
//!
//! `run_phases` is empty, its barrier set is a dummy, `trigger` is a no-op, and TLAB
//! init bit setup is fatal — this collector never expects a TLAB to need marking bits.

use crate::gc::collector::{Collector, CollectorKind, TraceContext};
use crate::gc::task::GcTask;
use crate::heap::region_space::RegionSpace;
use crate::util::ObjectReference;
use std::sync::Arc;

pub struct NullCollector {
    space: Arc<RegionSpace>,
}

impl NullCollector {
    pub fn new(space: Arc<RegionSpace>) -> Self {
        NullCollector { space }
    }
}

impl Collector for NullCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Epsilon
    }

    fn space(&self) -> &Arc<RegionSpace> {
        &self.space
    }

    fn init_gc_bits(&self, _obj: ObjectReference) {}

    fn init_gc_bits_for_tlab_alloc(&self, _obj: ObjectReference) {
        panic!("epsilon collector never expects a TLAB-allocated object to need GC bits initialized post hoc");
    }

    fn trigger(&self) {}

    fn mark_object(&self, _obj: ObjectReference) {}

    fn mark_object_if_not_marked(&self, _obj: ObjectReference) -> bool {
        false
    }

    fn unmark_object(&self, _obj: ObjectReference) {}

    fn is_marked(&self, _obj: ObjectReference) -> bool {
        true
    }

    fn run_phases(&self, _task: &GcTask, _ctx: &TraceContext<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::task::GcCause;
    use crate::heap::region_pool::RegionPool;
    use crate::heap::region_space::SpaceKind;
    use crate::util::constants::BYTES_IN_REGION;

    fn collector() -> NullCollector {
        let pool = Arc::new(RegionPool::new(BYTES_IN_REGION, 1, true));
        NullCollector::new(Arc::new(RegionSpace::new(SpaceKind::Object, pool)))
    }

    #[test]
    fn run_phases_is_a_genuine_no_op() {
        let gc = collector();
        let ctx = TraceContext { roots: &[], trace_object: &|_, _| {} };
        gc.run_phases(&GcTask::new(GcCause::Explicit), &ctx);
    }

    #[test]
    #[should_panic]
    fn tlab_alloc_gc_bit_init_is_fatal() {
        let gc = collector();
        gc.init_gc_bits_for_tlab_alloc(ObjectReference::from_raw_address(crate::util::Address::from_usize(8)).unwrap());
    }
}
