//! Collector variants: a flattened capability-set design. A `Collector` capability set
//! (`run_phases`, `mark_object`, `is_marked`, `trigger`, `init_bits`, `init_tlab_bits`) is
//! implemented by a tagged variant (`Epsilon`, `Stw`, `Generational`, `G1`) embedding the
//! per-variant state, rather than a deep virtual-inheritance hierarchy. Each variant module
//! (`null`, `stw`, `generational`, `g1`) holds its own state and implements [`Collector`];
//! [`AnyCollector`] is the tagged union the GC core drives without needing to know which
//! variant is active.

pub mod common;
pub mod g1;
pub mod generational;
pub mod null;
pub mod stw;

use crate::gc::task::GcTask;
use crate::heap::region_space::RegionSpace;
use crate::util::ObjectReference;
use std::str::FromStr;
use std::sync::Arc;

/// Which collector a runtime was configured with. `hybrid-gc` isn't a separate variant
/// here; it's folded into `G1`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CollectorKind {
    Epsilon,
    Stw,
    Generational,
    G1,
}

impl FromStr for CollectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "epsilon" => Ok(CollectorKind::Epsilon),
            "stw" => Ok(CollectorKind::Stw),
            "gen-gc" => Ok(CollectorKind::Generational),
            "g1-gc" | "hybrid-gc" => Ok(CollectorKind::G1),
            other => Err(format!("unknown gc type {other:?}")),
        }
    }
}

/// Everything feeding a root into a marking pass. The caller supplies the runtime's actual
/// roots (thread stacks, global ref storage, class roots); [`crate::gc::core::GcCore::run_task`]
/// additionally merges in cross-region roots resolved from each young region's remembered
/// set before a collector ever sees this context, so collector variants stay free of any
/// dependency on [`crate::lang::LanguageContext`] or [`crate::thread::ThreadManager`].
pub struct TraceContext<'a> {
    pub roots: &'a [ObjectReference],
    /// Given an object, invoke the callback once per outgoing reference field.
    pub trace_object: &'a dyn Fn(ObjectReference, &mut dyn FnMut(ObjectReference)),
}

/// The capability set every collector variant implements.
pub trait Collector {
    fn kind(&self) -> CollectorKind;

    /// The region space this collector variant marks and collects over. Exposed so the
    /// core can resolve remembered-set-derived roots without each variant having to do it.
    fn space(&self) -> &Arc<RegionSpace>;

    /// Called once per freshly allocated object (outside a TLAB) to set its initial GC bits.
    fn init_gc_bits(&self, obj: ObjectReference);

    /// Called once per object allocated via a TLAB slow path. Epsilon treats this as fatal:
    /// an allocator that never collects should never need GC bits initialized post hoc.
    fn init_gc_bits_for_tlab_alloc(&self, obj: ObjectReference);

    /// Request a collection asynchronously (enqueues a task); a no-op for Epsilon.
    fn trigger(&self);

    fn mark_object(&self, obj: ObjectReference);
    fn mark_object_if_not_marked(&self, obj: ObjectReference) -> bool;
    fn unmark_object(&self, obj: ObjectReference);
    fn is_marked(&self, obj: ObjectReference) -> bool;

    /// Run the collector's plan for `task`. The surrounding phase-machine bookkeeping
    /// (claiming/releasing the phase, timing, reference processing) lives in
    /// [`crate::gc::core`].
    fn run_phases(&self, task: &GcTask, ctx: &TraceContext<'_>);
}

/// A second capability only the generational/G1 variants share.
pub trait GenerationalCollector: Collector {
    fn run_young(&self, ctx: &TraceContext<'_>);
    fn run_tenured(&self, task: &GcTask, ctx: &TraceContext<'_>);
    fn should_run_tenured(&self, task: &GcTask) -> bool;
}

/// The tagged union the GC core actually drives.
pub enum AnyCollector {
    Epsilon(null::NullCollector),
    Stw(stw::StwCollector),
    Generational(generational::Generational),
    G1(g1::G1Collector),
}

impl AnyCollector {
    pub fn new(kind: CollectorKind, space: Arc<RegionSpace>) -> Self {
        match kind {
            CollectorKind::Epsilon => AnyCollector::Epsilon(null::NullCollector::new(space)),
            CollectorKind::Stw => AnyCollector::Stw(stw::StwCollector::new(space)),
            CollectorKind::Generational => AnyCollector::Generational(generational::Generational::new(space)),
            CollectorKind::G1 => AnyCollector::G1(g1::G1Collector::new(space)),
        }
    }
}

impl Collector for AnyCollector {
    fn kind(&self) -> CollectorKind {
        match self {
            AnyCollector::Epsilon(c) => c.kind(),
            AnyCollector::Stw(c) => c.kind(),
            AnyCollector::Generational(c) => c.kind(),
            AnyCollector::G1(c) => c.kind(),
        }
    }

    fn space(&self) -> &Arc<RegionSpace> {
        match self {
            AnyCollector::Epsilon(c) => c.space(),
            AnyCollector::Stw(c) => c.space(),
            AnyCollector::Generational(c) => c.space(),
            AnyCollector::G1(c) => c.space(),
        }
    }

    fn init_gc_bits(&self, obj: ObjectReference) {
        match self {
            AnyCollector::Epsilon(c) => c.init_gc_bits(obj),
            AnyCollector::Stw(c) => c.init_gc_bits(obj),
            AnyCollector::Generational(c) => c.init_gc_bits(obj),
            AnyCollector::G1(c) => c.init_gc_bits(obj),
        }
    }

    fn init_gc_bits_for_tlab_alloc(&self, obj: ObjectReference) {
        match self {
            AnyCollector::Epsilon(c) => c.init_gc_bits_for_tlab_alloc(obj),
            AnyCollector::Stw(c) => c.init_gc_bits_for_tlab_alloc(obj),
            AnyCollector::Generational(c) => c.init_gc_bits_for_tlab_alloc(obj),
            AnyCollector::G1(c) => c.init_gc_bits_for_tlab_alloc(obj),
        }
    }

    fn trigger(&self) {
        match self {
            AnyCollector::Epsilon(c) => c.trigger(),
            AnyCollector::Stw(c) => c.trigger(),
            AnyCollector::Generational(c) => c.trigger(),
            AnyCollector::G1(c) => c.trigger(),
        }
    }

    fn mark_object(&self, obj: ObjectReference) {
        match self {
            AnyCollector::Epsilon(c) => c.mark_object(obj),
            AnyCollector::Stw(c) => c.mark_object(obj),
            AnyCollector::Generational(c) => c.mark_object(obj),
            AnyCollector::G1(c) => c.mark_object(obj),
        }
    }

    fn mark_object_if_not_marked(&self, obj: ObjectReference) -> bool {
        match self {
            AnyCollector::Epsilon(c) => c.mark_object_if_not_marked(obj),
            AnyCollector::Stw(c) => c.mark_object_if_not_marked(obj),
            AnyCollector::Generational(c) => c.mark_object_if_not_marked(obj),
            AnyCollector::G1(c) => c.mark_object_if_not_marked(obj),
        }
    }

    fn unmark_object(&self, obj: ObjectReference) {
        match self {
            AnyCollector::Epsilon(c) => c.unmark_object(obj),
            AnyCollector::Stw(c) => c.unmark_object(obj),
            AnyCollector::Generational(c) => c.unmark_object(obj),
            AnyCollector::G1(c) => c.unmark_object(obj),
        }
    }

    fn is_marked(&self, obj: ObjectReference) -> bool {
        match self {
            AnyCollector::Epsilon(c) => c.is_marked(obj),
            AnyCollector::Stw(c) => c.is_marked(obj),
            AnyCollector::Generational(c) => c.is_marked(obj),
            AnyCollector::G1(c) => c.is_marked(obj),
        }
    }

    fn run_phases(&self, task: &GcTask, ctx: &TraceContext<'_>) {
        match self {
            AnyCollector::Epsilon(c) => c.run_phases(task, ctx),
            AnyCollector::Stw(c) => c.run_phases(task, ctx),
            AnyCollector::Generational(c) => c.run_phases(task, ctx),
            AnyCollector::G1(c) => c.run_phases(task, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gc_type_parses_from_str() {
        assert_eq!(CollectorKind::from_str("epsilon"), Ok(CollectorKind::Epsilon));
        assert_eq!(CollectorKind::from_str("hybrid-gc"), Ok(CollectorKind::G1));
        assert!(CollectorKind::from_str("bogus").is_err());
    }
}
