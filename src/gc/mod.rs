//! The GC subsystem: phase machine, collector variants, task queue, and write barriers.
//! `heap::*` owns the region/card-table data model this module operates over; `refs::*` is
//! the reference storage a collection cycle updates afterward.

pub mod barrier;
pub mod collector;
pub mod core;
pub mod phase;
pub mod queue;
pub mod task;

pub use barrier::BarrierSet;
pub use collector::{AnyCollector, Collector, CollectorKind};
pub use core::GcCore;
pub use phase::{Phase, PhaseCell};
pub use queue::GcQueue;
pub use task::{GcCause, GcTask};
