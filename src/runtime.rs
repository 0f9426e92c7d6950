//! `Runtime`/`RuntimeBuilder`: the single object wiring together thread management, heap
//! spaces, the GC core, and options.
//!
//! A builder gathers and validates [`Options`] before any heap memory is reserved, then
//! `build()` produces the immutable, `Arc`-shared `Runtime` every mutator thread and the GC
//! worker hold a handle to.

use crate::gc::GcCore;
use crate::heap::nonmovable_allocator::NonmovableAllocator;
use crate::heap::region_pool::RegionPool;
use crate::heap::region_space::{RegionSpace, SpaceKind};
use crate::heap::{RegionAllocator, RegionFlags};
use crate::thread::{ThreadId, ThreadManager};
use crate::util::options::Options;
use std::sync::Arc;

/// The live runtime: heap spaces, thread manager, and GC core, bound together for the
/// process's lifetime. See [`crate::lang::LanguageContext`] for how an embedding language
/// plugs object tracing and layout in without this type needing a generic parameter.
pub struct Runtime {
    options: Options,
    space: Arc<RegionSpace>,
    nonmovable_space: Arc<RegionSpace>,
    allocator: RegionAllocator,
    nonmovable_allocator: NonmovableAllocator,
    threads: ThreadManager,
    gc: GcCore,
}

impl Runtime {
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn threads(&self) -> &ThreadManager {
        &self.threads
    }

    pub fn gc(&self) -> &GcCore {
        &self.gc
    }

    pub fn allocator(&self) -> &RegionAllocator {
        &self.allocator
    }

    pub fn nonmovable_allocator(&self) -> &NonmovableAllocator {
        &self.nonmovable_allocator
    }

    pub fn space(&self) -> &Arc<RegionSpace> {
        &self.space
    }

    /// Register the calling OS thread as a mutator. Returns `None` once [`MAX_THREAD_ID`]
    /// ([`crate::util::constants::MAX_THREAD_ID`]) registered threads are live at once.
    pub fn attach_thread(&self, is_daemon: bool) -> Option<Arc<crate::thread::ManagedThread>> {
        self.threads.register(is_daemon)
    }

    pub fn detach_thread(&self, id: ThreadId) {
        self.allocator.revoke_tlab(id);
        self.threads.deregister(id);
    }

    /// Block until every mutator but `current`/`main` has deregistered, then tear the GC
    /// worker loop down and print statistics if `print_gc_statistics` was set.
    pub fn shutdown(&self, current: ThreadId, main: ThreadId) {
        self.threads.wait_for_deregistration(current, main);
        self.gc.finalize_queue();
        if *self.options.print_gc_statistics {
            self.gc.stats().print_summary();
        }
    }
}

#[derive(Default)]
pub struct RuntimeBuilder {
    options: Options,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        RuntimeBuilder::default()
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    /// Build the runtime: initialize the env-logger (a no-op if already initialized, or if
    /// the `builtin_env_logger` feature is off), reserve the young/old region space and a
    /// separate non-movable space, and construct the GC core for the configured collector.
    pub fn build(self) -> Runtime {
        crate::util::logger::try_init();

        let region_size = crate::util::constants::BYTES_IN_REGION;
        let preallocated = (*self.options.young_space_size / region_size).max(1);

        let pool = Arc::new(RegionPool::new(region_size, preallocated, true));
        let space = Arc::new(RegionSpace::new(SpaceKind::Object, pool.clone()));
        let nonmovable_space = Arc::new(RegionSpace::new(SpaceKind::NonMovableObject, pool));

        let allocator = RegionAllocator::new(space.clone(), RegionFlags::EDEN);
        let nonmovable_allocator = NonmovableAllocator::new(nonmovable_space.clone());

        const MAX_GLOBAL_REFS: usize = 64 * 1024;
        let gc = GcCore::new(*self.options.gc_type, space.clone(), MAX_GLOBAL_REFS);

        Runtime {
            options: self.options,
            space,
            nonmovable_space,
            allocator,
            nonmovable_allocator,
            threads: ThreadManager::new(),
            gc,
        }
    }
}

/// Which [`AnyCollector`] variant a built [`Runtime`] ended up with; mostly useful for
/// tests and for `--print-gc-statistics` banners.
pub fn collector_kind(runtime: &Runtime) -> crate::gc::CollectorKind {
    use crate::gc::Collector;
    runtime.gc.collector().kind()
}
