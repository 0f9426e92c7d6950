//! ThreadManager: owns the live mutator-thread set, issues [`ThreadId`]s from a bitset
//! capped at 65 535, and drives shutdown (`wait_for_deregistration`).
//!
//! Ids come from a capped bitset rather than an unbounded counter, so they can be reused
//! once a thread deregisters.

use crate::thread::mutator_lock::MutatorLock;
use crate::thread::status::{ThreadState, ThreadStatus};
use crate::util::constants::MAX_THREAD_ID;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ThreadId(u32);

impl ThreadId {
    pub fn new(raw: u32) -> Self {
        ThreadId(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// One registered mutator thread: its id, status/suspend state, and mutator lock.
pub struct ManagedThread {
    pub id: ThreadId,
    pub state: ThreadState,
    pub mutator_lock: MutatorLock,
    pub is_daemon: bool,
}

impl ManagedThread {
    fn new(id: ThreadId, is_daemon: bool) -> Self {
        ManagedThread { id, state: ThreadState::default(), mutator_lock: MutatorLock::new(), is_daemon }
    }
}

/// A capped bitset-style id allocator: ids are small integers, reused once freed, and
/// allocation fails (rather than growing unbounded) past [`MAX_THREAD_ID`].
#[derive(Default)]
struct IdAllocator {
    next_unused: u32,
    free: Vec<u32>,
}

impl IdAllocator {
    fn alloc(&mut self) -> Option<u32> {
        if let Some(id) = self.free.pop() {
            return Some(id);
        }
        if self.next_unused > MAX_THREAD_ID {
            return None;
        }
        let id = self.next_unused;
        self.next_unused += 1;
        Some(id)
    }

    fn free_id(&mut self, id: u32) {
        self.free.push(id);
    }
}

#[derive(Default)]
pub struct ThreadManager {
    ids: Mutex<IdAllocator>,
    threads: Mutex<HashMap<ThreadId, Arc<ManagedThread>>>,
    daemon_count: AtomicUsize,
}

impl ThreadManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new thread, issuing it a fresh [`ThreadId`]. Returns `None` if the
    /// thread-id budget ([`MAX_THREAD_ID`]) is exhausted.
    pub fn register(&self, is_daemon: bool) -> Option<Arc<ManagedThread>> {
        let raw_id = self.ids.lock().unwrap().alloc()?;
        let thread = Arc::new(ManagedThread::new(ThreadId(raw_id), is_daemon));
        self.threads.lock().unwrap().insert(thread.id, thread.clone());
        if is_daemon {
            self.daemon_count.fetch_add(1, Ordering::Relaxed);
        }
        Some(thread)
    }

    pub fn deregister(&self, id: ThreadId) {
        let removed = self.threads.lock().unwrap().remove(&id);
        if let Some(thread) = removed {
            if thread.is_daemon {
                self.daemon_count.fetch_sub(1, Ordering::Relaxed);
            }
            self.ids.lock().unwrap().free_id(id.as_u32());
        }
    }

    pub fn get(&self, id: ThreadId) -> Option<Arc<ManagedThread>> {
        self.threads.lock().unwrap().get(&id).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.threads.lock().unwrap().len()
    }

    pub fn daemon_count(&self) -> usize {
        self.daemon_count.load(Ordering::Relaxed)
    }

    fn non_daemon_threads(&self, excluding: ThreadId) -> Vec<Arc<ManagedThread>> {
        self.threads
            .lock()
            .unwrap()
            .values()
            .filter(|t| !t.is_daemon && t.id != excluding)
            .cloned()
            .collect()
    }

    /// Transition every live thread's status to `Terminating`, forcing daemon threads to
    /// observe shutdown at their next safepoint.
    pub fn stop_daemon_threads(&self) {
        for thread in self.threads.lock().unwrap().values() {
            if thread.is_daemon {
                thread.state.store_status(ThreadStatus::Terminating);
            }
        }
    }

    /// Remove every currently-suspended thread other than `excluding` from the live set.
    fn deregister_suspended_threads(&self, excluding: ThreadId) -> usize {
        let suspended: Vec<ThreadId> = self
            .threads
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.id != excluding && t.state.status() == ThreadStatus::Suspended)
            .map(|t| t.id)
            .collect();
        let count = suspended.len();
        for id in suspended {
            self.deregister(id);
        }
        count
    }

    /// Shutdown sequence: (1) wait for non-daemon threads other than `current`/`main` to
    /// finish, (2) stop daemon threads, (3) repeatedly deregister suspended threads until
    /// only `current` and `main` remain.
    pub fn wait_for_deregistration(&self, current: ThreadId, main: ThreadId) {
        while self.non_daemon_threads(current).iter().any(|t| t.id != main) {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        self.stop_daemon_threads();
        loop {
            let remaining = self.live_count();
            if remaining <= if current == main { 1 } else { 2 } {
                break;
            }
            if self.deregister_suspended_threads(current) == 0 {
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_deregister_reuses_id() {
        let mgr = ThreadManager::new();
        let t1 = mgr.register(false).unwrap();
        let id1 = t1.id;
        mgr.deregister(id1);
        let t2 = mgr.register(false).unwrap();
        assert_eq!(t2.id, id1);
    }

    #[test]
    fn daemon_count_tracks_registrations() {
        let mgr = ThreadManager::new();
        mgr.register(true).unwrap();
        mgr.register(false).unwrap();
        assert_eq!(mgr.daemon_count(), 1);
        assert_eq!(mgr.live_count(), 2);
    }
}
