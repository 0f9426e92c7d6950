//! Per-thread status word: a packed atomic holding the lifecycle state plus the
//! suspend-request flag, and the suspend counter/condvar pair used to realize suspension.
//!
//! Plain transitions out of `Running` release the mutator lock and store directly;
//! transitions *into* `Running` (and into `Terminating`) go through a CAS loop that polls
//! the suspend-request flag before publishing the new status (the safepoint store).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ThreadStatus {
    Created = 0,
    Running = 1,
    Native = 2,
    Waiting = 3,
    Suspended = 4,
    Terminating = 5,
    Finished = 6,
}

impl ThreadStatus {
    fn from_bits(bits: u32) -> Self {
        match bits {
            0 => ThreadStatus::Created,
            1 => ThreadStatus::Running,
            2 => ThreadStatus::Native,
            3 => ThreadStatus::Waiting,
            4 => ThreadStatus::Suspended,
            5 => ThreadStatus::Terminating,
            6 => ThreadStatus::Finished,
            other => unreachable!("invalid packed thread status {other}"),
        }
    }
}

const STATUS_MASK: u32 = 0xFF;
const SUSPEND_REQUEST: u32 = 1 << 8;

/// The per-thread status word plus the suspend counter/condvar used to realize suspension
/// requests. Owned by [`crate::thread::manager::ManagedThread`].
pub struct ThreadState {
    packed: AtomicU32,
    suspend_count: AtomicU32,
    suspend_lock: Mutex<()>,
    suspend_cond: Condvar,
}

impl Default for ThreadState {
    fn default() -> Self {
        ThreadState {
            packed: AtomicU32::new(ThreadStatus::Created as u32),
            suspend_count: AtomicU32::new(0),
            suspend_lock: Mutex::new(()),
            suspend_cond: Condvar::new(),
        }
    }
}

impl ThreadState {
    pub fn status(&self) -> ThreadStatus {
        ThreadStatus::from_bits(self.packed.load(Ordering::Acquire) & STATUS_MASK)
    }

    pub fn has_suspend_request(&self) -> bool {
        self.packed.load(Ordering::Acquire) & SUSPEND_REQUEST != 0
    }

    /// Direct transition, used for every transition *out of* `Running` (and most others).
    pub fn store_status(&self, new: ThreadStatus) {
        let _ = self.packed.fetch_update(Ordering::AcqRel, Ordering::Acquire, |old| {
            Some((old & !STATUS_MASK) | new as u32)
        });
    }

    /// Transition that polls the suspend-request flag before publishing the new status,
    /// used for every transition *into* `Running` and into `Terminating`.
    pub fn store_status_with_safepoint(&self, new: ThreadStatus) {
        loop {
            let old = self.packed.load(Ordering::Acquire);
            if old & SUSPEND_REQUEST != 0 {
                std::thread::yield_now();
                continue;
            }
            let desired = (old & !STATUS_MASK) | new as u32;
            if self.packed.compare_exchange_weak(old, desired, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return;
            }
        }
    }

    /// Increment the suspend counter; sets `SUSPEND_REQUEST` on the 0 -> 1 transition.
    pub fn inc_suspended(&self) {
        let _guard = self.suspend_lock.lock().unwrap();
        let prev = self.suspend_count.fetch_add(1, Ordering::AcqRel);
        if prev == 0 {
            self.packed.fetch_or(SUSPEND_REQUEST, Ordering::AcqRel);
        }
    }

    /// Decrement the suspend counter; clears `SUSPEND_REQUEST` and signals waiters on the
    /// 1 -> 0 transition.
    pub fn dec_suspended(&self) {
        let _guard = self.suspend_lock.lock().unwrap();
        let prev = self.suspend_count.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            self.packed.fetch_and(!SUSPEND_REQUEST, Ordering::AcqRel);
            self.suspend_cond.notify_all();
        }
    }

    /// Wait (timed, 100 ms ticks) until the suspend counter reaches zero. Returns `false`
    /// if `shutting_down` flips true mid-wait, signalling the caller to enter a
    /// termination loop instead of returning to normal execution.
    pub fn wait_suspension(&self, shutting_down: impl Fn() -> bool) -> bool {
        let mut guard = self.suspend_lock.lock().unwrap();
        while self.suspend_count.load(Ordering::Acquire) > 0 {
            if shutting_down() {
                return false;
            }
            let (g, _timeout) = self.suspend_cond.wait_timeout(guard, Duration::from_millis(100)).unwrap();
            guard = g;
        }
        true
    }

    /// Spin briefly, then poll every millisecond, until `self` leaves `Running`. Called by
    /// a suspender waiting for the *target* thread to observe its suspend request.
    pub fn wait_for_target_suspension(&self) {
        for _ in 0..500 {
            if self.status() != ThreadStatus::Running {
                return;
            }
            std::thread::yield_now();
        }
        while self.status() == ThreadStatus::Running {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_transition_preserves_suspend_flag() {
        let state = ThreadState::default();
        state.inc_suspended();
        state.store_status(ThreadStatus::Native);
        assert_eq!(state.status(), ThreadStatus::Native);
        assert!(state.has_suspend_request());
    }

    #[test]
    fn safepoint_transition_blocks_while_suspend_requested() {
        let state = ThreadState::default();
        state.inc_suspended();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                state.store_status_with_safepoint(ThreadStatus::Running);
            });
            std::thread::sleep(Duration::from_millis(20));
            assert_ne!(state.status(), ThreadStatus::Running);
            state.dec_suspended();
        });
        // `scope` joined the spawned thread above, so the safepoint store has completed.
        assert_eq!(state.status(), ThreadStatus::Running);
    }

    #[test]
    fn suspend_count_tracks_multiple_requesters() {
        let state = ThreadState::default();
        state.inc_suspended();
        state.inc_suspended();
        assert!(state.has_suspend_request());
        state.dec_suspended();
        assert!(state.has_suspend_request());
        state.dec_suspended();
        assert!(!state.has_suspend_request());
    }
}
