//! MutatorLock: a read-write lock whose READ side mutators hold while executing managed
//! code, and whose WRITE side the GC acquires during stop-the-world phases.
//!
//! Tracks a thread-local state (`UNLOCKED`/`RDLOCK`/`WRLOCK`) purely for debug assertions:
//! a thread may not reacquire while it already holds the lock. Built on `std::sync::RwLock`
//! rather than `parking_lot`/`spin`.

use std::cell::Cell;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum LockState {
    Unlocked,
    RdLock,
    WrLock,
}

thread_local! {
    static STATE: Cell<LockState> = const { Cell::new(LockState::Unlocked) };
}

pub struct MutatorLock {
    inner: RwLock<()>,
}

impl Default for MutatorLock {
    fn default() -> Self {
        MutatorLock { inner: RwLock::new(()) }
    }
}

pub struct ReadGuard<'a>(RwLockReadGuard<'a, ()>);

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        STATE.with(|s| s.set(LockState::Unlocked));
    }
}

pub struct WriteGuard<'a>(RwLockWriteGuard<'a, ()>);

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        STATE.with(|s| s.set(LockState::Unlocked));
    }
}

impl MutatorLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for mutator execution. Mutators hold this while running managed
    /// code.
    pub fn read_lock(&self) -> ReadGuard<'_> {
        debug_assert_eq!(STATE.with(Cell::get), LockState::Unlocked, "thread already holds the mutator lock");
        let guard = self.inner.read().unwrap();
        STATE.with(|s| s.set(LockState::RdLock));
        ReadGuard(guard)
    }

    pub fn try_read_lock(&self) -> Option<ReadGuard<'_>> {
        debug_assert_eq!(STATE.with(Cell::get), LockState::Unlocked, "thread already holds the mutator lock");
        let guard = self.inner.try_read().ok()?;
        STATE.with(|s| s.set(LockState::RdLock));
        Some(ReadGuard(guard))
    }

    /// Acquire the lock in WRITE mode. No mutator can be holding READ while this is held;
    /// used during stop-the-world phases.
    pub fn write_lock(&self) -> WriteGuard<'_> {
        debug_assert_eq!(STATE.with(Cell::get), LockState::Unlocked, "thread already holds the mutator lock");
        let guard = self.inner.write().unwrap();
        STATE.with(|s| s.set(LockState::WrLock));
        WriteGuard(guard)
    }

    pub fn try_write_lock(&self) -> Option<WriteGuard<'_>> {
        debug_assert_eq!(STATE.with(Cell::get), LockState::Unlocked, "thread already holds the mutator lock");
        let guard = self.inner.try_write().ok()?;
        STATE.with(|s| s.set(LockState::WrLock));
        Some(WriteGuard(guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_then_drop_resets_thread_local_state() {
        let lock = MutatorLock::new();
        {
            let _g = lock.read_lock();
            assert_eq!(STATE.with(Cell::get), LockState::RdLock);
        }
        assert_eq!(STATE.with(Cell::get), LockState::Unlocked);
    }

    #[test]
    fn write_excludes_concurrent_read() {
        let lock = MutatorLock::new();
        let _w = lock.write_lock();
        // Probe from a different thread: `try_read_lock`'s reentrancy assertion only
        // guards the *same* thread re-acquiring, so this must run off-thread.
        std::thread::scope(|scope| {
            let got = scope.spawn(|| lock.try_read_lock().is_some()).join().unwrap();
            assert!(!got);
        });
    }
}
