//! `GcQueue`: an ascending-priority queue of [`GcTask`]s ordered by target time.
//!
//! Grounded on `original_source/runtime/mem/gc/gc_queue.{h,cpp}`'s `GCQueueWithTime`:
//! `AddTask` drops the new task if the current top shares its cause (dedup), `GetTask`
//! blocks on a condvar while empty or while the top's target time hasn't arrived yet, and
//! `Finalize` marks the queue closed and drains it so no further task is ever returned.

use crate::gc::task::GcTask;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Matches the original's `GC_WAIT_TIMEOUT`: how long `GetTask` waits on the condvar before
/// re-checking whether the GC is still running.
pub const GC_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

struct QueuedTask {
    target_time_nanos: u64,
    seq: u64,
    task: GcTask,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        (self.target_time_nanos, self.seq) == (other.target_time_nanos, other.seq)
    }
}
impl Eq for QueuedTask {}
impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.target_time_nanos, self.seq).cmp(&(other.target_time_nanos, other.seq))
    }
}

struct Inner {
    heap: BinaryHeap<Reverse<QueuedTask>>,
    finalized: bool,
}

pub struct GcQueue {
    inner: Mutex<Inner>,
    cond: Condvar,
    next_seq: AtomicU64,
}

impl GcQueue {
    pub fn new() -> Self {
        GcQueue { inner: Mutex::new(Inner { heap: BinaryHeap::new(), finalized: false }), cond: Condvar::new(), next_seq: AtomicU64::new(0) }
    }

    /// Enqueue `task`, unless the queue is finalized or the current highest-priority
    /// (earliest) task already shares its cause.
    pub fn add_task(&self, task: GcTask) {
        let mut inner = self.inner.lock().unwrap();
        if inner.finalized {
            return;
        }
        if let Some(Reverse(top)) = inner.heap.peek() {
            if top.task.cause == task.cause {
                return;
            }
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        inner.heap.push(Reverse(QueuedTask { target_time_nanos: task.target_time_nanos, seq, task }));
        self.cond.notify_all();
    }

    /// Pop the earliest-ready task. Blocks while the queue is empty and `is_gc_running`
    /// holds, or while the top task's target time is still in the future. Returns `None`
    /// once the queue goes empty with the GC no longer running.
    pub fn get_task(&self, is_gc_running: impl Fn() -> bool, now_nanos: impl Fn() -> u64) -> Option<GcTask> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.heap.is_empty() {
                if !is_gc_running() {
                    return None;
                }
                let (guard, _) = self.cond.wait_timeout(inner, GC_WAIT_TIMEOUT).unwrap();
                inner = guard;
                continue;
            }
            let top_time = inner.heap.peek().unwrap().0.target_time_nanos;
            let now = now_nanos();
            if is_gc_running() && top_time >= now {
                let delta_ms = ((top_time - now) / 1_000_000).max(1);
                let (guard, _) = self.cond.wait_timeout(inner, Duration::from_millis(delta_ms)).unwrap();
                inner = guard;
                continue;
            }
            return inner.heap.pop().map(|Reverse(qt)| qt.task);
        }
    }

    pub fn signal(&self) {
        let _inner = self.inner.lock().unwrap();
        self.cond.notify_all();
    }

    /// Close the queue: no further `add_task` succeeds, and any currently-queued tasks are
    /// dropped.
    pub fn finalize(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.finalized = true;
        inner.heap.clear();
        self.cond.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GcQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::task::GcCause;

    #[test]
    fn duplicate_cause_at_top_is_dropped() {
        let q = GcQueue::new();
        q.add_task(GcTask::new(GcCause::YoungGc));
        q.add_task(GcTask::new(GcCause::YoungGc));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn distinct_causes_both_enqueue() {
        let q = GcQueue::new();
        q.add_task(GcTask::new(GcCause::YoungGc));
        q.add_task(GcTask::new(GcCause::Explicit));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn get_task_returns_earliest_target_time_first() {
        let q = GcQueue::new();
        q.add_task(GcTask::new(GcCause::Explicit).with_target_time(500));
        q.add_task(GcTask::new(GcCause::Oom).with_target_time(100));
        let first = q.get_task(|| true, || 1_000).unwrap();
        assert_eq!(first.cause, GcCause::Oom);
        let second = q.get_task(|| true, || 1_000).unwrap();
        assert_eq!(second.cause, GcCause::Explicit);
    }

    #[test]
    fn get_task_returns_none_once_empty_and_not_running() {
        let q = GcQueue::new();
        assert_eq!(q.get_task(|| false, || 0), None);
    }

    #[test]
    fn finalize_drains_and_blocks_future_adds() {
        let q = GcQueue::new();
        q.add_task(GcTask::new(GcCause::YoungGc));
        q.finalize();
        assert!(q.is_empty());
        q.add_task(GcTask::new(GcCause::Oom));
        assert!(q.is_empty());
    }
}
