//! Native-allocation tracking and the `memdump.bin` dump format.
//!
//! Grounded on the original runtime's `libpandabase/mem/alloc_tracker.{h,cpp}`: a
//! [`SimpleAllocTracker`] that only keeps byte counters, and a [`DetailAllocTracker`] that
//! records every allocation/free into 4 KiB arena slabs and can replay them into the
//! `memdump.bin` binary layout. The original captures a native stack trace per allocation;
//! this crate has no unwinder in its dependency stack, so it substitutes the caller's
//! source location (`#[track_caller]`) as a single-frame stand-in for the stack string,
//! which is enough to reproduce the original's call-site deduplication behavior.

use std::collections::HashMap;
use std::io::{self, Seek, SeekFrom, Write};
use std::panic::Location;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

pub const ALLOC_SPACE_INTERNAL: u32 = 0;

const ARENA_SIZE: usize = 4096;
const ALLOC_TAG: u32 = 1;
const FREE_TAG: u32 = 2;
/// tag(4) + id(4) + size(4) + space(4) + stacktrace_id(4)
const ALLOC_ENTRY_LEN: usize = 20;
/// tag(4) + alloc_id(4)
const FREE_ENTRY_LEN: usize = 8;

pub trait AllocTracker: Send + Sync {
    fn track_alloc(&self, addr: usize, size: u32, space: u32, location: &'static Location<'static>);
    fn track_free(&self, addr: usize);
}

/// Keeps only aggregate byte counters: total ever allocated, currently live, and the high
/// water mark. Matches the original's `SimpleAllocTracker`, including its one quirk: the
/// allocation *count* is monotonic and is never decremented by `TrackFree` (only the byte
/// counters are), so `internal_alloc_counter` and "objects currently live" diverge over
/// time. This is preserved deliberately rather than "fixed", to match observed behavior.
#[derive(Default)]
pub struct SimpleAllocTracker {
    internal_alloc_counter: AtomicU64,
    total_allocated: AtomicU64,
    current_allocated: AtomicU64,
    peak_allocated: AtomicU64,
    live: Mutex<HashMap<usize, u32>>,
}

impl SimpleAllocTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_allocated(&self) -> u64 {
        self.total_allocated.load(Ordering::Relaxed)
    }

    pub fn current_allocated(&self) -> u64 {
        self.current_allocated.load(Ordering::Relaxed)
    }

    pub fn peak_allocated(&self) -> u64 {
        self.peak_allocated.load(Ordering::Relaxed)
    }

    pub fn alloc_count(&self) -> u64 {
        self.internal_alloc_counter.load(Ordering::Relaxed)
    }
}

impl AllocTracker for SimpleAllocTracker {
    fn track_alloc(&self, addr: usize, size: u32, _space: u32, _location: &'static Location<'static>) {
        self.internal_alloc_counter.fetch_add(1, Ordering::Relaxed);
        self.total_allocated.fetch_add(size as u64, Ordering::Relaxed);
        let now = self.current_allocated.fetch_add(size as u64, Ordering::Relaxed) + size as u64;
        self.peak_allocated.fetch_max(now, Ordering::Relaxed);
        self.live.lock().unwrap().insert(addr, size);
    }

    fn track_free(&self, addr: usize) {
        if let Some(size) = self.live.lock().unwrap().remove(&addr) {
            self.current_allocated.fetch_sub(size as u64, Ordering::Relaxed);
        } else {
            log::warn!("SimpleAllocTracker::track_free: address {addr:#x} was never tracked");
        }
    }
}

struct Arena {
    bytes: Box<[u8; ARENA_SIZE]>,
    used: usize,
}

impl Arena {
    fn new() -> Self {
        Arena { bytes: Box::new([0u8; ARENA_SIZE]), used: 0 }
    }

    fn try_write(&mut self, entry: &[u8]) -> bool {
        if self.used + entry.len() > ARENA_SIZE {
            return false;
        }
        self.bytes[self.used..self.used + entry.len()].copy_from_slice(entry);
        self.used += entry.len();
        true
    }
}

struct DetailState {
    arenas: Vec<Arena>,
    id_of_addr: HashMap<usize, u32>,
    stacktrace_ids: HashMap<String, u32>,
    stacktraces: Vec<String>,
}

/// Records every allocation and free into 4 KiB arena slabs, with deduplicated stack
/// strings, and can replay the arenas into the `memdump.bin` layout.
pub struct DetailAllocTracker {
    next_alloc_id: AtomicU32,
    state: Mutex<DetailState>,
}

impl Default for DetailAllocTracker {
    fn default() -> Self {
        DetailAllocTracker {
            next_alloc_id: AtomicU32::new(0),
            state: Mutex::new(DetailState {
                arenas: vec![Arena::new()],
                id_of_addr: HashMap::new(),
                stacktrace_ids: HashMap::new(),
                stacktraces: Vec::new(),
            }),
        }
    }
}

impl DetailAllocTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_entry(state: &mut DetailState, entry: &[u8]) {
        if !state.arenas.last_mut().unwrap().try_write(entry) {
            state.arenas.push(Arena::new());
            assert!(state.arenas.last_mut().unwrap().try_write(entry), "entry larger than one arena");
        }
    }

    fn stacktrace_id(state: &mut DetailState, location: &Location<'_>) -> u32 {
        let key = format!("{}:{}:{}", location.file(), location.line(), location.column());
        if let Some(id) = state.stacktrace_ids.get(&key) {
            return *id;
        }
        let id = state.stacktraces.len() as u32;
        state.stacktraces.push(key.clone());
        state.stacktrace_ids.insert(key, id);
        id
    }

    /// Replay the tracked allocations into the `memdump.bin` layout described in the
    /// public interface notes: a patched `(num_items, num_stacktraces)` header, followed
    /// by deduplicated stack strings, followed by entries in allocation order.
    pub fn dump<W: Write + Seek>(&self, out: &mut W) -> io::Result<()> {
        let state = self.state.lock().unwrap();

        out.write_all(&0u32.to_le_bytes())?; // num_items, patched below
        out.write_all(&(state.stacktraces.len() as u32).to_le_bytes())?;

        for s in &state.stacktraces {
            out.write_all(&(s.len() as u32).to_le_bytes())?;
            out.write_all(s.as_bytes())?;
        }

        let mut num_items: u32 = 0;
        for arena in &state.arenas {
            let mut cursor = 0usize;
            loop {
                if cursor + 4 > arena.used {
                    break;
                }
                let tag = u32::from_le_bytes(arena.bytes[cursor..cursor + 4].try_into().unwrap());
                if tag == 0 {
                    break;
                }
                let entry_len = if tag == ALLOC_TAG { ALLOC_ENTRY_LEN } else { FREE_ENTRY_LEN };
                out.write_all(&arena.bytes[cursor..cursor + entry_len])?;
                cursor += entry_len;
                num_items += 1;
            }
        }

        out.seek(SeekFrom::Start(0))?;
        out.write_all(&num_items.to_le_bytes())?;
        out.seek(SeekFrom::End(0))?;
        Ok(())
    }

    /// Default dump path: `memdump.bin`, or `/data/local/tmp/memdump.bin` on the mobile target.
    pub fn default_dump_path() -> &'static str {
        if cfg!(target_os = "android") {
            "/data/local/tmp/memdump.bin"
        } else {
            "memdump.bin"
        }
    }
}

impl AllocTracker for DetailAllocTracker {
    fn track_alloc(&self, addr: usize, size: u32, space: u32, location: &'static Location<'static>) {
        let id = self.next_alloc_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        state.id_of_addr.insert(addr, id);
        let stacktrace_id = Self::stacktrace_id(&mut state, location);

        let mut entry = [0u8; ALLOC_ENTRY_LEN];
        entry[0..4].copy_from_slice(&ALLOC_TAG.to_le_bytes());
        entry[4..8].copy_from_slice(&id.to_le_bytes());
        entry[8..12].copy_from_slice(&size.to_le_bytes());
        entry[12..16].copy_from_slice(&space.to_le_bytes());
        entry[16..20].copy_from_slice(&stacktrace_id.to_le_bytes());
        Self::write_entry(&mut state, &entry);
    }

    fn track_free(&self, addr: usize) {
        let mut state = self.state.lock().unwrap();
        let Some(id) = state.id_of_addr.remove(&addr) else {
            log::warn!("DetailAllocTracker::track_free: address {addr:#x} was never tracked");
            return;
        };
        let mut entry = [0u8; FREE_ENTRY_LEN];
        entry[0..4].copy_from_slice(&FREE_TAG.to_le_bytes());
        entry[4..8].copy_from_slice(&id.to_le_bytes());
        Self::write_entry(&mut state, &entry);
    }
}

/// Convenience macro so call sites don't need to import `std::panic::Location` themselves.
#[macro_export]
macro_rules! track_alloc {
    ($tracker:expr, $addr:expr, $size:expr, $space:expr) => {
        $tracker.track_alloc($addr, $size, $space, std::panic::Location::caller())
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_u32(buf: &[u8], off: usize) -> u32 {
        u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
    }

    #[test]
    fn s1_empty_dump_has_zero_header() {
        let tracker = DetailAllocTracker::new();
        let mut buf = Cursor::new(Vec::new());
        tracker.dump(&mut buf).unwrap();
        let buf = buf.into_inner();
        assert_eq!(read_u32(&buf, 0), 0);
        assert_eq!(read_u32(&buf, 4), 0);
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn s2_single_alloc_dump() {
        let tracker = DetailAllocTracker::new();
        tracker.track_alloc(0x15, 20, ALLOC_SPACE_INTERNAL, Location::caller());
        let mut buf = Cursor::new(Vec::new());
        tracker.dump(&mut buf).unwrap();
        let buf = buf.into_inner();
        assert_eq!(read_u32(&buf, 0), 1);
        assert_eq!(read_u32(&buf, 4), 1);
    }

    #[test]
    fn s3_alloc_then_free() {
        let tracker = DetailAllocTracker::new();
        tracker.track_alloc(0x15, 20, ALLOC_SPACE_INTERNAL, Location::caller());
        tracker.track_free(0x15);
        let mut buf = Cursor::new(Vec::new());
        tracker.dump(&mut buf).unwrap();
        let buf = buf.into_inner();
        assert_eq!(read_u32(&buf, 0), 2);
        assert_eq!(read_u32(&buf, 4), 1);
    }

    #[test]
    fn s4_many_allocations_share_one_call_site() {
        let tracker = DetailAllocTracker::new();
        for i in 0..1000usize {
            tracker.track_alloc(i + 1, 8, ALLOC_SPACE_INTERNAL, Location::caller());
        }
        let mut buf = Cursor::new(Vec::new());
        tracker.dump(&mut buf).unwrap();
        let buf = buf.into_inner();
        assert_eq!(read_u32(&buf, 0), 1000);
        assert_eq!(read_u32(&buf, 4), 1);
    }

    #[test]
    fn simple_tracker_count_is_not_decremented_by_free() {
        let tracker = SimpleAllocTracker::new();
        tracker.track_alloc(1, 16, ALLOC_SPACE_INTERNAL, Location::caller());
        tracker.track_free(1);
        assert_eq!(tracker.alloc_count(), 1);
        assert_eq!(tracker.current_allocated(), 0);
        assert_eq!(tracker.total_allocated(), 16);
    }
}
