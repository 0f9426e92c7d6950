//! End-to-end scenarios: GCTask dedup ordering and the RemSet cross-region/Eden-skip
//! protocol. Allocation-tracker dump scenarios live as `#[cfg(test)]` unit tests alongside
//! `util::alloc_tracker`, since they exercise a single module's internal binary format
//! rather than cross-module wiring.

use rtgc::gc::barrier::post_interregion_barrier;
use rtgc::gc::{GcCause, GcQueue, GcTask};
use rtgc::heap::remset::RemSet;
use rtgc::heap::{Region, RegionFlags, RegionId};
use rtgc::util::Address;

/// S5: `GCTask(YOUNG_GC, t0), GCTask(OOM, t0), GCTask(YOUNG_GC, t0)` enqueued in sequence
/// dequeues exactly two tasks — the OOM and a single YOUNG, the second YOUNG having been
/// dropped because it matched the then-current top's cause.
#[test]
fn gc_task_queue_dedups_repeated_young_gc_against_oom() {
    let queue = GcQueue::new();
    queue.add_task(GcTask::new(GcCause::YoungGc).with_target_time(0));
    queue.add_task(GcTask::new(GcCause::Oom).with_target_time(0));
    queue.add_task(GcTask::new(GcCause::YoungGc).with_target_time(0));

    assert_eq!(queue.len(), 2);

    let mut causes = Vec::new();
    while let Some(task) = queue.get_task(|| false, || 0) {
        causes.push(task.cause);
    }
    causes.sort();
    assert_eq!(causes, vec![GcCause::YoungGc, GcCause::Oom]);
}

/// S6: region A (Old) holds `o1`, region B (Eden) holds `o2`. After routing the write
/// `o1.field = o2` through the post-barrier, B's remset has a card whose range contains
/// `&o1.field`. Re-run the same write as if A were Eden instead: the remset stays empty.
#[test]
fn remset_records_cross_region_writes_but_skips_eden_sources() {
    let region_size = rtgc::util::constants::BYTES_IN_REGION;
    let a = Region::new(RegionId(1), Address::from_usize(0x10_0000), Address::from_usize(0x10_0000 + region_size), RegionFlags::OLD);
    let b = Region::new(RegionId(2), Address::from_usize(0x20_0000), Address::from_usize(0x20_0000 + region_size), RegionFlags::EDEN);

    let o1_field_addr = a.alloc(8, 8).unwrap();
    let card = (o1_field_addr.as_usize() - a.begin.as_usize()) / rtgc::util::constants::CARD_SIZE;

    post_interregion_barrier(a.id, a.flags(), b.id, &b.rem_set, card);

    let mut hit = false;
    b.rem_set.visit_marked_cards(|from_region, visited_card| {
        if from_region == a.id {
            let card_start = a.begin + visited_card * rtgc::util::constants::CARD_SIZE;
            let card_end = card_start + rtgc::util::constants::CARD_SIZE;
            hit |= o1_field_addr >= card_start && o1_field_addr < card_end;
        }
    });
    assert!(hit, "expected B's remset to carry a card covering &o1.field");

    let eden_source = Region::new(RegionId(3), Address::from_usize(0x30_0000), Address::from_usize(0x30_0000 + region_size), RegionFlags::EDEN);
    let other_remset = RemSet::new(RegionId(4));
    post_interregion_barrier(eden_source.id, eden_source.flags(), RegionId(4), &other_remset, 0);
    assert!(other_remset.is_empty());
}
