//! Remembered set: for a region `R`, the set of cards in *other* regions that hold a
//! reference into `R`.
//!
//! Grounded on the original's `runtime/mem/rem_set.h`: a region owns a `RemSet` keyed by
//! `from_region → CardList`, guarded by a per-set lock (`RemSetLockConfig::CommonLock`).
//! `AddRef`/`AddRefWithAddr` is invoked by the post-write barrier ([`crate::gc::barrier`]);
//! `VisitMarkedCards` is invoked by the collector while scanning cross-region roots.

use crate::heap::region::RegionId;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct RemSet {
    owner: Option<RegionId>,
    /// from-region -> distinct card indices (within that from-region) holding a
    /// reference into `owner`.
    entries: Mutex<HashMap<RegionId, HashSet<usize>>>,
}

impl RemSet {
    pub fn new(owner: RegionId) -> Self {
        RemSet { owner: Some(owner), entries: Mutex::new(HashMap::new()) }
    }

    pub fn owner(&self) -> Option<RegionId> {
        self.owner
    }

    /// Record that `card` in `from_region` holds a reference into this remset's region.
    /// A no-op if `from_region` is the owner itself (no need to remember intra-region
    /// references) matching the original's "if A is Eden, AddRefWithAddr is a no-op" rule
    /// applied at the barrier level: the barrier only calls this for cross-region writes.
    pub fn add_ref(&self, from_region: RegionId, card: usize) {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(from_region).or_default().insert(card);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn card_list(&self, from_region: RegionId) -> Vec<usize> {
        self.entries
            .lock()
            .unwrap()
            .get(&from_region)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Visit every remembered `(from_region, card)` pair, in no particular order.
    pub fn visit_marked_cards(&self, mut visitor: impl FnMut(RegionId, usize)) {
        let entries = self.entries.lock().unwrap();
        for (&region, cards) in entries.iter() {
            for &card in cards {
                visitor(region, card);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().values().all(|s| s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_ref_then_visit_marked_cards() {
        let rem_set = RemSet::new(RegionId(1));
        rem_set.add_ref(RegionId(0), 7);
        let mut seen = Vec::new();
        rem_set.visit_marked_cards(|region, card| seen.push((region, card)));
        assert_eq!(seen, vec![(RegionId(0), 7)]);
    }

    #[test]
    fn duplicate_add_ref_is_deduped() {
        let rem_set = RemSet::new(RegionId(1));
        rem_set.add_ref(RegionId(0), 7);
        rem_set.add_ref(RegionId(0), 7);
        assert_eq!(rem_set.card_list(RegionId(0)).len(), 1);
    }

    #[test]
    fn clear_empties_all_entries() {
        let rem_set = RemSet::new(RegionId(1));
        rem_set.add_ref(RegionId(0), 7);
        rem_set.clear();
        assert!(rem_set.is_empty());
    }
}
