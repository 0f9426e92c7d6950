//! Card table: a fixed-granularity (4 KiB) byte array mapping heap addresses to one of
//! `{Clear, Marked, Processed}`.
//!
//! Grounded on the original's `runtime/mem/gc/card_table.h`: `Card::{CLEAR_VALUE,
//! MARKED_VALUE, PROCESSED_VALUE}` and `LOG2_CARD_SIZE`. All mutation uses relaxed memory
//! order; ordering is established by the mutator-lock barrier elsewhere
//! ([`crate::thread::mutator_lock`]), matching the original's comment that the card table
//! itself makes no ordering guarantee.

use crate::heap::region::bitflags_like;
use crate::util::constants::{CARDS_IN_REGION, CARD_SIZE, LOG_CARD_SIZE};
use crate::util::Address;
use std::sync::atomic::{AtomicU8, Ordering};

pub const CARD_CLEAR: u8 = 0;
pub const CARD_MARKED: u8 = 1;
pub const CARD_PROCESSED: u8 = 2;

bitflags_like! {
    /// Which card values [`CardTable::visit_marked`] selects, and whether it transitions a
    /// visited card to `PROCESSED`. Composable: `VISIT_MARKED.with(VISIT_PROCESSED)` scans
    /// both marked and already-processed cards in one pass.
    pub struct CardVisitFlags: u8 {
        const VISIT_MARKED = 1 << 0;
        const VISIT_PROCESSED = 1 << 1;
        const SET_PROCESSED = 1 << 2;
    }
}

/// A card table covering `[min_address, min_address + cards.len() * CARD_SIZE)`.
pub struct CardTable {
    min_address: Address,
    cards: Vec<AtomicU8>,
}

impl CardTable {
    pub fn new(min_address: Address, covered_bytes: usize) -> Self {
        let count = covered_bytes.div_ceil(CARD_SIZE).max(CARDS_IN_REGION);
        CardTable { min_address, cards: (0..count).map(|_| AtomicU8::new(CARD_CLEAR)).collect() }
    }

    pub fn card_size() -> usize {
        CARD_SIZE
    }

    pub fn cards_count(&self) -> usize {
        self.cards.len()
    }

    fn card_index(&self, addr: Address) -> usize {
        (addr.as_usize() - self.min_address.as_usize()) >> LOG_CARD_SIZE
    }

    pub fn card_start_address(&self, card: usize) -> Address {
        self.min_address + (card << LOG_CARD_SIZE)
    }

    pub fn mark_card(&self, addr: Address) {
        let idx = self.card_index(addr);
        self.cards[idx].store(CARD_MARKED, Ordering::Relaxed);
    }

    pub fn clear_card(&self, addr: Address) {
        let idx = self.card_index(addr);
        self.cards[idx].store(CARD_CLEAR, Ordering::Relaxed);
    }

    pub fn set_processed(&self, card: usize) {
        self.cards[card].store(CARD_PROCESSED, Ordering::Relaxed);
    }

    pub fn is_marked(&self, addr: Address) -> bool {
        self.cards[self.card_index(addr)].load(Ordering::Relaxed) == CARD_MARKED
    }

    pub fn is_clear(&self, addr: Address) -> bool {
        self.cards[self.card_index(addr)].load(Ordering::Relaxed) == CARD_CLEAR
    }

    pub fn clear_all(&self) {
        for c in &self.cards {
            c.store(CARD_CLEAR, Ordering::Relaxed);
        }
    }

    pub fn clear_range(&self, begin: Address, end: Address) {
        let first = self.card_index(begin);
        let last = self.card_index(end.align_up(CARD_SIZE));
        for c in &self.cards[first..last] {
            c.store(CARD_CLEAR, Ordering::Relaxed);
        }
    }

    /// Visit every card selected by `flags`' `VISIT_*` bits, optionally transitioning each
    /// visited card to `PROCESSED` if `flags` also carries `SET_PROCESSED`.
    pub fn visit_marked(&self, mut visitor: impl FnMut(usize, Address), flags: CardVisitFlags) {
        for (i, c) in self.cards.iter().enumerate() {
            let value = c.load(Ordering::Relaxed);
            let selected = (flags.contains(CardVisitFlags::VISIT_MARKED) && value == CARD_MARKED)
                || (flags.contains(CardVisitFlags::VISIT_PROCESSED) && value == CARD_PROCESSED);
            if selected {
                visitor(i, self.card_start_address(i));
                if flags.contains(CardVisitFlags::SET_PROCESSED) {
                    c.store(CARD_PROCESSED, Ordering::Relaxed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_then_is_marked() {
        let ct = CardTable::new(Address::from_usize(0x10_0000), 4 * CARD_SIZE);
        let addr = Address::from_usize(0x10_0000 + CARD_SIZE + 5);
        assert!(ct.is_clear(addr));
        ct.mark_card(addr);
        assert!(ct.is_marked(addr));
    }

    #[test]
    fn clear_all_then_single_mark_yields_one_marked_card() {
        let ct = CardTable::new(Address::from_usize(0x10_0000), 8 * CARD_SIZE);
        ct.clear_all();
        let addr = Address::from_usize(0x10_0000 + 3 * CARD_SIZE);
        ct.mark_card(addr);
        let mut marked = 0;
        ct.visit_marked(|_, _| marked += 1, CardVisitFlags::VISIT_MARKED);
        assert_eq!(marked, 1);
    }

    #[test]
    fn visit_marked_with_set_processed_transitions_the_card() {
        let ct = CardTable::new(Address::from_usize(0x10_0000), 4 * CARD_SIZE);
        let addr = Address::from_usize(0x10_0000 + CARD_SIZE);
        ct.mark_card(addr);
        ct.visit_marked(|_, _| {}, CardVisitFlags::VISIT_MARKED.with(CardVisitFlags::SET_PROCESSED));
        assert!(!ct.is_marked(addr));

        let mut processed = 0;
        ct.visit_marked(|_, _| processed += 1, CardVisitFlags::VISIT_PROCESSED);
        assert_eq!(processed, 1);
    }

    #[test]
    fn visit_processed_only_skips_marked_cards() {
        let ct = CardTable::new(Address::from_usize(0x10_0000), 4 * CARD_SIZE);
        let addr = Address::from_usize(0x10_0000 + CARD_SIZE);
        ct.mark_card(addr);
        let mut visited = 0;
        ct.visit_marked(|_, _| visited += 1, CardVisitFlags::VISIT_PROCESSED);
        assert_eq!(visited, 0);
    }
}
