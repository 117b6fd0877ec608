//! The fully-associative translation lookaside buffer (spec.md §4.2).
//!
//! Grounded on `Twin64-Processor/T64-TLB.cpp`: a linear-scan array modelling
//! full associativity with a handful of lookup/insert/purge operations. The
//! original's `insertTlb` was an unimplemented stub (`// ??? to do ...`);
//! here it scans for the first invalid slot and falls back to victimizing
//! slot 0 when the array is full, since spec.md does not call for an LRU
//! replacement policy.

use crate::util::Word;

#[derive(Debug, Clone, Copy, Default)]
pub struct TlbEntry {
    pub valid: bool,
    pub access_id: u8,
    pub protect_id: u32,
    pub v_adr: Word,
    pub p_adr: Word,
}

pub struct Tlb {
    entries: Vec<TlbEntry>,
}

impl Tlb {
    pub fn new(size: usize) -> Self {
        Self {
            entries: vec![TlbEntry::default(); size],
        }
    }

    pub fn reset(&mut self) {
        for e in &mut self.entries {
            e.valid = false;
        }
    }

    pub fn lookup(&self, v_adr: Word) -> Option<&TlbEntry> {
        self.entries.iter().find(|e| e.valid && e.v_adr == v_adr)
    }

    /// Inserts a translation into the first invalid slot, or victimizes slot
    /// 0 if the TLB is full.
    pub fn insert(&mut self, entry: TlbEntry) {
        if let Some(slot) = self.entries.iter_mut().find(|e| !e.valid) {
            *slot = entry;
        } else if let Some(slot) = self.entries.first_mut() {
            *slot = entry;
        }
    }

    pub fn purge(&mut self, v_adr: Word) {
        for e in self.entries.iter_mut().filter(|e| e.valid && e.v_adr == v_adr) {
            e.valid = false;
        }
    }

    pub fn entry(&self, index: usize) -> Option<&TlbEntry> {
        self.entries.get(index)
    }

    pub fn set_entry(&mut self, index: usize, entry: TlbEntry) {
        if let Some(slot) = self.entries.get_mut(index) {
            *slot = entry;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_inserted_entry() {
        let mut tlb = Tlb::new(4);
        tlb.insert(TlbEntry {
            valid: true,
            access_id: 1,
            protect_id: 7,
            v_adr: 0x1000,
            p_adr: 0x2000,
        });
        let found = tlb.lookup(0x1000).unwrap();
        assert_eq!(found.p_adr, 0x2000);
        assert!(tlb.lookup(0x1001).is_none());
    }

    #[test]
    fn insert_uses_first_free_slot() {
        let mut tlb = Tlb::new(2);
        tlb.insert(TlbEntry {
            valid: true,
            v_adr: 1,
            p_adr: 10,
            ..Default::default()
        });
        tlb.insert(TlbEntry {
            valid: true,
            v_adr: 2,
            p_adr: 20,
            ..Default::default()
        });
        assert!(tlb.lookup(1).is_some());
        assert!(tlb.lookup(2).is_some());
        // Full: next insert victimizes slot 0.
        tlb.insert(TlbEntry {
            valid: true,
            v_adr: 3,
            p_adr: 30,
            ..Default::default()
        });
        assert!(tlb.lookup(1).is_none());
        assert!(tlb.lookup(3).is_some());
    }

    #[test]
    fn purge_invalidates_matching_entry() {
        let mut tlb = Tlb::new(4);
        tlb.insert(TlbEntry {
            valid: true,
            v_adr: 5,
            p_adr: 50,
            ..Default::default()
        });
        tlb.purge(5);
        assert!(tlb.lookup(5).is_none());
    }
}
