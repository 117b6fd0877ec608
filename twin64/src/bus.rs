//! The system bus and physical address map (spec.md §4.5).
//!
//! Grounded on `Twin64-System/T64-System.cpp`'s `RangeTable` sketch: a sorted,
//! non-overlapping array of `(start, len, module index)` entries with a fast
//! first-entry path before falling back to a full scan. Unlike the sketch's
//! raw module pointers, entries here hold a stable index into the owning
//! `System`'s module vector (spec.md §9's redesign note), so callers route
//! bus operations by index rather than by shared mutable pointer.

use crate::error::{Result, Twin64Error};
use crate::module::Module;

#[derive(Debug, Clone, Copy)]
struct RangeEntry {
    start: u64,
    len: u64,
    module: usize,
}

/// Sorted, non-overlapping physical address ranges mapping to module indices.
#[derive(Default)]
pub struct AddressMap {
    entries: Vec<RangeEntry>,
}

impl AddressMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts a new range, keeping `entries` sorted by `start`. Rejects any
    /// overlap with an existing range.
    pub fn insert(&mut self, start: u64, len: u64, module: usize) -> Result<()> {
        let end = start
            .checked_add(len)
            .ok_or_else(|| Twin64Error::OverlappingRange { start, end: u64::MAX })?;
        let pos = self.entries.partition_point(|e| e.start < start);
        if pos > 0 {
            let prev = &self.entries[pos - 1];
            if prev.start + prev.len > start {
                return Err(Twin64Error::OverlappingRange { start, end });
            }
        }
        if let Some(next) = self.entries.get(pos) {
            if end > next.start {
                return Err(Twin64Error::OverlappingRange { start, end });
            }
        }
        self.entries.insert(pos, RangeEntry { start, len, module });
        Ok(())
    }

    pub fn remove(&mut self, module: usize) {
        self.entries.retain(|e| e.module != module);
    }

    /// Finds the module owning `adr`. Checks the first entry as a fast path
    /// (the common case of a single dominant memory region) before falling
    /// back to a full scan.
    pub fn find(&self, adr: u64) -> Option<usize> {
        if let Some(first) = self.entries.first() {
            if adr >= first.start && adr < first.start + first.len {
                return Some(first.module);
            }
        }
        self.entries
            .iter()
            .find(|e| adr >= e.start && adr < e.start + e.len)
            .map(|e| e.module)
    }
}

/// One of the five bus operations (spec.md §2, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    ReadSharedBlock,
    ReadPrivateBlock,
    WriteBlock,
    ReadUncached,
    WriteUncached,
}

/// Routes a bus operation's memory-side effect to the owning module. Snoop
/// fan-out to other processors is orchestrated by `System`, which borrows
/// the module vector and the processor vector as disjoint fields so the
/// adapter never needs a second, concurrent mutable view of `System` itself.
pub struct BusAdapter<'a> {
    pub modules: &'a mut [Module],
    pub address_map: &'a AddressMap,
}

impl<'a> BusAdapter<'a> {
    fn owning_module(&mut self, p_adr: u64) -> Result<&mut Module> {
        let idx = self
            .address_map
            .find(p_adr)
            .ok_or(Twin64Error::UnmappedAddress(p_adr))?;
        Ok(&mut self.modules[idx])
    }

    /// Finds the module whose HPA (register file) range covers `p_adr`, if
    /// any. Not tracked in `address_map`, which only routes SPA traffic; HPA
    /// ranges are few and small, so a linear scan over modules suffices.
    fn hpa_module(&mut self, p_adr: u64) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.hpa_contains(p_adr))
    }

    pub fn read_uncached(&mut self, p_adr: u64, len: usize) -> Result<Vec<u8>> {
        if let Some(m) = self.hpa_module(p_adr) {
            return m.read_hpa(p_adr, len);
        }
        self.owning_module(p_adr)?.read_bytes(p_adr, len)
    }

    pub fn write_uncached(&mut self, p_adr: u64, data: &[u8]) -> Result<()> {
        if let Some(m) = self.hpa_module(p_adr) {
            return m.write_hpa(p_adr, data);
        }
        self.owning_module(p_adr)?.write_bytes(p_adr, data)
    }
}

impl<'a> crate::cache::CacheBacking for BusAdapter<'a> {
    fn read_block_shared(&mut self, p_adr: u64, len: usize) -> Result<Vec<u8>> {
        self.owning_module(p_adr)?.read_bytes(p_adr, len)
    }

    fn read_block_private(&mut self, p_adr: u64, len: usize) -> Result<Vec<u8>> {
        self.owning_module(p_adr)?.read_bytes(p_adr, len)
    }

    fn write_block(&mut self, p_adr: u64, data: &[u8]) -> Result<()> {
        self.owning_module(p_adr)?.write_bytes(p_adr, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_overlap() {
        let mut map = AddressMap::new();
        map.insert(0x1000, 0x1000, 0).unwrap();
        assert!(map.insert(0x1800, 0x100, 1).is_err());
        assert!(map.insert(0x2000, 0x1000, 1).is_ok());
    }

    #[test]
    fn find_uses_fast_path_then_scan() {
        let mut map = AddressMap::new();
        map.insert(0x0, 0x1000, 0).unwrap();
        map.insert(0x2000, 0x1000, 1).unwrap();
        assert_eq!(map.find(0x500), Some(0));
        assert_eq!(map.find(0x2500), Some(1));
        assert_eq!(map.find(0x1500), None);
    }
}
