//! Module types registered with the `System`'s address map (spec.md §2, §6).
//!
//! Grounded on `Twin64-System/T64-System.h`'s `T64ModuleType` tag and common
//! `T64Module` header. The original mixes a type tag with inheritance-style
//! subclassing; per spec.md §9's redesign note this collapses into a single
//! tagged variant with the common header fields factored out.

use twin64_macros::AsBits;

use crate::error::{Result, Twin64Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBits)]
#[repr(u8)]
pub enum ModuleKind {
    Memory = 0,
    Io = 1,
}

/// The common low register layout shared by every module's HPA region
/// (spec.md §6): status, command, HPA base, SPA base, SPA length, element
/// count, hardware version, software version, interrupt target.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleRegs {
    pub status: u64,
    pub command: u64,
    pub hpa_base: u64,
    pub spa_base: u64,
    pub spa_len: u64,
    pub element_count: u64,
    pub hw_version: u64,
    pub sw_version: u64,
    pub interrupt_target: u64,
}

impl ModuleRegs {
    pub fn read(&self, offset: u64) -> Option<u64> {
        match offset {
            0 => Some(self.status),
            1 => Some(self.command),
            2 => Some(self.hpa_base),
            3 => Some(self.spa_base),
            4 => Some(self.spa_len),
            5 => Some(self.element_count),
            6 => Some(self.hw_version),
            7 => Some(self.sw_version),
            8 => Some(self.interrupt_target),
            _ => None,
        }
    }

    pub fn write(&mut self, offset: u64, val: u64) -> bool {
        match offset {
            0 => self.status = val,
            1 => self.command = val,
            8 => self.interrupt_target = val,
            _ => return false,
        }
        true
    }
}

/// A module registered in the system's address map: a Memory module backs
/// its SPA range with real storage; an I/O module backs it with a small
/// scratch buffer (deep I/O device modeling is out of scope, spec.md §1).
pub struct Module {
    pub number: u32,
    pub kind: ModuleKind,
    pub hpa_start: u64,
    pub hpa_len: u64,
    pub spa_start: u64,
    pub spa_len: u64,
    pub regs: ModuleRegs,
    storage: Vec<u8>,
}

impl Module {
    pub fn new_memory(number: u32, hpa_start: u64, spa_start: u64, spa_len: u64) -> Self {
        Self {
            number,
            kind: ModuleKind::Memory,
            hpa_start,
            hpa_len: 64,
            spa_start,
            spa_len,
            regs: ModuleRegs {
                hpa_base: hpa_start,
                spa_base: spa_start,
                spa_len,
                ..Default::default()
            },
            storage: vec![0u8; spa_len as usize],
        }
    }

    pub fn new_io(number: u32, hpa_start: u64, spa_start: u64, spa_len: u64) -> Self {
        Self {
            number,
            kind: ModuleKind::Io,
            hpa_start,
            hpa_len: 64,
            spa_start,
            spa_len,
            regs: ModuleRegs {
                hpa_base: hpa_start,
                spa_base: spa_start,
                spa_len,
                ..Default::default()
            },
            storage: vec![0u8; spa_len as usize],
        }
    }

    fn offset_of(&self, p_adr: u64, len: usize) -> Result<usize> {
        if p_adr < self.spa_start {
            return Err(Twin64Error::UnmappedAddress(p_adr));
        }
        let ofs = (p_adr - self.spa_start) as usize;
        if ofs + len > self.storage.len() {
            return Err(Twin64Error::UnmappedAddress(p_adr));
        }
        Ok(ofs)
    }

    pub fn read_bytes(&mut self, p_adr: u64, len: usize) -> Result<Vec<u8>> {
        let ofs = self.offset_of(p_adr, len)?;
        Ok(self.storage[ofs..ofs + len].to_vec())
    }

    pub fn write_bytes(&mut self, p_adr: u64, data: &[u8]) -> Result<()> {
        let ofs = self.offset_of(p_adr, data.len())?;
        self.storage[ofs..ofs + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn hpa_offset(&self, p_adr: u64, len: usize) -> Result<u64> {
        let end = p_adr.checked_add(len as u64).ok_or(Twin64Error::UnmappedAddress(p_adr))?;
        if p_adr < self.hpa_start || end > self.hpa_start + self.hpa_len {
            return Err(Twin64Error::UnmappedAddress(p_adr));
        }
        let ofs = p_adr - self.hpa_start;
        if len != 8 || ofs % 8 != 0 {
            return Err(Twin64Error::UnmappedAddress(p_adr));
        }
        Ok(ofs / 8)
    }

    /// Reads one of the module's HPA registers (spec.md §6); each register is
    /// eight bytes wide, so `p_adr` must be 8-byte aligned within the HPA range.
    pub fn read_hpa(&self, p_adr: u64, len: usize) -> Result<Vec<u8>> {
        let reg = self.hpa_offset(p_adr, len)?;
        let val = self.regs.read(reg).unwrap_or(0);
        Ok(val.to_le_bytes().to_vec())
    }

    pub fn write_hpa(&mut self, p_adr: u64, data: &[u8]) -> Result<()> {
        let reg = self.hpa_offset(p_adr, data.len())?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(data);
        self.regs.write(reg, u64::from_le_bytes(bytes));
        Ok(())
    }

    /// Whether `p_adr` falls in this module's HPA (register file) range.
    pub fn hpa_contains(&self, p_adr: u64) -> bool {
        p_adr >= self.hpa_start && p_adr < self.hpa_start + self.hpa_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_module_round_trips_bytes() {
        let mut m = Module::new_memory(0, 0x0, 0x1000, 0x100);
        m.write_bytes(0x1010, &[1, 2, 3, 4]).unwrap();
        assert_eq!(m.read_bytes(0x1010, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn out_of_range_access_errors() {
        let mut m = Module::new_memory(0, 0x0, 0x1000, 0x10);
        assert!(m.read_bytes(0x2000, 4).is_err());
    }

    #[test]
    fn hpa_register_round_trips_through_status_and_reports_spa_base() {
        let mut m = Module::new_memory(0, 0x0, 0x1000, 0x100);
        assert!(m.hpa_contains(0x0));
        assert!(!m.hpa_contains(0x40));

        m.write_hpa(0x0, &1u64.to_le_bytes()).unwrap();
        assert_eq!(m.read_hpa(0x0, 8).unwrap(), 1u64.to_le_bytes().to_vec());

        // offset 2 is hpa_base, offset 3 is spa_base; both are read-only.
        assert_eq!(m.read_hpa(0x18, 8).unwrap(), 0x1000u64.to_le_bytes().to_vec());
    }

    #[test]
    fn hpa_write_rejects_unaligned_or_wrong_length() {
        let mut m = Module::new_memory(0, 0x0, 0x1000, 0x100);
        assert!(m.write_hpa(0x4, &1u64.to_le_bytes()).is_err());
        assert!(m.write_hpa(0x0, &[1, 2, 3, 4]).is_err());
    }
}
