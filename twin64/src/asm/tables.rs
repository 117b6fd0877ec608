//! Mnemonic, register-name, and option-suffix tables.
//!
//! Grounded on `Twin64-Simulator/T64-SimTables.h`'s role of mapping
//! mnemonics and register names to numeric codes, reimplemented as static
//! tables rather than a runtime-populated symbol table (no labels, no
//! multi-line context — spec.md §4.1).

use super::encoding::{OP_GROUP_ALU, OP_GROUP_BR, OP_GROUP_MEM, OP_GROUP_SYS};

pub const FAM_NOP: u8 = 0;
pub const FAM_ADD: u8 = 1;
pub const FAM_SUB: u8 = 2;
pub const FAM_AND: u8 = 3;
pub const FAM_OR: u8 = 4;
pub const FAM_XOR: u8 = 5;
pub const FAM_CMP: u8 = 6;
pub const FAM_BITOP: u8 = 7;
pub const FAM_SHAOP: u8 = 8;
pub const FAM_LDI: u8 = 9;
pub const FAM_ADDIL: u8 = 10;
pub const FAM_LDO: u8 = 11;

pub const FAM_LD: u8 = 0;
pub const FAM_LDR: u8 = 1;
pub const FAM_ST: u8 = 2;
pub const FAM_STC: u8 = 3;

pub const FAM_B: u8 = 0;
pub const FAM_BR: u8 = 1;
pub const FAM_BV: u8 = 2;
pub const FAM_BE: u8 = 3;
pub const FAM_BB: u8 = 4;
pub const FAM_CBR: u8 = 5;
pub const FAM_MBR: u8 = 6;
pub const FAM_ABR: u8 = 7;

pub const FAM_MFCR: u8 = 0;
pub const FAM_MTCR: u8 = 1;
pub const FAM_MFIA: u8 = 2;
pub const FAM_LPA: u8 = 3;
pub const FAM_PRB: u8 = 4;
pub const FAM_ITLB: u8 = 5;
pub const FAM_PTLB: u8 = 6;
pub const FAM_PCA: u8 = 7;
pub const FAM_FCA: u8 = 8;
pub const FAM_RSM: u8 = 9;
pub const FAM_SSM: u8 = 10;
pub const FAM_RFI: u8 = 11;
pub const FAM_DIAG: u8 = 12;
pub const FAM_TRAP: u8 = 13;

/// Bit-field sub-opcode values within `FAM_BITOP`.
pub const BITOP_EXTR: u8 = 0;
pub const BITOP_DEP: u8 = 1;
pub const BITOP_DSR: u8 = 3;

/// `(mnemonic, group, family)` for every mnemonic in the architecture.
pub const MNEMONICS: &[(&str, u8, u8)] = &[
    ("NOP", OP_GROUP_ALU, FAM_NOP),
    ("ADD", OP_GROUP_ALU, FAM_ADD),
    ("SUB", OP_GROUP_ALU, FAM_SUB),
    ("AND", OP_GROUP_ALU, FAM_AND),
    ("OR", OP_GROUP_ALU, FAM_OR),
    ("XOR", OP_GROUP_ALU, FAM_XOR),
    ("CMP", OP_GROUP_ALU, FAM_CMP),
    ("EXTR", OP_GROUP_ALU, FAM_BITOP),
    ("DEP", OP_GROUP_ALU, FAM_BITOP),
    ("DSR", OP_GROUP_ALU, FAM_BITOP),
    ("SHL1A", OP_GROUP_ALU, FAM_SHAOP),
    ("SHL2A", OP_GROUP_ALU, FAM_SHAOP),
    ("SHL3A", OP_GROUP_ALU, FAM_SHAOP),
    ("SHR1A", OP_GROUP_ALU, FAM_SHAOP),
    ("SHR2A", OP_GROUP_ALU, FAM_SHAOP),
    ("SHR3A", OP_GROUP_ALU, FAM_SHAOP),
    ("LDI", OP_GROUP_ALU, FAM_LDI),
    ("ADDIL", OP_GROUP_ALU, FAM_ADDIL),
    ("LDO", OP_GROUP_ALU, FAM_LDO),
    ("LD", OP_GROUP_MEM, FAM_LD),
    ("LDR", OP_GROUP_MEM, FAM_LDR),
    ("ST", OP_GROUP_MEM, FAM_ST),
    ("STC", OP_GROUP_MEM, FAM_STC),
    ("B", OP_GROUP_BR, FAM_B),
    ("BR", OP_GROUP_BR, FAM_BR),
    ("BV", OP_GROUP_BR, FAM_BV),
    ("BE", OP_GROUP_BR, FAM_BE),
    ("BB", OP_GROUP_BR, FAM_BB),
    ("CBR", OP_GROUP_BR, FAM_CBR),
    ("MBR", OP_GROUP_BR, FAM_MBR),
    ("ABR", OP_GROUP_BR, FAM_ABR),
    ("MFCR", OP_GROUP_SYS, FAM_MFCR),
    ("MTCR", OP_GROUP_SYS, FAM_MTCR),
    ("MFIA", OP_GROUP_SYS, FAM_MFIA),
    ("LPA", OP_GROUP_SYS, FAM_LPA),
    ("PRB", OP_GROUP_SYS, FAM_PRB),
    ("ITLB", OP_GROUP_SYS, FAM_ITLB),
    ("PTLB", OP_GROUP_SYS, FAM_PTLB),
    ("PCA", OP_GROUP_SYS, FAM_PCA),
    ("FCA", OP_GROUP_SYS, FAM_FCA),
    ("RSM", OP_GROUP_SYS, FAM_RSM),
    ("SSM", OP_GROUP_SYS, FAM_SSM),
    ("RFI", OP_GROUP_SYS, FAM_RFI),
    ("DIAG", OP_GROUP_SYS, FAM_DIAG),
    ("TRAP", OP_GROUP_SYS, FAM_TRAP),
];

pub fn mnemonic_lookup(name: &str) -> Option<(&'static str, u8, u8)> {
    let upper = name.to_ascii_uppercase();
    MNEMONICS
        .iter()
        .find(|(m, _, _)| *m == upper)
        .map(|(m, g, f)| (*m, *g, *f))
}

pub fn mnemonic_lookup_gf(name: &str) -> Option<(u8, u8)> {
    let upper = name.to_ascii_uppercase();
    MNEMONICS
        .iter()
        .find(|(m, _, _)| *m == upper)
        .map(|(_, g, f)| (*g, *f))
}

pub fn mnemonic_name(group: u8, family: u8) -> Option<&'static str> {
    MNEMONICS
        .iter()
        .find(|(_, g, f)| *g == group && *f == family)
        .map(|(m, _, _)| *m)
}

/// `(name, register number)` for general registers, including ABI aliases.
pub const GENERAL_REGS: &[(&str, u8)] = &[
    ("R0", 0),
    ("R1", 1),
    ("R2", 2),
    ("R3", 3),
    ("R4", 4),
    ("R5", 5),
    ("R6", 6),
    ("R7", 7),
    ("R8", 8),
    ("R9", 9),
    ("R10", 10),
    ("R11", 11),
    ("R12", 12),
    ("R13", 13),
    ("R14", 14),
    ("R15", 15),
    ("SAR", 1),
    ("DP", 13),
    ("RL", 14),
    ("SP", 15),
    ("ARG0", 8),
    ("ARG1", 9),
    ("ARG2", 10),
    ("ARG3", 11),
    ("RET0", 8),
    ("RET1", 9),
    ("RET2", 10),
    ("RET3", 11),
    ("T0", 2),
    ("T1", 3),
    ("T2", 4),
    ("T3", 5),
    ("T4", 6),
    ("T5", 7),
    ("T6", 12),
];

pub fn general_reg_lookup(name: &str) -> Option<u8> {
    let upper = name.to_ascii_uppercase();
    GENERAL_REGS
        .iter()
        .find(|(n, _)| *n == upper)
        .map(|(_, r)| *r)
}

pub fn control_reg_lookup(name: &str) -> Option<u8> {
    let upper = name.to_ascii_uppercase();
    if let Some(digits) = upper.strip_prefix('C') {
        digits.parse::<u8>().ok().filter(|n| *n < 16)
    } else {
        None
    }
}
