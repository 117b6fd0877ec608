//! The architectural trap model (spec.md §4.3, §7).
//!
//! A trap is constructed deep in the execute path and propagated via `?` to
//! the CPU's `step` method, which is the only place it is caught. This is
//! the sum-typed replacement for the source's exception-based unwinding
//! (spec.md §9).

use twin64_macros::AsBits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBits)]
#[repr(u8)]
pub enum TrapKind {
    IllegalInstr = 0,
    PrivViolation = 1,
    Protection = 2,
    TlbAccess = 3,
    InstrAlignment = 4,
    DataAlignment = 5,
    Overflow = 6,
    PhysMemAdr = 7,
    MachineCheck = 8,
    /// The `TRAP` instruction's software-triggered trap. Not one of
    /// spec.md §4.3's hardware-raised kinds; added from the original's
    /// generic `T64Trap::trapCode` field (`Twin64-Processor/T64-Processor.h`),
    /// which the distillation's fixed kind list dropped. The triggering
    /// `imm13` travels in `Trap::info[0]` for the handler to dispatch on.
    Software = 9,
}

impl TrapKind {
    /// Trap handler addresses must be contiguous by ordinal (spec.md §6);
    /// this is the ordinal used to compute that address.
    pub const fn ordinal(self) -> u64 {
        self.into_bits() as u64
    }
}

/// A trap carries its kind plus up to three architecturally-defined info words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trap {
    pub kind: TrapKind,
    pub info: [u64; 3],
}

impl Trap {
    pub const fn new(kind: TrapKind) -> Self {
        Self { kind, info: [0; 3] }
    }

    pub const fn with_info(kind: TrapKind, i0: u64, i1: u64, i2: u64) -> Self {
        Self {
            kind,
            info: [i0, i1, i2],
        }
    }
}

impl std::fmt::Display for Trap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} (info={:?})", self.kind, self.info)
    }
}

impl std::error::Error for Trap {}

pub type TrapResult<T> = std::result::Result<T, Trap>;
