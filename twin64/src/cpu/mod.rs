//! CPU core: register files, PSW, and the fetch/decode/execute step
//! (spec.md §4.3).

pub mod execute;
pub mod registers;
pub mod trap;

pub use execute::{MemoryPort, Pids};
pub use registers::{ControlRegisters, GeneralRegisters, Psw};
pub use trap::{Trap, TrapKind, TrapResult};

/// Architectural state for one processor core. Holding only plain data (no
/// references to TLBs, caches, or the system) lets `Processor::step` move it
/// in and out of the system's processor vector across the bus call (spec.md
/// §9's indexed-ownership redesign note).
#[derive(Debug, Clone, Copy, Default)]
pub struct Cpu {
    pub gregs: GeneralRegisters,
    pub cregs: ControlRegisters,
    pub psw: Psw,
    pub instr_reg: u32,
    /// The address reserved by the most recent `LDR`, consumed (and cleared)
    /// by the next `STC`.
    pub reservation: Option<u64>,
}

impl Cpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
