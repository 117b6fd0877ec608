//! One processor core: its architectural state plus the I/D TLB and I/D
//! cache that sit between it and the bus (spec.md §2, §4).
//!
//! Grounded on `Twin64-Processor/T64-Processor.h`'s `T64Processor`, which
//! bundles the same four structures with the core. Here they're kept as
//! plain fields rather than behind a shared pointer back to the owning
//! system, so `System::step` can temporarily own a `Processor` outright
//! while it borrows the rest of the system for bus traffic (spec.md §9).

use crate::cache::{Cache, CacheConfig};
use crate::cpu::Cpu;
use crate::error::Result;
use crate::tlb::Tlb;

#[derive(Clone, Copy)]
pub struct ProcessorConfig {
    pub tlb_entries: usize,
    pub i_cache: CacheConfig,
    pub d_cache: CacheConfig,
}

pub struct Processor {
    pub cpu: Cpu,
    pub tlb_i: Tlb,
    pub tlb_d: Tlb,
    pub cache_i: Cache,
    pub cache_d: Cache,
}

impl Processor {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        Ok(Self {
            cpu: Cpu::new(),
            tlb_i: Tlb::new(config.tlb_entries),
            tlb_d: Tlb::new(config.tlb_entries),
            cache_i: Cache::new(config.i_cache)?,
            cache_d: Cache::new(config.d_cache)?,
        })
    }

    /// A zero-capacity placeholder used only as the inert value left behind
    /// by `System::step`'s take-operate-restore move (spec.md §9). Other
    /// processors' snoop fan-out already skips the processor currently being
    /// stepped, so this placeholder is never actually touched.
    pub fn empty() -> Self {
        Self {
            cpu: Cpu::new(),
            tlb_i: Tlb::new(0),
            tlb_d: Tlb::new(0),
            cache_i: Cache::new(CacheConfig {
                ways: 2,
                sets: 1,
                line_size: 32,
            })
            .expect("placeholder cache config is always valid"),
            cache_d: Cache::new(CacheConfig {
                ways: 2,
                sets: 1,
                line_size: 32,
            })
            .expect("placeholder cache config is always valid"),
        }
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.tlb_i.reset();
        self.tlb_d.reset();
        self.cache_i.reset();
        self.cache_d.reset();
    }
}
