//! Host-facing error types.
//!
//! Distinct from [`crate::cpu::trap::Trap`]: traps are architectural control
//! flow caught at the CPU step boundary and never surface here. This enum
//! covers configuration, bus routing, and assembler-wrapper failures per
//! the propagation policy in spec.md §7.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Twin64Error {
    #[error("module number {0} is already registered")]
    DuplicateModule(u32),

    #[error("address range [{start:#x}, {end:#x}) overlaps an existing module")]
    OverlappingRange { start: u64, end: u64 },

    #[error("address range table is full")]
    RangeTableFull,

    #[error("invalid cache configuration: {0}")]
    InvalidCacheConfig(String),

    #[error("no module registered for physical address {0:#x}")]
    UnmappedAddress(u64),

    #[error("module {0} has no submodule {1}")]
    NoSuchSubmodule(u32, u32),

    #[error("no such module number {0}")]
    NoSuchModule(u32),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Twin64Error>;
