//! TOML-based system configuration: module map, per-processor cache/TLB
//! sizing, and the trap vector base (spec.md §6).
//!
//! Grounded on the `amoljassal-sis-kernel-showcase` daemon's `DaemonConfig`
//! pattern (a plain `serde`-derived struct with a hand-written `Default`),
//! adapted from environment variables to a TOML document since a system
//! description (module ranges, cache geometry) is multi-valued and
//! hierarchical rather than a handful of scalars.

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::error::{Result, Twin64Error};
use crate::module::ModuleKind;
use crate::processor::ProcessorConfig;
use crate::system::System;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModuleConfig {
    pub kind: ModuleKindConfig,
    pub hpa_start: u64,
    pub spa_start: u64,
    pub spa_len: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKindConfig {
    Memory,
    Io,
}

impl From<ModuleKindConfig> for ModuleKind {
    fn from(kind: ModuleKindConfig) -> Self {
        match kind {
            ModuleKindConfig::Memory => ModuleKind::Memory,
            ModuleKindConfig::Io => ModuleKind::Io,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfigToml {
    pub ways: u32,
    pub sets: u32,
    pub line_size: u32,
}

impl From<CacheConfigToml> for CacheConfig {
    fn from(cfg: CacheConfigToml) -> Self {
        CacheConfig {
            ways: cfg.ways,
            sets: cfg.sets,
            line_size: cfg.line_size,
        }
    }
}

fn default_tlb_entries() -> usize {
    32
}

fn default_i_cache() -> CacheConfigToml {
    CacheConfigToml {
        ways: 4,
        sets: 64,
        line_size: 64,
    }
}

fn default_d_cache() -> CacheConfigToml {
    CacheConfigToml {
        ways: 4,
        sets: 64,
        line_size: 64,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfigToml {
    #[serde(default = "default_tlb_entries")]
    pub tlb_entries: usize,
    #[serde(default = "default_i_cache")]
    pub i_cache: CacheConfigToml,
    #[serde(default = "default_d_cache")]
    pub d_cache: CacheConfigToml,
}

impl Default for ProcessorConfigToml {
    fn default() -> Self {
        Self {
            tlb_entries: default_tlb_entries(),
            i_cache: default_i_cache(),
            d_cache: default_d_cache(),
        }
    }
}

impl From<ProcessorConfigToml> for ProcessorConfig {
    fn from(cfg: ProcessorConfigToml) -> Self {
        ProcessorConfig {
            tlb_entries: cfg.tlb_entries,
            i_cache: cfg.i_cache.into(),
            d_cache: cfg.d_cache.into(),
        }
    }
}

fn default_trap_base() -> u64 {
    0
}

fn default_processor_count() -> usize {
    1
}

/// The top-level document a `twin64-cli` invocation loads to stand up a
/// `System`: its module map, how many processors it has, and their shared
/// cache/TLB geometry (all processors are configured identically, matching
/// `Twin64-System/T64-System.cpp`'s fixed per-core layout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_trap_base")]
    pub trap_base: u64,
    #[serde(default = "default_processor_count")]
    pub processor_count: usize,
    #[serde(default)]
    pub processor: ProcessorConfigToml,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            trap_base: default_trap_base(),
            processor_count: default_processor_count(),
            processor: ProcessorConfigToml::default(),
            modules: Vec::new(),
        }
    }
}

impl SystemConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Builds a `System` from this configuration, registering every module
    /// and processor in document order.
    pub fn build(&self) -> Result<System> {
        if self.processor_count == 0 {
            return Err(Twin64Error::Config(
                "processor_count must be at least 1".to_string(),
            ));
        }
        let mut sys = System::new(self.trap_base);
        for module in &self.modules {
            match module.kind {
                ModuleKindConfig::Memory => {
                    sys.add_memory_module(module.hpa_start, module.spa_start, module.spa_len)?;
                }
                ModuleKindConfig::Io => {
                    sys.add_io_module(module.hpa_start, module.spa_start, module.spa_len)?;
                }
            }
        }
        for _ in 0..self.processor_count {
            sys.add_processor(self.processor.clone().into())?;
        }
        Ok(sys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let cfg = SystemConfig::from_toml_str(
            r#"
            trap_base = 0x1000

            [[modules]]
            kind = "memory"
            hpa_start = 0
            spa_start = 0
            spa_len = 0x10000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.trap_base, 0x1000);
        assert_eq!(cfg.modules.len(), 1);
        assert_eq!(cfg.processor_count, 1);
    }

    #[test]
    fn builds_a_running_system() {
        let cfg = SystemConfig::from_toml_str(
            r#"
            trap_base = 0

            [[modules]]
            kind = "memory"
            hpa_start = 0
            spa_start = 0
            spa_len = 0x1000
            "#,
        )
        .unwrap();
        let sys = cfg.build().unwrap();
        assert_eq!(sys.processor_count(), 1);
    }

    #[test]
    fn rejects_zero_processors() {
        let cfg = SystemConfig {
            processor_count: 0,
            ..SystemConfig::default()
        };
        assert!(cfg.build().is_err());
    }
}
