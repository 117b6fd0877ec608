//! End-to-end tests driving `System` the way a debugger frontend would:
//! assemble a handful of instructions, place them in physical memory, map
//! them through a processor's TLB, and step. These exercise the
//! cross-module properties that no single unit test can see on its own —
//! coherence between two processors' caches, protection faults through the
//! TLB, and the architectural round-trip laws.

use twin64::asm::{assemble, disassemble};
use twin64::asm::disasm::Radix;
use twin64::cache::CacheConfig;
use twin64::cpu::{Psw, TrapKind};
use twin64::processor::ProcessorConfig;
use twin64::system::System;
use twin64::tlb::TlbEntry;

const CODE_V: u64 = 0x1000;
const CODE_P: u64 = 0x9000;

fn small_processor_config() -> ProcessorConfig {
    ProcessorConfig {
        tlb_entries: 8,
        i_cache: CacheConfig {
            ways: 4,
            sets: 64,
            line_size: 64,
        },
        d_cache: CacheConfig {
            ways: 4,
            sets: 64,
            line_size: 64,
        },
    }
}

/// One processor, one memory module covering `0..len`, with `CODE_V` mapped
/// (instruction side) to `CODE_P` so assembled words placed there are
/// fetchable without touching the privileged physical-address shortcut.
fn one_processor_system(mem_len: u64) -> System {
    let mut sys = System::new(0);
    sys.add_memory_module(0, 0, mem_len).unwrap();
    let proc = sys.add_processor(small_processor_config()).unwrap();
    sys.insert_tlb_entry(
        proc,
        true,
        TlbEntry {
            valid: true,
            access_id: 0b01,
            protect_id: 0,
            v_adr: CODE_V as i64,
            p_adr: CODE_P as i64,
        },
    );
    sys.write_psw(proc, Psw::new().with_ia(CODE_V).into_bits());
    sys
}

fn place_code(sys: &mut System, words: &[u32]) {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for w in words {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    sys.write_phys(CODE_P, &bytes).unwrap();
}

fn psw_ia(sys: &System, proc: usize) -> u64 {
    Psw::from_bits(sys.read_psw(proc)).ia()
}

// ---- Scenario 1: assemble/disassemble round trip -------------------------

#[test]
fn scenario_1_ldi_l_encoding_and_round_trip() {
    let word = assemble("LDI.L R3, 0x12345").unwrap();
    assert_eq!((word >> 22) & 0xF, 3);
    assert_eq!((word >> 20) & 0x3, 1);
    assert_eq!(word & 0xF_FFFF, 0x12345);
    assert_eq!(disassemble(word, Radix::Hex), "LDI.L R3, 0x12345");
}

#[test]
fn assemble_disassemble_round_trip_alu_and_mem_forms() {
    for text in [
        "ADD R3, R1, R2",
        "ADD R3, R1, 42",
        "ST.W R3, 0(R1)",
        "LD.W R3, 0(R1)",
        "LDI.L R3, 0x12345",
    ] {
        let word = assemble(text).unwrap();
        let back = disassemble(word, Radix::Hex);
        assert_eq!(assemble(&back).unwrap(), word, "round trip diverged for {text}");
    }
}

// ---- Scenario 2: a 3-instruction program ---------------------------------

#[test]
fn scenario_2_three_instruction_program() {
    let mut sys = one_processor_system(0x10000);
    place_code(
        &mut sys,
        &[
            assemble("LDI.L R1, 0x1").unwrap(),
            assemble("LDI R2, 0x2").unwrap(),
            assemble("ADD R3, R1, R2").unwrap(),
        ],
    );

    sys.step(0);
    sys.step(0);
    sys.step(0);

    assert_eq!(sys.read_gen_reg(0, 3), 0x1002);
    assert_eq!(psw_ia(&sys, 0), CODE_V + 0xC);
}

#[test]
fn r0_always_reads_zero_across_a_program() {
    let mut sys = one_processor_system(0x10000);
    place_code(
        &mut sys,
        &[
            assemble("LDI.L R1, 0x7").unwrap(),
            assemble("ADD R0, R1, R1").unwrap(),
        ],
    );
    sys.step(0);
    sys.step(0);
    assert_eq!(sys.read_gen_reg(0, 0), 0);
}

#[test]
fn psw_advances_by_four_on_a_plain_instruction() {
    let mut sys = one_processor_system(0x10000);
    place_code(&mut sys, &[assemble("LDI.L R1, 0x7").unwrap()]);
    let before = psw_ia(&sys, 0);
    sys.step(0);
    assert_eq!(psw_ia(&sys, 0), before + 4);
}

// ---- Scenario 3: overflow trap --------------------------------------------

#[test]
fn scenario_3_add_overflow_traps_and_leaves_register_unchanged() {
    let mut sys = one_processor_system(0x10000);
    place_code(&mut sys, &[assemble("ADD R3, R1, R2").unwrap()]);
    sys.write_gen_reg(0, 1, i64::MAX);
    sys.write_gen_reg(0, 2, 1);
    sys.write_gen_reg(0, 3, 0x4242);

    sys.step(0);

    assert_eq!(sys.read_gen_reg(0, 3), 0x4242);
    assert_eq!(psw_ia(&sys, 0), TrapKind::Overflow.ordinal() * 16);
}

// ---- Scenario 4: cross-processor coherence --------------------------------

#[test]
fn scenario_4_write_on_one_processor_is_visible_to_another() {
    const DATA_V: u64 = 0x4000;
    const DATA_P: u64 = 0x2000;

    let mut sys = System::new(0);
    sys.add_memory_module(0, 0, 0x10000).unwrap();
    let p0 = sys.add_processor(small_processor_config()).unwrap();
    let p1 = sys.add_processor(small_processor_config()).unwrap();

    for p in [p0, p1] {
        sys.insert_tlb_entry(
            p,
            true,
            TlbEntry {
                valid: true,
                access_id: 0b01,
                protect_id: 0,
                v_adr: CODE_V as i64,
                p_adr: (CODE_P + p as u64 * 0x1000) as i64,
            },
        );
        sys.insert_tlb_entry(
            p,
            false,
            TlbEntry {
                valid: true,
                access_id: 0b11,
                protect_id: 0,
                v_adr: DATA_V as i64,
                p_adr: DATA_P as i64,
            },
        );
        sys.write_psw(p, Psw::new().with_ia(CODE_V).into_bits());
    }

    let mut p0_code = Vec::new();
    p0_code.extend_from_slice(&assemble("ST.W R3, 0(R1)").unwrap().to_le_bytes());
    sys.write_phys(CODE_P, &p0_code).unwrap();

    let mut p1_code = Vec::new();
    p1_code.extend_from_slice(&assemble("LD.W R2, 0(R1)").unwrap().to_le_bytes());
    sys.write_phys(CODE_P + 0x1000, &p1_code).unwrap();

    sys.write_gen_reg(p0, 1, DATA_V as i64);
    sys.write_gen_reg(p0, 3, 0xAA);
    sys.write_gen_reg(p1, 1, DATA_V as i64);

    sys.step(p0);
    sys.step(p1);

    assert_eq!(sys.read_gen_reg(p1, 2), 0xAA);

    let shared_line = (0..4)
        .filter_map(|way| sys.get_cache_line_info(p0, false, way, 0))
        .find(|info| info.valid && info.tag == 2)
        .expect("p0's data cache line must still be resident after the snoop");
    assert_eq!(shared_line.state, Some(twin64::cache::CoherenceState::Shared));
}

// ---- Scenario 5: TLB protection --------------------------------------------

#[test]
fn scenario_5_tlb_protection_denies_mismatched_pid_and_allows_matching_pid() {
    const DATA_V: u64 = 0x8000_0000;
    const DATA_P: u64 = 0x10_0000;

    let mut sys = System::new(0);
    sys.add_memory_module(0, 0, 0x20_0000).unwrap();
    let p = sys.add_processor(small_processor_config()).unwrap();

    sys.insert_tlb_entry(
        p,
        true,
        TlbEntry {
            valid: true,
            access_id: 0b01,
            protect_id: 0,
            v_adr: CODE_V as i64,
            p_adr: CODE_P as i64,
        },
    );
    sys.insert_tlb_entry(
        p,
        false,
        TlbEntry {
            valid: true,
            access_id: 0b11,
            protect_id: 5,
            v_adr: DATA_V as i64,
            p_adr: DATA_P as i64,
        },
    );

    let mut code = Vec::new();
    code.extend_from_slice(&assemble("ST.W R3, 0(R1)").unwrap().to_le_bytes());
    code.extend_from_slice(&assemble("LD.W R2, 0(R1)").unwrap().to_le_bytes());
    sys.write_phys(CODE_P, &code).unwrap();

    sys.write_gen_reg(p, 1, DATA_V as i64);
    sys.write_gen_reg(p, 3, 0xAA);
    sys.write_psw(p, Psw::new().with_ia(CODE_V).with_user_mode(true).into_bits());

    // No active PID is 5 (every CR4-7 slot resets to pid 0): the store faults.
    sys.step(p);
    assert_eq!(psw_ia(&sys, p), TrapKind::Protection.ordinal() * 16);

    // Arm PID slot 0 with pid 5 and retry the same store.
    sys.write_ctrl_reg(p, 4, 5);
    sys.write_psw(p, Psw::new().with_ia(CODE_V).with_user_mode(true).into_bits());
    sys.step(p);
    assert_eq!(psw_ia(&sys, p), CODE_V + 4);

    // The following LD picks the stored value back up.
    sys.step(p);
    assert_eq!(sys.read_gen_reg(p, 2), 0xAA);
}

// ---- Scenario 6: 4-way PLRU victim selection ------------------------------

#[test]
fn scenario_6_four_way_plru_evicts_first_touched_line_on_fifth_access() {
    const DATA_V: u64 = 0x5000;

    let mut sys = System::new(0);
    sys.add_memory_module(0, 0, 0x10000).unwrap();
    let p = sys.add_processor(ProcessorConfig {
        tlb_entries: 8,
        i_cache: CacheConfig {
            ways: 4,
            sets: 64,
            line_size: 32,
        },
        d_cache: CacheConfig {
            ways: 4,
            sets: 64,
            line_size: 32,
        },
    })
    .unwrap();
    sys.insert_tlb_entry(
        p,
        true,
        TlbEntry {
            valid: true,
            access_id: 0b01,
            protect_id: 0,
            v_adr: CODE_V as i64,
            p_adr: CODE_P as i64,
        },
    );
    sys.insert_tlb_entry(
        p,
        false,
        TlbEntry {
            valid: true,
            access_id: 0b01,
            protect_id: 0,
            v_adr: DATA_V as i64,
            p_adr: 0x3000,
        },
    );
    sys.write_psw(p, Psw::new().with_ia(CODE_V).into_bits());

    // 5 addresses 0x3000, 0x3800, 0x4000, 0x4800, 0x5000 all land in set 0
    // of a 64-set, 32-byte-line cache (each is 64 lines = 2048 bytes apart,
    // a multiple of 64 * 32).
    let mut code = Vec::new();
    for _ in 0..5 {
        code.extend_from_slice(&assemble("LD.W R2, 0(R1)").unwrap().to_le_bytes());
    }
    sys.write_phys(CODE_P, &code).unwrap();

    let addrs = [0x3000u64, 0x3800, 0x4000, 0x4800, 0x5000];
    for (i, &a) in addrs.iter().enumerate() {
        sys.insert_tlb_entry(
            p,
            false,
            TlbEntry {
                valid: true,
                access_id: 0b01,
                protect_id: 0,
                v_adr: (DATA_V + i as u64 * 0x1000) as i64,
                p_adr: a as i64,
            },
        );
        sys.write_gen_reg(p, 1, (DATA_V + i as u64 * 0x1000) as i64);
        sys.step(p);
    }

    let (_, misses) = sys.cache_stats(p, false);
    assert_eq!(misses, 5);

    // The first address's line is now evicted: a fresh touch of it misses again.
    sys.insert_tlb_entry(
        p,
        false,
        TlbEntry {
            valid: true,
            access_id: 0b01,
            protect_id: 0,
            v_adr: DATA_V as i64,
            p_adr: addrs[0] as i64,
        },
    );
    sys.write_gen_reg(p, 1, DATA_V as i64);
    let code = assemble("LD.W R2, 0(R1)").unwrap();
    sys.write_phys(CODE_P, &code.to_le_bytes()).unwrap();
    sys.write_psw(p, Psw::new().with_ia(CODE_V).into_bits());
    sys.step(p);
    let (_, misses_after) = sys.cache_stats(p, false);
    assert_eq!(misses_after, 6);
}

// ---- Round-trip / law properties -------------------------------------------

#[test]
fn data_alignment_trap_on_misaligned_store() {
    let mut sys = one_processor_system(0x10000);
    place_code(&mut sys, &[assemble("ST.W R3, 0(R1)").unwrap()]);
    sys.write_gen_reg(0, 1, 0x3001);
    sys.step(0);
    assert_eq!(psw_ia(&sys, 0), TrapKind::DataAlignment.ordinal() * 16);
}

#[test]
fn instr_alignment_trap_on_misaligned_fetch() {
    let mut sys = one_processor_system(0x10000);
    place_code(&mut sys, &[assemble("ADD R1, R1, R1").unwrap()]);
    sys.write_psw(0, Psw::new().with_ia(CODE_V + 1).into_bits());
    sys.step(0);
    assert_eq!(psw_ia(&sys, 0), TrapKind::InstrAlignment.ordinal() * 16);
}

#[test]
fn cache_read_reflects_a_prior_write_regardless_of_intervening_plru_updates() {
    let mut sys = one_processor_system(0x10000);
    place_code(
        &mut sys,
        &[
            assemble("ST.W R3, 0(R1)").unwrap(),
            assemble("LD.W R2, 0(R1)").unwrap(),
        ],
    );
    sys.insert_tlb_entry(
        0,
        false,
        TlbEntry {
            valid: true,
            access_id: 0b11,
            protect_id: 0,
            v_adr: 0x6000,
            p_adr: 0x6000,
        },
    );
    sys.write_gen_reg(0, 1, 0x6000);
    sys.write_gen_reg(0, 3, 0x55);

    sys.step(0);
    sys.step(0);

    assert_eq!(sys.read_gen_reg(0, 2), 0x55);
}

#[test]
fn tlb_insert_then_lookup_then_purge_then_lookup_is_null() {
    let mut sys = System::new(0);
    sys.add_memory_module(0, 0, 0x10000).unwrap();
    let p = sys.add_processor(small_processor_config()).unwrap();

    sys.insert_tlb_entry(
        p,
        false,
        TlbEntry {
            valid: true,
            access_id: 0b11,
            protect_id: 0,
            v_adr: 0x7000,
            p_adr: 0x7000,
        },
    );
    assert!(sys.get_tlb_entry(p, false, 0).is_some_and(|e| e.valid));

    sys.purge_tlb_entry(p, false, 0x7000);
    let entry = sys.get_tlb_entry(p, false, 0).unwrap();
    assert!(!entry.valid);
}
