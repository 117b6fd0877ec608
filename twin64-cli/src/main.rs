//! Command-line front end for the Twin-64 emulator.
//!
//! A thin wrapper over `twin64::System`'s debugger API (spec.md §6): load a
//! system description and a flat memory image, optionally prime the TLB or
//! flush/purge cache lines, step a fixed number of instructions, and dump
//! registers or memory. Deliberately not a REPL or a TUI — each invocation
//! is one self-contained session, matching spec.md §1's non-goals.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use twin64::asm::disasm::Radix;
use twin64::config::SystemConfig;
use twin64::tlb::TlbEntry;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble one line of Twin-64 assembly and print its hex encoding.
    Asm {
        /// e.g. "ADD R3, R1, R2"
        line: String,
    },
    /// Disassemble one 32-bit instruction word.
    Disasm {
        /// Hex-encoded instruction word, e.g. 0x12345678.
        word: String,
    },
    /// Build a system from a TOML description, run it, and report state.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to a TOML system configuration.
    #[arg(short, long)]
    config: PathBuf,

    /// Flat binary image loaded at the given physical address before stepping.
    #[arg(long, value_name = "FILE")]
    load: Option<PathBuf>,

    /// Physical address to place the loaded image at.
    #[arg(long, default_value_t = 0)]
    load_at: u64,

    /// Reset every processor before stepping.
    #[arg(long)]
    reset: bool,

    /// Number of round-robin steps to execute.
    #[arg(short, long, default_value_t = 0)]
    steps: usize,

    /// Insert a TLB entry before stepping: proc:i|d:v_adr:p_adr:access_id:protect_id.
    #[arg(long = "tlb-insert", value_name = "SPEC")]
    tlb_inserts: Vec<String>,

    /// Purge a TLB entry before stepping: proc:i|d:v_adr.
    #[arg(long = "tlb-purge", value_name = "SPEC")]
    tlb_purges: Vec<String>,

    /// Flush a cache line before stepping: proc:i|d:p_adr.
    #[arg(long = "cache-flush", value_name = "SPEC")]
    cache_flushes: Vec<String>,

    /// Purge a cache line before stepping: proc:i|d:p_adr.
    #[arg(long = "cache-purge", value_name = "SPEC")]
    cache_purges: Vec<String>,

    /// Dump every processor's general registers and PSW after stepping.
    #[arg(long)]
    dump_regs: bool,

    /// Dump `len` bytes of physical memory starting at `p_adr`, as p_adr:len.
    #[arg(long = "dump-mem", value_name = "SPEC")]
    dump_mem: Vec<String>,
}

fn parse_word(text: &str) -> Result<u32, std::num::ParseIntError> {
    let trimmed = text.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(trimmed, 16)
}

fn parse_u64(text: &str) -> Result<u64, std::num::ParseIntError> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        text.parse()
    }
}

fn side_from_str(s: &str) -> bool {
    matches!(s, "i" | "I")
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = SystemConfig::load_file(&args.config)?;
    let mut sys = cfg.build()?;

    if args.reset {
        sys.reset_all();
    }

    if let Some(path) = &args.load {
        let image = std::fs::read(path)?;
        sys.write_phys(args.load_at, &image)?;
    }

    for spec in &args.tlb_inserts {
        let parts: Vec<&str> = spec.split(':').collect();
        let [proc_s, side_s, v_s, p_s, access_s, protect_s] = parts[..] else {
            return Err(format!("malformed --tlb-insert spec: {spec}").into());
        };
        sys.insert_tlb_entry(
            proc_s.parse()?,
            side_from_str(side_s),
            TlbEntry {
                valid: true,
                access_id: access_s.parse()?,
                protect_id: protect_s.parse()?,
                v_adr: parse_u64(v_s)? as i64,
                p_adr: parse_u64(p_s)? as i64,
            },
        );
    }

    for spec in &args.tlb_purges {
        let parts: Vec<&str> = spec.split(':').collect();
        let [proc_s, side_s, v_s] = parts[..] else {
            return Err(format!("malformed --tlb-purge spec: {spec}").into());
        };
        sys.purge_tlb_entry(proc_s.parse()?, side_from_str(side_s), parse_u64(v_s)? as i64);
    }

    for spec in &args.cache_flushes {
        let parts: Vec<&str> = spec.split(':').collect();
        let [proc_s, side_s, p_s] = parts[..] else {
            return Err(format!("malformed --cache-flush spec: {spec}").into());
        };
        sys.flush_cache_line(proc_s.parse()?, side_from_str(side_s), parse_u64(p_s)?)?;
    }

    for spec in &args.cache_purges {
        let parts: Vec<&str> = spec.split(':').collect();
        let [proc_s, side_s, p_s] = parts[..] else {
            return Err(format!("malformed --cache-purge spec: {spec}").into());
        };
        sys.purge_cache_line(proc_s.parse()?, side_from_str(side_s), parse_u64(p_s)?)?;
    }

    sys.run_rounds(args.steps);
    log::info!("ran {} round(s)", args.steps);

    if args.dump_regs {
        for p in 0..sys.processor_count() {
            println!("-- processor {p} --");
            for n in 0..16u8 {
                println!("R{n} = {:#018x}", sys.read_gen_reg(p, n));
            }
            println!("PSW = {:#018x}", sys.read_psw(p));
        }
    }

    for spec in &args.dump_mem {
        let parts: Vec<&str> = spec.split(':').collect();
        let [p_s, len_s] = parts[..] else {
            return Err(format!("malformed --dump-mem spec: {spec}").into());
        };
        let p_adr = parse_u64(p_s)?;
        let len: usize = len_s.parse()?;
        let bytes = sys.read_phys(p_adr, len)?;
        print!("{p_adr:#010x}:");
        for b in &bytes {
            print!(" {b:02x}");
        }
        println!();
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Cli::parse();

    match args.command {
        Command::Asm { line } => {
            let word = twin64::asm::assemble(&line)?;
            println!("{word:#010x}");
        }
        Command::Disasm { word } => {
            let word = parse_word(&word)?;
            println!("{}", twin64::asm::disassemble(word, Radix::Hex));
        }
        Command::Run(run_args) => run(run_args)?,
    }
    Ok(())
}
