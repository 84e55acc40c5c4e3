use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use log::{debug, info};

use visual6502::crosscheck::{self, RESET_CYCLES};
use visual6502::disasm::disassemble_range;
use visual6502::transistor::{Chip, Netlist, SimConfig, NETLIST_ENV};
use visual6502::{FlatMemory, MOS6502};

/// LDA #$F1; LDX #$00; AND #$F1; INC $0300; JMP *
const DEMO_PROGRAM: [u8; 12] = [
    0xA9, 0xF1, 0xA2, 0x00, 0x29, 0xF1, 0xEE, 0x00, 0x03, 0x4C, 0x09, 0x04,
];

#[derive(Parser, Debug)]
#[command(name = "visual6502", about = "Cycle-level and transistor-level 6502 emulation.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the micro-op engine.
    Run(Machine),
    /// Run the switch-level simulation of the die.
    Switch {
        #[command(flatten)]
        machine: Machine,
        #[command(flatten)]
        circuit: Circuit,
    },
    /// Run both engines in lockstep and stop at the first disagreement.
    Crosscheck {
        #[command(flatten)]
        machine: Machine,
        #[command(flatten)]
        circuit: Circuit,
    },
}

#[derive(Args, Debug)]
struct Machine {
    /// Raw program image (defaults to a short built-in program).
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Load address of the image (hex with `0x` or `$`, or decimal).
    #[arg(long, value_name = "ADDR", default_value = "0x0400", value_parser = parse_address)]
    load: u16,

    /// Reset vector to install; defaults to the load address.
    #[arg(long, value_name = "ADDR", value_parser = parse_address)]
    reset: Option<u16>,

    /// Cycles to run after reset.
    #[arg(long, default_value_t = 100)]
    cycles: u64,

    /// Addresses to dump after the run.
    #[arg(long, value_name = "ADDR", num_args = 1.., value_delimiter = ',', value_parser = parse_address)]
    dump: Vec<u16>,
}

#[derive(Args, Debug)]
struct Circuit {
    /// Directory holding netlist.json or the visual6502 segdefs/transdefs/nodenames files.
    #[arg(long, value_name = "DIR", env = NETLIST_ENV)]
    netlist: PathBuf,

    /// Settling rounds before the network is declared oscillating.
    #[arg(long, default_value_t = SimConfig::default().max_settle_rounds)]
    max_settle_rounds: usize,
}

impl Circuit {
    fn load(&self) -> Result<(Netlist, SimConfig), Box<dyn Error>> {
        let netlist = Netlist::load_dir(&self.netlist)?;
        let config = SimConfig {
            max_settle_rounds: self.max_settle_rounds,
        };
        Ok((netlist, config))
    }
}

fn parse_address(raw: &str) -> Result<u16, String> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .or_else(|| trimmed.strip_prefix('$'));
    match hex {
        Some(hex) => u16::from_str_radix(hex, 16).map_err(|_| format!("invalid hex address '{raw}'")),
        None => trimmed.parse::<u16>().map_err(|_| format!("invalid address '{raw}'")),
    }
}

fn build_memory(machine: &Machine) -> Result<FlatMemory, Box<dyn Error>> {
    let image = match &machine.image {
        Some(path) => read_image(path)?,
        None => DEMO_PROGRAM.to_vec(),
    };
    let mut memory = FlatMemory::new();
    memory.load(machine.load, &image);
    memory.set_word(0xFFFC, machine.reset.unwrap_or(machine.load));
    info!(
        "loaded {} bytes at ${:04X}, reset vector ${:04X}",
        image.len(),
        machine.load,
        machine.reset.unwrap_or(machine.load)
    );
    Ok(memory)
}

fn read_image(path: &Path) -> Result<Vec<u8>, Box<dyn Error>> {
    let bytes = fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    if bytes.len() > 0x10000 {
        return Err(format!("{} is larger than the address space", path.display()).into());
    }
    Ok(bytes)
}

fn dump(memory: &FlatMemory, addresses: &[u16]) {
    for &address in addresses {
        println!("${address:04X} = ${:02X}", memory.peek(address));
    }
}

fn run_micro_ops(machine: &Machine) -> Result<(), Box<dyn Error>> {
    let mut cpu = MOS6502::new(build_memory(machine)?);
    cpu.power_on();
    cpu.execute_cycles(RESET_CYCLES)?;

    let mut spent = 0;
    while spent < machine.cycles {
        if log::log_enabled!(log::Level::Debug) {
            let pc = cpu.pc();
            for line in disassemble_range(cpu.instructions(), cpu.bus(), pc, 1) {
                debug!("{line}");
            }
        }
        spent += u64::from(cpu.step_instruction()?);
    }
    // let the last instruction's write-back land
    cpu.clock()?;

    let regs = cpu.registers();
    println!(
        "PC:{:04X} A:{:02X} X:{:02X} Y:{:02X} S:{:02X} P:{}  ({} cycles)",
        regs.pc,
        regs.a,
        regs.x,
        regs.y,
        regs.s,
        regs.p.display(),
        cpu.cycles()
    );
    dump(cpu.bus(), &machine.dump);
    Ok(())
}

fn run_switch(machine: &Machine, circuit: &Circuit) -> Result<(), Box<dyn Error>> {
    let (netlist, config) = circuit.load()?;
    let mut chip = Chip::new(netlist, build_memory(machine)?, config)?;
    chip.init(None)?;
    chip.run_start_program(None)?;
    info!("chip running from ${:04X}", chip.read_pc());

    for _ in 0..machine.cycles {
        chip.clock()?;
        debug!(
            "cycle {:>6}  AB:{:04X} DB:{:02X} {}  {}",
            chip.cycles(),
            chip.read_address_bus(),
            chip.read_data_bus(),
            if chip.is_reading() { "R" } else { "W" },
            chip.register_display()
        );
    }

    println!("{}  ({} cycles)", chip.register_display(), chip.cycles());
    println!("node hash {}, transistor hash {}", chip.node_hash(), chip.transistor_hash());
    dump(chip.bus(), &machine.dump);
    Ok(())
}

fn run_crosscheck(machine: &Machine, circuit: &Circuit) -> Result<(), Box<dyn Error>> {
    let (netlist, config) = circuit.load()?;
    let mut check = crosscheck::micro_op_vs_chip(build_memory(machine)?, netlist, config)?;
    check.run(machine.cycles)?;
    println!("engines agree for {} cycles", check.cycle());
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match &cli.command {
        Command::Run(machine) => run_micro_ops(machine),
        Command::Switch { machine, circuit } => run_switch(machine, circuit),
        Command::Crosscheck { machine, circuit } => run_crosscheck(machine, circuit),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("fatal: {err}");
        std::process::exit(1);
    }
}
