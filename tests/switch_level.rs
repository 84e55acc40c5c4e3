//! Tests against the real 6502 circuit. They need the visual6502 data set (`segdefs.js`,
//! `transdefs.js`, `nodenames.js` or a converted `netlist.json`), so they are ignored by
//! default. Put the files in `data/` or point `VISUAL6502_NETLIST` at them and run with
//! `--ignored`; a missing data set then fails the test instead of skipping it.

use std::path::{Path, PathBuf};

use visual6502::crosscheck::{micro_op_vs_chip, Engine};
use visual6502::transistor::{netlist_dir_from_env, Chip, Netlist, SimConfig};
use visual6502::{FlatMemory, RecordingBus};

/// LDA #$F1; LDX #$00; AND #$F1; INC $0300; JMP $0409
const PROGRAM: [u8; 12] = [
    0xA9, 0xF1, 0xA2, 0x00, 0x29, 0xF1, 0xEE, 0x00, 0x03, 0x4C, 0x09, 0x04,
];

fn data_dir() -> PathBuf {
    netlist_dir_from_env().unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("data"))
}

fn netlist() -> Netlist {
    let dir = data_dir();
    Netlist::load_dir(&dir)
        .unwrap_or_else(|err| panic!("no usable netlist in {}: {err}", dir.display()))
}

fn memory() -> FlatMemory {
    let mut mem = FlatMemory::new();
    mem.load(0x0400, &PROGRAM);
    mem.set_word(0xFFFC, 0x0400);
    mem
}

#[test]
#[ignore = "needs the visual6502 netlist in data/ or VISUAL6502_NETLIST"]
fn initial_state_matches_reference_hashes() {
    let net = netlist();
    let mut chip = Chip::new(net, FlatMemory::new(), SimConfig::default()).unwrap();
    chip.init(None).unwrap();
    assert_eq!(chip.node_hash(), 650693342);
    assert_eq!(chip.transistor_hash(), 699598249);
}

#[test]
#[ignore = "needs the visual6502 netlist in data/ or VISUAL6502_NETLIST"]
fn init_is_deterministic() {
    let net = netlist();
    let mut first = Chip::new(net.clone(), memory(), SimConfig::default()).unwrap();
    let mut second = Chip::new(net, memory(), SimConfig::default()).unwrap();
    first.init(None).unwrap();
    second.init(None).unwrap();
    assert_eq!(first.node_hash(), second.node_hash());
    assert_eq!(first.transistor_hash(), second.transistor_hash());
}

#[test]
#[ignore = "needs the visual6502 netlist in data/ or VISUAL6502_NETLIST"]
fn start_program_reaches_reset_vector() {
    let net = netlist();
    let mut chip = Chip::new(net, memory(), SimConfig::default()).unwrap();
    let mut half_clocks = 0;
    chip.init(Some(&mut |_: &Chip<FlatMemory>| half_clocks += 1)).unwrap();
    assert_eq!(half_clocks, 16);
    chip.run_start_program(None).unwrap();
    assert_eq!(chip.read_address_bus(), 0x0400);
    assert!(chip.is_reading());
}

#[test]
#[ignore = "needs the visual6502 netlist in data/ or VISUAL6502_NETLIST"]
fn program_runs_on_the_die() {
    let net = netlist();
    let mut chip = Chip::new(net, memory(), SimConfig::default()).unwrap();
    chip.init(None).unwrap();
    chip.run_start_program(None).unwrap();
    chip.execute_cycles(20).unwrap();
    assert_eq!(chip.read_a(), 0xF1);
    assert_eq!(chip.read_x(), 0x00);
    assert_eq!(chip.bus().peek(0x0300), 0x01);
}

#[test]
#[ignore = "needs the visual6502 netlist in data/ or VISUAL6502_NETLIST"]
fn engines_agree_in_lockstep() {
    let net = netlist();
    let mut check = micro_op_vs_chip(memory(), net, SimConfig::default()).unwrap();
    check.run(60).unwrap();
    let writes = check.right().writes();
    assert_eq!(writes.get(&0x0300), Some(&0x01));
}

#[test]
fn recording_bus_wraps_any_bus() {
    let bus = RecordingBus::new(memory());
    assert!(bus.writes().is_empty());
    assert_eq!(bus.inner().peek(0x0400), 0xA9);
}
