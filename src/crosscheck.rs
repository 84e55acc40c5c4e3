//! Lockstep comparison of two 6502 engines.
//!
//! Both engines run against their own [`RecordingBus`] over identical memory. After every cycle
//! the architectural registers and the bytes changed since the start are compared, and the
//! first mismatch is reported as [`EmuError::Divergence`] with the cycle and both sides' state.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::hardware::cpu::status::Status;
use crate::hardware::cpu::Registers;
use crate::hardware::{Bus, FlatMemory, RecordingBus, MOS6502};
use crate::transistor::{Chip, Netlist, SimConfig};
use crate::{EmuError, Result};

/// Cycles the micro-op engine spends in its reset sequence.
pub const RESET_CYCLES: u64 = 7;

/// Anything that can be clocked one cycle at a time and inspected in between.
pub trait Engine {
    fn name(&self) -> &'static str;
    fn step(&mut self) -> Result<()>;
    fn registers(&self) -> Registers;
    fn writes(&self) -> &BTreeMap<u16, u8>;
}

impl<B: Bus> Engine for MOS6502<RecordingBus<B>> {
    fn name(&self) -> &'static str {
        "micro-op"
    }

    fn step(&mut self) -> Result<()> {
        self.clock()
    }

    fn registers(&self) -> Registers {
        MOS6502::registers(self)
    }

    fn writes(&self) -> &BTreeMap<u16, u8> {
        self.bus().writes()
    }
}

impl<B: Bus> Engine for Chip<RecordingBus<B>> {
    fn name(&self) -> &'static str {
        "switch-level"
    }

    fn step(&mut self) -> Result<()> {
        self.clock()
    }

    fn registers(&self) -> Registers {
        Chip::registers(self)
    }

    fn writes(&self) -> &BTreeMap<u16, u8> {
        self.bus().writes()
    }
}

/// B has no latch on the die, so it is left out of the comparison.
fn comparable(regs: Registers) -> Registers {
    Registers {
        p: (regs.p - Status::BREAK) | Status::UNUSED,
        ..regs
    }
}

fn describe(regs: &Registers) -> String {
    format!(
        "PC:{:04X} A:{:02X} X:{:02X} Y:{:02X} S:{:02X} P:{}",
        regs.pc,
        regs.a,
        regs.x,
        regs.y,
        regs.s,
        regs.p.display()
    )
}

pub struct CrossCheck<L, R> {
    left: L,
    right: R,
    cycle: u64,
}

impl<L: Engine, R: Engine> CrossCheck<L, R> {
    /// Both engines must already be aligned: the next `step` of each performs the same bus
    /// cycle.
    pub fn new(left: L, right: R) -> Self {
        Self { left, right, cycle: 0 }
    }

    /// Clocks both engines once and compares them.
    pub fn step(&mut self) -> Result<()> {
        self.left.step()?;
        self.right.step()?;
        self.cycle += 1;

        let (l, r) = (comparable(self.left.registers()), comparable(self.right.registers()));
        if l != r {
            return Err(EmuError::Divergence(format!(
                "cycle {}: registers differ\n  {:<12} {}\n  {:<12} {}",
                self.cycle,
                self.left.name(),
                describe(&l),
                self.right.name(),
                describe(&r)
            )));
        }

        let (lw, rw) = (self.left.writes(), self.right.writes());
        if lw != rw {
            let address = lw
                .iter()
                .zip(rw.iter())
                .find(|(a, b)| a != b)
                .map(|((&addr, _), _)| addr)
                .or_else(|| lw.keys().chain(rw.keys()).find(|k| lw.get(k) != rw.get(k)).copied())
                .unwrap_or_default();
            return Err(EmuError::Divergence(format!(
                "cycle {}: memory writes differ at ${address:04X}\n  {:<12} {:?}\n  {:<12} {:?}",
                self.cycle,
                self.left.name(),
                lw.get(&address),
                self.right.name(),
                rw.get(&address)
            )));
        }
        Ok(())
    }

    /// Runs `cycles` lockstep cycles, stopping at the first divergence.
    pub fn run(&mut self, cycles: u64) -> Result<()> {
        for _ in 0..cycles {
            self.step()?;
        }
        info!(
            target: "crosscheck",
            "{} cycles in agreement, {} addresses written",
            self.cycle,
            self.left.writes().len()
        );
        Ok(())
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn left(&self) -> &L {
        &self.left
    }

    pub fn right(&self) -> &R {
        &self.right
    }
}

/// Pairs the micro-op engine with the switch-level chip, both booted from `memory` and aligned
/// on the first opcode fetch.
pub fn micro_op_vs_chip(
    memory: FlatMemory,
    netlist: Netlist,
    config: SimConfig,
) -> Result<CrossCheck<MOS6502<RecordingBus<FlatMemory>>, Chip<RecordingBus<FlatMemory>>>> {
    let mut cpu = MOS6502::new(RecordingBus::new(memory.clone()));
    cpu.power_on();
    cpu.execute_cycles(RESET_CYCLES)?;

    let mut chip = Chip::new(netlist, RecordingBus::new(memory), config)?;
    chip.init(None)?;
    chip.run_start_program(None)?;
    debug!(
        target: "crosscheck",
        "aligned: micro-op PC ${:04X}, chip PC ${:04X}",
        cpu.pc(),
        chip.read_pc()
    );

    Ok(CrossCheck::new(cpu, chip))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(program: &[u8]) -> MOS6502<RecordingBus<FlatMemory>> {
        let mut mem = FlatMemory::new();
        mem.load(0x0400, program);
        mem.set_word(0xFFFC, 0x0400);
        let mut cpu = MOS6502::new(RecordingBus::new(mem));
        cpu.power_on();
        cpu.execute_cycles(RESET_CYCLES).unwrap();
        cpu
    }

    #[test]
    fn identical_engines_agree() {
        // LDX #3; loop: DEX; BNE loop; STX $0200; INX; STX $0201; JMP *
        let program = [
            0xA2, 0x03, 0xCA, 0xD0, 0xFD, 0x8E, 0x00, 0x02, 0xE8, 0x8E, 0x01, 0x02, 0x4C, 0x0C,
            0x04,
        ];
        let mut check = CrossCheck::new(engine(&program), engine(&program));
        check.run(40).unwrap();
        assert_eq!(check.cycle(), 40);
        // storing zero over zero is not a change
        assert!(!check.left().writes().contains_key(&0x0200));
        assert_eq!(check.left().writes()[&0x0201], 0x01);
    }

    #[test]
    fn register_divergence_names_the_cycle() {
        // LDA #$01 vs LDA #$02; the load lands on the third cycle
        let mut check = CrossCheck::new(engine(&[0xA9, 0x01, 0xEA]), engine(&[0xA9, 0x02, 0xEA]));
        match check.run(10) {
            Err(EmuError::Divergence(msg)) => {
                assert!(msg.starts_with("cycle 3: registers differ"), "{msg}");
                assert!(msg.contains("A:01") && msg.contains("A:02"), "{msg}");
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn write_divergence_names_the_address() {
        // LDA #$01; STA $0200 vs STA $0201
        let mut check = CrossCheck::new(
            engine(&[0xA9, 0x01, 0x8D, 0x00, 0x02]),
            engine(&[0xA9, 0x01, 0x8D, 0x01, 0x02]),
        );
        match check.run(10) {
            Err(EmuError::Divergence(msg)) => {
                assert!(msg.starts_with("cycle 6: memory writes differ at $0200"), "{msg}");
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn break_flag_is_not_compared() {
        let mut regs = engine(&[]).registers();
        let plain = comparable(regs);
        regs.p |= Status::BREAK;
        assert_eq!(comparable(regs), plain);
    }
}
