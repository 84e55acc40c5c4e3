pub mod instr_def;
pub mod instructions;
pub mod micro_ops;
pub mod state;
pub mod status;

use std::sync::Arc;

use log::{debug, trace};

use crate::hardware::Bus;
use crate::hardware::cpu::instructions::{sequence, InstructionTable, Interrupt};
use crate::hardware::cpu::state::{Latches, MOSState};
use crate::hardware::cpu::status::Status;
use crate::Result;

/// Architectural register file, as seen between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub p: Status,
}

/// Virtual MOS 6502 processor, stepped one bus cycle at a time. The roles of `MOS6502` are as
/// follows:
///
/// - Manage program state (program counter, stack)
/// - Fetch, decode and execute instructions
/// - Perform arithmetic operations through integrated ALU
///
/// Each opcode is decoded into a queue of micro-ops, one per bus cycle. `clock` pops and runs
/// ops until one has used the bus, so a cycle is exactly one read or write. When the queue runs
/// dry the same `clock` call fetches the next opcode (or enters a pending interrupt).
///
/// The 6502 is unaware of any memory mapping; all of that lives behind the [`Bus`].
pub struct MOS6502<B> {
    pub(crate) bus: B,
    pub(crate) program_counter: u16,
    pub(crate) a: u8,
    pub(crate) x: u8,
    pub(crate) y: u8,
    pub(crate) status: Status,
    pub(crate) stack_ptr: u8,
    pub(crate) state: MOSState,
    instructions: Arc<InstructionTable>,
    irq_line: bool,
    /// IRQ condition sampled during the last bus cycle of the current instruction.
    irq_pending: bool,
    nmi_pending: bool,
    cycles: u64,
}

impl<B: Bus> MOS6502<B> {
    /// Constructs a new 6502 CPU (`MOS6502`) with its own decode table. Requires access to a
    /// memory bus.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use visual6502::{FlatMemory, MOS6502};
    ///
    /// let mut mem = FlatMemory::new();
    /// mem.set_word(0xFFFC, 0x0400);
    /// let mut cpu = MOS6502::new(mem);
    /// cpu.power_on();
    /// ```
    pub fn new(bus: B) -> Self {
        Self::with_table(bus, Arc::new(InstructionTable::new()))
    }

    /// Constructs a CPU sharing an already built decode table.
    pub fn with_table(bus: B, instructions: Arc<InstructionTable>) -> Self {
        Self {
            bus,
            program_counter: 0,
            a: 0, // Accumulator
            x: 0,
            y: 0,
            status: Status::UNUSED,
            stack_ptr: 0,
            state: MOSState::new(),
            instructions,
            irq_line: false,
            irq_pending: false,
            nmi_pending: false,
            cycles: 0,
        }
    }

    /// Puts the CPU in its power-on state and queues the reset sequence.
    ///
    /// Registers start at zero. The reset sequence then takes seven cycles: two dummy reads at
    /// PC, three stack reads that walk S down to $FD, and the vector fetch from $FFFC-$FFFD.
    /// The eighth `clock` fetches the first opcode of the program.
    pub fn power_on(&mut self) {
        self.program_counter = 0;
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.stack_ptr = 0;
        self.status = Status::UNUSED;
        self.cycles = 0;
        self.irq_line = false;
        self.nmi_pending = false;
        self.reset();
    }

    /// Abandons the instruction in flight and queues the reset sequence. Registers other than
    /// S, P and PC keep their values.
    pub fn reset(&mut self) {
        debug!(target: "cpu", "reset requested at PC ${:04X}", self.program_counter);
        self.state.u_op_queue.clear();
        self.state.u_op_queue.extend(Interrupt::Reset.sequence());
        self.irq_pending = false;
    }

    /// Drives the (level-sensitive) IRQ line. `true` means asserted.
    ///
    /// The line and the I flag are sampled at the start of each instruction's last bus cycle, so
    /// a change to I by CLI, SEI or PLP only takes effect after the following instruction.
    pub fn set_irq(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    /// Latches an NMI edge; it is taken at the next instruction boundary.
    pub fn trigger_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Steps the CPU by one clock cycle.
    ///
    /// Free micro-ops left at the head of the queue run first, inside this cycle, followed by the
    /// first op that uses the bus. An empty queue means an instruction boundary: the opcode at PC
    /// is fetched and decoded, and that fetch is this cycle's bus access.
    pub fn clock(&mut self) -> Result<()> {
        loop {
            match self.state.u_op_queue.pop_front() {
                Some(op) => {
                    let irq = self.irq_line && !self.status.contains(Status::INTERRUPT);
                    self.execute(op)?; // Execute
                    if op.takes_cycle() {
                        if self.is_instruction_complete() {
                            self.irq_pending = irq;
                        }
                        break;
                    }
                }
                None => {
                    self.begin_instruction()?;
                    break;
                }
            }
        }
        self.cycles += 1;
        Ok(())
    }

    /// Clocks until the current instruction's last bus cycle has run, returning the number of
    /// cycles taken. Free work still queued (the register write-back) runs at the start of the
    /// next call.
    pub fn step_instruction(&mut self) -> Result<u32> {
        let mut taken = 0;
        loop {
            self.clock()?;
            taken += 1;
            if self.is_instruction_complete() {
                return Ok(taken);
            }
        }
    }

    /// Runs `count` cycles.
    pub fn execute_cycles(&mut self, count: u64) -> Result<()> {
        for _ in 0..count {
            self.clock()?;
        }
        Ok(())
    }

    /// True when no bus cycle of the current instruction remains.
    pub fn is_instruction_complete(&self) -> bool {
        self.state.u_op_queue.iter().all(|op| !op.takes_cycle())
    }

    /// Instruction boundary: take a pending interrupt or fetch and decode the next opcode.
    fn begin_instruction(&mut self) -> Result<()> {
        if self.nmi_pending {
            self.nmi_pending = false;
            return self.enter_interrupt(Interrupt::Nmi);
        }
        if self.irq_pending {
            self.irq_pending = false;
            return self.enter_interrupt(Interrupt::Irq);
        }

        let pc = self.program_counter;
        let opcode = self.fetch_pc()?; // Fetch
        self.state.opcode = opcode;
        let def = *self.instructions.get(opcode);
        trace!(
            target: "cpu",
            "{pc:04X}  {opcode:02X}  {:?} {:?}  A:{:02X} X:{:02X} Y:{:02X} S:{:02X} P:{}",
            def.mnemonic,
            def.mode,
            self.a,
            self.x,
            self.y,
            self.stack_ptr,
            self.status.display(),
        );
        let ops = sequence(opcode, &def)?; // Decode
        self.state.u_op_queue.extend(ops);
        Ok(())
    }

    /// Queues an interrupt entry and runs its first cycle, which replaces the opcode fetch.
    fn enter_interrupt(&mut self, kind: Interrupt) -> Result<()> {
        debug!(target: "cpu", "{kind:?} taken at PC ${:04X}", self.program_counter);
        self.state.u_op_queue.extend(kind.sequence());
        if let Some(first) = self.state.u_op_queue.pop_front() {
            self.execute(first)?;
        }
        Ok(())
    }

    pub fn registers(&self) -> Registers {
        Registers {
            pc: self.program_counter,
            a: self.a,
            x: self.x,
            y: self.y,
            s: self.stack_ptr,
            p: self.status,
        }
    }

    pub fn pc(&self) -> u16 {
        self.program_counter
    }

    pub fn a(&self) -> u8 {
        self.a
    }

    pub fn x(&self) -> u8 {
        self.x
    }

    pub fn y(&self) -> u8 {
        self.y
    }

    pub fn sp(&self) -> u8 {
        self.stack_ptr
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Total cycles clocked since power-on.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn latches(&self) -> Latches {
        self.state.latches()
    }

    pub fn instructions(&self) -> &Arc<InstructionTable> {
        &self.instructions
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Overrides the program counter and drops any queued work. Meant for test setups that skip
    /// the reset sequence.
    pub fn set_pc(&mut self, pc: u16) {
        self.state.u_op_queue.clear();
        self.program_counter = pc;
    }

    pub fn into_bus(self) -> B {
        self.bus
    }
}
