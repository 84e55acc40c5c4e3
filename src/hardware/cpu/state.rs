use std::collections::VecDeque;

use super::micro_ops::MicroOp;

/// Internal state machine responsible for tracking mid-execution information.
///
/// Contains hidden registers:
/// - Data latch: operand byte on its way to or from the ALU
/// - Address latch: pointer being dereferenced (indirect modes, JMP ($nnnn))
/// - Effective address latch: the address the instruction finally reads or writes
/// - Micro-op queue: the remaining cycles of the instruction in flight
///
/// The latches are never cleared between instructions. Real silicon keeps whatever the last
/// instruction left in them, and every sequence writes a latch before it reads it.
pub struct MOSState {
    /// Opcode of the instruction in flight.
    pub opcode: u8,
    pub data_latch: u8,
    pub addr_lo: u8,
    pub addr_hi: u8,
    pub ea_lo: u8,
    pub ea_hi: u8,
    /// Set when the last index addition carried out of the low address byte.
    pub page_carry: bool,
    pub u_op_queue: VecDeque<MicroOp>,
}

impl MOSState {
    pub fn new() -> Self {
        Self {
            opcode: 0,
            data_latch: 0,
            addr_lo: 0,
            addr_hi: 0,
            ea_lo: 0,
            ea_hi: 0,
            page_carry: false,
            u_op_queue: VecDeque::with_capacity(8),
        }
    }

    pub fn ea(&self) -> u16 {
        u16::from_le_bytes([self.ea_lo, self.ea_hi])
    }

    pub fn addr(&self) -> u16 {
        u16::from_le_bytes([self.addr_lo, self.addr_hi])
    }

    pub fn latches(&self) -> Latches {
        Latches {
            data: self.data_latch,
            address: self.addr(),
            effective: self.ea(),
        }
    }
}

impl Default for MOSState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the scratch latches, for inspection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latches {
    pub data: u8,
    pub address: u16,
    pub effective: u16,
}
