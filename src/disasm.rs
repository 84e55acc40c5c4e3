use crate::hardware::cpu::instr_def::{AddrMode, Mnemonic};
use crate::hardware::cpu::instructions::InstructionTable;
use crate::hardware::FlatMemory;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub address: u16,
    pub bytes: Vec<u8>,
    pub text: String,
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex: Vec<String> = self.bytes.iter().map(|b| format!("{b:02X}")).collect();
        write!(f, "{:04X}  {:<9} {}", self.address, hex.join(" "), self.text)
    }
}

fn mnemonic_name(m: Mnemonic) -> String {
    match m {
        Mnemonic::Unknown => "JAM".to_string(),
        m => format!("{m:?}"),
    }
}

/// Decodes the instruction at `address`. `bytes` must start with the opcode; missing operand
/// bytes read as zero.
pub fn disassemble(table: &InstructionTable, address: u16, bytes: &[u8]) -> Line {
    let opcode = bytes.first().copied().unwrap_or(0);
    let def = table.get(opcode);
    let size = def.size as usize;
    let operand = |i: usize| bytes.get(i).copied().unwrap_or(0);
    let lo = operand(1);
    let word = u16::from_le_bytes([lo, operand(2)]);

    let name = mnemonic_name(def.mnemonic);
    let text = match def.mode {
        AddrMode::Implied => name,
        AddrMode::Accumulator => format!("{name} A"),
        AddrMode::Immediate => format!("{name} #${lo:02X}"),
        AddrMode::ZeroPage => format!("{name} ${lo:02X}"),
        AddrMode::ZeroPageX => format!("{name} ${lo:02X},X"),
        AddrMode::ZeroPageY => format!("{name} ${lo:02X},Y"),
        AddrMode::Absolute => format!("{name} ${word:04X}"),
        AddrMode::AbsoluteX => format!("{name} ${word:04X},X"),
        AddrMode::AbsoluteY => format!("{name} ${word:04X},Y"),
        AddrMode::Indirect => format!("{name} (${word:04X})"),
        AddrMode::IndirectX => format!("{name} (${lo:02X},X)"),
        AddrMode::IndirectY => format!("{name} (${lo:02X}),Y"),
        AddrMode::Relative => {
            let target = address.wrapping_add(2).wrapping_add(lo as i8 as u16);
            format!("{name} ${target:04X}")
        }
    };

    Line {
        address,
        bytes: (0..size).map(operand).collect(),
        text,
    }
}

/// Decodes `count` consecutive instructions starting at `start`.
pub fn disassemble_range(table: &InstructionTable, memory: &FlatMemory, start: u16, count: usize) -> Vec<Line> {
    let mut lines = Vec::with_capacity(count);
    let mut address = start;
    for _ in 0..count {
        let bytes: Vec<u8> = (0..3).map(|i| memory.peek(address.wrapping_add(i))).collect();
        let line = disassemble(table, address, &bytes);
        address = address.wrapping_add(line.bytes.len() as u16);
        lines.push(line);
    }
    lines
}
