use std::ops::Index;

use super::instr_def::{Access, AddrMode, InstrDef, Mnemonic};
use super::micro_ops::{Condition, IndexReg, MicroOp, StackByte};
use crate::{EmuError, Result};

macro_rules! opc {
    ($table:ident, $op:expr, $mnemonic:ident, $mode:ident, $cycles:expr) => {
        $table[$op] = InstrDef::new(Mnemonic::$mnemonic, AddrMode::$mode, $cycles);
    };
}

/// The 256-entry NMOS 6502 decode table.
///
/// Built explicitly with [`InstructionTable::new`] and shared by reference (the CPU holds it in
/// an `Arc`); nothing here is global. Every opcode decodes to something: the twelve JAM opcodes
/// become [`InstrDef::UNKNOWN`].
///
/// See [6502 Instruction Set](https://www.masswerk.at/6502/6502_instruction_set.html) for info.
#[derive(Debug, Clone)]
pub struct InstructionTable {
    defs: [InstrDef; 256],
}

impl InstructionTable {
    pub fn new() -> Self {
        let mut t = [InstrDef::UNKNOWN; 256];

        opc!(t, 0x00, BRK, Implied, 7);
        opc!(t, 0x01, ORA, IndirectX, 6);
        opc!(t, 0x03, SLO, IndirectX, 8);
        opc!(t, 0x04, NOP, ZeroPage, 3);
        opc!(t, 0x05, ORA, ZeroPage, 3);
        opc!(t, 0x06, ASL, ZeroPage, 5);
        opc!(t, 0x07, SLO, ZeroPage, 5);
        opc!(t, 0x08, PHP, Implied, 3);
        opc!(t, 0x09, ORA, Immediate, 2);
        opc!(t, 0x0A, ASL, Accumulator, 2);
        opc!(t, 0x0B, ANC, Immediate, 2);
        opc!(t, 0x0C, NOP, Absolute, 4);
        opc!(t, 0x0D, ORA, Absolute, 4);
        opc!(t, 0x0E, ASL, Absolute, 6);
        opc!(t, 0x0F, SLO, Absolute, 6);

        opc!(t, 0x10, BPL, Relative, 2);
        opc!(t, 0x11, ORA, IndirectY, 5);
        opc!(t, 0x13, SLO, IndirectY, 8);
        opc!(t, 0x14, NOP, ZeroPageX, 4);
        opc!(t, 0x15, ORA, ZeroPageX, 4);
        opc!(t, 0x16, ASL, ZeroPageX, 6);
        opc!(t, 0x17, SLO, ZeroPageX, 6);
        opc!(t, 0x18, CLC, Implied, 2);
        opc!(t, 0x19, ORA, AbsoluteY, 4);
        opc!(t, 0x1A, NOP, Implied, 2);
        opc!(t, 0x1B, SLO, AbsoluteY, 7);
        opc!(t, 0x1C, NOP, AbsoluteX, 4);
        opc!(t, 0x1D, ORA, AbsoluteX, 4);
        opc!(t, 0x1E, ASL, AbsoluteX, 7);
        opc!(t, 0x1F, SLO, AbsoluteX, 7);

        opc!(t, 0x20, JSR, Absolute, 6);
        opc!(t, 0x21, AND, IndirectX, 6);
        opc!(t, 0x23, RLA, IndirectX, 8);
        opc!(t, 0x24, BIT, ZeroPage, 3);
        opc!(t, 0x25, AND, ZeroPage, 3);
        opc!(t, 0x26, ROL, ZeroPage, 5);
        opc!(t, 0x27, RLA, ZeroPage, 5);
        opc!(t, 0x28, PLP, Implied, 4);
        opc!(t, 0x29, AND, Immediate, 2);
        opc!(t, 0x2A, ROL, Accumulator, 2);
        opc!(t, 0x2B, ANC, Immediate, 2);
        opc!(t, 0x2C, BIT, Absolute, 4);
        opc!(t, 0x2D, AND, Absolute, 4);
        opc!(t, 0x2E, ROL, Absolute, 6);
        opc!(t, 0x2F, RLA, Absolute, 6);

        opc!(t, 0x30, BMI, Relative, 2);
        opc!(t, 0x31, AND, IndirectY, 5);
        opc!(t, 0x33, RLA, IndirectY, 8);
        opc!(t, 0x34, NOP, ZeroPageX, 4);
        opc!(t, 0x35, AND, ZeroPageX, 4);
        opc!(t, 0x36, ROL, ZeroPageX, 6);
        opc!(t, 0x37, RLA, ZeroPageX, 6);
        opc!(t, 0x38, SEC, Implied, 2);
        opc!(t, 0x39, AND, AbsoluteY, 4);
        opc!(t, 0x3A, NOP, Implied, 2);
        opc!(t, 0x3B, RLA, AbsoluteY, 7);
        opc!(t, 0x3C, NOP, AbsoluteX, 4);
        opc!(t, 0x3D, AND, AbsoluteX, 4);
        opc!(t, 0x3E, ROL, AbsoluteX, 7);
        opc!(t, 0x3F, RLA, AbsoluteX, 7);

        opc!(t, 0x40, RTI, Implied, 6);
        opc!(t, 0x41, EOR, IndirectX, 6);
        opc!(t, 0x43, SRE, IndirectX, 8);
        opc!(t, 0x44, NOP, ZeroPage, 3);
        opc!(t, 0x45, EOR, ZeroPage, 3);
        opc!(t, 0x46, LSR, ZeroPage, 5);
        opc!(t, 0x47, SRE, ZeroPage, 5);
        opc!(t, 0x48, PHA, Implied, 3);
        opc!(t, 0x49, EOR, Immediate, 2);
        opc!(t, 0x4A, LSR, Accumulator, 2);
        opc!(t, 0x4B, ALR, Immediate, 2);
        opc!(t, 0x4C, JMP, Absolute, 3);
        opc!(t, 0x4D, EOR, Absolute, 4);
        opc!(t, 0x4E, LSR, Absolute, 6);
        opc!(t, 0x4F, SRE, Absolute, 6);

        opc!(t, 0x50, BVC, Relative, 2);
        opc!(t, 0x51, EOR, IndirectY, 5);
        opc!(t, 0x53, SRE, IndirectY, 8);
        opc!(t, 0x54, NOP, ZeroPageX, 4);
        opc!(t, 0x55, EOR, ZeroPageX, 4);
        opc!(t, 0x56, LSR, ZeroPageX, 6);
        opc!(t, 0x57, SRE, ZeroPageX, 6);
        opc!(t, 0x58, CLI, Implied, 2);
        opc!(t, 0x59, EOR, AbsoluteY, 4);
        opc!(t, 0x5A, NOP, Implied, 2);
        opc!(t, 0x5B, SRE, AbsoluteY, 7);
        opc!(t, 0x5C, NOP, AbsoluteX, 4);
        opc!(t, 0x5D, EOR, AbsoluteX, 4);
        opc!(t, 0x5E, LSR, AbsoluteX, 7);
        opc!(t, 0x5F, SRE, AbsoluteX, 7);

        opc!(t, 0x60, RTS, Implied, 6);
        opc!(t, 0x61, ADC, IndirectX, 6);
        opc!(t, 0x63, RRA, IndirectX, 8);
        opc!(t, 0x64, NOP, ZeroPage, 3);
        opc!(t, 0x65, ADC, ZeroPage, 3);
        opc!(t, 0x66, ROR, ZeroPage, 5);
        opc!(t, 0x67, RRA, ZeroPage, 5);
        opc!(t, 0x68, PLA, Implied, 4);
        opc!(t, 0x69, ADC, Immediate, 2);
        opc!(t, 0x6A, ROR, Accumulator, 2);
        opc!(t, 0x6B, ARR, Immediate, 2);
        opc!(t, 0x6C, JMP, Indirect, 5);
        opc!(t, 0x6D, ADC, Absolute, 4);
        opc!(t, 0x6E, ROR, Absolute, 6);
        opc!(t, 0x6F, RRA, Absolute, 6);

        opc!(t, 0x70, BVS, Relative, 2);
        opc!(t, 0x71, ADC, IndirectY, 5);
        opc!(t, 0x73, RRA, IndirectY, 8);
        opc!(t, 0x74, NOP, ZeroPageX, 4);
        opc!(t, 0x75, ADC, ZeroPageX, 4);
        opc!(t, 0x76, ROR, ZeroPageX, 6);
        opc!(t, 0x77, RRA, ZeroPageX, 6);
        opc!(t, 0x78, SEI, Implied, 2);
        opc!(t, 0x79, ADC, AbsoluteY, 4);
        opc!(t, 0x7A, NOP, Implied, 2);
        opc!(t, 0x7B, RRA, AbsoluteY, 7);
        opc!(t, 0x7C, NOP, AbsoluteX, 4);
        opc!(t, 0x7D, ADC, AbsoluteX, 4);
        opc!(t, 0x7E, ROR, AbsoluteX, 7);
        opc!(t, 0x7F, RRA, AbsoluteX, 7);

        opc!(t, 0x80, NOP, Immediate, 2);
        opc!(t, 0x81, STA, IndirectX, 6);
        opc!(t, 0x82, NOP, Immediate, 2);
        opc!(t, 0x83, SAX, IndirectX, 6);
        opc!(t, 0x84, STY, ZeroPage, 3);
        opc!(t, 0x85, STA, ZeroPage, 3);
        opc!(t, 0x86, STX, ZeroPage, 3);
        opc!(t, 0x87, SAX, ZeroPage, 3);
        opc!(t, 0x88, DEY, Implied, 2);
        opc!(t, 0x89, NOP, Immediate, 2);
        opc!(t, 0x8A, TXA, Implied, 2);
        opc!(t, 0x8B, ANE, Immediate, 2);
        opc!(t, 0x8C, STY, Absolute, 4);
        opc!(t, 0x8D, STA, Absolute, 4);
        opc!(t, 0x8E, STX, Absolute, 4);
        opc!(t, 0x8F, SAX, Absolute, 4);

        opc!(t, 0x90, BCC, Relative, 2);
        opc!(t, 0x91, STA, IndirectY, 6);
        opc!(t, 0x93, SHA, IndirectY, 6);
        opc!(t, 0x94, STY, ZeroPageX, 4);
        opc!(t, 0x95, STA, ZeroPageX, 4);
        opc!(t, 0x96, STX, ZeroPageY, 4);
        opc!(t, 0x97, SAX, ZeroPageY, 4);
        opc!(t, 0x98, TYA, Implied, 2);
        opc!(t, 0x99, STA, AbsoluteY, 5);
        opc!(t, 0x9A, TXS, Implied, 2);
        opc!(t, 0x9B, TAS, AbsoluteY, 5);
        opc!(t, 0x9C, SHY, AbsoluteX, 5);
        opc!(t, 0x9D, STA, AbsoluteX, 5);
        opc!(t, 0x9E, SHX, AbsoluteY, 5);
        opc!(t, 0x9F, SHA, AbsoluteY, 5);

        opc!(t, 0xA0, LDY, Immediate, 2);
        opc!(t, 0xA1, LDA, IndirectX, 6);
        opc!(t, 0xA2, LDX, Immediate, 2);
        opc!(t, 0xA3, LAX, IndirectX, 6);
        opc!(t, 0xA4, LDY, ZeroPage, 3);
        opc!(t, 0xA5, LDA, ZeroPage, 3);
        opc!(t, 0xA6, LDX, ZeroPage, 3);
        opc!(t, 0xA7, LAX, ZeroPage, 3);
        opc!(t, 0xA8, TAY, Implied, 2);
        opc!(t, 0xA9, LDA, Immediate, 2);
        opc!(t, 0xAA, TAX, Implied, 2);
        opc!(t, 0xAB, LXA, Immediate, 2);
        opc!(t, 0xAC, LDY, Absolute, 4);
        opc!(t, 0xAD, LDA, Absolute, 4);
        opc!(t, 0xAE, LDX, Absolute, 4);
        opc!(t, 0xAF, LAX, Absolute, 4);

        opc!(t, 0xB0, BCS, Relative, 2);
        opc!(t, 0xB1, LDA, IndirectY, 5);
        opc!(t, 0xB3, LAX, IndirectY, 5);
        opc!(t, 0xB4, LDY, ZeroPageX, 4);
        opc!(t, 0xB5, LDA, ZeroPageX, 4);
        opc!(t, 0xB6, LDX, ZeroPageY, 4);
        opc!(t, 0xB7, LAX, ZeroPageY, 4);
        opc!(t, 0xB8, CLV, Implied, 2);
        opc!(t, 0xB9, LDA, AbsoluteY, 4);
        opc!(t, 0xBA, TSX, Implied, 2);
        opc!(t, 0xBB, LAS, AbsoluteY, 4);
        opc!(t, 0xBC, LDY, AbsoluteX, 4);
        opc!(t, 0xBD, LDA, AbsoluteX, 4);
        opc!(t, 0xBE, LDX, AbsoluteY, 4);
        opc!(t, 0xBF, LAX, AbsoluteY, 4);

        opc!(t, 0xC0, CPY, Immediate, 2);
        opc!(t, 0xC1, CMP, IndirectX, 6);
        opc!(t, 0xC2, NOP, Immediate, 2);
        opc!(t, 0xC3, DCP, IndirectX, 8);
        opc!(t, 0xC4, CPY, ZeroPage, 3);
        opc!(t, 0xC5, CMP, ZeroPage, 3);
        opc!(t, 0xC6, DEC, ZeroPage, 5);
        opc!(t, 0xC7, DCP, ZeroPage, 5);
        opc!(t, 0xC8, INY, Implied, 2);
        opc!(t, 0xC9, CMP, Immediate, 2);
        opc!(t, 0xCA, DEX, Implied, 2);
        opc!(t, 0xCB, SBX, Immediate, 2);
        opc!(t, 0xCC, CPY, Absolute, 4);
        opc!(t, 0xCD, CMP, Absolute, 4);
        opc!(t, 0xCE, DEC, Absolute, 6);
        opc!(t, 0xCF, DCP, Absolute, 6);

        opc!(t, 0xD0, BNE, Relative, 2);
        opc!(t, 0xD1, CMP, IndirectY, 5);
        opc!(t, 0xD3, DCP, IndirectY, 8);
        opc!(t, 0xD4, NOP, ZeroPageX, 4);
        opc!(t, 0xD5, CMP, ZeroPageX, 4);
        opc!(t, 0xD6, DEC, ZeroPageX, 6);
        opc!(t, 0xD7, DCP, ZeroPageX, 6);
        opc!(t, 0xD8, CLD, Implied, 2);
        opc!(t, 0xD9, CMP, AbsoluteY, 4);
        opc!(t, 0xDA, NOP, Implied, 2);
        opc!(t, 0xDB, DCP, AbsoluteY, 7);
        opc!(t, 0xDC, NOP, AbsoluteX, 4);
        opc!(t, 0xDD, CMP, AbsoluteX, 4);
        opc!(t, 0xDE, DEC, AbsoluteX, 7);
        opc!(t, 0xDF, DCP, AbsoluteX, 7);

        opc!(t, 0xE0, CPX, Immediate, 2);
        opc!(t, 0xE1, SBC, IndirectX, 6);
        opc!(t, 0xE2, NOP, Immediate, 2);
        opc!(t, 0xE3, ISC, IndirectX, 8);
        opc!(t, 0xE4, CPX, ZeroPage, 3);
        opc!(t, 0xE5, SBC, ZeroPage, 3);
        opc!(t, 0xE6, INC, ZeroPage, 5);
        opc!(t, 0xE7, ISC, ZeroPage, 5);
        opc!(t, 0xE8, INX, Implied, 2);
        opc!(t, 0xE9, SBC, Immediate, 2);
        opc!(t, 0xEA, NOP, Implied, 2);
        opc!(t, 0xEB, USBC, Immediate, 2);
        opc!(t, 0xEC, CPX, Absolute, 4);
        opc!(t, 0xED, SBC, Absolute, 4);
        opc!(t, 0xEE, INC, Absolute, 6);
        opc!(t, 0xEF, ISC, Absolute, 6);

        opc!(t, 0xF0, BEQ, Relative, 2);
        opc!(t, 0xF1, SBC, IndirectY, 5);
        opc!(t, 0xF3, ISC, IndirectY, 8);
        opc!(t, 0xF4, NOP, ZeroPageX, 4);
        opc!(t, 0xF5, SBC, ZeroPageX, 4);
        opc!(t, 0xF6, INC, ZeroPageX, 6);
        opc!(t, 0xF7, ISC, ZeroPageX, 6);
        opc!(t, 0xF8, SED, Implied, 2);
        opc!(t, 0xF9, SBC, AbsoluteY, 4);
        opc!(t, 0xFA, NOP, Implied, 2);
        opc!(t, 0xFB, ISC, AbsoluteY, 7);
        opc!(t, 0xFC, NOP, AbsoluteX, 4);
        opc!(t, 0xFD, SBC, AbsoluteX, 4);
        opc!(t, 0xFE, INC, AbsoluteX, 7);
        opc!(t, 0xFF, ISC, AbsoluteX, 7);

        Self { defs: t }
    }

    pub fn get(&self, opcode: u8) -> &InstrDef {
        &self.defs[opcode as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &InstrDef)> {
        self.defs.iter().enumerate().map(|(i, d)| (i as u8, d))
    }
}

impl Default for InstructionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<u8> for InstructionTable {
    type Output = InstrDef;

    fn index(&self, opcode: u8) -> &InstrDef {
        self.get(opcode)
    }
}

/// The three hardware entry sequences. BRK shares their push/vector tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Reset,
    Nmi,
    Irq,
}

impl Interrupt {
    pub const fn vector(self) -> u16 {
        match self {
            Interrupt::Nmi => 0xFFFA,
            Interrupt::Reset => 0xFFFC,
            Interrupt::Irq => 0xFFFE,
        }
    }

    /// Micro-ops for the whole entry sequence, including the cycle that would have fetched an
    /// opcode. Reset runs the same bus pattern with its stack writes turned into reads.
    pub fn sequence(self) -> Vec<MicroOp> {
        use MicroOp::*;
        let vector = self.vector();
        match self {
            Interrupt::Reset => vec![
                DummyReadPc,
                DummyReadPc,
                ReadStackDecrement,
                ReadStackDecrement,
                ReadStackDecrement,
                ReadVectorLo(vector),
                ReadVectorHi(vector),
                JumpToEa,
            ],
            Interrupt::Nmi | Interrupt::Irq => vec![
                DummyReadPc,
                DummyReadPc,
                Push(StackByte::Pch),
                Push(StackByte::Pcl),
                Push(StackByte::StatusIrq),
                ReadVectorLo(vector),
                ReadVectorHi(vector),
                JumpToEa,
            ],
        }
    }
}

/// Expands one decoded opcode into the micro-ops that follow its fetch cycle.
///
/// Read instructions end in a free `Execute`, so their register result lands during the next
/// opcode fetch, as on the die.
pub fn sequence(opcode: u8, def: &InstrDef) -> Result<Vec<MicroOp>> {
    use MicroOp::*;
    let m = def.mnemonic;

    let special = match m {
        Mnemonic::BRK => Some(vec![
            FetchOperand,
            Push(StackByte::Pch),
            Push(StackByte::Pcl),
            Push(StackByte::StatusBrk),
            ReadVectorLo(Interrupt::Irq.vector()),
            ReadVectorHi(Interrupt::Irq.vector()),
            JumpToEa,
        ]),
        Mnemonic::JSR => Some(vec![
            FetchEaLo,
            DummyReadStack,
            Push(StackByte::Pch),
            Push(StackByte::Pcl),
            FetchEaHi,
            JumpToEa,
        ]),
        Mnemonic::RTS => Some(vec![
            DummyReadPc,
            ReadStackIncrement,
            PullEaLo,
            PullEaHi,
            JumpToEa,
            IncrementPcRead,
        ]),
        Mnemonic::RTI => Some(vec![
            DummyReadPc,
            ReadStackIncrement,
            PullStatus,
            PullEaLo,
            PullEaHi,
            JumpToEa,
        ]),
        Mnemonic::PHA => Some(vec![DummyReadPc, Push(StackByte::A)]),
        Mnemonic::PHP => Some(vec![DummyReadPc, Push(StackByte::StatusBrk)]),
        Mnemonic::PLA | Mnemonic::PLP => Some(vec![
            DummyReadPc,
            ReadStackIncrement,
            PullData,
            Execute(m),
        ]),
        Mnemonic::JMP if def.mode == AddrMode::Absolute => Some(vec![FetchEaLo, FetchEaHi, JumpToEa]),
        Mnemonic::JMP if def.mode == AddrMode::Indirect => Some(vec![
            FetchPointerLo,
            FetchPointerHi,
            ReadIndirectLo,
            ReadIndirectHi,
            JumpToEa,
        ]),
        _ => Condition::for_branch(m).map(|c| vec![FetchBranch(c), BranchTake, BranchFixup]),
    };
    if let Some(ops) = special {
        return Ok(ops);
    }

    let undefined = || EmuError::UndefinedMode { opcode, mode: def.mode };
    let access = m.access();
    if access == Access::Special {
        return Err(undefined());
    }

    let mut ops = match def.mode {
        AddrMode::Implied | AddrMode::Accumulator => return Ok(vec![DummyReadPc, Execute(m)]),
        AddrMode::Immediate if access == Access::Read => return Ok(vec![FetchOperand, Execute(m)]),
        AddrMode::ZeroPage => vec![FetchZeroPage],
        AddrMode::ZeroPageX => vec![FetchZeroPage, ZeroPageIndex(IndexReg::X)],
        AddrMode::ZeroPageY => vec![FetchZeroPage, ZeroPageIndex(IndexReg::Y)],
        AddrMode::Absolute => vec![FetchEaLo, FetchEaHi],
        AddrMode::AbsoluteX => vec![FetchEaLo, FetchEaHiIndexed(IndexReg::X)],
        AddrMode::AbsoluteY => vec![FetchEaLo, FetchEaHiIndexed(IndexReg::Y)],
        AddrMode::IndirectX => vec![FetchPointer, PointerIndex, ReadPointerLo, ReadPointerHi],
        AddrMode::IndirectY => vec![FetchPointer, ReadPointerLo, ReadPointerHiIndexed],
        AddrMode::Immediate | AddrMode::Indirect | AddrMode::Relative => return Err(undefined()),
    };

    let indexed = matches!(
        def.mode,
        AddrMode::AbsoluteX | AddrMode::AbsoluteY | AddrMode::IndirectY
    );
    match access {
        Access::Read if indexed => ops.extend([ReadIndexed, FixupRead, Execute(m)]),
        Access::Read => ops.extend([Read, Execute(m)]),
        Access::Write => {
            if indexed {
                ops.push(DummyReadIndexed);
            }
            ops.push(Store(m));
        }
        Access::Modify => {
            if indexed {
                ops.push(DummyReadIndexed);
            }
            ops.extend([Read, DummyWrite, Modify(m)]);
        }
        Access::Internal | Access::Special => return Err(undefined()),
    }
    Ok(ops)
}
