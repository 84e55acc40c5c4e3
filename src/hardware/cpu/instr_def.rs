/// Operand addressing modes of the NMOS 6502.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

impl AddrMode {
    /// Instruction length in bytes, opcode included.
    pub const fn size(self) -> u8 {
        match self {
            AddrMode::Implied | AddrMode::Accumulator => 1,
            AddrMode::Immediate
            | AddrMode::ZeroPage
            | AddrMode::ZeroPageX
            | AddrMode::ZeroPageY
            | AddrMode::IndirectX
            | AddrMode::IndirectY
            | AddrMode::Relative => 2,
            AddrMode::Absolute | AddrMode::AbsoluteX | AddrMode::AbsoluteY | AddrMode::Indirect => 3,
        }
    }
}

/// Every instruction name the decoder can produce, undocumented ones included.
///
/// `Unknown` stands in for the JAM opcodes, which lock up real silicon; here they decode to a
/// one-byte, two-cycle no-op.
#[allow(clippy::upper_case_acronyms)]
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    ADC, AND, ASL, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRK, BVC, BVS, CLC,
    CLD, CLI, CLV, CMP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY, JMP,
    JSR, LDA, LDX, LDY, LSR, NOP, ORA, PHA, PHP, PLA, PLP, ROL, ROR, RTI,
    RTS, SBC, SEC, SED, SEI, STA, STX, STY, TAX, TAY, TSX, TXA, TXS, TYA,
    // undocumented
    ALR, ANC, ANE, ARR, DCP, ISC, LAS, LAX, LXA, RLA, RRA, SAX, SBX, SHA,
    SHX, SHY, SLO, SRE, TAS, USBC,
    Unknown,
}

/// How an instruction uses its effective address, which decides the shape of its bus cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Reads memory (or the immediate byte) then works on the data latch.
    Read,
    /// Writes a register-derived value.
    Write,
    /// Read, dummy write of the old value, write of the new value.
    Modify,
    /// Control flow and stack instructions with bespoke sequences.
    Special,
    /// Register-only work after a dummy read of the next byte.
    Internal,
}

impl Mnemonic {
    pub fn access(self) -> Access {
        use Mnemonic::*;
        match self {
            ADC | AND | BIT | CMP | CPX | CPY | EOR | LDA | LDX | LDY | ORA | SBC | NOP | ALR
            | ANC | ANE | ARR | LAS | LAX | LXA | SBX | USBC => Access::Read,
            STA | STX | STY | SAX | SHA | SHX | SHY | TAS => Access::Write,
            ASL | LSR | ROL | ROR | INC | DEC | SLO | RLA | SRE | RRA | DCP | ISC => Access::Modify,
            BCC | BCS | BEQ | BMI | BNE | BPL | BVC | BVS | BRK | JMP | JSR | RTI | RTS | PHA
            | PHP | PLA | PLP => Access::Special,
            CLC | CLD | CLI | CLV | DEX | DEY | INX | INY | SEC | SED | SEI | TAX | TAY | TSX
            | TXA | TXS | TYA | Unknown => Access::Internal,
        }
    }

    pub fn is_documented(self) -> bool {
        use Mnemonic::*;
        !matches!(
            self,
            ALR | ANC | ANE | ARR | DCP | ISC | LAS | LAX | LXA | RLA | RRA | SAX | SBX | SHA
                | SHX | SHY | SLO | SRE | TAS | USBC | Unknown
        )
    }
}

/// One row of the decode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrDef {
    pub mnemonic: Mnemonic,
    pub mode: AddrMode,
    pub size: u8,
    /// Cycle count without page-crossing or branch-taken penalties.
    pub cycles: u8,
}

impl InstrDef {
    pub const fn new(mnemonic: Mnemonic, mode: AddrMode, cycles: u8) -> Self {
        Self {
            mnemonic,
            mode,
            size: mode.size(),
            cycles,
        }
    }

    /// Placeholder for opcodes with no defined effect.
    pub const UNKNOWN: InstrDef = InstrDef::new(Mnemonic::Unknown, AddrMode::Implied, 2);
}
