use super::instr_def::Mnemonic;
use super::status::Status;
use super::MOS6502;
use crate::hardware::Bus;
use crate::{EmuError, Result};

/// Index register used by an indexed addressing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexReg {
    X,
    Y,
}

/// Branch conditions, one per branch opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Plus,
    Minus,
    OverflowClear,
    OverflowSet,
    CarryClear,
    CarrySet,
    NotEqual,
    Equal,
}

impl Condition {
    pub fn for_branch(m: Mnemonic) -> Option<Self> {
        Some(match m {
            Mnemonic::BPL => Condition::Plus,
            Mnemonic::BMI => Condition::Minus,
            Mnemonic::BVC => Condition::OverflowClear,
            Mnemonic::BVS => Condition::OverflowSet,
            Mnemonic::BCC => Condition::CarryClear,
            Mnemonic::BCS => Condition::CarrySet,
            Mnemonic::BNE => Condition::NotEqual,
            Mnemonic::BEQ => Condition::Equal,
            _ => return None,
        })
    }

    fn holds(self, p: Status) -> bool {
        match self {
            Condition::Plus => !p.contains(Status::NEGATIVE),
            Condition::Minus => p.contains(Status::NEGATIVE),
            Condition::OverflowClear => !p.contains(Status::OVERFLOW),
            Condition::OverflowSet => p.contains(Status::OVERFLOW),
            Condition::CarryClear => !p.contains(Status::CARRY),
            Condition::CarrySet => p.contains(Status::CARRY),
            Condition::NotEqual => !p.contains(Status::ZERO),
            Condition::Equal => p.contains(Status::ZERO),
        }
    }
}

/// Byte sources for a stack push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackByte {
    A,
    Pch,
    Pcl,
    /// P with B set (PHP, BRK).
    StatusBrk,
    /// P with B clear (IRQ, NMI).
    StatusIrq,
}

/// One cycle's worth of CPU work.
///
/// Naming: `ea` is the effective address latch, the "pointer" is the address latch used by the
/// indirect modes, `DL` is the data latch. Everything touches the bus exactly once except the
/// two free operations, `Execute` and `JumpToEa`, which ride along with whatever cycle follows
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroOp {
    // -------- //
    // FETCHERS //
    // -------- //
    /// DL = [PC++]
    FetchOperand,
    /// ea = 00:[PC++]
    FetchZeroPage,
    /// ea.lo = [PC++]
    FetchEaLo,
    /// ea.hi = [PC++]
    FetchEaHi,
    /// ea.hi = [PC++], then ea.lo += index. The carry is remembered, not applied.
    FetchEaHiIndexed(IndexReg),
    /// pointer = 00:[PC++]
    FetchPointer,
    /// pointer.lo = [PC++]
    FetchPointerLo,
    /// pointer.hi = [PC++]
    FetchPointerHi,
    /// Read [PC] and throw it away.
    DummyReadPc,
    /// Read [PC], then PC++ (last cycle of RTS).
    IncrementPcRead,

    // ---------- //
    // ADDRESSING //
    // ---------- //
    /// Dummy read of the unindexed zero-page address, then ea.lo += index within page zero.
    ZeroPageIndex(IndexReg),
    /// Dummy read of the pointer, then pointer.lo += X within page zero.
    PointerIndex,
    /// ea.lo = [00:pointer.lo]
    ReadPointerLo,
    /// ea.hi = [00:pointer.lo + 1], wrapping inside page zero.
    ReadPointerHi,
    /// As `ReadPointerHi`, then ea.lo += Y with the carry remembered.
    ReadPointerHiIndexed,
    /// ea.lo = [pointer]
    ReadIndirectLo,
    /// ea.hi = [pointer.hi:pointer.lo + 1]. The carry out of the low byte is dropped, which is
    /// the JMP ($xxFF) bug.
    ReadIndirectHi,

    // ------------- //
    // MEMORY ACCESS //
    // ------------- //
    /// DL = [ea] with the high byte possibly one page short. Drops the following `FixupRead`
    /// when the index did not carry.
    ReadIndexed,
    /// ea.hi += 1, DL = [ea].
    FixupRead,
    /// Read the uncorrected address, then apply the carry. Stores and read-modify-writes always
    /// pay this cycle.
    DummyReadIndexed,
    /// DL = [ea]
    Read,
    /// [ea] = register value for the store instruction.
    Store(Mnemonic),
    /// [ea] = DL, the unmodified value a read-modify-write writes back first.
    DummyWrite,
    /// DL = f(DL), [ea] = DL
    Modify(Mnemonic),
    /// Register/ALU work on DL. Free.
    Execute(Mnemonic),

    // ----- //
    // STACK //
    // ----- //
    /// [01:S] = byte, S--
    Push(StackByte),
    /// Read [01:S], S-- (reset's suppressed pushes).
    ReadStackDecrement,
    /// Read [01:S], S++
    ReadStackIncrement,
    /// Read [01:S]
    DummyReadStack,
    /// P = [01:S], S++
    PullStatus,
    /// ea.lo = [01:S], S++
    PullEaLo,
    /// ea.hi = [01:S]
    PullEaHi,
    /// DL = [01:S]
    PullData,

    // ------------ //
    // CONTROL FLOW //
    // ------------ //
    /// ea.lo = [vector], I = 1
    ReadVectorLo(u16),
    /// ea.hi = [vector + 1]
    ReadVectorHi(u16),
    /// PC = ea. Free.
    JumpToEa,
    /// DL = [PC++]. Drops the rest of the branch when the condition fails.
    FetchBranch(Condition),
    /// Dummy read of [PC], then PC.lo += offset. Drops `BranchFixup` when the page holds.
    BranchTake,
    /// Dummy read from the wrong page, then PC.hi is corrected.
    BranchFixup,
}

impl MicroOp {
    /// Whether this op occupies a bus cycle of its own.
    pub fn takes_cycle(self) -> bool {
        !matches!(self, MicroOp::Execute(_) | MicroOp::JumpToEa)
    }
}

/// Value ANE and LXA OR into A before masking. Chip dependent; 0xEE is the common NMOS value.
const UNSTABLE_MAGIC: u8 = 0xEE;

impl<B: Bus> MOS6502<B> {
    /// Performs one micro-op against the bus.
    pub(crate) fn execute(&mut self, op: MicroOp) -> Result<()> {
        use MicroOp::*;
        match op {
            FetchOperand => self.state.data_latch = self.fetch_pc()?,
            FetchZeroPage => {
                self.state.ea_lo = self.fetch_pc()?;
                self.state.ea_hi = 0;
            }
            FetchEaLo => self.state.ea_lo = self.fetch_pc()?,
            FetchEaHi => self.state.ea_hi = self.fetch_pc()?,
            FetchEaHiIndexed(reg) => {
                self.state.ea_hi = self.fetch_pc()?;
                self.index_ea(reg);
            }
            FetchPointer => {
                self.state.addr_lo = self.fetch_pc()?;
                self.state.addr_hi = 0;
            }
            FetchPointerLo => self.state.addr_lo = self.fetch_pc()?,
            FetchPointerHi => self.state.addr_hi = self.fetch_pc()?,
            DummyReadPc => {
                self.bus.read(self.program_counter)?;
            }
            IncrementPcRead => {
                self.fetch_pc()?;
            }

            ZeroPageIndex(reg) => {
                self.bus.read(self.state.ea())?;
                self.state.ea_lo = self.state.ea_lo.wrapping_add(self.index(reg));
            }
            PointerIndex => {
                self.bus.read(self.state.addr_lo as u16)?;
                self.state.addr_lo = self.state.addr_lo.wrapping_add(self.x);
            }
            ReadPointerLo => self.state.ea_lo = self.bus.read(self.state.addr_lo as u16)?,
            ReadPointerHi => {
                self.state.ea_hi = self.bus.read(self.state.addr_lo.wrapping_add(1) as u16)?;
            }
            ReadPointerHiIndexed => {
                self.state.ea_hi = self.bus.read(self.state.addr_lo.wrapping_add(1) as u16)?;
                self.index_ea(IndexReg::Y);
            }
            ReadIndirectLo => self.state.ea_lo = self.bus.read(self.state.addr())?,
            ReadIndirectHi => {
                let pointer = u16::from_le_bytes([self.state.addr_lo.wrapping_add(1), self.state.addr_hi]);
                self.state.ea_hi = self.bus.read(pointer)?;
            }

            ReadIndexed => {
                self.state.data_latch = self.bus.read(self.state.ea())?;
                if !self.state.page_carry {
                    self.skip(FixupRead);
                }
            }
            FixupRead => {
                self.state.ea_hi = self.state.ea_hi.wrapping_add(1);
                self.state.data_latch = self.bus.read(self.state.ea())?;
            }
            DummyReadIndexed => {
                self.bus.read(self.state.ea())?;
                if self.state.page_carry {
                    self.state.ea_hi = self.state.ea_hi.wrapping_add(1);
                }
            }
            Read => self.state.data_latch = self.bus.read(self.state.ea())?,
            Store(m) => {
                let value = self.store_value(m)?;
                self.bus.write(self.state.ea(), value)?;
            }
            DummyWrite => self.bus.write(self.state.ea(), self.state.data_latch)?,
            Modify(m) => {
                self.state.data_latch = self.modify(m, self.state.data_latch)?;
                self.bus.write(self.state.ea(), self.state.data_latch)?;
            }
            Execute(m) => self.alu(m)?,

            Push(byte) => {
                let [pcl, pch] = self.program_counter.to_le_bytes();
                let value = match byte {
                    StackByte::A => self.a,
                    StackByte::Pch => pch,
                    StackByte::Pcl => pcl,
                    StackByte::StatusBrk => self.status.to_stack_brk(),
                    StackByte::StatusIrq => self.status.to_stack_irq(),
                };
                self.bus.write(self.stack_addr(), value)?;
                self.stack_ptr = self.stack_ptr.wrapping_sub(1);
            }
            ReadStackDecrement => {
                self.bus.read(self.stack_addr())?;
                self.stack_ptr = self.stack_ptr.wrapping_sub(1);
            }
            ReadStackIncrement => {
                self.bus.read(self.stack_addr())?;
                self.stack_ptr = self.stack_ptr.wrapping_add(1);
            }
            DummyReadStack => {
                self.bus.read(self.stack_addr())?;
            }
            PullStatus => {
                self.status = Status::from_stack(self.bus.read(self.stack_addr())?);
                self.stack_ptr = self.stack_ptr.wrapping_add(1);
            }
            PullEaLo => {
                self.state.ea_lo = self.bus.read(self.stack_addr())?;
                self.stack_ptr = self.stack_ptr.wrapping_add(1);
            }
            PullEaHi => self.state.ea_hi = self.bus.read(self.stack_addr())?,
            PullData => self.state.data_latch = self.bus.read(self.stack_addr())?,

            ReadVectorLo(vector) => {
                self.state.ea_lo = self.bus.read(vector)?;
                self.status.insert(Status::INTERRUPT);
            }
            ReadVectorHi(vector) => self.state.ea_hi = self.bus.read(vector.wrapping_add(1))?,
            JumpToEa => self.program_counter = self.state.ea(),
            FetchBranch(condition) => {
                self.state.data_latch = self.fetch_pc()?;
                if !condition.holds(self.status) {
                    self.skip(BranchTake);
                    self.skip(BranchFixup);
                }
            }
            BranchTake => {
                self.bus.read(self.program_counter)?;
                let [_, pch] = self.program_counter.to_le_bytes();
                let target = self
                    .program_counter
                    .wrapping_add(self.state.data_latch as i8 as u16);
                let [target_lo, target_hi] = target.to_le_bytes();
                self.program_counter = u16::from_le_bytes([target_lo, pch]);
                self.state.ea_hi = target_hi;
                if target_hi == pch {
                    self.skip(BranchFixup);
                }
            }
            BranchFixup => {
                self.bus.read(self.program_counter)?;
                let [pcl, _] = self.program_counter.to_le_bytes();
                self.program_counter = u16::from_le_bytes([pcl, self.state.ea_hi]);
            }
        }
        Ok(())
    }

    /// Dequeues an op the current one has made unnecessary.
    fn skip(&mut self, expected: MicroOp) {
        let skipped = self.state.u_op_queue.pop_front();
        debug_assert_eq!(skipped, Some(expected), "micro-op queue out of step");
    }

    /// Retrieves the next byte in the program, and increments the program counter.
    pub(crate) fn fetch_pc(&mut self) -> Result<u8> {
        let result = self.bus.read(self.program_counter)?;
        self.program_counter = self.program_counter.wrapping_add(1);
        Ok(result)
    }

    fn index(&self, reg: IndexReg) -> u8 {
        match reg {
            IndexReg::X => self.x,
            IndexReg::Y => self.y,
        }
    }

    /// Adds an index to the low byte of the effective address only.
    fn index_ea(&mut self, reg: IndexReg) {
        let (lo, carry) = self.state.ea_lo.overflowing_add(self.index(reg));
        self.state.ea_lo = lo;
        self.state.page_carry = carry;
    }

    fn stack_addr(&self) -> u16 {
        0x0100 | self.stack_ptr as u16
    }

    // ------- //
    // STORERS //
    // ------- //

    /// Value written by a store. The SHx family ANDs with the base page + 1 and, when the index
    /// crossed a page, that same value replaces the high byte of the address.
    fn store_value(&mut self, m: Mnemonic) -> Result<u8> {
        Ok(match m {
            Mnemonic::STA => self.a,
            Mnemonic::STX => self.x,
            Mnemonic::STY => self.y,
            Mnemonic::SAX => self.a & self.x,
            Mnemonic::SHA => self.unstable_store(self.a & self.x),
            Mnemonic::SHX => self.unstable_store(self.x),
            Mnemonic::SHY => self.unstable_store(self.y),
            Mnemonic::TAS => {
                self.stack_ptr = self.a & self.x;
                self.unstable_store(self.stack_ptr)
            }
            _ => return Err(self.mismatched_op()),
        })
    }

    fn unstable_store(&mut self, reg: u8) -> u8 {
        let base_hi = self.state.ea_hi.wrapping_sub(self.state.page_carry as u8);
        let value = reg & base_hi.wrapping_add(1);
        if self.state.page_carry {
            self.state.ea_hi = value;
        }
        value
    }

    // ----------------- //
    // READ-MODIFY-WRITE //
    // ----------------- //

    fn modify(&mut self, m: Mnemonic, value: u8) -> Result<u8> {
        Ok(match m {
            Mnemonic::ASL => self.asl(value),
            Mnemonic::LSR => self.lsr(value),
            Mnemonic::ROL => self.rol(value),
            Mnemonic::ROR => self.ror(value),
            Mnemonic::INC => {
                let r = value.wrapping_add(1);
                self.status.set_nz(r);
                r
            }
            Mnemonic::DEC => {
                let r = value.wrapping_sub(1);
                self.status.set_nz(r);
                r
            }
            Mnemonic::SLO => {
                let r = self.asl(value);
                self.a |= r;
                self.status.set_nz(self.a);
                r
            }
            Mnemonic::RLA => {
                let r = self.rol(value);
                self.a &= r;
                self.status.set_nz(self.a);
                r
            }
            Mnemonic::SRE => {
                let r = self.lsr(value);
                self.a ^= r;
                self.status.set_nz(self.a);
                r
            }
            Mnemonic::RRA => {
                let r = self.ror(value);
                self.adc(r);
                r
            }
            Mnemonic::DCP => {
                let r = value.wrapping_sub(1);
                self.compare(self.a, r);
                r
            }
            Mnemonic::ISC => {
                let r = value.wrapping_add(1);
                self.sbc(r);
                r
            }
            _ => return Err(self.mismatched_op()),
        })
    }

    // --- //
    // ALU //
    // --- //

    /// Register-side half of an instruction, run as the free tail of its sequence.
    fn alu(&mut self, m: Mnemonic) -> Result<()> {
        let dl = self.state.data_latch;
        match m {
            Mnemonic::LDA | Mnemonic::PLA => self.a = self.nz(dl),
            Mnemonic::LDX => self.x = self.nz(dl),
            Mnemonic::LDY => self.y = self.nz(dl),
            Mnemonic::LAX => {
                self.a = self.nz(dl);
                self.x = dl;
            }
            Mnemonic::PLP => self.status = Status::from_stack(dl),
            Mnemonic::AND => self.a = self.nz(self.a & dl),
            Mnemonic::ORA => self.a = self.nz(self.a | dl),
            Mnemonic::EOR => self.a = self.nz(self.a ^ dl),
            Mnemonic::ADC => self.adc(dl),
            Mnemonic::SBC | Mnemonic::USBC => self.sbc(dl),
            Mnemonic::CMP => self.compare(self.a, dl),
            Mnemonic::CPX => self.compare(self.x, dl),
            Mnemonic::CPY => self.compare(self.y, dl),
            Mnemonic::BIT => {
                self.status.set(Status::ZERO, self.a & dl == 0);
                self.status.set(Status::NEGATIVE, dl & 0x80 != 0);
                self.status.set(Status::OVERFLOW, dl & 0x40 != 0);
            }
            Mnemonic::ASL => self.a = self.asl(self.a),
            Mnemonic::LSR => self.a = self.lsr(self.a),
            Mnemonic::ROL => self.a = self.rol(self.a),
            Mnemonic::ROR => self.a = self.ror(self.a),

            Mnemonic::CLC => self.status.remove(Status::CARRY),
            Mnemonic::SEC => self.status.insert(Status::CARRY),
            Mnemonic::CLI => self.status.remove(Status::INTERRUPT),
            Mnemonic::SEI => self.status.insert(Status::INTERRUPT),
            Mnemonic::CLD => self.status.remove(Status::DECIMAL),
            Mnemonic::SED => self.status.insert(Status::DECIMAL),
            Mnemonic::CLV => self.status.remove(Status::OVERFLOW),

            Mnemonic::TAX => self.x = self.nz(self.a),
            Mnemonic::TAY => self.y = self.nz(self.a),
            Mnemonic::TXA => self.a = self.nz(self.x),
            Mnemonic::TYA => self.a = self.nz(self.y),
            Mnemonic::TSX => self.x = self.nz(self.stack_ptr),
            Mnemonic::TXS => self.stack_ptr = self.x,
            Mnemonic::INX => self.x = self.nz(self.x.wrapping_add(1)),
            Mnemonic::INY => self.y = self.nz(self.y.wrapping_add(1)),
            Mnemonic::DEX => self.x = self.nz(self.x.wrapping_sub(1)),
            Mnemonic::DEY => self.y = self.nz(self.y.wrapping_sub(1)),

            Mnemonic::ANC => {
                self.a = self.nz(self.a & dl);
                self.status.set(Status::CARRY, self.a & 0x80 != 0);
            }
            Mnemonic::ALR => self.a = self.lsr(self.a & dl),
            Mnemonic::ARR => self.arr(dl),
            Mnemonic::SBX => {
                let ax = self.a & self.x;
                self.status.set(Status::CARRY, ax >= dl);
                self.x = self.nz(ax.wrapping_sub(dl));
            }
            Mnemonic::ANE => self.a = self.nz((self.a | UNSTABLE_MAGIC) & self.x & dl),
            Mnemonic::LXA => {
                self.a = self.nz((self.a | UNSTABLE_MAGIC) & dl);
                self.x = self.a;
            }
            Mnemonic::LAS => {
                let v = dl & self.stack_ptr;
                self.a = self.nz(v);
                self.x = v;
                self.stack_ptr = v;
            }
            Mnemonic::NOP | Mnemonic::Unknown => {}
            _ => return Err(self.mismatched_op()),
        }
        Ok(())
    }

    /// A micro-op whose mnemonic does not fit its step means the decode table and the
    /// sequence builder disagree about the opcode in flight.
    fn mismatched_op(&self) -> EmuError {
        let opcode = self.state.opcode;
        EmuError::UndefinedMode {
            opcode,
            mode: self.instructions.get(opcode).mode,
        }
    }

    /// Update N and Z flags and pass the value through.
    fn nz(&mut self, value: u8) -> u8 {
        self.status.set_nz(value);
        value
    }

    fn asl(&mut self, v: u8) -> u8 {
        self.status.set(Status::CARRY, v & 0x80 != 0);
        self.nz(v << 1)
    }

    fn lsr(&mut self, v: u8) -> u8 {
        self.status.set(Status::CARRY, v & 0x01 != 0);
        self.nz(v >> 1)
    }

    fn rol(&mut self, v: u8) -> u8 {
        let carry_in = self.status.contains(Status::CARRY) as u8;
        self.status.set(Status::CARRY, v & 0x80 != 0);
        self.nz((v << 1) | carry_in)
    }

    fn ror(&mut self, v: u8) -> u8 {
        let carry_in = (self.status.contains(Status::CARRY) as u8) << 7;
        self.status.set(Status::CARRY, v & 0x01 != 0);
        self.nz((v >> 1) | carry_in)
    }

    fn compare(&mut self, reg: u8, v: u8) {
        self.status.set(Status::CARRY, reg >= v);
        self.status.set_nz(reg.wrapping_sub(v));
    }

    /// NMOS ADC. In decimal mode Z comes from the binary sum and N/V from the intermediate
    /// high nibble, matching the die rather than the datasheet.
    fn adc(&mut self, v: u8) {
        let a = self.a;
        let carry = self.status.contains(Status::CARRY) as u16;
        let binary = a as u16 + v as u16 + carry;

        if !self.status.contains(Status::DECIMAL) {
            self.status.set(Status::CARRY, binary > 0xFF);
            self.status
                .set(Status::OVERFLOW, (!(a ^ v) & (a ^ binary as u8)) & 0x80 != 0);
            self.a = self.nz(binary as u8);
            return;
        }

        let mut lo = (a & 0x0F) as u16 + (v & 0x0F) as u16 + carry;
        if lo > 0x09 {
            lo += 0x06;
        }
        let mut hi = (a >> 4) as u16 + (v >> 4) as u16 + (lo > 0x0F) as u16;
        self.status.set(Status::ZERO, binary as u8 == 0);
        self.status.set(Status::NEGATIVE, hi & 0x08 != 0);
        self.status.set(
            Status::OVERFLOW,
            ((hi << 4) as u8 ^ a) & 0x80 != 0 && (a ^ v) & 0x80 == 0,
        );
        if hi > 0x09 {
            hi += 0x06;
        }
        self.status.set(Status::CARRY, hi > 0x0F);
        self.a = ((hi << 4) as u8) | (lo as u8 & 0x0F);
    }

    /// NMOS SBC. Flags always come from the binary difference.
    fn sbc(&mut self, v: u8) {
        let a = self.a;
        let borrow = !self.status.contains(Status::CARRY) as i16;
        let binary = a as i16 - v as i16 - borrow;
        let result = binary as u8;

        self.status.set(Status::CARRY, binary >= 0);
        self.status
            .set(Status::OVERFLOW, ((a ^ v) & (a ^ result)) & 0x80 != 0);
        self.status.set_nz(result);

        if !self.status.contains(Status::DECIMAL) {
            self.a = result;
            return;
        }

        let mut lo = (a & 0x0F) as i16 - (v & 0x0F) as i16 - borrow;
        let mut hi = (a >> 4) as i16 - (v >> 4) as i16;
        if lo < 0 {
            lo -= 0x06;
            hi -= 1;
        }
        if hi < 0 {
            hi -= 0x06;
        }
        self.a = ((hi << 4) as u8) | (lo as u8 & 0x0F);
    }

    fn arr(&mut self, v: u8) {
        let t = self.a & v;
        let carry_in = self.status.contains(Status::CARRY);
        let mut r = (t >> 1) | ((carry_in as u8) << 7);
        self.status.set(Status::NEGATIVE, carry_in);
        self.status.set(Status::ZERO, r == 0);

        if !self.status.contains(Status::DECIMAL) {
            self.status.set(Status::CARRY, r & 0x40 != 0);
            self.status
                .set(Status::OVERFLOW, ((r >> 6) ^ (r >> 5)) & 0x01 != 0);
            self.a = r;
            return;
        }

        self.status.set(Status::OVERFLOW, (r ^ t) & 0x40 != 0);
        if (t & 0x0F) + (t & 0x01) > 0x05 {
            r = (r & 0xF0) | (r.wrapping_add(0x06) & 0x0F);
        }
        let fix_high = (t as u16 & 0xF0) + (t as u16 & 0x10) > 0x50;
        self.status.set(Status::CARRY, fix_high);
        if fix_high {
            r = r.wrapping_add(0x60);
        }
        self.a = r;
    }
}
