use bitflags::bitflags;

bitflags! {
    /// Processor status register (P).
    ///
    /// `BREAK` and `UNUSED` have no storage on the die: `UNUSED` always reads back set, and
    /// `BREAK` only exists in the copy of P pushed to the stack.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        const CARRY     = 0b0000_0001;
        const ZERO      = 0b0000_0010;
        const INTERRUPT = 0b0000_0100;
        const DECIMAL   = 0b0000_1000;
        const BREAK     = 0b0001_0000;
        const UNUSED    = 0b0010_0000;
        const OVERFLOW  = 0b0100_0000;
        const NEGATIVE  = 0b1000_0000;
    }
}

impl Status {
    /// Status as loaded by PLP/RTI: B dropped, U forced.
    pub fn from_stack(byte: u8) -> Self {
        (Self::from_bits_retain(byte) - Self::BREAK) | Self::UNUSED
    }

    /// Byte pushed by PHP and BRK.
    pub fn to_stack_brk(self) -> u8 {
        (self | Self::BREAK | Self::UNUSED).bits()
    }

    /// Byte pushed by IRQ and NMI.
    pub fn to_stack_irq(self) -> u8 {
        ((self | Self::UNUSED) - Self::BREAK).bits()
    }

    pub fn set_nz(&mut self, value: u8) {
        self.set(Self::NEGATIVE, value & 0x80 != 0);
        self.set(Self::ZERO, value == 0);
    }

    /// `NV-BDIZC`, upper case for set flags.
    pub fn display(self) -> String {
        const NAMES: [(Status, char); 8] = [
            (Status::NEGATIVE, 'N'),
            (Status::OVERFLOW, 'V'),
            (Status::UNUSED, '-'),
            (Status::BREAK, 'B'),
            (Status::DECIMAL, 'D'),
            (Status::INTERRUPT, 'I'),
            (Status::ZERO, 'Z'),
            (Status::CARRY, 'C'),
        ];
        NAMES
            .iter()
            .map(|&(flag, c)| if self.contains(flag) { c } else { c.to_ascii_lowercase() })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_images() {
        let p = Status::CARRY | Status::NEGATIVE;
        assert_eq!(p.to_stack_brk(), 0xB1);
        assert_eq!(p.to_stack_irq(), 0xA1);
        assert_eq!(Status::from_stack(0xFF).bits(), 0xEF);
    }

    #[test]
    fn display_marks_set_flags() {
        let p = Status::from_stack(0x83);
        assert_eq!(p.display(), "Nv-bdiZC");
    }
}
