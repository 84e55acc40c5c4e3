use crate::{EmuError, Result};

/// Fixed-capacity RAM. Addresses past the end are an error rather than a wrap, so a bad mirror
/// mask in a memory map shows up immediately.
pub struct WorkMemory {
    memory: Vec<u8>,
}

impl WorkMemory {
    /// 2 KiB, the size of the NES work RAM.
    pub fn new() -> Self {
        Self::with_capacity(0x800)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            memory: vec![0; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    pub fn read(&self, addr: u16) -> Result<u8> {
        self.memory
            .get(addr as usize)
            .copied()
            .ok_or(EmuError::OutOfRange { address: addr, capacity: self.memory.len() })
    }

    pub fn write(&mut self, addr: u16, value: u8) -> Result<()> {
        let capacity = self.memory.len();
        let cell = self
            .memory
            .get_mut(addr as usize)
            .ok_or(EmuError::OutOfRange { address: addr, capacity })?;
        *cell = value;
        Ok(())
    }
}

impl Default for WorkMemory {
    fn default() -> Self {
        Self::new()
    }
}
