use std::collections::BTreeMap;

use crate::Result;
use crate::hardware::WorkMemory;

/// 6502 MEMORY BUS
///
/// The only path either engine has to memory or devices. Both the micro-op CPU and the
/// transistor-level chip perform exactly one `read` or `write` per bus cycle through this trait;
/// what sits behind an address is the implementor's business.
///
/// A backing store that cannot hold an address reports `EmuError::OutOfRange`. Stores that cover
/// the whole 16-bit space never fail.
pub trait Bus {
    fn read(&mut self, address: u16) -> Result<u8>;
    fn write(&mut self, address: u16, value: u8) -> Result<()>;
}

impl<B: Bus + ?Sized> Bus for &mut B {
    fn read(&mut self, address: u16) -> Result<u8> {
        (**self).read(address)
    }
    fn write(&mut self, address: u16, value: u8) -> Result<()> {
        (**self).write(address, value)
    }
}

/// Flat 64 KiB RAM covering the entire address space. Used by tests, the CLI and the
/// cross-checker.
#[derive(Clone)]
pub struct FlatMemory {
    mem: Box<[u8; 0x10000]>,
}

impl FlatMemory {
    pub fn new() -> Self {
        Self {
            mem: Box::new([0; 0x10000]),
        }
    }

    /// Copies `bytes` in starting at `address`, wrapping past $FFFF.
    pub fn load(&mut self, address: u16, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.mem[address.wrapping_add(i as u16) as usize] = b;
        }
    }

    /// Stores a little-endian word, as the CPU expects for vectors.
    pub fn set_word(&mut self, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.mem[address as usize] = lo;
        self.mem[address.wrapping_add(1) as usize] = hi;
    }

    pub fn peek(&self, address: u16) -> u8 {
        self.mem[address as usize]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mem[..]
    }
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for FlatMemory {
    fn read(&mut self, address: u16) -> Result<u8> {
        Ok(self.mem[address as usize])
    }
    fn write(&mut self, address: u16, value: u8) -> Result<()> {
        self.mem[address as usize] = value;
        Ok(())
    }
}

/// Small machine map: 2 KiB of work RAM mirrored up to $1FFF (the way the NES wires it) and a
/// read-only image at the top of the address space.
pub struct MappedBus {
    ram: WorkMemory,
    rom: Vec<u8>,
    rom_base: u16,
}

impl MappedBus {
    pub fn new(ram: WorkMemory, rom: Vec<u8>, rom_base: u16) -> Self {
        Self { ram, rom, rom_base }
    }
}

impl Bus for MappedBus {
    fn read(&mut self, address: u16) -> Result<u8> {
        match address {
            0x0000..=0x1FFF => self.ram.read(address & 0x07FF),
            a if a >= self.rom_base => Ok(self
                .rom
                .get((a - self.rom_base) as usize)
                .copied()
                .unwrap_or(0)),
            _ => Ok(0),
        }
    }
    fn write(&mut self, address: u16, value: u8) -> Result<()> {
        match address {
            0x0000..=0x1FFF => self.ram.write(address & 0x07FF, value),
            // ROM and unmapped space ignore writes
            _ => Ok(()),
        }
    }
}

/// Wraps another bus and tracks how memory differs from the image it started with.
///
/// The first write to an address remembers the byte that was there. [`RecordingBus::writes`]
/// holds the current value of every address whose content now differs from that byte, so a
/// store of an unchanged value, or a later store that restores the original, leaves no entry.
pub struct RecordingBus<B> {
    inner: B,
    original: BTreeMap<u16, u8>,
    writes: BTreeMap<u16, u8>,
}

impl<B: Bus> RecordingBus<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            original: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Address to value for every byte that changed.
    pub fn writes(&self) -> &BTreeMap<u16, u8> {
        &self.writes
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: Bus> Bus for RecordingBus<B> {
    fn read(&mut self, address: u16) -> Result<u8> {
        self.inner.read(address)
    }
    fn write(&mut self, address: u16, value: u8) -> Result<()> {
        let original = match self.original.get(&address) {
            Some(&byte) => byte,
            None => {
                let byte = self.inner.read(address)?;
                self.original.insert(address, byte);
                byte
            }
        };
        if value == original {
            self.writes.remove(&address);
        } else {
            self.writes.insert(address, value);
        }
        self.inner.write(address, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_memory_load_wraps_at_top_of_address_space() {
        let mut mem = FlatMemory::new();
        mem.load(0xFFFF, &[0x11, 0x22]);
        assert_eq!(mem.peek(0xFFFF), 0x11);
        assert_eq!(mem.peek(0x0000), 0x22);
    }

    #[test]
    fn mapped_bus_mirrors_work_ram() {
        let mut bus = MappedBus::new(WorkMemory::new(), vec![0xEA; 0x100], 0xFF00);
        bus.write(0x0002, 0x5A).unwrap();
        assert_eq!(bus.read(0x0802).unwrap(), 0x5A);
        assert_eq!(bus.read(0x1802).unwrap(), 0x5A);
        assert_eq!(bus.read(0xFF10).unwrap(), 0xEA);
        assert_eq!(bus.read(0x4000).unwrap(), 0x00);
    }

    #[test]
    fn recording_bus_keeps_last_write() {
        let mut bus = RecordingBus::new(FlatMemory::new());
        bus.write(0x0200, 1).unwrap();
        bus.write(0x0200, 2).unwrap();
        bus.write(0x0300, 3).unwrap();
        assert_eq!(bus.writes().len(), 2);
        assert_eq!(bus.writes()[&0x0200], 2);
        assert_eq!(bus.inner().peek(0x0300), 3);
    }

    #[test]
    fn recording_bus_ignores_bytes_that_end_unchanged() {
        let mut mem = FlatMemory::new();
        mem.load(0x0200, &[0x7F, 0x10]);
        let mut bus = RecordingBus::new(mem);
        bus.write(0x0200, 0x7F).unwrap();
        bus.write(0x0201, 0x11).unwrap();
        bus.write(0x0201, 0x10).unwrap();
        bus.write(0x0202, 0x00).unwrap();
        assert!(bus.writes().is_empty());

        bus.write(0x0201, 0x12).unwrap();
        assert_eq!(bus.writes().len(), 1);
        assert_eq!(bus.writes()[&0x0201], 0x12);
    }
}
