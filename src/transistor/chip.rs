use log::{debug, trace};

use crate::hardware::cpu::status::Status;
use crate::hardware::cpu::Registers;
use crate::hardware::Bus;
use crate::transistor::netlist::{Netlist, NodeId};
use crate::transistor::sim::{SimConfig, Simulator};
use crate::Result;

/// Node ids of the pins and register bits the chip wrapper touches, resolved once by name.
#[derive(Debug, Clone)]
struct Pins {
    clk0: NodeId,
    res: NodeId,
    rw: NodeId,
    rdy: NodeId,
    so: NodeId,
    irq: NodeId,
    nmi: NodeId,
    ab: [NodeId; 16],
    db: [NodeId; 8],
    a: [NodeId; 8],
    x: [NodeId; 8],
    y: [NodeId; 8],
    s: [NodeId; 8],
    pcl: [NodeId; 8],
    pch: [NodeId; 8],
    /// Status bits 0-4, 6 and 7. Bit 5 has no storage on the die.
    p: [Option<NodeId>; 8],
}

impl Pins {
    fn resolve(netlist: &Netlist) -> Result<Self> {
        Ok(Self {
            clk0: netlist.node("clk0")?,
            res: netlist.node("res")?,
            rw: netlist.node("rw")?,
            rdy: netlist.node("rdy")?,
            so: netlist.node("so")?,
            irq: netlist.node("irq")?,
            nmi: netlist.node("nmi")?,
            ab: bus_nodes(netlist, "ab")?,
            db: bus_nodes(netlist, "db")?,
            a: bus_nodes(netlist, "a")?,
            x: bus_nodes(netlist, "x")?,
            y: bus_nodes(netlist, "y")?,
            s: bus_nodes(netlist, "s")?,
            pcl: bus_nodes(netlist, "pcl")?,
            pch: bus_nodes(netlist, "pch")?,
            p: {
                let mut p = [None; 8];
                for (bit, slot) in p.iter_mut().enumerate() {
                    if bit != 5 {
                        *slot = Some(netlist.node(&format!("p{bit}"))?);
                    }
                }
                p
            },
        })
    }
}

/// `<prefix>0` .. `<prefix>N-1`, least significant first.
fn bus_nodes<const N: usize>(netlist: &Netlist, prefix: &str) -> Result<[NodeId; N]> {
    let mut ids = [0; N];
    for (bit, id) in ids.iter_mut().enumerate() {
        *id = netlist.node(&format!("{prefix}{bit}"))?;
    }
    Ok(ids)
}

/// Per-half-clock observer used by `init` and `run_start_program`.
pub type Observer<'a, B> = &'a mut dyn FnMut(&Chip<B>);

/// A 6502 simulated at transistor level and wired to a [`Bus`].
///
/// The chip's pins are nodes of the network. Each half clock toggles `clk0` and settles. When
/// `clk0` falls a pending read is served by driving the data pins with the byte at the address;
/// when it rises a pending write is served by sampling them.
pub struct Chip<B> {
    sim: Simulator,
    netlist: Netlist,
    pins: Pins,
    bus: B,
    half_cycles: u64,
}

impl<B: Bus> Chip<B> {
    pub fn new(netlist: Netlist, bus: B, config: SimConfig) -> Result<Self> {
        let pins = Pins::resolve(&netlist)?;
        let sim = Simulator::new(&netlist, config);
        Ok(Self {
            sim,
            netlist,
            pins,
            bus,
            half_cycles: 0,
        })
    }

    /// Powers the chip up and holds it in reset for eight clocks, then releases reset.
    ///
    /// The reset clocks only toggle `clk0`; the bus is not served until reset is released.
    /// The CPU then needs [`Chip::run_start_program`] before its first opcode fetch.
    pub fn init(&mut self, mut observer: Option<Observer<'_, B>>) -> Result<()> {
        debug!(target: "chip", "power on");
        let pins = &self.pins;
        self.sim.drive_many(&[
            (pins.res, false),
            (pins.clk0, false),
            (pins.rdy, true),
            (pins.so, false),
            (pins.irq, true),
            (pins.nmi, true),
        ])?;
        self.sim.settle_all()?;

        for _ in 0..16 {
            let clk = self.sim.state(self.pins.clk0);
            self.sim.drive(self.pins.clk0, !clk)?;
            if let Some(observer) = observer.as_mut() {
                observer(self);
            }
        }

        self.sim.drive(self.pins.res, true)?;
        self.half_cycles = 0;
        debug!(target: "chip", "reset released");
        Ok(())
    }

    /// Clocks through the reset microcode: nine full cycles and a half, which leaves the chip
    /// about to fetch the opcode at the reset vector.
    pub fn run_start_program(&mut self, mut observer: Option<Observer<'_, B>>) -> Result<()> {
        for _ in 0..19 {
            self.half_clock()?;
            if let Some(observer) = observer.as_mut() {
                observer(self);
            }
        }
        self.half_cycles = 0;
        Ok(())
    }

    /// Toggles `clk0` and settles. A falling clock serves a read, a rising clock a write.
    pub fn half_clock(&mut self) -> Result<()> {
        let clk = self.sim.state(self.pins.clk0);
        self.sim.drive(self.pins.clk0, !clk)?;
        if clk {
            self.handle_bus_read()?;
        } else {
            self.handle_bus_write()?;
        }
        self.half_cycles += 1;
        Ok(())
    }

    /// One full clock cycle.
    pub fn clock(&mut self) -> Result<()> {
        self.half_clock()?;
        self.half_clock()
    }

    pub fn execute_cycles(&mut self, count: u64) -> Result<()> {
        for _ in 0..count {
            self.clock()?;
        }
        Ok(())
    }

    fn handle_bus_read(&mut self) -> Result<()> {
        if !self.sim.state(self.pins.rw) {
            return Ok(());
        }
        let address = self.read_address_bus();
        let value = self.bus.read(address)?;
        trace!(target: "chip", "read  {address:04X} = {value:02X}");
        self.write_data_bus(value)
    }

    fn handle_bus_write(&mut self) -> Result<()> {
        if self.sim.state(self.pins.rw) {
            return Ok(());
        }
        let address = self.read_address_bus();
        let value = self.read_data_bus();
        trace!(target: "chip", "write {address:04X} = {value:02X}");
        self.bus.write(address, value)
    }

    fn write_data_bus(&mut self, value: u8) -> Result<()> {
        let mut levels = [(0, false); 8];
        for (bit, (slot, &id)) in levels.iter_mut().zip(&self.pins.db).enumerate() {
            *slot = (id, value & (1 << bit) != 0);
        }
        self.sim.drive_many(&levels)
    }

    fn read_nodes(&self, ids: &[NodeId]) -> u16 {
        ids.iter()
            .rev()
            .fold(0, |acc, &id| (acc << 1) | self.sim.state(id) as u16)
    }

    pub fn read_bit(&self, name: &str) -> Result<bool> {
        Ok(self.sim.state(self.netlist.node(name)?))
    }

    /// Reads `<prefix>0` .. `<prefix>{count-1}` as a little-endian integer.
    pub fn read_bits(&self, prefix: &str, count: usize) -> Result<u32> {
        let mut value = 0;
        for bit in (0..count).rev() {
            value = (value << 1) | self.read_bit(&format!("{prefix}{bit}"))? as u32;
        }
        Ok(value)
    }

    pub fn read_bits8(&self, prefix: &str) -> Result<u8> {
        Ok(self.read_bits(prefix, 8)? as u8)
    }

    /// Forces the named node high or low and settles.
    pub fn write_bit(&mut self, name: &str, high: bool) -> Result<()> {
        let id = self.netlist.node(name)?;
        self.sim.drive(id, high)
    }

    pub fn write_bits(&mut self, prefix: &str, count: usize, value: u32) -> Result<()> {
        let mut levels = Vec::with_capacity(count);
        for bit in 0..count {
            let id = self.netlist.node(&format!("{prefix}{bit}"))?;
            levels.push((id, value & (1 << bit) != 0));
        }
        self.sim.drive_many(&levels)
    }

    pub fn read_address_bus(&self) -> u16 {
        self.read_nodes(&self.pins.ab)
    }

    pub fn read_data_bus(&self) -> u8 {
        self.read_nodes(&self.pins.db) as u8
    }

    pub fn read_a(&self) -> u8 {
        self.read_nodes(&self.pins.a) as u8
    }

    pub fn read_x(&self) -> u8 {
        self.read_nodes(&self.pins.x) as u8
    }

    pub fn read_y(&self) -> u8 {
        self.read_nodes(&self.pins.y) as u8
    }

    pub fn read_sp(&self) -> u8 {
        self.read_nodes(&self.pins.s) as u8
    }

    pub fn read_pc(&self) -> u16 {
        let lo = self.read_nodes(&self.pins.pcl);
        let hi = self.read_nodes(&self.pins.pch);
        (hi << 8) | lo
    }

    /// Status register with bit 5 reading as set.
    pub fn read_p(&self) -> u8 {
        self.pins
            .p
            .iter()
            .enumerate()
            .fold(Status::UNUSED.bits(), |acc, (bit, id)| match id {
                Some(id) if self.sim.state(*id) => acc | (1 << bit),
                _ => acc,
            })
    }

    pub fn registers(&self) -> Registers {
        Registers {
            pc: self.read_pc(),
            a: self.read_a(),
            x: self.read_x(),
            y: self.read_y(),
            s: self.read_sp(),
            p: Status::from_bits_retain(self.read_p()),
        }
    }

    /// Register dump in the usual monitor layout.
    pub fn register_display(&self) -> String {
        format!(
            "PC:{:04X} A:{:02X} X:{:02X} Y:{:02X} S:{:02X} P:{}",
            self.read_pc(),
            self.read_a(),
            self.read_x(),
            self.read_y(),
            self.read_sp(),
            Status::from_bits_retain(self.read_p()).display(),
        )
    }

    /// IRQ and NMI pins are active low; `asserted` pulls the pin down.
    pub fn set_irq(&mut self, asserted: bool) -> Result<()> {
        self.sim.drive(self.pins.irq, !asserted)
    }

    pub fn set_nmi(&mut self, asserted: bool) -> Result<()> {
        self.sim.drive(self.pins.nmi, !asserted)
    }

    pub fn is_reading(&self) -> bool {
        self.sim.state(self.pins.rw)
    }

    /// Full cycles since the end of the start program (or of `init`).
    pub fn cycles(&self) -> u64 {
        self.half_cycles / 2
    }

    pub fn node_hash(&self) -> u32 {
        self.sim.node_hash()
    }

    pub fn transistor_hash(&self) -> u32 {
        self.sim.transistor_hash()
    }

    pub fn simulator(&self) -> &Simulator {
        &self.sim
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::FlatMemory;
    use crate::transistor::netlist::NetlistFile;

    /// Every named pin as a bare node, plus an inverter from `clk0` to `clk1`.
    fn pin_board() -> Netlist {
        let mut names = vec!["vss".to_string(), "vcc".to_string()];
        for pin in ["clk0", "clk1", "res", "rw", "rdy", "so", "irq", "nmi"] {
            names.push(pin.to_string());
        }
        for (prefix, width) in [("ab", 16), ("db", 8), ("a", 8), ("x", 8), ("y", 8), ("s", 8), ("pcl", 8), ("pch", 8)] {
            names.extend((0..width).map(|bit| format!("{prefix}{bit}")));
        }
        names.extend([0, 1, 2, 3, 4, 6, 7].map(|bit| format!("p{bit}")));

        let mut file = NetlistFile::default();
        for (id, name) in names.iter().enumerate() {
            file.nodes.push((id, name == "rw" || name == "clk1"));
            file.names.insert(name.clone(), id);
        }
        file.transistors.push(("t0".into(), file.names["clk0"], file.names["clk1"], 0));
        Netlist::from_file(file).unwrap()
    }

    fn chip() -> Chip<FlatMemory> {
        let mut mem = FlatMemory::new();
        mem.load(0x1234, &[0xA5]);
        let mut chip = Chip::new(pin_board(), mem, SimConfig::default()).unwrap();
        chip.sim.settle_all().unwrap();
        chip
    }

    /// Counts every access that reaches memory.
    #[derive(Default)]
    struct CountingBus {
        memory: FlatMemory,
        reads: usize,
        writes: usize,
    }

    impl Bus for CountingBus {
        fn read(&mut self, address: u16) -> Result<u8> {
            self.reads += 1;
            self.memory.read(address)
        }

        fn write(&mut self, address: u16, value: u8) -> Result<()> {
            self.writes += 1;
            self.memory.write(address, value)
        }
    }

    #[test]
    fn missing_pin_is_reported_by_name() {
        let file = NetlistFile {
            nodes: vec![(0, false), (1, false)],
            transistors: vec![],
            names: [("vss".to_string(), 0), ("vcc".to_string(), 1)].into(),
        };
        let net = Netlist::from_file(file).unwrap();
        match Chip::new(net, FlatMemory::new(), SimConfig::default()) {
            Err(crate::EmuError::UnknownNode(name)) => assert_eq!(name, "clk0"),
            Err(other) => panic!("unexpected {other:?}"),
            Ok(_) => panic!("board without pins accepted"),
        }
    }

    #[test]
    fn falling_clock_serves_a_read() {
        let mut chip = chip();
        chip.write_bits("ab", 16, 0x1234).unwrap();
        assert_eq!(chip.read_address_bus(), 0x1234);
        assert!(chip.is_reading());
        chip.half_clock().unwrap(); // clk0 rises
        assert_eq!(chip.read_data_bus(), 0x00);
        assert!(!chip.read_bit("clk1").unwrap());
        chip.half_clock().unwrap(); // clk0 falls
        assert_eq!(chip.read_data_bus(), 0xA5);
        assert!(chip.read_bit("clk1").unwrap());
        assert_eq!(chip.cycles(), 1);
    }

    #[test]
    fn rising_clock_serves_a_write() {
        let mut chip = chip();
        chip.write_bits("ab", 16, 0x0200).unwrap();
        chip.write_bits("db", 8, 0x3C).unwrap();
        chip.write_bit("rw", false).unwrap();
        chip.half_clock().unwrap(); // clk0 rises
        assert_eq!(chip.bus().peek(0x0200), 0x3C);
    }

    #[test]
    fn each_edge_serves_only_its_own_direction() {
        let mut chip = Chip::new(pin_board(), CountingBus::default(), SimConfig::default()).unwrap();
        chip.sim.settle_all().unwrap();
        chip.half_clock().unwrap();
        assert_eq!((chip.bus().reads, chip.bus().writes), (0, 0));
        chip.half_clock().unwrap();
        assert_eq!((chip.bus().reads, chip.bus().writes), (1, 0));

        chip.write_bit("rw", false).unwrap();
        chip.clock().unwrap();
        assert_eq!((chip.bus().reads, chip.bus().writes), (1, 1));
    }

    #[test]
    fn reset_clocks_leave_the_bus_alone() {
        let mut chip = Chip::new(pin_board(), CountingBus::default(), SimConfig::default()).unwrap();
        let mut edges = 0;
        chip.init(Some(&mut |_: &Chip<CountingBus>| edges += 1)).unwrap();
        assert_eq!(edges, 16);
        assert_eq!((chip.bus().reads, chip.bus().writes), (0, 0));
        assert!(chip.read_bit("res").unwrap());
        assert!(!chip.read_bit("clk0").unwrap());
        assert_eq!(chip.cycles(), 0);

        chip.run_start_program(None).unwrap();
        assert_eq!(chip.bus().reads, 9);
    }

    #[test]
    fn register_readers_assemble_bits() {
        let mut chip = chip();
        chip.write_bits("a", 8, 0x81).unwrap();
        chip.write_bits("pcl", 8, 0x34).unwrap();
        chip.write_bits("pch", 8, 0x12).unwrap();
        chip.write_bit("p0", true).unwrap();
        chip.write_bit("p7", true).unwrap();
        assert_eq!(chip.read_a(), 0x81);
        assert_eq!(chip.read_bits8("a").unwrap(), 0x81);
        assert_eq!(chip.read_pc(), 0x1234);
        assert_eq!(chip.read_p(), 0xA1);
        assert_eq!(chip.register_display(), "PC:1234 A:81 X:00 Y:00 S:00 P:Nv-bdizC");
    }

    #[test]
    fn interrupt_pins_are_active_low() {
        let mut chip = chip();
        chip.set_irq(true).unwrap();
        assert!(!chip.read_bit("irq").unwrap());
        chip.set_nmi(false).unwrap();
        assert!(chip.read_bit("nmi").unwrap());
    }
}
