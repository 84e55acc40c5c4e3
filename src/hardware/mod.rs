pub mod bus;
pub mod cpu;
pub mod ram;

pub use bus::{Bus, FlatMemory, MappedBus, RecordingBus};
pub use cpu::MOS6502;
pub use ram::WorkMemory;
