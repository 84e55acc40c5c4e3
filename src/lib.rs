//! Two models of the NMOS 6502 and a harness that runs them side by side.
//!
//! - [`MOS6502`]: a cycle-stepped CPU that decodes each opcode into a queue of micro-ops, one
//!   bus access per cycle.
//! - [`transistor::Chip`]: a switch-level simulation of the die, driven from the visual6502
//!   circuit description.
//! - [`crosscheck`]: clocks both against identical memory and reports the first cycle where
//!   they disagree.

pub mod crosscheck;
pub mod disasm;
pub mod error;
pub mod hardware;
pub mod transistor;

pub use error::{EmuError, Result};
pub use hardware::cpu::status::Status;
pub use hardware::cpu::Registers;
pub use hardware::{Bus, FlatMemory, MappedBus, RecordingBus, WorkMemory, MOS6502};
