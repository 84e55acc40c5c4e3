use thiserror::Error;

use crate::hardware::cpu::instr_def::AddrMode;

/// Fatal conditions raised by either engine or by the circuit loader.
///
/// None of these are recoverable inside the core: a failed clock or settle leaves the engine in
/// an unspecified state and the caller is expected to stop driving it.
#[derive(Debug, Error)]
pub enum EmuError {
    #[error("no node named `{0}` in the netlist")]
    UnknownNode(String),
    #[error("no transistor named `{0}` in the netlist")]
    UnknownTransistor(String),
    #[error("transistor `{transistor}` references missing node {node}")]
    MissingNode { transistor: String, node: usize },
    #[error("malformed netlist: {0}")]
    Netlist(String),
    #[error("netlist did not settle around node {node} after {rounds} rounds")]
    NoConvergence { node: usize, rounds: usize },
    #[error("address ${address:04X} is outside a {capacity}-byte store")]
    OutOfRange { address: u16, capacity: usize },
    #[error("opcode ${opcode:02X} has no micro-op sequence for {mode:?} addressing")]
    UndefinedMode { opcode: u8, mode: AddrMode },
    #[error("engines diverged: {0}")]
    Divergence(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EmuError>;
