pub mod chip;
pub mod netlist;
pub mod sim;

use std::env;
use std::path::PathBuf;

pub use chip::Chip;
pub use netlist::{Netlist, NodeId};
pub use sim::{SimConfig, Simulator};

/// Environment variable naming the directory that holds the 6502 circuit description.
pub const NETLIST_ENV: &str = "VISUAL6502_NETLIST";

/// Directory named by `VISUAL6502_NETLIST`, if set.
pub fn netlist_dir_from_env() -> Option<PathBuf> {
    env::var_os(NETLIST_ENV).map(PathBuf::from)
}
