use std::mem;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::transistor::netlist::{Netlist, NodeId};
use crate::{EmuError, Result};

/// Tunables for the switch-level simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Settling rounds allowed before a network is declared oscillating.
    pub max_settle_rounds: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { max_settle_rounds: 100 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub state: bool,
    pub pullup: bool,
    pub pulldown: bool,
    /// Set until a driven group first decides the node's value.
    pub floating: bool,
    /// Transistors this node switches.
    pub gates: Vec<usize>,
    /// Transistors whose channel touches this node. Empty for the rails.
    pub terminals: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct Transistor {
    pub on: bool,
    pub gate: NodeId,
    pub c1: NodeId,
    pub c2: NodeId,
}

/// Deduplicating queue of nodes: `present` mirrors `items` so a push is O(1).
#[derive(Debug, Clone, Default)]
struct WorkList {
    items: Vec<NodeId>,
    present: Vec<bool>,
}

impl WorkList {
    fn with_nodes(count: usize) -> Self {
        Self {
            items: Vec::new(),
            present: vec![false; count],
        }
    }

    fn push(&mut self, id: NodeId) {
        if !self.present[id] {
            self.present[id] = true;
            self.items.push(id);
        }
    }

    fn clear(&mut self) {
        for &id in &self.items {
            self.present[id] = false;
        }
        self.items.clear();
    }
}

/// Value a connected group resolves to, strongest source first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drive {
    Gnd,
    Pwr,
    Pulled(bool),
    Charge(bool),
}

impl Drive {
    fn level(self) -> bool {
        match self {
            Drive::Gnd => false,
            Drive::Pwr => true,
            Drive::Pulled(v) | Drive::Charge(v) => v,
        }
    }
}

/// Switch-level network of nodes and transistors.
///
/// A transistor conducts while its gate node is high. Nodes joined through conducting
/// transistors form a group that settles to one value: ground wins, then power, then the first
/// member that is pulled or charged high. `settle` repeats this from a set of changed nodes
/// until nothing moves.
pub struct Simulator {
    nodes: Vec<Node>,
    transistors: Vec<Transistor>,
    gnd: NodeId,
    pwr: NodeId,
    current: WorkList,
    next: WorkList,
    group: Vec<NodeId>,
    in_group: Vec<bool>,
    config: SimConfig,
}

impl Simulator {
    pub fn new(netlist: &Netlist, config: SimConfig) -> Self {
        let count = netlist.nodes().len();
        let gnd = netlist.gnd();
        let pwr = netlist.pwr();

        let mut nodes: Vec<Node> = netlist
            .nodes()
            .iter()
            .map(|def| Node {
                pullup: def.pullup,
                floating: true,
                ..Node::default()
            })
            .collect();
        nodes[pwr].state = true;

        let mut transistors = Vec::with_capacity(netlist.transistors().len());
        for (i, def) in netlist.transistors().iter().enumerate() {
            nodes[def.gate].gates.push(i);
            nodes[def.c1].terminals.push(i);
            if def.c2 != gnd && def.c2 != pwr {
                nodes[def.c2].terminals.push(i);
            }
            transistors.push(Transistor {
                on: def.gate == pwr,
                gate: def.gate,
                c1: def.c1,
                c2: def.c2,
            });
        }

        Self {
            nodes,
            transistors,
            gnd,
            pwr,
            current: WorkList::with_nodes(count),
            next: WorkList::with_nodes(count),
            group: Vec::new(),
            in_group: vec![false; count],
            config,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn transistors(&self) -> &[Transistor] {
        &self.transistors
    }

    pub fn state(&self, id: NodeId) -> bool {
        self.nodes[id].state
    }

    /// Settles every node that has something to settle.
    pub fn settle_all(&mut self) -> Result<()> {
        let ids: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&id| !self.is_rail(id) && self.is_connected(id))
            .collect();
        self.settle(&ids)
    }

    /// Forces `id` high (pull-up) or low (pull-down) and settles.
    pub fn drive(&mut self, id: NodeId, high: bool) -> Result<()> {
        self.set_pull(id, high);
        self.settle(&[id])
    }

    /// Forces several nodes at once and settles them together.
    pub fn drive_many(&mut self, levels: &[(NodeId, bool)]) -> Result<()> {
        for &(id, high) in levels {
            self.set_pull(id, high);
        }
        let ids: Vec<NodeId> = levels.iter().map(|&(id, _)| id).collect();
        self.settle(&ids)
    }

    fn set_pull(&mut self, id: NodeId, high: bool) {
        let node = &mut self.nodes[id];
        node.pullup = high;
        node.pulldown = !high;
    }

    /// Recomputes `seeds`, then everything their changes disturb, until the network is quiet.
    pub fn settle(&mut self, seeds: &[NodeId]) -> Result<()> {
        self.current.clear();
        self.next.clear();
        for &id in seeds {
            if !self.is_rail(id) {
                self.current.push(id);
            }
        }

        let mut rounds = 0;
        while !self.current.items.is_empty() {
            if rounds == self.config.max_settle_rounds {
                let node = self.current.items[0];
                return Err(EmuError::NoConvergence { node, rounds });
            }
            let items = mem::take(&mut self.current.items);
            for &id in &items {
                // an earlier group in this round may already have settled it
                if self.current.present[id] {
                    self.recalc_node(id);
                }
            }
            for &id in &items {
                self.current.present[id] = false;
            }
            self.current.items = items;
            self.current.items.clear();
            mem::swap(&mut self.current, &mut self.next);
            rounds += 1;
        }
        trace!(target: "sim", "settled in {rounds} rounds");
        Ok(())
    }

    fn recalc_node(&mut self, id: NodeId) {
        let drive = self.build_group(id);
        let level = drive.level();
        let driven = !matches!(drive, Drive::Charge(_));

        let group = mem::take(&mut self.group);
        for &member in &group {
            self.in_group[member] = false;
            // settled as part of this group; no need to visit it again this round
            self.current.present[member] = false;
            let node = &mut self.nodes[member];
            if driven {
                node.floating = false;
            }
            if node.state == level {
                continue;
            }
            node.state = level;
            for i in 0..self.nodes[member].gates.len() {
                let t = self.nodes[member].gates[i];
                let transistor = &mut self.transistors[t];
                transistor.on = level;
                let (c1, c2) = (transistor.c1, transistor.c2);
                self.next.push(c1);
                if !self.is_rail(c2) {
                    self.next.push(c2);
                }
            }
        }
        self.group = group;
        self.group.clear();
    }

    /// Collects every node reachable from `start` through conducting transistors into
    /// `self.group` and returns the value the group resolves to.
    ///
    /// Ground wins, then power. Otherwise members are scanned in the order they joined: the
    /// first one that is pulled up, pulled down, or holding high charge decides.
    fn build_group(&mut self, start: NodeId) -> Drive {
        let mut rails = (false, false);
        self.add_to_group(start, &mut rails);

        match rails {
            (true, _) => return Drive::Gnd,
            (false, true) => return Drive::Pwr,
            _ => {}
        }
        for &id in &self.group {
            let node = &self.nodes[id];
            if node.pullup {
                return Drive::Pulled(true);
            }
            if node.pulldown {
                return Drive::Pulled(false);
            }
            if node.state {
                return Drive::Charge(true);
            }
        }
        Drive::Charge(false)
    }

    /// Pre-order walk; a rail is noted in `rails` as `(gnd, pwr)` and not entered.
    fn add_to_group(&mut self, id: NodeId, rails: &mut (bool, bool)) {
        if id == self.gnd {
            rails.0 = true;
            return;
        }
        if id == self.pwr {
            rails.1 = true;
            return;
        }
        if self.in_group[id] {
            return;
        }
        self.in_group[id] = true;
        self.group.push(id);

        for i in 0..self.nodes[id].terminals.len() {
            let transistor = self.transistors[self.nodes[id].terminals[i]];
            if transistor.on {
                let other = if transistor.c1 == id { transistor.c2 } else { transistor.c1 };
                self.add_to_group(other, rails);
            }
        }
    }

    fn is_rail(&self, id: NodeId) -> bool {
        id == self.gnd || id == self.pwr
    }

    fn is_connected(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        node.pullup || !node.gates.is_empty() || !node.terminals.is_empty()
    }

    /// Order-sensitive digest of every node state.
    pub fn node_hash(&self) -> u32 {
        digest(self.nodes.iter().map(|n| n.state))
    }

    /// Order-sensitive digest of every transistor's conduction state.
    pub fn transistor_hash(&self) -> u32 {
        digest(self.transistors.iter().map(|t| t.on))
    }
}

/// `h = h * 31 + bit` in 32-bit wrapping arithmetic, masked to a non-negative `i32` range.
fn digest(bits: impl Iterator<Item = bool>) -> u32 {
    bits.fold(0u32, |h, bit| h.wrapping_mul(31).wrapping_add(bit as u32)) & 0x7FFF_FFFF
}
