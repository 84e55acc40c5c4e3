use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EmuError, Result};

pub type NodeId = usize;

/// Name of the ground node in the 6502 description.
pub const GND_NAME: &str = "vss";
/// Name of the power node in the 6502 description.
pub const PWR_NAME: &str = "vcc";

/// On-disk circuit description.
///
/// ```json
/// {
///   "nodes": [[0, false], [1, true]],
///   "transistors": [["t0", 5, 1, 0]],
///   "names": { "vss": 0, "vcc": 1 }
/// }
/// ```
///
/// Node rows are `[id, pullup]`; a node may be listed more than once (the visual6502 data has
/// one row per polygon) and is a pull-up if any row says so. Transistor rows are
/// `[name, gate, terminal1, terminal2]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetlistFile {
    pub nodes: Vec<(NodeId, bool)>,
    pub transistors: Vec<(String, NodeId, NodeId, NodeId)>,
    pub names: BTreeMap<String, NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDef {
    pub pullup: bool,
    /// False for ids that fall in a gap of the description. Such nodes exist only so ids can
    /// be used as indices; nothing may connect to them.
    pub defined: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransistorDef {
    pub name: String,
    pub gate: NodeId,
    pub c1: NodeId,
    /// Holds ground or power whenever the transistor touches either.
    pub c2: NodeId,
}

/// A validated, normalised circuit: every referenced node exists, ground and power are known,
/// and any transistor touching ground or power has that rail in its second terminal.
#[derive(Debug, Clone)]
pub struct Netlist {
    nodes: Vec<NodeDef>,
    transistors: Vec<TransistorDef>,
    names: HashMap<String, NodeId>,
    transistor_index: HashMap<String, usize>,
    gnd: NodeId,
    pwr: NodeId,
}

impl Netlist {
    pub fn from_file(file: NetlistFile) -> Result<Self> {
        let count = file.nodes.iter().map(|&(id, _)| id + 1).max().unwrap_or(0);
        let mut nodes = vec![NodeDef { pullup: false, defined: false }; count];
        for &(id, pullup) in &file.nodes {
            let node = &mut nodes[id];
            node.defined = true;
            node.pullup |= pullup;
        }

        let names: HashMap<String, NodeId> = file.names.into_iter().collect();
        let rail = |name: &str| -> Result<NodeId> {
            let id = *names
                .get(name)
                .ok_or_else(|| EmuError::UnknownNode(name.to_string()))?;
            match nodes.get(id) {
                Some(n) if n.defined => Ok(id),
                _ => Err(EmuError::Netlist(format!("`{name}` names undefined node {id}"))),
            }
        };
        let gnd = rail(GND_NAME)?;
        let pwr = rail(PWR_NAME)?;

        let mut transistors = Vec::with_capacity(file.transistors.len());
        let mut transistor_index = HashMap::with_capacity(file.transistors.len());
        for (name, gate, c1, c2) in file.transistors {
            for id in [gate, c1, c2] {
                if !nodes.get(id).is_some_and(|n| n.defined) {
                    return Err(EmuError::MissingNode { transistor: name, node: id });
                }
            }
            // Rails go in the second terminal so the simulator can spot them by position
            let (c1, c2) = if c1 == gnd || c1 == pwr { (c2, c1) } else { (c1, c2) };
            if transistor_index.insert(name.clone(), transistors.len()).is_some() {
                return Err(EmuError::Netlist(format!("duplicate transistor `{name}`")));
            }
            transistors.push(TransistorDef { name, gate, c1, c2 });
        }

        debug!(
            target: "netlist",
            "{} node ids ({} defined), {} transistors, gnd={gnd} pwr={pwr}",
            nodes.len(),
            nodes.iter().filter(|n| n.defined).count(),
            transistors.len()
        );

        Ok(Self { nodes, transistors, names, transistor_index, gnd, pwr })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_file(serde_json::from_str(text)?)
    }

    /// Builds a netlist from the three visual6502 JavaScript data files (`segdefs.js`,
    /// `transdefs.js`, `nodenames.js`), passed as text.
    pub fn from_visual6502(segdefs: &str, transdefs: &str, nodenames: &str) -> Result<Self> {
        let mut file = NetlistFile::default();

        for row in js_rows(segdefs)? {
            let id = row.first().and_then(Value::as_u64).ok_or_else(|| bad_row("segdefs", &row))?;
            let pull = row.get(1).and_then(Value::as_str).ok_or_else(|| bad_row("segdefs", &row))?;
            file.nodes.push((id as NodeId, pull == "+"));
        }

        for row in js_rows(transdefs)? {
            let name = row.first().and_then(Value::as_str).ok_or_else(|| bad_row("transdefs", &row))?;
            let mut ids = row[1..].iter().take(3).map(Value::as_u64);
            let (Some(Some(gate)), Some(Some(c1)), Some(Some(c2))) = (ids.next(), ids.next(), ids.next())
            else {
                return Err(bad_row("transdefs", &row));
            };
            file.transistors
                .push((name.to_string(), gate as NodeId, c1 as NodeId, c2 as NodeId));
        }

        for (name, id) in js_object(nodenames)? {
            // the data uses negative ids for names it has retired
            if let Some(id) = id.as_u64() {
                file.names.insert(name, id as NodeId);
            }
        }

        Self::from_file(file)
    }

    /// Loads `netlist.json` from `dir`, or failing that the visual6502 JavaScript trio.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let json = dir.join("netlist.json");
        if json.is_file() {
            debug!(target: "netlist", "loading {}", json.display());
            return Self::from_json(&fs::read_to_string(json)?);
        }
        debug!(target: "netlist", "loading visual6502 data from {}", dir.display());
        Self::from_visual6502(
            &fs::read_to_string(dir.join("segdefs.js"))?,
            &fs::read_to_string(dir.join("transdefs.js"))?,
            &fs::read_to_string(dir.join("nodenames.js"))?,
        )
    }

    pub fn nodes(&self) -> &[NodeDef] {
        &self.nodes
    }

    pub fn transistors(&self) -> &[TransistorDef] {
        &self.transistors
    }

    pub fn gnd(&self) -> NodeId {
        self.gnd
    }

    pub fn pwr(&self) -> NodeId {
        self.pwr
    }

    pub fn node(&self, name: &str) -> Result<NodeId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| EmuError::UnknownNode(name.to_string()))
    }

    pub fn transistor(&self, name: &str) -> Result<usize> {
        self.transistor_index
            .get(name)
            .copied()
            .ok_or_else(|| EmuError::UnknownTransistor(name.to_string()))
    }
}

fn bad_row(file: &str, row: &[Value]) -> EmuError {
    EmuError::Netlist(format!("bad {file} row {}", Value::Array(row.to_vec())))
}

/// Strips `//` and `/* */` comments.
fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut quote = None;
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), _) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            (None, '\'' | '"') => {
                quote = Some(c);
                out.push(c);
            }
            (None, '/') if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            (None, '/') if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// The literal assigned in `var name = <literal>;`, with JS-only syntax rewritten to JSON:
/// single quotes become double quotes and trailing commas are dropped.
fn js_literal(src: &str, open: char, close: char) -> Result<String> {
    let src = strip_comments(src);
    let start = src
        .find(open)
        .ok_or_else(|| EmuError::Netlist(format!("no `{open}` in data file")))?;
    let end = src
        .rfind(close)
        .ok_or_else(|| EmuError::Netlist(format!("no `{close}` in data file")))?;
    if end < start {
        return Err(EmuError::Netlist(format!("`{close}` before the first `{open}` in data file")));
    }
    let body = src[start..=end].replace('\'', "\"");

    let mut out = String::with_capacity(body.len());
    let mut pending_comma = false;
    for c in body.chars() {
        match c {
            ',' => {
                if pending_comma {
                    out.push(',');
                }
                pending_comma = true;
            }
            c if c.is_whitespace() => {}
            ']' | '}' => {
                pending_comma = false;
                out.push(c);
            }
            _ => {
                if pending_comma {
                    out.push(',');
                    pending_comma = false;
                }
                out.push(c);
            }
        }
    }
    Ok(out)
}

fn js_rows(src: &str) -> Result<Vec<Vec<Value>>> {
    Ok(serde_json::from_str(&js_literal(src, '[', ']')?)?)
}

/// Parses an object literal whose keys are bare identifiers.
fn js_object(src: &str) -> Result<Vec<(String, Value)>> {
    let body = js_literal(src, '{', '}')?;
    let inner = &body[1..body.len() - 1];
    inner
        .split(',')
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (key, value) = entry
                .split_once(':')
                .ok_or_else(|| EmuError::Netlist(format!("bad nodenames entry `{entry}`")))?;
            Ok((key.trim_matches('"').to_string(), serde_json::from_str(value)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEGDEFS: &str = "var segdefs = [\n\
        [ 0,'-',1,10,10,20,20],\n\
        [ 1,'+',1,30,30],\n\
        [ 1,'-',0,31,31],\n\
        [ 2,'+',1,40,40], // pulled up\n\
        [ 3,'-',1,50,50],\n\
        ]\n";
    const TRANSDEFS: &str = "var transdefs = [\n\
        ['t0',3,0,2,[1,2,3,4],[5,6,7,8,9],false],\n\
        ['t1',2,1,3,[1,2,3,4],[5,6,7,8,9],false],\n\
        ]\n";
    const NODENAMES: &str = "var nodenames ={\n\
        vss: 0,\n\
        vcc: 1,\n\
        out: 2,\n\
        in: 3,\n\
        gone: -1,\n\
        }\n";

    #[test]
    fn parses_visual6502_files() {
        let net = Netlist::from_visual6502(SEGDEFS, TRANSDEFS, NODENAMES).unwrap();
        assert_eq!(net.nodes().len(), 4);
        assert!(net.nodes()[1].pullup);
        assert!(net.nodes()[2].pullup);
        assert!(!net.nodes()[3].pullup);
        assert_eq!(net.node("out").unwrap(), 2);
        assert!(matches!(net.node("gone"), Err(EmuError::UnknownNode(_))));
        assert_eq!(net.transistor("t1").unwrap(), 1);
    }

    #[test]
    fn reversed_brackets_are_a_netlist_error() {
        let transdefs = "var transdefs = ];\nvar more = [";
        match Netlist::from_visual6502(SEGDEFS, transdefs, NODENAMES) {
            Err(EmuError::Netlist(msg)) => assert!(msg.contains("before the first"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rails_are_moved_to_second_terminal() {
        let net = Netlist::from_visual6502(SEGDEFS, TRANSDEFS, NODENAMES).unwrap();
        let t0 = &net.transistors()[0];
        assert_eq!((t0.c1, t0.c2), (2, 0));
        let t1 = &net.transistors()[1];
        assert_eq!((t1.c1, t1.c2), (3, 1));
    }

    #[test]
    fn missing_node_is_fatal() {
        let file = NetlistFile {
            nodes: vec![(0, false), (1, true), (3, false)],
            transistors: vec![("t9".into(), 3, 2, 0)],
            names: [("vss".to_string(), 0), ("vcc".to_string(), 1)].into(),
        };
        match Netlist::from_file(file) {
            Err(EmuError::MissingNode { transistor, node }) => {
                assert_eq!(transistor, "t9");
                assert_eq!(node, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rails_must_be_named() {
        let file = NetlistFile {
            nodes: vec![(0, false)],
            transistors: vec![],
            names: [("vss".to_string(), 0)].into(),
        };
        assert!(matches!(Netlist::from_file(file), Err(EmuError::UnknownNode(n)) if n == "vcc"));
    }

    #[test]
    fn json_round_trips_through_serde() {
        let file = NetlistFile {
            nodes: vec![(0, false), (1, true), (2, false)],
            transistors: vec![("t0".into(), 2, 0, 1)],
            names: [("vss".to_string(), 0), ("vcc".to_string(), 1)].into(),
        };
        let text = serde_json::to_string(&file).unwrap();
        let net = Netlist::from_json(&text).unwrap();
        assert_eq!(net.gnd(), 0);
        assert_eq!(net.pwr(), 1);
        assert_eq!(net.transistors()[0].c2, 1);
    }
}
