//! # cgm-core: Merged Grid Model Core
//!
//! Data structures for a common grid model assembled from several individual
//! grid models, plus the seams the balancing engine talks through.
//!
//! ## Design
//!
//! The merged model is an **undirected multigraph**:
//! - **Nodes**: buses, generators, loads and boundary injections
//! - **Edges**: in-service branches and tie-lines
//!
//! A boundary injection is the point where power leaves an individual model
//! (an AC tie-line half or a DC link terminal). When both halves of an AC
//! tie-line are present in the merge they are *paired*: a [`TieLine`] edge
//! joins their buses so the two areas become one electrical island. DC link
//! terminals never create edges; each side stays an independent setpoint.
//!
//! Every bus carries its control area. Elements attached to a bus (loads,
//! generators, injections) belong to that bus's area.
//!
//! ## Sign conventions
//!
//! - Boundary injection setpoints and solved flows are **export-positive**
//!   from the owning area's perspective.
//! - Load active/reactive power is **consumption-positive**.
//! - Generator output is production-positive.
//!
//! ## Quick Start
//!
//! ```rust
//! use cgm_core::*;
//!
//! let mut network = Network::new();
//! network.add_bus(Bus::new(BusId::new(1), "A-1", "A"));
//! network.add_bus(Bus::new(BusId::new(2), "B-1", "B"));
//! network.add_load(Load::new(LoadId::new(1), "load A", BusId::new(1), 80.0, 10.0));
//! network.add_injection(BoundaryInjection::ac(InjectionId::new(1), "A-B (A)", BusId::new(1), 40.0, 0.0));
//! network.add_injection(BoundaryInjection::ac(InjectionId::new(2), "A-B (B)", BusId::new(2), -40.0, 0.0));
//! network
//!     .pair_injections(TieLineId::new(1), "A-B", InjectionId::new(1), InjectionId::new(2))
//!     .unwrap();
//!
//! let labels = label_components(&network);
//! assert_eq!(labels.islands().len(), 1);
//! ```

use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod model;
pub mod snapshot;
pub mod solver;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{CgmError, CgmResult};
pub use graph_utils::{label_components, ComponentLabels, IslandSummary};
pub use model::{BusRecord, GridModel, InjectionRecord, LoadRecord, NetworkModel};
pub use petgraph::graph::NodeIndex;
pub use snapshot::{load_snapshot, NetworkSnapshot};
pub use solver::{ComponentSolution, PowerFlowOracle, SolveStatus};
pub use units::{Megavars, Megawatts};

macro_rules! element_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub const fn new(value: usize) -> Self {
                Self(value)
            }
            #[inline]
            pub const fn value(&self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

element_id!(BusId);
element_id!(BranchId);
element_id!(GenId);
element_id!(LoadId);
element_id!(InjectionId);
element_id!(TieLineId);
element_id!(
    /// Connected component (island) number. Numbering follows descending bus
    /// count, so component 0 is the main island.
    ComponentId
);

impl ComponentId {
    pub const MAIN: ComponentId = ComponentId(0);

    #[inline]
    pub fn is_main(&self) -> bool {
        *self == Self::MAIN
    }
}

/// Control area code (country or bidding zone), e.g. `"LT"` or `"10YLV-1001A00074"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaCode(String);

impl AreaCode {
    pub fn new(code: impl Into<String>) -> Self {
        AreaCode(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AreaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AreaCode {
    fn from(code: &str) -> Self {
        AreaCode(code.to_string())
    }
}

impl From<String> for AreaCode {
    fn from(code: String) -> Self {
        AreaCode(code)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    /// Control area the bus (and everything attached to it) belongs to
    pub area: Option<AreaCode>,
}

impl Bus {
    pub fn new(id: BusId, name: impl Into<String>, area: impl Into<AreaCode>) -> Self {
        Self {
            id,
            name: name.into(),
            area: Some(area.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Open branches do not connect their buses
    pub status: bool,
}

impl Branch {
    pub fn new(id: BranchId, name: impl Into<String>, from_bus: BusId, to_bus: BusId) -> Self {
        Self {
            id,
            name: name.into(),
            from_bus,
            to_bus,
            status: true,
        }
    }

    pub fn open(mut self) -> Self {
        self.status = false;
        self
    }
}

/// AC tie-line formed by pairing two boundary injections.
#[derive(Debug, Clone)]
pub struct TieLine {
    pub id: TieLineId,
    pub name: String,
    pub from_injection: InjectionId,
    pub to_injection: InjectionId,
    pub from_bus: BusId,
    pub to_bus: BusId,
}

#[derive(Debug, Clone)]
pub struct Gen {
    pub id: GenId,
    pub name: String,
    pub bus: BusId,
    /// Active power output (MW)
    pub active_power: Megawatts,
    /// Reactive power output (Mvar)
    pub reactive_power: Megavars,
    pub status: bool,
}

impl Gen {
    pub fn new(id: GenId, name: impl Into<String>, bus: BusId) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            active_power: Megawatts(0.0),
            reactive_power: Megavars(0.0),
            status: true,
        }
    }

    pub fn with_output(mut self, p_mw: f64, q_mvar: f64) -> Self {
        self.active_power = Megawatts(p_mw);
        self.reactive_power = Megavars(q_mvar);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Load {
    pub id: LoadId,
    pub name: String,
    pub bus: BusId,
    /// Active power demand (MW)
    pub active_power: Megawatts,
    /// Reactive power demand (Mvar)
    pub reactive_power: Megavars,
    /// Eligible for proportional scaling
    pub conforming: bool,
}

impl Load {
    pub fn new(id: LoadId, name: impl Into<String>, bus: BusId, p_mw: f64, q_mvar: f64) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            active_power: Megawatts(p_mw),
            reactive_power: Megavars(q_mvar),
            conforming: true,
        }
    }

    pub fn non_conforming(mut self) -> Self {
        self.conforming = false;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionKind {
    #[default]
    Ac,
    Dc,
}

/// Power crossing the edge of an individual grid model.
#[derive(Debug, Clone)]
pub struct BoundaryInjection {
    pub id: InjectionId,
    pub name: String,
    pub bus: BusId,
    pub kind: InjectionKind,
    /// Scheduled exchange written by the balancing engine (export-positive)
    pub setpoint_p: Megawatts,
    pub setpoint_q: Megavars,
    /// Flow from the last power-flow solution (export-positive)
    pub flow_p: Megawatts,
    pub flow_q: Megavars,
    /// Other half of the tie-line when the counterpart model is in the merge
    pub paired_with: Option<InjectionId>,
    /// Registered resource of the DC link, used to match schedule rows
    pub resource_id: Option<String>,
}

impl BoundaryInjection {
    /// AC boundary point. The flow starts equal to the setpoint.
    pub fn ac(id: InjectionId, name: impl Into<String>, bus: BusId, p_mw: f64, q_mvar: f64) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            kind: InjectionKind::Ac,
            setpoint_p: Megawatts(p_mw),
            setpoint_q: Megavars(q_mvar),
            flow_p: Megawatts(p_mw),
            flow_q: Megavars(q_mvar),
            paired_with: None,
            resource_id: None,
        }
    }

    /// DC link terminal identified by its registered resource.
    pub fn dc(
        id: InjectionId,
        name: impl Into<String>,
        bus: BusId,
        resource_id: impl Into<String>,
        p_mw: f64,
        q_mvar: f64,
    ) -> Self {
        Self {
            kind: InjectionKind::Dc,
            resource_id: Some(resource_id.into()),
            ..Self::ac(id, name, bus, p_mw, q_mvar)
        }
    }

    #[inline]
    pub fn is_dc(&self) -> bool {
        self.kind == InjectionKind::Dc
    }

    #[inline]
    pub fn is_paired(&self) -> bool {
        self.paired_with.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Bus(Bus),
    Gen(Gen),
    Load(Load),
    Injection(BoundaryInjection),
}

#[derive(Debug, Clone)]
pub enum Edge {
    Branch(Branch),
    TieLine(TieLine),
}

impl Node {
    pub fn label(&self) -> &str {
        match self {
            Node::Bus(bus) => &bus.name,
            Node::Gen(gen) => &gen.name,
            Node::Load(load) => &load.name,
            Node::Injection(inj) => &inj.name,
        }
    }
}

impl Edge {
    pub fn label(&self) -> &str {
        match self {
            Edge::Branch(branch) => &branch.name,
            Edge::TieLine(tie) => &tie.name,
        }
    }

    /// Whether the edge electrically joins its two buses.
    pub fn is_closed(&self) -> bool {
        match self {
            Edge::Branch(branch) => branch.status,
            Edge::TieLine(_) => true,
        }
    }
}

/// The merged network graph
#[derive(Debug, Default, Clone)]
pub struct Network {
    pub graph: Graph<Node, Edge, Undirected>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
        }
    }

    pub fn add_bus(&mut self, bus: Bus) -> NodeIndex {
        self.graph.add_node(Node::Bus(bus))
    }

    pub fn add_gen(&mut self, gen: Gen) -> NodeIndex {
        self.graph.add_node(Node::Gen(gen))
    }

    pub fn add_load(&mut self, load: Load) -> NodeIndex {
        self.graph.add_node(Node::Load(load))
    }

    pub fn add_injection(&mut self, injection: BoundaryInjection) -> NodeIndex {
        self.graph.add_node(Node::Injection(injection))
    }

    /// Connect two existing buses with a branch.
    pub fn add_branch(&mut self, branch: Branch) -> CgmResult<EdgeIndex> {
        let from = self
            .bus_node(branch.from_bus)
            .ok_or_else(|| CgmError::unknown("bus", branch.from_bus))?;
        let to = self
            .bus_node(branch.to_bus)
            .ok_or_else(|| CgmError::unknown("bus", branch.to_bus))?;
        Ok(self.graph.add_edge(from, to, Edge::Branch(branch)))
    }

    /// Pair two AC boundary injections into a tie-line.
    pub fn pair_injections(
        &mut self,
        id: TieLineId,
        name: impl Into<String>,
        from: InjectionId,
        to: InjectionId,
    ) -> CgmResult<EdgeIndex> {
        if from == to {
            return Err(CgmError::Validation(format!(
                "tie-line {id} pairs injection {from} with itself"
            )));
        }
        let from_bus = self.pairable_bus(from)?;
        let to_bus = self.pairable_bus(to)?;
        let from_node = self
            .bus_node(from_bus)
            .ok_or_else(|| CgmError::unknown("bus", from_bus))?;
        let to_node = self
            .bus_node(to_bus)
            .ok_or_else(|| CgmError::unknown("bus", to_bus))?;

        if let Some(inj) = self.injection_mut(from) {
            inj.paired_with = Some(to);
        }
        if let Some(inj) = self.injection_mut(to) {
            inj.paired_with = Some(from);
        }

        let tie = TieLine {
            id,
            name: name.into(),
            from_injection: from,
            to_injection: to,
            from_bus,
            to_bus,
        };
        Ok(self.graph.add_edge(from_node, to_node, Edge::TieLine(tie)))
    }

    fn pairable_bus(&self, id: InjectionId) -> CgmResult<BusId> {
        let inj = self
            .injection(id)
            .ok_or_else(|| CgmError::unknown("boundary injection", id))?;
        if inj.is_dc() {
            return Err(CgmError::Validation(format!(
                "DC injection {id} cannot be paired into an AC tie-line"
            )));
        }
        if let Some(other) = inj.paired_with {
            return Err(CgmError::Validation(format!(
                "injection {id} is already paired with {other}"
            )));
        }
        Ok(inj.bus)
    }

    pub fn bus_node(&self, id: BusId) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&idx| matches!(&self.graph[idx], Node::Bus(b) if b.id == id))
    }

    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.buses().into_iter().find(|b| b.id == id)
    }

    pub fn buses(&self) -> Vec<&Bus> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Bus(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub fn generators(&self) -> Vec<&Gen> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Gen(g) => Some(g),
                _ => None,
            })
            .collect()
    }

    pub fn loads(&self) -> Vec<&Load> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Load(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn injections(&self) -> Vec<&BoundaryInjection> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Injection(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    pub fn branches(&self) -> Vec<&Branch> {
        self.graph
            .edge_weights()
            .filter_map(|e| match e {
                Edge::Branch(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub fn tie_lines(&self) -> Vec<&TieLine> {
        self.graph
            .edge_weights()
            .filter_map(|e| match e {
                Edge::TieLine(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn injection(&self, id: InjectionId) -> Option<&BoundaryInjection> {
        self.graph.node_weights().find_map(|n| match n {
            Node::Injection(i) if i.id == id => Some(i),
            _ => None,
        })
    }

    pub fn injection_mut(&mut self, id: InjectionId) -> Option<&mut BoundaryInjection> {
        self.graph.node_weights_mut().find_map(|n| match n {
            Node::Injection(i) if i.id == id => Some(i),
            _ => None,
        })
    }

    pub fn load(&self, id: LoadId) -> Option<&Load> {
        self.graph.node_weights().find_map(|n| match n {
            Node::Load(l) if l.id == id => Some(l),
            _ => None,
        })
    }

    pub fn load_mut(&mut self, id: LoadId) -> Option<&mut Load> {
        self.graph.node_weights_mut().find_map(|n| match n {
            Node::Load(l) if l.id == id => Some(l),
            _ => None,
        })
    }

    /// Area of the bus an element is attached to.
    pub fn area_of_bus(&self, id: BusId) -> Option<&AreaCode> {
        self.bus(id).and_then(|b| b.area.as_ref())
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();
        for node in self.graph.node_weights() {
            match node {
                Node::Bus(_) => stats.num_buses += 1,
                Node::Gen(g) => {
                    stats.num_gens += 1;
                    if g.status {
                        stats.total_generation_mw += g.active_power.value();
                    }
                }
                Node::Load(l) => {
                    stats.num_loads += 1;
                    stats.total_load_mw += l.active_power.value();
                }
                Node::Injection(i) => {
                    stats.num_injections += 1;
                    if i.is_dc() {
                        stats.num_dc_links += 1;
                    }
                }
            }
        }
        for edge in self.graph.edge_weights() {
            match edge {
                Edge::Branch(_) => stats.num_branches += 1,
                Edge::TieLine(_) => stats.num_tie_lines += 1,
            }
        }
        stats
    }

    /// Check the merged model for problems that make balancing meaningless.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        let stats = self.stats();
        if stats.num_buses == 0 {
            diag.error("structure", "Network has no buses");
            return;
        }

        let untagged = self.buses().iter().filter(|b| b.area.is_none()).count();
        if untagged > 0 {
            diag.warn(
                "structure",
                format!("{untagged} bus(es) carry no control area and are ignored for balancing"),
            );
        }

        let known: std::collections::HashSet<BusId> =
            self.buses().iter().map(|b| b.id).collect();
        for load in self.loads() {
            if !known.contains(&load.bus) {
                diag.error_entity(
                    "reference",
                    format!("load references unknown bus {}", load.bus),
                    &load.name,
                );
            }
        }
        for inj in self.injections() {
            if !known.contains(&inj.bus) {
                diag.error_entity(
                    "reference",
                    format!("boundary injection references unknown bus {}", inj.bus),
                    &inj.name,
                );
            }
            if inj.is_dc() && inj.resource_id.is_none() {
                diag.warn_entity(
                    "dc",
                    "DC injection has no registered resource and cannot be scheduled",
                    &inj.name,
                );
            }
        }

        if stats.num_injections == 0 {
            diag.warn("structure", "Network has no boundary injections");
        }
    }
}

/// Element counts of a merged network
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_gens: usize,
    pub num_loads: usize,
    pub num_injections: usize,
    pub num_dc_links: usize,
    pub num_branches: usize,
    pub num_tie_lines: usize,
    pub total_load_mw: f64,
    pub total_generation_mw: f64,
}

impl fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} buses, {} branches, {} tie-lines, {} gens ({:.0} MW), {} loads ({:.0} MW), {} boundary injections ({} DC)",
            self.num_buses,
            self.num_branches,
            self.num_tie_lines,
            self.num_gens,
            self.total_generation_mw,
            self.num_loads,
            self.total_load_mw,
            self.num_injections,
            self.num_dc_links
        )
    }
}
