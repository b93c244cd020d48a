//! JSON snapshot of a merged network.
//!
//! A snapshot is the flat, serde-friendly form of a [`Network`]: element lists
//! keyed by numeric ids plus the list of tie-line pairings. Building a network
//! from a snapshot checks every cross reference up front.

use std::collections::HashSet;
use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    AreaCode, BoundaryInjection, Branch, BranchId, Bus, BusId, CgmError, CgmResult, Gen, GenId,
    InjectionId, InjectionKind, Load, LoadId, Megavars, Megawatts, Network, TieLineId,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub buses: Vec<BusSpec>,
    #[serde(default)]
    pub branches: Vec<BranchSpec>,
    #[serde(default)]
    pub generators: Vec<GenSpec>,
    #[serde(default)]
    pub loads: Vec<LoadSpec>,
    #[serde(default)]
    pub injections: Vec<InjectionSpec>,
    #[serde(default)]
    pub tie_lines: Vec<TieLineSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSpec {
    pub id: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub area: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSpec {
    pub id: usize,
    #[serde(default)]
    pub name: String,
    pub from_bus: usize,
    pub to_bus: usize,
    #[serde(default = "default_in_service")]
    pub in_service: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenSpec {
    pub id: usize,
    #[serde(default)]
    pub name: String,
    pub bus: usize,
    #[serde(default)]
    pub p_mw: f64,
    #[serde(default)]
    pub q_mvar: f64,
    #[serde(default = "default_in_service")]
    pub in_service: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSpec {
    pub id: usize,
    #[serde(default)]
    pub name: String,
    pub bus: usize,
    pub p_mw: f64,
    #[serde(default)]
    pub q_mvar: f64,
    #[serde(default = "default_conforming")]
    pub conforming: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionSpec {
    pub id: usize,
    #[serde(default)]
    pub name: String,
    pub bus: usize,
    #[serde(default)]
    pub kind: InjectionKind,
    pub p_mw: f64,
    #[serde(default)]
    pub q_mvar: f64,
    /// Last solved flow; defaults to the setpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_mw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_mvar: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieLineSpec {
    pub id: usize,
    #[serde(default)]
    pub name: String,
    pub from_injection: usize,
    pub to_injection: usize,
}

fn default_in_service() -> bool {
    true
}

fn default_conforming() -> bool {
    true
}

impl NetworkSnapshot {
    pub fn from_json(content: &str) -> CgmResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json_pretty(&self) -> CgmResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build the network graph, rejecting dangling or duplicate references.
    pub fn into_network(self) -> CgmResult<Network> {
        let mut network = Network::new();

        let mut bus_ids = HashSet::new();
        for bus in self.buses {
            if !bus_ids.insert(bus.id) {
                return Err(CgmError::Validation(format!("duplicate bus id {}", bus.id)));
            }
            network.add_bus(Bus {
                id: BusId::new(bus.id),
                name: bus.name,
                area: bus.area.map(AreaCode::from),
            });
        }

        let check_bus = |owner: &str, id: usize, bus: usize| -> CgmResult<()> {
            if bus_ids.contains(&bus) {
                Ok(())
            } else {
                Err(CgmError::Validation(format!(
                    "{owner} {id} references unknown bus {bus}"
                )))
            }
        };

        for branch in self.branches {
            check_bus("branch", branch.id, branch.from_bus)?;
            check_bus("branch", branch.id, branch.to_bus)?;
            let mut edge = Branch::new(
                BranchId::new(branch.id),
                branch.name,
                BusId::new(branch.from_bus),
                BusId::new(branch.to_bus),
            );
            edge.status = branch.in_service;
            network.add_branch(edge)?;
        }

        for gen in self.generators {
            check_bus("generator", gen.id, gen.bus)?;
            let mut g = Gen::new(GenId::new(gen.id), gen.name, BusId::new(gen.bus))
                .with_output(gen.p_mw, gen.q_mvar);
            g.status = gen.in_service;
            network.add_gen(g);
        }

        for load in self.loads {
            check_bus("load", load.id, load.bus)?;
            let mut l = Load::new(
                LoadId::new(load.id),
                load.name,
                BusId::new(load.bus),
                load.p_mw,
                load.q_mvar,
            );
            l.conforming = load.conforming;
            network.add_load(l);
        }

        let mut injection_ids = HashSet::new();
        for inj in self.injections {
            check_bus("boundary injection", inj.id, inj.bus)?;
            if !injection_ids.insert(inj.id) {
                return Err(CgmError::Validation(format!(
                    "duplicate boundary injection id {}",
                    inj.id
                )));
            }
            let id = InjectionId::new(inj.id);
            let bus = BusId::new(inj.bus);
            let mut element = match inj.kind {
                InjectionKind::Ac => BoundaryInjection::ac(id, inj.name, bus, inj.p_mw, inj.q_mvar),
                InjectionKind::Dc => {
                    let resource = inj.resource_id.clone().ok_or_else(|| {
                        CgmError::Validation(format!(
                            "DC injection {} has no resource_id",
                            inj.id
                        ))
                    })?;
                    BoundaryInjection::dc(id, inj.name, bus, resource, inj.p_mw, inj.q_mvar)
                }
            };
            if let Some(flow) = inj.flow_mw {
                element.flow_p = Megawatts(flow);
            }
            if let Some(flow) = inj.flow_mvar {
                element.flow_q = Megavars(flow);
            }
            if element.resource_id.is_none() {
                element.resource_id = inj.resource_id;
            }
            network.add_injection(element);
        }

        for tie in self.tie_lines {
            network
                .pair_injections(
                    TieLineId::new(tie.id),
                    tie.name,
                    InjectionId::new(tie.from_injection),
                    InjectionId::new(tie.to_injection),
                )
                .map_err(|err| match err {
                    CgmError::UnknownElement { kind, id } => CgmError::Validation(format!(
                        "tie-line {} references unknown {kind} {id}",
                        tie.id
                    )),
                    other => other,
                })?;
        }

        Ok(network)
    }
}

impl Network {
    pub fn from_snapshot(snapshot: NetworkSnapshot) -> CgmResult<Self> {
        snapshot.into_network()
    }

    /// Flatten the graph back into a snapshot.
    pub fn to_snapshot(&self, name: impl Into<String>) -> NetworkSnapshot {
        NetworkSnapshot {
            name: name.into(),
            buses: self
                .buses()
                .into_iter()
                .map(|b| BusSpec {
                    id: b.id.value(),
                    name: b.name.clone(),
                    area: b.area.as_ref().map(|a| a.to_string()),
                })
                .collect(),
            branches: self
                .branches()
                .into_iter()
                .map(|b| BranchSpec {
                    id: b.id.value(),
                    name: b.name.clone(),
                    from_bus: b.from_bus.value(),
                    to_bus: b.to_bus.value(),
                    in_service: b.status,
                })
                .collect(),
            generators: self
                .generators()
                .into_iter()
                .map(|g| GenSpec {
                    id: g.id.value(),
                    name: g.name.clone(),
                    bus: g.bus.value(),
                    p_mw: g.active_power.value(),
                    q_mvar: g.reactive_power.value(),
                    in_service: g.status,
                })
                .collect(),
            loads: self
                .loads()
                .into_iter()
                .map(|l| LoadSpec {
                    id: l.id.value(),
                    name: l.name.clone(),
                    bus: l.bus.value(),
                    p_mw: l.active_power.value(),
                    q_mvar: l.reactive_power.value(),
                    conforming: l.conforming,
                })
                .collect(),
            injections: self
                .injections()
                .into_iter()
                .map(|i| InjectionSpec {
                    id: i.id.value(),
                    name: i.name.clone(),
                    bus: i.bus.value(),
                    kind: i.kind,
                    p_mw: i.setpoint_p.value(),
                    q_mvar: i.setpoint_q.value(),
                    flow_mw: Some(i.flow_p.value()),
                    flow_mvar: Some(i.flow_q.value()),
                    resource_id: i.resource_id.clone(),
                })
                .collect(),
            tie_lines: self
                .tie_lines()
                .into_iter()
                .map(|t| TieLineSpec {
                    id: t.id.value(),
                    name: t.name.clone(),
                    from_injection: t.from_injection.value(),
                    to_injection: t.to_injection.value(),
                })
                .collect(),
        }
    }
}

/// Read a JSON snapshot file and build the network.
pub fn load_snapshot(path: impl AsRef<Path>) -> CgmResult<Network> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let snapshot = NetworkSnapshot::from_json(&content)
        .map_err(|e| CgmError::Parse(format!("{}: {e}", path.display())))?;
    snapshot.into_network()
}
