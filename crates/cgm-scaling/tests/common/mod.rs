//! Shared fixtures: a transport-model power flow and small merged networks.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};

use cgm_core::{
    AreaCode, BoundaryInjection, Branch, BranchId, Bus, BusId, CgmResult, ComponentId,
    ComponentLabels, ComponentSolution, Gen, GenId, GridModel, InjectionId, Load, LoadId,
    Megawatts, Network, Node, PowerFlowOracle, SolveStatus, TieLineId,
};

/// Lossy transport model with distributed slack.
///
/// Per island: every area's surplus is `generation - (1 + loss_factor) * load`.
/// Unpaired AC and DC injections flow at their setpoint. The island imbalance
/// is spread over its areas in equal shares, and whatever an area still has
/// to export leaves over its tie-lines. Corridor flows are found by peeling
/// leaves off the area tree, so meshed area graphs are not supported.
#[derive(Debug, Default)]
pub struct TransportOracle {
    pub loss_factor: f64,
    pub solves: usize,
    /// `(solve number, island)` pairs that report `Failed`; solves count from 1
    pub failures: Vec<(usize, ComponentId)>,
}

impl TransportOracle {
    pub fn lossless() -> Self {
        Self::default()
    }

    pub fn with_losses(loss_factor: f64) -> Self {
        Self {
            loss_factor,
            ..Self::default()
        }
    }

    pub fn fail_on(mut self, solve: usize, component: ComponentId) -> Self {
        self.failures.push((solve, component));
        self
    }
}

impl PowerFlowOracle for TransportOracle {
    fn solve(
        &mut self,
        network: &mut Network,
        labels: &ComponentLabels,
    ) -> CgmResult<Vec<ComponentSolution>> {
        self.solves += 1;
        let area_of: HashMap<BusId, Option<AreaCode>> = network
            .buses()
            .into_iter()
            .map(|b| (b.id, b.area.clone()))
            .collect();
        let place = |bus: BusId| -> Option<(AreaCode, ComponentId)> {
            let area = area_of.get(&bus).cloned().flatten()?;
            Some((area, labels.component_of(bus)?))
        };

        let mut surplus: BTreeMap<(ComponentId, AreaCode), f64> = BTreeMap::new();
        let mut external: BTreeMap<(ComponentId, AreaCode), f64> = BTreeMap::new();
        for node in network.graph.node_weights() {
            match node {
                Node::Gen(g) if g.status => {
                    if let Some((area, c)) = place(g.bus) {
                        *surplus.entry((c, area)).or_default() += g.active_power.value();
                    }
                }
                Node::Load(l) => {
                    if let Some((area, c)) = place(l.bus) {
                        *surplus.entry((c, area)).or_default() -=
                            (1.0 + self.loss_factor) * l.active_power.value();
                    }
                }
                Node::Injection(i) if !i.is_paired() => {
                    if let Some((area, c)) = place(i.bus) {
                        *external.entry((c, area.clone())).or_default() += i.setpoint_p.value();
                        surplus.entry((c, area)).or_default();
                    }
                }
                Node::Injection(i) => {
                    if let Some((area, c)) = place(i.bus) {
                        surplus.entry((c, area)).or_default();
                    }
                }
                _ => {}
            }
        }

        // corridor (from area, to area) -> tie-lines oriented from -> to
        let mut corridors: BTreeMap<(ComponentId, AreaCode, AreaCode), Vec<(InjectionId, InjectionId)>> =
            BTreeMap::new();
        for tie in network.tie_lines() {
            let (Some((a, c)), Some((b, _))) = (place(tie.from_bus), place(tie.to_bus)) else {
                continue;
            };
            if a == b {
                continue;
            }
            if a < b {
                corridors
                    .entry((c, a, b))
                    .or_default()
                    .push((tie.from_injection, tie.to_injection));
            } else {
                corridors
                    .entry((c, b, a))
                    .or_default()
                    .push((tie.to_injection, tie.from_injection));
            }
        }

        let mut flows: HashMap<InjectionId, f64> = HashMap::new();
        let mut solutions = Vec::new();
        for island in labels.islands() {
            let c = island.component;
            let areas: Vec<AreaCode> = surplus
                .keys()
                .filter(|(comp, _)| *comp == c)
                .map(|(_, a)| a.clone())
                .collect();
            let total_external: f64 = areas
                .iter()
                .map(|a| external.get(&(c, a.clone())).copied().unwrap_or(0.0))
                .sum();
            let total_surplus: f64 = areas.iter().map(|a| surplus[&(c, a.clone())]).sum();
            let imbalance = total_external - total_surplus;
            let share = if areas.is_empty() {
                0.0
            } else {
                imbalance / areas.len() as f64
            };

            // what each area still has to push over its tie-lines
            let mut export: BTreeMap<AreaCode, f64> = areas
                .iter()
                .map(|a| {
                    let ext = external.get(&(c, a.clone())).copied().unwrap_or(0.0);
                    (a.clone(), surplus[&(c, a.clone())] + share - ext)
                })
                .collect();

            let mut open: Vec<(AreaCode, AreaCode)> = corridors
                .keys()
                .filter(|(comp, _, _)| *comp == c)
                .map(|(_, a, b)| (a.clone(), b.clone()))
                .collect();
            let mut corridor_flow: BTreeMap<(AreaCode, AreaCode), f64> = BTreeMap::new();
            loop {
                let leaf = export.keys().find(|area| {
                    open.iter().filter(|(a, b)| a == *area || b == *area).count() == 1
                });
                let Some(leaf) = leaf.cloned() else {
                    break;
                };
                let idx = open
                    .iter()
                    .position(|(a, b)| *a == leaf || *b == leaf)
                    .unwrap();
                let (a, b) = open.remove(idx);
                let amount = export.remove(&leaf).unwrap_or(0.0);
                let (other, flow_ab) = if a == leaf { (b.clone(), amount) } else { (a.clone(), -amount) };
                *export.entry(other).or_default() += amount;
                corridor_flow.insert((a, b), flow_ab);
            }

            for ((a, b), flow) in corridor_flow {
                let ties = &corridors[&(c, a, b)];
                let per_tie = flow / ties.len() as f64;
                for (from_a, to_b) in ties {
                    flows.insert(*from_a, per_tie);
                    flows.insert(*to_b, -per_tie);
                }
            }

            let failed = self
                .failures
                .iter()
                .any(|&(solve, comp)| solve == self.solves && comp == c);
            let solution = if failed {
                ComponentSolution::with_status(c, SolveStatus::Failed)
            } else {
                ComponentSolution::converged(c, 3)
            };
            solutions.push(solution.with_slack(BusId::default(), Megawatts(imbalance)));
        }

        for node in network.graph.node_weights_mut() {
            if let Node::Injection(inj) = node {
                if inj.is_paired() {
                    inj.flow_p = Megawatts(flows.get(&inj.id).copied().unwrap_or(0.0));
                } else {
                    inj.flow_p = inj.setpoint_p;
                }
                inj.flow_q = inj.setpoint_q;
            }
        }
        Ok(solutions)
    }
}

/// Chain of buses in one area, joined by branches.
pub fn add_area(network: &mut Network, area: &str, buses: &[usize]) {
    for &id in buses {
        network.add_bus(Bus::new(BusId::new(id), format!("{area}-{id}"), area));
    }
    for pair in buses.windows(2) {
        network
            .add_branch(Branch::new(
                BranchId::new(pair[0] * 1000 + pair[1]),
                format!("{}-{}", pair[0], pair[1]),
                BusId::new(pair[0]),
                BusId::new(pair[1]),
            ))
            .unwrap();
    }
}

pub fn add_tie(network: &mut Network, id: usize, from_bus: usize, to_bus: usize) {
    let from = InjectionId::new(id * 2);
    let to = InjectionId::new(id * 2 + 1);
    network.add_injection(BoundaryInjection::ac(from, format!("tie {id} (from)"), BusId::new(from_bus), 0.0, 0.0));
    network.add_injection(BoundaryInjection::ac(to, format!("tie {id} (to)"), BusId::new(to_bus), 0.0, 0.0));
    network
        .pair_injections(TieLineId::new(id), format!("tie {id}"), from, to)
        .unwrap();
}

/// Two areas joined by one tie-line.
///
/// Area A: 500 MW generation, 600 + 240 MW load. Area B: 1000 MW generation,
/// 660 MW load. Lossless, A imports 340 MW; against targets of -300/+300 the
/// offsets are -40/+40.
pub fn two_areas() -> Network {
    let mut network = Network::new();
    add_area(&mut network, "A", &[1, 2, 3]);
    add_area(&mut network, "B", &[11, 12, 13]);
    network.add_gen(Gen::new(GenId::new(1), "GA", BusId::new(1)).with_output(500.0, 0.0));
    network.add_load(Load::new(LoadId::new(1), "LA1", BusId::new(2), 600.0, 60.0));
    network.add_load(Load::new(LoadId::new(2), "LA2", BusId::new(3), 240.0, 24.0));
    network.add_gen(Gen::new(GenId::new(2), "GB", BusId::new(11)).with_output(1000.0, 0.0));
    network.add_load(Load::new(LoadId::new(3), "LB", BusId::new(12), 660.0, 66.0));
    add_tie(&mut network, 1, 3, 11);
    network
}

/// Single-area island with an HVDC terminal and an unpaired AC line.
pub fn dc_island() -> Network {
    let mut network = Network::new();
    add_area(&mut network, "X", &[1, 2]);
    network.add_gen(Gen::new(GenId::new(1), "GX", BusId::new(1)).with_output(300.0, 0.0));
    network.add_load(Load::new(LoadId::new(1), "LX", BusId::new(2), 200.0, 20.0));
    network.add_injection(BoundaryInjection::dc(
        InjectionId::new(1),
        "HVDC1 X",
        BusId::new(1),
        "HVDC1",
        50.0,
        5.0,
    ));
    network.add_injection(BoundaryInjection::ac(InjectionId::new(2), "X-out", BusId::new(2), 50.0, 0.0));
    network
}

pub fn model(network: Network, oracle: TransportOracle) -> GridModel<TransportOracle> {
    GridModel::new(network, oracle)
}

/// Solve once so boundary flows are consistent before balancing.
pub fn solved(network: Network, oracle: TransportOracle) -> GridModel<TransportOracle> {
    use cgm_core::NetworkModel;
    let mut model = GridModel::new(network, oracle);
    model.solve().unwrap();
    model.oracle_mut().solves = 0;
    model
}

pub fn approx(a: Megawatts, b: f64, tol: f64) -> bool {
    (a.value() - b).abs() <= tol
}
