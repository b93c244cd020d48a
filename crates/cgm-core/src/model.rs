//! Capability interface the balancing engine works against.
//!
//! [`NetworkModel`] exposes one method per element category and resolves the
//! area and island of every element, so callers never join bus tables by hand.
//! [`GridModel`] implements it for a [`Network`] plus any [`PowerFlowOracle`].
//!
//! A model is mutated in place. Whoever runs a balancing pass owns it for the
//! whole pass; nothing here synchronises concurrent access.

use std::collections::HashMap;

use crate::graph_utils::{label_components, ComponentLabels};
use crate::{
    AreaCode, BusId, CgmError, CgmResult, ComponentId, ComponentSolution, InjectionId,
    InjectionKind, LoadId, Megavars, Megawatts, Network, PowerFlowOracle,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BusRecord {
    pub id: BusId,
    pub name: String,
    pub area: Option<AreaCode>,
    pub component: Option<ComponentId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InjectionRecord {
    pub id: InjectionId,
    pub name: String,
    pub area: Option<AreaCode>,
    pub component: Option<ComponentId>,
    pub kind: InjectionKind,
    pub setpoint_p: Megawatts,
    pub setpoint_q: Megavars,
    pub flow_p: Megawatts,
    pub flow_q: Megavars,
    pub paired: bool,
    pub resource_id: Option<String>,
}

impl InjectionRecord {
    #[inline]
    pub fn is_dc(&self) -> bool {
        self.kind == InjectionKind::Dc
    }

    /// AC injection leading out of the merged model.
    #[inline]
    pub fn is_unpaired_ac(&self) -> bool {
        !self.paired && !self.is_dc()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord {
    pub id: LoadId,
    pub name: String,
    pub area: Option<AreaCode>,
    pub component: Option<ComponentId>,
    /// Consumption-positive
    pub active_power: Megawatts,
    pub reactive_power: Megavars,
    pub conforming: bool,
}

pub trait NetworkModel {
    fn buses(&self) -> Vec<BusRecord>;

    fn boundary_injections(&self) -> Vec<InjectionRecord>;

    fn loads(&self) -> Vec<LoadRecord>;

    /// The island whose divergence aborts a balancing run.
    fn main_component(&self) -> Option<ComponentId>;

    /// Write an export-positive setpoint to a boundary injection.
    fn set_injection_setpoint(
        &mut self,
        id: InjectionId,
        p: Megawatts,
        q: Megavars,
    ) -> CgmResult<()>;

    /// Write a consumption-positive setpoint to a load.
    fn set_load_setpoint(&mut self, id: LoadId, p: Megawatts, q: Megavars) -> CgmResult<()>;

    /// Run the power flow; one result per island attempted.
    fn solve(&mut self) -> CgmResult<Vec<ComponentSolution>>;
}

/// [`Network`] + [`PowerFlowOracle`] adapter.
///
/// Island labels are computed once at construction: balancing changes
/// setpoints, never topology.
#[derive(Debug)]
pub struct GridModel<O> {
    network: Network,
    oracle: O,
    labels: ComponentLabels,
}

impl<O: PowerFlowOracle> GridModel<O> {
    pub fn new(network: Network, oracle: O) -> Self {
        let labels = label_components(&network);
        Self {
            network,
            oracle,
            labels,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn labels(&self) -> &ComponentLabels {
        &self.labels
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn into_parts(self) -> (Network, O) {
        (self.network, self.oracle)
    }

    fn placement(&self) -> HashMap<BusId, (Option<AreaCode>, Option<ComponentId>)> {
        self.network
            .buses()
            .into_iter()
            .map(|b| (b.id, (b.area.clone(), self.labels.component_of(b.id))))
            .collect()
    }
}

impl<O: PowerFlowOracle> NetworkModel for GridModel<O> {
    fn buses(&self) -> Vec<BusRecord> {
        self.network
            .buses()
            .into_iter()
            .map(|b| BusRecord {
                id: b.id,
                name: b.name.clone(),
                area: b.area.clone(),
                component: self.labels.component_of(b.id),
            })
            .collect()
    }

    fn boundary_injections(&self) -> Vec<InjectionRecord> {
        let placement = self.placement();
        self.network
            .injections()
            .into_iter()
            .map(|inj| {
                let (area, component) = placement.get(&inj.bus).cloned().unwrap_or_default();
                InjectionRecord {
                    id: inj.id,
                    name: inj.name.clone(),
                    area,
                    component,
                    kind: inj.kind,
                    setpoint_p: inj.setpoint_p,
                    setpoint_q: inj.setpoint_q,
                    flow_p: inj.flow_p,
                    flow_q: inj.flow_q,
                    paired: inj.is_paired(),
                    resource_id: inj.resource_id.clone(),
                }
            })
            .collect()
    }

    fn loads(&self) -> Vec<LoadRecord> {
        let placement = self.placement();
        self.network
            .loads()
            .into_iter()
            .map(|load| {
                let (area, component) = placement.get(&load.bus).cloned().unwrap_or_default();
                LoadRecord {
                    id: load.id,
                    name: load.name.clone(),
                    area,
                    component,
                    active_power: load.active_power,
                    reactive_power: load.reactive_power,
                    conforming: load.conforming,
                }
            })
            .collect()
    }

    fn main_component(&self) -> Option<ComponentId> {
        self.labels.main()
    }

    fn set_injection_setpoint(
        &mut self,
        id: InjectionId,
        p: Megawatts,
        q: Megavars,
    ) -> CgmResult<()> {
        let inj = self
            .network
            .injection_mut(id)
            .ok_or_else(|| CgmError::unknown("boundary injection", id))?;
        inj.setpoint_p = p;
        inj.setpoint_q = q;
        Ok(())
    }

    fn set_load_setpoint(&mut self, id: LoadId, p: Megawatts, q: Megavars) -> CgmResult<()> {
        let load = self
            .network
            .load_mut(id)
            .ok_or_else(|| CgmError::unknown("load", id))?;
        load.active_power = p;
        load.reactive_power = q;
        Ok(())
    }

    fn solve(&mut self) -> CgmResult<Vec<ComponentSolution>> {
        self.oracle.solve(&mut self.network, &self.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoundaryInjection, Branch, BranchId, Bus, Load, TieLineId};

    /// Copies setpoints to flows and reports every island converged.
    struct EchoOracle {
        calls: usize,
    }

    impl PowerFlowOracle for EchoOracle {
        fn solve(
            &mut self,
            network: &mut Network,
            labels: &ComponentLabels,
        ) -> CgmResult<Vec<ComponentSolution>> {
            self.calls += 1;
            for node in network.graph.node_weights_mut() {
                if let crate::Node::Injection(inj) = node {
                    inj.flow_p = inj.setpoint_p;
                    inj.flow_q = inj.setpoint_q;
                }
            }
            Ok(labels
                .islands()
                .iter()
                .map(|i| ComponentSolution::converged(i.component, 1))
                .collect())
        }
    }

    fn model() -> GridModel<EchoOracle> {
        let mut network = Network::new();
        network.add_bus(Bus::new(BusId::new(1), "A-1", "A"));
        network.add_bus(Bus::new(BusId::new(2), "A-2", "A"));
        network.add_bus(Bus::new(BusId::new(3), "B-1", "B"));
        network
            .add_branch(Branch::new(BranchId::new(1), "1-2", BusId::new(1), BusId::new(2)))
            .unwrap();
        network.add_load(Load::new(LoadId::new(1), "LA", BusId::new(2), 50.0, 5.0));
        network.add_injection(BoundaryInjection::ac(InjectionId::new(1), "A-B", BusId::new(2), 10.0, 0.0));
        network.add_injection(BoundaryInjection::ac(InjectionId::new(2), "B-A", BusId::new(3), -10.0, 0.0));
        network.add_injection(BoundaryInjection::ac(InjectionId::new(3), "A-X", BusId::new(1), 7.0, 1.0));
        network
            .pair_injections(TieLineId::new(1), "A-B", InjectionId::new(1), InjectionId::new(2))
            .unwrap();
        GridModel::new(network, EchoOracle { calls: 0 })
    }

    #[test]
    fn records_resolve_area_and_component() {
        let model = model();
        let injections = model.boundary_injections();
        let outer = injections.iter().find(|i| i.id == InjectionId::new(3)).unwrap();
        assert_eq!(outer.area, Some(AreaCode::from("A")));
        assert_eq!(outer.component, Some(ComponentId::MAIN));
        assert!(outer.is_unpaired_ac());

        let tie_half = injections.iter().find(|i| i.id == InjectionId::new(2)).unwrap();
        assert!(tie_half.paired);
        assert_eq!(tie_half.area, Some(AreaCode::from("B")));

        let loads = model.loads();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].component, Some(ComponentId::MAIN));
    }

    #[test]
    fn setpoints_are_written_and_solved() {
        let mut model = model();
        model
            .set_injection_setpoint(InjectionId::new(3), Megawatts(12.0), Megavars(2.0))
            .unwrap();
        model
            .set_load_setpoint(LoadId::new(1), Megawatts(40.0), Megavars(4.0))
            .unwrap();
        let results = model.solve().unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(model.oracle().calls, 1);
        let inj = model.network().injection(InjectionId::new(3)).unwrap();
        assert_eq!(inj.flow_p, Megawatts(12.0));
        assert_eq!(model.network().load(LoadId::new(1)).unwrap().active_power, Megawatts(40.0));
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut model = model();
        let err = model
            .set_load_setpoint(LoadId::new(99), Megawatts(1.0), Megavars(0.0))
            .unwrap_err();
        assert!(matches!(err, CgmError::UnknownElement { kind: "load", .. }));
        assert!(model
            .set_injection_setpoint(InjectionId::new(99), Megawatts(1.0), Megavars(0.0))
            .is_err());
    }

    #[test]
    fn main_component_is_largest_island() {
        assert_eq!(model().main_component(), Some(ComponentId::MAIN));
    }
}
