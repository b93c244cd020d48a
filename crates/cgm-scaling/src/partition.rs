//! Area / island bookkeeping for one balancing run.
//!
//! Every boundary injection and load belongs to one control area (through its
//! bus) and one island. An area whose injections show up in more than one
//! island is *fragmented*; its schedule is split over those islands with
//! participation weights that sum to 1.

use std::collections::{BTreeMap, BTreeSet};

use cgm_core::{AreaCode, ComponentId, NetworkModel};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Valid,
    /// No boundary injections, nothing to balance against a schedule. Holds
    /// for islands spanning several areas too, not only single-area ones.
    Internal,
    /// Power flow did not converge; excluded for the rest of the run
    Diverged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedComponent {
    pub id: ComponentId,
    pub bus_count: usize,
    /// Areas owning at least one boundary injection in this island
    pub areas: BTreeSet<AreaCode>,
    pub state: ComponentState,
}

impl ConnectedComponent {
    pub fn is_valid(&self) -> bool {
        self.state == ComponentState::Valid
    }
}

#[derive(Debug, Clone, Default)]
pub struct AreaPartition {
    components: BTreeMap<ComponentId, ConnectedComponent>,
    area_components: BTreeMap<AreaCode, BTreeSet<ComponentId>>,
    weights: BTreeMap<(AreaCode, ComponentId), f64>,
}

impl AreaPartition {
    pub fn component(&self, id: ComponentId) -> Option<&ConnectedComponent> {
        self.components.get(&id)
    }

    pub fn components(&self) -> impl Iterator<Item = &ConnectedComponent> {
        self.components.values()
    }

    pub fn is_valid(&self, id: ComponentId) -> bool {
        self.components.get(&id).is_some_and(|c| c.is_valid())
    }

    pub fn valid_components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components
            .values()
            .filter(|c| c.is_valid())
            .map(|c| c.id)
    }

    /// Drop an island from the valid set. Returns false if it was not valid.
    pub fn mark_diverged(&mut self, id: ComponentId) -> bool {
        match self.components.get_mut(&id) {
            Some(component) if component.is_valid() => {
                component.state = ComponentState::Diverged;
                true
            }
            _ => false,
        }
    }

    pub fn diverged_components(&self) -> Vec<ComponentId> {
        self.components
            .values()
            .filter(|c| c.state == ComponentState::Diverged)
            .map(|c| c.id)
            .collect()
    }

    pub fn areas(&self) -> impl Iterator<Item = &AreaCode> {
        self.area_components.keys()
    }

    pub fn contains_area(&self, area: &AreaCode) -> bool {
        self.area_components.contains_key(area)
    }

    pub fn components_of(&self, area: &AreaCode) -> impl Iterator<Item = ComponentId> + '_ {
        self.area_components
            .get(area)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn is_fragmented(&self, area: &AreaCode) -> bool {
        self.area_components
            .get(area)
            .is_some_and(|set| set.len() > 1)
    }

    pub fn fragmented_areas(&self) -> Vec<&AreaCode> {
        self.area_components
            .iter()
            .filter(|(_, set)| set.len() > 1)
            .map(|(area, _)| area)
            .collect()
    }

    /// Share of `area`'s schedule carried by `component`: 1 for an area in a
    /// single island, 0 for an island the area is not part of.
    pub fn weight(&self, area: &AreaCode, component: ComponentId) -> f64 {
        self.weights
            .get(&(area.clone(), component))
            .copied()
            .unwrap_or(0.0)
    }

    /// True when every island of `area` has diverged.
    pub fn area_lost(&self, area: &AreaCode) -> bool {
        self.components_of(area).all(|c| !self.is_valid(c))
    }
}

/// Partition the model into islands and areas.
///
/// Islands with fewer than `min_buses` buses are dropped entirely.
pub fn partition_areas<M: NetworkModel + ?Sized>(model: &M, min_buses: usize) -> AreaPartition {
    let mut bus_counts: BTreeMap<ComponentId, usize> = BTreeMap::new();
    for bus in model.buses() {
        if let Some(component) = bus.component {
            *bus_counts.entry(component).or_default() += 1;
        }
    }

    let mut partition = AreaPartition::default();
    for (&id, &bus_count) in &bus_counts {
        if bus_count < min_buses {
            debug!(component = %id, bus_count, "ignoring island below size threshold");
            continue;
        }
        partition.components.insert(
            id,
            ConnectedComponent {
                id,
                bus_count,
                areas: BTreeSet::new(),
                state: ComponentState::Internal,
            },
        );
    }

    // |unpaired AC flow| per (area, island)
    let mut unpaired: BTreeMap<(AreaCode, ComponentId), f64> = BTreeMap::new();
    for inj in model.boundary_injections() {
        let (Some(area), Some(component)) = (inj.area.clone(), inj.component) else {
            continue;
        };
        let Some(entry) = partition.components.get_mut(&component) else {
            continue;
        };
        entry.state = ComponentState::Valid;
        entry.areas.insert(area.clone());
        partition
            .area_components
            .entry(area.clone())
            .or_default()
            .insert(component);
        let flow = unpaired.entry((area, component)).or_default();
        if inj.is_unpaired_ac() {
            *flow += inj.flow_p.value();
        }
    }

    for (area, components) in &partition.area_components {
        if components.len() == 1 {
            for &component in components {
                partition.weights.insert((area.clone(), component), 1.0);
            }
            continue;
        }
        let magnitudes: Vec<(ComponentId, f64)> = components
            .iter()
            .map(|&c| {
                let flow = unpaired.get(&(area.clone(), c)).copied().unwrap_or(0.0);
                (c, flow.abs())
            })
            .collect();
        let total: f64 = magnitudes.iter().map(|(_, m)| m).sum();
        for (component, magnitude) in magnitudes {
            let weight = if total > 0.0 {
                magnitude / total
            } else {
                1.0 / components.len() as f64
            };
            partition.weights.insert((area.clone(), component), weight);
        }
        debug!(area = %area, islands = components.len(), "fragmented area");
    }

    partition
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgm_core::{
        BoundaryInjection, Branch, BranchId, Bus, BusId, CgmResult, ComponentLabels,
        ComponentSolution, GridModel, InjectionId, Network, PowerFlowOracle,
    };

    struct NoSolve;

    impl PowerFlowOracle for NoSolve {
        fn solve(&mut self, _: &mut Network, _: &ComponentLabels) -> CgmResult<Vec<ComponentSolution>> {
            Ok(Vec::new())
        }
    }

    fn island(network: &mut Network, area: &str, first: usize, size: usize) {
        for id in first..first + size {
            network.add_bus(Bus::new(BusId::new(id), format!("{area}{id}"), area));
        }
        for id in first..first + size - 1 {
            network
                .add_branch(Branch::new(BranchId::new(id), "", BusId::new(id), BusId::new(id + 1)))
                .unwrap();
        }
    }

    #[test]
    fn fragmented_weights_follow_unpaired_flow() {
        let mut network = Network::new();
        island(&mut network, "A", 1, 3);
        island(&mut network, "A", 10, 2);
        network.add_injection(BoundaryInjection::ac(InjectionId::new(1), "a1", BusId::new(1), 30.0, 0.0));
        network.add_injection(BoundaryInjection::ac(InjectionId::new(2), "a2", BusId::new(10), -10.0, 0.0));
        let model = GridModel::new(network, NoSolve);

        let partition = partition_areas(&model, 2);
        let area = AreaCode::from("A");
        assert!(partition.is_fragmented(&area));
        let w0 = partition.weight(&area, ComponentId::new(0));
        let w1 = partition.weight(&area, ComponentId::new(1));
        assert!((w0 - 0.75).abs() < 1e-12);
        assert!((w0 + w1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_flow_fragments_split_equally() {
        let mut network = Network::new();
        island(&mut network, "A", 1, 2);
        island(&mut network, "A", 10, 2);
        island(&mut network, "A", 20, 2);
        for (i, bus) in [1usize, 10, 20].into_iter().enumerate() {
            network.add_injection(BoundaryInjection::ac(InjectionId::new(i), "", BusId::new(bus), 0.0, 0.0));
        }
        let partition = partition_areas(&GridModel::new(network, NoSolve), 2);
        let area = AreaCode::from("A");
        let total: f64 = partition.components_of(&area).map(|c| partition.weight(&area, c)).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((partition.weight(&area, ComponentId::new(2)) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn islands_without_injections_are_internal() {
        let mut network = Network::new();
        island(&mut network, "A", 1, 3);
        island(&mut network, "B", 10, 2);
        network.add_injection(BoundaryInjection::ac(InjectionId::new(1), "", BusId::new(1), 5.0, 0.0));
        let partition = partition_areas(&GridModel::new(network, NoSolve), 2);

        assert!(partition.is_valid(ComponentId::MAIN));
        assert_eq!(
            partition.component(ComponentId::new(1)).unwrap().state,
            ComponentState::Internal
        );
        assert!(!partition.contains_area(&AreaCode::from("B")));
        assert_eq!(partition.weight(&AreaCode::from("A"), ComponentId::MAIN), 1.0);
    }

    #[test]
    fn multi_area_island_without_injections_is_internal() {
        let mut network = Network::new();
        island(&mut network, "A", 1, 4);
        island(&mut network, "B", 10, 2);
        island(&mut network, "C", 20, 1);
        network
            .add_branch(Branch::new(BranchId::new(99), "B-C", BusId::new(11), BusId::new(20)))
            .unwrap();
        network.add_injection(BoundaryInjection::ac(InjectionId::new(1), "", BusId::new(1), 5.0, 0.0));
        let partition = partition_areas(&GridModel::new(network, NoSolve), 2);

        let mixed = partition.component(ComponentId::new(1)).unwrap();
        assert_eq!(mixed.bus_count, 3);
        assert_eq!(mixed.state, ComponentState::Internal);
        assert!(mixed.areas.is_empty());
    }

    #[test]
    fn small_islands_are_dropped() {
        let mut network = Network::new();
        island(&mut network, "A", 1, 3);
        island(&mut network, "B", 10, 1);
        network.add_injection(BoundaryInjection::ac(InjectionId::new(1), "", BusId::new(10), 5.0, 0.0));
        let partition = partition_areas(&GridModel::new(network, NoSolve), 2);
        assert!(partition.component(ComponentId::new(1)).is_none());
        assert!(!partition.contains_area(&AreaCode::from("B")));
    }

    #[test]
    fn divergence_removes_island_from_valid_set() {
        let mut network = Network::new();
        island(&mut network, "A", 1, 2);
        network.add_injection(BoundaryInjection::ac(InjectionId::new(1), "", BusId::new(1), 5.0, 0.0));
        let mut partition = partition_areas(&GridModel::new(network, NoSolve), 2);

        assert!(partition.mark_diverged(ComponentId::MAIN));
        assert!(!partition.mark_diverged(ComponentId::MAIN));
        assert_eq!(partition.valid_components().count(), 0);
        assert!(partition.area_lost(&AreaCode::from("A")));
        assert_eq!(partition.diverged_components(), vec![ComponentId::MAIN]);
    }
}
