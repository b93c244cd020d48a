use crate::{BusId, ComponentId, Network, Node};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};

/// One electrical island.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IslandSummary {
    pub component: ComponentId,
    pub bus_count: usize,
}

/// Bus → island assignment for a network.
///
/// Islands are numbered by descending bus count (ties: smallest bus id first),
/// so [`ComponentId::MAIN`] is always the largest island.
#[derive(Debug, Clone, Default)]
pub struct ComponentLabels {
    bus_component: HashMap<BusId, ComponentId>,
    islands: Vec<IslandSummary>,
}

impl ComponentLabels {
    pub fn component_of(&self, bus: BusId) -> Option<ComponentId> {
        self.bus_component.get(&bus).copied()
    }

    pub fn islands(&self) -> &[IslandSummary] {
        &self.islands
    }

    pub fn main(&self) -> Option<ComponentId> {
        self.islands.first().map(|i| i.component)
    }

    pub fn bus_count(&self, component: ComponentId) -> usize {
        self.islands
            .iter()
            .find(|i| i.component == component)
            .map(|i| i.bus_count)
            .unwrap_or(0)
    }

    /// Buses grouped per island, in island order.
    pub fn members(&self) -> Vec<(ComponentId, Vec<BusId>)> {
        let mut grouped: Vec<(ComponentId, Vec<BusId>)> = self
            .islands
            .iter()
            .map(|i| (i.component, Vec::with_capacity(i.bus_count)))
            .collect();
        for (bus, component) in &self.bus_component {
            grouped[component.value()].1.push(*bus);
        }
        for (_, buses) in grouped.iter_mut() {
            buses.sort();
        }
        grouped
    }
}

/// Breadth-first island labelling over buses joined by closed branches and tie-lines.
pub fn label_components(network: &Network) -> ComponentLabels {
    let graph = &network.graph;
    let mut visited = HashSet::new();
    let mut groups: Vec<Vec<BusId>> = Vec::new();

    for start in graph.node_indices() {
        if !matches!(graph[start], Node::Bus(_)) || visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::new();
        queue.push_back(start);
        let mut members = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            if let Node::Bus(bus) = &graph[node] {
                members.push(bus.id);
            }
            for edge in graph.edges(node) {
                if !edge.weight().is_closed() {
                    continue;
                }
                let other = if edge.source() == node {
                    edge.target()
                } else {
                    edge.source()
                };
                if !visited.contains(&other) && matches!(graph[other], Node::Bus(_)) {
                    queue.push_back(other);
                }
            }
        }
        members.sort();
        groups.push(members);
    }

    groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.first().cmp(&b.first())));

    let mut labels = ComponentLabels::default();
    for (idx, members) in groups.into_iter().enumerate() {
        let component = ComponentId::new(idx);
        labels.islands.push(IslandSummary {
            component,
            bus_count: members.len(),
        });
        for bus in members {
            labels.bus_component.insert(bus, component);
        }
    }
    labels
}
