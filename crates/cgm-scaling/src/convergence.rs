//! Net positions, offsets and the convergence decision.

use std::collections::BTreeMap;

use cgm_core::{AreaCode, ComponentId, ComponentSolution, InjectionRecord, Megawatts};
use serde::{Deserialize, Serialize};

use crate::partition::AreaPartition;

/// Net position of one area inside one island.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaBalance {
    pub area: AreaCode,
    pub component: ComponentId,
    /// Sum of the area's AC boundary flows in the island (export-positive)
    pub net_position: Megawatts,
    /// Area target times the island's participation weight
    pub target: Megawatts,
    pub offset: Megawatts,
}

/// Area-level totals over all valid islands.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AreaTotals {
    pub net_position: Megawatts,
    pub target: Megawatts,
    pub offset: Megawatts,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceTable {
    pub rows: Vec<AreaBalance>,
}

impl BalanceTable {
    pub fn area_totals(&self) -> BTreeMap<AreaCode, AreaTotals> {
        let mut totals: BTreeMap<AreaCode, AreaTotals> = BTreeMap::new();
        for row in &self.rows {
            let entry = totals.entry(row.area.clone()).or_default();
            entry.net_position += row.net_position;
            entry.target += row.target;
            entry.offset += row.offset;
        }
        totals
    }

    pub fn area_offsets(&self) -> BTreeMap<AreaCode, Megawatts> {
        self.area_totals()
            .into_iter()
            .map(|(area, t)| (area, t.offset))
            .collect()
    }
}

/// Offsets of every scheduled area in every valid island.
///
/// Areas without a target are skipped: their offset is never computed.
pub fn compute_balances(
    injections: &[InjectionRecord],
    partition: &AreaPartition,
    targets: &BTreeMap<AreaCode, Megawatts>,
) -> BalanceTable {
    let mut flows: BTreeMap<(AreaCode, ComponentId), Megawatts> = BTreeMap::new();
    for inj in injections.iter().filter(|i| !i.is_dc()) {
        if let (Some(area), Some(component)) = (&inj.area, inj.component) {
            *flows.entry((area.clone(), component)).or_default() += inj.flow_p;
        }
    }

    let mut rows = Vec::new();
    for (area, &target) in targets {
        for component in partition.components_of(area) {
            if !partition.is_valid(component) {
                continue;
            }
            let net_position = flows
                .get(&(area.clone(), component))
                .copied()
                .unwrap_or_default();
            let target = target * partition.weight(area, component);
            rows.push(AreaBalance {
                area: area.clone(),
                component,
                net_position,
                target,
                offset: net_position - target,
            });
        }
    }
    BalanceTable { rows }
}

/// Result of one convergence check.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub converged: bool,
    pub max_abs_offset: Megawatts,
    /// Change of each area offset since the previous check
    pub deltas: BTreeMap<AreaCode, Megawatts>,
}

#[derive(Debug, Clone, Copy)]
pub struct ConvergenceEvaluator {
    threshold: f64,
}

impl ConvergenceEvaluator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Inclusive: an offset exactly at the threshold is balanced.
    pub fn within(&self, offset: Megawatts) -> bool {
        offset.value().abs() <= self.threshold
    }

    pub fn evaluate(
        &self,
        current: &BTreeMap<AreaCode, Megawatts>,
        previous: Option<&BTreeMap<AreaCode, Megawatts>>,
    ) -> Evaluation {
        let converged = current.values().all(|&o| self.within(o));
        let max_abs_offset = current
            .values()
            .map(|o| o.abs())
            .fold(Megawatts::ZERO, |a, b| if b > a { b } else { a });
        let deltas = match previous {
            Some(prev) => current
                .iter()
                .filter_map(|(area, &now)| prev.get(area).map(|&before| (area.clone(), now - before)))
                .collect(),
            None => BTreeMap::new(),
        };
        Evaluation {
            converged,
            max_abs_offset,
            deltas,
        }
    }

    /// Active power the solver spread over the main island's slack.
    /// Reported only; never part of the convergence decision.
    pub fn slack_residual(
        solutions: &[ComponentSolution],
        main: Option<ComponentId>,
    ) -> Megawatts {
        main.and_then(|m| solutions.iter().find(|s| s.component == m))
            .map(|s| s.distributed_active_power)
            .unwrap_or_default()
    }
}
