//! Per-solve trace and the final outcome of a balancing run.
//!
//! [`ReportBuilder`] sees every solve the engine makes and turns the trace
//! into a [`ScalingOutcome`]. The outcome is the only result channel: callers
//! read per-area and per-DC-link success from it instead of relying on a
//! single flag.

use std::collections::BTreeMap;
use std::fmt;

use cgm_core::{
    AreaCode, ComponentId, ComponentSolution, Diagnostics, InjectionId, Megawatts, SolveStatus,
};
use serde::{Deserialize, Serialize};

use crate::convergence::{AreaTotals, BalanceTable, ConvergenceEvaluator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum ScalingStage {
    DcScaling,
    AcPrescale,
    LoadScaling { iteration: usize },
}

impl fmt::Display for ScalingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingStage::DcScaling => f.write_str("dc-scaling"),
            ScalingStage::AcPrescale => f.write_str("ac-prescale"),
            ScalingStage::LoadScaling { iteration } => write!(f, "load-scaling #{iteration}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaPosition {
    pub area: AreaCode,
    pub pre_scale: Megawatts,
    pub post_scale: Megawatts,
    pub target: Megawatts,
    pub offset: Megawatts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub component: ComponentId,
    pub status: SolveStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub stage: ScalingStage,
    pub positions: Vec<AreaPosition>,
    pub slack_residual: Megawatts,
    pub components: Vec<ComponentStatus>,
}

impl IterationRecord {
    pub fn offset(&self, area: &AreaCode) -> Option<Megawatts> {
        self.positions
            .iter()
            .find(|p| &p.area == area)
            .map(|p| p.offset)
    }
}

/// Ordered trace of every solve in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalingReport {
    pub records: Vec<IterationRecord>,
}

impl ScalingReport {
    /// Number of load-scaling iterations performed.
    pub fn iterations(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.stage, ScalingStage::LoadScaling { .. }))
            .count()
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BalanceStatus {
    Converged,
    MaxIterationReached,
    MainComponentDiverged,
    /// Nothing was published for the requested horizon. `dc` is only set
    /// when the network holds DC links; an empty DC schedule does not block a
    /// network without them.
    ScheduleUnavailable { ac: bool, dc: bool },
}

impl BalanceStatus {
    /// Whether the run got past the schedule check and the first solves.
    pub fn scaled(&self) -> bool {
        matches!(
            self,
            BalanceStatus::Converged | BalanceStatus::MaxIterationReached
        )
    }
}

impl fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceStatus::Converged => f.write_str("converged"),
            BalanceStatus::MaxIterationReached => f.write_str("max iteration reached"),
            BalanceStatus::MainComponentDiverged => f.write_str("main component diverged"),
            BalanceStatus::ScheduleUnavailable { ac, dc } => {
                let missing = match (ac, dc) {
                    (true, true) => "AC and DC",
                    (true, false) => "AC",
                    _ => "DC",
                };
                write!(f, "{missing} schedule unavailable")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaOutcome {
    pub target: Megawatts,
    pub initial_offset: Option<Megawatts>,
    /// `None` when every island of the area diverged
    pub final_offset: Option<Megawatts>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcLinkOutcome {
    pub injection: InjectionId,
    pub name: String,
    pub resource_id: Option<String>,
    pub area: Option<AreaCode>,
    pub component: Option<ComponentId>,
    pub pre_setpoint: Megawatts,
    pub post_setpoint: Megawatts,
    /// Scheduled value seen from `area`, if a row matched
    pub target: Option<Megawatts>,
    pub post_flow: Megawatts,
    pub success: bool,
}

impl DcLinkOutcome {
    pub fn scheduled(&self) -> bool {
        self.target.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingOutcome {
    pub scaled: bool,
    pub status: BalanceStatus,
    pub success: bool,
    pub iterations: usize,
    pub areas: BTreeMap<AreaCode, AreaOutcome>,
    pub dc_links: Vec<DcLinkOutcome>,
    /// Areas present in the network but absent from the AC schedule
    pub missing_schedules: Vec<AreaCode>,
    pub diverged_components: Vec<ComponentId>,
    pub diagnostics: Diagnostics,
    pub report: ScalingReport,
}

impl ScalingOutcome {
    pub fn area(&self, code: &str) -> Option<&AreaOutcome> {
        self.areas.get(&AreaCode::from(code))
    }

    pub fn summary(&self) -> String {
        let balanced = self.areas.values().filter(|a| a.success).count();
        let dc_ok = self.dc_links.iter().filter(|l| l.success).count();
        let dc_scheduled = self.dc_links.iter().filter(|l| l.scheduled()).count();
        format!(
            "{}: {} after {} iteration(s); {}/{} areas balanced, {}/{} DC links on schedule, {} missing schedule(s); {}",
            if self.success { "SUCCESS" } else { "FAILED" },
            self.status,
            self.iterations,
            balanced,
            self.areas.len(),
            dc_ok,
            dc_scheduled,
            self.missing_schedules.len(),
            self.diagnostics.summary()
        )
    }
}

/// Accumulates the trace of a run and derives the outcome.
#[derive(Debug)]
pub struct ReportBuilder {
    evaluator: ConvergenceEvaluator,
    targets: BTreeMap<AreaCode, Megawatts>,
    initial: BTreeMap<AreaCode, Megawatts>,
    report: ScalingReport,
    dc_links: Vec<DcLinkOutcome>,
    missing: Vec<AreaCode>,
}

impl ReportBuilder {
    pub fn new(balance_threshold: f64) -> Self {
        Self {
            evaluator: ConvergenceEvaluator::new(balance_threshold),
            targets: BTreeMap::new(),
            initial: BTreeMap::new(),
            report: ScalingReport::default(),
            dc_links: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Scheduled areas present in the network, with their full targets.
    pub fn set_targets(&mut self, targets: BTreeMap<AreaCode, Megawatts>) {
        self.targets = targets;
    }

    pub fn set_initial(&mut self, table: &BalanceTable) {
        self.initial = table.area_offsets();
    }

    pub fn add_missing_schedule(&mut self, area: AreaCode) {
        self.missing.push(area);
    }

    pub fn add_dc_link(&mut self, link: DcLinkOutcome) {
        self.dc_links.push(link);
    }

    pub fn dc_links_mut(&mut self) -> &mut [DcLinkOutcome] {
        &mut self.dc_links
    }

    /// Append the record of one solve.
    pub fn record(
        &mut self,
        stage: ScalingStage,
        before: &BalanceTable,
        after: &BalanceTable,
        solutions: &[ComponentSolution],
        main: Option<ComponentId>,
    ) -> &IterationRecord {
        let pre = before.area_totals();
        let positions = after
            .area_totals()
            .into_iter()
            .map(|(area, AreaTotals { net_position, target, offset })| AreaPosition {
                pre_scale: pre.get(&area).map(|t| t.net_position).unwrap_or(net_position),
                area,
                post_scale: net_position,
                target,
                offset,
            })
            .collect();
        let components = solutions
            .iter()
            .map(|s| ComponentStatus {
                component: s.component,
                status: s.status,
            })
            .collect();
        self.report.records.push(IterationRecord {
            stage,
            positions,
            slack_residual: ConvergenceEvaluator::slack_residual(solutions, main),
            components,
        });
        &self.report.records[self.report.records.len() - 1]
    }

    /// Outcome of a run that stopped before balancing (no schedules).
    pub fn unavailable(ac: bool, dc: bool, diagnostics: Diagnostics) -> ScalingOutcome {
        ScalingOutcome {
            scaled: false,
            status: BalanceStatus::ScheduleUnavailable { ac, dc },
            success: false,
            iterations: 0,
            areas: BTreeMap::new(),
            dc_links: Vec::new(),
            missing_schedules: Vec::new(),
            diverged_components: Vec::new(),
            diagnostics,
            report: ScalingReport::default(),
        }
    }

    /// Outcome of a completed or aborted run.
    ///
    /// `last` is the most recent offset table; `lost_areas` are areas with no
    /// valid island left.
    pub fn finish(
        self,
        status: BalanceStatus,
        last: Option<&BalanceTable>,
        lost_areas: &[AreaCode],
        diverged_components: Vec<ComponentId>,
        diagnostics: Diagnostics,
    ) -> ScalingOutcome {
        let final_offsets = last.map(|t| t.area_offsets()).unwrap_or_default();
        let aborted = !status.scaled();

        let areas: BTreeMap<AreaCode, AreaOutcome> = self
            .targets
            .iter()
            .map(|(area, &target)| {
                let final_offset = if aborted || lost_areas.contains(area) {
                    None
                } else {
                    final_offsets.get(area).copied()
                };
                let success = final_offset.is_some_and(|o| self.evaluator.within(o));
                let outcome = AreaOutcome {
                    target,
                    initial_offset: self.initial.get(area).copied(),
                    final_offset,
                    success,
                };
                (area.clone(), outcome)
            })
            .collect();

        let success = !aborted
            && areas.values().all(|a| a.success)
            && self
                .dc_links
                .iter()
                .filter(|l| l.scheduled())
                .all(|l| l.success);

        ScalingOutcome {
            scaled: !aborted,
            iterations: self.report.iterations(),
            status,
            success,
            areas,
            dc_links: self.dc_links,
            missing_schedules: self.missing,
            diverged_components,
            diagnostics,
            report: self.report,
        }
    }
}
