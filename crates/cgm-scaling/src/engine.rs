//! The balancing run.
//!
//! ```text
//! INIT -> DC_SCALED -> AC_PRESCALED -> ITERATING -> CONVERGED | MAX_ITER
//!                  \________________________________\-> DIVERGED (main island)
//! ```
//!
//! 1. DC links are set straight to their scheduled value, then solved.
//! 2. Unpaired AC boundary injections get one direct correction per island,
//!    then solved.
//! 3. Conforming loads are scaled per area and island until every area is
//!    within the threshold or the iteration cap is hit.
//!
//! A main-island divergence at any solve aborts the run. Other islands that
//! diverge are dropped from the valid set and the run carries on.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use cgm_core::{
    AreaCode, ComponentId, ComponentSolution, Diagnostics, InjectionId, InjectionRecord, LoadId,
    Megawatts, NetworkModel,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::allocator::ParticipationAllocator;
use crate::config::BalanceConfig;
use crate::convergence::{compute_balances, BalanceTable, ConvergenceEvaluator};
use crate::elements::{power_factor_ratio, ScalableInjection, ScalableLoad};
use crate::error::ScalingResult;
use crate::partition::{partition_areas, AreaPartition, ComponentState};
use crate::report::{BalanceStatus, DcLinkOutcome, ReportBuilder, ScalingOutcome, ScalingStage};
use crate::schedule::{
    resolve_ac_targets, AcScheduleRow, DcScheduleRow, ScheduleSource, TimeHorizon,
};

#[derive(Debug, Clone)]
pub struct BalancingEngine {
    config: BalanceConfig,
}

/// Result of a checked solve.
enum Solve {
    Ok(Vec<ComponentSolution>),
    MainDiverged(Vec<ComponentSolution>),
}

impl BalancingEngine {
    pub fn new(config: BalanceConfig) -> ScalingResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    /// Fetch both schedule kinds for `horizon` at `at`, then [`Self::run`].
    pub fn run_with_source<M, S>(
        &self,
        model: &mut M,
        source: &S,
        horizon: TimeHorizon,
        at: DateTime<Utc>,
    ) -> ScalingResult<ScalingOutcome>
    where
        M: NetworkModel + ?Sized,
        S: ScheduleSource + ?Sized,
    {
        let ac = source.ac_targets(horizon, at)?;
        let dc = source.dc_targets(horizon, at)?;
        info!(%horizon, %at, ac_rows = ac.len(), dc_rows = dc.len(), "schedules retrieved");
        self.run(model, &ac, &dc)
    }

    /// Balance `model` in place against the given schedule rows.
    ///
    /// The caller owns the model for the whole run. Nothing is rolled back
    /// when the main island diverges.
    pub fn run<M: NetworkModel + ?Sized>(
        &self,
        model: &mut M,
        ac_rows: &[AcScheduleRow],
        dc_rows: &[DcScheduleRow],
    ) -> ScalingResult<ScalingOutcome> {
        let injections = model.boundary_injections();
        let has_dc = injections.iter().any(|i| i.is_dc());
        let ac_missing = ac_rows.is_empty();
        let dc_missing = dc_rows.is_empty() && has_dc;
        if ac_missing || dc_missing {
            warn!(ac = ac_missing, dc = dc_missing, "schedule unavailable, balancing skipped");
            let mut diagnostics = Diagnostics::new();
            if ac_missing {
                diagnostics.error("schedule", "no AC schedule available");
            }
            if dc_missing {
                diagnostics.error("schedule", "no DC schedule available for a network with DC links");
            }
            return Ok(ReportBuilder::unavailable(ac_missing, dc_missing, diagnostics));
        }

        let mut run = BalancingRun::start(&self.config, &*model, &injections, ac_rows);
        run.scale_dc(model, &injections, dc_rows)?;

        let Some(after_dc) = run.checked_solve(model, ScalingStage::DcScaling)? else {
            return Ok(run.abort(&*model));
        };
        run.prescale_ac(model)?;
        let Some(after_prescale) = run.checked_solve(model, ScalingStage::AcPrescale)? else {
            return Ok(run.abort(&*model));
        };
        debug!(
            dc_stage = ?after_dc.area_offsets(),
            prescale_stage = ?after_prescale.area_offsets(),
            "offsets before load scaling"
        );
        run.iterate(model, after_prescale)
    }
}

/// State of one run; dropped when the outcome is built.
struct BalancingRun<'c> {
    config: &'c BalanceConfig,
    allocator: ParticipationAllocator,
    evaluator: ConvergenceEvaluator,
    partition: AreaPartition,
    targets: BTreeMap<AreaCode, Megawatts>,
    load_ratios: HashMap<LoadId, f64>,
    injection_ratios: HashMap<InjectionId, f64>,
    diagnostics: Diagnostics,
    builder: ReportBuilder,
    table: BalanceTable,
}

impl<'c> BalancingRun<'c> {
    fn start<M: NetworkModel + ?Sized>(
        config: &'c BalanceConfig,
        model: &M,
        injections: &[InjectionRecord],
        ac_rows: &[AcScheduleRow],
    ) -> Self {
        let mut diagnostics = Diagnostics::new();
        let mut builder = ReportBuilder::new(config.balance_threshold);

        let partition = partition_areas(model, config.min_component_buses);
        for component in partition.components() {
            if component.state == ComponentState::Internal {
                diagnostics.info_entity(
                    "partition",
                    "island has no boundary injections and is not balanced",
                    &component.id.to_string(),
                );
            }
        }
        for area in partition.fragmented_areas() {
            info!(%area, "area is split over several islands");
        }

        let scheduled = resolve_ac_targets(ac_rows);
        let mut targets = BTreeMap::new();
        for area in partition.areas() {
            match scheduled.get(area) {
                Some(&target) => {
                    targets.insert(area.clone(), target);
                }
                None => {
                    warn!(%area, "no AC schedule for area, excluded from balancing");
                    diagnostics.warn_entity("schedule", "no AC schedule for area", area.as_str());
                    builder.add_missing_schedule(area.clone());
                }
            }
        }
        for area in scheduled.keys().filter(|a| !partition.contains_area(a)) {
            debug!(%area, "scheduled area not present in the network");
        }
        builder.set_targets(targets.clone());

        let threshold = config.power_factor_threshold;
        let load_ratios = model
            .loads()
            .iter()
            .map(|l| (l.id, power_factor_ratio(l.active_power, l.reactive_power, threshold)))
            .collect();
        let injection_ratios = injections
            .iter()
            .map(|i| (i.id, power_factor_ratio(i.setpoint_p, i.setpoint_q, threshold)))
            .collect();

        let table = compute_balances(injections, &partition, &targets);
        builder.set_initial(&table);
        info!(
            areas = targets.len(),
            islands = partition.valid_components().count(),
            "balancing run started"
        );

        Self {
            config,
            allocator: ParticipationAllocator::new(config.constant_power_factor),
            evaluator: ConvergenceEvaluator::new(config.balance_threshold),
            partition,
            targets,
            load_ratios,
            injection_ratios,
            diagnostics,
            builder,
            table,
        }
    }

    /// Set every scheduled DC link to its target in one pass.
    fn scale_dc<M: NetworkModel + ?Sized>(
        &mut self,
        model: &mut M,
        injections: &[InjectionRecord],
        rows: &[DcScheduleRow],
    ) -> ScalingResult<()> {
        let mut matched = vec![false; rows.len()];
        for inj in injections.iter().filter(|i| i.is_dc()) {
            let target = match (&inj.area, &inj.resource_id) {
                (Some(area), Some(resource)) => select_dc_row(rows, resource, area, &mut matched),
                _ => None,
            };
            let label = inj.resource_id.as_deref().unwrap_or(&inj.name);
            let post = match target {
                Some(value) => {
                    let p = Megawatts(value);
                    let q = if self.config.constant_power_factor {
                        p.scaled_reactive(self.injection_ratio(inj.id))
                    } else {
                        inj.setpoint_q
                    };
                    model.set_injection_setpoint(inj.id, p, q)?;
                    debug!(link = label, from = %inj.setpoint_p, to = %p, "DC setpoint applied");
                    p
                }
                None => {
                    warn!(link = label, "no DC schedule row matches link");
                    self.diagnostics
                        .warn_entity("dc", "no DC schedule row matches link", label);
                    inj.setpoint_p
                }
            };
            self.builder.add_dc_link(DcLinkOutcome {
                injection: inj.id,
                name: inj.name.clone(),
                resource_id: inj.resource_id.clone(),
                area: inj.area.clone(),
                component: inj.component,
                pre_setpoint: inj.setpoint_p,
                post_setpoint: post,
                target: target.map(Megawatts),
                post_flow: inj.flow_p,
                success: false,
            });
        }
        for (row, _) in rows.iter().zip(&matched).filter(|(_, used)| !**used) {
            self.diagnostics.warn_entity(
                "dc",
                "DC schedule row matches no link in the network",
                &row.registered_resource,
            );
        }
        Ok(())
    }

    /// One direct correction of the unpaired AC injections of every valid
    /// island whose areas are all scheduled.
    fn prescale_ac<M: NetworkModel + ?Sized>(&mut self, model: &mut M) -> ScalingResult<()> {
        let injections = model.boundary_injections();
        let components: Vec<ComponentId> = self.partition.valid_components().collect();
        for component in components {
            let unscheduled = self
                .partition
                .component(component)
                .map(|c| c.areas.iter().any(|a| !self.targets.contains_key(a)))
                .unwrap_or(true);
            if unscheduled {
                debug!(%component, "island has unscheduled areas, prescale skipped");
                continue;
            }

            let candidates: Vec<ScalableInjection> = injections
                .iter()
                .filter(|i| i.is_unpaired_ac() && i.component == Some(component))
                .filter_map(|i| ScalableInjection::from_record(i, self.injection_ratio(i.id)))
                .collect();
            let current: Megawatts = candidates.iter().map(|c| c.flow_p).sum();
            let desired: Megawatts = self
                .targets
                .iter()
                .map(|(area, &target)| target * self.partition.weight(area, component))
                .sum();
            let offset = current - desired;
            if offset.value() == 0.0 {
                continue;
            }

            let proposals = self.allocator.allocate(&candidates, offset);
            if proposals.is_empty() {
                warn!(%component, %offset, "no unpaired AC flow to carry the prescale");
                self.diagnostics.warn_entity(
                    "prescale",
                    format!("offset {offset} left to load scaling: no unpaired AC flow"),
                    &component.to_string(),
                );
                continue;
            }
            debug!(%component, %offset, injections = proposals.len(), "AC prescale");
            for proposal in proposals {
                model.set_injection_setpoint(
                    proposal.id,
                    proposal.active_power,
                    proposal.reactive_power,
                )?;
            }
        }
        Ok(())
    }

    /// Bounded load-scaling loop.
    fn iterate<M: NetworkModel + ?Sized>(
        mut self,
        model: &mut M,
        start: BalanceTable,
    ) -> ScalingResult<ScalingOutcome> {
        let max_iteration = self.config.max_iteration;
        let mut warned: BTreeSet<(AreaCode, ComponentId)> = BTreeSet::new();
        let mut evaluation = self.evaluator.evaluate(&start.area_offsets(), None);
        let mut iteration = 0;

        while iteration < max_iteration && !evaluation.converged {
            iteration += 1;
            let loads = model.loads();
            let rows = self.table.rows.clone();
            for row in rows {
                if row.offset.value() == 0.0 || !self.partition.is_valid(row.component) {
                    continue;
                }
                let candidates: Vec<ScalableLoad> = loads
                    .iter()
                    .filter(|l| {
                        l.conforming
                            && l.component == Some(row.component)
                            && l.area.as_ref() == Some(&row.area)
                    })
                    .filter_map(|l| ScalableLoad::from_record(l, self.load_ratio(l.id)))
                    .collect();
                let proposals = self.allocator.allocate(&candidates, row.offset);
                if proposals.is_empty() {
                    if warned.insert((row.area.clone(), row.component)) {
                        warn!(area = %row.area, component = %row.component, "no conforming load to scale");
                        self.diagnostics.warn_entity(
                            "participation",
                            format!("no conforming load in island {} to absorb the offset", row.component),
                            row.area.as_str(),
                        );
                    }
                    continue;
                }
                for proposal in proposals {
                    let (p, q) =
                        ScalableLoad::consumption(proposal.active_power, proposal.reactive_power);
                    model.set_load_setpoint(proposal.id, p, q)?;
                }
            }

            let previous = self.table.area_offsets();
            let Some(table) = self.checked_solve(model, ScalingStage::LoadScaling { iteration })?
            else {
                return Ok(self.abort(&*model));
            };
            evaluation = self.evaluator.evaluate(&table.area_offsets(), Some(&previous));
            debug!(
                iteration,
                max_offset = %evaluation.max_abs_offset,
                converged = evaluation.converged,
                "load scaling iteration"
            );
        }

        let status = if evaluation.converged {
            BalanceStatus::Converged
        } else {
            BalanceStatus::MaxIterationReached
        };
        info!(%status, iterations = iteration, "balancing run finished");
        Ok(self.finish(&*model, status))
    }

    /// Solve, drop diverged secondary islands, record the stage.
    /// `None` when the main island diverged.
    fn checked_solve<M: NetworkModel + ?Sized>(
        &mut self,
        model: &mut M,
        stage: ScalingStage,
    ) -> ScalingResult<Option<BalanceTable>> {
        let outcome = self.solve(model)?;
        let solutions = match &outcome {
            Solve::Ok(s) | Solve::MainDiverged(s) => s,
        };
        let table = compute_balances(&model.boundary_injections(), &self.partition, &self.targets);
        self.builder
            .record(stage, &self.table, &table, solutions, model.main_component());
        match outcome {
            Solve::Ok(_) => {
                self.table = table.clone();
                Ok(Some(table))
            }
            Solve::MainDiverged(_) => Ok(None),
        }
    }

    fn solve<M: NetworkModel + ?Sized>(&mut self, model: &mut M) -> ScalingResult<Solve> {
        let solutions = model.solve()?;
        let converged = |c: ComponentId| {
            solutions
                .iter()
                .any(|s| s.component == c && s.status.is_converged())
        };

        if let Some(main) = model.main_component() {
            if !converged(main) {
                warn!(component = %main, "main island did not converge, run aborted");
                self.diagnostics.error_entity(
                    "divergence",
                    "main island did not converge",
                    &main.to_string(),
                );
                return Ok(Solve::MainDiverged(solutions));
            }
        }

        let failed: Vec<ComponentId> = self
            .partition
            .valid_components()
            .filter(|&c| !converged(c))
            .collect();
        for component in failed {
            self.partition.mark_diverged(component);
            warn!(%component, "island did not converge, excluded from balancing");
            self.diagnostics.warn_entity(
                "divergence",
                "island did not converge and is excluded from balancing",
                &component.to_string(),
            );
        }
        Ok(Solve::Ok(solutions))
    }

    fn abort<M: NetworkModel + ?Sized>(self, model: &M) -> ScalingOutcome {
        self.finish(model, BalanceStatus::MainComponentDiverged)
    }

    fn finish<M: NetworkModel + ?Sized>(mut self, model: &M, status: BalanceStatus) -> ScalingOutcome {
        let injections: HashMap<InjectionId, InjectionRecord> = model
            .boundary_injections()
            .into_iter()
            .map(|i| (i.id, i))
            .collect();
        let partition = &self.partition;
        let evaluator = self.evaluator;
        for link in self.builder.dc_links_mut() {
            if let Some(record) = injections.get(&link.injection) {
                link.post_setpoint = record.setpoint_p;
                link.post_flow = record.flow_p;
            }
            let diverged = link
                .component
                .and_then(|c| partition.component(c))
                .is_some_and(|c| c.state == ComponentState::Diverged);
            link.success = status.scaled()
                && !diverged
                && link
                    .target
                    .is_some_and(|t| evaluator.within(link.post_flow - t));
        }

        let lost: Vec<AreaCode> = self
            .targets
            .keys()
            .filter(|a| self.partition.area_lost(a))
            .cloned()
            .collect();
        let diverged = self.partition.diverged_components();
        let last = status.scaled().then_some(&self.table);
        let outcome = self
            .builder
            .finish(status, last, &lost, diverged, self.diagnostics);
        info!("{}", outcome.summary());
        outcome
    }

    fn load_ratio(&self, id: LoadId) -> f64 {
        self.load_ratios.get(&id).copied().unwrap_or(0.0)
    }

    fn injection_ratio(&self, id: InjectionId) -> f64 {
        self.injection_ratios.get(&id).copied().unwrap_or(0.0)
    }
}

/// Row for `resource` seen from `area` with the largest magnitude; on equal
/// magnitude the larger signed value wins.
fn select_dc_row(
    rows: &[DcScheduleRow],
    resource: &str,
    area: &AreaCode,
    matched: &mut [bool],
) -> Option<f64> {
    let mut best: Option<f64> = None;
    for (idx, row) in rows.iter().enumerate() {
        if row.registered_resource != resource {
            continue;
        }
        let Some(value) = row.value_for(area) else {
            continue;
        };
        matched[idx] = true;
        best = match best {
            Some(current)
                if current.abs() > value.abs()
                    || (current.abs() == value.abs() && current >= value) =>
            {
                Some(current)
            }
            _ => Some(value),
        };
    }
    best
}
