use crate::graph_utils::ComponentLabels;
use crate::{BusId, CgmResult, ComponentId, Megawatts, Network};
use serde::{Deserialize, Serialize};

/// Outcome of the power-flow run for one island.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Converged,
    MaxIterationsReached,
    Failed,
    /// The solver skipped the island (no slack, too small, ...)
    NoCalculation,
}

impl SolveStatus {
    #[inline]
    pub fn is_converged(self) -> bool {
        self == SolveStatus::Converged
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Converged => "converged",
            SolveStatus::MaxIterationsReached => "max_iterations_reached",
            SolveStatus::Failed => "failed",
            SolveStatus::NoCalculation => "no_calculation",
        }
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSolution {
    pub component: ComponentId,
    pub status: SolveStatus,
    pub iterations: usize,
    pub slack_bus: Option<BusId>,
    /// Active power the solver spread over its slack participants
    pub distributed_active_power: Megawatts,
}

impl ComponentSolution {
    pub fn converged(component: ComponentId, iterations: usize) -> Self {
        Self {
            component,
            status: SolveStatus::Converged,
            iterations,
            slack_bus: None,
            distributed_active_power: Megawatts::ZERO,
        }
    }

    pub fn with_status(component: ComponentId, status: SolveStatus) -> Self {
        Self {
            status,
            ..Self::converged(component, 0)
        }
    }

    pub fn with_slack(mut self, bus: BusId, distributed: Megawatts) -> Self {
        self.slack_bus = Some(bus);
        self.distributed_active_power = distributed;
        self
    }
}

/// External power-flow solver.
///
/// `solve` must write the solved flows of every boundary injection
/// (`flow_p`/`flow_q`) back into the network and return one
/// [`ComponentSolution`] per island it attempted. Returning `Err` means the
/// solver could not run at all; non-convergence is reported through
/// [`SolveStatus`].
pub trait PowerFlowOracle {
    fn solve(
        &mut self,
        network: &mut Network,
        labels: &ComponentLabels,
    ) -> CgmResult<Vec<ComponentSolution>>;
}

impl<O: PowerFlowOracle + ?Sized> PowerFlowOracle for Box<O> {
    fn solve(
        &mut self,
        network: &mut Network,
        labels: &ComponentLabels,
    ) -> CgmResult<Vec<ComponentSolution>> {
        (**self).solve(network, labels)
    }
}
