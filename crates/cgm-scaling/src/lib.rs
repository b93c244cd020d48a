//! # cgm-scaling: schedule-driven balancing of a merged grid model
//!
//! Adjusts a solved merged model until every control area's AC net position
//! matches its scheduled value and every DC link sits at its scheduled
//! setpoint.
//!
//! - [`partition`]: areas, islands, fragmentation weights
//! - [`allocator`]: proportional participation of loads and injections
//! - [`engine`]: DC pass, AC prescale and the bounded load-scaling loop
//! - [`convergence`]: offsets and the threshold check
//! - [`report`]: per-solve trace and the final [`ScalingOutcome`]
//! - [`schedule`]: schedule rows, horizons and sources
//!
//! ```no_run
//! use cgm_core::{load_snapshot, GridModel};
//! use cgm_scaling::{AcScheduleRow, BalanceConfig, BalancingEngine};
//! # fn oracle() -> Box<dyn cgm_core::PowerFlowOracle> { unimplemented!() }
//!
//! let network = load_snapshot("merged.json")?;
//! let mut model = GridModel::new(network, oracle());
//! let engine = BalancingEngine::new(BalanceConfig::default())?;
//! let outcome = engine.run(
//!     &mut model,
//!     &[AcScheduleRow::export("A", -300.0), AcScheduleRow::export("B", 300.0)],
//!     &[],
//! )?;
//! println!("{}", outcome.summary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod allocator;
pub mod config;
pub mod convergence;
pub mod elements;
pub mod engine;
pub mod error;
pub mod partition;
pub mod report;
pub mod schedule;

pub use allocator::{ParticipationAllocator, Proposal};
pub use config::BalanceConfig;
pub use convergence::{compute_balances, AreaBalance, BalanceTable, ConvergenceEvaluator};
pub use elements::{power_factor_ratio, Scalable, ScalableInjection, ScalableLoad};
pub use engine::BalancingEngine;
pub use error::{ScalingError, ScalingResult};
pub use partition::{partition_areas, AreaPartition, ComponentState, ConnectedComponent};
pub use report::{
    AreaOutcome, BalanceStatus, DcLinkOutcome, IterationRecord, ReportBuilder, ScalingOutcome,
    ScalingReport, ScalingStage,
};
pub use schedule::{
    resolve_ac_targets, AcScheduleRow, DcScheduleRow, ScheduleSource, StaticSchedules,
    TimeHorizon, Timed, Validity,
};
