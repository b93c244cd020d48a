//! Seam to the external power-flow solver.
//!
//! The balancing engine never solves power flow itself. It hands the network
//! to a [`PowerFlowOracle`] and reads back one [`ComponentSolution`] per
//! island plus the flows the oracle wrote onto the boundary injections.

mod oracle;

pub use oracle::{ComponentSolution, PowerFlowOracle, SolveStatus};
