use cgm_core::CgmError;
use thiserror::Error;

/// Errors that stop a balancing run before it can produce an outcome.
///
/// Expected run results (missing schedules, divergence, iteration cap) are
/// reported through [`crate::BalanceStatus`], never through this type.
#[derive(Error, Debug)]
pub enum ScalingError {
    /// Model access or the power-flow oracle failed outright
    #[error(transparent)]
    Model(#[from] CgmError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Schedule data could not be read or is malformed
    #[error("Schedule error: {0}")]
    Schedule(String),
}

pub type ScalingResult<T> = Result<T, ScalingError>;

impl From<std::io::Error> for ScalingError {
    fn from(err: std::io::Error) -> Self {
        ScalingError::Model(CgmError::Io(err))
    }
}
