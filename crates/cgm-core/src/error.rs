//! Unified error type for the merged-model crates.
//!
//! Model access, snapshot loading and the power-flow oracle all report
//! through [`CgmError`]. A power-flow run that finishes without converging is
//! *not* an error: it comes back as a [`crate::SolveStatus`] on the component
//! result. `CgmError::Solver` is reserved for an oracle that could not run at
//! all.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CgmError {
    /// I/O errors (snapshot files and similar)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Structural problems in the model data
    #[error("Validation error: {0}")]
    Validation(String),

    /// The power-flow oracle failed to produce any result
    #[error("Solver error: {0}")]
    Solver(String),

    /// Lookup of an element id that is not part of the model
    #[error("unknown {kind} '{id}'")]
    UnknownElement { kind: &'static str, id: String },

    #[error("{0}")]
    Other(String),
}

pub type CgmResult<T> = Result<T, CgmError>;

impl CgmError {
    pub fn unknown(kind: &'static str, id: impl ToString) -> Self {
        CgmError::UnknownElement {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<anyhow::Error> for CgmError {
    fn from(err: anyhow::Error) -> Self {
        CgmError::Other(err.to_string())
    }
}

impl From<String> for CgmError {
    fn from(s: String) -> Self {
        CgmError::Other(s)
    }
}

impl From<serde_json::Error> for CgmError {
    fn from(err: serde_json::Error) -> Self {
        CgmError::Parse(err.to_string())
    }
}
