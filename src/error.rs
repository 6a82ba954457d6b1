//! Engine error type.
use thiserror::Error;

/// Everything that can go wrong while building or reducing terms.
///
/// The engine records the first error it hits and keeps returning it from
/// every later operation without touching state, so a host can always inspect
/// a failed state as it was at the moment of failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("invalid tree at cell {0}")]
    InvalidTree(usize),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("reference at cell {from} points to another reference at cell {to}")]
    RefToRef { from: usize, to: usize },

    #[error("cell {0} has no written tag or payload")]
    InvalidCell(usize),

    #[error("cell {0} is not applicable")]
    ApplyToNonFunction(usize),

    #[error("unknown native function `{0}`")]
    UnknownNative(String),

    #[error("cell limit of {0} cells exceeded")]
    CellLimit(usize),
}

pub type Result<T> = std::result::Result<T, EvalError>;
