//! Kinematics solver errors.

use ambler_model::ModelError;
use ambler_qp::SolveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IkError {
    #[error(transparent)]
    Solve(#[from] SolveError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Unknown or removed task handle")]
    UnknownTask,

    #[error("Task type mismatch for this accessor")]
    TaskTypeMismatch,
}
