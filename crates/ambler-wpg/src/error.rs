//! Planning errors.

use ambler_qp::SolveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Trying to plan with no supports")]
    EmptySupports,

    #[error("t = {t} outside of trajectory range [{t_start}, {t_end}]")]
    OutOfRange { t: f64, t_start: f64, t_end: f64 },

    #[error("This trajectory can't be replanned for supports here (check can_replan_supports)")]
    NotReplannable,

    #[error("Can't plan a swing foot starting on a single support without the previous trajectory")]
    MissingOldTrajectory,

    #[error("Broken support sequence: {0}")]
    InvalidSupports(String),

    #[error(transparent)]
    Solve(#[from] SolveError),
}
