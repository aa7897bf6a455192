// ambler-qp: affine expressions, constraints and the dense QP layer.
//
// Callers build a problem incrementally: variables are appended to one
// global decision vector, expressions are affine maps `A·x + b` over it,
// and constraints relate expressions with hard or soft priority. `solve()`
// assembles everything into one dense QP and hands it to Clarabel.

pub mod constraint;
pub mod expression;
pub mod integrator;
pub mod polygon;
pub mod problem;
pub mod variable;

pub use constraint::{Constraint, Priority};
pub use expression::Expression;
pub use integrator::{Integrator, IntegratorTrajectory};
pub use problem::{Problem, SolveError};
pub use variable::Variable;
