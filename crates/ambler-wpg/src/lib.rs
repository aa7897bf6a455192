// ambler-wpg: the walk pattern generator.
//
// Given a support sequence, synthesizes a dynamically admissible CoM
// trajectory (LIPM with ZMP constraints, solved as a QP over
// piecewise-constant jerks) together with C1 swing-foot trajectories and
// yaw splines, and assembles everything into one time-parameterized,
// replannable reference.

pub mod error;
pub mod generator;
pub mod lipm;
pub mod spline;
pub mod swing;
pub mod trajectory;

pub use error::PlanError;
pub use generator::WalkPatternGenerator;
pub use lipm::{Lipm, LipmTrajectory};
pub use spline::CubicSpline;
pub use swing::{KickTrajectory, SwingFootCubic};
pub use trajectory::{PartKind, Trajectory, TrajectoryPart};
