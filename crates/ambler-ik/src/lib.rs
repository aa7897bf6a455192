// ambler-ik: prioritized differential inverse kinematics.
//
// Each control tick, active tasks linearize their Cartesian goals into
// `(A, b)` blocks over the joint displacement `dq`, the solver assembles
// one QP (hard tasks as constraints, soft tasks as weighted objectives,
// scaled tasks against a shared progress variable) together with joint,
// velocity and self-collision inequalities, solves it, and integrates the
// result into the robot configuration.

pub mod error;
pub mod mask;
pub mod solver;
pub mod task;

pub use error::IkError;
pub use mask::AxesMask;
pub use solver::{FrameTask, KinematicsSolver, RelativeFrameTask, SelfCollisionConfig};
pub use task::{Priority, TaskId, TaskKind, TaskType};
