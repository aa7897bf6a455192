// ambler-footsteps: footstep placements, support phases and the planners
// producing them.

pub mod naive;
pub mod planner;
pub mod repetitive;
pub mod support;

pub use naive::NaiveFootstepsPlanner;
pub use planner::{FootstepsPlanner, PlannerParams};
pub use repetitive::RepetitiveFootstepsPlanner;
pub use support::{make_supports, Footstep, Support};
