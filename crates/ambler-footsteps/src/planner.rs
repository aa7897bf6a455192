//! Planner interface and shared parameters.

use nalgebra::Isometry3;

use ambler_core::params::HumanoidParameters;
use ambler_core::types::Side;

use crate::support::Footstep;

/// Geometry shared by every footsteps planner.
#[derive(Clone, Debug)]
pub struct PlannerParams {
    /// Nominal lateral distance between the feet.
    pub feet_spacing: f64,
    pub foot_width: f64,
    pub foot_length: f64,
}

impl Default for PlannerParams {
    fn default() -> Self {
        Self {
            feet_spacing: 0.2,
            foot_width: 0.1,
            foot_length: 0.15,
        }
    }
}

impl From<&HumanoidParameters> for PlannerParams {
    fn from(params: &HumanoidParameters) -> Self {
        Self {
            feet_spacing: params.feet_spacing,
            foot_width: params.foot_width,
            foot_length: params.foot_length,
        }
    }
}

/// A planner producing an ordered footstep sequence from the current foot
/// placements.
///
/// `initial_support_side` is the foot carrying the robot when planning
/// starts; the first new placement is therefore on the opposite side. The
/// returned sequence begins with the two current placements.
pub trait FootstepsPlanner {
    fn params(&self) -> &PlannerParams;

    fn plan(
        &self,
        initial_support_side: Side,
        t_world_left: Isometry3<f64>,
        t_world_right: Isometry3<f64>,
    ) -> Vec<Footstep>;
}
