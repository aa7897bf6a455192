//! Repetitive (feed-forward) footsteps planner.
//!
//! Emits a fixed number of alternating footsteps advancing by a constant
//! twist `(dx, dy, dyaw)` expressed in the support frame, clamped against
//! the same reachability box as the naive planner. Used for in-place
//! stepping and feed-forward gaits where no target pose is tracked.

use nalgebra::{Isometry3, Vector3};

use ambler_core::geometry::build_frame;
use ambler_core::types::Side;

use crate::planner::{FootstepsPlanner, PlannerParams};
use crate::support::Footstep;

pub struct RepetitiveFootstepsPlanner {
    pub params: PlannerParams,
    d_x: f64,
    d_y: f64,
    d_yaw: f64,
    steps: usize,
    pub accessibility_length: f64,
    pub accessibility_width: f64,
    pub accessibility_yaw: f64,
}

impl RepetitiveFootstepsPlanner {
    pub fn new(params: PlannerParams) -> Self {
        Self {
            params,
            d_x: 0.0,
            d_y: 0.0,
            d_yaw: 0.0,
            steps: 0,
            accessibility_length: 0.1,
            accessibility_width: 0.05,
            accessibility_yaw: 0.35,
        }
    }

    /// Set the per-step twist and the exact number of steps to emit.
    pub fn configure(&mut self, d_x: f64, d_y: f64, d_yaw: f64, steps: usize) {
        self.d_x = d_x;
        self.d_y = d_y;
        self.d_yaw = d_yaw;
        self.steps = steps;
    }

    fn footstep(&self, side: Side, frame: Isometry3<f64>) -> Footstep {
        Footstep::new(side, frame, self.params.foot_length, self.params.foot_width)
    }
}

impl FootstepsPlanner for RepetitiveFootstepsPlanner {
    fn params(&self) -> &PlannerParams {
        &self.params
    }

    fn plan(
        &self,
        initial_support_side: Side,
        t_world_left: Isometry3<f64>,
        t_world_right: Isometry3<f64>,
    ) -> Vec<Footstep> {
        assert_ne!(initial_support_side, Side::Both, "initial support side must be a single foot");

        let d_x = self.d_x.clamp(-self.accessibility_length, self.accessibility_length);
        let d_y = self.d_y.clamp(-self.accessibility_width, self.accessibility_width);
        let d_yaw = self.d_yaw.clamp(-self.accessibility_yaw, self.accessibility_yaw);

        let mut footsteps = Vec::with_capacity(self.steps + 3);
        let mut support_side = initial_support_side;

        let (flying_frame, support_frame) = if support_side == Side::Left {
            (t_world_right, t_world_left)
        } else {
            (t_world_left, t_world_right)
        };
        footsteps.push(self.footstep(support_side.other(), flying_frame));
        footsteps.push(self.footstep(support_side, support_frame));

        let mut t_world_support = support_frame;

        for step in 0..=self.steps {
            let lateral = -support_side.lateral_sign() * self.params.feet_spacing;

            // The last placement squares the feet up (zero twist).
            let (dx, dy, dyaw) = if step == self.steps {
                (0.0, 0.0, 0.0)
            } else {
                (d_x, d_y, d_yaw)
            };

            let new_step = build_frame(Vector3::new(dx, lateral + dy, 0.0), dyaw);
            let frame = t_world_support * new_step;
            footsteps.push(self.footstep(support_side.other(), frame));

            t_world_support = frame;
            support_side = support_side.other();
        }

        footsteps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambler_core::geometry::frame_yaw;
    use approx::assert_relative_eq;

    fn current_feet(spacing: f64) -> (Isometry3<f64>, Isometry3<f64>) {
        (
            build_frame(Vector3::new(0.0, spacing / 2.0, 0.0), 0.0),
            build_frame(Vector3::new(0.0, -spacing / 2.0, 0.0), 0.0),
        )
    }

    #[test]
    fn emits_exact_step_count() {
        let (left, right) = current_feet(0.2);
        let mut planner = RepetitiveFootstepsPlanner::new(PlannerParams::default());
        planner.configure(0.08, 0.0, 0.0, 5);

        let footsteps = planner.plan(Side::Left, left, right);
        // 2 current placements + 5 commanded steps + the squaring step.
        assert_eq!(footsteps.len(), 8);
    }

    #[test]
    fn forward_twist_advances_each_step() {
        let (left, right) = current_feet(0.2);
        let mut planner = RepetitiveFootstepsPlanner::new(PlannerParams::default());
        planner.configure(0.08, 0.0, 0.0, 4);

        let footsteps = planner.plan(Side::Left, left, right);
        for pair in footsteps[1..footsteps.len() - 1].windows(2) {
            let relative = pair[0].frame.inverse() * pair[1].frame;
            assert_relative_eq!(relative.translation.vector.x, 0.08, epsilon = 1e-9);
        }
        // Squaring step has no forward component.
        let n = footsteps.len();
        let relative = footsteps[n - 2].frame.inverse() * footsteps[n - 1].frame;
        assert_relative_eq!(relative.translation.vector.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn twist_is_clamped_to_reachability() {
        let (left, right) = current_feet(0.2);
        let mut planner = RepetitiveFootstepsPlanner::new(PlannerParams::default());
        planner.configure(1.0, -1.0, 2.0, 3);

        let footsteps = planner.plan(Side::Right, left, right);
        for pair in footsteps[1..footsteps.len() - 1].windows(2) {
            let relative = pair[0].frame.inverse() * pair[1].frame;
            assert!(relative.translation.vector.x <= planner.accessibility_length + 1e-9);
            let lateral_offset = relative.translation.vector.y.abs() - planner.params.feet_spacing;
            assert!(lateral_offset.abs() <= planner.accessibility_width + 1e-9);
            assert!(frame_yaw(&relative.rotation).abs() <= planner.accessibility_yaw + 1e-9);
        }
    }

    #[test]
    fn in_place_stepping_keeps_positions() {
        let (left, right) = current_feet(0.2);
        let mut planner = RepetitiveFootstepsPlanner::new(PlannerParams::default());
        planner.configure(0.0, 0.0, 0.0, 4);

        let footsteps = planner.plan(Side::Left, left, right);
        for footstep in &footsteps {
            let expected = if footstep.side == Side::Left { 0.1 } else { -0.1 };
            assert_relative_eq!(footstep.frame.translation.vector.x, 0.0, epsilon = 1e-9);
            assert_relative_eq!(footstep.frame.translation.vector.y, expected, epsilon = 1e-9);
        }
    }
}
