//! Naive target-reaching footsteps planner.
//!
//! Iteratively places the flying foot at its target pose projected into
//! the support frame, clamped to a reachability box `(length, width, yaw)`.
//! While the remaining distance exceeds `place_threshold` the yaw steers
//! toward the midpoint target so the robot turns before closing in;
//! afterwards the yaw aligns with the target yaw directly.

use nalgebra::{Isometry3, Vector3};

use ambler_core::geometry::{build_frame, frame_yaw, interpolate_frames};
use ambler_core::types::Side;

use crate::planner::{FootstepsPlanner, PlannerParams};
use crate::support::Footstep;

pub struct NaiveFootstepsPlanner {
    pub params: PlannerParams,
    t_world_target_left: Isometry3<f64>,
    t_world_target_right: Isometry3<f64>,
    pub max_steps: usize,
    /// Reachability box half-extent along x.
    pub accessibility_length: f64,
    /// Reachability box half-extent along y.
    pub accessibility_width: f64,
    /// Reachability half-extent in yaw.
    pub accessibility_yaw: f64,
    /// Distance under which the yaw aligns to the target yaw.
    pub place_threshold: f64,
}

impl NaiveFootstepsPlanner {
    pub fn new(params: PlannerParams) -> Self {
        Self {
            params,
            t_world_target_left: Isometry3::identity(),
            t_world_target_right: Isometry3::identity(),
            max_steps: 100,
            accessibility_length: 0.1,
            accessibility_width: 0.05,
            accessibility_yaw: 0.35,
            place_threshold: 0.15,
        }
    }

    /// Set the target placements and the planning bounds.
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        &mut self,
        t_world_target_left: Isometry3<f64>,
        t_world_target_right: Isometry3<f64>,
        max_steps: usize,
        accessibility_width: f64,
        accessibility_length: f64,
        accessibility_yaw: f64,
        place_threshold: f64,
    ) {
        self.t_world_target_left = t_world_target_left;
        self.t_world_target_right = t_world_target_right;
        self.max_steps = max_steps;
        self.accessibility_width = accessibility_width;
        self.accessibility_length = accessibility_length;
        self.accessibility_yaw = accessibility_yaw;
        self.place_threshold = place_threshold;
    }

    /// Set only the target placements, keeping the bounds.
    pub fn set_targets(
        &mut self,
        t_world_target_left: Isometry3<f64>,
        t_world_target_right: Isometry3<f64>,
    ) {
        self.t_world_target_left = t_world_target_left;
        self.t_world_target_right = t_world_target_right;
    }

    fn footstep(&self, side: Side, frame: Isometry3<f64>) -> Footstep {
        Footstep::new(side, frame, self.params.foot_length, self.params.foot_width)
    }
}

impl FootstepsPlanner for NaiveFootstepsPlanner {
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

        let mut footsteps = Vec::new();

        let t_world_target =
            interpolate_frames(&self.t_world_target_left, &self.t_world_target_right, 0.5);

        let mut t_world_current_left = t_world_left;
        let mut t_world_current_right = t_world_right;
        let mut support_side = initial_support_side;

        let mut left_arrived = false;
        let mut right_arrived = false;
        let mut steps = 0;

        // The current placements open the sequence.
        let (flying_frame, support_frame) = if support_side == Side::Left {
            (t_world_right, t_world_left)
        } else {
            (t_world_left, t_world_right)
        };
        footsteps.push(self.footstep(support_side.other(), flying_frame));
        footsteps.push(self.footstep(support_side, support_frame));

        while (!left_arrived || !right_arrived) && steps < self.max_steps {
            steps += 1;
            let mut arrived = true;

            let t_world_support = if support_side == Side::Left {
                t_world_current_left
            } else {
                t_world_current_right
            };

            // Neutral placement of the flying foot and the feet midpoint,
            // both in the support frame.
            let lateral = -support_side.lateral_sign() * self.params.feet_spacing;
            let idle = Vector3::new(0.0, lateral, 0.0);
            let center = Vector3::new(0.0, lateral / 2.0, 0.0);

            // Flying foot target in the support frame, on the floor.
            let target_world = if support_side == Side::Left {
                self.t_world_target_right
            } else {
                self.t_world_target_left
            };
            let t_support_target = t_world_support.inverse() * target_world;
            let mut target_translation = t_support_target.translation.vector;
            target_translation.z = 0.0;

            let mut error = target_translation - idle;

            let mut rescale: f64 = 1.0;
            if error.x < -self.accessibility_length {
                rescale = rescale.min(-self.accessibility_length / error.x);
                arrived = false;
            }
            if error.x > self.accessibility_length {
                rescale = rescale.min(self.accessibility_length / error.x);
                arrived = false;
            }
            if error.y < -self.accessibility_width {
                rescale = rescale.min(-self.accessibility_width / error.y);
                arrived = false;
            }
            if error.y > self.accessibility_width {
                rescale = rescale.min(self.accessibility_width / error.y);
                arrived = false;
            }

            let dist = error.norm();
            error *= rescale;

            let mut error_yaw = if dist > self.place_threshold {
                // Re-orient toward the midpoint target before placing.
                let target_to_center =
                    (t_world_support.inverse() * t_world_target).translation.vector - center;
                target_to_center.y.atan2(target_to_center.x)
            } else {
                frame_yaw(&t_support_target.rotation)
            };

            if error_yaw < -self.accessibility_yaw {
                arrived = false;
                error_yaw = -self.accessibility_yaw;
            }
            if error_yaw > self.accessibility_yaw {
                arrived = false;
                error_yaw = self.accessibility_yaw;
            }

            let new_step = build_frame(idle + error, error_yaw);
            let frame = t_world_support * new_step;
            footsteps.push(self.footstep(support_side.other(), frame));

            if support_side == Side::Left {
                right_arrived = arrived;
                t_world_current_right = frame;
                support_side = Side::Right;
            } else {
                left_arrived = arrived;
                t_world_current_left = frame;
                support_side = Side::Left;
            }
        }

        footsteps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::make_supports;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn feet_at(x: f64, y: f64, yaw: f64, spacing: f64) -> (Isometry3<f64>, Isometry3<f64>) {
        let center = build_frame(Vector3::new(x, y, 0.0), yaw);
        let left = center * build_frame(Vector3::new(0.0, spacing / 2.0, 0.0), 0.0);
        let right = center * build_frame(Vector3::new(0.0, -spacing / 2.0, 0.0), 0.0);
        (left, right)
    }

    fn planner() -> NaiveFootstepsPlanner {
        NaiveFootstepsPlanner::new(PlannerParams::default())
    }

    #[test]
    fn straight_walk_reaches_target() {
        let (left, right) = feet_at(0.0, 0.0, 0.0, 0.2);
        let (target_left, target_right) = feet_at(0.5, 0.0, 0.0, 0.2);

        let mut planner = planner();
        planner.set_targets(target_left, target_right);
        let footsteps = planner.plan(Side::Left, left, right);

        assert!(footsteps.len() >= 4, "got only {} footsteps", footsteps.len());
        // First new placement is on the side opposite the initial support.
        assert_eq!(footsteps[2].side, Side::Right);

        // Last footstep of each side lands within 5 mm of its target.
        let last_left = footsteps.iter().rev().find(|f| f.side == Side::Left).unwrap();
        let last_right = footsteps.iter().rev().find(|f| f.side == Side::Right).unwrap();
        assert!(
            (last_left.frame.translation.vector - target_left.translation.vector).norm() < 5e-3
        );
        assert!(
            (last_right.frame.translation.vector - target_right.translation.vector).norm() < 5e-3
        );
    }

    #[test]
    fn footsteps_alternate_sides() {
        let (left, right) = feet_at(0.0, 0.0, 0.0, 0.2);
        let (target_left, target_right) = feet_at(0.4, 0.1, 0.0, 0.2);

        let mut planner = planner();
        planner.set_targets(target_left, target_right);
        let footsteps = planner.plan(Side::Right, left, right);

        for pair in footsteps[1..].windows(2) {
            assert_eq!(pair[0].side, pair[1].side.other());
        }
    }

    #[test]
    fn rotation_in_place_stays_within_reach() {
        let spacing = 0.2;
        let (left, right) = feet_at(0.0, 0.0, 0.0, spacing);
        let (target_left, target_right) = feet_at(0.0, 0.0, FRAC_PI_2, spacing);

        let mut planner = planner();
        planner.set_targets(target_left, target_right);
        let footsteps = planner.plan(Side::Left, left, right);

        assert!(footsteps.len() > 2, "rotation should require footsteps");

        // Every step stays close to the idle lateral placement: no
        // translation beyond the reachability box.
        for pair in footsteps[1..].windows(2) {
            let relative = pair[0].frame.inverse() * pair[1].frame;
            let offset = relative.translation.vector;
            assert!(
                (offset.y.abs() - spacing).abs() <= planner.accessibility_width + 1e-6,
                "lateral offset {} out of reach",
                offset.y
            );
            assert!(offset.x.abs() <= planner.accessibility_length + 1e-6);
        }

        // Final yaw reaches the target.
        let last = footsteps.last().unwrap();
        assert_relative_eq!(frame_yaw(&last.frame.rotation), FRAC_PI_2, epsilon = 1e-3);
    }

    #[test]
    fn supports_from_plan_keep_contact_chain() {
        let (left, right) = feet_at(0.0, 0.0, 0.0, 0.2);
        let (target_left, target_right) = feet_at(0.3, 0.0, 0.0, 0.2);

        let mut planner = planner();
        planner.set_targets(target_left, target_right);
        let footsteps = planner.plan(Side::Left, left, right);
        let supports = make_supports(&footsteps, true, true, true);

        assert!(supports.first().unwrap().start);
        assert!(supports.last().unwrap().end);
        for pair in supports.windows(2) {
            let shared = pair[0].footsteps.iter().any(|a| {
                pair[1].footsteps.iter().any(|b| {
                    (a.frame.translation.vector - b.frame.translation.vector).norm() < 1e-9
                        && a.side == b.side
                })
            });
            assert!(shared);
        }
    }

    #[test]
    fn max_steps_bounds_planning() {
        let (left, right) = feet_at(0.0, 0.0, 0.0, 0.2);
        // A target far away, with a tiny step budget.
        let (target_left, target_right) = feet_at(10.0, 0.0, 0.0, 0.2);

        let mut planner = planner();
        planner.set_targets(target_left, target_right);
        planner.max_steps = 7;
        let footsteps = planner.plan(Side::Left, left, right);

        assert_eq!(footsteps.len(), 2 + 7);
    }
}
