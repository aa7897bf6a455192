//! Swing-foot and kick trajectories.

use nalgebra::{Isometry3, Point3, Vector3};

use ambler_core::params::HumanoidParameters;
use ambler_core::types::Side;

use crate::spline::CubicSpline;

/// Swing-foot curve: x/y interpolate linearly over the step while z rises
/// to the apex height at `t0 + rise_ratio * T`, holds it, and lands at 0
/// vertical velocity, as three cubic segments.
#[derive(Clone, Debug)]
pub struct SwingFootCubic {
    pub t_start: f64,
    pub t_end: f64,
    start: Vector3<f64>,
    target: Vector3<f64>,
    height: CubicSpline,
}

impl SwingFootCubic {
    pub fn make_trajectory(
        t_start: f64,
        t_end: f64,
        height: f64,
        rise_ratio: f64,
        start: Vector3<f64>,
        target: Vector3<f64>,
    ) -> Self {
        assert!(t_end > t_start, "swing must have a positive duration");
        assert!(
            rise_ratio > 0.0 && rise_ratio < 0.5,
            "rise ratio must lie in (0, 0.5)"
        );

        let duration = t_end - t_start;
        let mut z = CubicSpline::new(false);
        z.add_point(t_start, 0.0, 0.0);
        z.add_point(t_start + rise_ratio * duration, height, 0.0);
        z.add_point(t_end - rise_ratio * duration, height, 0.0);
        z.add_point(t_end, 0.0, 0.0);

        Self {
            t_start,
            t_end,
            start,
            target,
            height: z,
        }
    }

    fn phase(&self, t: f64) -> f64 {
        ((t - self.t_start) / (self.t_end - self.t_start)).clamp(0.0, 1.0)
    }

    pub fn pos(&self, t: f64) -> Vector3<f64> {
        let u = self.phase(t);
        let mut p = self.start + (self.target - self.start) * u;
        p.z += self.height.pos(t);
        p
    }

    pub fn vel(&self, t: f64) -> Vector3<f64> {
        if t < self.t_start || t > self.t_end {
            return Vector3::zeros();
        }
        let mut v = (self.target - self.start) / (self.t_end - self.t_start);
        v.z += self.height.vel(t);
        v
    }
}

/// Kick curve: the kicking foot lifts to a windup point expressed relative
/// to the opposite (support) foot, then strikes through the target.
#[derive(Clone, Debug)]
pub struct KickTrajectory {
    pub t_start: f64,
    pub t_end: f64,
    x: CubicSpline,
    y: CubicSpline,
    z: CubicSpline,
}

impl KickTrajectory {
    pub fn make_trajectory(
        kicking_side: Side,
        t_start: f64,
        t_end: f64,
        start: Vector3<f64>,
        target: Vector3<f64>,
        t_world_opposite: &Isometry3<f64>,
        parameters: &HumanoidParameters,
    ) -> Self {
        assert!(t_end > t_start, "kick must have a positive duration");

        // Windup beside the support foot, at swing height.
        let windup = t_world_opposite
            * Point3::new(
                0.0,
                kicking_side.lateral_sign() * parameters.feet_spacing,
                parameters.walk_foot_height,
            );
        let t_mid = (t_start + t_end) / 2.0;

        let mut x = CubicSpline::new(false);
        let mut y = CubicSpline::new(false);
        let mut z = CubicSpline::new(false);

        x.add_point(t_start, start.x, 0.0);
        y.add_point(t_start, start.y, 0.0);
        z.add_point(t_start, start.z, 0.0);

        x.add_point(t_mid, windup.x, 0.0);
        y.add_point(t_mid, windup.y, 0.0);
        z.add_point(t_mid, windup.z, 0.0);

        x.add_point(t_end, target.x, 0.0);
        y.add_point(t_end, target.y, 0.0);
        z.add_point(t_end, target.z, 0.0);

        Self {
            t_start,
            t_end,
            x,
            y,
            z,
        }
    }

    pub fn pos(&self, t: f64) -> Vector3<f64> {
        Vector3::new(self.x.pos(t), self.y.pos(t), self.z.pos(t))
    }

    pub fn vel(&self, t: f64) -> Vector3<f64> {
        Vector3::new(self.x.vel(t), self.y.vel(t), self.z.vel(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn swing_endpoints_match_footsteps() {
        let start = Vector3::new(0.1, -0.1, 0.0);
        let target = Vector3::new(0.3, -0.1, 0.0);
        let swing = SwingFootCubic::make_trajectory(1.0, 1.4, 0.05, 0.25, start, target);

        assert_relative_eq!(swing.pos(1.0), start, epsilon = 1e-12);
        assert_relative_eq!(swing.pos(1.4), target, epsilon = 1e-12);
        // Zero vertical velocity at both endpoints.
        assert_relative_eq!(swing.vel(1.0).z, 0.0, epsilon = 1e-9);
        assert_relative_eq!(swing.vel(1.4).z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn swing_reaches_and_holds_height() {
        let start = Vector3::zeros();
        let target = Vector3::new(0.2, 0.0, 0.0);
        let swing = SwingFootCubic::make_trajectory(0.0, 1.0, 0.08, 0.2, start, target);

        assert_relative_eq!(swing.pos(0.2).z, 0.08, epsilon = 1e-9);
        assert_relative_eq!(swing.pos(0.5).z, 0.08, epsilon = 1e-9);
        assert_relative_eq!(swing.pos(0.8).z, 0.08, epsilon = 1e-9);
        assert!(swing.pos(0.1).z < 0.08);
        assert!(swing.pos(0.95).z < 0.08);
    }

    #[test]
    fn swing_xy_is_linear_in_time() {
        let start = Vector3::new(0.0, 0.1, 0.0);
        let target = Vector3::new(0.4, 0.3, 0.0);
        let swing = SwingFootCubic::make_trajectory(0.0, 2.0, 0.05, 0.3, start, target);

        assert_relative_eq!(swing.pos(1.0).x, 0.2, epsilon = 1e-12);
        assert_relative_eq!(swing.pos(1.0).y, 0.2, epsilon = 1e-12);
        assert_relative_eq!(swing.vel(0.5).x, 0.2, epsilon = 1e-12);
        assert_relative_eq!(swing.vel(1.5).x, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn swing_clamps_outside_window() {
        let swing = SwingFootCubic::make_trajectory(
            0.0,
            1.0,
            0.05,
            0.2,
            Vector3::zeros(),
            Vector3::new(0.1, 0.0, 0.0),
        );
        assert_relative_eq!(swing.pos(-1.0), swing.pos(0.0), epsilon = 1e-12);
        assert_relative_eq!(swing.pos(2.0), swing.pos(1.0), epsilon = 1e-12);
        assert_relative_eq!(swing.vel(2.0).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn kick_passes_through_windup() {
        let params = HumanoidParameters::default();
        let opposite = Isometry3::translation(0.0, -0.1, 0.0);
        let start = Vector3::new(0.0, 0.1, 0.0);
        let target = Vector3::new(0.3, 0.1, 0.0);

        let kick = KickTrajectory::make_trajectory(
            Side::Left,
            0.0,
            0.4,
            start,
            target,
            &opposite,
            &params,
        );

        assert_relative_eq!(kick.pos(0.0), start, epsilon = 1e-12);
        assert_relative_eq!(kick.pos(0.4), target, epsilon = 1e-12);

        let windup = kick.pos(0.2);
        assert_relative_eq!(windup.y, -0.1 + params.feet_spacing, epsilon = 1e-9);
        assert_relative_eq!(windup.z, params.walk_foot_height, epsilon = 1e-9);
    }
}
