//! The planned walk trajectory and its query surface.

use nalgebra::{Isometry3, UnitQuaternion, Vector3};

use ambler_core::geometry::build_frame;
use ambler_core::types::Side;
use ambler_footsteps::Support;

use crate::lipm::LipmTrajectory;
use crate::spline::CubicSpline;
use crate::swing::{KickTrajectory, SwingFootCubic};

/// What the flying foot does during one trajectory part.
#[derive(Clone, Debug)]
pub enum PartKind {
    /// Double support: both feet hold still.
    Double,
    /// Single support: the opposite foot swings.
    Single { swing: SwingFootCubic },
    /// Kick support: the opposite foot traces the kick curve.
    Kick { kick: KickTrajectory },
}

/// One support phase with its absolute time bounds.
#[derive(Clone, Debug)]
pub struct TrajectoryPart {
    pub support: Support,
    pub t_start: f64,
    pub t_end: f64,
    pub kind: PartKind,
}

/// A planned walk: supports with time bounds, the CoM trajectory, the
/// feet/trunk yaw splines and a global post-hoc transform `t_world`.
///
/// Once planned, a trajectory is immutable apart from
/// [`apply_transform`](Trajectory::apply_transform); sampling accessors
/// clamp `t` into `[t_start, t_end]`.
pub struct Trajectory {
    pub com_height: f64,
    pub trunk_pitch: f64,

    pub supports: Vec<Support>,
    pub parts: Vec<TrajectoryPart>,

    pub com: LipmTrajectory,

    pub left_foot_yaw: CubicSpline,
    pub right_foot_yaw: CubicSpline,
    pub trunk_yaw: CubicSpline,

    /// Post-hoc rigid transform applied to every world-frame query.
    pub t_world: Isometry3<f64>,

    pub t_start: f64,
    pub t_end: f64,

    /// Number of dt the jerk planner covered.
    pub jerk_planner_timesteps: usize,
}

impl Trajectory {
    pub(crate) fn new(
        t_start: f64,
        com_height: f64,
        trunk_pitch: f64,
        supports: Vec<Support>,
        com: LipmTrajectory,
        jerk_planner_timesteps: usize,
    ) -> Self {
        Self {
            com_height,
            trunk_pitch,
            supports,
            parts: Vec::new(),
            com,
            left_foot_yaw: CubicSpline::new(true),
            right_foot_yaw: CubicSpline::new(true),
            trunk_yaw: CubicSpline::new(true),
            t_world: Isometry3::identity(),
            t_start,
            t_end: t_start,
            jerk_planner_timesteps,
        }
    }

    /// Part containing `t` (clamped to the first/last part outside the
    /// range).
    pub fn find_part(&self, t: f64) -> &TrajectoryPart {
        assert!(!self.parts.is_empty(), "trajectory has no parts");
        let index = self.find_part_index(t);
        &self.parts[index]
    }

    fn find_part_index(&self, t: f64) -> usize {
        self.parts
            .partition_point(|part| part.t_end < t)
            .min(self.parts.len() - 1)
    }

    pub(crate) fn yaw_mut(&mut self, side: Side) -> &mut CubicSpline {
        match side {
            Side::Right => &mut self.right_foot_yaw,
            _ => &mut self.left_foot_yaw,
        }
    }

    fn yaw(&self, side: Side) -> &CubicSpline {
        match side {
            Side::Right => &self.right_foot_yaw,
            _ => &self.left_foot_yaw,
        }
    }

    /// Whether `side` is the swing foot at `t`.
    pub fn is_flying(&self, side: Side, t: f64) -> bool {
        let part = self.find_part(t);
        !part.support.is_both() && part.support.side() == side.other()
    }

    pub fn support_side(&self, t: f64) -> Side {
        self.find_part(t).support.side()
    }

    pub fn support_is_both(&self, t: f64) -> bool {
        self.find_part(t).support.is_both()
    }

    fn foot_position(&self, side: Side, t: f64) -> Vector3<f64> {
        let part = self.find_part(t);
        if self.is_flying(side, t) {
            match &part.kind {
                PartKind::Single { swing } => swing.pos(t),
                PartKind::Kick { kick } => kick.pos(t),
                PartKind::Double => unreachable!("a double support has no flying foot"),
            }
        } else {
            part.support
                .footstep_frame(side)
                .map(|frame| frame.translation.vector)
                .unwrap_or_else(|| part.support.frame().translation.vector)
        }
    }

    pub fn get_t_world_foot(&self, side: Side, t: f64) -> Isometry3<f64> {
        self.t_world * build_frame(self.foot_position(side, t), self.yaw(side).pos(t))
    }

    pub fn get_t_world_left(&self, t: f64) -> Isometry3<f64> {
        self.get_t_world_foot(Side::Left, t)
    }

    pub fn get_t_world_right(&self, t: f64) -> Isometry3<f64> {
        self.get_t_world_foot(Side::Right, t)
    }

    pub fn get_v_world_foot(&self, side: Side, t: f64) -> Vector3<f64> {
        if self.is_flying(side, t) {
            let part = self.find_part(t);
            let velocity = match &part.kind {
                PartKind::Single { swing } => swing.vel(t),
                PartKind::Kick { kick } => kick.vel(t),
                PartKind::Double => Vector3::zeros(),
            };
            self.t_world.rotation * velocity
        } else {
            Vector3::zeros()
        }
    }

    pub fn get_v_world_left(&self, t: f64) -> Vector3<f64> {
        self.get_v_world_foot(Side::Left, t)
    }

    pub fn get_v_world_right(&self, t: f64) -> Vector3<f64> {
        self.get_v_world_foot(Side::Right, t)
    }

    pub fn get_p_world_com(&self, t: f64) -> Vector3<f64> {
        let pos = self.com.pos(t);
        let p = self.t_world * nalgebra::Point3::new(pos.x, pos.y, self.com_height);
        p.coords
    }

    pub fn get_v_world_com(&self, t: f64) -> Vector3<f64> {
        let vel = self.com.vel(t);
        self.t_world.rotation * Vector3::new(vel.x, vel.y, 0.0)
    }

    pub fn get_a_world_com(&self, t: f64) -> Vector3<f64> {
        let acc = self.com.acc(t);
        self.t_world.rotation * Vector3::new(acc.x, acc.y, 0.0)
    }

    pub fn get_j_world_com(&self, t: f64) -> Vector3<f64> {
        let jerk = self.com.jerk(t);
        self.t_world.rotation * Vector3::new(jerk.x, jerk.y, 0.0)
    }

    /// DCM `c + c_dot / omega` at the CoM height.
    pub fn get_p_world_dcm(&self, t: f64, omega: f64) -> Vector3<f64> {
        self.get_p_world_com(t) + self.get_v_world_com(t) / omega
    }

    /// ZMP `c - c_ddot / omega^2` (planar components).
    pub fn get_p_world_zmp(&self, t: f64, omega: f64) -> Vector3<f64> {
        self.get_p_world_com(t) - self.get_a_world_com(t) / (omega * omega)
    }

    pub fn get_r_world_trunk(&self, t: f64) -> UnitQuaternion<f64> {
        let yaw = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.trunk_yaw.pos(t));
        let pitch = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.trunk_pitch);
        self.t_world.rotation * yaw * pitch
    }

    pub fn get_support(&self, t: f64) -> Support {
        self.find_part(t).support.transformed(&self.t_world)
    }

    pub fn get_next_support(&self, t: f64) -> Support {
        let part = self.find_part(t);
        self.find_part(part.t_end + 1e-4)
            .support
            .transformed(&self.t_world)
    }

    pub fn get_prev_support(&self, t: f64) -> Support {
        let part = self.find_part(t);
        self.find_part(part.t_start - 1e-4)
            .support
            .transformed(&self.t_world)
    }

    /// All supports with the post-hoc transform applied.
    pub fn get_supports(&self) -> Vec<Support> {
        self.supports
            .iter()
            .map(|s| s.transformed(&self.t_world))
            .collect()
    }

    /// Number of supports after the one containing `t`.
    pub fn remaining_supports(&self, t: f64) -> usize {
        self.parts.len() - 1 - self.find_part_index(t)
    }

    pub fn get_part_t_start(&self, t: f64) -> f64 {
        self.find_part(t).t_start
    }

    pub fn get_part_t_end(&self, t: f64) -> f64 {
        self.find_part(t).t_end
    }

    /// Rigidly shift the whole trajectory.
    pub fn apply_transform(&mut self, t: &Isometry3<f64>) {
        self.t_world = t * self.t_world;
    }

    pub fn duration(&self) -> f64 {
        self.t_end - self.t_start
    }
}
