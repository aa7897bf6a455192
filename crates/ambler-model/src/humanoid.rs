//! Floating-base humanoid robot state.
//!
//! Wraps a [`RigidBodyModel`] and tracks which foot currently supports the
//! robot. The support foot anchors the kinematic tree to the world: its
//! floor-projected transform is held fixed and the floating base is
//! re-derived from it, so integrating joint commands never makes the
//! support foot drift or sink.

use nalgebra::{DMatrix, DVector, Isometry3, Rotation3, UnitQuaternion, Vector2, Vector3};

use ambler_core::geometry::flatten_on_floor;
use ambler_core::types::Side;

use crate::adapter::{
    get_t_a_b, set_t_world_frame, FrameIndex, ModelError, ReferenceFrame, RigidBodyModel,
};

/// Head pan/tilt chain measurements used by [`HumanoidRobot::camera_look_at`].
struct HeadChain {
    head_base: FrameIndex,
    dist_z_pan_tilt: f64,
    dist_z_pan_camera: f64,
}

/// A humanoid robot: a rigid-body model plus support-side bookkeeping.
pub struct HumanoidRobot {
    pub model: Box<dyn RigidBodyModel>,
    /// The side currently anchoring the robot to the floor.
    pub support_side: Side,
    /// World transform of the (floor-projected) support foot.
    pub t_world_support: Isometry3<f64>,
    pub left_foot: FrameIndex,
    pub right_foot: FrameIndex,
    pub trunk: FrameIndex,
    head: Option<HeadChain>,
}

impl HumanoidRobot {
    /// Wrap a model. The model must expose `left_foot`, `right_foot` and
    /// `trunk` frames; the head chain (`head_base`, `head_pitch`, `camera`)
    /// is optional and only required by `camera_look_at`.
    pub fn new(mut model: Box<dyn RigidBodyModel>) -> Result<Self, ModelError> {
        model.update_kinematics();

        let left_foot = model.frame_index("left_foot")?;
        let right_foot = model.frame_index("right_foot")?;
        let trunk = model.frame_index("trunk")?;

        let head = match (
            model.frame_index("head_base"),
            model.frame_index("head_pitch"),
            model.frame_index("camera"),
        ) {
            (Ok(head_base), Ok(head_pitch), Ok(camera)) => Some(HeadChain {
                head_base,
                dist_z_pan_tilt: get_t_a_b(model.as_ref(), head_base, head_pitch)
                    .translation
                    .vector
                    .z,
                dist_z_pan_camera: get_t_a_b(model.as_ref(), head_base, camera)
                    .translation
                    .vector
                    .z,
            }),
            _ => {
                log::warn!("no head frames in the model, camera_look_at won't work");
                None
            }
        };

        let mut robot = Self {
            model,
            support_side: Side::Left,
            t_world_support: Isometry3::identity(),
            left_foot,
            right_foot,
            trunk,
            head,
        };
        robot.ensure_on_floor();
        Ok(robot)
    }

    pub fn get_t_world_left(&self) -> Isometry3<f64> {
        self.model.get_t_world_frame(self.left_foot)
    }

    pub fn get_t_world_right(&self) -> Isometry3<f64> {
        self.model.get_t_world_frame(self.right_foot)
    }

    pub fn get_t_world_trunk(&self) -> Isometry3<f64> {
        self.model.get_t_world_frame(self.trunk)
    }

    /// Frame of the foot currently in contact.
    pub fn support_frame(&self) -> FrameIndex {
        if self.support_side == Side::Left {
            self.left_foot
        } else {
            self.right_foot
        }
    }

    /// Frame of the foot currently in the air.
    pub fn flying_frame(&self) -> FrameIndex {
        if self.support_side == Side::Left {
            self.right_foot
        } else {
            self.left_foot
        }
    }

    /// Switch the supporting foot. The new support foot's floor-projected
    /// transform becomes the world anchor.
    pub fn update_support_side(&mut self, new_side: Side) {
        if new_side == Side::Both {
            log::warn!("update_support_side called with 'both', keeping {}", self.support_side);
            return;
        }
        if new_side != self.support_side {
            self.support_side = new_side;
            self.model.update_kinematics();
            self.t_world_support =
                flatten_on_floor(&self.model.get_t_world_frame(self.support_frame()));
            self.ensure_on_floor();
        }
    }

    pub fn swap_support_side(&mut self) {
        self.update_support_side(self.support_side.other());
    }

    /// Re-anchor the floating base so the support foot sits exactly at the
    /// (flat, z = 0) support transform.
    pub fn ensure_on_floor(&mut self) {
        self.t_world_support = flatten_on_floor(&self.t_world_support);
        let frame = self.support_frame();
        let anchor = self.t_world_support;
        self.model.update_kinematics();
        set_t_world_frame(self.model.as_mut(), frame, &anchor);
    }

    /// Re-orient the support anchor from a measured trunk orientation and
    /// re-anchor the base on it.
    pub fn update_from_imu(&mut self, r_world_trunk: UnitQuaternion<f64>) {
        self.model.update_kinematics();

        let frame = self.support_frame();
        let t_trunk_support = get_t_a_b(self.model.as_ref(), self.trunk, frame);
        self.t_world_support.rotation = r_world_trunk * t_trunk_support.rotation;

        let anchor = self.t_world_support;
        set_t_world_frame(self.model.as_mut(), frame, &anchor);
    }

    /// Divergent component of motion `c_xy + c_dot / omega`.
    pub fn dcm(&self, com_velocity: Vector2<f64>, omega: f64) -> Vector2<f64> {
        self.model.com_world().xy() + com_velocity / omega
    }

    /// Zero-moment point `c_xy - c_ddot / omega^2`.
    pub fn zmp(&self, com_acceleration: Vector2<f64>, omega: f64) -> Vector2<f64> {
        self.model.com_world().xy() - com_acceleration / (omega * omega)
    }

    /// Reconstruct the CoM velocity from joint velocities and the trunk
    /// angular velocity, assuming the support foot is pinned: the floating
    /// base twist is recovered from the contact-constrained Jacobian.
    pub fn get_com_velocity(&self, support: Side, omega_trunk: Vector3<f64>) -> Vector3<f64> {
        let nv = self.model.nv();
        let n_joints = nv - 6;

        let j_com = self.model.com_jacobian();
        let j_com_base: DMatrix<f64> = j_com.columns(0, 6).into();
        let j_com_joints: DMatrix<f64> = j_com.columns(6, n_joints).into();

        let contact_frame = if support == Side::Left {
            self.left_foot
        } else {
            self.right_foot
        };
        let j_contact = self.model.frame_jacobian(contact_frame, ReferenceFrame::Local);
        let j_imu = self.model.frame_jacobian(self.trunk, ReferenceFrame::Local);

        // Stacked measurement Jacobian: support foot linear velocity (zero)
        // and trunk angular velocity (gyro).
        let mut j = DMatrix::zeros(6, nv);
        j.view_mut((0, 0), (3, nv)).copy_from(&j_contact.rows(0, 3));
        j.view_mut((3, 0), (3, nv)).copy_from(&j_imu.rows(3, 3));
        let j_base: DMatrix<f64> = j.columns(0, 6).into();
        let j_joints: DMatrix<f64> = j.columns(6, n_joints).into();

        let j_base_pinv = j_base
            .svd(true, true)
            .pseudo_inverse(1e-10)
            .expect("pseudo-inverse with positive epsilon");

        let mut measurement = DVector::zeros(6);
        measurement.rows_mut(3, 3).copy_from(&omega_trunk);

        let qd_joints = self.model.qd().rows(6, n_joints).into_owned();

        let direct = &j_com_base * &j_base_pinv * measurement;
        let coupled = (&j_com_joints - &j_com_base * &j_base_pinv * &j_joints) * qd_joints;
        Vector3::from_iterator((direct + coupled).iter().copied())
    }

    /// Head pan/tilt angles watching a world point with the camera axis.
    /// Fails with `InvalidArgument` when the point is closer than the
    /// pan-to-camera offset allows.
    pub fn camera_look_at(&self, p_world_target: Vector3<f64>) -> Result<(f64, f64), ModelError> {
        let head = self.head.as_ref().ok_or_else(|| {
            ModelError::UnknownFrame("head_base (no head chain in the model)".to_string())
        })?;

        let t_world_head = self.model.get_t_world_frame(head.head_base);
        let p_head_target = t_world_head.inverse_transform_point(&p_world_target.into());

        let pan = p_head_target.y.atan2(p_head_target.x);

        let p_pitch_plane = Vector2::new(
            (p_head_target.x * p_head_target.x + p_head_target.y * p_head_target.y).sqrt(),
            p_head_target.z - head.dist_z_pan_tilt,
        );

        let theta = std::f64::consts::FRAC_PI_2 - p_pitch_plane.y.atan2(p_pitch_plane.x);

        let ratio = head.dist_z_pan_camera / p_pitch_plane.norm();
        if !(-1.0..=1.0).contains(&ratio) {
            return Err(ModelError::InvalidArgument(format!(
                "camera_look_at target too close (ratio {ratio:.3})"
            )));
        }
        let beta = ratio.acos();

        Ok((pan, theta - beta))
    }

    /// Yaw-only rotation helper for targets expressed in the support frame.
    pub fn support_yaw(&self) -> Rotation3<f64> {
        Rotation3::from_axis_angle(
            &Vector3::z_axis(),
            ambler_core::geometry::frame_yaw(&self.t_world_support.rotation),
        )
    }
}
