//! The rigid-body facade.
//!
//! A backend implements [`RigidBodyModel`] over a floating-base robot with
//! generalized velocity of size `nv = 6 + n_joints` (base twist first,
//! actuated joints after). All Jacobians are `6 x nv` with translation in
//! rows 0..3 and rotation in rows 3..6.

use nalgebra::{DMatrix, DVector, Isometry3, Vector3};
use thiserror::Error;

/// Opaque frame identifier resolved by [`RigidBodyModel::frame_index`].
pub type FrameIndex = usize;

/// Errors from the robot model layer.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unknown frame: {0}")]
    UnknownFrame(String),

    #[error("Unknown joint: {0}")]
    UnknownJoint(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Reference frame of a requested Jacobian.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceFrame {
    /// Twist expressed in the frame itself.
    Local,
    /// Twist of the world-fixed point coinciding with the frame origin.
    World,
    /// Local origin, world-aligned axes.
    LocalWorldAligned,
}

/// Result of one collision-pair distance query.
#[derive(Clone, Debug)]
pub struct DistanceQuery {
    /// Frame the first geometry is rigidly attached to.
    pub parent_a: FrameIndex,
    /// Frame the second geometry is rigidly attached to.
    pub parent_b: FrameIndex,
    /// Witness point on the first geometry, world frame.
    pub point_a: Vector3<f64>,
    /// Witness point on the second geometry, world frame.
    pub point_b: Vector3<f64>,
    /// Unit normal from A to B, world frame.
    pub normal: Vector3<f64>,
    /// Signed distance between the geometries.
    pub min_distance: f64,
}

/// Facade over an external rigid-body library.
pub trait RigidBodyModel {
    /// Generalized velocity dimension (6 floating-base + actuated joints).
    fn nv(&self) -> usize;

    /// Actuated joint names, in velocity-vector order.
    fn joint_names(&self) -> Vec<String>;

    /// All frame names the model resolves.
    fn frame_names(&self) -> Vec<String>;

    /// Resolve a frame name.
    fn frame_index(&self, name: &str) -> Result<FrameIndex, ModelError>;

    /// Velocity-vector offset of an actuated joint (>= 6).
    fn joint_v_offset(&self, name: &str) -> Result<usize, ModelError>;

    fn get_joint(&self, name: &str) -> Result<f64, ModelError>;
    fn set_joint(&mut self, name: &str, value: f64) -> Result<(), ModelError>;

    /// Current joint velocities (length `nv`), base twist included.
    fn qd(&self) -> DVector<f64>;
    fn set_qd(&mut self, qd: DVector<f64>);

    /// Recompute frame placements and model quantities after a state change.
    fn update_kinematics(&mut self);

    fn get_t_world_fbase(&self) -> Isometry3<f64>;
    fn set_t_world_fbase(&mut self, t: Isometry3<f64>);

    fn get_t_world_frame(&self, frame: FrameIndex) -> Isometry3<f64>;

    /// `6 x nv` frame Jacobian in the requested reference frame.
    fn frame_jacobian(&self, frame: FrameIndex, reference: ReferenceFrame) -> DMatrix<f64>;

    fn com_world(&self) -> Vector3<f64>;

    /// `3 x nv` CoM Jacobian (world-aligned).
    fn com_jacobian(&self) -> DMatrix<f64>;

    /// `3 x nv` angular part of the centroidal momentum matrix.
    fn angular_momentum_matrix(&self) -> DMatrix<f64>;

    /// `nv x nv` joint-space mass matrix.
    fn mass_matrix(&self) -> DMatrix<f64>;

    /// Coriolis, centrifugal and gravity vector (length `nv`).
    fn non_linear_effects(&self) -> DVector<f64>;

    /// Gravity vector alone (length `nv`).
    fn generalized_gravity(&self) -> DVector<f64>;

    /// Distance queries for all registered collision pairs.
    fn distances(&self) -> Vec<DistanceQuery>;

    /// Lower/upper position limits over actuated joints (length `nv - 6`).
    fn joint_limits(&self) -> (DVector<f64>, DVector<f64>);

    /// Velocity magnitude limits over actuated joints (length `nv - 6`).
    fn velocity_limits(&self) -> DVector<f64>;

    /// Current actuated joint positions (length `nv - 6`).
    fn joint_positions(&self) -> DVector<f64>;

    /// Integrate a generalized displacement `dq` (length `nv`) into the
    /// configuration: base twist is world-aligned, joints are added.
    fn integrate(&mut self, dq: &DVector<f64>);
}

/// Re-anchor the floating base so that `frame` lands at `t_world_frame`.
pub fn set_t_world_frame(
    model: &mut dyn RigidBodyModel,
    frame: FrameIndex,
    t_world_frame: &Isometry3<f64>,
) {
    let current = model.get_t_world_frame(frame);
    let correction = t_world_frame * current.inverse();
    model.set_t_world_fbase(correction * model.get_t_world_fbase());
    model.update_kinematics();
}

/// Frame-to-frame transform.
pub fn get_t_a_b(model: &dyn RigidBodyModel, a: FrameIndex, b: FrameIndex) -> Isometry3<f64> {
    model.get_t_world_frame(a).inverse() * model.get_t_world_frame(b)
}
