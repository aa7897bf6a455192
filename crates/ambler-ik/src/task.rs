//! Task definitions: each variant linearizes one Cartesian or joint-space
//! goal into `(A, b)` over the joint displacement `dq`.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector, Matrix3, UnitQuaternion, Vector3};

use ambler_model::{FrameIndex, HumanoidRobot, ReferenceFrame, RigidBodyModel as _};

use crate::error::IkError;
use crate::mask::AxesMask;

/// Stable handle into the solver's task arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) usize);

/// Task priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    /// Equality/inequality constraint of the QP.
    Hard,
    /// Weighted term of the objective.
    Soft,
    /// Hard constraint against the shared progress variable
    /// (`A dq = scale * b`, `scale` maximized toward 1).
    Scaled,
}

/// Whether a task's rows are equalities or `A dq >= b` inequalities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskType {
    Equality,
    Inequality,
}

/// Linearized task block.
pub struct TaskMatrices {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
}

fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

fn log3(r: &UnitQuaternion<f64>) -> Vector3<f64> {
    r.scaled_axis()
}

fn translation_rows(j: &DMatrix<f64>) -> DMatrix<f64> {
    j.rows(0, 3).into_owned()
}

fn rotation_rows(j: &DMatrix<f64>) -> DMatrix<f64> {
    j.rows(3, 3).into_owned()
}

/// Dynamically-sized copy of a 3x3 matrix, so products with `DMatrix`
/// blocks stay dynamically typed.
fn dyn3(m: &Matrix3<f64>) -> DMatrix<f64> {
    DMatrix::from_iterator(3, 3, m.iter().copied())
}

// ---------------------------------------------------------------------------
// Task variants
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct PositionTask {
    pub frame: FrameIndex,
    pub target_world: Vector3<f64>,
    pub mask: AxesMask,
}

#[derive(Clone, Debug)]
pub struct RelativePositionTask {
    pub frame_a: FrameIndex,
    pub frame_b: FrameIndex,
    /// Target position of `b` expressed in `a`.
    pub target: Vector3<f64>,
    pub mask: AxesMask,
}

#[derive(Clone, Debug)]
pub struct CoMTask {
    pub target_world: Vector3<f64>,
    pub mask: AxesMask,
}

#[derive(Clone, Debug)]
pub struct CoMBoundTask {
    /// Bound on `dir . com`; the inequality keeps `dir . com >= bound`.
    pub bound: f64,
    pub dir: Vector3<f64>,
}

#[derive(Clone, Debug)]
pub struct OrientationTask {
    pub frame: FrameIndex,
    pub r_world_frame: UnitQuaternion<f64>,
    pub mask: AxesMask,
}

#[derive(Clone, Debug)]
pub struct RelativeOrientationTask {
    pub frame_a: FrameIndex,
    pub frame_b: FrameIndex,
    pub r_a_b: UnitQuaternion<f64>,
    pub mask: AxesMask,
}

#[derive(Clone, Debug)]
pub struct AxisAlignTask {
    pub frame: FrameIndex,
    /// Axis expressed in the task frame.
    pub axis_frame: Vector3<f64>,
    /// Direction the axis should align with, world frame.
    pub target_world: Vector3<f64>,
}

#[derive(Clone, Debug)]
pub struct AxisPlaneTask {
    pub frame: FrameIndex,
    pub axis_frame: Vector3<f64>,
    /// Normal of the plane the axis must lie in, world frame.
    pub normal_world: Vector3<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct JointsTask {
    /// Joint name to target position.
    pub joints: BTreeMap<String, f64>,
}

impl JointsTask {
    pub fn set_joint(&mut self, joint: &str, target: f64) {
        self.joints.insert(joint.to_string(), target);
    }
}

#[derive(Clone, Debug, Default)]
pub struct MimicTask {
    /// `(follower, leader, ratio)`: constrains `dq_follower = ratio * dq_leader`.
    pub couplings: Vec<(String, String, f64)>,
}

impl MimicTask {
    pub fn set_mimic(&mut self, follower: &str, leader: &str, ratio: f64) {
        self.couplings
            .push((follower.to_string(), leader.to_string(), ratio));
    }
}

#[derive(Clone, Debug)]
pub struct DistanceTask {
    pub frame_a: FrameIndex,
    pub frame_b: FrameIndex,
    pub target: f64,
    /// Equality drives the distance to `target`; inequality keeps it
    /// above.
    pub task_type: TaskType,
}

#[derive(Clone, Debug)]
pub struct CentroidalMomentumTask {
    /// Target angular momentum, world frame.
    pub l_world: Vector3<f64>,
    pub mask: AxesMask,
}

#[derive(Clone, Debug)]
pub struct RegularizationTask;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub enum TaskKind {
    Position(PositionTask),
    RelativePosition(RelativePositionTask),
    CoM(CoMTask),
    CoMBound(CoMBoundTask),
    Orientation(OrientationTask),
    RelativeOrientation(RelativeOrientationTask),
    AxisAlign(AxisAlignTask),
    AxisPlane(AxisPlaneTask),
    Joints(JointsTask),
    Mimic(MimicTask),
    Distance(DistanceTask),
    CentroidalMomentum(CentroidalMomentumTask),
    Regularization(RegularizationTask),
}

impl TaskKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Position(_) => "position",
            Self::RelativePosition(_) => "relative_position",
            Self::CoM(_) => "com",
            Self::CoMBound(_) => "com_bound",
            Self::Orientation(_) => "orientation",
            Self::RelativeOrientation(_) => "relative_orientation",
            Self::AxisAlign(_) => "axis_align",
            Self::AxisPlane(_) => "axis_plane",
            Self::Joints(_) => "joints",
            Self::Mimic(_) => "mimic",
            Self::Distance(_) => "distance",
            Self::CentroidalMomentum(_) => "centroidal_momentum",
            Self::Regularization(_) => "regularization",
        }
    }

    pub fn error_unit(&self) -> &'static str {
        match self {
            Self::Position(_) | Self::RelativePosition(_) | Self::CoM(_) | Self::CoMBound(_)
            | Self::Distance(_) => "m",
            Self::Orientation(_) | Self::RelativeOrientation(_) | Self::AxisAlign(_)
            | Self::AxisPlane(_) | Self::Joints(_) | Self::Mimic(_) => "rad",
            Self::CentroidalMomentum(_) => "kg.m^2/s",
            Self::Regularization(_) => "dq",
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            Self::CoMBound(_) => TaskType::Inequality,
            Self::Distance(task) => task.task_type,
            _ => TaskType::Equality,
        }
    }

    /// Linearize the task at the robot's current configuration.
    pub fn update(
        &self,
        robot: &HumanoidRobot,
        n: usize,
        dt: f64,
    ) -> Result<TaskMatrices, IkError> {
        let model = robot.model.as_ref();

        let matrices = match self {
            Self::Position(task) => {
                let placement = model.get_t_world_frame(task.frame);
                let error = task.target_world - placement.translation.vector;
                let j = model.frame_jacobian(task.frame, ReferenceFrame::LocalWorldAligned);
                let (a, b) = task.mask.apply(
                    placement.rotation.to_rotation_matrix().matrix(),
                    translation_rows(&j),
                    DVector::from_column_slice(error.as_slice()),
                );
                TaskMatrices { a, b }
            }

            Self::RelativePosition(task) => {
                let t_world_a = model.get_t_world_frame(task.frame_a);
                let t_world_b = model.get_t_world_frame(task.frame_b);
                let p_a_b = t_world_a.inverse_transform_point(&t_world_b.translation.vector.into());
                let error = task.target - p_a_b.coords;

                let j_a = model.frame_jacobian(task.frame_a, ReferenceFrame::LocalWorldAligned);
                let j_b = model.frame_jacobian(task.frame_b, ReferenceFrame::LocalWorldAligned);
                let r_a_t = t_world_a.rotation.to_rotation_matrix().matrix().transpose();
                let a = dyn3(&r_a_t) * (translation_rows(&j_b) - translation_rows(&j_a));

                let (a, b) = task.mask.apply(
                    t_world_a.rotation.to_rotation_matrix().matrix(),
                    a,
                    DVector::from_column_slice(error.as_slice()),
                );
                TaskMatrices { a, b }
            }

            Self::CoM(task) => {
                let error = task.target_world - model.com_world();
                let (a, b) = task.mask.apply(
                    &Matrix3::identity(),
                    model.com_jacobian(),
                    DVector::from_column_slice(error.as_slice()),
                );
                TaskMatrices { a, b }
            }

            Self::CoMBound(task) => {
                let j = model.com_jacobian();
                let mut a = DMatrix::zeros(1, n);
                let projected = task.dir.transpose() * &j;
                a.row_mut(0).copy_from(&projected.row(0));
                let b = DVector::from_element(1, task.bound - task.dir.dot(&model.com_world()));
                TaskMatrices { a, b }
            }

            Self::Orientation(task) => {
                let placement = model.get_t_world_frame(task.frame);
                let error = log3(&(task.r_world_frame * placement.rotation.inverse()));
                let j = model.frame_jacobian(task.frame, ReferenceFrame::World);
                let (a, b) = task.mask.apply(
                    placement.rotation.to_rotation_matrix().matrix(),
                    rotation_rows(&j),
                    DVector::from_column_slice(error.as_slice()),
                );
                TaskMatrices { a, b }
            }

            Self::RelativeOrientation(task) => {
                let t_world_a = model.get_t_world_frame(task.frame_a);
                let t_world_b = model.get_t_world_frame(task.frame_b);
                let r_a_b = t_world_a.rotation.inverse() * t_world_b.rotation;
                let error = log3(&(task.r_a_b * r_a_b.inverse()));

                let j_a = model.frame_jacobian(task.frame_a, ReferenceFrame::World);
                let j_b = model.frame_jacobian(task.frame_b, ReferenceFrame::World);
                let r_a_t = t_world_a.rotation.to_rotation_matrix().matrix().transpose();
                let a = dyn3(&r_a_t) * (rotation_rows(&j_b) - rotation_rows(&j_a));

                let (a, b) = task.mask.apply(
                    t_world_a.rotation.to_rotation_matrix().matrix(),
                    a,
                    DVector::from_column_slice(error.as_slice()),
                );
                TaskMatrices { a, b }
            }

            Self::AxisAlign(task) => {
                let placement = model.get_t_world_frame(task.frame);
                let axis_world = placement.rotation * task.axis_frame;
                let target = task.target_world.normalize() * axis_world.norm();

                // First-order axis motion: d(axis) = -[axis]x w.
                let j = model.frame_jacobian(task.frame, ReferenceFrame::World);
                let a = dyn3(&(-skew(&axis_world))) * rotation_rows(&j);
                let error = target - axis_world;
                TaskMatrices {
                    a,
                    b: DVector::from_column_slice(error.as_slice()),
                }
            }

            Self::AxisPlane(task) => {
                let placement = model.get_t_world_frame(task.frame);
                let axis_world = placement.rotation * task.axis_frame;
                let normal = task.normal_world.normalize();

                let j = model.frame_jacobian(task.frame, ReferenceFrame::World);
                let row = normal.transpose() * (-skew(&axis_world)) * rotation_rows(&j);
                let mut a = DMatrix::zeros(1, n);
                a.row_mut(0).copy_from(&row.row(0));
                let b = DVector::from_element(1, -normal.dot(&axis_world));
                TaskMatrices { a, b }
            }

            Self::Joints(task) => {
                let rows = task.joints.len();
                let mut a = DMatrix::zeros(rows, n);
                let mut b = DVector::zeros(rows);
                for (row, (joint, target)) in task.joints.iter().enumerate() {
                    let offset = model.joint_v_offset(joint)?;
                    a[(row, offset)] = 1.0;
                    b[row] = target - model.get_joint(joint)?;
                }
                TaskMatrices { a, b }
            }

            Self::Mimic(task) => {
                let rows = task.couplings.len();
                let mut a = DMatrix::zeros(rows, n);
                let b = DVector::zeros(rows);
                for (row, (follower, leader, ratio)) in task.couplings.iter().enumerate() {
                    a[(row, model.joint_v_offset(follower)?)] = 1.0;
                    a[(row, model.joint_v_offset(leader)?)] = -ratio;
                }
                TaskMatrices { a, b }
            }

            Self::Distance(task) => {
                let p_a = model.get_t_world_frame(task.frame_a).translation.vector;
                let p_b = model.get_t_world_frame(task.frame_b).translation.vector;
                let delta = p_b - p_a;
                let distance = delta.norm().max(1e-9);
                let direction = delta / distance;

                let j_a = model.frame_jacobian(task.frame_a, ReferenceFrame::LocalWorldAligned);
                let j_b = model.frame_jacobian(task.frame_b, ReferenceFrame::LocalWorldAligned);
                let row =
                    direction.transpose() * (translation_rows(&j_b) - translation_rows(&j_a));

                let mut a = DMatrix::zeros(1, n);
                a.row_mut(0).copy_from(&row.row(0));
                let b = DVector::from_element(1, task.target - distance);
                TaskMatrices { a, b }
            }

            Self::CentroidalMomentum(task) => {
                let a_g = model.angular_momentum_matrix();
                let target = task.l_world * dt;
                let (a, b) = task.mask.apply(
                    &Matrix3::identity(),
                    a_g,
                    DVector::from_column_slice(target.as_slice()),
                );
                TaskMatrices { a, b }
            }

            Self::Regularization(_) => TaskMatrices {
                a: DMatrix::identity(n, n),
                b: DVector::zeros(n),
            },
        };

        Ok(matrices)
    }
}
