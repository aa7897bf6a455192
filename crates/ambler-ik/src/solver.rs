//! The prioritized kinematics solver.
//!
//! Owns the task arena and, each tick, assembles one QP over the joint
//! displacement `dq` (plus one shared `scale` variable when scaled tasks
//! are present), enforces joint/velocity/self-collision inequalities, and
//! integrates the solution into the robot. Robot state is only mutated on
//! a successful solve.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use nalgebra::{DMatrix, DVector, Isometry3, UnitQuaternion, Vector3};

use ambler_model::{HumanoidRobot, ReferenceFrame, RigidBodyModel};
use ambler_qp::{Constraint, Expression, Problem, SolveError};

use crate::error::IkError;
use crate::task::{
    AxisAlignTask, AxisPlaneTask, CentroidalMomentumTask, CoMBoundTask, CoMTask, DistanceTask,
    JointsTask, MimicTask, OrientationTask, PositionTask, Priority, RegularizationTask,
    RelativeOrientationTask, RelativePositionTask, TaskId, TaskKind, TaskType,
};
use crate::AxesMask;

/// Self-collision avoidance tuning: pairs closer than `trigger` get an
/// inequality pushing them back to `margin`. An infinite `weight` (the
/// default) makes the inequality hard; a finite one makes it soft with
/// that weight.
#[derive(Clone, Debug)]
pub struct SelfCollisionConfig {
    pub enabled: bool,
    pub margin: f64,
    pub trigger: f64,
    pub weight: f64,
}

impl Default for SelfCollisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            margin: 0.005,
            trigger: 0.05,
            weight: f64::INFINITY,
        }
    }
}

pub(crate) struct TaskEntry {
    pub name: String,
    pub priority: Priority,
    pub weight: f64,
    pub kind: TaskKind,
    pub last_error_norm: f64,
}

/// A position + orientation task pair on one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameTask {
    pub position: TaskId,
    pub orientation: TaskId,
}

/// A relative position + orientation task pair between two frames.
#[derive(Clone, Copy, Debug)]
pub struct RelativeFrameTask {
    pub position: TaskId,
    pub orientation: TaskId,
}

pub struct KinematicsSolver {
    /// Control timestep: `dq` is a velocity integrated over `dt`.
    pub dt: f64,
    n: usize,
    tasks: Vec<Option<TaskEntry>>,
    masked_dofs: BTreeSet<usize>,
    pub joint_limits_enabled: bool,
    pub velocity_limits_enabled: bool,
    /// When set, joint-limit bounds are additionally capped by
    /// `dt * qd_max`.
    pub velocity_post_limits_enabled: bool,
    pub self_collision: SelfCollisionConfig,
    /// Value of the shared scale variable after the last solve (1.0 when
    /// no scaled task is active).
    pub scale: f64,
}

impl KinematicsSolver {
    pub fn new(robot: &HumanoidRobot, dt: f64) -> Self {
        assert!(dt > 0.0, "dt must be > 0");
        Self {
            dt,
            n: robot.model.nv(),
            tasks: Vec::new(),
            masked_dofs: BTreeSet::new(),
            joint_limits_enabled: true,
            velocity_limits_enabled: false,
            velocity_post_limits_enabled: false,
            self_collision: SelfCollisionConfig::default(),
            scale: 1.0,
        }
    }

    /// Width of the `dq` decision variable.
    pub const fn dofs(&self) -> usize {
        self.n
    }

    // -----------------------------------------------------------------
    // Task management
    // -----------------------------------------------------------------

    fn push_task(&mut self, name: &str, kind: TaskKind) -> TaskId {
        self.tasks.push(Some(TaskEntry {
            name: format!("{name}_{}", self.tasks.len()),
            priority: Priority::Soft,
            weight: 1.0,
            kind,
            last_error_norm: 0.0,
        }));
        TaskId(self.tasks.len() - 1)
    }

    pub fn add_position_task(&mut self, frame: usize, target_world: Vector3<f64>) -> TaskId {
        self.push_task(
            "position",
            TaskKind::Position(PositionTask {
                frame,
                target_world,
                mask: AxesMask::default(),
            }),
        )
    }

    pub fn add_relative_position_task(
        &mut self,
        frame_a: usize,
        frame_b: usize,
        target: Vector3<f64>,
    ) -> TaskId {
        self.push_task(
            "relative_position",
            TaskKind::RelativePosition(RelativePositionTask {
                frame_a,
                frame_b,
                target,
                mask: AxesMask::default(),
            }),
        )
    }

    pub fn add_com_task(&mut self, target_world: Vector3<f64>) -> TaskId {
        self.push_task(
            "com",
            TaskKind::CoM(CoMTask {
                target_world,
                mask: AxesMask::default(),
            }),
        )
    }

    /// Lower bound on the CoM height (`com_z >= bound`).
    pub fn add_com_lb_task(&mut self, bound: f64) -> TaskId {
        self.push_task(
            "com_lb",
            TaskKind::CoMBound(CoMBoundTask {
                bound,
                dir: Vector3::z(),
            }),
        )
    }

    /// Upper bound on the CoM height (`com_z <= bound`).
    pub fn add_com_ub_task(&mut self, bound: f64) -> TaskId {
        self.push_task(
            "com_ub",
            TaskKind::CoMBound(CoMBoundTask {
                bound: -bound,
                dir: -Vector3::z(),
            }),
        )
    }

    pub fn add_orientation_task(
        &mut self,
        frame: usize,
        r_world_frame: UnitQuaternion<f64>,
    ) -> TaskId {
        self.push_task(
            "orientation",
            TaskKind::Orientation(OrientationTask {
                frame,
                r_world_frame,
                mask: AxesMask::default(),
            }),
        )
    }

    pub fn add_relative_orientation_task(
        &mut self,
        frame_a: usize,
        frame_b: usize,
        r_a_b: UnitQuaternion<f64>,
    ) -> TaskId {
        self.push_task(
            "relative_orientation",
            TaskKind::RelativeOrientation(RelativeOrientationTask {
                frame_a,
                frame_b,
                r_a_b,
                mask: AxesMask::default(),
            }),
        )
    }

    pub fn add_axisalign_task(
        &mut self,
        frame: usize,
        axis_frame: Vector3<f64>,
        target_world: Vector3<f64>,
    ) -> TaskId {
        self.push_task(
            "axis_align",
            TaskKind::AxisAlign(AxisAlignTask {
                frame,
                axis_frame,
                target_world,
            }),
        )
    }

    pub fn add_axisplane_task(
        &mut self,
        frame: usize,
        axis_frame: Vector3<f64>,
        normal_world: Vector3<f64>,
    ) -> TaskId {
        self.push_task(
            "axis_plane",
            TaskKind::AxisPlane(AxisPlaneTask {
                frame,
                axis_frame,
                normal_world,
            }),
        )
    }

    pub fn add_frame_task(&mut self, frame: usize, t_world_frame: Isometry3<f64>) -> FrameTask {
        FrameTask {
            position: self.add_position_task(frame, t_world_frame.translation.vector),
            orientation: self.add_orientation_task(frame, t_world_frame.rotation),
        }
    }

    pub fn add_relative_frame_task(
        &mut self,
        frame_a: usize,
        frame_b: usize,
        t_a_b: Isometry3<f64>,
    ) -> RelativeFrameTask {
        RelativeFrameTask {
            position: self.add_relative_position_task(frame_a, frame_b, t_a_b.translation.vector),
            orientation: self.add_relative_orientation_task(frame_a, frame_b, t_a_b.rotation),
        }
    }

    pub fn add_joints_task(&mut self) -> TaskId {
        self.push_task("joints", TaskKind::Joints(JointsTask::default()))
    }

    pub fn add_mimic_task(&mut self) -> TaskId {
        self.push_task("mimic", TaskKind::Mimic(MimicTask::default()))
    }

    pub fn add_distance_task(&mut self, frame_a: usize, frame_b: usize, target: f64) -> TaskId {
        self.push_task(
            "distance",
            TaskKind::Distance(DistanceTask {
                frame_a,
                frame_b,
                target,
                task_type: TaskType::Equality,
            }),
        )
    }

    pub fn add_centroidal_momentum_task(&mut self, l_world: Vector3<f64>) -> TaskId {
        self.push_task(
            "centroidal_momentum",
            TaskKind::CentroidalMomentum(CentroidalMomentumTask {
                l_world,
                mask: AxesMask::default(),
            }),
        )
    }

    pub fn add_regularization_task(&mut self, magnitude: f64) -> TaskId {
        let id = self.push_task("regularization", TaskKind::Regularization(RegularizationTask));
        self.configure_task(id, Priority::Soft, magnitude)
            .expect("freshly created task");
        id
    }

    fn entry_mut(&mut self, id: TaskId) -> Result<&mut TaskEntry, IkError> {
        self.tasks
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(IkError::UnknownTask)
    }

    fn entry(&self, id: TaskId) -> Result<&TaskEntry, IkError> {
        self.tasks
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(IkError::UnknownTask)
    }

    /// Set a task's priority and (for soft tasks) weight.
    pub fn configure_task(
        &mut self,
        id: TaskId,
        priority: Priority,
        weight: f64,
    ) -> Result<(), IkError> {
        let entry = self.entry_mut(id)?;
        entry.priority = priority;
        entry.weight = weight;
        Ok(())
    }

    pub fn set_task_name(&mut self, id: TaskId, name: &str) -> Result<(), IkError> {
        self.entry_mut(id)?.name = name.to_string();
        Ok(())
    }

    /// Mutable access to the task payload for target updates.
    pub fn task_kind_mut(&mut self, id: TaskId) -> Result<&mut TaskKind, IkError> {
        Ok(&mut self.entry_mut(id)?.kind)
    }

    pub fn task_error_norm(&self, id: TaskId) -> Result<f64, IkError> {
        Ok(self.entry(id)?.last_error_norm)
    }

    pub fn set_position_target(&mut self, id: TaskId, target: Vector3<f64>) -> Result<(), IkError> {
        match self.task_kind_mut(id)? {
            TaskKind::Position(task) => {
                task.target_world = target;
                Ok(())
            }
            _ => Err(IkError::TaskTypeMismatch),
        }
    }

    pub fn set_orientation_target(
        &mut self,
        id: TaskId,
        r_world_frame: UnitQuaternion<f64>,
    ) -> Result<(), IkError> {
        match self.task_kind_mut(id)? {
            TaskKind::Orientation(task) => {
                task.r_world_frame = r_world_frame;
                Ok(())
            }
            _ => Err(IkError::TaskTypeMismatch),
        }
    }

    pub fn set_com_target(&mut self, id: TaskId, target: Vector3<f64>) -> Result<(), IkError> {
        match self.task_kind_mut(id)? {
            TaskKind::CoM(task) => {
                task.target_world = target;
                Ok(())
            }
            _ => Err(IkError::TaskTypeMismatch),
        }
    }

    pub fn set_frame_target(
        &mut self,
        frame_task: &FrameTask,
        t_world_frame: Isometry3<f64>,
    ) -> Result<(), IkError> {
        self.set_position_target(frame_task.position, t_world_frame.translation.vector)?;
        self.set_orientation_target(frame_task.orientation, t_world_frame.rotation)
    }

    /// Remove a task; its handle becomes invalid.
    pub fn remove_task(&mut self, id: TaskId) {
        if let Some(slot) = self.tasks.get_mut(id.0) {
            *slot = None;
        }
    }

    pub fn remove_frame_task(&mut self, frame_task: &FrameTask) {
        self.remove_task(frame_task.position);
        self.remove_task(frame_task.orientation);
    }

    /// Drop every task.
    pub fn clear_tasks(&mut self) {
        self.tasks.clear();
    }

    pub fn tasks_count(&self) -> usize {
        self.tasks.iter().flatten().count()
    }

    // -----------------------------------------------------------------
    // DoF masking and limits
    // -----------------------------------------------------------------

    /// Freeze a joint: its `dq` entry is constrained to zero.
    pub fn mask_dof(&mut self, robot: &HumanoidRobot, joint: &str) -> Result<(), IkError> {
        let offset = robot.model.joint_v_offset(joint)?;
        self.masked_dofs.insert(offset);
        Ok(())
    }

    pub fn unmask_dof(&mut self, robot: &HumanoidRobot, joint: &str) -> Result<(), IkError> {
        let offset = robot.model.joint_v_offset(joint)?;
        self.masked_dofs.remove(&offset);
        Ok(())
    }

    /// Freeze (or release) the floating base.
    pub fn mask_fbase(&mut self, masked: bool) {
        for dof in 0..6 {
            if masked {
                self.masked_dofs.insert(dof);
            } else {
                self.masked_dofs.remove(&dof);
            }
        }
    }

    pub fn enable_joint_limits(&mut self, enabled: bool) {
        self.joint_limits_enabled = enabled;
    }

    pub fn enable_velocity_limits(&mut self, enabled: bool) {
        self.velocity_limits_enabled = enabled;
    }

    pub fn enable_velocity_post_limits(&mut self, enabled: bool) {
        self.velocity_post_limits_enabled = enabled;
    }

    pub fn enable_self_collision_avoidance(&mut self, enabled: bool) {
        self.self_collision.enabled = enabled;
    }

    pub fn configure_self_collision_avoidance(&mut self, margin: f64, trigger: f64, weight: f64) {
        assert!(trigger > margin, "trigger must exceed margin");
        self.self_collision.margin = margin;
        self.self_collision.trigger = trigger;
        self.self_collision.weight = weight;
    }

    // -----------------------------------------------------------------
    // Solve
    // -----------------------------------------------------------------

    /// Solve one tick. On success the displacement is returned and, when
    /// `apply` is set, integrated into the robot. On hard infeasibility
    /// the solver dumps the task status, demotes the lowest-weight hard
    /// task to soft and retries once.
    pub fn solve(&mut self, robot: &mut HumanoidRobot, apply: bool) -> Result<DVector<f64>, IkError> {
        robot.model.update_kinematics();

        let result = self.assemble_and_solve(robot);

        let dq = match result {
            Ok(dq) => dq,
            Err(IkError::Solve(SolveError::Infeasible)) => {
                log::warn!("IK infeasible; task status:\n{}", self.dump_status());

                // Demote the least important hard task and retry once.
                let demoted = self
                    .tasks
                    .iter()
                    .enumerate()
                    .filter_map(|(index, slot)| slot.as_ref().map(|entry| (index, entry)))
                    .filter(|(_, entry)| entry.priority == Priority::Hard)
                    .min_by(|a, b| a.1.weight.total_cmp(&b.1.weight))
                    .map(|(index, _)| index);

                match demoted {
                    Some(index) => {
                        if let Some(entry) = self.tasks[index].as_mut() {
                            log::warn!(
                                "demoting hard task '{}' to soft (weight {})",
                                entry.name,
                                entry.weight
                            );
                            entry.priority = Priority::Soft;
                        }
                        self.assemble_and_solve(robot)?
                    }
                    None => return Err(SolveError::Infeasible.into()),
                }
            }
            Err(e) => return Err(e),
        };

        if apply {
            robot.model.integrate(&dq);
            robot.model.update_kinematics();
        }
        Ok(dq)
    }

    fn assemble_and_solve(&mut self, robot: &HumanoidRobot) -> Result<DVector<f64>, IkError> {
        let n = self.n;
        let mut problem = Problem::new();
        let dq = problem.add_variable("dq", n);

        let has_scaled = self
            .tasks
            .iter()
            .flatten()
            .any(|entry| entry.priority == Priority::Scaled);
        let scale_var = has_scaled.then(|| problem.add_variable("scale", 1));

        for entry in self.tasks.iter_mut().flatten() {
            let matrices = entry.kind.update(robot, n, self.dt)?;
            entry.last_error_norm = matrices.b.norm();

            let task_type = entry.kind.task_type();
            let expression = Expression {
                a: matrices.a.clone(),
                b: -&matrices.b,
            };

            let constraint = match (task_type, entry.priority) {
                (TaskType::Equality, Priority::Hard) => Constraint {
                    expression,
                    inequality: false,
                    priority: ambler_qp::Priority::Hard,
                    weight: 1.0,
                },
                (TaskType::Equality, Priority::Soft) => Constraint {
                    expression,
                    inequality: false,
                    priority: ambler_qp::Priority::Soft,
                    weight: entry.weight,
                },
                (TaskType::Equality, Priority::Scaled) => {
                    // A dq - b * scale = 0, hard.
                    let rows = matrices.a.nrows();
                    let mut a = DMatrix::zeros(rows, n + 1);
                    a.view_mut((0, 0), (rows, n)).copy_from(&matrices.a);
                    for row in 0..rows {
                        a[(row, n)] = -matrices.b[row];
                    }
                    Constraint {
                        expression: Expression {
                            a,
                            b: DVector::zeros(rows),
                        },
                        inequality: false,
                        priority: ambler_qp::Priority::Hard,
                        weight: 1.0,
                    }
                }
                // Inequality rows read `A dq >= b`; scaled inequalities
                // degrade to hard.
                (TaskType::Inequality, Priority::Soft) => Constraint {
                    expression,
                    inequality: true,
                    priority: ambler_qp::Priority::Soft,
                    weight: entry.weight,
                },
                (TaskType::Inequality, _) => Constraint {
                    expression,
                    inequality: true,
                    priority: ambler_qp::Priority::Hard,
                    weight: 1.0,
                },
            };
            problem.add_constraint(constraint);
        }

        if let Some(scale) = &scale_var {
            problem.add_constraint(scale.expr().ge(0.0));
            problem.add_constraint(scale.expr().le(1.0));
            problem.add_constraint(scale.expr().eq(1.0).soft(1.0));
        }

        for &dof in &self.masked_dofs {
            problem.add_constraint(dq.expr_slice(dof, 1).eq(0.0));
        }

        self.add_limit_constraints(robot, &dq, &mut problem);
        self.add_self_collision_constraints(robot, &mut problem)?;

        problem.solve().map_err(IkError::from)?;

        self.scale = match &scale_var {
            Some(scale) => problem.value(scale)[0],
            None => 1.0,
        };
        Ok(problem.value(&dq).clone())
    }

    fn add_limit_constraints(
        &self,
        robot: &HumanoidRobot,
        dq: &ambler_qp::Variable,
        problem: &mut Problem,
    ) {
        let model = robot.model.as_ref();
        let n_joints = self.n - 6;
        if n_joints == 0 {
            return;
        }

        let velocity_limits = model.velocity_limits();

        if self.joint_limits_enabled {
            let (lower, upper) = model.joint_limits();
            let q = model.joint_positions();

            for joint in 0..n_joints {
                // (qmin - q) <= dq <= (qmax - q): an out-of-range joint
                // gets a one-sided interval mandating motion back toward
                // its bound.
                let mut low = lower[joint] - q[joint];
                let mut high = upper[joint] - q[joint];
                if self.velocity_post_limits_enabled {
                    let cap = self.dt * velocity_limits[joint];
                    low = low.max(-cap);
                    high = high.min(cap);
                    // A violation larger than one tick's velocity budget
                    // empties the interval; collapse it onto the cap so
                    // the joint corrects at full speed.
                    if low > high {
                        if high < 0.0 {
                            high = low;
                        } else {
                            low = high;
                        }
                    }
                }

                let row = dq.expr_slice(6 + joint, 1);
                problem.add_constraint(row.ge(low));
                problem.add_constraint(row.le(high));
            }
        }

        if self.velocity_limits_enabled {
            for joint in 0..n_joints {
                let cap = self.dt * velocity_limits[joint];
                let row = dq.expr_slice(6 + joint, 1);
                problem.add_constraint(row.ge(-cap));
                problem.add_constraint(row.le(cap));
            }
        }
    }

    fn add_self_collision_constraints(
        &self,
        robot: &HumanoidRobot,
        problem: &mut Problem,
    ) -> Result<(), IkError> {
        if !self.self_collision.enabled {
            return Ok(());
        }
        let model = robot.model.as_ref();

        for query in model.distances() {
            if query.min_distance >= self.self_collision.trigger {
                continue;
            }

            // Jacobians of the witness points: translate the parent frame
            // Jacobian by the frame-to-point offset.
            let j_a = point_jacobian(model, query.parent_a, &query.point_a);
            let j_b = point_jacobian(model, query.parent_b, &query.point_b);

            let row = query.normal.transpose() * (j_b - j_a);
            let mut a = DMatrix::zeros(1, self.n);
            a.row_mut(0).copy_from(&row.row(0));

            let rhs = self.self_collision.margin - query.min_distance;
            let constraint = Constraint {
                expression: Expression {
                    a,
                    b: DVector::from_element(1, -rhs),
                },
                inequality: true,
                priority: if self.self_collision.weight.is_finite() {
                    ambler_qp::Priority::Soft
                } else {
                    ambler_qp::Priority::Hard
                },
                weight: if self.self_collision.weight.is_finite() {
                    self.self_collision.weight
                } else {
                    1.0
                },
            };
            problem.add_constraint(constraint);
        }
        Ok(())
    }

    /// One line per task: priority, weight, error norm and unit.
    pub fn dump_status(&self) -> String {
        let mut out = String::new();
        for entry in self.tasks.iter().flatten() {
            let priority = match entry.priority {
                Priority::Hard => "hard",
                Priority::Soft => "soft",
                Priority::Scaled => "scaled",
            };
            let _ = writeln!(
                out,
                "task {} [{}] priority={priority} weight={} error={:.6} {}",
                entry.name,
                entry.kind.type_name(),
                entry.weight,
                entry.last_error_norm,
                entry.kind.error_unit(),
            );
        }
        out
    }
}

/// Translation Jacobian of a world point rigidly attached to `frame`:
/// `J_p = J_trans - [p - p_frame]x J_rot` (world-aligned rows).
fn point_jacobian(
    model: &dyn RigidBodyModel,
    frame: usize,
    point: &Vector3<f64>,
) -> DMatrix<f64> {
    let j = model.frame_jacobian(frame, ReferenceFrame::LocalWorldAligned);
    let placement = model.get_t_world_frame(frame);
    let r = point - placement.translation.vector;

    let skew = nalgebra::Matrix3::new(0.0, -r.z, r.y, r.z, 0.0, -r.x, -r.y, r.x, 0.0);
    let skew = DMatrix::from_iterator(3, 3, skew.iter().copied());

    j.rows(0, 3).into_owned() - skew * j.rows(3, 3).into_owned()
}
