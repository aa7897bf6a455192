//! The walk task bundle.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use ambler_ik::{FrameTask, IkError, KinematicsSolver, Priority, TaskId};
use ambler_model::{HumanoidRobot, RigidBodyModel as _};
use ambler_wpg::Trajectory;

/// Tasks realizing a walk trajectory: one frame task per foot, a CoM task
/// (or a trunk position task in `trunk_mode`), and a trunk orientation
/// task. All soft, weight 1, unless `scaled` is requested.
pub struct WalkTasks {
    pub left_foot_task: FrameTask,
    pub right_foot_task: FrameTask,
    pub trunk_orientation_task: TaskId,
    pub com_task: Option<TaskId>,
    pub trunk_task: Option<TaskId>,

    /// Track the trunk position instead of the CoM.
    pub trunk_mode: bool,
    /// Shift the CoM sample time backwards by this much.
    pub com_delay: f64,
    /// Static CoM offsets, world frame.
    pub com_x: f64,
    pub com_y: f64,
}

impl WalkTasks {
    /// Create the tasks on `solver` at the robot's current posture.
    pub fn initialize(
        solver: &mut KinematicsSolver,
        robot: &HumanoidRobot,
        trunk_mode: bool,
        scaled: bool,
    ) -> Result<Self, IkError> {
        let priority = if scaled { Priority::Scaled } else { Priority::Soft };

        let left_foot_task = solver.add_frame_task(robot.left_foot, robot.get_t_world_left());
        let right_foot_task = solver.add_frame_task(robot.right_foot, robot.get_t_world_right());
        for task in [
            left_foot_task.position,
            left_foot_task.orientation,
            right_foot_task.position,
            right_foot_task.orientation,
        ] {
            solver.configure_task(task, priority, 1.0)?;
        }
        solver.set_task_name(left_foot_task.position, "left_foot")?;
        solver.set_task_name(right_foot_task.position, "right_foot")?;

        let (com_task, trunk_task) = if trunk_mode {
            let task = solver.add_position_task(
                robot.trunk,
                robot.get_t_world_trunk().translation.vector,
            );
            solver.configure_task(task, priority, 1.0)?;
            solver.set_task_name(task, "trunk")?;
            (None, Some(task))
        } else {
            let task = solver.add_com_task(robot.model.com_world());
            solver.configure_task(task, priority, 1.0)?;
            solver.set_task_name(task, "com")?;
            (Some(task), None)
        };

        let trunk_orientation_task =
            solver.add_orientation_task(robot.trunk, robot.get_t_world_trunk().rotation);
        solver.configure_task(trunk_orientation_task, priority, 1.0)?;
        solver.set_task_name(trunk_orientation_task, "trunk_orientation")?;

        Ok(Self {
            left_foot_task,
            right_foot_task,
            trunk_orientation_task,
            com_task,
            trunk_task,
            trunk_mode,
            com_delay: 0.0,
            com_x: 0.0,
            com_y: 0.0,
        })
    }

    /// Drop every owned task from the solver.
    pub fn remove_tasks(&self, solver: &mut KinematicsSolver) {
        solver.remove_frame_task(&self.left_foot_task);
        solver.remove_frame_task(&self.right_foot_task);
        solver.remove_task(self.trunk_orientation_task);
        if let Some(task) = self.com_task {
            solver.remove_task(task);
        }
        if let Some(task) = self.trunk_task {
            solver.remove_task(task);
        }
    }

    /// Push explicit targets onto the tasks.
    pub fn update_tasks(
        &self,
        solver: &mut KinematicsSolver,
        t_world_left: Isometry3<f64>,
        t_world_right: Isometry3<f64>,
        com_world: Vector3<f64>,
        r_world_trunk: UnitQuaternion<f64>,
    ) -> Result<(), IkError> {
        solver.set_frame_target(&self.left_foot_task, t_world_left)?;
        solver.set_frame_target(&self.right_foot_task, t_world_right)?;
        solver.set_orientation_target(self.trunk_orientation_task, r_world_trunk)?;

        if let Some(task) = self.com_task {
            solver.set_com_target(task, com_world)?;
        }
        if let Some(task) = self.trunk_task {
            solver.set_position_target(task, com_world)?;
        }
        Ok(())
    }

    /// Sample the trajectory at `t` and push the targets, honoring the
    /// CoM delay and static offsets.
    pub fn update_tasks_from_trajectory(
        &self,
        solver: &mut KinematicsSolver,
        trajectory: &Trajectory,
        t: f64,
    ) -> Result<(), IkError> {
        let com_t = t - self.com_delay;
        let com = trajectory.get_p_world_com(com_t) + Vector3::new(self.com_x, self.com_y, 0.0);

        self.update_tasks(
            solver,
            trajectory.get_t_world_left(t),
            trajectory.get_t_world_right(t),
            com,
            trajectory.get_r_world_trunk(t),
        )
    }

    /// Task error norms by name, for monitoring.
    pub fn errors(&self, solver: &KinematicsSolver) -> Vec<(&'static str, f64)> {
        let mut out = Vec::new();
        let mut push = |name, id: TaskId| {
            if let Ok(error) = solver.task_error_norm(id) {
                out.push((name, error));
            }
        };
        push("left_foot", self.left_foot_task.position);
        push("right_foot", self.right_foot_task.position);
        push("trunk_orientation", self.trunk_orientation_task);
        if let Some(task) = self.com_task {
            push("com", task);
        }
        if let Some(task) = self.trunk_task {
            push("trunk", task);
        }
        out
    }

    /// Drive the robot into a standing pose: feet side by side under the
    /// trunk, CoM at `com_height` over the feet midpoint, trunk pitched.
    /// Iterates the solver until the displacement converges.
    pub fn reach_initial_pose(
        &self,
        solver: &mut KinematicsSolver,
        robot: &mut HumanoidRobot,
        t_world_left: Isometry3<f64>,
        feet_spacing: f64,
        com_height: f64,
        trunk_pitch: f64,
    ) -> Result<(), IkError> {
        let t_world_right =
            t_world_left * Isometry3::from_parts(
                Translation3::new(0.0, -feet_spacing, 0.0),
                UnitQuaternion::identity(),
            );
        let middle = t_world_left
            * nalgebra::Point3::new(0.0, -feet_spacing / 2.0, 0.0);
        let com = middle.coords + Vector3::new(0.0, 0.0, com_height);

        let trunk_rotation = t_world_left.rotation
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), trunk_pitch);

        self.update_tasks(solver, t_world_left, t_world_right, com, trunk_rotation)?;

        for _ in 0..100 {
            let dq = solver.solve(robot, true)?;
            if dq.norm() < 1e-9 {
                break;
            }
        }
        Ok(())
    }
}
