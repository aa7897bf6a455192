//! Full pipeline: footsteps -> supports -> walk pattern -> IK tracking.

use ambler_core::geometry::build_frame;
use ambler_core::params::HumanoidParameters;
use ambler_core::types::Side;
use ambler_footsteps::{make_supports, FootstepsPlanner, NaiveFootstepsPlanner, PlannerParams};
use ambler_ik::KinematicsSolver;
use ambler_model::{HumanoidRobot, RigidBodyModel};
use ambler_test_utils::CartesianBiped;
use ambler_walk::WalkTasks;
use ambler_wpg::WalkPatternGenerator;
use approx::assert_relative_eq;
use nalgebra::Vector3;

fn test_parameters() -> HumanoidParameters {
    HumanoidParameters {
        dt: 0.05,
        single_support_duration: 0.3,
        double_support_duration: 0.1,
        startend_double_support_duration: 0.3,
        planned_timesteps: 1000,
        zmp_margin: 0.01,
        walk_com_height: 0.8,
        walk_foot_height: 0.04,
        walk_foot_rise_ratio: 0.25,
        feet_spacing: 0.2,
        foot_width: 0.1,
        foot_length: 0.15,
        ..HumanoidParameters::default()
    }
}

#[test]
fn reach_initial_pose_converges() {
    let mut robot = HumanoidRobot::new(Box::new(CartesianBiped::standard())).unwrap();
    let mut solver = KinematicsSolver::new(&robot, 0.01);
    let tasks = WalkTasks::initialize(&mut solver, &robot, false, false).unwrap();

    let t_world_left = build_frame(Vector3::new(0.0, 0.1, 0.0), 0.0);
    tasks
        .reach_initial_pose(&mut solver, &mut robot, t_world_left, 0.2, 0.8, 0.0)
        .unwrap();

    let left = robot.get_t_world_left().translation.vector;
    let right = robot.get_t_world_right().translation.vector;
    assert_relative_eq!(left, Vector3::new(0.0, 0.1, 0.0), epsilon = 1e-6);
    assert_relative_eq!(right, Vector3::new(0.0, -0.1, 0.0), epsilon = 1e-6);
    assert_relative_eq!(
        robot.model.com_world(),
        Vector3::new(0.0, 0.0, 0.8),
        epsilon = 1e-6
    );
}

#[test]
fn walk_tick_loop_tracks_trajectory() {
    let params = test_parameters();
    let mut robot = HumanoidRobot::new(Box::new(CartesianBiped::standard())).unwrap();

    // Stand at the nominal layout first.
    let mut solver = KinematicsSolver::new(&robot, 0.01);
    let tasks = WalkTasks::initialize(&mut solver, &robot, false, false).unwrap();
    let t_world_left = build_frame(Vector3::new(0.0, 0.1, 0.0), 0.0);
    tasks
        .reach_initial_pose(&mut solver, &mut robot, t_world_left, 0.2, 0.8, 0.0)
        .unwrap();

    // Plan footsteps to 0.3 m ahead and build the walk trajectory.
    let mut planner = NaiveFootstepsPlanner::new(PlannerParams::from(&params));
    planner.set_targets(
        build_frame(Vector3::new(0.3, 0.1, 0.0), 0.0),
        build_frame(Vector3::new(0.3, -0.1, 0.0), 0.0),
    );
    let footsteps = planner.plan(
        Side::Left,
        robot.get_t_world_left(),
        robot.get_t_world_right(),
    );
    let supports = make_supports(&footsteps, true, true, true);

    let generator = WalkPatternGenerator::new(params);
    let trajectory = generator
        .plan(&supports, robot.model.com_world(), 0.0)
        .unwrap();

    // Tick the controller through the whole walk.
    let control_dt = 0.01;
    let mut t = 0.0;
    while t < trajectory.t_end {
        tasks
            .update_tasks_from_trajectory(&mut solver, &trajectory, t)
            .unwrap();
        solver.solve(&mut robot, true).unwrap();

        // The mock is kinematically exact: targets are reached each tick.
        let left_error = (robot.get_t_world_left().translation.vector
            - trajectory.get_t_world_left(t).translation.vector)
            .norm();
        let com_error =
            (robot.model.com_world() - trajectory.get_p_world_com(t)).norm();
        assert!(left_error < 1e-6, "left foot error {left_error} at t = {t}");
        assert!(com_error < 1e-6, "CoM error {com_error} at t = {t}");

        t += control_dt;
    }

    // The robot ended up at the target layout.
    let left = robot.get_t_world_left().translation.vector;
    let right = robot.get_t_world_right().translation.vector;
    assert_relative_eq!(left.x, 0.3, epsilon = 5e-3);
    assert_relative_eq!(right.x, 0.3, epsilon = 5e-3);
    assert_relative_eq!(left.z, 0.0, epsilon = 1e-6);

    let com = robot.model.com_world();
    assert_relative_eq!(com.x, 0.3, epsilon = 5e-3);
    assert_relative_eq!(com.z, 0.8, epsilon = 1e-6);

    // Task error report covers the whole bundle.
    let errors = tasks.errors(&solver);
    assert_eq!(errors.len(), 4);
}

#[test]
fn com_offsets_shift_targets() {
    let params = test_parameters();
    let mut robot = HumanoidRobot::new(Box::new(CartesianBiped::standard())).unwrap();
    let mut solver = KinematicsSolver::new(&robot, 0.01);
    let mut tasks = WalkTasks::initialize(&mut solver, &robot, false, false).unwrap();
    tasks.com_x = 0.01;
    tasks.com_y = -0.02;

    let footsteps = vec![
        ambler_footsteps::Footstep::new(
            Side::Right,
            build_frame(Vector3::new(0.0, -0.1, 0.0), 0.0),
            0.15,
            0.1,
        ),
        ambler_footsteps::Footstep::new(
            Side::Left,
            build_frame(Vector3::new(0.0, 0.1, 0.0), 0.0),
            0.15,
            0.1,
        ),
        ambler_footsteps::Footstep::new(
            Side::Right,
            build_frame(Vector3::new(0.1, -0.1, 0.0), 0.0),
            0.15,
            0.1,
        ),
        ambler_footsteps::Footstep::new(
            Side::Left,
            build_frame(Vector3::new(0.1, 0.1, 0.0), 0.0),
            0.15,
            0.1,
        ),
    ];
    let supports = make_supports(&footsteps, true, true, true);
    let generator = WalkPatternGenerator::new(params);
    let trajectory = generator
        .plan(&supports, Vector3::new(0.0, 0.0, 0.8), 0.0)
        .unwrap();

    tasks
        .update_tasks_from_trajectory(&mut solver, &trajectory, 0.1)
        .unwrap();
    solver.solve(&mut robot, true).unwrap();

    let expected = trajectory.get_p_world_com(0.1) + Vector3::new(0.01, -0.02, 0.0);
    assert_relative_eq!(robot.model.com_world(), expected, epsilon = 1e-6);
}

#[test]
fn trunk_mode_tracks_trunk_position() {
    let mut robot = HumanoidRobot::new(Box::new(CartesianBiped::standard())).unwrap();
    let mut solver = KinematicsSolver::new(&robot, 0.01);
    let tasks = WalkTasks::initialize(&mut solver, &robot, true, false).unwrap();

    assert!(tasks.com_task.is_none());
    assert!(tasks.trunk_task.is_some());

    let target_com = Vector3::new(0.02, 0.01, 0.8);
    tasks
        .update_tasks(
            &mut solver,
            robot.get_t_world_left(),
            robot.get_t_world_right(),
            target_com,
            robot.get_t_world_trunk().rotation,
        )
        .unwrap();
    solver.solve(&mut robot, true).unwrap();

    // In trunk mode the trunk frame follows the reference point.
    assert_relative_eq!(
        robot.get_t_world_trunk().translation.vector,
        target_com,
        epsilon = 1e-6
    );
}
