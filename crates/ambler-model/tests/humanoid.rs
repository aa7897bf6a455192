//! Humanoid robot wrapper over the mock biped.

use ambler_core::geometry::frame_yaw;
use ambler_core::types::Side;
use ambler_model::{HumanoidRobot, ModelError, RigidBodyModel};
use ambler_test_utils::CartesianBiped;
use approx::assert_relative_eq;
use nalgebra::{DVector, UnitQuaternion, Vector2, Vector3};

fn robot() -> HumanoidRobot {
    HumanoidRobot::new(Box::new(CartesianBiped::standard())).unwrap()
}

#[test]
fn construction_anchors_support_foot_on_floor() {
    let robot = robot();

    assert_eq!(robot.support_side, Side::Left);
    let left = robot.get_t_world_left();
    assert_relative_eq!(left.translation.vector.z, 0.0, epsilon = 1e-12);
    assert_relative_eq!(
        robot.t_world_support.translation.vector.z,
        0.0,
        epsilon = 1e-12
    );

    // The trunk hangs at its height above the anchored foot.
    let trunk = robot.get_t_world_trunk();
    assert_relative_eq!(trunk.translation.vector.z, 0.8, epsilon = 1e-12);
}

#[test]
fn support_side_switch_projects_new_foot() {
    let mut robot = robot();

    // Lift and advance the right foot, then make it the support.
    robot.model.set_joint("right_leg_x", 0.15).unwrap();
    robot.model.set_joint("right_leg_z", 0.05).unwrap();
    robot.model.update_kinematics();

    robot.update_support_side(Side::Right);

    assert_eq!(robot.support_side, Side::Right);
    // The new support transform is the right foot flattened on the floor.
    assert_relative_eq!(
        robot.t_world_support.translation.vector.z,
        0.0,
        epsilon = 1e-12
    );
    assert_relative_eq!(
        robot.get_t_world_right().translation.vector.z,
        0.0,
        epsilon = 1e-9
    );
    // x offset of the step is preserved.
    assert_relative_eq!(
        robot.t_world_support.translation.vector.x,
        0.15,
        epsilon = 1e-9
    );

    robot.swap_support_side();
    assert_eq!(robot.support_side, Side::Left);
}

#[test]
fn update_support_side_ignores_both() {
    let mut robot = robot();
    robot.update_support_side(Side::Both);
    assert_eq!(robot.support_side, Side::Left);
}

#[test]
fn dcm_and_zmp_formulas() {
    let robot = robot();
    let omega = 3.5;

    let com = robot.model.com_world();
    let dcm = robot.dcm(Vector2::new(0.7, -0.35), omega);
    assert_relative_eq!(dcm.x, com.x + 0.7 / omega, epsilon = 1e-12);
    assert_relative_eq!(dcm.y, com.y - 0.35 / omega, epsilon = 1e-12);

    let zmp = robot.zmp(Vector2::new(1.0, 0.5), omega);
    assert_relative_eq!(zmp.x, com.x - 1.0 / (omega * omega), epsilon = 1e-12);
    assert_relative_eq!(zmp.y, com.y - 0.5 / (omega * omega), epsilon = 1e-12);
}

#[test]
fn com_velocity_zero_at_rest() {
    let robot = robot();
    let velocity = robot.get_com_velocity(Side::Left, Vector3::zeros());
    assert_relative_eq!(velocity.norm(), 0.0, epsilon = 1e-9);
}

#[test]
fn com_velocity_follows_joint_rates() {
    let mut robot = robot();

    // Left leg extending at 0.2 m/s along x while the support foot stays
    // pinned: the base (and CoM) must recoil at -0.2 m/s.
    let mut qd = DVector::zeros(12);
    qd[6] = 0.2;
    robot.model.set_qd(qd);

    let velocity = robot.get_com_velocity(Side::Left, Vector3::zeros());
    assert_relative_eq!(velocity.x, -0.2, epsilon = 1e-9);
    assert_relative_eq!(velocity.y, 0.0, epsilon = 1e-9);
}

#[test]
fn imu_update_reorients_support() {
    let mut robot = robot();

    let r_world_trunk = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.4);
    robot.update_from_imu(r_world_trunk);

    let trunk = robot.get_t_world_trunk();
    assert_relative_eq!(frame_yaw(&trunk.rotation), 0.4, epsilon = 1e-9);
    // The support foot is still where the anchor says it is.
    let left = robot.get_t_world_left();
    assert_relative_eq!(
        (left.translation.vector - robot.t_world_support.translation.vector).norm(),
        0.0,
        epsilon = 1e-9
    );
}

#[test]
fn camera_look_at_without_head_frames() {
    let robot = robot();
    assert!(matches!(
        robot.camera_look_at(Vector3::new(1.0, 0.0, 0.0)),
        Err(ModelError::UnknownFrame(_))
    ));
}
