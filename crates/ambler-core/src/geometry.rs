//! Planar frame helpers shared by the planners and the robot model.
//!
//! All transforms are world-frame `Isometry3<f64>`. Walking geometry is
//! essentially planar: footsteps and supports live on the floor and only
//! their yaw matters, which is what these helpers extract and enforce.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

/// Wrap an angle into `(-pi, pi]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let mut a = angle % std::f64::consts::TAU;
    if a <= -std::f64::consts::PI {
        a += std::f64::consts::TAU;
    } else if a > std::f64::consts::PI {
        a -= std::f64::consts::TAU;
    }
    a
}

/// Yaw of an orientation: the heading of the rotated x axis projected on
/// the ground plane.
pub fn frame_yaw(rotation: &UnitQuaternion<f64>) -> f64 {
    let x_axis = rotation * Vector3::x();
    x_axis.y.atan2(x_axis.x)
}

/// Build a frame from a translation and a yaw about the world z axis.
pub fn build_frame(position: Vector3<f64>, yaw: f64) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::from(position),
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw),
    )
}

/// Project a transform on the floor: z is zeroed and only yaw is kept.
pub fn flatten_on_floor(transform: &Isometry3<f64>) -> Isometry3<f64> {
    let mut position = transform.translation.vector;
    position.z = 0.0;
    build_frame(position, frame_yaw(&transform.rotation))
}

/// Interpolate between two frames; `t = 0` gives `a`, `t = 1` gives `b`.
/// Translation is linear, rotation is a slerp.
pub fn interpolate_frames(a: &Isometry3<f64>, b: &Isometry3<f64>, t: f64) -> Isometry3<f64> {
    let translation =
        a.translation.vector + (b.translation.vector - a.translation.vector) * t;
    let rotation = a.rotation.slerp(&b.rotation, t);
    Isometry3::from_parts(Translation3::from(translation), rotation)
}

/// `acos` with the argument clamped into `[-1, 1]`.
pub fn safe_acos(v: f64) -> f64 {
    v.clamp(-1.0, 1.0).acos()
}
