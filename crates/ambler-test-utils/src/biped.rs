//! A floating-base biped with Cartesian (prismatic) legs.
//!
//! Each foot hangs from the trunk through three prismatic joints along
//! x/y/z, so frame placements and Jacobians have simple closed forms:
//!
//! - `trunk` coincides with the floating base,
//! - `left_foot = base * (left_offset + q_left)`, same for the right,
//! - the CoM sits at the base origin.
//!
//! Velocities are world-aligned: the base twist is `(v_world, w_world)`
//! and `integrate` applies the exponential of the angular part.

use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Translation3, UnitQuaternion, Vector3,
};

use ambler_model::{DistanceQuery, FrameIndex, ModelError, ReferenceFrame, RigidBodyModel};

pub const TRUNK: FrameIndex = 0;
pub const LEFT_FOOT: FrameIndex = 1;
pub const RIGHT_FOOT: FrameIndex = 2;

const JOINT_NAMES: [&str; 6] = [
    "left_leg_x",
    "left_leg_y",
    "left_leg_z",
    "right_leg_x",
    "right_leg_y",
    "right_leg_z",
];

/// A sphere pair registered for distance queries.
struct SpherePair {
    frame_a: FrameIndex,
    frame_b: FrameIndex,
    radius_a: f64,
    radius_b: f64,
}

pub struct CartesianBiped {
    base: Isometry3<f64>,
    joints: [f64; 6],
    qd: DVector<f64>,
    left_offset: Vector3<f64>,
    right_offset: Vector3<f64>,
    mass: f64,
    joint_lower: DVector<f64>,
    joint_upper: DVector<f64>,
    joint_velocity_limits: DVector<f64>,
    pairs: Vec<SpherePair>,
}

impl CartesianBiped {
    /// A biped standing at the given feet spacing and trunk height, feet
    /// directly under the hips.
    pub fn new(feet_spacing: f64, trunk_height: f64) -> Self {
        Self {
            base: Isometry3::translation(0.0, 0.0, trunk_height),
            joints: [0.0; 6],
            qd: DVector::zeros(12),
            left_offset: Vector3::new(0.0, feet_spacing / 2.0, -trunk_height),
            right_offset: Vector3::new(0.0, -feet_spacing / 2.0, -trunk_height),
            mass: 5.0,
            joint_lower: DVector::from_element(6, -1.0),
            joint_upper: DVector::from_element(6, 1.0),
            joint_velocity_limits: DVector::from_element(6, 10.0),
            pairs: Vec::new(),
        }
    }

    /// Standard test geometry: 0.2 m feet spacing, 0.8 m trunk height.
    pub fn standard() -> Self {
        Self::new(0.2, 0.8)
    }

    /// Register a sphere pair between two frames for distance queries.
    pub fn add_sphere_pair(
        &mut self,
        frame_a: FrameIndex,
        frame_b: FrameIndex,
        radius_a: f64,
        radius_b: f64,
    ) {
        self.pairs.push(SpherePair {
            frame_a,
            frame_b,
            radius_a,
            radius_b,
        });
    }

    pub fn set_joint_limit(&mut self, name: &str, lower: f64, upper: f64) {
        let index = JOINT_NAMES.iter().position(|&n| n == name).expect("known joint");
        self.joint_lower[index] = lower;
        self.joint_upper[index] = upper;
    }

    pub fn set_velocity_limit(&mut self, name: &str, limit: f64) {
        let index = JOINT_NAMES.iter().position(|&n| n == name).expect("known joint");
        self.joint_velocity_limits[index] = limit;
    }

    fn joint_block(&self, frame: FrameIndex) -> Option<(usize, Vector3<f64>)> {
        match frame {
            LEFT_FOOT => Some((0, self.left_offset + Vector3::new(self.joints[0], self.joints[1], self.joints[2]))),
            RIGHT_FOOT => Some((3, self.right_offset + Vector3::new(self.joints[3], self.joints[4], self.joints[5]))),
            _ => None,
        }
    }

    fn frame_placement(&self, frame: FrameIndex) -> Isometry3<f64> {
        match self.joint_block(frame) {
            Some((_, local)) => {
                self.base * Isometry3::from_parts(Translation3::from(local), UnitQuaternion::identity())
            }
            None => self.base,
        }
    }

    fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
        Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
    }
}

impl RigidBodyModel for CartesianBiped {
    fn nv(&self) -> usize {
        12
    }

    fn joint_names(&self) -> Vec<String> {
        JOINT_NAMES.iter().map(|&n| n.to_string()).collect()
    }

    fn frame_names(&self) -> Vec<String> {
        vec!["trunk".into(), "left_foot".into(), "right_foot".into()]
    }

    fn frame_index(&self, name: &str) -> Result<FrameIndex, ModelError> {
        match name {
            "trunk" => Ok(TRUNK),
            "left_foot" => Ok(LEFT_FOOT),
            "right_foot" => Ok(RIGHT_FOOT),
            other => Err(ModelError::UnknownFrame(other.to_string())),
        }
    }

    fn joint_v_offset(&self, name: &str) -> Result<usize, ModelError> {
        JOINT_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|index| 6 + index)
            .ok_or_else(|| ModelError::UnknownJoint(name.to_string()))
    }

    fn get_joint(&self, name: &str) -> Result<f64, ModelError> {
        let offset = self.joint_v_offset(name)? - 6;
        Ok(self.joints[offset])
    }

    fn set_joint(&mut self, name: &str, value: f64) -> Result<(), ModelError> {
        let offset = self.joint_v_offset(name)? - 6;
        self.joints[offset] = value;
        Ok(())
    }

    fn qd(&self) -> DVector<f64> {
        self.qd.clone()
    }

    fn set_qd(&mut self, qd: DVector<f64>) {
        assert_eq!(qd.len(), 12);
        self.qd = qd;
    }

    fn update_kinematics(&mut self) {
        // Placements are computed on demand; nothing to cache.
    }

    fn get_t_world_fbase(&self) -> Isometry3<f64> {
        self.base
    }

    fn set_t_world_fbase(&mut self, t: Isometry3<f64>) {
        self.base = t;
    }

    fn get_t_world_frame(&self, frame: FrameIndex) -> Isometry3<f64> {
        self.frame_placement(frame)
    }

    fn frame_jacobian(&self, frame: FrameIndex, reference: ReferenceFrame) -> DMatrix<f64> {
        let mut j = DMatrix::zeros(6, 12);

        // Base translation moves every frame.
        j.view_mut((0, 0), (3, 3)).copy_from(&Matrix3::identity());
        // Base rotation spins every frame and translates offset frames.
        j.view_mut((3, 3), (3, 3)).copy_from(&Matrix3::identity());

        let placement = self.frame_placement(frame);
        let r = placement.translation.vector - self.base.translation.vector;
        j.view_mut((0, 3), (3, 3)).copy_from(&(-Self::skew(&r)));

        if let Some((block, _)) = self.joint_block(frame) {
            let rotation = self.base.rotation.to_rotation_matrix();
            j.view_mut((0, 6 + block), (3, 3)).copy_from(rotation.matrix());
        }

        match reference {
            ReferenceFrame::Local => {
                let r_inv = placement.rotation.inverse().to_rotation_matrix();
                let r_inv = DMatrix::from_iterator(3, 3, r_inv.matrix().iter().copied());
                let mut local = DMatrix::zeros(6, 12);
                local
                    .view_mut((0, 0), (3, 12))
                    .copy_from(&(&r_inv * j.rows(0, 3)));
                local
                    .view_mut((3, 0), (3, 12))
                    .copy_from(&(&r_inv * j.rows(3, 3)));
                local
            }
            // World-origin and world-aligned conventions coincide for the
            // quantities the stack consumes (translation at the frame
            // origin, world-expressed angular velocity).
            ReferenceFrame::World | ReferenceFrame::LocalWorldAligned => j,
        }
    }

    fn com_world(&self) -> Vector3<f64> {
        self.base.translation.vector
    }

    fn com_jacobian(&self) -> DMatrix<f64> {
        let mut j = DMatrix::zeros(3, 12);
        j.view_mut((0, 0), (3, 3)).copy_from(&Matrix3::identity());
        j
    }

    fn angular_momentum_matrix(&self) -> DMatrix<f64> {
        // Unit trunk inertia, legs massless.
        let mut a = DMatrix::zeros(3, 12);
        a.view_mut((0, 3), (3, 3)).copy_from(&Matrix3::identity());
        a
    }

    fn mass_matrix(&self) -> DMatrix<f64> {
        DMatrix::identity(12, 12) * self.mass
    }

    fn non_linear_effects(&self) -> DVector<f64> {
        self.generalized_gravity()
    }

    fn generalized_gravity(&self) -> DVector<f64> {
        let mut g = DVector::zeros(12);
        g[2] = self.mass * 9.80665;
        g
    }

    fn distances(&self) -> Vec<DistanceQuery> {
        self.pairs
            .iter()
            .map(|pair| {
                let p_a = self.frame_placement(pair.frame_a).translation.vector;
                let p_b = self.frame_placement(pair.frame_b).translation.vector;
                let delta = p_b - p_a;
                let gap = delta.norm();
                let normal = if gap > 1e-12 {
                    delta / gap
                } else {
                    Vector3::z()
                };
                DistanceQuery {
                    parent_a: pair.frame_a,
                    parent_b: pair.frame_b,
                    point_a: p_a + normal * pair.radius_a,
                    point_b: p_b - normal * pair.radius_b,
                    normal,
                    min_distance: gap - pair.radius_a - pair.radius_b,
                }
            })
            .collect()
    }

    fn joint_limits(&self) -> (DVector<f64>, DVector<f64>) {
        (self.joint_lower.clone(), self.joint_upper.clone())
    }

    fn velocity_limits(&self) -> DVector<f64> {
        self.joint_velocity_limits.clone()
    }

    fn joint_positions(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.joints)
    }

    fn integrate(&mut self, dq: &DVector<f64>) {
        assert_eq!(dq.len(), 12);

        let translation = Vector3::new(dq[0], dq[1], dq[2]);
        let rotation_vector = Vector3::new(dq[3], dq[4], dq[5]);

        self.base.translation.vector += translation;
        self.base.rotation =
            UnitQuaternion::from_scaled_axis(rotation_vector) * self.base.rotation;

        for k in 0..6 {
            self.joints[k] += dq[6 + k];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn standing_placements() {
        let biped = CartesianBiped::standard();

        let left = biped.get_t_world_frame(LEFT_FOOT);
        assert_relative_eq!(
            left.translation.vector,
            Vector3::new(0.0, 0.1, 0.0),
            epsilon = 1e-12
        );
        let trunk = biped.get_t_world_frame(TRUNK);
        assert_relative_eq!(
            trunk.translation.vector,
            Vector3::new(0.0, 0.0, 0.8),
            epsilon = 1e-12
        );
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let mut biped = CartesianBiped::standard();
        biped.set_joint("left_leg_x", 0.05).unwrap();
        biped.base = Isometry3::from_parts(
            Translation3::new(0.1, -0.2, 0.75),
            UnitQuaternion::from_scaled_axis(Vector3::new(0.0, 0.0, 0.4)),
        );

        let j = biped.frame_jacobian(LEFT_FOOT, ReferenceFrame::LocalWorldAligned);
        let p0 = biped.get_t_world_frame(LEFT_FOOT).translation.vector;

        let eps = 1e-7;
        for col in 0..12 {
            let mut dq = DVector::zeros(12);
            dq[col] = eps;

            let mut perturbed = CartesianBiped::standard();
            perturbed.base = biped.base;
            perturbed.joints = biped.joints;
            perturbed.integrate(&dq);

            let p1 = perturbed.get_t_world_frame(LEFT_FOOT).translation.vector;
            let numeric = (p1 - p0) / eps;
            let analytic = Vector3::new(j[(0, col)], j[(1, col)], j[(2, col)]);
            assert_relative_eq!(numeric, analytic, epsilon = 1e-5);
        }
    }

    #[test]
    fn local_jacobian_rotates_world_rows() {
        let mut biped = CartesianBiped::standard();
        biped.base = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, 0.8),
            UnitQuaternion::from_scaled_axis(Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2)),
        );

        let world = biped.frame_jacobian(LEFT_FOOT, ReferenceFrame::LocalWorldAligned);
        let local = biped.frame_jacobian(LEFT_FOOT, ReferenceFrame::Local);

        let r = biped.base.rotation.to_rotation_matrix();
        let r_t = DMatrix::from_iterator(3, 3, r.matrix().transpose().iter().copied());
        let rotated = r_t * world.rows(0, 3);
        assert_relative_eq!(local.rows(0, 3).into_owned(), rotated, epsilon = 1e-12);
    }

    #[test]
    fn distance_pair_geometry() {
        let mut biped = CartesianBiped::standard();
        biped.add_sphere_pair(LEFT_FOOT, RIGHT_FOOT, 0.02, 0.02);

        let queries = biped.distances();
        assert_eq!(queries.len(), 1);
        // Feet are 0.2 m apart, minus two 2 cm radii.
        assert_relative_eq!(queries[0].min_distance, 0.16, epsilon = 1e-12);
        assert_relative_eq!(queries[0].normal, -Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn integrate_moves_base_and_joints() {
        let mut biped = CartesianBiped::standard();
        let mut dq = DVector::zeros(12);
        dq[0] = 0.1;
        dq[5] = 0.2;
        dq[6] = -0.05;
        biped.integrate(&dq);

        assert_relative_eq!(biped.base.translation.vector.x, 0.1, epsilon = 1e-12);
        assert_relative_eq!(
            biped.base.rotation.scaled_axis().z,
            0.2,
            epsilon = 1e-12
        );
        assert_relative_eq!(biped.get_joint("left_leg_x").unwrap(), -0.05, epsilon = 1e-12);
    }
}
