// ambler-model: rigid-body facade and the humanoid robot wrapper.
//
// URDF loading, forward kinematics, mass properties and collision queries
// belong to an external rigid-body library; this crate only defines the
// facade the locomotion stack consumes, plus the humanoid-specific state
// (support side, floor anchoring, CoM-derived quantities) layered on top.

pub mod adapter;
pub mod humanoid;

pub use adapter::{DistanceQuery, FrameIndex, ModelError, ReferenceFrame, RigidBodyModel};
pub use humanoid::HumanoidRobot;
