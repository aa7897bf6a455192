// ambler-test-utils: mock implementations of the rigid-body facade.
//
// Provides a deterministic, fully analytic robot so every crate's tests
// can exercise the humanoid wrapper, the IK solver and the walk tasks
// without an external rigid-body library.

pub mod biped;

pub use biped::{CartesianBiped, LEFT_FOOT, RIGHT_FOOT, TRUNK};
