// ambler-walk: walk task bundle.
//
// Owns the solver tasks a walk needs (both feet, CoM or trunk, trunk
// orientation) and pushes trajectory samples onto them each control tick.

pub mod tasks;

pub use tasks::WalkTasks;
