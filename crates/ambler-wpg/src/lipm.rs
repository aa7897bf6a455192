//! Linear inverted pendulum model over QP jerk variables.
//!
//! Horizontal CoM dynamics at constant height obey
//! `c_ddot = omega^2 (c - zmp)` with `omega^2 = g / h`. Each axis is a
//! 3rd-order integrator chain whose control is the piecewise-constant
//! jerk, so every quantity below is an affine expression of the decision
//! variables and can enter constraints directly.

use nalgebra::{DVector, Vector2};

use ambler_core::GRAVITY;
use ambler_qp::{Expression, Integrator, Problem};

/// Symbolic LIPM: two integrator chains (x and y) over one jerk variable
/// each.
pub struct Lipm {
    pub x: Integrator,
    pub y: Integrator,
    timesteps: usize,
    omega: f64,
    omega2: f64,
}

impl Lipm {
    /// Register the jerk variables on `problem` and build the chains from
    /// the initial planar state.
    pub fn new(
        problem: &mut Problem,
        timesteps: usize,
        omega: f64,
        dt: f64,
        t_start: f64,
        initial_pos: Vector2<f64>,
        initial_vel: Vector2<f64>,
        initial_acc: Vector2<f64>,
    ) -> Self {
        let x_var = problem.add_variable("lipm_x_jerk", timesteps);
        let y_var = problem.add_variable("lipm_y_jerk", timesteps);

        let mut x = Integrator::new(
            x_var,
            DVector::from_column_slice(&[initial_pos.x, initial_vel.x, initial_acc.x]),
            3,
            dt,
        );
        let mut y = Integrator::new(
            y_var,
            DVector::from_column_slice(&[initial_pos.y, initial_vel.y, initial_acc.y]),
            3,
            dt,
        );
        x.t_start = t_start;
        y.t_start = t_start;

        Self {
            x,
            y,
            timesteps,
            omega,
            omega2: omega * omega,
        }
    }

    /// `omega = sqrt(g / com_height)`.
    pub fn compute_omega(com_height: f64) -> f64 {
        (GRAVITY / com_height).sqrt()
    }

    pub const fn timesteps(&self) -> usize {
        self.timesteps
    }

    fn stacked(&self, step: usize, derivative: usize) -> Expression {
        self.x.expr(step, derivative).stack(&self.y.expr(step, derivative))
    }

    /// Planar position at a discrete step, as a 2-row expression.
    pub fn pos(&self, step: usize) -> Expression {
        self.stacked(step, 0)
    }

    pub fn vel(&self, step: usize) -> Expression {
        self.stacked(step, 1)
    }

    pub fn acc(&self, step: usize) -> Expression {
        self.stacked(step, 2)
    }

    pub fn jerk(&self, step: usize) -> Expression {
        self.stacked(step, 3)
    }

    /// ZMP expression `c - c_ddot / omega^2`.
    pub fn zmp(&self, step: usize) -> Expression {
        self.pos(step) - self.acc(step) * (1.0 / self.omega2)
    }

    /// ZMP velocity expression.
    pub fn dzmp(&self, step: usize) -> Expression {
        self.vel(step) - self.jerk(step) * (1.0 / self.omega2)
    }

    /// DCM expression `c + c_dot / omega`.
    pub fn dcm(&self, step: usize) -> Expression {
        self.pos(step) + self.vel(step) * (1.0 / self.omega)
    }

    /// Freeze the solved jerks into a sampleable planar trajectory.
    pub fn get_trajectory(&self, problem: &Problem) -> LipmTrajectory {
        LipmTrajectory {
            x: self.x.get_trajectory(problem),
            y: self.y.get_trajectory(problem),
            omega: self.omega,
            omega2: self.omega2,
        }
    }
}

/// Sampled CoM trajectory: position, derivatives, ZMP and DCM at any `t`.
#[derive(Clone, Debug)]
pub struct LipmTrajectory {
    pub x: ambler_qp::IntegratorTrajectory,
    pub y: ambler_qp::IntegratorTrajectory,
    pub omega: f64,
    pub omega2: f64,
}

impl LipmTrajectory {
    fn sample(&self, t: f64, derivative: usize) -> Vector2<f64> {
        Vector2::new(self.x.value(t, derivative), self.y.value(t, derivative))
    }

    pub fn pos(&self, t: f64) -> Vector2<f64> {
        self.sample(t, 0)
    }

    pub fn vel(&self, t: f64) -> Vector2<f64> {
        self.sample(t, 1)
    }

    pub fn acc(&self, t: f64) -> Vector2<f64> {
        self.sample(t, 2)
    }

    pub fn jerk(&self, t: f64) -> Vector2<f64> {
        self.sample(t, 3)
    }

    pub fn zmp(&self, t: f64) -> Vector2<f64> {
        self.pos(t) - self.acc(t) / self.omega2
    }

    pub fn dzmp(&self, t: f64) -> Vector2<f64> {
        self.vel(t) - self.jerk(t) / self.omega2
    }

    pub fn dcm(&self, t: f64) -> Vector2<f64> {
        self.pos(t) + self.vel(t) / self.omega
    }

    pub fn t_start(&self) -> f64 {
        self.x.t_start
    }

    pub fn t_end(&self) -> f64 {
        self.x.t_end()
    }
}
