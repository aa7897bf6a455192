//! N-th order discrete integrator as a QP expression chain.
//!
//! The decision variable holds the highest-order derivative (e.g. jerk for
//! order 3), piecewise constant over timesteps of length `dt`. The state
//! `x = (pos, vel, ..., d^{k-1})` follows the exact zero-order-hold chain
//! `x_{t+1} = A·x_t + B·u_t` with
//!
//! ```text
//! A[i][j] = dt^(j-i) / (j-i)!   (j >= i),    B[i] = dt^(k-i) / (k-i)!
//! ```
//!
//! `expr(step, d)` composes these matrices symbolically, so the returned
//! row is exact in the initial state and every past control.

use nalgebra::{DMatrix, DVector};

use crate::expression::Expression;
use crate::problem::Problem;
use crate::variable::Variable;

/// Symbolic integrator over one scalar chain.
pub struct Integrator {
    variable: Variable,
    x0: DVector<f64>,
    order: usize,
    dt: f64,
    /// Absolute time of step 0, stamped onto produced trajectories.
    pub t_start: f64,
    a_dt: DMatrix<f64>,
    b_dt: DVector<f64>,
    /// a_powers[k] = A^k.
    a_powers: Vec<DMatrix<f64>>,
}

impl Integrator {
    /// Build an integrator of the given order over `variable` (one control
    /// per timestep), starting from the state `x0` (length `order`).
    pub fn new(variable: Variable, x0: DVector<f64>, order: usize, dt: f64) -> Self {
        assert!(order >= 1, "integrator order must be >= 1");
        assert_eq!(x0.len(), order, "initial state must have `order` entries");
        assert!(dt > 0.0, "dt must be > 0");

        let (a_dt, b_dt) = Self::system_matrices(order, dt);

        let timesteps = variable.size;
        let mut a_powers = Vec::with_capacity(timesteps + 1);
        a_powers.push(DMatrix::identity(order, order));
        for k in 1..=timesteps {
            let next = &a_powers[k - 1] * &a_dt;
            a_powers.push(next);
        }

        Self {
            variable,
            x0,
            order,
            dt,
            t_start: 0.0,
            a_dt,
            b_dt,
            a_powers,
        }
    }

    /// The zero-order-hold transition pair `(A, B)` for one step of `dt`.
    pub fn system_matrices(order: usize, dt: f64) -> (DMatrix<f64>, DVector<f64>) {
        let mut a = DMatrix::zeros(order, order);
        let mut b = DVector::zeros(order);

        for i in 0..order {
            for j in i..order {
                a[(i, j)] = dt.powi((j - i) as i32) / factorial(j - i);
            }
            b[i] = dt.powi((order - i) as i32) / factorial(order - i);
        }

        (a, b)
    }

    /// Number of control timesteps.
    pub const fn timesteps(&self) -> usize {
        self.variable.size
    }

    /// Expression of the `derivative`-th state derivative at discrete
    /// `step` (state derivatives accept `step` in `0..=timesteps`, the
    /// control itself requires `step < timesteps`).
    pub fn expr(&self, step: usize, derivative: usize) -> Expression {
        assert!(
            derivative <= self.order,
            "derivative {derivative} exceeds integrator order {}",
            self.order
        );

        if derivative == self.order {
            // The control itself: piecewise constant, one variable entry.
            assert!(step < self.timesteps(), "control index out of horizon");
            return self.variable.expr_slice(step, 1);
        }

        assert!(step <= self.timesteps(), "step out of horizon");

        let mut a = DMatrix::zeros(1, self.variable.k_end());
        for k in 0..step {
            let reach = &self.a_powers[step - 1 - k] * &self.b_dt;
            a[(0, self.variable.k_start + k)] = reach[derivative];
        }

        let from_initial = &self.a_powers[step] * &self.x0;
        let b = DVector::from_element(1, from_initial[derivative]);

        Expression { a, b }
    }

    /// Freeze the solved controls into a sampleable trajectory.
    pub fn get_trajectory(&self, problem: &Problem) -> IntegratorTrajectory {
        let controls = problem.value(&self.variable).clone();

        let mut states = Vec::with_capacity(self.timesteps() + 1);
        states.push(self.x0.clone());
        for k in 0..self.timesteps() {
            let next = &self.a_dt * &states[k] + &self.b_dt * controls[k];
            states.push(next);
        }

        IntegratorTrajectory {
            order: self.order,
            dt: self.dt,
            t_start: self.t_start,
            controls,
            states,
        }
    }
}

/// Sampled result of an integrator after solving: evaluates any derivative
/// at any continuous time, clamping outside `[t_start, t_end]`.
#[derive(Clone, Debug)]
pub struct IntegratorTrajectory {
    order: usize,
    dt: f64,
    pub t_start: f64,
    controls: DVector<f64>,
    states: Vec<DVector<f64>>,
}

impl IntegratorTrajectory {
    pub fn t_end(&self) -> f64 {
        self.t_start + self.dt * self.controls.len() as f64
    }

    /// Value of the `derivative`-th state derivative at time `t`. The
    /// highest derivative is the piecewise-constant control.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn value(&self, t: f64, derivative: usize) -> f64 {
        assert!(derivative <= self.order, "derivative exceeds order");

        let timesteps = self.controls.len();
        if timesteps == 0 {
            return if derivative == self.order {
                0.0
            } else {
                self.states[0][derivative]
            };
        }

        let elapsed = (t - self.t_start).max(0.0);
        let step = ((elapsed / self.dt).floor() as usize).min(timesteps - 1);
        let remainder = (elapsed - step as f64 * self.dt).clamp(0.0, self.dt);

        if derivative == self.order {
            return self.controls[step];
        }

        let (a, b) = Integrator::system_matrices(self.order, remainder);
        let x = a * &self.states[step] + b * self.controls[step];
        x[derivative]
    }
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|k| k as f64).product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn transition_matrices_third_order() {
        let dt = 0.1;
        let (a, b) = Integrator::system_matrices(3, dt);

        assert_relative_eq!(a[(0, 0)], 1.0);
        assert_relative_eq!(a[(0, 1)], dt);
        assert_relative_eq!(a[(0, 2)], dt * dt / 2.0);
        assert_relative_eq!(a[(1, 2)], dt);
        assert_relative_eq!(a[(2, 2)], 1.0);
        assert_relative_eq!(a[(1, 0)], 0.0);

        assert_relative_eq!(b[0], dt * dt * dt / 6.0);
        assert_relative_eq!(b[1], dt * dt / 2.0);
        assert_relative_eq!(b[2], dt);
    }

    #[test]
    fn constant_jerk_matches_closed_form() {
        let dt = 0.05;
        let timesteps = 20;
        let jerk = 1.5;
        let x0 = DVector::from_column_slice(&[0.2, -0.1, 0.3]);

        let mut problem = Problem::new();
        let u = problem.add_variable("u", timesteps);
        let integrator = Integrator::new(u, x0.clone(), 3, dt);
        for step in 0..timesteps {
            problem.add_constraint(integrator.expr(step, 3).eq(jerk));
        }
        problem.solve().unwrap();

        let trajectory = integrator.get_trajectory(&problem);
        for &t in &[0.0, 0.13, 0.5, 1.0] {
            let expected = x0[0] + x0[1] * t + x0[2] * t * t / 2.0 + jerk * t * t * t / 6.0;
            assert_relative_eq!(trajectory.value(t, 0), expected, epsilon = 1e-6);
            let expected_vel = x0[1] + x0[2] * t + jerk * t * t / 2.0;
            assert_relative_eq!(trajectory.value(t, 1), expected_vel, epsilon = 1e-6);
            assert_relative_eq!(trajectory.value(t, 3), jerk, epsilon = 1e-6);
        }
    }

    #[test]
    fn expr_matches_trajectory_at_steps() {
        let dt = 0.1;
        let timesteps = 8;
        let x0 = DVector::from_column_slice(&[0.0, 1.0, 0.0]);

        let mut problem = Problem::new();
        let u = problem.add_variable("u", timesteps);
        let integrator = Integrator::new(u.clone(), x0, 3, dt);

        // Arbitrary reachable final state, minimal-effort controls.
        problem.add_constraint(
            integrator
                .expr(timesteps, 0)
                .eq(0.4),
        );
        problem.solve().unwrap();

        let trajectory = integrator.get_trajectory(&problem);
        let controls = problem.value(&u).clone();
        let full: DVector<f64> = controls;

        for step in 0..=timesteps {
            let t = step as f64 * dt;
            for derivative in 0..3 {
                let symbolic = integrator.expr(step, derivative).value(&full)[0];
                assert_relative_eq!(
                    symbolic,
                    trajectory.value(t, derivative),
                    epsilon = 1e-9
                );
            }
        }
        assert_relative_eq!(trajectory.value(timesteps as f64 * dt, 0), 0.4, epsilon = 1e-6);
    }

    #[test]
    fn sampling_clamps_outside_range() {
        let mut problem = Problem::new();
        let u = problem.add_variable("u", 4);
        let integrator = Integrator::new(u, DVector::from_column_slice(&[1.0, 0.0, 0.0]), 3, 0.1);
        problem.add_constraint(integrator.expr(4, 0).eq(1.0));
        problem.solve().unwrap();

        let trajectory = integrator.get_trajectory(&problem);
        assert_relative_eq!(
            trajectory.value(-1.0, 0),
            trajectory.value(0.0, 0),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            trajectory.value(10.0, 0),
            trajectory.value(trajectory.t_end(), 0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn first_order_integrator() {
        // Order 1: state is position, control is velocity.
        let dt = 0.5;
        let mut problem = Problem::new();
        let u = problem.add_variable("u", 2);
        let integrator = Integrator::new(u, DVector::from_element(1, 1.0), 1, dt);
        problem.add_constraint(integrator.expr(0, 1).eq(2.0));
        problem.add_constraint(integrator.expr(1, 1).eq(-2.0));
        problem.solve().unwrap();

        let trajectory = integrator.get_trajectory(&problem);
        assert_relative_eq!(trajectory.value(0.5, 0), 2.0, epsilon = 1e-6);
        assert_relative_eq!(trajectory.value(1.0, 0), 1.0, epsilon = 1e-6);
        assert_relative_eq!(trajectory.value(0.25, 0), 1.5, epsilon = 1e-6);
    }
}
