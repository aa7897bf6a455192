//! Aggregation and solving of the dense QP.
//!
//! # Assembly
//!
//! Decision vector: all registered variables, then one slack per soft
//! inequality row. The objective is `min 1/2 x'Px + q'x` with
//!
//! - `1e-8·I` regularization over the whole diagonal,
//! - `w·A'A` / `w·A'b` for every soft equality `A·x + b = 0`,
//! - for soft inequalities, the slack-shifted residual `A·x + b - s` is
//!   penalized the same way while `s >= 0` is enforced hard.
//!
//! Hard equalities map to Clarabel's zero cone and hard inequalities to the
//! nonnegative cone.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{NonnegativeConeT, ZeroConeT},
};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::constraint::{Constraint, Priority};
use crate::expression::Expression;
use crate::variable::Variable;

const REGULARIZATION: f64 = 1e-8;

/// QP failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("Infeasible QP (check your hard equality and inequality constraints)")]
    Infeasible,

    #[error("QP solver failure: {0}")]
    Solver(String),
}

struct VariableData {
    name: String,
    k_start: usize,
    size: usize,
    value: DVector<f64>,
    version: u64,
}

/// An incrementally-built QP instance. Call [`Problem::solve`] once per
/// instance; solved values are read back through [`Problem::value`].
#[derive(Default)]
pub struct Problem {
    n_variables: usize,
    variables: Vec<VariableData>,
    constraints: Vec<Constraint>,
    /// Slack values of the soft inequalities after the last solve.
    pub slacks: DVector<f64>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block of `size` entries to the decision vector.
    pub fn add_variable(&mut self, name: &str, size: usize) -> Variable {
        assert!(size > 0, "variable '{name}' must have a positive size");
        let k_start = self.n_variables;
        self.n_variables += size;

        self.variables.push(VariableData {
            name: name.to_string(),
            k_start,
            size,
            value: DVector::zeros(size),
            version: 0,
        });

        Variable {
            index: self.variables.len() - 1,
            name: name.to_string(),
            k_start,
            size,
        }
    }

    /// Total width of the decision vector (without slacks).
    pub const fn n_variables(&self) -> usize {
        self.n_variables
    }

    /// Solved value of a variable (zeros before the first solve).
    pub fn value(&self, variable: &Variable) -> &DVector<f64> {
        &self.variables[variable.index].value
    }

    /// How many times the variable has been solved for.
    pub fn version(&self, variable: &Variable) -> u64 {
        self.variables[variable.index].version
    }

    /// Record a constraint.
    pub fn add_constraint(&mut self, constraint: Constraint) {
        assert!(constraint.rows() > 0, "empty constraint");
        self.constraints.push(constraint);
    }

    /// Record several constraints at once.
    pub fn add_constraints(&mut self, constraints: impl IntoIterator<Item = Constraint>) {
        for c in constraints {
            self.add_constraint(c);
        }
    }

    /// Symmetric limit `-bound <= expr <= bound` as two hard inequalities.
    pub fn add_limit(&mut self, expr: &Expression, bound: DVector<f64>) {
        self.add_constraint(expr.ge(-Expression::from_vector(bound.clone())));
        self.add_constraint(expr.le(Expression::from_vector(bound)));
    }

    pub fn constraints_count(&self) -> usize {
        self.constraints.len()
    }

    /// Assemble and solve the QP, writing solved values back into the
    /// variables.
    pub fn solve(&mut self) -> Result<(), SolveError> {
        let slack_variables: usize = self
            .constraints
            .iter()
            .filter(|c| c.inequality && c.priority == Priority::Soft)
            .map(Constraint::rows)
            .sum();

        let n = self.n_variables + slack_variables;

        let mut n_equalities = 0;
        let mut n_inequalities = slack_variables; // s_i >= 0 rows

        let mut p = DMatrix::<f64>::identity(n, n) * REGULARIZATION;
        let mut q = DVector::<f64>::zeros(n);

        // First pass: count hard rows and accumulate soft objective terms.
        let mut k_slack = 0;
        for constraint in &self.constraints {
            let rows = constraint.rows();
            let cols = constraint.expression.cols();
            match (constraint.inequality, constraint.priority) {
                (true, Priority::Hard) => n_inequalities += rows,
                (false, Priority::Hard) => n_equalities += rows,
                (false, Priority::Soft) => {
                    let a = &constraint.expression.a;
                    let b = &constraint.expression.b;
                    let mut p_block = p.view_mut((0, 0), (cols, cols));
                    p_block += constraint.weight * a.transpose() * a;
                    let mut q_block = q.rows_mut(0, cols);
                    q_block += constraint.weight * a.transpose() * b;
                }
                (true, Priority::Soft) => {
                    // Residual with the slack column appended: [A | -I_row].
                    let mut a_s = DMatrix::zeros(rows, n);
                    a_s.view_mut((0, 0), (rows, cols))
                        .copy_from(&constraint.expression.a);
                    for row in 0..rows {
                        a_s[(row, self.n_variables + k_slack + row)] = -1.0;
                    }
                    p += constraint.weight * a_s.transpose() * &a_s;
                    q += constraint.weight * a_s.transpose() * &constraint.expression.b;
                    k_slack += rows;
                }
            }
        }

        // Second pass: hard constraint blocks.
        let mut a_eq = DMatrix::<f64>::zeros(n_equalities, n);
        let mut b_eq = DVector::<f64>::zeros(n_equalities);
        let mut g = DMatrix::<f64>::zeros(n_inequalities, n);
        let mut h = DVector::<f64>::zeros(n_inequalities);

        let mut k_equality = 0;
        let mut k_inequality = 0;

        for slack in 0..slack_variables {
            g[(k_inequality, self.n_variables + slack)] = 1.0;
            k_inequality += 1;
        }

        for constraint in &self.constraints {
            let rows = constraint.rows();
            let cols = constraint.expression.cols();
            match (constraint.inequality, constraint.priority) {
                (true, Priority::Hard) => {
                    g.view_mut((k_inequality, 0), (rows, cols))
                        .copy_from(&constraint.expression.a);
                    h.rows_mut(k_inequality, rows)
                        .copy_from(&constraint.expression.b);
                    k_inequality += rows;
                }
                (false, Priority::Hard) => {
                    a_eq.view_mut((k_equality, 0), (rows, cols))
                        .copy_from(&constraint.expression.a);
                    b_eq.rows_mut(k_equality, rows)
                        .copy_from(&constraint.expression.b);
                    k_equality += rows;
                }
                _ => {}
            }
        }

        // Clarabel takes A z + s = b with s in a cone. Equalities
        // `A·x + b = 0` become zero-cone rows (A, -b); inequalities
        // `G·x + h >= 0` become nonnegative rows (-G, h).
        let mut a_all = DMatrix::<f64>::zeros(n_equalities + n_inequalities, n);
        let mut b_all = DVector::<f64>::zeros(n_equalities + n_inequalities);
        a_all.view_mut((0, 0), (n_equalities, n)).copy_from(&a_eq);
        b_all.rows_mut(0, n_equalities).copy_from(&(-&b_eq));
        a_all
            .view_mut((n_equalities, 0), (n_inequalities, n))
            .copy_from(&(-&g));
        b_all.rows_mut(n_equalities, n_inequalities).copy_from(&h);

        let p_csc = dmatrix_to_csc_upper_tri(&p);
        let a_csc = dmatrix_to_csc(&a_all);
        let cones = vec![ZeroConeT(n_equalities), NonnegativeConeT(n_inequalities)];

        let settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .max_iter(200)
            .tol_gap_abs(1e-10)
            .tol_gap_rel(1e-10)
            .tol_feas(1e-10)
            .build()
            .map_err(|e| SolveError::Solver(e.to_string()))?;

        let q_slice: Vec<f64> = q.iter().copied().collect();
        let b_slice: Vec<f64> = b_all.iter().copied().collect();

        let mut solver = DefaultSolver::new(&p_csc, &q_slice, &a_csc, &b_slice, &cones, settings);
        solver.solve();

        let solution = &solver.solution;
        match solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {}
            SolverStatus::PrimalInfeasible
            | SolverStatus::AlmostPrimalInfeasible
            | SolverStatus::DualInfeasible
            | SolverStatus::AlmostDualInfeasible => return Err(SolveError::Infeasible),
            status => return Err(SolveError::Solver(format!("{status:?}"))),
        }

        for variable in &mut self.variables {
            variable.version += 1;
            for k in 0..variable.size {
                variable.value[k] = solution.x[variable.k_start + k];
            }
        }
        self.slacks = DVector::from_iterator(
            slack_variables,
            solution.x[self.n_variables..n].iter().copied(),
        );

        Ok(())
    }

    /// Variable names in registration order (used by status dumps).
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }
}

/// Dense to CSC, full matrix.
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Dense symmetric to upper-triangular CSC (Clarabel's `P` convention).
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows - 1) {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn minimum_norm_equality() {
        let mut problem = Problem::new();
        let x = problem.add_variable("x", 16);
        problem.add_constraint(x.expr().sum().eq(1.0));
        problem.solve().unwrap();

        // 16 values summing to one, minimized in norm: all 1/16.
        for &v in problem.value(&x).iter() {
            assert_relative_eq!(v, 1.0 / 16.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn bounded_inequality_shifts_solution() {
        let mut problem = Problem::new();
        let x = problem.add_variable("x", 16);
        problem.add_constraint(x.expr().sum().eq(1.0));
        problem.add_constraint(x.expr_slice(0, 1).ge(2.0));
        problem.add_constraint(x.expr_slice(0, 1).le(10.0));
        problem.solve().unwrap();

        let value = problem.value(&x);
        assert!(value[0] >= 2.0 - 1e-6);
        for k in 1..16 {
            assert_relative_eq!(value[k], -1.0 / 15.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn equality_with_limits() {
        let mut problem = Problem::new();
        let p1 = problem.add_variable("p1", 2);
        let p2 = problem.add_variable("p2", 2);

        problem.add_constraint(
            p1.expr()
                .eq(DVector::from_column_slice(&[17.0, 22.0])),
        );
        let difference = p1.expr() - p2.expr();
        problem.add_limit(&difference, DVector::from_element(2, 3.0));
        problem.add_constraint(p2.expr_slice(0, 1).ge(18.0));
        problem.solve().unwrap();

        let v1 = problem.value(&p1);
        let v2 = problem.value(&p2);
        assert_relative_eq!(v1[0], 17.0, epsilon = 1e-6);
        assert_relative_eq!(v1[1], 22.0, epsilon = 1e-6);
        assert_relative_eq!(v2[0], 18.0, epsilon = 1e-6);
        assert_relative_eq!(v2[1], 19.0, epsilon = 1e-6);
    }

    #[test]
    fn soft_equality_trades_off() {
        let mut problem = Problem::new();
        let x = problem.add_variable("x", 1);

        // Two incompatible targets; the heavier one wins 10:1.
        problem.add_constraint(x.expr().eq(0.0).soft(1.0));
        problem.add_constraint(x.expr().eq(11.0).soft(10.0));
        problem.solve().unwrap();

        assert_relative_eq!(problem.value(&x)[0], 10.0, epsilon = 1e-5);
    }

    #[test]
    fn soft_inequality_uses_slack() {
        let mut problem = Problem::new();
        let x = problem.add_variable("x", 1);

        problem.add_constraint(x.expr().eq(0.0));
        // Soft x >= 1 cannot be met; the slack absorbs it instead of
        // making the problem infeasible.
        problem.add_constraint(x.expr().ge(1.0).soft(100.0));
        problem.solve().unwrap();

        assert_relative_eq!(problem.value(&x)[0], 0.0, epsilon = 1e-6);
        assert_eq!(problem.slacks.len(), 1);
    }

    #[test]
    fn infeasible_hard_set() {
        let mut problem = Problem::new();
        let x = problem.add_variable("x", 1);
        problem.add_constraint(x.expr().ge(1.0));
        problem.add_constraint(x.expr().le(-1.0));

        assert!(matches!(problem.solve(), Err(SolveError::Infeasible)));
    }

    #[test]
    fn versions_bump_per_solve() {
        let mut problem = Problem::new();
        let x = problem.add_variable("x", 1);
        problem.add_constraint(x.expr().eq(1.0));
        assert_eq!(problem.version(&x), 0);
        problem.solve().unwrap();
        assert_eq!(problem.version(&x), 1);
    }
}
