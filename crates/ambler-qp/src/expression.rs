//! Affine expressions `A·x + b` over the problem's decision vector.
//!
//! Expressions are value types: every operation returns a fresh expression
//! and never aliases problem storage. Column counts are allowed to differ
//! between operands (a variable added late has more columns); operations
//! pad with zeros to the widest operand.

use nalgebra::{DMatrix, DVector, Vector2, Vector3};
use std::ops::{Add, Mul, Neg, Sub};

use crate::constraint::{Constraint, Priority};

/// An affine map over the decision vector: `rows()` outputs, each a linear
/// combination of the first `cols()` decision entries plus a constant.
#[derive(Clone, Debug, Default)]
pub struct Expression {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
}

impl Expression {
    /// A constant scalar expression (1 row, no variable dependence).
    pub fn from_scalar(value: f64) -> Self {
        Self {
            a: DMatrix::zeros(1, 0),
            b: DVector::from_element(1, value),
        }
    }

    /// A constant vector expression.
    pub fn from_vector(v: DVector<f64>) -> Self {
        Self {
            a: DMatrix::zeros(v.len(), 0),
            b: v,
        }
    }

    pub fn rows(&self) -> usize {
        self.a.nrows()
    }

    pub fn cols(&self) -> usize {
        self.a.ncols()
    }

    /// A scalar expression broadcasts against any row count.
    pub fn is_scalar(&self) -> bool {
        self.rows() == 1 && self.cols() == 0
    }

    fn piecewise_add(&self, f: f64) -> Self {
        Self {
            a: self.a.clone(),
            b: self.b.add_scalar(f),
        }
    }

    /// Left-multiply by a matrix: `M·(A·x + b)`.
    pub fn multiply(&self, m: &DMatrix<f64>) -> Self {
        assert_eq!(
            m.ncols(),
            self.rows(),
            "matrix of width {} cannot premultiply expression with {} rows",
            m.ncols(),
            self.rows()
        );
        Self {
            a: m * &self.a,
            b: m * &self.b,
        }
    }

    /// Stack another expression below this one.
    pub fn stack(&self, other: &Self) -> Self {
        let rows = self.rows() + other.rows();
        let cols = self.cols().max(other.cols());

        let mut a = DMatrix::zeros(rows, cols);
        a.view_mut((0, 0), (self.rows(), self.cols()))
            .copy_from(&self.a);
        a.view_mut((self.rows(), 0), (other.rows(), other.cols()))
            .copy_from(&other.a);

        let mut b = DVector::zeros(rows);
        b.rows_mut(0, self.rows()).copy_from(&self.b);
        b.rows_mut(self.rows(), other.rows()).copy_from(&other.b);

        Self { a, b }
    }

    /// Sum of all rows, as a 1-row expression.
    pub fn sum(&self) -> Self {
        let mut a = DMatrix::zeros(1, self.cols());
        let mut b = DVector::zeros(1);
        for k in 0..self.rows() {
            let mut row = a.row_mut(0);
            row += self.a.row(k);
            b[0] += self.b[k];
        }
        Self { a, b }
    }

    /// Mean of all rows, as a 1-row expression.
    pub fn mean(&self) -> Self {
        let n = self.rows() as f64;
        let e = self.sum();
        Self {
            a: e.a / n,
            b: e.b / n,
        }
    }

    /// Keep rows `[start, start + rows)`.
    pub fn slice_rows(&self, start: usize, rows: usize) -> Self {
        Self {
            a: self.a.rows(start, rows).into(),
            b: self.b.rows(start, rows).into(),
        }
    }

    /// Evaluate the expression at a concrete decision vector (which may be
    /// wider than the expression).
    pub fn value(&self, x: &DVector<f64>) -> DVector<f64> {
        assert!(x.len() >= self.cols(), "decision vector too short");
        &self.a * x.rows(0, self.cols()) + &self.b
    }

    /// Equality constraint `self = other` (hard by default).
    pub fn eq(&self, other: impl Into<Expression>) -> Constraint {
        Constraint {
            expression: self.clone() - other.into(),
            inequality: false,
            priority: Priority::Hard,
            weight: 1.0,
        }
    }

    /// Inequality constraint `self >= other` (hard by default).
    pub fn ge(&self, other: impl Into<Expression>) -> Constraint {
        Constraint {
            expression: self.clone() - other.into(),
            inequality: true,
            priority: Priority::Hard,
            weight: 1.0,
        }
    }

    /// Inequality constraint `self <= other` (hard by default).
    pub fn le(&self, other: impl Into<Expression>) -> Constraint {
        Constraint {
            expression: other.into() - self.clone(),
            inequality: true,
            priority: Priority::Hard,
            weight: 1.0,
        }
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Self::from_scalar(value)
    }
}

impl From<DVector<f64>> for Expression {
    fn from(v: DVector<f64>) -> Self {
        Self::from_vector(v)
    }
}

impl From<Vector2<f64>> for Expression {
    fn from(v: Vector2<f64>) -> Self {
        Self::from_vector(DVector::from_column_slice(v.as_slice()))
    }
}

impl From<Vector3<f64>> for Expression {
    fn from(v: Vector3<f64>) -> Self {
        Self::from_vector(DVector::from_column_slice(v.as_slice()))
    }
}

impl From<&Expression> for Expression {
    fn from(e: &Expression) -> Self {
        e.clone()
    }
}

impl Add for Expression {
    type Output = Expression;

    fn add(self, other: Expression) -> Expression {
        if self.is_scalar() {
            return other.piecewise_add(self.b[0]);
        }
        if other.is_scalar() {
            return self.piecewise_add(other.b[0]);
        }
        assert_eq!(
            self.rows(),
            other.rows(),
            "adding expressions with different row counts ({} vs {})",
            self.rows(),
            other.rows()
        );

        let cols = self.cols().max(other.cols());
        let mut a = DMatrix::zeros(self.rows(), cols);
        a.view_mut((0, 0), (self.rows(), self.cols()))
            .copy_from(&self.a);
        {
            let mut block = a.view_mut((0, 0), (other.rows(), other.cols()));
            block += &other.a;
        }

        Expression {
            a,
            b: self.b + other.b,
        }
    }
}

impl Sub for Expression {
    type Output = Expression;

    fn sub(self, other: Expression) -> Expression {
        self + (-other)
    }
}

impl Neg for Expression {
    type Output = Expression;

    fn neg(self) -> Expression {
        Expression {
            a: -self.a,
            b: -self.b,
        }
    }
}

impl Mul<f64> for Expression {
    type Output = Expression;

    fn mul(self, f: f64) -> Expression {
        Expression {
            a: self.a * f,
            b: self.b * f,
        }
    }
}
