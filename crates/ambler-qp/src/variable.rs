//! Decision variable handles.

use crate::expression::Expression;
use nalgebra::{DMatrix, DVector};

/// A named, contiguous slice `[k_start, k_start + size)` of the problem's
/// decision vector.
///
/// `Variable` is a cheap handle: the solved value lives in the
/// [`Problem`](crate::Problem) and is read back with
/// [`Problem::value`](crate::Problem::value).
#[derive(Clone, Debug)]
pub struct Variable {
    pub(crate) index: usize,
    pub name: String,
    pub k_start: usize,
    pub size: usize,
}

impl Variable {
    /// One past the last column occupied by this variable.
    pub const fn k_end(&self) -> usize {
        self.k_start + self.size
    }

    /// Expression selecting the whole variable: `A = I` on this slice,
    /// `b = 0`.
    pub fn expr(&self) -> Expression {
        self.expr_slice(0, self.size)
    }

    /// Expression selecting `rows` entries starting at local `offset`.
    pub fn expr_slice(&self, offset: usize, rows: usize) -> Expression {
        assert!(
            offset + rows <= self.size,
            "slice [{offset}, {}) out of variable '{}' of size {}",
            offset + rows,
            self.name,
            self.size
        );

        let mut a = DMatrix::zeros(rows, self.k_end());
        for k in 0..rows {
            a[(k, self.k_start + offset + k)] = 1.0;
        }

        Expression {
            a,
            b: DVector::zeros(rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Problem;

    #[test]
    fn expr_selects_identity_block() {
        let mut problem = Problem::new();
        let x = problem.add_variable("x", 2);
        let y = problem.add_variable("y", 2);

        let ex = x.expr();
        assert_eq!(ex.rows(), 2);
        assert_eq!(ex.cols(), 2);
        assert_eq!(ex.a[(0, 0)], 1.0);
        assert_eq!(ex.a[(1, 1)], 1.0);

        let ey = y.expr();
        assert_eq!(ey.rows(), 2);
        assert_eq!(ey.cols(), 4);
        assert_eq!(ey.a[(0, 2)], 1.0);
        assert_eq!(ey.a[(1, 3)], 1.0);
    }

    #[test]
    fn expr_slice_offsets_into_variable() {
        let mut problem = Problem::new();
        let x = problem.add_variable("x", 8);

        let e = x.expr_slice(2, 1);
        assert_eq!(e.rows(), 1);
        assert_eq!(e.a[(0, 2)], 1.0);
        assert_eq!(e.a.row(0).iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    #[should_panic(expected = "out of variable")]
    fn expr_slice_out_of_range_panics() {
        let mut problem = Problem::new();
        let x = problem.add_variable("x", 2);
        let _ = x.expr_slice(1, 2);
    }
}
