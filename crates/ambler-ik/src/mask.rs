//! Axis selection masks for Cartesian tasks.

use nalgebra::{DMatrix, DVector, Matrix3};

/// Frame in which the kept axes are expressed.
#[derive(Clone, Debug, Default)]
pub enum MaskFrame {
    /// World-aligned axes (the default).
    #[default]
    World,
    /// Axes of the task's own frame.
    Local,
    /// Axes of an arbitrary frame given by `R_custom_world`.
    Custom(Matrix3<f64>),
}

/// Selects a subset of spatial axes, optionally re-expressed in another
/// frame, and projects task rows accordingly.
#[derive(Clone, Debug)]
pub struct AxesMask {
    pub indices: Vec<usize>,
    pub frame: MaskFrame,
}

impl Default for AxesMask {
    fn default() -> Self {
        Self {
            indices: vec![0, 1, 2],
            frame: MaskFrame::World,
        }
    }
}

impl AxesMask {
    /// Keep only the axes named in `axes` (a subset of `"xyz"`).
    pub fn set_axes(&mut self, axes: &str) {
        self.indices = axes
            .chars()
            .filter_map(|c| match c {
                'x' => Some(0),
                'y' => Some(1),
                'z' => Some(2),
                _ => None,
            })
            .collect();
        assert!(!self.indices.is_empty(), "mask keeps no axis");
    }

    /// Whether the mask is a no-op (all axes, world frame).
    pub fn is_identity(&self) -> bool {
        self.indices == [0, 1, 2] && matches!(self.frame, MaskFrame::World)
    }

    /// Project a 3-row task block: re-express in the mask frame, then keep
    /// the selected rows. `r_world_task` is the task frame's orientation.
    pub fn apply(
        &self,
        r_world_task: &Matrix3<f64>,
        a: DMatrix<f64>,
        b: DVector<f64>,
    ) -> (DMatrix<f64>, DVector<f64>) {
        assert_eq!(a.nrows(), 3, "masks apply to 3-row blocks");

        let projection = match &self.frame {
            MaskFrame::World => Matrix3::identity(),
            MaskFrame::Local => r_world_task.transpose(),
            MaskFrame::Custom(r_custom_world) => *r_custom_world,
        };
        let projection = DMatrix::from_iterator(3, 3, projection.iter().copied());

        let a_full = &projection * a;
        let b_full = &projection * b;

        let mut a_out = DMatrix::zeros(self.indices.len(), a_full.ncols());
        let mut b_out = DVector::zeros(self.indices.len());
        for (row, &axis) in self.indices.iter().enumerate() {
            a_out.row_mut(row).copy_from(&a_full.row(axis));
            b_out[row] = b_full[axis];
        }
        (a_out, b_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_is_identity() {
        let mask = AxesMask::default();
        assert!(mask.is_identity());

        let a = DMatrix::from_fn(3, 4, |i, j| (i * 4 + j) as f64);
        let b = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
        let (a_out, b_out) = mask.apply(&Matrix3::identity(), a.clone(), b.clone());
        assert_relative_eq!(a_out, a, epsilon = 1e-12);
        assert_relative_eq!(b_out, b, epsilon = 1e-12);
    }

    #[test]
    fn axis_subset_selects_rows() {
        let mut mask = AxesMask::default();
        mask.set_axes("xz");

        let a = DMatrix::from_fn(3, 2, |i, j| (10 * i + j) as f64);
        let b = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
        let (a_out, b_out) = mask.apply(&Matrix3::identity(), a, b);

        assert_eq!(a_out.nrows(), 2);
        assert_relative_eq!(a_out[(0, 0)], 0.0);
        assert_relative_eq!(a_out[(1, 0)], 20.0);
        assert_relative_eq!(b_out[0], 1.0);
        assert_relative_eq!(b_out[1], 3.0);
    }

    #[test]
    fn local_frame_projects_rows() {
        // Task frame rotated 90 degrees about z: local x is world y.
        let r = nalgebra::Rotation3::from_axis_angle(
            &nalgebra::Vector3::z_axis(),
            std::f64::consts::FRAC_PI_2,
        );
        let mut mask = AxesMask {
            frame: MaskFrame::Local,
            ..AxesMask::default()
        };
        mask.set_axes("x");

        let a = DMatrix::identity(3, 3);
        let b = DVector::from_column_slice(&[0.0, 5.0, 0.0]);
        let (_, b_out) = mask.apply(r.matrix(), a, b);

        // The world-y error shows up on the local-x row.
        assert_relative_eq!(b_out[0], 5.0, epsilon = 1e-12);
    }

    #[test]
    #[should_panic(expected = "keeps no axis")]
    fn empty_axes_rejected() {
        let mut mask = AxesMask::default();
        mask.set_axes("w");
    }
}
