//! Multi-shift triangular solves.
//!
//! The resolvent estimators apply `B_z = (U − zI)⁻ᴴ(U − zI)⁻¹` to one column per
//! shift. [`MultiShiftSolve`] is the kernel contract; [`UpperTriangular`] is the
//! dense back/forward substitution implementation used by the driver.
//!
//! The kernel never introduces a NaN: a pivot `U_kk − z` that vanishes to
//! below `ε·max(1, max|U_ij|)` is replaced by that floor, which turns an exact
//! eigenvalue hit into a huge but finite result that the norm cap absorbs.

use crate::comm::Communicator;
use crate::error::{ErrorKind, PseudospectrumError};
use crate::matrix::DistColumns;
use faer::{Mat, c64};

/// Solves with `U − z_j I` (or its adjoint) for one right-hand side per shift.
pub trait MultiShiftSolve: Sync {
    /// Order of the triangular matrix.
    fn order(&self) -> usize;

    /// `x_j ← (U − z_j I)⁻¹ x_j` for every column `j`.
    fn solve(&self, shifts: &[c64], x: &mut Mat<c64>);

    /// `x_j ← (U − z_j I)⁻ᴴ x_j` for every column `j`.
    fn solve_adjoint(&self, shifts: &[c64], x: &mut Mat<c64>);

    /// `x_j ← B_{z_j} x_j`, the operator whose largest eigenvalue is
    /// `‖(U − z_j I)⁻¹‖²`.
    fn apply_inverse_normal(&self, shifts: &[c64], x: &mut Mat<c64>) {
        self.solve(shifts, x);
        self.solve_adjoint(shifts, x);
    }
}

/// A dense upper-triangular matrix; entries below the diagonal are dropped.
#[derive(Debug, Clone)]
pub struct UpperTriangular {
    u: Mat<c64>,
    pivot_floor: f64,
}

impl UpperTriangular {
    pub fn new(u: Mat<c64>) -> Result<Self, PseudospectrumError> {
        if u.nrows() != u.ncols() {
            return Err(ErrorKind::DimensionMismatch {
                what: "triangular matrix columns",
                expected: u.nrows(),
                actual: u.ncols(),
            }
            .into());
        }
        let n = u.nrows();
        let mut upper = Mat::zeros(n, n);
        upper.copy_from_triangular_upper(u.as_ref());
        let scale = upper.norm_max().max(1.0);
        Ok(UpperTriangular {
            u: upper,
            pivot_floor: f64::EPSILON * scale,
        })
    }

    #[inline]
    pub fn matrix(&self) -> &Mat<c64> {
        &self.u
    }

    #[inline]
    fn pivot(&self, k: usize, shift: c64) -> c64 {
        let d = self.u[(k, k)] - shift;
        if d.norm() < self.pivot_floor {
            c64::new(self.pivot_floor, 0.0)
        } else {
            d
        }
    }

    fn check_shape(&self, shifts: &[c64], x: &Mat<c64>) {
        assert_eq!(x.nrows(), self.u.nrows(), "Right-hand sides have the wrong height");
        assert_eq!(x.ncols(), shifts.len(), "One shift per right-hand side is required");
    }
}

impl MultiShiftSolve for UpperTriangular {
    #[inline]
    fn order(&self) -> usize {
        self.u.nrows()
    }

    fn solve(&self, shifts: &[c64], x: &mut Mat<c64>) {
        self.check_shape(shifts, x);
        let n = self.order();
        for (j, &shift) in shifts.iter().enumerate() {
            // Column-oriented back substitution.
            for k in (0..n).rev() {
                let xk = x[(k, j)] / self.pivot(k, shift);
                x[(k, j)] = xk;
                for i in 0..k {
                    x[(i, j)] -= self.u[(i, k)] * xk;
                }
            }
        }
    }

    fn solve_adjoint(&self, shifts: &[c64], x: &mut Mat<c64>) {
        self.check_shape(shifts, x);
        let n = self.order();
        for (j, &shift) in shifts.iter().enumerate() {
            // (U − zI)ᴴ is lower triangular with entries conj(U_ik).
            for k in 0..n {
                let mut acc = x[(k, j)];
                for i in 0..k {
                    acc -= self.u[(i, k)].conj() * x[(i, j)];
                }
                x[(k, j)] = acc / self.pivot(k, shift).conj();
            }
        }
    }
}

/// Applies `B_z` to a row-distributed column set: full columns are assembled
/// over the column communicator, solved locally and cut back to the owned rows.
pub fn apply_inverse_normal_distributed<K, C>(
    kernel: &K,
    shifts: &[c64],
    x: &mut DistColumns<'_, c64, C>,
) where
    K: MultiShiftSolve + ?Sized,
    C: Communicator,
{
    let mut full = x.gather();
    kernel.apply_inverse_normal(shifts, &mut full);
    x.scatter_from(&full);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Grid, GridOrder};
    use std::thread;

    fn sample_upper() -> Mat<c64> {
        Mat::from_fn(4, 4, |i, j| {
            if i <= j {
                c64::new(1.0 + i as f64 + 0.5 * j as f64, 0.25 * (j as f64 - i as f64))
            } else {
                c64::new(0.0, 0.0)
            }
        })
    }

    fn residual(u: &Mat<c64>, z: c64, x: &Mat<c64>, b: &Mat<c64>, adjoint: bool) -> f64 {
        let n = u.nrows();
        let mut worst: f64 = 0.0;
        for i in 0..n {
            let mut acc = c64::new(0.0, 0.0);
            for k in 0..n {
                let mut a = if adjoint { u[(k, i)].conj() } else { u[(i, k)] };
                if i == k {
                    a -= if adjoint { z.conj() } else { z };
                }
                acc += a * x[(k, 0)];
            }
            worst = worst.max((acc - b[(i, 0)]).norm());
        }
        worst
    }

    #[test]
    fn test_solve_and_adjoint_solve_residuals() {
        let u = sample_upper();
        let kernel = UpperTriangular::new(u.clone()).unwrap();
        let z = c64::new(0.3, -0.7);
        let b = Mat::from_fn(4, 1, |i, _| c64::new(1.0, i as f64));

        let mut x = b.clone();
        kernel.solve(&[z], &mut x);
        assert!(residual(&u, z, &x, &b, false) < 1e-12);

        let mut y = b.clone();
        kernel.solve_adjoint(&[z], &mut y);
        assert!(residual(&u, z, &y, &b, true) < 1e-12);
    }

    #[test]
    fn test_exact_eigenvalue_shift_stays_finite() {
        let u = sample_upper();
        let kernel = UpperTriangular::new(u.clone()).unwrap();
        let mut x = Mat::from_fn(4, 1, |_, _| c64::new(1.0, 0.0));
        kernel.apply_inverse_normal(&[u[(2, 2)]], &mut x);
        for i in 0..4 {
            assert!(x[(i, 0)].re.is_finite() && x[(i, 0)].im.is_finite());
        }
    }

    #[test]
    fn test_non_square_matrix_is_rejected() {
        let err = UpperTriangular::new(Mat::zeros(3, 2)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_distributed_application_matches_local() {
        let u = sample_upper();
        let shifts = [c64::new(0.1, 0.2), c64::new(-1.0, 0.5)];
        let kernel = UpperTriangular::new(u).unwrap();
        let mut expected = Mat::from_fn(4, 2, |i, j| c64::new((i + j) as f64, 1.0));
        kernel.apply_inverse_normal(&shifts, &mut expected);

        let handles: Vec<_> = Grid::threaded(2, 1, GridOrder::ColumnMajor)
            .into_iter()
            .map(|grid| {
                let kernel = kernel.clone();
                thread::spawn(move || {
                    let mut x = DistColumns::<c64, _>::zeros(&grid, 4, 2);
                    for (i_loc, i) in x.rows().enumerate() {
                        for j in 0..2 {
                            x.local_mut()[(i_loc, j)] = c64::new((i + j) as f64, 1.0);
                        }
                    }
                    apply_inverse_normal_distributed(&kernel, &shifts, &mut x);
                    x.gather()
                })
            })
            .collect();

        for handle in handles {
            let full = handle.join().unwrap();
            for i in 0..4 {
                for j in 0..2 {
                    assert!((full[(i, j)] - expected[(i, j)]).norm() < 1e-12);
                }
            }
        }
    }
}
