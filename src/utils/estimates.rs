//! Per-shift estimate bookkeeping: the norm cap, NaN checks and the
//! convergence detector.
//!
//! Estimates of `‖(U − zI)⁻¹‖₂` blow up when a shift lands on (or numerically
//! on) an eigenvalue of `U`. Rather than propagating infinities or NaNs through
//! the driver, such estimates are clamped to the sentinel [`norm_cap`], which is
//! treated as "converged to divergent" by [`find_converged`].

use crate::scalar::ShiftScalar;
use faer::{Mat, traits::ComplexField};

/// The sentinel marking an effectively unbounded resolvent norm, `1/ε`.
#[inline]
pub fn norm_cap() -> f64 {
    1.0 / f64::EPSILON
}

/// Replaces every NaN or `≥ cap` estimate with exactly the cap.
///
/// Applying it twice is the same as applying it once.
pub fn cap_estimates(estimates: &mut [f64]) {
    let cap = norm_cap();
    for estimate in estimates.iter_mut() {
        if estimate.is_nan() || *estimate >= cap {
            *estimate = cap;
        }
    }
}

/// Whether any entry has a NaN real or imaginary part.
pub fn has_nan<T: ShiftScalar>(values: &[T]) -> bool {
    values.iter().any(|&v| ShiftScalar::is_nan(v))
}

/// The convergence detector.
///
/// Returns a fresh mask aligned with the active ordering. A shift is converged
/// if its current estimate reached the cap, or if the estimate is nonzero and
/// its relative change `|last − current| / |current|` is at most `max_diff`.
/// A zero estimate below the cap never converges.
///
/// Every shift that entered this pass unconverged (`previously_converged[j]`
/// false) is charged one iteration in `it_counts[j]`.
///
/// # Panics
///
/// Panics if the four slices do not share one length.
pub fn find_converged(
    last: &[f64],
    current: &[f64],
    previously_converged: &[bool],
    it_counts: &mut [usize],
    max_diff: f64,
) -> Vec<bool> {
    let n = current.len();
    assert!(
        last.len() == n && previously_converged.len() == n && it_counts.len() == n,
        "Estimate arrays should share the active width {n}: last {}, flags {}, counts {}",
        last.len(),
        previously_converged.len(),
        it_counts.len()
    );
    let cap = norm_cap();

    let mut converged = vec![false; n];
    for j in 0..n {
        let cur = current[j];
        converged[j] = if cur >= cap {
            true
        } else if cur != 0.0 {
            (last[j] - cur).abs() / cur.abs() <= max_diff
        } else {
            false
        };
        if !previously_converged[j] {
            it_counts[j] += 1;
        }
    }
    converged
}

/// Whether `U` is normal to working precision: `‖offdiag(U)‖_F ≤ tol·‖diag(U)‖_F`.
///
/// For a normal triangular matrix the pseudospectrum is a union of discs
/// around the eigenvalues, so callers use this as a hint.
pub fn numerically_normal<T: ShiftScalar + ComplexField>(u: &Mat<T>, tol: f64) -> bool {
    let mut diag = 0.0;
    let mut off = 0.0;
    for j in 0..u.ncols() {
        for i in 0..u.nrows().min(j + 1) {
            if i == j {
                diag += ShiftScalar::abs2(u[(i, j)]);
            } else {
                off += ShiftScalar::abs2(u[(i, j)]);
            }
        }
    }
    off.sqrt() <= tol * diag.sqrt()
}
