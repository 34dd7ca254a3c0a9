//! Per-shift Krylov state for the resolvent norm estimators.
//!
//! Every shift `z` owned by this rank's grid column carries its own iterate of
//! the Hermitian operator `B_z = (U − zI)⁻ᴴ(U − zI)⁻¹`:
//!
//! - **Power mode** keeps a single unit vector `x` per shift and estimates
//!   `‖(U − zI)⁻¹‖ ≈ sqrt(‖B_z x‖)`.
//! - **Arnoldi mode** grows an orthonormal basis `v_0, …, v_j` per shift with
//!   modified Gram–Schmidt (plus one re-orthogonalization sweep) and estimates
//!   `sqrt(λ_max(herm(H_j)))` from the projected Hessenberg matrix. Once the
//!   basis holds `krylov_size + 1` vectors it is restarted from
//!   `V_{k+1} H̃_k y`, where `y` is the top Ritz vector, i.e. from `B_z` applied
//!   to the best Ritz vector.
//!
//! Basis storage is indexed by owned-shift slot, not by active position, so
//! deflating the active set never moves vector data. The basis length is shared
//! by all shifts: every active shift takes exactly one step per pass.

use super::shifted_solve::{MultiShiftSolve, apply_inverse_normal_distributed};
use crate::comm::Communicator;
use crate::error::{ErrorKind, PseudospectrumError};
use crate::grid::Grid;
use crate::matrix::DistColumns;
use crate::utils::columns::{
    RestartSampler, column_norms, column_subtractions, fix_columns, inner_products,
};
use faer::{Mat, MatRef, Side, c64};

/// Which estimator drives the iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum EstimatorMode {
    Power,
    Arnoldi { krylov_size: usize },
}

pub struct KrylovState<'g, C> {
    mode: EstimatorMode,
    /// Original shift index of every owned slot.
    owned: Vec<usize>,
    /// Owned slot of every original shift, if owned here.
    slot_of: Vec<Option<usize>>,
    basis: Vec<DistColumns<'g, c64, C>>,
    /// One `(k + 1) × k` Hessenberg matrix per owned slot (Arnoldi only).
    hessenberg: Vec<Mat<c64>>,
    basis_len: usize,
    sampler: RestartSampler,
}

impl<'g, C: Communicator> KrylovState<'g, C> {
    /// Start vectors are the normalized ones vector for every owned shift.
    pub fn new(
        grid: &'g Grid<C>,
        order: usize,
        num_shifts: usize,
        mode: EstimatorMode,
        seed: u64,
    ) -> Self {
        let owned: Vec<usize> = (0..num_shifts).filter(|&k| grid.owns_shift(k)).collect();
        let mut slot_of = vec![None; num_shifts];
        for (s, &k) in owned.iter().enumerate() {
            slot_of[k] = Some(s);
        }

        let num_vectors = match mode {
            EstimatorMode::Power => 1,
            EstimatorMode::Arnoldi { krylov_size } => krylov_size + 1,
        };
        let mut basis: Vec<DistColumns<'g, c64, C>> = (0..num_vectors)
            .map(|_| DistColumns::zeros(grid, order, owned.len()))
            .collect();
        let start = c64::new(1.0 / (order as f64).sqrt(), 0.0);
        basis[0].local_mut().as_mut().fill(start);

        let hessenberg = match mode {
            EstimatorMode::Power => Vec::new(),
            EstimatorMode::Arnoldi { krylov_size } => (0..owned.len())
                .map(|_| Mat::zeros(krylov_size + 1, krylov_size))
                .collect(),
        };

        KrylovState {
            mode,
            owned,
            slot_of,
            basis,
            hessenberg,
            basis_len: 1,
            sampler: RestartSampler::new(seed),
        }
    }

    /// Number of shifts owned by this rank's grid column.
    #[inline]
    pub fn num_owned(&self) -> usize {
        self.owned.len()
    }

    /// Current number of basis vectors shared by all shifts.
    #[inline]
    pub fn basis_len(&self) -> usize {
        self.basis_len
    }

    /// Takes one step for every active shift and returns a vector aligned with
    /// `active` that holds the new estimate at the positions owned here and
    /// zero elsewhere. Summing it over the row communicator yields the full
    /// estimate vector.
    ///
    /// Collective over the column communicator.
    pub fn step<K>(
        &mut self,
        kernel: &K,
        shifts: &[c64],
        active: &[usize],
        iteration: usize,
    ) -> Result<Vec<f64>, PseudospectrumError>
    where
        K: MultiShiftSolve + ?Sized,
    {
        let picks: Vec<(usize, usize)> = active
            .iter()
            .enumerate()
            .filter_map(|(pos, &k)| self.slot_of[k].map(|s| (pos, s)))
            .collect();
        let slots: Vec<usize> = picks.iter().map(|&(_, s)| s).collect();
        let keys: Vec<usize> = slots.iter().map(|&s| self.owned[s]).collect();
        let local_shifts: Vec<c64> = keys.iter().map(|&k| shifts[k]).collect();

        let local_estimates = match self.mode {
            EstimatorMode::Power => self.power_step(kernel, &local_shifts, &slots, &keys),
            EstimatorMode::Arnoldi { krylov_size } => {
                self.arnoldi_step(kernel, &local_shifts, &slots, &keys, krylov_size, iteration)?
            }
        };

        let mut estimates = vec![0.0; active.len()];
        for (&(pos, _), estimate) in picks.iter().zip(local_estimates) {
            estimates[pos] = estimate;
        }
        Ok(estimates)
    }

    fn power_step<K>(&mut self, kernel: &K, shifts: &[c64], slots: &[usize], keys: &[usize]) -> Vec<f64>
    where
        K: MultiShiftSolve + ?Sized,
    {
        let mut w = take_columns(&self.basis[0], slots);
        apply_inverse_normal_distributed(kernel, shifts, &mut w);
        let estimates = column_norms(&w).into_iter().map(f64::sqrt).collect();
        fix_columns(&mut w, keys, &mut self.sampler);
        put_columns(&mut self.basis[0], slots, &w);
        estimates
    }

    fn arnoldi_step<K>(
        &mut self,
        kernel: &K,
        shifts: &[c64],
        slots: &[usize],
        keys: &[usize],
        krylov_size: usize,
        iteration: usize,
    ) -> Result<Vec<f64>, PseudospectrumError>
    where
        K: MultiShiftSolve + ?Sized,
    {
        let j = self.basis_len - 1;
        let mut w = take_columns(&self.basis[j], slots);
        apply_inverse_normal_distributed(kernel, shifts, &mut w);

        for _sweep in 0..2 {
            for i in 0..=j {
                let v = take_columns(&self.basis[i], slots);
                let h = inner_products(&v, &w);
                column_subtractions(&h, &v, &mut w);
                for (c, &s) in slots.iter().enumerate() {
                    self.hessenberg[s][(i, j)] += h[c];
                }
            }
        }
        let betas = column_norms(&w);
        for (c, &s) in slots.iter().enumerate() {
            self.hessenberg[s][(j + 1, j)] = c64::new(betas[c], 0.0);
        }
        for &s in slots {
            if self.hessenberg[s].as_ref().get(0..j + 2, j..j + 1).has_nan() {
                return Err(ErrorKind::NumericalInvariant {
                    iteration,
                    what: "Hessenberg matrix",
                }
                .into());
            }
        }

        fix_columns(&mut w, keys, &mut self.sampler);
        put_columns(&mut self.basis[j + 1], slots, &w);
        self.basis_len += 1;

        let mut estimates = Vec::with_capacity(slots.len());
        for &s in slots {
            let herm = hermitian_part(self.hessenberg[s].as_ref(), j + 1);
            let eigenvalues = herm
                .self_adjoint_eigenvalues(Side::Lower)
                .map_err(ErrorKind::Evd)?;
            // Ascending order.
            let lambda = eigenvalues.last().copied().unwrap_or(0.0).max(0.0);
            estimates.push(lambda.sqrt());
        }

        if self.basis_len == krylov_size + 1 {
            self.restart(slots, keys, krylov_size)?;
        }
        Ok(estimates)
    }

    /// Collapses every active basis to `V_{k+1} H̃_k y` with `y` the top Ritz
    /// vector of `herm(H_k)`.
    fn restart(&mut self, slots: &[usize], keys: &[usize], krylov_size: usize) -> Result<(), PseudospectrumError> {
        let k = krylov_size;
        let mut fresh = self.basis[0].aligned_zeros(slots.len());
        for (c, &s) in slots.iter().enumerate() {
            let h = self.hessenberg[s].as_ref();
            let y = top_ritz_vector(&hermitian_part(h, k))?;
            let combo = h * y.as_ref();

            let v = Mat::from_fn(fresh.local().nrows(), k + 1, |row, i| self.basis[i].local()[(row, s)]);
            let restarted = &v * &combo;
            fresh.local_mut().col_mut(c).copy_from(restarted.col(0));
        }
        fix_columns(&mut fresh, keys, &mut self.sampler);
        put_columns(&mut self.basis[0], slots, &fresh);

        for &s in slots {
            self.hessenberg[s] = Mat::zeros(k + 1, k);
        }
        self.basis_len = 1;
        log::trace!("Restarted {} Krylov bases", slots.len());
        Ok(())
    }
}

/// `(H + Hᴴ)/2` of the leading `m × m` block.
fn hermitian_part(h: MatRef<'_, c64>, m: usize) -> Mat<c64> {
    Mat::from_fn(m, m, |i, j| (h[(i, j)] + h[(j, i)].conj()) * 0.5)
}

/// Unit eigenvector of the largest eigenvalue of the Hermitian matrix `a`, as
/// an `m × 1` matrix. Eigenvalues come back in nondecreasing order.
fn top_ritz_vector(a: &Mat<c64>) -> Result<Mat<c64>, PseudospectrumError> {
    let m = a.nrows();
    let eig = a.self_adjoint_eigen(Side::Lower).map_err(ErrorKind::Evd)?;
    Ok(eig.U().get(.., m - 1..m).to_owned())
}

/// The columns `slots` of `src`, in that order, with the same row layout.
fn take_columns<'g, C: Communicator>(
    src: &DistColumns<'g, c64, C>,
    slots: &[usize],
) -> DistColumns<'g, c64, C> {
    let mut out = src.aligned_zeros(slots.len());
    let (from, to) = (src.local(), out.local_mut());
    for (c, &s) in slots.iter().enumerate() {
        to.col_mut(c).copy_from(from.col(s));
    }
    out
}

/// Inverse of [`take_columns`].
fn put_columns<C: Communicator>(
    dst: &mut DistColumns<'_, c64, C>,
    slots: &[usize],
    src: &DistColumns<'_, c64, C>,
) {
    dst.assert_aligned_with(src);
    let (from, to) = (src.local(), dst.local_mut());
    for (c, &s) in slots.iter().enumerate() {
        to.col_mut(s).copy_from(from.col(c));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::shifted_solve::UpperTriangular;

    fn diagonal_kernel(diag: &[f64]) -> UpperTriangular {
        let n = diag.len();
        let u = Mat::from_fn(n, n, |i, j| {
            if i == j {
                c64::new(diag[i], 0.0)
            } else {
                c64::new(0.0, 0.0)
            }
        });
        UpperTriangular::new(u).unwrap()
    }

    #[test]
    fn test_arnoldi_estimate_is_exact_once_the_space_is_invariant() {
        // B_z has three distinct eigenvalues, so three steps span an invariant subspace.
        let diag = [1.0, 2.0, 4.0];
        let kernel = diagonal_kernel(&diag);
        let grid = Grid::single();
        let shifts = [c64::new(0.5, 0.0)];
        let mut state = KrylovState::new(&grid, 3, 1, EstimatorMode::Arnoldi { krylov_size: 5 }, 0);

        let mut estimate = 0.0;
        for it in 1..=3 {
            estimate = state.step(&kernel, &shifts, &[0], it).unwrap()[0];
        }
        assert!((estimate - 2.0).abs() < 1e-10, "estimate {estimate}");
        assert_eq!(state.basis_len(), 4);
    }

    #[test]
    fn test_restart_keeps_estimates_increasing() {
        let diag = [1.0, 1.5, 3.0, 5.0, 8.0];
        let kernel = diagonal_kernel(&diag);
        let grid = Grid::single();
        let shifts = [c64::new(0.8, 0.1)];
        let exact = 1.0 / c64::new(0.2, -0.1).norm();
        let mut state = KrylovState::new(&grid, 5, 1, EstimatorMode::Arnoldi { krylov_size: 2 }, 0);

        let mut previous = 0.0;
        for it in 1..=12 {
            let estimate = state.step(&kernel, &shifts, &[0], it).unwrap()[0];
            assert!(estimate <= exact * (1.0 + 1e-12));
            assert!(estimate >= previous * (1.0 - 1e-12));
            previous = estimate;
            assert!(state.basis_len() <= 3);
        }
        assert!((previous - exact).abs() / exact < 1e-6);
    }

    #[test]
    fn test_power_step_estimates_only_active_owned_shifts() {
        let kernel = diagonal_kernel(&[1.0, 3.0]);
        let grid = Grid::single();
        let shifts = [c64::new(0.0, 0.0), c64::new(10.0, 0.0), c64::new(1.0, 1.0)];
        let mut state = KrylovState::new(&grid, 2, 3, EstimatorMode::Power, 0);
        assert_eq!(state.num_owned(), 3);

        let estimates = state.step(&kernel, &shifts, &[2, 0], 1).unwrap();
        assert_eq!(estimates.len(), 2);
        assert!(estimates.iter().all(|&e| e > 0.0));
    }

    #[test]
    fn test_top_ritz_vector_belongs_to_the_largest_eigenvalue() {
        let a = Mat::from_fn(3, 3, |i, j| match (i, j) {
            (0, 0) => c64::new(2.0, 0.0),
            (1, 1) => c64::new(5.0, 0.0),
            (2, 2) => c64::new(-1.0, 0.0),
            (0, 1) => c64::new(0.0, 0.5),
            (1, 0) => c64::new(0.0, -0.5),
            _ => c64::new(0.0, 0.0),
        });
        let y = top_ritz_vector(&a).unwrap();
        let ay = &a * &y;
        let rayleigh = (y.adjoint() * ay.as_ref())[(0, 0)];
        let lambda_max = (7.0 + (9.0f64 + 1.0).sqrt()) / 2.0;
        assert!((rayleigh.re - lambda_max).abs() < 1e-12, "rayleigh {rayleigh}");
        assert!((y.norm_l2() - 1.0).abs() < 1e-12);
    }
}
