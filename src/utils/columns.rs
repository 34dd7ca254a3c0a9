//! Column-wise reductions and updates over shift column sets.
//!
//! Every kernel here is collective over the ranks that share the rows of its
//! arguments: local partial sums are combined with one all-reduce per call, and
//! square roots are only taken after the reduction.

use crate::matrix::ShiftColumns;
use crate::scalar::ShiftScalar;
use num_traits::Zero;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::ops::Range;

fn assert_aligned<X>(x: &X, y: &X)
where
    X: ShiftColumns + ?Sized,
{
    assert!(
        x.row_offset() == y.row_offset()
            && x.local_nrows() == y.local_nrows()
            && x.global_nrows() == y.global_nrows()
            && x.ncols() == y.ncols(),
        "X and Y should have been aligned"
    );
}

/// 2-norm of every column.
pub fn column_norms<X>(x: &X) -> Vec<f64>
where
    X: ShiftColumns + ?Sized,
{
    let mut sums: Vec<f64> = (0..x.ncols())
        .map(|j| {
            (0..x.local_nrows())
                .map(|i| x.get_local(i, j).abs2())
                .sum()
        })
        .collect();
    x.sum_partials(&mut sums);
    sums.into_iter().map(f64::sqrt).collect()
}

/// `x_jᴴ y_j` for every column pair.
pub fn inner_products<X>(x: &X, y: &X) -> Vec<X::Elem>
where
    X: ShiftColumns + ?Sized,
{
    assert_aligned(x, y);
    let mut dots: Vec<X::Elem> = (0..x.ncols())
        .map(|j| {
            let mut acc = X::Elem::zero();
            for i in 0..x.local_nrows() {
                acc += x.get_local(i, j).conj() * y.get_local(i, j);
            }
            acc
        })
        .collect();
    x.sum_scalar_partials(&mut dots);
    dots
}

/// `y_j ← y_j − γ_j x_j` for every column.
pub fn column_subtractions<X>(components: &[X::Elem], x: &X, y: &mut X)
where
    X: ShiftColumns + ?Sized,
{
    assert_aligned(x, y);
    assert_eq!(
        components.len(),
        y.ncols(),
        "One component per column is required"
    );
    for (j, &gamma) in components.iter().enumerate() {
        for i in 0..y.local_nrows() {
            let value = y.get_local(i, j) - gamma * x.get_local(i, j);
            y.set_local(i, j, value);
        }
    }
}

/// `y_j ← y_j / β_j` for every column.
pub fn inv_beta_scale<X>(scales: &[f64], y: &mut X)
where
    X: ShiftColumns + ?Sized,
{
    assert_eq!(scales.len(), y.ncols(), "One scale per column is required");
    for (j, &beta) in scales.iter().enumerate() {
        let inv = 1.0 / beta;
        for i in 0..y.local_nrows() {
            let value = y.get_local(i, j).scale(inv);
            y.set_local(i, j, value);
        }
    }
}

/// Deterministic source of replacement vectors for degenerate columns.
///
/// A replacement depends only on the seed, the column key (normally the
/// original shift index), the draw epoch and the global row, so every rank
/// draws its own rows of the same global vector regardless of the layout.
#[derive(Debug, Clone)]
pub struct RestartSampler {
    seed: u64,
    epoch: u64,
}

impl RestartSampler {
    pub fn new(seed: u64) -> Self {
        RestartSampler { seed, epoch: 0 }
    }

    /// Number of `fix_columns` calls served so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn advance(&mut self) {
        self.epoch += 1;
    }

    /// Rows `rows` of the replacement vector for `key`, entries uniform in
    /// `[-1, 1]` (both parts for complex scalars).
    pub fn draw<T: ShiftScalar>(&self, key: usize, rows: Range<usize>) -> Vec<T> {
        let mixed = self
            .seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add((key as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9))
            .wrapping_add(self.epoch.wrapping_mul(0x94D0_49BB_1331_11EB));
        let mut rng = StdRng::seed_from_u64(mixed);
        let mut out = Vec::with_capacity(rows.len());
        for i in 0..rows.end {
            let re: f64 = rng.random_range(-1.0..=1.0);
            let im: f64 = rng.random_range(-1.0..=1.0);
            if i >= rows.start {
                out.push(T::from_parts(re, im));
            }
        }
        out
    }
}

/// Normalizes every column to unit 2-norm, first replacing exactly-zero columns
/// with a fresh random vector. Returns the number of replaced columns.
///
/// `keys[j]` identifies column `j` to the sampler.
pub fn fix_columns<X>(x: &mut X, keys: &[usize], sampler: &mut RestartSampler) -> usize
where
    X: ShiftColumns + ?Sized,
{
    assert_eq!(keys.len(), x.ncols(), "One sampler key per column is required");
    let mut norms = column_norms(x);
    let degenerate: Vec<usize> = norms
        .iter()
        .enumerate()
        .filter(|&(_, &norm)| norm == 0.0)
        .map(|(j, _)| j)
        .collect();

    if !degenerate.is_empty() {
        let rows = x.row_offset()..x.row_offset() + x.local_nrows();
        for &j in &degenerate {
            let fresh: Vec<X::Elem> = sampler.draw(keys[j], rows.clone());
            for (i, value) in fresh.into_iter().enumerate() {
                x.set_local(i, j, value);
            }
        }
        log::debug!(
            "Replaced {} zero column(s) with random vectors",
            degenerate.len()
        );
        norms = column_norms(x);
    }
    sampler.advance();

    inv_beta_scale(&norms, x);
    degenerate.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::{Mat, c64, mat};

    #[test]
    fn test_column_norms_local() {
        let x: Mat<f64> = mat![[3.0, 0.0], [4.0, 2.0]];
        assert_eq!(column_norms(&x), vec![5.0, 2.0]);
    }

    #[test]
    fn test_inner_products_conjugate_the_left_argument() {
        let x = Mat::from_fn(2, 1, |i, _| c64::new(0.0, (i + 1) as f64));
        let y = Mat::from_fn(2, 1, |_, _| c64::new(1.0, 0.0));
        let dots = inner_products(&x, &y);
        // conj(i) + conj(2i) = -3i
        assert_eq!(dots, vec![c64::new(0.0, -3.0)]);
    }

    #[test]
    fn test_column_subtractions_and_scaling() {
        let x: Mat<f64> = mat![[1.0, 1.0], [1.0, 1.0]];
        let mut y: Mat<f64> = mat![[3.0, 5.0], [3.0, 5.0]];
        column_subtractions(&[1.0, 2.0], &x, &mut y);
        assert_eq!(y, mat![[2.0, 3.0], [2.0, 3.0]]);
        inv_beta_scale(&[2.0, 3.0], &mut y);
        assert_eq!(y, mat![[1.0, 1.0], [1.0, 1.0]]);
    }

    #[test]
    #[should_panic(expected = "X and Y should have been aligned")]
    fn test_misaligned_inner_products_panic() {
        let x = Mat::<f64>::zeros(3, 1);
        let y = Mat::<f64>::zeros(2, 1);
        inner_products(&x, &y);
    }

    #[test]
    fn test_fix_columns_replaces_zero_columns_and_normalizes() {
        let mut x = Mat::<c64>::zeros(4, 2);
        x[(0, 1)] = c64::new(2.0, 0.0);
        let mut sampler = RestartSampler::new(7);

        let replaced = fix_columns(&mut x, &[10, 11], &mut sampler);

        assert_eq!(replaced, 1);
        assert_eq!(sampler.epoch(), 1);
        for norm in column_norms(&x) {
            assert!((norm - 1.0).abs() < 1e-14);
        }
        assert_eq!(x[(0, 1)], c64::new(1.0, 0.0));
    }

    #[test]
    fn test_sampler_rows_are_layout_independent() {
        let sampler = RestartSampler::new(3);
        let full: Vec<c64> = sampler.draw(5, 0..6);
        let head: Vec<c64> = sampler.draw(5, 0..2);
        let tail: Vec<c64> = sampler.draw(5, 2..6);
        assert_eq!(&full[..2], &head[..]);
        assert_eq!(&full[2..], &tail[..]);
    }
}
