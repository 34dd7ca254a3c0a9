//! Reordering and reshaping of per-shift results.
//!
//! The driver works on a compacted, permuted active ordering. Once a chunk is
//! done, its flat per-shift arrays are scattered back to original shift order
//! with [`restore_ordering`] and laid out as an `imag_size × real_size` image
//! with [`reshape_into_grid`]: contiguous blocks of `imag_size` shifts become
//! successive columns of a [`faer::Mat`].
//!
//! The driver replicates its results on every rank, so the chunk loop takes
//! the local path above. [`ShardedVector`] and [`reshape_sharded_into_grid`]
//! are its distributed counterpart for callers that keep per-rank shards of a
//! result vector (element `k` on rank `k % p`): the grid is assembled column by
//! column with one all-reduce each, and comes out identical on every rank.

use crate::comm::Communicator;
use crate::scalar::ShiftScalar;
use faer::{Mat, traits::ComplexField};
use num_traits::Zero;

/// Lays out `x` as an `imag_size × real_size` grid; element `k` lands at row
/// `k % imag_size`, column `k / imag_size`.
///
/// # Panics
///
/// Panics if `x.len() != real_size * imag_size`.
pub fn reshape_into_grid<T: Copy>(real_size: usize, imag_size: usize, x: &[T]) -> Mat<T> {
    assert_eq!(
        x.len(),
        real_size * imag_size,
        "Cannot reshape {} entries into a {imag_size}x{real_size} grid",
        x.len()
    );
    Mat::from_fn(imag_size, real_size, |i, j| x[i + j * imag_size])
}

/// Column-major entries of `m`, i.e. the flat order [`reshape_into_grid`]
/// consumed.
pub fn grid_entries<T: Copy>(m: &Mat<T>) -> impl Iterator<Item = T> + '_ {
    (0..m.ncols()).flat_map(move |j| (0..m.nrows()).map(move |i| m[(i, j)]))
}

/// A new grid of the same shape holding `f` of every entry.
pub fn map_grid<T: Copy, U>(m: &Mat<T>, f: impl Fn(T) -> U) -> Mat<U> {
    Mat::from_fn(m.nrows(), m.ncols(), |i, j| f(m[(i, j)]))
}

/// A flat vector sharded element-cyclically: entry `k` lives on rank
/// `k % size` at local position `k / size`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardedVector<T> {
    len: usize,
    rank: usize,
    size: usize,
    local: Vec<T>,
}

impl<T: Copy> ShardedVector<T> {
    /// This rank's shard of the full vector `full`.
    pub fn from_full(full: &[T], rank: usize, size: usize) -> Self {
        assert!(rank < size, "Rank {rank} out of range for {size} ranks");
        let local = full.iter().skip(rank).step_by(size).copied().collect();
        ShardedVector {
            len: full.len(),
            rank,
            size,
            local,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn local(&self) -> &[T] {
        &self.local
    }

    /// Whether global entry `k` is stored here.
    #[inline]
    pub fn owns(&self, k: usize) -> bool {
        k % self.size == self.rank
    }

    #[inline]
    pub fn get_global(&self, k: usize) -> T {
        debug_assert!(self.owns(k));
        self.local[k / self.size]
    }
}

/// Distributed [`reshape_into_grid`]: the grid is assembled on every rank,
/// one column at a time with one all-reduce per column.
///
/// # Panics
///
/// Panics if the sharded length is not `real_size * imag_size` or if the
/// communicator does not match the sharding.
pub fn reshape_sharded_into_grid<T, C>(
    real_size: usize,
    imag_size: usize,
    x: &ShardedVector<T>,
    comm: &C,
) -> Mat<T>
where
    T: ShiftScalar + ComplexField,
    C: Communicator,
{
    assert_eq!(
        x.len(),
        real_size * imag_size,
        "Cannot reshape {} entries into a {imag_size}x{real_size} grid",
        x.len()
    );
    assert!(
        comm.rank() == x.rank && comm.size() == x.size,
        "Sharding does not match the communicator"
    );
    let mut grid = Mat::<T>::zeros(imag_size, real_size);
    let mut column = vec![<T as Zero>::zero(); imag_size];
    for j in 0..real_size {
        for (i, slot) in column.iter_mut().enumerate() {
            let k = i + j * imag_size;
            *slot = if x.owns(k) { x.get_global(k) } else { <T as Zero>::zero() };
        }
        comm.all_reduce_sum_scalars(&mut column);
        for (i, &value) in column.iter().enumerate() {
            grid[(i, j)] = value;
        }
    }
    grid
}

/// `x_restored[preimage[j]] = x_active[j]`.
///
/// Positions not covered by `preimage` keep their value from `x`.
///
/// # Panics
///
/// Panics if `preimage` is longer than `x` or contains an index twice.
pub fn restore_ordering<T: Copy>(preimage: &[usize], x: &mut [T]) {
    assert!(
        preimage.len() <= x.len(),
        "Preimage of length {} does not fit {} values",
        preimage.len(),
        x.len()
    );
    let source = x[..preimage.len()].to_vec();
    let mut seen = vec![false; x.len()];
    for (j, &k) in preimage.iter().enumerate() {
        assert!(!seen[k], "Preimage maps two positions onto original index {k}");
        seen[k] = true;
        x[k] = source[j];
    }
}

/// [`restore_ordering`] applied with one permutation to two parallel arrays.
pub fn restore_ordering_pair<T: Copy, U: Copy>(preimage: &[usize], x: &mut [T], y: &mut [U]) {
    assert_eq!(x.len(), y.len(), "Parallel arrays should share one length");
    restore_ordering(preimage, x);
    restore_ordering(preimage, y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ThreadComm;
    use std::thread;

    #[test]
    fn test_reshape_six_elements_into_two_columns() {
        let x = [0, 1, 2, 3, 4, 5];
        let grid = reshape_into_grid(2, 3, &x);
        assert_eq!((grid.nrows(), grid.ncols()), (3, 2));
        for i in 0..3 {
            assert_eq!(grid[(i, 0)], x[i]);
            assert_eq!(grid[(i, 1)], x[3 + i]);
        }
        assert_eq!(grid_entries(&grid).collect::<Vec<_>>(), x);
    }

    #[test]
    fn test_restore_ordering_round_trip() {
        let preimage = [3, 0, 4, 1, 2];
        let active = [30.0, 0.0, 40.0, 10.0, 20.0];
        let mut restored = active;
        restore_ordering(&preimage, &mut restored);
        assert_eq!(restored, [0.0, 10.0, 20.0, 30.0, 40.0]);

        // Re-deriving the active order through the inverse permutation.
        let again: Vec<f64> = preimage.iter().map(|&k| restored[k]).collect();
        assert_eq!(again, active);
    }

    #[test]
    fn test_restore_pair_uses_one_permutation() {
        let preimage = [2, 0, 1];
        let mut estimates = [2.0, 0.0, 1.0];
        let mut counts = [7, 5, 6];
        restore_ordering_pair(&preimage, &mut estimates, &mut counts);
        assert_eq!(estimates, [0.0, 1.0, 2.0]);
        assert_eq!(counts, [5, 6, 7]);
    }

    #[test]
    #[should_panic(expected = "Preimage maps two positions")]
    fn test_restore_ordering_rejects_duplicates() {
        let mut x = [1, 2];
        restore_ordering(&[1, 1], &mut x);
    }

    #[test]
    fn test_sharded_reshape_matches_local_reshape() {
        let full: Vec<f64> = (0..12).map(|k| k as f64).collect();
        let expected = reshape_into_grid(3, 4, &full);
        let handles: Vec<_> = ThreadComm::world(3)
            .into_iter()
            .map(|comm| {
                let full = full.clone();
                thread::spawn(move || {
                    let shard = ShardedVector::from_full(&full, comm.rank(), comm.size());
                    reshape_sharded_into_grid(3, 4, &shard, &comm)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn test_map_grid_keeps_the_shape() {
        let grid = reshape_into_grid(1, 2, &[1.0, std::f64::consts::E]);
        let logs = map_grid(&grid, f64::ln);
        assert_eq!((logs.nrows(), logs.ncols()), (2, 1));
        assert_eq!(logs[(0, 0)], 0.0);
        assert!((logs.norm_max() - 1.0).abs() < 1e-15);
    }
}
