//! Column sets: the container abstraction behind the shift utilities.
//!
//! Every per-shift kernel of the engine (norms, inner products, axpy-style
//! subtractions, rescaling) works column by column on a block of vectors, one
//! column per shift. Whether the rows of that block live in one address space or
//! are split across the ranks of a column communicator only matters at one
//! point: partial sums must be combined before they are used.
//!
//! [`ShiftColumns`] formalises that contract. It is implemented twice:
//!
//! * for [`faer::Mat`], the local path, where combining partials is a no-op;
//! * for [`DistColumns`], a row block of a distributed column set together with
//!   the column communicator that owns the remaining rows.
//!
//! The generic kernels in [`crate::utils::columns`] are written once against the
//! trait and therefore serve both paths.

use crate::comm::Communicator;
use crate::grid::Grid;
use crate::scalar::ShiftScalar;
use faer::{Mat, traits::ComplexField};
use std::ops::Range;

/// A block of column vectors whose rows may be split across ranks.
pub trait ShiftColumns {
    /// Element type of the columns.
    type Elem: ShiftScalar;

    /// Number of columns, one per shift.
    fn ncols(&self) -> usize;

    /// Number of rows stored by the caller.
    fn local_nrows(&self) -> usize;

    /// Height of each column across all ranks.
    fn global_nrows(&self) -> usize;

    /// Global index of the first locally stored row.
    fn row_offset(&self) -> usize;

    fn get_local(&self, i: usize, j: usize) -> Self::Elem;

    fn set_local(&mut self, i: usize, j: usize, value: Self::Elem);

    /// Sums real per-column partials over every rank sharing these rows.
    fn sum_partials(&self, partials: &mut [f64]);

    /// Sums scalar per-column partials over every rank sharing these rows.
    fn sum_scalar_partials(&self, partials: &mut [Self::Elem]);
}

impl<T: ShiftScalar + ComplexField> ShiftColumns for Mat<T> {
    type Elem = T;

    #[inline]
    fn ncols(&self) -> usize {
        Mat::ncols(self)
    }

    #[inline]
    fn local_nrows(&self) -> usize {
        self.nrows()
    }

    #[inline]
    fn global_nrows(&self) -> usize {
        self.nrows()
    }

    #[inline]
    fn row_offset(&self) -> usize {
        0
    }

    #[inline]
    fn get_local(&self, i: usize, j: usize) -> T {
        self[(i, j)]
    }

    #[inline]
    fn set_local(&mut self, i: usize, j: usize, value: T) {
        self[(i, j)] = value;
    }

    #[inline]
    fn sum_partials(&self, _partials: &mut [f64]) {}

    #[inline]
    fn sum_scalar_partials(&self, _partials: &mut [T]) {}
}

/// The locally stored row block of a distributed column set.
///
/// Rows `row_offset..row_offset + local.nrows()` of every column live here; the
/// remaining rows are held by the other ranks of `comm`.
pub struct DistColumns<'a, T, C> {
    local: Mat<T>,
    rows: Range<usize>,
    global_nrows: usize,
    comm: &'a C,
}

impl<'a, T, C> DistColumns<'a, T, C>
where
    T: ShiftScalar + ComplexField,
    C: Communicator,
{
    /// A zero column set of global height `n`, laid out like the grid's shift
    /// vectors: rows are split over the column communicator.
    pub fn zeros(grid: &'a Grid<C>, n: usize, ncols: usize) -> Self {
        let rows = grid.local_rows(n);
        DistColumns {
            local: Mat::zeros(rows.len(), ncols),
            rows,
            global_nrows: n,
            comm: grid.col_comm(),
        }
    }

    /// Wraps an existing local block.
    ///
    /// # Panics
    ///
    /// Panics if the block height does not match `rows`.
    pub fn from_local(local: Mat<T>, rows: Range<usize>, global_nrows: usize, comm: &'a C) -> Self {
        assert_eq!(
            local.nrows(),
            rows.len(),
            "Local block has {} rows but the row range {:?} has {}",
            local.nrows(),
            rows,
            rows.len()
        );
        assert!(rows.end <= global_nrows, "Row range {rows:?} exceeds height {global_nrows}");
        DistColumns {
            local,
            rows,
            global_nrows,
            comm,
        }
    }

    /// A new zero column set with the same row distribution as `self`.
    pub fn aligned_zeros(&self, ncols: usize) -> Self {
        DistColumns {
            local: Mat::zeros(self.rows.len(), ncols),
            rows: self.rows.clone(),
            global_nrows: self.global_nrows,
            comm: self.comm,
        }
    }

    #[inline]
    pub fn local(&self) -> &Mat<T> {
        &self.local
    }

    #[inline]
    pub fn local_mut(&mut self) -> &mut Mat<T> {
        &mut self.local
    }

    #[inline]
    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    #[inline]
    pub fn comm(&self) -> &'a C {
        self.comm
    }

    /// Panics unless `other` stores the same rows of columns of the same height.
    pub fn assert_aligned_with(&self, other: &Self) {
        assert!(
            self.rows == other.rows && self.global_nrows == other.global_nrows,
            "Column sets should have been aligned: rows {:?} of {} vs rows {:?} of {}",
            self.rows,
            self.global_nrows,
            other.rows,
            other.global_nrows
        );
    }

    /// Assembles the full-height columns on every rank of the column communicator.
    pub fn gather(&self) -> Mat<T> {
        let n = self.global_nrows;
        let ncols = self.local.ncols();
        let mut flat = vec![T::zero(); n * ncols];
        for j in 0..ncols {
            for (i_loc, i) in self.rows.clone().enumerate() {
                flat[i + j * n] = self.local[(i_loc, j)];
            }
        }
        self.comm.all_reduce_sum_scalars(&mut flat);
        Mat::from_fn(n, ncols, |i, j| flat[i + j * n])
    }

    /// Keeps this rank's rows of full-height columns.
    ///
    /// # Panics
    ///
    /// Panics if `full` does not have the global height and the local width.
    pub fn scatter_from(&mut self, full: &Mat<T>) {
        assert_eq!(full.nrows(), self.global_nrows, "Full columns have the wrong height");
        assert_eq!(full.ncols(), self.local.ncols(), "Full columns have the wrong width");
        self.local
            .copy_from(full.as_ref().subrows(self.rows.start, self.rows.len()));
    }
}

impl<T, C> ShiftColumns for DistColumns<'_, T, C>
where
    T: ShiftScalar + ComplexField,
    C: Communicator,
{
    type Elem = T;

    #[inline]
    fn ncols(&self) -> usize {
        self.local.ncols()
    }

    #[inline]
    fn local_nrows(&self) -> usize {
        self.local.nrows()
    }

    #[inline]
    fn global_nrows(&self) -> usize {
        self.global_nrows
    }

    #[inline]
    fn row_offset(&self) -> usize {
        self.rows.start
    }

    #[inline]
    fn get_local(&self, i: usize, j: usize) -> T {
        self.local[(i, j)]
    }

    #[inline]
    fn set_local(&mut self, i: usize, j: usize, value: T) {
        self.local[(i, j)] = value;
    }

    #[inline]
    fn sum_partials(&self, partials: &mut [f64]) {
        self.comm.all_reduce_sum(partials);
    }

    #[inline]
    fn sum_scalar_partials(&self, partials: &mut [T]) {
        self.comm.all_reduce_sum_scalars(partials);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridOrder;
    use faer::{c64, mat};
    use std::thread;

    #[test]
    fn test_mat_is_a_local_column_set() {
        let mut m: Mat<f64> = mat![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        assert_eq!(ShiftColumns::ncols(&m), 2);
        assert_eq!(m.global_nrows(), 3);
        assert_eq!(m.row_offset(), 0);
        m.set_local(2, 1, -1.0);
        assert_eq!(m.get_local(2, 1), -1.0);
        let mut partials = vec![1.0, 2.0];
        m.sum_partials(&mut partials);
        assert_eq!(partials, vec![1.0, 2.0]);
    }

    #[test]
    fn test_gather_and_scatter_over_column_communicator() {
        let n = 5;
        let handles: Vec<_> = Grid::threaded(2, 1, GridOrder::ColumnMajor)
            .into_iter()
            .map(|grid| {
                thread::spawn(move || {
                    let mut cols = DistColumns::<c64, _>::zeros(&grid, n, 2);
                    let rows = cols.rows();
                    for (i_loc, i) in rows.clone().enumerate() {
                        cols.local_mut()[(i_loc, 0)] = c64::new(i as f64, 0.0);
                        cols.local_mut()[(i_loc, 1)] = c64::new(0.0, i as f64);
                    }
                    let full = cols.gather();
                    let mut copy = cols.aligned_zeros(2);
                    copy.scatter_from(&full);
                    (full, copy.local().clone(), cols.local().clone())
                })
            })
            .collect();

        for handle in handles {
            let (full, copy, original) = handle.join().unwrap();
            for i in 0..n {
                assert_eq!(full[(i, 0)], c64::new(i as f64, 0.0));
                assert_eq!(full[(i, 1)], c64::new(0.0, i as f64));
            }
            assert_eq!(copy, original);
        }
    }

    #[test]
    #[should_panic(expected = "Column sets should have been aligned")]
    fn test_misaligned_column_sets_panic() {
        let comm = crate::comm::SelfComm;
        let a = DistColumns::<f64, _>::from_local(Mat::zeros(2, 1), 0..2, 4, &comm);
        let b = DistColumns::<f64, _>::from_local(Mat::zeros(2, 1), 2..4, 4, &comm);
        a.assert_aligned_with(&b);
    }
}
