//! Two-dimensional process grids.
//!
//! A [`Grid`] arranges `height × width` ranks either column-major (world rank
//! `i + j·height`) or row-major (world rank `j + i·width`), where `i` is the grid
//! row and `j` the grid column. Besides the world communicator it carries:
//!
//! * the **column communicator**: the `height` ranks sharing grid column `j`;
//!   these ranks split the rows of the shift vectors owned by that column;
//! * the **row communicator**: the `width` ranks sharing grid row `i`; one rank
//!   per grid column, used to combine per-shift scalars across columns.
//!
//! Shift `k` is owned by grid column `k mod width`, and its vector rows are
//! block-distributed over the column communicator (see [`block_range`]).

use crate::comm::{Communicator, SelfComm, ThreadComm};
use std::ops::Range;

/// Ordering of world ranks over the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum GridOrder {
    ColumnMajor,
    RowMajor,
}

/// One rank's view of a process grid.
#[derive(Debug, Clone)]
pub struct Grid<C> {
    world: C,
    col_comm: C,
    row_comm: C,
    height: usize,
    width: usize,
    order: GridOrder,
}

impl Grid<SelfComm> {
    /// The `1 × 1` grid.
    pub fn single() -> Self {
        Grid {
            world: SelfComm,
            col_comm: SelfComm,
            row_comm: SelfComm,
            height: 1,
            width: 1,
            order: GridOrder::ColumnMajor,
        }
    }
}

impl Grid<ThreadComm> {
    /// Builds every rank's view of an in-process `height × width` grid.
    ///
    /// The returned vector is indexed by world rank; each entry is meant to be
    /// moved into the thread that plays that rank.
    pub fn threaded(height: usize, width: usize, order: GridOrder) -> Vec<Grid<ThreadComm>> {
        assert!(
            height > 0 && width > 0,
            "Grid dimensions must be positive, got {height}x{width}"
        );
        let size = height * width;
        let mut world: Vec<Option<ThreadComm>> =
            ThreadComm::world(size).into_iter().map(Some).collect();
        let mut cols: Vec<Vec<Option<ThreadComm>>> = (0..width)
            .map(|_| ThreadComm::world(height).into_iter().map(Some).collect())
            .collect();
        let mut rows: Vec<Vec<Option<ThreadComm>>> = (0..height)
            .map(|_| ThreadComm::world(width).into_iter().map(Some).collect())
            .collect();

        (0..size)
            .map(|rank| {
                let (i, j) = coordinates(rank, height, width, order);
                Grid {
                    world: world[rank].take().expect("world handle taken twice"),
                    col_comm: cols[j][i].take().expect("column handle taken twice"),
                    row_comm: rows[i][j].take().expect("row handle taken twice"),
                    height,
                    width,
                    order,
                }
            })
            .collect()
    }
}

impl<C: Communicator> Grid<C> {
    #[inline]
    pub fn world(&self) -> &C {
        &self.world
    }

    #[inline]
    pub fn col_comm(&self) -> &C {
        &self.col_comm
    }

    #[inline]
    pub fn row_comm(&self) -> &C {
        &self.row_comm
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.height * self.width
    }

    #[inline]
    pub fn order(&self) -> GridOrder {
        self.order
    }

    /// Grid row of the calling rank.
    #[inline]
    pub fn row(&self) -> usize {
        self.col_comm.rank()
    }

    /// Grid column of the calling rank.
    #[inline]
    pub fn col(&self) -> usize {
        self.row_comm.rank()
    }

    /// Whether this rank's grid column owns shift `k`.
    #[inline]
    pub fn owns_shift(&self, k: usize) -> bool {
        k % self.width == self.col()
    }

    /// Rows of a length-`n` shift vector stored on this rank.
    #[inline]
    pub fn local_rows(&self, n: usize) -> Range<usize> {
        block_range(n, self.height, self.row())
    }
}

/// `(grid row, grid column)` of world rank `rank`.
pub fn coordinates(rank: usize, height: usize, width: usize, order: GridOrder) -> (usize, usize) {
    match order {
        GridOrder::ColumnMajor => (rank % height, rank / height),
        GridOrder::RowMajor => (rank / width, rank % width),
    }
}

/// Largest factor of `p` that does not exceed `sqrt(p)`; the default grid height.
pub fn find_factor(p: usize) -> usize {
    if p == 0 {
        return 1;
    }
    let mut factor = (p as f64).sqrt() as usize;
    while factor > 1 && p % factor != 0 {
        factor -= 1;
    }
    factor.max(1)
}

/// The `part`-th of `parts` contiguous blocks of `0..n`; earlier blocks take the
/// remainder one element at a time.
pub fn block_range(n: usize, parts: usize, part: usize) -> Range<usize> {
    assert!(part < parts, "block index {part} out of range for {parts} parts");
    let base = n / parts;
    let extra = n % parts;
    let start = part * base + part.min(extra);
    let len = base + usize::from(part < extra);
    start..start + len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_factor() {
        assert_eq!(find_factor(1), 1);
        assert_eq!(find_factor(4), 2);
        assert_eq!(find_factor(6), 2);
        assert_eq!(find_factor(7), 1);
        assert_eq!(find_factor(12), 3);
        assert_eq!(find_factor(16), 4);
    }

    #[test]
    fn test_block_range_covers_everything_once() {
        let n = 10;
        let parts = 3;
        let ranges: Vec<_> = (0..parts).map(|p| block_range(n, parts, p)).collect();
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);

        let empty: Vec<_> = (0..4).map(|p| block_range(2, 4, p)).collect();
        assert_eq!(empty, vec![0..1, 1..2, 2..2, 2..2]);
    }

    #[test]
    fn test_coordinates_follow_order() {
        assert_eq!(coordinates(3, 2, 3, GridOrder::ColumnMajor), (1, 1));
        assert_eq!(coordinates(3, 2, 3, GridOrder::RowMajor), (1, 0));
    }

    #[test]
    fn test_threaded_grid_communicator_ranks() {
        let grids = Grid::threaded(2, 3, GridOrder::ColumnMajor);
        assert_eq!(grids.len(), 6);
        for (rank, grid) in grids.iter().enumerate() {
            let (i, j) = coordinates(rank, 2, 3, GridOrder::ColumnMajor);
            assert_eq!(grid.world().rank(), rank);
            assert_eq!(grid.row(), i);
            assert_eq!(grid.col(), j);
            assert_eq!(grid.col_comm().size(), 2);
            assert_eq!(grid.row_comm().size(), 3);
        }
        assert!(grids[0].owns_shift(3));
        assert!(!grids[0].owns_shift(4));
    }

    #[test]
    fn test_single_grid() {
        let grid = Grid::single();
        assert_eq!(grid.size(), 1);
        assert_eq!(grid.local_rows(5), 0..5);
        assert!(grid.owns_shift(17));
    }
}
