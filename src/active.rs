//! The active set of one chunk and its deflation scheduler.
//!
//! All per-shift state lives in fixed-capacity arrays of length `num_shifts`,
//! indexed by *active position*. The prefix `0..num_active` holds the shifts
//! still being refined; converged shifts are parked behind it. `preimage[j]` is
//! the original shift index at active position `j`, so the arrays can always
//! be scattered back to original order.
//!
//! Deflation is a stable partition of the prefix: survivors keep their relative
//! order and are left-packed, newly converged entries follow them. Preimage
//! values move with their entries and are never relabelled.

use crate::utils::estimates::find_converged;
use crate::utils::ordering::restore_ordering_pair;

#[derive(Debug, Clone)]
pub struct ActiveSet {
    preimage: Vec<usize>,
    estimates: Vec<f64>,
    last_estimates: Vec<f64>,
    it_counts: Vec<usize>,
    converged: Vec<bool>,
    num_active: usize,
}

impl ActiveSet {
    /// Identity preimage, zero estimates and zero counters.
    pub fn new(num_shifts: usize) -> Self {
        ActiveSet {
            preimage: (0..num_shifts).collect(),
            estimates: vec![0.0; num_shifts],
            last_estimates: vec![0.0; num_shifts],
            it_counts: vec![0; num_shifts],
            converged: vec![false; num_shifts],
            num_active: num_shifts,
        }
    }

    #[inline]
    pub fn num_shifts(&self) -> usize {
        self.preimage.len()
    }

    #[inline]
    pub fn num_active(&self) -> usize {
        self.num_active
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_active == 0
    }

    /// Original shift indices of the active prefix.
    #[inline]
    pub fn active(&self) -> &[usize] {
        &self.preimage[..self.num_active]
    }

    /// The full active-to-original map, parked entries included.
    #[inline]
    pub fn preimage(&self) -> &[usize] {
        &self.preimage
    }

    /// Estimates of the active prefix.
    #[inline]
    pub fn estimates(&self) -> &[f64] {
        &self.estimates[..self.num_active]
    }

    /// Counters in active order, parked entries included.
    #[inline]
    pub fn it_counts(&self) -> &[usize] {
        &self.it_counts
    }

    /// Whether the shift at active position `j` converged on the last pass.
    #[inline]
    pub fn is_converged(&self, j: usize) -> bool {
        self.converged[j]
    }

    /// Number of shifts whose latest flag is set, parked entries included.
    pub fn num_converged(&self) -> usize {
        self.converged.iter().filter(|&&c| c).count()
    }

    /// Replaces the active estimates wholesale with `current` and runs the
    /// convergence detector on them. Returns the mask over the active prefix.
    ///
    /// # Panics
    ///
    /// Panics if `current` is not as wide as the active prefix.
    pub fn update_estimates(&mut self, current: &[f64], max_diff: f64) -> Vec<bool> {
        let n = self.num_active;
        assert_eq!(
            current.len(),
            n,
            "Expected {n} estimates for the active set, got {}",
            current.len()
        );
        self.last_estimates[..n].copy_from_slice(&self.estimates[..n]);
        self.estimates[..n].copy_from_slice(current);
        find_converged(
            &self.last_estimates[..n],
            &self.estimates[..n],
            &self.converged[..n],
            &mut self.it_counts[..n],
            max_diff,
        )
    }

    /// Records `mask` without shrinking the active set. Returns the number of
    /// converged shifts.
    pub fn mark(&mut self, mask: &[bool]) -> usize {
        assert_eq!(mask.len(), self.num_active, "Mask should cover the active set");
        self.converged[..self.num_active].copy_from_slice(mask);
        mask.iter().filter(|&&c| c).count()
    }

    /// Removes the shifts flagged in `mask` from the active prefix with a stable
    /// partition. Returns the number of newly converged shifts; the active
    /// width shrinks by exactly that much.
    pub fn deflate(&mut self, mask: &[bool]) -> usize {
        let n = self.num_active;
        assert_eq!(mask.len(), n, "Mask should cover the active set");

        let survivors: Vec<usize> = (0..n).filter(|&j| !mask[j]).collect();
        let newly: Vec<usize> = (0..n).filter(|&j| mask[j]).collect();
        if newly.is_empty() {
            return 0;
        }
        let order: Vec<usize> = survivors.iter().chain(newly.iter()).copied().collect();

        permute_prefix(&mut self.preimage, &order);
        permute_prefix(&mut self.estimates, &order);
        permute_prefix(&mut self.last_estimates, &order);
        permute_prefix(&mut self.it_counts, &order);
        permute_prefix(&mut self.converged, &order);

        self.num_active = survivors.len();
        for flag in &mut self.converged[self.num_active..n] {
            *flag = true;
        }
        newly.len()
    }

    /// Estimates and counters in original shift order.
    pub fn restored(&self) -> (Vec<f64>, Vec<usize>) {
        let mut estimates = self.estimates.clone();
        let mut counts = self.it_counts.clone();
        restore_ordering_pair(&self.preimage, &mut estimates, &mut counts);
        (estimates, counts)
    }
}

/// `v[..order.len()] ← v[order]`, gathering from a copy.
fn permute_prefix<T: Copy>(v: &mut [T], order: &[usize]) {
    let source: Vec<T> = order.iter().map(|&j| v[j]).collect();
    v[..order.len()].copy_from_slice(&source);
}
