//! The pseudospectrum iteration driver.
//!
//! One call of [`estimate_resolvent_norms`] runs the state machine
//! `Initializing → Iterating → (Converged | MaxItsReached)` for one set of
//! shifts. Every rank of the grid calls it with the same arguments; all
//! decisions (convergence, deflation, termination) are taken on estimates that
//! were reduced over the row communicator and are therefore identical on every
//! rank.

use super::krylov::{EstimatorMode, KrylovState};
use super::shifted_solve::MultiShiftSolve;
use crate::active::ActiveSet;
use crate::comm::{Communicator, agree};
use crate::error::{ErrorKind, PseudospectrumError};
use crate::grid::Grid;
use crate::utils::estimates::cap_estimates;
use faer::c64;
use std::time::Instant;

/// Parameters of one iteration run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PseudospectrumCtrl {
    pub mode: EstimatorMode,
    pub max_its: usize,
    /// Relative change below which an estimate is converged.
    pub tol: f64,
    /// Drop converged shifts from the active set.
    pub deflate: bool,
    /// Log one line per pass.
    pub progress: bool,
    /// Seed for replacement vectors of degenerate columns.
    pub seed: u64,
}

impl Default for PseudospectrumCtrl {
    fn default() -> Self {
        PseudospectrumCtrl {
            mode: EstimatorMode::Arnoldi { krylov_size: 10 },
            max_its: 200,
            tol: 1e-6,
            deflate: true,
            progress: false,
            seed: 0,
        }
    }
}

/// How the iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudospectrumOutcome {
    Converged { iterations: usize },
    MaxItsReached { iterations: usize },
}

impl PseudospectrumOutcome {
    pub fn iterations(&self) -> usize {
        match *self {
            PseudospectrumOutcome::Converged { iterations }
            | PseudospectrumOutcome::MaxItsReached { iterations } => iterations,
        }
    }
}

/// Per-shift results in original shift order.
#[derive(Debug, Clone)]
pub struct ShiftEstimates {
    /// Estimates of `‖(U − zI)⁻¹‖₂`, capped at the norm cap.
    pub estimates: Vec<f64>,
    pub it_counts: Vec<usize>,
    pub outcome: PseudospectrumOutcome,
}

/// Hook invoked by the driver after every pass and once at the end.
pub trait PassObserver {
    fn after_pass(&mut self, its: usize, active: &ActiveSet) -> Result<(), PseudospectrumError>;

    fn finish(&mut self, its: usize, active: &ActiveSet) -> Result<(), PseudospectrumError>;
}

/// Estimates the resolvent norm of the kernel's matrix at every shift.
///
/// Collective over the whole grid. Fails with a configuration error on an
/// invalid control block, and with a numerical invariant error if NaN data
/// ever reaches the projected Hessenberg matrices. `observer` may differ
/// between ranks; a failure on any rank ends the run on every rank.
pub fn estimate_resolvent_norms<K, C>(
    grid: &Grid<C>,
    kernel: &K,
    shifts: &[c64],
    ctrl: &PseudospectrumCtrl,
    mut observer: Option<&mut dyn PassObserver>,
) -> Result<ShiftEstimates, PseudospectrumError>
where
    K: MultiShiftSolve + ?Sized,
    C: Communicator,
{
    if let EstimatorMode::Arnoldi { krylov_size: 0 } = ctrl.mode {
        return Err(ErrorKind::InputError("Krylov size must be at least 1".into()).into());
    }
    if kernel.order() == 0 {
        return Err(ErrorKind::InputError("The triangular matrix is empty".into()).into());
    }

    let num_shifts = shifts.len();
    let root = grid.world().rank() == 0;
    let mut active = ActiveSet::new(num_shifts);
    let mut state = KrylovState::new(grid, kernel.order(), num_shifts, ctrl.mode, ctrl.seed);

    let mut its = 0;
    let outcome = loop {
        if num_shifts == 0 || (ctrl.deflate && active.is_empty()) {
            break PseudospectrumOutcome::Converged { iterations: its };
        }
        if its >= ctrl.max_its {
            break PseudospectrumOutcome::MaxItsReached { iterations: its };
        }
        its += 1;
        let timer = Instant::now();

        // NaN checks and eigensolves only see this rank's shifts.
        let step = state.step(kernel, shifts, active.active(), its);
        let mut current = agree(grid.world(), step, "estimating its shifts")?;
        grid.row_comm().all_reduce_sum(&mut current);
        cap_estimates(&mut current);

        let mask = active.update_estimates(&current, ctrl.tol);
        let num_converged = if ctrl.deflate {
            let newly = active.deflate(&mask);
            log::trace!("Deflated {newly} shifts, {} remain active", active.num_active());
            num_shifts - active.num_active()
        } else {
            active.mark(&mask)
        };

        if ctrl.progress && root {
            log::info!(
                "iteration {its}: {num_converged} of {num_shifts} shifts converged ({:.3} s)",
                timer.elapsed().as_secs_f64()
            );
        }
        let observed = match observer.as_deref_mut() {
            Some(observer) => observer.after_pass(its, &active),
            None => Ok(()),
        };
        agree(grid.world(), observed, "observing a pass")?;

        if !ctrl.deflate && num_converged == num_shifts {
            break PseudospectrumOutcome::Converged { iterations: its };
        }
    };
    let finished = match observer.as_deref_mut() {
        Some(observer) => observer.finish(its, &active),
        None => Ok(()),
    };
    agree(grid.world(), finished, "finishing the observer")?;

    if root {
        log::debug!("Iteration finished: {outcome:?}");
    }
    let (estimates, it_counts) = active.restored();
    Ok(ShiftEstimates {
        estimates,
        it_counts,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::shifted_solve::UpperTriangular;
    use crate::utils::estimates::norm_cap;
    use faer::Mat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// A kernel whose solves blow every vector up past the norm cap.
    struct Divergent(usize);

    impl MultiShiftSolve for Divergent {
        fn order(&self) -> usize {
            self.0
        }

        fn solve(&self, _shifts: &[c64], x: &mut Mat<c64>) {
            for j in 0..x.ncols() {
                for i in 0..x.nrows() {
                    x[(i, j)] *= c64::new(1e300, 0.0);
                }
            }
        }

        fn solve_adjoint(&self, shifts: &[c64], x: &mut Mat<c64>) {
            self.solve(shifts, x);
        }
    }

    /// A kernel whose gain grows with every solve, so no estimate settles.
    struct Growing {
        order: usize,
        calls: AtomicUsize,
    }

    impl Growing {
        fn new(order: usize) -> Self {
            Growing {
                order,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl MultiShiftSolve for Growing {
        fn order(&self) -> usize {
            self.order
        }

        fn solve(&self, _shifts: &[c64], x: &mut Mat<c64>) {
            let gain = (self.calls.fetch_add(1, Ordering::Relaxed) + 2) as f64;
            for j in 0..x.ncols() {
                for i in 0..x.nrows() {
                    x[(i, j)] *= c64::new(gain, 0.0);
                }
            }
        }

        fn solve_adjoint(&self, _shifts: &[c64], _x: &mut Mat<c64>) {}
    }

    #[test]
    fn test_capped_shifts_converge_in_one_pass() {
        let grid = Grid::single();
        let shifts = vec![c64::new(0.5, 0.5); 16];
        let ctrl = PseudospectrumCtrl {
            mode: EstimatorMode::Power,
            max_its: 10,
            ..Default::default()
        };
        let result = estimate_resolvent_norms(&grid, &Divergent(3), &shifts, &ctrl, None).unwrap();
        assert_eq!(result.outcome, PseudospectrumOutcome::Converged { iterations: 1 });
        assert_eq!(result.it_counts, vec![1; 16]);
        assert!(result.estimates.iter().all(|&e| e == norm_cap()));
    }

    #[test]
    fn test_no_deflation_keeps_every_shift_until_max_its() {
        let grid = Grid::single();
        let shifts = vec![c64::new(0.0, 0.0); 6];
        let ctrl = PseudospectrumCtrl {
            mode: EstimatorMode::Power,
            max_its: 5,
            tol: 0.0,
            deflate: false,
            ..Default::default()
        };
        let result = estimate_resolvent_norms(&grid, &Growing::new(4), &shifts, &ctrl, None).unwrap();
        assert_eq!(result.outcome, PseudospectrumOutcome::MaxItsReached { iterations: 5 });
        assert_eq!(result.it_counts, vec![5; 6]);
    }

    #[test]
    fn test_zero_krylov_size_is_rejected() {
        let grid = Grid::single();
        let kernel = UpperTriangular::new(Mat::identity(2, 2)).unwrap();
        let ctrl = PseudospectrumCtrl {
            mode: EstimatorMode::Arnoldi { krylov_size: 0 },
            ..Default::default()
        };
        let err = estimate_resolvent_norms(&grid, &kernel, &[c64::new(0.0, 0.0)], &ctrl, None)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_observer_sees_every_pass() {
        struct Counter {
            passes: usize,
            finished: bool,
        }
        impl PassObserver for Counter {
            fn after_pass(&mut self, _its: usize, _active: &ActiveSet) -> Result<(), PseudospectrumError> {
                self.passes += 1;
                Ok(())
            }
            fn finish(&mut self, _its: usize, _active: &ActiveSet) -> Result<(), PseudospectrumError> {
                self.finished = true;
                Ok(())
            }
        }

        let grid = Grid::single();
        let ctrl = PseudospectrumCtrl {
            mode: EstimatorMode::Power,
            max_its: 3,
            tol: 0.0,
            ..Default::default()
        };
        let mut counter = Counter {
            passes: 0,
            finished: false,
        };
        let shifts = [c64::new(0.0, 0.0)];
        estimate_resolvent_norms(&grid, &Growing::new(2), &shifts, &ctrl, Some(&mut counter)).unwrap();
        assert_eq!(counter.passes, 3);
        assert!(counter.finished);
    }

    #[test]
    fn test_observer_failure_on_one_rank_stops_every_rank() {
        struct Failing;
        impl PassObserver for Failing {
            fn after_pass(&mut self, _its: usize, _active: &ActiveSet) -> Result<(), PseudospectrumError> {
                Err(ErrorKind::InputError("cannot write".into()).into())
            }
            fn finish(&mut self, _its: usize, _active: &ActiveSet) -> Result<(), PseudospectrumError> {
                Ok(())
            }
        }

        let kernel = UpperTriangular::new(Mat::identity(4, 4)).unwrap();
        let shifts = vec![c64::new(0.5, 0.5); 4];
        let ctrl = PseudospectrumCtrl {
            mode: EstimatorMode::Power,
            ..Default::default()
        };
        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = Grid::threaded(2, 2, crate::grid::GridOrder::ColumnMajor)
                .into_iter()
                .map(|grid| {
                    let (kernel, shifts, ctrl) = (&kernel, &shifts, &ctrl);
                    s.spawn(move || {
                        let mut failing = Failing;
                        let observer: Option<&mut dyn PassObserver> =
                            if grid.world().rank() == 0 { Some(&mut failing) } else { None };
                        let result = estimate_resolvent_norms(&grid, kernel, shifts, ctrl, observer);
                        (grid.world().rank(), result.map(|_| ()).map_err(|e| e.to_string()))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.len(), 4);
        for (rank, result) in results {
            let message = result.unwrap_err();
            if rank == 0 {
                assert!(message.contains("cannot write"), "{message}");
            } else {
                assert_eq!(message, "Another rank failed while observing a pass");
            }
        }
    }
}
