//! Distributed pseudospectrum estimation for upper-triangular matrices.
//!
//! For a triangular `U` (typically a Schur factor) and a rectangular window of
//! the complex plane, this crate estimates `‖(U − zI)⁻¹‖₂` at every pixel `z`.
//! The ε-pseudospectrum is the region where that norm exceeds `1/ε`.
//!
//! Every shift carries its own Krylov basis for the operator
//! `B_z = (U − zI)⁻ᴴ(U − zI)⁻¹`, whose largest eigenvalue is the squared
//! resolvent norm. Two estimators are available:
//!
//! - **Power iteration**: `sqrt(‖B_z x‖)` for a unit `x`, one solve pair per pass.
//! - **Restarted Arnoldi**: the largest eigenvalue of the Hermitian part of the
//!   projected Hessenberg matrix, restarted from the top Ritz vector whenever
//!   the basis fills up.
//!
//! Shifts whose estimate stops moving (relative change below `tol`) or hits
//! the norm cap `1/ε_mach` are converged and, by default, deflated out of the
//! active set so later passes only pay for the shifts still moving.
//!
//! ## Distribution
//!
//! The engine runs SPMD over a [`grid::Grid`] of ranks. `U` is replicated;
//! shifts are dealt round-robin to grid columns and the rows of their vectors
//! are split over the ranks of each column. All convergence decisions are
//! taken on reduced estimates, so every rank deflates identically and results
//! do not depend on the grid shape. [`comm::ThreadComm`] plays one rank per
//! thread inside a single process.
//!
//! ## Example
//!
//! ```rust
//! use faer::{Mat, c64};
//! use pspec_engine::{
//!     EstimatorMode, Grid, PseudospectrumCtrl, UpperTriangular, Window,
//!     triangular_pseudospectrum,
//! };
//!
//! // A diagonal U: the resolvent norm is one over the distance to the spectrum.
//! let u = Mat::from_fn(4, 4, |i, j| {
//!     if i == j { c64::new(i as f64, 0.0) } else { c64::new(0.0, 0.0) }
//! });
//! let kernel = UpperTriangular::new(u).unwrap();
//! let window = Window {
//!     center: c64::new(1.5, 0.0),
//!     real_width: 4.0,
//!     imag_width: 2.0,
//!     real_size: 8,
//!     imag_size: 4,
//! };
//! let ctrl = PseudospectrumCtrl {
//!     mode: EstimatorMode::Arnoldi { krylov_size: 3 },
//!     ..Default::default()
//! };
//!
//! let grid = Grid::single();
//! let maps =
//!     triangular_pseudospectrum(&grid, &kernel, &window, &window.as_chunk(), &ctrl, None)
//!         .unwrap();
//! assert_eq!(maps.inv_norm_map.nrows(), 4);
//! assert_eq!(maps.inv_norm_map.ncols(), 8);
//! ```

pub mod active;
pub mod algorithms;
pub mod comm;
pub mod config;
pub mod error;
pub mod generators;
pub mod grid;
pub mod io;
pub mod matrix;
pub mod scalar;
pub mod snapshot;
pub mod solvers;
pub mod utils;
pub mod window;

pub use algorithms::driver::{
    PassObserver, PseudospectrumCtrl, PseudospectrumOutcome, ShiftEstimates, estimate_resolvent_norms,
};
pub use algorithms::krylov::EstimatorMode;
pub use algorithms::shifted_solve::{MultiShiftSolve, UpperTriangular};
pub use error::PseudospectrumError;
pub use grid::{Grid, GridOrder};
pub use solvers::{ChunkSummary, PseudospectrumMaps, chunked_pseudospectrum, triangular_pseudospectrum};
pub use window::{Chunk, Window, WindowMaps};
