//! Resolvent norm estimation for upper-triangular matrices.
//!
//! The three layers, leaves first:
//!
//! - [`shifted_solve`]: the multi-shift triangular solve kernel behind
//!   `B_z = (U − zI)⁻ᴴ(U − zI)⁻¹`.
//! - [`krylov`]: per-shift power or Arnoldi iterates of `B_z` and the
//!   estimates derived from them.
//! - [`driver`]: the iteration state machine tying the estimators to the
//!   convergence detector and the deflation scheduler.
//!
//! **NOTE**: most callers want [`crate::solvers::triangular_pseudospectrum`],
//! which adds shift construction and result reshaping on top of the driver.

pub mod driver;
pub mod krylov;
pub mod shifted_solve;
