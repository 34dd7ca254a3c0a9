//! Shift and vector utilities shared by the iteration driver.
//!
//! - **`columns`**: column norms, inner products and updates over local or
//!   distributed shift column sets, plus `fix_columns` for degenerate restart
//!   vectors.
//! - **`estimates`**: the norm cap, NaN checks and the convergence detector.
//! - **`ordering`**: restoring original shift order after deflation and
//!   reshaping flat results into 2-D grids.

pub mod columns;
pub mod estimates;
pub mod ordering;
