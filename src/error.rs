//! Error types for the pseudospectrum engine.
//!
//! Every recoverable failure of the library funnels into a single public type,
//! [`PseudospectrumError`], which wraps a crate-private [`ErrorKind`]. Keeping the
//! kinds private lets the set of variants evolve without breaking callers, while
//! [`PseudospectrumError::is_configuration`] exposes the one distinction callers
//! need: configuration problems are detected before any rank starts working.
//!
//! Internal invariant violations (misaligned distributed views, inconsistent
//! index maps) are not represented here. They are logic errors and panic.
use thiserror::Error;

/// Represents all recoverable errors raised by the pseudospectrum engine.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct PseudospectrumError(#[from] ErrorKind);

#[derive(Error, Debug)]
pub(crate) enum ErrorKind {
    /// A file format code outside `[1, FILE_FORMAT_MAX)`.
    #[error("Invalid {role} format integer {code}, should be in [1,{max})")]
    InvalidFileFormat {
        role: &'static str,
        code: i64,
        max: i64,
    },

    /// A valid format code that this crate cannot write.
    #[error("File format {0} is not supported for writing")]
    UnsupportedFileFormat(&'static str),

    #[error("Invalid color map integer {0}, should be in [0,4)")]
    InvalidColorMap(i64),

    #[error("Invalid matrix type {0}, should be in [0,5]")]
    InvalidMatrixType(i64),

    /// Two collaborating components disagree on a size.
    #[error("Dimension mismatch for {what}: expected {expected}, found {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid input parameter: {0}")]
    InputError(String),

    /// A NaN surfaced in data that the solve kernel guarantees to be finite.
    #[error("Numerical invariant violated at iteration {iteration}: {what} contains a NaN")]
    NumericalInvariant { iteration: usize, what: &'static str },

    /// Wraps an eigendecomposition failure of a small projected matrix.
    #[error("Eigendecomposition of the projected Hessenberg matrix failed: {0:?}")]
    Evd(faer::linalg::evd::EvdError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A collective step failed on another rank; that rank reports the cause.
    #[error("Another rank failed while {0}")]
    PeerFailure(&'static str),
}

impl PseudospectrumError {
    /// True for errors that are detected while validating a run configuration,
    /// before any distributed work begins.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.0,
            ErrorKind::InvalidFileFormat { .. }
                | ErrorKind::UnsupportedFileFormat(_)
                | ErrorKind::InvalidColorMap(_)
                | ErrorKind::InvalidMatrixType(_)
                | ErrorKind::DimensionMismatch { .. }
                | ErrorKind::InputError(_)
        )
    }
}

impl From<std::io::Error> for PseudospectrumError {
    fn from(err: std::io::Error) -> Self {
        PseudospectrumError(ErrorKind::Io(err))
    }
}
