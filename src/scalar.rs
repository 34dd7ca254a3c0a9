//! The numeric-field abstraction used by the column utilities.
//!
//! The column kernels in [`crate::utils::columns`] only need a handful of field
//! operations: modulus squared, conjugation, scaling by a real, and a way to ship
//! values through a real-valued all-reduce. [`ShiftScalar`] captures exactly that
//! and is implemented for `f64` and [`faer::c64`].

use faer::c64;
use num_traits::{One, Zero};
use std::fmt::Debug;
use std::ops::{AddAssign, Mul, Sub};

/// Scalar types that can populate shift columns.
pub trait ShiftScalar:
    Copy
    + Debug
    + PartialEq
    + Zero
    + One
    + AddAssign
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Send
    + Sync
    + 'static
{
    /// Number of `f64` words used to carry one value through a reduction.
    const WORDS: usize;

    /// `|x|^2`.
    fn abs2(self) -> f64;

    /// Complex conjugate (identity for reals).
    fn conj(self) -> Self;

    /// Multiplies by a real factor.
    fn scale(self, alpha: f64) -> Self;

    fn from_real(re: f64) -> Self;

    /// Builds a value from real and imaginary parts; reals drop `im`.
    fn from_parts(re: f64, im: f64) -> Self;

    fn is_nan(self) -> bool;

    /// Writes the value into `out[..WORDS]`.
    fn pack(self, out: &mut [f64]);

    /// Reads a value from `words[..WORDS]`.
    fn unpack(words: &[f64]) -> Self;
}

impl ShiftScalar for f64 {
    const WORDS: usize = 1;

    #[inline]
    fn abs2(self) -> f64 {
        self * self
    }

    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn scale(self, alpha: f64) -> Self {
        self * alpha
    }

    #[inline]
    fn from_real(re: f64) -> Self {
        re
    }

    #[inline]
    fn from_parts(re: f64, _im: f64) -> Self {
        re
    }

    #[inline]
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }

    #[inline]
    fn pack(self, out: &mut [f64]) {
        out[0] = self;
    }

    #[inline]
    fn unpack(words: &[f64]) -> Self {
        words[0]
    }
}

impl ShiftScalar for c64 {
    const WORDS: usize = 2;

    #[inline]
    fn abs2(self) -> f64 {
        self.norm_sqr()
    }

    #[inline]
    fn conj(self) -> Self {
        c64::new(self.re, -self.im)
    }

    #[inline]
    fn scale(self, alpha: f64) -> Self {
        c64::new(self.re * alpha, self.im * alpha)
    }

    #[inline]
    fn from_real(re: f64) -> Self {
        c64::new(re, 0.0)
    }

    #[inline]
    fn from_parts(re: f64, im: f64) -> Self {
        c64::new(re, im)
    }

    #[inline]
    fn is_nan(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }

    #[inline]
    fn pack(self, out: &mut [f64]) {
        out[0] = self.re;
        out[1] = self.im;
    }

    #[inline]
    fn unpack(words: &[f64]) -> Self {
        c64::new(words[0], words[1])
    }
}

/// Packs a slice of scalars into interleaved words for a reduction.
pub(crate) fn pack_slice<T: ShiftScalar>(values: &[T]) -> Vec<f64> {
    let mut words = vec![0.0; values.len() * T::WORDS];
    for (value, chunk) in values.iter().zip(words.chunks_exact_mut(T::WORDS)) {
        value.pack(chunk);
    }
    words
}

/// Inverse of [`pack_slice`], writing into an existing slice.
pub(crate) fn unpack_slice<T: ShiftScalar>(words: &[f64], values: &mut [T]) {
    assert_eq!(
        words.len(),
        values.len() * T::WORDS,
        "Packed buffer length does not match the destination"
    );
    for (value, chunk) in values.iter_mut().zip(words.chunks_exact(T::WORDS)) {
        *value = T::unpack(chunk);
    }
}
