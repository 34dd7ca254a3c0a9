//! Test matrices for the pseudospectrum application.
//!
//! Every generator returns a dense complex `n × n` matrix; the application
//! then keeps its upper triangle with [`make_upper_triangular`].

use crate::error::{ErrorKind, PseudospectrumError};
use crate::io::read_binary;
use faer::{Mat, Side, c64};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::f64::consts::PI;
use std::path::PathBuf;

/// The `--mat-type` selector.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum MatrixType {
    /// Entries drawn uniformly from the disc of `radius` around `center`.
    Uniform { center: (f64, f64), radius: f64 },
    Demmel,
    Lotkin,
    Grcar { num_bands: usize },
    FoxLi { omega: f64 },
    /// A matrix read from a binary file.
    Custom { path: PathBuf },
}

impl MatrixType {
    pub fn code(&self) -> i64 {
        match self {
            MatrixType::Uniform { .. } => 0,
            MatrixType::Demmel => 1,
            MatrixType::Lotkin => 2,
            MatrixType::Grcar { .. } => 3,
            MatrixType::FoxLi { .. } => 4,
            MatrixType::Custom { .. } => 5,
        }
    }

    pub fn generate(&self, n: usize, seed: u64) -> Result<Mat<c64>, PseudospectrumError> {
        match self {
            MatrixType::Uniform { center, radius } => {
                let mut rng = StdRng::seed_from_u64(seed);
                Ok(uniform(n, c64::new(center.0, center.1), *radius, &mut rng))
            }
            MatrixType::Demmel => Ok(demmel(n)),
            MatrixType::Lotkin => Ok(lotkin(n)),
            MatrixType::Grcar { num_bands } => Ok(grcar(n, *num_bands)),
            MatrixType::FoxLi { omega } => fox_li(n, *omega),
            MatrixType::Custom { path } => read_binary(path, n),
        }
    }
}

/// Entries `center + radius·s` with `s` uniform in the unit disc.
pub fn uniform<R: Rng>(n: usize, center: c64, radius: f64, rng: &mut R) -> Mat<c64> {
    let mut a = Mat::zeros(n, n);
    for j in 0..n {
        for i in 0..n {
            let r = radius * rng.random::<f64>().sqrt();
            let theta = 2.0 * PI * rng.random::<f64>();
            a[(i, j)] = center + c64::new(r * theta.cos(), r * theta.sin());
        }
    }
    a
}

/// Demmel's matrix: `−1` on the diagonal and `−B^{j−i}` above it, with
/// `B = 10^{4/(n−1)}`.
pub fn demmel(n: usize) -> Mat<c64> {
    let base = if n > 1 {
        10f64.powf(4.0 / (n - 1) as f64)
    } else {
        1.0
    };
    Mat::from_fn(n, n, |i, j| {
        if i == j {
            c64::new(-1.0, 0.0)
        } else if j > i {
            c64::new(-base.powi((j - i) as i32), 0.0)
        } else {
            c64::new(0.0, 0.0)
        }
    })
}

/// The Hilbert matrix with its first row replaced by ones.
pub fn lotkin(n: usize) -> Mat<c64> {
    Mat::from_fn(n, n, |i, j| {
        if i == 0 {
            c64::new(1.0, 0.0)
        } else {
            c64::new(1.0 / (i + j + 1) as f64, 0.0)
        }
    })
}

/// Grcar's matrix: `−1` on the subdiagonal, `1` on the diagonal and the first
/// `num_bands` superdiagonals.
pub fn grcar(n: usize, num_bands: usize) -> Mat<c64> {
    Mat::from_fn(n, n, |i, j| {
        if i == j + 1 {
            c64::new(-1.0, 0.0)
        } else if j >= i && j - i <= num_bands {
            c64::new(1.0, 0.0)
        } else {
            c64::new(0.0, 0.0)
        }
    })
}

/// Gauss–Legendre discretization of the Fox–Li kernel
/// `sqrt(iω/π)·exp(−iω(x − y)²)` on `[−1, 1]`.
pub fn fox_li(n: usize, omega: f64) -> Result<Mat<c64>, PseudospectrumError> {
    let (nodes, weights) = gauss_legendre(n)?;
    let scale = c64::new(0.0, omega / PI).sqrt();
    Ok(Mat::from_fn(n, n, |i, j| {
        let d = nodes[i] - nodes[j];
        let phase = c64::new(0.0, -omega * d * d).exp();
        scale * phase * (weights[i] * weights[j]).sqrt()
    }))
}

/// Nodes and weights of the `n`-point Gauss–Legendre rule (Golub–Welsch).
fn gauss_legendre(n: usize) -> Result<(Vec<f64>, Vec<f64>), PseudospectrumError> {
    let jacobi = Mat::from_fn(n, n, |i, j| {
        let k = i.max(j);
        if i.abs_diff(j) == 1 {
            let k = k as f64;
            k / (4.0 * k * k - 1.0).sqrt()
        } else {
            0.0
        }
    });
    let eig = jacobi.self_adjoint_eigen(Side::Lower).map_err(ErrorKind::Evd)?;
    let u = eig.U();
    let mut nodes = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for c in 0..n {
        let mut node = 0.0;
        for i in 0..n {
            let mut row = 0.0;
            for l in 0..n {
                row += jacobi[(i, l)] * u[(l, c)];
            }
            node += u[(i, c)] * row;
        }
        nodes.push(node);
        weights.push(2.0 * u[(0, c)] * u[(0, c)]);
    }
    Ok((nodes, weights))
}

/// Zeroes the strictly lower triangle.
pub fn make_upper_triangular(a: &mut Mat<c64>) {
    for j in 0..a.ncols() {
        for i in j + 1..a.nrows() {
            a[(i, j)] = c64::new(0.0, 0.0);
        }
    }
}

/// Largest column sum of moduli.
pub fn one_norm(a: &Mat<c64>) -> f64 {
    (0..a.ncols())
        .map(|j| (0..a.nrows()).map(|i| a[(i, j)].norm()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Largest diagonal modulus.
pub fn diagonal_radius(a: &Mat<c64>) -> f64 {
    (0..a.nrows().min(a.ncols()))
        .map(|i| a[(i, i)].norm())
        .fold(0.0, f64::max)
}
