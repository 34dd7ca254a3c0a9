//! Command-line configuration of the `pspec` binary.
//!
//! [`PseudospectrumArgs`] is the raw clap surface. [`PseudospectrumArgs::validate`]
//! turns it into a [`RunConfig`], rejecting every configuration error before a
//! single rank is started.

use crate::algorithms::driver::PseudospectrumCtrl;
use crate::algorithms::krylov::EstimatorMode;
use crate::error::{ErrorKind, PseudospectrumError};
use crate::generators::MatrixType;
use crate::grid::{GridOrder, find_factor};
use crate::io::{ColorMap, FileFormat};
use crate::snapshot::SnapshotCtrl;
use crate::window::Window;
use clap::Parser;
use faer::c64;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(
    name = "pspec",
    about = "Estimates the pseudospectrum of a triangularized test matrix over a chunked window."
)]
pub struct PseudospectrumArgs {
    /// Number of ranks, one thread each.
    #[clap(long, default_value_t = 1)]
    pub procs: usize,
    /// Process grid height; 0 picks the largest factor of `procs` below its square root.
    #[clap(long, default_value_t = 0)]
    pub grid_height: usize,
    /// Order world ranks row-major over the grid.
    #[clap(long)]
    pub row_major: bool,
    /// 0:uniform, 1:Demmel, 2:Lotkin, 3:Grcar, 4:FoxLi, 5:custom.
    #[clap(long, default_value_t = 1)]
    pub mat_type: i64,
    /// Basename of the custom matrix file, read from `<basename>.bin`.
    #[clap(long, default_value = "default")]
    pub basename: String,
    /// Order of the matrix.
    #[clap(long, default_value_t = 100)]
    pub size: usize,
    #[clap(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub real_center: f64,
    #[clap(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub imag_center: f64,
    /// Window width along the real axis; 0 chooses one from the matrix.
    #[clap(long, default_value_t = 0.0)]
    pub real_width: f64,
    /// Window width along the imaginary axis; 0 chooses one from the matrix.
    #[clap(long, default_value_t = 0.0)]
    pub imag_width: f64,
    /// Number of chunks along the real axis.
    #[clap(long, default_value_t = 2)]
    pub num_real: usize,
    /// Number of chunks along the imaginary axis.
    #[clap(long, default_value_t = 2)]
    pub num_imag: usize,
    /// Samples along the real axis.
    #[clap(long, default_value_t = 100)]
    pub real_size: usize,
    /// Samples along the imaginary axis.
    #[clap(long, default_value_t = 100)]
    pub imag_size: usize,
    /// Use the restarted Arnoldi estimator (the default).
    #[clap(long, conflicts_with = "power")]
    pub arnoldi: bool,
    /// Use the power-iteration estimator.
    #[clap(long)]
    pub power: bool,
    #[clap(long, default_value_t = 10)]
    pub krylov_size: usize,
    #[clap(long, default_value_t = 200)]
    pub max_its: usize,
    /// Relative change below which an estimate counts as converged.
    #[clap(long, default_value_t = 1e-6)]
    pub tol: f64,
    #[clap(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub uniform_real_center: f64,
    #[clap(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub uniform_imag_center: f64,
    #[clap(long, default_value_t = 1.0)]
    pub uniform_radius: f64,
    /// Superdiagonals of the Grcar matrix.
    #[clap(long, default_value_t = 3)]
    pub num_bands: usize,
    /// Frequency of the Fox-Li kernel.
    #[clap(long, default_value_t = 16.0 * std::f64::consts::PI)]
    pub omega: f64,
    /// Log one line per pass.
    #[clap(long)]
    pub progress: bool,
    /// Keep converged shifts in the active set.
    #[clap(long)]
    pub no_deflate: bool,
    /// Print the result maps.
    #[clap(long)]
    pub display: bool,
    /// Write the per-chunk result maps.
    #[clap(long)]
    pub write: bool,
    /// Write the pseudospectrum maps, per chunk and for the whole window.
    #[clap(long)]
    pub write_ps: bool,
    /// Passes between numerical snapshots; 0 disables them.
    #[clap(long, default_value_t = 0)]
    pub num_freq: usize,
    /// Passes between image snapshots; 0 disables them.
    #[clap(long, default_value_t = 0)]
    pub img_freq: usize,
    #[clap(long, default_value = "snap")]
    pub num_base: String,
    #[clap(long, default_value = "logSnap")]
    pub img_base: String,
    /// 1:ascii, 2:matlab, 3:binary, 4:flat binary.
    #[clap(long, default_value_t = 2)]
    pub num_format: i64,
    /// 5:bmp, 6:jpg, 7:jpeg, 8:png, 9:ppm.
    #[clap(long, default_value_t = 8)]
    pub img_format: i64,
    /// 0:grayscale, 1:discrete grayscale, 2:red-black-green, 3:blue-red.
    #[clap(long, default_value_t = 0)]
    pub color_map: i64,
    /// Directory for every written file.
    #[clap(long, value_name = "PATH", default_value = ".")]
    pub output_dir: PathBuf,
    /// Optional CSV file with one row per chunk.
    #[clap(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,
    /// Seed for random matrices and degenerate-column replacement.
    #[clap(long, default_value_t = 0)]
    pub seed: u64,
}

/// A validated run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunConfig {
    pub procs: usize,
    pub grid_height: usize,
    pub grid_order: GridOrder,
    pub matrix: MatrixType,
    pub size: usize,
    /// Widths of zero are filled in from the matrix before the run.
    pub window: Window,
    pub num_real: usize,
    pub num_imag: usize,
    pub ctrl: PseudospectrumCtrl,
    pub snapshot: SnapshotCtrl,
    pub display: bool,
    pub write: bool,
    pub write_ps: bool,
    pub summary: Option<PathBuf>,
}

impl RunConfig {
    #[inline]
    pub fn grid_width(&self) -> usize {
        self.procs / self.grid_height
    }

    #[inline]
    pub fn needs_auto_width(&self) -> bool {
        self.window.real_width == 0.0 || self.window.imag_width == 0.0
    }
}

fn input_error(msg: String) -> PseudospectrumError {
    ErrorKind::InputError(msg).into()
}

impl PseudospectrumArgs {
    pub fn validate(&self) -> Result<RunConfig, PseudospectrumError> {
        let num_format = FileFormat::from_code(self.num_format, "numerical")?.ensure_writable()?;
        let img_format = FileFormat::from_code(self.img_format, "image")?.ensure_writable()?;
        let color_map = ColorMap::from_code(self.color_map)?;

        let matrix = match self.mat_type {
            0 => MatrixType::Uniform {
                center: (self.uniform_real_center, self.uniform_imag_center),
                radius: self.uniform_radius,
            },
            1 => MatrixType::Demmel,
            2 => MatrixType::Lotkin,
            3 => MatrixType::Grcar {
                num_bands: self.num_bands,
            },
            4 => MatrixType::FoxLi { omega: self.omega },
            5 => MatrixType::Custom {
                path: PathBuf::from(format!("{}.bin", self.basename)),
            },
            other => return Err(ErrorKind::InvalidMatrixType(other).into()),
        };

        if self.procs == 0 {
            return Err(input_error("At least one rank is required".into()));
        }
        let grid_height = if self.grid_height == 0 {
            find_factor(self.procs)
        } else {
            self.grid_height
        };
        if self.procs % grid_height != 0 {
            return Err(input_error(format!(
                "Grid height {grid_height} does not divide {} ranks",
                self.procs
            )));
        }
        if self.size == 0 {
            return Err(input_error("Matrix size must be positive".into()));
        }
        if self.real_size == 0 || self.imag_size == 0 {
            return Err(input_error(format!(
                "Window sizes must be positive, got {}x{}",
                self.real_size, self.imag_size
            )));
        }
        if self.num_real == 0
            || self.num_imag == 0
            || self.num_real > self.real_size
            || self.num_imag > self.imag_size
        {
            return Err(input_error(format!(
                "Cannot split a {}x{} window into {}x{} chunks",
                self.real_size, self.imag_size, self.num_real, self.num_imag
            )));
        }
        if [self.real_width, self.imag_width].iter().any(|w| w.is_nan() || *w < 0.0) {
            return Err(input_error("Window widths must be non-negative".into()));
        }
        if self.tol.is_nan() || self.tol < 0.0 {
            return Err(input_error(format!("Tolerance must be non-negative, got {}", self.tol)));
        }
        let mode = if self.power {
            EstimatorMode::Power
        } else {
            if self.krylov_size == 0 {
                return Err(input_error("Krylov size must be at least 1".into()));
            }
            EstimatorMode::Arnoldi {
                krylov_size: self.krylov_size,
            }
        };

        Ok(RunConfig {
            procs: self.procs,
            grid_height,
            grid_order: if self.row_major {
                GridOrder::RowMajor
            } else {
                GridOrder::ColumnMajor
            },
            matrix,
            size: self.size,
            window: Window {
                center: c64::new(self.real_center, self.imag_center),
                real_width: self.real_width,
                imag_width: self.imag_width,
                real_size: self.real_size,
                imag_size: self.imag_size,
            },
            num_real: self.num_real,
            num_imag: self.num_imag,
            ctrl: PseudospectrumCtrl {
                mode,
                max_its: self.max_its,
                tol: self.tol,
                deflate: !self.no_deflate,
                progress: self.progress,
                seed: self.seed,
            },
            snapshot: SnapshotCtrl {
                num_freq: self.num_freq,
                img_freq: self.img_freq,
                num_base: self.num_base.clone(),
                img_base: self.img_base.clone(),
                num_format,
                img_format,
                color_map,
                output_dir: self.output_dir.clone(),
            },
            display: self.display,
            write: self.write,
            write_ps: self.write_ps,
            summary: self.summary.clone(),
        })
    }
}
