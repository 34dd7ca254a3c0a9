//! High-level entry points: one chunk, or a whole window split into chunks.
//!
//! Both functions are collective over the grid. Results are replicated on
//! every rank.

use crate::{
    algorithms::{
        driver::{PassObserver, PseudospectrumCtrl, PseudospectrumOutcome, estimate_resolvent_norms},
        shifted_solve::MultiShiftSolve,
    },
    comm::{Communicator, agree},
    error::PseudospectrumError,
    grid::Grid,
    snapshot::{SnapshotCtrl, Snapshotter},
    utils::ordering::{grid_entries, reshape_into_grid},
    window::{Chunk, Window, WindowMaps, partition_window},
};
use faer::Mat;
use std::time::Instant;

/// The result of one chunk, laid out as `imag_size × real_size` grids.
#[derive(Debug, Clone)]
pub struct PseudospectrumMaps {
    /// Estimates of `‖(U − zI)⁻¹‖₂` per pixel.
    pub inv_norm_map: Mat<f64>,
    /// Passes each pixel took to converge.
    pub it_count_map: Mat<usize>,
    pub outcome: PseudospectrumOutcome,
}

/// One row of the per-chunk CSV report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChunkSummary {
    pub real_index: usize,
    pub imag_index: usize,
    pub real_center: f64,
    pub imag_center: f64,
    pub real_size: usize,
    pub imag_size: usize,
    pub seconds: f64,
    pub passes: usize,
    pub max_iterations: usize,
    pub converged: bool,
}

/// Estimates the pseudospectrum of the kernel's triangular matrix over the
/// pixels of `chunk`.
///
/// # Arguments
/// * `grid`: the process grid; every rank calls this with identical arguments.
/// * `kernel`: the multi-shift triangular solve for `U`.
/// * `window`: the window `chunk` was cut from; it fixes the pixel centres.
/// * `ctrl`: estimator, tolerance and iteration limits.
/// * `observer`: optional per-pass hook, e.g. a [`Snapshotter`].
pub fn triangular_pseudospectrum<K, C>(
    grid: &Grid<C>,
    kernel: &K,
    window: &Window,
    chunk: &Chunk,
    ctrl: &PseudospectrumCtrl,
    observer: Option<&mut dyn PassObserver>,
) -> Result<PseudospectrumMaps, PseudospectrumError>
where
    K: MultiShiftSolve + ?Sized,
    C: Communicator,
{
    let shifts = chunk.shifts(window);
    let result = estimate_resolvent_norms(grid, kernel, &shifts, ctrl, observer)?;
    Ok(PseudospectrumMaps {
        inv_norm_map: reshape_into_grid(chunk.real_size, chunk.imag_size, &result.estimates),
        it_count_map: reshape_into_grid(chunk.real_size, chunk.imag_size, &result.it_counts),
        outcome: result.outcome,
    })
}

/// Splits `window` into `num_real × num_imag` chunks and runs them one after
/// another, with a barrier on either side of every chunk.
///
/// `on_chunk` is called on every rank after each chunk. When `snapshots` is
/// given, world rank 0 writes periodic snapshots; with more than one chunk the
/// snapshot names carry the chunk tag. Returns the stitched whole-window maps.
///
/// A failed snapshot write or a failed `on_chunk` on any rank makes every rank
/// return an error.
pub fn chunked_pseudospectrum<K, C, F>(
    grid: &Grid<C>,
    kernel: &K,
    window: &Window,
    num_real: usize,
    num_imag: usize,
    ctrl: &PseudospectrumCtrl,
    snapshots: Option<&SnapshotCtrl>,
    mut on_chunk: F,
) -> Result<WindowMaps, PseudospectrumError>
where
    K: MultiShiftSolve + ?Sized,
    C: Communicator,
    F: FnMut(&Chunk, &PseudospectrumMaps, &ChunkSummary) -> Result<(), PseudospectrumError>,
{
    let chunks = partition_window(window, num_real, num_imag)?;
    let root = grid.world().rank() == 0;
    let mut window_maps = WindowMaps::new(window);

    for chunk in &chunks {
        if root {
            log::info!(
                "Starting computation for chunk centered at ({}, {})",
                chunk.center.re,
                chunk.center.im
            );
        }
        let mut snapshotter = snapshots.filter(|s| s.is_enabled()).map(|s| {
            let suffix = if chunks.len() > 1 { chunk.tag() } else { String::new() };
            Snapshotter::new(s, chunk.real_size, chunk.imag_size, root).with_suffix(suffix)
        });

        grid.world().barrier();
        let timer = Instant::now();
        let maps = triangular_pseudospectrum(
            grid,
            kernel,
            window,
            chunk,
            ctrl,
            snapshotter.as_mut().map(|s| s as &mut dyn PassObserver),
        )?;
        grid.world().barrier();
        let seconds = timer.elapsed().as_secs_f64();

        let max_iterations = grid_entries(&maps.it_count_map).max().unwrap_or(0);
        if root {
            log::info!("num seconds={seconds}");
            log::info!("num iterations={max_iterations}");
        }
        let summary = ChunkSummary {
            real_index: chunk.real_index,
            imag_index: chunk.imag_index,
            real_center: chunk.center.re,
            imag_center: chunk.center.im,
            real_size: chunk.real_size,
            imag_size: chunk.imag_size,
            seconds,
            passes: maps.outcome.iterations(),
            max_iterations,
            converged: matches!(maps.outcome, PseudospectrumOutcome::Converged { .. }),
        };
        agree(grid.world(), on_chunk(chunk, &maps, &summary), "reporting a chunk")?;
        window_maps.insert_chunk(chunk, &maps.inv_norm_map, &maps.it_count_map);
    }
    Ok(window_maps)
}
