//! Chunked triangular pseudospectrum driver.
//!
//! Generates (or reads) a test matrix, keeps its upper triangle, picks a
//! window if none was given and estimates the pseudospectrum chunk by chunk on
//! an in-process grid of `--procs` ranks. World rank 0 reports, displays and
//! writes; every other rank only computes.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use faer::{Mat, c64};
use pspec_engine::{
    Grid, PseudospectrumError, UpperTriangular, Window,
    comm::Communicator,
    config::{PseudospectrumArgs, RunConfig},
    generators::{diagonal_radius, make_upper_triangular, one_norm},
    io::{ColorMap, display_complex_grid, display_grid, write_complex_grid, write_grid},
    solvers::chunked_pseudospectrum,
    utils::{estimates::numerically_normal, ordering::map_grid},
    window::automatic_width,
};
use std::{fs, io, path::Path, process, thread};

fn main() {
    if let Err(err) = run() {
        log::error!("{err:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    let args = PseudospectrumArgs::parse();
    let mut config = args.validate().context("Invalid configuration")?;
    log::info!("Configuration: {config:?}");
    fs::create_dir_all(&config.snapshot.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.snapshot.output_dir.display()
        )
    })?;

    let mut a = config
        .matrix
        .generate(config.size, config.ctrl.seed)
        .context("Failed to build the test matrix")?;
    make_upper_triangular(&mut a);
    report_matrix(&config, &a)?;
    if numerically_normal(&a, 1e-10) {
        log::info!("The triangular matrix is numerically normal");
    }

    if config.needs_auto_width() {
        let width = automatic_width(diagonal_radius(&a), one_norm(&a));
        config.window.real_width = width;
        config.window.imag_width = width;
    }
    let kernel = UpperTriangular::new(a)?;

    if config.procs == 1 {
        run_rank(&Grid::single(), &kernel, &config)
    } else {
        let grids = Grid::threaded(config.grid_height, config.grid_width(), config.grid_order);
        log::info!(
            "Running on a {}x{} grid of threads",
            config.grid_height,
            config.grid_width()
        );
        thread::scope(|s| {
            for grid in grids {
                let (kernel, config) = (&kernel, &config);
                s.spawn(move || {
                    if let Err(err) = run_rank(&grid, kernel, config) {
                        // Peers may be blocked in a collective; take the whole job down.
                        log::error!("rank {}: {err:#}", grid.world().rank());
                        process::exit(1);
                    }
                });
            }
        });
        Ok(())
    }
}

fn run_rank<C: Communicator>(grid: &Grid<C>, kernel: &UpperTriangular, config: &RunConfig) -> Result<()> {
    let root = grid.world().rank() == 0;
    let mut summary = match (&config.summary, root) {
        (Some(path), true) => Some(
            csv::Writer::from_path(path)
                .with_context(|| format!("Failed to create summary file {}", path.display()))?,
        ),
        _ => None,
    };

    let window_maps = chunked_pseudospectrum(
        grid,
        kernel,
        &config.window,
        config.num_real,
        config.num_imag,
        &config.ctrl,
        Some(&config.snapshot),
        |chunk, maps, row| {
            if !root {
                return Ok(());
            }
            let counts = map_grid(&maps.it_count_map, |c| c as f64);
            report_maps(config, &maps.inv_norm_map, &counts, &chunk.tag())?;
            if let Some(writer) = summary.as_mut() {
                writer.serialize(row).map_err(io::Error::from)?;
                writer.flush()?;
            }
            Ok(())
        },
    )?;

    if root && config.write_ps {
        let counts = map_grid(&window_maps.it_count_map, |c| c as f64);
        let window = &config.window;
        log::info!(
            "Writing the {}x{} window maps",
            window.imag_size,
            window.real_size
        );
        write_window(config, window, &window_maps.inv_norm_map, &counts)?;
    }
    Ok(())
}

/// Displays and writes the triangular matrix, split into real and imaginary parts.
fn report_matrix(config: &RunConfig, a: &Mat<c64>) -> Result<()> {
    if config.display {
        display_complex_grid(a, "A", &mut io::stdout().lock())?;
    }
    if config.write {
        let snap = &config.snapshot;
        let dir = snap.output_dir.as_path();
        write_complex_grid(a, dir, "A", snap.num_format, snap.color_map)
            .and_then(|_| write_complex_grid(a, dir, "A", snap.img_format, snap.color_map))
            .context("Failed to write the triangular matrix")?;
    }
    Ok(())
}

/// Displays and writes one chunk's maps, then their entrywise logarithm.
fn report_maps(
    config: &RunConfig,
    inv_norm_map: &Mat<f64>,
    it_count_map: &Mat<f64>,
    tag: &str,
) -> Result<(), PseudospectrumError> {
    let snap = &config.snapshot;
    let dir = snap.output_dir.as_path();
    let mut stdout = io::stdout().lock();

    if config.display {
        display_grid(inv_norm_map, &format!("invNormMap{tag}"), &mut stdout)?;
        display_grid(it_count_map, &format!("itCountMap{tag}"), &mut stdout)?;
    }
    let write = config.write || config.write_ps;
    if write {
        write_both(dir, inv_norm_map, &format!("invNormMap{tag}"), config)?;
        write_both(dir, it_count_map, &format!("itCountMap{tag}"), config)?;
    }

    let log_map = map_grid(inv_norm_map, f64::ln);
    let discrete = snap.color_map != ColorMap::GrayscaleDiscrete;
    if config.display {
        display_grid(&log_map, &format!("logInvNormMap{tag}"), &mut stdout)?;
        if discrete {
            display_grid(&log_map, &format!("discreteLogInvNormMap{tag}"), &mut stdout)?;
        }
    }
    if write {
        write_both(dir, &log_map, &format!("logInvNormMap{tag}"), config)?;
        if discrete {
            write_grid(
                &log_map,
                dir,
                &format!("discreteLogInvNormMap{tag}"),
                snap.img_format,
                ColorMap::GrayscaleDiscrete,
            )?;
        }
    }
    Ok(())
}

/// Writes `map` once in the numerical and once in the image format.
fn write_both(
    dir: &Path,
    map: &Mat<f64>,
    tag: &str,
    config: &RunConfig,
) -> Result<(), PseudospectrumError> {
    let snap = &config.snapshot;
    write_grid(map, dir, tag, snap.num_format, snap.color_map)?;
    write_grid(map, dir, tag, snap.img_format, snap.color_map)?;
    Ok(())
}

fn write_window(
    config: &RunConfig,
    window: &Window,
    inv_norm_map: &Mat<f64>,
    it_count_map: &Mat<f64>,
) -> Result<()> {
    let dir = config.snapshot.output_dir.as_path();
    write_both(dir, inv_norm_map, "invNormMap", config).with_context(|| {
        format!(
            "Failed to write the {}x{} window maps",
            window.imag_size, window.real_size
        )
    })?;
    write_both(dir, it_count_map, "itCountMap", config)?;
    let log_map = map_grid(inv_norm_map, f64::ln);
    write_both(dir, &log_map, "logInvNormMap", config)?;
    write_grid(
        &log_map,
        dir,
        "discreteLogInvNormMap",
        config.snapshot.img_format,
        ColorMap::GrayscaleDiscrete,
    )?;
    Ok(())
}
