//! Periodic snapshots of the running estimates.
//!
//! A [`Snapshotter`] is handed to the driver as its [`PassObserver`]. Numeric
//! snapshots write the current estimates map, image snapshots write its natural
//! logarithm plus a discrete-grayscale copy. Only the rank built with
//! `enabled = true` touches the filesystem; every rank still counts passes so
//! the cadence is identical everywhere.

use crate::active::ActiveSet;
use crate::algorithms::driver::PassObserver;
use crate::error::PseudospectrumError;
use crate::io::{ColorMap, FileFormat, write_grid};
use crate::utils::ordering::{map_grid, reshape_into_grid};
use faer::Mat;
use std::path::PathBuf;

/// Snapshot cadence and naming.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SnapshotCtrl {
    /// Passes between numeric snapshots; 0 disables them.
    pub num_freq: usize,
    /// Passes between image snapshots; 0 disables them.
    pub img_freq: usize,
    pub num_base: String,
    pub img_base: String,
    pub num_format: FileFormat,
    pub img_format: FileFormat,
    pub color_map: ColorMap,
    pub output_dir: PathBuf,
}

impl Default for SnapshotCtrl {
    fn default() -> Self {
        SnapshotCtrl {
            num_freq: 0,
            img_freq: 0,
            num_base: "snap".into(),
            img_base: "logSnap".into(),
            num_format: FileFormat::AsciiMatlab,
            img_format: FileFormat::Png,
            color_map: ColorMap::Grayscale,
            output_dir: PathBuf::from("."),
        }
    }
}

impl SnapshotCtrl {
    pub fn is_enabled(&self) -> bool {
        self.num_freq > 0 || self.img_freq > 0
    }
}

pub struct Snapshotter<'a> {
    ctrl: &'a SnapshotCtrl,
    real_size: usize,
    imag_size: usize,
    /// Appended to both bases, e.g. a chunk tag.
    suffix: String,
    enabled: bool,
    num_save_count: usize,
    img_save_count: usize,
    written: Vec<PathBuf>,
}

impl<'a> Snapshotter<'a> {
    /// A snapshotter for a `imag_size × real_size` shift grid. Pure vectors
    /// (either size zero) are never written.
    pub fn new(ctrl: &'a SnapshotCtrl, real_size: usize, imag_size: usize, enabled: bool) -> Self {
        Snapshotter {
            ctrl,
            real_size,
            imag_size,
            suffix: String::new(),
            enabled: enabled && real_size != 0 && imag_size != 0,
            num_save_count: 0,
            img_save_count: 0,
            written: Vec::new(),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Paths written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn current_map(&self, active: &ActiveSet) -> Mat<f64> {
        let (estimates, _) = active.restored();
        reshape_into_grid(self.real_size, self.imag_size, &estimates)
    }

    fn write_numeric(&mut self, its: usize, active: &ActiveSet) -> Result<(), PseudospectrumError> {
        if !self.enabled {
            return Ok(());
        }
        let map = self.current_map(active);
        let tag = format!("{}{}-{its}", self.ctrl.num_base, self.suffix);
        let path = write_grid(
            &map,
            &self.ctrl.output_dir,
            &tag,
            self.ctrl.num_format,
            self.ctrl.color_map,
        )?;
        self.written.push(path);
        Ok(())
    }

    fn write_image(&mut self, its: usize, active: &ActiveSet) -> Result<(), PseudospectrumError> {
        if !self.enabled {
            return Ok(());
        }
        let map = map_grid(&self.current_map(active), f64::ln);
        let tag = format!("{}{}-{its}", self.ctrl.img_base, self.suffix);
        let dir = &self.ctrl.output_dir;
        let path = write_grid(&map, dir, &tag, self.ctrl.img_format, self.ctrl.color_map)?;
        self.written.push(path);
        let path = write_grid(
            &map,
            dir,
            &format!("{tag}-discrete"),
            self.ctrl.img_format,
            ColorMap::GrayscaleDiscrete,
        )?;
        self.written.push(path);
        Ok(())
    }
}

impl PassObserver for Snapshotter<'_> {
    fn after_pass(&mut self, its: usize, active: &ActiveSet) -> Result<(), PseudospectrumError> {
        self.num_save_count += 1;
        self.img_save_count += 1;
        if self.ctrl.num_freq > 0 && self.num_save_count >= self.ctrl.num_freq {
            self.write_numeric(its, active)?;
            self.num_save_count = 0;
        }
        if self.ctrl.img_freq > 0 && self.img_save_count >= self.ctrl.img_freq {
            self.write_image(its, active)?;
            self.img_save_count = 0;
        }
        Ok(())
    }

    fn finish(&mut self, its: usize, active: &ActiveSet) -> Result<(), PseudospectrumError> {
        if self.ctrl.num_freq > 0 {
            self.write_numeric(its, active)?;
        }
        if self.ctrl.img_freq > 0 {
            self.write_image(its, active)?;
        }
        Ok(())
    }
}
