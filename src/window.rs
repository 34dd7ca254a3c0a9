//! Sampling windows and their partition into chunks.
//!
//! A [`Window`] is a rectangle of the complex plane sampled on a
//! `imag_size × real_size` pixel grid. Pixel `(i, j)` (row `i` along the
//! imaginary axis, column `j` along the real axis) samples the pixel centre
//!
//! ```text
//! corner + ((j + ½)·x_step, (i + ½)·y_step),   corner = center − (real_width/2, imag_width/2)
//! ```
//!
//! [`partition_window`] tiles the pixel grid with `num_real × num_imag`
//! [`Chunk`]s. Chunks sample the same global pixel centres as the whole
//! window, so a chunked run estimates exactly the unchunked shift set.

use crate::error::{ErrorKind, PseudospectrumError};
use faer::{Mat, c64};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Window {
    #[serde(serialize_with = "serialize_complex")]
    pub center: c64,
    pub real_width: f64,
    pub imag_width: f64,
    pub real_size: usize,
    pub imag_size: usize,
}

fn serialize_complex<S: serde::Serializer>(z: &c64, s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq([z.re, z.im])
}

impl Window {
    #[inline]
    pub fn corner(&self) -> c64 {
        self.center - c64::new(self.real_width / 2.0, self.imag_width / 2.0)
    }

    #[inline]
    pub fn x_step(&self) -> f64 {
        self.real_width / self.real_size as f64
    }

    #[inline]
    pub fn y_step(&self) -> f64 {
        self.imag_width / self.imag_size as f64
    }

    /// The shift sampled by global pixel `(i, j)`.
    #[inline]
    pub fn pixel(&self, i: usize, j: usize) -> c64 {
        self.corner()
            + c64::new(
                (j as f64 + 0.5) * self.x_step(),
                (i as f64 + 0.5) * self.y_step(),
            )
    }

    /// The whole window as a single chunk.
    pub fn as_chunk(&self) -> Chunk {
        Chunk::new(self, 0, 0, 0, 0, self.real_size, self.imag_size)
    }
}

/// One rectangular tile of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunk {
    pub real_index: usize,
    pub imag_index: usize,
    /// Global column of the first pixel.
    pub real_offset: usize,
    /// Global row of the first pixel.
    pub imag_offset: usize,
    pub real_size: usize,
    pub imag_size: usize,
    pub center: c64,
    pub real_width: f64,
    pub imag_width: f64,
}

impl Chunk {
    fn new(
        window: &Window,
        real_index: usize,
        imag_index: usize,
        real_offset: usize,
        imag_offset: usize,
        real_size: usize,
        imag_size: usize,
    ) -> Self {
        let (x_step, y_step) = (window.x_step(), window.y_step());
        let chunk_corner =
            window.corner() + c64::new(x_step * real_offset as f64, y_step * imag_offset as f64);
        let real_width = x_step * real_size as f64;
        let imag_width = y_step * imag_size as f64;
        Chunk {
            real_index,
            imag_index,
            real_offset,
            imag_offset,
            real_size,
            imag_size,
            center: chunk_corner + c64::new(real_width / 2.0, imag_width / 2.0),
            real_width,
            imag_width,
        }
    }

    /// `_<real_index>_<imag_index>`, appended to output names.
    pub fn tag(&self) -> String {
        format!("_{}_{}", self.real_index, self.imag_index)
    }

    #[inline]
    pub fn num_shifts(&self) -> usize {
        self.real_size * self.imag_size
    }

    /// One shift per pixel; shift `i + j·imag_size` samples chunk pixel `(i, j)`.
    pub fn shifts(&self, window: &Window) -> Vec<c64> {
        let mut shifts = Vec::with_capacity(self.num_shifts());
        for j in 0..self.real_size {
            for i in 0..self.imag_size {
                shifts.push(window.pixel(self.imag_offset + i, self.real_offset + j));
            }
        }
        shifts
    }
}

/// Splits the window into `num_real × num_imag` chunks, real index outermost.
///
/// Block sizes are `size / num`; the last chunk along each axis absorbs the
/// remainder.
pub fn partition_window(
    window: &Window,
    num_real: usize,
    num_imag: usize,
) -> Result<Vec<Chunk>, PseudospectrumError> {
    if num_real == 0 || num_imag == 0 {
        return Err(ErrorKind::InputError(format!(
            "Chunk counts must be positive, got {num_real}x{num_imag}"
        ))
        .into());
    }
    if num_real > window.real_size || num_imag > window.imag_size {
        return Err(ErrorKind::InputError(format!(
            "Cannot split a {}x{} window into {num_real}x{num_imag} chunks",
            window.real_size, window.imag_size
        ))
        .into());
    }

    let x_block = window.real_size / num_real;
    let y_block = window.imag_size / num_imag;
    let x_leftover = window.real_size - (num_real - 1) * x_block;
    let y_leftover = window.imag_size - (num_imag - 1) * y_block;

    let mut chunks = Vec::with_capacity(num_real * num_imag);
    for real_index in 0..num_real {
        let real_size = if real_index == num_real - 1 { x_leftover } else { x_block };
        for imag_index in 0..num_imag {
            let imag_size = if imag_index == num_imag - 1 { y_leftover } else { y_block };
            chunks.push(Chunk::new(
                window,
                real_index,
                imag_index,
                real_index * x_block,
                imag_index * y_block,
                real_size,
                imag_size,
            ));
        }
    }
    Ok(chunks)
}

/// Whole-window result maps assembled from per-chunk maps.
#[derive(Debug, Clone)]
pub struct WindowMaps {
    pub inv_norm_map: Mat<f64>,
    pub it_count_map: Mat<usize>,
}

impl WindowMaps {
    pub fn new(window: &Window) -> Self {
        WindowMaps {
            inv_norm_map: Mat::zeros(window.imag_size, window.real_size),
            it_count_map: Mat::full(window.imag_size, window.real_size, 0),
        }
    }

    /// Copies one chunk's maps into place.
    ///
    /// # Panics
    ///
    /// Panics if the maps do not have the chunk's shape.
    pub fn insert_chunk(&mut self, chunk: &Chunk, inv_norm_map: &Mat<f64>, it_count_map: &Mat<usize>) {
        assert!(
            inv_norm_map.nrows() == chunk.imag_size
                && inv_norm_map.ncols() == chunk.real_size
                && it_count_map.nrows() == chunk.imag_size
                && it_count_map.ncols() == chunk.real_size,
            "Chunk maps should be {}x{}",
            chunk.imag_size,
            chunk.real_size
        );
        self.inv_norm_map
            .as_mut()
            .submatrix_mut(chunk.imag_offset, chunk.real_offset, chunk.imag_size, chunk.real_size)
            .copy_from(inv_norm_map.as_ref());
        for j in 0..chunk.real_size {
            for i in 0..chunk.imag_size {
                self.it_count_map[(chunk.imag_offset + i, chunk.real_offset + j)] = it_count_map[(i, j)];
            }
        }
    }
}

/// Default window width for a matrix whose diagonal has largest modulus
/// `radius` and whose one-norm is `one_norm`.
pub fn automatic_width(radius: f64, one_norm: f64) -> f64 {
    if one_norm == 0.0 && radius == 0.0 {
        log::info!("Setting width to 1 to handle zero matrix");
        1.0
    } else if radius >= 0.2 * one_norm {
        let width = 2.5 * radius;
        log::info!("Setting width to {width} based on the spectral radius, {radius}");
        width
    } else {
        let width = 0.8 * one_norm;
        log::info!("Setting width to {width} based on the one norm, {one_norm}");
        width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Window {
        Window {
            center: c64::new(1.0, -1.0),
            real_width: 4.0,
            imag_width: 2.0,
            real_size: 7,
            imag_size: 5,
        }
    }

    #[test]
    fn test_partition_sizes_and_leftovers() {
        let chunks = partition_window(&window(), 2, 2).unwrap();
        let sizes: Vec<_> = chunks.iter().map(|c| (c.real_size, c.imag_size)).collect();
        assert_eq!(sizes, vec![(3, 2), (3, 3), (4, 2), (4, 3)]);
        assert_eq!(chunks[3].real_offset, 3);
        assert_eq!(chunks[3].imag_offset, 2);
        assert_eq!(chunks[3].tag(), "_1_1");
    }

    #[test]
    fn test_chunks_tile_the_window_exactly() {
        let w = window();
        let mut seen = vec![0; w.real_size * w.imag_size];
        for chunk in partition_window(&w, 3, 2).unwrap() {
            for j in 0..chunk.real_size {
                for i in 0..chunk.imag_size {
                    seen[(chunk.imag_offset + i) + (chunk.real_offset + j) * w.imag_size] += 1;
                }
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn test_chunk_shifts_are_window_pixels() {
        let w = window();
        let chunk = partition_window(&w, 2, 2).unwrap()[1];
        let shifts = chunk.shifts(&w);
        assert_eq!(shifts.len(), 9);
        // Shift 4 is chunk pixel (1, 1), i.e. global pixel (3, 1).
        assert_eq!(shifts[4], w.pixel(3, 1));
        let corner = w.corner();
        assert!((w.pixel(0, 0) - (corner + c64::new(2.0 / 7.0, 0.2))).norm() < 1e-15);
    }

    #[test]
    fn test_chunk_centers() {
        let w = window();
        let whole = w.as_chunk();
        assert!((whole.center - w.center).norm() < 1e-12);
        assert!((whole.real_width - w.real_width).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_partitions() {
        assert!(partition_window(&window(), 0, 1).unwrap_err().is_configuration());
        assert!(partition_window(&window(), 8, 1).is_err());
    }

    #[test]
    fn test_insert_chunk_stitches_maps() {
        let w = window();
        let mut maps = WindowMaps::new(&w);
        for chunk in partition_window(&w, 2, 2).unwrap() {
            let value = (chunk.real_index * 2 + chunk.imag_index) as f64;
            let inv = Mat::full(chunk.imag_size, chunk.real_size, value);
            let counts = Mat::full(chunk.imag_size, chunk.real_size, value as usize);
            maps.insert_chunk(&chunk, &inv, &counts);
        }
        assert_eq!(maps.inv_norm_map[(0, 0)], 0.0);
        assert_eq!(maps.inv_norm_map[(4, 0)], 1.0);
        assert_eq!(maps.inv_norm_map[(0, 6)], 2.0);
        assert_eq!(maps.it_count_map[(4, 6)], 3);
    }

    #[test]
    fn test_automatic_width() {
        assert_eq!(automatic_width(0.0, 0.0), 1.0);
        assert_eq!(automatic_width(2.0, 4.0), 5.0);
        assert_eq!(automatic_width(0.1, 10.0), 8.0);
    }
}
