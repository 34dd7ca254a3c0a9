//! Writing and displaying result maps.
//!
//! Numeric formats are written directly; raster formats are colour mapped and
//! encoded with the [`image`] crate. The colour map is always an explicit
//! argument.

use crate::error::{ErrorKind, PseudospectrumError};
use crate::utils::ordering::{grid_entries, map_grid};
use faer::{Mat, c64};
use image::{ImageBuffer, Rgb};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Exclusive upper bound of the file format codes.
pub const FILE_FORMAT_MAX: i64 = 12;

/// Number of gray levels of [`ColorMap::GrayscaleDiscrete`].
const NUM_DISCRETE_COLORS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FileFormat {
    Ascii = 1,
    AsciiMatlab = 2,
    Binary = 3,
    BinaryFlat = 4,
    Bmp = 5,
    Jpg = 6,
    Jpeg = 7,
    Png = 8,
    Ppm = 9,
    Xbm = 10,
    Xpm = 11,
}

impl FileFormat {
    /// Parses a format code; `role` names the option in the error message.
    pub fn from_code(code: i64, role: &'static str) -> Result<Self, PseudospectrumError> {
        let format = match code {
            1 => FileFormat::Ascii,
            2 => FileFormat::AsciiMatlab,
            3 => FileFormat::Binary,
            4 => FileFormat::BinaryFlat,
            5 => FileFormat::Bmp,
            6 => FileFormat::Jpg,
            7 => FileFormat::Jpeg,
            8 => FileFormat::Png,
            9 => FileFormat::Ppm,
            10 => FileFormat::Xbm,
            11 => FileFormat::Xpm,
            _ => {
                return Err(ErrorKind::InvalidFileFormat {
                    role,
                    code,
                    max: FILE_FORMAT_MAX,
                }
                .into());
            }
        };
        Ok(format)
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Ascii => "txt",
            FileFormat::AsciiMatlab => "m",
            FileFormat::Binary => "bin",
            FileFormat::BinaryFlat => "dat",
            FileFormat::Bmp => "bmp",
            FileFormat::Jpg => "jpg",
            FileFormat::Jpeg => "jpeg",
            FileFormat::Png => "png",
            FileFormat::Ppm => "ppm",
            FileFormat::Xbm => "xbm",
            FileFormat::Xpm => "xpm",
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(
            self,
            FileFormat::Ascii | FileFormat::AsciiMatlab | FileFormat::Binary | FileFormat::BinaryFlat
        )
    }

    /// Fails for formats this crate cannot encode.
    pub fn ensure_writable(self) -> Result<Self, PseudospectrumError> {
        match self {
            FileFormat::Xbm => Err(ErrorKind::UnsupportedFileFormat("XBM").into()),
            FileFormat::Xpm => Err(ErrorKind::UnsupportedFileFormat("XPM").into()),
            other => Ok(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ColorMap {
    Grayscale = 0,
    GrayscaleDiscrete = 1,
    RedBlackGreen = 2,
    BlueRed = 3,
}

impl ColorMap {
    pub fn from_code(code: i64) -> Result<Self, PseudospectrumError> {
        match code {
            0 => Ok(ColorMap::Grayscale),
            1 => Ok(ColorMap::GrayscaleDiscrete),
            2 => Ok(ColorMap::RedBlackGreen),
            3 => Ok(ColorMap::BlueRed),
            _ => Err(ErrorKind::InvalidColorMap(code).into()),
        }
    }

    /// Colour of a value already normalized to `[0, 1]`.
    pub fn sample(self, t: f64) -> Rgb<u8> {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let byte = |x: f64| (255.0 * x).round() as u8;
        match self {
            ColorMap::Grayscale => {
                let g = byte(t);
                Rgb([g, g, g])
            }
            ColorMap::GrayscaleDiscrete => {
                let level = ((t * NUM_DISCRETE_COLORS as f64) as usize).min(NUM_DISCRETE_COLORS - 1);
                let g = byte(level as f64 / (NUM_DISCRETE_COLORS - 1) as f64);
                Rgb([g, g, g])
            }
            ColorMap::RedBlackGreen => {
                if t < 0.5 {
                    Rgb([byte(1.0 - 2.0 * t), 0, 0])
                } else {
                    Rgb([0, byte(2.0 * t - 1.0), 0])
                }
            }
            ColorMap::BlueRed => Rgb([byte(t), 0, byte(1.0 - t)]),
        }
    }
}

/// Writes `map` to `<dir>/<tag>.<ext>` and returns the path.
pub fn write_grid(
    map: &Mat<f64>,
    dir: &Path,
    tag: &str,
    format: FileFormat,
    color_map: ColorMap,
) -> Result<PathBuf, PseudospectrumError> {
    let format = format.ensure_writable()?;
    let path = dir.join(format!("{tag}.{}", format.extension()));
    if format.is_image() {
        write_image(map, &path, color_map)?;
    } else {
        let mut out = BufWriter::new(File::create(&path)?);
        match format {
            FileFormat::Ascii => write_ascii(map, &mut out)?,
            FileFormat::AsciiMatlab => write_ascii_matlab(map, tag, &mut out)?,
            FileFormat::Binary => write_binary(map, true, &mut out)?,
            _ => write_binary(map, false, &mut out)?,
        }
        out.flush()?;
    }
    log::debug!("Wrote {}", path.display());
    Ok(path)
}

/// Prints `map` under a heading, one row per line.
pub fn display_grid(map: &Mat<f64>, tag: &str, out: &mut impl Write) -> Result<(), PseudospectrumError> {
    writeln!(out, "{tag}")?;
    write_ascii(map, out)?;
    writeln!(out)?;
    Ok(())
}

fn write_ascii(map: &Mat<f64>, out: &mut impl Write) -> std::io::Result<()> {
    for i in 0..map.nrows() {
        let row: Vec<String> = (0..map.ncols()).map(|j| format!("{:e}", map[(i, j)])).collect();
        writeln!(out, "{}", row.join(" "))?;
    }
    Ok(())
}

fn write_ascii_matlab(map: &Mat<f64>, tag: &str, out: &mut impl Write) -> std::io::Result<()> {
    let name: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    writeln!(out, "{name} = [")?;
    write_ascii(map, out)?;
    writeln!(out, "];")
}

/// Column-major little-endian `f64`s, preceded by `nrows` and `ncols` as
/// little-endian `i64`s when `header` is set.
fn write_binary(map: &Mat<f64>, header: bool, out: &mut impl Write) -> std::io::Result<()> {
    if header {
        out.write_all(&(map.nrows() as i64).to_le_bytes())?;
        out.write_all(&(map.ncols() as i64).to_le_bytes())?;
    }
    for value in grid_entries(map) {
        out.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

fn write_image(map: &Mat<f64>, path: &Path, color_map: ColorMap) -> Result<(), PseudospectrumError> {
    let finite = grid_entries(map).filter(|v| v.is_finite());
    let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let span = if hi > lo { hi - lo } else { 1.0 };

    let (width, height) = (map.ncols() as u32, map.nrows() as u32);
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        let value = map[(y as usize, x as usize)];
        let t = if value == f64::INFINITY {
            1.0
        } else {
            (value - lo) / span
        };
        color_map.sample(t)
    });
    img.save(path).map_err(|e| {
        ErrorKind::InputError(format!("Could not encode {}: {e}", path.display()))
    })?;
    Ok(())
}

/// Writes the real and imaginary parts of `a` as `<tag>_real` and `<tag>_imag`.
pub fn write_complex_grid(
    a: &Mat<c64>,
    dir: &Path,
    tag: &str,
    format: FileFormat,
    color_map: ColorMap,
) -> Result<[PathBuf; 2], PseudospectrumError> {
    let (re, im) = complex_parts(a);
    Ok([
        write_grid(&re, dir, &format!("{tag}_real"), format, color_map)?,
        write_grid(&im, dir, &format!("{tag}_imag"), format, color_map)?,
    ])
}

/// [`display_grid`] for the real and imaginary parts of `a`.
pub fn display_complex_grid(a: &Mat<c64>, tag: &str, out: &mut impl Write) -> Result<(), PseudospectrumError> {
    let (re, im) = complex_parts(a);
    display_grid(&re, &format!("{tag}_real"), out)?;
    display_grid(&im, &format!("{tag}_imag"), out)
}

fn complex_parts(a: &Mat<c64>) -> (Mat<f64>, Mat<f64>) {
    (map_grid(a, |z| z.re), map_grid(a, |z| z.im))
}

/// Reads an `n × n` complex matrix written as two little-endian `i64`s
/// (height, width) followed by column-major `(re, im)` pairs of `f64`s.
pub fn read_binary(path: &Path, n: usize) -> Result<Mat<c64>, PseudospectrumError> {
    let mut input = BufReader::new(File::open(path)?);
    let mut word = [0u8; 8];
    let mut dims = [0usize; 2];
    for dim in dims.iter_mut() {
        input.read_exact(&mut word)?;
        *dim = i64::from_le_bytes(word).max(0) as usize;
    }
    if dims[0] != n {
        return Err(ErrorKind::DimensionMismatch {
            what: "matrix height in file",
            expected: n,
            actual: dims[0],
        }
        .into());
    }
    if dims[1] != n {
        return Err(ErrorKind::DimensionMismatch {
            what: "matrix width in file",
            expected: n,
            actual: dims[1],
        }
        .into());
    }

    let mut data = Vec::with_capacity(n * n);
    for _ in 0..n * n {
        input.read_exact(&mut word)?;
        let re = f64::from_le_bytes(word);
        input.read_exact(&mut word)?;
        let im = f64::from_le_bytes(word);
        data.push(c64::new(re, im));
    }
    Ok(Mat::from_fn(n, n, |i, j| data[i + j * n]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;
    use std::env;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("pspec_io_{name}_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_format_codes() {
        assert_eq!(FileFormat::from_code(9, "image").unwrap(), FileFormat::Ppm);
        let err = FileFormat::from_code(12, "image").unwrap_err();
        assert_eq!(err.to_string(), "Invalid image format integer 12, should be in [1,12)");
        assert!(FileFormat::from_code(0, "numerical").is_err());
        assert!(FileFormat::Xpm.ensure_writable().unwrap_err().is_configuration());
        assert!(FileFormat::Png.ensure_writable().is_ok());
    }

    #[test]
    fn test_color_maps() {
        assert!(ColorMap::from_code(4).is_err());
        assert_eq!(ColorMap::Grayscale.sample(1.0), Rgb([255, 255, 255]));
        assert_eq!(ColorMap::BlueRed.sample(0.0), Rgb([0, 0, 255]));
        assert_eq!(ColorMap::RedBlackGreen.sample(0.5), Rgb([0, 0, 0]));
        // Nearby values fall into the same discrete band.
        assert_eq!(
            ColorMap::GrayscaleDiscrete.sample(0.501),
            ColorMap::GrayscaleDiscrete.sample(0.505)
        );
    }

    #[test]
    fn test_write_matlab_and_binary() {
        let dir = scratch_dir("numeric");
        let map = mat![[1.0, 3.0], [2.0, 4.0]];

        let path = write_grid(&map, &dir, "map_0_0", FileFormat::AsciiMatlab, ColorMap::Grayscale).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.starts_with("map_0_0 = [\n1e0 3e0\n2e0 4e0\n];"));

        let path = write_grid(&map, &dir, "map", FileFormat::Binary, ColorMap::Grayscale).unwrap();
        let bytes = fs::read(path).unwrap();
        assert_eq!(bytes.len(), 16 + 4 * 8);
        assert_eq!(i64::from_le_bytes(bytes[0..8].try_into().unwrap()), 2);
        assert_eq!(f64::from_le_bytes(bytes[24..32].try_into().unwrap()), 2.0);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_write_png_image() {
        let dir = scratch_dir("image");
        let map = mat![[0.0, 3.0], [1.0, f64::INFINITY], [2.0, 5.0]];
        let path = write_grid(&map, &dir, "img", FileFormat::Png, ColorMap::BlueRed).unwrap();
        let img = image::open(path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (2, 3));
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 255]));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_read_binary_round_trip_through_raw_bytes() {
        let dir = scratch_dir("read");
        let path = dir.join("u.bin");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2i64.to_le_bytes());
        bytes.extend_from_slice(&2i64.to_le_bytes());
        for k in 0..4 {
            bytes.extend_from_slice(&(k as f64).to_le_bytes());
            bytes.extend_from_slice(&(-(k as f64)).to_le_bytes());
        }
        fs::write(&path, bytes).unwrap();

        let u = read_binary(&path, 2).unwrap();
        assert_eq!(u[(1, 0)], c64::new(1.0, -1.0));
        assert_eq!(u[(0, 1)], c64::new(2.0, -2.0));
        let err = read_binary(&path, 3).unwrap_err();
        assert!(err.is_configuration());
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_display_grid() {
        let map = mat![[0.5, 1.5]];
        let mut out = Vec::new();
        display_grid(&map, "logInvNormMap", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "logInvNormMap\n5e-1 1.5e0\n\n");
    }

    #[test]
    fn test_complex_matrix_is_split_into_parts() {
        let dir = scratch_dir("complex");
        let a = Mat::from_fn(2, 2, |i, j| c64::new(i as f64, -(j as f64)));
        let [re, im] = write_complex_grid(&a, &dir, "A", FileFormat::Binary, ColorMap::Grayscale).unwrap();
        assert!(re.ends_with("A_real.bin"));
        let bytes = fs::read(im).unwrap();
        // Column 1 starts after the header and two entries.
        assert_eq!(f64::from_le_bytes(bytes[32..40].try_into().unwrap()), -1.0);

        let mut out = Vec::new();
        display_complex_grid(&a, "A", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("A_real\n0e0 0e0\n1e0 1e0\n\nA_imag\n"), "{text}");
        fs::remove_dir_all(dir).ok();
    }
}
