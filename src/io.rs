// io.rs — Grayscale image file I/O.
//
// Thin glue over the `image` crate: decode anything it understands to 8-bit
// luma, encode a raster back out with the format chosen by the extension.
// The engine never touches files; only the harness calls into here.

use std::path::Path;

use image::GrayImage;

use crate::error::{Result, SobelError};
use crate::raster::Raster;

/// Decode `path` and convert it to a single-channel 8-bit raster.
///
/// Color inputs are converted with the `image` crate's luma weights.
pub fn load_grayscale(path: impl AsRef<Path>) -> Result<Raster> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|source| SobelError::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    log::debug!("loaded {} ({w}×{h})", path.display());
    Raster::from_vec(w as usize, h as usize, gray.into_raw())
}

/// Encode `raster` to `path`. The format follows the file extension.
pub fn save_grayscale(path: impl AsRef<Path>, raster: &Raster) -> Result<()> {
    let path = path.as_ref();
    let (w, h) = (raster.width(), raster.height());
    let expected = w * h;
    let gray = GrayImage::from_raw(w as u32, h as u32, raster.as_slice().to_vec()).ok_or(
        SobelError::BufferLength { expected, actual: raster.as_slice().len() },
    )?;
    gray.save(path).map_err(|source| SobelError::ImageSave {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("wrote {} ({w}×{h})", path.display());
    Ok(())
}
