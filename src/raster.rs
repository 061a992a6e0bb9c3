// raster.rs — Flat row-major 8-bit intensity buffers.
//
// Two shapes of the same thing:
//
//   Raster          owns its Vec<u8>      (what the engine hands back)
//   RasterView<'a>  borrows a &'a [u8]    (what the engine reads from)
//
// Layout is always packed: length == width * height, row y starts at
// y * width. There is no stride padding on the host; the wgpu stager adds
// its own aligned row pitch when it copies the data to the device.
//
// OWNERSHIP MODEL
// ────────────────
// A source raster is never aliased mutably during a pass: the engine only
// ever sees a `RasterView`, and the borrow checker rejects any attempt to
// mutate the owner while the view exists. The destination is a separate
// `Raster` that the engine owns exclusively until it returns it.
//
// NEW RUST CONCEPTS:
// - `impl<'a> From<&'a Raster> for RasterView<'a>` — a cheap borrowed view
//   from an owner, tied to the owner's lifetime.
// - `TryFrom`-style constructors returning `Result` instead of panicking on
//   caller-supplied buffers.

use std::fmt;

use crate::error::{Result, SobelError};

// ---------------------------------------------------------------------------
// Raster
// ---------------------------------------------------------------------------

/// An owned single-channel 8-bit raster, row-major, no padding.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl Raster {
    /// Create a zero-filled raster.
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, 0)
    }

    /// Create a raster where every sample is `value`.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Raster {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// Wrap an existing sample vector.
    ///
    /// # Errors
    /// `BufferLength` if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        check_len(width, height, data.len())?;
        Ok(Raster { data, width, height })
    }

    /// Build a raster by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Raster { data, width, height }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Borrow the whole raster read-only.
    #[inline]
    pub fn view(&self) -> RasterView<'_> {
        RasterView {
            data: &self.data,
            width: self.width,
            height: self.height,
        }
    }

    /// Sample at column `x`, row `y`.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.bounds_check(x, y);
        self.data[y * self.width + x]
    }

    /// Overwrite the sample at column `x`, row `y`.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.bounds_check(x, y);
        self.data[y * self.width + x] = value;
    }

    /// Borrow row `y`.
    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// Mutably borrow row `y`.
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &mut self.data[start..start + self.width]
    }

    /// Iterate over all samples as `(x, y, value)`.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, u8)> + '_ {
        let w = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % w, i / w, v))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Release the raster and return its sample vector.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for raster {}×{}",
            self.width,
            self.height,
        );
    }
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.view(), f)
    }
}

impl std::ops::Index<(usize, usize)> for Raster {
    type Output = u8;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &u8 {
        self.bounds_check(x, y);
        &self.data[y * self.width + x]
    }
}

impl std::ops::IndexMut<(usize, usize)> for Raster {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut u8 {
        self.bounds_check(x, y);
        &mut self.data[y * self.width + x]
    }
}

// ---------------------------------------------------------------------------
// RasterView<'a>
// ---------------------------------------------------------------------------

/// A borrowed, read-only raster. `Copy`, so it can be handed to every
/// worker without reference counting.
#[derive(Clone, Copy)]
pub struct RasterView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a> RasterView<'a> {
    /// Borrow a caller-owned buffer as a raster.
    ///
    /// # Errors
    /// `BufferLength` if `data.len() != width * height`.
    pub fn new(data: &'a [u8], width: usize, height: usize) -> Result<Self> {
        check_len(width, height, data.len())?;
        Ok(RasterView { data, width, height })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for raster {}×{}",
            self.width,
            self.height,
        );
        self.data[y * self.width + x]
    }

    /// Borrow row `y`. The slice keeps the view's lifetime, not the call's.
    #[inline]
    pub fn row(&self, y: usize) -> &'a [u8] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// The 3×3 neighbourhood whose top-left corner is (`row`, `col`).
    ///
    /// # Panics
    /// Panics if the window is not fully inside the raster.
    #[inline]
    pub fn window(&self, row: usize, col: usize) -> [[u8; 3]; 3] {
        assert!(
            row + 3 <= self.height && col + 3 <= self.width,
            "3×3 window at (row {row}, col {col}) exceeds raster {}×{}",
            self.width,
            self.height,
        );
        let mut w = [[0u8; 3]; 3];
        for (dy, out) in w.iter_mut().enumerate() {
            let start = (row + dy) * self.width + col;
            out.copy_from_slice(&self.data[start..start + 3]);
        }
        w
    }

    #[inline]
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Deep copy into an owned raster.
    pub fn to_raster(&self) -> Raster {
        Raster {
            data: self.data.to_vec(),
            width: self.width,
            height: self.height,
        }
    }
}

impl<'a> From<&'a Raster> for RasterView<'a> {
    fn from(raster: &'a Raster) -> Self {
        raster.view()
    }
}

// Small rasters in test failures are far easier to read as a grid.
impl fmt::Debug for RasterView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Raster {{ {}×{} }}", self.width, self.height)?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", self.data[y * self.width + x])?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

fn check_len(width: usize, height: usize, actual: usize) -> Result<()> {
    let expected = width * height;
    if actual != expected {
        return Err(SobelError::BufferLength { expected, actual });
    }
    Ok(())
}
