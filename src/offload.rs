// offload.rs — Backend-agnostic host/device staging protocol.
//
// An offload backend owns memory the host cannot address directly, so a
// run is always three strictly ordered steps:
//
//   1. stage_in(src)   host → device copy of the source,
//                      allocation-only for the destination
//   2. dispatch(launch) run the kernel; BLOCKS until the device is done
//   3. stage_out()     device → host copy of the destination,
//                      then release both device buffers
//
// `DeviceStager` is the seam: `gpu::stager::WgpuStager` is the real wgpu
// implementation, tests plug in threaded emulations. Methods take
// `&mut self`, so one stager can never serve two runs at once.

use std::time::{Duration, Instant};

use crate::error::Result;
use crate::kernel::NumericPolicy;
use crate::partition::{PartitionStrategy, ValidRegion};
use crate::raster::{Raster, RasterView};

/// Everything the device needs to know to evaluate the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    pub strategy: PartitionStrategy,
    pub policy: NumericPolicy,
    /// Worker groups for `DynamicRows` (0 = let the device decide).
    pub teams: u32,
}

/// An execution domain separate from the host, reached through explicit staging.
pub trait DeviceStager: Send {
    /// Human-readable name of the device, for logs and reports.
    fn describe(&self) -> String;

    /// Copy `src` to device memory and allocate the destination there.
    fn stage_in(&mut self, src: RasterView<'_>) -> Result<()>;

    /// Evaluate the kernel over the staged source. Synchronous.
    fn dispatch(&mut self, launch: &Launch) -> Result<()>;

    /// Copy the destination back and release all device storage.
    ///
    /// Returns a packed `width * height` buffer. Only the valid region is
    /// meaningful; the margin contents are unspecified.
    fn stage_out(&mut self) -> Result<Vec<u8>>;

    /// Drop any device storage without copying it back. Called when a run
    /// is abandoned between `stage_in` and `stage_out`.
    fn release(&mut self);
}

/// Run the full stage-in → dispatch → stage-out sequence on `stager`.
///
/// Returns the packed destination and the time spent in `dispatch` alone.
/// On failure the stager is released before the error is returned.
pub fn offload(
    stager: &mut dyn DeviceStager,
    src: RasterView<'_>,
    launch: &Launch,
) -> Result<(Vec<u8>, Duration)> {
    if let Err(e) = stager.stage_in(src) {
        stager.release();
        return Err(e);
    }

    let started = Instant::now();
    if let Err(e) = stager.dispatch(launch) {
        stager.release();
        return Err(e);
    }
    let compute = started.elapsed();

    match stager.stage_out() {
        Ok(dense) => Ok((dense, compute)),
        Err(e) => {
            stager.release();
            Err(e)
        }
    }
}

/// Copy the valid region of a packed device result into `dst`, leaving the
/// margin of `dst` untouched.
///
/// # Panics
/// Panics if `dense` is not `dst.width() * dst.height()` long.
pub fn scatter_valid(dense: &[u8], dst: &mut Raster, region: ValidRegion) {
    let width = dst.width();
    assert_eq!(dense.len(), width * dst.height(), "device result has the wrong size");
    for row in 0..region.rows {
        let start = row * width;
        dst.row_mut(row)[..region.cols].copy_from_slice(&dense[start..start + region.cols]);
    }
}
