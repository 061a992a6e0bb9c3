// error.rs — Crate-wide error type.
//
// Every failure in the core is surfaced as an explicit `SobelError`.
// Nothing here is retried: each operation is a single deterministic attempt.

use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SobelError>;

/// Errors produced by the rasters, the execution engine, the offload
/// stager and the image I/O collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SobelError {
    /// The raster is smaller than the 3×3 window, so there is no valid
    /// output region. Raised before any write happens.
    #[error("raster {width}×{height} is smaller than the 3×3 derivative window")]
    InvalidDimensions { width: usize, height: usize },

    /// A pixel buffer does not hold exactly `width * height` samples.
    #[error("pixel buffer holds {actual} samples, expected {expected}")]
    BufferLength { expected: usize, actual: usize },

    /// The destination handed to `run_into` has a different shape than the source.
    #[error("destination is {dst_width}×{dst_height}, source is {src_width}×{src_height}")]
    ShapeMismatch {
        src_width: usize,
        src_height: usize,
        dst_width: usize,
        dst_height: usize,
    },

    /// The offload domain cannot be reached or could not execute the kernel.
    #[error("offload device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    /// The execution plan cannot be honoured by the selected backend.
    #[error("unsupported execution plan: {0}")]
    UnsupportedPlan(String),

    /// A staging operation was issued out of order (e.g. `stage_out` before `dispatch`).
    #[error("staging protocol violated: {0}")]
    StagingOrder(&'static str),

    /// Two strategies disagreed on the same input. Indicates a broken partition.
    #[error("strategy {strategy} produced a different output than the reference")]
    OutputMismatch { strategy: String },

    /// The host thread pool could not be built.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The source image could not be decoded. The engine is never invoked.
    #[error("failed to load image {}: {source}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The output image could not be encoded or written.
    #[error("failed to save image {}: {source}", path.display())]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl SobelError {
    pub(crate) fn device(reason: impl Into<String>) -> Self {
        SobelError::DeviceUnavailable {
            reason: reason.into(),
        }
    }

    /// True for errors that a host fallback policy is allowed to absorb.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, SobelError::DeviceUnavailable { .. })
    }
}
