// sobel-offload: horizontal Sobel edge response with pluggable partitioning
//
// One fixed 3×3 derivative mask, evaluated over an 8-bit grayscale raster
// by four interchangeable partition strategies on two backends:
//
//   host    rayon worker pool over host memory        (engine::host)
//   device  wgpu compute, explicit stage-in/out       (offload, gpu)
//
// Every strategy and both backends produce byte-identical output; the
// choice is purely about scheduling.

pub mod error;
pub mod raster;
pub mod kernel;
pub mod partition;
pub mod offload;
pub mod engine;
pub mod gpu;
pub mod io;
pub mod config;
pub mod harness;

pub use engine::{Backend, Engine, EngineConfig, ExecutionPlan, RunOutput, RunReport};
pub use error::{Result, SobelError};
pub use kernel::NumericPolicy;
pub use offload::DeviceStager;
pub use partition::PartitionStrategy;
pub use raster::{Raster, RasterView};
