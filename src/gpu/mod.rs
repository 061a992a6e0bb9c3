// gpu/mod.rs — wgpu offload backend.
//
// The host engine in `engine::host` remains the authoritative reference:
// every device kernel is validated against it byte-for-byte.
//
//   device   adapter selection, device/queue ownership, workgroup shape
//   stager   `WgpuStager`, the `DeviceStager` implementation: packs the
//            raster into u32 words, runs one compute pass, reads it back
//
// Nothing here is required for host-only runs; if no adapter can be opened
// the engine records the backend as unavailable and may fall back to host.

pub mod device;
pub mod stager;

pub use device::{GpuDevice, WorkgroupSize};
pub use stager::WgpuStager;
