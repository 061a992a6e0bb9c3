// gpu/stager.rs — wgpu implementation of the offload staging protocol.
//
// Mirrors the host engine: the same kernel, the same two numeric policies,
// one compute entry point per parallel strategy:
//
//   StaticRows    rows_static   one invocation per output row
//   DynamicRows   rows_teams    `num_teams` workgroups deal rows round-robin
//   NestedRowCol  nested        2D grid over (word, row)
//
// Sequential has no device form and is rejected by the engine before a
// launch is ever built; `plan_grid` rejects it again here.
//
//
// WHY PACKED u32 WORDS AND NOT A TEXTURE?
// ───────────────────────────────────────
// WGSL storage buffers have no 8-bit element type. Each row is padded to a
// multiple of 4 bytes (`row_pitch`) and stored as `array<u32>`, four pixels
// per word. Every invocation writes whole words of a single row, so writes
// never race even though pixels are bytes. The padding is stripped again in
// `stage_out`, which returns a dense `width * height` buffer.
//
//
// STAGING LIFECYCLE
// ─────────────────
//   stage_in   source words uploaded, destination allocated (zeroed by wgpu)
//   dispatch   one compute pass; blocks on `Maintain::Wait`
//   stage_out  copy to a MAP_READ buffer, map, unpack, drop all buffers
//
// Out-of-order calls return `StagingOrder`. Validation errors raised by
// wgpu inside a step are captured with an error scope and surfaced as
// `DeviceUnavailable` instead of reaching the uncaptured-error panic hook.

use wgpu::util::DeviceExt;

use crate::error::{Result, SobelError};
use crate::gpu::device::{GpuDevice, WorkgroupSize};
use crate::kernel::NumericPolicy;
use crate::offload::{DeviceStager, Launch};
use crate::partition::PartitionStrategy;
use crate::raster::RasterView;

/// Team count for `DynamicRows` when the launch leaves it to the device.
pub const DEFAULT_TEAMS: u32 = 1024;

// ---------------------------------------------------------------------------
// GPU-side params (must match `Params` in sobel_x.wgsl)
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
struct SobelParams {
    width:       u32,
    height:      u32,
    pitch_words: u32,
    policy:      u32,
    num_teams:   u32,
    _pad:        [u32; 3],
}

// ---------------------------------------------------------------------------
// Layout helpers (pure, no GPU needed)
// ---------------------------------------------------------------------------

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(5, 4)   = 8
///   align_to(8, 4)   = 8
///   align_to(100, 256) = 256
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Bytes per device row for a raster `width` pixels wide.
#[inline]
pub(crate) fn row_pitch(width: u32) -> u32 {
    align_to(width, 4)
}

/// Copy `src` into a zero-padded buffer with `pitch` bytes per row.
pub(crate) fn pack_rows(src: RasterView<'_>, pitch: usize) -> Vec<u8> {
    let width = src.width();
    let mut packed = vec![0u8; pitch * src.height()];
    for (y, line) in packed.chunks_exact_mut(pitch).enumerate() {
        line[..width].copy_from_slice(src.row(y));
    }
    packed
}

/// Inverse of `pack_rows`: strip the per-row padding.
pub(crate) fn unpack_rows(padded: &[u8], width: usize, height: usize, pitch: usize) -> Vec<u8> {
    let mut dense = vec![0u8; width * height];
    for (line, src) in dense.chunks_exact_mut(width).zip(padded.chunks_exact(pitch)) {
        line.copy_from_slice(&src[..width]);
    }
    dense
}

/// Entry point and workgroup counts for one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Grid {
    pub entry:      &'static str,
    pub workgroups: [u32; 3],
    pub num_teams:  u32,
}

/// Work out the dispatch for `strategy` over `rows` valid rows of
/// `pitch_words` words each.
pub(crate) fn plan_grid(
    strategy:    PartitionStrategy,
    rows:        u32,
    pitch_words: u32,
    wg:          WorkgroupSize,
    teams:       u32,
) -> Result<Grid> {
    let grid = match strategy {
        PartitionStrategy::Sequential => {
            return Err(SobelError::UnsupportedPlan(
                "sequential strategy has no device kernel".into(),
            ))
        }
        PartitionStrategy::StaticRows => Grid {
            entry:      "rows_static",
            workgroups: [rows.div_ceil(wg.total()), 1, 1],
            num_teams:  0,
        },
        PartitionStrategy::DynamicRows => {
            let requested = if teams == 0 { DEFAULT_TEAMS } else { teams };
            let num_teams = requested.min(rows).max(1);
            Grid { entry: "rows_teams", workgroups: [num_teams, 1, 1], num_teams }
        }
        PartitionStrategy::NestedRowCol => Grid {
            entry:      "nested",
            workgroups: [pitch_words.div_ceil(wg.x), rows.div_ceil(wg.y), 1],
            num_teams:  0,
        },
    };
    Ok(grid)
}

// Capacity failures below are `DeviceUnavailable`: the plan is valid, this
// device just cannot hold or launch it, so a host fallback may take over.

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| SobelError::device(format!("{what} {value} does not fit the device")))
}

fn check_buffer_capacity(width: u32, height: u32, bytes: u64, limits: &wgpu::Limits) -> Result<()> {
    let max = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    if bytes > max {
        return Err(SobelError::device(format!(
            "{width}×{height} raster needs {bytes} bytes, device binding limit is {max}"
        )));
    }
    Ok(())
}

fn check_grid_capacity(grid: &Grid, strategy: PartitionStrategy, limits: &wgpu::Limits) -> Result<()> {
    let max_groups = limits.max_compute_workgroups_per_dimension;
    if grid.workgroups.iter().any(|&n| n > max_groups) {
        return Err(SobelError::device(format!(
            "{strategy} needs {:?} workgroups, device allows {max_groups} per dimension",
            grid.workgroups
        )));
    }
    Ok(())
}

fn policy_tag(policy: NumericPolicy) -> u32 {
    policy.shader_tag()
}

// ---------------------------------------------------------------------------
// WgpuStager
// ---------------------------------------------------------------------------

struct Staged {
    src:        wgpu::Buffer,
    dst:        wgpu::Buffer,
    width:      u32,
    height:     u32,
    pitch:      u32,
    bytes:      u64,
    dispatched: bool,
}

/// Device backend over a wgpu adapter.
///
/// Create once (shader compilation happens in the constructor) and attach
/// it to an engine; each run stages its own buffers.
pub struct WgpuStager {
    gpu:         GpuDevice,
    bgl:         wgpu::BindGroupLayout,
    rows_static: wgpu::ComputePipeline,
    rows_teams:  wgpu::ComputePipeline,
    nested:      wgpu::ComputePipeline,
    staged:      Option<Staged>,
}

impl WgpuStager {
    /// Open the best available adapter and compile the kernels.
    pub fn new() -> Result<Self> {
        Self::from_device(GpuDevice::new()?)
    }

    /// Compile the kernels for an already opened device.
    pub fn from_device(gpu: GpuDevice) -> Result<Self> {
        let shader_src = gpu.workgroup_size.specialise(include_str!("../shaders/sobel_x.wgsl"));

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label:  Some("sobel_x.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sobel BGL"),
            entries: &[
                // 0 — source words
                storage(0, true),
                // 1 — destination words
                storage(1, false),
                // 2 — params uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label:                Some("sobel pipeline layout"),
            bind_group_layouts:   &[&bgl],
            push_constant_ranges: &[],
        });

        let make = |entry: &str| {
            gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label:               Some(entry),
                layout:              Some(&layout),
                module:              &shader,
                entry_point:         entry,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache:               None,
            })
        };
        let rows_static = make("rows_static");
        let rows_teams = make("rows_teams");
        let nested = make("nested");

        if let Some(e) = pollster::block_on(gpu.device.pop_error_scope()) {
            return Err(SobelError::device(format!("kernel compilation failed: {e}")));
        }

        Ok(WgpuStager { gpu, bgl, rows_static, rows_teams, nested, staged: None })
    }

    pub fn device(&self) -> &GpuDevice {
        &self.gpu
    }

    fn pipeline(&self, entry: &str) -> &wgpu::ComputePipeline {
        match entry {
            "rows_static" => &self.rows_static,
            "rows_teams" => &self.rows_teams,
            _ => &self.nested,
        }
    }
}

impl DeviceStager for WgpuStager {
    fn describe(&self) -> String {
        self.gpu.adapter_info.to_string()
    }

    fn stage_in(&mut self, src: RasterView<'_>) -> Result<()> {
        if self.staged.is_some() {
            return Err(SobelError::StagingOrder("stage_in while a raster is already staged"));
        }

        let width = to_u32(src.width(), "width")?;
        let height = to_u32(src.height(), "height")?;
        let pitch = row_pitch(width);
        let bytes = pitch as u64 * height as u64;

        check_buffer_capacity(width, height, bytes, &self.gpu.device.limits())?;

        let packed = pack_rows(src, pitch as usize);

        self.gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let src_buf = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label:    Some("sobel src"),
            contents: &packed,
            usage:    wgpu::BufferUsages::STORAGE,
        });
        let dst_buf = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label:              Some("sobel dst"),
            size:               bytes,
            usage:              wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        if let Some(e) = pollster::block_on(self.gpu.device.pop_error_scope()) {
            return Err(SobelError::device(format!("device allocation failed: {e}")));
        }

        log::debug!("staged {width}×{height} (pitch {pitch}, {bytes} bytes) on {}", self.gpu.adapter_info);
        self.staged = Some(Staged {
            src: src_buf,
            dst: dst_buf,
            width,
            height,
            pitch,
            bytes,
            dispatched: false,
        });
        Ok(())
    }

    fn dispatch(&mut self, launch: &Launch) -> Result<()> {
        let staged = self
            .staged
            .as_ref()
            .ok_or(SobelError::StagingOrder("dispatch before stage_in"))?;

        let rows = staged.height - 2;
        let pitch_words = staged.pitch / 4;
        let grid = plan_grid(launch.strategy, rows, pitch_words, self.gpu.workgroup_size, launch.teams)?;

        check_grid_capacity(&grid, launch.strategy, &self.gpu.device.limits())?;

        let params = SobelParams {
            width:       staged.width,
            height:      staged.height,
            pitch_words,
            policy:      policy_tag(launch.policy),
            num_teams:   grid.num_teams,
            _pad:        [0; 3],
        };

        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label:    Some("sobel params"),
            contents: bytemuck::bytes_of(&params),
            usage:    wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label:   Some("sobel bind group"),
            layout:  &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: staged.src.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: staged.dst.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: params_buf.as_entire_binding() },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("sobel dispatch"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label:            Some(grid.entry),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.pipeline(grid.entry));
            pass.set_bind_group(0, &bind_group, &[]);
            let [x, y, z] = grid.workgroups;
            pass.dispatch_workgroups(x, y, z);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        device.poll(wgpu::Maintain::Wait);

        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(SobelError::device(format!("dispatch failed: {e}")));
        }

        log::debug!("{}: {:?} workgroups, {} teams", grid.entry, grid.workgroups, grid.num_teams);
        if let Some(staged) = self.staged.as_mut() {
            staged.dispatched = true;
        }
        Ok(())
    }

    fn stage_out(&mut self) -> Result<Vec<u8>> {
        let staged = match self.staged.take() {
            Some(s) if s.dispatched => s,
            Some(s) => {
                self.staged = Some(s);
                return Err(SobelError::StagingOrder("stage_out before dispatch"));
            }
            None => return Err(SobelError::StagingOrder("stage_out before stage_in")),
        };

        let device = &self.gpu.device;
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label:              Some("sobel readback"),
            size:               staged.bytes,
            usage:              wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("sobel readback"),
        });
        encoder.copy_buffer_to_buffer(&staged.dst, 0, &readback, 0, staged.bytes);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            // Receiver outlives the poll below; a failed send means it is gone anyway.
            let _ = tx.send(r);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| SobelError::device("readback map callback never fired"))?
            .map_err(|e| SobelError::device(format!("readback map failed: {e}")))?;

        let mapped = slice.get_mapped_range();
        let dense = unpack_rows(
            &mapped,
            staged.width as usize,
            staged.height as usize,
            staged.pitch as usize,
        );
        drop(mapped);
        readback.unmap();
        // `staged` drops here, releasing both device buffers.
        Ok(dense)
    }

    fn release(&mut self) {
        self.staged = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
