// engine/mod.rs — Execution engine: plan → backend → output raster.
//
// `Engine::run` is the single entry point the harness calls:
//
//   RasterView ──► ValidRegion::of (InvalidDimensions guard)
//              ──► allocate destination (MarginPolicy)
//              ──► host:   HostExecutor::execute(strategy, policy)
//                  device: offload(stager) → scatter_valid
//                          └─ DeviceUnavailable + FallbackPolicy::Host → host
//              ──► RunOutput { raster, report }
//
// The engine holds the worker pool and (optionally) one offload device for
// its whole lifetime. Runs take `&mut self`: the device stager is owned
// exclusively by whichever run is in flight.

mod host;

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::{Result, SobelError};
use crate::kernel::NumericPolicy;
use crate::offload::{offload, scatter_valid, DeviceStager, Launch};
use crate::partition::{PartitionParams, PartitionStrategy, ValidRegion};
use crate::raster::{Raster, RasterView};

use self::host::HostExecutor;

// ---------------------------------------------------------------------------
// Plan and configuration
// ---------------------------------------------------------------------------

/// Where the kernel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    /// Worker threads on host memory.
    #[default]
    Host,
    /// An offload device reached through a `DeviceStager`.
    Device,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Host => write!(f, "host"),
            Backend::Device => write!(f, "device"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" | "cpu" => Ok(Backend::Host),
            "device" | "gpu" => Ok(Backend::Device),
            other => Err(format!("unknown backend '{other}' (expected host|device)")),
        }
    }
}

/// What to do when the device backend is requested but unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Fail the run with `DeviceUnavailable`.
    #[default]
    Abort,
    /// Run the same plan on the host backend instead.
    Host,
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackPolicy::Abort => write!(f, "abort"),
            FallbackPolicy::Host => write!(f, "host"),
        }
    }
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" | "fail" => Ok(FallbackPolicy::Abort),
            "host" | "fallback" => Ok(FallbackPolicy::Host),
            other => Err(format!("unknown fallback policy '{other}' (expected abort|host)")),
        }
    }
}

/// Contents of the last two rows and columns of a freshly allocated output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarginPolicy {
    /// Margin keeps the source samples (what an in-place pass leaves behind).
    #[default]
    CopySource,
    /// Margin is zero.
    Zeroed,
}

impl fmt::Display for MarginPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarginPolicy::CopySource => write!(f, "copy"),
            MarginPolicy::Zeroed => write!(f, "zero"),
        }
    }
}

impl FromStr for MarginPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copy" | "source" => Ok(MarginPolicy::CopySource),
            "zero" | "zeroed" => Ok(MarginPolicy::Zeroed),
            other => Err(format!("unknown margin policy '{other}' (expected copy|zero)")),
        }
    }
}

/// Strategy, backend and numeric policy for one run. Fixed before the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionPlan {
    pub strategy: PartitionStrategy,
    pub backend: Backend,
    pub policy: NumericPolicy,
}

impl ExecutionPlan {
    pub fn new(strategy: PartitionStrategy, backend: Backend, policy: NumericPolicy) -> Self {
        ExecutionPlan { strategy, backend, policy }
    }

    pub fn host(strategy: PartitionStrategy, policy: NumericPolicy) -> Self {
        Self::new(strategy, Backend::Host, policy)
    }

    pub fn device(strategy: PartitionStrategy, policy: NumericPolicy) -> Self {
        Self::new(strategy, Backend::Device, policy)
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.backend, self.strategy, self.policy)
    }
}

/// Engine-wide tunables. Chosen once, shared by every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Host worker threads (0 = one per logical core).
    pub workers: usize,
    /// Outer groups for host `NestedRowCol` (0 = one per worker) and device
    /// `DynamicRows` (0 = device default).
    pub teams: usize,
    /// Rows claimed per request under `DynamicRows`.
    pub row_grain: usize,
    /// Columns per inner task under `NestedRowCol`.
    pub column_tile: usize,
    pub fallback: FallbackPolicy,
    pub margin: MarginPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            workers: 0,
            teams: 0,
            row_grain: 1,
            column_tile: 256,
            fallback: FallbackPolicy::Abort,
            margin: MarginPolicy::CopySource,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Timing and provenance of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    /// The plan as requested.
    pub plan: ExecutionPlan,
    /// The backend that actually evaluated the kernel.
    pub executed_on: Backend,
    /// Wall-clock time of the whole call, staging included.
    pub elapsed: Duration,
    /// Time spent evaluating the kernel only (device: the blocking dispatch).
    pub compute_elapsed: Duration,
}

impl RunReport {
    /// True when the device was requested but the host did the work.
    pub fn fell_back(&self) -> bool {
        self.plan.backend == Backend::Device && self.executed_on == Backend::Host
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e3
    }

    pub fn compute_ms(&self) -> f64 {
        self.compute_elapsed.as_secs_f64() * 1e3
    }
}

/// The output raster together with its report.
#[derive(Debug)]
pub struct RunOutput {
    pub raster: Raster,
    pub report: RunReport,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

enum DeviceSlot {
    Detached,
    Attached(Box<dyn DeviceStager>),
    Unavailable(String),
}

/// Drives a partition strategy over a raster on the host or an offload device.
pub struct Engine {
    config: EngineConfig,
    host: HostExecutor,
    params: PartitionParams,
    device: DeviceSlot,
}

impl Engine {
    /// Build an engine and its host worker pool. No device is attached.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let host = HostExecutor::new(config.workers)?;
        let workers = host.workers();
        let params = PartitionParams {
            workers,
            teams: if config.teams == 0 { workers } else { config.teams },
            row_grain: config.row_grain.max(1),
            column_tile: config.column_tile.max(1),
        };
        log::debug!("engine: {workers} host workers, {params:?}");
        Ok(Engine {
            config,
            host,
            params,
            device: DeviceSlot::Detached,
        })
    }

    /// Attach an offload device, replacing any previous one.
    pub fn attach_device(&mut self, stager: Box<dyn DeviceStager>) {
        log::info!("offload device attached: {}", stager.describe());
        self.device = DeviceSlot::Attached(stager);
    }

    /// Builder form of [`Engine::attach_device`].
    pub fn with_device(mut self, stager: Box<dyn DeviceStager>) -> Self {
        self.attach_device(stager);
        self
    }

    /// Try to open the default wgpu adapter as the offload device.
    ///
    /// Failure is not an error here: it is remembered, and device runs then
    /// follow the configured `FallbackPolicy`.
    pub fn attach_gpu(&mut self) {
        match crate::gpu::stager::WgpuStager::new() {
            Ok(stager) => self.attach_device(Box::new(stager)),
            Err(e) => {
                log::warn!("no offload device: {e}");
                self.device = DeviceSlot::Unavailable(e.to_string());
            }
        }
    }

    /// Name of the attached device, if any.
    pub fn device_name(&self) -> Option<String> {
        match &self.device {
            DeviceSlot::Attached(s) => Some(s.describe()),
            _ => None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Effective partition tunables (zeros in the config resolved).
    pub fn partition_params(&self) -> PartitionParams {
        self.params
    }

    /// Evaluate the kernel over `src` and return a freshly allocated output.
    ///
    /// The margin of the output follows `EngineConfig::margin`.
    ///
    /// # Errors
    /// - `InvalidDimensions` if `src` is smaller than 3×3.
    /// - `UnsupportedPlan` for `Sequential` on the device backend.
    /// - `DeviceUnavailable` if the device fails and no host fallback is configured.
    pub fn run(&mut self, src: RasterView<'_>, plan: &ExecutionPlan) -> Result<RunOutput> {
        let started = Instant::now();
        let region = ValidRegion::of(src.width(), src.height())?;
        check_plan(plan)?;

        let mut raster = match self.config.margin {
            MarginPolicy::CopySource => src.to_raster(),
            MarginPolicy::Zeroed => Raster::new(src.width(), src.height()),
        };
        let report = self.execute(src, &mut raster, region, plan, started)?;
        Ok(RunOutput { raster, report })
    }

    /// Evaluate the kernel over `src` into a caller-owned destination.
    ///
    /// Only the valid region of `dst` is written; its last two rows and
    /// columns are left exactly as they were. On error nothing is written.
    pub fn run_into(
        &mut self,
        src: RasterView<'_>,
        dst: &mut Raster,
        plan: &ExecutionPlan,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let region = ValidRegion::of(src.width(), src.height())?;
        if dst.width() != src.width() || dst.height() != src.height() {
            return Err(SobelError::ShapeMismatch {
                src_width: src.width(),
                src_height: src.height(),
                dst_width: dst.width(),
                dst_height: dst.height(),
            });
        }
        check_plan(plan)?;
        self.execute(src, dst, region, plan, started)
    }

    fn execute(
        &mut self,
        src: RasterView<'_>,
        dst: &mut Raster,
        region: ValidRegion,
        plan: &ExecutionPlan,
        started: Instant,
    ) -> Result<RunReport> {
        log::debug!(
            "run {plan} on {}×{} ({} output samples)",
            src.width(),
            src.height(),
            region.len()
        );

        let (executed_on, compute_elapsed) = match plan.backend {
            Backend::Host => (Backend::Host, self.run_host(src, dst, region, plan)),
            Backend::Device => match self.run_device(src, dst, region, plan) {
                Ok(compute) => (Backend::Device, compute),
                Err(e) if e.is_device_unavailable() && self.config.fallback == FallbackPolicy::Host => {
                    log::warn!("{e}; falling back to host backend");
                    (Backend::Host, self.run_host(src, dst, region, plan))
                }
                Err(e) => return Err(e),
            },
        };

        let report = RunReport {
            plan: *plan,
            executed_on,
            elapsed: started.elapsed(),
            compute_elapsed,
        };
        log::info!(
            "{plan} executed on {executed_on} in {:.3} ms (kernel {:.3} ms)",
            report.elapsed_ms(),
            report.compute_ms()
        );
        Ok(report)
    }

    fn run_host(
        &self,
        src: RasterView<'_>,
        dst: &mut Raster,
        region: ValidRegion,
        plan: &ExecutionPlan,
    ) -> Duration {
        let started = Instant::now();
        self.host.execute(
            src,
            dst.as_mut_slice(),
            region,
            plan.strategy,
            plan.policy,
            &self.params,
        );
        started.elapsed()
    }

    fn run_device(
        &mut self,
        src: RasterView<'_>,
        dst: &mut Raster,
        region: ValidRegion,
        plan: &ExecutionPlan,
    ) -> Result<Duration> {
        let stager = match &mut self.device {
            DeviceSlot::Attached(s) => s,
            DeviceSlot::Unavailable(reason) => return Err(SobelError::device(reason.clone())),
            DeviceSlot::Detached => return Err(SobelError::device("no offload device attached")),
        };
        let launch = Launch {
            strategy: plan.strategy,
            policy: plan.policy,
            teams: u32::try_from(self.config.teams).unwrap_or(u32::MAX),
        };
        let (dense, compute) = offload(&mut **stager, src, &launch)?;
        scatter_valid(&dense, dst, region);
        Ok(compute)
    }
}

fn check_plan(plan: &ExecutionPlan) -> Result<()> {
    if plan.backend == Backend::Device && !plan.strategy.is_parallel() {
        return Err(SobelError::UnsupportedPlan(format!(
            "{} partitioning has no device mapping",
            plan.strategy
        )));
    }
    Ok(())
}
