// harness.rs — Load → run → save driver behind the `sobel` binary.
//
//   HarnessConfig ──► load_grayscale(input_path)
//                 ──► Engine::new(engine)  (+ attach_gpu for device plans)
//                 ──► run(plan)  or  compare_strategies(backend, policy)
//                 ──► save_grayscale(output_path)
//                 ──► HarnessSummary
//
// Nothing is printed here; the binary formats the summary.

use std::path::PathBuf;

use crate::config::HarnessConfig;
use crate::engine::{Backend, Engine, ExecutionPlan, RunReport};
use crate::error::{Result, SobelError};
use crate::io::{load_grayscale, save_grayscale};
use crate::kernel::NumericPolicy;
use crate::partition::PartitionStrategy;
use crate::raster::{Raster, RasterView};

/// Outcome of one harness invocation.
#[derive(Debug, Clone)]
pub struct HarnessSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub width: usize,
    pub height: usize,
    /// Name of the offload device, when one was opened.
    pub device: Option<String>,
    /// One report per executed strategy, in execution order.
    pub reports: Vec<RunReport>,
}

impl HarnessSummary {
    /// Report of the strategy named in the plan (the first one otherwise).
    pub fn primary(&self, plan: &ExecutionPlan) -> Option<&RunReport> {
        self.reports
            .iter()
            .find(|r| r.plan.strategy == plan.strategy)
            .or_else(|| self.reports.first())
    }
}

/// Output of [`compare_strategies`].
#[derive(Debug)]
pub struct Comparison {
    /// The common output of every strategy.
    pub raster: Raster,
    pub reports: Vec<RunReport>,
}

/// Strategies that have a mapping on `backend`.
pub fn strategies_for(backend: Backend) -> &'static [PartitionStrategy] {
    match backend {
        Backend::Host => &PartitionStrategy::ALL,
        Backend::Device => &PartitionStrategy::PARALLEL,
    }
}

/// Run every strategy valid for `backend` over `src` and check that all of
/// them produce the same bytes.
///
/// # Errors
/// `OutputMismatch` naming the first strategy whose output differs from
/// the first strategy's, or any error of `Engine::run`.
pub fn compare_strategies(
    engine: &mut Engine,
    src: RasterView<'_>,
    backend: Backend,
    policy: NumericPolicy,
) -> Result<Comparison> {
    let mut reference: Option<Raster> = None;
    let mut reports = Vec::new();

    for &strategy in strategies_for(backend) {
        let out = engine.run(src, &ExecutionPlan::new(strategy, backend, policy))?;
        match &reference {
            Some(first) if *first != out.raster => {
                return Err(SobelError::OutputMismatch { strategy: strategy.to_string() });
            }
            Some(_) => {}
            None => reference = Some(out.raster),
        }
        reports.push(out.report);
    }

    // strategies_for never returns an empty list.
    let raster = reference.unwrap_or_else(|| src.to_raster());
    Ok(Comparison { raster, reports })
}

/// Execute one harness invocation end to end.
pub fn run_harness(cfg: &HarnessConfig) -> Result<HarnessSummary> {
    let input = cfg.input_path();
    let output = cfg.output_path();

    let src = load_grayscale(&input)?;
    log::info!("input {} ({}×{})", input.display(), src.width(), src.height());

    let mut engine = Engine::new(cfg.engine)?;
    if cfg.plan.backend == Backend::Device {
        engine.attach_gpu();
    }

    let (raster, reports) = if cfg.compare {
        let cmp = compare_strategies(&mut engine, src.view(), cfg.plan.backend, cfg.plan.policy)?;
        (cmp.raster, cmp.reports)
    } else {
        let out = engine.run(src.view(), &cfg.plan)?;
        (out.raster, vec![out.report])
    };

    save_grayscale(&output, &raster)?;
    log::info!("output {}", output.display());

    Ok(HarnessSummary {
        input,
        output,
        width: src.width(),
        height: src.height(),
        device: engine.device_name(),
        reports,
    })
}
