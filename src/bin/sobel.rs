// sobel — apply the horizontal Sobel derivative to a grayscale image.
//
//   cargo run --release --bin sobel -- --strategy dynamic --backend device
//   cargo run --release --bin sobel -- -i frame.png --compare
//   RUST_LOG=debug cargo run --bin sobel -- --backend device --fallback host

use std::path::PathBuf;

use argh::FromArgs;

use sobel_offload::config::HarnessConfig;
use sobel_offload::engine::{Backend, EngineConfig, ExecutionPlan, FallbackPolicy, MarginPolicy};
use sobel_offload::harness::run_harness;
use sobel_offload::kernel::NumericPolicy;
use sobel_offload::partition::PartitionStrategy;

#[derive(FromArgs)]
/// Horizontal Sobel edge response on host threads or a wgpu device
struct Args {
    /// path to the input image (default: <image-dir>/horses_<dimension>.jpg)
    #[argh(option, short = 'i')]
    input: Option<PathBuf>,

    /// path to the output image (default: <input>_sobel.<ext>)
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// directory of the benchmark images (default: ../images/)
    #[argh(option)]
    image_dir: Option<PathBuf>,

    /// size tag of the benchmark image (default: 4500)
    #[argh(option, short = 'd')]
    dimension: Option<String>,

    /// partition strategy: sequential, static, dynamic, nested (default: static)
    #[argh(option, short = 's', default = "PartitionStrategy::StaticRows")]
    strategy: PartitionStrategy,

    /// backend: host, device (default: host)
    #[argh(option, short = 'b', default = "Backend::Host")]
    backend: Backend,

    /// numeric policy: wrap, widened (default: wrap)
    #[argh(option, short = 'p', default = "NumericPolicy::Wrap")]
    policy: NumericPolicy,

    /// when the device is unavailable: abort, host (default: abort)
    #[argh(option, default = "FallbackPolicy::Abort")]
    fallback: FallbackPolicy,

    /// output margin: copy, zero (default: copy)
    #[argh(option, default = "MarginPolicy::CopySource")]
    margin: MarginPolicy,

    /// host worker threads, 0 = one per core (default: 0)
    #[argh(option, short = 'w', default = "0")]
    workers: usize,

    /// worker groups for nested / device dynamic, 0 = automatic (default: 0)
    #[argh(option, default = "0")]
    teams: usize,

    /// rows claimed per request under dynamic (default: 1)
    #[argh(option, default = "1")]
    grain: usize,

    /// columns per inner task under nested (default: 256)
    #[argh(option, default = "256")]
    tile: usize,

    /// run every strategy of the backend and print a timing table
    #[argh(switch)]
    compare: bool,
}

impl Args {
    fn into_config(self) -> HarnessConfig {
        let defaults = HarnessConfig::default();
        HarnessConfig {
            image_dir: self.image_dir.unwrap_or(defaults.image_dir),
            image_stem: defaults.image_stem,
            image_dimension: self.dimension.unwrap_or(defaults.image_dimension),
            input: self.input,
            output: self.output,
            plan: ExecutionPlan::new(self.strategy, self.backend, self.policy),
            engine: EngineConfig {
                workers: self.workers,
                teams: self.teams,
                row_grain: self.grain,
                column_tile: self.tile,
                fallback: self.fallback,
                margin: self.margin,
            },
            compare: self.compare,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();
    let cfg = args.into_config();
    let summary = run_harness(&cfg)?;

    if let Some(name) = &summary.device {
        println!("Device: {name}");
    }

    if cfg.compare {
        println!("{:<12} {:<8} {:>14} {:>14}", "strategy", "ran on", "kernel (ms)", "total (ms)");
        for r in &summary.reports {
            println!(
                "{:<12} {:<8} {:>14.6} {:>14.6}",
                r.plan.strategy.to_string(),
                r.executed_on.to_string(),
                r.compute_ms(),
                r.elapsed_ms()
            );
        }
    } else if let Some(r) = summary.primary(&cfg.plan) {
        println!("Running on {}", r.executed_on);
        println!("\n\nExec time: {:.6} ms", r.compute_ms());
    }

    println!("wrote {} ({}×{})", summary.output.display(), summary.width, summary.height);
    Ok(())
}
