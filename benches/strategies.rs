// benches/strategies.rs -- Host partition strategies side by side.
//
// Synthetic benchmarks (always run):
//   cargo bench --bench strategies
//
// With a real image (any format the `image` crate decodes):
//   SOBEL_IMAGE=../images/horses_4500.jpg cargo bench --bench strategies

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use sobel_offload::io::load_grayscale;
use sobel_offload::{Engine, EngineConfig, ExecutionPlan, NumericPolicy, PartitionStrategy, Raster};

use std::env;

// ============================================================
// Helpers
// ============================================================

/// Gradients plus bright rectangles, so the kernel sees both flat and
/// saturating windows.
fn make_scene(w: usize, h: usize) -> Raster {
    let mut img = Raster::from_fn(w, h, |x, y| ((x * 200 / w) + (y * 55 / h)) as u8);
    for rect in 0..6 {
        let rx = (50 + rect * 100) % w;
        let ry = (40 + (rect % 3) * 120) % h;
        let bright = 180u8.wrapping_add(rect as u8 * 10);
        for y in ry..(ry + 60).min(h) {
            for x in rx..(rx + 80).min(w) {
                img.set(x, y, bright);
            }
        }
    }
    img
}

// ============================================================
// Strategies (synthetic)
// ============================================================

fn bench_strategies(c: &mut Criterion) {
    let mut engine = Engine::new(EngineConfig::default()).expect("worker pool");

    for (w, h) in [(752, 480), (1920, 1080)] {
        let img = make_scene(w, h);
        let mut group = c.benchmark_group(format!("sobel_{w}x{h}"));
        group.throughput(Throughput::Elements((w * h) as u64));
        for strategy in PartitionStrategy::ALL {
            let plan = ExecutionPlan::host(strategy, NumericPolicy::Wrap);
            group.bench_function(BenchmarkId::new("host", strategy), |b| {
                b.iter(|| engine.run(img.view(), &plan).expect("run"))
            });
        }
        group.finish();
    }
}

fn bench_policies(c: &mut Criterion) {
    let mut engine = Engine::new(EngineConfig::default()).expect("worker pool");
    let img = make_scene(1920, 1080);

    let mut group = c.benchmark_group("policy_1920x1080");
    for policy in NumericPolicy::ALL {
        let plan = ExecutionPlan::host(PartitionStrategy::StaticRows, policy);
        group.bench_function(BenchmarkId::new("static", policy), |b| {
            b.iter(|| engine.run(img.view(), &plan).expect("run"))
        });
    }
    group.finish();
}

fn bench_row_grain(c: &mut Criterion) {
    let img = make_scene(1920, 1080);

    let mut group = c.benchmark_group("dynamic_grain_1920x1080");
    for grain in [1, 8, 64] {
        let mut engine = Engine::new(EngineConfig { row_grain: grain, ..Default::default() })
            .expect("worker pool");
        let plan = ExecutionPlan::host(PartitionStrategy::DynamicRows, NumericPolicy::Wrap);
        group.bench_function(BenchmarkId::from_parameter(grain), |b| {
            b.iter(|| engine.run(img.view(), &plan).expect("run"))
        });
    }
    group.finish();
}

// ============================================================
// Real image (opt-in)
// ============================================================

fn bench_image(c: &mut Criterion) {
    let path = match env::var("SOBEL_IMAGE") {
        Ok(p) => p,
        Err(_) => {
            eprintln!("SOBEL_IMAGE not set, skipping real-image benchmark");
            return;
        }
    };
    let img = match load_grayscale(&path) {
        Ok(img) => img,
        Err(e) => {
            eprintln!("{e}, skipping real-image benchmark");
            return;
        }
    };
    let mut engine = Engine::new(EngineConfig::default()).expect("worker pool");

    let mut group = c.benchmark_group(format!("image_{}x{}", img.width(), img.height()));
    group.sample_size(10);
    for strategy in PartitionStrategy::ALL {
        let plan = ExecutionPlan::host(strategy, NumericPolicy::Wrap);
        group.bench_function(BenchmarkId::new("host", strategy), |b| {
            b.iter(|| engine.run(img.view(), &plan).expect("run"))
        });
    }
    group.finish();
}

// ============================================================
// Register
// ============================================================

criterion_group!(benches, bench_strategies, bench_policies, bench_row_grain, bench_image);
criterion_main!(benches);
