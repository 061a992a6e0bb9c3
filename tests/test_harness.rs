// tests/test_harness.rs — End-to-end: image file in, image file out.
//
// PNG is used for the round trips so the comparison is lossless.

use std::path::PathBuf;

use sobel_offload::config::HarnessConfig;
use sobel_offload::engine::{Backend, FallbackPolicy};
use sobel_offload::harness::{compare_strategies, run_harness};
use sobel_offload::io::{load_grayscale, save_grayscale};
use sobel_offload::{
    Engine, EngineConfig, ExecutionPlan, NumericPolicy, PartitionStrategy, Raster, SobelError,
};

fn ramp(w: usize, h: usize) -> Raster {
    Raster::from_fn(w, h, |x, y| (x * x / 3 + y * 5) as u8)
}

#[test]
fn harness_writes_expected_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("ramp.png");
    let src = ramp(40, 30);
    save_grayscale(&input, &src).unwrap();

    let cfg = HarnessConfig {
        input: Some(input.clone()),
        plan: ExecutionPlan::host(PartitionStrategy::DynamicRows, NumericPolicy::Widened),
        engine: EngineConfig { workers: 2, ..Default::default() },
        ..Default::default()
    };
    let summary = run_harness(&cfg).unwrap();
    assert_eq!(summary.output, dir.path().join("ramp_sobel.png"));
    assert_eq!((summary.width, summary.height), (40, 30));
    assert_eq!(summary.reports.len(), 1);

    let written = load_grayscale(&summary.output).unwrap();
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    let expected = engine.run(src.view(), &ExecutionPlan::host(PartitionStrategy::Sequential, NumericPolicy::Widened)).unwrap();
    assert_eq!(written, expected.raster);
}

#[test]
fn harness_uses_benchmark_naming() {
    let dir = tempfile::tempdir().unwrap();
    save_grayscale(dir.path().join("horses_64.jpg"), &ramp(64, 64)).unwrap();

    let cfg = HarnessConfig {
        image_dir: dir.path().to_path_buf(),
        image_dimension: "64".into(),
        ..Default::default()
    };
    let summary = run_harness(&cfg).unwrap();
    assert_eq!(summary.input, dir.path().join("horses_64.jpg"));
    assert_eq!(summary.output, dir.path().join("horses_64_sobel.jpg"));
    assert!(summary.output.exists());
}

#[test]
fn harness_compare_reports_every_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    save_grayscale(&input, &ramp(33, 17)).unwrap();

    let cfg = HarnessConfig {
        input: Some(input),
        output: Some(dir.path().join("out.png")),
        compare: true,
        ..Default::default()
    };
    let summary = run_harness(&cfg).unwrap();
    let strategies: Vec<_> = summary.reports.iter().map(|r| r.plan.strategy).collect();
    assert_eq!(strategies, PartitionStrategy::ALL.to_vec());
    assert_eq!(summary.primary(&cfg.plan).unwrap().plan.strategy, PartitionStrategy::StaticRows);
}

#[test]
fn harness_missing_input_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = HarnessConfig {
        input: Some(dir.path().join("absent.jpg")),
        ..Default::default()
    };
    let err = run_harness(&cfg).unwrap_err();
    assert!(matches!(err, SobelError::ImageLoad { .. }));
    assert!(!dir.path().join("absent_sobel.jpg").exists());
}

#[test]
fn harness_device_fallback_without_adapter_still_writes() {
    // Whether or not an adapter exists, host fallback guarantees an output.
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    let src = ramp(20, 20);
    save_grayscale(&input, &src).unwrap();

    let cfg = HarnessConfig {
        input: Some(input),
        plan: ExecutionPlan::device(PartitionStrategy::StaticRows, NumericPolicy::Wrap),
        engine: EngineConfig { fallback: FallbackPolicy::Host, ..Default::default() },
        ..Default::default()
    };
    let summary = run_harness(&cfg).unwrap();
    let report = summary.primary(&cfg.plan).unwrap();
    assert_eq!(report.plan.backend, Backend::Device);

    let written = load_grayscale(&summary.output).unwrap();
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    let expected = engine.run(src.view(), &ExecutionPlan::default()).unwrap();
    assert_eq!(written, expected.raster);
}

#[test]
fn compare_strategies_on_host() {
    let src = ramp(25, 25);
    let mut engine = Engine::new(EngineConfig { workers: 2, ..Default::default() }).unwrap();
    let cmp = compare_strategies(&mut engine, src.view(), Backend::Host, NumericPolicy::Wrap).unwrap();
    assert_eq!(cmp.reports.len(), PartitionStrategy::ALL.len());
    let single = engine.run(src.view(), &ExecutionPlan::default()).unwrap();
    assert_eq!(cmp.raster, single.raster);
}

#[test]
fn config_paths_are_plain_paths() {
    let cfg = HarnessConfig::default();
    assert_eq!(cfg.input_path(), PathBuf::from("../images/horses_4500.jpg"));
}
