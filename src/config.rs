// config.rs — Harness configuration.
//
// Collects what the command-line harness needs for one invocation: where the
// input comes from, where the output goes, the execution plan and the engine
// tunables. The engine itself never sees a path.
//
// Default naming follows the benchmark image set layout:
//
//   <image_dir><stem>_<dimension>.jpg          input
//   <image_dir><stem>_<dimension>_sobel.jpg    output
//
// `input` / `output` override either side. With only `input` set, the output
// lands next to it as `<input stem>_sobel.<input ext>`.

use std::path::{Path, PathBuf};

use crate::engine::{EngineConfig, ExecutionPlan};

pub const DEFAULT_IMAGE_DIR: &str = "../images/";
pub const DEFAULT_IMAGE_STEM: &str = "horses";
pub const DEFAULT_IMAGE_DIMENSION: &str = "4500";

/// Everything one harness invocation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub image_dir: PathBuf,
    pub image_stem: String,
    /// Size tag of the benchmark image, e.g. `"4500"` for `horses_4500.jpg`.
    pub image_dimension: String,
    /// Explicit input path; overrides the directory/stem/dimension naming.
    pub input: Option<PathBuf>,
    /// Explicit output path.
    pub output: Option<PathBuf>,
    pub plan: ExecutionPlan,
    pub engine: EngineConfig,
    /// Run every strategy valid for the backend instead of just `plan.strategy`.
    pub compare: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            image_stem: DEFAULT_IMAGE_STEM.to_string(),
            image_dimension: DEFAULT_IMAGE_DIMENSION.to_string(),
            input: None,
            output: None,
            plan: ExecutionPlan::default(),
            engine: EngineConfig::default(),
            compare: false,
        }
    }
}

impl HarnessConfig {
    /// Path the source raster is decoded from.
    pub fn input_path(&self) -> PathBuf {
        match &self.input {
            Some(p) => p.clone(),
            None => self
                .image_dir
                .join(format!("{}_{}.jpg", self.image_stem, self.image_dimension)),
        }
    }

    /// Path the output raster is encoded to.
    pub fn output_path(&self) -> PathBuf {
        if let Some(p) = &self.output {
            return p.clone();
        }
        match &self.input {
            Some(input) => sibling_with_suffix(input, "_sobel"),
            None => self
                .image_dir
                .join(format!("{}_{}_sobel.jpg", self.image_stem, self.image_dimension)),
        }
    }
}

/// `dir/name.ext` → `dir/name<suffix>.ext` (`.jpg` when there is no extension).
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "jpg".to_string());
    path.with_file_name(format!("{stem}{suffix}.{ext}"))
}
