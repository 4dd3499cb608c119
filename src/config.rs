//! Benchmark configuration
//!
//! Loaded from `facebench.toml` next to the executable. Every field has a
//! default, so a partial file (or no file at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub inference: InferenceConfig,
    pub benchmark: BenchmarkConfig,
    pub report: ReportConfig,
}

/// Asset locations, relative to the executable directory
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub reference_image: PathBuf,
    pub full_model: PathBuf,
    pub quantized_model: PathBuf,
    pub detector_model: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub device: String,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Unrecorded trials run before each backend's measured trials
    pub warmup_trials: usize,
    /// Measured trials per backend
    pub trials: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    pub wait_for_exit: bool,
    pub json_path: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            reference_image: ["Assets", "TPIIT.jpeg"].iter().collect(),
            full_model: ["onnx", "arcfaceresnet100-8.onnx"].iter().collect(),
            quantized_model: ["onnx", "arcfaceresnet100-11-int8.onnx"].iter().collect(),
            detector_model: ["onnx", "scrfd_2.5g_kps.onnx"].iter().collect(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            device: "CPU".to_string(),
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            warmup_trials: 3,
            trials: 20,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            wait_for_exit: true,
            json_path: None,
        }
    }
}

/// Absolute asset paths after joining with a base directory
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub reference_image: PathBuf,
    pub full_model: PathBuf,
    pub quantized_model: PathBuf,
    pub detector_model: PathBuf,
}

impl PathsConfig {
    /// Join every configured path onto `base`. Absolute entries are kept as-is.
    pub fn resolve(&self, base: &Path) -> ResolvedPaths {
        ResolvedPaths {
            reference_image: base.join(&self.reference_image),
            full_model: base.join(&self.full_model),
            quantized_model: base.join(&self.quantized_model),
            detector_model: base.join(&self.detector_model),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn default_file_name() -> &'static str {
        "facebench.toml"
    }
}
