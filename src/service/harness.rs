//! Benchmark harness
//!
//! Explicit setup phase producing owned, immutable fixtures and loaded
//! backends, followed by the measured run.

use std::path::Path;
use std::time::Instant;

use tracing::info;

use crate::bench::agreement::{embed_all, embedding_agreement};
use crate::bench::backend::{check_dimensions, ensure_model_file, EmbeddingBackend};
use crate::bench::fixture::{build_fixtures, Fixtures};
use crate::bench::report::Report;
use crate::bench::runner::BenchmarkRunner;
use crate::bench::sink::Sink;
use crate::config::{BenchmarkConfig, Config};
use crate::engine::{ArcFaceEmbedder, FaceDetector, InferenceRuntime};
use crate::error::{BenchError, SetupStep};

pub const FULL_BACKEND: &str = "Full precision (FP32)";
pub const QUANTIZED_BACKEND: &str = "INT8 quantized";

pub struct BenchHarness<B> {
    fixtures: Fixtures,
    backends: Vec<B>,
    runner: BenchmarkRunner,
    embedding_dim: usize,
}

impl<B: EmbeddingBackend> BenchHarness<B> {
    /// Assemble a harness from prepared parts. Backends must agree on
    /// embedding length.
    pub fn new(
        fixtures: Fixtures,
        backends: Vec<B>,
        config: &BenchmarkConfig,
    ) -> Result<Self, BenchError> {
        let embedding_dim = check_dimensions(&backends)?;
        Ok(Self {
            fixtures,
            backends,
            runner: BenchmarkRunner::new(config),
            embedding_dim,
        })
    }

    pub fn fixtures(&self) -> &Fixtures {
        &self.fixtures
    }

    pub fn backends(&self) -> &[B] {
        &self.backends
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// One untimed pass of every backend over every fixture. Fails on the
    /// first backend error.
    pub fn verify(&self) -> Result<(), BenchError> {
        for backend in &self.backends {
            embed_all(backend, &self.fixtures)?;
        }
        Ok(())
    }

    /// Measure every backend, then compare their embeddings
    pub fn run(&self) -> Result<Report, BenchError> {
        let start = Instant::now();
        let mut sink = Sink::new();

        let mut summaries = self.runner.run(&self.fixtures, &self.backends, &mut sink)?;

        let agreement = embedding_agreement(&self.fixtures, &self.backends)?;
        for (summary, value) in summaries.iter_mut().zip(agreement) {
            summary.agreement = value;
        }

        info!(
            "Benchmark finished in {:?}, {} embeddings consumed",
            start.elapsed(),
            sink.consumed()
        );

        Ok(Report::new(
            self.fixtures.len(),
            self.runner.warmup_trials(),
            self.runner.trials(),
            sink.consumed(),
            summaries,
        ))
    }
}

impl BenchHarness<ArcFaceEmbedder> {
    /// Load everything from disk. Paths in `config` are relative to `base_dir`.
    pub fn setup(config: &Config, base_dir: &Path) -> Result<Self, BenchError> {
        let paths = config.paths.resolve(base_dir);
        let models = [
            (FULL_BACKEND, paths.full_model.as_path()),
            (QUANTIZED_BACKEND, paths.quantized_model.as_path()),
        ];

        for (name, path) in models {
            ensure_model_file(name, path)?;
        }
        if !paths.detector_model.is_file() {
            return Err(BenchError::setup(
                SetupStep::LoadDetector,
                anyhow::anyhow!("model file not found: {}", paths.detector_model.display()),
            ));
        }

        let mut runtime = InferenceRuntime::new(&config.inference.device)
            .map_err(|e| BenchError::setup(SetupStep::InitRuntime, e))?;
        info!("Inference device: {}", runtime.device());

        let fixtures = {
            let detector = FaceDetector::load(
                &mut runtime,
                &paths.detector_model,
                config.inference.confidence_threshold,
                config.inference.nms_threshold,
            )
            .map_err(|e| BenchError::setup(SetupStep::LoadDetector, e))?;
            info!("Detector confidence threshold: {}", detector.confidence_threshold());

            build_fixtures(&paths.reference_image, &detector)?
        };

        let backends = models
            .iter()
            .map(|&(name, path)| {
                let mut backend = ArcFaceEmbedder::load(&mut runtime, name, path)
                    .map_err(|e| BenchError::setup(SetupStep::LoadBackend(name.to_string()), e))?;
                backend
                    .probe()
                    .map_err(|e| BenchError::setup(SetupStep::ProbeBackend(name.to_string()), e))?;
                Ok(backend)
            })
            .collect::<Result<Vec<_>, BenchError>>()?;

        Self::new(fixtures, backends, &config.benchmark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_fails_on_missing_model_before_runtime() {
        let dir = std::env::temp_dir().join("facebench-missing-models");
        let err = match BenchHarness::<ArcFaceEmbedder>::setup(&Config::default(), &dir) {
            Ok(_) => panic!("setup should fail without model files"),
            Err(e) => e,
        };

        assert_eq!(err.backend(), Some(FULL_BACKEND));
        assert!(err.to_string().contains("arcfaceresnet100-8.onnx"));
    }
}
