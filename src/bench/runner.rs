//! Benchmark runner
//!
//! Strictly sequential. For each backend: isolation barrier, warm-up
//! trials (discarded), then measured trials. Each trial embeds every
//! fixture once, in fixture order, and sinks every result.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::alloc::{quiesce, AllocSnapshot};
use super::backend::EmbeddingBackend;
use super::fixture::Fixtures;
use super::sink::Sink;
use super::stats::{BackendSummary, TrialMeasurement};
use crate::config::BenchmarkConfig;
use crate::error::{BenchError, TrialKind};

#[derive(Debug, Clone)]
pub struct BenchmarkRunner {
    warmup_trials: usize,
    trials: usize,
}

impl BenchmarkRunner {
    pub fn new(config: &BenchmarkConfig) -> Self {
        Self {
            warmup_trials: config.warmup_trials,
            trials: config.trials,
        }
    }

    pub fn warmup_trials(&self) -> usize {
        self.warmup_trials
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    /// Benchmark every backend in registration order.
    ///
    /// The first failing backend aborts the whole run; no partial
    /// summaries are returned.
    pub fn run<B: EmbeddingBackend>(
        &self,
        fixtures: &Fixtures,
        backends: &[B],
        sink: &mut Sink,
    ) -> Result<Vec<BackendSummary>, BenchError> {
        backends
            .iter()
            .map(|backend| {
                let trials = self.run_backend(fixtures, backend, sink)?;
                Ok(BackendSummary::from_trials(backend.name(), fixtures.len(), &trials))
            })
            .collect()
    }

    /// Warm up and measure one backend
    pub fn run_backend<B: EmbeddingBackend + ?Sized>(
        &self,
        fixtures: &Fixtures,
        backend: &B,
        sink: &mut Sink,
    ) -> Result<Vec<TrialMeasurement>, BenchError> {
        if fixtures.is_empty() {
            warn!("{}: no fixtures, skipping trials", backend.name());
            return Ok(Vec::new());
        }

        info!(
            "{}: {} warm-up + {} measured trials over {} faces",
            backend.name(),
            self.warmup_trials,
            self.trials,
            fixtures.len()
        );

        for i in 0..self.warmup_trials {
            quiesce();
            run_trial(fixtures, backend, sink).map_err(|cause| BenchError::Measurement {
                backend: backend.name().to_string(),
                trial: TrialKind::Warmup(i),
                cause,
            })?;
        }

        let mut measurements = Vec::with_capacity(self.trials);
        for i in 0..self.trials {
            let baseline = quiesce();
            let start = Instant::now();

            run_trial(fixtures, backend, sink).map_err(|cause| BenchError::Measurement {
                backend: backend.name().to_string(),
                trial: TrialKind::Measured(i),
                cause,
            })?;

            let duration = start.elapsed();
            let alloc = AllocSnapshot::now().since(&baseline);
            debug!(
                "{} trial {}: {:?}, {} allocations",
                backend.name(),
                i + 1,
                duration,
                alloc.allocations
            );

            measurements.push(TrialMeasurement {
                backend: backend.name().to_string(),
                duration,
                alloc,
                faces: fixtures.len(),
            });
        }

        Ok(measurements)
    }
}

/// One pass over every fixture, in order
fn run_trial<B: EmbeddingBackend + ?Sized>(
    fixtures: &Fixtures,
    backend: &B,
    sink: &mut Sink,
) -> anyhow::Result<()> {
    for face in fixtures {
        sink.consume(backend.generate_embedding(face)?);
    }
    Ok(())
}
