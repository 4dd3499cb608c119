//! Benchmark error taxonomy
//!
//! Setup errors abort before any timed work. Measurement errors abort the
//! run with the failing backend identified. Nothing here is retryable.

use std::fmt;

use thiserror::Error;

/// Setup stage that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStep {
    InitRuntime,
    DecodeImage,
    LoadDetector,
    DetectFaces,
    LoadBackend(String),
    ProbeBackend(String),
    DimensionMismatch,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupStep::InitRuntime => write!(f, "initializing inference runtime"),
            SetupStep::DecodeImage => write!(f, "decoding reference image"),
            SetupStep::LoadDetector => write!(f, "loading face detector"),
            SetupStep::DetectFaces => write!(f, "detecting faces"),
            SetupStep::LoadBackend(name) => write!(f, "loading backend '{}'", name),
            SetupStep::ProbeBackend(name) => write!(f, "probing backend '{}'", name),
            SetupStep::DimensionMismatch => write!(f, "checking embedding dimensions"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("setup failed while {step}: {cause:#}")]
    Setup { step: SetupStep, cause: anyhow::Error },

    #[error("backend '{backend}' failed during {trial}: {cause:#}")]
    Measurement {
        backend: String,
        trial: TrialKind,
        cause: anyhow::Error,
    },
}

/// Which invocation of the runner failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialKind {
    Warmup(usize),
    Measured(usize),
    Untimed(usize),
}

impl fmt::Display for TrialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialKind::Warmup(i) => write!(f, "warm-up trial {}", i + 1),
            TrialKind::Measured(i) => write!(f, "trial {}", i + 1),
            TrialKind::Untimed(face) => write!(f, "untimed pass on face #{}", face),
        }
    }
}

impl BenchError {
    pub fn setup(step: SetupStep, cause: impl Into<anyhow::Error>) -> Self {
        BenchError::Setup {
            step,
            cause: cause.into(),
        }
    }

    /// Name of the backend involved, if the error is tied to one
    pub fn backend(&self) -> Option<&str> {
        match self {
            BenchError::Setup {
                step: SetupStep::LoadBackend(name) | SetupStep::ProbeBackend(name),
                ..
            } => Some(name),
            BenchError::Setup { .. } => None,
            BenchError::Measurement { backend, .. } => Some(backend),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_message_names_step_and_cause() {
        let err = BenchError::setup(
            SetupStep::LoadBackend("INT8 quantized".to_string()),
            anyhow::anyhow!("model file not found"),
        );
        let msg = err.to_string();
        assert!(msg.contains("loading backend 'INT8 quantized'"));
        assert!(msg.contains("model file not found"));
        assert_eq!(err.backend(), Some("INT8 quantized"));
    }

    #[test]
    fn test_measurement_message_names_backend() {
        let err = BenchError::Measurement {
            backend: "Full precision".to_string(),
            trial: TrialKind::Measured(4),
            cause: anyhow::anyhow!("infer failed"),
        };
        assert_eq!(
            err.to_string(),
            "backend 'Full precision' failed during trial 5: infer failed"
        );
    }
}
