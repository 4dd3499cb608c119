//! Embedding backend contract
//!
//! Backends are interchangeable: same input (an aligned face), same output
//! length. The runner never looks at the values, only at the cost.

use std::path::Path;

use anyhow::Result;

use super::fixture::AlignedFace;
use crate::error::{BenchError, SetupStep};

pub trait EmbeddingBackend {
    /// Human-readable name used in logs, errors and the report
    fn name(&self) -> &str;

    /// Length of every vector this backend produces
    fn embedding_dim(&self) -> usize;

    /// Compute the embedding of one aligned face.
    ///
    /// Must be a pure function of the backend and the image: no state may
    /// leak from one call into the cost or result of another.
    fn generate_embedding(&self, face: &AlignedFace) -> Result<Vec<f32>>;
}

impl<B: EmbeddingBackend + ?Sized> EmbeddingBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn embedding_dim(&self) -> usize {
        (**self).embedding_dim()
    }

    fn generate_embedding(&self, face: &AlignedFace) -> Result<Vec<f32>> {
        (**self).generate_embedding(face)
    }
}

/// Fail setup for `name` when its model file is missing.
///
/// Runs before the inference runtime is touched so a missing file is
/// reported against the backend that needs it.
pub fn ensure_model_file(name: &str, path: &Path) -> Result<(), BenchError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(BenchError::setup(
            SetupStep::LoadBackend(name.to_string()),
            anyhow::anyhow!("model file not found: {}", path.display()),
        ))
    }
}

/// All backends must produce vectors of the same length
pub fn check_dimensions<B: EmbeddingBackend>(backends: &[B]) -> Result<usize, BenchError> {
    let Some(first) = backends.first() else {
        return Ok(0);
    };

    let expected = first.embedding_dim();
    match backends.iter().find(|b| b.embedding_dim() != expected) {
        Some(other) => Err(BenchError::setup(
            SetupStep::DimensionMismatch,
            anyhow::anyhow!(
                "'{}' produces {} values but '{}' produces {}",
                first.name(),
                expected,
                other.name(),
                other.embedding_dim()
            ),
        )),
        None => Ok(expected),
    }
}
