//! Embedding agreement between backends
//!
//! Runs after all timed work. Each backend's embeddings are compared with
//! the baseline (first registered) backend by cosine similarity.

use tracing::info;

use super::backend::EmbeddingBackend;
use super::fixture::Fixtures;
use crate::error::{BenchError, TrialKind};
use crate::utils::math::{cosine_similarity, mean};

/// Mean cosine similarity of every backend to the first one.
///
/// `None` per backend when there are no fixtures to compare on.
pub fn embedding_agreement<B: EmbeddingBackend>(
    fixtures: &Fixtures,
    backends: &[B],
) -> Result<Vec<Option<f32>>, BenchError> {
    let Some(baseline) = backends.first() else {
        return Ok(Vec::new());
    };

    let reference = embed_all(baseline, fixtures)?;

    backends
        .iter()
        .enumerate()
        .map(|(i, backend)| {
            let computed;
            let embeddings = if i == 0 {
                &reference
            } else {
                computed = embed_all(backend, fixtures)?;
                &computed
            };
            let similarities: Vec<f32> = reference
                .iter()
                .zip(embeddings)
                .map(|(a, b)| cosine_similarity(a, b))
                .collect();

            let agreement = mean(&similarities);
            if let Some(value) = agreement {
                info!(
                    "{} agrees with {} at cosine {:.4}",
                    backend.name(),
                    baseline.name(),
                    value
                );
            }
            Ok(agreement)
        })
        .collect()
}

/// Embed every fixture once, outside any timed region
pub fn embed_all<B: EmbeddingBackend + ?Sized>(
    backend: &B,
    fixtures: &Fixtures,
) -> Result<Vec<Vec<f32>>, BenchError> {
    fixtures
        .iter()
        .map(|face| {
            backend
                .generate_embedding(face)
                .map_err(|cause| BenchError::Measurement {
                    backend: backend.name().to_string(),
                    trial: TrialKind::Untimed(face.index()),
                    cause,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::fixture::AlignedFace;
    use image::{Rgb, RgbImage};
    use std::cell::Cell;

    /// Embeds the mean channel values, optionally scaled per channel
    struct ChannelMean {
        name: &'static str,
        weights: [f32; 3],
    }

    impl EmbeddingBackend for ChannelMean {
        fn name(&self) -> &str {
            self.name
        }

        fn embedding_dim(&self) -> usize {
            3
        }

        fn generate_embedding(&self, face: &AlignedFace) -> anyhow::Result<Vec<f32>> {
            let (w, h) = face.dimensions();
            let n = (w * h) as f32;
            let mut sums = [0.0f32; 3];
            for p in face.image().pixels() {
                for c in 0..3 {
                    sums[c] += p[c] as f32;
                }
            }
            Ok((0..3).map(|c| sums[c] / n * self.weights[c]).collect())
        }
    }

    /// Counts calls, embeds a constant
    struct Counting {
        calls: Cell<usize>,
    }

    impl EmbeddingBackend for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn embedding_dim(&self) -> usize {
            2
        }

        fn generate_embedding(&self, _face: &AlignedFace) -> anyhow::Result<Vec<f32>> {
            self.calls.set(self.calls.get() + 1);
            Ok(vec![1.0, 2.0])
        }
    }

    fn fixtures() -> Fixtures {
        Fixtures::new(vec![
            AlignedFace::new(0, RgbImage::from_pixel(4, 4, Rgb([10, 200, 30]))),
            AlignedFace::new(1, RgbImage::from_pixel(4, 4, Rgb([90, 20, 60]))),
        ])
    }

    #[test]
    fn test_baseline_agrees_with_itself() {
        let backends = [
            ChannelMean { name: "full", weights: [1.0, 1.0, 1.0] },
            ChannelMean { name: "scaled", weights: [2.0, 2.0, 2.0] },
            ChannelMean { name: "skewed", weights: [1.0, 0.0, 1.0] },
        ];

        let agreement = embedding_agreement(&fixtures(), &backends).unwrap();

        assert!((agreement[0].unwrap() - 1.0).abs() < 1e-6);
        assert!((agreement[1].unwrap() - 1.0).abs() < 1e-6);
        assert!(agreement[2].unwrap() < 0.9);
    }

    #[test]
    fn test_no_fixtures_gives_none() {
        let backends = [ChannelMean { name: "full", weights: [1.0; 3] }];
        let agreement = embedding_agreement(&Fixtures::default(), &backends).unwrap();
        assert_eq!(agreement, vec![None]);
    }

    #[test]
    fn test_each_backend_embeds_each_face_once() {
        let backends = [
            Counting { calls: Cell::new(0) },
            Counting { calls: Cell::new(0) },
        ];

        let agreement = embedding_agreement(&fixtures(), &backends).unwrap();

        assert_eq!(agreement.len(), 2);
        assert_eq!(backends[0].calls.get(), 2);
        assert_eq!(backends[1].calls.get(), 2);
    }
}
