//! ArcFace Face Embedder
//!
//! Runs an ArcFace ResNet-100 export (full precision or INT8) on aligned faces.

use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use tracing::info;

use super::preprocess::{
    embedding_window, image_to_nchw, ChannelOrder, PixelScale, EMBEDDER_INPUT_SIZE,
};
use super::runtime::{read_tensor_f32, InferenceRuntime, LoadedModel};
use crate::bench::backend::EmbeddingBackend;
use crate::bench::fixture::AlignedFace;

/// ArcFace embedding backend
pub struct ArcFaceEmbedder {
    name: String,
    model: LoadedModel,
    embedding_dim: usize,
}

impl ArcFaceEmbedder {
    /// Compile the model. Call [`probe`](Self::probe) before timing anything.
    pub fn load(runtime: &mut InferenceRuntime, name: &str, path: &Path) -> Result<Self> {
        let model = runtime.load(name, path)?;
        Ok(Self {
            name: name.to_string(),
            model,
            embedding_dim: 0,
        })
    }

    /// Run one inference on a blank face. Finishes any lazy runtime setup
    /// and records the output length.
    pub fn probe(&mut self) -> Result<usize> {
        let (w, h) = EMBEDDER_INPUT_SIZE;
        let blank = RgbImage::from_pixel(w, h, Rgb([127, 127, 127]));

        let output = self.embed_image(&blank)?;
        anyhow::ensure!(!output.is_empty(), "model produced an empty embedding");

        self.embedding_dim = output.len();
        info!("Backend {} produces {}-d embeddings", self.name, self.embedding_dim);
        Ok(self.embedding_dim)
    }

    fn embed_image(&self, aligned: &RgbImage) -> Result<Vec<f32>> {
        let window = embedding_window(aligned);
        let input = image_to_nchw(&window, ChannelOrder::Rgb, PixelScale::Raw);

        self.model.run(&input, |request| {
            let output = request
                .get_output_tensor()
                .context("Failed to read embedding output")?;
            read_tensor_f32(&output)
        })
    }
}

impl EmbeddingBackend for ArcFaceEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn generate_embedding(&self, face: &AlignedFace) -> Result<Vec<f32>> {
        let embedding = self.embed_image(face.image())?;
        anyhow::ensure!(
            embedding.len() == self.embedding_dim,
            "expected {} values, got {}",
            self.embedding_dim,
            embedding.len()
        );
        Ok(embedding)
    }
}
