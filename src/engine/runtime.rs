//! OpenVINO runtime wrapper
//!
//! Owns the OpenVINO core and compiles model files for the configured device.
//! Models are compiled once during setup and stay loaded for the whole run.

use std::cell::RefCell;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use ndarray::Array4;
use openvino::{CompiledModel, Core, ElementType, InferRequest, Shape, Tensor};
use tracing::info;

/// Inference runtime bound to one device
pub struct InferenceRuntime {
    core: Core,
    device: String,
}

impl InferenceRuntime {
    pub fn new(device: &str) -> Result<Self> {
        let core = Core::new().context("Failed to initialize OpenVINO core")?;
        Ok(Self {
            core,
            device: device.to_string(),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Read and compile a model file
    pub fn load(&mut self, label: &str, path: &Path) -> Result<LoadedModel> {
        let path_str = path
            .to_str()
            .with_context(|| format!("Model path is not valid UTF-8: {}", path.display()))?;

        info!("Loading model: {} from {}", label, path.display());
        let start = Instant::now();

        let model = self
            .core
            .read_model_from_file(path_str, "")
            .with_context(|| format!("Failed to read model {}", path.display()))?;
        let mut compiled = self
            .core
            .compile_model(&model, self.device.as_str().into())
            .with_context(|| format!("Failed to compile model for device {}", self.device))?;
        let request = compiled.create_infer_request()?;

        info!("Model {} loaded in {:?}", label, start.elapsed());

        Ok(LoadedModel {
            _compiled: compiled,
            request: RefCell::new(request),
        })
    }
}

/// A compiled model with its reusable inference request.
///
/// The request is only touched from the benchmark thread; every call fully
/// overwrites its input tensor, so no state carries over between calls.
pub struct LoadedModel {
    _compiled: CompiledModel,
    request: RefCell<InferRequest>,
}

impl LoadedModel {
    /// Run inference on an NCHW `f32` input and hand the finished request to `read`
    pub fn run<R>(
        &self,
        input: &Array4<f32>,
        read: impl FnOnce(&InferRequest) -> Result<R>,
    ) -> Result<R> {
        let tensor = tensor_from_array(input)?;

        let mut request = self.request.borrow_mut();
        request.set_input_tensor(&tensor)?;
        request.infer()?;

        read(&request)
    }
}

fn tensor_from_array(input: &Array4<f32>) -> Result<Tensor> {
    let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
    let shape = Shape::new(&dims)?;
    let mut tensor = Tensor::new(ElementType::F32, &shape)?;

    let data = input
        .as_slice()
        .context("Input array is not in standard layout")?;
    let raw = tensor.get_raw_data_mut()?;
    anyhow::ensure!(
        raw.len() == data.len() * 4,
        "Tensor byte size {} does not match input length {}",
        raw.len(),
        data.len()
    );

    for (dst, value) in raw.chunks_exact_mut(4).zip(data) {
        dst.copy_from_slice(&value.to_ne_bytes());
    }

    Ok(tensor)
}

/// Read tensor data as f32 vector
pub fn read_tensor_f32(tensor: &Tensor) -> Result<Vec<f32>> {
    let raw = tensor.get_raw_data()?;
    Ok(raw
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Number of outputs the compiled model exposes
pub fn output_count(request: &InferRequest) -> usize {
    (0..32)
        .take_while(|&i| request.get_output_tensor_by_index(i).is_ok())
        .count()
}
