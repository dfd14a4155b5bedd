// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array4, ArrayD, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Tensor;

use crate::models::InferenceEngine;

/// 执行后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    /// `[network]` 或 `[network, weights]`
    pub model_paths: Vec<String>,
    pub ep: OrtEP,
    pub input_name: String,
    pub output_name: String,
}

/// ONNX Runtime 推理后端
pub struct OrtBackend {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OrtBackend {
    pub fn build(args: OrtConfig) -> Result<Self> {
        let network = args
            .model_paths
            .first()
            .ok_or_else(|| anyhow!("detection.modelPath is empty"))?;
        if !Path::new(network).exists() {
            bail!("model file not found: {}", network);
        }
        // ONNX 的权重一般内嵌在网络文件里; 外部权重需与网络文件放在一起
        if let Some(weights) = args.model_paths.get(1) {
            if !Path::new(weights).exists() {
                bail!("model weights not found: {}", weights);
            }
            tracing::info!("📦 外部权重: {}", weights);
        }

        let builder = Session::builder().context("failed to create ORT session builder")?;
        let builder = match args.ep {
            OrtEP::CUDA(device_id) => {
                // 注册失败时 ORT 自动退回 CPU
                tracing::info!("🚀 尝试启用 CUDA (device {})", device_id);
                builder
                    .with_execution_providers([CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build()])
                    .context("failed to register execution providers")?
            }
            OrtEP::CPU => builder,
        };
        let session = builder
            .commit_from_file(network)
            .with_context(|| format!("failed to load model {}", network))?;

        tracing::info!(
            "✅ 模型加载完成: {} (input: {}, output: {}, ep: {:?})",
            network,
            args.input_name,
            args.output_name,
            args.ep
        );

        Ok(Self {
            session,
            input_name: args.input_name,
            output_name: args.output_name,
        })
    }
}

impl InferenceEngine for OrtBackend {
    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        let shape: Vec<usize> = input.shape().to_vec();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_array((shape, data.into_boxed_slice()))
            .context("failed to create input tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .context("inference failed")?;

        let value = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| anyhow!("model has no output named {}", self.output_name))?;
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .context("failed to extract output tensor")?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec()).context("output shape mismatch")
    }

    fn name(&self) -> &str {
        "onnxruntime"
    }
}
