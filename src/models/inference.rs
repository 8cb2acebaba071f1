//! Object detection inference over a loaded ONNX session

use crate::config::InferenceConfig;
use crate::error::{Result, RunnerError};
use crate::models::loader::{ModelHandle, NativeModel, OnnxModel};
use crate::models::postprocess::{self, DecodeOptions};
use crate::preprocess::{self, PreparedInput};
use crate::types::detection::{InferenceResult, SpeedStats};
use image::{DynamicImage, GenericImageView};
use std::time::Instant;
use tracing::{debug, info};

/// Runs detection models on decoded images
#[derive(Debug, Clone, Default)]
pub struct DetectionEngine {
    options: DecodeOptions,
}

impl DetectionEngine {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &InferenceConfig) -> Self {
        Self::new(DecodeOptions {
            conf_threshold: config.conf_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        })
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Native weights have no inference procedure here; they must be exported first
    pub fn ensure_runnable(handle: &ModelHandle) -> Result<()> {
        match handle {
            ModelHandle::Onnx(_) => Ok(()),
            ModelHandle::Native(model) => Err(not_runnable(model)),
        }
    }

    /// Run inference on any handle
    pub fn detect_with_handle(
        &self,
        handle: &mut ModelHandle,
        image: &DynamicImage,
    ) -> Result<InferenceResult> {
        match handle {
            ModelHandle::Onnx(model) => self.detect(model, image),
            ModelHandle::Native(model) => Err(not_runnable(model)),
        }
    }

    /// Run the full preprocess / session / decode pipeline on one image
    pub fn detect(&self, model: &mut OnnxModel, image: &DynamicImage) -> Result<InferenceResult> {
        let (width, height) = image.dimensions();

        let start = Instant::now();
        let input = preprocess::prepare(image, model.metadata.imgsz);
        let letterbox = input.letterbox;
        let preprocess_ms = elapsed_ms(start);

        let start = Instant::now();
        let (dims, data) = run_session(model, input)?;
        let inference_ms = elapsed_ms(start);

        let start = Instant::now();
        let detections =
            postprocess::decode(&dims, &data, &self.options, &letterbox, &model.metadata)?;
        let postprocess_ms = elapsed_ms(start);

        let speed = SpeedStats {
            preprocess_ms,
            inference_ms,
            postprocess_ms,
        };

        info!(
            model = %model.name,
            detections = detections.len(),
            preprocess_ms = format!("{:.1}", speed.preprocess_ms),
            inference_ms = format!("{:.1}", speed.inference_ms),
            postprocess_ms = format!("{:.1}", speed.postprocess_ms),
            "Inference complete"
        );

        Ok(InferenceResult::new(width, height, detections)
            .with_speed(speed)
            .with_names(model.metadata.names.clone()))
    }
}

fn not_runnable(model: &NativeModel) -> RunnerError {
    RunnerError::inference(format!(
        "{} holds native {:?} weights; export to an interchange format and reload it to run inference",
        model.path.display(),
        model.format
    ))
}

/// Feed the prepared tensor through the session and copy out the detection head
fn run_session(model: &mut OnnxModel, input: PreparedInput) -> Result<(Vec<i64>, Vec<f32>)> {
    use ort::value::Tensor;

    let shape: Vec<i64> = input.shape.iter().map(|&d| d as i64).collect();
    let input_tensor = Tensor::from_array((shape, input.data))
        .map_err(|e| RunnerError::inference(format!("failed to create input tensor: {}", e)))?;

    let outputs = model
        .session
        .run(ort::inputs![&model.input_name => input_tensor])
        .map_err(|e| RunnerError::inference(format!("session run failed: {}", e)))?;

    let output = outputs.get(model.output_name.as_str()).ok_or_else(|| {
        RunnerError::inference(format!("model produced no '{}' output", model.output_name))
    })?;

    let (shape, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| RunnerError::inference(format!("output is not an f32 tensor: {}", e)))?;
    let dims: Vec<i64> = shape.iter().copied().collect();

    debug!(model = %model.name, output = %model.output_name, shape = ?dims, "Extracted detection output");

    Ok((dims, data.to_vec()))
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
