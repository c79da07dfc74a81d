//! ONNX Runtime person segmentation
//!
//! Runs the MediaPipe selfie segmentation model (PINTO Model Zoo export).
//! Inference is blocking, so it is moved onto tokio's blocking pool.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbaImage;
use ndarray::Array4;
use ort::session::Session;
use parking_lot::Mutex;

use crate::camera::CameraFrame;
use crate::effects::{bokeh, EffectSettings};
use crate::error::ModelError;
use crate::ml::{ModelConfig, ModelHandle, ModelType, SegmentationBackend, SegmentationMask};

struct OnnxModel {
    session: Mutex<Session>,
    input_width: u32,
    input_height: u32,
}

/// Segmentation backend running a local ONNX model
#[derive(Debug, Default)]
pub struct OnnxSegmenter;

impl OnnxSegmenter {
    pub fn new() -> Self {
        Self
    }
}

/// Model file and (width, height) of its NHWC input
fn model_layout(model_type: ModelType) -> (&'static str, u32, u32) {
    match model_type {
        ModelType::General => ("selfie_segmentation.onnx", 256, 256),
        ModelType::Landscape => ("selfie_segmentation_landscape.onnx", 256, 144),
    }
}

#[async_trait]
impl SegmentationBackend for OnnxSegmenter {
    async fn load(&self, config: &ModelConfig) -> Result<ModelHandle, ModelError> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || load_model(&config))
            .await
            .map_err(|e| ModelError::Load(format!("model loader panicked: {}", e)))?
    }

    async fn segment(&self, model: &ModelHandle, frame: &CameraFrame) -> Result<SegmentationMask, ModelError> {
        let model = model.clone();
        let frame = frame.clone();
        tokio::task::spawn_blocking(move || {
            let onnx = model
                .downcast_ref::<OnnxModel>()
                .ok_or_else(|| ModelError::FrameProcessing(format!("foreign model handle {}", model.name())))?;
            run_segmentation(onnx, &frame).map_err(ModelError::FrameProcessing)
        })
        .await
        .map_err(|e| ModelError::FrameProcessing(format!("inference task failed: {}", e)))?
    }

    async fn composite_bokeh(
        &self,
        frame: &CameraFrame,
        mask: &SegmentationMask,
        settings: &EffectSettings,
    ) -> Result<RgbaImage, ModelError> {
        bokeh::composite(frame, mask, settings)
    }
}

fn load_model(config: &ModelConfig) -> Result<ModelHandle, ModelError> {
    let (file_name, input_width, input_height) = model_layout(config.model_type);
    let model_dir = find_model_dir(config.model_dir.as_deref()).map_err(ModelError::Load)?;
    let path = model_dir.join(file_name);
    if !path.exists() {
        return Err(ModelError::Load(format!("segmentation model not found: {:?}", path)));
    }

    ort::init()
        .with_name("BokehCam")
        .commit()
        .map_err(|e| ModelError::Load(format!("failed to initialize ORT: {}", e)))?;

    let session = Session::builder()
        .map_err(|e| ModelError::Load(format!("failed to create session builder: {}", e)))?
        .with_intra_threads(2)
        .map_err(|e| ModelError::Load(format!("failed to set threads: {}", e)))?
        .commit_from_file(&path)
        .map_err(|e| ModelError::Load(format!("failed to load {:?}: {}", path, e)))?;

    tracing::info!(path = ?path, input_width, input_height, "Loaded segmentation model");

    Ok(ModelHandle::new(
        file_name,
        OnnxModel {
            session: Mutex::new(session),
            input_width,
            input_height,
        },
    ))
}

/// Explicit directory, else `models/` next to the executable or in the working directory
fn find_model_dir(explicit: Option<&Path>) -> Result<PathBuf, String> {
    if let Some(dir) = explicit {
        return if dir.is_dir() {
            Ok(dir.to_path_buf())
        } else {
            Err(format!("model directory {:?} does not exist", dir))
        };
    }

    if let Ok(exe_path) = std::env::current_exe() {
        // target/{debug,release}/bokeh-cam -> walk up to the crate root
        for ancestor in exe_path.ancestors().skip(1).take(3) {
            let model_dir = ancestor.join("models");
            if model_dir.is_dir() {
                return Ok(model_dir);
            }
        }
    }

    let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
    let model_dir = cwd.join("models");
    if model_dir.is_dir() {
        return Ok(model_dir);
    }

    Err("Models directory not found. Create a 'models' directory with ONNX models.".to_string())
}

fn run_segmentation(model: &OnnxModel, frame: &CameraFrame) -> Result<SegmentationMask, String> {
    let (width, height) = (model.input_width, model.input_height);
    let input = preprocess_frame_nhwc(frame, width, height)?;

    // NHWC (1, H, W, 3)
    let input_array = Array4::from_shape_vec((1, height as usize, width as usize, 3), input)
        .map_err(|e| format!("Failed to create input array: {}", e))?;
    let input_tensor =
        ort::value::Tensor::from_array(input_array).map_err(|e| format!("Failed to create tensor: {}", e))?;

    let mut session = model.session.lock();
    let outputs = session
        .run(ort::inputs![input_tensor])
        .map_err(|e| format!("Inference failed: {}", e))?;

    let output = outputs
        .iter()
        .next()
        .ok_or("No output from segmentation model")?;
    let (_shape, data) = output
        .1
        .try_extract_tensor::<f32>()
        .map_err(|e| format!("Failed to extract output: {}", e))?;

    let mask: Vec<f32> = data.iter().map(|&v| v.clamp(0.0, 1.0)).collect();
    let mask = SegmentationMask::new(mask, width, height);
    if !mask.is_valid() {
        return Err(format!("model returned {} values for a {}x{} mask", mask.mask.len(), width, height));
    }
    Ok(mask)
}

/// Resize to the model input and convert to RGB float [0, 1], channels last
fn preprocess_frame_nhwc(frame: &CameraFrame, width: u32, height: u32) -> Result<Vec<f32>, String> {
    let resized = frame
        .downscale(width, height)
        .ok_or_else(|| format!("frame {} is malformed", frame.frame_number))?;
    Ok(resized
        .pixels()
        .flat_map(|px| [px[0], px[1], px[2]])
        .map(|c| c as f32 / 255.0)
        .collect())
}
