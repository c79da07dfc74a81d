//! ML inference module
//!
//! The person-segmentation capability is an external collaborator reached
//! through [`SegmentationBackend`]. [`EffectModel`] wraps it with lazy,
//! deduplicated loading and the per-frame segment + composite step.

pub mod model;

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::camera::CameraFrame;
use crate::effects::EffectSettings;
use crate::error::ModelError;

pub use model::{EffectModel, ModelStatus};

/// Person segmentation result
#[derive(Clone, Debug)]
pub struct SegmentationMask {
    /// Segmentation mask (0.0 = background, 1.0 = person)
    pub mask: Vec<f32>,
    /// Mask width
    pub width: u32,
    /// Mask height
    pub height: u32,
}

impl SegmentationMask {
    pub fn new(mask: Vec<f32>, width: u32, height: u32) -> Self {
        Self { mask, width, height }
    }

    /// Whether the mask has a usable size and matching buffer
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.mask.len() == (self.width * self.height) as usize
    }

    /// Get mask value at normalized coordinates
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let px = (x.max(0.0) * self.width as f32) as u32;
        let py = (y.max(0.0) * self.height as f32) as u32;
        let idx = (py.min(self.height - 1) * self.width + px.min(self.width - 1)) as usize;
        self.mask.get(idx).copied().unwrap_or(0.0)
    }
}

/// Segmentation model variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// Square 256x256 input, general purpose
    #[default]
    General,
    /// Wide 256x144 input, faster
    Landscape,
}

/// How to load the segmentation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelConfig {
    pub model_type: ModelType,
    /// Directory holding model files; backends search default locations when unset
    pub model_dir: Option<PathBuf>,
    /// Simulated load time used by the synthetic backend
    pub load_delay_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_type: ModelType::General,
            model_dir: None,
            load_delay_ms: 1500,
        }
    }
}

/// Opaque handle to a loaded model
///
/// Cloning shares the same underlying model.
#[derive(Clone)]
pub struct ModelHandle {
    name: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ModelHandle {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, model: T) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(model),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the backend-specific model
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether both handles refer to the same loaded model
    pub fn same_model(&self, other: &ModelHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").field("name", &self.name).finish()
    }
}

/// Person segmentation and bokeh compositing capability
#[async_trait]
pub trait SegmentationBackend: Send + Sync {
    /// Load the model. May take seconds.
    async fn load(&self, config: &ModelConfig) -> Result<ModelHandle, ModelError>;

    /// Produce a person/background mask for `frame`
    async fn segment(&self, model: &ModelHandle, frame: &CameraFrame) -> Result<SegmentationMask, ModelError>;

    /// Blend sharp foreground over blurred background
    async fn composite_bokeh(
        &self,
        frame: &CameraFrame,
        mask: &SegmentationMask,
        settings: &EffectSettings,
    ) -> Result<RgbaImage, ModelError>;
}
