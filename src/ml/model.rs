//! Lazily loaded effect model
//!
//! Loading is deduplicated: while a load is in flight every caller of
//! [`EffectModel::ensure_loaded`] awaits the same shared future and observes
//! the same result. A failed load returns the model to `Unloaded` so the next
//! request retries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use image::RgbaImage;
use parking_lot::Mutex;

use super::{ModelConfig, ModelHandle, SegmentationBackend};
use crate::camera::CameraFrame;
use crate::effects::EffectSettings;
use crate::error::ModelError;

type PendingLoad = Shared<BoxFuture<'static, Result<ModelHandle, ModelError>>>;

enum LoadState {
    Unloaded,
    Loading(PendingLoad),
    Ready(ModelHandle),
}

/// Observable load status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
}

/// The segmentation model as seen by the controller and render loop
pub struct EffectModel {
    backend: Arc<dyn SegmentationBackend>,
    config: ModelConfig,
    state: Arc<Mutex<LoadState>>,
    loads_started: AtomicU64,
}

impl EffectModel {
    pub fn new(backend: Arc<dyn SegmentationBackend>, config: ModelConfig) -> Self {
        Self {
            backend,
            config,
            state: Arc::new(Mutex::new(LoadState::Unloaded)),
            loads_started: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> ModelStatus {
        match &*self.state.lock() {
            LoadState::Unloaded => ModelStatus::Unloaded,
            LoadState::Loading(_) => ModelStatus::Loading,
            LoadState::Ready(_) => ModelStatus::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ModelStatus::Ready
    }

    /// Number of backend loads started so far
    pub fn loads_started(&self) -> u64 {
        self.loads_started.load(Ordering::Relaxed)
    }

    /// Return the loaded model, loading it first if needed
    pub async fn ensure_loaded(&self) -> Result<ModelHandle, ModelError> {
        let pending = {
            let mut state = self.state.lock();
            match &*state {
                LoadState::Ready(handle) => return Ok(handle.clone()),
                LoadState::Loading(pending) => pending.clone(),
                LoadState::Unloaded => {
                    let pending = self.begin_load(Arc::downgrade(&self.state));
                    *state = LoadState::Loading(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    fn begin_load(&self, state: Weak<Mutex<LoadState>>) -> PendingLoad {
        let attempt = self.loads_started.fetch_add(1, Ordering::Relaxed) + 1;
        let backend = Arc::clone(&self.backend);
        let config = self.config.clone();

        tracing::info!(attempt, model_type = ?config.model_type, "Loading segmentation model");

        async move {
            let result = backend.load(&config).await;

            if let Some(state) = state.upgrade() {
                let mut state = state.lock();
                match &result {
                    Ok(handle) => {
                        tracing::info!(attempt, model = handle.name(), "Segmentation model ready");
                        *state = LoadState::Ready(handle.clone());
                    }
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Segmentation model failed to load");
                        *state = LoadState::Unloaded;
                    }
                }
            }

            result
        }
        .boxed()
        .shared()
    }

    /// Segment `frame` and composite the bokeh effect with `settings`
    ///
    /// Does not touch controller or settings state. Fails with
    /// [`ModelError::NotReady`] before the model is loaded.
    pub async fn compute_frame(
        &self,
        frame: &CameraFrame,
        settings: &EffectSettings,
    ) -> Result<RgbaImage, ModelError> {
        let handle = match &*self.state.lock() {
            LoadState::Ready(handle) => handle.clone(),
            _ => return Err(ModelError::NotReady),
        };

        let mask = self.backend.segment(&handle, frame).await?;
        self.backend.composite_bokeh(frame, &mask, settings).await
    }
}
