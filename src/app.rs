//! Application controller
//!
//! Turns user intents into camera, model and render loop operations. The
//! camera/effect state is a tagged enum, so an enabled effect without a live
//! camera cannot be represented. Intents are serialised through one async
//! mutex; the model load is the only suspension that runs without it, and
//! its completion is checked against the camera epoch before it is used.
//! A camera stream that ends on its own while the effect runs moves the
//! controller back to `Idle`.

use std::sync::Arc;

use tokio::sync::{oneshot, watch, Mutex, MutexGuard};

use crate::camera::{CameraSession, Device, DeviceCatalog, DevicePlatform};
use crate::config::AppConfig;
use crate::effects::{EffectSettings, SettingsAdjustment, SharedSettings};
use crate::error::{ControllerError, Result};
use crate::ml::{EffectModel, SegmentationBackend};
use crate::render::{
    DisplayRefresh, FixedRateRefresh, FrameSink, LoopExit, LoopStats, OutputSurface, RenderLoop,
};

pub const INITIAL_STATUS: &str =
    "Click \"Start Camera\" to begin. Camera permissions will be requested when you start.";
pub const CAMERA_ACTIVE_STATUS: &str = "Camera is active. Background effects will be applied here.";
pub const CAMERA_STOPPED_STATUS: &str = "Camera stopped and stream released.";
pub const MODEL_LOADING_STATUS: &str = "Loading AI model...";
pub const BLUR_ENABLED_STATUS: &str = "Background blur enabled.";
pub const BLUR_DISABLED_STATUS: &str = "Background blur disabled.";

/// Observable effect state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    Off,
    Loading,
    On,
}

/// Observable controller state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AppState {
    #[default]
    Idle,
    Live { device_id: String, effect: EffectState },
}

impl AppState {
    pub fn camera_active(&self) -> bool {
        matches!(self, AppState::Live { .. })
    }

    pub fn effect_enabled(&self) -> bool {
        matches!(self, AppState::Live { effect: EffectState::On, .. })
    }

    pub fn effect_loading(&self) -> bool {
        matches!(self, AppState::Live { effect: EffectState::Loading, .. })
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            AppState::Idle => None,
            AppState::Live { device_id, .. } => Some(device_id),
        }
    }
}

/// Severity of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Inactive,
    Active,
    Loading,
    Error,
}

/// User-facing status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusMessage {
    pub fn new(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Everything a user can ask the controller to do
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    StartCamera(Option<String>),
    StopCamera,
    ToggleCamera,
    SwitchCamera(String),
    ToggleEffect,
    Adjust(SettingsAdjustment),
    ResetSettings,
    RefreshDevices,
}

/// Collaborators injected into [`AppController::new`]
pub struct AppComponents {
    pub catalog: Arc<DeviceCatalog>,
    pub session: CameraSession,
    pub model: Arc<EffectModel>,
    pub settings: SharedSettings,
    pub surface: OutputSurface,
    pub refresh: Arc<dyn DisplayRefresh>,
}

enum EffectPhase {
    Off,
    Loading,
    On(RenderLoop),
}

enum CameraPhase {
    Idle,
    Live { device_id: String, effect: EffectPhase },
}

impl CameraPhase {
    fn snapshot(&self) -> AppState {
        match self {
            CameraPhase::Idle => AppState::Idle,
            CameraPhase::Live { device_id, effect } => AppState::Live {
                device_id: device_id.clone(),
                effect: match effect {
                    EffectPhase::Off => EffectState::Off,
                    EffectPhase::Loading => EffectState::Loading,
                    EffectPhase::On(_) => EffectState::On,
                },
            },
        }
    }
}

struct Inner {
    session: CameraSession,
    phase: CameraPhase,
    /// Bumped on every camera start/stop; stale model loads compare against it
    epoch: u64,
}

impl Inner {
    /// Stop the render loop (if any), then release the stream
    async fn close_camera(&mut self) {
        let previous = std::mem::replace(&mut self.phase, CameraPhase::Idle);
        if let CameraPhase::Live {
            effect: EffectPhase::On(render),
            ..
        } = previous
        {
            render.stop().await;
        }

        self.session.release();
        self.epoch += 1;
    }
}

/// State and status channels, shared with background watchers
#[derive(Clone)]
struct Publisher {
    state_tx: Arc<watch::Sender<AppState>>,
    status_tx: Arc<watch::Sender<StatusMessage>>,
}

impl Publisher {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(AppState::Idle);
        let (status_tx, _) = watch::channel(StatusMessage::new(StatusKind::Inactive, INITIAL_STATUS));
        Self {
            state_tx: Arc::new(state_tx),
            status_tx: Arc::new(status_tx),
        }
    }

    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.phase.snapshot());
    }

    fn set_status(&self, kind: StatusKind, text: &str) {
        self.status_tx.send_replace(StatusMessage::new(kind, text));
    }

    fn report(&self, err: ControllerError) -> ControllerError {
        tracing::warn!(error = %err, "Intent failed");
        self.status_tx
            .send_replace(StatusMessage::new(StatusKind::Error, err.user_message()));
        err
    }
}

/// Camera + background blur state machine
pub struct AppController {
    catalog: Arc<DeviceCatalog>,
    model: Arc<EffectModel>,
    settings: SharedSettings,
    surface: OutputSurface,
    refresh: Arc<dyn DisplayRefresh>,
    inner: Arc<Mutex<Inner>>,
    publisher: Publisher,
}

impl AppController {
    pub fn new(components: AppComponents) -> Self {
        let AppComponents {
            catalog,
            session,
            model,
            settings,
            surface,
            refresh,
        } = components;

        Self {
            catalog,
            model,
            settings,
            surface,
            refresh,
            inner: Arc::new(Mutex::new(Inner {
                session,
                phase: CameraPhase::Idle,
                epoch: 0,
            })),
            publisher: Publisher::new(),
        }
    }

    /// Wire a controller from capabilities and configuration
    pub fn from_config(
        platform: Arc<dyn DevicePlatform>,
        backend: Arc<dyn SegmentationBackend>,
        sink: Arc<dyn FrameSink>,
        config: &AppConfig,
    ) -> Self {
        Self::new(AppComponents {
            catalog: Arc::new(DeviceCatalog::new(Arc::clone(&platform))),
            session: CameraSession::new(platform, config.resolution),
            model: Arc::new(EffectModel::new(backend, config.model.clone())),
            settings: SharedSettings::new(config.settings),
            surface: OutputSurface::new(sink),
            refresh: Arc::new(FixedRateRefresh::new(config.target_fps)),
        })
    }

    // ---- Observation ----

    pub fn state(&self) -> AppState {
        self.publisher.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AppState> {
        self.publisher.state_tx.subscribe()
    }

    pub fn status(&self) -> StatusMessage {
        self.publisher.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusMessage> {
        self.publisher.status_tx.subscribe()
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    pub fn model(&self) -> &EffectModel {
        &self.model
    }

    pub fn settings(&self) -> EffectSettings {
        self.settings.snapshot()
    }

    /// Whether the camera session currently holds a stream
    pub async fn has_open_stream(&self) -> bool {
        self.inner.lock().await.session.is_open()
    }

    /// Counters of the running render loop, if the effect is on
    pub async fn render_stats(&self) -> Option<LoopStats> {
        match &self.inner.lock().await.phase {
            CameraPhase::Live {
                effect: EffectPhase::On(render),
                ..
            } => Some(render.stats()),
            _ => None,
        }
    }

    pub async fn is_rendering(&self) -> bool {
        match &self.inner.lock().await.phase {
            CameraPhase::Live {
                effect: EffectPhase::On(render),
                ..
            } => render.is_running(),
            _ => false,
        }
    }

    // ---- Intents ----

    pub async fn dispatch(&self, intent: Intent) -> Result<AppState> {
        tracing::debug!(?intent, "Dispatching intent");
        match intent {
            Intent::StartCamera(device_id) => self.start_camera(device_id).await,
            Intent::StopCamera => Ok(self.stop_camera().await),
            Intent::ToggleCamera => self.toggle_camera().await,
            Intent::SwitchCamera(device_id) => self.switch_camera(device_id).await,
            Intent::ToggleEffect => self.toggle_effect().await,
            Intent::Adjust(adjustment) => {
                self.adjust(adjustment);
                Ok(self.state())
            }
            Intent::ResetSettings => {
                self.reset_settings();
                Ok(self.state())
            }
            Intent::RefreshDevices => self.refresh_devices().await.map(|_| self.state()),
        }
    }

    /// Re-enumerate cameras
    pub async fn refresh_devices(&self) -> Result<Vec<Device>> {
        self.catalog
            .refresh()
            .await
            .map_err(|e| self.publisher.report(ControllerError::from(e)))
    }

    /// Open `device_id`, or the selected/first camera when `None`
    pub async fn start_camera(&self, device_id: Option<String>) -> Result<AppState> {
        let mut inner = self.inner.lock().await;
        self.start_locked(&mut inner, device_id).await
    }

    /// Stop the effect (if on) and release the stream. Never fails.
    pub async fn stop_camera(&self) -> AppState {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await
    }

    /// Start/stop button, decided on the state at the time the intent runs
    pub async fn toggle_camera(&self) -> Result<AppState> {
        let mut inner = self.inner.lock().await;
        match inner.phase {
            CameraPhase::Live { .. } => Ok(self.stop_locked(&mut inner).await),
            CameraPhase::Idle => self.start_locked(&mut inner, None).await,
        }
    }

    /// Move the live camera to `device_id`, keeping the effect on if it was
    ///
    /// With no live camera this only changes the selection.
    pub async fn switch_camera(&self, device_id: String) -> Result<AppState> {
        let mut inner = self.inner.lock().await;

        let resume_effect = match &inner.phase {
            CameraPhase::Idle => {
                self.catalog.select(&device_id);
                tracing::info!(device_id = %device_id, "Camera selected");
                return Ok(AppState::Idle);
            }
            CameraPhase::Live { effect, .. } => !matches!(effect, EffectPhase::Off),
        };

        tracing::info!(device_id = %device_id, resume_effect, "Switching camera");
        inner.close_camera().await;

        if let Err(e) = self.open_camera(&mut inner, Some(device_id)).await {
            self.publisher.publish(&inner);
            return Err(self.publisher.report(e));
        }
        self.publisher.publish(&inner);
        self.publisher.set_status(StatusKind::Active, CAMERA_ACTIVE_STATUS);

        if resume_effect {
            self.enable_effect(inner).await
        } else {
            Ok(inner.phase.snapshot())
        }
    }

    /// Turn background blur on or off
    pub async fn toggle_effect(&self) -> Result<AppState> {
        let inner = self.inner.lock().await;

        match inner.phase.snapshot() {
            AppState::Idle => Err(self.publisher.report(ControllerError::CameraNotActive)),
            AppState::Live {
                effect: EffectState::Loading,
                ..
            } => {
                tracing::debug!("ToggleEffect ignored while the model is loading");
                Err(ControllerError::EffectLoading)
            }
            AppState::Live {
                effect: EffectState::Off,
                ..
            } => self.enable_effect(inner).await,
            AppState::Live {
                effect: EffectState::On,
                ..
            } => Ok(self.disable_effect(inner).await),
        }
    }

    pub fn adjust(&self, adjustment: SettingsAdjustment) -> EffectSettings {
        self.settings.adjust(adjustment)
    }

    pub fn reset_settings(&self) -> EffectSettings {
        self.settings.reset()
    }

    /// Release everything before the process exits
    pub async fn shutdown(&self) {
        self.stop_camera().await;
        tracing::info!("Controller shut down");
    }

    // ---- Transitions (lock held) ----

    async fn start_locked(&self, inner: &mut Inner, device_id: Option<String>) -> Result<AppState> {
        if matches!(inner.phase, CameraPhase::Live { .. }) {
            return Err(self.publisher.report(ControllerError::CameraAlreadyActive));
        }

        match self.open_camera(inner, device_id).await {
            Ok(()) => {
                self.publisher.publish(inner);
                self.publisher.set_status(StatusKind::Active, CAMERA_ACTIVE_STATUS);
                Ok(inner.phase.snapshot())
            }
            Err(e) => Err(self.publisher.report(e)),
        }
    }

    async fn stop_locked(&self, inner: &mut Inner) -> AppState {
        if matches!(inner.phase, CameraPhase::Idle) {
            tracing::debug!("StopCamera with no active camera");
            return AppState::Idle;
        }

        inner.close_camera().await;
        self.publisher.publish(inner);
        self.publisher.set_status(StatusKind::Inactive, CAMERA_STOPPED_STATUS);
        AppState::Idle
    }

    async fn open_camera(&self, inner: &mut Inner, device_id: Option<String>) -> Result<()> {
        if self.catalog.is_empty() {
            if let Err(e) = self.catalog.refresh().await {
                if device_id.is_none() {
                    return Err(e.into());
                }
            }
        }

        let device_id = self.catalog.resolve(device_id.as_deref())?;
        inner.session.acquire(&device_id).await?;
        self.catalog.select(&device_id);

        inner.epoch += 1;
        inner.phase = CameraPhase::Live {
            device_id: device_id.clone(),
            effect: EffectPhase::Off,
        };
        tracing::info!(device_id = %device_id, epoch = inner.epoch, "Camera active");

        // Labels become readable once access has been granted
        if self.catalog.is_empty() || self.catalog.has_anonymous_labels() {
            if let Err(e) = self.catalog.refresh().await {
                tracing::debug!(error = %e, "Label refresh after acquisition failed");
            }
        }

        Ok(())
    }

    async fn enable_effect(&self, mut inner: MutexGuard<'_, Inner>) -> Result<AppState> {
        let epoch = inner.epoch;
        match &mut inner.phase {
            CameraPhase::Live { effect, .. } => *effect = EffectPhase::Loading,
            CameraPhase::Idle => return Err(self.publisher.report(ControllerError::CameraNotActive)),
        }
        self.publisher.publish(&inner);
        if !self.model.is_ready() {
            self.publisher.set_status(StatusKind::Loading, MODEL_LOADING_STATUS);
        }
        drop(inner);

        let loaded = self.model.ensure_loaded().await;

        let mut inner = self.inner.lock().await;
        let still_wanted = inner.epoch == epoch
            && matches!(
                inner.phase,
                CameraPhase::Live {
                    effect: EffectPhase::Loading,
                    ..
                }
            );
        if !still_wanted {
            tracing::info!(epoch, current = inner.epoch, "Discarding stale model load completion");
            return Err(ControllerError::Superseded);
        }

        if let Err(e) = loaded {
            if let CameraPhase::Live { effect, .. } = &mut inner.phase {
                *effect = EffectPhase::Off;
            }
            self.publisher.publish(&inner);
            return Err(self.publisher.report(e.into()));
        }

        let Some(stream) = inner.session.stream() else {
            inner.phase = CameraPhase::Idle;
            self.publisher.publish(&inner);
            return Err(self.publisher.report(ControllerError::CameraNotActive));
        };

        let mut render = RenderLoop::start(
            stream,
            self.surface.clone(),
            Arc::clone(&self.model),
            self.settings.clone(),
            self.refresh.as_ref(),
        );
        if let Some(exit) = render.take_exit() {
            self.watch_stream_end(exit, epoch);
        }
        if let CameraPhase::Live { effect, .. } = &mut inner.phase {
            *effect = EffectPhase::On(render);
        }

        self.publisher.publish(&inner);
        self.publisher.set_status(StatusKind::Active, BLUR_ENABLED_STATUS);
        Ok(inner.phase.snapshot())
    }

    async fn disable_effect(&self, mut inner: MutexGuard<'_, Inner>) -> AppState {
        if let CameraPhase::Live { effect, .. } = &mut inner.phase {
            if let EffectPhase::On(render) = std::mem::replace(effect, EffectPhase::Off) {
                render.stop().await;
            }
        }

        self.publisher.publish(&inner);
        self.publisher.set_status(StatusKind::Active, BLUR_DISABLED_STATUS);
        inner.phase.snapshot()
    }

    /// Drop to `Idle` when the camera stream of epoch `epoch` ends on its own
    fn watch_stream_end(&self, exit: oneshot::Receiver<LoopExit>, epoch: u64) {
        let inner = Arc::clone(&self.inner);
        let publisher = self.publisher.clone();

        tokio::spawn(async move {
            if !matches!(exit.await, Ok(LoopExit::StreamEnded)) {
                return;
            }

            let mut inner = inner.lock().await;
            if inner.epoch != epoch {
                return;
            }

            let device_id = inner.session.device_id().unwrap_or_default().to_string();
            tracing::warn!(device_id = %device_id, epoch, "Camera stream ended unexpectedly");
            inner.close_camera().await;
            publisher.publish(&inner);
            publisher.report(ControllerError::StreamEnded(device_id));
        });
    }
}
