//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use parking_lot::Mutex;
use tokio::sync::watch;

use bokeh_cam::app::{AppComponents, AppController};
use bokeh_cam::camera::{CameraFrame, CameraSession, Device, DeviceCatalog, DevicePlatform, Resolution, VideoStream};
use bokeh_cam::effects::{EffectSettings, SharedSettings};
use bokeh_cam::error::{CameraError, ModelError};
use bokeh_cam::ml::{EffectModel, ModelConfig, ModelHandle, SegmentationBackend, SegmentationMask};
use bokeh_cam::render::{CompositedFrame, FixedRateRefresh, FrameSink, OutputSurface};

pub const FRAME_SIZE: u32 = 2;

/// Red channel value of every pixel streamed by the camera at `index`
pub fn marker(index: usize) -> u8 {
    (index as u8 + 1) * 50
}

/// Camera platform that records every open and close
///
/// Device labels stay empty until a stream has been opened once.
pub struct MockPlatform {
    devices: Vec<Device>,
    events: Arc<Mutex<Vec<String>>>,
    live: Arc<AtomicUsize>,
    frozen: AtomicBool,
    granted: AtomicBool,
    open_error: Mutex<Option<CameraError>>,
    open_delay: Mutex<Duration>,
    enumeration_error: Mutex<Option<CameraError>>,
    enumerations: AtomicUsize,
    streams: Mutex<Vec<Arc<MockStream>>>,
}

impl MockPlatform {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            devices: ids.iter().map(|id| Device::video_input(*id, "")).collect(),
            events: Arc::new(Mutex::new(Vec::new())),
            live: Arc::new(AtomicUsize::new(0)),
            frozen: AtomicBool::new(false),
            granted: AtomicBool::new(false),
            open_error: Mutex::new(None),
            open_delay: Mutex::new(Duration::ZERO),
            enumeration_error: Mutex::new(None),
            enumerations: AtomicUsize::new(0),
            streams: Mutex::new(Vec::new()),
        }
    }

    /// Opens take `delay` before the stream is handed out
    pub fn slow_open(&self, delay: Duration) {
        *self.open_delay.lock() = delay;
    }

    pub fn fail_enumeration(&self, error: Option<CameraError>) {
        *self.enumeration_error.lock() = error;
    }

    /// Number of `enumerate_devices` calls, failed ones included
    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::Acquire)
    }

    /// Most recently opened stream
    pub fn last_stream(&self) -> Option<Arc<MockStream>> {
        self.streams.lock().last().cloned()
    }

    /// Streams opened from now on repeat a single frame
    pub fn freeze_frames(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn fail_open(&self, error: Option<CameraError>) {
        *self.open_error.lock() = error;
    }

    /// `open:<id>` / `close:<id>` in order
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn open(&self, device_id: &str) -> Arc<MockStream> {
        let index = self
            .devices
            .iter()
            .position(|d| d.id == device_id)
            .unwrap_or(0);
        self.live.fetch_add(1, Ordering::AcqRel);
        self.granted.store(true, Ordering::Release);
        self.events.lock().push(format!("open:{}", device_id));
        let stream = Arc::new(MockStream {
            device_id: device_id.to_string(),
            marker: marker(index),
            next_frame: AtomicU64::new(0),
            frozen: self.frozen.load(Ordering::Acquire),
            live: AtomicBool::new(true),
            events: Arc::clone(&self.events),
            platform_live: Arc::clone(&self.live),
        });
        self.streams.lock().push(Arc::clone(&stream));
        stream
    }
}

#[async_trait]
impl DevicePlatform for MockPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<Device>, CameraError> {
        self.enumerations.fetch_add(1, Ordering::AcqRel);
        if let Some(e) = self.enumeration_error.lock().clone() {
            return Err(e);
        }
        if !self.granted.load(Ordering::Acquire) {
            return Ok(self.devices.clone());
        }
        Ok(self
            .devices
            .iter()
            .map(|d| Device::video_input(d.id.clone(), format!("Webcam {}", d.id)))
            .collect())
    }

    async fn open_stream(&self, device_id: &str, _hint: Resolution) -> Result<Arc<dyn VideoStream>, CameraError> {
        let delay = *self.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.open_error.lock().clone() {
            return Err(e);
        }
        if !self.devices.iter().any(|d| d.id == device_id) {
            return Err(CameraError::DeviceNotFound(device_id.to_string()));
        }
        Ok(self.open(device_id))
    }
}

/// Stream whose frame number advances on every read
pub struct MockStream {
    device_id: String,
    marker: u8,
    next_frame: AtomicU64,
    frozen: bool,
    live: AtomicBool,
    events: Arc<Mutex<Vec<String>>>,
    platform_live: Arc<AtomicUsize>,
}

impl VideoStream for MockStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn latest_frame(&self) -> Option<CameraFrame> {
        if !self.is_live() {
            return None;
        }
        let frame_number = if self.frozen {
            0
        } else {
            self.next_frame.fetch_add(1, Ordering::Relaxed)
        };
        let data = [self.marker, 0, 0, 255].repeat((FRAME_SIZE * FRAME_SIZE) as usize);
        Some(CameraFrame::new(data, FRAME_SIZE, FRAME_SIZE, frame_number))
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::AcqRel) {
            self.platform_live.fetch_sub(1, Ordering::AcqRel);
            self.events.lock().push(format!("close:{}", self.device_id));
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

struct MockModel;

/// Segmenter whose loads wait on a gate
pub struct GatedSegmenter {
    gate: watch::Sender<bool>,
    loads: AtomicUsize,
    fail_loads: AtomicBool,
    failing_frames: Mutex<HashSet<u64>>,
}

impl GatedSegmenter {
    pub fn open() -> Self {
        Self::with_gate(true)
    }

    pub fn closed() -> Self {
        Self::with_gate(false)
    }

    fn with_gate(open: bool) -> Self {
        let (gate, _) = watch::channel(open);
        Self {
            gate,
            loads: AtomicUsize::new(0),
            fail_loads: AtomicBool::new(false),
            failing_frames: Mutex::new(HashSet::new()),
        }
    }

    /// Let pending and future loads finish
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Release);
    }

    /// Frames with these numbers fail to segment
    pub fn fail_frames(&self, frames: impl IntoIterator<Item = u64>) {
        self.failing_frames.lock().extend(frames);
    }
}

#[async_trait]
impl SegmentationBackend for GatedSegmenter {
    async fn load(&self, _config: &ModelConfig) -> Result<ModelHandle, ModelError> {
        self.loads.fetch_add(1, Ordering::AcqRel);
        let mut gate = self.gate.subscribe();
        let opened = gate.wait_for(|open| *open).await.is_ok();
        if !opened {
            return Err(ModelError::Load("gate dropped".to_string()));
        }
        if self.fail_loads.load(Ordering::Acquire) {
            return Err(ModelError::Load("mock load failure".to_string()));
        }
        Ok(ModelHandle::new("mock", MockModel))
    }

    async fn segment(&self, _model: &ModelHandle, frame: &CameraFrame) -> Result<SegmentationMask, ModelError> {
        if self.failing_frames.lock().contains(&frame.frame_number) {
            return Err(ModelError::FrameProcessing(format!("bad frame {}", frame.frame_number)));
        }
        Ok(SegmentationMask::new(vec![1.0], 1, 1))
    }

    async fn composite_bokeh(
        &self,
        frame: &CameraFrame,
        _mask: &SegmentationMask,
        _settings: &EffectSettings,
    ) -> Result<RgbaImage, ModelError> {
        frame
            .to_image()
            .ok_or_else(|| ModelError::FrameProcessing("malformed frame".to_string()))
    }
}

/// A frame as seen by the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presented {
    pub frame_number: u64,
    pub marker: u8,
}

/// Sink that keeps every presented frame
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<Presented>>,
    clears: AtomicUsize,
}

impl RecordingSink {
    pub fn frames(&self) -> Vec<Presented> {
        self.frames.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::Acquire)
    }
}

impl FrameSink for RecordingSink {
    fn present(&self, frame: CompositedFrame) {
        self.frames.lock().push(Presented {
            frame_number: frame.frame_number,
            marker: frame.image.get_pixel(0, 0)[0],
        });
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::AcqRel);
    }
}

/// Everything a controller test needs to observe
pub struct Harness {
    pub platform: Arc<MockPlatform>,
    pub segmenter: Arc<GatedSegmenter>,
    pub sink: Arc<RecordingSink>,
    pub controller: Arc<AppController>,
}

pub fn model_config() -> ModelConfig {
    ModelConfig {
        load_delay_ms: 0,
        ..ModelConfig::default()
    }
}

pub fn harness(ids: &[&str], segmenter: GatedSegmenter) -> Harness {
    let platform = Arc::new(MockPlatform::new(ids));
    let segmenter = Arc::new(segmenter);
    let sink = Arc::new(RecordingSink::default());

    let controller = AppController::new(AppComponents {
        catalog: Arc::new(DeviceCatalog::new(platform.clone())),
        session: CameraSession::new(platform.clone(), Resolution::new(FRAME_SIZE, FRAME_SIZE)),
        model: Arc::new(EffectModel::new(segmenter.clone(), model_config())),
        settings: SharedSettings::default(),
        surface: OutputSurface::new(sink.clone()),
        refresh: Arc::new(FixedRateRefresh::new(500)),
    });

    Harness {
        platform,
        segmenter,
        sink,
        controller: Arc::new(controller),
    }
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
