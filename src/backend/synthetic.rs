//! Synthetic backends
//!
//! A test-pattern camera platform and a stand-in segmenter. They exercise
//! the whole pipeline without camera hardware or model files, and drive the
//! demo binary.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::RgbaImage;
use parking_lot::RwLock;

use crate::camera::{CameraFrame, Device, DeviceKind, DevicePlatform, Resolution, VideoStream};
use crate::effects::{bokeh, EffectSettings};
use crate::error::{CameraError, ModelError};
use crate::ml::{ModelConfig, ModelHandle, SegmentationBackend, SegmentationMask};

const PATTERN_FPS: f64 = 30.0;

/// Camera platform producing moving gradient test patterns
pub struct TestPatternPlatform {
    devices: RwLock<Vec<Device>>,
    enumeration_error: RwLock<Option<CameraError>>,
    open_error: RwLock<Option<CameraError>>,
    live: Arc<AtomicUsize>,
}

impl TestPatternPlatform {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: RwLock::new(devices),
            enumeration_error: RwLock::new(None),
            open_error: RwLock::new(None),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `count` cameras with ids `synthetic-N` and labels `Test Pattern N`
    pub fn with_cameras(count: usize) -> Self {
        let devices = (0..count)
            .map(|i| Device::video_input(format!("synthetic-{}", i), format!("Test Pattern {}", i + 1)))
            .collect();
        Self::new(devices)
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.write() = devices;
    }

    /// Make enumeration fail with `error` until cleared with `None`
    pub fn fail_enumeration(&self, error: Option<CameraError>) {
        *self.enumeration_error.write() = error;
    }

    /// Make stream acquisition fail with `error` until cleared with `None`
    pub fn fail_open(&self, error: Option<CameraError>) {
        *self.open_error.write() = error;
    }

    /// Streams opened and not yet stopped
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

#[async_trait]
impl DevicePlatform for TestPatternPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<Device>, CameraError> {
        if let Some(e) = self.enumeration_error.read().clone() {
            return Err(e);
        }
        Ok(self.devices.read().clone())
    }

    async fn open_stream(
        &self,
        device_id: &str,
        hint: Resolution,
    ) -> Result<Arc<dyn VideoStream>, CameraError> {
        if let Some(e) = self.open_error.read().clone() {
            return Err(e);
        }

        let seed = self
            .devices
            .read()
            .iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .position(|d| d.id == device_id)
            .ok_or_else(|| CameraError::DeviceNotFound(device_id.to_string()))?;

        self.live.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(TestPatternStream {
            device_id: device_id.to_string(),
            resolution: hint,
            seed: seed as u8,
            started: Instant::now(),
            live: AtomicBool::new(true),
            platform_live: Arc::clone(&self.live),
        }))
    }
}

/// Stream whose frames are generated on demand from the elapsed time
pub struct TestPatternStream {
    device_id: String,
    resolution: Resolution,
    seed: u8,
    started: Instant,
    live: AtomicBool,
    platform_live: Arc<AtomicUsize>,
}

impl TestPatternStream {
    fn render(&self, frame_number: u64) -> Vec<u8> {
        let Resolution { width, height } = self.resolution;
        let shift = (frame_number % 256) as u32;
        let tint = self.seed.wrapping_mul(80);
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let r = ((x * 255 / width.max(1) + shift) % 256) as u8;
                let g = (y * 255 / height.max(1)) as u8;
                data.extend_from_slice(&[r, g, tint, 255]);
            }
        }
        data
    }
}

impl VideoStream for TestPatternStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn latest_frame(&self) -> Option<CameraFrame> {
        if !self.is_live() {
            return None;
        }
        let frame_number = (self.started.elapsed().as_secs_f64() * PATTERN_FPS) as u64;
        Some(CameraFrame::new(
            self.render(frame_number),
            self.resolution.width,
            self.resolution.height,
            frame_number,
        ))
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::AcqRel) {
            self.platform_live.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(device_id = %self.device_id, "Stopped test pattern track");
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

impl Drop for TestPatternStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Marker stored in synthetic model handles
struct SyntheticModel;

/// Segmenter that treats a centred ellipse as the person
#[derive(Default)]
pub struct SyntheticSegmenter {
    fail_loads: AtomicBool,
}

impl SyntheticSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent loads fail
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Release);
    }
}

#[async_trait]
impl SegmentationBackend for SyntheticSegmenter {
    async fn load(&self, config: &ModelConfig) -> Result<ModelHandle, ModelError> {
        if config.load_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.load_delay_ms)).await;
        }
        if self.fail_loads.load(Ordering::Acquire) {
            return Err(ModelError::Load("synthetic model unavailable".to_string()));
        }
        Ok(ModelHandle::new("synthetic-ellipse", SyntheticModel))
    }

    async fn segment(&self, model: &ModelHandle, _frame: &CameraFrame) -> Result<SegmentationMask, ModelError> {
        if model.downcast_ref::<SyntheticModel>().is_none() {
            return Err(ModelError::FrameProcessing(format!("foreign model handle {}", model.name())));
        }

        const SIZE: u32 = 64;
        let mask = (0..SIZE * SIZE)
            .map(|i| {
                let x = (i % SIZE) as f32 / SIZE as f32 - 0.5;
                let y = (i / SIZE) as f32 / SIZE as f32 - 0.5;
                // Upright ellipse, soft falloff near the border
                let d = (x / 0.3).powi(2) + (y / 0.45).powi(2);
                (1.5 - d).clamp(0.0, 1.0)
            })
            .collect();
        Ok(SegmentationMask::new(mask, SIZE, SIZE))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_device_not_found() {
        let platform = TestPatternPlatform::with_cameras(1);
        let err = platform.open_stream("nope", Resolution::default()).await.err();
        assert_eq!(err, Some(CameraError::DeviceNotFound("nope".to_string())));
        assert_eq!(platform.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_stream_stop_is_counted_once() {
        let platform = TestPatternPlatform::with_cameras(2);
        let stream = platform
            .open_stream("synthetic-1", Resolution::new(8, 4))
            .await
            .unwrap();
        assert_eq!(platform.live_streams(), 1);

        let frame = stream.latest_frame().unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert!(frame.is_well_formed());

        stream.stop();
        stream.stop();
        assert_eq!(platform.live_streams(), 0);
        assert!(stream.latest_frame().is_none());
    }

    #[tokio::test]
    async fn test_segmenter_mask_marks_centre() {
        let segmenter = SyntheticSegmenter::new();
        let handle = segmenter.load(&ModelConfig { load_delay_ms: 0, ..Default::default() }).await.unwrap();
        let frame = CameraFrame::new(vec![0; 4 * 4 * 4], 4, 4, 0);
        let mask = segmenter.segment(&handle, &frame).await.unwrap();
        assert_eq!(mask.sample(0.5, 0.5), 1.0);
        assert_eq!(mask.sample(0.0, 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_segmenter_load_failure() {
        let segmenter = SyntheticSegmenter::new();
        segmenter.set_fail_loads(true);
        let err = segmenter.load(&ModelConfig { load_delay_ms: 0, ..Default::default() }).await.unwrap_err();
        assert!(matches!(err, ModelError::Load(_)));
    }
}
