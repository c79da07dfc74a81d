//! Native camera capture
//!
//! Uses nokhwa on a dedicated capture thread per stream. The latest decoded
//! frame is published through a triple buffer so readers never wait on the
//! camera.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::camera::{CameraFrame, Device, DevicePlatform, Resolution, VideoStream};
use crate::error::CameraError;

/// Cameras reported by the operating system
#[derive(Debug, Default)]
pub struct NokhwaPlatform;

impl NokhwaPlatform {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DevicePlatform for NokhwaPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<Device>, CameraError> {
        let cameras = tokio::task::spawn_blocking(|| nokhwa::query(ApiBackend::Auto))
            .await
            .map_err(|e| CameraError::DeviceQuery(e.to_string()))?
            .map_err(|e| CameraError::DeviceQuery(e.to_string()))?;

        Ok(cameras
            .iter()
            .map(|info| Device::video_input(info.index().as_string(), info.human_name()))
            .collect())
    }

    async fn open_stream(
        &self,
        device_id: &str,
        hint: Resolution,
    ) -> Result<Arc<dyn VideoStream>, CameraError> {
        let stream = NativeStream::open(device_id, hint).await?;
        Ok(Arc::new(stream))
    }
}

type FrameSlots = [Arc<Mutex<Option<CameraFrame>>>; 3];

/// One open camera
pub struct NativeStream {
    device_id: String,
    /// Triple-buffered latest frame
    frames: FrameSlots,
    /// Write index of the latest complete frame
    latest_frame_idx: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

struct CaptureContext {
    index: CameraIndex,
    hint: Resolution,
    frames: FrameSlots,
    latest_frame_idx: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl NativeStream {
    /// Spawn the capture thread and wait until the camera stream is open
    async fn open(device_id: &str, hint: Resolution) -> Result<Self, CameraError> {
        let frames: FrameSlots = [
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
        ];
        let latest_frame_idx = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let ctx = CaptureContext {
            index: parse_index(device_id),
            hint,
            frames: frames.clone(),
            latest_frame_idx: Arc::clone(&latest_frame_idx),
            running: Arc::clone(&running),
        };
        let (opened_tx, opened_rx) = oneshot::channel();

        let thread_handle = std::thread::Builder::new()
            .name(format!("camera-capture-{}", device_id))
            .spawn(move || ctx.run(opened_tx))
            .map_err(|e| CameraError::Capture(format!("failed to spawn capture thread: {}", e)))?;

        let opened = opened_rx
            .await
            .unwrap_or_else(|_| Err(CameraError::Capture("capture thread exited".to_string())));
        if let Err(e) = opened {
            running.store(false, Ordering::Release);
            join_capture_thread(thread_handle, device_id.to_string());
            return Err(e);
        }

        Ok(Self {
            device_id: device_id.to_string(),
            frames,
            latest_frame_idx,
            running,
            thread_handle: Mutex::new(Some(thread_handle)),
        })
    }
}

impl VideoStream for NativeStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn latest_frame(&self) -> Option<CameraFrame> {
        let idx = self.latest_frame_idx.load(Ordering::Acquire);
        let slot = (idx % 3) as usize;
        self.frames[slot].lock().clone()
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.lock().take() {
            join_capture_thread(handle, self.device_id.clone());
        }
    }

    fn is_live(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl CaptureContext {
    fn run(self, opened: oneshot::Sender<Result<(), CameraError>>) {
        let mut camera = match self.open_camera() {
            Ok(camera) => camera,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                let _ = opened.send(Err(e));
                return;
            }
        };

        tracing::info!(
            camera = %camera.info().human_name(),
            width = camera.resolution().width(),
            height = camera.resolution().height(),
            "Camera opened"
        );
        let _ = opened.send(Ok(()));

        let mut write_idx: u64 = 0;
        let mut frame_count: u64 = 0;

        while self.running.load(Ordering::Acquire) {
            let frame = match camera.frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to capture frame");
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
            };

            let image = match frame.decode_image::<RgbAFormat>() {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to decode frame");
                    continue;
                }
            };

            let (width, height) = image.dimensions();
            let camera_frame = CameraFrame::new(image.into_raw(), width, height, frame_count);
            frame_count += 1;

            let slot = (write_idx % 3) as usize;
            *self.frames[slot].lock() = Some(camera_frame);
            self.latest_frame_idx.store(write_idx, Ordering::Release);
            write_idx = write_idx.wrapping_add(1);
        }

        if let Err(e) = camera.stop_stream() {
            tracing::warn!(error = %e, "Failed to stop camera stream");
        }
        tracing::info!(frames = frame_count, "Camera capture thread stopped");
    }

    /// Try the resolution hint first, then progressively looser formats
    fn open_camera(&self) -> Result<Camera, CameraError> {
        let attempts = [
            RequestedFormatType::HighestResolution(nokhwa::utils::Resolution::new(
                self.hint.width,
                self.hint.height,
            )),
            RequestedFormatType::AbsoluteHighestResolution,
            RequestedFormatType::None,
        ];

        let mut last_error = None;
        for format in attempts {
            let requested = RequestedFormat::new::<RgbAFormat>(format);
            match Camera::new(self.index.clone(), requested) {
                Ok(mut camera) => {
                    return match camera.open_stream() {
                        Ok(()) => Ok(camera),
                        Err(e) => Err(classify_error(&self.index.as_string(), &e.to_string())),
                    };
                }
                Err(e) => {
                    tracing::debug!(format = ?format, error = %e, "Camera format rejected");
                    last_error = Some(e.to_string());
                }
            }
        }

        let message = last_error.unwrap_or_else(|| "no format accepted".to_string());
        Err(classify_error(&self.index.as_string(), &message))
    }
}

/// Device ids are the platform index rendered as a string
fn parse_index(device_id: &str) -> CameraIndex {
    match device_id.parse::<u32>() {
        Ok(index) => CameraIndex::Index(index),
        Err(_) => CameraIndex::String(device_id.to_string()),
    }
}

/// Map a backend error message onto the camera error taxonomy
fn classify_error(device_id: &str, message: &str) -> CameraError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        CameraError::PermissionDenied(message.to_string())
    } else if lower.contains("not found") || lower.contains("no such") || lower.contains("out of range") {
        CameraError::DeviceNotFound(format!("{}: {}", device_id, message))
    } else {
        CameraError::Capture(message.to_string())
    }
}

/// Wait for a capture thread to exit.
///
/// Inside a tokio runtime the join moves to the blocking pool, since the
/// thread may sit in a driver frame read for up to one frame interval.
fn join_capture_thread(handle: JoinHandle<()>, device_id: String) {
    let join = move || {
        if handle.join().is_err() {
            tracing::warn!(device_id = %device_id, "Camera capture thread panicked");
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(join);
        }
        Err(_) => join(),
    }
}
