//! Camera session: ownership of the single live stream

use std::sync::Arc;

use super::platform::{DevicePlatform, Resolution, VideoStream};
use crate::error::CameraError;

struct OpenStream {
    device_id: String,
    stream: Arc<dyn VideoStream>,
}

/// Owns at most one live camera stream
///
/// A stream is always released before a new one is requested, including when
/// the new request fails, so the camera hardware lock is never leaked.
pub struct CameraSession {
    platform: Arc<dyn DevicePlatform>,
    resolution: Resolution,
    open: Option<OpenStream>,
}

impl CameraSession {
    pub fn new(platform: Arc<dyn DevicePlatform>, resolution: Resolution) -> Self {
        Self {
            platform,
            resolution,
            open: None,
        }
    }

    /// Release any open stream, then open `device_id`
    pub async fn acquire(&mut self, device_id: &str) -> Result<Arc<dyn VideoStream>, CameraError> {
        self.release();

        tracing::info!(
            device_id,
            width = self.resolution.width,
            height = self.resolution.height,
            "Opening camera stream"
        );

        let stream = self.platform.open_stream(device_id, self.resolution).await?;
        if stream.device_id() != device_id {
            tracing::warn!(
                requested = device_id,
                opened = stream.device_id(),
                "Platform opened a different device than requested"
            );
        }

        self.open = Some(OpenStream {
            device_id: device_id.to_string(),
            stream: Arc::clone(&stream),
        });
        Ok(stream)
    }

    /// Stop all tracks of the open stream. Returns `false` if nothing was open.
    pub fn release(&mut self) -> bool {
        match self.open.take() {
            Some(open) => {
                open.stream.stop();
                tracing::info!(device_id = %open.device_id, "Camera stream released");
                true
            }
            None => false,
        }
    }

    /// The live stream, if any
    pub fn stream(&self) -> Option<Arc<dyn VideoStream>> {
        self.open.as_ref().map(|o| Arc::clone(&o.stream))
    }

    /// Device the open stream was acquired for
    pub fn device_id(&self) -> Option<&str> {
        self.open.as_ref().map(|o| o.device_id.as_str())
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}
