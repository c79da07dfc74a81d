//! Device capability interface
//!
//! The platform enumerates capture devices and opens live streams. Backends
//! live in [`crate::backend`]; tests inject their own implementations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::CameraFrame;
use crate::error::CameraError;

/// Kind of media device reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// Immutable snapshot of a platform device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Opaque platform identifier, stable within a session
    pub id: String,
    /// Human-readable label; empty until permission has been granted
    pub label: String,
    pub kind: DeviceKind,
}

impl Device {
    /// Create a video input device
    pub fn video_input(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: DeviceKind::VideoInput,
        }
    }

    /// Label for display, falling back to "Camera N" (1-based) when the
    /// platform has not disclosed one yet
    pub fn display_label(&self, index: usize) -> String {
        if self.label.is_empty() {
            format!("Camera {}", index + 1)
        } else {
            self.label.clone()
        }
    }
}

/// Preferred capture resolution. Advisory: the platform may pick another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

/// A live camera stream
///
/// Dropping the last reference does not have to stop the hardware; owners
/// call [`VideoStream::stop`] explicitly.
pub trait VideoStream: Send + Sync {
    /// Device the stream was opened with
    fn device_id(&self) -> &str;

    /// Latest captured frame, `None` until the first frame arrives
    fn latest_frame(&self) -> Option<CameraFrame>;

    /// Stop all tracks. Must be idempotent.
    fn stop(&self);

    /// Whether the tracks are still running
    fn is_live(&self) -> bool;
}

/// Platform device access
#[async_trait]
pub trait DevicePlatform: Send + Sync {
    /// List every media device in platform order
    async fn enumerate_devices(&self) -> Result<Vec<Device>, CameraError>;

    /// Open a capture stream bound to `device_id`
    async fn open_stream(
        &self,
        device_id: &str,
        hint: Resolution,
    ) -> Result<Arc<dyn VideoStream>, CameraError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_label_fallback() {
        let anonymous = Device::video_input("abc", "");
        assert_eq!(anonymous.display_label(0), "Camera 1");
        assert_eq!(anonymous.display_label(2), "Camera 3");

        let named = Device::video_input("abc", "FaceTime HD");
        assert_eq!(named.display_label(0), "FaceTime HD");
    }

    #[test]
    fn test_default_resolution_hint() {
        assert_eq!(Resolution::default(), Resolution::new(640, 480));
    }
}
