//! Camera device catalog
//!
//! Keeps the last known list of video inputs and the user's selection.
//! Enumeration never asks for permission itself; labels typically become
//! readable only after the first successful stream acquisition.

use std::sync::Arc;

use parking_lot::RwLock;

use super::platform::{Device, DeviceKind, DevicePlatform};
use crate::error::{CameraError, ControllerError};

/// Selectable list of video input devices
pub struct DeviceCatalog {
    platform: Arc<dyn DevicePlatform>,
    devices: RwLock<Vec<Device>>,
    selected: RwLock<Option<String>>,
}

impl DeviceCatalog {
    pub fn new(platform: Arc<dyn DevicePlatform>) -> Self {
        Self {
            platform,
            devices: RwLock::new(Vec::new()),
            selected: RwLock::new(None),
        }
    }

    /// Query the platform and keep the video inputs in platform order.
    ///
    /// On failure the previously known list is left untouched.
    pub async fn refresh(&self) -> Result<Vec<Device>, CameraError> {
        let all = match self.platform.enumerate_devices().await {
            Ok(all) => all,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to enumerate cameras");
                return Err(e);
            }
        };

        let cameras: Vec<Device> = all
            .into_iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .collect();

        {
            let mut selected = self.selected.write();
            let still_present = selected
                .as_ref()
                .is_some_and(|id| cameras.iter().any(|d| &d.id == id));
            if !still_present {
                *selected = cameras.first().map(|d| d.id.clone());
            }
        }

        tracing::debug!(count = cameras.len(), "Camera list refreshed");
        *self.devices.write() = cameras.clone();
        Ok(cameras)
    }

    /// Last known devices
    pub fn devices(&self) -> Vec<Device> {
        self.devices.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// `(id, display label)` pairs for a device picker
    pub fn options(&self) -> Vec<(String, String)> {
        self.devices
            .read()
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.id.clone(), d.display_label(idx)))
            .collect()
    }

    /// Whether any known device still lacks a readable label
    pub fn has_anonymous_labels(&self) -> bool {
        self.devices.read().iter().any(|d| d.label.is_empty())
    }

    /// Remember the user's choice. Unknown ids are accepted; the list may be stale.
    pub fn select(&self, device_id: &str) {
        *self.selected.write() = Some(device_id.to_string());
    }

    pub fn selected(&self) -> Option<String> {
        self.selected.read().clone()
    }

    /// Pick the device to open: explicit id, else the selection, else the first device
    pub fn resolve(&self, explicit: Option<&str>) -> Result<String, ControllerError> {
        if let Some(id) = explicit.filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }

        let devices = self.devices.read();
        if let Some(id) = self.selected.read().as_ref() {
            if devices.iter().any(|d| &d.id == id) {
                return Ok(id.clone());
            }
        }

        devices
            .first()
            .map(|d| d.id.clone())
            .ok_or(ControllerError::NoDeviceSelected)
    }
}
