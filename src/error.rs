//! Error types for bokeh-cam
//!
//! Every failure in this crate is recoverable by retrying the user intent
//! that caused it. The enums are `Clone` so a single model-load failure can
//! be handed to every task waiting on the same load.

use thiserror::Error;

/// Errors raised by the camera platform (enumeration and stream acquisition)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// The platform refused to list devices (e.g. insecure context)
    #[error("device query failed: {0}")]
    DeviceQuery(String),

    /// The user or the platform denied camera access
    #[error("camera access denied: {0}")]
    PermissionDenied(String),

    /// The requested device does not exist (unplugged, stale id)
    #[error("camera not found: {0}")]
    DeviceNotFound(String),

    /// Any other transient capture failure
    #[error("capture error: {0}")]
    Capture(String),
}

/// Errors raised by the segmentation model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The model could not be loaded
    #[error("failed to load segmentation model: {0}")]
    Load(String),

    /// A frame was submitted before the model finished loading
    #[error("segmentation model is not loaded")]
    NotReady,

    /// A single frame failed to segment or composite
    #[error("frame processing failed: {0}")]
    FrameProcessing(String),
}

/// Errors surfaced to the user by [`crate::app::AppController`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// No device could be resolved (empty catalog)
    #[error("no camera selected")]
    NoDeviceSelected,

    /// The intent requires a live camera
    #[error("camera is not active")]
    CameraNotActive,

    /// StartCamera while a camera is already live
    #[error("camera is already active")]
    CameraAlreadyActive,

    /// ToggleEffect while the model load for a previous toggle is pending
    #[error("effect model is still loading")]
    EffectLoading,

    /// A later intent changed the camera while this one was suspended
    #[error("superseded by a later camera change")]
    Superseded,

    /// The live stream stopped delivering frames on its own
    #[error("camera stream ended: {0}")]
    StreamEnded(String),
}

impl ControllerError {
    /// Status-line text shown to the user for this error
    pub fn user_message(&self) -> String {
        match self {
            ControllerError::Camera(CameraError::DeviceQuery(_)) => {
                "Error accessing camera list. Please check permissions.".to_string()
            }
            ControllerError::Camera(CameraError::PermissionDenied(_)) => {
                "Camera access denied. Please grant camera permissions and try again.".to_string()
            }
            ControllerError::Camera(CameraError::DeviceNotFound(_)) => {
                "Camera not found. Please check your camera connection.".to_string()
            }
            ControllerError::Camera(CameraError::Capture(_)) => {
                "Error starting camera. Please try a different camera.".to_string()
            }
            ControllerError::Model(ModelError::Load(_)) => {
                "Failed to load the segmentation model. Please try again.".to_string()
            }
            ControllerError::Model(e) => format!("Background blur error: {}", e),
            ControllerError::NoDeviceSelected => "Please select a camera first.".to_string(),
            ControllerError::CameraNotActive => "Start the camera before enabling blur.".to_string(),
            ControllerError::CameraAlreadyActive => "Camera is already running.".to_string(),
            ControllerError::EffectLoading => "AI model is still loading...".to_string(),
            ControllerError::Superseded => "Camera changed before the request finished.".to_string(),
            ControllerError::StreamEnded(_) => {
                "Camera disconnected. Please check your camera connection and start it again."
                    .to_string()
            }
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used by the controller
pub type Result<T, E = ControllerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_follow_error_kind() {
        let denied = ControllerError::from(CameraError::PermissionDenied("NotAllowedError".into()));
        assert!(denied.user_message().starts_with("Camera access denied"));

        let missing = ControllerError::from(CameraError::DeviceNotFound("cam-9".into()));
        assert!(missing.user_message().starts_with("Camera not found"));

        let other = ControllerError::from(CameraError::Capture("busy".into()));
        assert!(other.user_message().contains("try a different camera"));

        assert_eq!(
            ControllerError::NoDeviceSelected.user_message(),
            "Please select a camera first."
        );

        let ended = ControllerError::StreamEnded("cam-a".into());
        assert!(ended.user_message().starts_with("Camera disconnected"));
        assert_eq!(ended.to_string(), "camera stream ended: cam-a");
    }

    #[test]
    fn test_transparent_display() {
        let err = ControllerError::from(ModelError::NotReady);
        assert_eq!(err.to_string(), "segmentation model is not loaded");
    }
}
