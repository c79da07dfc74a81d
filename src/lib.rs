//! Bokeh Cam - live camera background blur
//!
//! Coordinates the camera device lifecycle, a lazily loaded person
//! segmentation model and a per-frame render loop that composites a bokeh
//! (background blur) effect onto an output surface. Camera and model
//! capabilities are injected as traits; synthetic implementations drive the
//! demo binary and the tests.

pub mod app;
pub mod backend;
pub mod camera;
pub mod config;
pub mod effects;
pub mod error;
pub mod ml;
pub mod render;
pub mod telemetry;

pub use app::{AppController, AppState, EffectState, Intent, StatusKind, StatusMessage};
pub use config::AppConfig;
pub use error::{CameraError, ControllerError, ModelError};
