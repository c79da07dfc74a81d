//! Camera module
//!
//! Device enumeration, stream ownership and the frame type shared with the
//! render loop. Platform access goes through [`DevicePlatform`] so the
//! controller never touches a concrete capture backend.

pub mod catalog;
pub mod frame;
pub mod platform;
pub mod session;

pub use catalog::DeviceCatalog;
pub use frame::CameraFrame;
pub use platform::{Device, DeviceKind, DevicePlatform, Resolution, VideoStream};
pub use session::CameraSession;
