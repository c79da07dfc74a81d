//! Telemetry
//!
//! Structured logging with tracing.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogGuard};
