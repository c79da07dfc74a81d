//! Effects module
//!
//! Background blur ("bokeh") settings and the CPU compositor used by the
//! bundled segmentation backends.

pub mod bokeh;
pub mod settings;

pub use settings::{EffectSettings, SettingsAdjustment, SharedSettings, MAX_BLUR_RADIUS};
