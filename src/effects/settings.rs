//! User-adjustable bokeh parameters

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FOREGROUND_THRESHOLD: f32 = 0.5;
pub const DEFAULT_BACKGROUND_BLUR: u32 = 10;
pub const DEFAULT_EDGE_BLUR: u32 = 3;

/// Upper bound the controls surface clamps both blur radii to
pub const MAX_BLUR_RADIUS: u32 = 20;

/// Bokeh effect parameters, read once per rendered frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EffectSettings {
    /// Mask probability at or above which a pixel counts as foreground (0.0 - 1.0)
    pub foreground_threshold: f32,
    /// Background blur radius in pixels
    pub background_blur_radius: u32,
    /// Blur applied to the mask edge in pixels
    pub edge_blur_radius: u32,
    /// Flip the output horizontally
    pub mirror: bool,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            foreground_threshold: DEFAULT_FOREGROUND_THRESHOLD,
            background_blur_radius: DEFAULT_BACKGROUND_BLUR,
            edge_blur_radius: DEFAULT_EDGE_BLUR,
            mirror: false,
        }
    }
}

impl EffectSettings {
    /// Restore the documented defaults
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One slider/checkbox change from the controls surface
///
/// Values are clamped here, before they reach [`EffectSettings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingsAdjustment {
    ForegroundThreshold(f32),
    BackgroundBlur(i64),
    EdgeBlur(i64),
    Mirror(bool),
}

fn clamp_radius(value: i64) -> u32 {
    value.clamp(0, MAX_BLUR_RADIUS as i64) as u32
}

impl SettingsAdjustment {
    /// Apply to `settings`, returning whether anything changed
    pub fn apply_to(self, settings: &mut EffectSettings) -> bool {
        let before = *settings;
        match self {
            SettingsAdjustment::ForegroundThreshold(v) => {
                if v.is_nan() {
                    tracing::debug!("Ignoring NaN foreground threshold");
                } else {
                    settings.foreground_threshold = v.clamp(0.0, 1.0);
                }
            }
            SettingsAdjustment::BackgroundBlur(v) => settings.background_blur_radius = clamp_radius(v),
            SettingsAdjustment::EdgeBlur(v) => settings.edge_blur_radius = clamp_radius(v),
            SettingsAdjustment::Mirror(v) => settings.mirror = v,
        }
        before != *settings
    }
}

/// The single shared settings record
///
/// Writers are UI intents; the render loop copies the whole record at the
/// start of each step so a step never sees a half-applied change.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<EffectSettings>>,
}

impl SharedSettings {
    pub fn new(initial: EffectSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Copy of the current values
    pub fn snapshot(&self) -> EffectSettings {
        *self.inner.read()
    }

    /// Apply a clamped adjustment and return the resulting values
    pub fn adjust(&self, adjustment: SettingsAdjustment) -> EffectSettings {
        let mut settings = self.inner.write();
        if adjustment.apply_to(&mut settings) {
            tracing::debug!(?adjustment, "Effect settings changed");
        }
        *settings
    }

    /// Restore defaults and return them
    pub fn reset(&self) -> EffectSettings {
        let mut settings = self.inner.write();
        settings.reset();
        *settings
    }
}
