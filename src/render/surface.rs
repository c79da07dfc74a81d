//! Output surface and display refresh signal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use tokio::time::{Interval, MissedTickBehavior};

/// A composited frame ready for display
#[derive(Clone, Debug)]
pub struct CompositedFrame {
    pub image: RgbaImage,
    /// Number of the camera frame this was computed from
    pub frame_number: u64,
}

/// Where composited frames are written
pub trait FrameSink: Send + Sync {
    /// Show a composited frame
    fn present(&self, frame: CompositedFrame);

    /// Stop showing composited output and fall back to the raw video
    fn clear(&self) {}
}

/// A sink plus its binding to at most one render loop
#[derive(Clone)]
pub struct OutputSurface {
    sink: Arc<dyn FrameSink>,
    bound: Arc<AtomicBool>,
}

impl OutputSurface {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self {
            sink,
            bound: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a render loop currently owns this surface
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    /// Claim the surface for a render loop. Returns `false` if already claimed.
    pub(crate) fn bind(&self) -> bool {
        self.bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn unbind(&self) {
        self.sink.clear();
        self.bound.store(false, Ordering::Release);
    }

    pub(crate) fn present(&self, frame: CompositedFrame) {
        self.sink.present(frame);
    }
}

/// One tick per displayed frame
#[async_trait]
pub trait FrameTicker: Send {
    /// Wait for the next display refresh
    async fn tick(&mut self);
}

/// Source of display refresh signals
pub trait DisplayRefresh: Send + Sync {
    /// New ticker for a render loop
    fn ticker(&self) -> Box<dyn FrameTicker>;
}

/// Refresh signal at a fixed frame rate
///
/// Ticks missed while a slow step runs are skipped, never replayed.
#[derive(Debug, Clone, Copy)]
pub struct FixedRateRefresh {
    fps: u32,
}

impl FixedRateRefresh {
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000u64 / self.fps as u64)
    }
}

struct IntervalTicker {
    interval: Interval,
}

#[async_trait]
impl FrameTicker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

impl DisplayRefresh for FixedRateRefresh {
    fn ticker(&self) -> Box<dyn FrameTicker> {
        let mut interval = tokio::time::interval(self.frame_duration());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Box::new(IntervalTicker { interval })
    }
}
