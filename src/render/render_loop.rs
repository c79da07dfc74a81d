//! Per-frame bokeh render loop
//!
//! Each step reads the latest camera frame, runs the effect model with a copy
//! of the current settings, and presents the result. The next step is only
//! awaited after the previous one completes, so slow frames never pile up.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use super::surface::{CompositedFrame, DisplayRefresh, FrameTicker, OutputSurface};
use crate::camera::VideoStream;
use crate::effects::{EffectSettings, SharedSettings};
use crate::ml::EffectModel;

/// Log one in this many consecutive frame failures
const FAILURE_LOG_INTERVAL: u64 = 60;

/// Render loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Steps that ran the model
    pub steps: u64,
    /// Frames written to the surface
    pub presented: u64,
    /// Steps whose frame failed to process
    pub failed: u64,
    /// Ticks with no new frame and no settings change
    pub skipped: u64,
}

/// Why a render loop task finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// `stop()` was called
    Stopped,
    /// The camera stream stopped delivering (e.g. device unplugged)
    StreamEnded,
}

#[derive(Default)]
struct Counters {
    steps: AtomicU64,
    presented: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LoopStats {
        LoopStats {
            steps: self.steps.load(Ordering::Relaxed),
            presented: self.presented.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running render loop
///
/// At most one loop may be bound to an [`OutputSurface`]; starting a second
/// one on the same surface is a programming error and panics.
pub struct RenderLoop {
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    task: Option<JoinHandle<()>>,
    surface: OutputSurface,
    counters: Arc<Counters>,
    device_id: String,
    exit: Option<oneshot::Receiver<LoopExit>>,
}

struct LoopContext {
    source: Arc<dyn VideoStream>,
    surface: OutputSurface,
    model: Arc<EffectModel>,
    settings: SharedSettings,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    counters: Arc<Counters>,
    exit: oneshot::Sender<LoopExit>,
}

impl RenderLoop {
    /// Spawn the loop on the current tokio runtime
    ///
    /// # Panics
    ///
    /// If another render loop is still bound to `surface`.
    pub fn start(
        source: Arc<dyn VideoStream>,
        surface: OutputSurface,
        model: Arc<EffectModel>,
        settings: SharedSettings,
        refresh: &dyn DisplayRefresh,
    ) -> Self {
        assert!(
            surface.bind(),
            "a render loop is already active on this output surface"
        );

        let device_id = source.device_id().to_string();
        let running = Arc::new(AtomicBool::new(true));
        let stop_signal = Arc::new(Notify::new());
        let counters = Arc::new(Counters::default());
        let (exit_tx, exit_rx) = oneshot::channel();

        let ctx = LoopContext {
            source,
            surface: surface.clone(),
            model,
            settings,
            running: Arc::clone(&running),
            stop_signal: Arc::clone(&stop_signal),
            counters: Arc::clone(&counters),
            exit: exit_tx,
        };
        let ticker = refresh.ticker();

        tracing::info!(device_id = %device_id, "Render loop started");
        let task = tokio::spawn(ctx.run(ticker));

        Self {
            running,
            stop_signal,
            task: Some(task),
            surface,
            counters,
            device_id,
            exit: Some(exit_rx),
        }
    }

    /// Whether steps are still being scheduled
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> LoopStats {
        self.counters.snapshot()
    }

    /// Resolves once the loop task finishes, with the reason
    ///
    /// Can be taken once. If the task is aborted instead, the receiver
    /// reports a closed channel.
    pub fn take_exit(&mut self) -> Option<oneshot::Receiver<LoopExit>> {
        self.exit.take()
    }

    /// Stop scheduling steps and wait for an in-flight step to finish.
    ///
    /// No step runs after this returns. The surface is cleared and unbound.
    pub async fn stop(mut self) -> LoopStats {
        self.running.store(false, Ordering::Release);
        self.stop_signal.notify_one();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Render loop task ended abnormally");
            }
        }
        self.surface.unbind();

        let stats = self.stats();
        tracing::info!(
            device_id = %self.device_id,
            presented = stats.presented,
            failed = stats.failed,
            "Render loop stopped"
        );
        stats
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.running.store(false, Ordering::Release);
            self.stop_signal.notify_one();
            task.abort();
            self.surface.unbind();
        }
    }
}

impl LoopContext {
    async fn run(self, mut ticker: Box<dyn FrameTicker>) {
        let mut last: Option<(u64, EffectSettings)> = None;
        let mut consecutive_failures = 0u64;

        let reason = loop {
            tokio::select! {
                biased;
                _ = self.stop_signal.notified() => break LoopExit::Stopped,
                _ = ticker.tick() => {}
            }

            if !self.running.load(Ordering::Acquire) {
                break LoopExit::Stopped;
            }
            if !self.source.is_live() {
                tracing::warn!(device_id = self.source.device_id(), "Camera stream ended, render loop exiting");
                break LoopExit::StreamEnded;
            }

            self.step(&mut last, &mut consecutive_failures).await;
        };

        self.running.store(false, Ordering::Release);
        let _ = self.exit.send(reason);
    }

    async fn step(&self, last: &mut Option<(u64, EffectSettings)>, consecutive_failures: &mut u64) {
        let settings = self.settings.snapshot();

        let Some(frame) = self.source.latest_frame() else {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if *last == Some((frame.frame_number, settings)) {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.counters.steps.fetch_add(1, Ordering::Relaxed);
        match self.model.compute_frame(&frame, &settings).await {
            Ok(image) => {
                self.surface.present(CompositedFrame {
                    image,
                    frame_number: frame.frame_number,
                });
                self.counters.presented.fetch_add(1, Ordering::Relaxed);
                *last = Some((frame.frame_number, settings));
                *consecutive_failures = 0;
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                *consecutive_failures += 1;
                if *consecutive_failures == 1 || *consecutive_failures % FAILURE_LOG_INTERVAL == 0 {
                    tracing::warn!(
                        frame = frame.frame_number,
                        consecutive = *consecutive_failures,
                        error = %e,
                        "Segmentation frame error"
                    );
                }
            }
        }
    }
}
