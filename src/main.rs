//! Bokeh Cam - headless demo
//!
//! Drives the controller through a scripted session and logs what the render
//! loop produced. Usage: `bokeh-cam [config.json]`

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bokeh_cam::camera::DevicePlatform;
use bokeh_cam::effects::SettingsAdjustment;
use bokeh_cam::ml::SegmentationBackend;
use bokeh_cam::render::{CompositedFrame, FrameSink};
use bokeh_cam::telemetry::{init_logging, LogConfig};
use bokeh_cam::{AppConfig, AppController, Intent};

/// Counts presented frames instead of displaying them
#[derive(Default)]
struct CountingSink {
    presented: AtomicU64,
    last_frame: AtomicU64,
}

impl FrameSink for CountingSink {
    fn present(&self, frame: CompositedFrame) {
        self.presented.fetch_add(1, Ordering::Relaxed);
        self.last_frame.store(frame.frame_number, Ordering::Relaxed);
    }

    fn clear(&self) {
        tracing::debug!("Output cleared, showing raw video");
    }
}

#[cfg(feature = "native-camera")]
fn platform() -> Arc<dyn DevicePlatform> {
    Arc::new(bokeh_cam::backend::NokhwaPlatform::new())
}

#[cfg(not(feature = "native-camera"))]
fn platform() -> Arc<dyn DevicePlatform> {
    Arc::new(bokeh_cam::backend::TestPatternPlatform::with_cameras(2))
}

#[cfg(feature = "onnx")]
fn segmenter() -> Arc<dyn SegmentationBackend> {
    Arc::new(bokeh_cam::backend::OnnxSegmenter::new())
}

#[cfg(not(feature = "onnx"))]
fn segmenter() -> Arc<dyn SegmentationBackend> {
    Arc::new(bokeh_cam::backend::SyntheticSegmenter::new())
}

fn load_config() -> AppConfig {
    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        return AppConfig::default();
    };

    match AppConfig::load_from_file(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "Loaded configuration");
            config
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to load configuration, using defaults");
            AppConfig::default()
        }
    }
}

#[tokio::main]
async fn main() {
    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&LogConfig::default()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Bokeh Cam v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config();
    tracing::info!(target_fps = config.target_fps, "Starting demo session");

    let sink = Arc::new(CountingSink::default());
    let controller = AppController::from_config(platform(), segmenter(), sink.clone(), &config);

    let mut status = controller.subscribe_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let message = status.borrow_and_update().clone();
            tracing::info!(kind = ?message.kind, "{}", message.text);
        }
    });

    let second_camera = match controller.refresh_devices().await {
        Ok(devices) => {
            for (id, label) in controller.catalog().options() {
                tracing::info!(device_id = %id, "Found camera: {}", label);
            }
            devices.get(1).map(|d| d.id.clone())
        }
        Err(e) => {
            tracing::error!(error = %e, "Could not list cameras");
            None
        }
    };

    let mut script = vec![
        (Intent::StartCamera(None), Duration::from_millis(200)),
        (Intent::ToggleEffect, Duration::from_millis(500)),
        (Intent::Adjust(SettingsAdjustment::BackgroundBlur(15)), Duration::from_millis(300)),
        (Intent::Adjust(SettingsAdjustment::Mirror(true)), Duration::from_millis(300)),
    ];
    if let Some(device_id) = second_camera {
        script.push((Intent::SwitchCamera(device_id), Duration::from_millis(500)));
    }
    script.push((Intent::ResetSettings, Duration::from_millis(200)));

    for (intent, settle) in script {
        if let Err(e) = controller.dispatch(intent).await {
            tracing::error!(error = %e, "{}", e.user_message());
            break;
        }
        tokio::time::sleep(settle).await;

        if let Some(stats) = controller.render_stats().await {
            tracing::info!(
                steps = stats.steps,
                presented = stats.presented,
                failed = stats.failed,
                skipped = stats.skipped,
                "Render loop"
            );
        }
    }

    controller.shutdown().await;
    tracing::info!(
        presented = sink.presented.load(Ordering::Relaxed),
        last_frame = sink.last_frame.load(Ordering::Relaxed),
        "Demo finished"
    );
}
