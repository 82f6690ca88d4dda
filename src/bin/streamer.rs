//! Passthrough Streamer Application
//!
//! Serves a camera feed as MJPEG over HTTP. Without a headset camera the
//! feed comes from the built-in test pattern.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use passthrough_streamer::{
    capture::{create_shared_slot, CaptureSettings, FrameCapture, FrameHealth, TestPatternSource},
    config::AppConfig,
    geometry::{select_capture_resolution, CalibrationCache, FileCalibrationProvider, Pose},
    stream::MjpegServer,
};

/// Resolution used when no calibration data names one
const FALLBACK_RESOLUTION: (u32, u32) = (1280, 960);

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(AppConfig::default_path);
    let config = match &config_path {
        Some(path) => AppConfig::load_or_default(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::default(),
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Passthrough Streamer");
    if let Some(path) = &config_path {
        tracing::info!("Config: {}", path.display());
    }

    let resolution = resolve_resolution(&config);
    tracing::info!("Capture resolution: {}x{}", resolution.0, resolution.1);

    // Capture pipeline
    let frames = create_shared_slot();
    let source = TestPatternSource::new(resolution.0, resolution.1);
    let mut capture = FrameCapture::new(
        Box::new(source),
        CaptureSettings::from(&config.server),
        frames.clone(),
    );
    capture.start()?;

    let server = MjpegServer::init(config.server.clone(), frames.clone())?;
    match server.local_addr() {
        Some(addr) => tracing::info!("Viewer available at http://{}/", addr),
        None => tracing::info!("Server idle (auto start disabled)"),
    }

    tracing::info!("Streaming - press Ctrl+C to stop");

    let stale_after = config.capture.stale_after();
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
            _ = status.tick() => {
                if let Some(err) = capture.check_errors() {
                    tracing::warn!("Capture error: {}", err);
                }

                match frames.health(stale_after) {
                    FrameHealth::Fresh => tracing::info!(
                        clients = server.client_count(),
                        frames = capture.frames_captured(),
                        "Stream healthy"
                    ),
                    FrameHealth::NoFrameYet => tracing::warn!(
                        clients = server.client_count(),
                        "No frame captured yet"
                    ),
                    FrameHealth::Stale(age) => tracing::warn!(
                        clients = server.client_count(),
                        "Stream degraded: latest frame is {:.1}s old",
                        age.as_secs_f32()
                    ),
                }
            }
        }
    }

    server.stop();
    capture.stop();

    tracing::info!("Stopped");
    Ok(())
}

/// Pick the capture resolution, logging calibration details along the way.
/// Calibration problems only cost the geometry output, never the stream.
fn resolve_resolution(config: &AppConfig) -> (u32, u32) {
    let requested = config.capture.requested_resolution;
    let Some(path) = &config.geometry.calibration_file else {
        return requested.filter(|r| *r != (0, 0)).unwrap_or(FALLBACK_RESOLUTION);
    };

    let provider = match FileCalibrationProvider::load(path) {
        Ok(provider) => provider,
        Err(e) => {
            tracing::warn!("Calibration unavailable ({}): {}", path.display(), e);
            return requested.filter(|r| *r != (0, 0)).unwrap_or(FALLBACK_RESOLUTION);
        }
    };

    let cache = CalibrationCache::new(Arc::new(provider));
    let eye = config.capture.eye;

    match cache.intrinsics(eye) {
        Ok(intrinsics) => {
            tracing::info!(
                ?eye,
                fx = intrinsics.focal_length.x,
                fy = intrinsics.focal_length.y,
                cx = intrinsics.principal_point.x,
                cy = intrinsics.principal_point.y,
                "Camera intrinsics"
            );
            match cache.pixel_to_world_ray(eye, intrinsics.principal_point, &Pose::IDENTITY) {
                Ok(ray) => tracing::info!(
                    origin = ?ray.origin,
                    direction = ?ray.direction,
                    "Principal ray at identity head pose"
                ),
                Err(e) => tracing::warn!("Ray cast failed: {}", e),
            }
        }
        Err(e) => tracing::warn!("Calibration lookup failed: {}", e),
    }

    let sizes = cache.output_sizes(eye).unwrap_or_default();
    select_capture_resolution(requested, &sizes)
        .filter(|r| *r != (0, 0))
        .unwrap_or(FALLBACK_RESOLUTION)
}
