//! Frame capture loop
//!
//! Pulls frames from the camera source on a dedicated thread at the target
//! frame rate, encodes them to JPEG and publishes them into the latest-frame
//! slot. A camera that stops or reports a trivial resolution just parks the
//! loop in `Idle` until it comes back.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::capture::encoder::JpegFrameEncoder;
use crate::capture::slot::{EncodedFrame, SharedFrameSlot};
use crate::capture::source::CameraSource;
use crate::config::ServerConfig;
use crate::constants::CAPTURE_POLL_INTERVAL;
use crate::error::{CaptureError, Error};

/// Capture loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Stopped, or waiting for the source to become streamable
    Idle,
    Capturing,
}

impl CaptureState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CaptureState::Capturing,
            _ => CaptureState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            CaptureState::Idle => 0,
            CaptureState::Capturing => 1,
        }
    }
}

/// Encoding and cadence settings for the capture loop
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub jpeg_quality: u8,
    pub target_frame_rate: u32,
}

impl CaptureSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_frame_rate.max(1) as f64)
    }
}

impl From<&ServerConfig> for CaptureSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            target_frame_rate: config.target_frame_rate,
        }
    }
}

/// Owned capture loop for one camera source
pub struct FrameCapture {
    settings: CaptureSettings,

    /// Source, parked here while the loop is stopped
    source: Option<Box<dyn CameraSource>>,

    /// Whether capture is running
    running: Arc<AtomicBool>,

    state: Arc<AtomicU8>,

    /// Output slot for encoded frames
    frames: SharedFrameSlot,

    /// Capture thread; hands the source back when it exits
    thread_handle: Option<JoinHandle<Box<dyn CameraSource>>>,

    /// Channel for per-frame errors
    error_rx: Option<Receiver<Error>>,

    /// Frames published since creation
    sequence: Arc<AtomicU64>,
}

impl FrameCapture {
    pub fn new(
        source: Box<dyn CameraSource>,
        settings: CaptureSettings,
        frames: SharedFrameSlot,
    ) -> Self {
        Self {
            settings,
            source: Some(source),
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(AtomicU8::new(CaptureState::Idle.as_u8())),
            frames,
            thread_handle: None,
            error_rx: None,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the capture thread
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(source) = self.source.take() else {
            return Err(CaptureError::SourceUnavailable);
        };

        let (error_tx, error_rx) = bounded::<Error>(16);
        self.error_rx = Some(error_rx);
        self.running.store(true, Ordering::SeqCst);

        let worker = CaptureWorker {
            source,
            encoder: JpegFrameEncoder::new(self.settings.jpeg_quality),
            interval: self.settings.frame_interval(),
            running: Arc::clone(&self.running),
            state: Arc::clone(&self.state),
            frames: Arc::clone(&self.frames),
            sequence: Arc::clone(&self.sequence),
            error_tx,
        };

        let handle = thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || worker.run());

        match handle {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CaptureError::ThreadSpawn(e.to_string()))
            }
        }
    }

    /// Stop capturing; the source is kept so capture can be restarted
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            match handle.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => tracing::error!("Capture thread panicked"),
            }
        }
        self.state.store(CaptureState::Idle.as_u8(), Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> CaptureState {
        CaptureState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Slot the loop publishes into
    pub fn frames(&self) -> SharedFrameSlot {
        Arc::clone(&self.frames)
    }

    pub fn settings(&self) -> CaptureSettings {
        self.settings
    }

    /// Frames published so far
    pub fn frames_captured(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Check for errors
    pub fn check_errors(&self) -> Option<Error> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for FrameCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

struct CaptureWorker {
    source: Box<dyn CameraSource>,
    encoder: JpegFrameEncoder,
    interval: Duration,
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    frames: SharedFrameSlot,
    sequence: Arc<AtomicU64>,
    error_tx: Sender<Error>,
}

impl CaptureWorker {
    fn run(mut self) -> Box<dyn CameraSource> {
        let mut last_capture: Option<Instant> = None;

        while self.running.load(Ordering::Relaxed) {
            if !self.source.is_streamable() {
                self.transition(CaptureState::Idle);
                thread::sleep(CAPTURE_POLL_INTERVAL);
                continue;
            }
            self.transition(CaptureState::Capturing);

            if let Some(last) = last_capture {
                let elapsed = last.elapsed();
                if elapsed < self.interval {
                    thread::sleep((self.interval - elapsed).min(CAPTURE_POLL_INTERVAL));
                    continue;
                }
            }
            last_capture = Some(Instant::now());

            self.capture_once();
        }

        self.source
    }

    fn capture_once(&mut self) {
        let Some(raw) = self.source.pull_frame() else {
            return;
        };

        match self.encoder.encode(&raw) {
            Ok(bytes) => {
                let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
                self.frames
                    .publish(EncodedFrame::new(bytes, raw.width, raw.height, sequence));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode frame");
                let _ = self.error_tx.try_send(e);
            }
        }
    }

    fn transition(&self, next: CaptureState) {
        let previous = CaptureState::from_u8(self.state.swap(next.as_u8(), Ordering::SeqCst));
        if previous != next {
            match next {
                CaptureState::Capturing => {
                    let (width, height) = self.source.current_resolution();
                    tracing::info!(width, height, "Camera source ready, capturing");
                }
                CaptureState::Idle => tracing::info!("Camera source unavailable, capture idle"),
            }
        }
    }
}
