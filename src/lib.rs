//! # Passthrough Streamer
//!
//! Streams a headset passthrough camera to LAN browsers as MJPEG, and maps
//! camera pixels to world-space rays using per-camera calibration.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              HEADSET                                 │
//! │  ┌──────────────┐                                                    │
//! │  │ CameraSource │  ready? resolution? raw RGB frame                  │
//! │  └──────┬───────┘                                                    │
//! │         ▼                                                            │
//! │  ┌───────────────────────────────┐                                   │
//! │  │ FrameCapture (capture thread) │  rate limit → JPEG encode          │
//! │  └──────────────┬────────────────┘                                   │
//! │                 ▼                                                    │
//! │  ┌───────────────────────────────┐                                   │
//! │  │ LatestFrameSlot               │  single writer, many readers       │
//! │  └──────────────┬────────────────┘                                   │
//! │                 ▼                                                    │
//! │  ┌──────────────────────────────────────────────────────────────┐    │
//! │  │ MjpegServer                                                  │    │
//! │  │  ┌──────────────┐   ClientSet    ┌──────────────────┐        │    │
//! │  │  │ axum (http   │ ─────────────▶ │ broadcast thread │        │    │
//! │  │  │ thread)      │ ◀── bounded ── └────────┬─────────┘        │    │
//! │  │  └──────────────┘    channels             │ multipart parts  │    │
//! │  └───────────────────────────────────────────┼──────────────────┘    │
//! │                                              │                       │
//! │  ┌──────────────────────────────┐            │                       │
//! │  │ CalibrationCache (geometry)  │ pixel → camera ray → world ray     │
//! │  └──────────────────────────────┘            │                       │
//! └──────────────────────────────────────────────┼───────────────────────┘
//!                                                │ HTTP over LAN
//!                                                ▼
//!                                   Browser: GET / → viewer page
//!                                            GET /stream → MJPEG
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod geometry;
pub mod stream;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default HTTP port for the stream server
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Default JPEG quality (0-100)
    pub const DEFAULT_JPEG_QUALITY: u8 = 75;

    /// Default capture and broadcast rate in Hz
    pub const DEFAULT_FRAME_RATE: u32 = 30;

    /// Frame age after which the stream counts as degraded
    pub const DEFAULT_STALE_AFTER_MS: u64 = 2000;

    /// A source at or below this width/height is not streamable
    pub const MIN_SOURCE_DIMENSION: u32 = 16;

    /// Lower bound for the derived per-client write timeout
    pub const MIN_CLIENT_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

    /// Capture thread sleep while idle or between rate-limited ticks
    pub const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(5);

    /// Smallest number of queued parts a client may fall behind by
    pub const MIN_CLIENT_BACKLOG: usize = 2;

    /// Broadcast thread sleep while no frame has been published
    pub const NO_FRAME_POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// Pending connection queue length
    pub const LISTEN_BACKLOG: i32 = 128;
}
