//! Application configuration
//!
//! Loaded from a TOML file. Every section falls back to its defaults, so an
//! empty or partial file is valid.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::geometry::CameraEye;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub geometry: GeometryConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Write configuration as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Platform config location, e.g. `~/.config/passthrough-streamer/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "passthrough-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()
    }
}

/// Stream server configuration
///
/// Immutable once the server has started; changing rate or quality
/// requires a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_address: IpAddr,

    /// TCP port (0 picks an ephemeral port)
    pub port: u16,

    /// JPEG quality, 0-100
    pub jpeg_quality: u8,

    /// Capture and broadcast cadence in Hz
    pub target_frame_rate: u32,

    /// Start serving as soon as the server is initialized
    pub auto_start_on_init: bool,

    /// Per-client write timeout; derived from the frame interval when unset
    pub client_write_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_HTTP_PORT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            target_frame_rate: DEFAULT_FRAME_RATE,
            auto_start_on_init: true,
            client_write_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    /// Create a config listening on the given port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Set JPEG quality, capped at 100
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.min(100);
        self
    }

    /// Set the target frame rate, at least 1 Hz
    pub fn target_frame_rate(mut self, rate: u32) -> Self {
        self.target_frame_rate = rate.max(1);
        self
    }

    /// Set whether `MjpegServer::init` starts serving immediately
    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.auto_start_on_init = enabled;
        self
    }

    /// Set an explicit per-client write timeout
    pub fn client_write_timeout(mut self, timeout: Duration) -> Self {
        self.client_write_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Time between frames at the target rate
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_frame_rate.max(1) as f64)
    }

    /// How long a stream client may go without draining before it is dropped
    pub fn effective_write_timeout(&self) -> Duration {
        match self.client_write_timeout_ms {
            Some(ms) => Duration::from_millis(ms.max(1)),
            None => self.frame_interval().max(MIN_CLIENT_WRITE_TIMEOUT),
        }
    }

    /// Parts queued per client before it counts as stalled: the write
    /// timeout expressed in frames
    pub fn client_backlog(&self) -> usize {
        let frames = self.effective_write_timeout().as_secs_f64() / self.frame_interval().as_secs_f64();
        (frames.ceil() as usize).max(MIN_CLIENT_BACKLOG)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality > 100 {
            return Err(Error::Config(format!(
                "jpeg_quality must be 0-100, got {}",
                self.jpeg_quality
            )));
        }
        if self.target_frame_rate == 0 {
            return Err(Error::Config("target_frame_rate must be at least 1".into()));
        }
        Ok(())
    }
}

/// Capture loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Which passthrough camera to stream
    pub eye: CameraEye,

    /// Requested capture resolution; unset picks the largest supported
    pub requested_resolution: Option<(u32, u32)>,

    /// Age after which the latest frame counts as stale
    pub stale_after_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            eye: CameraEye::Left,
            requested_resolution: None,
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
        }
    }
}

impl CaptureConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

/// Geometry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// JSON dump of camera characteristics
    pub calibration_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
