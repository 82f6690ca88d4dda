//! Error types for the passthrough streamer

use std::net::SocketAddr;

use thiserror::Error;

use crate::geometry::CameraEye;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Camera calibration lookup errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("No passthrough camera found for {0:?} eye")]
    Unavailable(CameraEye),

    #[error("Multiple passthrough cameras match {eye:?} eye: {candidates:?}")]
    Ambiguous {
        eye: CameraEye,
        candidates: Vec<String>,
    },

    #[error("Calibration provider failed: {0}")]
    Provider(String),

    #[error("Invalid camera characteristics: {0}")]
    InvalidCharacteristics(String),
}

/// Frame capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera source unavailable")]
    SourceUnavailable,

    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSizeMismatch {
        expected: usize,
        actual: usize,
    },

    #[error("Failed to spawn capture thread: {0}")]
    ThreadSpawn(String),
}

/// JPEG codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Invalid frame dimensions: {width}x{height}")]
    InvalidDimensions {
        width: u32,
        height: u32,
    },
}

/// Stream server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Accept failed: {0}")]
    AcceptFailed(String),

    #[error("Client write failed: {0}")]
    ClientWriteFailed(String),

    #[error("Failed to spawn server thread: {0}")]
    ThreadSpawn(String),

    #[error("Server runtime failed: {0}")]
    Runtime(String),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
