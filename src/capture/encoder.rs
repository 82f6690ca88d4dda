//! JPEG encoder wrapper
//!
//! Converts raw camera frames to RGB24 and compresses them. The RGB buffer
//! always matches the current source resolution: a resolution change
//! reallocates it rather than reusing a mismatched buffer.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::capture::source::RawFrame;
use crate::error::{CodecError, Error};

/// JPEG encoder with a reusable conversion buffer
pub struct JpegFrameEncoder {
    quality: u8,
    /// RGB24 conversion buffer sized to `dimensions`
    rgb_buffer: Vec<u8>,
    dimensions: (u32, u32),
    /// Output buffer (capacity reused between frames)
    jpeg_buffer: Vec<u8>,
    frames_encoded: u64,
    bytes_produced: u64,
    reallocations: u64,
}

impl JpegFrameEncoder {
    /// Create an encoder; quality is clamped to the codec's 1-100 range
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            rgb_buffer: Vec::new(),
            dimensions: (0, 0),
            jpeg_buffer: Vec::new(),
            frames_encoded: 0,
            bytes_produced: 0,
            reallocations: 0,
        }
    }

    /// Encode a raw frame to JPEG
    pub fn encode(&mut self, frame: &RawFrame) -> Result<Bytes, Error> {
        if frame.width == 0 || frame.height == 0 {
            return Err(CodecError::InvalidDimensions {
                width: frame.width,
                height: frame.height,
            }
            .into());
        }

        if self.dimensions != (frame.width, frame.height) {
            tracing::debug!(
                from = ?self.dimensions,
                to = ?(frame.width, frame.height),
                "Reallocating conversion buffer"
            );
            self.rgb_buffer = vec![0u8; frame.width as usize * frame.height as usize * 3];
            self.dimensions = (frame.width, frame.height);
            self.reallocations += 1;
        }

        frame.write_rgb24(&mut self.rgb_buffer)?;

        self.jpeg_buffer.clear();
        JpegEncoder::new_with_quality(&mut self.jpeg_buffer, self.quality)
            .encode(
                &self.rgb_buffer,
                frame.width,
                frame.height,
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        self.frames_encoded += 1;
        self.bytes_produced += self.jpeg_buffer.len() as u64;

        Ok(Bytes::copy_from_slice(&self.jpeg_buffer))
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Resolution the conversion buffer is currently sized for
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            reallocations: self.reallocations,
            average_frame_size: if self.frames_encoded > 0 {
                self.bytes_produced as f32 / self.frames_encoded as f32
            } else {
                0.0
            },
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub reallocations: u64,
    pub average_frame_size: f32,
}
