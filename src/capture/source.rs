//! Camera source contract
//!
//! The physical camera API lives outside this crate; it is reached through
//! [`CameraSource`]. Frames only need to be convertible to RGB24.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::constants::MIN_SOURCE_DIMENSION;
use crate::error::CaptureError;

/// Pixel layouts a source may deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Rgba32,
    Bgra32,
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba32 | PixelFormat::Bgra32 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Uncompressed frame straight from the camera
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Convert into `out`, which must hold exactly `width * height * 3` bytes
    pub fn write_rgb24(&self, out: &mut [u8]) -> Result<(), CaptureError> {
        let expected = self.expected_len();
        if self.data.len() != expected {
            return Err(CaptureError::FrameSizeMismatch {
                expected,
                actual: self.data.len(),
            });
        }
        let pixels = self.width as usize * self.height as usize;
        if out.len() != pixels * 3 {
            return Err(CaptureError::FrameSizeMismatch {
                expected: pixels * 3,
                actual: out.len(),
            });
        }

        match self.format {
            PixelFormat::Rgb24 => out.copy_from_slice(&self.data),
            PixelFormat::Rgba32 => {
                for (dst, src) in out.chunks_exact_mut(3).zip(self.data.chunks_exact(4)) {
                    dst.copy_from_slice(&src[..3]);
                }
            }
            PixelFormat::Bgra32 => {
                for (dst, src) in out.chunks_exact_mut(3).zip(self.data.chunks_exact(4)) {
                    dst[0] = src[2];
                    dst[1] = src[1];
                    dst[2] = src[0];
                }
            }
            PixelFormat::Gray8 => {
                for (dst, &luma) in out.chunks_exact_mut(3).zip(self.data.iter()) {
                    dst.fill(luma);
                }
            }
        }
        Ok(())
    }
}

/// Upstream camera feed
pub trait CameraSource: Send {
    /// Whether the camera is playing
    fn is_ready(&self) -> bool;

    /// Current output resolution `(width, height)`
    fn current_resolution(&self) -> (u32, u32);

    /// Latest raw frame, if one is available
    fn pull_frame(&mut self) -> Option<RawFrame>;

    /// Ready and delivering a non-trivial resolution
    fn is_streamable(&self) -> bool {
        let (width, height) = self.current_resolution();
        self.is_ready() && width > MIN_SOURCE_DIMENSION && height > MIN_SOURCE_DIMENSION
    }
}

impl<S: CameraSource + ?Sized> CameraSource for Box<S> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn current_resolution(&self) -> (u32, u32) {
        (**self).current_resolution()
    }

    fn pull_frame(&mut self) -> Option<RawFrame> {
        (**self).pull_frame()
    }
}

/// Runtime controls for a [`TestPatternSource`], usable from other threads
#[derive(Clone)]
pub struct TestPatternControl {
    available: Arc<AtomicBool>,
    resolution: Arc<Mutex<(u32, u32)>>,
    frames_pulled: Arc<AtomicU64>,
}

impl TestPatternControl {
    /// Simulate the camera stopping or restarting
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_resolution(&self, width: u32, height: u32) {
        *self.resolution.lock() = (width, height);
    }

    pub fn frames_pulled(&self) -> u64 {
        self.frames_pulled.load(Ordering::Relaxed)
    }
}

/// Synthetic RGB24 source drawing a moving gradient
pub struct TestPatternSource {
    control: TestPatternControl,
    tick: u32,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            control: TestPatternControl {
                available: Arc::new(AtomicBool::new(true)),
                resolution: Arc::new(Mutex::new((width, height))),
                frames_pulled: Arc::new(AtomicU64::new(0)),
            },
            tick: 0,
        }
    }

    pub fn control(&self) -> TestPatternControl {
        self.control.clone()
    }

    fn render(&self, width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        let shift = self.tick.wrapping_mul(4);
        for y in 0..height {
            for x in 0..width {
                let r = ((x * 255) / width.max(1)).wrapping_add(shift) as u8;
                let g = ((y * 255) / height.max(1)) as u8;
                let b = if (x / 32 + y / 32) % 2 == 0 { 200 } else { 40 };
                data.extend_from_slice(&[r, g, b]);
            }
        }
        data
    }
}

impl CameraSource for TestPatternSource {
    fn is_ready(&self) -> bool {
        self.control.available.load(Ordering::SeqCst)
    }

    fn current_resolution(&self) -> (u32, u32) {
        if !self.is_ready() {
            return (0, 0);
        }
        *self.control.resolution.lock()
    }

    fn pull_frame(&mut self) -> Option<RawFrame> {
        if !self.is_ready() {
            return None;
        }
        let (width, height) = *self.control.resolution.lock();
        let data = self.render(width, height);
        self.tick = self.tick.wrapping_add(1);
        self.control.frames_pulled.fetch_add(1, Ordering::Relaxed);
        Some(RawFrame::new(width, height, PixelFormat::Rgb24, data))
    }
}
