//! Camera capture subsystem

pub mod encoder;
pub mod frame_capture;
pub mod slot;
pub mod source;

pub use encoder::JpegFrameEncoder;
pub use frame_capture::{CaptureSettings, CaptureState, FrameCapture};
pub use slot::{create_shared_slot, EncodedFrame, FrameHealth, LatestFrameSlot, SharedFrameSlot};
pub use source::{CameraSource, PixelFormat, RawFrame, TestPatternControl, TestPatternSource};
