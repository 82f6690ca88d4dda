//! Camera geometry
//!
//! Turns per-camera calibration into pixel-to-world ray casts.

pub mod calibration;
pub mod intrinsics;
pub mod pose;
pub mod provider;
pub mod ray;

pub use calibration::{
    select_capture_resolution, CalibrationCache, CalibrationEntry, CalibrationProvider,
    CameraCharacteristics, DeviceDescriptor,
};
pub use intrinsics::{CameraEye, CameraIntrinsics, CameraPosition, CameraSourceTag};
pub use pose::Pose;
pub use provider::FileCalibrationProvider;
pub use ray::{camera_ray_to_world, pixel_to_camera_ray, Ray};
