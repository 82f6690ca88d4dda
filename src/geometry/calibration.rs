//! Per-camera calibration cache
//!
//! Calibration is physically fixed per device, so the provider is queried
//! once per eye and the intrinsics plus head-relative pose are kept for the
//! life of the process. Only the final composition with the tracked head
//! pose happens per call.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use glam::Vec2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;
use crate::geometry::ray::{camera_ray_to_world, pixel_to_camera_ray, Ray};
use crate::geometry::{CameraEye, CameraIntrinsics, CameraPosition, CameraSourceTag, Pose};

/// One entry of the provider's device list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub source_tag: Option<CameraSourceTag>,
    pub position_tag: Option<CameraPosition>,
}

/// Raw characteristics of one physical camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCharacteristics {
    /// `[fx, fy, cx, cy, skew]`
    pub lens_intrinsic_calibration: [f32; 5],
    /// Maximum sensor resolution the intrinsics refer to
    pub active_array_size: (u32, u32),
    /// Lens translation relative to the head origin
    pub lens_pose_translation: [f32; 3],
    /// Lens rotation `(x, y, z, w)` relative to the head origin
    pub lens_pose_rotation: [f32; 4],
    /// Supported capture resolutions
    #[serde(default)]
    pub output_sizes: Vec<(u32, u32)>,
}

/// External calibration source (OS camera characteristics service)
pub trait CalibrationProvider: Send + Sync {
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, CalibrationError>;

    fn characteristics(&self, device_id: &str) -> Result<CameraCharacteristics, CalibrationError>;
}

/// Everything derived once per eye
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationEntry {
    pub device_id: String,
    pub device_index: usize,
    pub intrinsics: CameraIntrinsics,
    pub head_from_camera: Pose,
    pub output_sizes: Vec<(u32, u32)>,
}

/// Per-eye cell; `populate` is held only while that eye's lookup runs
#[derive(Default)]
struct EntryCell {
    value: OnceLock<Arc<CalibrationEntry>>,
    populate: Mutex<()>,
}

/// Compute-once calibration cache keyed by eye.
///
/// Racing first calls for one eye do a single provider lookup; a slow
/// lookup for one eye never delays the other. Failed lookups are not
/// cached and are retried on the next call.
pub struct CalibrationCache {
    provider: Arc<dyn CalibrationProvider>,
    entries: DashMap<CameraEye, Arc<EntryCell>>,
}

impl CalibrationCache {
    pub fn new(provider: Arc<dyn CalibrationProvider>) -> Self {
        Self {
            provider,
            entries: DashMap::new(),
        }
    }

    /// Cached entry for `eye`, querying the provider on first use
    pub fn entry(&self, eye: CameraEye) -> Result<Arc<CalibrationEntry>, CalibrationError> {
        // Clone the cell out so no map shard stays locked during the lookup
        let cell = Arc::clone(self.entries.entry(eye).or_default().value());
        if let Some(entry) = cell.value.get() {
            return Ok(Arc::clone(entry));
        }

        let _guard = cell.populate.lock();
        if let Some(entry) = cell.value.get() {
            return Ok(Arc::clone(entry));
        }

        let entry = Arc::new(self.lookup(eye)?);
        Ok(Arc::clone(cell.value.get_or_init(|| entry)))
    }

    pub fn intrinsics(&self, eye: CameraEye) -> Result<CameraIntrinsics, CalibrationError> {
        Ok(self.entry(eye)?.intrinsics)
    }

    /// Camera pose relative to the head origin
    pub fn head_pose(&self, eye: CameraEye) -> Result<Pose, CalibrationError> {
        Ok(self.entry(eye)?.head_from_camera)
    }

    /// Camera pose in the world given the current tracked head pose
    pub fn world_pose(&self, eye: CameraEye, world_from_head: &Pose) -> Result<Pose, CalibrationError> {
        let entry = self.entry(eye)?;
        Ok(Pose::world_from_camera(world_from_head, &entry.head_from_camera))
    }

    pub fn output_sizes(&self, eye: CameraEye) -> Result<Vec<(u32, u32)>, CalibrationError> {
        Ok(self.entry(eye)?.output_sizes.clone())
    }

    /// Index of the eye's device in the provider's device list
    pub fn device_index(&self, eye: CameraEye) -> Result<usize, CalibrationError> {
        Ok(self.entry(eye)?.device_index)
    }

    /// Camera-space ray through `pixel` (in the intrinsics' resolution)
    pub fn pixel_to_camera_ray(&self, eye: CameraEye, pixel: Vec2) -> Result<Ray, CalibrationError> {
        Ok(pixel_to_camera_ray(&self.intrinsics(eye)?, pixel))
    }

    /// World-space ray through `pixel` for the current head pose
    pub fn pixel_to_world_ray(
        &self,
        eye: CameraEye,
        pixel: Vec2,
        world_from_head: &Pose,
    ) -> Result<Ray, CalibrationError> {
        let entry = self.entry(eye)?;
        let camera_ray = pixel_to_camera_ray(&entry.intrinsics, pixel);
        let pose = Pose::world_from_camera(world_from_head, &entry.head_from_camera);
        Ok(camera_ray_to_world(&pose, &camera_ray))
    }

    /// Whether `eye` has already been resolved
    pub fn is_cached(&self, eye: CameraEye) -> bool {
        self.entries
            .get(&eye)
            .is_some_and(|cell| cell.value.get().is_some())
    }

    fn lookup(&self, eye: CameraEye) -> Result<CalibrationEntry, CalibrationError> {
        let devices = self.provider.list_devices()?;
        let (device_index, device_id) = resolve_device(&devices, eye)?;
        let characteristics = self.provider.characteristics(&device_id)?;

        let (width, height) = characteristics.active_array_size;
        if width == 0 || height == 0 {
            return Err(CalibrationError::InvalidCharacteristics(format!(
                "camera {} reports an empty active array",
                device_id
            )));
        }
        let [fx, fy, ..] = characteristics.lens_intrinsic_calibration;
        if fx == 0.0 || fy == 0.0 {
            return Err(CalibrationError::InvalidCharacteristics(format!(
                "camera {} reports a zero focal length",
                device_id
            )));
        }

        tracing::info!(eye = ?eye, device_id = %device_id, index = device_index, "Resolved passthrough camera");

        Ok(CalibrationEntry {
            intrinsics: CameraIntrinsics::from_raw(
                characteristics.lens_intrinsic_calibration,
                characteristics.active_array_size,
            ),
            head_from_camera: Pose::head_from_camera(
                characteristics.lens_pose_translation,
                characteristics.lens_pose_rotation,
            ),
            output_sizes: characteristics.output_sizes,
            device_id,
            device_index,
        })
    }
}

/// Find the single passthrough device for `eye`
fn resolve_device(
    devices: &[DeviceDescriptor],
    eye: CameraEye,
) -> Result<(usize, String), CalibrationError> {
    let mut matches = Vec::new();

    for (index, device) in devices.iter().enumerate() {
        let (Some(source), Some(position)) = (device.source_tag, device.position_tag) else {
            continue;
        };
        if source != CameraSourceTag::Passthrough {
            continue;
        }
        if let CameraPosition::Other(raw) = position {
            return Err(CalibrationError::InvalidCharacteristics(format!(
                "camera {} has unknown position tag {}",
                device.id, raw
            )));
        }
        if position == eye.position_tag() {
            matches.push((index, device.id.clone()));
        }
    }

    match matches.len() {
        0 => Err(CalibrationError::Unavailable(eye)),
        1 => Ok(matches.remove(0)),
        _ => Err(CalibrationError::Ambiguous {
            eye,
            candidates: matches.into_iter().map(|(_, id)| id).collect(),
        }),
    }
}

/// Pick the capture resolution from the supported sizes.
///
/// No request (or `(0, 0)`) selects the largest size by area. A request that
/// is not supported is still honoured, with a warning.
pub fn select_capture_resolution(
    requested: Option<(u32, u32)>,
    sizes: &[(u32, u32)],
) -> Option<(u32, u32)> {
    match requested {
        Some(size) if size != (0, 0) => {
            if !sizes.contains(&size) {
                tracing::warn!(
                    requested = ?size,
                    supported = ?sizes,
                    "Requested resolution is not supported by the camera"
                );
            }
            Some(size)
        }
        _ => sizes
            .iter()
            .copied()
            .max_by_key(|(w, h)| u64::from(*w) * u64::from(*h)),
    }
}
