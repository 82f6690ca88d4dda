//! File-backed calibration provider
//!
//! Reads a JSON dump of the device list and per-device characteristics,
//! as captured from a headset, so geometry can run without the OS camera
//! service.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;
use crate::geometry::calibration::{CalibrationProvider, CameraCharacteristics, DeviceDescriptor};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeviceRecord {
    #[serde(flatten)]
    descriptor: DeviceDescriptor,
    characteristics: Option<CameraCharacteristics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalibrationDump {
    devices: Vec<DeviceRecord>,
}

/// Calibration provider backed by a static JSON document
#[derive(Debug, Clone)]
pub struct FileCalibrationProvider {
    devices: Vec<DeviceDescriptor>,
    characteristics: HashMap<String, CameraCharacteristics>,
}

impl FileCalibrationProvider {
    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        let dump: CalibrationDump =
            serde_json::from_str(json).map_err(|e| CalibrationError::Provider(e.to_string()))?;

        let mut devices = Vec::with_capacity(dump.devices.len());
        let mut characteristics = HashMap::new();
        for record in dump.devices {
            if let Some(chars) = record.characteristics {
                characteristics.insert(record.descriptor.id.clone(), chars);
            }
            devices.push(record.descriptor);
        }

        Ok(Self {
            devices,
            characteristics,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CalibrationError::Provider(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

impl CalibrationProvider for FileCalibrationProvider {
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, CalibrationError> {
        Ok(self.devices.clone())
    }

    fn characteristics(&self, device_id: &str) -> Result<CameraCharacteristics, CalibrationError> {
        self.characteristics
            .get(device_id)
            .cloned()
            .ok_or_else(|| CalibrationError::Provider(format!("no characteristics for camera {}", device_id)))
    }
}
