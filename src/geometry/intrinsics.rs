//! Camera identity and pinhole intrinsics

use glam::{UVec2, Vec2};
use serde::{Deserialize, Serialize};

/// Logical passthrough camera selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraEye {
    Left,
    Right,
}

impl CameraEye {
    /// Position tag the calibration provider reports for this eye
    pub fn position_tag(self) -> CameraPosition {
        match self {
            CameraEye::Left => CameraPosition::Left,
            CameraEye::Right => CameraPosition::Right,
        }
    }
}

/// Device position metadata as reported by the calibration provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i8", into = "i8")]
pub enum CameraPosition {
    Left,
    Right,
    Other(i8),
}

impl From<i8> for CameraPosition {
    fn from(raw: i8) -> Self {
        match raw {
            0 => CameraPosition::Left,
            1 => CameraPosition::Right,
            other => CameraPosition::Other(other),
        }
    }
}

impl From<CameraPosition> for i8 {
    fn from(position: CameraPosition) -> Self {
        match position {
            CameraPosition::Left => 0,
            CameraPosition::Right => 1,
            CameraPosition::Other(raw) => raw,
        }
    }
}

/// Device source metadata as reported by the calibration provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i8", into = "i8")]
pub enum CameraSourceTag {
    Passthrough,
    Other(i8),
}

impl From<i8> for CameraSourceTag {
    fn from(raw: i8) -> Self {
        match raw {
            0 => CameraSourceTag::Passthrough,
            other => CameraSourceTag::Other(other),
        }
    }
}

impl From<CameraSourceTag> for i8 {
    fn from(tag: CameraSourceTag) -> Self {
        match tag {
            CameraSourceTag::Passthrough => 0,
            CameraSourceTag::Other(raw) => raw,
        }
    }
}

/// Pinhole projection parameters, all in pixels.
///
/// Defined for the maximum sensor resolution; pixel coordinates handed to
/// the ray caster must be expressed in that resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length (fx, fy)
    pub focal_length: Vec2,
    /// Principal point from the top-left corner (cx, cy)
    pub principal_point: Vec2,
    /// Resolution the intrinsics are defined for
    pub resolution: UVec2,
    /// Non-perpendicularity of the sensor axes
    pub skew: f32,
}

impl CameraIntrinsics {
    /// Build from the raw `[fx, fy, cx, cy, skew]` calibration array
    pub fn from_raw(raw: [f32; 5], resolution: (u32, u32)) -> Self {
        Self {
            focal_length: Vec2::new(raw[0], raw[1]),
            principal_point: Vec2::new(raw[2], raw[3]),
            resolution: UVec2::new(resolution.0, resolution.1),
            skew: raw[4],
        }
    }

    /// Rescale a pixel from another image size into this resolution
    pub fn scale_pixel(&self, pixel: Vec2, from: (u32, u32)) -> Vec2 {
        if from.0 == 0 || from.1 == 0 {
            return pixel;
        }
        Vec2::new(
            pixel.x * self.resolution.x as f32 / from.0 as f32,
            pixel.y * self.resolution.y as f32 / from.1 as f32,
        )
    }
}
