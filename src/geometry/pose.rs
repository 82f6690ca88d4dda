//! Rigid poses and the calibration axis-convention correction

use std::f32::consts::PI;
use std::ops::Mul;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position + orientation of one frame expressed in another
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Map a point from this pose's local frame into the parent frame
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.orientation * point
    }

    /// Rotate a direction into the parent frame
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.orientation * vector
    }

    pub fn inverse(&self) -> Pose {
        let orientation = self.orientation.inverse();
        Pose {
            position: orientation * -self.position,
            orientation,
        }
    }

    /// Head-relative camera pose from raw lens calibration.
    ///
    /// The raw translation has its Z axis mirrored, the raw rotation
    /// `(x, y, z, w)` has X and Y negated to give camera-from-head, which is
    /// then inverted into head-from-camera.
    pub fn head_from_camera(translation: [f32; 3], rotation: [f32; 4]) -> Pose {
        let position = Vec3::new(translation[0], translation[1], -translation[2]);
        let camera_from_head = Quat::from_xyzw(-rotation[0], -rotation[1], rotation[2], rotation[3]);

        Pose {
            position,
            orientation: camera_from_head.inverse(),
        }
    }

    /// Compose the tracked head pose with a cached head-relative camera pose,
    /// then turn the result 180 degrees about X so the camera looks down +Z.
    pub fn world_from_camera(world_from_head: &Pose, head_from_camera: &Pose) -> Pose {
        let mut world = *world_from_head * *head_from_camera;
        world.orientation *= Quat::from_rotation_x(PI);
        world
    }
}

impl Default for Pose {
    fn default() -> Self {
        Pose::IDENTITY
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        Pose {
            position: self.transform_point(rhs.position),
            orientation: self.orientation * rhs.orientation,
        }
    }
}
