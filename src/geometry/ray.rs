//! Pixel to ray casting
//!
//! Directions are never normalized; callers needing unit length normalize
//! themselves.

use glam::{Vec2, Vec3};

use crate::geometry::{CameraIntrinsics, Pose};

/// Half-line with an unnormalized direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Point at parameter `t` along the ray
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Ray from the camera origin through `pixel`, in camera space.
///
/// `pixel` is in the intrinsics' resolution. The direction has `z == 1`.
pub fn pixel_to_camera_ray(intrinsics: &CameraIntrinsics, pixel: Vec2) -> Ray {
    let offset = pixel - intrinsics.principal_point;
    Ray {
        origin: Vec3::ZERO,
        direction: Vec3::new(
            offset.x / intrinsics.focal_length.x,
            offset.y / intrinsics.focal_length.y,
            1.0,
        ),
    }
}

/// Move a camera-space ray into world space using the camera's world pose
pub fn camera_ray_to_world(pose: &Pose, ray: &Ray) -> Ray {
    Ray {
        origin: pose.position,
        direction: pose.transform_vector(ray.direction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use proptest::prelude::*;
    use std::f32::consts::PI;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics::from_raw([400.0, 500.0, 640.0, 480.0, 0.0], (1280, 960))
    }

    #[test]
    fn test_principal_point_looks_forward() {
        let ray = pixel_to_camera_ray(&intrinsics(), Vec2::new(640.0, 480.0));

        assert_eq!(ray.origin, Vec3::ZERO);
        assert_eq!(ray.direction, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_corner_direction() {
        let ray = pixel_to_camera_ray(&intrinsics(), Vec2::new(0.0, 0.0));

        assert_eq!(ray.direction, Vec3::new(-1.6, -0.96, 1.0));
    }

    #[test]
    fn test_world_ray_uses_pose() {
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(PI / 2.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);

        let world = camera_ray_to_world(&pose, &ray);
        assert_eq!(world.origin, Vec3::new(1.0, 2.0, 3.0));
        assert!((world.direction - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_direction_not_normalized() {
        let ray = pixel_to_camera_ray(&intrinsics(), Vec2::new(1280.0, 960.0));
        assert!(ray.direction.length() > 1.0);
        assert_eq!(ray.at(2.0).z, 2.0);
    }

    proptest! {
        #[test]
        fn prop_camera_ray_origin_and_depth(
            px in -2000.0f32..4000.0, py in -2000.0f32..4000.0,
            fx in 1.0f32..2000.0, fy in 1.0f32..2000.0,
            cx in 0.0f32..2000.0, cy in 0.0f32..2000.0,
        ) {
            let k = CameraIntrinsics::from_raw([fx, fy, cx, cy, 0.0], (2000, 2000));
            let ray = pixel_to_camera_ray(&k, Vec2::new(px, py));
            prop_assert_eq!(ray.origin, Vec3::ZERO);
            prop_assert_eq!(ray.direction.z, 1.0);
        }

        #[test]
        fn prop_identity_pose_preserves_ray(
            dx in -10.0f32..10.0, dy in -10.0f32..10.0, dz in -10.0f32..10.0,
        ) {
            let ray = Ray::new(Vec3::ZERO, Vec3::new(dx, dy, dz));
            prop_assert_eq!(camera_ray_to_world(&Pose::IDENTITY, &ray), ray);
        }
    }
}
