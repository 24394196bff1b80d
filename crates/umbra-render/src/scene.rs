// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec3};

use crate::mesh::DrawCall;

/// Most lights a scene can have; the main pass reserves one shadow map slot per light.
pub const MAX_LIGHTS: usize = 4;

/// Spot light with a square perspective frustum. Its shadow map is rendered
/// from `position` toward `target`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub target: Vec3,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Light {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            fov_y: 70f32.to_radians(),
            near: 0.5,
            far: 50.0,
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        umbra_math::perspective(self.fov_y, 1.0, self.near, self.far)
            * umbra_math::look_at(self.position, self.target)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        umbra_math::perspective(self.fov_y, aspect, self.near, self.far)
            * umbra_math::look_at(self.position, self.target)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 6.0, 10.0),
            target: Vec3::ZERO,
            fov_y: 60f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Everything one frame draws: the same draw calls go through every shadow
/// pass and the main pass.
#[derive(Default)]
pub struct Scene {
    pub draw_calls: Vec<DrawCall>,
    pub lights: Vec<Light>,
    pub camera: Camera,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    #[test]
    fn light_target_projects_to_map_centre() {
        let light = Light::new(Vec3::new(3.0, 8.0, 2.0), Vec3::ZERO);
        let clip = light.view_projection() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-5);
        // w carries the linear depth the shadow pass stores
        assert_relative_eq!(clip.w, light.position.length(), epsilon = 1e-4);
    }
}
