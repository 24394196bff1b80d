// SPDX-License-Identifier: CEPL-1.0
//! Camera and light matrices in Vulkan clip conventions (depth 0..1, +Y down).
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

/// Right-handed perspective projection with the Y axis flipped for Vulkan clip space.
pub fn perspective(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fov_y_radians, aspect.max(f32::EPSILON), near, far);
    proj.y_axis.y = -proj.y_axis.y;
    proj
}

/// View matrix looking from `eye` at `target`. Falls back to +Z as the up
/// vector when the view direction is (anti)parallel to +Y.
pub fn look_at(eye: Vec3, target: Vec3) -> Mat4 {
    let dir = (target - eye).normalize_or_zero();
    let up = if dir.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    Mat4::look_at_rh(eye, target, up)
}

/// Point on a horizontal circle around `center`.
pub fn orbit(center: Vec3, radius: f32, height: f32, angle_radians: f32) -> Vec3 {
    let (sin, cos) = angle_radians.sin_cos();
    center + Vec3::new(radius * cos, height, radius * sin)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perspective_maps_near_and_far_to_unit_depth() {
        let proj = perspective(60f32.to_radians(), 1.0, 0.5, 50.0);
        let near = proj * Vec4::new(0.0, 0.0, -0.5, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -50.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
        // clip w is the linear view depth
        assert_relative_eq!(far.w, 50.0, epsilon = 1e-4);
    }

    #[test]
    fn perspective_points_plus_y_up_the_screen() {
        let proj = perspective(90f32.to_radians(), 1.0, 0.1, 10.0);
        let above = proj * Vec4::new(0.0, 1.0, -2.0, 1.0);
        assert!(above.y / above.w < 0.0);
    }

    #[test]
    fn look_at_straight_down_stays_finite() {
        let view = look_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO);
        assert!(view.is_finite());
        let origin = view.transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin.z, -10.0, epsilon = 1e-5);
    }

    #[test]
    fn orbit_keeps_radius_and_height() {
        let p = orbit(Vec3::new(1.0, 0.0, 1.0), 4.0, 3.0, 1.2);
        assert_relative_eq!(p.y, 3.0);
        assert_relative_eq!(Vec2::new(p.x - 1.0, p.z - 1.0).length(), 4.0, epsilon = 1e-5);
    }

    #[test]
    fn transform_applies_scale_before_translation() {
        let t = Transform::from_translation(Vec3::new(0.0, 2.0, 0.0)).with_scale(Vec3::splat(3.0));
        let p = t.matrix().transform_point3(Vec3::X);
        assert_relative_eq!(p.x, 3.0);
        assert_relative_eq!(p.y, 2.0);
    }
}
