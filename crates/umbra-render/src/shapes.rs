// SPDX-License-Identifier: CEPL-1.0
//! Procedural triangle-list geometry.
use std::f32::consts::{PI, TAU};

use glam::{Quat, Vec2, Vec3};

use crate::mesh::MeshData;

/// Horizontal square centred on the origin, facing +Y, with 0..1 texture coordinates.
pub fn square(size: f32) -> MeshData {
    let h = size / 2.0;
    let positions = vec![
        Vec3::new(-h, 0.0, -h),
        Vec3::new(-h, 0.0, h),
        Vec3::new(h, 0.0, -h),
        Vec3::new(-h, 0.0, h),
        Vec3::new(h, 0.0, h),
        Vec3::new(h, 0.0, -h),
    ];
    let tex_coords = vec![
        Vec2::new(0.0, 0.0),
        Vec2::new(0.0, 1.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(0.0, 1.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(1.0, 0.0),
    ];
    MeshData::from_positions(positions)
        .with_normals(vec![Vec3::Y; 6])
        .with_tex_coords(tex_coords)
}

/// Square-based box of `width` x `width`, spanning `y_offset..y_offset + height`.
/// The first six vertices are the top face.
#[rustfmt::skip]
pub fn cuboid_positions(width: f32, height: f32, y_offset: f32) -> Vec<Vec3> {
    let h = width / 2.0;
    let (lo, hi) = (y_offset, y_offset + height);
    let v = Vec3::new;
    vec![
        // top
        v(-h, hi, -h), v(-h, hi, h), v(h, hi, -h),
        v(-h, hi, h), v(h, hi, h), v(h, hi, -h),
        // bottom
        v(-h, lo, -h), v(h, lo, -h), v(-h, lo, h),
        v(-h, lo, h), v(h, lo, -h), v(h, lo, h),
        // sides
        v(-h, hi, -h), v(h, hi, -h), v(-h, lo, -h),
        v(-h, lo, -h), v(h, hi, -h), v(h, lo, -h),

        v(-h, hi, -h), v(-h, lo, -h), v(-h, hi, h),
        v(-h, lo, -h), v(-h, lo, h), v(-h, hi, h),

        v(-h, hi, h), v(-h, lo, h), v(h, hi, h),
        v(-h, lo, h), v(h, lo, h), v(h, hi, h),

        v(h, hi, -h), v(h, hi, h), v(h, lo, -h),
        v(h, lo, -h), v(h, hi, h), v(h, lo, h),
    ]
}

pub fn cuboid(width: f32, height: f32, y_offset: f32) -> MeshData {
    MeshData::from_positions(cuboid_positions(width, height, y_offset))
}

/// Flat slab whose top face carries 0..1 texture coordinates; the other faces map to (0, 0).
pub fn floor(width: f32, thickness: f32) -> MeshData {
    let positions = cuboid_positions(width, thickness, -thickness);
    let mut tex_coords = square(width).tex_coords.unwrap_or_default();
    tex_coords.resize(positions.len(), Vec2::ZERO);
    MeshData::from_positions(positions).with_tex_coords(tex_coords)
}

/// Appends one truncated-cone band of `sides` quads around +Y.
fn push_ring(
    positions: &mut Vec<Vec3>,
    translation: Vec3,
    sides: u32,
    height: f32,
    bottom_radius: f32,
    top_radius: f32,
) {
    for i in 0..sides {
        let a0 = Quat::from_rotation_y(i as f32 / sides as f32 * TAU);
        let a1 = Quat::from_rotation_y((i + 1) as f32 / sides as f32 * TAU);
        let v00 = a0 * Vec3::new(bottom_radius, 0.0, 0.0) + translation;
        let v10 = a1 * Vec3::new(bottom_radius, 0.0, 0.0) + translation;
        let v01 = a0 * Vec3::new(top_radius, height, 0.0) + translation;
        let v11 = a1 * Vec3::new(top_radius, height, 0.0) + translation;
        positions.extend_from_slice(&[v00, v10, v01, v01, v10, v11]);
    }
}

/// Unit sphere built from `resolution` latitude bands of `2 * resolution` sides.
/// With `smooth_normals` every vertex gets its position as normal; otherwise
/// the mesh has no normals and shades faceted.
pub fn sphere(resolution: u32, smooth_normals: bool) -> MeshData {
    let resolution = resolution.max(1);
    let mut positions = Vec::new();
    for i in 0..resolution {
        let lat0 = i as f32 / resolution as f32 * PI;
        let lat1 = (i + 1) as f32 / resolution as f32 * PI;
        let bottom_y = -lat0.cos();
        let top_y = -lat1.cos();
        push_ring(
            &mut positions,
            Vec3::new(0.0, bottom_y, 0.0),
            resolution * 2,
            top_y - bottom_y,
            lat0.sin(),
            lat1.sin(),
        );
    }
    if smooth_normals {
        let normals = positions.clone();
        MeshData::from_positions(positions).with_normals(normals)
    } else {
        MeshData::from_positions(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn square_is_two_upward_triangles() {
        let mesh = square(2.0);
        mesh.validate().unwrap();
        assert_eq!(mesh.positions.len(), 6);
        assert!(mesh.positions.iter().all(|p| p.y == 0.0 && p.x.abs() == 1.0));
    }

    #[test]
    fn cuboid_has_six_faces() {
        let mesh = cuboid(1.0, 2.0, 0.0);
        mesh.validate().unwrap();
        assert_eq!(mesh.positions.len(), 36);
        let max_y = mesh.positions.iter().map(|p| p.y).fold(f32::MIN, f32::max);
        assert_relative_eq!(max_y, 2.0);
    }

    #[test]
    fn floor_top_sits_at_zero() {
        let mesh = floor(12.0, 0.5);
        mesh.validate().unwrap();
        assert!(mesh.positions[..6].iter().all(|p| p.y == 0.0));
        assert_eq!(mesh.tex_coords.as_ref().unwrap()[4], Vec2::ONE);
        assert_eq!(mesh.tex_coords.as_ref().unwrap()[35], Vec2::ZERO);
    }

    #[test]
    fn sphere_vertices_lie_on_unit_sphere() {
        let mesh = sphere(8, true);
        mesh.validate().unwrap();
        assert_eq!(mesh.positions.len(), 8 * 16 * 6);
        for p in &mesh.positions {
            assert_relative_eq!(p.length(), 1.0, epsilon = 1e-5);
        }
        assert_eq!(mesh.normals.as_ref().unwrap(), &mesh.positions);
        assert!(sphere(4, false).normals.is_none());
    }
}
