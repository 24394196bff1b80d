// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::command::Recorder;
use crate::error::{RenderError, Result};
use crate::gpu::BufferUsage;
use crate::pipeline::Pipeline;
use crate::resource::{Buffer, ResourceFactory, Texture};

/// Interleaved vertex layout shared by both pipelines.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;
    pub const POSITION_OFFSET: u32 = 0;
    pub const NORMAL_OFFSET: u32 = 12;
    pub const TEX_COORD_OFFSET: u32 = 24;
}

/// Non-indexed triangle list. Normals and texture coordinates are optional
/// but must match the position count when present.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub tex_coords: Option<Vec<Vec2>>,
}

impl MeshData {
    pub fn from_positions(positions: Vec<Vec3>) -> Self {
        Self {
            positions,
            ..Default::default()
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_tex_coords(mut self, tex_coords: Vec<Vec2>) -> Self {
        self.tex_coords = Some(tex_coords);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let expected = self.positions.len();
        if expected == 0 || expected % 3 != 0 {
            return Err(RenderError::MeshNotTriangles(expected));
        }
        if let Some(normals) = &self.normals {
            check_count("normals", expected, normals.len())?;
        }
        if let Some(tex_coords) = &self.tex_coords {
            check_count("texture coordinates", expected, tex_coords.len())?;
        }
        Ok(())
    }

    /// Interleaves the attributes; missing ones are zero-filled.
    pub fn vertices(&self) -> Vec<Vertex> {
        self.positions
            .iter()
            .enumerate()
            .map(|(i, p)| Vertex {
                position: p.to_array(),
                normal: self
                    .normals
                    .as_ref()
                    .map_or([0.0; 3], |n| n[i].to_array()),
                tex_coord: self
                    .tex_coords
                    .as_ref()
                    .map_or([0.0; 2], |t| t[i].to_array()),
            })
            .collect()
    }
}

fn check_count(attribute: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(RenderError::MeshAttributeCount {
            attribute,
            expected,
            actual,
        })
    }
}

/// Textures a draw samples in the main pass. Unset slots fall back to the
/// renderer's default white albedo and flat normal map.
#[derive(Clone, Default)]
pub struct Material {
    pub albedo: Option<Rc<Texture>>,
    pub normal_map: Option<Rc<Texture>>,
}

pub mod flags {
    pub const HAS_NORMALS: u32 = 1;
    pub const HAS_TEX_COORDS: u32 = 2;
    pub const HAS_ALBEDO: u32 = 4;
    pub const HAS_NORMAL_MAP: u32 = 8;
}

/// A mesh uploaded to its own vertex buffer, with a world transform and material.
pub struct DrawCall {
    vertex_buffer: Buffer,
    vertex_count: u32,
    has_normals: bool,
    has_tex_coords: bool,
    world: Mat4,
    pub material: Material,
}

impl DrawCall {
    pub fn new(factory: &ResourceFactory, mesh: &MeshData) -> Result<Self> {
        mesh.validate()?;
        let vertices = mesh.vertices();
        let vertex_buffer =
            factory.create_buffer_with_data(bytemuck::cast_slice(&vertices), BufferUsage::VERTEX)?;
        Ok(Self {
            vertex_buffer,
            vertex_count: vertices.len() as u32,
            has_normals: mesh.normals.is_some(),
            has_tex_coords: mesh.tex_coords.is_some(),
            world: Mat4::IDENTITY,
            material: Material::default(),
        })
    }

    pub fn with_world(mut self, world: Mat4) -> Self {
        self.world = world;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn world_transform(&self) -> Mat4 {
        self.world
    }

    pub fn set_world_transform(&mut self, world: Mat4) {
        self.world = world;
    }

    pub fn flags(&self) -> u32 {
        let mut bits = 0;
        if self.has_normals {
            bits |= flags::HAS_NORMALS;
        }
        if self.has_tex_coords {
            bits |= flags::HAS_TEX_COORDS;
        }
        if self.material.albedo.is_some() {
            bits |= flags::HAS_ALBEDO;
        }
        if self.material.normal_map.is_some() {
            bits |= flags::HAS_NORMAL_MAP;
        }
        bits
    }

    /// Pushes `constants` then binds the vertex buffer and draws every vertex.
    pub fn record<T: Pod>(&self, rec: &mut Recorder<'_>, pipeline: &Pipeline, constants: &T) {
        rec.push_constants(pipeline, constants);
        rec.bind_vertex_buffer(&self.vertex_buffer);
        rec.draw(self.vertex_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Vec<Vec3> {
        vec![Vec3::ZERO, Vec3::X, Vec3::Y]
    }

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(Vertex::STRIDE, 32);
        assert_eq!(std::mem::offset_of!(Vertex, normal) as u32, Vertex::NORMAL_OFFSET);
        assert_eq!(std::mem::offset_of!(Vertex, tex_coord) as u32, Vertex::TEX_COORD_OFFSET);
    }

    #[test]
    fn positions_only_mesh_is_valid() {
        MeshData::from_positions(triangle()).validate().unwrap();
    }

    #[test]
    fn mismatched_normals_are_rejected() {
        let mesh = MeshData::from_positions(triangle()).with_normals(vec![Vec3::Y; 2]);
        match mesh.validate() {
            Err(RenderError::MeshAttributeCount {
                attribute,
                expected,
                actual,
            }) => {
                assert_eq!(attribute, "normals");
                assert_eq!((expected, actual), (3, 2));
            }
            other => panic!("expected attribute count error, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_tex_coords_are_rejected() {
        let mesh = MeshData::from_positions(triangle()).with_tex_coords(vec![Vec2::ZERO; 4]);
        assert!(matches!(
            mesh.validate(),
            Err(RenderError::MeshAttributeCount { actual: 4, .. })
        ));
    }

    #[test]
    fn partial_triangles_are_rejected() {
        assert!(matches!(
            MeshData::from_positions(vec![Vec3::ZERO; 4]).validate(),
            Err(RenderError::MeshNotTriangles(4))
        ));
        assert!(MeshData::default().validate().is_err());
    }

    #[test]
    fn missing_attributes_interleave_as_zero() {
        let mesh = MeshData::from_positions(triangle()).with_tex_coords(vec![Vec2::ONE; 3]);
        let vertices = mesh.vertices();
        assert_eq!(vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[1].normal, [0.0; 3]);
        assert_eq!(vertices[1].tex_coord, [1.0, 1.0]);
    }
}
