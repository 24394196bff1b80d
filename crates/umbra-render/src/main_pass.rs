// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};

use crate::command::Recorder;
use crate::error::{RenderError, Result};
use crate::gpu::{
    AttachmentDesc, BindingKind, BufferUsage, ClearValue, Format, PipelineDesc, RenderPassDesc,
    ShaderProgram,
};
use crate::layout::ImageLayout;
use crate::mesh::DrawCall;
use crate::pipeline::{Framebuffer, Pipeline, RenderPass};
use crate::resource::{BindingSet, Buffer, ResourceFactory, Texture};
use crate::scene::{Camera, Light, MAX_LIGHTS};
use crate::shadow::ShadowMap;

pub const SCENE_SLOT: u32 = 0;
pub const ALBEDO_SLOT: u32 = 1;
pub const NORMAL_MAP_SLOT: u32 = 2;
pub const FIRST_SHADOW_SLOT: u32 = 3;

const WHITE_TEXEL: [u8; 4] = [255, 255, 255, 255];
/// Tangent-space "straight out" normal before remapping.
const FLAT_NORMAL_TEXEL: [u8; 4] = [127, 254, 127, 255];

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SceneUniforms {
    pub camera_view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[[f32; 4]; 4]; MAX_LIGHTS],
    pub light_position: [[f32; 4]; MAX_LIGHTS],
    pub camera_position: [f32; 4],
    pub light_count: u32,
    pub _pad: [u32; 3],
}

impl SceneUniforms {
    pub fn new(camera: &Camera, lights: &[Light], aspect: f32) -> Result<Self> {
        if lights.len() > MAX_LIGHTS {
            return Err(RenderError::LightCount {
                expected: MAX_LIGHTS,
                actual: lights.len(),
            });
        }
        let mut uniforms = Self::zeroed();
        uniforms.camera_view_proj = camera.view_projection(aspect).to_cols_array_2d();
        uniforms.camera_position = camera.position.extend(1.0).to_array();
        for (i, light) in lights.iter().enumerate() {
            uniforms.light_view_proj[i] = light.view_projection().to_cols_array_2d();
            uniforms.light_position[i] = light.position.extend(1.0).to_array();
        }
        uniforms.light_count = lights.len() as u32;
        Ok(uniforms)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ObjectPushConstants {
    pub model: [[f32; 4]; 4],
    pub flags: [u32; 4],
}

/// Draws the lit scene into the swapchain framebuffer, sampling every shadow map.
pub struct MainPassRenderer {
    uniform_set: BindingSet,
    uniforms: Buffer,
    default_albedo: Texture,
    default_normal_map: Texture,
    pipeline: Pipeline,
    render_pass: RenderPass,
    clear_color: [f32; 4],
}

impl MainPassRenderer {
    pub fn render_pass_desc(surface_format: Format, depth_format: Format) -> RenderPassDesc {
        RenderPassDesc {
            label: "main",
            color: AttachmentDesc {
                format: surface_format,
                store: true,
                final_layout: ImageLayout::PresentSrc,
            },
            depth: AttachmentDesc {
                format: depth_format,
                store: false,
                final_layout: ImageLayout::DepthAttachment,
            },
        }
    }

    pub fn binding_layout() -> Vec<BindingKind> {
        let mut kinds = vec![BindingKind::Uniform, BindingKind::Texture, BindingKind::Texture];
        kinds.extend(std::iter::repeat(BindingKind::Texture).take(MAX_LIGHTS));
        kinds
    }

    pub fn new(factory: &ResourceFactory, depth_format: Format, clear_color: [f32; 4]) -> Result<Self> {
        let ctx = factory.context();
        let surface = ctx.surface();
        let render_pass = RenderPass::new(ctx, &Self::render_pass_desc(surface.format, depth_format))?;
        let pipeline = Pipeline::new(
            ctx,
            &PipelineDesc {
                program: ShaderProgram::SceneLit,
                render_pass: render_pass.handle(),
                bindings: Self::binding_layout(),
                push_constant_size: std::mem::size_of::<ObjectPushConstants>() as u32,
            },
        )?;

        let default_albedo = factory.load_texture(&WHITE_TEXEL, 1, 1, false)?;
        let default_normal_map = factory.load_texture(&FLAT_NORMAL_TEXEL, 1, 1, true)?;

        let uniforms = factory.create_buffer(
            std::mem::size_of::<SceneUniforms>() as u64,
            BufferUsage::UNIFORM,
        )?;
        uniforms.write(0, bytemuck::bytes_of(&SceneUniforms::zeroed()))?;
        let uniform_set = factory.create_uniform_binding(&uniforms)?;

        Ok(Self {
            uniform_set,
            uniforms,
            default_albedo,
            default_normal_map,
            pipeline,
            render_pass,
            clear_color,
        })
    }

    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    /// Writes camera and light matrices. Only call while no submitted frame
    /// is still reading them.
    pub fn update_uniforms(&self, camera: &Camera, lights: &[Light], aspect: f32) -> Result<()> {
        let uniforms = SceneUniforms::new(camera, lights, aspect)?;
        self.uniforms.write(0, bytemuck::bytes_of(&uniforms))
    }

    /// Starts the main pass: clears color to the clear color and depth to 1.
    pub fn begin(&self, rec: &mut Recorder<'_>, framebuffer: &Framebuffer) {
        rec.begin_render_pass(
            &self.render_pass,
            framebuffer,
            &[ClearValue::Color(self.clear_color), ClearValue::Depth(1.0)],
        );
    }

    /// Records every draw call inside the pass started by [`Self::begin`].
    /// Shadow slots past the light count are filled with the first map.
    pub fn record(
        &self,
        rec: &mut Recorder<'_>,
        framebuffer: &Framebuffer,
        draw_calls: &[DrawCall],
        shadow_maps: &[ShadowMap],
    ) -> Result<()> {
        let Some(first_map) = shadow_maps.first() else {
            return Err(RenderError::Settings("main pass needs at least one shadow map".into()));
        };

        rec.bind_pipeline(&self.pipeline);
        rec.set_viewport(framebuffer.extent());
        rec.bind_binding_set(&self.pipeline, SCENE_SLOT, &self.uniform_set);
        for slot in 0..MAX_LIGHTS {
            let map = shadow_maps.get(slot).unwrap_or(first_map);
            rec.bind_binding_set(&self.pipeline, FIRST_SHADOW_SLOT + slot as u32, map.binding_set());
        }

        for draw in draw_calls {
            let albedo = draw.material.albedo.as_deref().unwrap_or(&self.default_albedo);
            let normal_map = draw
                .material
                .normal_map
                .as_deref()
                .unwrap_or(&self.default_normal_map);
            rec.bind_binding_set(&self.pipeline, ALBEDO_SLOT, albedo.binding_set());
            rec.bind_binding_set(&self.pipeline, NORMAL_MAP_SLOT, normal_map.binding_set());
            let constants = ObjectPushConstants {
                model: draw.world_transform().to_cols_array_2d(),
                flags: [draw.flags(), 0, 0, 0],
            };
            draw.record(rec, &self.pipeline, &constants);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn uniform_block_matches_shader_layout() {
        assert_eq!(std::mem::size_of::<SceneUniforms>(), 416);
        assert_eq!(std::mem::offset_of!(SceneUniforms, light_position), 320);
        assert_eq!(std::mem::offset_of!(SceneUniforms, light_count), 400);
        assert_eq!(std::mem::size_of::<ObjectPushConstants>(), 80);
    }

    #[test]
    fn uniforms_carry_each_light() {
        let lights = [
            Light::new(Vec3::new(1.0, 5.0, 0.0), Vec3::ZERO),
            Light::new(Vec3::new(-2.0, 4.0, 1.0), Vec3::ZERO),
        ];
        let u = SceneUniforms::new(&Camera::default(), &lights, 16.0 / 9.0).unwrap();
        assert_eq!(u.light_count, 2);
        assert_eq!(u.light_position[1], [-2.0, 4.0, 1.0, 1.0]);
        assert_eq!(u.light_view_proj[0], lights[0].view_projection().to_cols_array_2d());
        assert_eq!(u.light_position[2], [0.0; 4]);
    }

    #[test]
    fn too_many_lights_are_rejected() {
        let lights = vec![Light::new(Vec3::Y, Vec3::ZERO); MAX_LIGHTS + 1];
        assert!(matches!(
            SceneUniforms::new(&Camera::default(), &lights, 1.0),
            Err(RenderError::LightCount { actual: 5, .. })
        ));
    }

    #[test]
    fn every_light_gets_a_shadow_slot() {
        let layout = MainPassRenderer::binding_layout();
        assert_eq!(layout.len(), FIRST_SHADOW_SLOT as usize + MAX_LIGHTS);
        assert_eq!(layout[SCENE_SLOT as usize], BindingKind::Uniform);
    }
}
