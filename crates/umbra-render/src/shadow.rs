// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};

use crate::command::Recorder;
use crate::context::DeviceContext;
use crate::error::{RenderError, Result};
use crate::gpu::{
    Aspect, AttachmentDesc, BindingKind, ClearValue, Extent, Format, ImageUsage, PipelineDesc,
    RenderPassDesc, ShaderProgram,
};
use crate::layout::ImageLayout;
use crate::mesh::DrawCall;
use crate::pipeline::{Framebuffer, Pipeline, RenderPass};
use crate::resource::{BindingSet, ImageView, ResourceFactory, Sampler};
use crate::scene::{Light, MAX_LIGHTS};

/// Linear depth written where nothing was drawn; farther than any light reaches.
pub const SHADOW_CLEAR_DEPTH: f32 = 1000.0;
pub const SHADOW_COLOR_FORMAT: Format = Format::R16Float;
pub const SHADOW_DEPTH_FORMAT: Format = Format::D32Float;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadowPushConstants {
    pub model: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
}

/// Per-light render target: a float color image holding linear depth from
/// the light, a depth buffer for the pass itself, and the binding set the
/// main pass samples it through.
pub struct ShadowMap {
    // drop order: set, sampler, framebuffer, then the views it references
    binding_set: BindingSet,
    sampler: Sampler,
    framebuffer: Framebuffer,
    color_view: ImageView,
    depth_view: ImageView,
}

impl ShadowMap {
    fn new(factory: &ResourceFactory, pass: &RenderPass, resolution: u32) -> Result<Self> {
        let extent = Extent::new(resolution, resolution);
        let color = factory.create_image(
            SHADOW_COLOR_FORMAT,
            extent,
            ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED,
        )?;
        let color_view = factory.create_image_view(&color, Aspect::Color)?;
        let depth = factory.create_image(SHADOW_DEPTH_FORMAT, extent, ImageUsage::DEPTH_ATTACHMENT)?;
        let depth_view = factory.create_image_view(&depth, Aspect::Depth)?;
        let framebuffer = Framebuffer::new(factory.context(), pass, &[&color_view, &depth_view], extent)?;
        let sampler = factory.create_sampler()?;
        let binding_set = factory.create_texture_binding(&color_view, &sampler)?;
        Ok(Self {
            binding_set,
            sampler,
            framebuffer,
            color_view,
            depth_view,
        })
    }

    pub fn binding_set(&self) -> &BindingSet {
        &self.binding_set
    }

    pub fn color_view(&self) -> &ImageView {
        &self.color_view
    }

    pub fn depth_view(&self) -> &ImageView {
        &self.depth_view
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }
}

/// Renders every draw call once per light into that light's shadow map.
pub struct ShadowPassOrchestrator {
    maps: Vec<ShadowMap>,
    pipeline: Pipeline,
    render_pass: RenderPass,
    resolution: u32,
}

impl ShadowPassOrchestrator {
    pub fn render_pass_desc() -> RenderPassDesc {
        RenderPassDesc {
            label: "shadow",
            color: AttachmentDesc {
                format: SHADOW_COLOR_FORMAT,
                store: true,
                final_layout: ImageLayout::ShaderReadOnly,
            },
            depth: AttachmentDesc {
                format: SHADOW_DEPTH_FORMAT,
                store: false,
                final_layout: ImageLayout::DepthAttachment,
            },
        }
    }

    pub fn new(factory: &ResourceFactory, light_count: usize, resolution: u32) -> Result<Self> {
        if light_count == 0 || light_count > MAX_LIGHTS {
            return Err(RenderError::Settings(format!(
                "light count {light_count} outside 1..={MAX_LIGHTS}"
            )));
        }
        if resolution == 0 {
            return Err(RenderError::Settings("shadow map resolution must be non-zero".into()));
        }

        let ctx: &DeviceContext = factory.context();
        let render_pass = RenderPass::new(ctx, &Self::render_pass_desc())?;
        let pipeline = Pipeline::new(
            ctx,
            &PipelineDesc {
                program: ShaderProgram::ShadowDepth,
                render_pass: render_pass.handle(),
                bindings: Vec::<BindingKind>::new(),
                push_constant_size: std::mem::size_of::<ShadowPushConstants>() as u32,
            },
        )?;
        let maps = (0..light_count)
            .map(|_| ShadowMap::new(factory, &render_pass, resolution))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(lights = light_count, resolution, "shadow maps ready");
        Ok(Self {
            maps,
            pipeline,
            render_pass,
            resolution,
        })
    }

    pub fn maps(&self) -> &[ShadowMap] {
        &self.maps
    }

    pub fn light_count(&self) -> usize {
        self.maps.len()
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Records one complete render pass per light, in light order. Must be
    /// called outside any render pass. Returns the number of passes recorded.
    pub fn record(&self, rec: &mut Recorder<'_>, lights: &[Light], draw_calls: &[DrawCall]) -> Result<usize> {
        if lights.len() != self.maps.len() {
            return Err(RenderError::LightCount {
                expected: self.maps.len(),
                actual: lights.len(),
            });
        }

        let clears = [ClearValue::Color([SHADOW_CLEAR_DEPTH, 0.0, 0.0, 0.0]), ClearValue::Depth(1.0)];
        for (map, light) in self.maps.iter().zip(lights) {
            let light_view_proj = light.view_projection().to_cols_array_2d();
            rec.begin_render_pass(&self.render_pass, &map.framebuffer, &clears);
            rec.bind_pipeline(&self.pipeline);
            rec.set_viewport(map.framebuffer.extent());
            for draw in draw_calls {
                let constants = ShadowPushConstants {
                    model: draw.world_transform().to_cols_array_2d(),
                    light_view_proj,
                };
                draw.record(rec, &self.pipeline, &constants);
            }
            rec.end_render_pass();
        }
        Ok(self.maps.len())
    }
}
