// SPDX-License-Identifier: CEPL-1.0
use crate::context::DeviceContext;
use crate::error::Result;
use crate::gpu::{
    Extent, FramebufferHandle, PipelineDesc, PipelineHandle, PipelineLayoutHandle, RenderPassDesc,
    RenderPassHandle, ViewHandle,
};
use crate::resource::ImageView;

pub struct RenderPass {
    ctx: DeviceContext,
    pass: RenderPassHandle,
}

impl RenderPass {
    pub fn new(ctx: &DeviceContext, desc: &RenderPassDesc) -> Result<Self> {
        let pass = ctx.gpu().create_render_pass(desc)?;
        tracing::debug!(label = desc.label, "render pass created");
        Ok(Self {
            ctx: ctx.clone(),
            pass,
        })
    }

    pub fn handle(&self) -> RenderPassHandle {
        self.pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.ctx.gpu().destroy_render_pass(self.pass);
    }
}

/// Attachment set for one render pass. The attached views must outlive it.
pub struct Framebuffer {
    ctx: DeviceContext,
    framebuffer: FramebufferHandle,
    extent: Extent,
}

impl Framebuffer {
    pub fn new(ctx: &DeviceContext, pass: &RenderPass, attachments: &[&ImageView], extent: Extent) -> Result<Self> {
        let views: Vec<_> = attachments.iter().map(|v| v.handle()).collect();
        Self::from_raw_views(ctx, pass, &views, extent)
    }

    pub fn from_raw_views(
        ctx: &DeviceContext,
        pass: &RenderPass,
        views: &[ViewHandle],
        extent: Extent,
    ) -> Result<Self> {
        Ok(Self {
            ctx: ctx.clone(),
            framebuffer: ctx.gpu().create_framebuffer(pass.handle(), views, extent)?,
            extent,
        })
    }

    pub fn handle(&self) -> FramebufferHandle {
        self.framebuffer
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.ctx.gpu().destroy_framebuffer(self.framebuffer);
    }
}

/// Graphics pipeline together with its layout.
pub struct Pipeline {
    ctx: DeviceContext,
    layout: PipelineLayoutHandle,
    pipeline: PipelineHandle,
}

impl Pipeline {
    pub fn new(ctx: &DeviceContext, desc: &PipelineDesc) -> Result<Self> {
        let (layout, pipeline) = ctx.gpu().create_pipeline(desc)?;
        tracing::debug!(program = desc.program.name(), "pipeline created");
        Ok(Self {
            ctx: ctx.clone(),
            layout,
            pipeline,
        })
    }

    pub fn handle(&self) -> PipelineHandle {
        self.pipeline
    }

    pub fn layout(&self) -> PipelineLayoutHandle {
        self.layout
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.ctx.gpu().destroy_pipeline(self.layout, self.pipeline);
    }
}
