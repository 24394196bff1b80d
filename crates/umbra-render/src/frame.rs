// SPDX-License-Identifier: CEPL-1.0
use crate::command::CommandBuffer;
use crate::context::DeviceContext;
use crate::error::{RenderError, Result};
use crate::gpu::{Aspect, Extent, Format, ImageUsage};
use crate::pipeline::{Framebuffer, RenderPass};
use crate::resource::{ImageView, ResourceFactory};
use crate::sync::Semaphore;

struct FrameSlot {
    // framebuffer first: it references the depth view owned by the manager
    framebuffer: Framebuffer,
    command_buffer: CommandBuffer,
}

/// One command buffer and framebuffer per swapchain image, plus the depth
/// attachment they all share.
pub struct FrameManager {
    slots: Vec<FrameSlot>,
    depth_view: ImageView,
    extent: Extent,
    ctx: DeviceContext,
}

/// An acquired swapchain image, ready to record into and present once.
pub struct Frame<'a> {
    pub index: u32,
    pub extent: Extent,
    pub command_buffer: &'a mut CommandBuffer,
    pub framebuffer: &'a Framebuffer,
    ctx: &'a DeviceContext,
}

impl FrameManager {
    pub const DEPTH_FORMAT: Format = Format::D32Float;

    /// Builds per-image framebuffers against `main_pass`, whose attachments
    /// are (swapchain color, shared depth).
    pub fn new(factory: &ResourceFactory, main_pass: &RenderPass) -> Result<Self> {
        let ctx = factory.context().clone();
        let surface = ctx.surface();
        let depth = factory.create_image(
            Self::DEPTH_FORMAT,
            surface.extent,
            ImageUsage::DEPTH_ATTACHMENT,
        )?;
        let depth_view = factory.create_image_view(&depth, Aspect::Depth)?;

        let slots = ctx
            .gpu()
            .surface_views()
            .into_iter()
            .map(|view| {
                Ok(FrameSlot {
                    framebuffer: Framebuffer::from_raw_views(
                        &ctx,
                        main_pass,
                        &[view, depth_view.handle()],
                        surface.extent,
                    )?,
                    command_buffer: CommandBuffer::allocate(&ctx)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            images = slots.len(),
            width = surface.extent.width,
            height = surface.extent.height,
            "frame manager ready"
        );
        Ok(Self {
            slots,
            depth_view,
            extent: surface.extent,
            ctx,
        })
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.slots.len()
    }

    pub fn depth_view(&self) -> &ImageView {
        &self.depth_view
    }

    /// Acquires the next swapchain image. `image_available` fires once the
    /// image can be rendered to.
    pub fn acquire_next_frame(&mut self, image_available: &Semaphore) -> Result<Frame<'_>> {
        let index = self.ctx.gpu().acquire_next_image(image_available.handle())?;
        let Self {
            slots, extent, ctx, ..
        } = self;
        let count = slots.len();
        let slot = slots.get_mut(index as usize).ok_or_else(|| {
            RenderError::gpu(
                "acquire_next_image",
                format!("image index {index} out of range for {count} images"),
            )
        })?;
        Ok(Frame {
            index,
            extent: *extent,
            command_buffer: &mut slot.command_buffer,
            framebuffer: &slot.framebuffer,
            ctx,
        })
    }
}

impl Frame<'_> {
    /// Queues the image for display once `render_complete` fires.
    pub fn present(self, render_complete: &Semaphore) -> Result<()> {
        self.ctx.gpu().present(self.index, render_complete.handle())
    }
}
