// SPDX-License-Identifier: CEPL-1.0
use bytemuck::Pod;

use crate::context::DeviceContext;
use crate::error::Result;
use crate::gpu::{
    ClearValue, Command, CommandBufferHandle, Extent, ImageBarrier, PipelineStage, SemaphoreWait,
    Submission,
};
use crate::pipeline::{Framebuffer, Pipeline, RenderPass};
use crate::resource::{BindingSet, Buffer, Image};
use crate::sync::{Fence, Semaphore};

pub struct CommandBuffer {
    ctx: DeviceContext,
    cmd: CommandBufferHandle,
}

impl CommandBuffer {
    pub fn allocate(ctx: &DeviceContext) -> Result<Self> {
        Ok(Self {
            ctx: ctx.clone(),
            cmd: ctx.gpu().allocate_command_buffer()?,
        })
    }

    pub fn handle(&self) -> CommandBufferHandle {
        self.cmd
    }

    /// Resets the buffer and starts recording. The buffer must not be executing.
    /// The returned recorder borrows the buffer until [`Recorder::finish`].
    pub fn begin_recording(&mut self) -> Result<Recorder<'_>> {
        self.ctx.gpu().begin_command_buffer(self.cmd)?;
        Ok(Recorder { cmd: self })
    }

    /// Queues the recorded work. `wait` delays the given stage until the
    /// semaphore fires; `signal` and `fence` fire when the work completes.
    pub fn submit(
        &self,
        wait: Option<(&Semaphore, PipelineStage)>,
        signal: Option<&Semaphore>,
        fence: Option<&Fence>,
    ) -> Result<()> {
        self.ctx.gpu().submit(&Submission {
            command_buffer: self.cmd,
            wait: wait.map(|(semaphore, stage)| SemaphoreWait {
                semaphore: semaphore.handle(),
                stage,
            }),
            signal: signal.map(Semaphore::handle),
            fence: fence.map(Fence::handle),
        })
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.ctx.gpu().free_command_buffer(self.cmd);
    }
}

/// Records into one command buffer, strictly in call order.
pub struct Recorder<'a> {
    cmd: &'a mut CommandBuffer,
}

impl Recorder<'_> {
    fn push(&mut self, command: Command) {
        self.cmd.ctx.gpu().record(self.cmd.cmd, &command);
    }

    pub fn image_barrier(&mut self, barrier: ImageBarrier) {
        self.push(Command::ImageBarrier(barrier));
    }

    pub fn copy_buffer_to_image(&mut self, buffer: &Buffer, image: &Image) {
        self.push(Command::CopyBufferToImage {
            buffer: buffer.handle(),
            image: image.handle(),
            extent: image.extent(),
        });
    }

    pub fn begin_render_pass(
        &mut self,
        render_pass: &RenderPass,
        framebuffer: &Framebuffer,
        clear_values: &[ClearValue],
    ) {
        self.push(Command::BeginRenderPass {
            render_pass: render_pass.handle(),
            framebuffer: framebuffer.handle(),
            extent: framebuffer.extent(),
            clear_values: clear_values.to_vec(),
        });
    }

    pub fn end_render_pass(&mut self) {
        self.push(Command::EndRenderPass);
    }

    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) {
        self.push(Command::BindPipeline(pipeline.handle()));
    }

    pub fn set_viewport(&mut self, extent: Extent) {
        self.push(Command::SetViewport(extent));
    }

    pub fn bind_binding_set(&mut self, pipeline: &Pipeline, slot: u32, set: &BindingSet) {
        self.push(Command::BindBindingSet {
            layout: pipeline.layout(),
            slot,
            set: set.handle(),
        });
    }

    pub fn push_constants<T: Pod>(&mut self, pipeline: &Pipeline, value: &T) {
        self.push(Command::PushConstants {
            layout: pipeline.layout(),
            bytes: bytemuck::bytes_of(value).to_vec(),
        });
    }

    pub fn bind_vertex_buffer(&mut self, buffer: &Buffer) {
        self.push(Command::BindVertexBuffer(buffer.handle()));
    }

    pub fn draw(&mut self, vertex_count: u32) {
        self.push(Command::Draw { vertex_count });
    }

    pub fn finish(self) -> Result<()> {
        self.cmd.ctx.gpu().end_command_buffer(self.cmd.cmd)
    }
}

/// Allocates a transient command buffer, records `f` into it, submits it and
/// blocks until it has executed.
pub fn one_shot<F>(ctx: &DeviceContext, f: F) -> Result<()>
where
    F: FnOnce(&mut Recorder<'_>) -> Result<()>,
{
    let mut cmd = CommandBuffer::allocate(ctx)?;
    let fence = Fence::new(ctx)?;
    let mut rec = cmd.begin_recording()?;
    f(&mut rec)?;
    rec.finish()?;
    cmd.submit(None, None, Some(&fence))?;
    fence.wait()
}
