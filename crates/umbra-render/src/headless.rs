// SPDX-License-Identifier: CEPL-1.0
//! In-memory [`Gpu`] with no device behind it. Work "executes" at submit
//! time; the backend tracks every live handle, command buffer state and
//! semaphore signal so misuse shows up as errors instead of undefined behaviour.
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::context::{select_queue_family, DeviceContext, QueueFamilyCaps};
use crate::error::{RenderError, Result};
use crate::gpu::*;

/// Largest push constant block every Vulkan implementation accepts.
const MAX_PUSH_CONSTANT_SIZE: u32 = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Memory,
    ImageView,
    Buffer,
    Sampler,
    BindingSet,
    RenderPass,
    Framebuffer,
    Pipeline,
    PipelineLayout,
    CommandBuffer,
    Semaphore,
    Fence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Acquired { image_index: u32 },
    Submitted { command_buffer: CommandBufferHandle, commands: Vec<Command> },
    Presented { image_index: u32 },
    QueueIdle,
    DeviceIdle,
}

#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    pub extent: Extent,
    pub image_count: u32,
    pub format: Format,
    pub queue_families: Vec<QueueFamilyCaps>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            extent: Extent::new(800, 600),
            image_count: 3,
            format: Format::Bgra8Srgb,
            queue_families: vec![QueueFamilyCaps {
                graphics: true,
                present: true,
            }],
        }
    }
}

struct CommandBufferRecord {
    state: CommandBufferState,
    commands: Vec<Command>,
    fence: Option<FenceHandle>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    live: HashMap<u64, ResourceKind>,
    memory: HashMap<u64, Vec<u8>>,
    image_memory: HashMap<u64, u64>,
    buffer_memory: HashMap<u64, u64>,
    command_buffers: HashMap<u64, CommandBufferRecord>,
    semaphores: HashMap<u64, bool>,
    fences: HashMap<u64, bool>,
    swapchain_views: Vec<ViewHandle>,
    next_image: u32,
    acquired: Vec<u32>,
    events: Vec<Event>,
    misuse: Vec<String>,
}

impl State {
    fn alloc(&mut self, kind: ResourceKind) -> u64 {
        self.next_id += 1;
        self.live.insert(self.next_id, kind);
        self.next_id
    }

    fn release(&mut self, id: u64, kind: ResourceKind) {
        match self.live.remove(&id) {
            Some(k) if k == kind => {}
            Some(k) => self.report(format!("released {kind:?} {id} but it is a {k:?}")),
            None => self.report(format!("released unknown or already released {kind:?} {id}")),
        }
    }

    fn is_live(&self, id: u64, kind: ResourceKind) -> bool {
        self.live.get(&id) == Some(&kind)
    }

    fn require(&self, op: &'static str, id: u64, kind: ResourceKind) -> Result<()> {
        if self.is_live(id, kind) {
            Ok(())
        } else {
            Err(RenderError::gpu(op, format!("{kind:?} {id} is not live")))
        }
    }

    fn report(&mut self, message: String) {
        tracing::error!("headless gpu misuse: {message}");
        self.misuse.push(message);
    }

    fn settle(&mut self, fence: Option<FenceHandle>) {
        for record in self.command_buffers.values_mut() {
            if record.state == CommandBufferState::Pending
                && (fence.is_none() || record.fence == fence)
            {
                record.state = CommandBufferState::Executable;
            }
        }
    }

    fn execute(&mut self, commands: &[Command]) {
        for command in commands {
            if let Command::CopyBufferToImage { buffer, image, .. } = command {
                let src = self
                    .buffer_memory
                    .get(&buffer.0)
                    .and_then(|m| self.memory.get(m))
                    .cloned();
                let dst = self.image_memory.get(&image.0).copied();
                match (src, dst) {
                    (Some(src), Some(dst)) => {
                        if let Some(bytes) = self.memory.get_mut(&dst) {
                            let n = src.len().min(bytes.len());
                            bytes[..n].copy_from_slice(&src[..n]);
                        }
                    }
                    _ => self.report(format!("copy between released resources {buffer:?} -> {image:?}")),
                }
            }
        }
    }
}

pub struct HeadlessGpu {
    config: HeadlessConfig,
    queue_family: u32,
    state: RefCell<State>,
}

impl HeadlessGpu {
    pub fn new(config: HeadlessConfig) -> Result<Self> {
        let queue_family = select_queue_family(&config.queue_families).ok_or(RenderError::NoSuitableDevice)?;
        if config.image_count == 0 {
            return Err(RenderError::Settings("swapchain needs at least one image".into()));
        }
        let mut state = State::default();
        for _ in 0..config.image_count {
            state.next_id += 1;
            state.swapchain_views.push(ViewHandle(state.next_id));
        }
        Ok(Self {
            config,
            queue_family,
            state: RefCell::new(state),
        })
    }

    /// Builds the backend and a context over it, keeping a typed handle for inspection.
    pub fn context(config: HeadlessConfig) -> Result<(Rc<HeadlessGpu>, DeviceContext)> {
        let gpu = Rc::new(Self::new(config)?);
        let ctx = DeviceContext::new(gpu.clone());
        Ok((gpu, ctx))
    }

    /// Handles created through this backend and not yet released.
    pub fn live_resources(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn live_count(&self, kind: ResourceKind) -> usize {
        self.state.borrow().live.values().filter(|k| **k == kind).count()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Commands of every submission so far, in submission order.
    pub fn submissions(&self) -> Vec<Vec<Command>> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Submitted { commands, .. } => Some(commands.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn presented(&self) -> Vec<u32> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Presented { image_index } => Some(*image_index),
                _ => None,
            })
            .collect()
    }

    pub fn image_contents(&self, image: ImageHandle) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let memory = state.image_memory.get(&image.0)?;
        state.memory.get(memory).cloned()
    }

    pub fn command_buffer_state(&self, cmd: CommandBufferHandle) -> Option<CommandBufferState> {
        self.state.borrow().command_buffers.get(&cmd.0).map(|r| r.state)
    }

    /// Misuse seen in calls that cannot return an error (release, record).
    pub fn misuse(&self) -> Vec<String> {
        self.state.borrow().misuse.clone()
    }
}

impl Gpu for HeadlessGpu {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "headless".into(),
            queue_family_index: self.queue_family,
        }
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<(ImageHandle, MemoryHandle)> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RenderError::gpu("create_image", "zero-sized image"));
        }
        let mut s = self.state.borrow_mut();
        let image = s.alloc(ResourceKind::Image);
        let memory = s.alloc(ResourceKind::Memory);
        let size = desc.extent.width as usize * desc.extent.height as usize * desc.format.bytes_per_pixel();
        s.memory.insert(memory, vec![0; size]);
        s.image_memory.insert(image, memory);
        Ok((ImageHandle(image), MemoryHandle(memory)))
    }

    fn destroy_image(&self, image: ImageHandle, memory: MemoryHandle) {
        let mut s = self.state.borrow_mut();
        s.release(image.0, ResourceKind::Image);
        s.release(memory.0, ResourceKind::Memory);
        s.image_memory.remove(&image.0);
        s.memory.remove(&memory.0);
    }

    fn create_image_view(&self, image: ImageHandle, _format: Format, _aspect: Aspect) -> Result<ViewHandle> {
        let mut s = self.state.borrow_mut();
        s.require("create_image_view", image.0, ResourceKind::Image)?;
        Ok(ViewHandle(s.alloc(ResourceKind::ImageView)))
    }

    fn destroy_image_view(&self, view: ViewHandle) {
        self.state.borrow_mut().release(view.0, ResourceKind::ImageView);
    }

    fn create_buffer(&self, size: u64, _usage: BufferUsage) -> Result<(BufferHandle, MemoryHandle)> {
        if size == 0 {
            return Err(RenderError::gpu("create_buffer", "zero-sized buffer"));
        }
        let mut s = self.state.borrow_mut();
        let buffer = s.alloc(ResourceKind::Buffer);
        let memory = s.alloc(ResourceKind::Memory);
        s.memory.insert(memory, vec![0; size as usize]);
        s.buffer_memory.insert(buffer, memory);
        Ok((BufferHandle(buffer), MemoryHandle(memory)))
    }

    fn destroy_buffer(&self, buffer: BufferHandle, memory: MemoryHandle) {
        let mut s = self.state.borrow_mut();
        s.release(buffer.0, ResourceKind::Buffer);
        s.release(memory.0, ResourceKind::Memory);
        s.buffer_memory.remove(&buffer.0);
        s.memory.remove(&memory.0);
    }

    fn write_memory(&self, memory: MemoryHandle, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let target = s
            .memory
            .get_mut(&memory.0)
            .ok_or_else(|| RenderError::gpu("write_memory", format!("memory {} is not live", memory.0)))?;
        let start = offset as usize;
        let end = start + bytes.len();
        if end > target.len() {
            return Err(RenderError::gpu("write_memory", "write past end of allocation"));
        }
        target[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn create_sampler(&self) -> Result<SamplerHandle> {
        Ok(SamplerHandle(self.state.borrow_mut().alloc(ResourceKind::Sampler)))
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        self.state.borrow_mut().release(sampler.0, ResourceKind::Sampler);
    }

    fn create_binding_set(&self, binding: &Binding) -> Result<BindingSetHandle> {
        let mut s = self.state.borrow_mut();
        match *binding {
            Binding::Texture { view, sampler } => {
                s.require("create_binding_set", view.0, ResourceKind::ImageView)?;
                s.require("create_binding_set", sampler.0, ResourceKind::Sampler)?;
            }
            Binding::Uniform { buffer, .. } => {
                s.require("create_binding_set", buffer.0, ResourceKind::Buffer)?;
            }
        }
        Ok(BindingSetHandle(s.alloc(ResourceKind::BindingSet)))
    }

    fn destroy_binding_set(&self, set: BindingSetHandle) {
        self.state.borrow_mut().release(set.0, ResourceKind::BindingSet);
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        Ok(RenderPassHandle(self.state.borrow_mut().alloc(ResourceKind::RenderPass)))
    }

    fn destroy_render_pass(&self, pass: RenderPassHandle) {
        self.state.borrow_mut().release(pass.0, ResourceKind::RenderPass);
    }

    fn create_framebuffer(
        &self,
        pass: RenderPassHandle,
        attachments: &[ViewHandle],
        _extent: Extent,
    ) -> Result<FramebufferHandle> {
        let mut s = self.state.borrow_mut();
        s.require("create_framebuffer", pass.0, ResourceKind::RenderPass)?;
        for view in attachments {
            if !s.swapchain_views.contains(view) {
                s.require("create_framebuffer", view.0, ResourceKind::ImageView)?;
            }
        }
        Ok(FramebufferHandle(s.alloc(ResourceKind::Framebuffer)))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        self.state.borrow_mut().release(framebuffer.0, ResourceKind::Framebuffer);
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<(PipelineLayoutHandle, PipelineHandle)> {
        if desc.push_constant_size > MAX_PUSH_CONSTANT_SIZE {
            return Err(RenderError::gpu(
                "create_pipeline",
                format!("{} push constant bytes exceed {MAX_PUSH_CONSTANT_SIZE}", desc.push_constant_size),
            ));
        }
        let mut s = self.state.borrow_mut();
        s.require("create_pipeline", desc.render_pass.0, ResourceKind::RenderPass)?;
        let layout = s.alloc(ResourceKind::PipelineLayout);
        let pipeline = s.alloc(ResourceKind::Pipeline);
        Ok((PipelineLayoutHandle(layout), PipelineHandle(pipeline)))
    }

    fn destroy_pipeline(&self, layout: PipelineLayoutHandle, pipeline: PipelineHandle) {
        let mut s = self.state.borrow_mut();
        s.release(pipeline.0, ResourceKind::Pipeline);
        s.release(layout.0, ResourceKind::PipelineLayout);
    }

    fn allocate_command_buffer(&self) -> Result<CommandBufferHandle> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc(ResourceKind::CommandBuffer);
        s.command_buffers.insert(
            id,
            CommandBufferRecord {
                state: CommandBufferState::Initial,
                commands: Vec::new(),
                fence: None,
            },
        );
        Ok(CommandBufferHandle(id))
    }

    fn free_command_buffer(&self, cmd: CommandBufferHandle) {
        let mut s = self.state.borrow_mut();
        if let Some(record) = s.command_buffers.remove(&cmd.0) {
            if record.state == CommandBufferState::Pending {
                s.report(format!("freed command buffer {} while pending", cmd.0));
            }
        }
        s.release(cmd.0, ResourceKind::CommandBuffer);
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let record = s
            .command_buffers
            .get_mut(&cmd.0)
            .ok_or_else(|| RenderError::gpu("begin_command_buffer", "unknown command buffer"))?;
        if record.state == CommandBufferState::Pending {
            return Err(RenderError::gpu("begin_command_buffer", "command buffer is still pending"));
        }
        record.state = CommandBufferState::Recording;
        record.commands.clear();
        record.fence = None;
        Ok(())
    }

    fn record(&self, cmd: CommandBufferHandle, command: &Command) {
        let mut s = self.state.borrow_mut();
        let recording = matches!(
            s.command_buffers.get(&cmd.0),
            Some(record) if record.state == CommandBufferState::Recording
        );
        if !recording {
            s.report(format!("recorded {command:?} into command buffer {} outside recording", cmd.0));
        } else if let Some(record) = s.command_buffers.get_mut(&cmd.0) {
            record.commands.push(command.clone());
        }
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let record = s
            .command_buffers
            .get_mut(&cmd.0)
            .ok_or_else(|| RenderError::gpu("end_command_buffer", "unknown command buffer"))?;
        if record.state != CommandBufferState::Recording {
            return Err(RenderError::gpu("end_command_buffer", "command buffer is not recording"));
        }
        let mut depth = 0i32;
        for command in &record.commands {
            match command {
                Command::BeginRenderPass { .. } if depth > 0 => {
                    return Err(RenderError::gpu("end_command_buffer", "nested render pass"));
                }
                Command::BeginRenderPass { .. } => depth += 1,
                Command::EndRenderPass if depth == 0 => {
                    return Err(RenderError::gpu("end_command_buffer", "render pass ended twice"));
                }
                Command::EndRenderPass => depth -= 1,
                Command::Draw { .. } if depth == 0 => {
                    return Err(RenderError::gpu("end_command_buffer", "draw outside a render pass"));
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(RenderError::gpu("end_command_buffer", "render pass left open"));
        }
        record.state = CommandBufferState::Executable;
        Ok(())
    }

    fn submit(&self, submission: &Submission) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let cmd = submission.command_buffer.0;
        match s.command_buffers.get(&cmd).map(|r| r.state) {
            Some(CommandBufferState::Executable) => {}
            Some(state) => {
                return Err(RenderError::gpu("queue_submit", format!("command buffer is {state:?}")));
            }
            None => return Err(RenderError::gpu("queue_submit", "unknown command buffer")),
        }
        if let Some(wait) = submission.wait {
            match s.semaphores.get_mut(&wait.semaphore.0) {
                Some(signaled) if *signaled => *signaled = false,
                Some(_) => return Err(RenderError::gpu("queue_submit", "wait on a semaphore nothing signals")),
                None => return Err(RenderError::gpu("queue_submit", "unknown wait semaphore")),
            }
        }
        if let Some(signal) = submission.signal {
            match s.semaphores.get_mut(&signal.0) {
                Some(signaled) if !*signaled => *signaled = true,
                Some(_) => return Err(RenderError::gpu("queue_submit", "signal semaphore already signaled")),
                None => return Err(RenderError::gpu("queue_submit", "unknown signal semaphore")),
            }
        }
        if let Some(fence) = submission.fence {
            match s.fences.get_mut(&fence.0) {
                Some(signaled) if !*signaled => *signaled = true,
                Some(_) => return Err(RenderError::gpu("queue_submit", "fence already signaled")),
                None => return Err(RenderError::gpu("queue_submit", "unknown fence")),
            }
        }

        let commands = match s.command_buffers.get_mut(&cmd) {
            Some(record) => {
                record.state = CommandBufferState::Pending;
                record.fence = submission.fence;
                record.commands.clone()
            }
            None => Vec::new(),
        };
        s.execute(&commands);
        s.events.push(Event::Submitted {
            command_buffer: submission.command_buffer,
            commands,
        });
        Ok(())
    }

    fn wait_queue_idle(&self) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.settle(None);
        s.events.push(Event::QueueIdle);
        Ok(())
    }

    fn wait_device_idle(&self) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.settle(None);
        s.events.push(Event::DeviceIdle);
        Ok(())
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc(ResourceKind::Semaphore);
        s.semaphores.insert(id, false);
        Ok(SemaphoreHandle(id))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        let mut s = self.state.borrow_mut();
        s.semaphores.remove(&semaphore.0);
        s.release(semaphore.0, ResourceKind::Semaphore);
    }

    fn create_fence(&self) -> Result<FenceHandle> {
        let mut s = self.state.borrow_mut();
        let id = s.alloc(ResourceKind::Fence);
        s.fences.insert(id, false);
        Ok(FenceHandle(id))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut s = self.state.borrow_mut();
        s.fences.remove(&fence.0);
        s.release(fence.0, ResourceKind::Fence);
    }

    fn wait_fence(&self, fence: FenceHandle) -> Result<()> {
        let mut s = self.state.borrow_mut();
        match s.fences.get(&fence.0).copied() {
            Some(true) => {
                s.settle(Some(fence));
                Ok(())
            }
            Some(false) => Err(RenderError::gpu("wait_for_fences", "fence is never signaled")),
            None => Err(RenderError::gpu("wait_for_fences", "unknown fence")),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let signaled = s
            .fences
            .get_mut(&fence.0)
            .ok_or_else(|| RenderError::gpu("reset_fences", "unknown fence"))?;
        *signaled = false;
        Ok(())
    }

    fn surface(&self) -> SurfaceInfo {
        SurfaceInfo {
            format: self.config.format,
            extent: self.config.extent,
            image_count: self.config.image_count,
        }
    }

    fn surface_views(&self) -> Vec<ViewHandle> {
        self.state.borrow().swapchain_views.clone()
    }

    fn acquire_next_image(&self, signal: SemaphoreHandle) -> Result<u32> {
        let mut s = self.state.borrow_mut();
        if s.acquired.len() as u32 == self.config.image_count {
            return Err(RenderError::gpu("acquire_next_image", "every image is already acquired"));
        }
        let image_index = s.next_image;
        if s.acquired.contains(&image_index) {
            let message = format!("image {image_index} acquired again before it was presented");
            s.report(message.clone());
            return Err(RenderError::gpu("acquire_next_image", message));
        }
        match s.semaphores.get_mut(&signal.0) {
            Some(signaled) if !*signaled => *signaled = true,
            Some(_) => {
                return Err(RenderError::gpu("acquire_next_image", "semaphore already signaled"));
            }
            None => return Err(RenderError::gpu("acquire_next_image", "unknown semaphore")),
        }
        s.next_image = (s.next_image + 1) % self.config.image_count;
        s.acquired.push(image_index);
        s.events.push(Event::Acquired { image_index });
        Ok(image_index)
    }

    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let Some(pos) = s.acquired.iter().position(|i| *i == image_index) else {
            return Err(RenderError::gpu("queue_present", format!("image {image_index} was not acquired")));
        };
        match s.semaphores.get_mut(&wait.0) {
            Some(signaled) if *signaled => *signaled = false,
            Some(_) => return Err(RenderError::gpu("queue_present", "wait on a semaphore nothing signals")),
            None => return Err(RenderError::gpu("queue_present", "unknown semaphore")),
        }
        s.acquired.remove(pos);
        s.events.push(Event::Presented { image_index });
        Ok(())
    }
}
