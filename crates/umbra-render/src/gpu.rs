// SPDX-License-Identifier: CEPL-1.0
//! Device seam. `umbra-render-vk` implements [`Gpu`] on Vulkan and
//! [`crate::headless::HeadlessGpu`] implements it in memory; the renderer
//! only ever talks to `dyn Gpu`.
use bitflags::bitflags;

use crate::error::Result;
use crate::layout::ImageLayout;

macro_rules! gpu_handles {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

gpu_handles!(
    ImageHandle,
    /// Device memory backing exactly one image or buffer.
    MemoryHandle,
    ViewHandle,
    BufferHandle,
    SamplerHandle,
    /// A bound descriptor set (one texture or one uniform buffer).
    BindingSetHandle,
    RenderPassHandle,
    FramebufferHandle,
    PipelineHandle,
    PipelineLayoutHandle,
    CommandBufferHandle,
    SemaphoreHandle,
    FenceHandle,
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Rgba8Unorm,
    Rgba8Snorm,
    Bgra8Unorm,
    Bgra8Srgb,
    R16Float,
    D32Float,
}

impl Format {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Format::Rgba8Unorm | Format::Rgba8Snorm | Format::Bgra8Unorm | Format::Bgra8Srgb => 4,
            Format::R16Float => 2,
            Format::D32Float => 4,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Format::D32Float)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aspect {
    Color,
    Depth,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const COLOR_ATTACHMENT = 1 << 0;
        const DEPTH_ATTACHMENT = 1 << 1;
        const SAMPLED = 1 << 2;
        const TRANSFER_DST = 1 << 3;
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const UNIFORM = 1 << 1;
        const TRANSFER_SRC = 1 << 2;
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const TRANSFER_WRITE = 1 << 0;
        const SHADER_READ = 1 << 1;
        const COLOR_ATTACHMENT_WRITE = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    TopOfPipe,
    Transfer,
    FragmentShader,
    ColorAttachmentOutput,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    pub format: Format,
    pub extent: Extent,
    pub usage: ImageUsage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    Texture {
        view: ViewHandle,
        sampler: SamplerHandle,
    },
    Uniform {
        buffer: BufferHandle,
        size: u64,
    },
}

/// Shape of one binding set slot in a pipeline layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    Uniform,
    Texture,
}

/// One attachment of a single-subpass render pass. Attachments always start
/// `Undefined` and are cleared on load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentDesc {
    pub format: Format,
    pub store: bool,
    pub final_layout: ImageLayout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub label: &'static str,
    pub color: AttachmentDesc,
    pub depth: AttachmentDesc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderProgram {
    /// Writes linear distance from the light into a single float channel.
    ShadowDepth,
    /// Lit, textured, shadow-mapped scene shading.
    SceneLit,
}

impl ShaderProgram {
    pub fn name(self) -> &'static str {
        match self {
            ShaderProgram::ShadowDepth => "shadow_depth",
            ShaderProgram::SceneLit => "scene_lit",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineDesc {
    pub program: ShaderProgram,
    pub render_pass: RenderPassHandle,
    pub bindings: Vec<BindingKind>,
    pub push_constant_size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    Depth(f32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub aspect: Aspect,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
    pub src_access: Access,
    pub dst_access: Access,
}

/// One recorded GPU command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ImageBarrier(ImageBarrier),
    CopyBufferToImage {
        buffer: BufferHandle,
        image: ImageHandle,
        extent: Extent,
    },
    BeginRenderPass {
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent,
        clear_values: Vec<ClearValue>,
    },
    EndRenderPass,
    BindPipeline(PipelineHandle),
    /// Sets both viewport and scissor to cover `extent`.
    SetViewport(Extent),
    BindBindingSet {
        layout: PipelineLayoutHandle,
        slot: u32,
        set: BindingSetHandle,
    },
    PushConstants {
        layout: PipelineLayoutHandle,
        bytes: Vec<u8>,
    },
    BindVertexBuffer(BufferHandle),
    Draw {
        vertex_count: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SemaphoreWait {
    pub semaphore: SemaphoreHandle,
    pub stage: PipelineStage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Submission {
    pub command_buffer: CommandBufferHandle,
    pub wait: Option<SemaphoreWait>,
    pub signal: Option<SemaphoreHandle>,
    pub fence: Option<FenceHandle>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub queue_family_index: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub format: Format,
    pub extent: Extent,
    pub image_count: u32,
}

/// Everything the renderer needs from a device, its single graphics+present
/// queue and its swapchain. Creation calls return handles the caller owns and
/// must hand back to the matching `destroy_*`; swapchain views stay owned by
/// the implementation.
pub trait Gpu {
    fn info(&self) -> DeviceInfo;

    // --- resources ---
    fn create_image(&self, desc: &ImageDesc) -> Result<(ImageHandle, MemoryHandle)>;
    fn destroy_image(&self, image: ImageHandle, memory: MemoryHandle);
    fn create_image_view(&self, image: ImageHandle, format: Format, aspect: Aspect) -> Result<ViewHandle>;
    fn destroy_image_view(&self, view: ViewHandle);
    /// Host-visible, host-coherent buffer.
    fn create_buffer(&self, size: u64, usage: BufferUsage) -> Result<(BufferHandle, MemoryHandle)>;
    fn destroy_buffer(&self, buffer: BufferHandle, memory: MemoryHandle);
    fn write_memory(&self, memory: MemoryHandle, offset: u64, bytes: &[u8]) -> Result<()>;
    fn create_sampler(&self) -> Result<SamplerHandle>;
    fn destroy_sampler(&self, sampler: SamplerHandle);
    fn create_binding_set(&self, binding: &Binding) -> Result<BindingSetHandle>;
    fn destroy_binding_set(&self, set: BindingSetHandle);

    // --- passes and pipelines ---
    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle>;
    fn destroy_render_pass(&self, pass: RenderPassHandle);
    fn create_framebuffer(
        &self,
        pass: RenderPassHandle,
        attachments: &[ViewHandle],
        extent: Extent,
    ) -> Result<FramebufferHandle>;
    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);
    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<(PipelineLayoutHandle, PipelineHandle)>;
    fn destroy_pipeline(&self, layout: PipelineLayoutHandle, pipeline: PipelineHandle);

    // --- commands ---
    fn allocate_command_buffer(&self) -> Result<CommandBufferHandle>;
    fn free_command_buffer(&self, cmd: CommandBufferHandle);
    /// Resets `cmd` and starts recording into it.
    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()>;
    fn record(&self, cmd: CommandBufferHandle, command: &Command);
    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()>;
    fn submit(&self, submission: &Submission) -> Result<()>;
    fn wait_queue_idle(&self) -> Result<()>;
    fn wait_device_idle(&self) -> Result<()>;

    // --- sync ---
    fn create_semaphore(&self) -> Result<SemaphoreHandle>;
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);
    fn create_fence(&self) -> Result<FenceHandle>;
    fn destroy_fence(&self, fence: FenceHandle);
    fn wait_fence(&self, fence: FenceHandle) -> Result<()>;
    fn reset_fence(&self, fence: FenceHandle) -> Result<()>;

    // --- surface ---
    fn surface(&self) -> SurfaceInfo;
    fn surface_views(&self) -> Vec<ViewHandle>;
    /// Acquires the next presentable image; `signal` fires once it is usable.
    fn acquire_next_image(&self, signal: SemaphoreHandle) -> Result<u32>;
    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<()>;
}
