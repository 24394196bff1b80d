// SPDX-License-Identifier: CEPL-1.0
use ash::vk::Handle;
use ash::{khr::surface, khr::swapchain, vk, Device, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;
use umbra_render::gpu::{
    Aspect, Binding, BindingKind, BindingSetHandle, BufferHandle, BufferUsage, ClearValue, Command,
    CommandBufferHandle, DeviceInfo, Extent, FenceHandle, Format, FramebufferHandle, Gpu, ImageDesc,
    ImageHandle, MemoryHandle, PipelineDesc, PipelineHandle, PipelineLayoutHandle, RenderPassDesc,
    RenderPassHandle, SamplerHandle, SemaphoreHandle, Submission, SurfaceInfo, ViewHandle,
};
use umbra_render::{ImageLayout, RenderError, RenderSize, Result};

use crate::convert::{self, VkContext};
use crate::instance::{self, DebugMessenger};
use crate::swapchain::Swapchain;
use crate::{device, pipeline, swapchain as sc, VkOptions};

const MAX_BINDING_SETS: u32 = 256;
const MAX_UNIFORM_SETS: u32 = 16;

fn raw_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::gpu("window handle", e)
}

/// [`Gpu`] over one Vulkan device, its graphics+present queue and one swapchain.
pub struct VkGpu {
    _entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,

    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device: Device,
    queue: vk::Queue,
    queue_family: u32,
    device_name: String,

    swapchain: Swapchain,

    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    uniform_set_layout: vk::DescriptorSetLayout,
    texture_set_layout: vk::DescriptorSetLayout,
}

impl VkGpu {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        options: &VkOptions,
    ) -> Result<Self> {
        unsafe { build(window, display, size, options) }
    }

    /// Validation errors surface as failures of the call that triggered them.
    fn check_validation(&self) -> Result<()> {
        match self.debug.as_ref() {
            Some(debug) => instance::validation_status(debug.take_errors()),
            None => Ok(()),
        }
    }

    fn set_layout(&self, kind: BindingKind) -> vk::DescriptorSetLayout {
        match kind {
            BindingKind::Uniform => self.uniform_set_layout,
            BindingKind::Texture => self.texture_set_layout,
        }
    }

    unsafe fn allocate(&self, reqs: vk::MemoryRequirements, flags: vk::MemoryPropertyFlags) -> Result<vk::DeviceMemory> {
        let memory_type_index = device::find_memory_type(&self.memory_properties, reqs.memory_type_bits, flags)?;
        let info = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: reqs.size,
            memory_type_index,
            ..Default::default()
        };
        unsafe { self.device.allocate_memory(&info, None) }.context("allocate_memory")
    }

    unsafe fn record_command(&self, cmd: vk::CommandBuffer, command: &Command) {
        let d = &self.device;
        match command {
            Command::ImageBarrier(b) => {
                let barrier = vk::ImageMemoryBarrier {
                    s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
                    src_access_mask: convert::access(b.src_access),
                    dst_access_mask: convert::access(b.dst_access),
                    old_layout: convert::layout(b.old_layout),
                    new_layout: convert::layout(b.new_layout),
                    src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                    dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                    image: vk::Image::from_raw(b.image.0),
                    subresource_range: subresource_range(b.aspect),
                    ..Default::default()
                };
                unsafe {
                    d.cmd_pipeline_barrier(
                        cmd,
                        convert::stage(b.src_stage),
                        convert::stage(b.dst_stage),
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    )
                };
            }
            Command::CopyBufferToImage { buffer, image, extent } => {
                let region = vk::BufferImageCopy {
                    buffer_offset: 0,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    image_offset: vk::Offset3D::default(),
                    image_extent: vk::Extent3D {
                        width: extent.width,
                        height: extent.height,
                        depth: 1,
                    },
                };
                unsafe {
                    d.cmd_copy_buffer_to_image(
                        cmd,
                        vk::Buffer::from_raw(buffer.0),
                        vk::Image::from_raw(image.0),
                        convert::layout(ImageLayout::TransferDst),
                        &[region],
                    )
                };
            }
            Command::BeginRenderPass {
                render_pass,
                framebuffer,
                extent,
                clear_values,
            } => {
                let clears: Vec<vk::ClearValue> = clear_values.iter().map(|c| clear_value(*c)).collect();
                let begin = vk::RenderPassBeginInfo {
                    s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                    render_pass: vk::RenderPass::from_raw(render_pass.0),
                    framebuffer: vk::Framebuffer::from_raw(framebuffer.0),
                    render_area: rect(*extent),
                    clear_value_count: clears.len() as u32,
                    p_clear_values: clears.as_ptr(),
                    ..Default::default()
                };
                unsafe { d.cmd_begin_render_pass(cmd, &begin, vk::SubpassContents::INLINE) };
            }
            Command::EndRenderPass => unsafe { d.cmd_end_render_pass(cmd) },
            Command::BindPipeline(p) => unsafe {
                d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, vk::Pipeline::from_raw(p.0))
            },
            Command::SetViewport(extent) => {
                let viewport = vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: extent.width as f32,
                    height: extent.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                };
                unsafe {
                    d.cmd_set_viewport(cmd, 0, &[viewport]);
                    d.cmd_set_scissor(cmd, 0, &[rect(*extent)]);
                }
            }
            Command::BindBindingSet { layout, slot, set } => unsafe {
                d.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    vk::PipelineLayout::from_raw(layout.0),
                    *slot,
                    &[vk::DescriptorSet::from_raw(set.0)],
                    &[],
                )
            },
            Command::PushConstants { layout, bytes } => unsafe {
                d.cmd_push_constants(
                    cmd,
                    vk::PipelineLayout::from_raw(layout.0),
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytes,
                )
            },
            Command::BindVertexBuffer(buffer) => unsafe {
                d.cmd_bind_vertex_buffers(cmd, 0, &[vk::Buffer::from_raw(buffer.0)], &[0])
            },
            Command::Draw { vertex_count } => unsafe { d.cmd_draw(cmd, *vertex_count, 1, 0, 0) },
        }
    }
}

fn subresource_range(aspect: Aspect) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: convert::aspect(aspect),
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn rect(extent: Extent) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: vk::Extent2D {
            width: extent.width,
            height: extent.height,
        },
    }
}

fn clear_value(c: ClearValue) -> vk::ClearValue {
    match c {
        ClearValue::Color(float32) => vk::ClearValue {
            color: vk::ClearColorValue { float32 },
        },
        ClearValue::Depth(depth) => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
        },
    }
}

unsafe fn set_layout(device: &Device, kind: BindingKind) -> Result<vk::DescriptorSetLayout> {
    let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = match kind {
        BindingKind::Uniform => vec![vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stages)],
        BindingKind::Texture => vec![
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT),
            vk::DescriptorSetLayoutBinding::default()
                .binding(1)
                .descriptor_type(vk::DescriptorType::SAMPLER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT),
        ],
    };
    let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    unsafe { device.create_descriptor_set_layout(&info, None) }.context("create_descriptor_set_layout")
}

unsafe fn build(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    size: RenderSize,
    options: &VkOptions,
) -> Result<VkGpu> {
    let entry = instance::load_entry()?;

    let dh = display.display_handle().map_err(raw_err)?.as_raw();
    let wh = window.window_handle().map_err(raw_err)?.as_raw();

    let (instance, validation) = unsafe { instance::create_instance(&entry, dh, options.validation)? };
    let debug = if validation {
        Some(unsafe { instance::create_debug_messenger(&entry, &instance)? })
    } else {
        None
    };

    let surface = unsafe { ash_window::create_surface(&entry, &instance, dh, wh, None) }.context("create_surface")?;
    let surface_loader = surface::Instance::new(&entry, &instance);

    let (phys, queue_family) = unsafe { device::pick_device_and_queue(&instance, &surface_loader, surface)? };
    let device_name = device::device_name(&instance, phys);
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(phys) };
    let (device, queue) = unsafe { device::create_device(&instance, phys, queue_family)? };
    info!("using {device_name}, queue family {queue_family}");

    let swap_d = swapchain::Device::new(&instance, &device);
    let swapchain = unsafe {
        sc::create_swapchain(
            &device,
            &surface_loader,
            swap_d,
            phys,
            surface,
            size.into(),
            options.present_mode,
        )?
    };

    let pool_info = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        queue_family_index: queue_family,
        ..Default::default()
    };
    let command_pool = unsafe { device.create_command_pool(&pool_info, None) }.context("create_command_pool")?;

    let pool_sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: MAX_UNIFORM_SETS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLED_IMAGE,
            descriptor_count: MAX_BINDING_SETS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLER,
            descriptor_count: MAX_BINDING_SETS,
        },
    ];
    let dp_info = vk::DescriptorPoolCreateInfo::default()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(MAX_BINDING_SETS + MAX_UNIFORM_SETS)
        .pool_sizes(&pool_sizes);
    let descriptor_pool = unsafe { device.create_descriptor_pool(&dp_info, None) }.context("create_descriptor_pool")?;

    let uniform_set_layout = unsafe { set_layout(&device, BindingKind::Uniform)? };
    let texture_set_layout = unsafe { set_layout(&device, BindingKind::Texture)? };

    Ok(VkGpu {
        _entry: entry,
        instance,
        debug,
        surface_loader,
        surface,
        memory_properties,
        device,
        queue,
        queue_family,
        device_name,
        swapchain,
        command_pool,
        descriptor_pool,
        uniform_set_layout,
        texture_set_layout,
    })
}

impl Drop for VkGpu {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            d.device_wait_idle().ok();

            d.destroy_descriptor_set_layout(self.texture_set_layout, None);
            d.destroy_descriptor_set_layout(self.uniform_set_layout, None);
            d.destroy_descriptor_pool(self.descriptor_pool, None);
            d.destroy_command_pool(self.command_pool, None);
            self.swapchain.destroy(d);
            d.destroy_device(None);

            self.surface_loader.destroy_surface(self.surface, None);
            if let Some(debug) = &self.debug {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

impl Gpu for VkGpu {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.device_name.clone(),
            queue_family_index: self.queue_family,
        }
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<(ImageHandle, MemoryHandle)> {
        let info = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: convert::format(desc.format),
            extent: vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: convert::image_usage(desc.usage),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        unsafe {
            let image = self.device.create_image(&info, None).context("create_image")?;
            let reqs = self.device.get_image_memory_requirements(image);
            let memory = match self.allocate(reqs, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
                Ok(m) => m,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(e);
                }
            };
            if let Err(e) = self.device.bind_image_memory(image, memory, 0) {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
                return Err(RenderError::gpu("bind_image_memory", e));
            }
            Ok((ImageHandle(image.as_raw()), MemoryHandle(memory.as_raw())))
        }
    }

    fn destroy_image(&self, image: ImageHandle, memory: MemoryHandle) {
        unsafe {
            self.device.destroy_image(vk::Image::from_raw(image.0), None);
            self.device.free_memory(vk::DeviceMemory::from_raw(memory.0), None);
        }
    }

    fn create_image_view(&self, image: ImageHandle, format: Format, aspect: Aspect) -> Result<ViewHandle> {
        let info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: vk::Image::from_raw(image.0),
            view_type: vk::ImageViewType::TYPE_2D,
            format: convert::format(format),
            subresource_range: subresource_range(aspect),
            ..Default::default()
        };
        let view = unsafe { self.device.create_image_view(&info, None) }.context("create_image_view")?;
        Ok(ViewHandle(view.as_raw()))
    }

    fn destroy_image_view(&self, view: ViewHandle) {
        unsafe { self.device.destroy_image_view(vk::ImageView::from_raw(view.0), None) };
    }

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> Result<(BufferHandle, MemoryHandle)> {
        let info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage: convert::buffer_usage(usage),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        unsafe {
            let buffer = self.device.create_buffer(&info, None).context("create_buffer")?;
            let reqs = self.device.get_buffer_memory_requirements(buffer);
            let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
            let memory = match self.allocate(reqs, host) {
                Ok(m) => m,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };
            if let Err(e) = self.device.bind_buffer_memory(buffer, memory, 0) {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
                return Err(RenderError::gpu("bind_buffer_memory", e));
            }
            Ok((BufferHandle(buffer.as_raw()), MemoryHandle(memory.as_raw())))
        }
    }

    fn destroy_buffer(&self, buffer: BufferHandle, memory: MemoryHandle) {
        unsafe {
            self.device.destroy_buffer(vk::Buffer::from_raw(buffer.0), None);
            self.device.free_memory(vk::DeviceMemory::from_raw(memory.0), None);
        }
    }

    fn write_memory(&self, memory: MemoryHandle, offset: u64, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let memory = vk::DeviceMemory::from_raw(memory.0);
        unsafe {
            let ptr = self
                .device
                .map_memory(memory, offset, bytes.len() as u64, vk::MemoryMapFlags::empty())
                .context("map_memory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(memory);
        }
        Ok(())
    }

    fn create_sampler(&self) -> Result<SamplerHandle> {
        let info = vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            max_lod: 1.0,
            ..Default::default()
        };
        let sampler = unsafe { self.device.create_sampler(&info, None) }.context("create_sampler")?;
        Ok(SamplerHandle(sampler.as_raw()))
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        unsafe { self.device.destroy_sampler(vk::Sampler::from_raw(sampler.0), None) };
    }

    fn create_binding_set(&self, binding: &Binding) -> Result<BindingSetHandle> {
        let kind = match binding {
            Binding::Texture { .. } => BindingKind::Texture,
            Binding::Uniform { .. } => BindingKind::Uniform,
        };
        let layouts = [self.set_layout(kind)];
        let alloc = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&layouts);
        let set = unsafe { self.device.allocate_descriptor_sets(&alloc) }
            .context("allocate_descriptor_sets")?
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::gpu("allocate_descriptor_sets", "no set returned"))?;

        match *binding {
            Binding::Texture { view, sampler } => {
                let image = [vk::DescriptorImageInfo::default()
                    .image_view(vk::ImageView::from_raw(view.0))
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
                let samp = [vk::DescriptorImageInfo::default().sampler(vk::Sampler::from_raw(sampler.0))];
                let writes = [
                    vk::WriteDescriptorSet::default()
                        .dst_set(set)
                        .dst_binding(0)
                        .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                        .image_info(&image),
                    vk::WriteDescriptorSet::default()
                        .dst_set(set)
                        .dst_binding(1)
                        .descriptor_type(vk::DescriptorType::SAMPLER)
                        .image_info(&samp),
                ];
                unsafe { self.device.update_descriptor_sets(&writes, &[]) };
            }
            Binding::Uniform { buffer, size } => {
                let info = [vk::DescriptorBufferInfo::default()
                    .buffer(vk::Buffer::from_raw(buffer.0))
                    .offset(0)
                    .range(size)];
                let writes = [vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&info)];
                unsafe { self.device.update_descriptor_sets(&writes, &[]) };
            }
        }
        Ok(BindingSetHandle(set.as_raw()))
    }

    fn destroy_binding_set(&self, set: BindingSetHandle) {
        let sets = [vk::DescriptorSet::from_raw(set.0)];
        if let Err(e) = unsafe { self.device.free_descriptor_sets(self.descriptor_pool, &sets) } {
            tracing::warn!("free_descriptor_sets failed: {e}");
        }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        let pass = unsafe { pipeline::create_render_pass(&self.device, desc)? };
        Ok(RenderPassHandle(pass.as_raw()))
    }

    fn destroy_render_pass(&self, pass: RenderPassHandle) {
        unsafe { self.device.destroy_render_pass(vk::RenderPass::from_raw(pass.0), None) };
    }

    fn create_framebuffer(
        &self,
        pass: RenderPassHandle,
        attachments: &[ViewHandle],
        extent: Extent,
    ) -> Result<FramebufferHandle> {
        let views: Vec<vk::ImageView> = attachments.iter().map(|v| vk::ImageView::from_raw(v.0)).collect();
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(vk::RenderPass::from_raw(pass.0))
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let fb = unsafe { self.device.create_framebuffer(&info, None) }.context("create_framebuffer")?;
        Ok(FramebufferHandle(fb.as_raw()))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        unsafe { self.device.destroy_framebuffer(vk::Framebuffer::from_raw(framebuffer.0), None) };
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<(PipelineLayoutHandle, PipelineHandle)> {
        let set_layouts: Vec<vk::DescriptorSetLayout> = desc.bindings.iter().map(|k| self.set_layout(*k)).collect();
        let ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: desc.push_constant_size,
        }];
        let mut info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        if desc.push_constant_size > 0 {
            info = info.push_constant_ranges(&ranges);
        }
        unsafe {
            let layout = self
                .device
                .create_pipeline_layout(&info, None)
                .context("create_pipeline_layout")?;
            match pipeline::create_graphics_pipeline(
                &self.device,
                desc.program,
                vk::RenderPass::from_raw(desc.render_pass.0),
                layout,
            ) {
                Ok(p) => Ok((PipelineLayoutHandle(layout.as_raw()), PipelineHandle(p.as_raw()))),
                Err(e) => {
                    self.device.destroy_pipeline_layout(layout, None);
                    Err(e)
                }
            }
        }
    }

    fn destroy_pipeline(&self, layout: PipelineLayoutHandle, pipeline: PipelineHandle) {
        unsafe {
            self.device.destroy_pipeline(vk::Pipeline::from_raw(pipeline.0), None);
            self.device
                .destroy_pipeline_layout(vk::PipelineLayout::from_raw(layout.0), None);
        }
    }

    fn allocate_command_buffer(&self) -> Result<CommandBufferHandle> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = unsafe { self.device.allocate_command_buffers(&info) }
            .context("allocate_command_buffers")?
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::gpu("allocate_command_buffers", "no buffer returned"))?;
        Ok(CommandBufferHandle(cmd.as_raw()))
    }

    fn free_command_buffer(&self, cmd: CommandBufferHandle) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[vk::CommandBuffer::from_raw(cmd.0)])
        };
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        let cmd = vk::CommandBuffer::from_raw(cmd.0);
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("reset_command_buffer")?;
            self.device
                .begin_command_buffer(cmd, &begin)
                .context("begin_command_buffer")
        }
    }

    fn record(&self, cmd: CommandBufferHandle, command: &Command) {
        unsafe { self.record_command(vk::CommandBuffer::from_raw(cmd.0), command) };
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        unsafe { self.device.end_command_buffer(vk::CommandBuffer::from_raw(cmd.0)) }.context("end_command_buffer")
    }

    fn submit(&self, submission: &Submission) -> Result<()> {
        let cmds = [vk::CommandBuffer::from_raw(submission.command_buffer.0)];
        let wait_sems: Vec<vk::Semaphore> = submission
            .wait
            .iter()
            .map(|w| vk::Semaphore::from_raw(w.semaphore.0))
            .collect();
        let wait_stages: Vec<vk::PipelineStageFlags> =
            submission.wait.iter().map(|w| convert::stage(w.stage)).collect();
        let signal_sems: Vec<vk::Semaphore> = submission
            .signal
            .iter()
            .map(|s| vk::Semaphore::from_raw(s.0))
            .collect();
        let info = vk::SubmitInfo::default()
            .command_buffers(&cmds)
            .wait_semaphores(&wait_sems)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_sems);
        let fence = submission
            .fence
            .map_or(vk::Fence::null(), |f| vk::Fence::from_raw(f.0));
        unsafe { self.device.queue_submit(self.queue, &[info], fence) }.context("queue_submit")?;
        self.check_validation()
    }

    fn wait_queue_idle(&self) -> Result<()> {
        unsafe { self.device.queue_wait_idle(self.queue) }.context("queue_wait_idle")
    }

    fn wait_device_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("device_wait_idle")?;
        self.check_validation()
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        let info = vk::SemaphoreCreateInfo::default();
        let sem = unsafe { self.device.create_semaphore(&info, None) }.context("create_semaphore")?;
        Ok(SemaphoreHandle(sem.as_raw()))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe { self.device.destroy_semaphore(vk::Semaphore::from_raw(semaphore.0), None) };
    }

    fn create_fence(&self) -> Result<FenceHandle> {
        let info = vk::FenceCreateInfo::default();
        let fence = unsafe { self.device.create_fence(&info, None) }.context("create_fence")?;
        Ok(FenceHandle(fence.as_raw()))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe { self.device.destroy_fence(vk::Fence::from_raw(fence.0), None) };
    }

    fn wait_fence(&self, fence: FenceHandle) -> Result<()> {
        unsafe {
            self.device
                .wait_for_fences(&[vk::Fence::from_raw(fence.0)], true, u64::MAX)
        }
        .context("wait_for_fences")
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        unsafe { self.device.reset_fences(&[vk::Fence::from_raw(fence.0)]) }.context("reset_fences")
    }

    fn surface(&self) -> SurfaceInfo {
        SurfaceInfo {
            format: self.swapchain.format,
            extent: Extent::new(self.swapchain.extent.width, self.swapchain.extent.height),
            image_count: self.swapchain.views.len() as u32,
        }
    }

    fn surface_views(&self) -> Vec<ViewHandle> {
        self.swapchain.views.iter().map(|v| ViewHandle(v.as_raw())).collect()
    }

    fn acquire_next_image(&self, signal: SemaphoreHandle) -> Result<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain.loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                vk::Semaphore::from_raw(signal.0),
                vk::Fence::null(),
            )
        }
        .context("acquire_next_image")?;
        sc::presentation_status("acquire_next_image", suboptimal)?;
        Ok(index)
    }

    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<()> {
        let waits = [vk::Semaphore::from_raw(wait.0)];
        let swapchains = [self.swapchain.handle];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        let suboptimal =
            unsafe { self.swapchain.loader.queue_present(self.queue, &info) }.context("queue_present")?;
        sc::presentation_status("queue_present", suboptimal)?;
        self.check_validation()
    }
}
