// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use umbra_render::gpu::{Access, Aspect, BufferUsage, Format, ImageUsage, PipelineStage};
use umbra_render::{ImageLayout, RenderError, Result};

/// Tags a raw Vulkan result with the call that produced it.
pub(crate) trait VkContext<T> {
    fn context(self, op: &'static str) -> Result<T>;
}

impl<T> VkContext<T> for VkResult<T> {
    fn context(self, op: &'static str) -> Result<T> {
        self.map_err(|e| RenderError::gpu(op, e))
    }
}

pub(crate) fn format(f: Format) -> vk::Format {
    match f {
        Format::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::Rgba8Snorm => vk::Format::R8G8B8A8_SNORM,
        Format::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        Format::R16Float => vk::Format::R16_SFLOAT,
        Format::D32Float => vk::Format::D32_SFLOAT,
    }
}

pub(crate) fn format_from_vk(f: vk::Format) -> Option<Format> {
    match f {
        vk::Format::R8G8B8A8_UNORM => Some(Format::Rgba8Unorm),
        vk::Format::R8G8B8A8_SNORM => Some(Format::Rgba8Snorm),
        vk::Format::B8G8R8A8_UNORM => Some(Format::Bgra8Unorm),
        vk::Format::B8G8R8A8_SRGB => Some(Format::Bgra8Srgb),
        vk::Format::R16_SFLOAT => Some(Format::R16Float),
        vk::Format::D32_SFLOAT => Some(Format::D32Float),
        _ => None,
    }
}

pub(crate) fn aspect(a: Aspect) -> vk::ImageAspectFlags {
    match a {
        Aspect::Color => vk::ImageAspectFlags::COLOR,
        Aspect::Depth => vk::ImageAspectFlags::DEPTH,
    }
}

pub(crate) fn layout(l: ImageLayout) -> vk::ImageLayout {
    match l {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub(crate) fn stage(s: PipelineStage) -> vk::PipelineStageFlags {
    match s {
        PipelineStage::TopOfPipe => vk::PipelineStageFlags::TOP_OF_PIPE,
        PipelineStage::Transfer => vk::PipelineStageFlags::TRANSFER,
        PipelineStage::FragmentShader => vk::PipelineStageFlags::FRAGMENT_SHADER,
        PipelineStage::ColorAttachmentOutput => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
    }
}

pub(crate) fn access(a: Access) -> vk::AccessFlags {
    let mut flags = vk::AccessFlags::empty();
    if a.contains(Access::TRANSFER_WRITE) {
        flags |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if a.contains(Access::SHADER_READ) {
        flags |= vk::AccessFlags::SHADER_READ;
    }
    if a.contains(Access::COLOR_ATTACHMENT_WRITE) {
        flags |= vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    flags
}

pub(crate) fn image_usage(u: ImageUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if u.contains(ImageUsage::COLOR_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if u.contains(ImageUsage::DEPTH_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if u.contains(ImageUsage::SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if u.contains(ImageUsage::TRANSFER_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    flags
}

pub(crate) fn buffer_usage(u: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if u.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if u.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if u.contains(BufferUsage::TRANSFER_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_format_round_trips() {
        for f in [
            Format::Rgba8Unorm,
            Format::Rgba8Snorm,
            Format::Bgra8Unorm,
            Format::Bgra8Srgb,
            Format::R16Float,
            Format::D32Float,
        ] {
            assert_eq!(format_from_vk(format(f)), Some(f));
        }
        assert_eq!(format_from_vk(vk::Format::R16G16B16A16_SFLOAT), None);
    }

    #[test]
    fn upload_barrier_masks_map_to_vulkan_bits() {
        assert_eq!(access(Access::empty()), vk::AccessFlags::empty());
        assert_eq!(
            access(Access::TRANSFER_WRITE | Access::SHADER_READ),
            vk::AccessFlags::TRANSFER_WRITE | vk::AccessFlags::SHADER_READ
        );
        assert_eq!(
            image_usage(ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST),
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST
        );
    }
}
