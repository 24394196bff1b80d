// SPDX-License-Identifier: CEPL-1.0
use ash::{khr::surface, khr::swapchain, vk, Device};
use umbra_render::gpu::{Extent, Format};
use umbra_render::{RenderError, Result};

use crate::convert::{self, VkContext};

/// Presentation pacing preference; falls back to FIFO when unsupported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentMode {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

pub(crate) struct Swapchain {
    pub(crate) loader: swapchain::Device,
    pub(crate) handle: vk::SwapchainKHR,
    pub(crate) format: Format,
    pub(crate) extent: vk::Extent2D,
    pub(crate) views: Vec<vk::ImageView>,
}

impl Swapchain {
    pub(crate) unsafe fn destroy(&self, device: &Device) {
        for &view in &self.views {
            unsafe { device.destroy_image_view(view, None) };
        }
        unsafe { self.loader.destroy_swapchain(self.handle, None) };
    }
}

fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR], want: PresentMode) -> vk::PresentModeKHR {
    let wanted = match want {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
    };
    if modes.contains(&wanted) {
        wanted
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Prefers 8-bit BGRA UNORM in the sRGB non-linear color space, then any
/// sRGB-space format the renderer has a name for.
pub(crate) fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<(vk::SurfaceFormatKHR, Format)> {
    let preferred = [
        vk::Format::B8G8R8A8_UNORM,
        vk::Format::B8G8R8A8_SRGB,
        vk::Format::R8G8B8A8_UNORM,
    ];
    preferred
        .iter()
        .find_map(|want| {
            formats
                .iter()
                .copied()
                .find(|f| f.format == *want && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        })
        .or_else(|| {
            formats
                .iter()
                .copied()
                .find(|f| convert::format_from_vk(f.format).is_some())
        })
        .and_then(|f| convert::format_from_vk(f.format).map(|ours| (f, ours)))
        .ok_or_else(|| RenderError::MissingCapability {
            kind: "surface format",
            name: "B8G8R8A8_UNORM / SRGB_NONLINEAR".into(),
        })
}

pub(crate) fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: Extent) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

pub(crate) fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

/// A suboptimal swapchain is fatal; the surface has no recreation path.
pub(crate) fn presentation_status(op: &'static str, suboptimal: bool) -> Result<()> {
    if suboptimal {
        Err(RenderError::gpu(op, format!("{:?}", vk::Result::SUBOPTIMAL_KHR)))
    } else {
        Ok(())
    }
}

pub(crate) unsafe fn create_swapchain(
    device: &Device,
    surf_i: &surface::Instance,
    swap_d: swapchain::Device,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    hint: Extent,
    want_mode: PresentMode,
) -> Result<Swapchain> {
    let caps = unsafe { surf_i.get_physical_device_surface_capabilities(phys, surface) }
        .context("get_physical_device_surface_capabilities")?;
    let formats = unsafe { surf_i.get_physical_device_surface_formats(phys, surface) }
        .context("get_physical_device_surface_formats")?;
    let modes = unsafe { surf_i.get_physical_device_surface_present_modes(phys, surface) }
        .context("get_physical_device_surface_present_modes")?;

    let (surf_format, format) = pick_surface_format(&formats)?;
    let present_mode = choose_present_mode(&modes, want_mode);
    let extent = extent_from_caps(&caps, hint);
    let min_count = image_count(&caps);

    let pre_transform = if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    };

    let swap_info = vk::SwapchainCreateInfoKHR {
        s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
        surface,
        min_image_count: min_count,
        image_format: surf_format.format,
        image_color_space: surf_format.color_space,
        image_extent: extent,
        image_array_layers: 1,
        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        image_sharing_mode: vk::SharingMode::EXCLUSIVE,
        pre_transform,
        composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        present_mode,
        clipped: vk::TRUE,
        ..Default::default()
    };

    let handle = unsafe { swap_d.create_swapchain(&swap_info, None) }.context("create_swapchain")?;
    let images = unsafe { swap_d.get_swapchain_images(handle) }.context("get_swapchain_images")?;

    let mut views = Vec::with_capacity(images.len());
    for &img in &images {
        let iv_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: img,
            view_type: vk::ImageViewType::TYPE_2D,
            format: surf_format.format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        views.push(unsafe { device.create_image_view(&iv_info, None) }.context("create_image_view")?);
    }

    tracing::info!(
        "swapchain ready: {:?} / {:?}, present_mode: {}, extent: {}x{}, images: {}",
        surf_format.format,
        surf_format.color_space,
        pm_name(present_mode),
        extent.width,
        extent.height,
        views.len()
    );

    Ok(Swapchain {
        loader: swap_d,
        handle,
        format,
        extent,
        views,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn prefers_bgra8_unorm_srgb_nonlinear() {
        let formats = [
            sf(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let (chosen, ours) = pick_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(ours, Format::Bgra8Unorm);
    }

    #[test]
    fn unknown_formats_are_a_missing_capability() {
        let formats = [sf(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT)];
        assert!(pick_surface_format(&formats).is_err());
    }

    #[test]
    fn suboptimal_present_is_fatal() {
        assert!(presentation_status("queue_present", false).is_ok());
        let err = presentation_status("queue_present", true).unwrap_err();
        assert!(matches!(err, RenderError::Gpu { op: "queue_present", .. }));
        assert!(err.to_string().contains("SUBOPTIMAL_KHR"));
    }

    #[test]
    fn unsupported_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes, PresentMode::Mailbox), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&modes, PresentMode::Immediate),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn free_size_surfaces_clamp_the_hint() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        let e = extent_from_caps(&caps, Extent::new(4000, 600));
        assert_eq!((e.width, e.height), (1920, 600));
        assert_eq!(image_count(&caps), 3);
    }
}
