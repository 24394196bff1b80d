// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;

use ash::{khr::surface, khr::swapchain, vk, Device, Instance};
use umbra_render::context::{select_device, QueueFamilyCaps};
use umbra_render::{RenderError, Result};

use crate::convert::VkContext;

/// First device, in enumeration order, with a queue family that can both
/// draw and present to `surface`.
pub(crate) unsafe fn pick_device_and_queue(
    instance: &Instance,
    surf_i: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    let devices = unsafe { instance.enumerate_physical_devices() }.context("enumerate_physical_devices")?;
    let candidates: Vec<(vk::PhysicalDevice, Vec<QueueFamilyCaps>)> = devices
        .into_iter()
        .map(|phys| {
            let qprops = unsafe { instance.get_physical_device_queue_family_properties(phys) };
            let families = qprops
                .iter()
                .enumerate()
                .map(|(i, q)| QueueFamilyCaps {
                    graphics: q.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                    present: unsafe { surf_i.get_physical_device_surface_support(phys, i as u32, surface) }
                        .unwrap_or(false),
                })
                .collect();
            (phys, families)
        })
        .collect();
    select_device(&candidates)
}

pub(crate) fn device_name(instance: &Instance, phys: vk::PhysicalDevice) -> String {
    let props = unsafe { instance.get_physical_device_properties(phys) };
    unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Logical device with one queue from `queue_family` and the swapchain extension.
pub(crate) unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<(Device, vk::Queue)> {
    let exts = unsafe { instance.enumerate_device_extension_properties(phys) }
        .context("enumerate_device_extension_properties")?;
    let has_swapchain = exts
        .iter()
        .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == swapchain::NAME);
    if !has_swapchain {
        return Err(RenderError::MissingCapability {
            kind: "device extension",
            name: swapchain::NAME.to_string_lossy().into_owned(),
        });
    }

    let priorities = [1.0f32];
    let queue_info = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };
    let ext_names = [swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();
    let create_info = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: 1,
        p_queue_create_infos: &queue_info,
        enabled_extension_count: ext_names.len() as u32,
        pp_enabled_extension_names: ext_names.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    let device = unsafe { instance.create_device(phys, &create_info, None) }.context("create_device")?;
    let queue = unsafe { device.get_device_queue(queue_family, 0) };
    Ok((device, queue))
}

pub(crate) fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..props.memory_type_count)
        .find(|&i| {
            (type_bits & (1 << i)) != 0 && props.memory_types[i as usize].property_flags.contains(req)
        })
        .ok_or_else(|| RenderError::MissingCapability {
            kind: "memory type",
            name: format!("{req:?}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, f) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = *f;
        }
        props
    }

    #[test]
    fn memory_type_respects_type_bits_and_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);
        assert_eq!(find_memory_type(&p, 0b111, host).unwrap(), 1);
        assert_eq!(find_memory_type(&p, 0b100, host).unwrap(), 2);
        assert!(matches!(
            find_memory_type(&p, 0b001, host),
            Err(RenderError::MissingCapability { kind: "memory type", .. })
        ));
    }
}
