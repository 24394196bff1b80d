// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: implements [`umbra_render::Gpu`] with ash and compiles the
//! renderer's WGSL programs to SPIR-V through naga.
#![deny(unsafe_op_in_unsafe_fn)]

mod convert;
mod device;
mod gpu;
mod instance;
mod pipeline;
mod swapchain;

use std::rc::Rc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use umbra_render::{DeviceContext, RenderSize, Result};

pub use gpu::VkGpu;
pub use swapchain::PresentMode;

#[derive(Clone, Copy, Debug)]
pub struct VkOptions {
    pub present_mode: PresentMode,
    /// Enables the Khronos validation layer when it is installed.
    pub validation: bool,
}

impl Default for VkOptions {
    fn default() -> Self {
        Self {
            present_mode: PresentMode::Fifo,
            validation: cfg!(debug_assertions),
        }
    }
}

/// Brings up instance, device, queue and swapchain for `window` and wraps
/// them in a [`DeviceContext`].
pub fn initialize(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    size: RenderSize,
    options: &VkOptions,
) -> Result<DeviceContext> {
    let gpu = VkGpu::new(window, display, size, options)?;
    Ok(DeviceContext::new(Rc::new(gpu)))
}
