// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::rc::Rc;

use crate::error::{RenderError, Result};
use crate::gpu::{DeviceInfo, Gpu, SurfaceInfo};

/// Capabilities of one queue family as seen by device selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyCaps {
    pub graphics: bool,
    pub present: bool,
}

/// First family (in enumeration order) that supports both graphics and present.
pub fn select_queue_family(families: &[QueueFamilyCaps]) -> Option<u32> {
    families
        .iter()
        .position(|f| f.graphics && f.present)
        .map(|i| i as u32)
}

/// Picks the first device exposing a usable queue family, then its first usable family.
pub fn select_device<D: Copy>(devices: &[(D, Vec<QueueFamilyCaps>)]) -> Result<(D, u32)> {
    devices
        .iter()
        .find_map(|(device, families)| select_queue_family(families).map(|family| (*device, family)))
        .ok_or(RenderError::NoSuitableDevice)
}

/// Shared handle to the device. Every resource keeps a clone, so the device
/// outlives everything created from it.
#[derive(Clone)]
pub struct DeviceContext {
    gpu: Rc<dyn Gpu>,
}

impl DeviceContext {
    pub fn new(gpu: Rc<dyn Gpu>) -> Self {
        let ctx = Self { gpu };
        let info = ctx.info();
        tracing::info!(
            device = %info.name,
            queue_family = info.queue_family_index,
            "device context ready"
        );
        ctx
    }

    pub fn gpu(&self) -> &dyn Gpu {
        self.gpu.as_ref()
    }

    pub fn info(&self) -> DeviceInfo {
        self.gpu.info()
    }

    pub fn surface(&self) -> SurfaceInfo {
        self.gpu.surface()
    }

    /// Blocks until the queue has drained; any submitted command buffer may be reused afterwards.
    pub fn wait_queue_idle(&self) -> Result<()> {
        self.gpu.wait_queue_idle()
    }

    pub fn wait_device_idle(&self) -> Result<()> {
        self.gpu.wait_device_idle()
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("device", &self.info().name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: QueueFamilyCaps = QueueFamilyCaps {
        graphics: false,
        present: false,
    };
    const GFX: QueueFamilyCaps = QueueFamilyCaps {
        graphics: true,
        present: false,
    };
    const BOTH: QueueFamilyCaps = QueueFamilyCaps {
        graphics: true,
        present: true,
    };

    #[test]
    fn picks_first_family_with_graphics_and_present() {
        assert_eq!(select_queue_family(&[GFX, NONE, BOTH, BOTH]), Some(2));
        assert_eq!(select_queue_family(&[GFX, NONE]), None);
    }

    #[test]
    fn skips_devices_without_a_usable_family() {
        let devices = vec![("integrated", vec![GFX]), ("discrete", vec![NONE, BOTH])];
        assert_eq!(select_device(&devices).unwrap(), ("discrete", 1));
    }

    #[test]
    fn no_usable_device_is_an_error() {
        let devices = vec![("a", vec![GFX]), ("b", vec![])];
        assert!(matches!(select_device(&devices), Err(RenderError::NoSuitableDevice)));
    }
}
