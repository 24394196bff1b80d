// SPDX-License-Identifier: CEPL-1.0
//! Multi-pass shadow-mapped forward renderer, written against the [`gpu::Gpu`] seam.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod command;
pub mod context;
pub mod error;
pub mod frame;
pub mod frame_loop;
pub mod gpu;
pub mod headless;
pub mod layout;
pub mod main_pass;
pub mod mesh;
pub mod pipeline;
pub mod resource;
pub mod scene;
pub mod shadow;
pub mod shapes;
pub mod sync;

pub use command::{one_shot, CommandBuffer, Recorder};
pub use context::{DeviceContext, QueueFamilyCaps};
pub use error::{RenderError, Result};
pub use frame::{Frame, FrameManager};
pub use frame_loop::{FrameLoop, FrameReport, NoOverlay, Overlay, RendererSettings};
pub use gpu::{Extent, Format, Gpu};
pub use layout::ImageLayout;
pub use main_pass::MainPassRenderer;
pub use mesh::{DrawCall, Material, MeshData, Vertex};
pub use resource::{Buffer, Image, ImageView, ResourceFactory, Texture};
pub use scene::{Camera, Light, Scene, MAX_LIGHTS};
pub use shadow::{ShadowMap, ShadowPassOrchestrator};
pub use sync::{Fence, Semaphore};

#[derive(Clone, Copy, Debug)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl From<RenderSize> for Extent {
    fn from(size: RenderSize) -> Self {
        Extent::new(size.width.max(1), size.height.max(1))
    }
}
