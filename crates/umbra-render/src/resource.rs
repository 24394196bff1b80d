// SPDX-License-Identifier: CEPL-1.0
//! Owned GPU resources. Each wrapper releases its handles on drop, and views
//! and binding sets hold onto whatever they reference, so release order
//! always runs from dependents to dependencies.
use std::borrow::Cow;
use std::cell::Cell;
use std::rc::Rc;

use crate::command::one_shot;
use crate::context::DeviceContext;
use crate::error::{RenderError, Result};
use crate::gpu::{
    Aspect, Binding, BindingSetHandle, BufferHandle, BufferUsage, Extent, Format, ImageDesc,
    ImageHandle, ImageUsage, MemoryHandle, SamplerHandle, ViewHandle,
};
use crate::layout::{record_transition, ImageLayout};

#[derive(Debug)]
struct ImageInner {
    ctx: DeviceContext,
    image: ImageHandle,
    memory: MemoryHandle,
    format: Format,
    extent: Extent,
    layout: Cell<ImageLayout>,
}

impl Drop for ImageInner {
    fn drop(&mut self) {
        self.ctx.gpu().destroy_image(self.image, self.memory);
    }
}

/// Device-local image plus its memory. Clones share the same image.
#[derive(Clone, Debug)]
pub struct Image(Rc<ImageInner>);

impl Image {
    pub fn handle(&self) -> ImageHandle {
        self.0.image
    }

    pub fn format(&self) -> Format {
        self.0.format
    }

    pub fn extent(&self) -> Extent {
        self.0.extent
    }

    /// Layout the image will be in once recorded work up to now has executed.
    pub fn layout(&self) -> ImageLayout {
        self.0.layout.get()
    }

    pub(crate) fn set_layout(&self, layout: ImageLayout) {
        self.0.layout.set(layout);
    }
}

#[derive(Debug)]
pub struct ImageView {
    ctx: DeviceContext,
    view: ViewHandle,
    image: Image,
}

impl ImageView {
    pub fn handle(&self) -> ViewHandle {
        self.view
    }

    pub fn image(&self) -> &Image {
        &self.image
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.ctx.gpu().destroy_image_view(self.view);
    }
}

/// Host-visible buffer.
pub struct Buffer {
    ctx: DeviceContext,
    buffer: BufferHandle,
    memory: MemoryHandle,
    size: u64,
}

impl Buffer {
    pub fn handle(&self) -> BufferHandle {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn write(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        if offset + bytes.len() as u64 > self.size {
            return Err(RenderError::gpu(
                "write_memory",
                format!("{} bytes at {offset} overrun a {}-byte buffer", bytes.len(), self.size),
            ));
        }
        self.ctx.gpu().write_memory(self.memory, offset, bytes)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.ctx.gpu().destroy_buffer(self.buffer, self.memory);
    }
}

pub struct Sampler {
    ctx: DeviceContext,
    sampler: SamplerHandle,
}

impl Sampler {
    pub fn handle(&self) -> SamplerHandle {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.ctx.gpu().destroy_sampler(self.sampler);
    }
}

pub struct BindingSet {
    ctx: DeviceContext,
    set: BindingSetHandle,
}

impl BindingSet {
    pub fn handle(&self) -> BindingSetHandle {
        self.set
    }
}

impl Drop for BindingSet {
    fn drop(&mut self) {
        self.ctx.gpu().destroy_binding_set(self.set);
    }
}

/// A sampled image ready to bind: binding set, sampler and view.
pub struct Texture {
    // drop order: set, sampler, view (which releases the image)
    binding_set: BindingSet,
    sampler: Sampler,
    view: ImageView,
}

impl Texture {
    pub fn binding_set(&self) -> &BindingSet {
        &self.binding_set
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn view(&self) -> &ImageView {
        &self.view
    }
}

/// Turns an RGBA8 normal map into the signed layout the scene shader reads:
/// `(r - 127, b - 127, g / 2, a)` with 8-bit wrapping, reinterpreted as SNORM.
pub fn remap_normal_map(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(4)
        .flat_map(|p| [p[0].wrapping_sub(127), p[2].wrapping_sub(127), p[1] / 2, p[3]])
        .collect()
}

/// Creates images, views, buffers, samplers and binding sets, and uploads pixels.
#[derive(Clone, Debug)]
pub struct ResourceFactory {
    ctx: DeviceContext,
}

impl ResourceFactory {
    pub fn new(ctx: DeviceContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn create_image(&self, format: Format, extent: Extent, usage: ImageUsage) -> Result<Image> {
        let (image, memory) = self.ctx.gpu().create_image(&ImageDesc {
            format,
            extent,
            usage,
        })?;
        Ok(Image(Rc::new(ImageInner {
            ctx: self.ctx.clone(),
            image,
            memory,
            format,
            extent,
            layout: Cell::new(ImageLayout::Undefined),
        })))
    }

    pub fn create_image_view(&self, image: &Image, aspect: Aspect) -> Result<ImageView> {
        let view = self
            .ctx
            .gpu()
            .create_image_view(image.handle(), image.format(), aspect)?;
        Ok(ImageView {
            ctx: self.ctx.clone(),
            view,
            image: image.clone(),
        })
    }

    pub fn create_buffer(&self, size: u64, usage: BufferUsage) -> Result<Buffer> {
        let (buffer, memory) = self.ctx.gpu().create_buffer(size, usage)?;
        Ok(Buffer {
            ctx: self.ctx.clone(),
            buffer,
            memory,
            size,
        })
    }

    pub fn create_buffer_with_data(&self, bytes: &[u8], usage: BufferUsage) -> Result<Buffer> {
        let buffer = self.create_buffer(bytes.len() as u64, usage)?;
        buffer.write(0, bytes)?;
        Ok(buffer)
    }

    pub fn create_sampler(&self) -> Result<Sampler> {
        Ok(Sampler {
            ctx: self.ctx.clone(),
            sampler: self.ctx.gpu().create_sampler()?,
        })
    }

    pub fn create_texture_binding(&self, view: &ImageView, sampler: &Sampler) -> Result<BindingSet> {
        self.create_binding_set(&Binding::Texture {
            view: view.handle(),
            sampler: sampler.handle(),
        })
    }

    pub fn create_uniform_binding(&self, buffer: &Buffer) -> Result<BindingSet> {
        self.create_binding_set(&Binding::Uniform {
            buffer: buffer.handle(),
            size: buffer.size(),
        })
    }

    fn create_binding_set(&self, binding: &Binding) -> Result<BindingSet> {
        Ok(BindingSet {
            ctx: self.ctx.clone(),
            set: self.ctx.gpu().create_binding_set(binding)?,
        })
    }

    /// Uploads tightly packed RGBA8 pixels into a new sampled image. Normal maps
    /// are remapped with [`remap_normal_map`] and stored as signed normalized.
    /// Blocks until the copy has finished.
    pub fn load_image_from_pixels(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        is_normal_map: bool,
    ) -> Result<(Image, ImageView)> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected || expected == 0 {
            return Err(RenderError::PixelBufferSize {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }

        let (data, format) = if is_normal_map {
            (Cow::Owned(remap_normal_map(pixels)), Format::Rgba8Snorm)
        } else {
            (Cow::Borrowed(pixels), Format::Rgba8Unorm)
        };

        let extent = Extent::new(width, height);
        let image = self.create_image(format, extent, ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST)?;
        let staging = self.create_buffer_with_data(&data, BufferUsage::TRANSFER_SRC)?;

        one_shot(&self.ctx, |rec| {
            record_transition(rec, &image, ImageLayout::TransferDst)?;
            rec.copy_buffer_to_image(&staging, &image);
            record_transition(rec, &image, ImageLayout::ShaderReadOnly)
        })?;
        drop(staging);

        let view = self.create_image_view(&image, Aspect::Color)?;
        tracing::debug!(width, height, is_normal_map, "texture uploaded");
        Ok((image, view))
    }

    pub fn load_texture(&self, pixels: &[u8], width: u32, height: u32, is_normal_map: bool) -> Result<Texture> {
        let (_, view) = self.load_image_from_pixels(pixels, width, height, is_normal_map)?;
        let sampler = self.create_sampler()?;
        let binding_set = self.create_texture_binding(&view, &sampler)?;
        Ok(Texture {
            binding_set,
            sampler,
            view,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_map_remap_wraps_and_swizzles() {
        let remapped = remap_normal_map(&[128, 64, 255, 9, 0, 255, 127, 200]);
        assert_eq!(remapped, vec![1, 128, 32, 9, 129, 0, 127, 200]);
    }

    #[test]
    fn flat_normal_points_along_stored_z() {
        // a tangent-space "up" texel (127, 254, 127) becomes (0, 0, 127): +1.0 in SNORM
        assert_eq!(remap_normal_map(&[127, 254, 127, 255]), vec![0, 0, 127, 255]);
    }
}
