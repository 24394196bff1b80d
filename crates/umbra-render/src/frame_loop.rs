// SPDX-License-Identifier: CEPL-1.0
use crate::command::Recorder;
use crate::context::DeviceContext;
use crate::error::{RenderError, Result};
use crate::frame::FrameManager;
use crate::gpu::PipelineStage;
use crate::main_pass::MainPassRenderer;
use crate::resource::ResourceFactory;
use crate::scene::Scene;
use crate::shadow::ShadowPassOrchestrator;
use crate::sync::Semaphore;

/// Extra drawing recorded inside the main pass after the scene, such as a UI layer.
pub trait Overlay {
    fn record(&mut self, rec: &mut Recorder<'_>) -> Result<()>;
}

/// Overlay that draws nothing.
pub struct NoOverlay;

impl Overlay for NoOverlay {
    fn record(&mut self, _rec: &mut Recorder<'_>) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RendererSettings {
    pub clear_color: [f32; 4],
    pub shadow_map_resolution: u32,
    pub light_count: usize,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.5, 0.7, 1.0, 1.0],
            shadow_map_resolution: 1024,
            light_count: 1,
        }
    }
}

/// What one [`FrameLoop::tick`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub image_index: u32,
    pub shadow_passes: usize,
    pub draw_calls: usize,
}

/// Owns every per-renderer object and drives acquire, record, submit and
/// present once per tick.
pub struct FrameLoop {
    // STRICT TEARDOWN ORDER: framebuffers before the passes they target,
    // everything before the context
    frames: FrameManager,
    main_pass: MainPassRenderer,
    shadows: ShadowPassOrchestrator,
    image_available: Semaphore,
    render_complete: Semaphore,
    factory: ResourceFactory,
    frames_rendered: u64,
    ctx: DeviceContext,
}

impl FrameLoop {
    pub fn new(ctx: DeviceContext, settings: RendererSettings) -> Result<Self> {
        let factory = ResourceFactory::new(ctx.clone());
        let shadows = ShadowPassOrchestrator::new(&factory, settings.light_count, settings.shadow_map_resolution)?;
        let main_pass = MainPassRenderer::new(&factory, FrameManager::DEPTH_FORMAT, settings.clear_color)?;
        let frames = FrameManager::new(&factory, main_pass.render_pass())?;
        let image_available = Semaphore::new(&ctx)?;
        let render_complete = Semaphore::new(&ctx)?;
        tracing::info!(
            lights = settings.light_count,
            images = frames.image_count(),
            "frame loop ready"
        );
        Ok(Self {
            frames,
            main_pass,
            shadows,
            image_available,
            render_complete,
            factory,
            frames_rendered: 0,
            ctx,
        })
    }

    pub fn factory(&self) -> &ResourceFactory {
        &self.factory
    }

    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn shadows(&self) -> &ShadowPassOrchestrator {
        &self.shadows
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.main_pass.set_clear_color(rgba);
    }

    /// Renders and presents one frame. Blocks until the previous frame's work
    /// has drained before touching any command buffer or uniform.
    pub fn tick(&mut self, scene: &Scene, overlay: &mut dyn Overlay) -> Result<FrameReport> {
        if scene.lights.len() != self.shadows.light_count() {
            return Err(RenderError::LightCount {
                expected: self.shadows.light_count(),
                actual: scene.lights.len(),
            });
        }

        let frame = self.frames.acquire_next_frame(&self.image_available)?;
        self.ctx.wait_queue_idle()?;
        self.main_pass
            .update_uniforms(&scene.camera, &scene.lights, frame.extent.aspect_ratio())?;

        let mut rec = frame.command_buffer.begin_recording()?;
        let shadow_passes = self.shadows.record(&mut rec, &scene.lights, &scene.draw_calls)?;
        self.main_pass.begin(&mut rec, frame.framebuffer);
        self.main_pass
            .record(&mut rec, frame.framebuffer, &scene.draw_calls, self.shadows.maps())?;
        overlay.record(&mut rec)?;
        rec.end_render_pass();
        rec.finish()?;

        frame.command_buffer.submit(
            Some((&self.image_available, PipelineStage::ColorAttachmentOutput)),
            Some(&self.render_complete),
            None,
        )?;
        let image_index = frame.index;
        frame.present(&self.render_complete)?;

        let report = FrameReport {
            frame: self.frames_rendered,
            image_index,
            shadow_passes,
            draw_calls: scene.draw_calls.len(),
        };
        self.frames_rendered += 1;
        tracing::trace!(?report, "frame presented");
        Ok(report)
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.wait_device_idle() {
            tracing::warn!("wait_device_idle during teardown: {e}");
        }
    }
}
