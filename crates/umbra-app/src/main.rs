// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use umbra_core::{init_tracing, FrameTimeMonitor};
use umbra_render::{FrameLoop, NoOverlay, RenderSize};
use umbra_render_vk::VkOptions;

use umbra_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;
mod demo;

use config::{load_cfg, AppCfg, PresentModeCfg};
use demo::Demo;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, default_value = "umbra.toml")]
    config: PathBuf,
    /// Exit after this many frames (0 runs until the window closes)
    #[arg(long, default_value_t = 0)]
    frames: u64,
    /// Overrides render.present_mode from the config
    #[arg(long, value_enum)]
    present_mode: Option<PresentModeCfg>,
}

// frame loop first: it waits for the device before the scene's buffers go
struct Renderer {
    frame_loop: FrameLoop,
    demo: Demo,
}

struct App {
    cfg: AppCfg,
    max_frames: u64,
    renderer: Option<Renderer>,
    window: Option<Window>,
    monitor: FrameTimeMonitor,
    started: Instant,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg, max_frames: u64) -> Self {
        Self {
            cfg,
            max_frames,
            renderer: None,
            window: None,
            monitor: FrameTimeMonitor::default(),
            started: Instant::now(),
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let w = &self.cfg.window;
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title(w.title.clone())
                    .with_inner_size(PhysicalSize::new(w.width, w.height))
                    .with_resizable(false),
            )
            .context("create_window")?;

        let size = window.inner_size();
        let render_size = RenderSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };
        let options = VkOptions {
            present_mode: self.cfg.render.present_mode.into(),
            ..VkOptions::default()
        };
        let ctx = umbra_render_vk::initialize(&window, &window, render_size, &options).context("vulkan init")?;
        let frame_loop = FrameLoop::new(ctx, self.cfg.renderer_settings()).context("renderer init")?;
        let demo = Demo::build(frame_loop.factory(), &self.cfg).context("demo scene")?;

        info!(
            "rendering {}x{}, {} light(s)",
            render_size.width,
            render_size.height,
            demo.scene.lights.len()
        );
        window.request_redraw();
        self.renderer = Some(Renderer { frame_loop, demo });
        self.window = Some(window);
        self.started = Instant::now();
        Ok(())
    }

    /// Renders one frame; returns whether the frame budget is used up.
    fn redraw(&mut self) -> Result<bool> {
        let Some(r) = &mut self.renderer else {
            return Ok(false);
        };
        r.demo.animate(self.started.elapsed().as_secs_f32());
        let report = r.frame_loop.tick(&r.demo.scene, &mut NoOverlay)?;
        self.monitor.tick(Instant::now());
        Ok(self.max_frames != 0 && report.frame + 1 >= self.max_frames)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{e:#}");
        self.error = Some(e);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && self.error.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => match self.redraw() {
                Ok(true) => {
                    info!("rendered {} frame(s), exiting", self.max_frames);
                    self.shutdown(event_loop);
                }
                Ok(false) => {}
                Err(e) => self.fail(event_loop, e),
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = load_cfg(&args.config);
    if let Some(mode) = args.present_mode {
        cfg.render.present_mode = mode;
    }

    let event_loop = EventLoop::new()?;
    let mut app = App::new(cfg, args.frames);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
