// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use glam::{Mat4, Vec3};
use umbra_render::gpu::{ClearValue, Command, Gpu};
use umbra_render::headless::{Event, HeadlessConfig, HeadlessGpu};
use umbra_render::main_pass::FIRST_SHADOW_SLOT;
use umbra_render::pipeline::RenderPass;
use umbra_render::shadow::SHADOW_CLEAR_DEPTH;
use umbra_render::{
    shapes, Camera, DrawCall, FrameLoop, FrameManager, Light, MainPassRenderer, NoOverlay, Overlay,
    Recorder, RenderError, RendererSettings, ResourceFactory, Scene, Semaphore,
};

fn settings(light_count: usize) -> RendererSettings {
    RendererSettings {
        clear_color: [0.5, 0.7, 1.0, 1.0],
        shadow_map_resolution: 64,
        light_count,
    }
}

fn lights(count: usize) -> Vec<Light> {
    (0..count)
        .map(|i| Light::new(Vec3::new(i as f32 * 2.0 - 2.0, 6.0, 3.0), Vec3::ZERO))
        .collect()
}

fn square_scene(frame_loop: &FrameLoop, light_count: usize) -> Scene {
    let square = DrawCall::new(frame_loop.factory(), &shapes::square(4.0)).unwrap();
    Scene {
        draw_calls: vec![square],
        lights: lights(light_count),
        camera: Camera::default(),
    }
}

fn setup(light_count: usize) -> (Rc<HeadlessGpu>, FrameLoop) {
    let (gpu, ctx) = HeadlessGpu::context(HeadlessConfig::default()).unwrap();
    let frame_loop = FrameLoop::new(ctx, settings(light_count)).unwrap();
    gpu.clear_events();
    (gpu, frame_loop)
}

fn render_passes(commands: &[Command]) -> Vec<(usize, &Command)> {
    commands
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, Command::BeginRenderPass { .. }))
        .collect()
}

#[test]
fn single_square_one_light_renders_and_tears_down_cleanly() {
    let (gpu, mut frame_loop) = setup(1);
    let scene = square_scene(&frame_loop, 1);

    let report = frame_loop.tick(&scene, &mut NoOverlay).unwrap();
    assert_eq!(report.shadow_passes, 1);
    assert_eq!(report.draw_calls, 1);
    assert_eq!(report.image_index, 0);

    let submissions = gpu.submissions();
    assert_eq!(submissions.len(), 1);
    let commands = &submissions[0];
    let passes = render_passes(commands);
    assert_eq!(passes.len(), 2);
    let draws: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            Command::Draw { vertex_count } => Some(*vertex_count),
            _ => None,
        })
        .collect();
    assert_eq!(draws, vec![6, 6]);
    assert_eq!(gpu.presented(), vec![0]);

    drop(frame_loop);
    drop(scene);
    assert_eq!(gpu.live_resources(), 0);
    assert!(gpu.misuse().is_empty(), "{:?}", gpu.misuse());
}

#[test]
fn frame_steps_run_in_order() {
    let (gpu, mut frame_loop) = setup(1);
    let scene = square_scene(&frame_loop, 1);
    gpu.clear_events();
    frame_loop.tick(&scene, &mut NoOverlay).unwrap();

    let kinds: Vec<&str> = gpu
        .events()
        .iter()
        .map(|e| match e {
            Event::Acquired { .. } => "acquire",
            Event::QueueIdle => "queue_idle",
            Event::Submitted { .. } => "submit",
            Event::Presented { .. } => "present",
            Event::DeviceIdle => "device_idle",
        })
        .collect();
    assert_eq!(kinds, vec!["acquire", "queue_idle", "submit", "present"]);
}

#[test]
fn every_shadow_pass_finishes_before_the_main_pass() {
    let (gpu, mut frame_loop) = setup(3);
    let scene = square_scene(&frame_loop, 3);
    frame_loop.tick(&scene, &mut NoOverlay).unwrap();

    let commands = &gpu.submissions()[0];
    let shadow_pass = frame_loop.shadows().render_pass().handle();
    let passes = render_passes(commands);
    assert_eq!(passes.len(), 4);

    let (main_at, main) = passes[3];
    match main {
        Command::BeginRenderPass {
            render_pass,
            clear_values,
            ..
        } => {
            assert_ne!(*render_pass, shadow_pass);
            assert_eq!(
                clear_values,
                &vec![ClearValue::Color([0.5, 0.7, 1.0, 1.0]), ClearValue::Depth(1.0)]
            );
        }
        _ => unreachable!(),
    }

    let maps = frame_loop.shadows().maps();
    for (i, (_, pass)) in passes[..3].iter().enumerate() {
        match pass {
            Command::BeginRenderPass {
                render_pass,
                framebuffer,
                clear_values,
                ..
            } => {
                assert_eq!(*render_pass, shadow_pass);
                assert_eq!(*framebuffer, maps[i].framebuffer().handle());
                assert_eq!(clear_values[0], ClearValue::Color([SHADOW_CLEAR_DEPTH, 0.0, 0.0, 0.0]));
            }
            _ => unreachable!(),
        }
    }
    let ends_before_main = commands[..main_at]
        .iter()
        .filter(|c| matches!(c, Command::EndRenderPass))
        .count();
    assert_eq!(ends_before_main, 3);
}

#[test]
fn unused_shadow_slots_fall_back_to_the_first_map() {
    let (gpu, mut frame_loop) = setup(2);
    let scene = square_scene(&frame_loop, 2);
    frame_loop.tick(&scene, &mut NoOverlay).unwrap();

    let maps = frame_loop.shadows().maps();
    let binds: Vec<_> = gpu.submissions()[0]
        .iter()
        .filter_map(|c| match c {
            Command::BindBindingSet { slot, set, .. } if *slot >= FIRST_SHADOW_SLOT => Some((*slot, *set)),
            _ => None,
        })
        .collect();
    let first = maps[0].binding_set().handle();
    let second = maps[1].binding_set().handle();
    assert_eq!(
        binds,
        vec![
            (FIRST_SHADOW_SLOT, first),
            (FIRST_SHADOW_SLOT + 1, second),
            (FIRST_SHADOW_SLOT + 2, first),
            (FIRST_SHADOW_SLOT + 3, first),
        ]
    );
}

#[test]
fn command_buffers_are_reused_across_swapchain_wraps() {
    let (gpu, mut frame_loop) = setup(1);
    let mut scene = square_scene(&frame_loop, 1);
    let mut indices = Vec::new();
    for frame in 0..7u32 {
        scene.draw_calls[0].set_world_transform(Mat4::from_rotation_y(frame as f32 * 0.1));
        scene.lights[0].position.x = frame as f32;
        indices.push(frame_loop.tick(&scene, &mut NoOverlay).unwrap().image_index);
    }
    assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(frame_loop.frames_rendered(), 7);
    assert_eq!(gpu.presented().len(), 7);
    assert!(gpu.misuse().is_empty());
}

#[test]
fn empty_scene_still_presents() {
    let (gpu, mut frame_loop) = setup(1);
    let scene = Scene {
        lights: lights(1),
        ..Scene::default()
    };
    let report = frame_loop.tick(&scene, &mut NoOverlay).unwrap();
    assert_eq!(report.draw_calls, 0);
    assert_eq!(render_passes(&gpu.submissions()[0]).len(), 2);
    assert_eq!(gpu.presented(), vec![0]);
}

#[test]
fn light_count_must_match_the_shadow_maps() {
    let (gpu, mut frame_loop) = setup(2);
    let scene = square_scene(&frame_loop, 1);
    assert!(matches!(
        frame_loop.tick(&scene, &mut NoOverlay),
        Err(RenderError::LightCount {
            expected: 2,
            actual: 1
        })
    ));
    assert!(gpu.events().is_empty());
}

#[test]
fn light_count_outside_supported_range_is_rejected() {
    for count in [0, umbra_render::MAX_LIGHTS + 1] {
        let (_gpu, ctx) = HeadlessGpu::context(HeadlessConfig::default()).unwrap();
        assert!(matches!(
            FrameLoop::new(ctx, settings(count)),
            Err(RenderError::Settings(_))
        ));
    }
}

struct Marker {
    calls: u32,
}

impl Overlay for Marker {
    fn record(&mut self, rec: &mut Recorder<'_>) -> umbra_render::Result<()> {
        self.calls += 1;
        rec.draw(3);
        Ok(())
    }
}

#[test]
fn overlay_records_inside_the_main_pass_after_the_scene() {
    let (gpu, mut frame_loop) = setup(1);
    let scene = square_scene(&frame_loop, 1);
    let mut overlay = Marker { calls: 0 };
    frame_loop.tick(&scene, &mut overlay).unwrap();
    assert_eq!(overlay.calls, 1);

    let commands = &gpu.submissions()[0];
    let n = commands.len();
    assert_eq!(commands[n - 2], Command::Draw { vertex_count: 3 });
    assert_eq!(commands[n - 3], Command::Draw { vertex_count: 6 });
    assert_eq!(commands[n - 1], Command::EndRenderPass);
}

#[test]
fn dropping_the_loop_waits_for_the_device() {
    let (gpu, frame_loop) = setup(1);
    drop(frame_loop);
    assert_eq!(gpu.events(), vec![Event::DeviceIdle]);
    assert_eq!(gpu.live_resources(), 0);
}

#[test]
fn acquire_then_present_without_recording_succeeds() {
    let (gpu, ctx) = HeadlessGpu::context(HeadlessConfig::default()).unwrap();
    let factory = ResourceFactory::new(ctx.clone());
    let desc = MainPassRenderer::render_pass_desc(ctx.surface().format, FrameManager::DEPTH_FORMAT);
    let pass = RenderPass::new(&ctx, &desc).unwrap();
    let mut frames = FrameManager::new(&factory, &pass).unwrap();
    let image_available = Semaphore::new(&ctx).unwrap();

    let frame = frames.acquire_next_frame(&image_available).unwrap();
    assert_eq!(frame.index, 0);
    frame.present(&image_available).unwrap();

    assert_eq!(gpu.presented(), vec![0]);
    assert!(gpu.submissions().is_empty());
    assert!(gpu.misuse().is_empty());
}

#[test]
fn rotation_never_hands_out_an_image_still_in_flight() {
    let (gpu, ctx) = HeadlessGpu::context(HeadlessConfig::default()).unwrap();
    let sems: Vec<Semaphore> = (0..4).map(|_| Semaphore::new(&ctx).unwrap()).collect();
    let dev = ctx.gpu();

    assert_eq!(dev.acquire_next_image(sems[0].handle()).unwrap(), 0);
    assert_eq!(dev.acquire_next_image(sems[1].handle()).unwrap(), 1);
    dev.present(1, sems[1].handle()).unwrap();
    assert_eq!(dev.acquire_next_image(sems[2].handle()).unwrap(), 2);

    let err = dev.acquire_next_image(sems[3].handle()).unwrap_err();
    assert!(matches!(err, RenderError::Gpu { op: "acquire_next_image", .. }));
    assert_eq!(gpu.misuse().len(), 1);
    assert!(gpu.misuse()[0].contains("image 0"));
}
