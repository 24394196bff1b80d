// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use glam::Vec3;
use umbra_render::gpu::{Access, Command, ImageUsage, PipelineStage};
use umbra_render::headless::{HeadlessConfig, HeadlessGpu, ResourceKind};
use umbra_render::layout::record_transition;
use umbra_render::resource::remap_normal_map;
use umbra_render::{
    one_shot, CommandBuffer, DrawCall, Extent, Format, ImageLayout, MeshData, QueueFamilyCaps,
    RenderError, ResourceFactory,
};

fn setup() -> (Rc<HeadlessGpu>, ResourceFactory) {
    let (gpu, ctx) = HeadlessGpu::context(HeadlessConfig::default()).unwrap();
    (gpu, ResourceFactory::new(ctx))
}

fn checker(width: u32, height: u32) -> Vec<u8> {
    (0..width * height)
        .flat_map(|i| {
            let v = if (i % width + i / width) % 2 == 0 { 230 } else { 40 };
            [v, v / 2, 255 - v, 255]
        })
        .collect()
}

#[test]
fn no_queue_family_with_graphics_and_present_fails_init() {
    let config = HeadlessConfig {
        queue_families: vec![
            QueueFamilyCaps {
                graphics: true,
                present: false,
            },
            QueueFamilyCaps {
                graphics: false,
                present: true,
            },
        ],
        ..HeadlessConfig::default()
    };
    assert!(matches!(HeadlessGpu::new(config), Err(RenderError::NoSuitableDevice)));
}

#[test]
fn upload_records_transfer_then_shader_read() {
    let (gpu, factory) = setup();
    let pixels = checker(4, 2);
    let (image, _view) = factory.load_image_from_pixels(&pixels, 4, 2, false).unwrap();
    assert_eq!(image.layout(), ImageLayout::ShaderReadOnly);

    let submissions = gpu.submissions();
    assert_eq!(submissions.len(), 1);
    let commands = &submissions[0];
    assert_eq!(commands.len(), 3);
    match (&commands[0], &commands[1], &commands[2]) {
        (Command::ImageBarrier(first), Command::CopyBufferToImage { image: copied, .. }, Command::ImageBarrier(second)) => {
            assert_eq!((first.old_layout, first.new_layout), (ImageLayout::Undefined, ImageLayout::TransferDst));
            assert_eq!(first.src_stage, PipelineStage::TopOfPipe);
            assert_eq!(first.dst_access, Access::TRANSFER_WRITE);
            assert_eq!(*copied, image.handle());
            assert_eq!((second.old_layout, second.new_layout), (ImageLayout::TransferDst, ImageLayout::ShaderReadOnly));
            assert_eq!(second.dst_stage, PipelineStage::FragmentShader);
            assert_eq!(second.dst_access, Access::SHADER_READ);
        }
        other => panic!("unexpected upload commands {other:?}"),
    }
    // staging buffer and transient command buffer are gone
    assert_eq!(gpu.live_count(ResourceKind::Buffer), 0);
    assert_eq!(gpu.live_count(ResourceKind::CommandBuffer), 0);
    assert_eq!(gpu.live_count(ResourceKind::Fence), 0);
}

#[test]
fn uploading_the_same_pixels_twice_gives_equal_images() {
    let (gpu, factory) = setup();
    let pixels = checker(8, 8);
    let (a, _va) = factory.load_image_from_pixels(&pixels, 8, 8, false).unwrap();
    let (b, _vb) = factory.load_image_from_pixels(&pixels, 8, 8, false).unwrap();
    assert_ne!(a.handle(), b.handle());
    assert_eq!(gpu.image_contents(a.handle()).unwrap(), pixels);
    assert_eq!(gpu.image_contents(b.handle()).unwrap(), pixels);
}

#[test]
fn normal_maps_upload_remapped_texels() {
    let (gpu, factory) = setup();
    let pixels = checker(2, 2);
    let (image, _view) = factory.load_image_from_pixels(&pixels, 2, 2, true).unwrap();
    assert_eq!(image.format(), umbra_render::Format::Rgba8Snorm);
    assert_eq!(gpu.image_contents(image.handle()).unwrap(), remap_normal_map(&pixels));
}

#[test]
fn wrong_pixel_count_is_rejected_before_any_allocation() {
    let (gpu, factory) = setup();
    let err = factory.load_image_from_pixels(&[0; 15], 2, 2, false).unwrap_err();
    assert!(matches!(
        err,
        RenderError::PixelBufferSize {
            expected: 16,
            actual: 15,
            ..
        }
    ));
    assert_eq!(gpu.live_resources(), 0);
}

#[test]
fn transition_out_of_shader_read_is_illegal() {
    let (gpu, factory) = setup();
    let (image, _view) = factory.load_image_from_pixels(&checker(1, 1), 1, 1, false).unwrap();
    let err = one_shot(factory.context(), |rec| {
        record_transition(rec, &image, ImageLayout::TransferDst)
    })
    .unwrap_err();
    assert!(matches!(
        err,
        RenderError::IllegalTransition {
            from: ImageLayout::ShaderReadOnly,
            to: ImageLayout::TransferDst
        }
    ));
    assert_eq!(image.layout(), ImageLayout::ShaderReadOnly);
    assert!(gpu.misuse().is_empty());
}

#[test]
fn tracked_layout_advances_when_the_barrier_is_recorded() {
    let (gpu, factory) = setup();
    let image = factory
        .create_image(Format::Rgba8Unorm, Extent::new(2, 2), ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST)
        .unwrap();
    let mut cmd = CommandBuffer::allocate(factory.context()).unwrap();
    let mut rec = cmd.begin_recording().unwrap();

    record_transition(&mut rec, &image, ImageLayout::TransferDst).unwrap();
    assert_eq!(image.layout(), ImageLayout::TransferDst);
    record_transition(&mut rec, &image, ImageLayout::ShaderReadOnly).unwrap();
    assert_eq!(image.layout(), ImageLayout::ShaderReadOnly);
    rec.finish().unwrap();

    assert!(gpu.submissions().is_empty());
    assert!(gpu.misuse().is_empty());
}

#[test]
fn malformed_mesh_allocates_nothing() {
    let (gpu, factory) = setup();
    let mesh = MeshData::from_positions(vec![Vec3::ZERO, Vec3::X, Vec3::Y]).with_normals(vec![Vec3::Y]);
    assert!(matches!(
        DrawCall::new(&factory, &mesh),
        Err(RenderError::MeshAttributeCount { .. })
    ));
    assert_eq!(gpu.live_resources(), 0);
}

#[test]
fn dropping_resources_releases_every_handle() {
    let (gpu, factory) = setup();
    {
        let texture = factory.load_texture(&checker(4, 4), 4, 4, false).unwrap();
        let draw = DrawCall::new(&factory, &umbra_render::shapes::cuboid(1.0, 2.0, 0.0)).unwrap();
        assert_eq!(draw.vertex_count(), 36);
        assert_eq!(gpu.live_count(ResourceKind::BindingSet), 1);
        assert!(gpu.live_resources() > 0);
        drop((texture, draw));
    }
    assert_eq!(gpu.live_resources(), 0);
    assert!(gpu.misuse().is_empty());
}

#[test]
fn image_view_keeps_its_image_alive() {
    let (gpu, factory) = setup();
    let (image, view) = factory.load_image_from_pixels(&checker(2, 2), 2, 2, false).unwrap();
    drop(image);
    assert_eq!(gpu.live_count(ResourceKind::Image), 1);
    drop(view);
    assert_eq!(gpu.live_count(ResourceKind::Image), 0);
    assert_eq!(gpu.live_count(ResourceKind::ImageView), 0);
}
