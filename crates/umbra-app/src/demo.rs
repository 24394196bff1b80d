// SPDX-License-Identifier: CEPL-1.0
//! The demo scene: a textured floor, an obelisk and two spheres under orbiting lights.
use std::rc::Rc;

use anyhow::{Context, Result};
use umbra_math::{orbit, Quat, Transform, Vec3};
use umbra_render::{shapes, DrawCall, Light, Material, ResourceFactory, Scene};

use crate::config::AppCfg;

const TEXTURE_SIZE: u32 = 256;
const CHECKER_CELLS: u32 = 8;
/// Radians per second.
const ORBIT_SPEED: f32 = 0.25;

pub fn checker_pixels(size: u32, cells: u32) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            let rgba = if light { [200, 196, 186, 255] } else { [92, 88, 84, 255] };
            pixels.extend_from_slice(&rgba);
        }
    }
    pixels
}

/// Rounded tiles matching the checker cells. Texels use the loader's input
/// encoding: x in red and y in blue around 127, z in green scaled to 0..254.
pub fn bump_normal_pixels(size: u32, cells: u32) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1) as f32;
    // flat in the middle of a tile, tilting outward over the last fifth
    let slope = |t: f32| if t.abs() > 0.8 { t.signum() * (t.abs() - 0.8) * 2.5 } else { 0.0 };
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let u = (x as f32 % cell) / cell * 2.0 - 1.0;
            let v = (y as f32 % cell) / cell * 2.0 - 1.0;
            let n = Vec3::new(slope(u), slope(v), 1.0).normalize();
            pixels.extend_from_slice(&[
                (127.0 + n.x * 127.0).round() as u8,
                (n.z * 254.0).round() as u8,
                (127.0 + n.y * 127.0).round() as u8,
                255,
            ]);
        }
    }
    pixels
}

/// Starting place of one light on its orbit around the scene origin.
#[derive(Clone, Copy, Debug)]
struct Orbit {
    radius: f32,
    height: f32,
    phase: f32,
}

pub struct Demo {
    pub scene: Scene,
    orbits: Vec<Orbit>,
}

impl Demo {
    pub fn build(factory: &ResourceFactory, cfg: &AppCfg) -> Result<Self> {
        let albedo = factory
            .load_texture(&checker_pixels(TEXTURE_SIZE, CHECKER_CELLS), TEXTURE_SIZE, TEXTURE_SIZE, false)
            .context("floor albedo")?;
        let normal_map = factory
            .load_texture(&bump_normal_pixels(TEXTURE_SIZE, CHECKER_CELLS), TEXTURE_SIZE, TEXTURE_SIZE, true)
            .context("floor normal map")?;
        let floor_material = Material {
            albedo: Some(Rc::new(albedo)),
            normal_map: Some(Rc::new(normal_map)),
        };

        let floor = DrawCall::new(factory, &shapes::floor(12.0, 0.2))
            .context("floor")?
            .with_material(floor_material);
        let obelisk = DrawCall::new(factory, &shapes::cuboid(0.8, 3.0, 0.0)).context("obelisk")?;
        let smooth = DrawCall::new(factory, &shapes::sphere(16, true))
            .context("smooth sphere")?
            .with_world(Transform::from_translation(Vec3::new(2.5, 1.0, 1.0)).matrix());
        let faceted = DrawCall::new(factory, &shapes::sphere(6, false))
            .context("faceted sphere")?
            .with_world(
                Transform::from_translation(Vec3::new(-2.0, 0.75, 2.0))
                    .with_rotation(Quat::from_rotation_y(0.4))
                    .with_scale(Vec3::splat(0.75))
                    .matrix(),
            );

        let lights: Vec<Light> = cfg.lights.iter().map(|l| l.to_light()).collect();
        let orbits = lights
            .iter()
            .map(|l| Orbit {
                radius: Vec3::new(l.position.x, 0.0, l.position.z).length(),
                height: l.position.y,
                phase: l.position.z.atan2(l.position.x),
            })
            .collect();

        Ok(Self {
            scene: Scene {
                draw_calls: vec![floor, obelisk, smooth, faceted],
                lights,
                camera: cfg.camera.to_camera(),
            },
            orbits,
        })
    }

    /// Moves every light along its orbit to where it is `seconds` after start.
    pub fn animate(&mut self, seconds: f32) {
        for (light, o) in self.scene.lights.iter_mut().zip(&self.orbits) {
            light.position = orbit(Vec3::ZERO, o.radius, o.height, o.phase + seconds * ORBIT_SPEED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_render::headless::{HeadlessConfig, HeadlessGpu};
    use umbra_render::resource::remap_normal_map;

    #[test]
    fn checker_alternates_between_cells() {
        let px = checker_pixels(4, 2);
        assert_eq!(px.len(), 4 * 4 * 4);
        assert_eq!(px[0..4], [200, 196, 186, 255]);
        assert_eq!(px[8..12], [92, 88, 84, 255]);
    }

    #[test]
    fn tile_centres_remap_to_a_flat_normal() {
        let px = bump_normal_pixels(16, 1);
        let centre = ((8 * 16 + 8) * 4) as usize;
        let remapped = remap_normal_map(&px[centre..centre + 4]);
        assert_eq!(remapped, [0, 0, 127, 255]);
    }

    #[test]
    fn lights_keep_radius_and_height_while_orbiting() {
        let (_gpu, ctx) = HeadlessGpu::context(HeadlessConfig::default()).unwrap();
        let factory = ResourceFactory::new(ctx);
        let cfg = AppCfg::default();
        let mut demo = Demo::build(&factory, &cfg).unwrap();
        assert_eq!(demo.scene.draw_calls.len(), 4);

        let start = demo.scene.lights[0].position;
        demo.animate(3.0);
        let moved = demo.scene.lights[0].position;
        assert!((moved - start).length() > 0.1);
        assert!((moved.y - start.y).abs() < 1e-5);
        let radius = |p: Vec3| Vec3::new(p.x, 0.0, p.z).length();
        assert!((radius(moved) - radius(start)).abs() < 1e-4);

        demo.animate(0.0);
        assert!((demo.scene.lights[0].position - start).length() < 1e-4);
    }
}
