// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use serde::Deserialize;
use tracing::{info, warn};
use umbra_math::Vec3;
use umbra_render::{Camera, Light, RendererSettings, MAX_LIGHTS};
use umbra_render_vk::PresentMode;

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

impl From<PresentModeCfg> for PresentMode {
    fn from(mode: PresentModeCfg) -> Self {
        match mode {
            PresentModeCfg::Fifo => PresentMode::Fifo,
            PresentModeCfg::Mailbox => PresentMode::Mailbox,
            PresentModeCfg::Immediate => PresentMode::Immediate,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub present_mode: PresentModeCfg,
    pub shadow_map_resolution: u32,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            present_mode: PresentModeCfg::Fifo,
            shadow_map_resolution: 1024,
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.5, 0.7, 1.0, 1.0]
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct LightCfg {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for LightCfg {
    fn default() -> Self {
        LightCfg {
            position: [4.0, 6.0, 4.0],
            target: [0.0, 0.0, 0.0],
            fov_degrees: 70.0,
            near: 0.5,
            far: 50.0,
        }
    }
}

impl LightCfg {
    pub fn to_light(self) -> Light {
        Light {
            position: Vec3::from(self.position),
            target: Vec3::from(self.target),
            fov_y: self.fov_degrees.to_radians(),
            near: self.near,
            far: self.far,
        }
    }
}

fn default_lights() -> Vec<LightCfg> {
    vec![
        LightCfg::default(),
        LightCfg {
            position: [-5.0, 7.0, -2.0],
            ..LightCfg::default()
        },
    ]
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CameraCfg {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub fov_degrees: f32,
}

impl Default for CameraCfg {
    fn default() -> Self {
        CameraCfg {
            position: [0.0, 6.0, 10.0],
            target: [0.0, 0.0, 0.0],
            fov_degrees: 60.0,
        }
    }
}

impl CameraCfg {
    pub fn to_camera(self) -> Camera {
        Camera {
            position: Vec3::from(self.position),
            target: Vec3::from(self.target),
            fov_y: self.fov_degrees.to_radians(),
            ..Camera::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "umbra".into(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(default = "default_lights")]
    pub lights: Vec<LightCfg>,
    #[serde(default)]
    pub camera: CameraCfg,
    #[serde(default)]
    pub window: WindowCfg,
}

impl Default for AppCfg {
    fn default() -> Self {
        AppCfg {
            render: RenderCfg::default(),
            lights: default_lights(),
            camera: CameraCfg::default(),
            window: WindowCfg::default(),
        }
    }
}

impl AppCfg {
    pub fn parse(src: &str) -> Result<Self> {
        let cfg: AppCfg = toml::from_str(src)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lights.is_empty() || self.lights.len() > MAX_LIGHTS {
            bail!("[[lights]] must list 1..={MAX_LIGHTS} lights, found {}", self.lights.len());
        }
        if self.render.shadow_map_resolution == 0 {
            bail!("render.shadow_map_resolution must be non-zero");
        }
        if self.window.width == 0 || self.window.height == 0 {
            bail!("window size must be non-zero");
        }
        Ok(())
    }

    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings {
            clear_color: self.render.clear_color,
            shadow_map_resolution: self.render.shadow_map_resolution,
            light_count: self.lights.len(),
        }
    }
}

/// Missing file gives defaults; a file that fails to read, parse or validate
/// is reported and replaced by defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match AppCfg::parse(&s) {
            Ok(cfg) => {
                info!("loaded config from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("ignoring {}: {e:#}", path.display());
                AppCfg::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppCfg::default(),
        Err(e) => {
            warn!("cannot read {}: {e}", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = AppCfg::parse("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.lights.len(), 2);
        assert_eq!(cfg.render.shadow_map_resolution, 1024);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let cfg = AppCfg::parse(
            r#"
            [render]
            present_mode = "mailbox"

            [[lights]]
            position = [1.0, 2.0, 3.0]

            [window]
            title = "demo"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.present_mode, PresentModeCfg::Mailbox);
        assert_eq!(cfg.render.clear_color, default_clear());
        assert_eq!(cfg.lights.len(), 1);
        assert_eq!(cfg.lights[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(cfg.lights[0].far, 50.0);
        assert_eq!(cfg.window.title, "demo");
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.renderer_settings().light_count, 1);
    }

    #[test]
    fn too_many_lights_or_zero_resolution_are_rejected() {
        let five = "[[lights]]\n".repeat(5);
        assert!(AppCfg::parse(&five).is_err());
        assert!(AppCfg::parse("lights = []").is_err());
        assert!(AppCfg::parse("[render]\nshadow_map_resolution = 0").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_cfg(Path::new("definitely/not/here/umbra.toml"));
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn light_angles_are_converted_to_radians() {
        let light = LightCfg {
            fov_degrees: 90.0,
            ..LightCfg::default()
        }
        .to_light();
        assert!((light.fov_y - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }
}
