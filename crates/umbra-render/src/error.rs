// SPDX-License-Identifier: CEPL-1.0
use thiserror::Error;

use crate::layout::ImageLayout;

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

/// Every failure the renderer reports. All of them are fatal to the frame loop.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no physical device exposes a queue family with graphics and present support")]
    NoSuitableDevice,

    #[error("missing required {kind}: {name}")]
    MissingCapability { kind: &'static str, name: String },

    #[error("{op} failed: {result}")]
    Gpu { op: &'static str, result: String },

    #[error("illegal image layout transition {from:?} -> {to:?}")]
    IllegalTransition { from: ImageLayout, to: ImageLayout },

    #[error("mesh has {actual} {attribute}, expected {expected}")]
    MeshAttributeCount {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("mesh with {0} positions is not a triangle list")]
    MeshNotTriangles(usize),

    #[error("pixel buffer holds {actual} bytes, a {width}x{height} RGBA8 image needs {expected}")]
    PixelBufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("scene has {actual} lights but the renderer was built for {expected}")]
    LightCount { expected: usize, actual: usize },

    #[error("invalid renderer settings: {0}")]
    Settings(String),

    #[error("shader {program} failed to compile: {reason}")]
    Shader {
        program: &'static str,
        reason: String,
    },

    #[error("validation layer reported {0} warning(s) or error(s)")]
    Validation(u32),
}

impl RenderError {
    pub fn gpu(op: &'static str, result: impl std::fmt::Display) -> Self {
        RenderError::Gpu {
            op,
            result: result.to_string(),
        }
    }
}
