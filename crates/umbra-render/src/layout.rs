// SPDX-License-Identifier: CEPL-1.0
use crate::command::Recorder;
use crate::error::{RenderError, Result};
use crate::gpu::{Access, Aspect, ImageBarrier, PipelineStage};
use crate::resource::Image;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    TransferDst,
    ShaderReadOnly,
    ColorAttachment,
    DepthAttachment,
    PresentSrc,
}

/// Access masks and pipeline stages guarding one legal layout edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: Access,
    pub dst_access: Access,
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
}

/// The only explicit transitions the renderer performs. Attachment layouts
/// are handled by render pass initial/final layouts instead.
const TRANSITIONS: &[(ImageLayout, ImageLayout, TransitionMasks)] = &[
    (
        ImageLayout::Undefined,
        ImageLayout::TransferDst,
        TransitionMasks {
            src_access: Access::empty(),
            dst_access: Access::TRANSFER_WRITE,
            src_stage: PipelineStage::TopOfPipe,
            dst_stage: PipelineStage::Transfer,
        },
    ),
    (
        ImageLayout::TransferDst,
        ImageLayout::ShaderReadOnly,
        TransitionMasks {
            src_access: Access::TRANSFER_WRITE,
            dst_access: Access::SHADER_READ,
            src_stage: PipelineStage::Transfer,
            dst_stage: PipelineStage::FragmentShader,
        },
    ),
];

pub fn transition_masks(from: ImageLayout, to: ImageLayout) -> Result<TransitionMasks> {
    TRANSITIONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .map(|(_, _, masks)| *masks)
        .ok_or(RenderError::IllegalTransition { from, to })
}

/// Records a barrier moving `image` from its tracked layout to `new_layout`.
///
/// Recording is the commit point: the tracked layout is `new_layout` as soon as
/// this returns `Ok`, so later transitions in the same recording chain from it.
/// An image whose recording is never submitted, or whose submit fails, must be
/// discarded rather than transitioned again.
pub fn record_transition(rec: &mut Recorder<'_>, image: &Image, new_layout: ImageLayout) -> Result<()> {
    let old_layout = image.layout();
    let masks = transition_masks(old_layout, new_layout)?;
    rec.image_barrier(ImageBarrier {
        image: image.handle(),
        aspect: if image.format().is_depth() {
            Aspect::Depth
        } else {
            Aspect::Color
        },
        old_layout,
        new_layout,
        src_stage: masks.src_stage,
        dst_stage: masks.dst_stage,
        src_access: masks.src_access,
        dst_access: masks.dst_access,
    });
    image.set_layout(new_layout);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_edges_are_legal() {
        let m = transition_masks(ImageLayout::Undefined, ImageLayout::TransferDst).unwrap();
        assert_eq!(m.src_access, Access::empty());
        assert_eq!(m.dst_access, Access::TRANSFER_WRITE);
        assert_eq!(m.src_stage, PipelineStage::TopOfPipe);
        assert_eq!(m.dst_stage, PipelineStage::Transfer);

        let m = transition_masks(ImageLayout::TransferDst, ImageLayout::ShaderReadOnly).unwrap();
        assert_eq!(m.src_access, Access::TRANSFER_WRITE);
        assert_eq!(m.dst_access, Access::SHADER_READ);
        assert_eq!(m.dst_stage, PipelineStage::FragmentShader);
    }

    #[test]
    fn every_other_pair_is_rejected() {
        use ImageLayout::*;
        let all = [Undefined, TransferDst, ShaderReadOnly, ColorAttachment, DepthAttachment, PresentSrc];
        for from in all {
            for to in all {
                let legal = matches!((from, to), (Undefined, TransferDst) | (TransferDst, ShaderReadOnly));
                match transition_masks(from, to) {
                    Ok(_) => assert!(legal, "{from:?} -> {to:?} should be rejected"),
                    Err(RenderError::IllegalTransition { from: f, to: t }) => {
                        assert!(!legal);
                        assert_eq!((f, t), (from, to));
                    }
                    Err(other) => panic!("unexpected error {other}"),
                }
            }
        }
    }
}
