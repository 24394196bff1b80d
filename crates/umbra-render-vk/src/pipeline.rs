// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;

use ash::{vk, Device};
use umbra_render::gpu::{AttachmentDesc, RenderPassDesc, ShaderProgram};
use umbra_render::mesh::Vertex;
use umbra_render::{ImageLayout, RenderError, Result};

use crate::convert::{self, VkContext};

const SHADOW_WGSL: &str = include_str!("../shaders/shadow.wgsl");
const SCENE_WGSL: &str = include_str!("../shaders/scene.wgsl");
const VS_ENTRY: &CStr = c"vs_main";
const FS_ENTRY: &CStr = c"fs_main";

fn source(program: ShaderProgram) -> &'static str {
    match program {
        ShaderProgram::ShadowDepth => SHADOW_WGSL,
        ShaderProgram::SceneLit => SCENE_WGSL,
    }
}

/// WGSL -> validated naga module -> SPIR-V words for one entry point.
pub(crate) fn compile_wgsl(program: ShaderProgram, stage: naga::ShaderStage, entry_point: &str) -> Result<Vec<u32>> {
    let fail = |reason: String| RenderError::Shader {
        program: program.name(),
        reason,
    };

    let module = naga::front::wgsl::parse_str(source(program)).map_err(|e| fail(format!("WGSL parse error: {e}")))?;
    let mut validator =
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
    let info = validator
        .validate(&module)
        .map_err(|e| fail(format!("validation error: {e}")))?;

    if !module
        .entry_points
        .iter()
        .any(|ep| ep.name == entry_point && ep.stage == stage)
    {
        return Err(fail(format!("entry point '{entry_point}' not found for {stage:?}")));
    }

    let options = naga::back::spv::Options {
        lang_version: (1, 0),
        flags: naga::back::spv::WriterFlags::empty(),
        capabilities: None,
        bounds_check_policies: naga::proc::BoundsCheckPolicies::default(),
        binding_map: Default::default(),
        debug_info: None,
        zero_initialize_workgroup_memory: naga::back::spv::ZeroInitializeWorkgroupMemoryMode::None,
    };
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage,
        entry_point: entry_point.to_string(),
    };
    naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
        .map_err(|e| fail(format!("SPIR-V generation error: {e}")))
}

unsafe fn shader_module(
    device: &Device,
    program: ShaderProgram,
    stage: naga::ShaderStage,
    entry: &CStr,
) -> Result<vk::ShaderModule> {
    let spv = compile_wgsl(program, stage, &entry.to_string_lossy())?;
    let info = vk::ShaderModuleCreateInfo::default().code(&spv);
    unsafe { device.create_shader_module(&info, None) }.context("create_shader_module")
}

fn attachment(desc: &AttachmentDesc) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format: convert::format(desc.format),
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: if desc.store {
            vk::AttachmentStoreOp::STORE
        } else {
            vk::AttachmentStoreOp::DONT_CARE
        },
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: convert::layout(desc.final_layout),
        ..Default::default()
    }
}

/// External dependencies for a single-subpass pass: writes wait on prior
/// output, and a color target that ends up sampled is made visible to the
/// fragment stage of later passes.
pub(crate) fn subpass_dependencies(desc: &RenderPassDesc) -> Vec<vk::SubpassDependency> {
    let attachment_stages =
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let attachment_writes =
        vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;

    let mut deps = vec![vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: attachment_stages | vk::PipelineStageFlags::FRAGMENT_SHADER,
        dst_stage_mask: attachment_stages,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: attachment_writes,
        ..Default::default()
    }];
    if desc.color.final_layout == ImageLayout::ShaderReadOnly {
        deps.push(vk::SubpassDependency {
            src_subpass: 0,
            dst_subpass: vk::SUBPASS_EXTERNAL,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::SHADER_READ,
            ..Default::default()
        });
    }
    deps
}

pub(crate) unsafe fn create_render_pass(device: &Device, desc: &RenderPassDesc) -> Result<vk::RenderPass> {
    let attachments = [attachment(&desc.color), attachment(&desc.depth)];
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        p_depth_stencil_attachment: &depth_ref,
        ..Default::default()
    };
    let deps = subpass_dependencies(desc);
    let info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: deps.len() as u32,
        p_dependencies: deps.as_ptr(),
        ..Default::default()
    };
    let pass = unsafe { device.create_render_pass(&info, None) }.context("create_render_pass")?;
    tracing::debug!("render pass '{}' created", desc.label);
    Ok(pass)
}

/// Vertex inputs each program reads from the interleaved [`Vertex`] stream.
pub(crate) fn vertex_attributes(program: ShaderProgram) -> Vec<vk::VertexInputAttributeDescription> {
    let position = vk::VertexInputAttributeDescription {
        location: 0,
        binding: 0,
        format: vk::Format::R32G32B32_SFLOAT,
        offset: Vertex::POSITION_OFFSET,
    };
    match program {
        ShaderProgram::ShadowDepth => vec![position],
        ShaderProgram::SceneLit => vec![
            position,
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: Vertex::NORMAL_OFFSET,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: Vertex::TEX_COORD_OFFSET,
            },
        ],
    }
}

pub(crate) unsafe fn create_graphics_pipeline(
    device: &Device,
    program: ShaderProgram,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
) -> Result<vk::Pipeline> {
    let vs = unsafe { shader_module(device, program, naga::ShaderStage::Vertex, VS_ENTRY)? };
    let fs = match unsafe { shader_module(device, program, naga::ShaderStage::Fragment, FS_ENTRY) } {
        Ok(fs) => fs,
        Err(e) => {
            unsafe { device.destroy_shader_module(vs, None) };
            return Err(e);
        }
    };

    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: VS_ENTRY.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: FS_ENTRY.as_ptr(),
            ..Default::default()
        },
    ];

    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: Vertex::STRIDE,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attributes = vertex_attributes(program);
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &binding,
        vertex_attribute_description_count: attributes.len() as u32,
        p_vertex_attribute_descriptions: attributes.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    let viewport = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let depth = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS,
        ..Default::default()
    };
    let blend_attachment = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        ..Default::default()
    };
    let blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &blend_attachment,
        ..Default::default()
    };
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dynamic_states.len() as u32,
        p_dynamic_states: dynamic_states.as_ptr(),
        ..Default::default()
    };

    let info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth,
        p_color_blend_state: &blend,
        p_dynamic_state: &dynamic,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let result = unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None) };
    unsafe {
        device.destroy_shader_module(vs, None);
        device.destroy_shader_module(fs, None);
    }
    let pipelines = result.map_err(|(_, e)| RenderError::gpu("create_graphics_pipelines", e))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| RenderError::gpu("create_graphics_pipelines", "no pipeline returned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_render::{MainPassRenderer, ShadowPassOrchestrator};

    #[test]
    fn both_programs_compile_for_both_stages() {
        for program in [ShaderProgram::ShadowDepth, ShaderProgram::SceneLit] {
            let vs = compile_wgsl(program, naga::ShaderStage::Vertex, "vs_main").unwrap();
            let fs = compile_wgsl(program, naga::ShaderStage::Fragment, "fs_main").unwrap();
            // SPIR-V magic number
            assert_eq!(vs[0], 0x0723_0203);
            assert_eq!(fs[0], 0x0723_0203);
        }
    }

    #[test]
    fn missing_entry_point_is_a_shader_error() {
        let err = compile_wgsl(ShaderProgram::ShadowDepth, naga::ShaderStage::Vertex, "main").unwrap_err();
        assert!(matches!(err, RenderError::Shader { program: "shadow_depth", .. }));
    }

    #[test]
    fn shadow_targets_are_released_to_the_fragment_stage() {
        let shadow = subpass_dependencies(&ShadowPassOrchestrator::render_pass_desc());
        assert_eq!(shadow.len(), 2);
        assert_eq!(shadow[1].dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let main = subpass_dependencies(&MainPassRenderer::render_pass_desc(
            umbra_render::Format::Bgra8Unorm,
            umbra_render::Format::D32Float,
        ));
        assert_eq!(main.len(), 1);
    }

    #[test]
    fn shadow_program_reads_positions_only() {
        assert_eq!(vertex_attributes(ShaderProgram::ShadowDepth).len(), 1);
        let lit = vertex_attributes(ShaderProgram::SceneLit);
        assert_eq!(lit.iter().map(|a| a.offset).collect::<Vec<_>>(), [0, 12, 24]);
    }
}
