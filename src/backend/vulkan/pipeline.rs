use ash::vk;

use super::{conversions, map_device_error, VkShader, VulkanDevice, VulkanState};
use crate::backend::traits::*;
use crate::backend::types::*;

fn shader<'a>(state: &'a VulkanState, handle: ShaderHandle) -> RhiResult<&'a VkShader> {
    state
        .shaders
        .get(&handle)
        .ok_or_else(|| RhiError::InvalidHandle(format!("shader {}", handle.id())))
}

fn stage_info(shader: &VkShader) -> vk::PipelineShaderStageCreateInfo<'_> {
    vk::PipelineShaderStageCreateInfo::default()
        .stage(shader.stage)
        .module(shader.module)
        .name(shader.entry_point.as_c_str())
}

fn stencil_state(state: &DepthStencilState) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: conversions::stencil_op(state.stencil_fail_op),
        pass_op: conversions::stencil_op(state.stencil_pass_op),
        depth_fail_op: conversions::stencil_op(state.stencil_depth_fail_op),
        compare_op: conversions::compare_op(state.stencil_function),
        compare_mask: state.stencil_read_mask,
        write_mask: if state.stencil_write { state.stencil_write_mask } else { 0 },
        reference: 0,
    }
}

impl VulkanDevice {
    pub(super) fn create_graphics_pipeline(
        &self,
        state: &VulkanState,
        desc: &GraphicsPipelineDescriptor,
        layout: vk::PipelineLayout,
    ) -> RhiResult<vk::Pipeline> {
        let mut stages = vec![stage_info(shader(state, desc.vertex_shader)?)];
        if let Some(pixel) = desc.pixel_shader {
            stages.push(stage_info(shader(state, pixel)?));
        }

        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: desc.vertex_stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: 0,
                format: conversions::vertex_format(attribute.format),
                offset: attribute.offset,
            })
            .collect();
        let mut vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        if desc.vertex_stride > 0 {
            vertex_input = vertex_input
                .vertex_binding_descriptions(&bindings)
                .vertex_attribute_descriptions(&attributes);
        }

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            topology: conversions::topology(desc.topology),
            ..Default::default()
        };
        let viewport = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        let rasterizer = &desc.rasterizer;
        let depth_bias = rasterizer.depth_bias != 0.0 || rasterizer.depth_bias_slope_scaled != 0.0;
        let rasterization = vk::PipelineRasterizationStateCreateInfo {
            depth_clamp_enable: (!rasterizer.depth_clip_enabled && self.depth_clamp).into(),
            polygon_mode: conversions::polygon_mode(rasterizer.polygon_mode),
            cull_mode: conversions::cull_mode(rasterizer.cull_mode),
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias_enable: depth_bias.into(),
            depth_bias_constant_factor: rasterizer.depth_bias,
            depth_bias_clamp: rasterizer.depth_bias_clamp,
            depth_bias_slope_factor: rasterizer.depth_bias_slope_scaled,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };

        let ds = &desc.depth_stencil;
        let stencil = stencil_state(ds);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
            depth_test_enable: ds.depth_test.into(),
            depth_write_enable: ds.depth_write.into(),
            depth_compare_op: conversions::compare_op(ds.depth_function),
            stencil_test_enable: ds.stencil_test.into(),
            front: stencil,
            back: stencil,
            max_depth_bounds: 1.0,
            ..Default::default()
        };

        let blend = &desc.blend;
        let attachment = vk::PipelineColorBlendAttachmentState {
            blend_enable: blend.blend_enabled.into(),
            src_color_blend_factor: conversions::blend_factor(blend.source_blend),
            dst_color_blend_factor: conversions::blend_factor(blend.dest_blend),
            color_blend_op: conversions::blend_op(blend.blend_op),
            src_alpha_blend_factor: conversions::blend_factor(blend.source_blend_alpha),
            dst_alpha_blend_factor: conversions::blend_factor(blend.dest_blend_alpha),
            alpha_blend_op: conversions::blend_op(blend.blend_op_alpha),
            color_write_mask: vk::ColorComponentFlags::RGBA,
        };
        let attachments = vec![attachment; desc.color_formats.len()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(&attachments)
            .blend_constants([blend.blend_factor; 4]);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats: Vec<vk::Format> = desc.color_formats.iter().map(|&f| conversions::format(f)).collect();
        let depth_format = desc.depth_format.map_or(vk::Format::UNDEFINED, conversions::format);
        let stencil_format = match desc.depth_format {
            Some(format) if format.has_stencil() => conversions::format(format),
            _ => vk::Format::UNDEFINED,
        };
        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(depth_format)
            .stencil_attachment_format(stencil_format);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout)
            .push_next(&mut rendering);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, e)| map_device_error(e, |e| RhiError::PipelineCreationFailed(format!("{}: {e}", desc.label))))?;
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineCreationFailed(desc.label.clone()))
    }

    pub(super) fn create_compute_pipeline(
        &self,
        state: &VulkanState,
        desc: &ComputePipelineDescriptor,
        layout: vk::PipelineLayout,
    ) -> RhiResult<vk::Pipeline> {
        let stage = stage_info(shader(state, desc.shader)?);
        let info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(layout);

        let pipelines = unsafe {
            self.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, e)| map_device_error(e, |e| RhiError::PipelineCreationFailed(format!("{}: {e}", desc.label))))?;
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineCreationFailed(desc.label.clone()))
    }
}
