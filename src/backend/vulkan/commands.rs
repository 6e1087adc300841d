use std::ffi::CString;

use ash::vk;

use super::{conversions, VulkanDevice, VulkanState};
use crate::backend::traits::*;
use crate::backend::types::*;

fn full_range(aspect: vk::ImageAspectFlags, mip_count: u32, layer_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: mip_count,
        base_array_layer: 0,
        layer_count,
    }
}

fn mip_extent(size: u32, mip: u32) -> i32 {
    (size >> mip).max(1) as i32
}

impl VulkanDevice {
    /// Translate one command into the Vulkan command buffer `cmd`.
    ///
    /// Unknown handles are logged and the command dropped, matching how the
    /// command list treats a failed bind.
    pub(super) fn record_command(&self, state: &VulkanState, cmd: vk::CommandBuffer, command: GpuCommand) {
        let image = |handle: TextureHandle| {
            let image = state.textures.get(&handle).map(|texture| texture.image);
            if image.is_none() {
                log::error!("Command references unknown texture {}", handle.id());
            }
            image
        };
        let view = |handle: TextureViewHandle| {
            let view = state.views.get(&handle).copied();
            if view.is_none() {
                log::error!("Command references unknown texture view {}", handle.id());
            }
            view
        };
        let buffer = |handle: BufferHandle| {
            let buffer = state.buffers.get(&handle).map(|buffer| buffer.buffer);
            if buffer.is_none() {
                log::error!("Command references unknown buffer {}", handle.id());
            }
            buffer
        };

        unsafe {
            match command {
                GpuCommand::Barrier(barrier) => {
                    let Some(image) = image(barrier.texture) else {
                        return;
                    };
                    let range = vk::ImageSubresourceRange {
                        aspect_mask: conversions::aspect(barrier.aspect),
                        base_mip_level: barrier.base_mip,
                        level_count: barrier.mip_count,
                        base_array_layer: barrier.base_layer,
                        layer_count: barrier.layer_count,
                    };
                    self.image_barrier(cmd, image, range, barrier.old_layout, barrier.new_layout);
                }
                GpuCommand::BeginRendering(info) => {
                    let attachment = |attachment: &RenderingAttachment| -> Option<vk::RenderingAttachmentInfo<'static>> {
                        let view = view(attachment.view)?;
                        let mut vk_attachment = vk::RenderingAttachmentInfo::default()
                            .image_view(view)
                            .image_layout(conversions::image_layout(attachment.layout))
                            .load_op(conversions::attachment_load_op(&attachment.load))
                            .store_op(vk::AttachmentStoreOp::STORE);
                        if let Some(value) = attachment.load.clear_value() {
                            vk_attachment = vk_attachment.clear_value(conversions::clear_value(value));
                        }
                        Some(vk_attachment)
                    };

                    let Some(colors) = info
                        .color_attachments
                        .iter()
                        .map(|color| attachment(color))
                        .collect::<Option<Vec<_>>>()
                    else {
                        return;
                    };
                    let depth = match &info.depth_attachment {
                        Some(depth) => match attachment(depth) {
                            Some(depth) => Some(depth),
                            None => return,
                        },
                        None => None,
                    };

                    let mut rendering = vk::RenderingInfo::default()
                        .render_area(vk::Rect2D {
                            offset: vk::Offset2D::default(),
                            extent: vk::Extent2D {
                                width: info.width,
                                height: info.height,
                            },
                        })
                        .layer_count(1)
                        .color_attachments(&colors);
                    if let Some(depth) = &depth {
                        rendering = rendering.depth_attachment(depth);
                        if info.has_stencil {
                            rendering = rendering.stencil_attachment(depth);
                        }
                    }
                    self.device.cmd_begin_rendering(cmd, &rendering);
                }
                GpuCommand::EndRendering => self.device.cmd_end_rendering(cmd),
                GpuCommand::ClearColorImage {
                    texture,
                    mip_count,
                    layer_count,
                    color,
                } => {
                    let Some(image) = image(texture) else {
                        return;
                    };
                    let range = full_range(vk::ImageAspectFlags::COLOR, mip_count, layer_count);
                    let value = vk::ClearColorValue { float32: color };
                    self.device.cmd_clear_color_image(
                        cmd,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &value,
                        &[range],
                    );
                }
                GpuCommand::ClearDepthStencilImage {
                    texture,
                    aspect,
                    mip_count,
                    layer_count,
                    depth,
                    stencil,
                } => {
                    let Some(image) = image(texture) else {
                        return;
                    };
                    let range = full_range(conversions::aspect(aspect), mip_count, layer_count);
                    let value = vk::ClearDepthStencilValue { depth, stencil };
                    self.device.cmd_clear_depth_stencil_image(
                        cmd,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &value,
                        &[range],
                    );
                }
                GpuCommand::BindPipeline { pipeline, bind_point } => {
                    let Some(entry) = state.pipelines.get(&pipeline) else {
                        log::error!("Binding unknown pipeline {}", pipeline.id());
                        return;
                    };
                    self.device
                        .cmd_bind_pipeline(cmd, conversions::bind_point(bind_point), entry.pipeline);
                }
                GpuCommand::BindDescriptorSet {
                    pipeline,
                    bind_point,
                    set,
                    dynamic_offsets,
                } => {
                    let (Some(entry), Some(&set)) = (state.pipelines.get(&pipeline), state.sets.get(&set)) else {
                        log::error!("Binding a descriptor set for unknown pipeline {}", pipeline.id());
                        return;
                    };
                    self.device.cmd_bind_descriptor_sets(
                        cmd,
                        conversions::bind_point(bind_point),
                        entry.layout,
                        0,
                        &[set],
                        &dynamic_offsets,
                    );
                }
                GpuCommand::BindVertexBuffer { buffer: handle, offset } => {
                    if let Some(buffer) = buffer(handle) {
                        self.device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[offset]);
                    }
                }
                GpuCommand::BindIndexBuffer {
                    buffer: handle,
                    offset,
                    format,
                } => {
                    if let Some(buffer) = buffer(handle) {
                        self.device
                            .cmd_bind_index_buffer(cmd, buffer, offset, conversions::index_type(format));
                    }
                }
                GpuCommand::SetViewport(viewport) => {
                    let vk_viewport = vk::Viewport {
                        x: viewport.x,
                        y: viewport.y,
                        width: viewport.width,
                        height: viewport.height,
                        min_depth: viewport.depth_min,
                        max_depth: viewport.depth_max,
                    };
                    self.device.cmd_set_viewport(cmd, 0, &[vk_viewport]);
                    // Scissor is dynamic state too; default it to the viewport
                    let scissor = vk::Rect2D {
                        offset: vk::Offset2D {
                            x: viewport.x.max(0.0) as i32,
                            y: viewport.y.max(0.0) as i32,
                        },
                        extent: vk::Extent2D {
                            width: viewport.width.max(0.0) as u32,
                            height: viewport.height.max(0.0) as u32,
                        },
                    };
                    self.device.cmd_set_scissor(cmd, 0, &[scissor]);
                }
                GpuCommand::SetScissor(rect) => {
                    let scissor = vk::Rect2D {
                        offset: vk::Offset2D { x: rect.x, y: rect.y },
                        extent: vk::Extent2D {
                            width: rect.width,
                            height: rect.height,
                        },
                    };
                    self.device.cmd_set_scissor(cmd, 0, &[scissor]);
                }
                GpuCommand::Draw {
                    vertex_count,
                    first_vertex,
                } => self.device.cmd_draw(cmd, vertex_count, 1, first_vertex, 0),
                GpuCommand::DrawIndexed {
                    index_count,
                    first_index,
                    vertex_offset,
                } => self
                    .device
                    .cmd_draw_indexed(cmd, index_count, 1, first_index, vertex_offset, 0),
                GpuCommand::Dispatch { x, y, z } => {
                    self.device.cmd_dispatch(cmd, x, y, z);
                    // Storage writes are visible to whatever runs next
                    let barrier = vk::MemoryBarrier::default()
                        .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                        .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE);
                    self.device.cmd_pipeline_barrier(
                        cmd,
                        vk::PipelineStageFlags::COMPUTE_SHADER,
                        vk::PipelineStageFlags::ALL_COMMANDS,
                        vk::DependencyFlags::empty(),
                        &[barrier],
                        &[],
                        &[],
                    );
                }
                GpuCommand::Blit {
                    source,
                    destination,
                    aspect,
                    width,
                    height,
                    mip_count,
                    layer_count,
                    filter,
                } => {
                    let (Some(source), Some(destination)) = (image(source), image(destination)) else {
                        return;
                    };
                    let aspect = conversions::aspect(aspect);
                    let regions: Vec<vk::ImageBlit> = (0..mip_count)
                        .map(|mip| {
                            let layers = vk::ImageSubresourceLayers {
                                aspect_mask: aspect,
                                mip_level: mip,
                                base_array_layer: 0,
                                layer_count,
                            };
                            let offsets = [
                                vk::Offset3D::default(),
                                vk::Offset3D {
                                    x: mip_extent(width, mip),
                                    y: mip_extent(height, mip),
                                    z: 1,
                                },
                            ];
                            vk::ImageBlit {
                                src_subresource: layers,
                                src_offsets: offsets,
                                dst_subresource: layers,
                                dst_offsets: offsets,
                            }
                        })
                        .collect();
                    self.device.cmd_blit_image(
                        cmd,
                        source,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        destination,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &regions,
                        conversions::filter(filter),
                    );
                }
                GpuCommand::MarkerBegin(name) => {
                    if let (Some(marker), Ok(name)) = (&self.debug_marker, CString::new(name)) {
                        let label = vk::DebugUtilsLabelEXT::default().label_name(&name);
                        marker.cmd_begin_debug_utils_label(cmd, &label);
                    }
                }
                GpuCommand::MarkerEnd => {
                    if let Some(marker) = &self.debug_marker {
                        marker.cmd_end_debug_utils_label(cmd);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_extent_never_reaches_zero() {
        assert_eq!(mip_extent(1920, 0), 1920);
        assert_eq!(mip_extent(1920, 3), 240);
        assert_eq!(mip_extent(4, 5), 1);
    }
}
