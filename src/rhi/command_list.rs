//! Command list state machine and resource binding
//!
//! A command list moves through `Idle -> Recording -> Ended -> Submitted`
//! and back to `Idle` once its fence has been waited on. Between
//! [`CommandList::begin_render_pass`] and [`CommandList::end_render_pass`]
//! one [`PipelineState`] is active. The GPU render pass itself starts lazily
//! on the first graphics draw, so textures can still be transitioned right
//! after the pass has been opened. Pipelines and descriptor sets are bound
//! lazily on every draw and dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::{
    BufferHandle, ClearValue, CommandBufferHandle, DescriptorResource, DescriptorType,
    DescriptorSetHandle, DescriptorWrite, FenceHandle, Filter, GpuCommand, GpuDevice, ImageBarrier,
    ImageLayout, LoadOp, PipelineBindPoint, Rect, RenderingAttachment, RenderingInfo,
    RhiResult, SamplerHandle, SemaphoreHandle, SubmitInfo, TextureViewHandle,
};

use super::{
    binding_shift, ConstantBuffer, Counter, IndexBuffer, Pipeline, PipelineState, RhiContext,
    Sampler, StructuredBuffer, Texture, VertexBuffer, FENCE_TIMEOUT_NS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    Idle,
    Recording,
    Ended,
    Submitted,
}

#[derive(Debug, Clone)]
enum BoundResource {
    ConstantBuffer {
        buffer: BufferHandle,
        range: u64,
        offset: u32,
    },
    StructuredBuffer {
        buffer: BufferHandle,
        range: u64,
    },
    Texture {
        _texture: Arc<Texture>,
        view: TextureViewHandle,
        layout: ImageLayout,
    },
    StorageTexture {
        _texture: Arc<Texture>,
        view: TextureViewHandle,
    },
    Sampler(SamplerHandle),
}

pub struct CommandList {
    ctx: Arc<RhiContext>,
    name: String,
    handle: CommandBufferHandle,
    fence: FenceHandle,
    processed_semaphore: SemaphoreHandle,
    state: CommandListState,
    fence_submitted: bool,
    semaphore_signaled: bool,
    flushed: bool,
    pass_open: bool,
    render_pass_active: bool,
    pipeline_active: bool,
    marker_active: bool,
    pso: PipelineState,
    pipeline: Option<Arc<Pipeline>>,
    vertex_buffer: Option<(u64, u64)>,
    index_buffer: Option<(u64, u64)>,
    bindings: BTreeMap<u32, BoundResource>,
    descriptor_set: Option<(DescriptorSetHandle, Vec<u32>)>,
}

impl CommandList {
    pub fn new(ctx: &Arc<RhiContext>, name: impl Into<String>) -> RhiResult<Self> {
        let device = ctx.device();
        let handle = device.create_command_buffer()?;
        let fence = device.create_fence(false)?;
        let processed_semaphore = device.create_semaphore()?;
        Ok(Self {
            ctx: ctx.clone(),
            name: name.into(),
            handle,
            fence,
            processed_semaphore,
            state: CommandListState::Idle,
            fence_submitted: false,
            semaphore_signaled: false,
            flushed: false,
            pass_open: false,
            render_pass_active: false,
            pipeline_active: false,
            marker_active: false,
            pso: PipelineState::default(),
            pipeline: None,
            vertex_buffer: None,
            index_buffer: None,
            bindings: BTreeMap::new(),
            descriptor_set: None,
        })
    }

    fn device(&self) -> &Arc<dyn GpuDevice> {
        self.ctx.device()
    }

    fn record(&self, command: GpuCommand) {
        self.ctx.device().record(self.handle, command);
    }

    fn assert_recording(&self) {
        assert_eq!(
            self.state,
            CommandListState::Recording,
            "Command list {} is not recording",
            self.name
        );
    }

    pub fn begin(&mut self) -> bool {
        if self.state == CommandListState::Submitted {
            self.wait();
        }
        assert_eq!(
            self.state,
            CommandListState::Idle,
            "Command list {} must be idle to begin",
            self.name
        );

        if let Err(e) = self.device().begin_command_buffer(self.handle) {
            log::error!("Failed to begin command list {}: {e}", self.name);
            return false;
        }

        self.pipeline_active = false;
        self.descriptor_set = None;
        self.vertex_buffer = None;
        self.index_buffer = None;
        self.state = CommandListState::Recording;
        true
    }

    pub fn end(&mut self) -> bool {
        self.assert_recording();
        if self.pass_open {
            self.end_render_pass();
        }
        self.state = CommandListState::Ended;
        if let Err(e) = self.device().end_command_buffer(self.handle) {
            log::error!("Failed to end command list {}: {e}", self.name);
            return false;
        }
        true
    }

    /// Submit for execution.
    ///
    /// The processed semaphore is signaled only when `wait_semaphore` is
    /// given, which is the case for the presenting submission of a frame.
    pub fn submit(&mut self, wait_semaphore: Option<SemaphoreHandle>) -> bool {
        assert_eq!(
            self.state,
            CommandListState::Ended,
            "Command list {} must be ended before submitting",
            self.name
        );

        let present_disabled = self
            .pso
            .render_target_swapchain
            .as_ref()
            .is_some_and(|swapchain| !swapchain.present_enabled);
        if present_disabled {
            self.state = CommandListState::Submitted;
            self.fence_submitted = false;
            return true;
        }

        let device = self.ctx.device().clone();
        if device.is_fence_signaled(self.fence) {
            if let Err(e) = device.reset_fence(self.fence) {
                log::error!("Failed to reset the command list fence: {e}");
            }
        }

        let signal_semaphore = wait_semaphore.map(|_| self.processed_semaphore);
        let result = device.submit(&SubmitInfo {
            command_buffer: self.handle,
            wait_semaphore,
            signal_semaphore,
            fence: Some(self.fence),
        });

        self.state = CommandListState::Submitted;
        match result {
            Ok(()) => {
                self.fence_submitted = true;
                self.semaphore_signaled = signal_semaphore.is_some();
                true
            }
            Err(e) => {
                log::error!("Failed to submit the command list: {e}");
                self.fence_submitted = false;
                self.semaphore_signaled = false;
                false
            }
        }
    }

    /// Block until the GPU has finished executing this list
    pub fn wait(&mut self) {
        assert_eq!(
            self.state,
            CommandListState::Submitted,
            "Command list {} must be submitted before waiting",
            self.name
        );

        if self.fence_submitted {
            if let Err(e) = self.device().wait_fence(self.fence, FENCE_TIMEOUT_NS) {
                panic!("Failed to wait for command list {}: {e}", self.name);
            }
        }
        self.fence_submitted = false;
        self.semaphore_signaled = false;

        let device = self.ctx.device().clone();
        if let Err(e) = self
            .ctx
            .descriptor_cache()
            .lock()
            .grow_if_needed(device.as_ref())
        {
            log::error!("Failed to grow the descriptor pool: {e}");
        }

        self.state = CommandListState::Idle;
    }

    /// Execute everything recorded so far and wait for it.
    ///
    /// With `restore` a list that was recording starts recording again.
    /// Draws fail until the next render pass begins.
    pub fn flush(&mut self, restore: bool) -> bool {
        if self.state == CommandListState::Idle {
            return true;
        }

        self.ctx.profiler().increment(Counter::Flushes);
        let was_recording = self.state == CommandListState::Recording;
        if was_recording {
            self.end();
        }
        if self.state == CommandListState::Ended {
            self.submit(None);
        }
        if self.state == CommandListState::Submitted {
            self.wait();
        }

        self.flushed = true;
        if restore && was_recording {
            return self.begin();
        }
        true
    }

    pub fn begin_render_pass(&mut self, pso: &PipelineState) -> bool {
        self.assert_recording();
        assert!(
            pso.shader_vertex.is_some() || pso.shader_compute.is_some(),
            "Pipeline state {} has no vertex or compute shader",
            pso.pass_name
        );

        if self.pass_open {
            self.end_render_pass();
        }

        self.flushed = false;
        self.pipeline_active = false;
        self.descriptor_set = None;
        self.bindings.clear();
        self.pso = pso.clone();

        let device = self.ctx.device().clone();
        let pipeline = {
            let layout = self
                .ctx
                .descriptor_cache()
                .lock()
                .get_or_create_layout(device.as_ref(), pso);
            layout.and_then(|layout| {
                self.ctx
                    .pipeline_cache()
                    .lock()
                    .get_or_create(&device, pso, layout)
            })
        };
        let pipeline = match pipeline {
            Ok(pipeline) => pipeline,
            Err(e) => {
                log::error!("Failed to acquire appropriate pipeline for {}: {e}", pso.pass_name);
                self.pipeline = None;
                return false;
            }
        };
        self.pipeline = Some(pipeline);
        self.pass_open = true;

        self.record(GpuCommand::MarkerBegin(pso.pass_name.to_string()));
        self.marker_active = true;

        self.vertex_buffer = None;
        self.index_buffer = None;

        if pso.is_graphics() {
            self.transition_render_targets();
        }

        true
    }

    fn transition_render_targets(&mut self) {
        if let Some(swapchain) = self.pso.render_target_swapchain.clone() {
            if swapchain.present_enabled {
                swapchain
                    .texture
                    .set_layout(ImageLayout::ColorAttachment, self, None, false);
            }
            return;
        }

        let colors: Vec<Arc<Texture>> = self
            .pso
            .render_target_color_textures
            .iter()
            .flatten()
            .cloned()
            .collect();
        for texture in colors {
            texture.set_layout(ImageLayout::ColorAttachment, self, Some(0), false);
        }

        if let Some(depth) = self.pso.render_target_depth_texture.clone() {
            let layout = if self.pso.render_target_depth_read_only {
                ImageLayout::DepthStencilReadOnly
            } else {
                ImageLayout::DepthStencilAttachment
            };
            depth.set_layout(layout, self, Some(0), false);
        }
    }

    fn begin_gpu_render_pass(&mut self) -> bool {
        let pso = &self.pso;
        let mut color_attachments = Vec::new();

        if let Some(swapchain) = &pso.render_target_swapchain {
            if !swapchain.present_enabled {
                return false;
            }
            let Some(view) = swapchain.texture.attachment_view(0) else {
                log::error!("Swapchain image has no attachment view");
                return false;
            };
            color_attachments.push(RenderingAttachment {
                view,
                layout: ImageLayout::ColorAttachment,
                load: color_load_op(pso.clear_color[0]),
            });
        } else {
            for (index, texture) in pso.render_target_color_textures.iter().enumerate() {
                let Some(texture) = texture else {
                    continue;
                };
                let Some(view) = texture.attachment_view(pso.render_target_color_array_index)
                else {
                    log::error!("Render target {} has no attachment view", texture.name());
                    return false;
                };
                color_attachments.push(RenderingAttachment {
                    view,
                    layout: ImageLayout::ColorAttachment,
                    load: color_load_op(pso.clear_color[index]),
                });
            }
        }

        let mut depth_attachment = None;
        let mut has_stencil = false;
        if let Some(depth) = &pso.render_target_depth_texture {
            let Some(view) = depth.attachment_view(pso.render_target_depth_array_index) else {
                log::error!("Depth target {} has no attachment view", depth.name());
                return false;
            };
            let (layout, load) = if pso.render_target_depth_read_only {
                (ImageLayout::DepthStencilReadOnly, LoadOp::Load)
            } else {
                (
                    ImageLayout::DepthStencilAttachment,
                    depth_load_op(pso.clear_depth, pso.clear_stencil),
                )
            };
            has_stencil = depth.format().has_stencil();
            depth_attachment = Some(RenderingAttachment { view, layout, load });
        }

        let (width, height) = pso.render_target_size();
        let viewport = pso.effective_viewport();
        let scissor = pso.scissor.unwrap_or(Rect {
            x: 0,
            y: 0,
            width,
            height,
        });

        self.record(GpuCommand::BeginRendering(RenderingInfo {
            label: self.pso.pass_name.to_string(),
            width,
            height,
            color_attachments,
            depth_attachment,
            has_stencil,
        }));
        self.record(GpuCommand::SetViewport(viewport));
        self.record(GpuCommand::SetScissor(scissor));

        self.render_pass_active = true;
        self.ctx.profiler().increment(Counter::RenderPasses);
        true
    }

    /// Close the current pass.
    ///
    /// A pass that declared clears but never drew still begins, so its load
    /// operations clear the targets.
    pub fn end_render_pass(&mut self) {
        self.assert_recording();

        if !self.render_pass_active
            && self.pso.is_graphics()
            && self.pso.has_clear_values()
            && self.pipeline.is_some()
            && !self.flushed
        {
            self.begin_gpu_render_pass();
        }

        if self.render_pass_active {
            self.record(GpuCommand::EndRendering);
            self.render_pass_active = false;
        }

        if self.marker_active {
            self.record(GpuCommand::MarkerEnd);
            self.marker_active = false;
        }

        self.pass_open = false;
        self.pipeline_active = false;
    }

    /// Clear a texture outside of any render pass
    pub fn clear_render_target(&mut self, texture: Option<&Arc<Texture>>, value: ClearValue) {
        self.assert_recording();
        assert!(
            !self.render_pass_active,
            "Can't clear a render target while a render pass is active"
        );

        let Some(texture) = texture else {
            log::error!("Texture is null.");
            return;
        };

        texture.set_layout(ImageLayout::TransferDst, self, None, false);
        let command = match value {
            ClearValue::Color(color) => GpuCommand::ClearColorImage {
                texture: texture.handle(),
                mip_count: texture.mip_count(),
                layer_count: texture.array_length(),
                color,
            },
            ClearValue::DepthStencil { depth, stencil } => GpuCommand::ClearDepthStencilImage {
                texture: texture.handle(),
                aspect: texture.aspect(),
                mip_count: texture.mip_count(),
                layer_count: texture.array_length(),
                depth,
                stencil,
            },
        };
        self.record(command);
    }

    /// Copy `source` into `destination`, restoring both layouts afterwards.
    ///
    /// Copies every mip when `blit_mips` is set, otherwise only mip 0.
    pub fn blit(&mut self, source: &Arc<Texture>, destination: &Arc<Texture>, blit_mips: bool) {
        self.assert_recording();
        assert!(!self.render_pass_active, "Can't blit while a render pass is active");
        assert_ne!(source.id(), destination.id(), "Can't blit a texture into itself");
        assert_eq!(source.format(), destination.format(), "Blit requires matching formats");
        assert_eq!(source.width(), destination.width(), "Blit requires matching widths");
        assert_eq!(source.height(), destination.height(), "Blit requires matching heights");
        assert_eq!(
            source.array_length(),
            destination.array_length(),
            "Blit requires matching array lengths"
        );
        if blit_mips {
            assert_eq!(
                source.mip_count(),
                destination.mip_count(),
                "Blit requires matching mip counts"
            );
        }

        let mip_count = if blit_mips { source.mip_count() } else { 1 };
        let source_layouts: Vec<ImageLayout> = (0..mip_count).map(|mip| source.layout(mip)).collect();
        let destination_layouts: Vec<ImageLayout> =
            (0..mip_count).map(|mip| destination.layout(mip)).collect();

        let range = if blit_mips { None } else { Some(0) };
        source.set_layout(ImageLayout::TransferSrc, self, range, false);
        destination.set_layout(ImageLayout::TransferDst, self, range, false);

        self.record(GpuCommand::Blit {
            source: source.handle(),
            destination: destination.handle(),
            aspect: source.aspect(),
            width: source.width(),
            height: source.height(),
            mip_count,
            layer_count: source.array_length(),
            filter: Filter::Nearest,
        });

        for mip in 0..mip_count {
            let restore = source_layouts[mip as usize];
            if restore != ImageLayout::Undefined {
                source.set_layout(restore, self, Some(mip), false);
            }
            let restore = destination_layouts[mip as usize];
            if restore != ImageLayout::Undefined {
                destination.set_layout(restore, self, Some(mip), false);
            }
        }
    }

    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> bool {
        self.assert_recording();
        if !self.on_draw() {
            return false;
        }
        self.record(GpuCommand::Draw {
            vertex_count,
            first_vertex,
        });
        self.ctx.profiler().increment(Counter::Draws);
        true
    }

    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> bool {
        self.assert_recording();
        if !self.on_draw() {
            return false;
        }
        self.record(GpuCommand::DrawIndexed {
            index_count,
            first_index,
            vertex_offset,
        });
        self.ctx.profiler().increment(Counter::Draws);
        true
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> bool {
        self.assert_recording();
        if !self.on_draw() {
            return false;
        }
        self.record(GpuCommand::Dispatch { x, y, z });
        self.ctx.profiler().increment(Counter::Dispatches);
        true
    }

    fn on_draw(&mut self) -> bool {
        if self.flushed {
            return false;
        }
        let Some(pipeline) = self.pipeline.clone() else {
            return false;
        };

        if pipeline.bind_point() == PipelineBindPoint::Graphics
            && !self.render_pass_active
            && !self.begin_gpu_render_pass()
        {
            return false;
        }

        if !self.pipeline_active {
            self.record(GpuCommand::BindPipeline {
                pipeline: pipeline.handle(),
                bind_point: pipeline.bind_point(),
            });
            self.ctx.profiler().increment(Counter::PipelineBindings);
            self.pipeline_active = true;
            self.descriptor_set = None;
        }

        let layout = pipeline.layout().clone();
        if layout.bindings().is_empty() {
            return true;
        }

        let mut writes = Vec::with_capacity(layout.bindings().len());
        let mut dynamic_offsets = Vec::new();
        for binding in layout.bindings() {
            let bound = self.bindings.get(&binding.binding);
            let resource = match (binding.ty, bound) {
                (
                    DescriptorType::ConstantBuffer,
                    Some(BoundResource::ConstantBuffer {
                        buffer,
                        range,
                        offset,
                    }),
                ) => {
                    dynamic_offsets.push(*offset);
                    DescriptorResource::ConstantBuffer {
                        buffer: *buffer,
                        range: *range,
                    }
                }
                (
                    DescriptorType::StructuredBuffer,
                    Some(BoundResource::StructuredBuffer { buffer, range }),
                ) => DescriptorResource::StructuredBuffer {
                    buffer: *buffer,
                    range: *range,
                },
                (DescriptorType::Texture, Some(BoundResource::Texture { view, layout, .. })) => {
                    DescriptorResource::Texture {
                        view: *view,
                        layout: *layout,
                    }
                }
                (DescriptorType::Texture, _) => match self.default_texture_resource(false) {
                    Some(resource) => resource,
                    None => {
                        log::error!("No default texture to bind at binding {}", binding.binding);
                        return false;
                    }
                },
                (DescriptorType::StorageTexture, Some(BoundResource::StorageTexture { view, .. })) => {
                    DescriptorResource::StorageTexture { view: *view }
                }
                (DescriptorType::Sampler, Some(BoundResource::Sampler(sampler))) => {
                    DescriptorResource::Sampler(*sampler)
                }
                (ty, _) => {
                    log::error!(
                        "{} expects a {:?} at binding {} but none is bound",
                        self.pso.pass_name,
                        ty,
                        binding.binding
                    );
                    return false;
                }
            };
            writes.push(DescriptorWrite {
                binding: binding.binding,
                resource,
            });
        }

        let device = self.ctx.device().clone();
        let set = self
            .ctx
            .descriptor_cache()
            .lock()
            .get_or_allocate_set(device.as_ref(), &layout, &writes);
        let set = match set {
            Ok(set) => set,
            Err(e) => {
                log::error!("Failed to get a descriptor set for {}: {e}", self.pso.pass_name);
                return false;
            }
        };

        let unchanged = self
            .descriptor_set
            .as_ref()
            .is_some_and(|(bound, offsets)| *bound == set && *offsets == dynamic_offsets);
        if !unchanged {
            self.record(GpuCommand::BindDescriptorSet {
                pipeline: pipeline.handle(),
                bind_point: pipeline.bind_point(),
                set,
                dynamic_offsets: dynamic_offsets.clone(),
            });
            self.ctx.profiler().increment(Counter::DescriptorSetBindings);
            self.descriptor_set = Some((set, dynamic_offsets));
        }

        true
    }

    fn default_texture_resource(&self, uav: bool) -> Option<DescriptorResource> {
        let texture = self.ctx.default_texture()?;
        if uav {
            Some(DescriptorResource::StorageTexture {
                view: texture.uav(None)?,
            })
        } else {
            Some(DescriptorResource::Texture {
                view: texture.srv(None)?,
                layout: texture.layout(0),
            })
        }
    }

    pub fn set_vertex_buffer(&mut self, buffer: &VertexBuffer, offset: u64) {
        self.assert_recording();
        if self.vertex_buffer == Some((buffer.id(), offset)) {
            return;
        }
        self.record(GpuCommand::BindVertexBuffer {
            buffer: buffer.handle(),
            offset,
        });
        self.ctx.profiler().increment(Counter::VertexBufferBindings);
        self.vertex_buffer = Some((buffer.id(), offset));
    }

    pub fn set_index_buffer(&mut self, buffer: &IndexBuffer, offset: u64) {
        self.assert_recording();
        if self.index_buffer == Some((buffer.id(), offset)) {
            return;
        }
        self.record(GpuCommand::BindIndexBuffer {
            buffer: buffer.handle(),
            offset,
            format: buffer.format(),
        });
        self.ctx.profiler().increment(Counter::IndexBufferBindings);
        self.index_buffer = Some((buffer.id(), offset));
    }

    /// Bind the slot written by the last update of `buffer`
    pub fn set_constant_buffer(&mut self, slot: u32, buffer: &ConstantBuffer) {
        self.assert_recording();
        self.bindings.insert(
            binding_shift::CONSTANT_BUFFER + slot,
            BoundResource::ConstantBuffer {
                buffer: buffer.handle(),
                range: buffer.range(),
                offset: buffer.offset(),
            },
        );
    }

    pub fn set_structured_buffer(&mut self, slot: u32, buffer: &StructuredBuffer) {
        self.assert_recording();
        self.bindings.insert(
            binding_shift::UAV + slot,
            BoundResource::StructuredBuffer {
                buffer: buffer.handle(),
                range: buffer.size(),
            },
        );
    }

    pub fn set_sampler(&mut self, slot: u32, sampler: &Sampler) {
        self.assert_recording();
        self.bindings.insert(
            binding_shift::SAMPLER + slot,
            BoundResource::Sampler(sampler.handle()),
        );
    }

    /// Bind a texture for sampling, transitioning it when needed.
    ///
    /// `mip` selects a per-mip view; with `ranged` the transition also covers
    /// every mip below it.
    pub fn set_texture(
        &mut self,
        slot: u32,
        texture: Option<&Arc<Texture>>,
        mip: Option<u32>,
        ranged: bool,
    ) {
        self.set_texture_internal(binding_shift::SRV + slot, texture, mip, ranged, false);
    }

    /// Bind a texture for storage writes in the `General` layout
    pub fn set_texture_uav(
        &mut self,
        slot: u32,
        texture: Option<&Arc<Texture>>,
        mip: Option<u32>,
        ranged: bool,
    ) {
        self.set_texture_internal(binding_shift::UAV + slot, texture, mip, ranged, true);
    }

    fn set_texture_internal(
        &mut self,
        binding: u32,
        texture: Option<&Arc<Texture>>,
        mip: Option<u32>,
        ranged: bool,
        uav: bool,
    ) {
        self.assert_recording();

        let default_texture = self.ctx.default_texture();
        let Some(texture) = texture else {
            self.bind_default_texture(binding, uav);
            return;
        };
        if default_texture
            .as_ref()
            .is_some_and(|default| default.id() == texture.id())
        {
            self.bind_default_texture(binding, uav);
            return;
        }

        if uav {
            assert!(texture.is_uav(), "Texture {} doesn't have a UAV view", texture.name());
        } else {
            assert!(texture.is_srv(), "Texture {} doesn't have an SRV view", texture.name());
        }

        let view = if uav { texture.uav(mip) } else { texture.srv(mip) };
        let Some(view) = view else {
            self.bind_default_texture(binding, uav);
            return;
        };

        let current = texture.layout(mip.unwrap_or(0));
        if matches!(current, ImageLayout::Undefined | ImageLayout::Preinitialized) {
            log::error!(
                "Can't set texture {} without a layout, replacing with a default texture",
                texture.name()
            );
            self.bind_default_texture(binding, uav);
            return;
        }

        let target = if uav {
            ImageLayout::General
        } else if texture.is_depth_format() {
            ImageLayout::DepthStencilReadOnly
        } else {
            ImageLayout::ShaderReadOnly
        };

        if !texture.is_in_layout(target, mip, ranged) {
            if self.render_pass_active {
                log::error!(
                    "Can't transition texture {} to target layout while a render pass is active, replacing with a default texture",
                    texture.name()
                );
                self.bind_default_texture(binding, uav);
                return;
            }
            texture.set_layout(target, self, mip, ranged);
        }

        let resource = if uav {
            BoundResource::StorageTexture {
                _texture: texture.clone(),
                view,
            }
        } else {
            BoundResource::Texture {
                _texture: texture.clone(),
                view,
                layout: target,
            }
        };
        self.bindings.insert(binding, resource);
    }

    /// View bound at `slot` by `set_texture`, or by `set_texture_uav` when `uav`
    pub fn bound_texture_view(&self, slot: u32, uav: bool) -> Option<TextureViewHandle> {
        let shift = if uav { binding_shift::UAV } else { binding_shift::SRV };
        match self.bindings.get(&(shift + slot))? {
            BoundResource::Texture { view, .. } | BoundResource::StorageTexture { view, .. } => {
                Some(*view)
            }
            _ => None,
        }
    }

    fn bind_default_texture(&mut self, binding: u32, uav: bool) {
        let Some(texture) = self.ctx.default_texture() else {
            self.bindings.remove(&binding);
            return;
        };
        let resource = if uav {
            texture.uav(None).map(|view| BoundResource::StorageTexture {
                _texture: texture.clone(),
                view,
            })
        } else {
            texture.srv(None).map(|view| BoundResource::Texture {
                _texture: texture.clone(),
                view,
                layout: texture.layout(0),
            })
        };
        match resource {
            Some(resource) => {
                self.bindings.insert(binding, resource);
            }
            None => {
                self.bindings.remove(&binding);
            }
        }
    }

    /// Record a layout transition
    pub(crate) fn insert_barrier(&mut self, barrier: ImageBarrier) {
        self.assert_recording();
        assert!(
            !self.render_pass_active,
            "Can't record a layout transition while a render pass is active"
        );
        self.record(GpuCommand::Barrier(barrier));
        self.ctx.profiler().increment(Counter::PipelineBarriers);
    }

    pub fn state(&self) -> CommandListState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CommandListState::Recording
    }

    pub fn is_render_pass_active(&self) -> bool {
        self.render_pass_active
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn handle(&self) -> CommandBufferHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline_state(&self) -> &PipelineState {
        &self.pso
    }

    /// Semaphore to wait on before presenting, when the last submit signaled it
    pub fn processed_semaphore(&self) -> Option<SemaphoreHandle> {
        self.semaphore_signaled.then_some(self.processed_semaphore)
    }

    pub fn context(&self) -> &Arc<RhiContext> {
        &self.ctx
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        if self.state == CommandListState::Submitted && self.fence_submitted {
            if let Err(e) = self.device().wait_fence(self.fence, FENCE_TIMEOUT_NS) {
                log::error!("Failed to wait for command list {} on drop: {e}", self.name);
            }
        }
        let device = self.device();
        device.destroy_semaphore(self.processed_semaphore);
        device.destroy_fence(self.fence);
        device.destroy_command_buffer(self.handle);
    }
}

fn color_load_op(op: LoadOp<glam::Vec4>) -> LoadOp<ClearValue> {
    match op {
        LoadOp::Clear(color) => LoadOp::Clear(ClearValue::Color(color.to_array())),
        LoadOp::Load => LoadOp::Load,
        LoadOp::DontCare => LoadOp::DontCare,
    }
}

fn depth_load_op(depth: LoadOp<f32>, stencil: LoadOp<u32>) -> LoadOp<ClearValue> {
    match depth {
        LoadOp::Clear(depth) => LoadOp::Clear(ClearValue::DepthStencil {
            depth,
            stencil: stencil.clear_value().unwrap_or(0),
        }),
        LoadOp::Load => LoadOp::Load,
        LoadOp::DontCare => LoadOp::DontCare,
    }
}
