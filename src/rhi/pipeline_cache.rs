//! Content-addressed pipeline cache

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{
    BlendState, ComputePipelineDescriptor, CullMode, DepthStencilState, CompareFunction,
    GpuDevice, GraphicsPipelineDescriptor, PipelineBindPoint, PipelineDescriptor, PipelineHandle,
    PolygonMode, RasterizerState, RhiError, RhiResult,
};

use super::{DescriptorSetLayout, PipelineState};

/// A compiled pipeline together with the layout it was created against
pub struct Pipeline {
    handle: PipelineHandle,
    layout: Arc<DescriptorSetLayout>,
    bind_point: PipelineBindPoint,
    hash: u64,
    device: Arc<dyn GpuDevice>,
}

impl Pipeline {
    pub fn handle(&self) -> PipelineHandle {
        self.handle
    }

    pub fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    pub fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.handle);
    }
}

#[derive(Default)]
pub struct PipelineCache {
    pipelines: HashMap<u64, Arc<Pipeline>>,
    creations: u64,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        device: &Arc<dyn GpuDevice>,
        pso: &PipelineState,
        layout: Arc<DescriptorSetLayout>,
    ) -> RhiResult<Arc<Pipeline>> {
        let hash = pso.compute_hash();
        if let Some(pipeline) = self.pipelines.get(&hash) {
            return Ok(pipeline.clone());
        }

        let desc = Self::describe(pso, &layout)?;
        let handle = device.create_pipeline(&desc)?;
        self.creations += 1;
        log::debug!("Created pipeline for {} ({:016x})", pso.pass_name, hash);

        let pipeline = Arc::new(Pipeline {
            handle,
            layout,
            bind_point: desc.bind_point(),
            hash,
            device: device.clone(),
        });
        self.pipelines.insert(hash, pipeline.clone());
        Ok(pipeline)
    }

    fn describe(pso: &PipelineState, layout: &DescriptorSetLayout) -> RhiResult<PipelineDescriptor> {
        if let Some(vertex) = &pso.shader_vertex {
            return Ok(PipelineDescriptor::Graphics(GraphicsPipelineDescriptor {
                label: pso.pass_name.to_string(),
                vertex_shader: vertex.handle(),
                pixel_shader: pso.shader_pixel.as_ref().map(|shader| shader.handle()),
                vertex_stride: vertex.vertex_type().stride(),
                vertex_attributes: vertex.vertex_type().attributes(),
                topology: pso.primitive_topology,
                rasterizer: pso.rasterizer_state.unwrap_or(RasterizerState::new(
                    CullMode::Back,
                    PolygonMode::Solid,
                    true,
                )),
                blend: pso.blend_state.unwrap_or(BlendState::disabled()),
                depth_stencil: pso.depth_stencil_state.unwrap_or(DepthStencilState::new(
                    false,
                    false,
                    CompareFunction::Always,
                )),
                color_formats: pso.color_formats(),
                depth_format: pso.depth_format(),
                layout: layout.handle(),
            }));
        }

        if let Some(compute) = &pso.shader_compute {
            return Ok(PipelineDescriptor::Compute(ComputePipelineDescriptor {
                label: pso.pass_name.to_string(),
                shader: compute.handle(),
                layout: layout.handle(),
            }));
        }

        Err(RhiError::PipelineCreationFailed(format!(
            "{} has neither a vertex nor a compute shader",
            pso.pass_name
        )))
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Pipelines created since startup
    pub fn creation_count(&self) -> u64 {
        self.creations
    }

    pub fn clear(&mut self) {
        self.pipelines.clear();
    }
}
