//! Declarative description of one draw or dispatch configuration

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use glam::Vec4;

use crate::backend::{
    BlendState, DepthStencilState, LoadOp, PrimitiveTopology, RasterizerState, Rect,
    TextureFormat, Viewport,
};

use super::{Shader, Texture};

pub const MAX_RENDER_TARGETS: usize = 8;

/// The current swapchain backbuffer as a render target
#[derive(Debug, Clone)]
pub struct SwapchainTarget {
    pub swapchain_id: u64,
    pub texture: Arc<Texture>,
    pub present_enabled: bool,
}

/// Shaders, fixed-function state and render targets of one pass.
///
/// Pipelines are cached by [`PipelineState::compute_hash`], which covers
/// everything except the pass name.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub shader_vertex: Option<Arc<Shader>>,
    pub shader_pixel: Option<Arc<Shader>>,
    pub shader_compute: Option<Arc<Shader>>,
    pub rasterizer_state: Option<RasterizerState>,
    pub blend_state: Option<BlendState>,
    pub depth_stencil_state: Option<DepthStencilState>,
    pub render_target_color_textures: [Option<Arc<Texture>>; MAX_RENDER_TARGETS],
    pub render_target_color_array_index: u32,
    pub render_target_depth_texture: Option<Arc<Texture>>,
    pub render_target_depth_array_index: u32,
    pub render_target_depth_read_only: bool,
    pub render_target_swapchain: Option<SwapchainTarget>,
    pub clear_color: [LoadOp<Vec4>; MAX_RENDER_TARGETS],
    pub clear_depth: LoadOp<f32>,
    pub clear_stencil: LoadOp<u32>,
    pub viewport: Viewport,
    pub scissor: Option<Rect>,
    pub primitive_topology: PrimitiveTopology,
    pub pass_name: &'static str,
}

impl PipelineState {
    pub fn new(pass_name: &'static str) -> Self {
        Self {
            pass_name,
            ..Default::default()
        }
    }

    pub fn is_graphics(&self) -> bool {
        self.shader_vertex.is_some()
    }

    pub fn is_compute(&self) -> bool {
        self.shader_compute.is_some() && !self.is_graphics()
    }

    pub fn has_clear_values(&self) -> bool {
        self.clear_color.iter().any(LoadOp::is_clear)
            || self.clear_depth.is_clear()
            || self.clear_stencil.is_clear()
    }

    /// Load every attachment from now on
    pub fn reset_clear_values(&mut self) {
        self.clear_color = [LoadOp::Load; MAX_RENDER_TARGETS];
        self.clear_depth = LoadOp::Load;
        self.clear_stencil = LoadOp::Load;
    }

    pub fn color_formats(&self) -> Vec<TextureFormat> {
        if let Some(swapchain) = &self.render_target_swapchain {
            return vec![swapchain.texture.format()];
        }
        self.render_target_color_textures
            .iter()
            .flatten()
            .map(|texture| texture.format())
            .collect()
    }

    pub fn depth_format(&self) -> Option<TextureFormat> {
        self.render_target_depth_texture
            .as_ref()
            .map(|texture| texture.format())
    }

    /// Size of the attachments, taken from the first bound target
    pub fn render_target_size(&self) -> (u32, u32) {
        if let Some(swapchain) = &self.render_target_swapchain {
            return (swapchain.texture.width(), swapchain.texture.height());
        }
        self.render_target_color_textures
            .iter()
            .flatten()
            .chain(self.render_target_depth_texture.iter())
            .next()
            .map(|texture| (texture.width(), texture.height()))
            .unwrap_or((0, 0))
    }

    /// Viewport used for drawing: the explicit one, or the full target
    pub fn effective_viewport(&self) -> Viewport {
        if self.viewport.is_defined() {
            self.viewport
        } else {
            let (width, height) = self.render_target_size();
            Viewport::new(width as f32, height as f32)
        }
    }

    pub fn compute_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        for shader in [&self.shader_vertex, &self.shader_pixel, &self.shader_compute] {
            shader.as_ref().map(|shader| shader.id()).hash(&mut hasher);
        }
        self.rasterizer_state.hash(&mut hasher);
        self.blend_state.hash(&mut hasher);
        self.depth_stencil_state.hash(&mut hasher);

        for texture in &self.render_target_color_textures {
            texture
                .as_ref()
                .map(|texture| (texture.id(), texture.format()))
                .hash(&mut hasher);
        }
        self.render_target_color_array_index.hash(&mut hasher);
        self.render_target_depth_texture
            .as_ref()
            .map(|texture| (texture.id(), texture.format()))
            .hash(&mut hasher);
        self.render_target_depth_array_index.hash(&mut hasher);
        self.render_target_depth_read_only.hash(&mut hasher);
        self.render_target_swapchain
            .as_ref()
            .map(|swapchain| (swapchain.swapchain_id, swapchain.texture.format()))
            .hash(&mut hasher);

        for clear in &self.clear_color {
            hash_load_op(clear, &mut hasher, |value, hasher| {
                value.to_array().map(f32::to_bits).hash(hasher)
            });
        }
        hash_load_op(&self.clear_depth, &mut hasher, |value, hasher| {
            value.to_bits().hash(hasher)
        });
        hash_load_op(&self.clear_stencil, &mut hasher, |value, hasher| value.hash(hasher));

        self.viewport.hash(&mut hasher);
        self.scissor.hash(&mut hasher);
        self.primitive_topology.hash(&mut hasher);

        hasher.finish()
    }
}

fn hash_load_op<T: Copy, H: Hasher>(op: &LoadOp<T>, hasher: &mut H, value: impl Fn(T, &mut H)) {
    match op {
        LoadOp::Clear(v) => {
            0u8.hash(hasher);
            value(*v, hasher);
        }
        LoadOp::Load => 1u8.hash(hasher),
        LoadOp::DontCare => 2u8.hash(hasher),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CompareFunction, CullMode, PolygonMode};

    #[test]
    fn test_hash_ignores_pass_name() {
        let a = PipelineState::new("a");
        let b = PipelineState::new("b");
        assert_eq!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn test_hash_covers_fixed_function_state() {
        let mut a = PipelineState::new("pass");
        a.rasterizer_state = Some(RasterizerState::new(CullMode::Back, PolygonMode::Solid, true));
        let mut b = a.clone();
        b.depth_stencil_state = Some(DepthStencilState::new(true, true, CompareFunction::Greater));
        assert_ne!(a.compute_hash(), b.compute_hash());

        let mut c = a.clone();
        c.clear_depth = LoadOp::Clear(0.0);
        assert_ne!(a.compute_hash(), c.compute_hash());
    }

    #[test]
    fn test_clear_values() {
        let mut pso = PipelineState::new("gbuffer");
        assert!(!pso.has_clear_values());
        pso.clear_color[2] = LoadOp::Clear(Vec4::ZERO);
        assert!(pso.has_clear_values());
        pso.reset_clear_values();
        assert!(!pso.has_clear_values());
    }
}
