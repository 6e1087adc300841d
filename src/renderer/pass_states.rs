//! Pipeline states of every pass
//!
//! Built once per depth convention and mutated in place by the passes, which
//! fill in shaders and render targets before beginning a render pass.

use crate::backend::{
    BlendState, CompareFunction, CullMode, DepthStencilState, PolygonMode, PrimitiveTopology,
    RasterizerState,
};
use crate::rhi::PipelineState;

/// Fixed-function presets
#[derive(Debug, Clone, Copy)]
pub struct FixedStates {
    pub rasterizer_cull_back: RasterizerState,
    pub rasterizer_cull_none: RasterizerState,
    pub rasterizer_wireframe: RasterizerState,
    pub rasterizer_light_point_spot: RasterizerState,
    /// Geometry behind the near plane of the cascade still casts shadows
    pub rasterizer_light_directional: RasterizerState,
    pub depth_test_write: DepthStencilState,
    pub depth_test_read: DepthStencilState,
    pub depth_disabled: DepthStencilState,
    pub blend_disabled: BlendState,
    pub blend_alpha: BlendState,
    pub blend_additive: BlendState,
    pub depth_clear: f32,
}

impl FixedStates {
    pub fn new(reverse_z: bool) -> Self {
        let depth_function = if reverse_z {
            CompareFunction::GreaterEqual
        } else {
            CompareFunction::LessEqual
        };
        let bias_sign = if reverse_z { 1.0 } else { -1.0 };

        Self {
            rasterizer_cull_back: RasterizerState::new(CullMode::Back, PolygonMode::Solid, true),
            rasterizer_cull_none: RasterizerState::new(CullMode::None, PolygonMode::Solid, true),
            rasterizer_wireframe: RasterizerState::new(CullMode::Back, PolygonMode::Wireframe, true),
            rasterizer_light_point_spot: RasterizerState::new(CullMode::Back, PolygonMode::Solid, true)
                .with_depth_bias(bias_sign * 0.005, 0.0, bias_sign * 2.0),
            rasterizer_light_directional: RasterizerState::new(CullMode::Back, PolygonMode::Solid, false)
                .with_depth_bias(bias_sign * 0.005, 0.0, bias_sign * 2.0),
            depth_test_write: DepthStencilState::new(true, true, depth_function),
            depth_test_read: DepthStencilState::new(true, false, depth_function),
            depth_disabled: DepthStencilState::new(false, false, CompareFunction::Always),
            blend_disabled: BlendState::disabled(),
            blend_alpha: BlendState::alpha(),
            blend_additive: BlendState::additive(),
            depth_clear: if reverse_z { 0.0 } else { 1.0 },
        }
    }
}

pub struct PassStates {
    pub fixed: FixedStates,
    pub shadow_depth: PipelineState,
    pub shadow_color: PipelineState,
    pub depth_prepass: PipelineState,
    pub gbuffer: PipelineState,
    pub image_based_light: PipelineState,
    /// Shared by every compute dispatch; only the shader changes
    pub compute: PipelineState,
    pub outline: PipelineState,
    pub transform_handle: PipelineState,
    pub lines_depth: PipelineState,
    pub lines_no_depth: PipelineState,
    pub grid: PipelineState,
    pub icons: PipelineState,
    pub text: PipelineState,
    pub copy_to_backbuffer: PipelineState,
}

impl PassStates {
    pub fn new(reverse_z: bool) -> Self {
        let fixed = FixedStates::new(reverse_z);

        let graphics = |name, rasterizer, depth_stencil, blend| PipelineState {
            rasterizer_state: Some(rasterizer),
            depth_stencil_state: Some(depth_stencil),
            blend_state: Some(blend),
            ..PipelineState::new(name)
        };
        let lines = |name, depth_stencil| PipelineState {
            primitive_topology: PrimitiveTopology::LineList,
            ..graphics(name, fixed.rasterizer_cull_none, depth_stencil, fixed.blend_alpha)
        };

        Self {
            shadow_depth: graphics(
                "pass_shadow_maps_depth",
                fixed.rasterizer_light_point_spot,
                fixed.depth_test_write,
                fixed.blend_disabled,
            ),
            shadow_color: graphics(
                "pass_shadow_maps_color",
                fixed.rasterizer_light_point_spot,
                fixed.depth_test_read,
                fixed.blend_alpha,
            ),
            depth_prepass: graphics(
                "pass_depth_prepass",
                fixed.rasterizer_cull_back,
                fixed.depth_test_write,
                fixed.blend_disabled,
            ),
            gbuffer: graphics(
                "pass_gbuffer",
                fixed.rasterizer_cull_back,
                fixed.depth_test_write,
                fixed.blend_disabled,
            ),
            image_based_light: graphics(
                "pass_light_image_based",
                fixed.rasterizer_cull_back,
                fixed.depth_disabled,
                fixed.blend_additive,
            ),
            compute: PipelineState::new("pass_compute"),
            outline: graphics(
                "pass_outline",
                fixed.rasterizer_cull_none,
                fixed.depth_disabled,
                fixed.blend_alpha,
            ),
            transform_handle: graphics(
                "pass_transform_handle",
                fixed.rasterizer_cull_back,
                fixed.depth_disabled,
                fixed.blend_alpha,
            ),
            lines_depth: lines("pass_lines_depth", fixed.depth_test_read),
            lines_no_depth: lines("pass_lines_no_depth", fixed.depth_disabled),
            grid: lines("pass_grid", fixed.depth_test_read),
            icons: graphics(
                "pass_icons",
                fixed.rasterizer_cull_none,
                fixed.depth_disabled,
                fixed.blend_alpha,
            ),
            text: graphics(
                "pass_text",
                fixed.rasterizer_cull_none,
                fixed.depth_disabled,
                fixed.blend_alpha,
            ),
            copy_to_backbuffer: graphics(
                "pass_copy_to_backbuffer",
                fixed.rasterizer_cull_back,
                fixed.depth_disabled,
                fixed.blend_disabled,
            ),
            fixed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_convention() {
        let reverse = FixedStates::new(true);
        assert_eq!(reverse.depth_clear, 0.0);
        assert_eq!(reverse.depth_test_write.depth_function, CompareFunction::GreaterEqual);

        let forward = FixedStates::new(false);
        assert_eq!(forward.depth_clear, 1.0);
        assert_eq!(forward.depth_test_write.depth_function, CompareFunction::LessEqual);
    }

    #[test]
    fn test_directional_shadows_disable_depth_clip() {
        let fixed = FixedStates::new(true);
        assert!(!fixed.rasterizer_light_directional.depth_clip_enabled);
        assert!(fixed.rasterizer_light_point_spot.depth_clip_enabled);
    }

    #[test]
    fn test_line_states_use_line_topology() {
        let states = PassStates::new(true);
        assert_eq!(states.lines_depth.primitive_topology, PrimitiveTopology::LineList);
        assert_eq!(states.gbuffer.primitive_topology, PrimitiveTopology::TriangleList);
    }
}
