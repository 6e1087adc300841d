use glam::Vec4;

use crate::backend::{ClearValue, LoadOp, Viewport};
use crate::rhi::CommandList;
use crate::scene::{FrameSnapshot, Frustum, LightType};

use crate::renderer::{Renderer, ShaderId};

impl Renderer {
    /// Depth of opaque casters per slice, plus the colour of transparent
    /// casters for lights that let coloured light through
    pub(super) fn pass_shadow_maps(&mut self, cmd: &mut CommandList, snapshot: &FrameSnapshot) {
        let (Some(vertex), Some(pixel)) = (
            self.shaders.get(ShaderId::DepthLightV),
            self.shaders.get(ShaderId::DepthLightP),
        ) else {
            return;
        };

        let reverse_z = self.options.reverse_z;
        let fixed = self.states.fixed;
        let has_transparents = !snapshot.transparent().is_empty();

        for &light_index in snapshot.lights() {
            let entity = snapshot.entity(light_index);
            let Some(light) = &entity.light else {
                continue;
            };
            if !light.casts_shadows() {
                continue;
            }
            let Some(shadow_map) = self.shadow_maps.get_mut(&entity.id) else {
                continue;
            };

            let render_color = has_transparents && light.shadows_transparent;
            // Lights without transparent casters sample a white colour map
            if !render_color && !shadow_map.color_cleared {
                cmd.clear_render_target(Some(&shadow_map.color), ClearValue::Color([1.0; 4]));
                shadow_map.color_cleared = true;
            }
            let shadow_map = shadow_map.clone();

            let rasterizer = if light.light_type == LightType::Directional {
                fixed.rasterizer_light_directional
            } else {
                fixed.rasterizer_light_point_spot
            };
            let view_projections =
                light.view_projections(&entity.transform, snapshot.camera_position(), reverse_z);
            let viewport = Viewport::new(shadow_map.resolution as f32, shadow_map.resolution as f32);

            for slice in 0..light.shadow_array_length() {
                let view_projection = view_projections[slice as usize];
                let frustum = Frustum::from_matrix(&view_projection);

                let pso = &mut self.states.shadow_depth;
                pso.shader_vertex = Some(vertex.clone());
                pso.shader_pixel = Some(pixel.clone());
                pso.rasterizer_state = Some(rasterizer);
                pso.render_target_color_textures = Default::default();
                pso.render_target_depth_texture = Some(shadow_map.depth.clone());
                pso.render_target_depth_array_index = slice;
                pso.clear_depth = LoadOp::Clear(fixed.depth_clear);
                pso.viewport = viewport;

                if !self.resources.begin_pass(cmd, &self.states.shadow_depth) {
                    continue;
                }
                for &index in snapshot.opaque() {
                    let caster = snapshot.entity(index);
                    let casts = caster
                        .renderable
                        .as_ref()
                        .is_some_and(|renderable| renderable.cast_shadows);
                    if !casts || !frustum.intersects(&caster.aabb) {
                        continue;
                    }
                    if !self.draw_entity(cmd, caster, view_projection * caster.matrix) {
                        break;
                    }
                }
                cmd.end_render_pass();

                if !render_color {
                    continue;
                }

                let pso = &mut self.states.shadow_color;
                pso.shader_vertex = Some(vertex.clone());
                pso.shader_pixel = Some(pixel.clone());
                pso.rasterizer_state = Some(rasterizer);
                pso.render_target_color_textures = Default::default();
                pso.render_target_color_textures[0] = Some(shadow_map.color.clone());
                pso.render_target_color_array_index = slice;
                pso.render_target_depth_texture = Some(shadow_map.depth.clone());
                pso.render_target_depth_array_index = slice;
                pso.render_target_depth_read_only = true;
                pso.reset_clear_values();
                pso.clear_color[0] = LoadOp::Clear(Vec4::ONE);
                pso.viewport = viewport;

                if !self.resources.begin_pass(cmd, &self.states.shadow_color) {
                    continue;
                }
                for &index in snapshot.transparent() {
                    let caster = snapshot.entity(index);
                    let Some(renderable) = &caster.renderable else {
                        continue;
                    };
                    if !renderable.cast_shadows || !frustum.intersects(&caster.aabb) {
                        continue;
                    }
                    let color = renderable
                        .material
                        .as_ref()
                        .map_or(Vec4::ONE, |material| material.color);
                    self.resources.cb_uber.data.mat_color = color.to_array();
                    if !self.draw_entity(cmd, caster, view_projection * caster.matrix) {
                        break;
                    }
                }
                cmd.end_render_pass();
            }
        }
    }
}
