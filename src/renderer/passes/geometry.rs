use std::collections::BTreeMap;

use glam::Vec4;

use crate::backend::LoadOp;
use crate::rhi::{CommandList, Counter};
use crate::scene::{EntityIndex, FrameSnapshot, Frustum, MaterialFlags, MaterialTexture};

use crate::renderer::resources::srv;
use crate::renderer::{RenderTarget, Renderer, ShaderId};

impl Renderer {
    /// Opaque depth only, so the G-buffer shades each pixel once
    pub(super) fn pass_depth_prepass(&mut self, cmd: &mut CommandList, snapshot: &FrameSnapshot) {
        let (Some(vertex), Some(pixel), Some(depth)) = (
            self.shaders.get(ShaderId::DepthPrepassV),
            self.shaders.get(ShaderId::DepthPrepassP),
            self.target(RenderTarget::GbufferDepth),
        ) else {
            return;
        };

        let view_projection = self.resources.cb_frame.data.view_projection;
        let frustum = Frustum::from_matrix(&self.resources.cb_frame.data.view_projection_unjittered);

        let pso = &mut self.states.depth_prepass;
        pso.shader_vertex = Some(vertex);
        pso.shader_pixel = Some(pixel);
        pso.render_target_depth_texture = Some(depth);
        pso.clear_depth = LoadOp::Clear(self.states.fixed.depth_clear);

        if !self.resources.begin_pass(cmd, &self.states.depth_prepass) {
            return;
        }
        for &index in snapshot.opaque() {
            let entity = snapshot.entity(index);
            if !frustum.intersects(&entity.aabb) {
                continue;
            }
            // Alpha tested materials need their albedo
            let albedo = entity
                .renderable
                .as_ref()
                .and_then(|renderable| renderable.material.as_ref())
                .and_then(|material| material.texture(MaterialTexture::Albedo).cloned());
            cmd.set_texture(srv::TEX, albedo.as_ref(), None, false);
            if !self.draw_entity(cmd, entity, view_projection * entity.matrix) {
                break;
            }
        }
        cmd.end_render_pass();
    }

    /// Fill albedo, normal, material, velocity and depth.
    ///
    /// Renderables are grouped by material flags and every group is drawn
    /// with the pixel shader variant compiled for exactly those flags.
    pub(super) fn pass_gbuffer(&mut self, cmd: &mut CommandList, snapshot: &FrameSnapshot, is_transparent: bool) {
        let bucket = if is_transparent {
            snapshot.transparent()
        } else {
            snapshot.opaque()
        };
        if is_transparent && bucket.is_empty() {
            return;
        }

        let Some(vertex) = self.shaders.get(ShaderId::GbufferV) else {
            return;
        };
        let (Some(albedo), Some(normal), Some(material), Some(velocity), Some(depth)) = (
            self.target(RenderTarget::GbufferAlbedo),
            self.target(RenderTarget::GbufferNormal),
            self.target(RenderTarget::GbufferMaterial),
            self.target(RenderTarget::GbufferVelocity),
            self.target(RenderTarget::GbufferDepth),
        ) else {
            return;
        };

        let mut groups: BTreeMap<u32, Vec<EntityIndex>> = BTreeMap::new();
        for &index in bucket {
            let flags = snapshot
                .entity(index)
                .renderable
                .as_ref()
                .and_then(|renderable| renderable.material.as_ref())
                .map_or(MaterialFlags::empty(), |material| material.flags());
            groups.entry(flags.bits()).or_default().push(index);
        }
        // An empty opaque bucket still clears the targets
        if groups.is_empty() {
            groups.insert(0, Vec::new());
        }

        for &index in bucket {
            if let Some(material) = snapshot
                .entity(index)
                .renderable
                .as_ref()
                .and_then(|renderable| renderable.material.clone())
            {
                self.material_index(&material);
            }
        }
        self.resources.cb_material.update(cmd);

        let fixed = self.states.fixed;
        let depth_prepassed = self.options.depth_prepass && !is_transparent;
        let wireframe = self.options.debug_wireframe;
        let view_projection = self.resources.cb_frame.data.view_projection;
        let frustum = Frustum::from_matrix(&self.resources.cb_frame.data.view_projection_unjittered);

        let mut first = true;
        for (flags, entities) in groups {
            let Some(pixel) = self.shaders.gbuffer_variant(MaterialFlags::from_bits_truncate(flags)) else {
                continue;
            };

            let pso = &mut self.states.gbuffer;
            pso.shader_vertex = Some(vertex.clone());
            pso.shader_pixel = Some(pixel);
            pso.render_target_color_textures = Default::default();
            pso.render_target_color_textures[0] = Some(albedo.clone());
            pso.render_target_color_textures[1] = Some(normal.clone());
            pso.render_target_color_textures[2] = Some(material.clone());
            pso.render_target_color_textures[3] = Some(velocity.clone());
            pso.render_target_depth_texture = Some(depth.clone());
            pso.rasterizer_state = Some(if wireframe {
                fixed.rasterizer_wireframe
            } else {
                fixed.rasterizer_cull_back
            });
            pso.depth_stencil_state = Some(if depth_prepassed {
                fixed.depth_test_read
            } else {
                fixed.depth_test_write
            });

            pso.reset_clear_values();
            // Transparents draw over the opaque G-buffer and test against its depth
            if first && !is_transparent {
                for clear in pso.clear_color.iter_mut().take(4) {
                    *clear = LoadOp::Clear(Vec4::ZERO);
                }
                if !depth_prepassed {
                    pso.clear_depth = LoadOp::Clear(fixed.depth_clear);
                }
            }
            first = false;

            if !self.resources.begin_pass(cmd, &self.states.gbuffer) {
                continue;
            }

            let mut bound_material = None;
            for index in entities {
                let entity = snapshot.entity(index);
                if !frustum.intersects(&entity.aabb) {
                    continue;
                }

                let material = entity
                    .renderable
                    .as_ref()
                    .and_then(|renderable| renderable.material.clone());
                let material_id = material.as_ref().map(|material| material.id());
                if bound_material != Some(material_id) {
                    bound_material = Some(material_id);
                    let mat_id = material
                        .as_ref()
                        .and_then(|material| self.material_slots.get(&material.id()).copied())
                        .unwrap_or(0);

                    for slot in MaterialTexture::ALL {
                        let texture = material.as_ref().and_then(|material| material.texture(slot));
                        cmd.set_texture(srv::MATERIAL + slot as u32, texture, None, false);
                    }

                    let uber = &mut self.resources.cb_uber.data;
                    uber.mat_id = mat_id;
                    uber.is_transparent_pass = u32::from(is_transparent);
                    if let Some(material) = &material {
                        uber.mat_color = material.color.to_array();
                        uber.mat_tiling_uv = material.tiling.to_array();
                        uber.mat_offset_uv = material.offset.to_array();
                        uber.mat_roughness_mul = material.roughness;
                        uber.mat_metallic_mul = material.metallic;
                        uber.mat_normal_mul = material.normal;
                        uber.mat_height_mul = material.height;
                    } else {
                        uber.mat_color = [1.0; 4];
                        uber.mat_tiling_uv = [1.0; 2];
                        uber.mat_offset_uv = [0.0; 2];
                        uber.mat_roughness_mul = 1.0;
                        uber.mat_metallic_mul = 0.0;
                        uber.mat_normal_mul = 0.0;
                        uber.mat_height_mul = 0.0;
                    }
                }

                if !self.draw_entity(cmd, entity, view_projection * entity.matrix) {
                    break;
                }
                self.ctx.profiler().increment(Counter::MeshesRendered);
            }
            cmd.end_render_pass();
        }
    }
}
