//! Editor overlays drawn at output resolution, and the final copy into the
//! swapchain

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::backend::LoadOp;
use crate::rhi::{CommandList, Texture, VertexPosTex};
use crate::scene::{FrameSnapshot, LightType};

use crate::renderer::resources::{srv, uav};
use crate::renderer::{debug_channel, RenderTarget, Renderer, ShaderId};

/// Glyphs per row of the font atlas
pub const FONT_COLUMNS: u32 = 16;
/// Glyph rows of the font atlas
pub const FONT_ROWS: u32 = 6;
/// First character stored in the atlas, the rest follow in ASCII order
pub const FONT_FIRST_CHAR: u8 = 32;

/// Two triangles per glyph of `text`.
///
/// `position` is the top left corner in pixels from the top left of the
/// viewport, and the vertices are in the centred pixel space of the
/// orthographic projection. Characters outside the atlas render as spaces.
pub fn text_vertices(text: &str, position: Vec2, viewport: Vec2, cell: Vec2) -> Vec<VertexPosTex> {
    let glyph_count = FONT_COLUMNS * FONT_ROWS;
    let uv_size = Vec2::new(1.0 / FONT_COLUMNS as f32, 1.0 / FONT_ROWS as f32);
    let origin = Vec2::new(position.x - viewport.x * 0.5, viewport.y * 0.5 - position.y);

    let mut vertices = Vec::with_capacity(text.len() * 6);
    let mut pen = origin;
    for c in text.chars() {
        if c == '\n' {
            pen = Vec2::new(origin.x, pen.y - cell.y);
            continue;
        }

        let glyph = u32::from(c)
            .checked_sub(u32::from(FONT_FIRST_CHAR))
            .filter(|glyph| *glyph < glyph_count)
            .unwrap_or(0);
        let uv_min = Vec2::new((glyph % FONT_COLUMNS) as f32, (glyph / FONT_COLUMNS) as f32) * uv_size;
        let uv_max = uv_min + uv_size;

        let (left, right) = (pen.x, pen.x + cell.x);
        let (top, bottom) = (pen.y, pen.y - cell.y);
        let top_left = VertexPosTex::new(Vec3::new(left, top, 0.0), uv_min);
        let top_right = VertexPosTex::new(Vec3::new(right, top, 0.0), Vec2::new(uv_max.x, uv_min.y));
        let bottom_left = VertexPosTex::new(Vec3::new(left, bottom, 0.0), Vec2::new(uv_min.x, uv_max.y));
        let bottom_right = VertexPosTex::new(Vec3::new(right, bottom, 0.0), uv_max);
        vertices.extend_from_slice(&[top_left, bottom_left, top_right, top_right, bottom_left, bottom_right]);

        pen.x += cell.x;
    }
    vertices
}

impl Renderer {
    pub(super) fn pass_overlays(&mut self, cmd: &mut CommandList, snapshot: &FrameSnapshot) {
        let Some(output) = self.target(RenderTarget::FrameOutput) else {
            return;
        };
        // Depth only lines up with the output when nothing is upscaled
        let depth = if self.resolution_render == self.resolution_output {
            self.target(RenderTarget::GbufferDepth)
        } else {
            None
        };

        if self.options.debug_selection_outline {
            self.pass_outline(cmd, snapshot, &output);
        }
        if self.options.debug_transform {
            self.pass_transform_handle(cmd, &output);
        }
        if self.options.debug_aabb {
            let color = Vec4::new(0.41, 0.86, 1.0, 1.0);
            for &index in snapshot.opaque().iter().chain(snapshot.transparent()) {
                self.lines.draw_box(&snapshot.entity(index).aabb, color, 0.0, true);
            }
        }
        if self.options.debug_grid {
            self.pass_grid(cmd, &output, depth.as_ref());
        }
        self.pass_lines(cmd, &output, depth.as_ref());
        if self.options.debug_lights {
            self.pass_light_icons(cmd, snapshot, &output);
        }
        self.pass_render_target_debug(cmd, &output);
        self.pass_text(cmd, &output);
    }

    /// Point a graphics state at the output, keeping what is already there
    fn overlay_state(
        states: &mut crate::rhi::PipelineState,
        vertex: Arc<crate::rhi::Shader>,
        pixel: Arc<crate::rhi::Shader>,
        output: &Arc<Texture>,
        depth: Option<&Arc<Texture>>,
    ) {
        states.shader_vertex = Some(vertex);
        states.shader_pixel = Some(pixel);
        states.render_target_color_textures = Default::default();
        states.render_target_color_textures[0] = Some(output.clone());
        states.render_target_depth_texture = depth.cloned();
        states.render_target_depth_read_only = depth.is_some();
        states.reset_clear_values();
    }

    fn pass_outline(&mut self, cmd: &mut CommandList, snapshot: &FrameSnapshot, output: &Arc<Texture>) {
        let Some(selected) = self.selected_entity else {
            return;
        };
        let Some(entity) = snapshot.entities().iter().find(|entity| entity.id == selected) else {
            return;
        };
        if entity.renderable.is_none() {
            return;
        }
        let (Some(vertex), Some(pixel)) = (
            self.shaders.get(ShaderId::EntityV),
            self.shaders.get(ShaderId::OutlineP),
        ) else {
            return;
        };

        Self::overlay_state(&mut self.states.outline, vertex, pixel, output, None);
        if !self.resources.begin_pass(cmd, &self.states.outline) {
            return;
        }
        self.resources.cb_uber.data.color = [1.0, 0.6, 0.0, 1.0];
        let view_projection = self.resources.cb_frame.data.view_projection_unjittered;
        self.draw_entity(cmd, entity, view_projection * entity.matrix);
        cmd.end_render_pass();
    }

    fn pass_transform_handle(&mut self, cmd: &mut CommandList, output: &Arc<Texture>) {
        if self.transform_handle.is_empty() {
            return;
        }
        let (Some(vertex), Some(pixel)) = (
            self.shaders.get(ShaderId::EntityV),
            self.shaders.get(ShaderId::EntityP),
        ) else {
            return;
        };

        Self::overlay_state(&mut self.states.transform_handle, vertex, pixel, output, None);
        if !self.resources.begin_pass(cmd, &self.states.transform_handle) {
            return;
        }
        let view_projection = self.resources.cb_frame.data.view_projection_unjittered;
        for mesh in self.transform_handle.clone() {
            self.update_uber(cmd, |uber| {
                uber.transform = view_projection * mesh.transform;
                uber.color = mesh.color.to_array();
            });
            cmd.set_vertex_buffer(&mesh.geometry.vertex_buffer, 0);
            cmd.set_index_buffer(&mesh.geometry.index_buffer, 0);
            if !cmd.draw_indexed(mesh.geometry.index_count(), 0, 0) {
                break;
            }
        }
        cmd.end_render_pass();
    }

    fn pass_grid(&mut self, cmd: &mut CommandList, output: &Arc<Texture>, depth: Option<&Arc<Texture>>) {
        let (Some(vertex), Some(pixel)) = (
            self.shaders.get(ShaderId::LinesV),
            self.shaders.get(ShaderId::LinesP),
        ) else {
            return;
        };

        Self::overlay_state(&mut self.states.grid, vertex, pixel, output, depth);
        let fixed = self.states.fixed;
        self.states.grid.depth_stencil_state = Some(if depth.is_some() {
            fixed.depth_test_read
        } else {
            fixed.depth_disabled
        });
        if !self.resources.begin_pass(cmd, &self.states.grid) {
            return;
        }

        // Snapped to whole units under the camera so the grid looks endless
        let camera = Vec3::from_array(self.resources.cb_frame.data.camera_position);
        let offset = Vec3::new(camera.x.trunc(), 0.0, camera.z.trunc());
        let view_projection = self.resources.cb_frame.data.view_projection_unjittered;
        self.update_uber(cmd, |uber| uber.transform = view_projection * Mat4::from_translation(offset));
        cmd.set_vertex_buffer(&self.resources.grid, 0);
        cmd.draw(self.resources.grid.vertex_count(), 0);
        cmd.end_render_pass();
    }

    fn pass_lines(&mut self, cmd: &mut CommandList, output: &Arc<Texture>, depth: Option<&Arc<Texture>>) {
        if self.lines.is_empty() {
            return;
        }
        let (Some(vertex), Some(pixel)) = (
            self.shaders.get(ShaderId::LinesV),
            self.shaders.get(ShaderId::LinesP),
        ) else {
            return;
        };
        if let Err(e) = self.lines.upload(&self.ctx) {
            log::error!("Failed to upload debug lines: {e}");
            return;
        }

        let depth_count = self.lines.depth_vertex_count();
        let no_depth_count = self.lines.no_depth_vertex_count();
        let view_projection = self.resources.cb_frame.data.view_projection_unjittered;

        // Without a matching depth buffer every line draws on top
        let ranges = match depth {
            Some(_) => [(true, 0, depth_count), (false, depth_count, no_depth_count)],
            None => [(false, 0, depth_count + no_depth_count), (false, 0, 0)],
        };
        for (depth_tested, first, count) in ranges {
            if count == 0 {
                continue;
            }
            let pso = if depth_tested {
                &mut self.states.lines_depth
            } else {
                &mut self.states.lines_no_depth
            };
            Self::overlay_state(pso, vertex.clone(), pixel.clone(), output, depth.filter(|_| depth_tested));

            let pso = if depth_tested {
                &self.states.lines_depth
            } else {
                &self.states.lines_no_depth
            };
            if !self.resources.begin_pass(cmd, pso) {
                continue;
            }
            self.update_uber(cmd, |uber| uber.transform = view_projection);
            cmd.set_vertex_buffer(self.lines.buffer(), 0);
            cmd.draw(count, first);
            cmd.end_render_pass();
        }
    }

    /// Billboards for lights in front of the camera
    fn pass_light_icons(&mut self, cmd: &mut CommandList, snapshot: &FrameSnapshot, output: &Arc<Texture>) {
        let Some(camera) = snapshot.camera() else {
            return;
        };
        let (Some(vertex), Some(pixel)) = (
            self.shaders.get(ShaderId::QuadV),
            self.shaders.get(ShaderId::TextureP),
        ) else {
            return;
        };

        let camera_position = camera.transform.position;
        let camera_forward = camera.transform.forward();
        let view_projection = self.resources.cb_frame.data.view_projection_unjittered;
        let view_projection_ortho = self.resources.cb_frame.data.view_projection_ortho;
        let half_viewport = self.viewport * 0.5;

        let mut icons = Vec::new();
        for &index in snapshot.lights() {
            let entity = snapshot.entity(index);
            let Some(light) = &entity.light else {
                continue;
            };
            let to_light = entity.transform.position - camera_position;
            let distance = to_light.length();
            if distance <= f32::EPSILON || camera_forward.dot(to_light / distance) <= 0.5 {
                continue;
            }

            let clip = view_projection * entity.transform.position.extend(1.0);
            if clip.w <= 0.0 {
                continue;
            }
            let ndc = clip.truncate() / clip.w;
            let screen = Vec2::new(ndc.x, ndc.y) * half_viewport;
            let scale = (2.0 / distance).clamp(0.1, 2.0);

            let texture = match light.light_type {
                LightType::Directional => self.resources.textures.gizmo_light_directional.clone(),
                LightType::Point => self.resources.textures.gizmo_light_point.clone(),
                LightType::Spot => self.resources.textures.gizmo_light_spot.clone(),
            };
            icons.push((screen, scale, texture));
        }
        if icons.is_empty() {
            return;
        }

        Self::overlay_state(&mut self.states.icons, vertex, pixel, output, None);
        if !self.resources.begin_pass(cmd, &self.states.icons) {
            return;
        }
        for (screen, scale, texture) in icons {
            // The screen quad spans the viewport, shrink it to icon size
            let size = Vec2::new(texture.width() as f32, texture.height() as f32) * scale;
            let transform = view_projection_ortho
                * Mat4::from_translation(screen.extend(0.0))
                * Mat4::from_scale((size / self.viewport).extend(1.0));
            self.update_uber(cmd, |uber| uber.transform = transform);
            cmd.set_texture(srv::TEX, Some(&texture), None, false);
            if !self.draw_quad(cmd) {
                break;
            }
        }
        cmd.end_render_pass();
    }

    fn pass_render_target_debug(&mut self, cmd: &mut CommandList, output: &Arc<Texture>) {
        let Some((target, channels)) = self.render_target_debug() else {
            return;
        };
        if target == RenderTarget::FrameOutput {
            return;
        }
        let Some(texture) = self.target(target) else {
            return;
        };
        if !self.begin_compute(cmd, ShaderId::DebugBufferC) {
            return;
        }

        let options = if texture.is_uav() {
            channels | debug_channel::HAS_UAV
        } else {
            channels
        };
        let (width, height) = (output.width(), output.height());
        self.update_uber(cmd, |uber| {
            uber.resolution_rt = [width as f32, height as f32];
            uber.options_debug = options;
        });
        cmd.set_texture_uav(uav::RGBA, Some(output), None, false);
        cmd.set_texture(srv::TEX, Some(&texture), None, false);
        self.dispatch_for(cmd, width, height);
        cmd.end_render_pass();
    }

    fn pass_text(&mut self, cmd: &mut CommandList, output: &Arc<Texture>) {
        if self.text.is_empty() {
            return;
        }
        let Some(atlas) = self.font_atlas.clone() else {
            return;
        };
        let (Some(vertex), Some(pixel)) = (
            self.shaders.get(ShaderId::FontV),
            self.shaders.get(ShaderId::FontP),
        ) else {
            return;
        };

        let cell = Vec2::new(
            atlas.width() as f32 / FONT_COLUMNS as f32,
            atlas.height() as f32 / FONT_ROWS as f32,
        );
        let viewport = self.viewport;
        let mut colors = Vec::with_capacity(self.text.len());
        let mut vertices = Vec::new();
        for overlay in &self.text {
            let glyphs = text_vertices(&overlay.text, overlay.position, viewport, cell);
            colors.push((vertices.len() as u32, glyphs.len() as u32, overlay.color));
            vertices.extend(glyphs);
        }
        if vertices.is_empty() {
            return;
        }
        if let Err(e) = self.text_vertices.update(&self.ctx, &vertices) {
            log::error!("Failed to upload text vertices: {e}");
            return;
        }

        Self::overlay_state(&mut self.states.text, vertex, pixel, output, None);
        if !self.resources.begin_pass(cmd, &self.states.text) {
            return;
        }
        let transform = self.resources.cb_frame.data.view_projection_ortho;
        cmd.set_texture(srv::FONT_ATLAS, Some(&atlas), None, false);
        cmd.set_vertex_buffer(&self.text_vertices, 0);
        for (first, count, color) in colors {
            if count == 0 {
                continue;
            }
            self.update_uber(cmd, |uber| {
                uber.transform = transform;
                uber.color = color.to_array();
            });
            if !cmd.draw(count, first) {
                break;
            }
        }
        cmd.end_render_pass();
    }

    /// Copy the finished frame into the current backbuffer
    pub(crate) fn pass_copy_to_backbuffer(&mut self, cmd: &mut CommandList) {
        let (Some(vertex), Some(pixel), Some(output)) = (
            self.shaders.get(ShaderId::QuadV),
            self.shaders.get(ShaderId::CopyPointP),
            self.target(RenderTarget::FrameOutput),
        ) else {
            return;
        };

        let pso = &mut self.states.copy_to_backbuffer;
        pso.shader_vertex = Some(vertex);
        pso.shader_pixel = Some(pixel);
        pso.render_target_color_textures = Default::default();
        pso.render_target_swapchain = Some(self.swapchain.target());
        pso.reset_clear_values();
        // Every pixel is overwritten
        pso.clear_color[0] = LoadOp::DontCare;

        if !self.resources.begin_pass(cmd, &self.states.copy_to_backbuffer) {
            return;
        }
        let transform = self.resources.cb_frame.data.view_projection_ortho;
        self.update_uber(cmd, |uber| {
            uber.transform = transform;
            uber.resolution_rt = [output.width() as f32, output.height() as f32];
        });
        cmd.set_texture(srv::TEX, Some(&output), None, false);
        self.draw_quad(cmd);
        cmd.end_render_pass();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_vertices_per_glyph() {
        let vertices = text_vertices("ab\nc", Vec2::ZERO, Vec2::new(100.0, 100.0), Vec2::new(8.0, 16.0));
        assert_eq!(vertices.len(), 18);
    }

    #[test]
    fn test_text_starts_at_top_left() {
        let vertices = text_vertices("A", Vec2::ZERO, Vec2::new(100.0, 50.0), Vec2::new(8.0, 16.0));
        assert_eq!(vertices[0].position, [-50.0, 25.0, 0.0]);
        assert_eq!(vertices[5].position, [-42.0, 9.0, 0.0]);
    }

    #[test]
    fn test_glyph_uvs_follow_atlas_layout() {
        // 'A' is glyph 33, third row second column
        let vertices = text_vertices("A", Vec2::ZERO, Vec2::splat(100.0), Vec2::splat(8.0));
        let u = 1.0 / FONT_COLUMNS as f32;
        let v = 1.0 / FONT_ROWS as f32;
        let close = |a: [f32; 2], b: [f32; 2]| (a[0] - b[0]).abs() < 1e-6 && (a[1] - b[1]).abs() < 1e-6;
        assert!(close(vertices[0].uv, [u, 2.0 * v]));
        assert!(close(vertices[5].uv, [2.0 * u, 3.0 * v]));
    }

    #[test]
    fn test_unknown_characters_render_as_space() {
        let vertices = text_vertices("é", Vec2::ZERO, Vec2::splat(100.0), Vec2::splat(8.0));
        assert_eq!(vertices[0].uv, [0.0, 0.0]);
    }
}
