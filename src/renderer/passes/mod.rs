//! The pass graph
//!
//! Every pass is a method on [`Renderer`] recording into the frame's command
//! list. A pass whose shaders are not compiled, or whose inputs are missing,
//! records nothing.

mod geometry;
mod lighting;
mod overlay;
mod post_process;
mod screen_space;
mod shadow;

use std::sync::Arc;

use glam::Mat4;

use crate::rhi::{CommandList, Shader, Texture};
use crate::scene::{FrameSnapshot, SnapshotEntity};

use super::constant_buffers::CbUber;
use super::{RenderTarget, Renderer, ShaderId};

pub use overlay::{text_vertices, FONT_COLUMNS, FONT_FIRST_CHAR, FONT_ROWS};

impl Renderer {
    pub(super) fn pass_main(&mut self, cmd: &mut CommandList, snapshot: &FrameSnapshot) {
        self.pass_generate_requested_mips(cmd);
        self.pass_brdf_specular_lut(cmd);

        self.pass_shadow_maps(cmd, snapshot);
        if self.options.depth_prepass {
            self.pass_depth_prepass(cmd, snapshot);
        }
        self.pass_gbuffer(cmd, snapshot, false);

        if self.options.ssao {
            self.pass_ssao(cmd);
        }
        if self.options.screen_space_reflections {
            self.pass_ssr(cmd);
        }

        self.pass_light(cmd, snapshot, false);
        self.pass_light_composition(cmd, false);
        self.pass_light_image_based(cmd, false);

        if !snapshot.transparent().is_empty() {
            self.pass_refraction_source(cmd);
            self.pass_gbuffer(cmd, snapshot, true);
            self.pass_light(cmd, snapshot, true);
            self.pass_light_composition(cmd, true);
            self.pass_light_image_based(cmd, true);
        }

        self.pass_post_process(cmd);
        self.pass_overlays(cmd, snapshot);
    }

    fn target(&self, target: RenderTarget) -> Option<Arc<Texture>> {
        self.targets.get(target).cloned()
    }

    /// Point the shared compute state at `id` and begin it
    fn begin_compute(&mut self, cmd: &mut CommandList, id: ShaderId) -> bool {
        let Some(shader) = self.shaders.get(id) else {
            return false;
        };
        self.begin_compute_shader(cmd, shader, id.name())
    }

    fn begin_compute_shader(&mut self, cmd: &mut CommandList, shader: Arc<Shader>, name: &'static str) -> bool {
        self.states.compute.shader_compute = Some(shader);
        self.states.compute.pass_name = name;
        self.resources.begin_pass(cmd, &self.states.compute)
    }

    /// Dispatch enough groups to cover `width` x `height` pixels
    fn dispatch_for(&self, cmd: &mut CommandList, width: u32, height: u32) -> bool {
        cmd.dispatch(self.config.thread_groups(width), self.config.thread_groups(height), 1)
    }

    fn update_uber(&mut self, cmd: &mut CommandList, configure: impl FnOnce(&mut CbUber)) {
        configure(&mut self.resources.cb_uber.data);
        self.resources.cb_uber.update(cmd);
    }

    fn draw_quad(&self, cmd: &mut CommandList) -> bool {
        let quad = &self.resources.quad;
        cmd.set_vertex_buffer(&quad.vertices, 0);
        cmd.set_index_buffer(&quad.indices, 0);
        cmd.draw_indexed(quad.index_count(), 0, 0)
    }

    /// Draw an entity's geometry with `transform` as the uber transform
    fn draw_entity(&mut self, cmd: &mut CommandList, entity: &SnapshotEntity, transform: Mat4) -> bool {
        let Some(renderable) = &entity.renderable else {
            return false;
        };
        let Some(geometry) = &renderable.geometry else {
            return false;
        };

        self.update_uber(cmd, |uber| {
            uber.transform = transform;
            uber.transform_previous = entity.matrix_previous;
        });
        cmd.set_vertex_buffer(&geometry.vertex_buffer, 0);
        cmd.set_index_buffer(&geometry.index_buffer, 0);
        cmd.draw_indexed(
            renderable.index_count,
            renderable.index_offset,
            renderable.vertex_offset as i32,
        )
    }
}
