//! Per-frame constant buffer values

use glam::{Mat4, Vec2, Vec3};

use crate::scene::{Camera, FrameSnapshot, LightType};

use super::constant_buffers::frame_options;
use super::{RenderTarget, Renderer};

/// Length of the temporal anti-aliasing jitter sequence
pub const TAA_JITTER_SAMPLES: u64 = 16;

/// Element `index` of the Halton low discrepancy sequence in `base`
pub fn halton(index: u64, base: u64) -> f32 {
    let mut fraction = 1.0;
    let mut result = 0.0;
    let mut index = index;
    while index > 0 {
        fraction /= base as f32;
        result += fraction * (index % base) as f32;
        index /= base;
    }
    result
}

/// Sub-pixel offset in [-0.5, 0.5] for `frame`
pub fn jitter_sample(frame: u64) -> Vec2 {
    let index = frame % TAA_JITTER_SAMPLES + 1;
    Vec2::new(halton(index, 2), halton(index, 3)) - Vec2::splat(0.5)
}

impl Renderer {
    /// Recompute the screen-space projection, only when the viewport or the
    /// camera planes changed
    pub(super) fn update_ortho(&mut self, camera: Option<&Camera>) {
        let fallback;
        let camera = match camera {
            Some(camera) => camera,
            None => {
                fallback = Camera::default();
                &fallback
            }
        };

        let planes = (camera.near, camera.far);
        if !self.ortho_dirty && planes == self.ortho_planes {
            return;
        }

        let projection =
            camera.orthographic_matrix(self.viewport.x, self.viewport.y, self.options.reverse_z);
        let view = Mat4::look_to_rh(Vec3::new(0.0, 0.0, camera.near * 2.0), Vec3::NEG_Z, Vec3::Y);

        let data = &mut self.resources.cb_frame.data;
        data.projection_ortho = projection;
        data.view_projection_ortho = projection * view;

        self.ortho_dirty = false;
        self.ortho_planes = planes;
    }

    pub(super) fn update_frame_buffer(&mut self, snapshot: &FrameSnapshot) {
        let Some(entity) = snapshot.camera() else {
            return;
        };
        let Some(camera) = &entity.camera else {
            return;
        };

        let reverse_z = self.options.reverse_z;
        let taa = self.options.anti_aliasing_taa;
        let render = self.resolution_render.as_vec2();
        let output = self.resolution_output.as_vec2();

        let jitter = if taa {
            jitter_sample(self.frame_num) / render
        } else {
            Vec2::ZERO
        };
        let first_frame = self.view_projection_previous.is_none();
        self.jitter_previous = if first_frame { jitter } else { self.jitter };
        self.jitter = jitter;

        let view = Camera::view_matrix(&entity.transform);
        let projection_unjittered = camera.projection_matrix(render.x / render.y, reverse_z);
        let projection = Mat4::from_translation(jitter.extend(0.0)) * projection_unjittered;
        let view_projection = projection * view;
        let view_projection_unjittered = projection_unjittered * view;
        let view_projection_previous = self
            .view_projection_previous
            .replace(view_projection_unjittered)
            .unwrap_or(view_projection_unjittered);

        let directional_light_intensity = snapshot
            .lights()
            .iter()
            .filter_map(|index| snapshot.entity(*index).light.as_ref())
            .find(|light| light.light_type == LightType::Directional)
            .map_or(0.0, |light| light.intensity);

        let frame_mip_count = self
            .targets
            .get(RenderTarget::FrameRender2)
            .map_or(0, |texture| texture.mip_count());
        let ssr_mip_count = self
            .targets
            .get(RenderTarget::Ssr)
            .map_or(0, |texture| texture.mip_count());
        let resolution_environment = self
            .environment
            .as_ref()
            .map_or([0.0; 2], |texture| [texture.width() as f32, texture.height() as f32]);

        let values = self.values;
        let options = self.options;
        let data = &mut self.resources.cb_frame.data;

        data.view = view;
        data.projection = projection;
        data.projection_inverted = projection.inverse();
        data.view_projection = view_projection;
        data.view_projection_inv = view_projection.inverse();
        data.view_projection_unjittered = view_projection_unjittered;
        data.view_projection_previous = view_projection_previous;

        data.delta_time = self.delta_time;
        data.time = self.time as f32;
        // Only the jitter sequence reads the frame index
        data.frame = if taa { self.frame_num as u32 } else { 0 };

        data.camera_aperture = camera.aperture;
        data.camera_shutter_speed = camera.shutter_speed;
        data.camera_iso = camera.iso;
        data.camera_near = camera.near;
        data.camera_far = camera.far;
        data.camera_position = entity.transform.position.to_array();
        data.camera_direction = entity.transform.forward().to_array();

        data.bloom_intensity = values.bloom_intensity;
        data.sharpen_strength = values.sharpen_strength;
        data.gamma = values.gamma;
        data.tonemapping = values.tonemapping;
        data.fog = values.fog;
        data.shadow_resolution = values.shadow_resolution;
        data.directional_light_intensity = directional_light_intensity;

        data.resolution_render = render.to_array();
        data.resolution_output = output.to_array();
        data.taa_jitter_offset = (jitter - self.jitter_previous).to_array();

        data.frame_mip_count = frame_mip_count as f32;
        data.ssr_mip_count = ssr_mip_count as f32;
        data.resolution_environment = resolution_environment;

        data.set_bit(frame_options::SSR, options.screen_space_reflections);
        data.set_bit(frame_options::TAA_UPSAMPLE, taa && options.upsample_taa);
        data.set_bit(frame_options::SSAO, options.ssao);
        data.set_bit(frame_options::SSAO_GI, options.ssao && values.ssao_gi());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halton_bases() {
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
        assert_eq!(halton(3, 2), 0.75);
        assert!((halton(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert!((halton(2, 3) - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_jitter_repeats_every_sequence() {
        assert_eq!(jitter_sample(3), jitter_sample(3 + TAA_JITTER_SAMPLES));
        assert_ne!(jitter_sample(0), jitter_sample(1));
        for frame in 0..TAA_JITTER_SAMPLES {
            let sample = jitter_sample(frame);
            assert!(sample.abs().max_element() <= 0.5);
        }
    }
}
