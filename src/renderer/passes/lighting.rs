use std::f32::consts::PI;

use crate::backend::ClearValue;
use crate::rhi::CommandList;
use crate::scene::{FrameSnapshot, Light, LightType, SnapshotEntity};

use crate::renderer::constant_buffers::light_options;
use crate::renderer::resources::{srv, uav};
use crate::renderer::shaders::light_type_bit;
use crate::renderer::{RenderTarget, Renderer, ShaderId};

impl Renderer {
    /// Variant bits for `light` given the shadow maps and options in effect
    fn light_variant_bits(&self, entity: &SnapshotEntity, light: &Light, is_transparent: bool) -> u32 {
        let mut bits = light_type_bit(light.light_type);
        let has_shadow_map = light.casts_shadows() && self.shadow_maps.contains_key(&entity.id);
        if has_shadow_map {
            bits |= light_options::SHADOWS;
            if light.shadows_transparent {
                bits |= light_options::SHADOWS_TRANSPARENT;
            }
        }
        if light.shadows_screen_space && self.options.screen_space_shadows {
            bits |= light_options::SHADOWS_SCREEN_SPACE;
        }
        if light.volumetric && self.options.volumetric_fog && !is_transparent {
            bits |= light_options::VOLUMETRIC;
        }
        bits
    }

    fn update_light_buffer(
        &mut self,
        cmd: &mut CommandList,
        entity: &SnapshotEntity,
        light: &Light,
        bits: u32,
        exposure: f32,
        camera_position: glam::Vec3,
    ) {
        let reverse_z = self.options.reverse_z;
        let intensity = light.intensity * exposure;
        // Luminous power to intensity, scaled into the shader's range
        let intensity = match light.light_type {
            LightType::Directional => intensity,
            LightType::Point => intensity / (4.0 * PI) * 255.0,
            LightType::Spot => intensity / PI * 255.0,
        };
        let bias = if reverse_z { light.bias } else { -light.bias };

        let data = &mut self.resources.cb_light.data;
        data.view_projection = light.view_projections(&entity.transform, camera_position, reverse_z);
        data.intensity_range_angle_bias = [intensity, light.range, light.angle, bias];
        data.color = light.color.to_array();
        data.normal_bias = light.normal_bias;
        data.position = entity.transform.position.to_array();
        data.options = bits;
        data.direction = entity.transform.forward().to_array();
        data.shadow_array_length = light.shadow_array_length();
        self.resources.cb_light.update(cmd);
    }

    /// Accumulate diffuse, specular and volumetric light, one dispatch per light
    pub(super) fn pass_light(&mut self, cmd: &mut CommandList, snapshot: &FrameSnapshot, is_transparent: bool) {
        if snapshot.lights().is_empty() {
            return;
        }

        let (diffuse, specular) = if is_transparent {
            (RenderTarget::LightDiffuseTransparent, RenderTarget::LightSpecularTransparent)
        } else {
            (RenderTarget::LightDiffuse, RenderTarget::LightSpecular)
        };
        let (Some(diffuse), Some(specular), Some(volumetric)) = (
            self.target(diffuse),
            self.target(specular),
            self.target(RenderTarget::LightVolumetric),
        ) else {
            return;
        };
        let (Some(albedo), Some(normal), Some(material), Some(depth), Some(ssao)) = (
            self.target(RenderTarget::GbufferAlbedo),
            self.target(RenderTarget::GbufferNormal),
            self.target(RenderTarget::GbufferMaterial),
            self.target(RenderTarget::GbufferDepth),
            self.target(RenderTarget::Ssao),
        ) else {
            return;
        };

        let black = ClearValue::Color([0.0; 4]);
        cmd.clear_render_target(Some(&diffuse), black);
        cmd.clear_render_target(Some(&specular), black);
        if !is_transparent {
            cmd.clear_render_target(Some(&volumetric), black);
        }

        let exposure = snapshot
            .camera()
            .and_then(|camera| camera.camera.as_ref())
            .map_or(1.0, |camera| camera.exposure());
        let camera_position = snapshot.camera_position();
        let (width, height) = (diffuse.width(), diffuse.height());

        for &index in snapshot.lights() {
            let entity = snapshot.entity(index);
            let Some(light) = &entity.light else {
                continue;
            };
            if light.intensity == 0.0 {
                continue;
            }

            let bits = self.light_variant_bits(entity, light, is_transparent);
            let Some(shader) = self.shaders.light_variant(bits) else {
                continue;
            };
            if !self.begin_compute_shader(cmd, shader, ShaderId::LightC.name()) {
                continue;
            }

            self.update_light_buffer(cmd, entity, light, bits, exposure, camera_position);
            self.resources.cb_material.update(cmd);
            self.update_uber(cmd, |uber| {
                uber.resolution_rt = [width as f32, height as f32];
                uber.is_transparent_pass = u32::from(is_transparent);
            });

            cmd.set_texture_uav(uav::RGB, Some(&diffuse), None, false);
            cmd.set_texture_uav(uav::RGB2, Some(&specular), None, false);
            cmd.set_texture_uav(uav::RGB3, Some(&volumetric), None, false);
            cmd.set_texture(srv::GBUFFER_ALBEDO, Some(&albedo), None, false);
            cmd.set_texture(srv::GBUFFER_NORMAL, Some(&normal), None, false);
            cmd.set_texture(srv::GBUFFER_MATERIAL, Some(&material), None, false);
            cmd.set_texture(srv::GBUFFER_DEPTH, Some(&depth), None, false);
            cmd.set_texture(srv::SSAO, Some(&ssao), None, false);

            if let Some(shadow_map) = self.shadow_maps.get(&entity.id) {
                let (depth_slot, color_slot) = match shadow_map.light_type {
                    LightType::Directional => (srv::SHADOW_DEPTH_ARRAY, srv::SHADOW_COLOR_ARRAY),
                    LightType::Point => (srv::SHADOW_DEPTH_CUBE, srv::SHADOW_COLOR_CUBE),
                    LightType::Spot => (srv::SHADOW_DEPTH, srv::SHADOW_COLOR),
                };
                cmd.set_texture(depth_slot, Some(&shadow_map.depth), None, false);
                cmd.set_texture(color_slot, Some(&shadow_map.color), None, false);
            }

            self.dispatch_for(cmd, width, height);
            cmd.end_render_pass();
        }
    }

    /// Combine the G-buffer with the accumulated light into the frame
    pub(super) fn pass_light_composition(&mut self, cmd: &mut CommandList, is_transparent: bool) {
        let id = if is_transparent {
            ShaderId::CompositionTransparentC
        } else {
            ShaderId::CompositionC
        };
        let (diffuse, specular) = if is_transparent {
            (RenderTarget::LightDiffuseTransparent, RenderTarget::LightSpecularTransparent)
        } else {
            (RenderTarget::LightDiffuse, RenderTarget::LightSpecular)
        };
        let Some(frame) = self.target(RenderTarget::FrameRender) else {
            return;
        };
        if !self.begin_compute(cmd, id) {
            return;
        }

        let (width, height) = (frame.width(), frame.height());
        self.update_uber(cmd, |uber| {
            uber.resolution_rt = [width as f32, height as f32];
            uber.is_transparent_pass = u32::from(is_transparent);
        });

        cmd.set_texture_uav(uav::RGBA, Some(&frame), None, false);
        for (slot, target) in [
            (srv::GBUFFER_ALBEDO, RenderTarget::GbufferAlbedo),
            (srv::GBUFFER_NORMAL, RenderTarget::GbufferNormal),
            (srv::GBUFFER_MATERIAL, RenderTarget::GbufferMaterial),
            (srv::GBUFFER_DEPTH, RenderTarget::GbufferDepth),
            (srv::LIGHT_DIFFUSE, diffuse),
            (srv::LIGHT_SPECULAR, specular),
            (srv::LIGHT_VOLUMETRIC, RenderTarget::LightVolumetric),
            (srv::SSR, RenderTarget::Ssr),
            (srv::SSAO, RenderTarget::Ssao),
        ] {
            cmd.set_texture(slot, self.targets.get(target), None, false);
        }
        cmd.set_texture(srv::ENVIRONMENT, self.environment.as_ref(), None, false);
        if is_transparent {
            cmd.set_texture(srv::FRAME, self.targets.get(RenderTarget::FrameRender2), None, false);
        }

        self.dispatch_for(cmd, width, height);
        cmd.end_render_pass();
    }

    /// Additive environment lighting drawn as a screen quad
    pub(super) fn pass_light_image_based(&mut self, cmd: &mut CommandList, is_transparent: bool) {
        let (Some(vertex), Some(pixel), Some(frame)) = (
            self.shaders.get(ShaderId::QuadV),
            self.shaders.get(ShaderId::IblP),
            self.target(RenderTarget::FrameRender),
        ) else {
            return;
        };

        let pso = &mut self.states.image_based_light;
        pso.shader_vertex = Some(vertex);
        pso.shader_pixel = Some(pixel);
        pso.render_target_color_textures = Default::default();
        pso.render_target_color_textures[0] = Some(frame.clone());
        pso.reset_clear_values();

        if !self.resources.begin_pass(cmd, &self.states.image_based_light) {
            return;
        }

        let transform = self.resources.cb_frame.data.view_projection_ortho;
        self.update_uber(cmd, |uber| {
            uber.transform = transform;
            uber.resolution_rt = [frame.width() as f32, frame.height() as f32];
            uber.is_transparent_pass = u32::from(is_transparent);
        });
        for (slot, target) in [
            (srv::GBUFFER_ALBEDO, RenderTarget::GbufferAlbedo),
            (srv::GBUFFER_NORMAL, RenderTarget::GbufferNormal),
            (srv::GBUFFER_MATERIAL, RenderTarget::GbufferMaterial),
            (srv::GBUFFER_DEPTH, RenderTarget::GbufferDepth),
            (srv::SSR, RenderTarget::Ssr),
            (srv::SSAO, RenderTarget::Ssao),
            (srv::LUT_IBL, RenderTarget::BrdfSpecularLut),
        ] {
            cmd.set_texture(slot, self.targets.get(target), None, false);
        }
        cmd.set_texture(srv::ENVIRONMENT, self.environment.as_ref(), None, false);

        self.draw_quad(cmd);
        cmd.end_render_pass();
    }
}
