use std::sync::Arc;

use crate::backend::ImageLayout;
use crate::rhi::{CommandList, Texture};

use crate::renderer::resources::{srv, uav};
use crate::renderer::{RenderTarget, Renderer, ShaderId, MAX_MIPS};

/// Pixels covered by one group of the single pass downsampler
const SPD_TILE: u32 = 64;

impl Renderer {
    /// The split-sum lookup table never changes, so it renders once
    pub(super) fn pass_brdf_specular_lut(&mut self, cmd: &mut CommandList) {
        if self.brdf_lut_rendered {
            return;
        }
        let Some(lut) = self.target(RenderTarget::BrdfSpecularLut) else {
            return;
        };
        if !self.begin_compute(cmd, ShaderId::BrdfSpecularLutC) {
            return;
        }

        cmd.set_texture_uav(uav::RG, Some(&lut), None, false);
        let dispatched = self.dispatch_for(cmd, lut.width(), lut.height());
        cmd.end_render_pass();
        self.brdf_lut_rendered = dispatched;
    }

    pub(super) fn pass_generate_requested_mips(&mut self, cmd: &mut CommandList) {
        for texture in std::mem::take(&mut self.mip_requests) {
            self.pass_downsample(cmd, &texture, false);
            texture.set_layout(ImageLayout::ShaderReadOnly, cmd, None, false);
            self.mip_releases.push((self.frame_num, texture));
        }
    }

    /// Write mips 1.. of `texture` from mip 0 in a single dispatch
    pub(super) fn pass_downsample(&mut self, cmd: &mut CommandList, texture: &Arc<Texture>, luminance_antiflicker: bool) {
        let output_mips = texture.mip_count().saturating_sub(1).min(MAX_MIPS);
        if output_mips == 0 || !texture.has_per_mip_views() {
            return;
        }

        let id = if luminance_antiflicker {
            ShaderId::SpdLuminanceAntiflickerC
        } else {
            ShaderId::SpdC
        };
        if !self.begin_compute(cmd, id) {
            return;
        }

        // Atomic counter the last active group waits on
        if let Err(e) = self.resources.spd_counter.update(&[0u32]) {
            log::error!("Failed to reset the downsampler counter: {e}");
            cmd.end_render_pass();
            return;
        }

        let (width, height) = (texture.width(), texture.height());
        self.update_uber(cmd, |uber| {
            uber.resolution_rt = [width as f32, height as f32];
            uber.mip_index = output_mips;
        });
        cmd.set_structured_buffer(uav::SPD_COUNTER, &self.resources.spd_counter);
        cmd.set_texture(srv::TEX, Some(texture), Some(0), false);
        for mip in 0..output_mips {
            cmd.set_texture_uav(uav::MIPS + mip, Some(texture), Some(mip + 1), false);
        }
        cmd.dispatch(
            width.div_ceil(SPD_TILE),
            height.div_ceil(SPD_TILE),
            texture.array_length(),
        );
        cmd.end_render_pass();
    }

    /// Separable gaussian blur of `texture` (or one of its mips) in place,
    /// through a cached scratch texture of the same size
    pub(super) fn pass_blur_gaussian(
        &mut self,
        cmd: &mut CommandList,
        texture: &Arc<Texture>,
        bilateral: bool,
        sigma: f32,
        mip: Option<u32>,
    ) {
        let id = if bilateral {
            ShaderId::BlurGaussianBilateralC
        } else {
            ShaderId::BlurGaussianC
        };
        let Some(shader) = self.shaders.get(id) else {
            return;
        };

        let mip_index = mip.unwrap_or(0);
        let width = texture.mip_width(mip_index);
        let height = texture.mip_height(mip_index);
        let scratch = match self.targets.scratch(&self.ctx, texture.format(), width, height) {
            Ok(scratch) => scratch,
            Err(e) => {
                log::error!("Failed to create a blur scratch texture: {e}");
                return;
            }
        };
        let view_mip = mip.filter(|_| texture.has_per_mip_views());
        let depth = self.target(RenderTarget::GbufferDepth);
        let normal = self.target(RenderTarget::GbufferNormal);

        for (direction, input, output, input_mip, output_mip) in [
            ([1.0, 0.0], texture, &scratch, view_mip, None),
            ([0.0, 1.0], &scratch, texture, None, view_mip),
        ] {
            if !self.begin_compute_shader(cmd, shader.clone(), id.name()) {
                return;
            }
            self.update_uber(cmd, |uber| {
                uber.resolution_rt = [width as f32, height as f32];
                uber.blur_direction = direction;
                uber.blur_sigma = sigma;
                uber.blur_stride = 1.0;
                uber.mip_index = mip_index;
            });
            cmd.set_texture_uav(uav::RGBA, Some(output), output_mip, false);
            cmd.set_texture(srv::TEX, Some(input), input_mip, false);
            if bilateral {
                cmd.set_texture(srv::GBUFFER_DEPTH, depth.as_ref(), None, false);
                cmd.set_texture(srv::GBUFFER_NORMAL, normal.as_ref(), None, false);
            }
            let dispatched = self.dispatch_for(cmd, width, height);
            cmd.end_render_pass();
            if !dispatched {
                return;
            }
        }
    }

    pub(super) fn pass_ssao(&mut self, cmd: &mut CommandList) {
        let id = if self.values.ssao_gi() {
            ShaderId::SsaoGiC
        } else {
            ShaderId::SsaoC
        };
        let (Some(ssao), Some(depth), Some(normal), Some(frame)) = (
            self.target(RenderTarget::Ssao),
            self.target(RenderTarget::GbufferDepth),
            self.target(RenderTarget::GbufferNormal),
            self.target(RenderTarget::FrameRender),
        ) else {
            return;
        };
        if !self.begin_compute(cmd, id) {
            return;
        }

        let (width, height) = (ssao.width(), ssao.height());
        self.update_uber(cmd, |uber| uber.resolution_rt = [width as f32, height as f32]);
        cmd.set_texture_uav(uav::RGBA, Some(&ssao), None, false);
        cmd.set_texture(srv::GBUFFER_DEPTH, Some(&depth), None, false);
        cmd.set_texture(srv::GBUFFER_NORMAL, Some(&normal), None, false);
        // Indirect light bounces off the previous frame
        cmd.set_texture(srv::FRAME, Some(&frame), None, false);
        let dispatched = self.dispatch_for(cmd, width, height);
        cmd.end_render_pass();

        if dispatched {
            self.pass_blur_gaussian(cmd, &ssao, true, 2.0, None);
        }
    }

    pub(super) fn pass_ssr(&mut self, cmd: &mut CommandList) {
        let (Some(ssr), Some(frame), Some(depth), Some(normal), Some(material), Some(velocity)) = (
            self.target(RenderTarget::Ssr),
            self.target(RenderTarget::FrameRender),
            self.target(RenderTarget::GbufferDepth),
            self.target(RenderTarget::GbufferNormal),
            self.target(RenderTarget::GbufferMaterial),
            self.target(RenderTarget::GbufferVelocity),
        ) else {
            return;
        };
        if !self.begin_compute(cmd, ShaderId::SsrC) {
            return;
        }

        let (width, height) = (ssr.width(), ssr.height());
        self.update_uber(cmd, |uber| uber.resolution_rt = [width as f32, height as f32]);
        cmd.set_texture_uav(uav::RGBA, Some(&ssr), Some(0), false);
        cmd.set_texture(srv::FRAME, Some(&frame), None, false);
        cmd.set_texture(srv::GBUFFER_DEPTH, Some(&depth), None, false);
        cmd.set_texture(srv::GBUFFER_NORMAL, Some(&normal), None, false);
        cmd.set_texture(srv::GBUFFER_MATERIAL, Some(&material), None, false);
        cmd.set_texture(srv::GBUFFER_VELOCITY, Some(&velocity), None, false);
        let dispatched = self.dispatch_for(cmd, width, height);
        cmd.end_render_pass();
        if !dispatched {
            return;
        }

        // Rough surfaces sample the blurrier mips
        self.pass_downsample(cmd, &ssr, false);
        for mip in 1..ssr.mip_count() {
            self.pass_blur_gaussian(cmd, &ssr, true, 2.0, Some(mip));
        }
    }

    /// Copy the lit opaque frame into a blurred mip chain that
    /// transparent surfaces refract
    pub(super) fn pass_refraction_source(&mut self, cmd: &mut CommandList) {
        let (Some(render), Some(render2)) = (
            self.target(RenderTarget::FrameRender),
            self.target(RenderTarget::FrameRender2),
        ) else {
            return;
        };

        cmd.blit(&render, &render2, false);
        self.pass_downsample(cmd, &render2, true);
        for mip in 1..render2.mip_count() {
            self.pass_blur_gaussian(cmd, &render2, false, 2.0, Some(mip));
        }
    }
}
