use crate::rhi::CommandList;

use crate::renderer::constant_buffers::CbUber;
use crate::renderer::resources::{srv, uav};
use crate::renderer::{RenderTarget, Renderer, ShaderId};

/// Extra sampled inputs of a stage
type Inputs<'a> = &'a [(u32, RenderTarget)];

/// A pair of targets where a stage that ran makes its output the next input
#[derive(Debug, Clone, Copy)]
struct PingPong {
    input: RenderTarget,
    output: RenderTarget,
}

impl PingPong {
    fn new(input: RenderTarget, output: RenderTarget) -> Self {
        Self { input, output }
    }

    fn advance(&mut self, ran: bool) {
        if ran {
            std::mem::swap(&mut self.input, &mut self.output);
        }
    }
}

impl Renderer {
    /// Render resolution effects, upscaling to output resolution, then
    /// output resolution effects. Leaves the result in `FrameOutput`.
    pub(super) fn pass_post_process(&mut self, cmd: &mut CommandList) {
        let options = self.options;
        let values = self.values;
        let upscaling = self.resolution_output.x > self.resolution_render.x
            || self.resolution_output.y > self.resolution_render.y;

        let depth = (srv::GBUFFER_DEPTH, RenderTarget::GbufferDepth);
        let velocity = (srv::GBUFFER_VELOCITY, RenderTarget::GbufferVelocity);
        let mut render = PingPong::new(RenderTarget::FrameRender, RenderTarget::FrameRender2);

        if options.depth_of_field {
            let ran = self.pass_depth_of_field(cmd, render.input, render.output);
            render.advance(ran);
        }

        let mut upscaled = false;
        if options.anti_aliasing_taa {
            let taa_out = if options.upsample_taa && upscaling {
                RenderTarget::FrameOutput
            } else {
                render.output
            };
            let history = (srv::TEX2, RenderTarget::TaaHistory);
            if self.pass_stage(cmd, ShaderId::TaaC, render.input, taa_out, &[history, depth, velocity], |_| {}) {
                self.copy_to_history(cmd, taa_out);
                if taa_out == RenderTarget::FrameOutput {
                    upscaled = true;
                } else {
                    render.advance(true);
                }
            }
        }

        if !upscaled && options.upsample_fsr && upscaling {
            let sharpness = values.sharpen_strength;
            upscaled = self.pass_stage(cmd, ShaderId::FsrUpsampleC, render.input, RenderTarget::FsrScratch, &[], |_| {})
                && self.pass_stage(
                    cmd,
                    ShaderId::FsrSharpenC,
                    RenderTarget::FsrScratch,
                    RenderTarget::FrameOutput,
                    &[],
                    |uber| uber.blur_sigma = sharpness,
                );
        }

        if !upscaled {
            let id = if self.resolution_output == self.resolution_render {
                ShaderId::CopyPointC
            } else {
                ShaderId::CopyBilinearC
            };
            self.pass_stage(cmd, id, render.input, RenderTarget::FrameOutput, &[], |_| {});
        }

        let mut output = PingPong::new(RenderTarget::FrameOutput, RenderTarget::FrameOutput2);
        let stage = |renderer: &mut Self, cmd: &mut CommandList, id: ShaderId, inputs: Inputs, output: &mut PingPong| {
            let ran = renderer.pass_stage(cmd, id, output.input, output.output, inputs, |_| {});
            output.advance(ran);
        };

        if options.motion_blur {
            stage(self, cmd, ShaderId::MotionBlurC, &[depth, velocity], &mut output);
        }
        if options.bloom {
            let ran = self.pass_bloom(cmd, output.input, output.output);
            output.advance(ran);
        }
        // FSR sharpens on its own
        if options.sharpening_cas && !(options.upsample_fsr && upscaled) {
            stage(self, cmd, ShaderId::CasC, &[], &mut output);
        }
        if values.tonemapping != 0.0 {
            stage(self, cmd, ShaderId::ToneMappingC, &[], &mut output);
        }
        if options.anti_aliasing_fxaa {
            stage(self, cmd, ShaderId::FxaaC, &[], &mut output);
        }
        if options.dithering {
            stage(self, cmd, ShaderId::DitheringC, &[], &mut output);
        }
        if options.film_grain {
            stage(self, cmd, ShaderId::FilmGrainC, &[], &mut output);
        }
        if options.chromatic_aberration {
            stage(self, cmd, ShaderId::ChromaticAberrationC, &[], &mut output);
        }
        stage(self, cmd, ShaderId::GammaCorrectionC, &[], &mut output);

        if output.input != RenderTarget::FrameOutput {
            self.targets.swap(RenderTarget::FrameOutput, RenderTarget::FrameOutput2);
        }
    }

    /// One full screen compute stage reading `input` and writing `output`
    fn pass_stage(
        &mut self,
        cmd: &mut CommandList,
        id: ShaderId,
        input: RenderTarget,
        output: RenderTarget,
        inputs: Inputs,
        configure: impl FnOnce(&mut CbUber),
    ) -> bool {
        let (Some(input), Some(output)) = (self.target(input), self.target(output)) else {
            return false;
        };
        if !self.begin_compute(cmd, id) {
            return false;
        }

        let (width, height) = (output.width(), output.height());
        self.update_uber(cmd, |uber| {
            uber.resolution_rt = [width as f32, height as f32];
            configure(uber);
        });
        cmd.set_texture_uav(uav::RGBA, Some(&output), None, false);
        cmd.set_texture(srv::TEX, Some(&input), None, false);
        for (slot, target) in inputs {
            cmd.set_texture(*slot, self.targets.get(*target), None, false);
        }

        let dispatched = self.dispatch_for(cmd, width, height);
        cmd.end_render_pass();
        dispatched
    }

    fn copy_to_history(&mut self, cmd: &mut CommandList, source: RenderTarget) {
        let (Some(source), Some(history)) = (self.target(source), self.target(RenderTarget::TaaHistory)) else {
            return;
        };
        if source.width() != history.width() || source.height() != history.height() {
            log::warn!("{} doesn't match the TAA history size", source.name());
            return;
        }
        cmd.blit(&source, &history, false);
    }

    fn pass_depth_of_field(&mut self, cmd: &mut CommandList, input: RenderTarget, output: RenderTarget) -> bool {
        let depth = (srv::GBUFFER_DEPTH, RenderTarget::GbufferDepth);
        self.pass_stage(cmd, ShaderId::DofDownsampleCocC, input, RenderTarget::DofHalf, &[depth], |_| {})
            && self.pass_stage(cmd, ShaderId::DofBokehC, RenderTarget::DofHalf, RenderTarget::DofHalf2, &[], |_| {})
            && self.pass_stage(cmd, ShaderId::DofTentC, RenderTarget::DofHalf2, RenderTarget::DofHalf, &[], |_| {})
            && self.pass_stage(
                cmd,
                ShaderId::DofUpscaleBlendC,
                input,
                output,
                &[(srv::TEX2, RenderTarget::DofHalf), depth],
                |_| {},
            )
    }

    /// Luminance downsample into the bloom chain, blur it back up and blend
    /// it over the frame
    fn pass_bloom(&mut self, cmd: &mut CommandList, input: RenderTarget, output: RenderTarget) -> bool {
        let (Some(source), Some(bloom), Some(destination)) = (
            self.target(input),
            self.target(RenderTarget::Bloom),
            self.target(output),
        ) else {
            return false;
        };
        let per_mip = bloom.has_per_mip_views();
        let mips = if per_mip { bloom.mip_count() } else { 1 };
        let view = |mip: u32| per_mip.then_some(mip);

        // Bright pass into mip 0
        if !self.begin_compute(cmd, ShaderId::BloomDownsampleLuminanceC) {
            return false;
        }
        let (width, height) = (bloom.mip_width(0), bloom.mip_height(0));
        self.update_uber(cmd, |uber| uber.resolution_rt = [width as f32, height as f32]);
        cmd.set_texture_uav(uav::RGBA, Some(&bloom), view(0), false);
        cmd.set_texture(srv::TEX, Some(&source), None, false);
        let mut ok = self.dispatch_for(cmd, width, height);
        cmd.end_render_pass();

        let mut mip_step = |renderer: &mut Self, cmd: &mut CommandList, id: ShaderId, from: u32, to: u32| {
            if !ok || !renderer.begin_compute(cmd, id) {
                ok = false;
                return;
            }
            let (width, height) = (bloom.mip_width(to), bloom.mip_height(to));
            renderer.update_uber(cmd, |uber| {
                uber.resolution_rt = [width as f32, height as f32];
                uber.mip_index = to;
            });
            cmd.set_texture_uav(uav::RGBA, Some(&bloom), view(to), false);
            cmd.set_texture(srv::TEX, Some(&bloom), view(from), false);
            ok = renderer.dispatch_for(cmd, width, height);
            cmd.end_render_pass();
        };

        for mip in 1..mips {
            mip_step(self, cmd, ShaderId::BloomDownsampleC, mip - 1, mip);
        }
        for mip in (1..mips).rev() {
            mip_step(self, cmd, ShaderId::BloomUpsampleBlendMipC, mip, mip - 1);
        }
        if !ok {
            return false;
        }

        if !self.begin_compute(cmd, ShaderId::BloomUpsampleBlendFrameC) {
            return false;
        }
        let (width, height) = (destination.width(), destination.height());
        self.update_uber(cmd, |uber| uber.resolution_rt = [width as f32, height as f32]);
        cmd.set_texture_uav(uav::RGBA, Some(&destination), None, false);
        cmd.set_texture(srv::TEX, Some(&source), None, false);
        cmd.set_texture(srv::TEX2, Some(&bloom), view(0), false);
        let dispatched = self.dispatch_for(cmd, width, height);
        cmd.end_render_pass();
        dispatched
    }
}
