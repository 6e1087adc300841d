//! Persistent render targets

use std::collections::HashMap;
use std::sync::Arc;

use glam::UVec2;

use crate::backend::{RhiResult, TextureFormat};
use crate::rhi::{mip_count_for, RhiContext, Texture, TextureFlags, TextureInfo};

/// Upper bound of generated mips for frame and reflection targets
pub const MAX_MIPS: u32 = 12;

/// Side of the BRDF specular lookup table
pub const BRDF_LUT_SIZE: u32 = 400;

macro_rules! render_targets {
    ($($name:ident),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum RenderTarget {
            $($name,)*
        }

        impl RenderTarget {
            pub const ALL: &'static [RenderTarget] = &[$(RenderTarget::$name,)*];
            pub const COUNT: usize = Self::ALL.len();

            pub fn name(&self) -> &'static str {
                match self {
                    $(RenderTarget::$name => stringify!($name),)*
                }
            }
        }
    };
}

render_targets! {
    GbufferAlbedo,
    GbufferNormal,
    GbufferMaterial,
    GbufferVelocity,
    GbufferDepth,
    BrdfSpecularLut,
    LightDiffuse,
    LightDiffuseTransparent,
    LightSpecular,
    LightSpecularTransparent,
    LightVolumetric,
    FrameRender,
    FrameRender2,
    FrameOutput,
    FrameOutput2,
    DofHalf,
    DofHalf2,
    Ssao,
    Ssr,
    Bloom,
    TaaHistory,
    FsrScratch,
}

/// Which resolution change recreates a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetCategory {
    /// Sized by the render resolution
    Render,
    /// Sized by the output resolution
    Output,
    /// Never resized
    Fixed,
    /// Depends on the active upsampling mode
    Dynamic,
}

impl RenderTarget {
    pub fn category(&self) -> TargetCategory {
        match self {
            RenderTarget::BrdfSpecularLut => TargetCategory::Fixed,
            RenderTarget::FrameOutput | RenderTarget::FrameOutput2 | RenderTarget::Bloom => {
                TargetCategory::Output
            }
            RenderTarget::TaaHistory | RenderTarget::FsrScratch => TargetCategory::Dynamic,
            _ => TargetCategory::Render,
        }
    }

    fn info(&self, render: UVec2, output: UVec2, upsample_taa: bool) -> TextureInfo {
        use TextureFlags as F;

        let rt = F::RENDER_TARGET | F::SRV;
        let storage = F::UAV | F::SRV;
        let half = (render / 2).max(UVec2::ONE);
        let name = self.name();

        let (size, format, flags, mips) = match self {
            RenderTarget::GbufferAlbedo | RenderTarget::GbufferMaterial => {
                (render, TextureFormat::Rgba8Unorm, rt, 1)
            }
            RenderTarget::GbufferNormal => (render, TextureFormat::Rgba16Float, rt, 1),
            RenderTarget::GbufferVelocity => (render, TextureFormat::Rg16Float, rt, 1),
            RenderTarget::GbufferDepth => (
                render,
                TextureFormat::Depth32Float,
                F::DEPTH_STENCIL | F::SRV,
                1,
            ),
            RenderTarget::BrdfSpecularLut => (
                UVec2::splat(BRDF_LUT_SIZE),
                TextureFormat::Rg16Float,
                storage,
                1,
            ),
            RenderTarget::LightDiffuse
            | RenderTarget::LightDiffuseTransparent
            | RenderTarget::LightSpecular
            | RenderTarget::LightSpecularTransparent
            | RenderTarget::LightVolumetric
            | RenderTarget::Ssao => (render, TextureFormat::Rgba16Float, storage, 1),
            RenderTarget::FrameRender => (render, TextureFormat::Rgba16Float, rt | F::UAV, 1),
            RenderTarget::FrameRender2 => (
                render,
                TextureFormat::Rgba16Float,
                rt | F::UAV | F::PER_MIP_VIEWS,
                capped_mips(render),
            ),
            RenderTarget::FrameOutput | RenderTarget::FrameOutput2 => {
                (output, TextureFormat::Rgba16Float, rt | F::UAV, 1)
            }
            RenderTarget::DofHalf | RenderTarget::DofHalf2 => {
                (half, TextureFormat::Rgba16Float, storage, 1)
            }
            RenderTarget::Ssr => (
                render,
                TextureFormat::Rgba16Float,
                storage | F::PER_MIP_VIEWS,
                capped_mips(render),
            ),
            RenderTarget::Bloom => (
                output,
                TextureFormat::Rgba16Float,
                storage | F::PER_MIP_VIEWS,
                capped_mips(output),
            ),
            RenderTarget::TaaHistory => (
                if upsample_taa { output } else { render },
                TextureFormat::Rgba16Float,
                storage,
                1,
            ),
            RenderTarget::FsrScratch => (output, TextureFormat::Rgba16Float, storage, 1),
        };

        TextureInfo::new(name, size.x, size.y, format)
            .with_flags(flags)
            .with_mips(mips)
    }
}

fn capped_mips(size: UVec2) -> u32 {
    mip_count_for(size.x, size.y).min(MAX_MIPS)
}

/// The render target array plus scratch textures for separable blurs
pub struct RenderTargets {
    targets: Vec<Option<Arc<Texture>>>,
    scratch: HashMap<(TextureFormat, u32, u32), Arc<Texture>>,
    recreation_count: u64,
}

impl Default for RenderTargets {
    fn default() -> Self {
        Self {
            targets: vec![None; RenderTarget::COUNT],
            scratch: HashMap::new(),
            recreation_count: 0,
        }
    }
}

impl RenderTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recreate every target of the given categories
    pub fn create(
        &mut self,
        ctx: &RhiContext,
        categories: &[TargetCategory],
        render: UVec2,
        output: UVec2,
        upsample_taa: bool,
    ) -> RhiResult<()> {
        if render.min_element() == 0 || output.min_element() == 0 {
            log::warn!("Skipping render target creation for an empty resolution");
            return Ok(());
        }

        for target in RenderTarget::ALL {
            if !categories.contains(&target.category()) {
                continue;
            }
            // Fixed targets survive later calls
            if target.category() == TargetCategory::Fixed && self.get(*target).is_some() {
                continue;
            }
            let texture = Texture::new(ctx, target.info(render, output, upsample_taa))?;
            self.targets[*target as usize] = Some(texture);
        }

        self.scratch.clear();
        self.recreation_count += 1;
        log::debug!(
            "Render targets {:?} created at {}x{} (output {}x{})",
            categories,
            render.x,
            render.y,
            output.x,
            output.y
        );
        Ok(())
    }

    pub fn get(&self, target: RenderTarget) -> Option<&Arc<Texture>> {
        self.targets[target as usize].as_ref()
    }

    /// Exchange two targets, used to ping-pong between post-process stages
    pub fn swap(&mut self, a: RenderTarget, b: RenderTarget) {
        self.targets.swap(a as usize, b as usize);
    }

    /// Cached single-mip storage texture for intermediate blur results
    pub fn scratch(
        &mut self,
        ctx: &RhiContext,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> RhiResult<Arc<Texture>> {
        if let Some(texture) = self.scratch.get(&(format, width, height)) {
            return Ok(texture.clone());
        }
        let texture = Texture::new(
            ctx,
            TextureInfo::new(format!("blur_scratch_{width}x{height}"), width, height, format)
                .with_flags(TextureFlags::UAV | TextureFlags::SRV),
        )?;
        self.scratch.insert((format, width, height), texture.clone());
        Ok(texture)
    }

    /// How many times targets have been recreated
    pub fn recreation_count(&self) -> u64 {
        self.recreation_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(RenderTarget::BrdfSpecularLut.category(), TargetCategory::Fixed);
        assert_eq!(RenderTarget::FrameOutput.category(), TargetCategory::Output);
        assert_eq!(RenderTarget::TaaHistory.category(), TargetCategory::Dynamic);
        assert_eq!(RenderTarget::GbufferDepth.category(), TargetCategory::Render);
    }

    #[test]
    fn test_taa_history_follows_upsampling() {
        let render = UVec2::new(960, 540);
        let output = UVec2::new(1920, 1080);
        let info = RenderTarget::TaaHistory.info(render, output, true);
        assert_eq!((info.width, info.height), (1920, 1080));
        let info = RenderTarget::TaaHistory.info(render, output, false);
        assert_eq!((info.width, info.height), (960, 540));
    }

    #[test]
    fn test_mip_chains_are_capped() {
        let size = UVec2::new(8192, 8192);
        let info = RenderTarget::Ssr.info(size, size, false);
        assert_eq!(info.mip_count, MAX_MIPS);
        assert!(info.flags.contains(TextureFlags::PER_MIP_VIEWS));
    }
}
