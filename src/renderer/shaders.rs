//! Shader table and lazy variant compilation

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{ShaderStage, VertexType};
use crate::rhi::{RhiContext, Shader, ShaderDefine};
use crate::scene::{LightType, MaterialFlags};

use super::constant_buffers::light_options;

macro_rules! shader_ids {
    ($($id:ident => ($stage:ident, $vertex:ident, $file:literal, [$($define:literal = $value:literal),*])),* $(,)?) => {
        /// Every shader the renderer knows about
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ShaderId {
            $($id,)*
        }

        impl ShaderId {
            pub const ALL: &'static [ShaderId] = &[$(ShaderId::$id,)*];

            pub fn stage(&self) -> ShaderStage {
                match self {
                    $(ShaderId::$id => ShaderStage::$stage,)*
                }
            }

            pub fn vertex_type(&self) -> VertexType {
                match self {
                    $(ShaderId::$id => VertexType::$vertex,)*
                }
            }

            /// Source file relative to the shader directory
            pub fn file_name(&self) -> &'static str {
                match self {
                    $(ShaderId::$id => $file,)*
                }
            }

            /// Defines the shader is always compiled with
            pub fn base_defines(&self) -> &'static [ShaderDefine] {
                match self {
                    $(ShaderId::$id => &[$(ShaderDefine { name: $define, value: $value }),*],)*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(ShaderId::$id => stringify!($id),)*
                }
            }
        }
    };
}

shader_ids! {
    // Vertex
    QuadV => (VERTEX, PosTex, "quad.wgsl", []),
    GbufferV => (VERTEX, PosTexNorTan, "g_buffer.wgsl", []),
    DepthLightV => (VERTEX, PosTexNorTan, "depth_light.wgsl", []),
    DepthPrepassV => (VERTEX, PosTexNorTan, "depth_prepass.wgsl", []),
    LinesV => (VERTEX, PosCol, "lines.wgsl", []),
    EntityV => (VERTEX, PosTexNorTan, "entity.wgsl", []),
    FontV => (VERTEX, PosTex, "font.wgsl", []),

    // Pixel
    DepthLightP => (PIXEL, Undefined, "depth_light.wgsl", []),
    DepthPrepassP => (PIXEL, Undefined, "depth_prepass.wgsl", []),
    GbufferP => (PIXEL, Undefined, "g_buffer.wgsl", []),
    CopyPointP => (PIXEL, Undefined, "copy.wgsl", []),
    CopyBilinearP => (PIXEL, Undefined, "copy.wgsl", ["BILINEAR" = 1]),
    IblP => (PIXEL, Undefined, "light_image_based.wgsl", []),
    LinesP => (PIXEL, Undefined, "lines.wgsl", []),
    OutlineP => (PIXEL, Undefined, "outline.wgsl", []),
    EntityP => (PIXEL, Undefined, "entity.wgsl", []),
    TextureP => (PIXEL, Undefined, "texture.wgsl", []),
    FontP => (PIXEL, Undefined, "font.wgsl", []),

    // Compute
    BrdfSpecularLutC => (COMPUTE, Undefined, "brdf_specular_lut.wgsl", []),
    SsaoC => (COMPUTE, Undefined, "ssao.wgsl", []),
    SsaoGiC => (COMPUTE, Undefined, "ssao.wgsl", ["SSAO_GI" = 1]),
    SsrC => (COMPUTE, Undefined, "ssr.wgsl", []),
    BlurGaussianC => (COMPUTE, Undefined, "blur.wgsl", []),
    BlurGaussianBilateralC => (COMPUTE, Undefined, "blur.wgsl", ["BILATERAL" = 1]),
    LightC => (COMPUTE, Undefined, "light.wgsl", []),
    CompositionC => (COMPUTE, Undefined, "light_composition.wgsl", []),
    CompositionTransparentC => (COMPUTE, Undefined, "light_composition.wgsl", ["TRANSPARENT" = 1]),
    SpdC => (COMPUTE, Undefined, "spd.wgsl", []),
    SpdLuminanceAntiflickerC => (COMPUTE, Undefined, "spd.wgsl", ["LUMINANCE_ANTIFLICKER" = 1]),
    DofDownsampleCocC => (COMPUTE, Undefined, "depth_of_field.wgsl", ["DOF_PASS" = 0]),
    DofBokehC => (COMPUTE, Undefined, "depth_of_field.wgsl", ["DOF_PASS" = 1]),
    DofTentC => (COMPUTE, Undefined, "depth_of_field.wgsl", ["DOF_PASS" = 2]),
    DofUpscaleBlendC => (COMPUTE, Undefined, "depth_of_field.wgsl", ["DOF_PASS" = 3]),
    TaaC => (COMPUTE, Undefined, "temporal_antialiasing.wgsl", []),
    FsrUpsampleC => (COMPUTE, Undefined, "fsr.wgsl", ["FSR_PASS" = 0]),
    FsrSharpenC => (COMPUTE, Undefined, "fsr.wgsl", ["FSR_PASS" = 1]),
    CopyPointC => (COMPUTE, Undefined, "copy.wgsl", []),
    CopyBilinearC => (COMPUTE, Undefined, "copy.wgsl", ["BILINEAR" = 1]),
    MotionBlurC => (COMPUTE, Undefined, "motion_blur.wgsl", []),
    BloomDownsampleLuminanceC => (COMPUTE, Undefined, "bloom.wgsl", ["BLOOM_PASS" = 0]),
    BloomDownsampleC => (COMPUTE, Undefined, "bloom.wgsl", ["BLOOM_PASS" = 1]),
    BloomUpsampleBlendMipC => (COMPUTE, Undefined, "bloom.wgsl", ["BLOOM_PASS" = 2]),
    BloomUpsampleBlendFrameC => (COMPUTE, Undefined, "bloom.wgsl", ["BLOOM_PASS" = 3]),
    CasC => (COMPUTE, Undefined, "cas.wgsl", []),
    ToneMappingC => (COMPUTE, Undefined, "tone_mapping.wgsl", []),
    FxaaC => (COMPUTE, Undefined, "fxaa.wgsl", []),
    DitheringC => (COMPUTE, Undefined, "dithering.wgsl", []),
    FilmGrainC => (COMPUTE, Undefined, "film_grain.wgsl", []),
    ChromaticAberrationC => (COMPUTE, Undefined, "chromatic_aberration.wgsl", []),
    GammaCorrectionC => (COMPUTE, Undefined, "gamma_correction.wgsl", []),
    DebugBufferC => (COMPUTE, Undefined, "debug_buffer.wgsl", []),
}

impl ShaderId {
    pub fn entry_point(&self) -> &'static str {
        let stage = self.stage();
        if stage == ShaderStage::VERTEX {
            "main_vs"
        } else if stage == ShaderStage::PIXEL {
            "main_ps"
        } else {
            "main_cs"
        }
    }
}

/// Provides WGSL source for a shader
pub trait ShaderSource: Send + Sync {
    fn load(&self, id: ShaderId) -> Option<String>;
}

/// Reads shader files from a directory
#[derive(Debug, Clone)]
pub struct DirectoryShaderSource {
    root: PathBuf,
}

impl DirectoryShaderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ShaderSource for DirectoryShaderSource {
    fn load(&self, id: ShaderId) -> Option<String> {
        let path = self.root.join(id.file_name());
        match std::fs::read_to_string(&path) {
            Ok(source) => Some(source),
            Err(e) => {
                log::warn!("Failed to read shader {}: {e}", path.display());
                None
            }
        }
    }
}

/// Defines of a light shader variant
pub fn light_variant_defines(bits: u32) -> Vec<ShaderDefine> {
    const DEFINES: [(u32, &str); 7] = [
        (light_options::DIRECTIONAL, "DIRECTIONAL"),
        (light_options::POINT, "POINT"),
        (light_options::SPOT, "SPOT"),
        (light_options::SHADOWS, "SHADOWS"),
        (light_options::SHADOWS_TRANSPARENT, "SHADOWS_TRANSPARENT"),
        (light_options::SHADOWS_SCREEN_SPACE, "SHADOWS_SCREEN_SPACE"),
        (light_options::VOLUMETRIC, "VOLUMETRIC"),
    ];
    DEFINES
        .iter()
        .map(|&(bit, name)| ShaderDefine::new(name, u32::from(bits & bit != 0)))
        .collect()
}

pub fn light_type_bit(light_type: LightType) -> u32 {
    match light_type {
        LightType::Directional => light_options::DIRECTIONAL,
        LightType::Point => light_options::POINT,
        LightType::Spot => light_options::SPOT,
    }
}

/// Defines of a G-buffer pixel shader variant
pub fn material_variant_defines(flags: MaterialFlags) -> Vec<ShaderDefine> {
    const DEFINES: [(MaterialFlags, &str); 8] = [
        (MaterialFlags::ALBEDO, "ALBEDO_MAP"),
        (MaterialFlags::ROUGHNESS, "ROUGHNESS_MAP"),
        (MaterialFlags::METALLIC, "METALLIC_MAP"),
        (MaterialFlags::NORMAL, "NORMAL_MAP"),
        (MaterialFlags::HEIGHT, "HEIGHT_MAP"),
        (MaterialFlags::OCCLUSION, "OCCLUSION_MAP"),
        (MaterialFlags::EMISSION, "EMISSION_MAP"),
        (MaterialFlags::ALPHA_MASK, "ALPHA_MASK_MAP"),
    ];
    DEFINES
        .iter()
        .map(|&(flag, name)| ShaderDefine::new(name, u32::from(flags.contains(flag))))
        .collect()
}

/// Compiled shaders keyed by id and variant bits.
///
/// Variants are compiled the first time they are asked for. A shader that
/// fails to load or compile is remembered and not retried.
pub struct ShaderLibrary {
    ctx: Arc<RhiContext>,
    source: Box<dyn ShaderSource>,
    shaders: HashMap<(ShaderId, u32), Arc<Shader>>,
    failed: HashSet<(ShaderId, u32)>,
    gbuffer_variants: BTreeMap<u32, Arc<Shader>>,
    compile_count: u64,
}

impl ShaderLibrary {
    pub fn new(ctx: &Arc<RhiContext>, source: Box<dyn ShaderSource>) -> Self {
        Self {
            ctx: ctx.clone(),
            source,
            shaders: HashMap::new(),
            failed: HashSet::new(),
            gbuffer_variants: BTreeMap::new(),
            compile_count: 0,
        }
    }

    /// Compile the base variant of every shader
    pub fn compile_all(&mut self) {
        for id in ShaderId::ALL {
            self.get(*id);
        }
        log::info!(
            "Compiled {} of {} shaders",
            self.shaders.len(),
            ShaderId::ALL.len()
        );
    }

    pub fn get(&mut self, id: ShaderId) -> Option<Arc<Shader>> {
        self.variant(id, 0, &[])
    }

    pub fn variant(&mut self, id: ShaderId, key: u32, defines: &[ShaderDefine]) -> Option<Arc<Shader>> {
        if let Some(shader) = self.shaders.get(&(id, key)) {
            return Some(shader.clone());
        }
        if self.failed.contains(&(id, key)) {
            return None;
        }

        let shader = self.compile(id, key, defines);
        match &shader {
            Some(shader) => {
                self.shaders.insert((id, key), shader.clone());
            }
            None => {
                self.failed.insert((id, key));
            }
        }
        shader
    }

    fn compile(&mut self, id: ShaderId, key: u32, defines: &[ShaderDefine]) -> Option<Arc<Shader>> {
        let source = self.source.load(id)?;
        let defines: Vec<ShaderDefine> = id.base_defines().iter().chain(defines).copied().collect();
        let name = if key == 0 {
            id.name().to_string()
        } else {
            format!("{}_{key:x}", id.name())
        };

        self.compile_count += 1;
        match Shader::compile(
            &self.ctx,
            &name,
            &source,
            id.stage(),
            id.entry_point(),
            id.vertex_type(),
            &defines,
        ) {
            Ok(shader) => Some(shader),
            Err(e) => {
                log::error!("Failed to compile {name}: {e}");
                None
            }
        }
    }

    /// G-buffer pixel shader for materials with exactly `flags`
    pub fn gbuffer_variant(&mut self, flags: MaterialFlags) -> Option<Arc<Shader>> {
        let shader = self.variant(ShaderId::GbufferP, flags.bits(), &material_variant_defines(flags))?;
        self.gbuffer_variants.insert(flags.bits(), shader.clone());
        Some(shader)
    }

    /// Variants compiled so far, ordered by material flags
    pub fn gbuffer_variants(&self) -> &BTreeMap<u32, Arc<Shader>> {
        &self.gbuffer_variants
    }

    pub fn light_variant(&mut self, bits: u32) -> Option<Arc<Shader>> {
        self.variant(ShaderId::LightC, bits, &light_variant_defines(bits))
    }

    /// Whether every listed shader compiled
    pub fn has(&mut self, ids: &[ShaderId]) -> bool {
        ids.iter().all(|id| self.get(*id).is_some())
    }

    pub fn compile_count(&self) -> u64 {
        self.compile_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_points_follow_stage() {
        assert_eq!(ShaderId::QuadV.entry_point(), "main_vs");
        assert_eq!(ShaderId::GbufferP.entry_point(), "main_ps");
        assert_eq!(ShaderId::SsaoC.entry_point(), "main_cs");
        assert_eq!(ShaderId::GbufferV.vertex_type(), VertexType::PosTexNorTan);
    }

    #[test]
    fn test_shared_files_differ_by_defines() {
        assert_eq!(ShaderId::SsaoC.file_name(), ShaderId::SsaoGiC.file_name());
        assert!(ShaderId::SsaoC.base_defines().is_empty());
        assert_eq!(ShaderId::SsaoGiC.base_defines(), &[ShaderDefine::new("SSAO_GI", 1)]);
    }

    #[test]
    fn test_light_variant_defines() {
        let defines = light_variant_defines(light_options::POINT | light_options::SHADOWS);
        let enabled: Vec<&str> = defines
            .iter()
            .filter(|define| define.value == 1)
            .map(|define| define.name)
            .collect();
        assert_eq!(enabled, ["POINT", "SHADOWS"]);
        assert_eq!(defines.len(), 7);
    }
}
