//! Renderer feature toggles and tunable values

/// Boolean renderer features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererOption {
    ReverseZ,
    DebugAabb,
    DebugGrid,
    DebugTransform,
    DebugSelectionOutline,
    DebugLights,
    DebugPerformanceMetrics,
    DebugPhysics,
    DebugWireframe,
    Bloom,
    VolumetricFog,
    AntiAliasingTaa,
    AntiAliasingFxaa,
    Ssao,
    ScreenSpaceShadows,
    ScreenSpaceReflections,
    MotionBlur,
    DepthOfField,
    FilmGrain,
    SharpeningCas,
    ChromaticAberration,
    Dithering,
    UpsampleTaa,
    UpsampleFsr,
    DepthPrepass,
}

/// Every feature as a plain boolean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererOptions {
    pub reverse_z: bool,
    pub debug_aabb: bool,
    pub debug_grid: bool,
    pub debug_transform: bool,
    pub debug_selection_outline: bool,
    pub debug_lights: bool,
    pub debug_performance_metrics: bool,
    pub debug_physics: bool,
    pub debug_wireframe: bool,
    pub bloom: bool,
    pub volumetric_fog: bool,
    pub anti_aliasing_taa: bool,
    pub anti_aliasing_fxaa: bool,
    pub ssao: bool,
    pub screen_space_shadows: bool,
    pub screen_space_reflections: bool,
    pub motion_blur: bool,
    pub depth_of_field: bool,
    pub film_grain: bool,
    pub sharpening_cas: bool,
    pub chromatic_aberration: bool,
    pub dithering: bool,
    pub upsample_taa: bool,
    pub upsample_fsr: bool,
    pub depth_prepass: bool,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            reverse_z: true,
            debug_aabb: false,
            debug_grid: true,
            debug_transform: true,
            debug_selection_outline: false,
            debug_lights: true,
            debug_performance_metrics: false,
            debug_physics: true,
            debug_wireframe: false,
            bloom: true,
            volumetric_fog: true,
            anti_aliasing_taa: true,
            anti_aliasing_fxaa: false,
            ssao: true,
            screen_space_shadows: true,
            screen_space_reflections: true,
            motion_blur: true,
            depth_of_field: false,
            film_grain: false,
            sharpening_cas: true,
            chromatic_aberration: false,
            dithering: false,
            upsample_taa: false,
            upsample_fsr: false,
            depth_prepass: false,
        }
    }
}

impl RendererOptions {
    /// Everything off, useful as a starting point for headless rendering
    pub fn none() -> Self {
        Self {
            reverse_z: false,
            debug_aabb: false,
            debug_grid: false,
            debug_transform: false,
            debug_selection_outline: false,
            debug_lights: false,
            debug_performance_metrics: false,
            debug_physics: false,
            debug_wireframe: false,
            bloom: false,
            volumetric_fog: false,
            anti_aliasing_taa: false,
            anti_aliasing_fxaa: false,
            ssao: false,
            screen_space_shadows: false,
            screen_space_reflections: false,
            motion_blur: false,
            depth_of_field: false,
            film_grain: false,
            sharpening_cas: false,
            chromatic_aberration: false,
            dithering: false,
            upsample_taa: false,
            upsample_fsr: false,
            depth_prepass: false,
        }
    }

    fn field(&mut self, option: RendererOption) -> &mut bool {
        match option {
            RendererOption::ReverseZ => &mut self.reverse_z,
            RendererOption::DebugAabb => &mut self.debug_aabb,
            RendererOption::DebugGrid => &mut self.debug_grid,
            RendererOption::DebugTransform => &mut self.debug_transform,
            RendererOption::DebugSelectionOutline => &mut self.debug_selection_outline,
            RendererOption::DebugLights => &mut self.debug_lights,
            RendererOption::DebugPerformanceMetrics => &mut self.debug_performance_metrics,
            RendererOption::DebugPhysics => &mut self.debug_physics,
            RendererOption::DebugWireframe => &mut self.debug_wireframe,
            RendererOption::Bloom => &mut self.bloom,
            RendererOption::VolumetricFog => &mut self.volumetric_fog,
            RendererOption::AntiAliasingTaa => &mut self.anti_aliasing_taa,
            RendererOption::AntiAliasingFxaa => &mut self.anti_aliasing_fxaa,
            RendererOption::Ssao => &mut self.ssao,
            RendererOption::ScreenSpaceShadows => &mut self.screen_space_shadows,
            RendererOption::ScreenSpaceReflections => &mut self.screen_space_reflections,
            RendererOption::MotionBlur => &mut self.motion_blur,
            RendererOption::DepthOfField => &mut self.depth_of_field,
            RendererOption::FilmGrain => &mut self.film_grain,
            RendererOption::SharpeningCas => &mut self.sharpening_cas,
            RendererOption::ChromaticAberration => &mut self.chromatic_aberration,
            RendererOption::Dithering => &mut self.dithering,
            RendererOption::UpsampleTaa => &mut self.upsample_taa,
            RendererOption::UpsampleFsr => &mut self.upsample_fsr,
            RendererOption::DepthPrepass => &mut self.depth_prepass,
        }
    }

    pub fn get(&self, option: RendererOption) -> bool {
        let mut copy = *self;
        *copy.field(option)
    }

    /// Returns whether the value changed
    pub fn set(&mut self, option: RendererOption, enabled: bool) -> bool {
        let field = self.field(option);
        let changed = *field != enabled;
        *field = enabled;
        changed
    }
}

/// Floating point renderer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionValue {
    Anisotropy,
    ShadowResolution,
    Tonemapping,
    Gamma,
    SharpenStrength,
    BloomIntensity,
    Fog,
    SsaoGi,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionValues {
    pub anisotropy: f32,
    pub shadow_resolution: f32,
    /// Tone mapping operator, 0 disables the pass
    pub tonemapping: f32,
    pub gamma: f32,
    pub sharpen_strength: f32,
    pub bloom_intensity: f32,
    pub fog: f32,
    /// Non-zero selects the SSAO variant with indirect lighting
    pub ssao_gi: f32,
}

impl Default for OptionValues {
    fn default() -> Self {
        Self {
            anisotropy: 16.0,
            shadow_resolution: 2048.0,
            tonemapping: 0.0,
            gamma: 2.2,
            sharpen_strength: 1.0,
            bloom_intensity: 0.2,
            fog: 0.03,
            ssao_gi: 1.0,
        }
    }
}

impl OptionValues {
    pub fn get(&self, option: OptionValue) -> f32 {
        match option {
            OptionValue::Anisotropy => self.anisotropy,
            OptionValue::ShadowResolution => self.shadow_resolution,
            OptionValue::Tonemapping => self.tonemapping,
            OptionValue::Gamma => self.gamma,
            OptionValue::SharpenStrength => self.sharpen_strength,
            OptionValue::BloomIntensity => self.bloom_intensity,
            OptionValue::Fog => self.fog,
            OptionValue::SsaoGi => self.ssao_gi,
        }
    }

    /// Returns whether the value changed
    pub fn set(&mut self, option: OptionValue, value: f32) -> bool {
        let field = match option {
            OptionValue::Anisotropy => &mut self.anisotropy,
            OptionValue::ShadowResolution => &mut self.shadow_resolution,
            OptionValue::Tonemapping => &mut self.tonemapping,
            OptionValue::Gamma => &mut self.gamma,
            OptionValue::SharpenStrength => &mut self.sharpen_strength,
            OptionValue::BloomIntensity => &mut self.bloom_intensity,
            OptionValue::Fog => &mut self.fog,
            OptionValue::SsaoGi => &mut self.ssao_gi,
        };
        let changed = *field != value;
        *field = value;
        changed
    }

    pub fn ssao_gi(&self) -> bool {
        self.ssao_gi != 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RendererOptions::default();
        assert!(options.get(RendererOption::ReverseZ));
        assert!(options.get(RendererOption::AntiAliasingTaa));
        assert!(!options.get(RendererOption::DepthOfField));
        assert!(!options.get(RendererOption::DepthPrepass));

        let values = OptionValues::default();
        assert_eq!(values.get(OptionValue::ShadowResolution), 2048.0);
        assert_eq!(values.get(OptionValue::Tonemapping), 0.0);
        assert!(values.ssao_gi());
    }

    #[test]
    fn test_set_reports_changes() {
        let mut options = RendererOptions::none();
        assert!(options.set(RendererOption::Bloom, true));
        assert!(!options.set(RendererOption::Bloom, true));
        assert!(options.bloom);

        let mut values = OptionValues::default();
        assert!(!values.set(OptionValue::Gamma, 2.2));
        assert!(values.set(OptionValue::Gamma, 1.8));
    }
}
