//! Deferred renderer frame core
//!
//! [`Renderer`] owns every per-frame resource and runs on a single render
//! thread. Each [`Renderer::tick`] services pending flushes, resizes the
//! swapchain, records the whole pass graph into the next command list and
//! presents.

mod config;
mod constant_buffers;
mod flush;
mod frame;
mod lines;
mod options;
mod pass_states;
mod passes;
mod render_targets;
mod resources;
mod shaders;

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};

use crate::backend::{GpuDevice, RhiResult, TextureFormat};
use crate::rhi::{CommandList, RhiContext, SwapChain, Texture, TextureFlags, TextureInfo, VertexBuffer};
use crate::scene::{BoundingBox, EntityDesc, FrameSnapshot, Geometry, LightType, Material};
use crate::window::WindowState;

pub use config::RendererConfig;
pub use constant_buffers::{
    frame_options, light_options, slot, CbFrame, CbLight, CbMaterial, CbUber, ConstantData,
    DynamicBuffer, MaterialEntry,
};
pub use flush::{FlushHandle, FlushRendezvous, FLUSH_WAIT_INTERVAL};
pub use frame::{halton, jitter_sample, TAA_JITTER_SAMPLES};
pub use lines::LineRenderer;
pub use options::{OptionValue, OptionValues, RendererOption, RendererOptions};
pub use pass_states::{FixedStates, PassStates};
pub use render_targets::{RenderTarget, RenderTargets, TargetCategory, BRDF_LUT_SIZE, MAX_MIPS};
pub use resources::{
    grid_vertices, quad_data, sampler_slot, srv, uav, DefaultTextures, GlobalResources,
    Samplers, ScreenQuad, GRID_HALF_EXTENT,
};
pub use shaders::{
    light_type_bit, light_variant_defines, material_variant_defines, DirectoryShaderSource,
    ShaderId, ShaderLibrary, ShaderSource,
};

/// Channel bits of the render target visualizer
pub mod debug_channel {
    pub const HAS_UAV: u32 = 1 << 0;
    pub const PACK: u32 = 1 << 1;
    pub const GAMMA_CORRECT: u32 = 1 << 2;
    pub const BOOST: u32 = 1 << 3;
    pub const ABS: u32 = 1 << 4;
    pub const CHANNEL_R: u32 = 1 << 5;
    pub const CHANNEL_A: u32 = 1 << 6;
    pub const CHANNEL_RG: u32 = 1 << 7;
    pub const CHANNEL_RGB: u32 = 1 << 8;
}

/// Smallest accepted shadow map side
pub const SHADOW_RESOLUTION_MIN: u32 = 128;

/// Shadow depth and transparent shadow colour of one light
#[derive(Clone)]
pub struct ShadowMap {
    pub light_type: LightType,
    pub resolution: u32,
    pub depth: Arc<Texture>,
    /// White where nothing transparent occludes the light
    pub color: Arc<Texture>,
    color_cleared: bool,
}

impl ShadowMap {
    fn new(ctx: &RhiContext, entity_id: u64, light_type: LightType, resolution: u32) -> RhiResult<Self> {
        let (array_length, cube) = match light_type {
            LightType::Directional => (crate::scene::CASCADE_EXTENTS.len() as u32, TextureFlags::empty()),
            LightType::Point => (6, TextureFlags::CUBE),
            LightType::Spot => (1, TextureFlags::empty()),
        };

        let depth = Texture::new(
            ctx,
            TextureInfo::new(
                format!("shadow_depth_{entity_id}"),
                resolution,
                resolution,
                TextureFormat::Depth32Float,
            )
            .with_flags(TextureFlags::DEPTH_STENCIL | TextureFlags::SRV | cube)
            .with_array_length(array_length),
        )?;
        let color = Texture::new(
            ctx,
            TextureInfo::new(
                format!("shadow_color_{entity_id}"),
                resolution,
                resolution,
                TextureFormat::Rgba8Unorm,
            )
            .with_flags(TextureFlags::RENDER_TARGET | TextureFlags::SRV | cube)
            .with_array_length(array_length),
        )?;

        Ok(Self {
            light_type,
            resolution,
            depth,
            color,
            color_cleared: false,
        })
    }
}

/// A mesh drawn on top of the frame, like a transform handle axis
#[derive(Clone)]
pub struct OverlayMesh {
    pub geometry: Arc<Geometry>,
    pub transform: Mat4,
    pub color: Vec4,
}

/// A line of on-screen text in pixels from the top left corner
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub text: String,
    pub position: Vec2,
    pub color: Vec4,
}

struct RenderTargetDebug {
    target: RenderTarget,
    channels: u32,
}

pub struct Renderer {
    ctx: Arc<RhiContext>,
    config: RendererConfig,
    options: RendererOptions,
    values: OptionValues,

    swapchain: SwapChain,
    command_lists: Vec<Option<CommandList>>,
    cmd_index: usize,

    shaders: ShaderLibrary,
    states: PassStates,
    targets: RenderTargets,
    resources: GlobalResources,
    lines: LineRenderer,
    shadow_maps: HashMap<u64, ShadowMap>,

    snapshot: Option<Arc<FrameSnapshot>>,
    flush: Arc<FlushRendezvous>,

    resolution_render: UVec2,
    resolution_output: UVec2,
    viewport: Vec2,

    frame_num: u64,
    is_odd_frame: bool,
    time: f64,
    delta_time: f32,
    jitter: Vec2,
    jitter_previous: Vec2,
    view_projection_previous: Option<Mat4>,
    ortho_dirty: bool,
    ortho_planes: (f32, f32),

    material_slots: HashMap<u64, u32>,
    material_next: u32,

    mip_requests: Vec<Arc<Texture>>,
    /// Textures whose per-mip views are dropped once no command list uses them
    mip_releases: Vec<(u64, Arc<Texture>)>,

    environment: Option<Arc<Texture>>,
    font_atlas: Option<Arc<Texture>>,
    selected_entity: Option<u64>,
    transform_handle: Vec<OverlayMesh>,
    text: Vec<TextOverlay>,
    text_vertices: VertexBuffer,
    render_target_debug: Option<RenderTargetDebug>,
    brdf_lut_rendered: bool,
}

impl Renderer {
    pub fn new(
        device: Arc<dyn GpuDevice>,
        window: &dyn WindowState,
        shader_source: Box<dyn ShaderSource>,
        config: RendererConfig,
    ) -> RhiResult<Self> {
        let options = RendererOptions {
            reverse_z: config.reverse_z,
            ..RendererOptions::default()
        };
        Self::with_options(device, window, shader_source, config, options)
    }

    pub fn with_options(
        device: Arc<dyn GpuDevice>,
        window: &dyn WindowState,
        shader_source: Box<dyn ShaderSource>,
        config: RendererConfig,
        options: RendererOptions,
    ) -> RhiResult<Self> {
        let ctx = RhiContext::new(device)?;
        let values = OptionValues::default();

        let swapchain = SwapChain::new(
            &ctx,
            window,
            config.swapchain_buffer_count,
            config.swapchain_format,
            config.vsync,
        )?;
        let command_lists = (0..config.swapchain_buffer_count)
            .map(|i| CommandList::new(&ctx, format!("cmd_renderer_{i}")).map(Some))
            .collect::<RhiResult<Vec<_>>>()?;

        let size = UVec2::new(window.width(), window.height()).max(UVec2::splat(2));
        let resolution = even(size);
        let viewport = resolution.as_vec2();

        let mut shaders = ShaderLibrary::new(&ctx, shader_source);
        shaders.compile_all();

        let mut targets = RenderTargets::new();
        targets.create(
            &ctx,
            &[
                TargetCategory::Render,
                TargetCategory::Output,
                TargetCategory::Fixed,
                TargetCategory::Dynamic,
            ],
            resolution,
            resolution,
            options.upsample_taa,
        )?;

        let resources = GlobalResources::new(&ctx, &config, values.anisotropy, options.reverse_z, viewport)?;
        let lines = LineRenderer::new(&ctx)?;
        let text_vertices = VertexBuffer::new_dynamic::<crate::rhi::VertexPosTex>(&ctx, "text_vertices", 1024)?;

        log::info!(
            "Renderer initialized at {}x{} with {} command lists",
            resolution.x,
            resolution.y,
            command_lists.len()
        );

        Ok(Self {
            states: PassStates::new(options.reverse_z),
            cmd_index: command_lists.len() - 1,
            command_lists,
            ctx,
            config,
            options,
            values,
            swapchain,
            shaders,
            targets,
            resources,
            lines,
            shadow_maps: HashMap::new(),
            snapshot: None,
            flush: FlushRendezvous::new(),
            resolution_render: resolution,
            resolution_output: resolution,
            viewport,
            frame_num: 0,
            is_odd_frame: false,
            time: 0.0,
            delta_time: 0.0,
            jitter: Vec2::ZERO,
            jitter_previous: Vec2::ZERO,
            view_projection_previous: None,
            ortho_dirty: true,
            ortho_planes: (0.0, 0.0),
            material_slots: HashMap::new(),
            material_next: 1,
            mip_requests: Vec::new(),
            mip_releases: Vec::new(),
            environment: None,
            font_atlas: None,
            selected_entity: None,
            transform_handle: Vec::new(),
            text: Vec::new(),
            text_vertices,
            render_target_debug: None,
            brdf_lut_rendered: false,
        })
    }

    /// Record and present one frame
    pub fn tick(&mut self, window: &dyn WindowState, delta_time: f32) {
        if self.flush.is_requested() {
            self.flush();
            self.flush.complete();
        }

        if !self.flush.is_rendering_allowed() {
            return;
        }

        let (width, height) = if window.is_minimized() {
            (0, 0)
        } else {
            (window.width(), window.height())
        };
        if let Err(e) = self.swapchain.resize(width, height) {
            log::error!("Failed to resize the swapchain: {e}");
            return;
        }
        if !self.swapchain.is_present_enabled() {
            return;
        }

        self.delta_time = delta_time;
        self.time += f64::from(delta_time);

        self.cmd_index = (self.cmd_index + 1) % self.command_lists.len();
        if self.cmd_index == 0 {
            self.resources.reset_offsets();
        }
        self.release_generated_mip_views();

        let Some(mut cmd) = self.command_lists[self.cmd_index].take() else {
            panic!("Command list {} is missing", self.cmd_index);
        };
        if cmd.begin() {
            self.render_frame(&mut cmd);
            self.present(&mut cmd);
        }
        self.command_lists[self.cmd_index] = Some(cmd);

        self.frame_num += 1;
        self.is_odd_frame = self.frame_num % 2 == 1;
        self.lines.advance(delta_time);
    }

    fn render_frame(&mut self, cmd: &mut CommandList) {
        let snapshot = self.snapshot.clone().unwrap_or_default();
        self.update_ortho(snapshot.camera().and_then(|entity| entity.camera.as_ref()));

        let Some(camera_entity) = snapshot.camera() else {
            self.clear_output(cmd, Vec4::new(0.0, 0.0, 0.0, 1.0));
            return;
        };
        if !snapshot.has_content() {
            let clear_color = camera_entity
                .camera
                .as_ref()
                .map(|camera| camera.clear_color)
                .unwrap_or(Vec4::W);
            self.clear_output(cmd, clear_color);
            return;
        }

        self.update_frame_buffer(&snapshot);
        self.resources.cb_frame.update(cmd);
        self.pass_main(cmd, &snapshot);
    }

    fn clear_output(&mut self, cmd: &mut CommandList, color: Vec4) {
        self.resources.cb_frame.update(cmd);
        let output = self.targets.get(RenderTarget::FrameOutput).cloned();
        cmd.clear_render_target(output.as_ref(), crate::backend::ClearValue::Color(color.to_array()));
    }

    fn present(&mut self, cmd: &mut CommandList) {
        self.pass_copy_to_backbuffer(cmd);

        let backbuffer = self.swapchain.backbuffer().clone();
        backbuffer.set_layout(crate::backend::ImageLayout::Present, cmd, None, false);

        cmd.end();
        if !cmd.submit(self.swapchain.image_acquired_semaphore()) {
            return;
        }
        if let Err(e) = self.swapchain.present(cmd.processed_semaphore()) {
            log::error!("Failed to present: {e}");
        }
    }

    /// Drain GPU work recorded on the render thread
    pub fn flush(&mut self) {
        if !self.flush.is_rendering_allowed() {
            self.ctx.queue_wait_idle();
        }
        if let Some(cmd) = self.command_lists[self.cmd_index].as_mut() {
            cmd.flush(false);
        }
    }

    /// Handle other threads use to wait for a flush
    pub fn flush_handle(&self) -> FlushHandle {
        FlushHandle::new(self.flush.clone())
    }

    pub fn on_world_resolved(&mut self, entities: &[EntityDesc]) {
        let snapshot = FrameSnapshot::build(entities);
        self.material_slots.clear();
        self.material_next = 1;
        self.snapshot = Some(Arc::new(snapshot));
        self.create_shadow_maps(false);
    }

    /// The world is about to be unloaded
    pub fn on_world_pre_clear(&mut self) {
        self.flush();
        self.snapshot = None;
        self.shadow_maps.clear();
        self.selected_entity = None;
    }

    pub fn on_world_load_end(&mut self) {
        self.flush.set_rendering_allowed(true);
    }

    /// Keep one shadow map per shadow casting light, recreating them all
    /// when `force` is set
    fn create_shadow_maps(&mut self, force: bool) {
        let Some(snapshot) = self.snapshot.clone() else {
            self.shadow_maps.clear();
            return;
        };
        let resolution = self.shadow_resolution();

        let mut live = Vec::new();
        for &index in snapshot.lights() {
            let entity = snapshot.entity(index);
            let Some(light) = &entity.light else {
                continue;
            };
            if !light.casts_shadows() {
                continue;
            }
            live.push(entity.id);

            let up_to_date = self.shadow_maps.get(&entity.id).is_some_and(|shadow_map| {
                shadow_map.light_type == light.light_type && shadow_map.resolution == resolution
            });
            if up_to_date && !force {
                continue;
            }

            match ShadowMap::new(&self.ctx, entity.id, light.light_type, resolution) {
                Ok(shadow_map) => {
                    self.shadow_maps.insert(entity.id, shadow_map);
                }
                Err(e) => {
                    log::error!("Failed to create the shadow map of {}: {e}", entity.name);
                    self.shadow_maps.remove(&entity.id);
                }
            }
        }
        self.shadow_maps.retain(|id, _| live.contains(id));
    }

    fn shadow_resolution(&self) -> u32 {
        self.values.shadow_resolution as u32
    }

    pub fn option(&self, option: RendererOption) -> bool {
        self.options.get(option)
    }

    pub fn set_option(&mut self, option: RendererOption, enabled: bool) {
        if !self.options.set(option, enabled) {
            return;
        }

        match option {
            RendererOption::UpsampleTaa | RendererOption::UpsampleFsr => {
                // The two upsamplers are exclusive
                if enabled {
                    let other = if option == RendererOption::UpsampleTaa {
                        RendererOption::UpsampleFsr
                    } else {
                        RendererOption::UpsampleTaa
                    };
                    self.options.set(other, false);
                }
                self.recreate_targets(&[TargetCategory::Dynamic]);
            }
            RendererOption::ReverseZ => {
                self.flush();
                self.states = PassStates::new(enabled);
                self.recreate_samplers();
                self.ortho_dirty = true;
            }
            _ => {}
        }
    }

    pub fn option_value(&self, option: OptionValue) -> f32 {
        self.values.get(option)
    }

    pub fn set_option_value(&mut self, option: OptionValue, value: f32) {
        let value = match option {
            OptionValue::Anisotropy => value.clamp(0.0, 16.0),
            OptionValue::ShadowResolution => {
                let max = self.ctx.limits().max_texture_dimension_2d;
                value.clamp(SHADOW_RESOLUTION_MIN as f32, max as f32)
            }
            _ => value,
        };
        if !self.values.set(option, value) {
            return;
        }

        match option {
            OptionValue::Anisotropy => self.recreate_samplers(),
            OptionValue::ShadowResolution => {
                self.flush();
                self.create_shadow_maps(true);
            }
            _ => {}
        }
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    pub fn values(&self) -> &OptionValues {
        &self.values
    }

    pub fn set_resolution_render(&mut self, width: u32, height: u32) {
        let Some(resolution) = self.validate_resolution(width, height) else {
            return;
        };
        if resolution == self.resolution_render {
            return;
        }

        self.flush();
        self.resolution_render = resolution;
        self.recreate_targets(&[TargetCategory::Render, TargetCategory::Dynamic]);
        self.recreate_samplers();
        log::info!("Render resolution has been set to {}x{}", resolution.x, resolution.y);
    }

    pub fn set_resolution_output(&mut self, width: u32, height: u32) {
        let Some(resolution) = self.validate_resolution(width, height) else {
            return;
        };
        if resolution == self.resolution_output {
            return;
        }

        self.flush();
        self.resolution_output = resolution;
        self.recreate_targets(&[TargetCategory::Output, TargetCategory::Dynamic]);
        self.recreate_samplers();
        log::info!("Output resolution has been set to {}x{}", resolution.x, resolution.y);
    }

    fn validate_resolution(&self, width: u32, height: u32) -> Option<UVec2> {
        let max = self.ctx.limits().max_texture_dimension_2d;
        if width < 2 || height < 2 || width > max || height > max {
            log::warn!("{width}x{height} is an invalid resolution");
            return None;
        }
        Some(even(UVec2::new(width, height)))
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        if width <= 0.0 || height <= 0.0 {
            log::warn!("{width}x{height} is an invalid viewport");
            return;
        }
        let viewport = Vec2::new(width, height);
        if viewport == self.viewport {
            return;
        }

        self.flush();
        match ScreenQuad::new(&self.ctx, width, height) {
            Ok(quad) => self.resources.quad = quad,
            Err(e) => log::error!("Failed to rebuild the screen quad: {e}"),
        }
        self.viewport = viewport;
        self.ortho_dirty = true;
    }

    fn recreate_targets(&mut self, categories: &[TargetCategory]) {
        if let Err(e) = self.targets.create(
            &self.ctx,
            categories,
            self.resolution_render,
            self.resolution_output,
            self.options.upsample_taa,
        ) {
            log::error!("Failed to create render targets: {e}");
        }
    }

    /// Samplers sharpen texture lookups when rendering below output size
    fn recreate_samplers(&mut self) {
        let ratio = self.resolution_render.x as f32 / self.resolution_output.x as f32;
        let mip_bias = if ratio < 1.0 { ratio.log2() } else { 0.0 };
        match Samplers::new(&self.ctx, self.values.anisotropy, self.options.reverse_z, mip_bias) {
            Ok(samplers) => self.resources.samplers = samplers,
            Err(e) => log::error!("Failed to create samplers: {e}"),
        }
    }

    /// Downsample `texture` into its mips on the next frame.
    ///
    /// The texture needs more than one mip, per-mip views and storage access.
    pub fn request_texture_mip_generation(&mut self, texture: Arc<Texture>) {
        if texture.mip_count() < 2 || !texture.has_per_mip_views() || !texture.is_uav() {
            log::warn!("{} can't have its mips generated", texture.name());
            return;
        }
        self.mip_requests.push(texture);
    }

    fn release_generated_mip_views(&mut self) {
        let lists = self.command_lists.len() as u64;
        let frame = self.frame_num;
        self.mip_releases.retain(|(generated, texture)| {
            if frame < generated + lists {
                return true;
            }
            texture.release_mip_views();
            false
        });
    }

    pub fn environment(&self) -> Option<&Arc<Texture>> {
        self.environment.as_ref()
    }

    pub fn set_environment(&mut self, texture: Option<Arc<Texture>>) {
        self.environment = texture;
    }

    /// Monospaced atlas of the printable ASCII range, 16 glyphs per row
    pub fn set_font_atlas(&mut self, texture: Option<Arc<Texture>>) {
        self.font_atlas = texture;
    }

    pub fn set_selected_entity(&mut self, entity_id: Option<u64>) {
        self.selected_entity = entity_id;
    }

    pub fn set_transform_handle(&mut self, meshes: Vec<OverlayMesh>) {
        self.transform_handle = meshes;
    }

    /// Replace this frame's on-screen text
    pub fn set_text(&mut self, text: Vec<TextOverlay>) {
        self.text = text;
    }

    /// Show `target` on top of the frame, or stop with `None`
    pub fn set_render_target_debug(&mut self, target: Option<RenderTarget>, channels: u32) {
        self.render_target_debug = target.map(|target| RenderTargetDebug { target, channels });
    }

    pub fn render_target_debug(&self) -> Option<(RenderTarget, u32)> {
        self.render_target_debug
            .as_ref()
            .map(|debug| (debug.target, debug.channels))
    }

    pub fn draw_line(&mut self, from: Vec3, to: Vec3, color_from: Vec4, color_to: Vec4, duration: f32, depth: bool) {
        self.lines.draw_line(from, to, color_from, color_to, duration, depth);
    }

    pub fn draw_triangle(&mut self, v0: Vec3, v1: Vec3, v2: Vec3, color: Vec4, duration: f32, depth: bool) {
        self.lines.draw_triangle(v0, v1, v2, color, duration, depth);
    }

    pub fn draw_box(&mut self, aabb: &BoundingBox, color: Vec4, duration: f32, depth: bool) {
        self.lines.draw_box(aabb, color, duration, depth);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_circle(
        &mut self,
        center: Vec3,
        axis: Vec3,
        radius: f32,
        segments: u32,
        color: Vec4,
        duration: f32,
        depth: bool,
    ) {
        self.lines.draw_circle(center, axis, radius, segments, color, duration, depth);
    }

    pub fn draw_rectangle(&mut self, min: Vec2, max: Vec2, z: f32, color: Vec4, duration: f32, depth: bool) {
        self.lines.draw_rectangle(min, max, z, color, duration, depth);
    }

    pub fn lines(&self) -> &LineRenderer {
        &self.lines
    }

    /// Slot of `material` in the material buffer, registering it on first use
    fn material_index(&mut self, material: &Material) -> u32 {
        if let Some(index) = self.material_slots.get(&material.id()) {
            return *index;
        }

        let capacity = self.resources.cb_material.data.capacity();
        if self.material_next >= capacity {
            log::error!(
                "Maximum number of material instances ({capacity}) reached, {} reuses the last one",
                material.name
            );
            return capacity - 1;
        }

        let index = self.material_next;
        self.material_next += 1;
        self.material_slots.insert(material.id(), index);
        self.resources.cb_material.data.entries[index as usize] = MaterialEntry {
            clearcoat: material.clearcoat,
            clearcoat_roughness: material.clearcoat_roughness,
            anisotropic: material.anisotropic,
            anisotropic_rotation: 0.0,
            sheen: material.sheen,
            sheen_tint: 0.0,
            ior: material.ior,
            roughness: material.roughness,
            metallic: material.metallic,
            normal: material.normal,
            height: material.height,
            padding: [0.0; 5],
        };
        index
    }

    pub fn material_instance_count(&self) -> u32 {
        self.material_slots.len() as u32
    }

    pub fn context(&self) -> &Arc<RhiContext> {
        &self.ctx
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn render_targets(&self) -> &RenderTargets {
        &self.targets
    }

    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    pub fn swapchain(&self) -> &SwapChain {
        &self.swapchain
    }

    pub fn snapshot(&self) -> Option<&Arc<FrameSnapshot>> {
        self.snapshot.as_ref()
    }

    pub fn frame_buffer(&self) -> &DynamicBuffer<CbFrame> {
        &self.resources.cb_frame
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_num
    }

    pub fn is_odd_frame(&self) -> bool {
        self.is_odd_frame
    }

    pub fn resolution_render(&self) -> UVec2 {
        self.resolution_render
    }

    pub fn resolution_output(&self) -> UVec2 {
        self.resolution_output
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    pub fn shadow_map(&self, entity_id: u64) -> Option<&ShadowMap> {
        self.shadow_maps.get(&entity_id)
    }

    pub fn shadow_map_count(&self) -> usize {
        self.shadow_maps.len()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.ctx.queue_wait_idle();
        self.ctx.set_default_texture(None);
    }
}

/// Round both dimensions down to an even number
fn even(size: UVec2) -> UVec2 {
    size - size % 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_rounds_down() {
        assert_eq!(even(UVec2::new(1921, 1080)), UVec2::new(1920, 1080));
        assert_eq!(even(UVec2::new(3, 3)), UVec2::new(2, 2));
    }

    #[test]
    fn test_debug_channels_are_distinct() {
        let channels = [
            debug_channel::HAS_UAV,
            debug_channel::PACK,
            debug_channel::GAMMA_CORRECT,
            debug_channel::BOOST,
            debug_channel::ABS,
            debug_channel::CHANNEL_R,
            debug_channel::CHANNEL_A,
            debug_channel::CHANNEL_RG,
            debug_channel::CHANNEL_RGB,
        ];
        let combined = channels.iter().fold(0, |all, bit| all | bit);
        assert_eq!(combined.count_ones() as usize, channels.len());
    }
}
