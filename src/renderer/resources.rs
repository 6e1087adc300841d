//! Resources bound by every pass: constant buffers, samplers, default
//! textures and the shared screen quad

use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::{
    AddressMode, CompareFunction, Filter, RhiResult, SamplerDescriptor, TextureFormat,
};
use crate::rhi::{
    CommandList, IndexBuffer, PipelineState, RhiContext, Sampler, StructuredBuffer, Texture,
    TextureFlags, TextureInfo, VertexBuffer, VertexPosCol, VertexPosTex,
};

use super::constant_buffers::{CbFrame, CbLight, CbMaterial, CbUber, DynamicBuffer};
use super::RendererConfig;

/// Sampler slots
pub mod sampler_slot {
    pub const COMPARE_DEPTH: u32 = 0;
    pub const POINT_CLAMP: u32 = 1;
    pub const POINT_WRAP: u32 = 2;
    pub const BILINEAR_CLAMP: u32 = 3;
    pub const BILINEAR_WRAP: u32 = 4;
    pub const TRILINEAR_CLAMP: u32 = 5;
    pub const ANISOTROPIC_WRAP: u32 = 6;
}

/// Sampled texture slots
pub mod srv {
    pub const GBUFFER_ALBEDO: u32 = 0;
    pub const GBUFFER_NORMAL: u32 = 1;
    pub const GBUFFER_MATERIAL: u32 = 2;
    pub const GBUFFER_VELOCITY: u32 = 3;
    pub const GBUFFER_DEPTH: u32 = 4;
    pub const LIGHT_DIFFUSE: u32 = 5;
    pub const LIGHT_SPECULAR: u32 = 6;
    pub const LIGHT_VOLUMETRIC: u32 = 7;
    pub const FRAME: u32 = 8;
    pub const SSAO: u32 = 9;
    pub const SSR: u32 = 10;
    pub const ENVIRONMENT: u32 = 11;
    pub const LUT_IBL: u32 = 12;
    pub const SHADOW_DEPTH: u32 = 13;
    pub const SHADOW_COLOR: u32 = 14;
    pub const SHADOW_DEPTH_CUBE: u32 = 15;
    pub const SHADOW_COLOR_CUBE: u32 = 16;
    pub const SHADOW_DEPTH_ARRAY: u32 = 17;
    pub const SHADOW_COLOR_ARRAY: u32 = 18;
    pub const NOISE_NORMAL: u32 = 19;
    pub const NOISE_BLUE: u32 = 20;
    pub const TEX: u32 = 21;
    pub const TEX2: u32 = 22;
    pub const FONT_ATLAS: u32 = 23;
    /// First of the material texture slots, one per `MaterialTexture`
    pub const MATERIAL: u32 = 24;
}

/// Storage slots
pub mod uav {
    pub const R: u32 = 0;
    pub const RG: u32 = 1;
    pub const RGB: u32 = 2;
    pub const RGB2: u32 = 3;
    pub const RGB3: u32 = 4;
    pub const RGBA: u32 = 5;
    pub const RGBA2: u32 = 6;
    pub const SPD_COUNTER: u32 = 7;
    /// First of the per-mip output slots of the downsampler
    pub const MIPS: u32 = 8;
}

pub struct Samplers {
    pub compare_depth: Arc<Sampler>,
    pub point_clamp: Arc<Sampler>,
    pub point_wrap: Arc<Sampler>,
    pub bilinear_clamp: Arc<Sampler>,
    pub bilinear_wrap: Arc<Sampler>,
    pub trilinear_clamp: Arc<Sampler>,
    pub anisotropic_wrap: Arc<Sampler>,
}

impl Samplers {
    /// `mip_bias` sharpens texture sampling when rendering below output size
    pub fn new(ctx: &RhiContext, anisotropy: f32, reverse_z: bool, mip_bias: f32) -> RhiResult<Self> {
        let sampler = |label: &str, filter: Filter, mipmap_filter: Filter, address_mode| {
            Sampler::new(
                ctx,
                SamplerDescriptor {
                    label: label.to_string(),
                    min_filter: filter,
                    mag_filter: filter,
                    mipmap_filter,
                    address_mode,
                    ..Default::default()
                },
            )
        };

        Ok(Self {
            compare_depth: Sampler::new(
                ctx,
                SamplerDescriptor {
                    label: "compare_depth".to_string(),
                    compare: Some(if reverse_z {
                        CompareFunction::Greater
                    } else {
                        CompareFunction::Less
                    }),
                    ..Default::default()
                },
            )?,
            point_clamp: sampler("point_clamp", Filter::Nearest, Filter::Nearest, AddressMode::ClampToEdge)?,
            point_wrap: sampler("point_wrap", Filter::Nearest, Filter::Nearest, AddressMode::Wrap)?,
            bilinear_clamp: sampler("bilinear_clamp", Filter::Linear, Filter::Nearest, AddressMode::ClampToEdge)?,
            bilinear_wrap: sampler("bilinear_wrap", Filter::Linear, Filter::Nearest, AddressMode::Wrap)?,
            trilinear_clamp: sampler("trilinear_clamp", Filter::Linear, Filter::Linear, AddressMode::ClampToEdge)?,
            anisotropic_wrap: Sampler::new(
                ctx,
                SamplerDescriptor {
                    label: "anisotropic_wrap".to_string(),
                    address_mode: AddressMode::Wrap,
                    anisotropy,
                    mip_lod_bias: mip_bias,
                    ..Default::default()
                },
            )?,
        })
    }

    fn bind(&self, cmd: &mut CommandList) {
        cmd.set_sampler(sampler_slot::COMPARE_DEPTH, &self.compare_depth);
        cmd.set_sampler(sampler_slot::POINT_CLAMP, &self.point_clamp);
        cmd.set_sampler(sampler_slot::POINT_WRAP, &self.point_wrap);
        cmd.set_sampler(sampler_slot::BILINEAR_CLAMP, &self.bilinear_clamp);
        cmd.set_sampler(sampler_slot::BILINEAR_WRAP, &self.bilinear_wrap);
        cmd.set_sampler(sampler_slot::TRILINEAR_CLAMP, &self.trilinear_clamp);
        cmd.set_sampler(sampler_slot::ANISOTROPIC_WRAP, &self.anisotropic_wrap);
    }
}

pub struct DefaultTextures {
    pub white: Arc<Texture>,
    pub black: Arc<Texture>,
    /// Bound wherever a texture is missing; storage capable so it never
    /// leaves the general layout
    pub transparent: Arc<Texture>,
    pub noise_normal: Arc<Texture>,
    pub noise_blue: Arc<Texture>,
    pub gizmo_light_directional: Arc<Texture>,
    pub gizmo_light_point: Arc<Texture>,
    pub gizmo_light_spot: Arc<Texture>,
}

const NOISE_SIZE: u32 = 128;
const ICON_SIZE: u32 = 64;

impl DefaultTextures {
    pub fn new(ctx: &RhiContext) -> RhiResult<Self> {
        let solid = |name: &str, color: [u8; 4]| {
            Texture::new(
                ctx,
                TextureInfo::new(name, 1, 1, TextureFormat::Rgba8Unorm).with_data(color.to_vec()),
            )
        };

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let noise_normal: Vec<u8> = (0..NOISE_SIZE * NOISE_SIZE)
            .flat_map(|_| {
                let normal = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), 1.0)
                    .normalize();
                let encoded = (normal * 0.5 + 0.5) * 255.0;
                [encoded.x as u8, encoded.y as u8, encoded.z as u8, 255]
            })
            .collect();
        let noise_blue: Vec<u8> = (0..NOISE_SIZE * NOISE_SIZE * 4).map(|_| rng.gen()).collect();
        let noise = |name: &str, data: Vec<u8>| {
            Texture::new(
                ctx,
                TextureInfo::new(name, NOISE_SIZE, NOISE_SIZE, TextureFormat::Rgba8Unorm).with_data(data),
            )
        };
        let icon = |name: &str, ring: f32| {
            Texture::new(
                ctx,
                TextureInfo::new(name, ICON_SIZE, ICON_SIZE, TextureFormat::Rgba8Unorm)
                    .with_flags(TextureFlags::SRV | TextureFlags::TRANSPARENT)
                    .with_data(icon_data(ring)),
            )
        };

        Ok(Self {
            white: solid("default_white", [255; 4])?,
            black: solid("default_black", [0, 0, 0, 255])?,
            transparent: Texture::new(
                ctx,
                TextureInfo::new("default_transparent", 1, 1, TextureFormat::Rgba8Unorm)
                    .with_flags(TextureFlags::SRV | TextureFlags::UAV),
            )?,
            noise_normal: noise("noise_normal", noise_normal)?,
            noise_blue: noise("noise_blue", noise_blue)?,
            gizmo_light_directional: icon("gizmo_light_directional", 0.0)?,
            gizmo_light_point: icon("gizmo_light_point", 0.6)?,
            gizmo_light_spot: icon("gizmo_light_spot", 0.3)?,
        })
    }
}

/// A white disc, hollowed out inside `ring` of the radius
fn icon_data(ring: f32) -> Vec<u8> {
    let center = Vec2::splat(ICON_SIZE as f32 * 0.5);
    (0..ICON_SIZE * ICON_SIZE)
        .flat_map(|i| {
            let pixel = Vec2::new((i % ICON_SIZE) as f32 + 0.5, (i / ICON_SIZE) as f32 + 0.5);
            let distance = pixel.distance(center) / center.x;
            let alpha = if distance <= 1.0 && distance >= ring { 255 } else { 0 };
            [255, 255, 255, alpha]
        })
        .collect()
}

/// Screen-sized quad drawn with the orthographic projection
pub struct ScreenQuad {
    pub vertices: VertexBuffer,
    pub indices: IndexBuffer,
}

impl ScreenQuad {
    pub fn new(ctx: &RhiContext, width: f32, height: f32) -> RhiResult<Self> {
        let (vertices, indices) = quad_data(Vec2::new(width, height));
        Ok(Self {
            vertices: VertexBuffer::new(ctx, "screen_quad_vertices", &vertices)?,
            indices: IndexBuffer::new_u32(ctx, "screen_quad_indices", &indices)?,
        })
    }

    pub fn index_count(&self) -> u32 {
        self.indices.index_count()
    }
}

/// Centered quad of `size`, uv origin at the top left
pub fn quad_data(size: Vec2) -> ([VertexPosTex; 4], [u32; 6]) {
    let half = size * 0.5;
    (
        [
            VertexPosTex::new(Vec3::new(-half.x, -half.y, 0.0), Vec2::new(0.0, 1.0)),
            VertexPosTex::new(Vec3::new(-half.x, half.y, 0.0), Vec2::new(0.0, 0.0)),
            VertexPosTex::new(Vec3::new(half.x, -half.y, 0.0), Vec2::new(1.0, 1.0)),
            VertexPosTex::new(Vec3::new(half.x, half.y, 0.0), Vec2::new(1.0, 0.0)),
        ],
        [0, 1, 2, 2, 1, 3],
    )
}

pub const GRID_HALF_EXTENT: i32 = 100;

/// Lines on the XZ plane, one unit apart
pub fn grid_vertices() -> Vec<VertexPosCol> {
    let color = Vec4::new(0.5, 0.5, 0.5, 0.5);
    let extent = GRID_HALF_EXTENT as f32;
    (-GRID_HALF_EXTENT..=GRID_HALF_EXTENT)
        .flat_map(|i| {
            let offset = i as f32;
            [
                VertexPosCol::new(Vec3::new(offset, 0.0, -extent), color),
                VertexPosCol::new(Vec3::new(offset, 0.0, extent), color),
                VertexPosCol::new(Vec3::new(-extent, 0.0, offset), color),
                VertexPosCol::new(Vec3::new(extent, 0.0, offset), color),
            ]
        })
        .collect()
}

/// Everything rebound after each `begin_render_pass`
pub struct GlobalResources {
    pub cb_frame: DynamicBuffer<CbFrame>,
    pub cb_uber: DynamicBuffer<CbUber>,
    pub cb_light: DynamicBuffer<CbLight>,
    pub cb_material: DynamicBuffer<CbMaterial>,
    pub samplers: Samplers,
    pub textures: DefaultTextures,
    pub quad: ScreenQuad,
    pub grid: VertexBuffer,
    pub spd_counter: StructuredBuffer,
}

impl GlobalResources {
    pub fn new(
        ctx: &Arc<RhiContext>,
        config: &RendererConfig,
        anisotropy: f32,
        reverse_z: bool,
        viewport: Vec2,
    ) -> RhiResult<Self> {
        let textures = DefaultTextures::new(ctx)?;
        ctx.set_default_texture(Some(textures.transparent.clone()));

        Ok(Self {
            cb_frame: DynamicBuffer::new(ctx, "cb_frame", CbFrame::default(), 32)?,
            cb_uber: DynamicBuffer::new(ctx, "cb_uber", CbUber::default(), 2048)?,
            cb_light: DynamicBuffer::new(ctx, "cb_light", CbLight::default(), 256)?,
            cb_material: DynamicBuffer::new(
                ctx,
                "cb_material",
                CbMaterial::new(config.max_material_instances),
                16,
            )?,
            samplers: Samplers::new(ctx, anisotropy, reverse_z, 0.0)?,
            textures,
            quad: ScreenQuad::new(ctx, viewport.x, viewport.y)?,
            grid: VertexBuffer::new(ctx, "grid_vertices", &grid_vertices())?,
            spd_counter: StructuredBuffer::new(ctx, "spd_counter", 4, 1)?,
        })
    }

    /// Begin a render pass and rebind the resources every shader expects
    pub fn begin_pass(&self, cmd: &mut CommandList, pso: &PipelineState) -> bool {
        if !cmd.begin_render_pass(pso) {
            return false;
        }

        self.cb_frame.bind(cmd);
        self.cb_uber.bind(cmd);
        self.cb_light.bind(cmd);
        self.cb_material.bind(cmd);
        self.samplers.bind(cmd);
        cmd.set_texture(srv::NOISE_NORMAL, Some(&self.textures.noise_normal), None, false);
        cmd.set_texture(srv::NOISE_BLUE, Some(&self.textures.noise_blue), None, false);
        true
    }

    /// Restart every constant buffer at its first slot
    pub fn reset_offsets(&mut self) {
        self.cb_frame.reset_offset();
        self.cb_uber.reset_offset();
        self.cb_light.reset_offset();
        self.cb_material.reset_offset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_winding_and_uvs() {
        let (vertices, indices) = quad_data(Vec2::new(200.0, 100.0));
        assert_eq!(vertices[0].position, [-100.0, -50.0, 0.0]);
        assert_eq!(vertices[3].uv, [1.0, 0.0]);
        assert_eq!(indices, [0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn test_grid_line_count() {
        let lines = grid_vertices().len() / 2;
        assert_eq!(lines, 2 * (2 * GRID_HALF_EXTENT as usize + 1));
    }

    #[test]
    fn test_icon_is_hollow() {
        let data = icon_data(0.5);
        let center = (ICON_SIZE / 2 * ICON_SIZE + ICON_SIZE / 2) as usize * 4;
        assert_eq!(data[center + 3], 0);
        let edge = (ICON_SIZE / 2 * ICON_SIZE + 2) as usize * 4;
        assert_eq!(data[edge + 3], 255);
    }
}
