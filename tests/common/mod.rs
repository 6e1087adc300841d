//! Common utilities for renderer integration tests.
//!
//! Everything runs on the recording dummy device, so tests inspect the
//! commands a frame would have executed instead of reading pixels back.

use std::sync::Arc;

use glam::{Vec3, Vec4};
use rstest::fixture;

use deferred_renderer::backend::{DummyDevice, GpuCommand, ShaderStage, TextureFormat, VertexType};
use deferred_renderer::renderer::{ShaderId, ShaderSource};
use deferred_renderer::rhi::{RhiContext, Shader, ShaderDefine, Texture, TextureFlags, TextureInfo};
use deferred_renderer::scene::{Camera, EntityDesc, Geometry, Material, Renderable, Transform};
use deferred_renderer::{
    HeadlessWindow, Renderer, RendererConfig, RendererOptions,
};

// ============================================================================
// Shaders
// ============================================================================

/// One module with an entry point per stage and no bindings.
///
/// Every shader id resolves to it; the defines the renderer prepends become
/// unused constants.
pub const TRIVIAL_WGSL: &str = r#"
@vertex
fn main_vs(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}

@fragment
fn main_ps() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}

@compute @workgroup_size(8, 8, 1)
fn main_cs(@builtin(global_invocation_id) id: vec3<u32>) {
}
"#;

/// A compute shader reading one texture and writing another
#[allow(dead_code)]
pub const SAMPLE_WGSL: &str = r#"
@group(0) @binding(200) var tex_in: texture_2d<f32>;
@group(0) @binding(5) var tex_out: texture_storage_2d<rgba16float, write>;

@compute @workgroup_size(8, 8, 1)
fn main_cs(@builtin(global_invocation_id) id: vec3<u32>) {
    let color = textureLoad(tex_in, vec2<i32>(id.xy), 0);
    textureStore(tex_out, vec2<i32>(id.xy), color);
}
"#;

/// Serves [`TRIVIAL_WGSL`] for every shader
#[derive(Debug, Clone, Copy, Default)]
pub struct TestShaderSource;

impl ShaderSource for TestShaderSource {
    fn load(&self, _id: ShaderId) -> Option<String> {
        Some(TRIVIAL_WGSL.to_string())
    }
}

#[allow(dead_code)]
pub fn compile(ctx: &RhiContext, name: &str, source: &str, stage: ShaderStage) -> Arc<Shader> {
    let entry_point = if stage == ShaderStage::VERTEX {
        "main_vs"
    } else if stage == ShaderStage::PIXEL {
        "main_ps"
    } else {
        "main_cs"
    };
    let vertex_type = if stage == ShaderStage::VERTEX {
        VertexType::PosTex
    } else {
        VertexType::Undefined
    };
    let defines: &[ShaderDefine] = &[];
    Shader::compile(ctx, name, source, stage, entry_point, vertex_type, defines)
        .expect("Test shader should compile")
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[allow(dead_code)]
#[fixture]
pub fn device() -> Arc<DummyDevice> {
    init_logging();
    Arc::new(DummyDevice::new())
}

#[allow(dead_code)]
#[fixture]
pub fn context(device: Arc<DummyDevice>) -> (Arc<DummyDevice>, Arc<RhiContext>) {
    let ctx = RhiContext::new(device.clone()).expect("Context should be created");
    (device, ctx)
}

/// A renderer on its own dummy device
#[allow(dead_code)]
pub fn create_renderer(options: RendererOptions) -> (Arc<DummyDevice>, Renderer) {
    create_renderer_with_config(options, RendererConfig::default())
}

#[allow(dead_code)]
pub fn create_renderer_with_config(
    options: RendererOptions,
    config: RendererConfig,
) -> (Arc<DummyDevice>, Renderer) {
    init_logging();
    let device = Arc::new(DummyDevice::new());
    let renderer = Renderer::with_options(
        device.clone(),
        &HeadlessWindow::new(320, 180),
        Box::new(TestShaderSource),
        config,
        options,
    )
    .expect("Renderer should be created");
    (device, renderer)
}

// ============================================================================
// Scene builders
// ============================================================================

#[allow(dead_code)]
pub const CLEAR_COLOR: Vec4 = Vec4::new(0.25, 0.5, 0.75, 1.0);

#[allow(dead_code)]
pub fn camera_entity(id: u64) -> EntityDesc {
    EntityDesc::new(id, "camera")
        .with_transform(Transform::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO))
        .with_camera(Camera::new().with_clear_color(CLEAR_COLOR))
}

#[allow(dead_code)]
pub fn cube_entity(ctx: &RhiContext, id: u64, material: Option<Arc<Material>>) -> EntityDesc {
    let geometry = Geometry::cube(ctx).expect("Cube should be created");
    EntityDesc::new(id, format!("cube_{id}"))
        .with_transform(Transform::new())
        .with_renderable(Renderable::new(geometry, material))
}

#[allow(dead_code)]
pub fn storage_texture(ctx: &RhiContext, name: &str) -> Arc<Texture> {
    Texture::new(
        ctx,
        TextureInfo::new(name, 64, 64, TextureFormat::Rgba16Float)
            .with_flags(TextureFlags::SRV | TextureFlags::UAV),
    )
    .expect("Texture should be created")
}

// ============================================================================
// Command inspection
// ============================================================================

/// Names of every debug marker in submission order
pub fn markers(commands: &[GpuCommand]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|command| match command {
            GpuCommand::MarkerBegin(name) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

#[allow(dead_code)]
pub fn count_markers(commands: &[GpuCommand], name: &str) -> usize {
    markers(commands).iter().filter(|marker| *marker == name).count()
}

pub fn color_clears(commands: &[GpuCommand]) -> Vec<[f32; 4]> {
    commands
        .iter()
        .filter_map(|command| match command {
            GpuCommand::ClearColorImage { color, .. } => Some(*color),
            _ => None,
        })
        .collect()
}
