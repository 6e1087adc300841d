use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::{Vec3, Vec4};

use deferred_renderer::backend::{ShaderStage, TextureFormat, VertexType};
use deferred_renderer::renderer::{ShaderId, ShaderSource};
use deferred_renderer::rhi::{
    CommandList, PipelineState, RhiContext, Shader, Texture, TextureFlags, TextureInfo,
};
use deferred_renderer::scene::{Camera, Geometry, Light, Renderable, Transform};
use deferred_renderer::{
    DummyDevice, EntityDesc, FrameSnapshot, HeadlessWindow, Renderer, RendererConfig, RendererOptions,
};

const WGSL: &str = r#"
@vertex
fn main_vs(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    return vec4<f32>(f32(index), 0.0, 0.0, 1.0);
}

@fragment
fn main_ps() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}

@compute @workgroup_size(8, 8, 1)
fn main_cs(@builtin(global_invocation_id) id: vec3<u32>) {
}
"#;

struct BenchShaderSource;

impl ShaderSource for BenchShaderSource {
    fn load(&self, _id: ShaderId) -> Option<String> {
        Some(WGSL.to_string())
    }
}

fn context() -> (Arc<DummyDevice>, Arc<RhiContext>) {
    let device = Arc::new(DummyDevice::new());
    let ctx = RhiContext::new(device.clone()).unwrap();
    (device, ctx)
}

fn compute_state(ctx: &RhiContext) -> PipelineState {
    let shader = Shader::compile(
        ctx,
        "bench_compute",
        WGSL,
        ShaderStage::COMPUTE,
        "main_cs",
        VertexType::Undefined,
        &[],
    )
    .unwrap();
    let mut pso = PipelineState::new("pass_bench");
    pso.shader_compute = Some(shader);
    pso
}

fn world(ctx: &RhiContext, cubes: u64) -> Vec<EntityDesc> {
    let geometry = Geometry::cube(ctx).unwrap();
    let mut entities = vec![
        EntityDesc::new(0, "camera")
            .with_transform(Transform::looking_at(Vec3::new(0.0, 5.0, 20.0), Vec3::ZERO))
            .with_camera(Camera::new()),
        EntityDesc::new(1, "sun")
            .with_transform(Transform::looking_at(Vec3::new(1.0, 4.0, 1.0), Vec3::ZERO))
            .with_light(Light::directional(Vec3::ONE, 5.0).with_shadows(false)),
    ];
    for i in 0..cubes {
        let x = (i % 16) as f32 * 1.5 - 12.0;
        let z = (i / 16) as f32 * -1.5;
        entities.push(
            EntityDesc::new(2 + i, format!("cube_{i}"))
                .with_transform(Transform::from_position(Vec3::new(x, 0.0, z)))
                .with_renderable(Renderable::new(geometry.clone(), None)),
        );
    }
    entities
}

// ---------------------------------------------------------------------------
// Pipeline state
// ---------------------------------------------------------------------------

fn bench_pipeline_state_hash(c: &mut Criterion) {
    let (_device, ctx) = context();
    let mut pso = compute_state(&ctx);
    pso.clear_color[0] = deferred_renderer::backend::LoadOp::Clear(Vec4::ONE);

    c.bench_function("pipeline_state_hash", |b| {
        b.iter(|| black_box(black_box(&pso).compute_hash()));
    });
}

fn bench_compute_pass_cached(c: &mut Criterion) {
    let (device, ctx) = context();
    let pso = compute_state(&ctx);
    let mut cmd = CommandList::new(&ctx, "cmd_bench").unwrap();

    c.bench_function("command_list_64_cached_compute_passes", |b| {
        b.iter(|| {
            cmd.begin();
            for _ in 0..64 {
                cmd.begin_render_pass(&pso);
                black_box(cmd.dispatch(8, 8, 1));
                cmd.end_render_pass();
            }
            cmd.end();
            cmd.submit(None);
            device.take_submitted_commands();
        });
    });
}

// ---------------------------------------------------------------------------
// Layout tracking
// ---------------------------------------------------------------------------

fn bench_texture_transitions(c: &mut Criterion) {
    let (device, ctx) = context();
    let texture = Texture::new(
        &ctx,
        TextureInfo::new("bench_mips", 1024, 1024, TextureFormat::Rgba16Float)
            .with_flags(TextureFlags::SRV | TextureFlags::UAV | TextureFlags::PER_MIP_VIEWS)
            .with_mips(11),
    )
    .unwrap();
    let mut cmd = CommandList::new(&ctx, "cmd_bench").unwrap();

    c.bench_function("texture_per_mip_transitions", |b| {
        b.iter(|| {
            cmd.begin();
            for mip in 0..texture.mip_count() {
                cmd.set_texture(0, Some(&texture), Some(mip), false);
                cmd.set_texture_uav(0, Some(&texture), Some(mip), false);
            }
            cmd.end();
            cmd.submit(None);
            device.take_submitted_commands();
        });
    });
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

fn bench_snapshot_build(c: &mut Criterion) {
    let (_device, ctx) = context();
    let entities = world(&ctx, 256);

    c.bench_function("frame_snapshot_build_256_entities", |b| {
        b.iter(|| black_box(FrameSnapshot::build(black_box(&entities))));
    });
}

fn bench_renderer_tick(c: &mut Criterion) {
    let window = HeadlessWindow::new(640, 360);
    let device = Arc::new(DummyDevice::new());
    let mut renderer = Renderer::with_options(
        device.clone(),
        &window,
        Box::new(BenchShaderSource),
        RendererConfig::default(),
        RendererOptions::default(),
    )
    .unwrap();
    let entities = world(renderer.context(), 64);
    renderer.on_world_resolved(&entities);

    c.bench_function("renderer_tick_64_cubes", |b| {
        b.iter(|| {
            renderer.tick(&window, 1.0 / 60.0);
            device.take_submitted_commands();
        });
    });
}

criterion_group!(
    benches,
    bench_pipeline_state_hash,
    bench_compute_pass_cached,
    bench_texture_transitions,
    bench_snapshot_build,
    bench_renderer_tick,
);
criterion_main!(benches);
