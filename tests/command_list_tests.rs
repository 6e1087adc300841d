//! Command list integration tests.
//!
//! These tests drive [`CommandList`] directly against the dummy device and
//! check the lifecycle, lazy pass begin, layout tracking and pipeline
//! caching through the commands it records.
//!
//! # Test Categories
//!
//! - **Lifecycle Tests**: begin, end, submit, wait and flush
//! - **Render Pass Tests**: markers, lazy begin and pipeline reuse
//! - **Layout Tests**: barriers recorded by bindings, clears and blits

mod common;

use std::sync::Arc;

use glam::Vec4;
use rstest::rstest;

use common::*;
use deferred_renderer::backend::{
    ClearValue, DummyDevice, GpuCommand, ImageLayout, LoadOp, ShaderStage, TextureFormat,
};
use deferred_renderer::rhi::{
    CommandList, CommandListState, Counter, PipelineState, RhiContext, Texture, TextureFlags,
    TextureInfo,
};

fn recording_list(ctx: &Arc<RhiContext>) -> CommandList {
    let mut cmd = CommandList::new(ctx, "cmd_test").expect("Command list should be created");
    assert!(cmd.begin());
    cmd
}

fn barriers(commands: &[GpuCommand]) -> Vec<(ImageLayout, ImageLayout)> {
    commands
        .iter()
        .filter_map(|command| match command {
            GpuCommand::Barrier(barrier) => Some((barrier.old_layout, barrier.new_layout)),
            _ => None,
        })
        .collect()
}

fn compute_state(ctx: &RhiContext, source: &str) -> PipelineState {
    let mut pso = PipelineState::new("pass_test_compute");
    pso.shader_compute = Some(compile(ctx, "test_compute", source, ShaderStage::COMPUTE));
    pso
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

/// A list walks through every state and returns to idle after waiting
#[rstest]
fn test_lifecycle(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (device, ctx) = context;
    let mut cmd = CommandList::new(&ctx, "cmd_lifecycle").unwrap();
    assert_eq!(cmd.state(), CommandListState::Idle);

    assert!(cmd.begin());
    assert!(cmd.is_recording());
    assert!(cmd.end());
    assert_eq!(cmd.state(), CommandListState::Ended);
    assert!(cmd.submit(None));
    assert_eq!(cmd.state(), CommandListState::Submitted);
    assert_eq!(device.stats().submits, 1);

    cmd.wait();
    assert_eq!(cmd.state(), CommandListState::Idle);
}

/// Beginning a submitted list waits for it first
#[rstest]
fn test_begin_waits_for_submitted(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (_device, ctx) = context;
    let mut cmd = recording_list(&ctx);
    cmd.end();
    cmd.submit(None);

    assert!(cmd.begin());
    assert!(cmd.is_recording());
}

/// Only a presenting submission signals the processed semaphore
#[rstest]
fn test_processed_semaphore_needs_wait_semaphore(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (_device, ctx) = context;
    let mut cmd = recording_list(&ctx);
    cmd.end();
    cmd.submit(None);
    assert!(cmd.processed_semaphore().is_none());
}

#[rstest]
#[should_panic(expected = "must be ended before submitting")]
fn test_submit_requires_end(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (_device, ctx) = context;
    let mut cmd = recording_list(&ctx);
    cmd.submit(None);
}

#[rstest]
#[should_panic(expected = "is not recording")]
fn test_recording_requires_begin(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (_device, ctx) = context;
    let texture = storage_texture(&ctx, "texture_idle");
    let mut cmd = CommandList::new(&ctx, "cmd_idle").unwrap();
    cmd.clear_render_target(Some(&texture), ClearValue::Color([0.0; 4]));
}

/// Flushing an idle list does nothing
#[rstest]
fn test_flush_idle_is_noop(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (device, ctx) = context;
    let mut cmd = CommandList::new(&ctx, "cmd_flush").unwrap();

    assert!(cmd.flush(true));

    assert_eq!(ctx.profiler().get(Counter::Flushes), 0);
    assert_eq!(device.stats().submits, 0);
}

/// Flushing submits the recorded work and optionally resumes recording,
/// after which draws fail until a pass begins again
#[rstest]
#[case::restore(true, CommandListState::Recording)]
#[case::no_restore(false, CommandListState::Idle)]
fn test_flush_recording(
    context: (Arc<DummyDevice>, Arc<RhiContext>),
    #[case] restore: bool,
    #[case] expected: CommandListState,
) {
    let (device, ctx) = context;
    let pso = compute_state(&ctx, TRIVIAL_WGSL);
    let mut cmd = recording_list(&ctx);
    assert!(cmd.begin_render_pass(&pso));

    assert!(cmd.flush(restore));

    assert_eq!(cmd.state(), expected);
    assert!(cmd.is_flushed());
    assert_eq!(ctx.profiler().get(Counter::Flushes), 1);
    assert_eq!(device.stats().submits, 1);
    if restore {
        assert!(!cmd.dispatch(1, 1, 1));
        assert!(cmd.begin_render_pass(&pso));
        assert!(cmd.dispatch(1, 1, 1));
    }
}

// ============================================================================
// Render Pass Tests
// ============================================================================

/// A compute pass records its marker, binds the pipeline once and dispatches
#[rstest]
fn test_compute_pass(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (device, ctx) = context;
    let pso = compute_state(&ctx, TRIVIAL_WGSL);
    let mut cmd = recording_list(&ctx);

    assert!(cmd.begin_render_pass(&pso));
    assert!(cmd.dispatch(8, 8, 1));
    assert!(cmd.dispatch(4, 4, 1));
    cmd.end_render_pass();

    let commands = device.recorded_commands(cmd.handle());
    assert_eq!(markers(&commands), vec!["pass_test_compute".to_string()]);
    let binds = commands
        .iter()
        .filter(|command| matches!(command, GpuCommand::BindPipeline { .. }))
        .count();
    assert_eq!(binds, 1);
    assert!(commands.contains(&GpuCommand::Dispatch { x: 4, y: 4, z: 1 }));
    assert_eq!(commands.last(), Some(&GpuCommand::MarkerEnd));
    assert_eq!(ctx.profiler().get(Counter::Dispatches), 2);
    assert_eq!(ctx.profiler().get(Counter::PipelineBindings), 1);
}

/// Equal pipeline states share one pipeline, whatever their pass name
#[rstest]
fn test_pipeline_reuse(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (_device, ctx) = context;
    let pso = compute_state(&ctx, TRIVIAL_WGSL);
    let mut renamed = pso.clone();
    renamed.pass_name = "pass_renamed";
    let mut cmd = recording_list(&ctx);

    assert!(cmd.begin_render_pass(&pso));
    cmd.end_render_pass();
    assert!(cmd.begin_render_pass(&renamed));
    cmd.end_render_pass();

    let cache = ctx.pipeline_cache().lock();
    assert_eq!(cache.creation_count(), 1);
    assert_eq!(cache.len(), 1);
}

/// Draws and dispatches fail outside of a pass
#[rstest]
fn test_dispatch_without_pipeline_fails(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (_device, ctx) = context;
    let mut cmd = recording_list(&ctx);
    assert!(!cmd.dispatch(1, 1, 1));
    assert!(!cmd.draw(3, 0));
}

/// Every binding the shader uses must be satisfied before a dispatch
#[rstest]
fn test_dispatch_binds_descriptor_set(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (device, ctx) = context;
    let pso = compute_state(&ctx, SAMPLE_WGSL);
    let input = storage_texture(&ctx, "texture_in");
    let output = storage_texture(&ctx, "texture_out");
    let mut cmd = recording_list(&ctx);
    assert!(cmd.begin_render_pass(&pso));

    assert!(!cmd.dispatch(8, 8, 1));

    cmd.set_texture(0, Some(&input), None, false);
    cmd.set_texture_uav(5, Some(&output), None, false);
    assert!(cmd.dispatch(8, 8, 1));
    assert!(cmd.dispatch(8, 8, 1));
    cmd.end_render_pass();

    let commands = device.recorded_commands(cmd.handle());
    let sets = commands
        .iter()
        .filter(|command| matches!(command, GpuCommand::BindDescriptorSet { .. }))
        .count();
    assert_eq!(sets, 1);
    assert_eq!(ctx.profiler().get(Counter::DescriptorSetBindings), 1);
}

/// A graphics pass begins on the GPU only when something is drawn, or at
/// the end when it has clears to perform
#[rstest]
#[case::clears(true, 1)]
#[case::loads(false, 0)]
fn test_graphics_pass_begins_lazily(
    context: (Arc<DummyDevice>, Arc<RhiContext>),
    #[case] clear: bool,
    #[case] expected_passes: u64,
) {
    let (device, ctx) = context;
    let target = Texture::new(
        &ctx,
        TextureInfo::new("target", 64, 64, TextureFormat::Rgba8Unorm)
            .with_flags(TextureFlags::RENDER_TARGET | TextureFlags::SRV),
    )
    .unwrap();

    let mut pso = PipelineState::new("pass_test_graphics");
    pso.shader_vertex = Some(compile(&ctx, "test_vertex", TRIVIAL_WGSL, ShaderStage::VERTEX));
    pso.shader_pixel = Some(compile(&ctx, "test_pixel", TRIVIAL_WGSL, ShaderStage::PIXEL));
    pso.render_target_color_textures[0] = Some(target);
    pso.reset_clear_values();
    if clear {
        pso.clear_color[0] = LoadOp::Clear(Vec4::ONE);
    }

    let mut cmd = recording_list(&ctx);
    assert!(cmd.begin_render_pass(&pso));
    assert!(!cmd.is_render_pass_active());
    cmd.end_render_pass();

    let commands = device.recorded_commands(cmd.handle());
    let begun = commands
        .iter()
        .filter(|command| matches!(command, GpuCommand::BeginRendering(_)))
        .count() as u64;
    assert_eq!(begun, expected_passes);
    assert_eq!(ctx.profiler().get(Counter::RenderPasses), expected_passes);

    assert!(cmd.begin_render_pass(&pso));
    assert!(cmd.draw(3, 0));
    assert!(cmd.is_render_pass_active());
    cmd.end_render_pass();
    assert_eq!(ctx.profiler().get(Counter::RenderPasses), expected_passes + 1);
}

// ============================================================================
// Layout Tests
// ============================================================================

/// Setting the layout a texture is already in records nothing
#[rstest]
fn test_redundant_transition_is_skipped(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (device, ctx) = context;
    let texture = storage_texture(&ctx, "texture_general");
    let mut cmd = recording_list(&ctx);
    assert_eq!(texture.layout(0), ImageLayout::General);

    texture.set_layout(ImageLayout::General, &mut cmd, None, false);

    assert!(barriers(&device.recorded_commands(cmd.handle())).is_empty());
    assert_eq!(ctx.profiler().get(Counter::PipelineBarriers), 0);
}

/// Binding for sampling and for storage moves the texture between layouts,
/// with one barrier per actual change
#[rstest]
fn test_bindings_transition_once(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (device, ctx) = context;
    let pso = compute_state(&ctx, TRIVIAL_WGSL);
    let texture = storage_texture(&ctx, "texture_bound");
    let mut cmd = recording_list(&ctx);
    assert!(cmd.begin_render_pass(&pso));

    cmd.set_texture(0, Some(&texture), None, false);
    cmd.set_texture(0, Some(&texture), None, false);
    assert_eq!(texture.layout(0), ImageLayout::ShaderReadOnly);

    cmd.set_texture_uav(0, Some(&texture), None, false);
    assert_eq!(texture.layout(0), ImageLayout::General);

    assert_eq!(
        barriers(&device.recorded_commands(cmd.handle())),
        vec![
            (ImageLayout::General, ImageLayout::ShaderReadOnly),
            (ImageLayout::ShaderReadOnly, ImageLayout::General),
        ]
    );
}

/// Textures that can't be bound as requested fall back to the default
/// texture without recording a barrier
#[rstest]
#[case::missing_texture(false)]
#[case::transition_inside_render_pass(true)]
fn test_unusable_texture_binds_default(
    context: (Arc<DummyDevice>, Arc<RhiContext>),
    #[case] needs_transition: bool,
) {
    let (device, ctx) = context;
    let fallback = storage_texture(&ctx, "texture_default");
    ctx.set_default_texture(Some(fallback.clone()));
    let texture = storage_texture(&ctx, "texture_bound");
    let target = Texture::new(
        &ctx,
        TextureInfo::new("target", 64, 64, TextureFormat::Rgba8Unorm)
            .with_flags(TextureFlags::RENDER_TARGET | TextureFlags::SRV),
    )
    .unwrap();

    let mut pso = PipelineState::new("pass_test_graphics");
    pso.shader_vertex = Some(compile(&ctx, "test_vertex", TRIVIAL_WGSL, ShaderStage::VERTEX));
    pso.shader_pixel = Some(compile(&ctx, "test_pixel", TRIVIAL_WGSL, ShaderStage::PIXEL));
    pso.render_target_color_textures[0] = Some(target);

    let mut cmd = recording_list(&ctx);
    assert!(cmd.begin_render_pass(&pso));
    assert!(cmd.draw(3, 0));
    assert!(cmd.is_render_pass_active());
    let barriers_before = barriers(&device.recorded_commands(cmd.handle())).len();

    let bound = if needs_transition { Some(&texture) } else { None };
    cmd.set_texture(0, bound, None, false);

    assert_eq!(cmd.bound_texture_view(0, false), fallback.srv(None));
    assert_eq!(barriers(&device.recorded_commands(cmd.handle())).len(), barriers_before);
    assert_eq!(texture.layout(0), ImageLayout::General);
    cmd.end_render_pass();
}

/// Depth textures are sampled in the read-only depth layout
#[rstest]
fn test_depth_texture_sampled_read_only(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (_device, ctx) = context;
    let pso = compute_state(&ctx, TRIVIAL_WGSL);
    let depth = Texture::new(
        &ctx,
        TextureInfo::new("depth", 64, 64, TextureFormat::Depth32Float)
            .with_flags(TextureFlags::DEPTH_STENCIL | TextureFlags::SRV),
    )
    .unwrap();
    let mut cmd = recording_list(&ctx);
    assert!(cmd.begin_render_pass(&pso));

    cmd.set_texture(0, Some(&depth), None, false);

    assert_eq!(depth.layout(0), ImageLayout::DepthStencilReadOnly);
}

/// Clearing moves the texture into the transfer destination layout
#[rstest]
fn test_clear_render_target(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (device, ctx) = context;
    let texture = storage_texture(&ctx, "texture_clear");
    let mut cmd = recording_list(&ctx);

    cmd.clear_render_target(Some(&texture), ClearValue::Color([0.5, 0.25, 0.0, 1.0]));

    let commands = device.recorded_commands(cmd.handle());
    assert_eq!(barriers(&commands), vec![(ImageLayout::General, ImageLayout::TransferDst)]);
    assert_eq!(color_clears(&commands), vec![[0.5, 0.25, 0.0, 1.0]]);
    assert_eq!(texture.layout(0), ImageLayout::TransferDst);
}

/// A blit restores the layouts both textures had before
#[rstest]
fn test_blit_restores_layouts(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (device, ctx) = context;
    let source = storage_texture(&ctx, "texture_source");
    let destination = storage_texture(&ctx, "texture_destination");
    let mut cmd = recording_list(&ctx);

    cmd.blit(&source, &destination, false);

    let commands = device.recorded_commands(cmd.handle());
    let blits = commands
        .iter()
        .filter(|command| matches!(command, GpuCommand::Blit { .. }))
        .count();
    assert_eq!(blits, 1);
    assert_eq!(barriers(&commands).len(), 4);
    assert_eq!(source.layout(0), ImageLayout::General);
    assert_eq!(destination.layout(0), ImageLayout::General);
}

/// Transitions of mip ranges record one barrier per run of equal layouts
#[rstest]
fn test_mip_runs_share_barriers(context: (Arc<DummyDevice>, Arc<RhiContext>)) {
    let (device, ctx) = context;
    let texture = Texture::new(
        &ctx,
        TextureInfo::new("texture_mips", 64, 64, TextureFormat::Rgba16Float)
            .with_flags(TextureFlags::SRV | TextureFlags::UAV | TextureFlags::PER_MIP_VIEWS)
            .with_mips(4),
    )
    .unwrap();
    let mut cmd = recording_list(&ctx);

    texture.set_layout(ImageLayout::ShaderReadOnly, &mut cmd, Some(1), false);
    texture.set_layout(ImageLayout::TransferDst, &mut cmd, None, false);

    let commands = device.recorded_commands(cmd.handle());
    assert_eq!(
        barriers(&commands),
        vec![
            (ImageLayout::General, ImageLayout::ShaderReadOnly),
            (ImageLayout::General, ImageLayout::TransferDst),
            (ImageLayout::ShaderReadOnly, ImageLayout::TransferDst),
            (ImageLayout::General, ImageLayout::TransferDst),
        ]
    );
    assert!(texture.is_in_layout(ImageLayout::TransferDst, None, false));
}
