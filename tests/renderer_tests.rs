//! Frame level tests for the renderer on the recording dummy device.
//!
//! Each test builds a small world, ticks the renderer and inspects the
//! commands submitted for the frame.

mod common;

use std::sync::Arc;
use std::thread;

use glam::{Vec3, Vec4};
use rstest::rstest;

use common::*;
use deferred_renderer::rhi::Counter;
use deferred_renderer::scene::{Light, Material};
use deferred_renderer::{EntityDesc, HeadlessWindow, RenderTarget, RendererConfig, RendererOption, RendererOptions};

fn light_entity(id: u64, light: Light) -> EntityDesc {
    EntityDesc::new(id, format!("light_{id}"))
        .with_transform(deferred_renderer::scene::Transform::looking_at(
            Vec3::new(2.0, 5.0, 2.0),
            Vec3::ZERO,
        ))
        .with_light(light)
}

// ============================================================================
// Frame Control Tests
// ============================================================================

/// Without a camera the output is cleared to black and nothing else is drawn
#[test]
fn test_no_camera_clears_output_to_black() {
    let (device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    device.take_submitted_commands();

    renderer.tick(&window, 0.016);

    let commands = device.take_submitted_commands();
    assert!(color_clears(&commands).contains(&[0.0, 0.0, 0.0, 1.0]));
    assert_eq!(count_markers(&commands, "pass_gbuffer"), 0);
    assert_eq!(renderer.frame_count(), 1);
}

/// A camera with nothing to draw clears to its own clear colour and records
/// no scene pass
#[test]
fn test_empty_scene_clears_to_camera_color() {
    let (device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    renderer.on_world_resolved(&[camera_entity(1)]);
    device.take_submitted_commands();

    renderer.tick(&window, 0.016);

    let commands = device.take_submitted_commands();
    assert!(color_clears(&commands).contains(&CLEAR_COLOR.to_array()));
    let markers = markers(&commands);
    assert!(!markers.iter().any(|marker| marker == "pass_gbuffer"));
    assert!(!markers.iter().any(|marker| marker == "LightC"));
    assert!(markers.iter().any(|marker| marker == "pass_copy_to_backbuffer"));
}

/// A minimized window disables presentation and the frame is not counted
#[test]
fn test_minimized_window_skips_frame() {
    let (device, mut renderer) = create_renderer(RendererOptions::none());
    let minimized = HeadlessWindow {
        width: 320,
        height: 180,
        minimized: true,
    };
    let presents = device.stats().presents;

    renderer.tick(&minimized, 0.016);

    assert_eq!(renderer.frame_count(), 0);
    assert_eq!(device.stats().presents, presents);
}

/// Every ticked frame is presented once
#[test]
fn test_each_frame_is_presented() {
    let (device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    let presents = device.stats().presents;

    for _ in 0..4 {
        renderer.tick(&window, 0.016);
    }

    assert_eq!(renderer.frame_count(), 4);
    assert_eq!(device.stats().presents, presents + 4);
    assert!(!renderer.is_odd_frame());
}

// ============================================================================
// Scene Pass Tests
// ============================================================================

/// An opaque cube in view is drawn into the G-buffer once; with no lights
/// the light pass is skipped
#[test]
fn test_opaque_cube_without_lights() {
    let (device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    let cube = cube_entity(renderer.context(), 2, None);
    renderer.on_world_resolved(&[camera_entity(1), cube]);
    device.take_submitted_commands();

    renderer.tick(&window, 0.016);

    let commands = device.take_submitted_commands();
    assert_eq!(count_markers(&commands, "pass_gbuffer"), 1);
    assert_eq!(count_markers(&commands, "LightC"), 0);
    assert_eq!(renderer.context().profiler().get(Counter::MeshesRendered), 1);
}

/// A cube behind the camera is culled
#[test]
fn test_cube_outside_frustum_is_culled() {
    let (_device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    let mut cube = cube_entity(renderer.context(), 2, None);
    cube.transform.position = Vec3::new(0.0, 0.0, 50.0);
    renderer.on_world_resolved(&[camera_entity(1), cube]);

    renderer.tick(&window, 0.016);

    assert_eq!(renderer.context().profiler().get(Counter::MeshesRendered), 0);
}

/// One light dispatch per light with non-zero intensity
#[rstest]
#[case::one_light(&[1.0], 1)]
#[case::two_lights(&[1.0, 2.0], 2)]
#[case::dark_light(&[1.0, 0.0], 1)]
fn test_light_dispatch_per_light(#[case] intensities: &[f32], #[case] expected: usize) {
    let (device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    let mut entities = vec![camera_entity(1), cube_entity(renderer.context(), 2, None)];
    for (i, &intensity) in intensities.iter().enumerate() {
        entities.push(light_entity(10 + i as u64, Light::point(Vec3::ONE, intensity, 10.0)));
    }
    renderer.on_world_resolved(&entities);
    device.take_submitted_commands();

    renderer.tick(&window, 0.016);

    let commands = device.take_submitted_commands();
    assert_eq!(count_markers(&commands, "LightC"), expected);
}

/// Shadow maps exist only for lights that cast shadows
#[test]
fn test_shadow_maps_follow_shadow_casters() {
    let (_device, mut renderer) = create_renderer(RendererOptions::none());
    renderer.on_world_resolved(&[
        camera_entity(1),
        light_entity(10, Light::directional(Vec3::ONE, 3.0).with_shadows(true)),
        light_entity(11, Light::point(Vec3::ONE, 1.0, 10.0).with_shadows(false)),
    ]);

    assert_eq!(renderer.shadow_map_count(), 1);
    assert!(renderer.shadow_map(10).is_some());
    assert!(renderer.shadow_map(11).is_none());

    renderer.on_world_pre_clear();
    assert_eq!(renderer.shadow_map_count(), 0);
    assert!(renderer.snapshot().is_none());
}

// ============================================================================
// Constant Buffer Tests
// ============================================================================

/// A frame identical to the previous one uploads no new frame constants
#[test]
fn test_static_frames_skip_frame_upload() {
    let (_device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    let cube = cube_entity(renderer.context(), 2, None);
    renderer.on_world_resolved(&[camera_entity(1), cube]);

    renderer.tick(&window, 0.0);
    let first = renderer.frame_buffer().data;
    let uploads = renderer.frame_buffer().buffer().upload_count();

    renderer.tick(&window, 0.0);

    assert_eq!(renderer.frame_buffer().data, first);
    assert_eq!(renderer.frame_buffer().buffer().upload_count(), uploads);
}

/// The transparent G-buffer pass keeps what the opaque pass wrote
#[test]
fn test_transparent_gbuffer_loads_opaque_targets() {
    use deferred_renderer::backend::{GpuCommand, LoadOp};

    let (device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    let glass = Arc::new(Material::new("glass").with_color(Vec4::new(1.0, 1.0, 1.0, 0.5)));
    let opaque = cube_entity(renderer.context(), 2, None);
    let transparent = cube_entity(renderer.context(), 3, Some(glass));
    renderer.on_world_resolved(&[camera_entity(1), opaque, transparent]);

    renderer.tick(&window, 1.0 / 60.0);

    let gbuffer_loads: Vec<Vec<bool>> = device
        .take_submitted_commands()
        .iter()
        .filter_map(|command| match command {
            GpuCommand::BeginRendering(info) if info.label == "pass_gbuffer" => Some(
                info.color_attachments
                    .iter()
                    .map(|attachment| matches!(attachment.load, LoadOp::Clear(_)))
                    .collect(),
            ),
            _ => None,
        })
        .collect();

    assert_eq!(gbuffer_loads.len(), 2);
    assert_eq!(gbuffer_loads[0], vec![true; 4]);
    assert_eq!(gbuffer_loads[1], vec![false; 4]);
}

/// Wrapping the command list ring does not re-upload unchanged constants
#[test]
fn test_static_frames_skip_upload_across_ring_wrap() {
    let (_device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    let cube = cube_entity(renderer.context(), 2, None);
    renderer.on_world_resolved(&[camera_entity(1), cube]);

    renderer.tick(&window, 0.0);
    let uploads = renderer.frame_buffer().buffer().upload_count();
    let offset = renderer.frame_buffer().buffer().offset();

    for _ in 0..6 {
        renderer.tick(&window, 0.0);
    }

    assert_eq!(renderer.frame_buffer().buffer().upload_count(), uploads);
    assert_eq!(renderer.frame_buffer().buffer().offset(), offset);
}

/// The first frame has no history, so the previous view projection is the
/// current one
#[test]
fn test_first_frame_has_no_motion() {
    let (_device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    let cube = cube_entity(renderer.context(), 2, None);
    renderer.on_world_resolved(&[camera_entity(1), cube]);

    renderer.tick(&window, 0.016);

    let data = renderer.frame_buffer().data;
    assert_eq!(data.view_projection_previous, data.view_projection_unjittered);
    assert_eq!(data.frame, 0);
}

/// Materials beyond the buffer capacity share the last slot
#[test]
fn test_material_overflow_reuses_last_slot() {
    let config = RendererConfig::default().with_max_material_instances(2);
    let (_device, mut renderer) = create_renderer_with_config(RendererOptions::none(), config);
    let window = HeadlessWindow::new(320, 180);

    let mut entities = vec![camera_entity(1)];
    for i in 0..3 {
        let material = Arc::new(Material::new(&format!("material_{i}")).with_color(Vec4::new(1.0, 0.5, 0.25, 1.0)));
        entities.push(cube_entity(renderer.context(), 2 + i, Some(material)));
    }
    renderer.on_world_resolved(&entities);

    renderer.tick(&window, 0.016);

    assert_eq!(renderer.material_instance_count(), 1);
}

// ============================================================================
// Option Tests
// ============================================================================

/// Switching upsamplers recreates the dynamic targets without compiling
/// any shader
#[test]
fn test_upsampler_toggle_recreates_dynamic_targets() {
    let (_device, mut renderer) = create_renderer(RendererOptions::none());
    let recreations = renderer.render_targets().recreation_count();
    let compiles = renderer.shaders().compile_count();

    renderer.set_option(RendererOption::UpsampleFsr, true);

    assert_eq!(renderer.render_targets().recreation_count(), recreations + 1);
    assert_eq!(renderer.shaders().compile_count(), compiles);

    renderer.set_option(RendererOption::UpsampleTaa, true);
    assert!(renderer.option(RendererOption::UpsampleTaa));
    assert!(!renderer.option(RendererOption::UpsampleFsr));
    assert_eq!(renderer.render_targets().recreation_count(), recreations + 2);
}

/// Setting an option to its current value does nothing
#[test]
fn test_unchanged_option_is_ignored() {
    let (_device, mut renderer) = create_renderer(RendererOptions::none());
    let recreations = renderer.render_targets().recreation_count();

    renderer.set_option(RendererOption::UpsampleFsr, false);

    assert_eq!(renderer.render_targets().recreation_count(), recreations);
}

/// Resolutions are validated and rounded down to even sizes
#[rstest]
#[case::odd(641, 361, (640, 360))]
#[case::too_small(1, 1, (320, 180))]
#[case::too_large(100_000, 180, (320, 180))]
fn test_render_resolution(#[case] width: u32, #[case] height: u32, #[case] expected: (u32, u32)) {
    let (_device, mut renderer) = create_renderer(RendererOptions::none());

    renderer.set_resolution_render(width, height);

    let resolution = renderer.resolution_render();
    assert_eq!((resolution.x, resolution.y), expected);
    if expected != (320, 180) {
        let albedo = renderer
            .render_targets()
            .get(RenderTarget::GbufferAlbedo)
            .expect("G-buffer should exist");
        assert_eq!((albedo.width(), albedo.height()), expected);
    }
}

// ============================================================================
// Flush Tests
// ============================================================================

/// A flush from another thread is serviced by the next tick, and rendering
/// stays paused until the world load completes
#[test]
fn test_flush_request_pauses_rendering() {
    let (_device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    let handle = renderer.flush_handle();

    let waiter = thread::spawn(move || handle.flush());
    while !waiter.is_finished() {
        renderer.tick(&window, 0.016);
        thread::yield_now();
    }
    waiter.join().unwrap();

    let frames = renderer.frame_count();
    renderer.tick(&window, 0.016);
    assert_eq!(renderer.frame_count(), frames);

    renderer.on_world_load_end();
    renderer.tick(&window, 0.016);
    assert_eq!(renderer.frame_count(), frames + 1);
}

// ============================================================================
// Debug Line Tests
// ============================================================================

/// Lines drawn with a duration survive until it elapses
#[test]
fn test_debug_lines_expire() {
    let (_device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);

    renderer.draw_line(Vec3::ZERO, Vec3::X, Vec4::ONE, Vec4::ONE, 0.0, true);
    renderer.draw_line(Vec3::ZERO, Vec3::Y, Vec4::ONE, Vec4::ONE, 1.0, false);
    assert_eq!(renderer.lines().depth_vertex_count(), 2);
    assert_eq!(renderer.lines().no_depth_vertex_count(), 2);

    renderer.tick(&window, 0.5);
    assert_eq!(renderer.lines().depth_vertex_count(), 0);
    assert_eq!(renderer.lines().no_depth_vertex_count(), 2);

    renderer.tick(&window, 0.6);
    assert!(renderer.lines().is_empty());
}

/// Per-mip views outlive the frame that used them until the ring wraps
#[test]
fn test_generated_mips_release_views() {
    use deferred_renderer::backend::TextureFormat;
    use deferred_renderer::rhi::{Texture, TextureFlags, TextureInfo};

    let (_device, mut renderer) = create_renderer(RendererOptions::none());
    let window = HeadlessWindow::new(320, 180);
    let cube = cube_entity(renderer.context(), 2, None);
    renderer.on_world_resolved(&[camera_entity(1), cube]);

    let texture = Texture::new(
        renderer.context(),
        TextureInfo::new("mipped", 64, 64, TextureFormat::Rgba16Float)
            .with_flags(TextureFlags::SRV | TextureFlags::UAV | TextureFlags::PER_MIP_VIEWS)
            .with_mips(4),
    )
    .expect("Texture should be created");
    renderer.request_texture_mip_generation(texture.clone());

    renderer.tick(&window, 1.0 / 60.0);
    assert!(texture.has_per_mip_views());

    for _ in 0..8 {
        renderer.tick(&window, 1.0 / 60.0);
    }
    assert!(!texture.has_per_mip_views());
    assert!(!texture.is_uav());
}
