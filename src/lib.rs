//! Deferred Renderer - the frame core of a deferred renderer over an explicit RHI
//!
//! The crate is split into:
//! - **backend**: the [`backend::GpuDevice`] boundary with a Vulkan device (ash)
//!   and a recording dummy device for headless runs and tests
//! - **rhi**: command lists with tracked image layouts, cached pipelines and
//!   descriptor sets, swapchain and profiler
//! - **scene**: the entity facets the renderer consumes and the per-frame snapshot
//! - **renderer**: options, render targets, shaders and the pass graph driven by
//!   [`Renderer::tick`]
//!
//! # Features
//! - Shadow maps for directional cascades, spot and point lights
//! - G-buffer, per-light compute lighting, IBL and transparent composition
//! - SSAO, SSR, volumetric fog, screen-space shadows
//! - TAA, FSR upsampling, bloom, depth of field and the usual post chain
//! - Debug lines, grid, light icons, text and a render target visualizer

pub mod backend;
pub mod renderer;
pub mod rhi;
pub mod scene;
pub mod window;

pub use backend::{GpuDevice, RhiError, RhiResult};
#[cfg(feature = "dummy")]
pub use backend::DummyDevice;
#[cfg(feature = "vulkan-backend")]
pub use backend::VulkanDevice;
pub use renderer::{
    DirectoryShaderSource, OptionValue, RenderTarget, Renderer, RendererConfig, RendererOption, RendererOptions,
    ShaderSource,
};
pub use rhi::RhiContext;
pub use scene::{EntityDesc, FrameSnapshot};
pub use window::{HeadlessWindow, Window, WindowState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize `env_logger` once, honouring `RUST_LOG` and defaulting to `info`.
///
/// Later calls are ignored so applications and tests can both call it.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        log::info!("deferred-renderer {VERSION}");
    }
}
