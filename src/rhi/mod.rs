//! Render hardware interface
//!
//! Wraps a [`GpuDevice`] into reference-counted resources with tracked
//! layouts, caches pipelines and descriptor sets, and drives command lists
//! through their `Idle -> Recording -> Ended -> Submitted` lifecycle.

mod buffer;
mod command_list;
mod constant_buffer;
mod descriptor_cache;
mod pipeline_cache;
mod pipeline_state;
mod profiler;
mod sampler;
mod shader;
mod swap_chain;
mod texture;
mod vertex;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::backend::{DeviceLimits, GpuDevice};

pub use buffer::{IndexBuffer, StructuredBuffer, VertexBuffer};
pub use command_list::{CommandList, CommandListState};
pub use constant_buffer::ConstantBuffer;
pub use descriptor_cache::{DescriptorCache, DescriptorSetLayout};
pub use pipeline_cache::{Pipeline, PipelineCache};
pub use pipeline_state::{PipelineState, SwapchainTarget, MAX_RENDER_TARGETS};
pub use profiler::{Counter, Profiler, ProfilerSnapshot};
pub use sampler::Sampler;
pub use shader::{Shader, ShaderDefine};
pub use swap_chain::SwapChain;
pub use texture::{mip_count_for, Texture, TextureFlags, TextureInfo};
pub use vertex::{Vertex, VertexPosCol, VertexPosTex, VertexPosTexNorTan};

/// Binding number offsets per resource class.
///
/// Shaders declare `@binding(SHIFT + slot)` in group 0 so that storage
/// resources, constant buffers, sampled textures and samplers never collide.
pub mod binding_shift {
    pub const UAV: u32 = 0;
    pub const CONSTANT_BUFFER: u32 = 100;
    pub const SRV: u32 = 200;
    pub const SAMPLER: u32 = 300;
}

/// Descriptor pool size before the first growth
pub const DESCRIPTOR_SET_CAPACITY: u32 = 256;

/// Timeout used when waiting on command list fences
pub const FENCE_TIMEOUT_NS: u64 = 10_000_000_000;

/// Shared state of every RHI object created from one device
pub struct RhiContext {
    device: Arc<dyn GpuDevice>,
    limits: DeviceLimits,
    profiler: Profiler,
    pipeline_cache: Mutex<PipelineCache>,
    descriptor_cache: Mutex<DescriptorCache>,
    default_texture: RwLock<Option<Arc<Texture>>>,
}

impl RhiContext {
    pub fn new(device: Arc<dyn GpuDevice>) -> crate::backend::RhiResult<Arc<Self>> {
        let limits = device.limits();
        device.reset_descriptor_pool(DESCRIPTOR_SET_CAPACITY)?;
        log::info!("RHI initialized on {}", device.name());
        Ok(Arc::new(Self {
            device,
            limits,
            profiler: Profiler::new(),
            pipeline_cache: Mutex::new(PipelineCache::new()),
            descriptor_cache: Mutex::new(DescriptorCache::new(DESCRIPTOR_SET_CAPACITY)),
            default_texture: RwLock::new(None),
        }))
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    pub fn limits(&self) -> DeviceLimits {
        self.limits
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn pipeline_cache(&self) -> &Mutex<PipelineCache> {
        &self.pipeline_cache
    }

    pub fn descriptor_cache(&self) -> &Mutex<DescriptorCache> {
        &self.descriptor_cache
    }

    /// Texture bound in place of missing or unusable textures
    pub fn default_texture(&self) -> Option<Arc<Texture>> {
        self.default_texture.read().clone()
    }

    pub fn set_default_texture(&self, texture: Option<Arc<Texture>>) {
        *self.default_texture.write() = texture;
    }

    /// Wait until the GPU queue has drained.
    pub fn queue_wait_idle(&self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for the queue to idle: {e}");
        }
    }
}
