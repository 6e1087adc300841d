//! Device abstraction traits
//!
//! [`GpuDevice`] is the only GPU-facing boundary of the crate. The command
//! list records [`GpuCommand`]s into device command buffers; everything else
//! is resource creation and queue synchronization.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use thiserror::Error;

use super::types::*;

/// Device errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RhiError {
    #[error("Failed to initialize device: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create swapchain: {0}")]
    SwapchainCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to create descriptor: {0}")]
    DescriptorCreationFailed(String),
    #[error("Failed to submit: {0}")]
    SubmitFailed(String),
    #[error("Failed to acquire swapchain image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to present: {0}")]
    PresentFailed(String),
    #[error("Timed out waiting for the device")]
    Timeout,
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
    #[error("Surface is outdated")]
    SurfaceOutdated,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type RhiResult<T> = Result<T, RhiError>;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u64);

        impl $name {
            pub fn id(&self) -> u64 {
                self.0
            }
        }
    };
}

handle!(
    /// Handle to a GPU buffer
    BufferHandle
);
handle!(
    /// Handle to a GPU image
    TextureHandle
);
handle!(
    /// Handle to a view over an image subresource range
    TextureViewHandle
);
handle!(SamplerHandle);
handle!(ShaderHandle);
handle!(DescriptorSetLayoutHandle);
handle!(DescriptorSetHandle);
handle!(PipelineHandle);
handle!(CommandBufferHandle);
handle!(FenceHandle);
handle!(SemaphoreHandle);
handle!(SwapchainHandle);

/// Device capabilities the renderer depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_texture_dimension_2d: u32,
    pub min_uniform_buffer_offset_alignment: u32,
    pub max_uniform_buffer_range: u32,
    pub max_anisotropy: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension_2d: 16384,
            min_uniform_buffer_offset_alignment: 256,
            max_uniform_buffer_range: 65536,
            max_anisotropy: 16,
        }
    }
}

/// Resource kinds a descriptor binding can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorType {
    /// Uniform buffer bound with a dynamic offset
    ConstantBuffer,
    StructuredBuffer,
    Texture,
    StorageTexture,
    Sampler,
}

/// One entry of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    pub stages: ShaderStage,
}

/// A resource written into a descriptor set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorResource {
    ConstantBuffer { buffer: BufferHandle, range: u64 },
    StructuredBuffer { buffer: BufferHandle, range: u64 },
    Texture { view: TextureViewHandle, layout: ImageLayout },
    StorageTexture { view: TextureViewHandle },
    Sampler(SamplerHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub resource: DescriptorResource,
}

/// Shader module creation parameters
pub struct ShaderModuleDescriptor<'a> {
    pub label: &'a str,
    pub module: &'a naga::Module,
    pub info: &'a naga::valid::ModuleInfo,
    pub stage: ShaderStage,
    pub entry_point: &'a str,
}

/// Graphics pipeline creation parameters
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptor {
    pub label: String,
    pub vertex_shader: ShaderHandle,
    pub pixel_shader: Option<ShaderHandle>,
    pub vertex_stride: u32,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub topology: PrimitiveTopology,
    pub rasterizer: RasterizerState,
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    pub layout: DescriptorSetLayoutHandle,
}

/// Compute pipeline creation parameters
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    pub label: String,
    pub shader: ShaderHandle,
    pub layout: DescriptorSetLayoutHandle,
}

#[derive(Debug, Clone)]
pub enum PipelineDescriptor {
    Graphics(GraphicsPipelineDescriptor),
    Compute(ComputePipelineDescriptor),
}

impl PipelineDescriptor {
    pub fn bind_point(&self) -> PipelineBindPoint {
        match self {
            PipelineDescriptor::Graphics(_) => PipelineBindPoint::Graphics,
            PipelineDescriptor::Compute(_) => PipelineBindPoint::Compute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
}

/// Image layout transition over a subresource range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub texture: TextureHandle,
    pub aspect: ImageAspect,
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
}

/// Attachment of a dynamic rendering scope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingAttachment {
    pub view: TextureViewHandle,
    pub layout: ImageLayout,
    pub load: LoadOp<ClearValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderingInfo {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub color_attachments: Vec<RenderingAttachment>,
    pub depth_attachment: Option<RenderingAttachment>,
    pub has_stencil: bool,
}

/// Commands recorded into a device command buffer
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    Barrier(ImageBarrier),
    BeginRendering(RenderingInfo),
    EndRendering,
    ClearColorImage {
        texture: TextureHandle,
        mip_count: u32,
        layer_count: u32,
        color: [f32; 4],
    },
    ClearDepthStencilImage {
        texture: TextureHandle,
        aspect: ImageAspect,
        mip_count: u32,
        layer_count: u32,
        depth: f32,
        stencil: u32,
    },
    BindPipeline {
        pipeline: PipelineHandle,
        bind_point: PipelineBindPoint,
    },
    BindDescriptorSet {
        pipeline: PipelineHandle,
        bind_point: PipelineBindPoint,
        set: DescriptorSetHandle,
        dynamic_offsets: Vec<u32>,
    },
    BindVertexBuffer {
        buffer: BufferHandle,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: BufferHandle,
        offset: u64,
        format: IndexFormat,
    },
    SetViewport(Viewport),
    SetScissor(Rect),
    Draw {
        vertex_count: u32,
        first_vertex: u32,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    Blit {
        source: TextureHandle,
        destination: TextureHandle,
        aspect: ImageAspect,
        width: u32,
        height: u32,
        mip_count: u32,
        layer_count: u32,
        filter: Filter,
    },
    MarkerBegin(String),
    MarkerEnd,
}

/// Queue submission parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitInfo {
    pub command_buffer: CommandBufferHandle,
    /// Waited on at the colour attachment output stage
    pub wait_semaphore: Option<SemaphoreHandle>,
    pub signal_semaphore: Option<SemaphoreHandle>,
    pub fence: Option<FenceHandle>,
}

/// Presentable surface parameters
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDescriptor {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub format: TextureFormat,
    pub vsync: bool,
    pub display_handle: Option<RawDisplayHandle>,
    pub window_handle: Option<RawWindowHandle>,
}

/// Graphics device abstraction
///
/// All methods take `&self`; implementations keep their resource tables
/// behind locks so the device can be shared through an `Arc`.
pub trait GpuDevice: Send + Sync {
    /// Get device name
    fn name(&self) -> &str;

    /// Get device limits
    fn limits(&self) -> DeviceLimits;

    /// Create a buffer in host visible memory
    fn create_buffer(&self, desc: &BufferDescriptor) -> RhiResult<BufferHandle>;

    /// Write data to a buffer at a byte offset
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RhiResult<()>;

    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Create a texture; its layout starts as `Undefined`
    fn create_texture(&self, desc: &TextureDescriptor) -> RhiResult<TextureHandle>;

    /// Upload optional mip 0 data and move every subresource to `layout`
    fn initialize_texture(
        &self,
        texture: TextureHandle,
        data: Option<&[u8]>,
        layout: ImageLayout,
    ) -> RhiResult<()>;

    fn create_texture_view(
        &self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> RhiResult<TextureViewHandle>;

    fn destroy_texture_view(&self, view: TextureViewHandle);

    fn destroy_texture(&self, texture: TextureHandle);

    fn create_sampler(&self, desc: &SamplerDescriptor) -> RhiResult<SamplerHandle>;

    fn destroy_sampler(&self, sampler: SamplerHandle);

    /// Create a shader module from a validated naga module
    fn create_shader(&self, desc: &ShaderModuleDescriptor) -> RhiResult<ShaderHandle>;

    fn destroy_shader(&self, shader: ShaderHandle);

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> RhiResult<DescriptorSetLayoutHandle>;

    /// Recreate the descriptor pool with room for `capacity` sets,
    /// invalidating every set allocated so far
    fn reset_descriptor_pool(&self, capacity: u32) -> RhiResult<()>;

    fn allocate_descriptor_set(
        &self,
        layout: DescriptorSetLayoutHandle,
        writes: &[DescriptorWrite],
    ) -> RhiResult<DescriptorSetHandle>;

    fn create_pipeline(&self, desc: &PipelineDescriptor) -> RhiResult<PipelineHandle>;

    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    fn create_command_buffer(&self) -> RhiResult<CommandBufferHandle>;

    /// Begin recording a one-time-submit command buffer
    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> RhiResult<()>;

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> RhiResult<()>;

    fn destroy_command_buffer(&self, cmd: CommandBufferHandle);

    /// Record a command into a command buffer in the recording state
    fn record(&self, cmd: CommandBufferHandle, command: GpuCommand);

    fn submit(&self, info: &SubmitInfo) -> RhiResult<()>;

    fn create_fence(&self, signaled: bool) -> RhiResult<FenceHandle>;

    /// Block until the fence is signaled or the timeout elapses
    fn wait_fence(&self, fence: FenceHandle, timeout_ns: u64) -> RhiResult<()>;

    fn reset_fence(&self, fence: FenceHandle) -> RhiResult<()>;

    fn is_fence_signaled(&self, fence: FenceHandle) -> bool;

    fn destroy_fence(&self, fence: FenceHandle);

    fn create_semaphore(&self) -> RhiResult<SemaphoreHandle>;

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    /// Wait until the queue has drained
    fn wait_idle(&self) -> RhiResult<()>;

    fn create_swapchain(&self, desc: &SwapchainDescriptor) -> RhiResult<SwapchainHandle>;

    fn resize_swapchain(&self, swapchain: SwapchainHandle, width: u32, height: u32) -> RhiResult<()>;

    /// The backbuffer images, registered as textures owned by the swapchain
    fn swapchain_images(&self, swapchain: SwapchainHandle) -> RhiResult<Vec<TextureHandle>>;

    /// Acquire the next backbuffer, signaling `signal` once it is ready
    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
    ) -> RhiResult<u32>;

    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: Option<SemaphoreHandle>,
    ) -> RhiResult<()>;

    fn destroy_swapchain(&self, swapchain: SwapchainHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RhiError::OutOfMemory;
        assert_eq!(err.to_string(), "Out of memory");

        let err = RhiError::BufferCreationFailed("size is zero".to_string());
        assert_eq!(err.to_string(), "Failed to create buffer: size is zero");
    }

    #[test]
    fn test_pipeline_bind_point() {
        let desc = PipelineDescriptor::Compute(ComputePipelineDescriptor {
            label: "ssao".to_string(),
            shader: ShaderHandle(1),
            layout: DescriptorSetLayoutHandle(2),
        });
        assert_eq!(desc.bind_point(), PipelineBindPoint::Compute);
    }
}
