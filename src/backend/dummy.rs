//! Dummy GPU device for testing and headless runs.
//!
//! This device doesn't perform actual GPU operations. It keeps every
//! recorded command so tests can inspect what a frame would have executed,
//! signals fences on submit and keeps buffer contents in memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::traits::*;
use super::types::*;

/// Creation counters exposed for tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    pub buffers_created: u64,
    pub textures_created: u64,
    pub shaders_created: u64,
    pub pipelines_created: u64,
    pub descriptor_sets_allocated: u64,
    pub descriptor_pool_resets: u64,
    pub submits: u64,
    pub presents: u64,
    pub wait_idles: u64,
}

#[derive(Debug)]
struct DummySwapchain {
    width: u32,
    height: u32,
    images: Vec<TextureHandle>,
    next_image: u32,
}

#[derive(Debug, Default)]
struct DummyState {
    buffers: HashMap<BufferHandle, Vec<u8>>,
    textures: HashMap<TextureHandle, TextureDescriptor>,
    recording: HashMap<CommandBufferHandle, Vec<GpuCommand>>,
    submitted: Vec<GpuCommand>,
    fences: HashMap<FenceHandle, bool>,
    swapchains: HashMap<SwapchainHandle, DummySwapchain>,
    buffer_size_limit: Option<u64>,
    stats: DummyStats,
}

/// Device that records instead of executing
#[derive(Debug)]
pub struct DummyDevice {
    limits: DeviceLimits,
    next_id: AtomicU64,
    state: Mutex<DummyState>,
}

impl DummyDevice {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            limits,
            next_id: AtomicU64::new(1),
            state: Mutex::new(DummyState::default()),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn stats(&self) -> DummyStats {
        self.state.lock().stats
    }

    /// Commands currently recorded into a command buffer
    pub fn recorded_commands(&self, cmd: CommandBufferHandle) -> Vec<GpuCommand> {
        self.state
            .lock()
            .recording
            .get(&cmd)
            .cloned()
            .unwrap_or_default()
    }

    /// Drain every command submitted since the last call
    pub fn take_submitted_commands(&self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.state.lock().submitted)
    }

    /// Contents of a buffer as last written
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer).cloned()
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor> {
        self.state.lock().textures.get(&texture).cloned()
    }

    pub fn live_texture_count(&self) -> usize {
        self.state.lock().textures.len()
    }

    /// Fail every buffer allocation larger than `limit` bytes
    pub fn set_buffer_size_limit(&self, limit: Option<u64>) {
        self.state.lock().buffer_size_limit = limit;
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for DummyDevice {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> RhiResult<BufferHandle> {
        if desc.size == 0 {
            return Err(RhiError::BufferCreationFailed(format!(
                "{}: size is zero",
                desc.label
            )));
        }
        log::trace!(
            "DummyDevice: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let mut state = self.state.lock();
        if state.buffer_size_limit.is_some_and(|limit| desc.size > limit) {
            return Err(RhiError::OutOfMemory);
        }
        let handle = BufferHandle(self.next_id());
        state.buffers.insert(handle, vec![0; desc.size as usize]);
        state.stats.buffers_created += 1;
        Ok(handle)
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RhiResult<()> {
        let mut state = self.state.lock();
        let contents = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| RhiError::InvalidHandle(format!("buffer {}", buffer.0)))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(RhiError::BufferCreationFailed(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        self.state.lock().buffers.remove(&buffer);
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> RhiResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::TextureCreationFailed(format!(
                "{}: invalid size {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        log::trace!(
            "DummyDevice: creating texture {:?} ({}x{}x{}, mips: {})",
            desc.label,
            desc.width,
            desc.height,
            desc.array_layers,
            desc.mip_levels
        );
        let handle = TextureHandle(self.next_id());
        let mut state = self.state.lock();
        state.textures.insert(handle, desc.clone());
        state.stats.textures_created += 1;
        Ok(handle)
    }

    fn initialize_texture(
        &self,
        texture: TextureHandle,
        _data: Option<&[u8]>,
        _layout: ImageLayout,
    ) -> RhiResult<()> {
        if self.state.lock().textures.contains_key(&texture) {
            Ok(())
        } else {
            Err(RhiError::InvalidHandle(format!("texture {}", texture.0)))
        }
    }

    fn create_texture_view(
        &self,
        texture: TextureHandle,
        _desc: &TextureViewDescriptor,
    ) -> RhiResult<TextureViewHandle> {
        if !self.state.lock().textures.contains_key(&texture) {
            return Err(RhiError::InvalidHandle(format!("texture {}", texture.0)));
        }
        Ok(TextureViewHandle(self.next_id()))
    }

    fn destroy_texture_view(&self, _view: TextureViewHandle) {}

    fn destroy_texture(&self, texture: TextureHandle) {
        self.state.lock().textures.remove(&texture);
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> RhiResult<SamplerHandle> {
        log::trace!("DummyDevice: creating sampler {:?}", desc.label);
        Ok(SamplerHandle(self.next_id()))
    }

    fn destroy_sampler(&self, _sampler: SamplerHandle) {}

    fn create_shader(&self, desc: &ShaderModuleDescriptor) -> RhiResult<ShaderHandle> {
        log::trace!(
            "DummyDevice: creating shader {:?} (entry point: {})",
            desc.label,
            desc.entry_point
        );
        self.state.lock().stats.shaders_created += 1;
        Ok(ShaderHandle(self.next_id()))
    }

    fn destroy_shader(&self, _shader: ShaderHandle) {}

    fn create_descriptor_set_layout(
        &self,
        _bindings: &[DescriptorBinding],
    ) -> RhiResult<DescriptorSetLayoutHandle> {
        Ok(DescriptorSetLayoutHandle(self.next_id()))
    }

    fn reset_descriptor_pool(&self, capacity: u32) -> RhiResult<()> {
        log::trace!("DummyDevice: resetting descriptor pool (capacity: {})", capacity);
        self.state.lock().stats.descriptor_pool_resets += 1;
        Ok(())
    }

    fn allocate_descriptor_set(
        &self,
        _layout: DescriptorSetLayoutHandle,
        _writes: &[DescriptorWrite],
    ) -> RhiResult<DescriptorSetHandle> {
        self.state.lock().stats.descriptor_sets_allocated += 1;
        Ok(DescriptorSetHandle(self.next_id()))
    }

    fn create_pipeline(&self, desc: &PipelineDescriptor) -> RhiResult<PipelineHandle> {
        let label = match desc {
            PipelineDescriptor::Graphics(graphics) => &graphics.label,
            PipelineDescriptor::Compute(compute) => &compute.label,
        };
        log::trace!("DummyDevice: creating pipeline {:?}", label);
        self.state.lock().stats.pipelines_created += 1;
        Ok(PipelineHandle(self.next_id()))
    }

    fn destroy_pipeline(&self, _pipeline: PipelineHandle) {}

    fn create_command_buffer(&self) -> RhiResult<CommandBufferHandle> {
        let handle = CommandBufferHandle(self.next_id());
        self.state.lock().recording.insert(handle, Vec::new());
        Ok(handle)
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> RhiResult<()> {
        let mut state = self.state.lock();
        let commands = state
            .recording
            .get_mut(&cmd)
            .ok_or_else(|| RhiError::InvalidHandle(format!("command buffer {}", cmd.0)))?;
        commands.clear();
        Ok(())
    }

    fn end_command_buffer(&self, _cmd: CommandBufferHandle) -> RhiResult<()> {
        Ok(())
    }

    fn destroy_command_buffer(&self, cmd: CommandBufferHandle) {
        self.state.lock().recording.remove(&cmd);
    }

    fn record(&self, cmd: CommandBufferHandle, command: GpuCommand) {
        log::trace!("DummyDevice: recording {:?}", command);
        if let Some(commands) = self.state.lock().recording.get_mut(&cmd) {
            commands.push(command);
        }
    }

    fn submit(&self, info: &SubmitInfo) -> RhiResult<()> {
        let mut state = self.state.lock();
        let commands = state
            .recording
            .get(&info.command_buffer)
            .cloned()
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("command buffer {}", info.command_buffer.0))
            })?;
        state.submitted.extend(commands);
        state.stats.submits += 1;
        if let Some(fence) = info.fence {
            state.fences.insert(fence, true);
        }
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<FenceHandle> {
        let handle = FenceHandle(self.next_id());
        self.state.lock().fences.insert(handle, signaled);
        Ok(handle)
    }

    fn wait_fence(&self, fence: FenceHandle, _timeout_ns: u64) -> RhiResult<()> {
        match self.state.lock().fences.get(&fence) {
            Some(true) => Ok(()),
            Some(false) => Err(RhiError::Timeout),
            None => Err(RhiError::InvalidHandle(format!("fence {}", fence.0))),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> RhiResult<()> {
        self.state.lock().fences.insert(fence, false);
        Ok(())
    }

    fn is_fence_signaled(&self, fence: FenceHandle) -> bool {
        self.state
            .lock()
            .fences
            .get(&fence)
            .copied()
            .unwrap_or(false)
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        self.state.lock().fences.remove(&fence);
    }

    fn create_semaphore(&self) -> RhiResult<SemaphoreHandle> {
        Ok(SemaphoreHandle(self.next_id()))
    }

    fn destroy_semaphore(&self, _semaphore: SemaphoreHandle) {}

    fn wait_idle(&self) -> RhiResult<()> {
        self.state.lock().stats.wait_idles += 1;
        Ok(())
    }

    fn create_swapchain(&self, desc: &SwapchainDescriptor) -> RhiResult<SwapchainHandle> {
        let handle = SwapchainHandle(self.next_id());
        let mut images = Vec::with_capacity(desc.buffer_count as usize);
        for index in 0..desc.buffer_count {
            images.push(self.create_texture(&TextureDescriptor {
                label: format!("swapchain_image_{index}"),
                width: desc.width,
                height: desc.height,
                format: desc.format,
                usage: TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_DST,
                ..Default::default()
            })?);
        }
        self.state.lock().swapchains.insert(
            handle,
            DummySwapchain {
                width: desc.width,
                height: desc.height,
                images,
                next_image: 0,
            },
        );
        Ok(handle)
    }

    fn resize_swapchain(&self, swapchain: SwapchainHandle, width: u32, height: u32) -> RhiResult<()> {
        let mut state = self.state.lock();
        let DummyState {
            swapchains,
            textures,
            ..
        } = &mut *state;
        let chain = swapchains
            .get_mut(&swapchain)
            .ok_or_else(|| RhiError::SwapchainCreationFailed("unknown swapchain".to_string()))?;
        chain.width = width;
        chain.height = height;
        chain.next_image = 0;
        for image in &chain.images {
            if let Some(desc) = textures.get_mut(image) {
                desc.width = width;
                desc.height = height;
            }
        }
        Ok(())
    }

    fn swapchain_images(&self, swapchain: SwapchainHandle) -> RhiResult<Vec<TextureHandle>> {
        self.state
            .lock()
            .swapchains
            .get(&swapchain)
            .map(|chain| chain.images.clone())
            .ok_or_else(|| RhiError::InvalidHandle(format!("swapchain {}", swapchain.0)))
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        _signal: SemaphoreHandle,
    ) -> RhiResult<u32> {
        let mut state = self.state.lock();
        let chain = state
            .swapchains
            .get_mut(&swapchain)
            .ok_or_else(|| RhiError::AcquireImageFailed("unknown swapchain".to_string()))?;
        let index = chain.next_image;
        chain.next_image = (chain.next_image + 1) % chain.images.len().max(1) as u32;
        Ok(index)
    }

    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        _wait: Option<SemaphoreHandle>,
    ) -> RhiResult<()> {
        let mut state = self.state.lock();
        let image_count = state
            .swapchains
            .get(&swapchain)
            .map(|chain| chain.images.len())
            .ok_or_else(|| RhiError::PresentFailed("unknown swapchain".to_string()))?;
        if image_index as usize >= image_count {
            return Err(RhiError::PresentFailed(format!(
                "image index {image_index} out of range"
            )));
        }
        state.stats.presents += 1;
        Ok(())
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        let mut state = self.state.lock();
        if let Some(chain) = state.swapchains.remove(&swapchain) {
            for image in chain.images {
                state.textures.remove(&image);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_device_name() {
        let device = DummyDevice::new();
        assert_eq!(device.name(), "Dummy");
    }

    #[test]
    fn test_buffer_write_bounds() {
        let device = DummyDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor {
                label: "test".to_string(),
                size: 8,
                usage: BufferUsage::CONSTANT,
            })
            .unwrap();
        device.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.buffer_contents(buffer).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(device.write_buffer(buffer, 6, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_submit_signals_fence() {
        let device = DummyDevice::new();
        let cmd = device.create_command_buffer().unwrap();
        let fence = device.create_fence(false).unwrap();
        assert_eq!(device.wait_fence(fence, 0), Err(RhiError::Timeout));

        device.begin_command_buffer(cmd).unwrap();
        device.record(cmd, GpuCommand::Dispatch { x: 1, y: 1, z: 1 });
        device.end_command_buffer(cmd).unwrap();
        device
            .submit(&SubmitInfo {
                command_buffer: cmd,
                wait_semaphore: None,
                signal_semaphore: None,
                fence: Some(fence),
            })
            .unwrap();

        assert!(device.is_fence_signaled(fence));
        assert_eq!(device.take_submitted_commands().len(), 1);
        assert!(device.take_submitted_commands().is_empty());
    }

    #[test]
    fn test_swapchain_images_cycle() {
        let device = DummyDevice::new();
        let swapchain = device
            .create_swapchain(&SwapchainDescriptor {
                width: 64,
                height: 32,
                buffer_count: 3,
                format: TextureFormat::Bgra8Unorm,
                vsync: true,
                display_handle: None,
                window_handle: None,
            })
            .unwrap();
        let semaphore = device.create_semaphore().unwrap();
        let indices: Vec<u32> = (0..4)
            .map(|_| device.acquire_next_image(swapchain, semaphore).unwrap())
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0]);
        assert_eq!(device.swapchain_images(swapchain).unwrap().len(), 3);
    }
}
