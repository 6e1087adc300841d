//! Vulkan device implementation using ash
//!
//! Rendering goes through Vulkan 1.3 dynamic rendering, so there are no
//! render pass or framebuffer objects. Every resource lives in a table
//! behind one lock and is addressed by the opaque handles of
//! [`crate::backend::traits`].

mod commands;
mod conversions;
mod debug;
mod pipeline;
mod swapchain;

use std::collections::HashMap;
use std::ffi::{c_char, CString};
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use raw_window_handle::RawDisplayHandle;

use crate::backend::traits::*;
use crate::backend::types::*;

use swapchain::VkSwapchain;

/// Descriptor counts per set the pool reserves for each type
const POOL_SIZES: [(vk::DescriptorType, u32); 5] = [
    (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 8),
    (vk::DescriptorType::STORAGE_BUFFER, 2),
    (vk::DescriptorType::SAMPLED_IMAGE, 32),
    (vk::DescriptorType::STORAGE_IMAGE, 16),
    (vk::DescriptorType::SAMPLER, 8),
];

struct VkBuffer {
    buffer: vk::Buffer,
    allocation: Allocation,
    size: u64,
}

struct VkTexture {
    image: vk::Image,
    /// `None` for swapchain images
    allocation: Option<Allocation>,
    format: TextureFormat,
    width: u32,
    height: u32,
    mip_levels: u32,
    array_layers: u32,
}

struct VkShader {
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
    entry_point: CString,
}

struct VkPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

/// Everything that is created and destroyed at runtime
struct VulkanState {
    allocator: Option<Allocator>,
    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    buffers: HashMap<BufferHandle, VkBuffer>,
    textures: HashMap<TextureHandle, VkTexture>,
    views: HashMap<TextureViewHandle, vk::ImageView>,
    samplers: HashMap<SamplerHandle, vk::Sampler>,
    shaders: HashMap<ShaderHandle, VkShader>,
    set_layouts: HashMap<DescriptorSetLayoutHandle, vk::DescriptorSetLayout>,
    sets: HashMap<DescriptorSetHandle, vk::DescriptorSet>,
    pipelines: HashMap<PipelineHandle, VkPipeline>,
    command_buffers: HashMap<CommandBufferHandle, vk::CommandBuffer>,
    fences: HashMap<FenceHandle, vk::Fence>,
    semaphores: HashMap<SemaphoreHandle, vk::Semaphore>,
    swapchains: HashMap<SwapchainHandle, VkSwapchain>,
}

/// Vulkan device
pub struct VulkanDevice {
    name: String,
    limits: DeviceLimits,
    depth_clamp: bool,
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    debug_marker: Option<ash::ext::debug_utils::Device>,
    surface_fn: ash::khr::surface::Instance,
    swapchain_fn: ash::khr::swapchain::Device,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    queue_family: u32,
    state: Mutex<VulkanState>,
    next_id: AtomicU64,
}

fn vk_error(context: &str, e: vk::Result) -> String {
    format!("{context}: {e:?}")
}

fn map_device_error(e: vk::Result, fallback: impl FnOnce(String) -> RhiError) -> RhiError {
    match e {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => RhiError::OutOfMemory,
        vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
        vk::Result::ERROR_OUT_OF_DATE_KHR => RhiError::SurfaceOutdated,
        e => fallback(format!("{e:?}")),
    }
}

impl VulkanDevice {
    /// Create a device able to present to surfaces of `display`.
    ///
    /// `validation` enables the Khronos validation layer when it is
    /// installed and forwards its messages to the log.
    pub fn new(display: Option<RawDisplayHandle>, validation: bool) -> RhiResult<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| RhiError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let mut extensions: Vec<*const c_char> = match display {
            Some(display) => ash_window::enumerate_required_extensions(display)
                .map_err(|e| RhiError::InitializationFailed(vk_error("Surface extensions", e)))?
                .to_vec(),
            None => Vec::new(),
        };
        if !extensions.contains(&ash::khr::surface::NAME.as_ptr()) {
            extensions.push(ash::khr::surface::NAME.as_ptr());
        }

        let validation = validation && Self::has_validation_layer(&entry);
        let mut layers = Vec::new();
        if validation {
            layers.push(debug::VALIDATION_LAYER.as_ptr());
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"deferred-renderer")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"deferred-renderer")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions);

        let instance = unsafe { entry.create_instance(&instance_info, None) }
            .map_err(|e| RhiError::InitializationFailed(vk_error("Failed to create instance", e)))?;

        let debug_utils = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match unsafe { loader.create_debug_utils_messenger(&debug::messenger_create_info(), None) } {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    log::warn!("Failed to create the debug messenger: {e:?}");
                    None
                }
            }
        } else {
            None
        };

        let (physical_device, queue_family) = Self::pick_physical_device(&instance)?;
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Vulkan".to_string());
        let supported = unsafe { instance.get_physical_device_features(physical_device) };

        let priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities);
        let device_extensions = [ash::khr::swapchain::NAME.as_ptr()];

        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE)
            .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE)
            .depth_clamp(supported.depth_clamp == vk::TRUE)
            .depth_bias_clamp(supported.depth_bias_clamp == vk::TRUE);
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .features(features)
            .push_next(&mut features13);

        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_info))
            .enabled_extension_names(&device_extensions)
            .push_next(&mut features2);

        let device = unsafe { instance.create_device(physical_device, &device_info, None) }
            .map_err(|e| RhiError::DeviceCreationFailed(vk_error("Failed to create device", e)))?;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| RhiError::DeviceCreationFailed(format!("Failed to create allocator: {e}")))?;

        let pool_info = vk::CommandPoolCreateInfo {
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: queue_family,
            ..Default::default()
        };
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(|e| RhiError::DeviceCreationFailed(vk_error("Failed to create command pool", e)))?;
        let descriptor_pool = Self::create_descriptor_pool(&device, 256)?;

        let limits = DeviceLimits {
            max_texture_dimension_2d: properties.limits.max_image_dimension2_d,
            min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment as u32,
            max_uniform_buffer_range: properties.limits.max_uniform_buffer_range,
            max_anisotropy: if supported.sampler_anisotropy == vk::TRUE {
                properties.limits.max_sampler_anisotropy as u32
            } else {
                1
            },
        };

        let surface_fn = ash::khr::surface::Instance::new(&entry, &instance);
        let swapchain_fn = ash::khr::swapchain::Device::new(&instance, &device);
        let debug_marker = validation.then(|| ash::ext::debug_utils::Device::new(&instance, &device));

        log::info!("Vulkan device: {name}");
        log::info!("Vulkan limits: {limits:?}");

        Ok(Self {
            name,
            limits,
            depth_clamp: supported.depth_clamp == vk::TRUE,
            entry,
            instance,
            debug_utils,
            debug_marker,
            surface_fn,
            swapchain_fn,
            physical_device,
            device,
            queue,
            queue_family,
            state: Mutex::new(VulkanState {
                allocator: Some(allocator),
                command_pool,
                descriptor_pool,
                buffers: HashMap::new(),
                textures: HashMap::new(),
                views: HashMap::new(),
                samplers: HashMap::new(),
                shaders: HashMap::new(),
                set_layouts: HashMap::new(),
                sets: HashMap::new(),
                pipelines: HashMap::new(),
                command_buffers: HashMap::new(),
                fences: HashMap::new(),
                semaphores: HashMap::new(),
                swapchains: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        })
    }

    fn has_validation_layer(entry: &ash::Entry) -> bool {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let found = layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == debug::VALIDATION_LAYER));
        if !found {
            log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }
        found
    }

    /// Prefer a discrete GPU with one queue family for graphics and compute
    fn pick_physical_device(instance: &ash::Instance) -> RhiResult<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| RhiError::DeviceCreationFailed(vk_error("Failed to enumerate devices", e)))?;

        let mut best: Option<(vk::PhysicalDevice, u32, bool)> = None;
        for physical_device in devices {
            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            if properties.api_version < vk::API_VERSION_1_3 {
                continue;
            }
            let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
            let Some(family) = families.iter().position(|family| {
                family
                    .queue_flags
                    .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
            }) else {
                continue;
            };
            let discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
            if best.map_or(true, |(_, _, best_discrete)| discrete && !best_discrete) {
                best = Some((physical_device, family as u32, discrete));
            }
        }

        best.map(|(device, family, _)| (device, family))
            .ok_or_else(|| RhiError::DeviceCreationFailed("No Vulkan 1.3 device with a graphics queue".to_string()))
    }

    fn create_descriptor_pool(device: &ash::Device, capacity: u32) -> RhiResult<vk::DescriptorPool> {
        let capacity = capacity.max(1);
        let sizes: Vec<vk::DescriptorPoolSize> = POOL_SIZES
            .iter()
            .map(|&(ty, count)| vk::DescriptorPoolSize {
                ty,
                descriptor_count: count * capacity,
            })
            .collect();
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(capacity)
            .pool_sizes(&sizes);
        unsafe { device.create_descriptor_pool(&info, None) }
            .map_err(|e| RhiError::DescriptorCreationFailed(vk_error("Failed to create descriptor pool", e)))
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn allocate(
        state: &mut VulkanState,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> RhiResult<Allocation> {
        let allocator = state.allocator.as_mut().ok_or(RhiError::DeviceLost)?;
        allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| match e {
                gpu_allocator::AllocationError::OutOfMemory => RhiError::OutOfMemory,
                e => RhiError::BufferCreationFailed(format!("{name}: {e}")),
            })
    }

    fn free(state: &mut VulkanState, allocation: Allocation) {
        if let Some(allocator) = state.allocator.as_mut() {
            if let Err(e) = allocator.free(allocation) {
                log::error!("Failed to free an allocation: {e}");
            }
        }
    }

    /// Record `record` into a temporary command buffer, submit it and wait
    fn one_time_submit(
        &self,
        state: &VulkanState,
        record: impl FnOnce(vk::CommandBuffer),
    ) -> RhiResult<()> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            command_pool: state.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        unsafe {
            let cmd = self
                .device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| map_device_error(e, RhiError::SubmitFailed))?[0];
            let begin_info = vk::CommandBufferBeginInfo {
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };

            let result = self
                .device
                .begin_command_buffer(cmd, &begin_info)
                .and_then(|_| {
                    record(cmd);
                    self.device.end_command_buffer(cmd)
                })
                .and_then(|_| {
                    let submit = vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&cmd));
                    self.device.queue_submit(self.queue, &[submit], vk::Fence::null())
                })
                .and_then(|_| self.device.queue_wait_idle(self.queue));

            self.device.free_command_buffers(state.command_pool, &[cmd]);
            result.map_err(|e| map_device_error(e, RhiError::SubmitFailed))
        }
    }

    fn image_barrier(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    ) {
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(conversions::image_layout(old_layout))
            .new_layout(conversions::image_layout(new_layout))
            .src_access_mask(conversions::layout_access(old_layout))
            .dst_access_mask(conversions::layout_access(new_layout))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range);
        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }
}

impl GpuDevice for VulkanDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> RhiResult<BufferHandle> {
        if desc.size == 0 {
            return Err(RhiError::BufferCreationFailed(format!("{}: size is zero", desc.label)));
        }
        let info = vk::BufferCreateInfo {
            size: desc.size,
            usage: conversions::buffer_usage(desc.usage),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };

        let mut state = self.state.lock();
        let buffer = unsafe { self.device.create_buffer(&info, None) }
            .map_err(|e| map_device_error(e, RhiError::BufferCreationFailed))?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match Self::allocate(&mut state, &desc.label, requirements, MemoryLocation::CpuToGpu, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };
        if let Err(e) = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            unsafe { self.device.destroy_buffer(buffer, None) };
            Self::free(&mut state, allocation);
            return Err(map_device_error(e, RhiError::BufferCreationFailed));
        }

        let handle = BufferHandle(self.next_id());
        state.buffers.insert(
            handle,
            VkBuffer {
                buffer,
                allocation,
                size: desc.size,
            },
        );
        Ok(handle)
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RhiResult<()> {
        let mut state = self.state.lock();
        let entry = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| RhiError::InvalidHandle(format!("buffer {}", buffer.id())))?;
        let end = offset + data.len() as u64;
        if end > entry.size {
            return Err(RhiError::BufferCreationFailed(format!(
                "write of {} bytes at {offset} overflows a {} byte buffer",
                data.len(),
                entry.size
            )));
        }
        let mapped = entry
            .allocation
            .mapped_slice_mut()
            .ok_or_else(|| RhiError::BufferCreationFailed("buffer is not host visible".to_string()))?;
        mapped[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock();
        if let Some(entry) = state.buffers.remove(&buffer) {
            unsafe { self.device.destroy_buffer(entry.buffer, None) };
            Self::free(&mut state, entry.allocation);
        }
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> RhiResult<TextureHandle> {
        let mut flags = vk::ImageCreateFlags::empty();
        if desc.cube {
            flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        }
        let info = vk::ImageCreateInfo {
            flags,
            image_type: vk::ImageType::TYPE_2D,
            format: conversions::format(desc.format),
            extent: vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            },
            mip_levels: desc.mip_levels,
            array_layers: desc.array_layers,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: conversions::texture_usage(desc.usage),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };

        let mut state = self.state.lock();
        let image = unsafe { self.device.create_image(&info, None) }
            .map_err(|e| map_device_error(e, RhiError::TextureCreationFailed))?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match Self::allocate(&mut state, &desc.label, requirements, MemoryLocation::GpuOnly, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };
        if let Err(e) = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        } {
            unsafe { self.device.destroy_image(image, None) };
            Self::free(&mut state, allocation);
            return Err(map_device_error(e, RhiError::TextureCreationFailed));
        }

        let handle = TextureHandle(self.next_id());
        state.textures.insert(
            handle,
            VkTexture {
                image,
                allocation: Some(allocation),
                format: desc.format,
                width: desc.width,
                height: desc.height,
                mip_levels: desc.mip_levels,
                array_layers: desc.array_layers,
            },
        );
        Ok(handle)
    }

    fn initialize_texture(
        &self,
        texture: TextureHandle,
        data: Option<&[u8]>,
        layout: ImageLayout,
    ) -> RhiResult<()> {
        let mut state = self.state.lock();
        let (image, format, width, height, mip_levels, array_layers) = {
            let entry = state
                .textures
                .get(&texture)
                .ok_or_else(|| RhiError::InvalidHandle(format!("texture {}", texture.id())))?;
            (
                entry.image,
                entry.format,
                entry.width,
                entry.height,
                entry.mip_levels,
                entry.array_layers,
            )
        };
        let aspect = conversions::aspect(ImageAspect::for_format(format));
        let range = vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: array_layers,
        };

        // Staging copy of mip 0 for every layer
        let staging = match data {
            Some(data) if !data.is_empty() => {
                let info = vk::BufferCreateInfo {
                    size: data.len() as u64,
                    usage: vk::BufferUsageFlags::TRANSFER_SRC,
                    sharing_mode: vk::SharingMode::EXCLUSIVE,
                    ..Default::default()
                };
                let buffer = unsafe { self.device.create_buffer(&info, None) }
                    .map_err(|e| map_device_error(e, RhiError::TextureCreationFailed))?;
                let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
                let mut allocation =
                    match Self::allocate(&mut state, "staging", requirements, MemoryLocation::CpuToGpu, true) {
                        Ok(allocation) => allocation,
                        Err(e) => {
                            unsafe { self.device.destroy_buffer(buffer, None) };
                            return Err(e);
                        }
                    };
                let bound = unsafe {
                    self.device
                        .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                };
                match (bound, allocation.mapped_slice_mut()) {
                    (Ok(()), Some(mapped)) => mapped[..data.len()].copy_from_slice(data),
                    _ => {
                        unsafe { self.device.destroy_buffer(buffer, None) };
                        Self::free(&mut state, allocation);
                        return Err(RhiError::TextureCreationFailed("Failed to map the staging buffer".to_string()));
                    }
                }
                Some((buffer, allocation))
            }
            _ => None,
        };

        let result = self.one_time_submit(&state, |cmd| {
            self.image_barrier(cmd, image, range, ImageLayout::Undefined, ImageLayout::TransferDst);
            unsafe {
                match &staging {
                    Some((buffer, _)) => {
                        let region = vk::BufferImageCopy {
                            buffer_offset: 0,
                            buffer_row_length: 0,
                            buffer_image_height: 0,
                            image_subresource: vk::ImageSubresourceLayers {
                                aspect_mask: aspect,
                                mip_level: 0,
                                base_array_layer: 0,
                                layer_count: array_layers,
                            },
                            image_offset: vk::Offset3D::default(),
                            image_extent: vk::Extent3D { width, height, depth: 1 },
                        };
                        self.device.cmd_copy_buffer_to_image(
                            cmd,
                            *buffer,
                            image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &[region],
                        );
                    }
                    None if format.is_depth() => {
                        let value = vk::ClearDepthStencilValue { depth: 0.0, stencil: 0 };
                        self.device.cmd_clear_depth_stencil_image(
                            cmd,
                            image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &value,
                            &[range],
                        );
                    }
                    None => {
                        let value = vk::ClearColorValue { float32: [0.0; 4] };
                        self.device.cmd_clear_color_image(
                            cmd,
                            image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &value,
                            &[range],
                        );
                    }
                }
            }
            self.image_barrier(cmd, image, range, ImageLayout::TransferDst, layout);
        });

        if let Some((buffer, allocation)) = staging {
            unsafe { self.device.destroy_buffer(buffer, None) };
            Self::free(&mut state, allocation);
        }
        result
    }

    fn create_texture_view(
        &self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> RhiResult<TextureViewHandle> {
        let mut state = self.state.lock();
        let image = state
            .textures
            .get(&texture)
            .map(|entry| entry.image)
            .ok_or_else(|| RhiError::InvalidHandle(format!("texture {}", texture.id())))?;

        let info = vk::ImageViewCreateInfo {
            image,
            view_type: conversions::view_type(desc.dimension),
            format: conversions::format(desc.format),
            components: vk::ComponentMapping::default(),
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: conversions::aspect(desc.aspect),
                base_mip_level: desc.base_mip,
                level_count: desc.mip_count,
                base_array_layer: desc.base_layer,
                layer_count: desc.layer_count,
            },
            ..Default::default()
        };
        let view = unsafe { self.device.create_image_view(&info, None) }
            .map_err(|e| map_device_error(e, RhiError::TextureCreationFailed))?;

        let handle = TextureViewHandle(self.next_id());
        state.views.insert(handle, view);
        Ok(handle)
    }

    fn destroy_texture_view(&self, view: TextureViewHandle) {
        if let Some(view) = self.state.lock().views.remove(&view) {
            unsafe { self.device.destroy_image_view(view, None) };
        }
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        let mut state = self.state.lock();
        let Some(entry) = state.textures.remove(&texture) else {
            return;
        };
        // Swapchain images belong to the swapchain
        if let Some(allocation) = entry.allocation {
            unsafe { self.device.destroy_image(entry.image, None) };
            Self::free(&mut state, allocation);
        }
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> RhiResult<SamplerHandle> {
        let address_mode = conversions::address_mode(desc.address_mode);
        let anisotropy = desc.anisotropy.min(self.limits.max_anisotropy as f32);
        let info = vk::SamplerCreateInfo {
            mag_filter: conversions::filter(desc.mag_filter),
            min_filter: conversions::filter(desc.min_filter),
            mipmap_mode: conversions::mipmap_mode(desc.mipmap_filter),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mip_lod_bias: desc.mip_lod_bias,
            anisotropy_enable: (anisotropy > 1.0).into(),
            max_anisotropy: anisotropy.max(1.0),
            compare_enable: desc.compare.is_some().into(),
            compare_op: desc
                .compare
                .map_or(vk::CompareOp::ALWAYS, conversions::compare_op),
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            border_color: vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
            ..Default::default()
        };
        let sampler = unsafe { self.device.create_sampler(&info, None) }
            .map_err(|e| map_device_error(e, RhiError::DescriptorCreationFailed))?;

        let handle = SamplerHandle(self.next_id());
        self.state.lock().samplers.insert(handle, sampler);
        Ok(handle)
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        if let Some(sampler) = self.state.lock().samplers.remove(&sampler) {
            unsafe { self.device.destroy_sampler(sampler, None) };
        }
    }

    fn create_shader(&self, desc: &ShaderModuleDescriptor) -> RhiResult<ShaderHandle> {
        let stage = conversions::naga_stage(desc.stage).ok_or_else(|| {
            RhiError::ShaderCreationFailed(format!("{}: a module is compiled for one stage", desc.label))
        })?;
        let pipeline_options = naga::back::spv::PipelineOptions {
            shader_stage: stage,
            entry_point: desc.entry_point.to_string(),
        };
        let words = naga::back::spv::write_vec(
            desc.module,
            desc.info,
            &naga::back::spv::Options::default(),
            Some(&pipeline_options),
        )
        .map_err(|e| RhiError::ShaderCreationFailed(format!("{}: {e}", desc.label)))?;
        let entry_point = CString::new(desc.entry_point)
            .map_err(|e| RhiError::ShaderCreationFailed(format!("{}: {e}", desc.label)))?;

        let info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { self.device.create_shader_module(&info, None) }
            .map_err(|e| map_device_error(e, RhiError::ShaderCreationFailed))?;

        let handle = ShaderHandle(self.next_id());
        self.state.lock().shaders.insert(
            handle,
            VkShader {
                module,
                stage: conversions::shader_stages(desc.stage),
                entry_point,
            },
        );
        Ok(handle)
    }

    fn destroy_shader(&self, shader: ShaderHandle) {
        if let Some(shader) = self.state.lock().shaders.remove(&shader) {
            unsafe { self.device.destroy_shader_module(shader.module, None) };
        }
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> RhiResult<DescriptorSetLayoutHandle> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(conversions::descriptor_type(binding.ty))
                    .descriptor_count(1)
                    .stage_flags(conversions::shader_stages(binding.stages))
            })
            .collect();
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe { self.device.create_descriptor_set_layout(&info, None) }
            .map_err(|e| map_device_error(e, RhiError::DescriptorCreationFailed))?;

        let handle = DescriptorSetLayoutHandle(self.next_id());
        self.state.lock().set_layouts.insert(handle, layout);
        Ok(handle)
    }

    fn reset_descriptor_pool(&self, capacity: u32) -> RhiResult<()> {
        let pool = Self::create_descriptor_pool(&self.device, capacity)?;
        let mut state = self.state.lock();
        let old = std::mem::replace(&mut state.descriptor_pool, pool);
        unsafe { self.device.destroy_descriptor_pool(old, None) };
        state.sets.clear();
        Ok(())
    }

    fn allocate_descriptor_set(
        &self,
        layout: DescriptorSetLayoutHandle,
        writes: &[DescriptorWrite],
    ) -> RhiResult<DescriptorSetHandle> {
        enum Info {
            Buffer(vk::DescriptorBufferInfo),
            Image(vk::DescriptorImageInfo),
        }

        let mut state = self.state.lock();
        let vk_layout = *state
            .set_layouts
            .get(&layout)
            .ok_or_else(|| RhiError::InvalidHandle(format!("descriptor set layout {}", layout.id())))?;

        let infos = writes
            .iter()
            .map(|write| -> RhiResult<Info> {
                let missing = || RhiError::InvalidHandle(format!("descriptor binding {}", write.binding));
                Ok(match write.resource {
                    DescriptorResource::ConstantBuffer { buffer, range }
                    | DescriptorResource::StructuredBuffer { buffer, range } => {
                        Info::Buffer(vk::DescriptorBufferInfo {
                            buffer: state.buffers.get(&buffer).ok_or_else(missing)?.buffer,
                            offset: 0,
                            range,
                        })
                    }
                    DescriptorResource::Texture { view, layout } => Info::Image(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: *state.views.get(&view).ok_or_else(missing)?,
                        image_layout: conversions::image_layout(layout),
                    }),
                    DescriptorResource::StorageTexture { view } => Info::Image(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: *state.views.get(&view).ok_or_else(missing)?,
                        image_layout: vk::ImageLayout::GENERAL,
                    }),
                    DescriptorResource::Sampler(sampler) => Info::Image(vk::DescriptorImageInfo {
                        sampler: *state.samplers.get(&sampler).ok_or_else(missing)?,
                        image_view: vk::ImageView::null(),
                        image_layout: vk::ImageLayout::UNDEFINED,
                    }),
                })
            })
            .collect::<RhiResult<Vec<Info>>>()?;

        let layouts = [vk_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(state.descriptor_pool)
            .set_layouts(&layouts);
        let set = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(|e| map_device_error(e, RhiError::DescriptorCreationFailed))?[0];

        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .zip(&infos)
            .map(|(write, info)| {
                let ty = match write.resource {
                    DescriptorResource::ConstantBuffer { .. } => DescriptorType::ConstantBuffer,
                    DescriptorResource::StructuredBuffer { .. } => DescriptorType::StructuredBuffer,
                    DescriptorResource::Texture { .. } => DescriptorType::Texture,
                    DescriptorResource::StorageTexture { .. } => DescriptorType::StorageTexture,
                    DescriptorResource::Sampler(_) => DescriptorType::Sampler,
                };
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .descriptor_type(conversions::descriptor_type(ty));
                match info {
                    Info::Buffer(buffer) => base.buffer_info(std::slice::from_ref(buffer)),
                    Info::Image(image) => base.image_info(std::slice::from_ref(image)),
                }
            })
            .collect();
        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) };

        let handle = DescriptorSetHandle(self.next_id());
        state.sets.insert(handle, set);
        Ok(handle)
    }

    fn create_pipeline(&self, desc: &PipelineDescriptor) -> RhiResult<PipelineHandle> {
        let mut state = self.state.lock();
        let set_layout = match desc {
            PipelineDescriptor::Graphics(desc) => desc.layout,
            PipelineDescriptor::Compute(desc) => desc.layout,
        };
        let set_layout = *state
            .set_layouts
            .get(&set_layout)
            .ok_or_else(|| RhiError::InvalidHandle(format!("descriptor set layout {}", set_layout.id())))?;

        let set_layouts = [set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let layout = unsafe { self.device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| map_device_error(e, RhiError::PipelineCreationFailed))?;

        let pipeline = match desc {
            PipelineDescriptor::Graphics(desc) => self.create_graphics_pipeline(&state, desc, layout),
            PipelineDescriptor::Compute(desc) => self.create_compute_pipeline(&state, desc, layout),
        };
        let pipeline = match pipeline {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { self.device.destroy_pipeline_layout(layout, None) };
                return Err(e);
            }
        };

        let handle = PipelineHandle(self.next_id());
        state.pipelines.insert(handle, VkPipeline { pipeline, layout });
        Ok(handle)
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        if let Some(entry) = self.state.lock().pipelines.remove(&pipeline) {
            unsafe {
                self.device.destroy_pipeline(entry.pipeline, None);
                self.device.destroy_pipeline_layout(entry.layout, None);
            }
        }
    }

    fn create_command_buffer(&self) -> RhiResult<CommandBufferHandle> {
        let mut state = self.state.lock();
        let alloc_info = vk::CommandBufferAllocateInfo {
            command_pool: state.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| map_device_error(e, RhiError::DeviceCreationFailed))?[0];

        let handle = CommandBufferHandle(self.next_id());
        state.command_buffers.insert(handle, cmd);
        Ok(handle)
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> RhiResult<()> {
        let state = self.state.lock();
        let cmd = *state
            .command_buffers
            .get(&cmd)
            .ok_or_else(|| RhiError::InvalidHandle(format!("command buffer {}", cmd.id())))?;
        let begin_info = vk::CommandBufferBeginInfo {
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .and_then(|_| self.device.begin_command_buffer(cmd, &begin_info))
        }
        .map_err(|e| map_device_error(e, RhiError::SubmitFailed))
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> RhiResult<()> {
        let state = self.state.lock();
        let cmd = *state
            .command_buffers
            .get(&cmd)
            .ok_or_else(|| RhiError::InvalidHandle(format!("command buffer {}", cmd.id())))?;
        unsafe { self.device.end_command_buffer(cmd) }.map_err(|e| map_device_error(e, RhiError::SubmitFailed))
    }

    fn destroy_command_buffer(&self, cmd: CommandBufferHandle) {
        let mut state = self.state.lock();
        if let Some(cmd) = state.command_buffers.remove(&cmd) {
            unsafe { self.device.free_command_buffers(state.command_pool, &[cmd]) };
        }
    }

    fn record(&self, cmd: CommandBufferHandle, command: GpuCommand) {
        let state = self.state.lock();
        let Some(&vk_cmd) = state.command_buffers.get(&cmd) else {
            log::error!("Recording into unknown command buffer {}", cmd.id());
            return;
        };
        self.record_command(&state, vk_cmd, command);
    }

    fn submit(&self, info: &SubmitInfo) -> RhiResult<()> {
        let state = self.state.lock();
        let cmd = *state
            .command_buffers
            .get(&info.command_buffer)
            .ok_or_else(|| RhiError::InvalidHandle(format!("command buffer {}", info.command_buffer.id())))?;
        let semaphore = |handle: SemaphoreHandle| {
            state
                .semaphores
                .get(&handle)
                .copied()
                .ok_or_else(|| RhiError::InvalidHandle(format!("semaphore {}", handle.id())))
        };
        let waits = info.wait_semaphore.map(semaphore).transpose()?;
        let signals = info.signal_semaphore.map(semaphore).transpose()?;
        let fence = match info.fence {
            Some(fence) => *state
                .fences
                .get(&fence)
                .ok_or_else(|| RhiError::InvalidHandle(format!("fence {}", fence.id())))?,
            None => vk::Fence::null(),
        };

        let waits: Vec<vk::Semaphore> = waits.into_iter().collect();
        let signals: Vec<vk::Semaphore> = signals.into_iter().collect();
        let stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; waits.len()];
        let submit = vk::SubmitInfo::default()
            .command_buffers(std::slice::from_ref(&cmd))
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .signal_semaphores(&signals);

        unsafe { self.device.queue_submit(self.queue, &[submit], fence) }
            .map_err(|e| map_device_error(e, RhiError::SubmitFailed))
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<FenceHandle> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo {
            flags,
            ..Default::default()
        };
        let fence = unsafe { self.device.create_fence(&info, None) }
            .map_err(|e| map_device_error(e, RhiError::DeviceCreationFailed))?;

        let handle = FenceHandle(self.next_id());
        self.state.lock().fences.insert(handle, fence);
        Ok(handle)
    }

    fn wait_fence(&self, fence: FenceHandle, timeout_ns: u64) -> RhiResult<()> {
        let fence = *self
            .state
            .lock()
            .fences
            .get(&fence)
            .ok_or_else(|| RhiError::InvalidHandle(format!("fence {}", fence.id())))?;
        // Waiting without the lock lets other threads keep recording
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }.map_err(|e| match e {
            vk::Result::TIMEOUT => RhiError::Timeout,
            e => map_device_error(e, RhiError::SubmitFailed),
        })
    }

    fn reset_fence(&self, fence: FenceHandle) -> RhiResult<()> {
        let fence = *self
            .state
            .lock()
            .fences
            .get(&fence)
            .ok_or_else(|| RhiError::InvalidHandle(format!("fence {}", fence.id())))?;
        unsafe { self.device.reset_fences(&[fence]) }.map_err(|e| map_device_error(e, RhiError::SubmitFailed))
    }

    fn is_fence_signaled(&self, fence: FenceHandle) -> bool {
        let Some(fence) = self.state.lock().fences.get(&fence).copied() else {
            return false;
        };
        unsafe { self.device.get_fence_status(fence) }.unwrap_or(false)
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        if let Some(fence) = self.state.lock().fences.remove(&fence) {
            unsafe { self.device.destroy_fence(fence, None) };
        }
    }

    fn create_semaphore(&self) -> RhiResult<SemaphoreHandle> {
        let info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { self.device.create_semaphore(&info, None) }
            .map_err(|e| map_device_error(e, RhiError::DeviceCreationFailed))?;

        let handle = SemaphoreHandle(self.next_id());
        self.state.lock().semaphores.insert(handle, semaphore);
        Ok(handle)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        if let Some(semaphore) = self.state.lock().semaphores.remove(&semaphore) {
            unsafe { self.device.destroy_semaphore(semaphore, None) };
        }
    }

    fn wait_idle(&self) -> RhiResult<()> {
        let _state = self.state.lock();
        unsafe { self.device.queue_wait_idle(self.queue) }.map_err(|e| map_device_error(e, RhiError::SubmitFailed))
    }

    fn create_swapchain(&self, desc: &SwapchainDescriptor) -> RhiResult<SwapchainHandle> {
        let (Some(display), Some(window)) = (desc.display_handle, desc.window_handle) else {
            return Err(RhiError::SurfaceCreationFailed("the window has no native handles".to_string()));
        };
        let surface = unsafe { ash_window::create_surface(&self.entry, &self.instance, display, window, None) }
            .map_err(|e| RhiError::SurfaceCreationFailed(vk_error("Failed to create surface", e)))?;

        let supported = unsafe {
            self.surface_fn
                .get_physical_device_surface_support(self.physical_device, self.queue_family, surface)
        }
        .unwrap_or(false);
        if !supported {
            unsafe { self.surface_fn.destroy_surface(surface, None) };
            return Err(RhiError::SurfaceCreationFailed(
                "the graphics queue can't present to this surface".to_string(),
            ));
        }

        let mut swapchain = VkSwapchain::new(surface, desc);
        let mut state = self.state.lock();
        if let Err(e) = self.build_swapchain(&mut state, &mut swapchain, desc.width, desc.height) {
            unsafe { self.surface_fn.destroy_surface(surface, None) };
            return Err(e);
        }

        let handle = SwapchainHandle(self.next_id());
        state.swapchains.insert(handle, swapchain);
        Ok(handle)
    }

    fn resize_swapchain(&self, swapchain: SwapchainHandle, width: u32, height: u32) -> RhiResult<()> {
        let mut state = self.state.lock();
        let mut entry = state
            .swapchains
            .remove(&swapchain)
            .ok_or_else(|| RhiError::InvalidHandle(format!("swapchain {}", swapchain.id())))?;
        let result = self.build_swapchain(&mut state, &mut entry, width, height);
        state.swapchains.insert(swapchain, entry);
        result
    }

    fn swapchain_images(&self, swapchain: SwapchainHandle) -> RhiResult<Vec<TextureHandle>> {
        self.state
            .lock()
            .swapchains
            .get(&swapchain)
            .map(|entry| entry.images.clone())
            .ok_or_else(|| RhiError::InvalidHandle(format!("swapchain {}", swapchain.id())))
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
    ) -> RhiResult<u32> {
        let state = self.state.lock();
        let entry = state
            .swapchains
            .get(&swapchain)
            .ok_or_else(|| RhiError::InvalidHandle(format!("swapchain {}", swapchain.id())))?;
        let semaphore = *state
            .semaphores
            .get(&signal)
            .ok_or_else(|| RhiError::InvalidHandle(format!("semaphore {}", signal.id())))?;

        let (index, suboptimal) = unsafe {
            self.swapchain_fn
                .acquire_next_image(entry.swapchain, u64::MAX, semaphore, vk::Fence::null())
        }
        .map_err(|e| map_device_error(e, RhiError::AcquireImageFailed))?;
        if suboptimal {
            log::debug!("Swapchain is suboptimal for its surface");
        }
        Ok(index)
    }

    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: Option<SemaphoreHandle>,
    ) -> RhiResult<()> {
        let state = self.state.lock();
        let entry = state
            .swapchains
            .get(&swapchain)
            .ok_or_else(|| RhiError::InvalidHandle(format!("swapchain {}", swapchain.id())))?;
        let waits: Vec<vk::Semaphore> = match wait {
            Some(wait) => vec![*state
                .semaphores
                .get(&wait)
                .ok_or_else(|| RhiError::InvalidHandle(format!("semaphore {}", wait.id())))?],
            None => Vec::new(),
        };

        let swapchains = [entry.swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe { self.swapchain_fn.queue_present(self.queue, &info) }
            .map(|_| ())
            .map_err(|e| map_device_error(e, RhiError::PresentFailed))
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        let mut state = self.state.lock();
        if let Some(entry) = state.swapchains.remove(&swapchain) {
            for image in &entry.images {
                state.textures.remove(image);
            }
            unsafe {
                self.swapchain_fn.destroy_swapchain(entry.swapchain, None);
                self.surface_fn.destroy_surface(entry.surface, None);
            }
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("Failed to wait for the device on shutdown: {e:?}");
            }

            for (_, entry) in state.pipelines.drain() {
                self.device.destroy_pipeline(entry.pipeline, None);
                self.device.destroy_pipeline_layout(entry.layout, None);
            }
            for (_, layout) in state.set_layouts.drain() {
                self.device.destroy_descriptor_set_layout(layout, None);
            }
            for (_, shader) in state.shaders.drain() {
                self.device.destroy_shader_module(shader.module, None);
            }
            for (_, sampler) in state.samplers.drain() {
                self.device.destroy_sampler(sampler, None);
            }
            for (_, view) in state.views.drain() {
                self.device.destroy_image_view(view, None);
            }
            for (_, fence) in state.fences.drain() {
                self.device.destroy_fence(fence, None);
            }
            for (_, semaphore) in state.semaphores.drain() {
                self.device.destroy_semaphore(semaphore, None);
            }
            for (_, entry) in state.swapchains.drain() {
                self.swapchain_fn.destroy_swapchain(entry.swapchain, None);
                self.surface_fn.destroy_surface(entry.surface, None);
            }

            let buffers: Vec<VkBuffer> = state.buffers.drain().map(|(_, buffer)| buffer).collect();
            for entry in buffers {
                self.device.destroy_buffer(entry.buffer, None);
                Self::free(&mut state, entry.allocation);
            }
            let textures: Vec<VkTexture> = state.textures.drain().map(|(_, texture)| texture).collect();
            for entry in textures {
                if let Some(allocation) = entry.allocation {
                    self.device.destroy_image(entry.image, None);
                    Self::free(&mut state, allocation);
                }
            }

            state.sets.clear();
            self.device.destroy_descriptor_pool(state.descriptor_pool, None);
            state.command_buffers.clear();
            self.device.destroy_command_pool(state.command_pool, None);

            // The allocator must release its memory blocks before the device goes
            state.allocator = None;
            self.device.destroy_device(None);

            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
