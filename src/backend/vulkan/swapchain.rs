use ash::vk;

use super::{conversions, map_device_error, VkTexture, VulkanDevice, VulkanState};
use crate::backend::traits::*;
use crate::backend::types::*;

pub(super) struct VkSwapchain {
    pub surface: vk::SurfaceKHR,
    pub swapchain: vk::SwapchainKHR,
    /// Backbuffers registered as textures without an allocation
    pub images: Vec<TextureHandle>,
    format: TextureFormat,
    buffer_count: u32,
    vsync: bool,
}

impl VkSwapchain {
    pub fn new(surface: vk::SurfaceKHR, desc: &SwapchainDescriptor) -> Self {
        Self {
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            format: desc.format,
            buffer_count: desc.buffer_count,
            vsync: desc.vsync,
        }
    }
}

fn present_mode(vsync: bool, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

fn image_count(requested: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let max = if capabilities.max_image_count > 0 {
        capabilities.max_image_count
    } else {
        u32::MAX
    };
    requested.clamp(capabilities.min_image_count, max)
}

impl VulkanDevice {
    /// Create or recreate the swapchain at `width`x`height`, retiring the
    /// previous one and re-registering its images
    pub(super) fn build_swapchain(
        &self,
        state: &mut VulkanState,
        swapchain: &mut VkSwapchain,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        let error = RhiError::SwapchainCreationFailed;
        unsafe {
            self.device
                .queue_wait_idle(self.queue)
                .map_err(|e| map_device_error(e, error))?;

            let capabilities = self
                .surface_fn
                .get_physical_device_surface_capabilities(self.physical_device, swapchain.surface)
                .map_err(|e| map_device_error(e, error))?;
            let formats = self
                .surface_fn
                .get_physical_device_surface_formats(self.physical_device, swapchain.surface)
                .map_err(|e| map_device_error(e, error))?;
            let present_modes = self
                .surface_fn
                .get_physical_device_surface_present_modes(self.physical_device, swapchain.surface)
                .map_err(|e| map_device_error(e, error))?;

            let wanted = conversions::format(swapchain.format);
            let surface_format = formats
                .iter()
                .find(|f| f.format == wanted)
                .or_else(|| formats.first())
                .copied()
                .ok_or_else(|| error("the surface reports no formats".to_string()))?;
            if surface_format.format != wanted {
                log::warn!(
                    "Surface doesn't support {:?}, presenting as {:?}",
                    swapchain.format,
                    surface_format.format
                );
            }

            let extent = if capabilities.current_extent.width != u32::MAX {
                capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: width.clamp(
                        capabilities.min_image_extent.width,
                        capabilities.max_image_extent.width,
                    ),
                    height: height.clamp(
                        capabilities.min_image_extent.height,
                        capabilities.max_image_extent.height,
                    ),
                }
            };

            let old_swapchain = swapchain.swapchain;
            let info = vk::SwapchainCreateInfoKHR {
                surface: swapchain.surface,
                min_image_count: image_count(swapchain.buffer_count, &capabilities),
                image_format: surface_format.format,
                image_color_space: surface_format.color_space,
                image_extent: extent,
                image_array_layers: 1,
                image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                image_sharing_mode: vk::SharingMode::EXCLUSIVE,
                pre_transform: capabilities.current_transform,
                composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                present_mode: present_mode(swapchain.vsync, &present_modes),
                clipped: vk::TRUE,
                old_swapchain,
                ..Default::default()
            };
            let new_swapchain = self
                .swapchain_fn
                .create_swapchain(&info, None)
                .map_err(|e| map_device_error(e, error))?;

            for image in swapchain.images.drain(..) {
                state.textures.remove(&image);
            }
            if old_swapchain != vk::SwapchainKHR::null() {
                self.swapchain_fn.destroy_swapchain(old_swapchain, None);
            }
            swapchain.swapchain = new_swapchain;

            let images = self
                .swapchain_fn
                .get_swapchain_images(new_swapchain)
                .map_err(|e| map_device_error(e, error))?;
            for image in images {
                let handle = TextureHandle(self.next_id());
                state.textures.insert(
                    handle,
                    VkTexture {
                        image,
                        allocation: None,
                        format: swapchain.format,
                        width: extent.width,
                        height: extent.height,
                        mip_levels: 1,
                        array_layers: 1,
                    },
                );
                swapchain.images.push(handle);
            }

            log::info!(
                "Swapchain {}x{} with {} images",
                extent.width,
                extent.height,
                swapchain.images.len()
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vsync_always_uses_fifo() {
        let available = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(present_mode(true, &available), vk::PresentModeKHR::FIFO);
        assert_eq!(present_mode(false, &available), vk::PresentModeKHR::MAILBOX);
        assert_eq!(present_mode(false, &[vk::PresentModeKHR::FIFO]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_image_count_clamped_to_surface() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(image_count(1, &capabilities), 2);
        assert_eq!(image_count(4, &capabilities), 3);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(image_count(8, &unbounded), 8);
    }
}
