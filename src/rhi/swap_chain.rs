//! Presentable surface and its backbuffers

use std::sync::Arc;

use crate::backend::{
    RhiResult, SemaphoreHandle, SwapchainDescriptor, SwapchainHandle, TextureFormat,
};
use crate::window::WindowState;

use super::{RhiContext, SwapchainTarget, Texture};

pub struct SwapChain {
    ctx: Arc<RhiContext>,
    handle: SwapchainHandle,
    width: u32,
    height: u32,
    format: TextureFormat,
    buffer_count: u32,
    images: Vec<Arc<Texture>>,
    acquire_semaphores: Vec<SemaphoreHandle>,
    image_index: u32,
    sync_index: u32,
    image_acquired: bool,
    present_enabled: bool,
}

impl SwapChain {
    pub fn new(
        ctx: &Arc<RhiContext>,
        window: &dyn WindowState,
        buffer_count: u32,
        format: TextureFormat,
        vsync: bool,
    ) -> RhiResult<Self> {
        let (width, height) = if window.is_minimized() {
            (0, 0)
        } else {
            (window.width(), window.height())
        };
        let buffer_count = buffer_count.max(2);

        let handle = ctx.device().create_swapchain(&SwapchainDescriptor {
            width: width.max(1),
            height: height.max(1),
            buffer_count,
            format,
            vsync,
            display_handle: window.display_handle(),
            window_handle: window.window_handle(),
        })?;

        let mut swapchain = Self {
            ctx: ctx.clone(),
            handle,
            width,
            height,
            format,
            buffer_count,
            images: Vec::new(),
            acquire_semaphores: Vec::new(),
            image_index: 0,
            sync_index: 0,
            image_acquired: false,
            present_enabled: width > 0 && height > 0,
        };
        swapchain.create_resources(width.max(1), height.max(1))?;
        swapchain.acquire_next_image()?;

        log::info!(
            "Swapchain created: {}x{}, {} buffers, {:?}",
            width,
            height,
            buffer_count,
            format
        );
        Ok(swapchain)
    }

    fn create_resources(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let device = self.ctx.device().clone();
        self.images = device
            .swapchain_images(self.handle)?
            .into_iter()
            .enumerate()
            .map(|(index, image)| {
                Texture::from_swapchain_image(
                    &self.ctx,
                    image,
                    format!("swapchain_image_{index}"),
                    width,
                    height,
                    self.format,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        // Semaphores from before a resize may still be signaled.
        for semaphore in self.acquire_semaphores.drain(..) {
            device.destroy_semaphore(semaphore);
        }
        for _ in 0..self.images.len() {
            self.acquire_semaphores.push(device.create_semaphore()?);
        }
        self.image_acquired = false;
        self.sync_index = 0;
        Ok(())
    }

    /// Resize the backbuffers. Zero in either dimension disables presenting.
    ///
    /// Returns whether anything changed.
    pub fn resize(&mut self, width: u32, height: u32) -> RhiResult<bool> {
        if width == self.width && height == self.height {
            return Ok(false);
        }

        self.width = width;
        self.height = height;

        if width == 0 || height == 0 {
            self.present_enabled = false;
            log::info!("Swapchain presentation disabled");
            return Ok(true);
        }

        self.ctx.queue_wait_idle();
        self.ctx.device().resize_swapchain(self.handle, width, height)?;
        self.create_resources(width, height)?;
        self.present_enabled = true;
        self.acquire_next_image()?;

        log::info!("Swapchain resolution has been set to {}x{}", width, height);
        Ok(true)
    }

    pub fn acquire_next_image(&mut self) -> RhiResult<()> {
        if !self.present_enabled {
            return Ok(());
        }

        self.sync_index = if self.image_acquired {
            (self.sync_index + 1) % self.acquire_semaphores.len().max(1) as u32
        } else {
            0
        };
        let signal = self.acquire_semaphores[self.sync_index as usize];
        self.image_index = self.ctx.device().acquire_next_image(self.handle, signal)?;
        self.image_acquired = true;
        Ok(())
    }

    /// Present the current backbuffer and acquire the next one
    pub fn present(&mut self, wait: Option<SemaphoreHandle>) -> RhiResult<()> {
        if !self.present_enabled {
            return Ok(());
        }
        assert!(self.image_acquired, "No swapchain image has been acquired");

        self.ctx
            .device()
            .present(self.handle, self.image_index, wait)?;
        self.acquire_next_image()
    }

    pub fn backbuffer(&self) -> &Arc<Texture> {
        &self.images[self.image_index as usize]
    }

    /// The current backbuffer as a pipeline state render target
    pub fn target(&self) -> SwapchainTarget {
        SwapchainTarget {
            swapchain_id: self.handle.id(),
            texture: self.backbuffer().clone(),
            present_enabled: self.present_enabled,
        }
    }

    /// Signaled once the current backbuffer may be rendered to
    pub fn image_acquired_semaphore(&self) -> Option<SemaphoreHandle> {
        if self.present_enabled && self.image_acquired {
            Some(self.acquire_semaphores[self.sync_index as usize])
        } else {
            None
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn is_present_enabled(&self) -> bool {
        self.present_enabled
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.ctx.queue_wait_idle();
        let device = self.ctx.device().clone();
        self.images.clear();
        for semaphore in self.acquire_semaphores.drain(..) {
            device.destroy_semaphore(semaphore);
        }
        device.destroy_swapchain(self.handle);
    }
}
