//! Textures with per-mip layout tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;

use crate::backend::{
    GpuDevice, ImageAspect, ImageBarrier, ImageLayout, RhiResult, TextureDescriptor,
    TextureFormat, TextureHandle, TextureUsage, TextureViewDescriptor, TextureViewDimension,
    TextureViewHandle,
};

use super::{CommandList, RhiContext};

bitflags! {
    /// How a texture may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureFlags: u32 {
        const SRV = 1 << 0;
        const UAV = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
        /// One view per mip level for both SRV and UAV access
        const PER_MIP_VIEWS = 1 << 4;
        const CUBE = 1 << 5;
        const GRAYSCALE = 1 << 6;
        const TRANSPARENT = 1 << 7;
    }
}

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Texture creation parameters
#[derive(Debug, Clone)]
pub struct TextureInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub array_length: u32,
    pub mip_count: u32,
    pub format: TextureFormat,
    pub flags: TextureFlags,
    /// Mip 0 pixel data
    pub data: Option<Vec<u8>>,
}

impl TextureInfo {
    pub fn new(name: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            array_length: 1,
            mip_count: 1,
            format,
            flags: TextureFlags::SRV,
            data: None,
        }
    }

    pub fn with_flags(mut self, flags: TextureFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_mips(mut self, mip_count: u32) -> Self {
        self.mip_count = mip_count.max(1);
        self
    }

    pub fn with_array_length(mut self, array_length: u32) -> Self {
        self.array_length = array_length.max(1);
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Default)]
struct TextureState {
    flags: TextureFlags,
    layouts: Vec<ImageLayout>,
    srv: Option<TextureViewHandle>,
    uav: Option<TextureViewHandle>,
    srv_mips: Vec<TextureViewHandle>,
    uav_mips: Vec<TextureViewHandle>,
    attachment_views: Vec<TextureViewHandle>,
}

/// A GPU image plus the layout each of its mips is currently in
pub struct Texture {
    id: u64,
    name: String,
    width: u32,
    height: u32,
    array_length: u32,
    mip_count: u32,
    format: TextureFormat,
    handle: TextureHandle,
    owned: bool,
    device: Arc<dyn GpuDevice>,
    state: RwLock<TextureState>,
}

impl Texture {
    pub fn new(ctx: &RhiContext, info: TextureInfo) -> RhiResult<Arc<Self>> {
        let device = ctx.device().clone();
        let array_length = if info.flags.contains(TextureFlags::CUBE) {
            6
        } else {
            info.array_length.max(1)
        };
        let mip_count = info.mip_count.max(1);

        let handle = device.create_texture(&TextureDescriptor {
            label: info.name.clone(),
            width: info.width,
            height: info.height,
            array_layers: array_length,
            mip_levels: mip_count,
            format: info.format,
            usage: usage_for(info.flags, info.format),
            cube: info.flags.contains(TextureFlags::CUBE),
        })?;

        let layout = if info.data.is_some() {
            ImageLayout::ShaderReadOnly
        } else {
            appropriate_layout(info.flags)
        };

        let texture = Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            name: info.name,
            width: info.width,
            height: info.height,
            array_length,
            mip_count,
            format: info.format,
            handle,
            owned: true,
            device,
            state: RwLock::new(TextureState {
                flags: info.flags,
                layouts: vec![ImageLayout::Undefined; mip_count as usize],
                ..Default::default()
            }),
        };

        // Dropping the partially built texture releases the image on error.
        texture
            .device
            .initialize_texture(handle, info.data.as_deref(), layout)?;
        texture.state.write().layouts.fill(layout);
        texture.create_views()?;

        Ok(Arc::new(texture))
    }

    /// Wrap a backbuffer image owned by a swapchain
    pub fn from_swapchain_image(
        ctx: &RhiContext,
        handle: TextureHandle,
        name: impl Into<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> RhiResult<Arc<Self>> {
        let texture = Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            width,
            height,
            array_length: 1,
            mip_count: 1,
            format,
            handle,
            owned: false,
            device: ctx.device().clone(),
            state: RwLock::new(TextureState {
                flags: TextureFlags::RENDER_TARGET,
                layouts: vec![ImageLayout::Undefined],
                ..Default::default()
            }),
        };
        texture.create_views()?;
        Ok(Arc::new(texture))
    }

    fn create_views(&self) -> RhiResult<()> {
        let mut state = self.state.write();
        let flags = state.flags;
        let aspect = if self.format.is_depth() {
            ImageAspect::Depth
        } else {
            ImageAspect::Color
        };
        let dimension = if flags.contains(TextureFlags::CUBE) {
            TextureViewDimension::Cube
        } else if self.array_length > 1 {
            TextureViewDimension::D2Array
        } else {
            TextureViewDimension::D2
        };
        let array_dimension = if self.array_length > 1 {
            TextureViewDimension::D2Array
        } else {
            TextureViewDimension::D2
        };
        let view = |dimension, aspect, base_mip, mip_count, base_layer, layer_count| {
            self.device.create_texture_view(
                self.handle,
                &TextureViewDescriptor {
                    format: self.format,
                    dimension,
                    aspect,
                    base_mip,
                    mip_count,
                    base_layer,
                    layer_count,
                },
            )
        };

        if flags.contains(TextureFlags::SRV) {
            state.srv = Some(view(dimension, aspect, 0, self.mip_count, 0, self.array_length)?);
        }
        if flags.contains(TextureFlags::UAV) {
            state.uav = Some(view(array_dimension, aspect, 0, 1, 0, self.array_length)?);
        }
        if flags.contains(TextureFlags::PER_MIP_VIEWS) {
            for mip in 0..self.mip_count {
                if flags.contains(TextureFlags::SRV) {
                    let srv = view(array_dimension, aspect, mip, 1, 0, self.array_length)?;
                    state.srv_mips.push(srv);
                }
                if flags.contains(TextureFlags::UAV) {
                    let uav = view(array_dimension, aspect, mip, 1, 0, self.array_length)?;
                    state.uav_mips.push(uav);
                }
            }
        }
        if flags.intersects(TextureFlags::RENDER_TARGET | TextureFlags::DEPTH_STENCIL) {
            let attachment_aspect = ImageAspect::for_format(self.format);
            for layer in 0..self.array_length {
                let attachment = view(TextureViewDimension::D2, attachment_aspect, 0, 1, layer, 1)?;
                state.attachment_views.push(attachment);
            }
        }

        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mip_width(&self, mip: u32) -> u32 {
        (self.width >> mip).max(1)
    }

    pub fn mip_height(&self, mip: u32) -> u32 {
        (self.height >> mip).max(1)
    }

    pub fn array_length(&self) -> u32 {
        self.array_length
    }

    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn flags(&self) -> TextureFlags {
        self.state.read().flags
    }

    pub fn is_srv(&self) -> bool {
        self.flags().contains(TextureFlags::SRV)
    }

    pub fn is_uav(&self) -> bool {
        self.flags().contains(TextureFlags::UAV)
    }

    pub fn is_render_target(&self) -> bool {
        self.flags().contains(TextureFlags::RENDER_TARGET)
    }

    pub fn has_per_mip_views(&self) -> bool {
        self.flags().contains(TextureFlags::PER_MIP_VIEWS)
    }

    pub fn is_depth_format(&self) -> bool {
        self.format.is_depth()
    }

    pub fn aspect(&self) -> ImageAspect {
        ImageAspect::for_format(self.format)
    }

    pub fn layout(&self, mip: u32) -> ImageLayout {
        self.state
            .read()
            .layouts
            .get(mip as usize)
            .copied()
            .unwrap_or_default()
    }

    /// Whether every mip in the range is already in `layout`
    pub fn is_in_layout(&self, layout: ImageLayout, mip: Option<u32>, ranged: bool) -> bool {
        let (start, count) = self.mip_range(mip, ranged);
        self.state.read().layouts[start..start + count]
            .iter()
            .all(|l| *l == layout)
    }

    /// Sampled view over all mips, or a single mip when `mip` is given
    pub fn srv(&self, mip: Option<u32>) -> Option<TextureViewHandle> {
        let state = self.state.read();
        match mip {
            None => state.srv,
            Some(mip) => state.srv_mips.get(mip as usize).copied(),
        }
    }

    /// Storage view of mip 0, or of a single mip when `mip` is given
    pub fn uav(&self, mip: Option<u32>) -> Option<TextureViewHandle> {
        let state = self.state.read();
        match mip {
            None => state.uav,
            Some(mip) => state.uav_mips.get(mip as usize).copied(),
        }
    }

    pub fn attachment_view(&self, array_index: u32) -> Option<TextureViewHandle> {
        self.state
            .read()
            .attachment_views
            .get(array_index as usize)
            .copied()
    }

    fn mip_range(&self, mip: Option<u32>, ranged: bool) -> (usize, usize) {
        match mip {
            None => (0, self.mip_count as usize),
            Some(mip) => {
                assert!(
                    mip < self.mip_count,
                    "Mip {} out of range for texture {} with {} mips",
                    mip,
                    self.name,
                    self.mip_count
                );
                let count = if ranged { self.mip_count - mip } else { 1 };
                (mip as usize, count as usize)
            }
        }
    }

    /// Transition a mip range into `layout`.
    ///
    /// `mip: None` covers every mip. A single mip covers the rest of the
    /// chain when `ranged` is set. Mips already in `layout` record nothing.
    pub fn set_layout(
        &self,
        layout: ImageLayout,
        cmd: &mut CommandList,
        mip: Option<u32>,
        ranged: bool,
    ) {
        let (start, count) = self.mip_range(mip, ranged);
        let end = start + count;
        let mut state = self.state.write();

        let mut current = start;
        while current < end {
            let old_layout = state.layouts[current];
            let mut run_end = current + 1;
            while run_end < end && state.layouts[run_end] == old_layout {
                run_end += 1;
            }

            if old_layout != layout {
                cmd.insert_barrier(ImageBarrier {
                    texture: self.handle,
                    aspect: self.aspect(),
                    base_mip: current as u32,
                    mip_count: (run_end - current) as u32,
                    base_layer: 0,
                    layer_count: self.array_length,
                    old_layout,
                    new_layout: layout,
                });
            }
            current = run_end;
        }

        state.layouts[start..end].fill(layout);
    }

    /// Drop per-mip views once mips have been generated.
    ///
    /// Clears the `PER_MIP_VIEWS` and `UAV` flags.
    pub fn release_mip_views(&self) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let views = state
            .srv_mips
            .drain(..)
            .chain(state.uav_mips.drain(..))
            .chain(state.uav.take());
        for view in views {
            self.device.destroy_texture_view(view);
        }
        state.flags.remove(TextureFlags::PER_MIP_VIEWS | TextureFlags::UAV);
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let views = state
            .srv
            .take()
            .into_iter()
            .chain(state.uav.take())
            .chain(state.srv_mips.drain(..))
            .chain(state.uav_mips.drain(..))
            .chain(state.attachment_views.drain(..));
        for view in views {
            self.device.destroy_texture_view(view);
        }
        if self.owned {
            self.device.destroy_texture(self.handle);
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mip_count", &self.mip_count)
            .field("format", &self.format)
            .finish()
    }
}

fn usage_for(flags: TextureFlags, format: TextureFormat) -> TextureUsage {
    let mut usage = TextureUsage::TRANSFER_SRC | TextureUsage::TRANSFER_DST;
    if flags.contains(TextureFlags::SRV) {
        usage |= TextureUsage::SAMPLED;
    }
    if flags.contains(TextureFlags::UAV) {
        usage |= TextureUsage::STORAGE;
    }
    if flags.contains(TextureFlags::RENDER_TARGET) && !format.is_depth() {
        usage |= TextureUsage::COLOR_ATTACHMENT;
    }
    if flags.contains(TextureFlags::DEPTH_STENCIL) || (flags.contains(TextureFlags::RENDER_TARGET) && format.is_depth()) {
        usage |= TextureUsage::DEPTH_STENCIL_ATTACHMENT;
    }
    usage
}

/// Layout a freshly created texture is moved into
fn appropriate_layout(flags: TextureFlags) -> ImageLayout {
    if flags.contains(TextureFlags::RENDER_TARGET) {
        ImageLayout::ColorAttachment
    } else if flags.contains(TextureFlags::DEPTH_STENCIL) {
        ImageLayout::DepthStencilAttachment
    } else if flags.contains(TextureFlags::UAV) {
        ImageLayout::General
    } else if flags.contains(TextureFlags::SRV) {
        ImageLayout::ShaderReadOnly
    } else {
        ImageLayout::General
    }
}

/// Number of mips of a full chain
pub fn mip_count_for(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_count_for() {
        assert_eq!(mip_count_for(1, 1), 1);
        assert_eq!(mip_count_for(256, 128), 9);
        assert_eq!(mip_count_for(1920, 1080), 11);
    }

    #[test]
    fn test_appropriate_layout() {
        assert_eq!(
            appropriate_layout(TextureFlags::SRV | TextureFlags::RENDER_TARGET),
            ImageLayout::ColorAttachment
        );
        assert_eq!(
            appropriate_layout(TextureFlags::SRV | TextureFlags::DEPTH_STENCIL),
            ImageLayout::DepthStencilAttachment
        );
        assert_eq!(
            appropriate_layout(TextureFlags::SRV | TextureFlags::UAV),
            ImageLayout::General
        );
        assert_eq!(appropriate_layout(TextureFlags::SRV), ImageLayout::ShaderReadOnly);
    }

    #[test]
    fn test_usage_for_depth_target() {
        let usage = usage_for(
            TextureFlags::SRV | TextureFlags::DEPTH_STENCIL,
            TextureFormat::Depth32Float,
        );
        assert!(usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT));
        assert!(!usage.contains(TextureUsage::COLOR_ATTACHMENT));
    }
}
