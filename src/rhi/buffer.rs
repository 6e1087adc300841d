//! Vertex, index and structured buffers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::Pod;

use crate::backend::{
    BufferDescriptor, BufferHandle, BufferUsage, GpuDevice, IndexFormat, RhiResult,
};

use super::RhiContext;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Host visible device buffer released on drop
struct RawBuffer {
    id: u64,
    handle: BufferHandle,
    size: u64,
    device: Arc<dyn GpuDevice>,
}

impl RawBuffer {
    fn new(ctx: &RhiContext, label: &str, size: u64, usage: BufferUsage) -> RhiResult<Self> {
        let device = ctx.device().clone();
        let handle = device.create_buffer(&BufferDescriptor {
            label: label.to_string(),
            size,
            usage,
        })?;
        Ok(Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            handle,
            size,
            device,
        })
    }

    fn write(&self, offset: u64, data: &[u8]) -> RhiResult<()> {
        self.device.write_buffer(self.handle, offset, data)
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.handle);
    }
}

/// Vertex buffer that can be refilled and grown
pub struct VertexBuffer {
    name: String,
    buffer: RawBuffer,
    stride: u32,
    vertex_count: u32,
}

impl VertexBuffer {
    pub fn new<T: Pod>(ctx: &RhiContext, name: impl Into<String>, vertices: &[T]) -> RhiResult<Self> {
        let name = name.into();
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let buffer = RawBuffer::new(ctx, &name, bytes.len().max(1) as u64, BufferUsage::VERTEX)?;
        buffer.write(0, bytes)?;
        Ok(Self {
            name,
            buffer,
            stride: std::mem::size_of::<T>() as u32,
            vertex_count: vertices.len() as u32,
        })
    }

    /// Empty buffer with room for `capacity` vertices
    pub fn new_dynamic<T: Pod>(
        ctx: &RhiContext,
        name: impl Into<String>,
        capacity: u32,
    ) -> RhiResult<Self> {
        let name = name.into();
        let stride = std::mem::size_of::<T>() as u32;
        let size = (stride as u64 * capacity.max(1) as u64).max(1);
        let buffer = RawBuffer::new(ctx, &name, size, BufferUsage::VERTEX)?;
        Ok(Self {
            name,
            buffer,
            stride,
            vertex_count: 0,
        })
    }

    /// Replace the contents, reallocating when the data no longer fits
    pub fn update<T: Pod>(&mut self, ctx: &RhiContext, vertices: &[T]) -> RhiResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        if bytes.len() as u64 > self.buffer.size {
            let size = (bytes.len() as u64).next_power_of_two();
            log::debug!("Growing vertex buffer {} to {} bytes", self.name, size);
            self.buffer = RawBuffer::new(ctx, &self.name, size, BufferUsage::VERTEX)?;
        }
        self.buffer.write(0, bytes)?;
        self.stride = std::mem::size_of::<T>() as u32;
        self.vertex_count = vertices.len() as u32;
        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.buffer.id
    }

    pub fn handle(&self) -> BufferHandle {
        self.buffer.handle
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Vertices that fit without reallocating
    pub fn capacity(&self) -> u32 {
        if self.stride == 0 {
            0
        } else {
            (self.buffer.size / self.stride as u64) as u32
        }
    }
}

pub struct IndexBuffer {
    buffer: RawBuffer,
    format: IndexFormat,
    index_count: u32,
}

impl IndexBuffer {
    pub fn new_u32(ctx: &RhiContext, name: &str, indices: &[u32]) -> RhiResult<Self> {
        Self::new(ctx, name, bytemuck::cast_slice(indices), IndexFormat::Uint32, indices.len())
    }

    pub fn new_u16(ctx: &RhiContext, name: &str, indices: &[u16]) -> RhiResult<Self> {
        Self::new(ctx, name, bytemuck::cast_slice(indices), IndexFormat::Uint16, indices.len())
    }

    fn new(
        ctx: &RhiContext,
        name: &str,
        bytes: &[u8],
        format: IndexFormat,
        index_count: usize,
    ) -> RhiResult<Self> {
        let buffer = RawBuffer::new(ctx, name, bytes.len().max(1) as u64, BufferUsage::INDEX)?;
        buffer.write(0, bytes)?;
        Ok(Self {
            buffer,
            format,
            index_count: index_count as u32,
        })
    }

    pub fn id(&self) -> u64 {
        self.buffer.id
    }

    pub fn handle(&self) -> BufferHandle {
        self.buffer.handle
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Storage buffer bound in the UAV binding space
pub struct StructuredBuffer {
    buffer: RawBuffer,
    stride: u32,
    element_count: u32,
}

impl StructuredBuffer {
    pub fn new(ctx: &RhiContext, name: &str, stride: u32, element_count: u32) -> RhiResult<Self> {
        let size = (stride as u64 * element_count as u64).max(4);
        let buffer = RawBuffer::new(ctx, name, size, BufferUsage::STORAGE)?;
        Ok(Self {
            buffer,
            stride,
            element_count,
        })
    }

    pub fn update<T: Pod>(&self, data: &[T]) -> RhiResult<()> {
        self.buffer.write(0, bytemuck::cast_slice(data))
    }

    pub fn id(&self) -> u64 {
        self.buffer.id
    }

    pub fn handle(&self) -> BufferHandle {
        self.buffer.handle
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn size(&self) -> u64 {
        self.buffer.size
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;

    fn context() -> Arc<RhiContext> {
        RhiContext::new(Arc::new(DummyDevice::new())).unwrap()
    }

    #[test]
    fn test_vertex_buffer_grows_on_update() {
        let ctx = context();
        let mut buffer = VertexBuffer::new_dynamic::<[f32; 3]>(&ctx, "lines", 4).unwrap();
        assert_eq!(buffer.capacity(), 4);
        let first = buffer.id();

        buffer.update(&ctx, &[[0.0f32; 3]; 3]).unwrap();
        assert_eq!(buffer.id(), first);
        assert_eq!(buffer.vertex_count(), 3);

        buffer.update(&ctx, &[[1.0f32; 3]; 9]).unwrap();
        assert_ne!(buffer.id(), first);
        assert_eq!(buffer.vertex_count(), 9);
        assert!(buffer.capacity() >= 9);
    }

    #[test]
    fn test_index_buffer_format() {
        let ctx = context();
        let buffer = IndexBuffer::new_u16(&ctx, "quad", &[0, 1, 2, 2, 3, 0]).unwrap();
        assert_eq!(buffer.format(), IndexFormat::Uint16);
        assert_eq!(buffer.index_count(), 6);
    }
}
