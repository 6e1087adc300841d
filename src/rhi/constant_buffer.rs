//! Dynamic constant buffers
//!
//! A constant buffer holds `offset_count` slots of `stride` bytes. Every
//! update that changes the contents writes into the next slot, so draws
//! recorded earlier in the frame keep reading their own data. The slot index
//! is reset once per swapchain cycle; running out of slots flushes the command
//! list and grows the buffer to the next power of two.

use std::sync::Arc;

use crate::backend::{BufferDescriptor, BufferHandle, BufferUsage, RhiResult};

use super::{CommandList, Counter, RhiContext};

pub struct ConstantBuffer {
    ctx: Arc<RhiContext>,
    name: String,
    handle: Option<BufferHandle>,
    element_size: u64,
    stride: u64,
    offset_count: u32,
    offset_index: Option<u32>,
    // Slot the last write went to, kept across offset resets
    bound_index: Option<u32>,
    previous: Vec<u8>,
    upload_count: u64,
}

impl ConstantBuffer {
    pub fn new(
        ctx: &Arc<RhiContext>,
        name: impl Into<String>,
        element_size: usize,
        offset_count: u32,
    ) -> RhiResult<Self> {
        let alignment = ctx.limits().min_uniform_buffer_offset_alignment.max(1) as u64;
        let element_size = element_size as u64;
        let mut buffer = Self {
            ctx: ctx.clone(),
            name: name.into(),
            handle: None,
            element_size,
            stride: element_size.div_ceil(alignment) * alignment,
            offset_count: offset_count.max(1),
            offset_index: None,
            bound_index: None,
            previous: Vec::new(),
            upload_count: 0,
        };
        buffer.handle = Some(buffer.allocate(buffer.offset_count)?);
        Ok(buffer)
    }

    fn allocate(&self, offset_count: u32) -> RhiResult<BufferHandle> {
        self.ctx.device().create_buffer(&BufferDescriptor {
            label: self.name.clone(),
            size: self.stride * offset_count as u64,
            usage: BufferUsage::CONSTANT,
        })
    }

    /// Upload `data` unless it matches the last upload.
    ///
    /// Returns whether anything was written. The caller rebinds the buffer
    /// afterwards since the bound offset moves with every write.
    pub fn update(&mut self, cmd: &mut CommandList, data: &[u8]) -> RhiResult<bool> {
        assert_eq!(
            data.len() as u64,
            self.element_size,
            "Constant buffer {} expects {} bytes",
            self.name,
            self.element_size
        );

        if self.previous == data {
            return Ok(false);
        }

        let mut index = self.offset_index.map_or(0, |index| index + 1);
        // Draws recorded before a reset may still read the bound slot
        if self.bound_index == Some(index) {
            index += 1;
        }
        if index >= self.offset_count {
            cmd.flush(true);
            // Command lists of earlier frames may still read the old buffer.
            self.ctx.queue_wait_idle();
            let offset_count = (index + 1).next_power_of_two();
            let handle = self.allocate(offset_count)?;
            if let Some(old) = self.handle.replace(handle) {
                self.ctx.device().destroy_buffer(old);
            }
            self.offset_count = offset_count;
            log::info!(
                "Constant buffer {} has been re-allocated with {} offsets",
                self.name,
                self.offset_count
            );
        }

        let handle = self.handle();
        self.ctx
            .device()
            .write_buffer(handle, index as u64 * self.stride, data)?;
        self.offset_index = Some(index);
        self.bound_index = Some(index);
        self.previous.clear();
        self.previous.extend_from_slice(data);
        self.upload_count += 1;
        self.ctx.profiler().increment(Counter::ConstantBufferUpdates);
        Ok(true)
    }

    /// Start writing from slot 0 again.
    ///
    /// The last upload stays bound, so unchanged data is not written again.
    pub fn reset_offset(&mut self) {
        self.offset_index = None;
    }

    pub fn handle(&self) -> BufferHandle {
        match self.handle {
            Some(handle) => handle,
            None => panic!("Constant buffer {} has no backing buffer", self.name),
        }
    }

    /// Dynamic offset of the slot written last
    pub fn offset(&self) -> u32 {
        (self.bound_index.unwrap_or(0) as u64 * self.stride) as u32
    }

    pub fn offset_index(&self) -> Option<u32> {
        self.offset_index
    }

    pub fn offset_count(&self) -> u32 {
        self.offset_count
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Bytes visible to shaders through one binding
    pub fn range(&self) -> u64 {
        self.element_size
    }

    pub fn upload_count(&self) -> u64 {
        self.upload_count
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ConstantBuffer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.ctx.device().destroy_buffer(handle);
        }
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;

    fn setup() -> (Arc<DummyDevice>, Arc<RhiContext>, CommandList) {
        let device = Arc::new(DummyDevice::new());
        let ctx = RhiContext::new(device.clone()).unwrap();
        let mut cmd = CommandList::new(&ctx, "test").unwrap();
        assert!(cmd.begin());
        (device, ctx, cmd)
    }

    #[test]
    fn test_stride_is_aligned() {
        let (_, ctx, _) = setup();
        let buffer = ConstantBuffer::new(&ctx, "frame", 80, 4).unwrap();
        assert_eq!(buffer.stride(), 256);
        assert_eq!(buffer.range(), 80);
    }

    #[test]
    fn test_identical_data_is_skipped() {
        let (_, ctx, mut cmd) = setup();
        let mut buffer = ConstantBuffer::new(&ctx, "frame", 16, 4).unwrap();

        assert!(buffer.update(&mut cmd, &[1; 16]).unwrap());
        assert!(!buffer.update(&mut cmd, &[1; 16]).unwrap());
        assert!(buffer.update(&mut cmd, &[2; 16]).unwrap());

        assert_eq!(buffer.upload_count(), 2);
        assert_eq!(buffer.offset_index(), Some(1));
        assert_eq!(buffer.offset(), 256);
    }

    #[test]
    fn test_growth_to_next_power_of_two() {
        let (device, ctx, mut cmd) = setup();
        let mut buffer = ConstantBuffer::new(&ctx, "uber", 16, 2).unwrap();

        for value in 0..5u8 {
            buffer.update(&mut cmd, &[value; 16]).unwrap();
        }

        // Index 2 grew the buffer to 4 slots, index 4 grew it to 8.
        assert_eq!(buffer.offset_count(), 8);
        assert_eq!(ctx.profiler().get(Counter::Flushes), 2);
        assert_eq!(device.buffer_contents(buffer.handle()).unwrap()[4 * 256], 4);
        assert!(cmd.is_recording());
    }

    #[test]
    fn test_reset_offset_keeps_last_upload() {
        let (_, ctx, mut cmd) = setup();
        let mut buffer = ConstantBuffer::new(&ctx, "light", 16, 4).unwrap();
        buffer.update(&mut cmd, &[6; 16]).unwrap();
        buffer.update(&mut cmd, &[7; 16]).unwrap();
        buffer.reset_offset();

        assert!(!buffer.update(&mut cmd, &[7; 16]).unwrap());
        assert_eq!(buffer.offset(), 256);
        assert_eq!(buffer.upload_count(), 2);

        assert!(buffer.update(&mut cmd, &[8; 16]).unwrap());
        assert_eq!(buffer.offset_index(), Some(0));
        assert_eq!(buffer.offset(), 0);
    }

    #[test]
    fn test_reset_offset_skips_bound_slot() {
        let (_, ctx, mut cmd) = setup();
        let mut buffer = ConstantBuffer::new(&ctx, "light", 16, 4).unwrap();
        buffer.update(&mut cmd, &[1; 16]).unwrap();
        buffer.reset_offset();

        assert!(buffer.update(&mut cmd, &[2; 16]).unwrap());
        assert_eq!(buffer.offset_index(), Some(1));
    }

    #[test]
    fn test_failed_growth_keeps_old_buffer() {
        let (device, ctx, mut cmd) = setup();
        let mut buffer = ConstantBuffer::new(&ctx, "uber", 16, 2).unwrap();
        buffer.update(&mut cmd, &[1; 16]).unwrap();
        buffer.update(&mut cmd, &[2; 16]).unwrap();
        let handle = buffer.handle();

        device.set_buffer_size_limit(Some(512));
        assert!(matches!(
            buffer.update(&mut cmd, &[3; 16]),
            Err(crate::backend::RhiError::OutOfMemory)
        ));
        assert_eq!(buffer.handle(), handle);
        assert_eq!(buffer.offset_count(), 2);
        assert_eq!(buffer.offset(), 256);
        assert!(device.buffer_contents(handle).is_some());
    }
}
