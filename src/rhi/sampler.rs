use std::sync::Arc;

use crate::backend::{GpuDevice, RhiResult, SamplerDescriptor, SamplerHandle};

use super::RhiContext;

/// Device sampler destroyed on drop
pub struct Sampler {
    handle: SamplerHandle,
    desc: SamplerDescriptor,
    device: Arc<dyn GpuDevice>,
}

impl Sampler {
    pub fn new(ctx: &RhiContext, desc: SamplerDescriptor) -> RhiResult<Arc<Self>> {
        let device = ctx.device().clone();
        let handle = device.create_sampler(&desc)?;
        Ok(Arc::new(Self {
            handle,
            desc,
            device,
        }))
    }

    pub fn handle(&self) -> SamplerHandle {
        self.handle
    }

    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.desc
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.device.destroy_sampler(self.handle);
    }
}
