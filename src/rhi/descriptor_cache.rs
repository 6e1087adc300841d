//! Descriptor set layouts and descriptor sets
//!
//! Layouts are merged from the reflected bindings of a pipeline state's
//! shaders and cached by shader ids. Sets are cached by the resources they
//! reference; dynamic constant buffer offsets are supplied at bind time and
//! are not part of the key.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::backend::{
    DescriptorBinding, DescriptorSetHandle, DescriptorSetLayoutHandle, DescriptorWrite, GpuDevice,
    RhiError, RhiResult,
};

use super::PipelineState;

#[derive(Debug)]
pub struct DescriptorSetLayout {
    handle: DescriptorSetLayoutHandle,
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayout {
    pub fn handle(&self) -> DescriptorSetLayoutHandle {
        self.handle
    }

    /// Bindings sorted by binding number
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    pub fn dynamic_offset_count(&self) -> usize {
        self.bindings
            .iter()
            .filter(|binding| binding.ty == crate::backend::DescriptorType::ConstantBuffer)
            .count()
    }
}

pub struct DescriptorCache {
    layouts: HashMap<u64, Arc<DescriptorSetLayout>>,
    sets: HashMap<u64, DescriptorSetHandle>,
    capacity: u32,
    allocated: u32,
}

impl DescriptorCache {
    pub fn new(capacity: u32) -> Self {
        Self {
            layouts: HashMap::new(),
            sets: HashMap::new(),
            capacity,
            allocated: 0,
        }
    }

    pub fn get_or_create_layout(
        &mut self,
        device: &dyn GpuDevice,
        pso: &PipelineState,
    ) -> RhiResult<Arc<DescriptorSetLayout>> {
        let shaders = [&pso.shader_vertex, &pso.shader_pixel, &pso.shader_compute];

        let mut hasher = DefaultHasher::new();
        for shader in shaders {
            shader.as_ref().map(|shader| shader.id()).hash(&mut hasher);
        }
        let key = hasher.finish();

        if let Some(layout) = self.layouts.get(&key) {
            return Ok(layout.clone());
        }

        let mut merged: BTreeMap<u32, DescriptorBinding> = BTreeMap::new();
        for shader in shaders.into_iter().flatten() {
            for binding in shader.bindings() {
                match merged.get_mut(&binding.binding) {
                    Some(existing) if existing.ty == binding.ty => existing.stages |= binding.stages,
                    Some(existing) => log::warn!(
                        "Shader {} declares binding {} as {:?}, already declared as {:?}",
                        shader.name(),
                        binding.binding,
                        binding.ty,
                        existing.ty
                    ),
                    None => {
                        merged.insert(binding.binding, *binding);
                    }
                }
            }
        }
        let bindings: Vec<DescriptorBinding> = merged.into_values().collect();

        let handle = device.create_descriptor_set_layout(&bindings)?;
        log::debug!(
            "Created descriptor set layout for {} with {} bindings",
            pso.pass_name,
            bindings.len()
        );
        let layout = Arc::new(DescriptorSetLayout { handle, bindings });
        self.layouts.insert(key, layout.clone());
        Ok(layout)
    }

    pub fn get_or_allocate_set(
        &mut self,
        device: &dyn GpuDevice,
        layout: &DescriptorSetLayout,
        writes: &[DescriptorWrite],
    ) -> RhiResult<DescriptorSetHandle> {
        let mut hasher = DefaultHasher::new();
        layout.handle.hash(&mut hasher);
        writes.hash(&mut hasher);
        let key = hasher.finish();

        if let Some(set) = self.sets.get(&key) {
            return Ok(*set);
        }

        if self.allocated >= self.capacity {
            return Err(RhiError::DescriptorCreationFailed(format!(
                "descriptor pool exhausted ({} sets)",
                self.capacity
            )));
        }

        let set = device.allocate_descriptor_set(layout.handle, writes)?;
        self.allocated += 1;
        self.sets.insert(key, set);
        Ok(set)
    }

    /// Double the pool once it is full. Returns whether it grew.
    ///
    /// Only valid while no command list is recording, since every cached set
    /// is invalidated.
    pub fn grow_if_needed(&mut self, device: &dyn GpuDevice) -> RhiResult<bool> {
        if self.allocated < self.capacity {
            return Ok(false);
        }

        device.wait_idle()?;
        let capacity = self.capacity * 2;
        device.reset_descriptor_pool(capacity)?;
        self.capacity = capacity;
        self.allocated = 0;
        self.sets.clear();
        log::info!("Descriptor pool capacity has been increased to {}", capacity);
        Ok(true)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    pub fn layout_count(&self) -> usize {
        self.layouts.len()
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::{DescriptorResource, DummyDevice, SamplerHandle};

    fn write(binding: u32, sampler: u64) -> DescriptorWrite {
        DescriptorWrite {
            binding,
            resource: DescriptorResource::Sampler(SamplerHandle(sampler)),
        }
    }

    fn layout(device: &DummyDevice) -> DescriptorSetLayout {
        DescriptorSetLayout {
            handle: device.create_descriptor_set_layout(&[]).unwrap(),
            bindings: Vec::new(),
        }
    }

    #[test]
    fn test_sets_are_cached_by_resources() {
        let device = DummyDevice::new();
        let layout = layout(&device);
        let mut cache = DescriptorCache::new(4);

        let a = cache.get_or_allocate_set(&device, &layout, &[write(300, 1)]).unwrap();
        let b = cache.get_or_allocate_set(&device, &layout, &[write(300, 1)]).unwrap();
        let c = cache.get_or_allocate_set(&device, &layout, &[write(300, 2)]).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(cache.allocated(), 2);
    }

    #[test]
    fn test_pool_grows_when_full() {
        let device = DummyDevice::new();
        let layout = layout(&device);
        let mut cache = DescriptorCache::new(2);

        cache.get_or_allocate_set(&device, &layout, &[write(300, 1)]).unwrap();
        assert!(!cache.grow_if_needed(&device).unwrap());
        cache.get_or_allocate_set(&device, &layout, &[write(300, 2)]).unwrap();
        assert!(cache.get_or_allocate_set(&device, &layout, &[write(300, 3)]).is_err());

        assert!(cache.grow_if_needed(&device).unwrap());
        assert_eq!(cache.capacity(), 4);
        assert_eq!(cache.allocated(), 0);
        assert_eq!(device.stats().descriptor_pool_resets, 1);
        assert_eq!(device.stats().wait_idles, 1);
    }
}
