//! Renderer configuration

use crate::backend::TextureFormat;

/// Settings fixed at renderer creation
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Backbuffers in the swapchain, also the number of command lists
    pub swapchain_buffer_count: u32,
    pub swapchain_format: TextureFormat,
    /// Material slots in the material constant buffer; slot 0 is reserved
    pub max_material_instances: u32,
    /// Compute threads per group along x and y
    pub thread_group_count: u32,
    pub vsync: bool,
    /// Initial depth convention, also available as a renderer option
    pub reverse_z: bool,
    pub validation: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            swapchain_buffer_count: 3,
            swapchain_format: TextureFormat::Rgba8Unorm,
            max_material_instances: 1024,
            thread_group_count: 8,
            vsync: false,
            reverse_z: true,
            validation: cfg!(debug_assertions),
        }
    }
}

impl RendererConfig {
    pub fn with_max_material_instances(mut self, count: u32) -> Self {
        self.max_material_instances = count.max(2);
        self
    }

    pub fn with_swapchain_buffer_count(mut self, count: u32) -> Self {
        self.swapchain_buffer_count = count.max(2);
        self
    }

    /// Groups needed to cover `size` pixels
    pub fn thread_groups(&self, size: u32) -> u32 {
        size.div_ceil(self.thread_group_count.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_groups_round_up() {
        let config = RendererConfig::default();
        assert_eq!(config.thread_groups(1920), 240);
        assert_eq!(config.thread_groups(1081), 136);
    }
}
