//! Device abstraction layer
//!
//! Provides the traits and types that the Vulkan and dummy devices implement.

pub mod traits;
pub mod types;

#[cfg(feature = "dummy")]
pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub use traits::*;
pub use types::*;

#[cfg(feature = "dummy")]
pub use dummy::{DummyDevice, DummyStats};

#[cfg(feature = "vulkan-backend")]
pub use vulkan::VulkanDevice;
