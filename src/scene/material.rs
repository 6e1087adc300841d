//! Material definitions for PBR rendering

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use glam::{Vec2, Vec4};

use crate::rhi::Texture;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Texture slots a material can fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialTexture {
    Albedo,
    Roughness,
    Metallic,
    Normal,
    Height,
    Occlusion,
    Emission,
    AlphaMask,
}

impl MaterialTexture {
    pub const COUNT: usize = 8;

    pub const ALL: [MaterialTexture; Self::COUNT] = [
        MaterialTexture::Albedo,
        MaterialTexture::Roughness,
        MaterialTexture::Metallic,
        MaterialTexture::Normal,
        MaterialTexture::Height,
        MaterialTexture::Occlusion,
        MaterialTexture::Emission,
        MaterialTexture::AlphaMask,
    ];

    pub fn flag(&self) -> MaterialFlags {
        MaterialFlags::from_bits_truncate(1 << (*self as u32))
    }
}

bitflags! {
    /// Which texture slots are populated; selects the G-buffer shader variant
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        const ALBEDO = 1 << 0;
        const ROUGHNESS = 1 << 1;
        const METALLIC = 1 << 2;
        const NORMAL = 1 << 3;
        const HEIGHT = 1 << 4;
        const OCCLUSION = 1 << 5;
        const EMISSION = 1 << 6;
        const ALPHA_MASK = 1 << 7;
    }
}

/// PBR material properties
#[derive(Debug, Clone)]
pub struct Material {
    id: u64,
    pub name: String,
    pub color: Vec4,
    pub roughness: f32,
    pub metallic: f32,
    pub normal: f32,
    pub height: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub sheen: f32,
    pub anisotropic: f32,
    pub ior: f32,
    pub tiling: Vec2,
    pub offset: Vec2,
    textures: [Option<Arc<Texture>>; MaterialTexture::COUNT],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            id: NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed),
            name: "default".to_string(),
            color: Vec4::ONE,
            roughness: 0.9,
            metallic: 0.0,
            normal: 0.0,
            height: 0.0,
            clearcoat: 0.0,
            clearcoat_roughness: 0.0,
            sheen: 0.0,
            anisotropic: 0.0,
            ior: 1.5,
            tiling: Vec2::ONE,
            offset: Vec2::ZERO,
            textures: Default::default(),
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic;
        self
    }

    pub fn with_texture(mut self, slot: MaterialTexture, texture: Arc<Texture>) -> Self {
        self.textures[slot as usize] = Some(texture);
        self
    }

    /// Unique per material instance, used to coalesce binds
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn texture(&self, slot: MaterialTexture) -> Option<&Arc<Texture>> {
        self.textures[slot as usize].as_ref()
    }

    pub fn flags(&self) -> MaterialFlags {
        MaterialTexture::ALL
            .iter()
            .filter(|slot| self.textures[**slot as usize].is_some())
            .fold(MaterialFlags::empty(), |flags, slot| flags | slot.flag())
    }

    pub fn is_transparent(&self) -> bool {
        self.color.w < 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_from_albedo_alpha() {
        assert!(!Material::new("opaque").is_transparent());
        assert!(Material::new("glass")
            .with_color(Vec4::new(1.0, 1.0, 1.0, 0.5))
            .is_transparent());
    }

    #[test]
    fn test_unique_ids() {
        let a = Material::new("a");
        let b = Material::new("b");
        assert_ne!(a.id(), b.id());
        assert!(a.flags().is_empty());
    }

    #[test]
    fn test_slot_flags() {
        assert_eq!(MaterialTexture::Albedo.flag(), MaterialFlags::ALBEDO);
        assert_eq!(MaterialTexture::AlphaMask.flag(), MaterialFlags::ALPHA_MASK);
    }
}
