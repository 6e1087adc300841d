//! CPU mirrors of the shader constant buffers
//!
//! Every struct is `#[repr(C)]` and laid out in 16 byte rows so it can be
//! uploaded with `bytemuck` as is. [`DynamicBuffer`] pairs a mirror with its
//! [`ConstantBuffer`] and rebinds it after every update.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::backend::RhiResult;
use crate::rhi::{CommandList, ConstantBuffer, RhiContext};

/// Constant buffer slots shared by every shader
pub mod slot {
    pub const FRAME: u32 = 0;
    pub const UBER: u32 = 1;
    pub const LIGHT: u32 = 2;
    pub const MATERIAL: u32 = 3;
}

/// Feature bits of [`CbFrame::options`]
pub mod frame_options {
    pub const SSR: u32 = 1 << 0;
    pub const TAA_UPSAMPLE: u32 = 1 << 1;
    pub const SSAO: u32 = 1 << 2;
    pub const SSAO_GI: u32 = 1 << 3;
}

/// Option bits of [`CbLight::options`]
pub mod light_options {
    pub const DIRECTIONAL: u32 = 1 << 0;
    pub const POINT: u32 = 1 << 1;
    pub const SPOT: u32 = 1 << 2;
    pub const SHADOWS: u32 = 1 << 3;
    pub const SHADOWS_TRANSPARENT: u32 = 1 << 4;
    pub const SHADOWS_SCREEN_SPACE: u32 = 1 << 5;
    pub const VOLUMETRIC: u32 = 1 << 6;
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CbFrame {
    pub view: Mat4,
    pub projection: Mat4,
    pub projection_inverted: Mat4,
    pub projection_ortho: Mat4,
    pub view_projection: Mat4,
    pub view_projection_inv: Mat4,
    pub view_projection_ortho: Mat4,
    pub view_projection_unjittered: Mat4,
    pub view_projection_previous: Mat4,

    pub delta_time: f32,
    pub time: f32,
    pub frame: u32,
    pub camera_aperture: f32,

    pub camera_shutter_speed: f32,
    pub camera_iso: f32,
    pub camera_near: f32,
    pub camera_far: f32,

    pub camera_position: [f32; 3],
    pub bloom_intensity: f32,

    pub sharpen_strength: f32,
    pub camera_direction: [f32; 3],

    pub gamma: f32,
    pub tonemapping: f32,
    pub directional_light_intensity: f32,
    pub shadow_resolution: f32,

    pub resolution_render: [f32; 2],
    pub resolution_output: [f32; 2],

    pub taa_jitter_offset: [f32; 2],
    pub fog: f32,
    pub options: u32,

    pub frame_mip_count: f32,
    pub ssr_mip_count: f32,
    pub resolution_environment: [f32; 2],
}

impl Default for CbFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl CbFrame {
    pub fn set_bit(&mut self, bit: u32, enabled: bool) {
        if enabled {
            self.options |= bit;
        } else {
            self.options &= !bit;
        }
    }
}

/// Per draw and per dispatch data
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CbUber {
    pub transform: Mat4,
    pub transform_previous: Mat4,

    pub mat_color: [f32; 4],

    pub mat_tiling_uv: [f32; 2],
    pub mat_offset_uv: [f32; 2],

    pub mat_roughness_mul: f32,
    pub mat_metallic_mul: f32,
    pub mat_normal_mul: f32,
    pub mat_height_mul: f32,

    pub color: [f32; 4],

    pub transform_axis: [f32; 3],
    pub is_transparent_pass: u32,

    pub resolution_rt: [f32; 2],
    pub blur_direction: [f32; 2],

    pub blur_sigma: f32,
    pub blur_stride: f32,
    pub mat_id: u32,
    pub mip_index: u32,

    pub options_debug: u32,
    pub padding: [u32; 3],
}

impl Default for CbUber {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            transform_previous: Mat4::IDENTITY,
            ..Self::zeroed()
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CbLight {
    pub view_projection: [Mat4; 6],
    pub intensity_range_angle_bias: [f32; 4],

    pub color: [f32; 3],
    pub normal_bias: f32,

    pub position: [f32; 3],
    pub options: u32,

    pub direction: [f32; 3],
    pub padding: f32,

    pub shadow_array_length: u32,
    pub padding2: [u32; 3],
}

impl Default for CbLight {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// One material instance as the lighting shaders read it
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialEntry {
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub anisotropic: f32,
    pub anisotropic_rotation: f32,

    pub sheen: f32,
    pub sheen_tint: f32,
    pub ior: f32,
    pub roughness: f32,

    pub metallic: f32,
    pub normal: f32,
    pub height: f32,
    pub padding: [f32; 5],
}

/// Fixed capacity array of material instances. Index 0 is reserved.
#[derive(Debug, Clone, PartialEq)]
pub struct CbMaterial {
    pub entries: Vec<MaterialEntry>,
}

impl CbMaterial {
    pub fn new(capacity: u32) -> Self {
        Self {
            entries: vec![MaterialEntry::default(); capacity.max(1) as usize],
        }
    }

    pub fn capacity(&self) -> u32 {
        self.entries.len() as u32
    }
}

/// Anything uploadable into a constant buffer slot
pub trait ConstantData {
    const SLOT: u32;

    fn bytes(&self) -> &[u8];
}

macro_rules! impl_constant_data {
    ($($ty:ty => $slot:expr),* $(,)?) => {
        $(
            impl ConstantData for $ty {
                const SLOT: u32 = $slot;

                fn bytes(&self) -> &[u8] {
                    bytemuck::bytes_of(self)
                }
            }
        )*
    };
}

impl_constant_data! {
    CbFrame => slot::FRAME,
    CbUber => slot::UBER,
    CbLight => slot::LIGHT,
}

impl ConstantData for CbMaterial {
    const SLOT: u32 = slot::MATERIAL;

    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.entries)
    }
}

/// A CPU mirror plus the GPU buffer it is uploaded into
pub struct DynamicBuffer<T: ConstantData> {
    pub data: T,
    buffer: ConstantBuffer,
}

impl<T: ConstantData> DynamicBuffer<T> {
    pub fn new(
        ctx: &Arc<RhiContext>,
        name: &str,
        data: T,
        offset_count: u32,
    ) -> RhiResult<Self> {
        let buffer = ConstantBuffer::new(ctx, name, data.bytes().len(), offset_count)?;
        Ok(Self { data, buffer })
    }

    /// Upload the mirror if it changed and bind the resulting slot.
    ///
    /// Returns false when the upload failed.
    pub fn update(&mut self, cmd: &mut CommandList) -> bool {
        match self.buffer.update(cmd, self.data.bytes()) {
            Ok(_) => {
                cmd.set_constant_buffer(T::SLOT, &self.buffer);
                true
            }
            Err(e) => {
                log::error!("Failed to update {}: {e}", self.buffer.name());
                false
            }
        }
    }

    pub fn bind(&self, cmd: &mut CommandList) {
        cmd.set_constant_buffer(T::SLOT, &self.buffer);
    }

    pub fn reset_offset(&mut self) {
        self.buffer.reset_offset();
    }

    pub fn buffer(&self) -> &ConstantBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_are_row_aligned() {
        assert_eq!(std::mem::size_of::<CbFrame>(), 704);
        assert_eq!(std::mem::size_of::<CbUber>(), 256);
        assert_eq!(std::mem::size_of::<CbLight>(), 464);
        assert_eq!(std::mem::size_of::<MaterialEntry>(), 64);
    }

    #[test]
    fn test_material_bytes_cover_capacity() {
        let materials = CbMaterial::new(1024);
        assert_eq!(materials.bytes().len(), 64 * 1024);
    }

    #[test]
    fn test_option_bits() {
        let mut frame = CbFrame::default();
        frame.set_bit(frame_options::SSAO, true);
        frame.set_bit(frame_options::SSR, true);
        frame.set_bit(frame_options::SSR, false);
        assert_eq!(frame.options, frame_options::SSAO);
    }
}
