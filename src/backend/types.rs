//! Common types shared between devices

use std::hash::{Hash, Hasher};

use bitflags::bitflags;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    R16Float,
    R32Float,
    Rg16Float,
    Rg32Float,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgb10A2Unorm,
    Rg11b10Float,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    Depth32FloatStencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth32FloatStencil8
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::Depth32FloatStencil8)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::R16Float => 2,
            TextureFormat::R32Float
            | TextureFormat::Rg16Float
            | TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Rgb10A2Unorm
            | TextureFormat::Rg11b10Float
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rg32Float
            | TextureFormat::Rgba16Float
            | TextureFormat::Depth32FloatStencil8 => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// GPU access layout of an image subresource.
///
/// Every command touching a texture expects a specific layout; the command
/// list records a barrier whenever the tracked layout differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    Preinitialized,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    Present,
}

/// Which aspects of an image a view or barrier addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAspect {
    Color,
    Depth,
    DepthStencil,
}

impl ImageAspect {
    pub fn for_format(format: TextureFormat) -> Self {
        if format.has_stencil() {
            ImageAspect::DepthStencil
        } else if format.is_depth() {
            ImageAspect::Depth
        } else {
            ImageAspect::Color
        }
    }
}

bitflags! {
    /// Texture usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const COLOR_ATTACHMENT = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const CONSTANT = 1 << 2;
        const STORAGE = 1 << 3;
    }
}

bitflags! {
    /// Shader stage visibility
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStage: u32 {
        const VERTEX = 1 << 0;
        const PIXEL = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub cube: bool,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: String::new(),
            width: 1,
            height: 1,
            array_layers: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
            cube: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureViewDimension {
    D2,
    D2Array,
    Cube,
}

/// Describes a view over a mip and layer range of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewDescriptor {
    pub format: TextureFormat,
    pub dimension: TextureViewDimension,
    pub aspect: ImageAspect,
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Mirror,
    ClampToEdge,
    ClampToBorder,
    MirrorOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Sampler descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor {
    pub label: String,
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mipmap_filter: Filter,
    pub address_mode: AddressMode,
    pub compare: Option<CompareFunction>,
    pub anisotropy: f32,
    pub mip_lod_bias: f32,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: String::new(),
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mipmap_filter: Filter::Linear,
            address_mode: AddressMode::ClampToEdge,
            compare: None,
            anisotropy: 0.0,
            mip_lod_bias: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
    DstColor,
    InvDstColor,
    BlendFactor,
    InvBlendFactor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOperation {
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

/// Colour blend state applied to every colour attachment of a pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendState {
    pub blend_enabled: bool,
    pub source_blend: BlendFactor,
    pub dest_blend: BlendFactor,
    pub blend_op: BlendOperation,
    pub source_blend_alpha: BlendFactor,
    pub dest_blend_alpha: BlendFactor,
    pub blend_op_alpha: BlendOperation,
    pub blend_factor: f32,
}

impl BlendState {
    pub const fn disabled() -> Self {
        Self {
            blend_enabled: false,
            source_blend: BlendFactor::One,
            dest_blend: BlendFactor::Zero,
            blend_op: BlendOperation::Add,
            source_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::Zero,
            blend_op_alpha: BlendOperation::Add,
            blend_factor: 0.0,
        }
    }

    pub const fn alpha() -> Self {
        Self {
            blend_enabled: true,
            source_blend: BlendFactor::SrcAlpha,
            dest_blend: BlendFactor::InvSrcAlpha,
            blend_op: BlendOperation::Add,
            source_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::One,
            blend_op_alpha: BlendOperation::Add,
            blend_factor: 0.0,
        }
    }

    pub const fn additive() -> Self {
        Self {
            blend_enabled: true,
            source_blend: BlendFactor::One,
            dest_blend: BlendFactor::One,
            blend_op: BlendOperation::Add,
            source_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::One,
            blend_op_alpha: BlendOperation::Add,
            blend_factor: 1.0,
        }
    }
}

impl Hash for BlendState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.blend_enabled.hash(state);
        self.source_blend.hash(state);
        self.dest_blend.hash(state);
        self.blend_op.hash(state);
        self.source_blend_alpha.hash(state);
        self.dest_blend_alpha.hash(state);
        self.blend_op_alpha.hash(state);
        self.blend_factor.to_bits().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
}

/// Depth and stencil test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_function: CompareFunction,
    pub stencil_test: bool,
    pub stencil_write: bool,
    pub stencil_function: CompareFunction,
    pub stencil_pass_op: StencilOperation,
    pub stencil_fail_op: StencilOperation,
    pub stencil_depth_fail_op: StencilOperation,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
}

impl DepthStencilState {
    pub const fn new(depth_test: bool, depth_write: bool, depth_function: CompareFunction) -> Self {
        Self {
            depth_test,
            depth_write,
            depth_function,
            stencil_test: false,
            stencil_write: false,
            stencil_function: CompareFunction::Always,
            stencil_pass_op: StencilOperation::Keep,
            stencil_fail_op: StencilOperation::Keep,
            stencil_depth_fail_op: StencilOperation::Keep,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
        }
    }

    pub const fn with_stencil_write(mut self) -> Self {
        self.stencil_test = true;
        self.stencil_write = true;
        self.stencil_function = CompareFunction::Always;
        self.stencil_pass_op = StencilOperation::Replace;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Solid,
    Wireframe,
}

/// Rasterizer configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
    pub depth_clip_enabled: bool,
    pub depth_bias: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_scaled: f32,
    pub line_width: f32,
}

impl RasterizerState {
    pub const fn new(cull_mode: CullMode, polygon_mode: PolygonMode, depth_clip_enabled: bool) -> Self {
        Self {
            cull_mode,
            polygon_mode,
            depth_clip_enabled,
            depth_bias: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope_scaled: 0.0,
            line_width: 1.0,
        }
    }

    pub const fn with_depth_bias(mut self, bias: f32, clamp: f32, slope_scaled: f32) -> Self {
        self.depth_bias = bias;
        self.depth_bias_clamp = clamp;
        self.depth_bias_slope_scaled = slope_scaled;
        self
    }
}

impl Hash for RasterizerState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cull_mode.hash(state);
        self.polygon_mode.hash(state);
        self.depth_clip_enabled.hash(state);
        self.depth_bias.to_bits().hash(state);
        self.depth_bias_clamp.to_bits().hash(state);
        self.depth_bias_slope_scaled.to_bits().hash(state);
        self.line_width.to_bits().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    LineList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Viewport rectangle plus depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub depth_min: f32,
    pub depth_max: f32,
}

impl Viewport {
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            depth_min: 0.0,
            depth_max: 1.0,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl Hash for Viewport {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.to_bits().hash(state);
        self.y.to_bits().hash(state);
        self.width.to_bits().hash(state);
        self.height.to_bits().hash(state);
        self.depth_min.to_bits().hash(state);
        self.depth_max.to_bits().hash(state);
    }
}

/// Integer rectangle used for scissoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

/// Vertex attribute description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// The vertex layouts shaders are compiled against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexType {
    #[default]
    Undefined,
    Pos,
    PosCol,
    PosTex,
    PosTexNorTan,
}

impl VertexType {
    pub fn stride(&self) -> u32 {
        self.attributes()
            .iter()
            .map(|attr| {
                attr.offset
                    + match attr.format {
                        VertexFormat::Float32x2 => 8,
                        VertexFormat::Float32x3 => 12,
                        VertexFormat::Float32x4 => 16,
                    }
            })
            .max()
            .unwrap_or(0)
    }

    pub fn attributes(&self) -> Vec<VertexAttribute> {
        let attr = |location, format, offset| VertexAttribute {
            location,
            format,
            offset,
        };
        match self {
            VertexType::Undefined => Vec::new(),
            VertexType::Pos => vec![attr(0, VertexFormat::Float32x3, 0)],
            VertexType::PosCol => vec![
                attr(0, VertexFormat::Float32x3, 0),
                attr(1, VertexFormat::Float32x4, 12),
            ],
            VertexType::PosTex => vec![
                attr(0, VertexFormat::Float32x3, 0),
                attr(1, VertexFormat::Float32x2, 12),
            ],
            VertexType::PosTexNorTan => vec![
                attr(0, VertexFormat::Float32x3, 0),
                attr(1, VertexFormat::Float32x2, 12),
                attr(2, VertexFormat::Float32x3, 20),
                attr(3, VertexFormat::Float32x3, 32),
            ],
        }
    }
}

/// Clear policy of a render target attachment
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LoadOp<T> {
    Clear(T),
    #[default]
    Load,
    DontCare,
}

impl<T: Copy> LoadOp<T> {
    pub fn clear_value(&self) -> Option<T> {
        match self {
            LoadOp::Clear(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, LoadOp::Clear(_))
    }
}

/// Clear value recorded with an attachment or clear command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_strides() {
        assert_eq!(VertexType::Pos.stride(), 12);
        assert_eq!(VertexType::PosCol.stride(), 28);
        assert_eq!(VertexType::PosTex.stride(), 20);
        assert_eq!(VertexType::PosTexNorTan.stride(), 44);
        assert_eq!(VertexType::Undefined.stride(), 0);
    }

    #[test]
    fn test_depth_formats() {
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(!TextureFormat::Depth32Float.has_stencil());
        assert_eq!(
            ImageAspect::for_format(TextureFormat::Depth32FloatStencil8),
            ImageAspect::DepthStencil
        );
        assert_eq!(ImageAspect::for_format(TextureFormat::Rgba16Float), ImageAspect::Color);
    }

    #[test]
    fn test_load_op_clear_value() {
        assert_eq!(LoadOp::Clear(0.5f32).clear_value(), Some(0.5));
        assert_eq!(LoadOp::<f32>::Load.clear_value(), None);
        assert!(!LoadOp::<f32>::DontCare.is_clear());
    }
}
