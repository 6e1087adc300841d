//! Translation of device types into their Vulkan counterparts

use ash::vk;

use crate::backend::traits::{DescriptorType, PipelineBindPoint};
use crate::backend::types::*;

pub fn format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8Unorm => vk::Format::R8_UNORM,
        TextureFormat::R16Float => vk::Format::R16_SFLOAT,
        TextureFormat::R32Float => vk::Format::R32_SFLOAT,
        TextureFormat::Rg16Float => vk::Format::R16G16_SFLOAT,
        TextureFormat::Rg32Float => vk::Format::R32G32_SFLOAT,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Rgb10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        TextureFormat::Rg11b10Float => vk::Format::B10G11R11_UFLOAT_PACK32,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        TextureFormat::Depth32FloatStencil8 => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

pub fn image_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::Preinitialized => vk::ImageLayout::PREINITIALIZED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

/// Accesses that must be visible before or after a subresource is in `layout`
pub fn layout_access(layout: ImageLayout) -> vk::AccessFlags {
    match layout {
        ImageLayout::Undefined => vk::AccessFlags::empty(),
        ImageLayout::Preinitialized => vk::AccessFlags::HOST_WRITE,
        ImageLayout::General => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        ImageLayout::ColorAttachment => {
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        }
        ImageLayout::DepthStencilAttachment => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        ImageLayout::DepthStencilReadOnly => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::SHADER_READ
        }
        ImageLayout::ShaderReadOnly => vk::AccessFlags::SHADER_READ,
        ImageLayout::TransferSrc => vk::AccessFlags::TRANSFER_READ,
        ImageLayout::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
        ImageLayout::Present => vk::AccessFlags::MEMORY_READ,
    }
}

pub fn aspect(aspect: ImageAspect) -> vk::ImageAspectFlags {
    match aspect {
        ImageAspect::Color => vk::ImageAspectFlags::COLOR,
        ImageAspect::Depth => vk::ImageAspectFlags::DEPTH,
        ImageAspect::DepthStencil => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
    }
}

pub fn view_type(dimension: TextureViewDimension) -> vk::ImageViewType {
    match dimension {
        TextureViewDimension::D2 => vk::ImageViewType::TYPE_2D,
        TextureViewDimension::D2Array => vk::ImageViewType::TYPE_2D_ARRAY,
        TextureViewDimension::Cube => vk::ImageViewType::CUBE,
    }
}

pub fn texture_usage(usage: TextureUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    for (from, to) in [
        (TextureUsage::SAMPLED, vk::ImageUsageFlags::SAMPLED),
        (TextureUsage::STORAGE, vk::ImageUsageFlags::STORAGE),
        (TextureUsage::COLOR_ATTACHMENT, vk::ImageUsageFlags::COLOR_ATTACHMENT),
        (
            TextureUsage::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        ),
        (TextureUsage::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
        (TextureUsage::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
    ] {
        if usage.contains(from) {
            flags |= to;
        }
    }
    flags
}

pub fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    for (from, to) in [
        (BufferUsage::VERTEX, vk::BufferUsageFlags::VERTEX_BUFFER),
        (BufferUsage::INDEX, vk::BufferUsageFlags::INDEX_BUFFER),
        (BufferUsage::CONSTANT, vk::BufferUsageFlags::UNIFORM_BUFFER),
        (BufferUsage::STORAGE, vk::BufferUsageFlags::STORAGE_BUFFER),
    ] {
        if usage.contains(from) {
            flags |= to;
        }
    }
    flags
}

pub fn shader_stages(stages: ShaderStage) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStage::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStage::PIXEL) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStage::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

pub fn naga_stage(stage: ShaderStage) -> Option<naga::ShaderStage> {
    if stage == ShaderStage::VERTEX {
        Some(naga::ShaderStage::Vertex)
    } else if stage == ShaderStage::PIXEL {
        Some(naga::ShaderStage::Fragment)
    } else if stage == ShaderStage::COMPUTE {
        Some(naga::ShaderStage::Compute)
    } else {
        None
    }
}

pub fn descriptor_type(ty: DescriptorType) -> vk::DescriptorType {
    match ty {
        DescriptorType::ConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        DescriptorType::StructuredBuffer => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorType::Texture => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::StorageTexture => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
    }
}

pub fn bind_point(bind_point: PipelineBindPoint) -> vk::PipelineBindPoint {
    match bind_point {
        PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
        PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
    }
}

pub fn filter(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub fn mipmap_mode(filter: Filter) -> vk::SamplerMipmapMode {
    match filter {
        Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
        Filter::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
        AddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        AddressMode::MirrorOnce => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
    }
}

pub fn compare_op(func: CompareFunction) -> vk::CompareOp {
    match func {
        CompareFunction::Never => vk::CompareOp::NEVER,
        CompareFunction::Less => vk::CompareOp::LESS,
        CompareFunction::Equal => vk::CompareOp::EQUAL,
        CompareFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareFunction::Greater => vk::CompareOp::GREATER,
        CompareFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareFunction::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn stencil_op(op: StencilOperation) -> vk::StencilOp {
    match op {
        StencilOperation::Keep => vk::StencilOp::KEEP,
        StencilOperation::Zero => vk::StencilOp::ZERO,
        StencilOperation::Replace => vk::StencilOp::REPLACE,
        StencilOperation::Increment => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOperation::Decrement => vk::StencilOp::DECREMENT_AND_CLAMP,
    }
}

pub fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::InvSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::InvSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::InvDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::InvDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::BlendFactor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::InvBlendFactor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
    }
}

pub fn blend_op(op: BlendOperation) -> vk::BlendOp {
    match op {
        BlendOperation::Add => vk::BlendOp::ADD,
        BlendOperation::Subtract => vk::BlendOp::SUBTRACT,
        BlendOperation::RevSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOperation::Min => vk::BlendOp::MIN,
        BlendOperation::Max => vk::BlendOp::MAX,
    }
}

pub fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub fn polygon_mode(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Solid => vk::PolygonMode::FILL,
        PolygonMode::Wireframe => vk::PolygonMode::LINE,
    }
}

pub fn topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
    }
}

pub fn vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float32x2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float32x3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float32x4 => vk::Format::R32G32B32A32_SFLOAT,
    }
}

pub fn index_type(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::Uint16 => vk::IndexType::UINT16,
        IndexFormat::Uint32 => vk::IndexType::UINT32,
    }
}

pub fn attachment_load_op<T>(load: &LoadOp<T>) -> vk::AttachmentLoadOp {
    match load {
        LoadOp::Clear(_) => vk::AttachmentLoadOp::CLEAR,
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub fn clear_value(value: ClearValue) -> vk::ClearValue {
    match value {
        ClearValue::Color(color) => vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_aspects() {
        assert_eq!(aspect(ImageAspect::Depth), vk::ImageAspectFlags::DEPTH);
        assert!(aspect(ImageAspect::DepthStencil).contains(vk::ImageAspectFlags::STENCIL));
    }

    #[test]
    fn test_usage_flags_combine() {
        let usage = texture_usage(TextureUsage::SAMPLED | TextureUsage::STORAGE);
        assert_eq!(usage, vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::STORAGE);
        assert_eq!(buffer_usage(BufferUsage::CONSTANT), vk::BufferUsageFlags::UNIFORM_BUFFER);
    }

    #[test]
    fn test_constant_buffers_use_dynamic_offsets() {
        assert_eq!(
            descriptor_type(DescriptorType::ConstantBuffer),
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
    }

    #[test]
    fn test_naga_stage_requires_single_stage() {
        assert_eq!(naga_stage(ShaderStage::PIXEL), Some(naga::ShaderStage::Fragment));
        assert_eq!(naga_stage(ShaderStage::VERTEX | ShaderStage::PIXEL), None);
    }

    #[test]
    fn test_transfer_layouts_access() {
        assert_eq!(layout_access(ImageLayout::TransferDst), vk::AccessFlags::TRANSFER_WRITE);
        assert!(layout_access(ImageLayout::Undefined).is_empty());
    }
}
