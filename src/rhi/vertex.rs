//! Vertex layouts matching [`VertexType`]

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

use crate::backend::VertexType;

/// Implemented by every vertex struct that can back a [`super::VertexBuffer`]
pub trait Vertex: Pod {
    const TYPE: VertexType;
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexPosCol {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl VertexPosCol {
    pub fn new(position: Vec3, color: Vec4) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
        }
    }
}

impl Vertex for VertexPosCol {
    const TYPE: VertexType = VertexType::PosCol;
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexPosTex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl VertexPosTex {
    pub fn new(position: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            uv: uv.to_array(),
        }
    }
}

impl Vertex for VertexPosTex {
    const TYPE: VertexType = VertexType::PosTex;
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexPosTexNorTan {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
}

impl VertexPosTexNorTan {
    pub fn new(position: Vec3, uv: Vec2, normal: Vec3, tangent: Vec3) -> Self {
        Self {
            position: position.to_array(),
            uv: uv.to_array(),
            normal: normal.to_array(),
            tangent: tangent.to_array(),
        }
    }
}

impl Vertex for VertexPosTexNorTan {
    const TYPE: VertexType = VertexType::PosTexNorTan;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_match_vertex_type_strides() {
        assert_eq!(std::mem::size_of::<VertexPosCol>() as u32, VertexPosCol::TYPE.stride());
        assert_eq!(std::mem::size_of::<VertexPosTex>() as u32, VertexPosTex::TYPE.stride());
        assert_eq!(
            std::mem::size_of::<VertexPosTexNorTan>() as u32,
            VertexPosTexNorTan::TYPE.stride()
        );
    }
}
