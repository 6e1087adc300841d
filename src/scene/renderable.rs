//! Renderable facet: geometry, bounds and material

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};

use crate::backend::RhiResult;
use crate::rhi::{IndexBuffer, RhiContext, VertexBuffer, VertexPosTexNorTan};

use super::Material;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        }
    }
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        iter.fold(Self::new(first, first), |aabb, point| Self {
            min: aabb.min.min(point),
            max: aabb.max.max(point),
        })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half size along each axis
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn merge(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Box enclosing this one after `transform`
    pub fn transformed(&self, transform: &Mat4) -> BoundingBox {
        let center = transform.transform_point3(self.center());
        let extents = self.extents();
        let world_extents = transform.x_axis.truncate().abs() * extents.x
            + transform.y_axis.truncate().abs() * extents.y
            + transform.z_axis.truncate().abs() * extents.z;
        BoundingBox {
            min: center - world_extents,
            max: center + world_extents,
        }
    }
}

/// GPU vertex and index data shared between renderables
pub struct Geometry {
    pub name: String,
    pub vertex_buffer: VertexBuffer,
    pub index_buffer: IndexBuffer,
    pub aabb: BoundingBox,
}

impl Geometry {
    pub fn new(
        ctx: &RhiContext,
        name: &str,
        vertices: &[VertexPosTexNorTan],
        indices: &[u32],
    ) -> RhiResult<Arc<Self>> {
        let aabb = BoundingBox::from_points(vertices.iter().map(|v| Vec3::from(v.position)));
        Ok(Arc::new(Self {
            name: name.to_string(),
            vertex_buffer: VertexBuffer::new(ctx, format!("{name}_vertices"), vertices)?,
            index_buffer: IndexBuffer::new_u32(ctx, &format!("{name}_indices"), indices)?,
            aabb,
        }))
    }

    /// Create a unit cube centered at origin
    pub fn cube(ctx: &RhiContext) -> RhiResult<Arc<Self>> {
        let (vertices, indices) = cube_data();
        Self::new(ctx, "cube", &vertices, &indices)
    }

    pub fn index_count(&self) -> u32 {
        self.index_buffer.index_count()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_buffer.vertex_count()
    }
}

fn cube_data() -> (Vec<VertexPosTexNorTan>, Vec<u32>) {
    let faces = [
        (Vec3::Z, Vec3::X),
        (-Vec3::Z, -Vec3::X),
        (Vec3::X, -Vec3::Z),
        (-Vec3::X, Vec3::Z),
        (Vec3::Y, Vec3::X),
        (-Vec3::Y, Vec3::X),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face, (normal, tangent)) in faces.iter().enumerate() {
        let bitangent = normal.cross(*tangent);
        let corners = [
            (-0.5, -0.5, Vec2::new(0.0, 1.0)),
            (0.5, -0.5, Vec2::new(1.0, 1.0)),
            (0.5, 0.5, Vec2::new(1.0, 0.0)),
            (-0.5, 0.5, Vec2::new(0.0, 0.0)),
        ];
        for (u, v, uv) in corners {
            let position = *normal * 0.5 + *tangent * u + bitangent * v;
            vertices.push(VertexPosTexNorTan::new(position, uv, *normal, *tangent));
        }

        let base = face as u32 * 4;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// A drawable range of a geometry plus its material
#[derive(Clone)]
pub struct Renderable {
    pub geometry: Option<Arc<Geometry>>,
    pub index_offset: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    /// Bounds in local space
    pub aabb: BoundingBox,
    pub material: Option<Arc<Material>>,
    pub cast_shadows: bool,
}

impl Renderable {
    /// Draw the whole geometry
    pub fn new(geometry: Arc<Geometry>, material: Option<Arc<Material>>) -> Self {
        Self {
            index_offset: 0,
            index_count: geometry.index_count(),
            vertex_offset: 0,
            aabb: geometry.aabb,
            geometry: Some(geometry),
            material,
            cast_shadows: true,
        }
    }

    pub fn with_cast_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    pub fn is_transparent(&self) -> bool {
        self.material
            .as_ref()
            .is_some_and(|material| material.is_transparent())
    }
}

impl std::fmt::Debug for Renderable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderable")
            .field("geometry", &self.geometry.as_ref().map(|g| g.name.as_str()))
            .field("index_offset", &self.index_offset)
            .field("index_count", &self.index_count)
            .field("vertex_offset", &self.vertex_offset)
            .field("aabb", &self.aabb)
            .field("material", &self.material.as_ref().map(|m| m.name.as_str()))
            .field("cast_shadows", &self.cast_shadows)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_data() {
        let (vertices, indices) = cube_data();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);

        let aabb = BoundingBox::from_points(vertices.iter().map(|v| Vec3::from(v.position)));
        assert!(aabb.min.abs_diff_eq(Vec3::splat(-0.5), 1e-6));
        assert!(aabb.max.abs_diff_eq(Vec3::splat(0.5), 1e-6));
    }

    #[test]
    fn test_transformed_bounds() {
        let aabb = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert!(moved.center().abs_diff_eq(Vec3::new(5.0, 0.0, 0.0), 1e-6));

        let rotated = aabb.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let expected = 2f32.sqrt();
        assert!((rotated.max.x - expected).abs() < 1e-5);
        assert!((rotated.max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_merge() {
        let a = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let b = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(0.5));
        let merged = a.merge(&b);
        assert_eq!(merged.min, Vec3::splat(-1.0));
        assert_eq!(merged.max, Vec3::ONE);
    }
}
