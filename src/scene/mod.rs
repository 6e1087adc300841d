//! Scene facets and the per-frame snapshot
//!
//! The scene collaborator hands the renderer a flat list of [`EntityDesc`]s.
//! [`FrameSnapshot`] copies the active ones into an arena and buckets them
//! into opaque, transparent, light and camera lists addressed by
//! [`EntityIndex`].

mod camera;
mod light;
mod material;
mod renderable;
mod transform;

use glam::{Mat4, Vec3};

pub use camera::{Camera, Frustum, Projection};
pub use light::{Light, LightType, CASCADE_EXTENTS};
pub use material::{Material, MaterialFlags, MaterialTexture};
pub use renderable::{BoundingBox, Geometry, Renderable};
pub use transform::Transform;

/// One entity as resolved by the scene collaborator
#[derive(Debug, Clone, Default)]
pub struct EntityDesc {
    pub id: u64,
    pub name: String,
    pub active: bool,
    pub transform: Transform,
    /// Model matrix of the previous frame, for motion vectors
    pub matrix_previous: Option<Mat4>,
    pub camera: Option<Camera>,
    pub light: Option<Light>,
    pub renderable: Option<Renderable>,
}

impl EntityDesc {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
            ..Default::default()
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.light = Some(light);
        self
    }

    pub fn with_renderable(mut self, renderable: Renderable) -> Self {
        self.renderable = Some(renderable);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityIndex(pub u32);

/// An entity copied into the snapshot arena
#[derive(Debug, Clone)]
pub struct SnapshotEntity {
    pub id: u64,
    pub name: String,
    pub transform: Transform,
    pub matrix: Mat4,
    pub matrix_previous: Mat4,
    pub camera: Option<Camera>,
    pub light: Option<Light>,
    pub renderable: Option<Renderable>,
    /// Renderable bounds in world space
    pub aabb: BoundingBox,
}

/// Immutable view of the world the passes render from
#[derive(Debug, Clone, Default)]
pub struct FrameSnapshot {
    entities: Vec<SnapshotEntity>,
    opaque: Vec<EntityIndex>,
    transparent: Vec<EntityIndex>,
    lights: Vec<EntityIndex>,
    cameras: Vec<EntityIndex>,
}

impl FrameSnapshot {
    /// Copy the active entities and bucket them.
    ///
    /// The first camera becomes the active one. Renderables without geometry
    /// are not drawable and land in no bucket.
    pub fn build(entities: &[EntityDesc]) -> Self {
        let mut snapshot = Self::default();

        for desc in entities.iter().filter(|desc| desc.active) {
            let index = EntityIndex(snapshot.entities.len() as u32);
            let matrix = desc.transform.matrix();
            let aabb = desc
                .renderable
                .as_ref()
                .map(|renderable| renderable.aabb.transformed(&matrix))
                .unwrap_or_default();

            if let Some(renderable) = &desc.renderable {
                if renderable.geometry.is_some() {
                    if renderable.is_transparent() {
                        snapshot.transparent.push(index);
                    } else {
                        snapshot.opaque.push(index);
                    }
                }
            }
            if desc.light.is_some() {
                snapshot.lights.push(index);
            }
            if desc.camera.is_some() {
                snapshot.cameras.push(index);
            }

            snapshot.entities.push(SnapshotEntity {
                id: desc.id,
                name: desc.name.clone(),
                transform: desc.transform,
                matrix,
                matrix_previous: desc.matrix_previous.unwrap_or(matrix),
                camera: desc.camera.clone(),
                light: desc.light.clone(),
                renderable: desc.renderable.clone(),
                aabb,
            });
        }

        snapshot.sort_by_distance();
        snapshot
    }

    /// Sort the renderable buckets front to back from the active camera
    fn sort_by_distance(&mut self) {
        let Some(eye) = self.camera().map(|camera| camera.transform.position) else {
            return;
        };

        let entities = &self.entities;
        let distance = |index: &EntityIndex| {
            entities[index.0 as usize]
                .aabb
                .center()
                .distance_squared(eye)
        };
        for bucket in [&mut self.opaque, &mut self.transparent] {
            if bucket.len() <= 2 {
                continue;
            }
            bucket.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
        }
    }

    pub fn entity(&self, index: EntityIndex) -> &SnapshotEntity {
        &self.entities[index.0 as usize]
    }

    pub fn entities(&self) -> &[SnapshotEntity] {
        &self.entities
    }

    pub fn opaque(&self) -> &[EntityIndex] {
        &self.opaque
    }

    pub fn transparent(&self) -> &[EntityIndex] {
        &self.transparent
    }

    pub fn lights(&self) -> &[EntityIndex] {
        &self.lights
    }

    pub fn camera_index(&self) -> Option<EntityIndex> {
        self.cameras.first().copied()
    }

    pub fn camera(&self) -> Option<&SnapshotEntity> {
        self.camera_index().map(|index| self.entity(index))
    }

    pub fn camera_position(&self) -> Vec3 {
        self.camera()
            .map(|camera| camera.transform.position)
            .unwrap_or(Vec3::ZERO)
    }

    /// Whether there is anything to render besides the clear colour
    pub fn has_content(&self) -> bool {
        !self.opaque.is_empty() || !self.transparent.is_empty() || !self.lights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;
    use std::sync::Arc;

    fn renderable_at(position: Vec3, alpha: f32) -> EntityDesc {
        let material = Arc::new(Material::new("m").with_color(Vec4::new(1.0, 1.0, 1.0, alpha)));
        EntityDesc::new(0, "renderable")
            .with_transform(Transform::from_position(position))
            .with_renderable(Renderable {
                geometry: None,
                index_offset: 0,
                index_count: 36,
                vertex_offset: 0,
                aabb: BoundingBox::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
                material: Some(material),
                cast_shadows: true,
            })
    }

    #[test]
    fn test_inactive_entities_are_discarded() {
        let mut hidden = EntityDesc::new(1, "light").with_light(Light::default());
        hidden.active = false;
        let snapshot = FrameSnapshot::build(&[
            hidden,
            EntityDesc::new(2, "camera").with_camera(Camera::default()),
        ]);

        assert_eq!(snapshot.entities().len(), 1);
        assert!(snapshot.lights().is_empty());
        assert_eq!(snapshot.camera().map(|camera| camera.id), Some(2));
        assert!(!snapshot.has_content());
    }

    #[test]
    fn test_renderables_without_geometry_are_not_drawn() {
        let snapshot = FrameSnapshot::build(&[renderable_at(Vec3::ZERO, 1.0)]);
        assert!(snapshot.opaque().is_empty());
        assert!(snapshot.transparent().is_empty());
    }

    #[test]
    fn test_previous_matrix_defaults_to_current() {
        let desc = EntityDesc::new(3, "moved").with_transform(Transform::from_position(Vec3::X));
        let snapshot = FrameSnapshot::build(&[desc]);
        let entity = &snapshot.entities()[0];
        assert_eq!(entity.matrix, entity.matrix_previous);
    }
}
