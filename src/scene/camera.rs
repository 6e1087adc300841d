//! Camera facet

use glam::{Mat4, Vec3, Vec4};

use super::{BoundingBox, Transform};

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
    },
    Orthographic {
        /// Visible height in world units
        height: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_3,
        }
    }
}

/// Camera for viewing the scene
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
    pub clear_color: Vec4,
    /// Aperture in f-stops
    pub aperture: f32,
    /// Shutter speed in seconds
    pub shutter_speed: f32,
    pub iso: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Projection::default(),
            near: 0.3,
            far: 2500.0,
            clear_color: Vec4::new(0.396, 0.611, 0.937, 1.0),
            aperture: 2.8,
            shutter_speed: 1.0 / 60.0,
            iso: 500.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clear_color(mut self, color: Vec4) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_planes(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Get the view matrix for a camera placed at `transform`
    pub fn view_matrix(transform: &Transform) -> Mat4 {
        Mat4::look_to_rh(transform.position, transform.forward(), transform.up())
    }

    /// Projection with the near and far planes swapped when `reverse_z` is set
    pub fn projection_matrix(&self, aspect: f32, reverse_z: bool) -> Mat4 {
        let (near, far) = if reverse_z {
            (self.far, self.near)
        } else {
            (self.near, self.far)
        };
        match self.projection {
            Projection::Perspective { fov_y } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic { height } => {
                let half_height = height * 0.5;
                let half_width = half_height * aspect;
                Mat4::orthographic_rh(-half_width, half_width, -half_height, half_height, near, far)
            }
        }
    }

    /// Orthographic projection covering `width` x `height` pixels, used for
    /// screen-space quads
    pub fn orthographic_matrix(&self, width: f32, height: f32, reverse_z: bool) -> Mat4 {
        let (near, far) = if reverse_z {
            (self.far, self.near)
        } else {
            (self.near, self.far)
        };
        Mat4::orthographic_rh(-width * 0.5, width * 0.5, -height * 0.5, height * 0.5, near, far)
    }

    /// Exposure scale derived from aperture, shutter speed and ISO
    pub fn exposure(&self) -> f32 {
        let ev100 = ((self.aperture * self.aperture) / self.shutter_speed * 100.0 / self.iso).log2();
        1.0 / (1.2 * 2f32.powf(ev100))
    }
}

/// View volume planes extracted from a view-projection matrix
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_matrix(view_projection: &Mat4) -> Self {
        let row = |i| view_projection.row(i);
        let planes = [
            row(3) + row(0),
            row(3) - row(0),
            row(3) + row(1),
            row(3) - row(1),
            row(2),
            row(3) - row(2),
        ]
        .map(|plane| {
            let length = plane.truncate().length();
            if length > 0.0 {
                plane / length
            } else {
                plane
            }
        });
        Self { planes }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }

    pub fn intersects(&self, aabb: &BoundingBox) -> bool {
        let center = aabb.center();
        let extents = aabb.extents();
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            let radius = extents.dot(normal.abs());
            normal.dot(center) + plane.w >= -radius
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_projection(reverse_z: bool) -> Mat4 {
        let camera = Camera::default();
        let transform = Transform::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        camera.projection_matrix(16.0 / 9.0, reverse_z) * Camera::view_matrix(&transform)
    }

    #[test]
    fn test_reverse_z_maps_near_to_one() {
        let camera = Camera::default();
        let projection = camera.projection_matrix(1.0, true);
        let near = projection * Vec4::new(0.0, 0.0, -camera.near, 1.0);
        assert!((near.z / near.w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_frustum_culling() {
        for reverse_z in [false, true] {
            let frustum = Frustum::from_matrix(&view_projection(reverse_z));
            let visible = BoundingBox::new(Vec3::splat(-0.5), Vec3::splat(0.5));
            let behind = BoundingBox::new(Vec3::new(-0.5, -0.5, 20.0), Vec3::new(0.5, 0.5, 21.0));
            assert!(frustum.intersects(&visible));
            assert!(!frustum.intersects(&behind));
            assert!(frustum.contains_point(Vec3::ZERO));
        }
    }
}
