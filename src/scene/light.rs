//! Light facet

use glam::{Mat4, Vec3};

use super::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Point,
    Spot,
}

/// A light source; position and direction come from the entity transform
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub light_type: LightType,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    /// Spot cone half angle in radians
    pub angle: f32,
    pub shadows: bool,
    pub shadows_transparent: bool,
    pub shadows_screen_space: bool,
    pub volumetric: bool,
    pub bias: f32,
    pub normal_bias: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            angle: 0.5,
            shadows: true,
            shadows_transparent: true,
            shadows_screen_space: true,
            volumetric: true,
            bias: 0.0001,
            normal_bias: 5.0,
        }
    }
}

/// Half extents of the directional light cascades around the camera
pub const CASCADE_EXTENTS: [f32; 2] = [10.0, 80.0];

impl Light {
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self {
            light_type: LightType::Directional,
            color,
            intensity,
            ..Default::default()
        }
    }

    pub fn point(color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            light_type: LightType::Point,
            color,
            intensity,
            range,
            ..Default::default()
        }
    }

    pub fn spot(color: Vec3, intensity: f32, range: f32, angle: f32) -> Self {
        Self {
            light_type: LightType::Spot,
            color,
            intensity,
            range,
            angle,
            ..Default::default()
        }
    }

    pub fn with_shadows(mut self, shadows: bool) -> Self {
        self.shadows = shadows;
        self
    }

    pub fn with_transparent_shadows(mut self, shadows_transparent: bool) -> Self {
        self.shadows_transparent = shadows_transparent;
        self
    }

    /// Whether the light contributes a shadow map pass
    pub fn casts_shadows(&self) -> bool {
        self.shadows && self.intensity != 0.0
    }

    /// Slices of the shadow map: cascades, cube faces or a single slice
    pub fn shadow_array_length(&self) -> u32 {
        match self.light_type {
            LightType::Directional => CASCADE_EXTENTS.len() as u32,
            LightType::Point => 6,
            LightType::Spot => 1,
        }
    }

    /// View-projection per shadow map slice
    pub fn view_projections(
        &self,
        transform: &Transform,
        camera_position: Vec3,
        reverse_z: bool,
    ) -> [Mat4; 6] {
        let mut matrices = [Mat4::IDENTITY; 6];
        let depth = |near: f32, far: f32| if reverse_z { (far, near) } else { (near, far) };

        match self.light_type {
            LightType::Directional => {
                let direction = transform.forward();
                let up = if direction.abs().dot(Vec3::Y) > 0.99 { Vec3::Z } else { Vec3::Y };
                for (cascade, &extent) in CASCADE_EXTENTS.iter().enumerate() {
                    let eye = camera_position - direction * extent * 2.0;
                    let view = Mat4::look_to_rh(eye, direction, up);
                    let (near, far) = depth(0.0, extent * 4.0);
                    let projection =
                        Mat4::orthographic_rh(-extent, extent, -extent, extent, near, far);
                    matrices[cascade] = projection * view;
                }
            }
            LightType::Point => {
                let faces = [
                    (Vec3::X, -Vec3::Y),
                    (-Vec3::X, -Vec3::Y),
                    (Vec3::Y, Vec3::Z),
                    (-Vec3::Y, -Vec3::Z),
                    (Vec3::Z, -Vec3::Y),
                    (-Vec3::Z, -Vec3::Y),
                ];
                let (near, far) = depth(0.1, self.range.max(0.2));
                let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
                for (face, (direction, up)) in faces.iter().enumerate() {
                    matrices[face] =
                        projection * Mat4::look_to_rh(transform.position, *direction, *up);
                }
            }
            LightType::Spot => {
                let (near, far) = depth(0.1, self.range.max(0.2));
                let projection = Mat4::perspective_rh(self.angle * 2.0, 1.0, near, far);
                matrices[0] = projection
                    * Mat4::look_to_rh(transform.position, transform.forward(), transform.up());
            }
        }

        matrices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_array_length() {
        assert_eq!(Light::directional(Vec3::ONE, 1.0).shadow_array_length(), 2);
        assert_eq!(Light::point(Vec3::ONE, 1.0, 5.0).shadow_array_length(), 6);
        assert_eq!(Light::spot(Vec3::ONE, 1.0, 5.0, 0.5).shadow_array_length(), 1);
    }

    #[test]
    fn test_cascades_center_on_camera() {
        let light = Light::directional(Vec3::ONE, 1.0);
        let transform = Transform::looking_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO);
        let matrices = light.view_projections(&transform, Vec3::ZERO, false);

        for matrix in &matrices[..CASCADE_EXTENTS.len()] {
            let center = matrix.project_point3(Vec3::ZERO);
            assert!(center.abs_diff_eq(Vec3::new(0.0, 0.0, 0.5), 1e-4));
        }
    }

    #[test]
    fn test_zero_intensity_casts_no_shadows() {
        let light = Light::point(Vec3::ONE, 0.0, 5.0);
        assert!(!light.casts_shadows());
    }
}
