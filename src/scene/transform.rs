//! World placement of scene entities

use glam::{Mat4, Quat, Vec3};

/// World-space placement the snapshot turns into an entity's model matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Placed at `position` with `forward()` facing `target`.
    ///
    /// Coincident points keep the identity rotation.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let direction = (target - position).normalize_or_zero();
        let rotation = if direction == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_rotation_arc(-Vec3::Z, direction)
        };
        Self {
            position,
            rotation,
            ..Self::default()
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Local -Z, the direction cameras and lights face
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looking_at() {
        let transform = Transform::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        assert!(transform.forward().abs_diff_eq(-Vec3::Z, 1e-5));

        let transform = Transform::looking_at(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0));
        assert!(transform.forward().abs_diff_eq(Vec3::X, 1e-5));

        let degenerate = Transform::looking_at(Vec3::ONE, Vec3::ONE);
        assert_eq!(degenerate.rotation, Quat::IDENTITY);
    }

    #[test]
    fn test_matrix_applies_scale_before_translation() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0)).with_scale(Vec3::splat(2.0));
        let point = transform.matrix().transform_point3(Vec3::X);
        assert!(point.abs_diff_eq(Vec3::new(3.0, 2.0, 3.0), 1e-5));
    }
}
