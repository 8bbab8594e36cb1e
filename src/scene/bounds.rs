use glam::{Mat4, Vec3};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::ZERO)
    }
}

impl Aabb {
    #[inline]
    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point. Empty input yields a zero box.
    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Self { min, max }
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    #[must_use]
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// World-space box enclosing this box after `transform`
    /// (Arvo's method: transformed center plus absolute-rotated extents).
    #[must_use]
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let center = transform.transform_point3(self.center());
        let extents = self.extents();
        let abs_x = transform.x_axis.truncate().abs();
        let abs_y = transform.y_axis.truncate().abs();
        let abs_z = transform.z_axis.truncate().abs();
        let world_extents = abs_x * extents.x + abs_y * extents.y + abs_z * extents.z;
        Self {
            min: center - world_extents,
            max: center + world_extents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transformed_box_follows_translation_and_scale() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let m = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)) * Mat4::from_scale(Vec3::splat(2.0));
        let world = aabb.transformed(&m);
        assert_eq!(world.min, Vec3::new(3.0, -2.0, -2.0));
        assert_eq!(world.max, Vec3::new(7.0, 2.0, 2.0));
    }

    #[test]
    fn rotated_box_grows_to_enclose_corners() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let m = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let world = aabb.transformed(&m);
        let expected = std::f32::consts::SQRT_2;
        assert!((world.max.x - expected).abs() < 1e-5);
        assert!((world.max.y - 1.0).abs() < 1e-5);
    }
}
