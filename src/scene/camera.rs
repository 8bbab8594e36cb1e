//! Camera snapshot and view frustum.
//!
//! The renderer never owns a camera. The scene hands it a [`CameraSnapshot`]
//! every frame and the batcher derives its culling [`Frustum`] from it.

use glam::{Mat4, Vec3, Vec4};

use super::bounds::Aabb;

/// Per-frame copy of everything the renderer needs from the active camera.
#[derive(Debug, Clone, Copy)]
pub struct CameraSnapshot {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Viewport size in pixels.
    pub viewport: (u32, u32),
}

impl CameraSnapshot {
    /// Builds a right-handed perspective camera looking from `eye` at `target`.
    ///
    /// `fov_y_degrees` is converted to radians. Depth maps to `[0, 1]`.
    #[must_use]
    pub fn perspective(
        eye: Vec3,
        target: Vec3,
        fov_y_degrees: f32,
        viewport: (u32, u32),
        near: f32,
        far: f32,
    ) -> Self {
        let fov_y = fov_y_degrees.to_radians();
        let aspect = viewport.0.max(1) as f32 / viewport.1.max(1) as f32;
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y, aspect, near, far),
            position: eye,
            near,
            far,
            fov_y,
            viewport,
        }
    }

    #[inline]
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    #[inline]
    #[must_use]
    pub fn aspect(&self) -> f32 {
        self.viewport.0.max(1) as f32 / self.viewport.1.max(1) as f32
    }

    #[inline]
    #[must_use]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(self.view_projection())
    }
}

/// Six half-space planes (`xyz` = inward normal, `w` = distance).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6], // Left, Right, Bottom, Top, Near, Far
}

impl Frustum {
    /// Extracts normalized planes from a view-projection matrix
    /// (Gribb-Hartmann, `[0, 1]` clip depth).
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[2],
            rows[3] - rows[2],
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > f32::EPSILON {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[inline]
    #[must_use]
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(center) + plane.w >= -radius)
    }

    /// Conservative AABB test: rejects only boxes fully outside one plane.
    ///
    /// Boxes straddling a frustum corner may pass; callers treat the result as
    /// a pre-filter.
    #[must_use]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            // Corner furthest along the plane normal.
            let positive = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            normal.dot(positive) + plane.w >= 0.0
        })
    }
}
