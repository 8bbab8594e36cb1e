use glam::{Mat4, Vec3};

use super::bounds::Aabb;

#[derive(Debug, Clone, Copy)]
pub struct ShadowConfig {
    pub bias: f32,
    pub normal_bias: f32,
    /// Half extent of the orthographic shadow volume around the camera target.
    pub extent: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            bias: 0.005,
            normal_bias: 0.02,
            extent: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    /// Direction the light travels (normalized on use).
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32, // lux
    pub shadow: Option<ShadowConfig>,
}

impl DirectionalLight {
    /// Orthographic light view-projection covering a box of `extent` around `focus`.
    #[must_use]
    pub fn view_projection(&self, focus: Vec3) -> Option<Mat4> {
        let shadow = self.shadow?;
        let direction = self.direction.try_normalize()?;
        let eye = focus - direction * shadow.extent * 2.0;
        let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_at_rh(eye, focus, up);
        let e = shadow.extent;
        let projection = Mat4::orthographic_rh(-e, e, -e, e, 0.0, e * 4.0);
        Some(projection * view)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32, // candela
    pub range: f32,
}

/// Rectangular area light.
#[derive(Debug, Clone, Copy)]
pub struct RectLight {
    pub position: Vec3,
    pub normal: Vec3,
    pub right: Vec3,
    pub half_width: f32,
    pub half_height: f32,
    pub color: Vec3,
    pub intensity: f32,
}

/// Participating-media volume (fog or cloud layer) consumed by volumetric leaf passes.
#[derive(Debug, Clone, Copy)]
pub struct FogVolume {
    pub bounds: Aabb,
    pub density: f32,
    pub albedo: Vec3,
    pub phase_g: f32,
}

/// Lights submitted for one frame.
#[derive(Debug, Clone, Default)]
pub struct LightLists {
    pub directional: Vec<DirectionalLight>,
    pub point: Vec<PointLight>,
    pub rect: Vec<RectLight>,
}

impl LightLists {
    /// The first directional light that casts shadows.
    #[must_use]
    pub fn shadow_caster(&self) -> Option<&DirectionalLight> {
        self.directional.iter().find(|light| light.shadow.is_some())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directional.is_empty() && self.point.is_empty() && self.rect.is_empty()
    }
}
