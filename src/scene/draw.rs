//! Per-frame scene snapshot handed to the renderer.
//!
//! Everything here is ephemeral: the scene traversal fills it, `update_all`
//! consumes it, and nothing is retained across frames except what the
//! batcher keeps for motion vectors.

use glam::Mat4;

use super::camera::CameraSnapshot;
use super::light::{FogVolume, LightLists};
use crate::renderer::core::resources::MeshId;

/// Offset of an instance's first joint matrix in the frame's bone palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoneRange {
    pub offset: u32,
    pub count: u32,
}

/// One visible object submitted for this frame.
#[derive(Debug, Clone, Copy)]
pub struct DrawRequest {
    pub mesh: MeshId,
    pub transform: Mat4,
    pub entity_id: u32,
    pub skin: Option<BoneRange>,
}

impl DrawRequest {
    #[inline]
    #[must_use]
    pub fn new(mesh: MeshId, transform: Mat4, entity_id: u32) -> Self {
        Self {
            mesh,
            transform,
            entity_id,
            skin: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_skin(mut self, skin: BoneRange) -> Self {
        self.skin = Some(skin);
        self
    }
}

/// Frame-scoped snapshot passed to every pass by `update_all`.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub camera: CameraSnapshot,
    pub draw_requests: Vec<DrawRequest>,
    pub lights: LightLists,
    pub fog_volumes: Vec<FogVolume>,
    /// Joint matrices referenced by `DrawRequest::skin`.
    pub bone_palette: Vec<Mat4>,
    /// Seconds since start, for animated leaf passes.
    pub time: f32,
}

impl FrameData {
    #[must_use]
    pub fn new(camera: CameraSnapshot) -> Self {
        Self {
            camera,
            draw_requests: Vec::new(),
            lights: LightLists::default(),
            fog_volumes: Vec::new(),
            bone_palette: Vec::new(),
            time: 0.0,
        }
    }
}
