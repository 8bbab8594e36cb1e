//! GPU-visible record layouts written by the batcher.
//!
//! These structs are uploaded byte-for-byte; the WGSL declarations in
//! `geometry.wgsl`, `shadow.wgsl` and `occlusion_cull.wgsl` must match them.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::renderer::core::resources::MeshId;

/// Bone offset of an instance without a skin.
pub const NO_BONES: u32 = u32::MAX;

/// One indexed indirect draw, laid out exactly as `draw_indexed_indirect`
/// reads it.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirect {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    /// Offset of the submesh's first instance record.
    pub first_instance: u32,
}

/// Per-instance, per-submesh data read by the vertex shaders and the culler.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    pub model: Mat4,
    pub mvp: Mat4,
    /// Previous frame's MVP, for motion vectors.
    pub prev_mvp: Mat4,
    pub world_min: Vec4,
    pub world_max: Vec4,
    /// `[material_index, entity_id, bone_offset, visible]`
    pub indices: [u32; 4],
    /// `[command_index, 0, 0, 0]`
    pub command: [u32; 4],
}

impl InstanceRecord {
    #[inline]
    #[must_use]
    pub fn material_index(&self) -> u32 {
        self.indices[0]
    }

    #[inline]
    #[must_use]
    pub fn entity_id(&self) -> u32 {
        self.indices[1]
    }

    #[inline]
    #[must_use]
    pub fn bone_offset(&self) -> Option<u32> {
        (self.indices[2] != NO_BONES).then_some(self.indices[2])
    }

    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.indices[3] != 0
    }

    #[inline]
    #[must_use]
    pub fn command_index(&self) -> u32 {
        self.command[0]
    }
}

/// All instances of one mesh in this frame, with offsets into the shared
/// command, record and material arrays.
///
/// Offsets are a running sum over the previous group only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshGroup {
    pub mesh: MeshId,
    pub instance_count: u32,
    pub submesh_count: u32,
    pub material_count: u32,
    pub command_offset: u32,
    pub material_offset: u32,
    pub instance_offset: u32,
}

impl MeshGroup {
    /// Instance records this group occupies (instances × submeshes).
    #[inline]
    #[must_use]
    pub fn record_count(&self) -> u32 {
        self.instance_count * self.submesh_count
    }

    /// The group that would directly follow this one.
    #[must_use]
    pub(crate) fn successor(&self, mesh: MeshId, instance_count: u32, submesh_count: u32, material_count: u32) -> Self {
        Self {
            mesh,
            instance_count,
            submesh_count,
            material_count,
            command_offset: self.command_offset + self.submesh_count,
            material_offset: self.material_offset + self.material_count,
            instance_offset: self.instance_offset + self.record_count(),
        }
    }
}

/// Diagnostics for the last batch build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub groups: u32,
    pub commands: u32,
    pub instance_records: u32,
    /// Records rejected by the CPU frustum test.
    pub cpu_culled: u32,
    /// Requests dropped for unknown meshes or exhausted capacity.
    pub dropped_requests: u32,
}
