//! CPU half of the indirect batcher.
//!
//! [`DrawBatch`] turns one frame's draw requests into the three arrays the GPU
//! consumes (indirect commands, instance records, materials) plus the list of
//! [`MeshGroup`]s used to issue one multi-draw per mesh. It owns no GPU
//! objects so the grouping rules can be exercised directly.
//!
//! # Layout
//!
//! ```text
//! records:  | group 0: sub 0 [inst 0..n) | sub 1 [inst 0..n) | group 1: ...
//! commands: | group 0: sub 0 | sub 1     | group 1: sub 0 ...
//! ```
//!
//! Each command's `first_instance` points at its submesh's first record, so a
//! single `multi_draw_indexed_indirect` per group covers every instance of
//! every submesh.

use glam::Mat4;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::records::{BatchStats, DrawIndexedIndirect, InstanceRecord, MeshGroup, NO_BONES};
use crate::renderer::core::resources::{MaterialData, MeshId, MeshLayout, MeshLookup};
use crate::renderer::settings::BatchSettings;
use crate::scene::{Aabb, DrawRequest, Frustum};

/// View the batch is built for (camera or light).
#[derive(Debug, Clone, Copy)]
pub struct BatchView {
    pub view_projection: Mat4,
    pub frustum: Frustum,
    /// Joint matrices available this frame; skins reaching past it are
    /// drawn unskinned.
    pub bone_count: u32,
}

impl BatchView {
    #[must_use]
    pub fn new(view_projection: Mat4, bone_count: u32) -> Self {
        Self {
            view_projection,
            frustum: Frustum::from_matrix(view_projection),
            bone_count,
        }
    }
}

/// Per-instance data shared by every submesh of the instance.
#[derive(Clone, Copy)]
struct InstanceScratch {
    transform: Mat4,
    prev_transform: Mat4,
    bounds: Aabb,
    visible: bool,
    bone_offset: u32,
    entity_id: u32,
}

/// One `multi_draw_indexed_indirect` over a group's command range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndirectDraw {
    pub mesh: MeshId,
    pub command_offset: u32,
    pub command_count: u32,
}

/// Groups draw requests by mesh and lays out the per-frame GPU arrays.
pub struct DrawBatch {
    capacity: BatchSettings,

    // Bucketing (cleared, never reallocated)
    bucket_of: FxHashMap<MeshId, usize>,
    order: Vec<MeshId>,
    buckets: Vec<Vec<u32>>,
    unknown: SmallVec<[MeshId; 4]>,
    scratch: Vec<InstanceScratch>,

    // Output
    groups: Vec<MeshGroup>,
    commands: Vec<DrawIndexedIndirect>,
    records: Vec<InstanceRecord>,
    materials: Vec<MaterialData>,
    stats: BatchStats,

    // Motion-vector history
    prev_transforms: FxHashMap<u32, Mat4>,
    next_transforms: FxHashMap<u32, Mat4>,
    prev_view_projection: Option<Mat4>,
}

impl DrawBatch {
    #[must_use]
    pub fn new(capacity: BatchSettings) -> Self {
        Self {
            capacity,
            bucket_of: FxHashMap::default(),
            order: Vec::new(),
            buckets: Vec::new(),
            unknown: SmallVec::new(),
            scratch: Vec::new(),
            groups: Vec::new(),
            commands: Vec::with_capacity(capacity.max_commands as usize),
            records: Vec::new(),
            materials: Vec::new(),
            stats: BatchStats::default(),
            prev_transforms: FxHashMap::default(),
            next_transforms: FxHashMap::default(),
            prev_view_projection: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> &BatchSettings {
        &self.capacity
    }

    #[inline]
    #[must_use]
    pub fn groups(&self) -> &[MeshGroup] {
        &self.groups
    }

    #[inline]
    #[must_use]
    pub fn commands(&self) -> &[DrawIndexedIndirect] {
        &self.commands
    }

    #[inline]
    #[must_use]
    pub fn records(&self) -> &[InstanceRecord] {
        &self.records
    }

    #[inline]
    #[must_use]
    pub fn materials(&self) -> &[MaterialData] {
        &self.materials
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// The multi-draws that consume this batch, one per mesh group. Groups
    /// without submeshes issue nothing, so an empty frame yields no draws.
    pub fn indirect_draws(&self) -> impl Iterator<Item = IndirectDraw> + '_ {
        self.groups
            .iter()
            .filter(|group| group.submesh_count > 0)
            .map(|group| IndirectDraw {
                mesh: group.mesh,
                command_offset: group.command_offset,
                command_count: group.submesh_count,
            })
    }

    /// Forgets motion history, e.g. after a camera cut.
    pub fn reset_history(&mut self) {
        self.prev_transforms.clear();
        self.prev_view_projection = None;
    }

    /// Rebuilds every output array from `requests`.
    pub fn build<M>(&mut self, requests: &[DrawRequest], meshes: &M, view: &BatchView)
    where
        M: MeshLookup + ?Sized,
    {
        self.clear();
        self.bucket(requests, meshes);

        let mut previous: Option<MeshGroup> = None;
        for bucket_index in 0..self.order.len() {
            let mesh = self.order[bucket_index];
            let Some(layout) = meshes.layout(mesh) else {
                continue;
            };

            let instance_count = self.buckets[bucket_index].len() as u32;
            let group = match previous {
                Some(prev) => prev.successor(
                    mesh,
                    instance_count,
                    layout.submesh_count(),
                    layout.material_count(),
                ),
                None => MeshGroup {
                    mesh,
                    instance_count,
                    submesh_count: layout.submesh_count(),
                    material_count: layout.material_count(),
                    command_offset: 0,
                    material_offset: 0,
                    instance_offset: 0,
                },
            };

            if !self.fits(&group) {
                let remaining: usize = self.buckets[bucket_index..self.order.len()]
                    .iter()
                    .map(Vec::len)
                    .sum();
                log::error!(
                    "Indirect batch full ({} commands, {} records, {} materials); dropping {remaining} requests in {} groups",
                    group.command_offset,
                    group.instance_offset,
                    group.material_offset,
                    self.order.len() - bucket_index
                );
                self.stats.dropped_requests += remaining as u32;
                break;
            }

            self.emit_group(&group, layout, bucket_index, requests, view);
            previous = Some(group);
        }

        std::mem::swap(&mut self.prev_transforms, &mut self.next_transforms);
        self.next_transforms.clear();
        self.prev_view_projection = Some(view.view_projection);

        self.stats.groups = self.groups.len() as u32;
        self.stats.commands = self.commands.len() as u32;
        self.stats.instance_records = self.records.len() as u32;
    }

    fn clear(&mut self) {
        for bucket in &mut self.buckets[..self.order.len()] {
            bucket.clear();
        }
        self.bucket_of.clear();
        self.order.clear();
        self.unknown.clear();
        self.groups.clear();
        self.commands.clear();
        self.records.clear();
        self.materials.clear();
        self.stats = BatchStats::default();
    }

    /// Buckets request indices by mesh in first-seen order.
    fn bucket<M>(&mut self, requests: &[DrawRequest], meshes: &M)
    where
        M: MeshLookup + ?Sized,
    {
        for (index, request) in requests.iter().enumerate() {
            let bucket_index = match self.bucket_of.get(&request.mesh) {
                Some(&bucket_index) => bucket_index,
                None => {
                    if meshes.layout(request.mesh).is_none() {
                        if !self.unknown.contains(&request.mesh) {
                            log::warn!("Draw request references unknown mesh {:?}; skipped", request.mesh);
                            self.unknown.push(request.mesh);
                        }
                        self.stats.dropped_requests += 1;
                        continue;
                    }
                    let bucket_index = self.order.len();
                    if bucket_index == self.buckets.len() {
                        self.buckets.push(Vec::new());
                    }
                    self.order.push(request.mesh);
                    self.bucket_of.insert(request.mesh, bucket_index);
                    bucket_index
                }
            };
            self.buckets[bucket_index].push(index as u32);
        }
    }

    fn fits(&self, group: &MeshGroup) -> bool {
        let commands = u64::from(group.command_offset) + u64::from(group.submesh_count);
        let records = u64::from(group.instance_offset) + u64::from(group.record_count());
        let materials = u64::from(group.material_offset) + u64::from(group.material_count);
        commands <= u64::from(self.capacity.max_commands)
            && records <= u64::from(self.capacity.max_instance_records)
            && materials <= u64::from(self.capacity.max_materials)
    }

    fn emit_group(
        &mut self,
        group: &MeshGroup,
        layout: &MeshLayout,
        bucket_index: usize,
        requests: &[DrawRequest],
        view: &BatchView,
    ) {
        let prev_view_projection = self.prev_view_projection.unwrap_or(view.view_projection);

        self.scratch.clear();
        for &request_index in &self.buckets[bucket_index] {
            let request = &requests[request_index as usize];
            let bounds = layout.bounds.transformed(&request.transform);
            let prev_transform = self
                .prev_transforms
                .get(&request.entity_id)
                .copied()
                .unwrap_or(request.transform);
            self.next_transforms.insert(request.entity_id, request.transform);

            let bone_offset = match request.skin {
                Some(skin) if skin.offset.saturating_add(skin.count) <= view.bone_count => skin.offset,
                Some(skin) => {
                    log::warn!(
                        "Entity {} skin [{}..{}) exceeds bone palette ({}); drawn unskinned",
                        request.entity_id,
                        skin.offset,
                        skin.offset.saturating_add(skin.count),
                        view.bone_count
                    );
                    NO_BONES
                }
                None => NO_BONES,
            };

            self.scratch.push(InstanceScratch {
                transform: request.transform,
                prev_transform,
                bounds,
                visible: view.frustum.intersects_aabb(&bounds),
                bone_offset,
                entity_id: request.entity_id,
            });
        }

        for (submesh_index, submesh) in layout.submeshes.iter().enumerate() {
            let command_index = group.command_offset + submesh_index as u32;
            let first_instance = group.instance_offset + submesh_index as u32 * group.instance_count;
            let material_index =
                group.material_offset + submesh.material_index.min(group.material_count.saturating_sub(1));

            for instance in &self.scratch {
                let model = instance.transform * submesh.transform;
                let prev_model = instance.prev_transform * submesh.transform;
                if !instance.visible {
                    self.stats.cpu_culled += 1;
                }
                self.records.push(InstanceRecord {
                    model,
                    mvp: view.view_projection * model,
                    prev_mvp: prev_view_projection * prev_model,
                    world_min: instance.bounds.min.extend(1.0),
                    world_max: instance.bounds.max.extend(1.0),
                    indices: [
                        material_index,
                        instance.entity_id,
                        instance.bone_offset,
                        u32::from(instance.visible),
                    ],
                    command: [command_index, 0, 0, 0],
                });
            }

            self.commands.push(DrawIndexedIndirect {
                index_count: submesh.index_count,
                instance_count: group.instance_count,
                first_index: submesh.base_index,
                base_vertex: submesh.base_vertex,
                first_instance,
            });
        }

        if layout.materials.is_empty() {
            self.materials.push(MaterialData::default());
        } else {
            self.materials.extend_from_slice(&layout.materials);
        }
        self.groups.push(*group);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use slotmap::SlotMap;

    use super::*;
    use crate::renderer::core::resources::{MeshData, Submesh};

    fn two_submesh_mesh() -> MeshData {
        let mut mesh = MeshData::cube(MaterialData::default());
        mesh.submeshes.push(Submesh {
            base_index: 18,
            index_count: 18,
            base_vertex: 0,
            transform: Mat4::IDENTITY,
            material_index: 1,
        });
        mesh.submeshes[0].index_count = 18;
        mesh.materials.push(MaterialData::default());
        mesh
    }

    fn view() -> BatchView {
        let projection = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        BatchView::new(projection * view, 0)
    }

    #[test]
    fn records_are_submesh_major() {
        let mut meshes: SlotMap<MeshId, MeshLayout> = SlotMap::with_key();
        let mesh = meshes.insert(two_submesh_mesh().layout());

        let requests: Vec<_> = (0..3)
            .map(|i| DrawRequest::new(mesh, Mat4::from_translation(Vec3::X * i as f32), i))
            .collect();

        let mut batch = DrawBatch::new(BatchSettings::default());
        batch.build(&requests, &meshes, &view());

        assert_eq!(batch.records().len(), 6);
        assert_eq!(batch.commands()[0].first_instance, 0);
        assert_eq!(batch.commands()[1].first_instance, 3);
        let entities: Vec<u32> = batch.records().iter().map(InstanceRecord::entity_id).collect();
        assert_eq!(entities, [0, 1, 2, 0, 1, 2]);
        assert_eq!(batch.records()[3].material_index(), 1);
        assert_eq!(batch.records()[4].command_index(), 1);
    }

    #[test]
    fn mesh_without_materials_gets_its_own_default() {
        let mut meshes: SlotMap<MeshId, MeshLayout> = SlotMap::with_key();
        let mut bare = MeshData::cube(MaterialData::default());
        bare.materials.clear();
        let bare = meshes.insert(bare.layout());
        let red = meshes.insert(
            MeshData::cube(MaterialData {
                base_color: [1.0, 0.0, 0.0, 1.0],
                ..Default::default()
            })
            .layout(),
        );

        let requests = [
            DrawRequest::new(bare, Mat4::IDENTITY, 0),
            DrawRequest::new(red, Mat4::IDENTITY, 1),
        ];
        let mut batch = DrawBatch::new(BatchSettings::default());
        batch.build(&requests, &meshes, &view());

        assert_eq!(batch.materials().len(), 2);
        assert_eq!(batch.groups()[1].material_offset, 1);
        let bare_material = batch.records()[0].material_index() as usize;
        assert_eq!(bare_material, 0);
        assert_eq!(batch.materials()[bare_material].base_color, MaterialData::default().base_color);
        assert_eq!(batch.records()[1].material_index(), 1);

        // Alone, the index still lands inside the buffer.
        batch.build(&requests[..1], &meshes, &view());
        assert_eq!(batch.materials().len(), 1);
        assert!((batch.records()[0].material_index() as usize) < batch.materials().len());
    }

    #[test]
    fn first_frame_prev_mvp_matches_current() {
        let mut meshes: SlotMap<MeshId, MeshLayout> = SlotMap::with_key();
        let mesh = meshes.insert(MeshData::cube(MaterialData::default()).layout());
        let requests = [DrawRequest::new(mesh, Mat4::IDENTITY, 7)];

        let mut batch = DrawBatch::new(BatchSettings::default());
        batch.build(&requests, &meshes, &view());
        let record = batch.records()[0];
        assert_eq!(record.mvp, record.prev_mvp);

        let moved = [DrawRequest::new(mesh, Mat4::from_translation(Vec3::Y), 7)];
        batch.build(&moved, &meshes, &view());
        let record = batch.records()[0];
        assert_ne!(record.mvp, record.prev_mvp);
        assert_eq!(record.prev_mvp, view().view_projection);
    }

    #[test]
    fn reset_history_treats_next_frame_as_first() {
        let mut meshes: SlotMap<MeshId, MeshLayout> = SlotMap::with_key();
        let mesh = meshes.insert(MeshData::cube(MaterialData::default()).layout());

        let mut batch = DrawBatch::new(BatchSettings::default());
        batch.build(&[DrawRequest::new(mesh, Mat4::IDENTITY, 7)], &meshes, &view());

        batch.reset_history();
        let moved = [DrawRequest::new(mesh, Mat4::from_translation(Vec3::Y), 7)];
        batch.build(&moved, &meshes, &view());
        let record = batch.records()[0];
        assert_eq!(record.mvp, record.prev_mvp);
    }

    #[test]
    fn out_of_frustum_instance_is_flagged_not_removed() {
        let mut meshes: SlotMap<MeshId, MeshLayout> = SlotMap::with_key();
        let mesh = meshes.insert(MeshData::cube(MaterialData::default()).layout());
        let requests = [
            DrawRequest::new(mesh, Mat4::IDENTITY, 0),
            DrawRequest::new(mesh, Mat4::from_translation(Vec3::new(0.0, 0.0, 50.0)), 1),
        ];

        let mut batch = DrawBatch::new(BatchSettings::default());
        batch.build(&requests, &meshes, &view());

        assert_eq!(batch.records().len(), 2);
        assert!(batch.records()[0].is_visible());
        assert!(!batch.records()[1].is_visible());
        assert_eq!(batch.stats().cpu_culled, 1);
        assert_eq!(batch.commands()[0].instance_count, 2);
    }

    #[test]
    fn skin_past_palette_is_drawn_unskinned() {
        use crate::scene::BoneRange;

        let mut meshes: SlotMap<MeshId, MeshLayout> = SlotMap::with_key();
        let mesh = meshes.insert(MeshData::cube(MaterialData::default()).layout());
        let requests = [
            DrawRequest::new(mesh, Mat4::IDENTITY, 0).with_skin(BoneRange { offset: 0, count: 4 }),
            DrawRequest::new(mesh, Mat4::IDENTITY, 1).with_skin(BoneRange { offset: 4, count: 4 }),
        ];

        let mut batch = DrawBatch::new(BatchSettings::default());
        let mut view = view();
        view.bone_count = 6;
        batch.build(&requests, &meshes, &view);

        assert_eq!(batch.records()[0].bone_offset(), Some(0));
        assert_eq!(batch.records()[1].bone_offset(), None);
    }
}
