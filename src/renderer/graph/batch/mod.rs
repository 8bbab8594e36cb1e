//! Indirect Draw Batcher
//!
//! Each geometry-bearing pass owns one [`IndirectBatcher`]. Per frame it:
//!
//! 1. groups the frame's draw requests by mesh ([`DrawBatch`])
//! 2. uploads commands, instance records, materials and the bone palette into
//!    the current frame slot's buffers, one copy each
//! 3. after culling, issues one multi-draw per [`MeshGroup`]
//!
//! Drawing takes a [`CulledCommands`] token. The only ways to get one are the
//! late occlusion culler or [`IndirectBatcher::frustum_only`], so a command
//! buffer is never drawn before the culler had its chance to rewrite it.

mod draw_batch;
mod records;

use glam::Mat4;

pub use draw_batch::{BatchView, DrawBatch, IndirectDraw};
pub use records::{BatchStats, DrawIndexedIndirect, InstanceRecord, MeshGroup, NO_BONES};

use crate::renderer::core::resources::{FrameBufferAllocator, MaterialData, MeshLookup, MeshRegistry};
use crate::renderer::settings::BatchSettings;
use crate::scene::DrawRequest;

/// Proof that the command buffer of `slot` is ready to be drawn.
#[derive(Debug)]
pub struct CulledCommands {
    slot: usize,
}

impl CulledCommands {
    pub(crate) fn new(slot: usize) -> Self {
        Self { slot }
    }

    #[inline]
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// GPU side of one pass's indirect batch.
pub struct IndirectBatcher {
    label: &'static str,
    batch: DrawBatch,
    commands: FrameBufferAllocator<DrawIndexedIndirect>,
    records: FrameBufferAllocator<InstanceRecord>,
    materials: FrameBufferAllocator<MaterialData>,
    bones: FrameBufferAllocator<Mat4>,
    layout: wgpu::BindGroupLayout,
    bind_groups: Vec<wgpu::BindGroup>,
}

impl IndirectBatcher {
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        capacity: BatchSettings,
        frames_in_flight: usize,
    ) -> Self {
        let storage = wgpu::BufferUsages::STORAGE;
        let commands = FrameBufferAllocator::new(
            device,
            &format!("{label} Indirect Commands"),
            capacity.max_commands,
            frames_in_flight,
            storage | wgpu::BufferUsages::INDIRECT,
        );
        let records = FrameBufferAllocator::new(
            device,
            &format!("{label} Instance Records"),
            capacity.max_instance_records,
            frames_in_flight,
            storage,
        );
        let materials = FrameBufferAllocator::new(
            device,
            &format!("{label} Materials"),
            capacity.max_materials,
            frames_in_flight,
            storage,
        );
        let bones = FrameBufferAllocator::new(
            device,
            &format!("{label} Bone Palette"),
            capacity.max_bones,
            frames_in_flight,
            storage,
        );

        let read_only = |binding: u32, visibility: wgpu::ShaderStages| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label} Instance Layout")),
            entries: &[
                read_only(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                read_only(1, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                read_only(2, wgpu::ShaderStages::VERTEX),
            ],
        });

        // Buffers never grow, so one bind group per slot lives as long as the batcher.
        let bind_groups = (0..frames_in_flight)
            .filter_map(|slot| {
                let records = records.buffer(slot)?;
                let materials = materials.buffer(slot)?;
                let bones = bones.buffer(slot)?;
                Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("{label} Instance Data [frame {slot}]")),
                    layout: &layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: records.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: materials.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: bones.as_entire_binding(),
                        },
                    ],
                }))
            })
            .collect();

        Self {
            label,
            batch: DrawBatch::new(capacity),
            commands,
            records,
            materials,
            bones,
            layout,
            bind_groups,
        }
    }

    /// Builds this frame's batch and uploads it into `slot`.
    pub fn prepare<M>(
        &mut self,
        queue: &wgpu::Queue,
        slot: usize,
        requests: &[DrawRequest],
        meshes: &M,
        view_projection: Mat4,
        bone_palette: &[Mat4],
    ) where
        M: MeshLookup + ?Sized,
    {
        let bone_capacity = self.bones.capacity() as usize;
        if bone_palette.len() > bone_capacity {
            log::error!(
                "{}: bone palette of {} matrices exceeds capacity {bone_capacity}; truncated",
                self.label,
                bone_palette.len()
            );
        }
        let palette = &bone_palette[..bone_palette.len().min(bone_capacity)];
        self.bones.fill(palette);

        let view = BatchView::new(view_projection, palette.len() as u32);
        self.batch.build(requests, meshes, &view);

        let fitted = self.commands.fill(self.batch.commands())
            & self.records.fill(self.batch.records())
            & self.materials.fill(self.batch.materials());
        if !fitted {
            log::error!("{}: batch exceeds its GPU buffers; nothing drawn", self.label);
            self.commands.reset();
            self.records.reset();
            self.materials.reset();
        }

        self.commands.upload(queue, slot);
        self.records.upload(queue, slot);
        self.materials.upload(queue, slot);
        self.bones.upload(queue, slot);
    }

    /// Forgets the previous-frame transforms used for motion vectors.
    pub fn reset_history(&mut self) {
        self.batch.reset_history();
    }

    /// Token for drawing with the CPU frustum flags only.
    #[must_use]
    pub fn frustum_only(&self, slot: usize) -> CulledCommands {
        CulledCommands::new(slot)
    }

    /// Attaches the instance data of `slot` at bind group index `group`.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>, group: u32, slot: usize) {
        if let Some(bind_group) = self.bind_groups.get(slot) {
            pass.set_bind_group(group, bind_group, &[]);
        }
    }

    /// Issues one multi-draw per mesh group. Returns the number of draw calls.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, meshes: &MeshRegistry, culled: &CulledCommands) -> u32 {
        if self.commands.is_empty() {
            return 0;
        }
        let Some(commands) = self.commands.buffer(culled.slot) else {
            return 0;
        };

        let stride = FrameBufferAllocator::<DrawIndexedIndirect>::stride();
        let mut draw_calls = 0;
        for draw in self.batch.indirect_draws() {
            let Some(mesh) = meshes.get(draw.mesh) else {
                log::warn!("{}: mesh {:?} removed before draw", self.label, draw.mesh);
                continue;
            };
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.multi_draw_indexed_indirect(commands, u64::from(draw.command_offset) * stride, draw.command_count);
            draw_calls += 1;
        }
        draw_calls
    }

    #[inline]
    #[must_use]
    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    #[inline]
    #[must_use]
    pub fn batch(&self) -> &DrawBatch {
        &self.batch
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        self.batch.stats()
    }

    #[inline]
    #[must_use]
    pub fn command_count(&self) -> u32 {
        self.commands.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn record_count(&self) -> u32 {
        self.records.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn commands_buffer(&self, slot: usize) -> Option<&wgpu::Buffer> {
        self.commands.buffer(slot)
    }

    #[inline]
    #[must_use]
    pub fn records_buffer(&self, slot: usize) -> Option<&wgpu::Buffer> {
        self.records.buffer(slot)
    }
}
