//! Late occlusion culler.
//!
//! Runs between the batcher's upload and the geometry draw. One compute pass
//! with two dispatches:
//!
//! - `cull_instances`: per record, frustum test against the current camera and
//!   HZB test against last frame's pyramid; rewrites the record's visible flag
//!   and counts visible records per command.
//! - `rewrite_commands`: per command, zeroes `instance_count` when no record of
//!   the command survived. Commands are never compacted.
//!
//! The render pass that consumes the commands is recorded later in the same
//! encoder, so wgpu orders the storage writes before the indirect reads.
//! Without a usable pyramid (first frame, right after a resize, or occlusion
//! disabled) nothing is dispatched and the CPU frustum flags stand.

use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use super::hzb::HzbPyramid;
use crate::renderer::core::resources::{CachedBindGroup, FrameBufferAllocator};
use crate::renderer::graph::batch::{CulledCommands, IndirectBatcher};
use crate::scene::Frustum;

const WORKGROUP_SIZE: u32 = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CullUniforms {
    view_projection: Mat4,
    planes: [Vec4; 6],
    hzb_size: [f32; 2],
    hzb_mips: u32,
    record_count: u32,
    command_count: u32,
    _pad: [u32; 3],
}

/// Why a frame was drawn without the occlusion test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullSkip {
    Disabled,
    NoPyramid,
    /// Pyramid exists but holds no depth yet.
    StalePyramid,
    NothingToCull,
}

/// Decides whether the GPU occlusion test runs this frame.
///
/// `pyramid_valid` is `None` when no pyramid exists and `Some(false)` when
/// one exists but holds no depth yet (first frame after a resize). Any
/// `Some` result means every CPU-visible record is drawn.
#[must_use]
pub fn skip_reason(enabled: bool, record_count: u32, pyramid_valid: Option<bool>) -> Option<CullSkip> {
    if !enabled {
        return Some(CullSkip::Disabled);
    }
    if record_count == 0 {
        return Some(CullSkip::NothingToCull);
    }
    match pyramid_valid {
        None => Some(CullSkip::NoPyramid),
        Some(false) => Some(CullSkip::StalePyramid),
        Some(true) => None,
    }
}

pub struct LateOcclusionCuller {
    enabled: bool,
    cull_pipeline: wgpu::ComputePipeline,
    rewrite_pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    uniforms: FrameBufferAllocator<CullUniforms>,
    visible_counts: wgpu::Buffer,
    bind_groups: Vec<CachedBindGroup>,
    last_skip: Option<CullSkip>,
}

impl LateOcclusionCuller {
    #[must_use]
    pub fn new(device: &wgpu::Device, max_commands: u32, frames_in_flight: usize, enabled: bool) -> Self {
        let storage = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Occlusion Cull Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(1),
                storage(2),
                storage(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Occlusion Cull Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("../shaders/occlusion_cull.wgsl"))),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Occlusion Cull Pipeline Layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });
        let pipeline = |label: &str, entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        // Zero-initialized; rewrite_commands resets every counter it reads.
        let visible_counts = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Occlusion Visible Counts"),
            size: u64::from(max_commands.max(1)) * 4,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        Self {
            enabled,
            cull_pipeline: pipeline("Occlusion Cull Pipeline", "cull_instances"),
            rewrite_pipeline: pipeline("Occlusion Rewrite Pipeline", "rewrite_commands"),
            layout,
            uniforms: FrameBufferAllocator::new(
                device,
                "Occlusion Cull Uniforms",
                1,
                frames_in_flight,
                wgpu::BufferUsages::UNIFORM,
            ),
            visible_counts,
            bind_groups: (0..frames_in_flight).map(|_| CachedBindGroup::default()).collect(),
            last_skip: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Reason the last `cull` call skipped the GPU test, if it did.
    #[inline]
    #[must_use]
    pub fn last_skip(&self) -> Option<CullSkip> {
        self.last_skip
    }

    /// Tests and rewrites `batcher`'s uploaded commands for `slot`.
    pub fn cull(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        batcher: &IndirectBatcher,
        hzb: Option<&HzbPyramid>,
        view_projection: Mat4,
        slot: usize,
    ) -> CulledCommands {
        let skip = skip_reason(self.enabled, batcher.record_count(), hzb.map(HzbPyramid::is_valid));
        if skip != self.last_skip {
            match skip {
                Some(reason) => log::debug!("Occlusion culling skipped: {reason:?}"),
                None => log::debug!("Occlusion culling active"),
            }
            self.last_skip = skip;
        }

        let (Some(pyramid), None) = (hzb, skip) else {
            return batcher.frustum_only(slot);
        };

        let (width, height) = pyramid.size();
        let record_count = batcher.record_count();
        let command_count = batcher.command_count();
        self.uniforms.fill(&[CullUniforms {
            view_projection,
            planes: *Frustum::from_matrix(view_projection).planes(),
            hzb_size: [width as f32, height as f32],
            hzb_mips: pyramid.mip_levels(),
            record_count,
            command_count,
            _pad: [0; 3],
        }]);
        self.uniforms.upload(queue, slot);

        let (Some(records), Some(commands), Some(uniform_buffer)) = (
            batcher.records_buffer(slot),
            batcher.commands_buffer(slot),
            self.uniforms.buffer(slot),
        ) else {
            return batcher.frustum_only(slot);
        };

        let layout = &self.layout;
        let visible_counts = &self.visible_counts;
        let hzb_view = pyramid.view();
        let Some(cache) = self.bind_groups.get_mut(slot) else {
            return batcher.frustum_only(slot);
        };
        // Batcher buffers are fixed per slot; only the pyramid can change.
        let bind_group = cache.get_or_build(&[hzb_view.id()], || {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Occlusion Cull BindGroup"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: records.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: commands.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: visible_counts.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(hzb_view),
                    },
                ],
            })
        });

        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Late Occlusion Cull"),
                timestamp_writes: None,
            });
            cpass.set_bind_group(0, bind_group, &[]);
            cpass.set_pipeline(&self.cull_pipeline);
            cpass.dispatch_workgroups(record_count.div_ceil(WORKGROUP_SIZE), 1, 1);
            cpass.set_pipeline(&self.rewrite_pipeline);
            cpass.dispatch_workgroups(command_count.div_ceil(WORKGROUP_SIZE), 1, 1);
        }

        CulledCommands::new(slot)
    }
}
