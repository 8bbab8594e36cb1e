//! Hierarchical depth pyramid (HZB).
//!
//! An `R32Float` mip chain where each texel holds the farthest depth of its
//! footprint one level down. Built from the geometry depth at the end of a
//! frame and read by the occlusion culler at the start of the next.

use std::borrow::Cow;

use crate::renderer::core::resources::{CachedBindGroup, ResourceId, Tracked};

pub const HZB_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
const WORKGROUP_SIZE: u32 = 8;

/// Number of mips of a full chain down to 1×1: `floor(log2(max)) + 1`.
#[inline]
#[must_use]
pub fn mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Size of `level` in a chain whose base is `width × height`.
#[inline]
#[must_use]
pub fn mip_size(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

pub struct HzbPyramid {
    texture: wgpu::Texture,
    view: Tracked<wgpu::TextureView>,
    mip_views: Vec<wgpu::TextureView>,
    width: u32,
    height: u32,
    /// Set once a build has been recorded since creation.
    valid: bool,
}

impl HzbPyramid {
    #[must_use]
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let mip_levels = mip_count(width, height);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("HZB Pyramid"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HZB_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = Tracked::new(texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("HZB Pyramid View"),
            ..Default::default()
        }));
        let mip_views = (0..mip_levels)
            .map(|level| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("HZB Mip View"),
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        log::debug!("HZB pyramid {width}x{height}, {mip_levels} mips");

        Self {
            texture,
            view,
            mip_views,
            width,
            height,
            valid: false,
        }
    }

    /// Whether the pyramid holds depth from an earlier frame.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub fn mip_levels(&self) -> u32 {
        self.texture.mip_level_count()
    }

    /// View over every mip, for `textureLoad` with an explicit level.
    #[inline]
    #[must_use]
    pub fn view(&self) -> &Tracked<wgpu::TextureView> {
        &self.view
    }
}

/// Compute pipelines that fill an [`HzbPyramid`] from a depth attachment.
pub struct HzbBuilder {
    copy_pipeline: wgpu::ComputePipeline,
    downsample_pipeline: wgpu::ComputePipeline,
    copy_layout: wgpu::BindGroupLayout,
    downsample_layout: wgpu::BindGroupLayout,
    copy_group: CachedBindGroup,
    downsample_groups: Vec<wgpu::BindGroup>,
    downsample_key: ResourceId,
}

impl HzbBuilder {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let storage_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: HZB_FORMAT,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        };

        let copy_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("HZB Copy Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                storage_entry(1),
            ],
        });

        let downsample_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("HZB Downsample Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                storage_entry(3),
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("HZB Build Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("../shaders/hzb_build.wgsl"))),
        });

        let pipeline = |label: &str, layout: &wgpu::BindGroupLayout, entry_point: &str| {
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[layout],
                immediate_size: 0,
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        Self {
            copy_pipeline: pipeline("HZB Copy Pipeline", &copy_layout, "copy_depth"),
            downsample_pipeline: pipeline("HZB Downsample Pipeline", &downsample_layout, "downsample"),
            copy_layout,
            downsample_layout,
            copy_group: CachedBindGroup::default(),
            downsample_groups: Vec::new(),
            downsample_key: ResourceId::NONE,
        }
    }

    /// Drops bind groups that reference a replaced pyramid or depth view.
    pub fn invalidate(&mut self) {
        self.copy_group.clear();
        self.downsample_groups.clear();
        self.downsample_key = ResourceId::NONE;
    }

    /// Records the full pyramid build and marks the pyramid valid.
    ///
    /// `depth` must match the pyramid's base size.
    pub fn build(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        depth: &Tracked<wgpu::TextureView>,
        pyramid: &mut HzbPyramid,
    ) {
        if self.downsample_key != pyramid.view.id() {
            self.downsample_groups = (1..pyramid.mip_views.len())
                .map(|level| {
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("HZB Downsample BindGroup"),
                        layout: &self.downsample_layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 2,
                                resource: wgpu::BindingResource::TextureView(&pyramid.mip_views[level - 1]),
                            },
                            wgpu::BindGroupEntry {
                                binding: 3,
                                resource: wgpu::BindingResource::TextureView(&pyramid.mip_views[level]),
                            },
                        ],
                    })
                })
                .collect();
            self.downsample_key = pyramid.view.id();
        }

        let copy_layout = &self.copy_layout;
        let base_view = &pyramid.mip_views[0];
        let copy_group = self.copy_group.get_or_build(&[depth.id(), pyramid.view.id()], || {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("HZB Copy BindGroup"),
                layout: copy_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(depth),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(base_view),
                    },
                ],
            })
        });

        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("HZB Build"),
            timestamp_writes: None,
        });

        cpass.set_pipeline(&self.copy_pipeline);
        cpass.set_bind_group(0, copy_group, &[]);
        cpass.dispatch_workgroups(
            pyramid.width.div_ceil(WORKGROUP_SIZE),
            pyramid.height.div_ceil(WORKGROUP_SIZE),
            1,
        );

        cpass.set_pipeline(&self.downsample_pipeline);
        for (index, group) in self.downsample_groups.iter().enumerate() {
            let (width, height) = mip_size(pyramid.width, pyramid.height, index as u32 + 1);
            cpass.set_bind_group(0, group, &[]);
            cpass.dispatch_workgroups(width.div_ceil(WORKGROUP_SIZE), height.div_ceil(WORKGROUP_SIZE), 1);
        }
        drop(cpass);

        pyramid.valid = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_reaches_one_texel() {
        assert_eq!(mip_count(1, 1), 1);
        assert_eq!(mip_count(1600, 900), 11);
        assert_eq!(mip_count(800, 450), 10);
        assert_eq!(mip_count(1024, 1), 11);
        assert_eq!(mip_size(1600, 900, 10), (1, 1));
        assert_eq!(mip_size(5, 3, 1), (2, 1));
    }
}
