//! Bindless Texture Residency
//!
//! One shared, fixed-size descriptor array that shaders index by integer slot.
//! The slot bookkeeping lives in [`SlotTable`]; [`BindlessTextures`] mirrors it
//! into a `binding_array<texture_2d<f32>>` and keeps one bind group per frame
//! in flight.
//!
//! # Mutation
//!
//! Allocation and release are load-time operations. They take `&mut self`, so
//! they cannot overlap frame recording (which only borrows the table shared),
//! and every mutation waits for the device to go idle before rewriting the
//! descriptors. No in-flight frame ever observes a half-written array.
//!
//! # Residency
//!
//! The table holds `Weak` references only. When the last `Arc` to a texture is
//! dropped its slot expires: the descriptor keeps pointing at the old view
//! (which wgpu keeps alive) until the slot is reclaimed by a later `allocate`
//! or explicitly released, at which point it is rewritten to the default.

mod slot_table;

use std::num::NonZeroU32;
use std::sync::Arc;

pub use slot_table::{DEFAULT_SLOT, SlotState, SlotTable};

use crate::errors::Result;
use crate::renderer::core::context::wait_device_idle;
use crate::renderer::settings::BindlessSettings;

/// A texture registered with the bindless table.
pub struct BindlessTexture {
    pub label: String,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl BindlessTexture {
    /// Creates an RGBA8 sRGB texture from tightly packed pixel data.
    #[must_use]
    pub fn from_rgba8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            label: label.to_string(),
            texture,
            view,
        }
    }

    /// 1×1 opaque white, used as the default texture.
    #[must_use]
    pub fn white(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::from_rgba8(device, queue, "Bindless Default White", 1, 1, &[255; 4])
    }
}

/// GPU mirror of a [`SlotTable`] of textures.
pub struct BindlessTextures {
    table: SlotTable<BindlessTexture>,
    /// Current content of every descriptor array entry.
    descriptors: Vec<wgpu::TextureView>,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    frame_groups: Vec<wgpu::BindGroup>,
}

impl BindlessTextures {
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        settings: &BindlessSettings,
        frames_in_flight: usize,
    ) -> Self {
        let default = Arc::new(BindlessTexture::white(device, queue));
        let table = SlotTable::new(Arc::clone(&default), settings);
        let capacity = table.capacity();

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bindless Textures Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: NonZeroU32::new(capacity),
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Bindless Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });

        let descriptors = vec![default.view.clone(); capacity as usize];

        let mut bindless = Self {
            table,
            descriptors,
            layout,
            sampler,
            frame_groups: Vec::with_capacity(frames_in_flight),
        };
        bindless.rebuild_frame_groups(device, frames_in_flight.max(1));

        log::info!(
            "Bindless table ready: {capacity} slots, {} frame groups",
            bindless.frame_groups.len()
        );
        bindless
    }

    #[inline]
    #[must_use]
    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Slot that always samples the default texture.
    #[inline]
    #[must_use]
    pub fn default_slot(&self) -> u32 {
        DEFAULT_SLOT
    }

    #[inline]
    #[must_use]
    pub fn table(&self) -> &SlotTable<BindlessTexture> {
        &self.table
    }

    /// Registers `texture` at a randomly probed free slot.
    pub fn allocate(&mut self, device: &wgpu::Device, texture: &Arc<BindlessTexture>) -> Result<u32> {
        wait_device_idle(device)?;
        let slot = self.table.allocate(texture).inspect_err(|e| {
            log::error!("Bindless allocation of '{}' failed: {e}", texture.label);
        })?;
        self.descriptors[slot as usize] = texture.view.clone();
        self.refresh(device);
        log::debug!("Bindless '{}' -> slot {slot}", texture.label);
        Ok(slot)
    }

    /// Registers `texture` at a caller-chosen slot, replacing its content.
    pub fn allocate_at(
        &mut self,
        device: &wgpu::Device,
        texture: &Arc<BindlessTexture>,
        slot: u32,
    ) -> Result<()> {
        wait_device_idle(device)?;
        self.table.allocate_at(texture, slot)?;
        self.descriptors[slot as usize] = texture.view.clone();
        self.refresh(device);
        Ok(())
    }

    /// Points `slot` back at the default texture. Slot 0 is left untouched.
    pub fn release(&mut self, device: &wgpu::Device, slot: u32) -> Result<()> {
        if slot == DEFAULT_SLOT {
            log::warn!("Ignoring release of reserved bindless slot {DEFAULT_SLOT}");
            return Ok(());
        }
        wait_device_idle(device)?;
        self.table.release(slot)?;
        self.descriptors[slot as usize] = self.table.default_resource().view.clone();
        self.refresh(device);
        Ok(())
    }

    /// Bind group for the given frame slot.
    #[inline]
    #[must_use]
    pub fn bind_for_frame(&self, frame_slot: usize) -> &wgpu::BindGroup {
        &self.frame_groups[frame_slot % self.frame_groups.len()]
    }

    pub fn bind_render(&self, pass: &mut wgpu::RenderPass<'_>, group: u32, frame_slot: usize) {
        pass.set_bind_group(group, self.bind_for_frame(frame_slot), &[]);
    }

    pub fn bind_compute(&self, pass: &mut wgpu::ComputePass<'_>, group: u32, frame_slot: usize) {
        pass.set_bind_group(group, self.bind_for_frame(frame_slot), &[]);
    }

    fn refresh(&mut self, device: &wgpu::Device) {
        let frames = self.frame_groups.len().max(1);
        self.rebuild_frame_groups(device, frames);
    }

    fn rebuild_frame_groups(&mut self, device: &wgpu::Device, frames: usize) {
        let views: Vec<&wgpu::TextureView> = self.descriptors.iter().collect();
        self.frame_groups = (0..frames)
            .map(|frame| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Bindless Textures Frame {frame}")),
                    layout: &self.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureViewArray(&views),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                })
            })
            .collect();
    }
}
