//! Render Graph Context System
//!
//! Provides the two phase-separated contexts of [`GpuBackend`]:
//!
//! - [`InitContext`]: handed to `init`, `init_late`, `resize` and
//!   `resize_late`. Passes create pipelines and size-dependent attachments.
//!
//! - [`FrameContext`]: handed to `update`. Passes record GPU work into the
//!   frame's single command encoder.
//!
//! # Design Principles
//!
//! Both contexts store individual references to renderer subsystems, so the
//! borrow checker can split borrows across disjoint fields (e.g. allocate a
//! transient bind group while holding the encoder). The bindless table is
//! only ever borrowed shared here: its mutation needs `&mut` on the renderer,
//! which cannot coexist with a frame being recorded.

use super::pass::PassBackend;
use crate::renderer::core::bindless::BindlessTextures;
use crate::renderer::core::frame_ring::{FrameIndex, TransientBindGroups};
use crate::renderer::core::resources::MeshRegistry;
use crate::renderer::settings::RendererSettings;
use crate::scene::FrameData;

/// The production backend: hooks receive live wgpu handles.
pub struct GpuBackend;

impl PassBackend for GpuBackend {
    type Init<'a> = InitContext<'a>;
    type Frame<'a> = FrameContext<'a>;

    fn push_debug_group(frame: &mut FrameContext<'_>, label: &str) {
        frame.encoder.push_debug_group(label);
    }

    fn pop_debug_group(frame: &mut FrameContext<'_>) {
        frame.encoder.pop_debug_group();
    }
}

/// Context for resource creation hooks.
pub struct InitContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub settings: &'a RendererSettings,
    pub bindless: &'a BindlessTextures,
    pub surface_format: wgpu::TextureFormat,
    /// Current viewport size.
    pub width: u32,
    pub height: u32,
}

impl InitContext<'_> {
    #[inline]
    #[must_use]
    pub fn frames_in_flight(&self) -> usize {
        self.settings.frame_count()
    }
}

/// Context for per-frame recording.
pub struct FrameContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub frame: &'a FrameData,
    pub index: FrameIndex,
    /// Bind groups that only live for this frame slot.
    pub transient: &'a mut TransientBindGroups,
    pub bindless: &'a BindlessTextures,
    pub meshes: &'a MeshRegistry,
    pub surface_view: &'a wgpu::TextureView,
    pub settings: &'a RendererSettings,
}

impl FrameContext<'_> {
    /// Frame slot the current frame records into.
    #[inline]
    #[must_use]
    pub fn slot(&self) -> usize {
        self.index.slot
    }
}
