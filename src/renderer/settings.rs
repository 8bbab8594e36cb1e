//! Renderer Settings
//!
//! Configuration consumed once when the [`Renderer`](crate::renderer::Renderer)
//! is created. Everything that sizes a fixed GPU allocation lives here: the
//! number of frames in flight, the bindless descriptor array, and the per-pass
//! indirect batching capacities.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tessera::renderer::settings::{BatchSettings, RendererSettings};
//!
//! let settings = RendererSettings {
//!     vsync: false,
//!     batch: BatchSettings {
//!         max_commands: 8192,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! ```

// ---------------------------------------------------------------------------
// BindlessSettings
// ---------------------------------------------------------------------------

/// Sizing of the shared bindless texture residency table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindlessSettings {
    /// Number of entries in the descriptor array, including the reserved
    /// default slot 0. Sized with large headroom over the expected live
    /// texture count so random probing stays cheap.
    pub max_slots: u32,

    /// Random probes attempted by `allocate` before falling back to a linear
    /// sweep of the table.
    pub max_probe_attempts: u32,

    /// Seed for the slot probe generator.
    pub seed: u64,
}

impl Default for BindlessSettings {
    fn default() -> Self {
        Self {
            max_slots: 2048,
            max_probe_attempts: 64,
            seed: 0x7E55_E7A0,
        }
    }
}

// ---------------------------------------------------------------------------
// BatchSettings
// ---------------------------------------------------------------------------

/// Fixed per-frame capacities of one indirect draw batcher.
///
/// Every geometry-bearing pass owns one batcher with these capacities, times
/// the number of frames in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Maximum indirect command entries (one per mesh group × submesh).
    pub max_commands: u32,
    /// Maximum per-instance records (instances × submeshes).
    pub max_instance_records: u32,
    /// Maximum material entries across all mesh groups.
    pub max_materials: u32,
    /// Maximum bone matrices in the per-frame skinning palette.
    pub max_bones: u32,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_commands: 4096,
            max_instance_records: 65536,
            max_materials: 4096,
            max_bones: 16384,
        }
    }
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Global configuration for renderer initialization.
///
/// # Fields
///
/// | Field               | Description                              | Default           |
/// |---------------------|------------------------------------------|-------------------|
/// | `frames_in_flight`  | Frame slots recorded ahead of the GPU    | `3`               |
/// | `vsync`             | Vertical sync enabled                    | `true`            |
/// | `power_preference`  | GPU adapter selection strategy           | `HighPerformance` |
/// | `clear_color`       | Geometry pass clear color                | Black (0,0,0,1)   |
/// | `depth_format`      | Depth attachment format                  | `Depth32Float`    |
/// | `occlusion_culling` | Enable the late HZB occlusion culler     | `true`            |
/// | `shadow_map_size`   | Shadow depth map resolution              | `2048`            |
/// | `bindless`          | Bindless table sizing                    | see type          |
/// | `batch`             | Indirect batch capacities (per pass)     | see type          |
#[derive(Debug, Clone)]
pub struct RendererSettings {
    // === Frame Pacing ===
    /// Number of frames whose GPU work may be unfinished while the CPU
    /// records ahead. Must be at least 1.
    pub frames_in_flight: usize,

    /// Enable vertical synchronization (VSync).
    pub vsync: bool,

    // === GPU / Backend Configuration ===
    /// GPU adapter selection preference.
    pub power_preference: wgpu::PowerPreference,

    // === Rendering Defaults ===
    /// Clear color of the geometry pass color attachment.
    pub clear_color: wgpu::Color,

    /// Depth attachment format. The HZB builder reads it as a float depth
    /// texture, so it must be a depth format without stencil.
    pub depth_format: wgpu::TextureFormat,

    /// Enable the late occlusion culler. When disabled the geometry pass
    /// draws with CPU frustum visibility only.
    pub occlusion_culling: bool,

    /// Shadow depth map edge length in texels.
    pub shadow_map_size: u32,

    // === Fixed Capacities ===
    pub bindless: BindlessSettings,
    pub batch: BatchSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            vsync: true,
            power_preference: wgpu::PowerPreference::HighPerformance,
            clear_color: wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                a: 1.0,
            },
            depth_format: wgpu::TextureFormat::Depth32Float,
            occlusion_culling: true,
            shadow_map_size: 2048,
            bindless: BindlessSettings::default(),
            batch: BatchSettings::default(),
        }
    }
}

impl RendererSettings {
    /// Device features the renderer cannot run without.
    #[inline]
    #[must_use]
    pub fn required_features(&self) -> wgpu::Features {
        wgpu::Features::TEXTURE_BINDING_ARRAY
            | wgpu::Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING
            | wgpu::Features::INDIRECT_FIRST_INSTANCE
    }

    /// Device limits derived from the configured capacities.
    #[must_use]
    pub fn required_limits(&self, adapter_limits: &wgpu::Limits) -> wgpu::Limits {
        wgpu::Limits {
            max_binding_array_elements_per_shader_stage: self.bindless.max_slots,
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            ..wgpu::Limits::default()
        }
    }

    /// Frame slot count clamped to the valid range.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames_in_flight.max(1)
    }
}
