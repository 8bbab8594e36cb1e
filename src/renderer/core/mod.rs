//! Renderer core: everything a frame needs before any pass runs.
//!
//! - context.rs: WgpuContext, device/queue/surface plus device-loss tracking
//! - frame_ring.rs: frames in flight, per-slot fences and transient arenas
//! - bindless/: shared texture residency table and its descriptor array
//! - resources/: meshes, per-frame buffers and tracked attachments

pub mod bindless;
pub mod context;
pub mod frame_ring;
pub mod resources;

pub use bindless::{BindlessTexture, BindlessTextures, DEFAULT_SLOT, SlotState, SlotTable};
pub use context::{WgpuContext, wait_device_idle};
pub use frame_ring::{FrameFence, FrameIndex, FrameRing, FrameSlot, TransientArena, TransientBindGroups};
