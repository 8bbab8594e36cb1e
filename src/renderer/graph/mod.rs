//! Render pass orchestration.
//!
//! Provides:
//! - RenderPass / PassBackend: the pass lifecycle contract
//! - RenderPassPipeline: registration, phased init and per-frame execution
//! - GpuBackend with InitContext / FrameContext: what hooks receive
//! - IndirectBatcher: per-pass GPU-driven draw submission
//! - LateOcclusionCuller / HzbBuilder: visibility refinement on the GPU
//! - passes: the built-in shadow, geometry, HZB and composite passes

pub mod batch;
pub mod context;
pub mod cull;
pub mod pass;
pub mod passes;
pub mod pipeline;

pub use batch::{BatchStats, CulledCommands, IndirectBatcher};
pub use context::{FrameContext, GpuBackend, InitContext};
pub use cull::{CullSkip, HzbBuilder, HzbPyramid, LateOcclusionCuller};
pub use pass::{PassBackend, PassDependency, PassOutput, PassState, RenderPass};
pub use pipeline::{PassEntry, PassLookup, RenderPassPipeline};
