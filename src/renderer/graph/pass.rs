//! Render Pass Trait
//!
//! The abstract interface every pass registered with the
//! [`RenderPassPipeline`](super::pipeline::RenderPassPipeline) implements.
//!
//! # Lifecycle
//!
//! ```text
//! init ─► init_late ─► update (per frame) ─► resize ─► resize_late ─► ... ─► shutdown
//! ```
//!
//! - `init` allocates pass-local resources sized to the current viewport. It
//!   must not touch other passes.
//! - `init_late` runs after every pass finished `init` and may look up other
//!   passes through [`PassLookup`](super::pipeline::PassLookup).
//! - `update` records this frame's GPU work.
//! - `resize` / `resize_late` mirror `init` / `init_late` at new dimensions.
//! - `shutdown` releases resources. It is called at most once and must cope
//!   with a pass whose last `resize` failed.
//!
//! # Backends
//!
//! The hook contexts are supplied by a [`PassBackend`]: the renderer uses
//! [`GpuBackend`](super::context::GpuBackend), tests plug in plain structs.

use std::any::{Any, TypeId};

use super::pipeline::PassLookup;
use crate::errors::Result;

/// Family of context types handed to pass hooks.
pub trait PassBackend: 'static {
    /// Context for `init`, `init_late`, `resize` and `resize_late`.
    type Init<'a>;
    /// Context for the per-frame `update`.
    type Frame<'a>;

    /// Opens a named debug region around one pass's `update`.
    fn push_debug_group(_frame: &mut Self::Frame<'_>, _label: &str) {}

    fn pop_debug_group(_frame: &mut Self::Frame<'_>) {}
}

/// Lifecycle position of a registered pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Registered but without live resources (last resize failed).
    Registered,
    /// `init` or `resize` completed.
    Initialized,
    /// `init_late` or `resize_late` completed; outputs may be read.
    Ready,
    ShutDown,
}

/// A declared "must be registered before me" edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassDependency {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl PassDependency {
    #[must_use]
    pub fn on<P: Any>() -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: std::any::type_name::<P>(),
        }
    }
}

/// Exposes a pass's attachments to later passes.
pub trait PassOutput {
    type Output;

    /// `None` until the pass has allocated its attachments.
    fn output(&self) -> Option<&Self::Output>;
}

/// A unit of GPU work driven by the pipeline.
pub trait RenderPass<B: PassBackend>: Any {
    /// Stable unique name, used for lookup and debug groups.
    fn name(&self) -> &'static str;

    /// Passes that must be registered before this one. Checked by
    /// `init_late_all`; registration order stays the execution order.
    fn dependencies(&self) -> Vec<PassDependency> {
        Vec::new()
    }

    fn init(&mut self, ctx: &mut B::Init<'_>) -> Result<()>;

    fn init_late(&mut self, _ctx: &mut B::Init<'_>, _passes: &PassLookup<'_, B>) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, ctx: &mut B::Frame<'_>, passes: &PassLookup<'_, B>) -> Result<()>;

    fn resize(&mut self, _ctx: &mut B::Init<'_>, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    fn resize_late(&mut self, _ctx: &mut B::Init<'_>, _passes: &PassLookup<'_, B>) -> Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) {}
}
