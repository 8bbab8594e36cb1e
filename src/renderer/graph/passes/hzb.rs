//! HZB Build Pass
//!
//! Reduces the geometry pass's depth into a max-depth pyramid. The pyramid is
//! read by next frame's late occlusion culler, so it is the only state that
//! crosses frames in the culling path.
//!
//! Resize recreates the pyramid at the new size and marks it invalid until the
//! next build; the culler skips the occlusion test for that frame.

use super::geometry::GeometryPass;
use crate::errors::{Result, TesseraError};
use crate::renderer::graph::context::{FrameContext, GpuBackend, InitContext};
use crate::renderer::graph::cull::{HzbBuilder, HzbPyramid};
use crate::renderer::graph::pass::{PassDependency, PassOutput, RenderPass};
use crate::renderer::graph::pipeline::PassLookup;

#[derive(Default)]
pub struct HzbBuildPass {
    builder: Option<HzbBuilder>,
    pyramid: Option<HzbPyramid>,
}

impl HzbBuildPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_depth_format(format: wgpu::TextureFormat) -> Result<()> {
        match format {
            wgpu::TextureFormat::Depth32Float | wgpu::TextureFormat::Depth16Unorm => Ok(()),
            other => Err(TesseraError::PassFailed {
                pass: "HZB Build".to_string(),
                stage: "init",
                reason: format!("depth format {other:?} cannot be sampled as float depth"),
            }),
        }
    }
}

impl PassOutput for HzbBuildPass {
    type Output = HzbPyramid;

    fn output(&self) -> Option<&HzbPyramid> {
        self.pyramid.as_ref()
    }
}

impl RenderPass<GpuBackend> for HzbBuildPass {
    fn name(&self) -> &'static str {
        "HZB Build"
    }

    fn dependencies(&self) -> Vec<PassDependency> {
        vec![PassDependency::on::<GeometryPass>()]
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        Self::check_depth_format(ctx.settings.depth_format)?;
        self.builder = Some(HzbBuilder::new(ctx.device));
        self.pyramid = Some(HzbPyramid::new(ctx.device, ctx.width.max(1), ctx.height.max(1)));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>, passes: &PassLookup<'_, GpuBackend>) -> Result<()> {
        let (Some(builder), Some(pyramid)) = (self.builder.as_mut(), self.pyramid.as_mut()) else {
            return Ok(());
        };
        let Some(geometry) = passes.output::<GeometryPass>() else {
            return Ok(());
        };
        if (geometry.width, geometry.height) != pyramid.size() {
            log::warn!(
                "HZB: depth is {}x{}, pyramid is {:?}; build skipped",
                geometry.width,
                geometry.height,
                pyramid.size()
            );
            return Ok(());
        }

        builder.build(ctx.device, ctx.encoder, &geometry.depth, pyramid);
        Ok(())
    }

    fn resize(&mut self, ctx: &mut InitContext<'_>, width: u32, height: u32) -> Result<()> {
        self.pyramid = Some(HzbPyramid::new(ctx.device, width.max(1), height.max(1)));
        if let Some(builder) = self.builder.as_mut() {
            builder.invalidate();
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.pyramid = None;
        self.builder = None;
    }
}
