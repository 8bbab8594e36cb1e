//! Rendering System
//!
//! The [`Renderer`] drives one frame at a time through a fixed sequence:
//!
//! 1. **Pace**: wait for the frame slot `N mod F` to retire frame `N - F`
//! 2. **Acquire**: get the swapchain image (skip the frame when it is outdated)
//! 3. **Record**: run every ready pass's `update` into a single encoder
//! 4. **Submit**: submit once, remember the submission as the slot's fence,
//!    then present
//!
//! # Module Organization
//!
//! - [`core`]: GPU context, frame ring, bindless table and shared resources
//! - [`graph`]: pass lifecycle, indirect batching, culling and built-in passes
//! - [`settings`]: creation-time configuration

pub mod core;
pub mod graph;
pub mod settings;

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use self::core::bindless::{BindlessTexture, BindlessTextures};
use self::core::frame_ring::{FrameIndex, FrameRing};
use self::core::resources::{MeshData, MeshId, MeshRegistry};
use self::core::WgpuContext;
use self::graph::batch::BatchStats;
use self::graph::context::{FrameContext, GpuBackend, InitContext};
use self::graph::pass::RenderPass;
use self::graph::passes::{CompositePass, GeometryPass, HzbBuildPass, ShadowDepthPass};
use self::graph::pipeline::RenderPassPipeline;
use self::settings::RendererSettings;
use crate::errors::{Result, TesseraError};
use crate::scene::FrameData;

/// What happened to a frame handed to [`Renderer::render_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Recorded, submitted and presented.
    Presented(FrameIndex),
    /// Nothing was submitted; the frame number did not advance.
    Skipped,
}

/// Owns the GPU context and every subsystem a frame touches.
pub struct Renderer {
    settings: RendererSettings,
    context: WgpuContext,
    ring: FrameRing<wgpu::SubmissionIndex>,
    passes: RenderPassPipeline<GpuBackend>,
    bindless: BindlessTextures,
    meshes: MeshRegistry,
    /// Size every pass last finished resizing to. `None` after a failed
    /// resize so the next request at any size retries.
    pass_size: Option<(u32, u32)>,
    shut_down: bool,
}

impl Renderer {
    /// Creates the device and surface, then registers the built-in passes
    /// in execution order: shadow, geometry, HZB build, composite.
    pub async fn new<W>(window: W, settings: RendererSettings, width: u32, height: u32) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let context = WgpuContext::new(window, &settings, width, height).await?;
        let frames = settings.frame_count();
        let bindless = BindlessTextures::new(&context.device, &context.queue, &settings.bindless, frames);

        let mut passes = RenderPassPipeline::new();
        {
            let (width, height) = context.size();
            let mut ctx = InitContext {
                device: &context.device,
                queue: &context.queue,
                settings: &settings,
                bindless: &bindless,
                surface_format: context.color_format(),
                width,
                height,
            };
            passes.add_pass(ShadowDepthPass::new(), &mut ctx)?;
            passes.add_pass(GeometryPass::new(), &mut ctx)?;
            passes.add_pass(HzbBuildPass::new(), &mut ctx)?;
            passes.add_pass(CompositePass::new(), &mut ctx)?;
            passes.init_late_all(&mut ctx)?;
        }

        log::info!(
            "Renderer ready: {frames} frames in flight, passes [{}]",
            passes.names().collect::<Vec<_>>().join(", ")
        );

        let pass_size = Some(context.size());
        Ok(Self {
            settings,
            context,
            ring: FrameRing::new(frames),
            passes,
            bindless,
            meshes: MeshRegistry::new(),
            pass_size,
            shut_down: false,
        })
    }

    /// Renders and presents one frame.
    ///
    /// Surface conditions that resolve themselves (lost, outdated, timeout)
    /// skip the frame. A lost device or exhausted GPU memory is returned as
    /// an error; the renderer should then be dropped.
    pub fn render_frame(&mut self, frame: &FrameData) -> Result<FrameOutcome> {
        if self.shut_down {
            log::warn!("render_frame called after shutdown");
            return Ok(FrameOutcome::Skipped);
        }
        self.context.check_device()?;

        let index = self.ring.begin_frame(&self.context.device)?;

        let output = match self.context.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                self.context.reconfigure();
                self.ring.abandon_frame();
                return Ok(FrameOutcome::Skipped);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::debug!("Surface acquire timed out, frame {} skipped", index.number);
                self.ring.abandon_frame();
                return Ok(FrameOutcome::Skipped);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                self.ring.abandon_frame();
                return Err(TesseraError::OutOfMemory("surface acquire".to_string()));
            }
            Err(e) => {
                log::warn!("Surface acquire failed: {e}");
                self.ring.abandon_frame();
                return Ok(FrameOutcome::Skipped);
            }
        };
        let surface_view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let Self {
            settings,
            context,
            ring,
            passes,
            bindless,
            meshes,
            ..
        } = self;

        let mut encoder = context.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        let recorded = {
            let mut ctx = FrameContext {
                device: &context.device,
                queue: &context.queue,
                encoder: &mut encoder,
                frame,
                index,
                transient: &mut ring.current_slot_mut().transient,
                bindless,
                meshes,
                surface_view: &surface_view,
                settings,
            };
            passes.update_all(&mut ctx)
        };
        if let Err(e) = recorded {
            ring.abandon_frame();
            return Err(e);
        }

        let submission = context.queue.submit(Some(encoder.finish()));
        ring.end_frame(submission);
        output.present();

        Ok(FrameOutcome::Presented(index))
    }

    /// Resizes the surface and every pass's size-dependent attachments.
    ///
    /// Waits for all frames in flight first. Zero-sized requests (minimized
    /// windows) are ignored. A pass that fails to resize is parked and the
    /// error returned; calling again, even at the same size, retries.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 || self.shut_down {
            return Ok(());
        }
        if self.pass_size == Some((width, height)) {
            return Ok(());
        }

        self.ring.wait_all(&self.context.device)?;
        if self.context.size() != (width, height) {
            self.context.resize(width, height);
        }
        self.pass_size = None;

        let mut ctx = InitContext {
            device: &self.context.device,
            queue: &self.context.queue,
            settings: &self.settings,
            bindless: &self.bindless,
            surface_format: self.context.color_format(),
            width,
            height,
        };
        let resized = self.passes.resize_all(&mut ctx, width, height);
        let wired = self.passes.resize_late_all(&mut ctx);
        resized.and(wired)?;

        self.pass_size = Some((width, height));
        log::info!("Resized to {width}x{height}");
        Ok(())
    }

    /// Waits for the GPU and shuts every pass down. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        let waited = self.ring.wait_all(&self.context.device);
        self.passes.shutdown_all();
        waited?;
        self.context.wait_idle()?;
        log::info!("Renderer shut down after {} frames", self.ring.frame_number());
        Ok(())
    }

    /// Registers an additional pass after the built-in ones.
    pub fn add_pass<P: RenderPass<GpuBackend>>(&mut self, pass: P) -> Result<usize> {
        let (width, height) = self.context.size();
        let mut ctx = InitContext {
            device: &self.context.device,
            queue: &self.context.queue,
            settings: &self.settings,
            bindless: &self.bindless,
            surface_format: self.context.color_format(),
            width,
            height,
        };
        let index = self.passes.add_pass(pass, &mut ctx)?;
        self.passes.init_late_all(&mut ctx)?;
        Ok(index)
    }

    // === Meshes ===

    pub fn upload_mesh(&mut self, data: &MeshData) -> MeshId {
        self.meshes.upload(&self.context.device, data)
    }

    pub fn remove_mesh(&mut self, id: MeshId) -> bool {
        self.meshes.remove(id).is_some()
    }

    // === Bindless Textures ===

    /// Uploads RGBA8 pixels into a texture suitable for bindless registration.
    pub fn create_texture(&self, label: &str, width: u32, height: u32, pixels: &[u8]) -> Arc<BindlessTexture> {
        Arc::new(BindlessTexture::from_rgba8(
            &self.context.device,
            &self.context.queue,
            label,
            width,
            height,
            pixels,
        ))
    }

    /// Makes `texture` resident and returns its slot. Blocks on device idle.
    pub fn register_texture(&mut self, texture: &Arc<BindlessTexture>) -> Result<u32> {
        self.bindless.allocate(&self.context.device, texture)
    }

    /// Makes `texture` resident at a caller-chosen slot.
    pub fn register_texture_at(&mut self, texture: &Arc<BindlessTexture>, slot: u32) -> Result<()> {
        self.bindless.allocate_at(&self.context.device, texture, slot)
    }

    pub fn release_texture(&mut self, slot: u32) -> Result<()> {
        self.bindless.release(&self.context.device, slot)
    }

    // === Accessors ===

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[must_use]
    pub fn context(&self) -> &WgpuContext {
        &self.context
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.context.size()
    }

    /// Number of frames submitted so far.
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.ring.frame_number()
    }

    #[must_use]
    pub fn passes(&self) -> &RenderPassPipeline<GpuBackend> {
        &self.passes
    }

    pub fn passes_mut(&mut self) -> &mut RenderPassPipeline<GpuBackend> {
        &mut self.passes
    }

    #[must_use]
    pub fn bindless(&self) -> &BindlessTextures {
        &self.bindless
    }

    #[must_use]
    pub fn meshes(&self) -> &MeshRegistry {
        &self.meshes
    }

    /// Batch statistics of the geometry pass's last frame.
    #[must_use]
    pub fn batch_stats(&self) -> Option<BatchStats> {
        self.passes.get_pass::<GeometryPass>()?.stats()
    }

    pub fn set_occlusion_culling(&mut self, enabled: bool) {
        self.settings.occlusion_culling = enabled;
        if let Some(geometry) = self.passes.get_pass_mut::<GeometryPass>() {
            geometry.set_occlusion_culling(enabled);
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Renderer shutdown failed: {e}");
        }
    }
}
