//! Shadow Depth Pass
//!
//! Renders the scene's depth from the first shadow-casting directional light.
//! Owns its own indirect batcher, built every frame with the light's
//! view-projection, so the CPU frustum flags match the light volume. The
//! shadow map is viewport independent; resize leaves it alone.
//!
//! When no light casts shadows the map is still cleared, so consumers can
//! always bind it.

use std::borrow::Cow;

use glam::{Mat4, Vec3};

use crate::errors::Result;
use crate::renderer::core::resources::{Tracked, Vertex};
use crate::renderer::graph::batch::{BatchStats, IndirectBatcher};
use crate::renderer::graph::context::{FrameContext, GpuBackend, InitContext};
use crate::renderer::graph::pass::{PassOutput, RenderPass};
use crate::renderer::graph::pipeline::PassLookup;
use crate::scene::{CameraSnapshot, DirectionalLight};

pub const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Shadow map plus the transform that produced it this frame.
pub struct ShadowOutput {
    pub map: Tracked<wgpu::TextureView>,
    pub size: u32,
    pub light_view_projection: Mat4,
    /// `false` when no light casts shadows this frame.
    pub active: bool,
    pub bias: f32,
    pub normal_bias: f32,
}

#[derive(Default)]
pub struct ShadowDepthPass {
    batcher: Option<IndirectBatcher>,
    pipeline: Option<wgpu::RenderPipeline>,
    output: Option<ShadowOutput>,
}

impl ShadowDepthPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> Option<BatchStats> {
        self.batcher.as_ref().map(IndirectBatcher::stats)
    }

    /// Centers the light volume half its extent in front of the camera.
    fn light_view_projection(light: &DirectionalLight, camera: &CameraSnapshot) -> Option<Mat4> {
        let extent = light.shadow?.extent;
        let forward = -camera.view.inverse().z_axis.truncate();
        let focus = camera.position + forward.try_normalize().unwrap_or(Vec3::NEG_Z) * extent * 0.5;
        light.view_projection(focus)
    }

    fn create_pipeline(device: &wgpu::Device, batcher: &IndirectBatcher) -> wgpu::RenderPipeline {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shadow Depth Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("../shaders/shadow.wgsl"))),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shadow Depth Pipeline Layout"),
            bind_group_layouts: &[batcher.layout()],
            immediate_size: 0,
        });

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Depth Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SHADOW_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }
}

impl PassOutput for ShadowDepthPass {
    type Output = ShadowOutput;

    fn output(&self) -> Option<&ShadowOutput> {
        self.output.as_ref()
    }
}

impl RenderPass<GpuBackend> for ShadowDepthPass {
    fn name(&self) -> &'static str {
        "Shadow Depth"
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        let size = ctx.settings.shadow_map_size.max(1);
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shadow Map"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let batcher = IndirectBatcher::new(ctx.device, "Shadow", ctx.settings.batch, ctx.frames_in_flight());
        self.pipeline = Some(Self::create_pipeline(ctx.device, &batcher));
        self.batcher = Some(batcher);
        self.output = Some(ShadowOutput {
            map: Tracked::new(texture.create_view(&wgpu::TextureViewDescriptor::default())),
            size,
            light_view_projection: Mat4::IDENTITY,
            active: false,
            bias: 0.0,
            normal_bias: 0.0,
        });
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>, _passes: &PassLookup<'_, GpuBackend>) -> Result<()> {
        let (Some(batcher), Some(pipeline), Some(output)) =
            (self.batcher.as_mut(), self.pipeline.as_ref(), self.output.as_mut())
        else {
            return Ok(());
        };

        let frame = ctx.frame;
        let slot = ctx.slot();
        let caster = frame.lights.shadow_caster().and_then(|light| {
            Some((light, Self::light_view_projection(light, &frame.camera)?))
        });

        match caster {
            Some((light, view_projection)) => {
                let config = light.shadow.unwrap_or_default();
                output.light_view_projection = view_projection;
                output.active = true;
                output.bias = config.bias;
                output.normal_bias = config.normal_bias;
                batcher.prepare(
                    ctx.queue,
                    slot,
                    &frame.draw_requests,
                    ctx.meshes,
                    view_projection,
                    &frame.bone_palette,
                );
            }
            None => {
                output.active = false;
                batcher.prepare(ctx.queue, slot, &[], ctx.meshes, Mat4::IDENTITY, &[]);
            }
        }

        let culled = batcher.frustum_only(slot);
        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shadow Depth Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &output.map,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        pass.set_pipeline(pipeline);
        batcher.bind(&mut pass, 0, slot);
        batcher.draw(&mut pass, ctx.meshes, &culled);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.output = None;
        self.pipeline = None;
        self.batcher = None;
    }
}
