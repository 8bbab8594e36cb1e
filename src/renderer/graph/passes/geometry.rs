//! Geometry Pass
//!
//! The main scene pass. Per frame it:
//!
//! 1. uploads the scene uniforms (shadow-casting light, camera, time)
//! 2. builds and uploads the indirect batch for the camera
//! 3. runs the late occlusion culler against last frame's HZB
//! 4. draws every mesh group with one multi-draw into the HDR color,
//!    velocity and depth attachments
//!
//! The depth attachment feeds [`HzbBuildPass`](super::HzbBuildPass); the color
//! attachment feeds [`CompositePass`](super::CompositePass). All three
//! attachments follow the viewport and are recreated on resize.

use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use super::hzb::HzbBuildPass;
use super::shadow::{ShadowDepthPass, ShadowOutput};
use crate::errors::Result;
use crate::renderer::core::resources::{CachedBindGroup, FrameBufferAllocator, Tracked, Vertex};
use crate::renderer::graph::batch::{BatchStats, IndirectBatcher};
use crate::renderer::graph::context::{FrameContext, GpuBackend, InitContext};
use crate::renderer::graph::cull::{CullSkip, LateOcclusionCuller};
use crate::renderer::graph::pass::{PassDependency, PassOutput, RenderPass};
use crate::renderer::graph::pipeline::PassLookup;
use crate::scene::FrameData;

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const VELOCITY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

const AMBIENT: f32 = 0.03;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SceneUniforms {
    light_view_projection: Mat4,
    light_direction: Vec4,
    light_color: Vec4,
    camera_position: Vec4,
    shadow_params: Vec4,
}

impl SceneUniforms {
    fn new(frame: &FrameData, shadow: Option<&ShadowOutput>) -> Self {
        let light = frame.lights.shadow_caster().or_else(|| frame.lights.directional.first());
        let shadows_on = shadow.is_some_and(|s| s.active);
        let (direction, color) = light.map_or((Vec4::new(0.0, -1.0, 0.0, 0.0), Vec4::ZERO), |light| {
            (light.direction.extend(0.0), (light.color * light.intensity).extend(0.0))
        });

        Self {
            light_view_projection: shadow.map_or(Mat4::IDENTITY, |s| s.light_view_projection),
            light_direction: direction.with_w(if shadows_on { 1.0 } else { 0.0 }),
            light_color: color.with_w(AMBIENT),
            camera_position: frame.camera.position.extend(frame.time),
            shadow_params: Vec4::new(
                shadow.map_or(0.0, |s| s.bias),
                shadow.map_or(0.0, |s| s.normal_bias),
                0.0,
                0.0,
            ),
        }
    }
}

/// Viewport-sized attachments written by the geometry pass.
pub struct GeometryOutput {
    pub color: Tracked<wgpu::TextureView>,
    pub velocity: Tracked<wgpu::TextureView>,
    pub depth: Tracked<wgpu::TextureView>,
    pub width: u32,
    pub height: u32,
}

struct ScenePipeline {
    pipeline: wgpu::RenderPipeline,
    scene_layout: wgpu::BindGroupLayout,
    shadow_sampler: wgpu::Sampler,
}

#[derive(Default)]
pub struct GeometryPass {
    batcher: Option<IndirectBatcher>,
    culler: Option<LateOcclusionCuller>,
    pipeline: Option<ScenePipeline>,
    uniforms: Option<FrameBufferAllocator<SceneUniforms>>,
    scene_groups: Vec<CachedBindGroup>,
    output: Option<GeometryOutput>,
    draw_calls: u32,
}

impl GeometryPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> Option<BatchStats> {
        self.batcher.as_ref().map(IndirectBatcher::stats)
    }

    /// Multi-draw calls issued last frame.
    #[must_use]
    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }

    #[must_use]
    pub fn occlusion_skip(&self) -> Option<CullSkip> {
        self.culler.as_ref().and_then(LateOcclusionCuller::last_skip)
    }

    pub fn set_occlusion_culling(&mut self, enabled: bool) {
        if let Some(culler) = self.culler.as_mut() {
            culler.set_enabled(enabled);
        }
    }

    fn create_attachment(
        device: &wgpu::Device,
        label: &str,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Tracked<wgpu::TextureView> {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        Tracked::new(texture.create_view(&wgpu::TextureViewDescriptor::default()))
    }

    fn create_output(ctx: &InitContext<'_>, width: u32, height: u32) -> GeometryOutput {
        let (width, height) = (width.max(1), height.max(1));
        GeometryOutput {
            color: Self::create_attachment(ctx.device, "Scene Color", COLOR_FORMAT, width, height),
            velocity: Self::create_attachment(ctx.device, "Scene Velocity", VELOCITY_FORMAT, width, height),
            depth: Self::create_attachment(ctx.device, "Scene Depth", ctx.settings.depth_format, width, height),
            width,
            height,
        }
    }

    fn create_pipeline(ctx: &InitContext<'_>, batcher: &IndirectBatcher) -> ScenePipeline {
        let device = ctx.device;
        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Uniforms Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Comparison Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Geometry Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("../shaders/geometry.wgsl"))),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Geometry Pipeline Layout"),
            bind_group_layouts: &[batcher.layout(), ctx.bindless.layout(), &scene_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Geometry Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[
                    Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                    Some(wgpu::ColorTargetState {
                        format: VELOCITY_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                ],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: ctx.settings.depth_format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        ScenePipeline {
            pipeline,
            scene_layout,
            shadow_sampler,
        }
    }
}

impl PassOutput for GeometryPass {
    type Output = GeometryOutput;

    fn output(&self) -> Option<&GeometryOutput> {
        self.output.as_ref()
    }
}

impl RenderPass<GpuBackend> for GeometryPass {
    fn name(&self) -> &'static str {
        "Geometry"
    }

    fn dependencies(&self) -> Vec<PassDependency> {
        vec![PassDependency::on::<ShadowDepthPass>()]
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        let frames = ctx.frames_in_flight();
        let batcher = IndirectBatcher::new(ctx.device, "Geometry", ctx.settings.batch, frames);
        self.pipeline = Some(Self::create_pipeline(ctx, &batcher));
        self.culler = Some(LateOcclusionCuller::new(
            ctx.device,
            ctx.settings.batch.max_commands,
            frames,
            ctx.settings.occlusion_culling,
        ));
        self.batcher = Some(batcher);
        self.uniforms = Some(FrameBufferAllocator::new(
            ctx.device,
            "Scene Uniforms",
            1,
            frames,
            wgpu::BufferUsages::UNIFORM,
        ));
        self.scene_groups = (0..frames).map(|_| CachedBindGroup::default()).collect();
        self.output = Some(Self::create_output(ctx, ctx.width, ctx.height));
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>, passes: &PassLookup<'_, GpuBackend>) -> Result<()> {
        let (Some(batcher), Some(culler), Some(scene), Some(uniforms), Some(output)) = (
            self.batcher.as_mut(),
            self.culler.as_mut(),
            self.pipeline.as_ref(),
            self.uniforms.as_mut(),
            self.output.as_ref(),
        ) else {
            return Ok(());
        };

        let frame = ctx.frame;
        let slot = ctx.slot();
        let shadow = passes.output::<ShadowDepthPass>();

        uniforms.fill(&[SceneUniforms::new(frame, shadow)]);
        uniforms.upload(ctx.queue, slot);

        let Some(shadow) = shadow else {
            log::warn!("Geometry: shadow map unavailable, frame skipped");
            return Ok(());
        };
        let (Some(uniform_buffer), Some(cache)) = (uniforms.buffer(slot), self.scene_groups.get_mut(slot)) else {
            return Ok(());
        };
        let device = ctx.device;
        let scene_group = cache.get_or_build(&[shadow.map.id()], || {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Scene Uniforms BindGroup"),
                layout: &scene.scene_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&shadow.map),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&scene.shadow_sampler),
                    },
                ],
            })
        });

        let view_projection = frame.camera.view_projection();
        batcher.prepare(
            ctx.queue,
            slot,
            &frame.draw_requests,
            ctx.meshes,
            view_projection,
            &frame.bone_palette,
        );

        let hzb = passes.output::<HzbBuildPass>();
        let culled = culler.cull(ctx.device, ctx.queue, ctx.encoder, batcher, hzb, view_projection, slot);

        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Geometry Pass"),
            color_attachments: &[
                Some(wgpu::RenderPassColorAttachment {
                    view: &output.color,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(ctx.settings.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                }),
                Some(wgpu::RenderPassColorAttachment {
                    view: &output.velocity,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                }),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &output.depth,
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

        pass.set_pipeline(&scene.pipeline);
        batcher.bind(&mut pass, 0, slot);
        ctx.bindless.bind_render(&mut pass, 1, slot);
        pass.set_bind_group(2, scene_group, &[]);
        self.draw_calls = batcher.draw(&mut pass, ctx.meshes, &culled);
        Ok(())
    }

    fn resize(&mut self, ctx: &mut InitContext<'_>, width: u32, height: u32) -> Result<()> {
        self.output = Some(Self::create_output(ctx, width, height));
        // Last frame's MVPs were built with the old aspect ratio.
        if let Some(batcher) = self.batcher.as_mut() {
            batcher.reset_history();
        }
        log::debug!("Geometry attachments recreated at {width}x{height}");
        Ok(())
    }

    fn shutdown(&mut self) {
        self.output = None;
        self.scene_groups.clear();
        self.uniforms = None;
        self.culler = None;
        self.pipeline = None;
        self.batcher = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{CameraSnapshot, DirectionalLight, ShadowConfig};
    use glam::Vec3;

    #[test]
    fn scene_uniforms_match_shader_layout() {
        assert_eq!(std::mem::size_of::<SceneUniforms>(), 128);
    }

    #[test]
    fn uniforms_without_shadow_disable_sampling() {
        let mut frame = FrameData::new(CameraSnapshot::perspective(
            Vec3::new(0.0, 2.0, 5.0),
            Vec3::ZERO,
            60.0,
            (800, 600),
            0.1,
            100.0,
        ));
        frame.lights.directional.push(DirectionalLight {
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 2.0,
            shadow: Some(ShadowConfig::default()),
        });
        let uniforms = SceneUniforms::new(&frame, None);
        assert_eq!(uniforms.light_direction.w, 0.0);
        assert_eq!(uniforms.light_color.x, 2.0);
        assert_eq!(uniforms.light_color.w, AMBIENT);
    }
}
