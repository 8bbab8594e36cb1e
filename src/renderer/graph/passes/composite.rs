//! Composite Pass
//!
//! Tonemaps the geometry pass's HDR color onto the swapchain image. The bind
//! group is allocated from the frame slot's transient arena every frame, so a
//! resized color attachment never needs explicit invalidation here.

use std::borrow::Cow;

use super::geometry::GeometryPass;
use crate::errors::Result;
use crate::renderer::graph::context::{FrameContext, GpuBackend, InitContext};
use crate::renderer::graph::pass::{PassDependency, RenderPass};
use crate::renderer::graph::pipeline::PassLookup;

struct CompositePipeline {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

#[derive(Default)]
pub struct CompositePass {
    pipeline: Option<CompositePipeline>,
}

impl CompositePass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderPass<GpuBackend> for CompositePass {
    fn name(&self) -> &'static str {
        "Composite"
    }

    fn dependencies(&self) -> Vec<PassDependency> {
        vec![PassDependency::on::<GeometryPass>()]
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        let device = ctx.device;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Composite Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Composite Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Composite Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("../shaders/composite.wgsl"))),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite Pipeline Layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Composite Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.pipeline = Some(CompositePipeline {
            pipeline,
            layout,
            sampler,
        });
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>, passes: &PassLookup<'_, GpuBackend>) -> Result<()> {
        let Some(composite) = self.pipeline.as_ref() else {
            return Ok(());
        };
        let Some(geometry) = passes.output::<GeometryPass>() else {
            return Ok(());
        };

        let bind_group = ctx.transient.alloc(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite BindGroup"),
            layout: &composite.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&geometry.color),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&composite.sampler),
                },
            ],
        }));

        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: ctx.surface_view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        pass.set_pipeline(&composite.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.pipeline = None;
    }
}
