//! Instanced Field
//!
//! A grid of spinning cubes sharing one mesh, so the whole field is a single
//! mesh group and one multi-draw per pass. The cubes sample a checker texture
//! through the bindless table and receive a directional shadow.
//!
//! Controls: `O` toggles occlusion culling, `Escape` quits.

use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Quat, Vec3};
use tessera::renderer::settings::RendererSettings;
use tessera::{
    CameraSnapshot, DirectionalLight, DrawRequest, FrameData, FrameOutcome, MaterialData, MeshData, MeshId,
    Renderer, ShadowConfig,
};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

const GRID: i32 = 48;
const SPACING: f32 = 2.5;
const CHECKER_SIZE: u32 = 64;

fn checker_pixels(size: u32, cell: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let on = ((x / cell) + (y / cell)) % 2 == 0;
            let value = if on { 230 } else { 40 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    pixels
}

struct Scene {
    cube: MeshId,
    instances: Vec<(Vec3, Vec3)>,
}

impl Scene {
    fn new(renderer: &mut Renderer) -> anyhow::Result<Self> {
        let texture = renderer.create_texture(
            "Checker",
            CHECKER_SIZE,
            CHECKER_SIZE,
            &checker_pixels(CHECKER_SIZE, 8),
        );
        let slot = renderer.register_texture(&texture)?;
        log::info!("Checker texture resident at bindless slot {slot}");

        let cube = renderer.upload_mesh(&MeshData::cube(MaterialData {
            base_color: [0.9, 0.75, 0.55, 1.0],
            albedo_slot: slot,
            roughness: 0.6,
            ..Default::default()
        }));

        let half = GRID as f32 * SPACING * 0.5;
        let instances = (0..GRID)
            .flat_map(|x| (0..GRID).map(move |z| (x, z)))
            .map(|(x, z)| {
                let position = Vec3::new(x as f32 * SPACING - half, 0.5, z as f32 * SPACING - half);
                let axis = Vec3::new((x % 3) as f32, 1.0, (z % 5) as f32).normalize();
                (position, axis)
            })
            .collect();

        Ok(Self { cube, instances })
    }

    fn frame(&self, time: f32, viewport: (u32, u32)) -> FrameData {
        let orbit = time * 0.1;
        let eye = Vec3::new(orbit.cos() * 60.0, 30.0, orbit.sin() * 60.0);
        let mut frame = FrameData::new(CameraSnapshot::perspective(eye, Vec3::ZERO, 50.0, viewport, 0.1, 400.0));

        frame.time = time;
        frame.draw_requests = self
            .instances
            .iter()
            .enumerate()
            .map(|(i, &(position, axis))| {
                let rotation = Quat::from_axis_angle(axis, time + i as f32 * 0.05);
                DrawRequest::new(
                    self.cube,
                    Mat4::from_rotation_translation(rotation, position),
                    i as u32,
                )
            })
            .collect();
        frame.lights.directional.push(DirectionalLight {
            direction: Vec3::new(-0.4, -1.0, -0.3),
            color: Vec3::ONE,
            intensity: 3.0,
            shadow: Some(ShadowConfig {
                extent: 80.0,
                ..Default::default()
            }),
        });
        frame
    }
}

struct InstancedField {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    scene: Option<Scene>,
    start_time: Instant,
    occlusion: bool,
}

impl InstancedField {
    fn new() -> Self {
        Self {
            window: None,
            renderer: None,
            scene: None,
            start_time: Instant::now(),
            occlusion: true,
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(renderer), Some(scene)) = (&self.window, &mut self.renderer, &self.scene) else {
            return;
        };

        let frame = scene.frame(self.start_time.elapsed().as_secs_f32(), renderer.size());
        match renderer.render_frame(&frame) {
            Ok(FrameOutcome::Presented(index)) => {
                if index.number % 300 == 0
                    && let Some(stats) = renderer.batch_stats()
                {
                    log::info!(
                        "Frame {}: {} groups, {} commands, {} records, {} CPU culled",
                        index.number,
                        stats.groups,
                        stats.commands,
                        stats.instance_records,
                        stats.cpu_culled
                    );
                }
            }
            Ok(FrameOutcome::Skipped) => {}
            Err(e) => {
                log::error!("Fatal render error: {e}");
                event_loop.exit();
                return;
            }
        }
        window.request_redraw();
    }
}

impl ApplicationHandler for InstancedField {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("Tessera - Instanced Field")
            .with_inner_size(winit::dpi::LogicalSize::new(1280.0, 720.0));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        log::info!("Initializing Renderer Backend...");
        let size = window.inner_size();
        let settings = RendererSettings::default();
        let mut renderer = match pollster::block_on(Renderer::new(window.clone(), settings, size.width, size.height)) {
            Ok(renderer) => renderer,
            Err(e) => {
                log::error!("Fatal Renderer Error: {e}");
                event_loop.exit();
                return;
            }
        };

        match Scene::new(&mut renderer) {
            Ok(scene) => self.scene = Some(scene),
            Err(e) => {
                log::error!("Scene setup failed: {e}");
                event_loop.exit();
                return;
            }
        }

        window.request_redraw();
        self.window = Some(window);
        self.renderer = Some(renderer);
        self.start_time = Instant::now();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if let Some(renderer) = self.renderer.as_mut()
                    && let Err(e) = renderer.shutdown()
                {
                    log::error!("Shutdown failed: {e}");
                }
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::KeyO),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.occlusion = !self.occlusion;
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.set_occlusion_culling(self.occlusion);
                }
                log::info!("Occlusion culling {}", if self.occlusion { "on" } else { "off" });
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut()
                    && let Err(e) = renderer.resize(size.width, size.height)
                {
                    log::error!("Resize failed: {e}");
                    event_loop.exit();
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = InstancedField::new();
    event_loop.run_app(&mut app)?;
    Ok(())
}
