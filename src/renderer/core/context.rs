//! wgpu Context
//!
//! The [`WgpuContext`] holds core GPU handles: device, queue, surface, and config.
//! It is responsible for surface management, resize handling, and surfacing
//! fatal device conditions to the frame driver.

use std::sync::Arc;

use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::errors::{Result, TesseraError};
use crate::renderer::settings::RendererSettings;

/// Core wgpu context holding GPU handles.
///
/// This struct owns the fundamental wgpu resources needed for rendering:
/// - `device`: GPU device for resource creation
/// - `queue`: Command submission queue
/// - `surface`: Window surface for presentation
/// - `config`: Surface configuration (format, present mode, etc.)
pub struct WgpuContext {
    /// The wgpu device for GPU operations
    pub device: wgpu::Device,
    /// The command queue for submitting work
    pub queue: wgpu::Queue,
    /// The window surface for presentation
    pub surface: wgpu::Surface<'static>,
    /// Surface configuration
    pub config: wgpu::SurfaceConfiguration,
    /// Reason reported by the device-lost callback, if it fired
    device_lost: Arc<Mutex<Option<String>>>,
}

impl WgpuContext {
    pub async fn new<W>(
        window: W,
        settings: &RendererSettings,
        width: u32,
        height: u32,
    ) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| TesseraError::AdapterRequestFailed(e.to_string()))?;

        let required_features = settings.required_features();
        let missing = required_features - adapter.features();
        if !missing.is_empty() {
            return Err(TesseraError::MissingFeatures(missing));
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Tessera Device"),
                required_features,
                required_limits: settings.required_limits(&adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        let device_lost = Arc::new(Mutex::new(None));
        let lost_flag = Arc::clone(&device_lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("GPU device lost ({reason:?}): {message}");
            *lost_flag.lock() = Some(format!("{reason:?}: {message}"));
        });

        let mut config = surface
            .get_default_config(&adapter, width.max(1), height.max(1))
            .ok_or_else(|| {
                TesseraError::AdapterRequestFailed("Surface not supported by adapter".to_string())
            })?;

        config.present_mode = if settings.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        config.desired_maximum_frame_latency = settings.frame_count() as u32;
        surface.configure(&device, &config);

        let info = adapter.get_info();
        log::info!(
            "GPU context ready: {} ({:?}), surface {}x{} {:?}",
            info.name,
            info.backend,
            config.width,
            config.height,
            config.format
        );

        Ok(Self {
            device,
            queue,
            surface,
            config,
            device_lost,
        })
    }

    /// Reconfigures the surface. Zero-sized requests are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        true
    }

    /// Reconfigures the surface with its current configuration (after `Lost`/`Outdated`).
    pub fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Blocks until all submitted GPU work has completed.
    pub fn wait_idle(&self) -> Result<()> {
        wait_device_idle(&self.device)
    }

    /// Fails if the device-lost callback has fired.
    pub fn check_device(&self) -> Result<()> {
        match self.device_lost.lock().as_ref() {
            Some(reason) => Err(TesseraError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    /// Returns the surface color format.
    #[inline]
    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Returns the current surface dimensions.
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

/// Full device wait used by load-time mutations (bindless writes, shutdown).
pub fn wait_device_idle(device: &wgpu::Device) -> Result<()> {
    device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    })?;
    Ok(())
}
