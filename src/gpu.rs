//! Core GPU context and window surface management.
//!
//! [`GpuContext`] holds the wgpu device and queue every pass is built from.
//! [`WindowSurface`] wraps the surface the present pass draws into; it is kept
//! separate so the renderer can also run headless (tests, offscreen targets).
//!
//! # Initialization
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratum::GpuContext;
//!
//! # fn demo(window: Arc<winit::window::Window>) -> Result<(), stratum::GpuError> {
//! let (gpu, surface) = GpuContext::with_window(window)?;
//! println!("{}x{}", surface.width(), surface.height());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use thiserror::Error;
use winit::window::Window;

/// Failures while bringing up the graphics backend. All of them are fatal.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to create window surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

/// Core GPU context holding the device and queue.
///
/// All fields are public to allow direct access to wgpu APIs when needed.
/// The context is created once at startup and passed by reference to every
/// pass. Dropping it releases the device after everything built from it.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a context and a configured surface for `window`.
    ///
    /// This performs all wgpu initialization:
    /// 1. Creates a wgpu instance with the primary backends
    /// 2. Creates a surface for the window
    /// 3. Requests an adapter compatible with that surface
    /// 4. Creates the logical device and command queue
    /// 5. Configures the surface with a linear format and Fifo present mode
    pub fn with_window(window: Arc<Window>) -> Result<(Self, WindowSurface), GpuError> {
        let size = window.inner_size();
        let instance = Self::create_instance();
        let surface = instance.create_surface(window)?;
        let gpu = Self::from_instance(instance, Some(&surface))?;
        let surface = WindowSurface::new(&gpu, surface, size.width, size.height)?;
        Ok((gpu, surface))
    }

    /// Create a context without any surface.
    ///
    /// Used for offscreen rendering. Fails with [`GpuError::NoAdapter`] on
    /// machines without a usable adapter, which tests treat as "skip".
    pub fn headless() -> Result<Self, GpuError> {
        Self::from_instance(Self::create_instance(), None)
    }

    fn create_instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::from_build_config(),
            ..Default::default()
        })
    }

    fn from_instance(
        instance: wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, GpuError> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface,
            force_fallback_adapter: false,
        }))?;

        let info = adapter.get_info();
        log::info!(
            "using adapter {} ({:?}, driver {})",
            info.name,
            info.backend,
            info.driver_info
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Stratum Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))?;

        // Validation errors after startup are logged, not fatal.
        device.on_uncaptured_error(Arc::new(|error: wgpu::Error| {
            log::error!("wgpu validation error: {error}");
        }));

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Maximum number of colour attachments a single pass may bind.
    pub fn max_color_attachments(&self) -> u32 {
        self.device.limits().max_color_attachments
    }
}

/// The window's presentable surface and its current configuration.
pub struct WindowSurface {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

impl WindowSurface {
    fn new(
        gpu: &GpuContext,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuError> {
        let caps = surface.get_capabilities(&gpu.adapter);
        let (format, view_format) =
            pick_surface_format(&caps.formats).ok_or(GpuError::NoSurfaceFormat)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: if view_format == format {
                vec![]
            } else {
                vec![view_format]
            },
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        Ok(Self { surface, config })
    }

    /// Resize the surface to new dimensions.
    ///
    /// Ignores zero-sized dimensions, which happen while the window is
    /// minimized.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.reconfigure(gpu);
        }
    }

    /// Re-apply the current configuration, e.g. after the surface was lost.
    pub fn reconfigure(&self, gpu: &GpuContext) {
        self.surface.configure(&gpu.device, &self.config);
    }

    /// Format of the views the present pass writes. Never sRGB, so the
    /// final colour reaches the window byte for byte.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format.remove_srgb_suffix()
    }

    /// A view of an acquired frame in [`format`](Self::format).
    pub fn view(&self, frame: &wgpu::SurfaceTexture) -> wgpu::TextureView {
        frame.texture.create_view(&wgpu::TextureViewDescriptor {
            format: Some(self.format()),
            ..Default::default()
        })
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }
}

/// Surface format plus the linear format its views are written through.
///
/// A linear format is preferred. When the surface only offers sRGB, the
/// views drop the suffix so no encoding happens on store.
fn pick_surface_format(
    formats: &[wgpu::TextureFormat],
) -> Option<(wgpu::TextureFormat, wgpu::TextureFormat)> {
    let format = formats
        .iter()
        .find(|f| !f.is_srgb())
        .or_else(|| formats.first())
        .copied()?;
    Some((format, format.remove_srgb_suffix()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::TextureFormat;

    #[test]
    fn surface_prefers_linear_format() {
        let formats = [TextureFormat::Bgra8UnormSrgb, TextureFormat::Bgra8Unorm];
        assert_eq!(
            pick_surface_format(&formats),
            Some((TextureFormat::Bgra8Unorm, TextureFormat::Bgra8Unorm))
        );
    }

    #[test]
    fn srgb_only_surface_gets_linear_views() {
        let formats = [TextureFormat::Rgba8UnormSrgb];
        assert_eq!(
            pick_surface_format(&formats),
            Some((TextureFormat::Rgba8UnormSrgb, TextureFormat::Rgba8Unorm))
        );
        assert_eq!(pick_surface_format(&[]), None);
    }

    #[test]
    fn late_validation_errors_are_logged() {
        let Some(gpu) = crate::testing::gpu() else {
            return;
        };
        // MAP_READ with MAP_WRITE is invalid without a feature; the default
        // handler would panic here.
        let _buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Invalid Buffer"),
            size: 4,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::MAP_WRITE,
            mapped_at_creation: false,
        });
        let _ = gpu.device.poll(wgpu::PollType::Poll);
    }
}
