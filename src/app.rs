use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use glam::Vec3;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowAttributes, WindowId};

use crate::assets::AssetPaths;
use crate::camera::Projection;
use crate::frame::{FrameInput, FrameState, Tuning};
use crate::frame_timer::FrameTimer;
use crate::gpu::{GpuContext, WindowSurface};
use crate::input::Input;
use crate::renderer::{DeferredRenderer, RendererSettings};
use crate::shader::ShaderFailurePolicy;

/// Configuration for the demo window and renderer.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    /// Frames averaged per title update.
    pub frames_to_average: u32,
    pub render_scale: f32,
    pub projection: Projection,
    pub light_direction: Vec3,
    pub shader_dir: PathBuf,
    pub assets: Option<AssetPaths>,
    pub shader_policy: ShaderFailurePolicy,
    pub tuning: Tuning,
}

impl Default for AppConfig {
    fn default() -> Self {
        let renderer = RendererSettings::default();
        Self {
            title: "stratum".to_string(),
            width: 1920,
            height: 1080,
            resizable: false,
            frames_to_average: 10,
            render_scale: renderer.render_scale,
            projection: renderer.projection,
            light_direction: renderer.light_direction,
            shader_dir: renderer.shader_dir,
            assets: None,
            shader_policy: renderer.shader_policy,
            tuning: Tuning::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    pub fn frames_to_average(mut self, frames: u32) -> Self {
        self.frames_to_average = frames;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.render_scale = scale;
        self
    }

    /// Vertical field of view in radians.
    pub fn fov(mut self, fov_y: f32) -> Self {
        self.projection.fov_y = fov_y;
        self
    }

    pub fn clip_planes(mut self, near: f32, far: f32) -> Self {
        self.projection.near = near;
        self.projection.far = far;
        self
    }

    pub fn light_direction(mut self, direction: impl Into<Vec3>) -> Self {
        self.light_direction = direction.into();
        self
    }

    pub fn shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    pub fn assets(mut self, paths: AssetPaths) -> Self {
        self.assets = Some(paths);
        self
    }

    pub fn shader_policy(mut self, policy: ShaderFailurePolicy) -> Self {
        self.shader_policy = policy;
        self
    }

    pub fn tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings {
            projection: self.projection,
            light_direction: self.light_direction,
            render_scale: self.render_scale,
            shader_dir: self.shader_dir.clone(),
            shader_policy: self.shader_policy,
            assets: self.assets.clone(),
        }
    }
}

/// Open the window and run the frame loop until it is closed.
///
/// Startup failures (no adapter, missing files, rejected shaders) end the
/// loop before the first frame and are returned here.
///
/// # Example
/// ```no_run
/// stratum::run(stratum::AppConfig::new().render_scale(0.5)).unwrap();
/// ```
pub fn run(config: AppConfig) -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = StratumApp {
        phase: Phase::Pending(config),
        error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("event loop terminated abnormally")?;

    match app.error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

struct StratumApp {
    phase: Phase,
    error: Option<anyhow::Error>,
}

enum Phase {
    Pending(AppConfig),
    Running(Box<Running>),
    Stopped,
}

struct Running {
    window: Arc<Window>,
    gpu: GpuContext,
    surface: WindowSurface,
    renderer: DeferredRenderer,
    input: Input,
    state: FrameState,
    tuning: Tuning,
    timer: FrameTimer,
    last_frame: Instant,
}

impl Running {
    fn start(event_loop: &ActiveEventLoop, config: AppConfig) -> anyhow::Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(config.resizable);
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("failed to create window")?,
        );

        let (gpu, surface) =
            GpuContext::with_window(window.clone()).context("failed to initialize GPU")?;

        // Targets match the monitor so a later resize never needs new ones.
        let native = window
            .current_monitor()
            .map(|monitor| monitor.size())
            .filter(|size| size.width > 0 && size.height > 0)
            .unwrap_or_else(|| window.inner_size());

        let renderer = DeferredRenderer::new(
            &gpu,
            &config.renderer_settings(),
            (native.width.max(1), native.height.max(1)),
            surface.format(),
        )
        .context("failed to build renderer")?;

        log::info!(
            "window {}x{}, render region {:?}",
            surface.width(),
            surface.height(),
            renderer.region()
        );

        window.request_redraw();

        Ok(Self {
            window,
            gpu,
            surface,
            renderer,
            input: Input::new(),
            state: FrameState::default(),
            tuning: config.tuning,
            timer: FrameTimer::new(config.frames_to_average),
            last_frame: Instant::now(),
        })
    }

    /// Returns an error only when the surface can no longer be used.
    fn redraw(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f64();
        self.last_frame = now;

        if let Some(stats) = self.timer.tick(dt) {
            self.window.set_title(&stats.title());
        }

        self.state = self
            .state
            .steer(&FrameInput::from_keys(&self.input), &self.tuning);

        match self.surface.surface.get_current_texture() {
            Ok(frame) => {
                let view = self.surface.view(&frame);
                self.renderer.render_frame(
                    &self.gpu,
                    &self.state,
                    &view,
                    (self.surface.width(), self.surface.height()),
                );
                self.window.pre_present_notify();
                frame.present();
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("surface lost or outdated, reconfiguring");
                self.surface.reconfigure(&self.gpu);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::trace!("surface acquire timed out, skipping frame");
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                anyhow::bail!("out of memory acquiring the surface texture");
            }
            Err(other) => {
                log::warn!("skipping frame: {other}");
            }
        }

        self.state = self.state.animate(&self.tuning);
        self.input.begin_frame();
        self.window.request_redraw();
        Ok(())
    }
}

impl StratumApp {
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.error = Some(error);
        self.phase = Phase::Stopped;
        event_loop.exit();
    }
}

impl ApplicationHandler for StratumApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !matches!(self.phase, Phase::Pending(_)) {
            return;
        }
        let Phase::Pending(config) = std::mem::replace(&mut self.phase, Phase::Stopped) else {
            return;
        };

        match Running::start(event_loop, config) {
            Ok(running) => self.phase = Phase::Running(Box::new(running)),
            Err(error) => self.fail(event_loop, error),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Phase::Running(running) = &mut self.phase else {
            return;
        };

        running.input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput { .. } if running.input.key_pressed(KeyCode::Escape) => {
                event_loop.exit();
            }
            WindowEvent::Focused(false) => running.input.reset(),
            WindowEvent::Resized(size) => {
                running.surface.resize(&running.gpu, size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                if let Err(error) = running.redraw() {
                    self.fail(event_loop, error);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::new();
        assert_eq!((config.width, config.height), (1920, 1080));
        assert_eq!(config.frames_to_average, 10);
        assert!(!config.resizable);
        assert_eq!(config.shader_policy, ShaderFailurePolicy::Continue);
        assert!(config.assets.is_none());
    }

    #[test]
    fn builder_flows_into_renderer_settings() {
        let config = AppConfig::new()
            .title("test")
            .render_scale(0.5)
            .fov(1.0)
            .clip_planes(0.5, 50.0)
            .light_direction([0.0, -1.0, 0.0])
            .shader_dir("elsewhere")
            .shader_policy(ShaderFailurePolicy::Abort);

        let settings = config.renderer_settings();
        assert_eq!(settings.render_scale, 0.5);
        assert_eq!(settings.projection.fov_y, 1.0);
        assert_eq!((settings.projection.near, settings.projection.far), (0.5, 50.0));
        assert_eq!(settings.light_direction, Vec3::NEG_Y);
        assert_eq!(settings.shader_dir, PathBuf::from("elsewhere"));
        assert_eq!(settings.shader_policy, ShaderFailurePolicy::Abort);
    }
}
