//! # Stratum
//!
//! A small deferred renderer built on wgpu.
//!
//! Each frame draws a handful of textured cubes and a ground plane into a
//! G-buffer (position, normal, albedo+specular, depth), lights it in one
//! full-screen pass with a skybox behind, and blits the result onto the
//! window with a nearest sampler. The render region can be a fraction of the
//! targets, which makes the blit an upscale.
//!
//! ```no_run
//! use stratum::{AppConfig, LoggingConfig, init_logging};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(LoggingConfig::default());
//!     stratum::run(AppConfig::new().title("deferred").render_scale(0.5))
//! }
//! ```

pub mod app;
pub mod assets;
pub mod camera;
pub mod frame;
pub mod frame_timer;
pub mod geometry_pass;
pub mod gpu;
pub mod input;
pub mod logging;
pub mod math;
pub mod mesh;
pub mod present_pass;
pub mod renderer;
pub mod scene;
pub mod shader;
pub mod shading_pass;
pub mod target;
pub mod texture;

#[cfg(test)]
mod testing;

pub use app::{AppConfig, run};
pub use assets::{AssetError, AssetPaths, CubeFacePaths, SceneAssets};
pub use camera::{Camera, Projection};
pub use frame::{FrameInput, FrameState, Tuning};
pub use frame_timer::{FrameStats, FrameTimer};
pub use gpu::{GpuContext, GpuError, WindowSurface};
pub use input::Input;
pub use logging::{LoggingConfig, init_logging};
pub use renderer::{DeferredRenderer, RendererError, RendererSettings};
pub use shader::{LayoutMismatch, ShaderError, ShaderFailurePolicy};
pub use target::{FrameTargets, RenderTargetSet, TargetError};
pub use texture::{ChannelLayout, ImageData};
