//! The deferred frame pipeline: geometry pass, shading pass, present.

use std::path::PathBuf;

use glam::{Vec2, Vec3};
use thiserror::Error;

use crate::assets::{AssetError, AssetPaths, SceneAssets};
use crate::camera::Projection;
use crate::frame::FrameState;
use crate::geometry_pass::{self, FrameUniforms, GeometryPass};
use crate::gpu::GpuContext;
use crate::present_pass::PresentPass;
use crate::scene;
use crate::shader::{ShaderError, ShaderFailurePolicy, ShaderPair};
use crate::shading_pass::{self, ShadingFragmentUniforms, ShadingPass, ShadingVertexUniforms};
use crate::target::{FrameTargets, TargetError};

#[derive(Debug, Error)]
pub enum RendererError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// Everything the renderer needs besides the device.
#[derive(Clone, Debug)]
pub struct RendererSettings {
    pub projection: Projection,
    /// Direction the light travels in, world space.
    pub light_direction: Vec3,
    /// Fraction of the targets rendered each frame, in `(0, 1]`.
    pub render_scale: f32,
    pub shader_dir: PathBuf,
    pub shader_policy: ShaderFailurePolicy,
    pub assets: Option<AssetPaths>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            projection: Projection::default(),
            light_direction: Vec3::new(-0.4, -1.0, -0.3),
            render_scale: 1.0,
            shader_dir: PathBuf::from("shaders"),
            shader_policy: ShaderFailurePolicy::default(),
            assets: None,
        }
    }
}

pub struct DeferredRenderer {
    targets: FrameTargets,
    geometry: GeometryPass,
    shading: ShadingPass,
    present: PresentPass,
    projection: Projection,
    light_direction: Vec3,
    render_scale: f32,
    // Bound by the passes; kept alive with them.
    _assets: SceneAssets,
}

impl DeferredRenderer {
    /// Load assets and shaders, then allocate `target_size` render targets
    /// and the passes that draw into them. `output_format` is the format of
    /// the view later handed to [`render_frame`](Self::render_frame).
    pub fn new(
        gpu: &GpuContext,
        settings: &RendererSettings,
        target_size: (u32, u32),
        output_format: wgpu::TextureFormat,
    ) -> Result<Self, RendererError> {
        let assets = SceneAssets::load(gpu, settings.assets.as_ref())?;
        let targets = FrameTargets::create(gpu, target_size.0, target_size.1)?;

        let policy = settings.shader_policy;
        let gbuffer_shaders = ShaderPair::load(
            gpu,
            &settings.shader_dir,
            "gbuffer",
            geometry_pass::LAYOUTS,
            policy,
        )?;
        let shading_shaders = ShaderPair::load(
            gpu,
            &settings.shader_dir,
            "shading",
            shading_pass::LAYOUTS,
            policy,
        )?;

        let geometry = GeometryPass::new(gpu, &gbuffer_shaders, &assets, &targets.gbuffer, policy)?;
        let shading = ShadingPass::new(gpu, &shading_shaders, &assets, &targets, policy)?;
        let present = PresentPass::new(gpu, &targets.final_color, output_format, policy)?;

        let render_scale = if settings.render_scale > 0.0 && settings.render_scale <= 1.0 {
            settings.render_scale
        } else {
            log::warn!(
                "render scale {} outside (0, 1], using 1.0",
                settings.render_scale
            );
            1.0
        };

        Ok(Self {
            targets,
            geometry,
            shading,
            present,
            projection: settings.projection,
            light_direction: settings.light_direction,
            render_scale,
            _assets: assets,
        })
    }

    pub fn targets(&self) -> &FrameTargets {
        &self.targets
    }

    /// Size of the target region rendered each frame.
    pub fn region(&self) -> (u32, u32) {
        scaled_region(
            (self.targets.width(), self.targets.height()),
            self.render_scale,
        )
    }

    /// Draw one frame of `state` and blit it onto `output`.
    pub fn render_frame(
        &mut self,
        gpu: &GpuContext,
        state: &FrameState,
        output: &wgpu::TextureView,
        output_size: (u32, u32),
    ) {
        let region = self.region();
        let aspect = region.0 as f32 / region.1 as f32;
        let uv_scale = Vec2::new(
            region.0 as f32 / self.targets.width() as f32,
            region.1 as f32 / self.targets.height() as f32,
        );

        let camera = &state.camera;
        let frame = FrameUniforms::new(self.projection.matrix(aspect), camera.view_matrix());
        let draws = scene::build(state);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        self.geometry.render(
            gpu,
            &mut encoder,
            &self.targets.gbuffer,
            &frame,
            &draws,
            region,
        );

        self.shading.render(
            gpu,
            &mut encoder,
            &self.targets.final_color,
            &ShadingVertexUniforms::new(
                camera.inverse_rotation(),
                self.projection.fov_y,
                aspect,
                uv_scale,
            ),
            &ShadingFragmentUniforms::new(camera.position, self.light_direction),
            region,
        );

        self.present
            .render(gpu, &mut encoder, output, output_size, uv_scale);

        gpu.queue.submit(Some(encoder.finish()));
    }
}

/// `size` scaled by `scale`, at least one pixel and at most `size`.
pub fn scaled_region(size: (u32, u32), scale: f32) -> (u32, u32) {
    let scale_axis = |extent: u32| ((extent as f32 * scale).round() as u32).clamp(1, extent.max(1));
    (scale_axis(size.0), scale_axis(size.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameInput, Tuning};
    use crate::target::GBUFFER_POSITION;
    use crate::testing;

    fn settings() -> RendererSettings {
        RendererSettings {
            shader_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders"),
            shader_policy: ShaderFailurePolicy::Abort,
            ..RendererSettings::default()
        }
    }

    fn output_texture(gpu: &GpuContext, width: u32, height: u32) -> wgpu::Texture {
        gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Test Back Buffer"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    #[test]
    fn region_scaling() {
        assert_eq!(scaled_region((1920, 1080), 1.0), (1920, 1080));
        assert_eq!(scaled_region((1920, 1080), 0.5), (960, 540));
        assert_eq!(scaled_region((4, 4), 0.01), (1, 1));
    }

    #[test]
    fn first_frame_writes_every_pixel() {
        let Some(gpu) = testing::gpu() else {
            return;
        };
        let (width, height) = (1920, 1080);
        let mut renderer = DeferredRenderer::new(
            &gpu,
            &settings(),
            (width, height),
            wgpu::TextureFormat::Rgba8Unorm,
        )
        .unwrap();

        let output = output_texture(&gpu, width, height);
        let view = output.create_view(&wgpu::TextureViewDescriptor::default());
        renderer.render_frame(&gpu, &FrameState::default(), &view, (width, height));

        // Both images are cleared to transparent, so alpha 255 means drawn.
        let final_color = &renderer.targets().final_color.color(0).texture;
        let shaded = testing::read_texture(&gpu, final_color);
        assert_eq!(shaded.len(), (width * height * 4) as usize);
        assert!(shaded.chunks_exact(4).all(|p| p[3] == 255));

        let pixels = testing::read_texture(&gpu, &output);
        assert_eq!(pixels.len(), (width * height * 4) as usize);
        assert!(pixels.chunks_exact(4).all(|p| p[3] == 255));
    }

    #[test]
    fn previous_frame_does_not_leak() {
        let Some(gpu) = testing::gpu() else {
            return;
        };
        let (width, height) = (160, 90);
        let mut renderer = DeferredRenderer::new(
            &gpu,
            &settings(),
            (width, height),
            wgpu::TextureFormat::Rgba8Unorm,
        )
        .unwrap();
        let output = output_texture(&gpu, width, height);
        let view = output.create_view(&wgpu::TextureViewDescriptor::default());
        let positions = |renderer: &DeferredRenderer| {
            let target = renderer.targets().gbuffer.color(GBUFFER_POSITION);
            testing::read_texture(&gpu, &target.texture)
        };

        renderer.render_frame(&gpu, &FrameState::default(), &view, (width, height));
        let first = positions(&renderer);
        assert!(first.iter().any(|&b| b != 0));

        // Straight up from the start position nothing but sky is in view.
        let mut looking_up = FrameState::default();
        looking_up.camera.pitch = std::f32::consts::FRAC_PI_2;
        renderer.render_frame(&gpu, &looking_up, &view, (width, height));
        let second = positions(&renderer);
        assert!(second.iter().all(|&b| b == 0));
    }

    #[test]
    fn scaled_frames_keep_rendering() {
        let Some(gpu) = testing::gpu() else {
            return;
        };
        let settings = RendererSettings {
            render_scale: 0.5,
            ..settings()
        };
        let mut renderer =
            DeferredRenderer::new(&gpu, &settings, (256, 128), wgpu::TextureFormat::Rgba8Unorm)
                .unwrap();
        assert_eq!(renderer.region(), (128, 64));

        let output = output_texture(&gpu, 320, 200);
        let view = output.create_view(&wgpu::TextureViewDescriptor::default());
        let tuning = Tuning::default();
        let input = FrameInput {
            turn_right: true,
            forward: true,
            ..FrameInput::default()
        };
        let mut state = FrameState::default();
        for _ in 0..4 {
            renderer.render_frame(&gpu, &state, &view, (320, 200));
            state = state.advance(&input, &tuning);
        }

        let (region_w, region_h) = renderer.region();
        let final_color = &renderer.targets().final_color.color(0).texture;
        let shaded = testing::read_texture(&gpu, final_color);
        for row in shaded.chunks_exact(256 * 4).take(region_h as usize) {
            assert!(row[..region_w as usize * 4].chunks_exact(4).all(|p| p[3] == 255));
        }

        let pixels = testing::read_texture(&gpu, &output);
        assert!(pixels.chunks_exact(4).all(|p| p[3] == 255));
    }

    #[test]
    fn missing_shader_dir_fails() {
        let Some(gpu) = testing::gpu() else {
            return;
        };
        let settings = RendererSettings {
            shader_dir: PathBuf::from("no/such/dir"),
            ..settings()
        };
        let result =
            DeferredRenderer::new(&gpu, &settings, (64, 64), wgpu::TextureFormat::Rgba8Unorm);
        assert!(matches!(
            result,
            Err(RendererError::Shader(ShaderError::Missing(_)))
        ));
    }
}
