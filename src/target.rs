//! Off-screen render target sets: the G-buffer and the final-colour image.
//!
//! A set is validated as a whole before any texture is allocated, so an
//! attachment combination the device would reject never reaches wgpu. The
//! attachment descriptions a set hands out always clear, which means a pass
//! cannot bind a target without resetting it first.

use thiserror::Error;

use crate::gpu::GpuContext;

pub const GBUFFER_POSITION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const GBUFFER_NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const GBUFFER_ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const FINAL_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Colour output indices of the G-buffer.
pub const GBUFFER_POSITION: usize = 0;
pub const GBUFFER_NORMAL: usize = 1;
pub const GBUFFER_ALBEDO: usize = 2;

/// Description of one attachment, checked before allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub label: &'static str,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
}

impl AttachmentSpec {
    pub const fn new(
        label: &'static str,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            label,
            format,
            width,
            height,
        }
    }
}

/// Reasons an attachment combination is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("render target set has no attachments")]
    Empty,
    #[error("attachment `{label}` has zero size")]
    ZeroSize { label: &'static str },
    #[error(
        "attachment `{label}` is {width}x{height}, expected {expected_width}x{expected_height}"
    )]
    SizeMismatch {
        label: &'static str,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("attachment `{label}` uses depth format {format:?} as a colour output")]
    DepthAsColor {
        label: &'static str,
        format: wgpu::TextureFormat,
    },
    #[error("attachment `{label}` uses colour format {format:?} as depth")]
    ColorAsDepth {
        label: &'static str,
        format: wgpu::TextureFormat,
    },
    #[error("attachment `{label}` format {format:?} is not renderable")]
    NotRenderable {
        label: &'static str,
        format: wgpu::TextureFormat,
    },
    #[error("{count} colour attachments requested, device allows {max}")]
    TooManyColor { count: usize, max: u32 },
}

/// Check that the attachments form a complete set and return its size.
pub fn validate(
    colors: &[AttachmentSpec],
    depth: Option<&AttachmentSpec>,
    max_color_attachments: u32,
) -> Result<(u32, u32), TargetError> {
    if colors.len() > max_color_attachments as usize {
        return Err(TargetError::TooManyColor {
            count: colors.len(),
            max: max_color_attachments,
        });
    }

    let first = colors.first().or(depth).ok_or(TargetError::Empty)?;
    let (width, height) = (first.width, first.height);

    for spec in colors.iter().chain(depth) {
        if spec.width == 0 || spec.height == 0 {
            return Err(TargetError::ZeroSize { label: spec.label });
        }
        if (spec.width, spec.height) != (width, height) {
            return Err(TargetError::SizeMismatch {
                label: spec.label,
                width: spec.width,
                height: spec.height,
                expected_width: width,
                expected_height: height,
            });
        }
        let usages = spec
            .format
            .guaranteed_format_features(wgpu::Features::empty())
            .allowed_usages;
        if !usages.contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
            return Err(TargetError::NotRenderable {
                label: spec.label,
                format: spec.format,
            });
        }
    }

    for spec in colors {
        if spec.format.is_depth_stencil_format() {
            return Err(TargetError::DepthAsColor {
                label: spec.label,
                format: spec.format,
            });
        }
    }
    if let Some(spec) = depth {
        if !spec.format.is_depth_stencil_format() {
            return Err(TargetError::ColorAsDepth {
                label: spec.label,
                format: spec.format,
            });
        }
    }

    Ok((width, height))
}

/// One attachment image with a default view.
#[derive(Debug)]
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl RenderTarget {
    fn new(gpu: &GpuContext, spec: &AttachmentSpec) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(spec.label),
            size: wgpu::Extent3d {
                width: spec.width,
                height: spec.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: spec.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }
}

/// A validated group of images one pass draws into.
#[derive(Debug)]
pub struct RenderTargetSet {
    colors: Vec<RenderTarget>,
    depth: Option<RenderTarget>,
    width: u32,
    height: u32,
}

impl RenderTargetSet {
    pub fn new(
        gpu: &GpuContext,
        colors: &[AttachmentSpec],
        depth: Option<&AttachmentSpec>,
    ) -> Result<Self, TargetError> {
        let (width, height) = validate(colors, depth, gpu.max_color_attachments())?;

        Ok(Self {
            colors: colors.iter().map(|spec| RenderTarget::new(gpu, spec)).collect(),
            depth: depth.map(|spec| RenderTarget::new(gpu, spec)),
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color(&self, index: usize) -> &RenderTarget {
        &self.colors[index]
    }

    pub fn colors(&self) -> &[RenderTarget] {
        &self.colors
    }

    pub fn depth(&self) -> Option<&RenderTarget> {
        self.depth.as_ref()
    }

    pub fn color_formats(&self) -> Vec<Option<wgpu::ColorTargetState>> {
        self.colors
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: target.format(),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect()
    }

    /// Colour attachments, each cleared to zero.
    pub fn color_attachments(&self) -> Vec<Option<wgpu::RenderPassColorAttachment<'_>>> {
        self.colors
            .iter()
            .map(|target| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect()
    }

    /// Depth attachment cleared to 1.0.
    pub fn depth_attachment(&self) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
        self.depth
            .as_ref()
            .map(|target| wgpu::RenderPassDepthStencilAttachment {
                view: &target.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            })
    }
}

/// Both target sets used by the deferred pipeline. Created once at the
/// native display resolution and never resized.
#[derive(Debug)]
pub struct FrameTargets {
    pub gbuffer: RenderTargetSet,
    pub final_color: RenderTargetSet,
}

impl FrameTargets {
    pub fn gbuffer_specs(width: u32, height: u32) -> ([AttachmentSpec; 3], AttachmentSpec) {
        (
            [
                AttachmentSpec::new("G-buffer Position", GBUFFER_POSITION_FORMAT, width, height),
                AttachmentSpec::new("G-buffer Normal", GBUFFER_NORMAL_FORMAT, width, height),
                AttachmentSpec::new("G-buffer Albedo", GBUFFER_ALBEDO_FORMAT, width, height),
            ],
            AttachmentSpec::new("G-buffer Depth", DEPTH_FORMAT, width, height),
        )
    }

    pub fn create(gpu: &GpuContext, width: u32, height: u32) -> Result<Self, TargetError> {
        let (colors, depth) = Self::gbuffer_specs(width, height);
        let gbuffer = RenderTargetSet::new(gpu, &colors, Some(&depth))?;
        let final_color = RenderTargetSet::new(
            gpu,
            &[AttachmentSpec::new("Final Color", FINAL_COLOR_FORMAT, width, height)],
            None,
        )?;

        log::info!("created render targets at {width}x{height}");
        Ok(Self {
            gbuffer,
            final_color,
        })
    }

    pub fn width(&self) -> u32 {
        self.final_color.width()
    }

    pub fn height(&self) -> u32 {
        self.final_color.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn gbuffer_specs_validate() {
        let (colors, depth) = FrameTargets::gbuffer_specs(1920, 1080);
        assert_eq!(validate(&colors, Some(&depth), 8), Ok((1920, 1080)));
    }

    #[test]
    fn mismatched_sizes_are_incomplete() {
        let (mut colors, depth) = FrameTargets::gbuffer_specs(1920, 1080);
        colors[GBUFFER_NORMAL].width = 960;
        assert!(matches!(
            validate(&colors, Some(&depth), 8),
            Err(TargetError::SizeMismatch {
                label: "G-buffer Normal",
                ..
            })
        ));

        let (colors, mut depth) = FrameTargets::gbuffer_specs(1920, 1080);
        depth.height = 1079;
        assert!(matches!(
            validate(&colors, Some(&depth), 8),
            Err(TargetError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_bad_combinations() {
        let (colors, depth) = FrameTargets::gbuffer_specs(64, 64);

        assert_eq!(validate(&[], None, 8), Err(TargetError::Empty));
        assert!(matches!(
            validate(&[depth], None, 8),
            Err(TargetError::DepthAsColor { .. })
        ));
        assert!(matches!(
            validate(&colors, Some(&colors[0]), 8),
            Err(TargetError::ColorAsDepth { .. })
        ));
        assert_eq!(
            validate(&colors, Some(&depth), 2),
            Err(TargetError::TooManyColor { count: 3, max: 2 })
        );

        let (zero, _) = FrameTargets::gbuffer_specs(0, 64);
        assert!(matches!(
            validate(&zero, None, 8),
            Err(TargetError::ZeroSize { .. })
        ));
    }

    #[test]
    fn clears_remove_previous_contents() {
        let Some(gpu) = testing::gpu() else {
            return;
        };
        let targets = FrameTargets::create(&gpu, 64, 32).unwrap();
        assert_eq!(targets.gbuffer.colors().len(), 3);
        assert_eq!(targets.gbuffer.depth().map(|d| d.format()), Some(DEPTH_FORMAT));

        for _ in 0..3 {
            let mut encoder = gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
            // Leftovers from a previous frame.
            {
                let stale: Vec<_> = targets
                    .gbuffer
                    .colors()
                    .iter()
                    .map(|target| {
                        Some(wgpu::RenderPassColorAttachment {
                            view: &target.view,
                            depth_slice: None,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                                store: wgpu::StoreOp::Store,
                            },
                        })
                    })
                    .collect();
                let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Stale"),
                    color_attachments: &stale,
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
            }
            gpu.queue.submit(Some(encoder.finish()));
            let albedo = &targets.gbuffer.color(GBUFFER_ALBEDO).texture;
            assert!(testing::read_texture(&gpu, albedo).iter().any(|&b| b != 0));

            let mut encoder = gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
            {
                let attachments = targets.gbuffer.color_attachments();
                let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Clear"),
                    color_attachments: &attachments,
                    depth_stencil_attachment: targets.gbuffer.depth_attachment(),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
            }
            gpu.queue.submit(Some(encoder.finish()));

            for target in targets.gbuffer.colors() {
                let texels = testing::read_texture(&gpu, &target.texture);
                assert_eq!(texels.len(), 64 * 32 * 8);
                assert!(texels.iter().all(|&b| b == 0));
            }
        }
    }
}
