//! Sampled textures: material maps and the environment cube.
//!
//! Images are decoded on the CPU into an [`ImageData`] whose pixel layout
//! already matches the GPU storage format, then uploaded once. wgpu has no
//! three-channel 8-bit format, so RGB images are padded to RGBA with an
//! opaque alpha on the CPU side.

use std::path::Path;

use crate::assets::AssetError;
use crate::gpu::GpuContext;
use crate::math::lerp;

/// Channel layout requested when loading an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Grey,
    GreyAlpha,
    Rgb,
    Rgba,
}

impl ChannelLayout {
    pub const ALL: [ChannelLayout; 4] = [
        ChannelLayout::Grey,
        ChannelLayout::GreyAlpha,
        ChannelLayout::Rgb,
        ChannelLayout::Rgba,
    ];

    /// Channels in the source image after conversion.
    pub fn source_channels(self) -> u32 {
        match self {
            ChannelLayout::Grey => 1,
            ChannelLayout::GreyAlpha => 2,
            ChannelLayout::Rgb => 3,
            ChannelLayout::Rgba => 4,
        }
    }

    /// GPU storage format for this layout.
    pub fn storage_format(self) -> wgpu::TextureFormat {
        match self {
            ChannelLayout::Grey => wgpu::TextureFormat::R8Unorm,
            ChannelLayout::GreyAlpha => wgpu::TextureFormat::Rg8Unorm,
            ChannelLayout::Rgb | ChannelLayout::Rgba => wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    /// Bytes per pixel of the uploaded data.
    pub fn upload_channels(self) -> u32 {
        self.storage_format().block_copy_size(None).unwrap_or(4)
    }
}

/// Decoded pixels in upload layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub layout: ChannelLayout,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Convert a decoded image to `layout`.
    pub fn from_image(image: &image::DynamicImage, layout: ChannelLayout) -> Self {
        let (width, height) = (image.width(), image.height());
        let pixels = match layout {
            ChannelLayout::Grey => image.to_luma8().into_raw(),
            ChannelLayout::GreyAlpha => image.to_luma_alpha8().into_raw(),
            ChannelLayout::Rgb => {
                let rgb = image.to_rgb8();
                let mut padded = Vec::with_capacity((width * height * 4) as usize);
                for p in rgb.pixels() {
                    padded.extend_from_slice(&[p[0], p[1], p[2], u8::MAX]);
                }
                padded
            }
            ChannelLayout::Rgba => image.to_rgba8().into_raw(),
        };
        Self {
            width,
            height,
            layout,
            pixels,
        }
    }

    /// Load and convert an image file. A missing file is reported as
    /// [`AssetError::Missing`] before the decoder is involved.
    pub fn load(path: impl AsRef<Path>, layout: ChannelLayout) -> Result<Self, AssetError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AssetError::Missing(path.to_path_buf()));
        }
        let image = image::open(path).map_err(|source| AssetError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_image(&image, layout))
    }

    /// A single-colour image. `rgba` is reduced to the layout's channels.
    pub fn solid(width: u32, height: u32, layout: ChannelLayout, rgba: [u8; 4]) -> Self {
        let texel = match layout {
            ChannelLayout::Grey => vec![rgba[0]],
            ChannelLayout::GreyAlpha => vec![rgba[0], rgba[3]],
            ChannelLayout::Rgb => vec![rgba[0], rgba[1], rgba[2], u8::MAX],
            ChannelLayout::Rgba => rgba.to_vec(),
        };
        Self {
            width,
            height,
            layout,
            pixels: texel.repeat((width * height) as usize),
        }
    }

    /// Blocky value noise in a grey-blue palette, RGB layout.
    pub fn noise(size: u32, seed: u32) -> Self {
        let palette: &[[u8; 3]] = &[
            [128, 128, 136],
            [100, 104, 112],
            [150, 150, 158],
            [90, 92, 100],
            [140, 142, 150],
            [112, 114, 122],
        ];

        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                // 4×4 blocks with per-pixel variation
                let base = palette[(hash(x / 4, y / 4, seed) % palette.len() as u32) as usize];
                let variation = (hash(x, y, seed.wrapping_add(12345)) % 16) as i32 - 8;
                for channel in base {
                    pixels.push((channel as i32 + variation).clamp(0, 255) as u8);
                }
                pixels.push(u8::MAX);
            }
        }

        Self {
            width: size,
            height: size,
            layout: ChannelLayout::Rgb,
            pixels,
        }
    }

    /// Six faces of a vertical gradient sky, in upload order
    /// (+X, -X, +Y, -Y, +Z, -Z).
    pub fn sky_faces(size: u32) -> [ImageData; 6] {
        const ZENITH: [f32; 3] = [0.10, 0.22, 0.55];
        const HORIZON: [f32; 3] = [0.70, 0.78, 0.90];
        const GROUND: [f32; 3] = [0.18, 0.16, 0.14];

        std::array::from_fn(|face| {
            let mut pixels = Vec::with_capacity((size * size * 4) as usize);
            for y in 0..size {
                for x in 0..size {
                    let u = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                    let v = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                    let elevation = cube_direction_y(face, u, v);
                    let (from, to, t) = if elevation >= 0.0 {
                        (HORIZON, ZENITH, elevation)
                    } else {
                        (HORIZON, GROUND, (-elevation * 4.0).min(1.0))
                    };
                    for c in 0..3 {
                        pixels.push((lerp(from[c], to[c], t) * 255.0).round() as u8);
                    }
                    pixels.push(u8::MAX);
                }
            }
            ImageData {
                width: size,
                height: size,
                layout: ChannelLayout::Rgba,
                pixels,
            }
        })
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// Normalized world-space y of the direction through texel `(u, v)` of a
/// cube face, with `v` growing downwards as in the cube map convention.
fn cube_direction_y(face: usize, u: f32, v: f32) -> f32 {
    let (dir_y, len) = match face {
        // ±X and ±Z faces: y = -v
        0 | 1 | 4 | 5 => (-v, (1.0 + u * u + v * v).sqrt()),
        // +Y
        2 => (1.0, (1.0 + u * u + v * v).sqrt()),
        // -Y
        _ => (-1.0, (1.0 + u * u + v * v).sqrt()),
    };
    dir_y / len
}

/// Simple hash function for procedural generation.
fn hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_add(x.wrapping_mul(374761393));
    h = h.wrapping_add(y.wrapping_mul(668265263));
    h ^= h >> 13;
    h = h.wrapping_mul(1274126177);
    h ^= h >> 16;
    h
}

/// A 2D texture with its sampler.
#[derive(Debug)]
pub struct Texture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    /// Upload an image. The storage format follows the image's layout.
    pub fn from_image(gpu: &GpuContext, image: &ImageData, label: &str) -> Self {
        use wgpu::util::DeviceExt;

        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: image.extent(),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: image.layout.storage_format(),
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &image.pixels,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{label} Sampler")),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            width: image.width,
            height: image.height,
        }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }
}

/// A six-layer cube texture sampled by direction.
#[derive(Debug)]
pub struct CubeTexture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
    pub size: u32,
}

impl CubeTexture {
    /// Upload six faces given in layer order (+X, -X, +Y, -Y, +Z, -Z).
    ///
    /// Every face must be square, share the same size and use the same
    /// channel layout.
    pub fn from_faces(
        gpu: &GpuContext,
        faces: &[ImageData; 6],
        label: &str,
    ) -> Result<Self, AssetError> {
        use wgpu::util::DeviceExt;

        let first = &faces[0];
        let size = first.width;
        for (index, face) in faces.iter().enumerate() {
            if face.width != size || face.height != size || face.layout != first.layout {
                return Err(AssetError::CubeFace {
                    face: index,
                    width: face.width,
                    height: face.height,
                    expected: size,
                });
            }
        }

        let data: Vec<u8> = faces.iter().flat_map(|f| f.pixels.iter().copied()).collect();

        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 6,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: first.layout.storage_format(),
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{label} Sampler")),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            texture,
            view,
            sampler,
            size,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn sample_image() -> image::DynamicImage {
        let mut img = image::RgbaImage::new(64, 64);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = image::Rgba([(x * 4) as u8, (y * 4) as u8, 200, 128]);
        }
        image::DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn layouts_select_matching_formats() {
        use wgpu::TextureFormat::*;
        let expected = [
            (ChannelLayout::Grey, R8Unorm, 1, 1),
            (ChannelLayout::GreyAlpha, Rg8Unorm, 2, 2),
            (ChannelLayout::Rgb, Rgba8Unorm, 3, 4),
            (ChannelLayout::Rgba, Rgba8Unorm, 4, 4),
        ];
        for (layout, format, source, upload) in expected {
            assert_eq!(layout.storage_format(), format, "{layout:?}");
            assert_eq!(layout.source_channels(), source, "{layout:?}");
            assert_eq!(layout.upload_channels(), upload, "{layout:?}");
        }
    }

    #[test]
    fn conversion_matches_upload_size() {
        let img = sample_image();
        for layout in ChannelLayout::ALL {
            let data = ImageData::from_image(&img, layout);
            assert_eq!(
                data.pixels.len() as u32,
                64 * 64 * layout.upload_channels(),
                "{layout:?}"
            );
        }
    }

    #[test]
    fn rgb_is_padded_opaque() {
        let data = ImageData::from_image(&sample_image(), ChannelLayout::Rgb);
        assert!(data.pixels.chunks(4).all(|p| p[3] == u8::MAX));
        assert_eq!(&data.pixels[4..7], &[4, 0, 200]);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ImageData::load("does/not/exist.png", ChannelLayout::Rgb).unwrap_err();
        assert!(matches!(err, AssetError::Missing(_)));
    }

    #[test]
    fn sky_is_brighter_overhead() {
        let faces = ImageData::sky_faces(8);
        let top = &faces[2].pixels;
        let bottom = &faces[3].pixels;
        assert!(top[2] > bottom[2]);
    }

    #[test]
    fn upload_round_trips_every_layout() {
        let Some(gpu) = testing::gpu() else {
            return;
        };
        let img = sample_image();
        for layout in ChannelLayout::ALL {
            let data = ImageData::from_image(&img, layout);
            let texture = Texture::from_image(&gpu, &data, "round trip");
            assert_eq!(texture.format(), layout.storage_format());

            let read = testing::read_texture(&gpu, &texture.texture);
            assert_eq!(read, data.pixels, "{layout:?}");
        }
    }

    #[test]
    fn cube_rejects_mismatched_faces() {
        let Some(gpu) = testing::gpu() else {
            return;
        };
        let mut faces = ImageData::sky_faces(8);
        faces[4] = ImageData::solid(8, 4, ChannelLayout::Rgba, [0, 0, 0, 255]);
        let err = CubeTexture::from_faces(&gpu, &faces, "bad sky").unwrap_err();
        assert!(matches!(err, AssetError::CubeFace { face: 4, .. }));
    }
}
