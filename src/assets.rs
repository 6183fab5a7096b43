//! Material textures and the environment cube used by the demo scene.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::gpu::GpuContext;
use crate::texture::{ChannelLayout, CubeTexture, ImageData, Texture};

/// Asset loading failures. All of them abort startup.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cube face {face} is {width}x{height}, expected {expected}x{expected}")]
    CubeFace {
        face: usize,
        width: u32,
        height: u32,
        expected: u32,
    },
}

/// One path per cube face.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CubeFacePaths {
    pub positive_x: PathBuf,
    pub negative_x: PathBuf,
    pub positive_y: PathBuf,
    pub negative_y: PathBuf,
    pub positive_z: PathBuf,
    pub negative_z: PathBuf,
}

impl CubeFacePaths {
    /// Faces named `{stem}_{suffix}.{ext}` in `dir`, with suffixes
    /// `px nx py ny pz nz`.
    pub fn in_dir(dir: impl AsRef<Path>, stem: &str, ext: &str) -> Self {
        let dir = dir.as_ref();
        let face = |suffix: &str| dir.join(format!("{stem}_{suffix}.{ext}"));
        Self {
            positive_x: face("px"),
            negative_x: face("nx"),
            positive_y: face("py"),
            negative_y: face("ny"),
            positive_z: face("pz"),
            negative_z: face("nz"),
        }
    }

    /// Paths in cube layer order.
    pub fn layers(&self) -> [&Path; 6] {
        [
            self.positive_x.as_path(),
            self.negative_x.as_path(),
            self.positive_y.as_path(),
            self.negative_y.as_path(),
            self.positive_z.as_path(),
            self.negative_z.as_path(),
        ]
    }
}

/// Image files for the scene's materials and sky.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetPaths {
    pub diffuse: PathBuf,
    pub specular: PathBuf,
    pub normal: PathBuf,
    pub skybox: CubeFacePaths,
}

impl AssetPaths {
    /// Every file the scene reads, in load order.
    pub fn all(&self) -> impl Iterator<Item = &Path> {
        [
            self.diffuse.as_path(),
            self.specular.as_path(),
            self.normal.as_path(),
        ]
        .into_iter()
        .chain(self.skybox.layers())
    }
}

/// GPU textures shared by the geometry and shading passes.
#[derive(Debug)]
pub struct SceneAssets {
    pub diffuse: Texture,
    pub specular: Texture,
    pub normal: Texture,
    pub skybox: CubeTexture,
}

impl SceneAssets {
    /// Load from `paths`, or generate procedural textures when `None`.
    pub fn load(gpu: &GpuContext, paths: Option<&AssetPaths>) -> Result<Self, AssetError> {
        match paths {
            Some(paths) => Self::from_files(gpu, paths),
            None => {
                log::info!("no asset paths configured, using procedural textures");
                Self::procedural(gpu)
            }
        }
    }

    /// Decode every file before creating any GPU object, so a missing or
    /// broken file leaves nothing half-built.
    pub fn from_files(gpu: &GpuContext, paths: &AssetPaths) -> Result<Self, AssetError> {
        if let Some(missing) = paths.all().find(|p| !p.exists()) {
            return Err(AssetError::Missing(missing.to_path_buf()));
        }

        let diffuse = ImageData::load(&paths.diffuse, ChannelLayout::Rgb)?;
        let specular = ImageData::load(&paths.specular, ChannelLayout::Grey)?;
        let normal = ImageData::load(&paths.normal, ChannelLayout::Rgb)?;

        let [px, nx, py, ny, pz, nz] = paths
            .skybox
            .layers()
            .map(|path| ImageData::load(path, ChannelLayout::Rgba));
        let faces = [px?, nx?, py?, ny?, pz?, nz?];

        log::info!(
            "loaded textures: diffuse {}x{}, sky {}x{}",
            diffuse.width,
            diffuse.height,
            faces[0].width,
            faces[0].height
        );

        Ok(Self {
            diffuse: Texture::from_image(gpu, &diffuse, &paths.diffuse.display().to_string()),
            specular: Texture::from_image(gpu, &specular, &paths.specular.display().to_string()),
            normal: Texture::from_image(gpu, &normal, &paths.normal.display().to_string()),
            skybox: CubeTexture::from_faces(gpu, &faces, "Skybox")?,
        })
    }

    /// Textures generated in memory.
    pub fn procedural(gpu: &GpuContext) -> Result<Self, AssetError> {
        let diffuse = ImageData::noise(64, 42);
        let specular = ImageData::solid(4, 4, ChannelLayout::Grey, [96, 96, 96, 255]);
        // Tangent-space +Z.
        let normal = ImageData::solid(4, 4, ChannelLayout::Rgb, [128, 128, 255, 255]);
        let faces = ImageData::sky_faces(64);

        Ok(Self {
            diffuse: Texture::from_image(gpu, &diffuse, "Procedural Diffuse"),
            specular: Texture::from_image(gpu, &specular, "Procedural Specular"),
            normal: Texture::from_image(gpu, &normal, "Procedural Normal"),
            skybox: CubeTexture::from_faces(gpu, &faces, "Procedural Sky")?,
        })
    }
}
