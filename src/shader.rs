//! Shader loading, compilation and uniform layout checks.
//!
//! Every stage is compiled on its own: WGSL text is parsed and validated with
//! naga, the uniform blocks the Rust side writes are checked against the
//! parsed module, and only then is the wgpu module created. Vertex and
//! fragment stages are joined later when a pass builds its pipeline.
//!
//! Compile and link failures follow [`ShaderFailurePolicy`]. A uniform
//! layout mismatch is always an error: the CPU would write garbage into the
//! block.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use naga::valid::{Capabilities, ValidationFlags, Validator};
use thiserror::Error;

use crate::gpu::GpuContext;

/// What to do when a shader fails to compile or link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShaderFailurePolicy {
    /// Log the diagnostic and keep going with the broken module.
    #[default]
    Continue,
    /// Log the diagnostic and return the error.
    Abort,
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to compile {}:\n{message}", path.display())]
    Compile { path: PathBuf, message: String },
    #[error("failed to link {label}: {message}")]
    Link { label: String, message: String },
    #[error("uniform layout mismatch in {}: {source}", path.display())]
    Layout {
        path: PathBuf,
        #[source]
        source: LayoutMismatch,
    },
}

/// Type of a uniform block member, as the Rust side writes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformType {
    F32,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
}

impl UniformType {
    fn matches(self, inner: &naga::TypeInner) -> bool {
        use naga::{TypeInner, VectorSize};

        let f32_scalar = naga::Scalar::F32;
        match (self, inner) {
            (UniformType::F32, TypeInner::Scalar(s)) => *s == f32_scalar,
            (UniformType::Vec2, TypeInner::Vector { size, scalar }) => {
                *size == VectorSize::Bi && *scalar == f32_scalar
            }
            (UniformType::Vec3, TypeInner::Vector { size, scalar }) => {
                *size == VectorSize::Tri && *scalar == f32_scalar
            }
            (UniformType::Vec4, TypeInner::Vector { size, scalar }) => {
                *size == VectorSize::Quad && *scalar == f32_scalar
            }
            (
                UniformType::Mat3,
                TypeInner::Matrix {
                    columns,
                    rows,
                    scalar,
                },
            ) => *columns == VectorSize::Tri && *rows == VectorSize::Tri && *scalar == f32_scalar,
            (
                UniformType::Mat4,
                TypeInner::Matrix {
                    columns,
                    rows,
                    scalar,
                },
            ) => *columns == VectorSize::Quad && *rows == VectorSize::Quad && *scalar == f32_scalar,
            _ => false,
        }
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UniformType::F32 => "f32",
            UniformType::Vec2 => "vec2<f32>",
            UniformType::Vec3 => "vec3<f32>",
            UniformType::Vec4 => "vec4<f32>",
            UniformType::Mat3 => "mat3x3<f32>",
            UniformType::Mat4 => "mat4x4<f32>",
        })
    }
}

/// One member of a uniform block. `index` is the member's position in the
/// WGSL struct and `offset` its byte offset in the Rust struct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformSlot {
    pub index: usize,
    pub name: &'static str,
    pub ty: UniformType,
    pub offset: u32,
}

impl UniformSlot {
    pub const fn new(index: usize, name: &'static str, ty: UniformType, offset: usize) -> Self {
        Self {
            index,
            name,
            ty,
            offset: offset as u32,
        }
    }
}

/// A uniform block at a fixed `(group, binding)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformLayout {
    /// WGSL struct name of the block.
    pub block: &'static str,
    pub group: u32,
    pub binding: u32,
    pub slots: &'static [UniformSlot],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutMismatch {
    #[error("no uniform block at group {group} binding {binding}")]
    MissingBlock { group: u32, binding: u32 },
    #[error("block at group {group} binding {binding} is `{found}`, expected `{expected}`")]
    BlockName {
        group: u32,
        binding: u32,
        expected: &'static str,
        found: String,
    },
    #[error("`{block}` has no member {index} (`{name}`)")]
    MissingSlot {
        block: &'static str,
        index: usize,
        name: &'static str,
    },
    #[error("`{block}` member {index} is `{found}`, expected `{expected}`")]
    SlotName {
        block: &'static str,
        index: usize,
        expected: &'static str,
        found: String,
    },
    #[error("`{block}.{name}` is not {expected}")]
    SlotType {
        block: &'static str,
        name: &'static str,
        expected: UniformType,
    },
    #[error("`{block}.{name}` is at offset {found}, expected {expected}")]
    SlotOffset {
        block: &'static str,
        name: &'static str,
        expected: u32,
        found: u32,
    },
}

impl UniformLayout {
    /// Check this layout against a parsed module.
    pub fn check(&self, module: &naga::Module) -> Result<(), LayoutMismatch> {
        let missing = LayoutMismatch::MissingBlock {
            group: self.group,
            binding: self.binding,
        };
        let (_, global) = module
            .global_variables
            .iter()
            .find(|(_, var)| {
                var.space == naga::AddressSpace::Uniform
                    && var.binding.as_ref().is_some_and(|b| {
                        b.group == self.group && b.binding == self.binding
                    })
            })
            .ok_or(missing)?;

        let ty = &module.types[global.ty];
        let found = ty.name.clone().unwrap_or_default();
        if found != self.block {
            return Err(LayoutMismatch::BlockName {
                group: self.group,
                binding: self.binding,
                expected: self.block,
                found,
            });
        }

        let naga::TypeInner::Struct { members, .. } = &ty.inner else {
            return Err(LayoutMismatch::BlockName {
                group: self.group,
                binding: self.binding,
                expected: self.block,
                found: format!("non-struct {found}"),
            });
        };

        for slot in self.slots {
            let member = members.get(slot.index).ok_or(LayoutMismatch::MissingSlot {
                block: self.block,
                index: slot.index,
                name: slot.name,
            })?;

            let member_name = member.name.as_deref().unwrap_or_default();
            if member_name != slot.name {
                return Err(LayoutMismatch::SlotName {
                    block: self.block,
                    index: slot.index,
                    expected: slot.name,
                    found: member_name.to_owned(),
                });
            }
            if !slot.ty.matches(&module.types[member.ty].inner) {
                return Err(LayoutMismatch::SlotType {
                    block: self.block,
                    name: slot.name,
                    expected: slot.ty,
                });
            }
            if member.offset != slot.offset {
                return Err(LayoutMismatch::SlotOffset {
                    block: self.block,
                    name: slot.name,
                    expected: slot.offset,
                    found: member.offset,
                });
            }
        }

        Ok(())
    }
}

/// WGSL text plus the path it came from, used in diagnostics.
#[derive(Clone, Debug)]
pub struct ShaderSource {
    pub path: PathBuf,
    pub text: String,
}

impl ShaderSource {
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ShaderError> {
        let path = path.as_ref().to_path_buf();
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Self { path, text }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(ShaderError::Missing(path)),
            Err(source) => Err(ShaderError::Io { path, source }),
        }
    }

    /// Source compiled into the binary. `name` stands in for the path.
    pub fn embedded(name: &str, text: &str) -> Self {
        Self {
            path: PathBuf::from(name),
            text: text.to_owned(),
        }
    }

    /// Parse and validate with naga.
    pub fn parse(&self) -> Result<naga::Module, ShaderError> {
        let module = naga::front::wgsl::parse_str(&self.text).map_err(|err| ShaderError::Compile {
            path: self.path.clone(),
            message: err.emit_to_string(&self.text),
        })?;

        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|err| ShaderError::Compile {
                path: self.path.clone(),
                message: err.emit_to_string(&self.text),
            })?;

        Ok(module)
    }
}

/// Which pipeline stage a module feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    pub fn entry_point(self) -> &'static str {
        match self {
            StageKind::Vertex => "vs",
            StageKind::Fragment => "fs",
        }
    }
}

/// A compiled shader module for a single stage.
#[derive(Debug)]
pub struct ShaderStage {
    pub module: wgpu::ShaderModule,
    pub kind: StageKind,
    pub path: PathBuf,
}

impl ShaderStage {
    /// Compile one stage and check its uniform blocks.
    pub fn compile(
        gpu: &GpuContext,
        source: &ShaderSource,
        kind: StageKind,
        layouts: &[UniformLayout],
        policy: ShaderFailurePolicy,
    ) -> Result<Self, ShaderError> {
        match source.parse() {
            Ok(parsed) => {
                for layout in layouts {
                    layout.check(&parsed).map_err(|source_err| ShaderError::Layout {
                        path: source.path.clone(),
                        source: source_err,
                    })?;
                }
            }
            Err(err) => report(err, policy)?,
        }

        let label = source.path.display().to_string();
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(source.text.as_str().into()),
            });
        if let Some(err) = pollster::block_on(gpu.device.pop_error_scope()) {
            report(
                ShaderError::Compile {
                    path: source.path.clone(),
                    message: err.to_string(),
                },
                policy,
            )?;
        }

        log::debug!("compiled {kind:?} shader {label}");
        Ok(Self {
            module,
            kind,
            path: source.path.clone(),
        })
    }

    pub fn entry_point(&self) -> &'static str {
        self.kind.entry_point()
    }
}

/// Independently compiled vertex and fragment stages of one pass.
#[derive(Debug)]
pub struct ShaderPair {
    pub vertex: ShaderStage,
    pub fragment: ShaderStage,
}

/// Uniform blocks each stage of a pass is expected to declare.
#[derive(Clone, Copy, Debug)]
pub struct PairLayouts {
    pub vertex: &'static [UniformLayout],
    pub fragment: &'static [UniformLayout],
}

impl ShaderPair {
    /// Read `{dir}/{name}.vert.wgsl` and `{dir}/{name}.frag.wgsl`.
    pub fn load(
        gpu: &GpuContext,
        dir: &Path,
        name: &str,
        layouts: PairLayouts,
        policy: ShaderFailurePolicy,
    ) -> Result<Self, ShaderError> {
        let vertex = ShaderSource::read(dir.join(format!("{name}.vert.wgsl")))?;
        let fragment = ShaderSource::read(dir.join(format!("{name}.frag.wgsl")))?;
        Self::from_sources(gpu, &vertex, &fragment, layouts, policy)
    }

    pub fn from_sources(
        gpu: &GpuContext,
        vertex: &ShaderSource,
        fragment: &ShaderSource,
        layouts: PairLayouts,
        policy: ShaderFailurePolicy,
    ) -> Result<Self, ShaderError> {
        Ok(Self {
            vertex: ShaderStage::compile(gpu, vertex, StageKind::Vertex, layouts.vertex, policy)?,
            fragment: ShaderStage::compile(
                gpu,
                fragment,
                StageKind::Fragment,
                layouts.fragment,
                policy,
            )?,
        })
    }
}

/// Create a pipeline, catching validation errors raised while linking.
pub fn link_pipeline(
    gpu: &GpuContext,
    descriptor: &wgpu::RenderPipelineDescriptor<'_>,
    policy: ShaderFailurePolicy,
) -> Result<wgpu::RenderPipeline, ShaderError> {
    gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = gpu.device.create_render_pipeline(descriptor);
    if let Some(err) = pollster::block_on(gpu.device.pop_error_scope()) {
        report(
            ShaderError::Link {
                label: descriptor.label.unwrap_or("pipeline").to_owned(),
                message: err.to_string(),
            },
            policy,
        )?;
    }
    Ok(pipeline)
}

fn report(err: ShaderError, policy: ShaderFailurePolicy) -> Result<(), ShaderError> {
    log::error!("{err}");
    match policy {
        ShaderFailurePolicy::Continue => Ok(()),
        ShaderFailurePolicy::Abort => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
struct Params {
    tint: vec4<f32>,
    scale: f32,
    offset: vec2<f32>,
}

@group(0) @binding(2) var<uniform> params: Params;

@vertex
fn vs(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {
    return params.tint * params.scale + vec4<f32>(params.offset, f32(i), 1.0);
}
"#;

    const SLOTS: &[UniformSlot] = &[
        UniformSlot::new(0, "tint", UniformType::Vec4, 0),
        UniformSlot::new(1, "scale", UniformType::F32, 16),
        UniformSlot::new(2, "offset", UniformType::Vec2, 24),
    ];

    const LAYOUT: UniformLayout = UniformLayout {
        block: "Params",
        group: 0,
        binding: 2,
        slots: SLOTS,
    };

    fn parsed() -> naga::Module {
        ShaderSource::embedded("params.wgsl", SOURCE).parse().unwrap()
    }

    #[test]
    fn matching_layout_passes() {
        assert_eq!(LAYOUT.check(&parsed()), Ok(()));
    }

    #[test]
    fn reordered_member_is_reported() {
        const SWAPPED: &[UniformSlot] = &[
            UniformSlot::new(0, "tint", UniformType::Vec4, 0),
            UniformSlot::new(1, "offset", UniformType::Vec2, 24),
            UniformSlot::new(2, "scale", UniformType::F32, 16),
        ];
        let layout = UniformLayout {
            slots: SWAPPED,
            ..LAYOUT
        };
        assert!(matches!(
            layout.check(&parsed()),
            Err(LayoutMismatch::SlotName { index: 1, .. })
        ));
    }

    #[test]
    fn retyped_member_is_reported() {
        const RETYPED: &[UniformSlot] = &[UniformSlot::new(1, "scale", UniformType::Vec2, 16)];
        let layout = UniformLayout {
            slots: RETYPED,
            ..LAYOUT
        };
        assert_eq!(
            layout.check(&parsed()),
            Err(LayoutMismatch::SlotType {
                block: "Params",
                name: "scale",
                expected: UniformType::Vec2,
            })
        );
    }

    #[test]
    fn wrong_offset_is_reported() {
        const SHIFTED: &[UniformSlot] = &[UniformSlot::new(2, "offset", UniformType::Vec2, 20)];
        let layout = UniformLayout {
            slots: SHIFTED,
            ..LAYOUT
        };
        assert!(matches!(
            layout.check(&parsed()),
            Err(LayoutMismatch::SlotOffset {
                expected: 20,
                found: 24,
                ..
            })
        ));
    }

    #[test]
    fn wrong_binding_is_reported() {
        let layout = UniformLayout {
            binding: 0,
            ..LAYOUT
        };
        assert_eq!(
            layout.check(&parsed()),
            Err(LayoutMismatch::MissingBlock {
                group: 0,
                binding: 0
            })
        );
    }

    #[test]
    fn invalid_source_names_the_file() {
        let err = ShaderSource::embedded("broken.frag.wgsl", "fn fs( {")
            .parse()
            .unwrap_err();
        assert!(matches!(
            &err,
            ShaderError::Compile { path, .. } if path.ends_with("broken.frag.wgsl")
        ));
        assert!(err.to_string().contains("broken.frag.wgsl"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ShaderSource::read("shaders/nope.vert.wgsl").unwrap_err();
        assert!(matches!(err, ShaderError::Missing(_)));
    }

    #[test]
    fn abort_policy_returns_compile_errors() {
        let Some(gpu) = crate::testing::gpu() else {
            return;
        };
        let source = ShaderSource::embedded("broken.vert.wgsl", "this is not wgsl");
        let result = ShaderStage::compile(
            &gpu,
            &source,
            StageKind::Vertex,
            &[],
            ShaderFailurePolicy::Abort,
        );
        assert!(matches!(result, Err(ShaderError::Compile { .. })));
    }

    #[test]
    fn continue_policy_keeps_going() {
        let Some(gpu) = crate::testing::gpu() else {
            return;
        };
        let source = ShaderSource::embedded("broken.vert.wgsl", "this is not wgsl");
        let stage = ShaderStage::compile(
            &gpu,
            &source,
            StageKind::Vertex,
            &[],
            ShaderFailurePolicy::Continue,
        )
        .unwrap();
        assert_eq!(stage.entry_point(), "vs");
    }
}
