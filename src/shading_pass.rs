//! Lighting and composition.
//!
//! Reads the G-buffer with exact texel loads and writes the lit colour into
//! the final-colour target. The pass draws six vertices without a vertex
//! buffer; corners come from the vertex index.

use std::mem::{offset_of, size_of};

use glam::{Mat3, Vec2, Vec3};

use crate::assets::SceneAssets;
use crate::gpu::GpuContext;
use crate::shader::{
    PairLayouts, ShaderError, ShaderFailurePolicy, ShaderPair, UniformLayout, UniformSlot,
    UniformType, link_pipeline,
};
use crate::target::{
    FrameTargets, GBUFFER_ALBEDO, GBUFFER_NORMAL, GBUFFER_POSITION, RenderTargetSet,
};

/// Vertex-stage uniforms. A `mat3x3<f32>` is three 16-byte columns.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadingVertexUniforms {
    pub camera_rotation_inv: [[f32; 4]; 3],
    pub fov: f32,
    pub aspect: f32,
    pub uv_scale: [f32; 2],
}

impl ShadingVertexUniforms {
    pub fn new(camera_rotation_inv: Mat3, fov: f32, aspect: f32, uv_scale: Vec2) -> Self {
        let cols = camera_rotation_inv.to_cols_array_2d();
        Self {
            camera_rotation_inv: cols.map(|[x, y, z]| [x, y, z, 0.0]),
            fov,
            aspect,
            uv_scale: uv_scale.to_array(),
        }
    }
}

/// Fragment-stage uniforms, padded to WGSL's 16-byte `vec3` alignment.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadingFragmentUniforms {
    pub camera_position: [f32; 3],
    _pad0: f32,
    pub light_direction: [f32; 3],
    _pad1: f32,
}

impl ShadingFragmentUniforms {
    pub fn new(camera_position: Vec3, light_direction: Vec3) -> Self {
        Self {
            camera_position: camera_position.to_array(),
            _pad0: 0.0,
            light_direction: light_direction.normalize_or(Vec3::NEG_Y).to_array(),
            _pad1: 0.0,
        }
    }
}

pub const VERTEX_LAYOUT: UniformLayout = UniformLayout {
    block: "ShadingVertexUniforms",
    group: 0,
    binding: 0,
    slots: &[
        UniformSlot::new(
            0,
            "camera_rotation_inv",
            UniformType::Mat3,
            offset_of!(ShadingVertexUniforms, camera_rotation_inv),
        ),
        UniformSlot::new(1, "fov", UniformType::F32, offset_of!(ShadingVertexUniforms, fov)),
        UniformSlot::new(2, "aspect", UniformType::F32, offset_of!(ShadingVertexUniforms, aspect)),
        UniformSlot::new(
            3,
            "uv_scale",
            UniformType::Vec2,
            offset_of!(ShadingVertexUniforms, uv_scale),
        ),
    ],
};

pub const FRAGMENT_LAYOUT: UniformLayout = UniformLayout {
    block: "ShadingFragmentUniforms",
    group: 0,
    binding: 1,
    slots: &[
        UniformSlot::new(
            0,
            "camera_position",
            UniformType::Vec3,
            offset_of!(ShadingFragmentUniforms, camera_position),
        ),
        UniformSlot::new(
            1,
            "light_direction",
            UniformType::Vec3,
            offset_of!(ShadingFragmentUniforms, light_direction),
        ),
    ],
};

pub const LAYOUTS: PairLayouts = PairLayouts {
    vertex: &[VERTEX_LAYOUT],
    fragment: &[FRAGMENT_LAYOUT],
};

pub struct ShadingPass {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    fragment_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    gbuffer_bind_group: wgpu::BindGroup,
}

impl ShadingPass {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderPair,
        assets: &SceneAssets,
        targets: &FrameTargets,
        policy: ShaderFailurePolicy,
    ) -> Result<Self, ShaderError> {
        let device = &gpu.device;

        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shading Vertex Uniforms"),
            size: size_of::<ShadingVertexUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let fragment_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shading Fragment Uniforms"),
            size: size_of::<ShadingFragmentUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Shading Uniform Bind Group Layout"),
                entries: &[
                    uniform_entry(0, wgpu::ShaderStages::VERTEX),
                    uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
                ],
            });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shading Uniform Bind Group"),
            layout: &uniform_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: vertex_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: fragment_buffer.as_entire_binding(),
                },
            ],
        });

        let gbuffer_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("G-buffer Bind Group Layout"),
                entries: &[
                    gbuffer_entry(0),
                    gbuffer_entry(1),
                    gbuffer_entry(2),
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 4,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::Cube,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 5,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let gbuffer = &targets.gbuffer;
        let Some(depth) = gbuffer.depth() else {
            return Err(ShaderError::Link {
                label: "Shading Pipeline".to_owned(),
                message: "G-buffer has no depth attachment to read".to_owned(),
            });
        };
        let gbuffer_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("G-buffer Bind Group"),
            layout: &gbuffer_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(
                        &gbuffer.color(GBUFFER_POSITION).view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(
                        &gbuffer.color(GBUFFER_NORMAL).view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(
                        &gbuffer.color(GBUFFER_ALBEDO).view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&depth.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&assets.skybox.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&assets.skybox.sampler),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shading Pipeline Layout"),
            bind_group_layouts: &[&uniform_bind_group_layout, &gbuffer_bind_group_layout],
            push_constant_ranges: &[],
        });

        let color_targets = targets.final_color.color_formats();
        let pipeline = link_pipeline(
            gpu,
            &wgpu::RenderPipelineDescriptor {
                label: Some("Shading Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shaders.vertex.module,
                    entry_point: Some(shaders.vertex.entry_point()),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shaders.fragment.module,
                    entry_point: Some(shaders.fragment.entry_point()),
                    targets: &color_targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            },
            policy,
        )?;

        Ok(Self {
            pipeline,
            vertex_buffer,
            fragment_buffer,
            uniform_bind_group,
            gbuffer_bind_group,
        })
    }

    /// Clear the final-colour target and shade its top-left `region`.
    pub fn render(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        final_color: &RenderTargetSet,
        vertex: &ShadingVertexUniforms,
        fragment: &ShadingFragmentUniforms,
        region: (u32, u32),
    ) {
        gpu.queue
            .write_buffer(&self.vertex_buffer, 0, bytemuck::bytes_of(vertex));
        gpu.queue
            .write_buffer(&self.fragment_buffer, 0, bytemuck::bytes_of(fragment));

        let color_attachments = final_color.color_attachments();
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shading Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_viewport(0.0, 0.0, region.0 as f32, region.1 as f32, 0.0, 1.0);
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, &self.gbuffer_bind_group, &[]);
        render_pass.draw(0..6, 0..1);
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn gbuffer_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}
