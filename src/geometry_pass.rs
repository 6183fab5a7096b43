//! G-buffer population.
//!
//! Draws every [`DrawItem`] of the frame into the G-buffer's position, normal
//! and albedo outputs with depth testing. Per-frame matrices live in one
//! uniform buffer; per-draw matrices are packed into a dynamic-offset buffer
//! so every draw of the pass keeps its own slot.

use std::mem::{offset_of, size_of};
use std::num::NonZeroU64;

use glam::Mat4;

use crate::assets::SceneAssets;
use crate::gpu::GpuContext;
use crate::mesh::{Mesh, Vertex};
use crate::scene::{DrawItem, MeshKind};
use crate::shader::{
    PairLayouts, ShaderError, ShaderFailurePolicy, ShaderPair, UniformLayout, UniformSlot,
    UniformType, link_pipeline,
};
use crate::target::RenderTargetSet;

/// Projection and view, written once per frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
}

impl FrameUniforms {
    pub fn new(projection: Mat4, view: Mat4) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
        }
    }
}

/// Model transform of a single draw.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of `model`, so non-uniform scales keep normals
    /// perpendicular.
    pub normal_matrix: [[f32; 4]; 4],
}

impl DrawUniforms {
    pub fn new(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
        }
    }
}

pub const FRAME_LAYOUT: UniformLayout = UniformLayout {
    block: "FrameUniforms",
    group: 0,
    binding: 0,
    slots: &[
        UniformSlot::new(0, "projection", UniformType::Mat4, offset_of!(FrameUniforms, projection)),
        UniformSlot::new(1, "view", UniformType::Mat4, offset_of!(FrameUniforms, view)),
    ],
};

pub const DRAW_LAYOUT: UniformLayout = UniformLayout {
    block: "DrawUniforms",
    group: 1,
    binding: 0,
    slots: &[
        UniformSlot::new(0, "model", UniformType::Mat4, offset_of!(DrawUniforms, model)),
        UniformSlot::new(
            1,
            "normal_matrix",
            UniformType::Mat4,
            offset_of!(DrawUniforms, normal_matrix),
        ),
    ],
};

pub const LAYOUTS: PairLayouts = PairLayouts {
    vertex: &[FRAME_LAYOUT, DRAW_LAYOUT],
    fragment: &[],
};

/// Initial number of per-draw slots.
const INITIAL_DRAW_SLOTS: usize = 8;

pub struct GeometryPass {
    pipeline: wgpu::RenderPipeline,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    draw_bind_group_layout: wgpu::BindGroupLayout,
    draw_buffer: wgpu::Buffer,
    draw_bind_group: wgpu::BindGroup,
    draw_stride: u64,
    draw_slots: usize,
    material_bind_group: wgpu::BindGroup,
    cube: Mesh,
    quad: Mesh,
}

impl GeometryPass {
    pub fn new(
        gpu: &GpuContext,
        shaders: &ShaderPair,
        assets: &SceneAssets,
        gbuffer: &RenderTargetSet,
        policy: ShaderFailurePolicy,
    ) -> Result<Self, ShaderError> {
        let device = &gpu.device;

        // Frame uniforms (group 0)
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniforms"),
            size: size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let frame_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Frame Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &frame_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        // Draw uniforms (group 1), one aligned slot per draw
        let draw_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Draw Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(size_of::<DrawUniforms>() as u64),
                    },
                    count: None,
                }],
            });

        let draw_stride = wgpu::util::align_to(
            size_of::<DrawUniforms>() as u64,
            u64::from(device.limits().min_uniform_buffer_offset_alignment),
        );
        let (draw_buffer, draw_bind_group) =
            Self::create_draw_slots(gpu, &draw_bind_group_layout, draw_stride, INITIAL_DRAW_SLOTS);

        // Material textures (group 2)
        let material_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Material Bind Group Layout"),
                entries: &[
                    material_texture_entry(0),
                    material_texture_entry(1),
                    material_texture_entry(2),
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let material_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Bind Group"),
            layout: &material_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&assets.diffuse.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&assets.specular.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&assets.normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&assets.diffuse.sampler),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Geometry Pipeline Layout"),
            bind_group_layouts: &[
                &frame_bind_group_layout,
                &draw_bind_group_layout,
                &material_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        let targets = gbuffer.color_formats();
        let depth_format = gbuffer
            .depth()
            .map(|depth| depth.format())
            .unwrap_or(crate::target::DEPTH_FORMAT);

        let pipeline = link_pipeline(
            gpu,
            &wgpu::RenderPipelineDescriptor {
                label: Some("Geometry Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shaders.vertex.module,
                    entry_point: Some(shaders.vertex.entry_point()),
                    buffers: &[Vertex::LAYOUT],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shaders.fragment.module,
                    entry_point: Some(shaders.fragment.entry_point()),
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: Some(wgpu::Face::Back),
                    front_face: wgpu::FrontFace::Ccw,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: depth_format,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            },
            policy,
        )?;

        Ok(Self {
            pipeline,
            frame_buffer,
            frame_bind_group,
            draw_bind_group_layout,
            draw_buffer,
            draw_bind_group,
            draw_stride,
            draw_slots: INITIAL_DRAW_SLOTS,
            material_bind_group,
            cube: Mesh::cube(gpu),
            quad: Mesh::quad(gpu),
        })
    }

    fn create_draw_slots(
        gpu: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        slots: usize,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniforms"),
            size: stride * slots as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(size_of::<DrawUniforms>() as u64),
                }),
            }],
        });

        (buffer, bind_group)
    }

    /// Grow the per-draw buffer to hold at least `draws` slots.
    fn reserve(&mut self, gpu: &GpuContext, draws: usize) {
        if draws <= self.draw_slots {
            return;
        }
        let slots = draws.next_power_of_two();
        log::debug!("growing draw uniform buffer to {slots} slots");
        let (buffer, bind_group) =
            Self::create_draw_slots(gpu, &self.draw_bind_group_layout, self.draw_stride, slots);
        self.draw_buffer = buffer;
        self.draw_bind_group = bind_group;
        self.draw_slots = slots;
    }

    pub fn draw_slots(&self) -> usize {
        self.draw_slots
    }

    fn mesh(&self, kind: MeshKind) -> &Mesh {
        match kind {
            MeshKind::Cube => &self.cube,
            MeshKind::Quad => &self.quad,
        }
    }

    /// Clear the G-buffer and draw `draws` into its top-left `region`.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        gbuffer: &RenderTargetSet,
        frame: &FrameUniforms,
        draws: &[DrawItem],
        region: (u32, u32),
    ) {
        self.reserve(gpu, draws.len());

        gpu.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(frame));

        let stride = self.draw_stride as usize;
        let mut staging = vec![0u8; stride * draws.len()];
        for (slot, draw) in staging.chunks_exact_mut(stride).zip(draws) {
            let uniforms = DrawUniforms::new(draw.model);
            slot[..size_of::<DrawUniforms>()].copy_from_slice(bytemuck::bytes_of(&uniforms));
        }
        if !staging.is_empty() {
            gpu.queue.write_buffer(&self.draw_buffer, 0, &staging);
        }

        let color_attachments = gbuffer.color_attachments();
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Geometry Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: gbuffer.depth_attachment(),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_viewport(0.0, 0.0, region.0 as f32, region.1 as f32, 0.0, 1.0);
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.frame_bind_group, &[]);
        render_pass.set_bind_group(2, &self.material_bind_group, &[]);

        for (i, draw) in draws.iter().enumerate() {
            let mesh = self.mesh(draw.mesh);
            let offset = (i as u64 * self.draw_stride) as u32;
            render_pass.set_bind_group(1, &self.draw_bind_group, &[offset]);
            render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            render_pass.set_index_buffer(mesh.index_buffer.slice(..), Mesh::INDEX_FORMAT);
            render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        log::trace!("geometry pass: {} draws", draws.len());
    }
}

fn material_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}
