//! Vertex format and the two meshes the scene draws.
//!
//! | Attribute | Format    | Offset | Shader Location |
//! |-----------|-----------|--------|-----------------|
//! | position  | Float32x3 | 0      | 0               |
//! | color     | Float32x3 | 12     | 1               |
//! | normal    | Float32x3 | 24     | 2               |
//! | uv        | Float32x2 | 36     | 3               |

use crate::gpu::GpuContext;

/// A mesh vertex with a per-vertex tint.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    /// Multiplied with the diffuse texture in the geometry pass.
    pub color: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // color
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            // normal
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 36,
                shader_location: 3,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };

    pub const fn new(position: [f32; 3], color: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            color,
            normal,
            uv,
        }
    }
}

const RED: [f32; 3] = [1.0, 0.0, 0.0];
const GREEN: [f32; 3] = [0.0, 1.0, 0.0];
const BLUE: [f32; 3] = [0.0, 0.0, 1.0];
const MAGENTA: [f32; 3] = [1.0, 0.0, 1.0];

/// Unit cube centered at the origin, 4 vertices per face so every face has
/// its own normal. Faces in order -Z, +X, +Z, -X, +Y, -Y.
#[rustfmt::skip]
pub const CUBE_VERTICES: [Vertex; 24] = [
    Vertex::new([-0.5,  0.5, -0.5], RED,     [ 0.0,  0.0, -1.0], [0.0, 0.0]),
    Vertex::new([ 0.5,  0.5, -0.5], GREEN,   [ 0.0,  0.0, -1.0], [1.0, 0.0]),
    Vertex::new([ 0.5, -0.5, -0.5], BLUE,    [ 0.0,  0.0, -1.0], [1.0, 1.0]),
    Vertex::new([-0.5, -0.5, -0.5], MAGENTA, [ 0.0,  0.0, -1.0], [0.0, 1.0]),

    Vertex::new([ 0.5,  0.5, -0.5], RED,     [ 1.0,  0.0,  0.0], [0.0, 0.0]),
    Vertex::new([ 0.5,  0.5,  0.5], GREEN,   [ 1.0,  0.0,  0.0], [1.0, 0.0]),
    Vertex::new([ 0.5, -0.5,  0.5], BLUE,    [ 1.0,  0.0,  0.0], [1.0, 1.0]),
    Vertex::new([ 0.5, -0.5, -0.5], MAGENTA, [ 1.0,  0.0,  0.0], [0.0, 1.0]),

    Vertex::new([ 0.5,  0.5,  0.5], GREEN,   [ 0.0,  0.0,  1.0], [1.0, 0.0]),
    Vertex::new([-0.5,  0.5,  0.5], RED,     [ 0.0,  0.0,  1.0], [0.0, 0.0]),
    Vertex::new([-0.5, -0.5,  0.5], MAGENTA, [ 0.0,  0.0,  1.0], [0.0, 1.0]),
    Vertex::new([ 0.5, -0.5,  0.5], BLUE,    [ 0.0,  0.0,  1.0], [1.0, 1.0]),

    Vertex::new([-0.5,  0.5,  0.5], GREEN,   [-1.0,  0.0,  0.0], [1.0, 0.0]),
    Vertex::new([-0.5,  0.5, -0.5], RED,     [-1.0,  0.0,  0.0], [0.0, 0.0]),
    Vertex::new([-0.5, -0.5, -0.5], MAGENTA, [-1.0,  0.0,  0.0], [0.0, 1.0]),
    Vertex::new([-0.5, -0.5,  0.5], BLUE,    [-1.0,  0.0,  0.0], [1.0, 1.0]),

    Vertex::new([-0.5,  0.5,  0.5], RED,     [ 0.0,  1.0,  0.0], [0.0, 0.0]),
    Vertex::new([ 0.5,  0.5,  0.5], GREEN,   [ 0.0,  1.0,  0.0], [1.0, 0.0]),
    Vertex::new([ 0.5,  0.5, -0.5], BLUE,    [ 0.0,  1.0,  0.0], [1.0, 1.0]),
    Vertex::new([-0.5,  0.5, -0.5], MAGENTA, [ 0.0,  1.0,  0.0], [0.0, 1.0]),

    Vertex::new([ 0.5, -0.5,  0.5], GREEN,   [ 0.0, -1.0,  0.0], [1.0, 0.0]),
    Vertex::new([-0.5, -0.5,  0.5], RED,     [ 0.0, -1.0,  0.0], [0.0, 0.0]),
    Vertex::new([-0.5, -0.5, -0.5], MAGENTA, [ 0.0, -1.0,  0.0], [0.0, 1.0]),
    Vertex::new([ 0.5, -0.5, -0.5], BLUE,    [ 0.0, -1.0,  0.0], [1.0, 1.0]),
];

#[rustfmt::skip]
pub const CUBE_INDICES: [u16; 36] = [
     0,  1,  2,  2,  3,  0,
     4,  5,  6,  6,  7,  4,
     8,  9, 10, 10, 11,  8,
    12, 13, 14, 14, 15, 12,
    16, 17, 18, 18, 19, 16,
    20, 21, 22, 22, 23, 20,
];

/// Unit quad in the XZ plane facing +Y.
#[rustfmt::skip]
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, 0.0,  0.5], RED,     [0.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([ 0.5, 0.0,  0.5], GREEN,   [0.0, 1.0, 0.0], [1.0, 0.0]),
    Vertex::new([ 0.5, 0.0, -0.5], BLUE,    [0.0, 1.0, 0.0], [1.0, 1.0]),
    Vertex::new([-0.5, 0.0, -0.5], MAGENTA, [0.0, 1.0, 0.0], [0.0, 1.0]),
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// GPU-resident geometry. Triangles wind counter-clockwise when seen from
/// the front.
#[derive(Debug)]
pub struct Mesh {
    pub(crate) vertex_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
    pub(crate) index_count: u32,
}

impl Mesh {
    pub fn new(gpu: &GpuContext, label: &str, vertices: &[Vertex], indices: &[u16]) -> Self {
        use wgpu::util::DeviceExt;

        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Vertex Buffer")),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Index Buffer")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    pub fn cube(gpu: &GpuContext) -> Self {
        Self::new(gpu, "Cube", &CUBE_VERTICES, &CUBE_INDICES)
    }

    pub fn quad(gpu: &GpuContext) -> Self {
        Self::new(gpu, "Quad", &QUAD_VERTICES, &QUAD_INDICES)
    }

    pub const INDEX_FORMAT: wgpu::IndexFormat = wgpu::IndexFormat::Uint16;
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn layout_matches_struct() {
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
        assert_eq!(std::mem::offset_of!(Vertex, color), 12);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 24);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 36);
    }

    /// Every triangle must wind counter-clockwise around its outward normal.
    fn assert_front_faces_out(vertices: &[Vertex], indices: &[u16]) {
        for tri in indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from(vertices[tri[i] as usize].position));
            let winding = (b - a).cross(c - a).normalize();
            let normal = Vec3::from(vertices[tri[0] as usize].normal);
            assert!(winding.abs_diff_eq(normal, 1e-5), "triangle {tri:?}");
        }
    }

    #[test]
    fn cube_faces_point_outwards() {
        assert_front_faces_out(&CUBE_VERTICES, &CUBE_INDICES);
        for v in CUBE_VERTICES {
            assert!(Vec3::from(v.position).dot(Vec3::from(v.normal)) > 0.0);
        }
    }

    #[test]
    fn quad_faces_up() {
        assert_front_faces_out(&QUAD_VERTICES, &QUAD_INDICES);
    }
}
