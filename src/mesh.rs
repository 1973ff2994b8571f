//! Mesh primitives for pass geometry.
//!
//! The renderer itself only ever draws three shapes: a fullscreen triangle
//! (generated in the vertex shader, no buffers), a unit cube viewed from
//! inside (the "room" the cubemap helper and skybox rasterize through), and
//! ordinary outward cubes/planes for demo scenes. Scene geometry proper
//! comes from outside through the [`DrawScene`] seam in the pipeline.

use crate::gpu::GpuContext;
use glam::{Mat4, Quat, Vec3};
use wgpu::util::DeviceExt;

/// A vertex for 3D mesh rendering with position, normal, and texture
/// coordinates. 32 bytes, `#[repr(C)]` for GPU upload.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex3d {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }

    /// Vertex buffer layout: position (loc 0), normal (loc 1), uv (loc 2).
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex3d>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2],
    };
}

/// GPU-resident geometry: vertex and index buffers.
pub struct Mesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl Mesh {
    pub fn new(gpu: &GpuContext, vertices: &[Vertex3d], indices: &[u32]) -> Self {
        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertices"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Indices"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    /// Unit cube centered at the origin, outward-facing.
    pub fn cube(gpu: &GpuContext) -> Self {
        let (vertices, indices) = cube_geometry(false);
        Self::new(gpu, &vertices, &indices)
    }

    /// Unit cube viewed from the inside: inward normals, reversed winding.
    ///
    /// The cubemap helper and the skybox pass draw this so the fragment
    /// shader executes over the whole face interior.
    pub fn room(gpu: &GpuContext) -> Self {
        let (vertices, indices) = cube_geometry(true);
        Self::new(gpu, &vertices, &indices)
    }

    /// UV sphere of unit radius.
    pub fn sphere(gpu: &GpuContext, segments: u32, rings: u32) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let theta = ring as f32 / rings as f32 * std::f32::consts::PI;
            for segment in 0..=segments {
                let phi = segment as f32 / segments as f32 * std::f32::consts::TAU;
                let normal = Vec3::new(
                    theta.sin() * phi.cos(),
                    theta.cos(),
                    theta.sin() * phi.sin(),
                );
                vertices.push(Vertex3d::new(
                    normal.to_array(),
                    normal.to_array(),
                    [
                        segment as f32 / segments as f32,
                        ring as f32 / rings as f32,
                    ],
                ));
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        Self::new(gpu, &vertices, &indices)
    }

    /// Flat XZ plane of the given half-extent, facing +Y.
    pub fn plane(gpu: &GpuContext, size: f32) -> Self {
        let s = size;
        let vertices = vec![
            Vertex3d::new([-s, 0.0, -s], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([s, 0.0, -s], [0.0, 1.0, 0.0], [1.0, 0.0]),
            Vertex3d::new([s, 0.0, s], [0.0, 1.0, 0.0], [1.0, 1.0]),
            Vertex3d::new([-s, 0.0, s], [0.0, 1.0, 0.0], [0.0, 1.0]),
        ];
        let indices = vec![0, 2, 1, 0, 3, 2];
        Self::new(gpu, &vertices, &indices)
    }

    /// Bind buffers and draw all indices.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

fn cube_geometry(inward: bool) -> (Vec<Vertex3d>, Vec<u32>) {
    // Six faces, four vertices each. Normal sign and winding flip for the
    // inside-out room variant.
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]), // +X
        ([-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]), // -X
        ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),  // +Y
        ([0.0, -1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0, 0.0]), // -Y
        ([0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),  // +Z
        ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [-1.0, 0.0, 0.0]), // -Z
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (i, (n, up, right)) in faces.iter().enumerate() {
        let n = Vec3::from_array(*n);
        let up = Vec3::from_array(*up);
        let right = Vec3::from_array(*right);
        let normal = if inward { -n } else { n };

        let corners = [
            n - up - right,
            n - up + right,
            n + up + right,
            n + up - right,
        ];
        let uvs = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
        for (corner, uv) in corners.iter().zip(uvs) {
            vertices.push(Vertex3d::new(
                (*corner * 0.5).to_array(),
                normal.to_array(),
                uv,
            ));
        }

        let base = (i * 4) as u32;
        if inward {
            indices.extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
        } else {
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
    }
    (vertices, indices)
}

/// Position, rotation, and scale for placing meshes in 3D space.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// The model matrix for this transform.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_geometry_has_24_vertices_36_indices() {
        let (vertices, indices) = cube_geometry(false);
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
    }

    #[test]
    fn room_normals_point_inward() {
        let (vertices, _) = cube_geometry(true);
        for v in &vertices {
            let p = Vec3::from_array(v.position);
            let n = Vec3::from_array(v.normal);
            // Inward means the normal opposes the face direction.
            assert!(p.dot(n) < 0.0, "vertex {p:?} has outward normal {n:?}");
        }
    }

    #[test]
    fn cube_vertices_lie_on_unit_cube() {
        let (vertices, _) = cube_geometry(false);
        for v in &vertices {
            let p = Vec3::from_array(v.position);
            assert!((p.abs().max_element() - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn transform_matrix_applies_translation() {
        let t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let m = t.matrix();
        let p = m.transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
    }
}
