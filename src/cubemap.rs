//! Rendering into all six faces of a cubemap framebuffer.
//!
//! [`CubemapRenderHelper`] draws a shader once per cube face — +X, −X, +Y,
//! −Y, +Z, −Z, in that order — through a fixed 90°, 1:1-aspect projection
//! and the face's precomputed view matrix, rasterizing a unit cube interior
//! so the fragment shader executes over the whole face. An optional target
//! mip redirects all six draws to one mip level of the destination, which
//! is how the specular prefilter walks its chain.

use glam::{Mat4, Vec3};

use crate::error::Result;
use crate::framebuffer::{Framebuffer, LoadAction};
use crate::gpu::GpuContext;
use crate::mesh::Mesh;
use crate::shader::{Shader, UniformValue};

/// Look direction and up vector per face, in face order.
pub const FACE_VIEWS: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),     // +X
    (Vec3::NEG_X, Vec3::NEG_Y), // -X
    (Vec3::Y, Vec3::Z),         // +Y
    (Vec3::NEG_Y, Vec3::NEG_Z), // -Y
    (Vec3::Z, Vec3::NEG_Y),     // +Z
    (Vec3::NEG_Z, Vec3::NEG_Y), // -Z
];

/// View matrix for one cube face, looking out from the origin.
pub fn face_view(face: usize) -> Mat4 {
    let (look, up) = FACE_VIEWS[face];
    Mat4::look_at_rh(Vec3::ZERO, look, up)
}

/// The fixed 90° field-of-view, square-aspect cube face projection.
pub fn face_projection() -> Mat4 {
    Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 10.0)
}

/// Draws a shader into every face of a cubemap-backed framebuffer.
pub struct CubemapRenderHelper {
    room: Mesh,
}

impl CubemapRenderHelper {
    pub fn new(gpu: &GpuContext) -> Self {
        Self {
            room: Mesh::room(gpu),
        }
    }

    /// Render `shader` into all six faces of `framebuffer` at mip 0.
    ///
    /// The shader's uniform block must declare `qrk_faceViewProj` (mat4);
    /// the helper pushes the face's view-projection before each draw.
    pub fn render(
        &self,
        gpu: &GpuContext,
        shader: &mut Shader,
        textures: Option<&wgpu::BindGroup>,
        framebuffer: &Framebuffer,
    ) -> Result<()> {
        self.render_to_mip(gpu, shader, textures, framebuffer, 0)
    }

    /// Render into all six faces at the given mip level.
    ///
    /// Each face is submitted separately so the per-face view-projection
    /// upload lands before its draw executes.
    pub fn render_to_mip(
        &self,
        gpu: &GpuContext,
        shader: &mut Shader,
        textures: Option<&wgpu::BindGroup>,
        framebuffer: &Framebuffer,
        mip: u32,
    ) -> Result<()> {
        let projection = face_projection();

        for face in 0..6u32 {
            let view_proj = projection * face_view(face as usize);
            shader.set_uniform(
                "qrk_faceViewProj",
                UniformValue::Mat4(view_proj.to_cols_array_2d()),
            )?;
            shader.flush_uniforms(gpu);

            let mut encoder = gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Cubemap Face"),
                });
            {
                let mut pass =
                    framebuffer.activate_at(&mut encoder, mip, Some(face), LoadAction::Clear)?;
                if shader.apply(&mut pass, textures) {
                    self.room.draw(&mut pass);
                }
            }
            gpu.queue.submit(std::iter::once(encoder.finish()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_faces_in_axis_order() {
        assert_eq!(FACE_VIEWS.len(), 6);
        assert_eq!(FACE_VIEWS[0].0, Vec3::X);
        assert_eq!(FACE_VIEWS[1].0, Vec3::NEG_X);
        assert_eq!(FACE_VIEWS[2].0, Vec3::Y);
        assert_eq!(FACE_VIEWS[3].0, Vec3::NEG_Y);
        assert_eq!(FACE_VIEWS[4].0, Vec3::Z);
        assert_eq!(FACE_VIEWS[5].0, Vec3::NEG_Z);
    }

    #[test]
    fn up_vectors_are_perpendicular_to_look() {
        for (look, up) in FACE_VIEWS {
            assert!(look.dot(up).abs() < 1e-6);
            assert!((look.length() - 1.0).abs() < 1e-6);
            assert!((up.length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn face_views_look_down_negative_z() {
        // A view matrix maps its look direction into -Z (right-handed).
        for face in 0..6 {
            let (look, _) = FACE_VIEWS[face];
            let transformed = face_view(face).transform_vector3(look);
            assert!((transformed - Vec3::NEG_Z).length() < 1e-5);
        }
    }

    #[test]
    fn projection_is_square_90_degrees() {
        let proj = face_projection();
        let cols = proj.to_cols_array_2d();
        // tan(45°) == 1 → unit focal terms in both axes.
        assert!((cols[0][0] - 1.0).abs() < 1e-6);
        assert!((cols[1][1] - 1.0).abs() < 1e-6);
    }
}
