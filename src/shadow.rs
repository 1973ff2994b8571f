//! Directional-light shadow mapping.
//!
//! A single depth-only framebuffer rendered from the light's orthographic
//! view. The pipeline re-draws the scene into it at the start of the frame;
//! the lighting pass samples the map through the texture registry.

use glam::{Mat4, Vec3};

use crate::error::Result;
use crate::formats::BufferType;
use crate::framebuffer::Framebuffer;
use crate::gpu::GpuContext;
use crate::mesh::Vertex3d;
use crate::shader::{DepthConfig, Shader, ShaderConfig, UniformLayout, UniformType};
use crate::texture::{TextureHandle, TextureParams};

/// Default shadow map resolution.
pub const SHADOW_MAP_SIZE: u32 = 2048;

/// A directional light with an orthographic shadow frustum.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    /// World-space direction the light travels (not toward the light).
    pub direction: Vec3,
    pub color: Vec3,
    /// Half-extent of the orthographic shadow volume.
    pub shadow_extent: f32,
    /// Distance of the light origin from the frustum center.
    pub shadow_distance: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.3).normalize(),
            color: Vec3::splat(3.0),
            shadow_extent: 20.0,
            shadow_distance: 30.0,
        }
    }
}

impl DirectionalLight {
    /// The light's view-projection over the shadow volume centered on
    /// `center`.
    pub fn view_projection(&self, center: Vec3) -> Mat4 {
        let dir = self.direction.normalize();
        let up = if dir.x.abs() < 1e-4 && dir.z.abs() < 1e-4 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let eye = center - dir * self.shadow_distance;
        let view = Mat4::look_at_rh(eye, center, up);
        let e = self.shadow_extent;
        let proj = Mat4::orthographic_rh(-e, e, -e, e, 0.1, self.shadow_distance * 2.0);
        proj * view
    }
}

/// The shadow-map framebuffer and its depth-only shader.
pub struct ShadowPass {
    framebuffer: Framebuffer,
    shader: Shader,
}

impl ShadowPass {
    /// `model_layout` is the per-draw uniform layout shared with the
    /// geometry pass (bind group 2).
    pub fn new(gpu: &GpuContext, model_layout: wgpu::BindGroupLayout) -> Result<Self> {
        let mut framebuffer = Framebuffer::new(SHADOW_MAP_SIZE, SHADOW_MAP_SIZE, "Shadow Map");
        // Depth bindings are non-filtering; the sampler must match.
        let params = TextureParams {
            min_filter: wgpu::FilterMode::Nearest,
            mag_filter: wgpu::FilterMode::Nearest,
            mip_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        };
        framebuffer.attach_texture(gpu, BufferType::Depth, &params)?;

        let shader = Shader::new(
            gpu,
            include_str!("shaders/shadow.wgsl"),
            UniformLayout::builder()
                .field("qrk_lightViewProj", UniformType::Mat4)
                .build(),
            &[],
            vec![model_layout],
            ShaderConfig {
                label: "Shadow".to_string(),
                vertex_layout: Some(Vertex3d::LAYOUT),
                target_formats: Vec::new(),
                blend: None,
                depth: Some(DepthConfig {
                    format: BufferType::Depth.texture_format(),
                    write: true,
                    compare: wgpu::CompareFunction::LessEqual,
                }),
                polygon_mode: wgpu::PolygonMode::Fill,
                cull_mode: Some(wgpu::Face::Back),
            },
        );

        Ok(Self {
            framebuffer,
            shader,
        })
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn shader(&self) -> &Shader {
        &self.shader
    }

    pub fn shader_mut(&mut self) -> &mut Shader {
        &mut self.shader
    }

    /// Handle to the depth map for the lighting registry.
    pub fn map_handle(&self) -> Result<TextureHandle> {
        self.framebuffer.depth_attachment()?.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_frustum_centers_on_target() {
        let light = DirectionalLight::default();
        let vp = light.view_projection(Vec3::ZERO);
        // The frustum center projects to the middle of the clip volume.
        let clip = vp * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4);
        assert!(ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn straight_down_light_still_has_a_valid_basis() {
        let light = DirectionalLight {
            direction: Vec3::NEG_Y,
            ..Default::default()
        };
        let vp = light.view_projection(Vec3::ZERO);
        assert!(vp.is_finite());
    }

    #[test]
    fn points_beyond_the_extent_fall_outside_the_frustum() {
        let light = DirectionalLight {
            direction: Vec3::NEG_Y,
            shadow_extent: 10.0,
            ..Default::default()
        };
        let vp = light.view_projection(Vec3::ZERO);
        let clip = vp * Vec3::new(50.0, 0.0, 0.0).extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() > 1.0);
    }
}
