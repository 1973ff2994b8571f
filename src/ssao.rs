//! Screen-space ambient occlusion.
//!
//! Kernel generation rejection-samples points into the unit hemisphere and
//! rescales them so samples cluster toward the fragment, which is where
//! occlusion perceptually matters. A small tiled texture of random 2D
//! rotation vectors (repeat wrap, no filtering) rotates the kernel per pixel
//! to break up banding; the blur pass then averages exactly one noise
//! period. Occlusion is computed into a raw buffer and blurred into a
//! second buffer that the lighting pass samples.

use rand::Rng;

use crate::binding::TextureBinder;
use crate::error::Result;
use crate::formats::BufferType;
use crate::framebuffer::{Framebuffer, LoadAction};
use crate::gpu::GpuContext;
use crate::shader::{Shader, ShaderConfig, UniformLayout, UniformType, UniformValue};
use crate::texture::{f32_to_f16_bits, Texture, TextureHandle, TextureKind, TextureParams};

/// SSAO tuning parameters.
#[derive(Debug, Clone)]
pub struct SsaoConfig {
    /// Number of hemisphere samples per fragment.
    pub kernel_size: u32,
    /// Side length of the tiled rotation-noise texture.
    pub noise_size: u32,
    /// View-space sampling radius.
    pub radius: f32,
    /// Depth bias against self-occlusion acne.
    pub bias: f32,
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            kernel_size: 64,
            noise_size: 4,
            radius: 0.5,
            bias: 0.025,
        }
    }
}

/// Scale factor for kernel sample `i` of `n`: a quadratic lerp from 0.1 to
/// 1.0 so early samples sit close to the fragment.
pub fn kernel_scale(index: u32, kernel_size: u32) -> f32 {
    let t = index as f32 / kernel_size as f32;
    0.1 + 0.9 * t * t
}

/// Generate `kernel_size` tangent-space hemisphere samples, packed as vec4
/// for GPU alignment.
///
/// Each candidate is drawn from `[-1,1]² × [0,1]`, rejected if it falls
/// outside the unit sphere, normalized, shrunk by a random factor, then
/// scaled by [`kernel_scale`]. Every result has length ≤ 1.
pub fn generate_kernel(kernel_size: u32, rng: &mut impl Rng) -> Vec<[f32; 4]> {
    let mut samples = Vec::with_capacity(kernel_size as usize);
    let mut i = 0u32;
    while i < kernel_size {
        let x: f32 = rng.gen_range(-1.0..=1.0);
        let y: f32 = rng.gen_range(-1.0..=1.0);
        let z: f32 = rng.gen_range(0.0..=1.0);
        let len = (x * x + y * y + z * z).sqrt();
        if len > 1.0 || len < 1e-6 {
            continue;
        }

        let magnitude: f32 = rng.gen_range(0.0..=1.0);
        let scale = kernel_scale(i, kernel_size) * magnitude / len;
        samples.push([x * scale, y * scale, z * scale, 0.0]);
        i += 1;
    }
    samples
}

/// Generate the `size`×`size` tile of random rotation vectors (z = 0).
pub fn generate_noise(size: u32, rng: &mut impl Rng) -> Vec<[f32; 4]> {
    (0..size * size)
        .map(|_| {
            [
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
                0.0,
                0.0,
            ]
        })
        .collect()
}

/// The two-buffer SSAO pass pair.
pub struct SsaoPass {
    config: SsaoConfig,
    raw_buffer: Framebuffer,
    blurred_buffer: Framebuffer,
    noise: Texture,
    ssao_shader: Shader,
    blur_shader: Shader,
    ssao_bind_group: wgpu::BindGroup,
    blur_bind_group: wgpu::BindGroup,
}

impl SsaoPass {
    /// Build kernels, noise, buffers, and shaders.
    ///
    /// `position` and `normal` are the G-Buffer attachments the occlusion
    /// shader consumes; their units are claimed through a local binder in
    /// registration order (position, normal, noise).
    pub fn new(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        position: TextureHandle,
        normal: TextureHandle,
        config: SsaoConfig,
    ) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let kernel = generate_kernel(config.kernel_size, &mut rng);
        let noise_data = generate_noise(config.noise_size, &mut rng);

        let noise_halfs: Vec<u16> = noise_data
            .iter()
            .flatten()
            .map(|&v| f32_to_f16_bits(v))
            .collect();
        let noise = Texture::new(
            gpu,
            TextureKind::D2,
            config.noise_size,
            config.noise_size,
            wgpu::TextureFormat::Rgba16Float,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            &TextureParams::nearest_tiled(),
            "SSAO Noise",
        )?;
        gpu.queue.write_texture(
            noise.raw().as_image_copy(),
            bytemuck::cast_slice(&noise_halfs),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(config.noise_size * 8),
                rows_per_image: Some(config.noise_size),
            },
            wgpu::Extent3d {
                width: config.noise_size,
                height: config.noise_size,
                depth_or_array_layers: 1,
            },
        );

        let mut raw_buffer = Framebuffer::new(width, height, "SSAO Raw");
        raw_buffer.attach_texture(gpu, BufferType::Grayscale, &TextureParams::default())?;
        let mut blurred_buffer = Framebuffer::new(width, height, "SSAO Blurred");
        blurred_buffer.attach_texture(gpu, BufferType::Grayscale, &TextureParams::default())?;

        // Occlusion shader inputs, in registration order.
        let mut binder = TextureBinder::new();
        binder.bind("qrk_gPosition", position);
        binder.bind("qrk_gNormal", normal);
        binder.bind("qrk_ssaoNoise", noise.handle());

        let ssao_uniforms = UniformLayout::builder()
            .field("qrk_proj", UniformType::Mat4)
            .field("qrk_ssaoKernel", UniformType::Vec4Array(64))
            .field("qrk_noiseScale", UniformType::Vec2)
            .field("qrk_radius", UniformType::Float)
            .field("qrk_bias", UniformType::Float)
            .field("qrk_kernelSize", UniformType::Int)
            .build();

        let mut ssao_shader = Shader::new(
            gpu,
            include_str!("shaders/ssao.wgsl"),
            ssao_uniforms,
            &binder.layout_entries(),
            Vec::new(),
            ShaderConfig::screen("SSAO", BufferType::Grayscale.texture_format()),
        );
        let ssao_bind_group =
            binder.create_bind_group(&gpu.device, ssao_shader.texture_layout(), "SSAO Inputs");

        ssao_shader.set_uniform("qrk_ssaoKernel", UniformValue::Vec4Array(kernel))?;
        ssao_shader.set_uniform(
            "qrk_noiseScale",
            UniformValue::Vec2([
                width as f32 / config.noise_size as f32,
                height as f32 / config.noise_size as f32,
            ]),
        )?;
        ssao_shader.set_uniform("qrk_radius", UniformValue::Float(config.radius))?;
        ssao_shader.set_uniform("qrk_bias", UniformValue::Float(config.bias))?;
        ssao_shader.set_uniform(
            "qrk_kernelSize",
            UniformValue::Int(config.kernel_size as i32),
        )?;

        let mut blur_binder = TextureBinder::new();
        blur_binder.bind("qrk_ssaoRaw", raw_buffer.color_attachment(0)?.handle()?);

        let blur_uniforms = UniformLayout::builder()
            .field("qrk_noiseTileSize", UniformType::Int)
            .build();

        let mut blur_shader = Shader::new(
            gpu,
            include_str!("shaders/ssao_blur.wgsl"),
            blur_uniforms,
            &blur_binder.layout_entries(),
            Vec::new(),
            ShaderConfig::screen("SSAO Blur", BufferType::Grayscale.texture_format()),
        );
        let blur_bind_group = blur_binder.create_bind_group(
            &gpu.device,
            blur_shader.texture_layout(),
            "SSAO Blur Inputs",
        );
        blur_shader.set_uniform(
            "qrk_noiseTileSize",
            UniformValue::Int(config.noise_size as i32),
        )?;

        Ok(Self {
            config,
            raw_buffer,
            blurred_buffer,
            noise,
            ssao_shader,
            blur_shader,
            ssao_bind_group,
            blur_bind_group,
        })
    }

    /// Compute raw occlusion, then blur it into the buffer the lighting
    /// pass samples.
    pub fn draw(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        projection: glam::Mat4,
    ) -> Result<()> {
        self.ssao_shader.set_uniform(
            "qrk_proj",
            UniformValue::Mat4(projection.to_cols_array_2d()),
        )?;
        self.ssao_shader.flush_uniforms(gpu);
        self.blur_shader.flush_uniforms(gpu);

        {
            let mut pass = self.raw_buffer.activate(encoder, LoadAction::Clear)?;
            self.ssao_shader
                .draw_fullscreen(&mut pass, Some(&self.ssao_bind_group));
        }
        {
            let mut pass = self.blurred_buffer.activate(encoder, LoadAction::Clear)?;
            self.blur_shader
                .draw_fullscreen(&mut pass, Some(&self.blur_bind_group));
        }
        Ok(())
    }

    /// Handle to the blurred occlusion buffer.
    pub fn blurred_handle(&self) -> Result<TextureHandle> {
        self.blurred_buffer.color_attachment(0)?.handle()
    }

    /// The noise texture (tiled rotation vectors).
    pub fn noise(&self) -> &Texture {
        &self.noise
    }

    pub fn config(&self) -> &SsaoConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn kernel_samples_stay_inside_unit_hemisphere() {
        let mut rng = StdRng::seed_from_u64(7);
        let kernel = generate_kernel(64, &mut rng);
        assert_eq!(kernel.len(), 64);
        for sample in &kernel {
            let len = (sample[0] * sample[0] + sample[1] * sample[1] + sample[2] * sample[2])
                .sqrt();
            assert!(len <= 1.0 + 1e-6, "sample length {len} exceeds 1");
            assert!(sample[2] >= 0.0, "sample points below the hemisphere");
            assert_eq!(sample[3], 0.0);
        }
    }

    #[test]
    fn kernel_scale_is_monotonically_non_decreasing() {
        let n = 64;
        let mut prev = 0.0;
        for i in 0..n {
            let scale = kernel_scale(i, n);
            assert!(scale >= prev, "scale decreased at sample {i}");
            prev = scale;
        }
    }

    #[test]
    fn kernel_scale_spans_tenth_to_one() {
        assert!((kernel_scale(0, 64) - 0.1).abs() < 1e-6);
        let last = kernel_scale(63, 64);
        assert!(last < 1.0 && last > 0.95);
    }

    #[test]
    fn noise_vectors_are_planar() {
        let mut rng = StdRng::seed_from_u64(11);
        let noise = generate_noise(4, &mut rng);
        assert_eq!(noise.len(), 16);
        for v in &noise {
            assert_eq!(v[2], 0.0);
            assert!(v[0] >= -1.0 && v[0] <= 1.0);
            assert!(v[1] >= -1.0 && v[1] <= 1.0);
        }
    }

    #[test]
    fn default_config_matches_the_classic_setup() {
        let config = SsaoConfig::default();
        assert_eq!(config.kernel_size, 64);
        assert_eq!(config.noise_size, 4);
    }
}
