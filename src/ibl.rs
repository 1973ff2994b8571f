//! Image-based lighting precomputation.
//!
//! Four stages, re-run in order whenever the active environment changes:
//!
//! 1. equirectangular → cubemap conversion (plus a mip chain for the
//!    skybox's benefit),
//! 2. diffuse irradiance convolution into a small cubemap,
//! 3. GGX specular prefiltering across the destination mip chain, mapping
//!    mip `m` to roughness `m / (N - 1)`,
//! 4. the BRDF integration LUT — environment-independent, computed exactly
//!    once at startup and never again.
//!
//! Stages 2 and 3 sample the cubemap stage 1 produced, so the ordering is
//! load-bearing. All cubemap stages run through the
//! [`CubemapRenderHelper`].

use crate::binding::TextureBinder;
use crate::cubemap::CubemapRenderHelper;
use crate::error::Result;
use crate::formats::BufferType;
use crate::framebuffer::{Framebuffer, LoadAction};
use crate::gpu::GpuContext;
use crate::mesh::Vertex3d;
use crate::shader::{Shader, ShaderConfig, UniformLayout, UniformType, UniformValue};
use crate::texture::{MipmapGenerator, Texture, TextureHandle, TextureParams};

/// Environment cubemap face size.
pub const ENVIRONMENT_SIZE: u32 = 512;
/// Irradiance face size; small because the convolution is a low-pass by
/// construction.
pub const IRRADIANCE_SIZE: u32 = 32;
/// Prefiltered environment base face size.
pub const PREFILTER_SIZE: u32 = 128;
/// Mip levels in the prefiltered chain (one roughness step per level).
pub const PREFILTER_MIP_LEVELS: u32 = 5;
/// BRDF LUT side length.
pub const BRDF_LUT_SIZE: u32 = 512;

/// Roughness assigned to mip `mip` of an `mip_count`-level prefiltered
/// chain: linear from 0 at the sharpest mip to 1 at the roughest.
pub fn prefilter_roughness(mip: u32, mip_count: u32) -> f32 {
    if mip_count <= 1 {
        return 0.0;
    }
    mip as f32 / (mip_count - 1) as f32
}

/// The cubemaps and LUT the lighting pass samples.
pub struct IblMaps {
    environment: Framebuffer,
    irradiance: Framebuffer,
    prefiltered: Framebuffer,
    brdf_lut: Framebuffer,
}

impl IblMaps {
    fn new(gpu: &GpuContext) -> Result<Self> {
        let mut environment = Framebuffer::new(ENVIRONMENT_SIZE, ENVIRONMENT_SIZE, "Environment");
        environment.attach_texture(gpu, BufferType::CubemapHdr, &TextureParams::mipmapped())?;

        let mut irradiance = Framebuffer::new(IRRADIANCE_SIZE, IRRADIANCE_SIZE, "Irradiance");
        irradiance.attach_texture(gpu, BufferType::CubemapHdr, &TextureParams::default())?;

        let mut prefiltered = Framebuffer::new(PREFILTER_SIZE, PREFILTER_SIZE, "Prefiltered Env");
        let mut prefilter_params = TextureParams::mipmapped();
        prefilter_params.max_num_mips = Some(PREFILTER_MIP_LEVELS);
        prefiltered.attach_texture(gpu, BufferType::CubemapHdr, &prefilter_params)?;

        let mut brdf_lut = Framebuffer::new(BRDF_LUT_SIZE, BRDF_LUT_SIZE, "BRDF LUT");
        brdf_lut.attach_texture(gpu, BufferType::ColorSnorm, &TextureParams::default())?;

        Ok(Self {
            environment,
            irradiance,
            prefiltered,
            brdf_lut,
        })
    }

    pub fn environment_handle(&self) -> Result<TextureHandle> {
        self.environment.color_attachment(0)?.handle()
    }

    pub fn irradiance_handle(&self) -> Result<TextureHandle> {
        self.irradiance.color_attachment(0)?.handle()
    }

    pub fn prefiltered_handle(&self) -> Result<TextureHandle> {
        self.prefiltered.color_attachment(0)?.handle()
    }

    pub fn brdf_lut_handle(&self) -> Result<TextureHandle> {
        self.brdf_lut.color_attachment(0)?.handle()
    }

    /// The highest sampleable LOD of the prefiltered chain, pushed to the
    /// lighting shader as `qrk_ggxPrefilteredEnvMapMaxLOD`.
    pub fn max_prefilter_lod(&self) -> Result<f32> {
        Ok((self.prefiltered.color_attachment(0)?.mip_count() - 1) as f32)
    }
}

/// Owns the IBL shaders and drives the four stages.
pub struct IblBaker {
    helper: CubemapRenderHelper,
    mip_generator: MipmapGenerator,
    equirect_shader: Shader,
    irradiance_shader: Shader,
    prefilter_shader: Shader,
}

impl IblBaker {
    /// Create the baker and its maps, computing the BRDF LUT immediately —
    /// it depends on nothing and is never recomputed.
    pub fn new(gpu: &GpuContext) -> Result<(Self, IblMaps)> {
        let maps = IblMaps::new(gpu)?;

        let cube_uniforms = || {
            UniformLayout::builder()
                .field("qrk_faceViewProj", UniformType::Mat4)
        };
        let cube_config = |label: &str| ShaderConfig {
            label: label.to_string(),
            vertex_layout: Some(Vertex3d::LAYOUT),
            target_formats: vec![BufferType::CubemapHdr.texture_format()],
            blend: Some(wgpu::BlendState::REPLACE),
            depth: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            cull_mode: None,
        };

        // All three cubemap shaders sample exactly one input through unit 0.
        let equirect_entries = sampled_2d_entries();
        let cube_entries = sampled_cube_entries();

        let equirect_shader = Shader::new(
            gpu,
            include_str!("shaders/equirect_to_cube.wgsl"),
            cube_uniforms().build(),
            &equirect_entries,
            Vec::new(),
            cube_config("Equirect To Cube"),
        );
        let irradiance_shader = Shader::new(
            gpu,
            include_str!("shaders/irradiance.wgsl"),
            cube_uniforms().build(),
            &cube_entries,
            Vec::new(),
            cube_config("Irradiance Convolution"),
        );
        let prefilter_shader = Shader::new(
            gpu,
            include_str!("shaders/prefilter.wgsl"),
            cube_uniforms()
                .field("qrk_roughness", UniformType::Float)
                .build(),
            &cube_entries,
            Vec::new(),
            cube_config("GGX Prefilter"),
        );

        let mut brdf_shader = Shader::new(
            gpu,
            include_str!("shaders/brdf_lut.wgsl"),
            UniformLayout::builder().build(),
            &[],
            Vec::new(),
            ShaderConfig::screen("BRDF Integration", BufferType::ColorSnorm.texture_format()),
        );

        let mut baker = Self {
            helper: CubemapRenderHelper::new(gpu),
            mip_generator: MipmapGenerator::new(gpu),
            equirect_shader,
            irradiance_shader,
            prefilter_shader,
        };
        baker.compute_brdf_lut(gpu, &mut brdf_shader, &maps)?;
        Ok((baker, maps))
    }

    /// Run the environment-dependent stages in order against an
    /// equirectangular HDR source.
    pub fn bake(&mut self, gpu: &GpuContext, equirect: &Texture, maps: &mut IblMaps) -> Result<()> {
        log::info!(
            "baking environment ({}x{} source)",
            equirect.width(),
            equirect.height()
        );
        self.convert_equirect(gpu, equirect, maps)?;
        self.convolve_irradiance(gpu, maps)?;
        self.prefilter(gpu, maps)?;
        Ok(())
    }

    /// Stage 1: project the equirectangular source onto the six faces,
    /// then fill the environment mip chain.
    fn convert_equirect(
        &mut self,
        gpu: &GpuContext,
        equirect: &Texture,
        maps: &mut IblMaps,
    ) -> Result<()> {
        let mut binder = TextureBinder::new();
        binder.bind("qrk_equirect", equirect.handle());
        let bind_group = binder.create_bind_group(
            &gpu.device,
            self.equirect_shader.texture_layout(),
            "Equirect Source",
        );

        self.helper.render(
            gpu,
            &mut self.equirect_shader,
            Some(&bind_group),
            &maps.environment,
        )?;

        let env = maps.environment.color_attachment(0)?.texture()?;
        self.mip_generator.generate(gpu, env);
        Ok(())
    }

    /// Stage 2: hemisphere-integrate the environment into the irradiance
    /// cubemap.
    fn convolve_irradiance(&mut self, gpu: &GpuContext, maps: &mut IblMaps) -> Result<()> {
        let mut binder = TextureBinder::new();
        binder.bind("qrk_envMap", maps.environment_handle()?);
        let bind_group = binder.create_bind_group(
            &gpu.device,
            self.irradiance_shader.texture_layout(),
            "Irradiance Source",
        );

        self.helper.render(
            gpu,
            &mut self.irradiance_shader,
            Some(&bind_group),
            &maps.irradiance,
        )
    }

    /// Stage 3: GGX-prefilter the environment into each mip of the
    /// prefiltered chain at its mapped roughness.
    fn prefilter(&mut self, gpu: &GpuContext, maps: &mut IblMaps) -> Result<()> {
        let mut binder = TextureBinder::new();
        binder.bind("qrk_envMap", maps.environment_handle()?);
        let bind_group = binder.create_bind_group(
            &gpu.device,
            self.prefilter_shader.texture_layout(),
            "Prefilter Source",
        );

        let mip_count = maps.prefiltered.color_attachment(0)?.mip_count();
        for mip in 0..mip_count {
            let roughness = prefilter_roughness(mip, mip_count);
            self.prefilter_shader
                .set_uniform("qrk_roughness", UniformValue::Float(roughness))?;
            self.helper.render_to_mip(
                gpu,
                &mut self.prefilter_shader,
                Some(&bind_group),
                &maps.prefiltered,
                mip,
            )?;
        }
        Ok(())
    }

    /// Stage 4: integrate the split-sum BRDF into the LUT. Runs once.
    fn compute_brdf_lut(
        &mut self,
        gpu: &GpuContext,
        shader: &mut Shader,
        maps: &IblMaps,
    ) -> Result<()> {
        shader.flush_uniforms(gpu);
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("BRDF LUT"),
            });
        {
            let mut pass = maps.brdf_lut.activate(&mut encoder, LoadAction::Clear)?;
            shader.draw_fullscreen(&mut pass, None);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

fn sampled_2d_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    texture_entries(wgpu::TextureViewDimension::D2)
}

fn sampled_cube_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    texture_entries(wgpu::TextureViewDimension::Cube)
}

fn texture_entries(dimension: wgpu::TextureViewDimension) -> Vec<wgpu::BindGroupLayoutEntry> {
    vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: dimension,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roughness_map_is_linear_from_zero_to_one() {
        let n = PREFILTER_MIP_LEVELS;
        assert_eq!(prefilter_roughness(0, n), 0.0);
        assert_eq!(prefilter_roughness(n - 1, n), 1.0);
        assert!((prefilter_roughness(2, 5) - 0.5).abs() < 1e-6);
        assert!((prefilter_roughness(1, 5) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn single_mip_chain_is_all_sharp() {
        assert_eq!(prefilter_roughness(0, 1), 0.0);
    }

    #[test]
    fn map_sizes_follow_their_frequency_content() {
        // Irradiance is heavily low-passed; the prefiltered chain needs
        // headroom for its roughness steps.
        assert!(IRRADIANCE_SIZE < PREFILTER_SIZE);
        assert!(PREFILTER_SIZE < ENVIRONMENT_SIZE);
        assert!(PREFILTER_MIP_LEVELS <= 32 - (PREFILTER_SIZE.leading_zeros()));
    }
}
