//! Bloom via a mip up/down-sample pyramid.
//!
//! One HDR framebuffer owns a texture with a full mip chain. A multipass
//! draw seeds mip 0 from the lit scene, walks the chain downward with a box
//! downsample, then walks back up with an additive tent-filter upsample.
//! Every draw samples one mip while writing another mip of the *same*
//! texture, so the sampler mip-range guard is active for every draw and
//! cleared at the end. The final bloom contribution is mip 0, mixed in by
//! the tone-mapping pass.

use crate::binding::TextureBinder;
use crate::error::Result;
use crate::formats::BufferType;
use crate::framebuffer::{Framebuffer, LoadAction};
use crate::gpu::GpuContext;
use crate::shader::{Shader, ShaderConfig, UniformLayout, UniformType, UniformValue};
use crate::texture::{TextureHandle, TextureParams};

/// Bloom tuning parameters.
#[derive(Debug, Clone)]
pub struct BloomConfig {
    /// Tent filter radius for the upsample pass, in UV units.
    pub filter_radius: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            filter_radius: 0.005,
        }
    }
}

/// One draw of the bloom multipass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomDraw {
    /// Mip level being written.
    pub target_mip: u32,
    /// The only mip level the shader may sample.
    pub sample_mip: u32,
    /// Whether the draw accumulates with additive blending.
    pub additive: bool,
}

/// The draw sequence for an `mip_count`-level chain: `mip_count - 1`
/// downsamples (mip 1..N-1, each sampling the previous level) followed by
/// `mip_count - 1` additive upsamples (mip N-2..0, each sampling the next
/// coarser level).
pub fn multipass_plan(mip_count: u32) -> Vec<BloomDraw> {
    let mut draws = Vec::new();
    for mip in 1..mip_count {
        draws.push(BloomDraw {
            target_mip: mip,
            sample_mip: mip - 1,
            additive: false,
        });
    }
    for mip in (0..mip_count.saturating_sub(1)).rev() {
        draws.push(BloomDraw {
            target_mip: mip,
            sample_mip: mip + 1,
            additive: true,
        });
    }
    draws
}

/// The bloom mip-chain framebuffer and its two shaders.
pub struct BloomPass {
    config: BloomConfig,
    chain: Framebuffer,
    downsample_shader: Shader,
    upsample_shader: Shader,
}

impl BloomPass {
    pub fn new(gpu: &GpuContext, width: u32, height: u32, config: BloomConfig) -> Result<Self> {
        let mut chain = Framebuffer::new(width, height, "Bloom Mip Chain");
        chain.attach_texture(gpu, BufferType::ColorHdr, &TextureParams::mipmapped())?;

        // Both shaders sample a single restricted view of the chain; the
        // layout is fixed, the bind group is rebuilt per draw.
        let mut binder = TextureBinder::new();
        binder.bind("qrk_bloomMipChain", chain.color_attachment(0)?.handle()?);
        let layout_entries = binder.layout_entries();

        let downsample_shader = Shader::new(
            gpu,
            include_str!("shaders/bloom_downsample.wgsl"),
            UniformLayout::builder().build(),
            &layout_entries,
            Vec::new(),
            ShaderConfig::screen("Bloom Downsample", BufferType::ColorHdr.texture_format()),
        );

        let additive = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent::OVER,
        };
        let mut upsample_shader = Shader::new(
            gpu,
            include_str!("shaders/bloom_upsample.wgsl"),
            UniformLayout::builder()
                .field("qrk_filterRadius", UniformType::Float)
                .build(),
            &layout_entries,
            Vec::new(),
            ShaderConfig::screen("Bloom Upsample", BufferType::ColorHdr.texture_format())
                .with_blend(additive),
        );
        upsample_shader.set_uniform(
            "qrk_filterRadius",
            UniformValue::Float(config.filter_radius),
        )?;

        Ok(Self {
            config,
            chain,
            downsample_shader,
            upsample_shader,
        })
    }

    /// Run the full pyramid against `source`'s color attachment 0.
    pub fn multipass_draw(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        source: &Framebuffer,
    ) -> Result<()> {
        self.upsample_shader.flush_uniforms(gpu);
        self.downsample_shader.flush_uniforms(gpu);

        source.blit_color_to(encoder, &self.chain)?;

        let mip_count = self.chain.color_attachment(0)?.mip_count();
        for draw in multipass_plan(mip_count) {
            // Writing target_mip while sampling sample_mip of the same
            // texture: the restricted view is the hazard boundary.
            self.chain
                .color_attachment_mut(0)?
                .texture_mut()?
                .set_sampler_mip_range(draw.sample_mip, draw.sample_mip)?;

            let mut binder = TextureBinder::new();
            binder.bind(
                "qrk_bloomMipChain",
                self.chain.color_attachment(0)?.handle()?,
            );

            let shader = if draw.additive {
                &self.upsample_shader
            } else {
                &self.downsample_shader
            };
            let bind_group =
                binder.create_bind_group(&gpu.device, shader.texture_layout(), "Bloom Chain");

            let load = if draw.additive {
                LoadAction::Keep
            } else {
                LoadAction::Clear
            };
            let mut pass = self
                .chain
                .activate_at(encoder, draw.target_mip, None, load)?;
            shader.draw_fullscreen(&mut pass, Some(&bind_group));
        }

        self.chain
            .color_attachment_mut(0)?
            .texture_mut()?
            .unset_sampler_mip_range();
        Ok(())
    }

    /// Handle to the finished bloom texture (sample mip 0).
    pub fn output_handle(&self) -> Result<TextureHandle> {
        self.chain.color_attachment(0)?.handle()
    }

    pub fn config(&self) -> &BloomConfig {
        &self.config
    }

    /// Mip levels in the chain.
    pub fn mip_count(&self) -> Result<u32> {
        Ok(self.chain.color_attachment(0)?.mip_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_has_n_minus_one_draws_each_way() {
        let plan = multipass_plan(6);
        let downsamples = plan.iter().filter(|d| !d.additive).count();
        let upsamples = plan.iter().filter(|d| d.additive).count();
        assert_eq!(downsamples, 5);
        assert_eq!(upsamples, 5);
    }

    #[test]
    fn downsamples_walk_down_sampling_the_previous_mip() {
        let plan = multipass_plan(5);
        let downsamples: Vec<_> = plan.iter().filter(|d| !d.additive).collect();
        for (i, draw) in downsamples.iter().enumerate() {
            assert_eq!(draw.target_mip, i as u32 + 1);
            assert_eq!(draw.sample_mip, draw.target_mip - 1);
        }
    }

    #[test]
    fn upsamples_walk_back_up_sampling_the_next_coarser_mip() {
        let plan = multipass_plan(5);
        let upsamples: Vec<_> = plan.iter().filter(|d| d.additive).collect();
        assert_eq!(upsamples.first().unwrap().target_mip, 3);
        assert_eq!(upsamples.last().unwrap().target_mip, 0);
        for draw in upsamples {
            assert_eq!(draw.sample_mip, draw.target_mip + 1);
        }
    }

    #[test]
    fn every_draw_separates_read_and_write_mips() {
        for draw in multipass_plan(8) {
            assert_ne!(draw.target_mip, draw.sample_mip);
        }
    }

    #[test]
    fn degenerate_chains_produce_no_draws() {
        assert!(multipass_plan(1).is_empty());
        assert!(multipass_plan(0).is_empty());
    }
}
