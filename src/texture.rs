//! GPU texture resources: 2D images and cubemaps.
//!
//! [`Texture`] owns a `wgpu::Texture` together with the sampler and cached
//! views the rest of the renderer binds. It tracks dimensions, mip count, and
//! format, and exposes the sampler mip-range guard that makes it safe to
//! write one mip of a texture while another pass samples a different mip of
//! the same texture (the bloom pyramid depends on this).
//!
//! Mip generation has no fixed-function path on wgpu, so [`MipmapGenerator`]
//! renders each level from the previous one with a linear-filtered
//! passthrough draw.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{RenderError, Result};
use crate::gpu::GpuContext;

/// Whether a texture is a flat 2D image or a six-face cubemap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    D2,
    Cube,
}

impl TextureKind {
    /// The view dimension shaders sample this kind through.
    pub fn view_dimension(self) -> wgpu::TextureViewDimension {
        match self {
            TextureKind::D2 => wgpu::TextureViewDimension::D2,
            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        }
    }

    /// Number of array layers backing this kind.
    pub fn layer_count(self) -> u32 {
        match self {
            TextureKind::D2 => 1,
            TextureKind::Cube => 6,
        }
    }
}

/// Mip allocation policy for a new texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MipPolicy {
    /// Single mip level.
    #[default]
    Never,
    /// Allocate the full chain (optionally capped), fill levels on demand.
    Always,
}

/// Sampler and mip configuration for a new texture.
#[derive(Debug, Clone, Copy)]
pub struct TextureParams {
    pub min_filter: wgpu::FilterMode,
    pub mag_filter: wgpu::FilterMode,
    pub mip_filter: wgpu::FilterMode,
    pub wrap: wgpu::AddressMode,
    pub mip_policy: MipPolicy,
    /// Cap on the allocated mip chain when `mip_policy` is `Always`.
    pub max_num_mips: Option<u32>,
}

impl Default for TextureParams {
    fn default() -> Self {
        Self {
            min_filter: wgpu::FilterMode::Linear,
            mag_filter: wgpu::FilterMode::Linear,
            mip_filter: wgpu::FilterMode::Linear,
            wrap: wgpu::AddressMode::ClampToEdge,
            mip_policy: MipPolicy::Never,
            max_num_mips: None,
        }
    }
}

impl TextureParams {
    /// Nearest-filtered, repeat-wrapped params (SSAO noise tiles).
    pub fn nearest_tiled() -> Self {
        Self {
            min_filter: wgpu::FilterMode::Nearest,
            mag_filter: wgpu::FilterMode::Nearest,
            mip_filter: wgpu::FilterMode::Nearest,
            wrap: wgpu::AddressMode::Repeat,
            ..Default::default()
        }
    }

    /// Full mip chain with trilinear-style sampling (bloom, prefiltered maps).
    pub fn mipmapped() -> Self {
        Self {
            mip_policy: MipPolicy::Always,
            ..Default::default()
        }
    }
}

/// Full mip chain length for a `width`x`height` base level.
pub fn mip_count_for(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Size of mip `level` for a given base extent, halved per level, floor 1.
pub fn mip_size(base: u32, level: u32) -> u32 {
    (base >> level).max(1)
}

/// A cheap, clonable reference to a texture's bindable resources.
///
/// wgpu views and samplers are internally ref-counted, so handles can be
/// registered with the texture registry without ownership entanglement.
#[derive(Debug, Clone)]
pub struct TextureHandle {
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub dimension: wgpu::TextureViewDimension,
    pub sample_type: wgpu::TextureSampleType,
}

/// A GPU image resource: 2D texture or cubemap.
///
/// Immutable once created except for the sampler mip-range restriction.
#[derive(Debug)]
pub struct Texture {
    texture: wgpu::Texture,
    kind: TextureKind,
    width: u32,
    height: u32,
    mip_count: u32,
    format: wgpu::TextureFormat,
    sampler: wgpu::Sampler,
    full_view: wgpu::TextureView,
    /// Restricted sampling view, present while a mip range is set.
    restricted_view: Option<wgpu::TextureView>,
    mip_range: Option<(u32, u32)>,
}

impl Texture {
    /// Allocate empty storage.
    ///
    /// `usage` must include whatever the caller intends (`RENDER_ATTACHMENT`,
    /// `TEXTURE_BINDING`, copy flags). The mip chain length follows
    /// `params.mip_policy` / `params.max_num_mips`.
    pub fn new(
        gpu: &GpuContext,
        kind: TextureKind,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        params: &TextureParams,
        label: &str,
    ) -> Result<Self> {
        if kind == TextureKind::Cube && width != height {
            return Err(RenderError::NonSquareCubemapFace { width, height });
        }

        let mip_count = match params.mip_policy {
            MipPolicy::Never => 1,
            MipPolicy::Always => {
                let full = mip_count_for(width, height);
                params.max_num_mips.map_or(full, |cap| full.min(cap.max(1)))
            }
        };

        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: kind.layer_count(),
            },
            mip_level_count: mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{label} Sampler")),
            address_mode_u: params.wrap,
            address_mode_v: params.wrap,
            address_mode_w: params.wrap,
            mag_filter: params.mag_filter,
            min_filter: params.min_filter,
            mipmap_filter: params.mip_filter,
            ..Default::default()
        });

        let full_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("{label} View")),
            dimension: Some(kind.view_dimension()),
            ..Default::default()
        });

        Ok(Self {
            texture,
            kind,
            width,
            height,
            mip_count,
            format,
            sampler,
            full_view,
            restricted_view: None,
            mip_range: None,
        })
    }

    /// Create a 2D texture from raw pixel data.
    ///
    /// `channels` is the source channel count; 3-channel data is expanded to
    /// RGBA on upload since wgpu has no 3-channel sampleable formats. Channel
    /// counts other than 1, 2, 3, 4 are a fatal construction error.
    pub fn from_data(
        gpu: &GpuContext,
        data: &[u8],
        width: u32,
        height: u32,
        channels: u32,
        params: &TextureParams,
        label: &str,
    ) -> Result<Self> {
        let (format, upload): (wgpu::TextureFormat, Vec<u8>) = match channels {
            1 => (wgpu::TextureFormat::R8Unorm, data.to_vec()),
            2 => (wgpu::TextureFormat::Rg8Unorm, data.to_vec()),
            3 => {
                let mut rgba = Vec::with_capacity((width * height * 4) as usize);
                for px in data.chunks_exact(3) {
                    rgba.extend_from_slice(px);
                    rgba.push(255);
                }
                (wgpu::TextureFormat::Rgba8Unorm, rgba)
            }
            4 => (wgpu::TextureFormat::Rgba8Unorm, data.to_vec()),
            n => return Err(RenderError::UnsupportedChannelCount(n)),
        };

        let tex = Self::new(
            gpu,
            TextureKind::D2,
            width,
            height,
            format,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            params,
            label,
        )?;
        tex.upload_mip0(gpu, &upload);
        Ok(tex)
    }

    /// Load an equirectangular HDR environment source.
    ///
    /// Decodes to 32-bit float, converts to half floats, and uploads as
    /// `Rgba16Float` so the image stays filterable on baseline devices.
    pub fn from_hdr_file(gpu: &GpuContext, path: impl AsRef<Path>) -> Result<Self> {
        let img = image::open(path.as_ref())?.to_rgb32f();
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(RenderError::UnsupportedChannelCount(0));
        }

        let mut halfs: Vec<u16> = Vec::with_capacity((width * height * 4) as usize);
        for px in img.pixels() {
            halfs.push(f32_to_f16_bits(px.0[0]));
            halfs.push(f32_to_f16_bits(px.0[1]));
            halfs.push(f32_to_f16_bits(px.0[2]));
            halfs.push(f32_to_f16_bits(1.0));
        }

        let tex = Self::new(
            gpu,
            TextureKind::D2,
            width,
            height,
            wgpu::TextureFormat::Rgba16Float,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            &TextureParams::default(),
            &path.as_ref().display().to_string(),
        )?;
        tex.upload_mip0(gpu, bytemuck::cast_slice(&halfs));
        Ok(tex)
    }

    /// Load a cubemap from six image files in +X, -X, +Y, -Y, +Z, -Z order.
    ///
    /// Faces must be square and identically sized; anything else is a fatal
    /// construction error, checked before any GPU storage is allocated.
    pub fn cubemap_from_files(gpu: &GpuContext, paths: [&Path; 6]) -> Result<Self> {
        let mut faces = Vec::with_capacity(6);
        for path in paths {
            faces.push(image::open(path)?.to_rgba8());
        }
        let dims: Vec<(u32, u32)> = faces.iter().map(|f| f.dimensions()).collect();
        let size = validate_cubemap_faces(&dims)?;

        let tex = Self::new(
            gpu,
            TextureKind::Cube,
            size,
            size,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            &TextureParams::default(),
            "Cubemap",
        )?;
        for (layer, face) in faces.iter().enumerate() {
            gpu.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &tex.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                face,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(size * 4),
                    rows_per_image: Some(size),
                },
                wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 1,
                },
            );
        }
        Ok(tex)
    }

    fn upload_mip0(&self, gpu: &GpuContext, data: &[u8]) {
        let bpp = data.len() as u32 / (self.width * self.height);
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * bpp),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Restrict which mip levels shaders may sample.
    ///
    /// Mandatory whenever a draw writes to one mip while another stage might
    /// sample a different mip of the same texture in the same submission —
    /// the restricted view is the hazard boundary.
    pub fn set_sampler_mip_range(&mut self, min: u32, max: u32) -> Result<()> {
        if min > max || max >= self.mip_count {
            return Err(RenderError::MipOutOfRange {
                requested: max,
                available: self.mip_count,
            });
        }
        if self.mip_range == Some((min, max)) {
            return Ok(());
        }
        self.restricted_view = Some(self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Restricted Mip View"),
            dimension: Some(self.kind.view_dimension()),
            base_mip_level: min,
            mip_level_count: Some(max - min + 1),
            ..Default::default()
        }));
        self.mip_range = Some((min, max));
        Ok(())
    }

    /// Clear the sampling restriction, restoring the full mip chain.
    pub fn unset_sampler_mip_range(&mut self) {
        self.restricted_view = None;
        self.mip_range = None;
    }

    /// The view shaders should sample: restricted if a mip range is set,
    /// otherwise the full chain.
    pub fn view(&self) -> &wgpu::TextureView {
        self.restricted_view.as_ref().unwrap_or(&self.full_view)
    }

    /// A render-attachment view of one mip of a 2D texture, or of one mip of
    /// one face of a cubemap.
    pub fn attachment_view(&self, mip: u32, face: Option<u32>) -> Result<wgpu::TextureView> {
        if mip >= self.mip_count {
            return Err(RenderError::MipOutOfRange {
                requested: mip,
                available: self.mip_count,
            });
        }
        let layer = match (self.kind, face) {
            (TextureKind::D2, None) => 0,
            (TextureKind::Cube, Some(f)) if f < 6 => f,
            (_, Some(f)) => return Err(RenderError::CubemapFaceOutOfRange(f as i32)),
            (TextureKind::Cube, None) => return Err(RenderError::CubemapFaceOutOfRange(-1)),
        };
        Ok(self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Attachment View"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: mip,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        }))
    }

    /// The bindable handle the texture registry distributes.
    pub fn handle(&self) -> TextureHandle {
        TextureHandle {
            view: self.view().clone(),
            sampler: self.sampler.clone(),
            dimension: self.kind.view_dimension(),
            sample_type: if self.format.has_depth_aspect() {
                wgpu::TextureSampleType::Depth
            } else {
                wgpu::TextureSampleType::Float { filterable: true }
            },
        }
    }

    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

/// Check six cubemap face dimensions: all square, all matching. Returns
/// the shared face size.
pub fn validate_cubemap_faces(dims: &[(u32, u32)]) -> Result<u32> {
    let (expected, _) = dims[0];
    for (face, &(width, height)) in dims.iter().enumerate() {
        if width != height {
            return Err(RenderError::NonSquareCubemapFace { width, height });
        }
        if width != expected {
            return Err(RenderError::MismatchedCubemapFace {
                face,
                width,
                height,
                expected,
            });
        }
    }
    Ok(expected)
}

/// Convert an `f32` to IEEE 754 half-float bits (round-to-nearest-even).
///
/// HDR sources decode as 32-bit float but upload as `Rgba16Float`, which is
/// filterable everywhere `Rgba32Float` is not.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exp == 0xff {
        // Inf / NaN
        let payload = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | payload;
    }

    let unbiased = exp - 127;
    if unbiased > 15 {
        return sign | 0x7c00; // overflow -> inf
    }
    if unbiased >= -14 {
        // Normal half
        let half_exp = ((unbiased + 15) as u16) << 10;
        let half_man = (mantissa >> 13) as u16;
        let round = (mantissa >> 12) & 1;
        let sticky = (mantissa & 0x0fff != 0) as u32;
        let mut out = sign | half_exp | half_man;
        if round == 1 && (sticky == 1 || half_man & 1 == 1) {
            out += 1; // may carry into the exponent, which is correct
        }
        return out;
    }
    if unbiased >= -24 {
        // Subnormal half
        let shift = (-14 - unbiased) as u32;
        let man = (mantissa | 0x0080_0000) >> (13 + shift);
        return sign | man as u16;
    }
    sign // underflow -> signed zero
}

/// Renders mip chains level by level.
///
/// Each level is produced by a linear-filtered passthrough draw sampling the
/// previous level, per face for cubemaps. Pipelines are cached per format.
pub struct MipmapGenerator {
    shader: wgpu::ShaderModule,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl MipmapGenerator {
    pub fn new(gpu: &GpuContext) -> Self {
        let shader = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Mip Downsample Shader"),
                source: wgpu::ShaderSource::Wgsl(
                    include_str!("shaders/mip_downsample.wgsl").into(),
                ),
            });

        let layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Mip Downsample Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
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
                ],
            });

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Mip Downsample Pipeline Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mip Downsample Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            shader,
            layout,
            pipeline_layout,
            sampler,
            pipelines: HashMap::new(),
        }
    }

    fn pipeline_for(&mut self, gpu: &GpuContext, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        let (shader, layout) = (&self.shader, &self.pipeline_layout);
        self.pipelines.entry(format).or_insert_with(|| {
            gpu.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Mip Downsample Pipeline"),
                    layout: Some(layout),
                    vertex: wgpu::VertexState {
                        module: shader,
                        entry_point: Some("vs"),
                        buffers: &[],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: shader,
                        entry_point: Some("fs"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: Some(wgpu::BlendState::REPLACE),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
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
                })
        })
    }

    /// Fill mips `1..mip_count` of `texture` from its level 0, per face for
    /// cubemaps. Records into its own encoder and submits.
    pub fn generate(&mut self, gpu: &GpuContext, texture: &Texture) {
        if texture.mip_count() < 2 {
            return;
        }
        let pipeline = self.pipeline_for(gpu, texture.format()).clone();

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Mipmap Generation"),
            });

        let faces = texture.kind().layer_count();
        for face in 0..faces {
            for mip in 1..texture.mip_count() {
                let src = texture.raw().create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Mip Source"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_mip_level: mip - 1,
                    mip_level_count: Some(1),
                    base_array_layer: face,
                    array_layer_count: Some(1),
                    ..Default::default()
                });
                let dst = texture.raw().create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Mip Target"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    base_array_layer: face,
                    array_layer_count: Some(1),
                    ..Default::default()
                });

                let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Mip Downsample Bind Group"),
                    layout: &self.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&src),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                });

                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Mip Downsample Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &dst,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_pipeline(&pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_covers_full_chain() {
        assert_eq!(mip_count_for(1, 1), 1);
        assert_eq!(mip_count_for(2, 2), 2);
        assert_eq!(mip_count_for(256, 256), 9);
        assert_eq!(mip_count_for(640, 480), 10);
        assert_eq!(mip_count_for(1920, 1080), 11);
    }

    #[test]
    fn mip_size_halves_with_floor_one() {
        assert_eq!(mip_size(256, 0), 256);
        assert_eq!(mip_size(256, 1), 128);
        assert_eq!(mip_size(256, 8), 1);
        assert_eq!(mip_size(256, 12), 1);
        assert_eq!(mip_size(5, 1), 2);
    }

    #[test]
    fn half_float_round_trip_exact_values() {
        assert_eq!(f32_to_f16_bits(0.0), 0x0000);
        assert_eq!(f32_to_f16_bits(-0.0), 0x8000);
        assert_eq!(f32_to_f16_bits(1.0), 0x3c00);
        assert_eq!(f32_to_f16_bits(-2.0), 0xc000);
        assert_eq!(f32_to_f16_bits(0.5), 0x3800);
        assert_eq!(f32_to_f16_bits(65504.0), 0x7bff); // largest finite half
    }

    #[test]
    fn half_float_saturates_to_infinity() {
        assert_eq!(f32_to_f16_bits(1.0e6), 0x7c00);
        assert_eq!(f32_to_f16_bits(-1.0e6), 0xfc00);
        assert_eq!(f32_to_f16_bits(f32::INFINITY), 0x7c00);
    }

    #[test]
    fn half_float_subnormals() {
        // Smallest positive normal half is 2^-14; below that we get subnormals.
        assert_eq!(f32_to_f16_bits(2.0_f32.powi(-15)), 0x0200);
        assert_eq!(f32_to_f16_bits(2.0_f32.powi(-24)), 0x0001);
        assert_eq!(f32_to_f16_bits(2.0_f32.powi(-30)), 0x0000);
    }

    #[test]
    fn cubemap_faces_must_be_square() {
        let err = validate_cubemap_faces(&[(64, 64), (64, 32), (64, 64), (64, 64), (64, 64), (64, 64)])
            .unwrap_err();
        assert!(matches!(err, RenderError::NonSquareCubemapFace { .. }));
    }

    #[test]
    fn cubemap_faces_must_match() {
        let err = validate_cubemap_faces(&[(64, 64), (64, 64), (32, 32), (64, 64), (64, 64), (64, 64)])
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::MismatchedCubemapFace { face: 2, .. }
        ));
    }

    #[test]
    fn matching_square_faces_validate() {
        let size = validate_cubemap_faces(&[(128, 128); 6]).unwrap();
        assert_eq!(size, 128);
    }

    #[test]
    fn kind_layer_counts() {
        assert_eq!(TextureKind::D2.layer_count(), 1);
        assert_eq!(TextureKind::Cube.layer_count(), 6);
    }

    #[test]
    fn mip_policy_respects_cap() {
        // Mirrors the Texture::new computation without needing a device.
        let full = mip_count_for(512, 512);
        assert_eq!(full, 10);
        let capped = full.min(4);
        assert_eq!(capped, 4);
    }
}
